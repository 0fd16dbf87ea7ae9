//! `RegExp` values backed by the `regex` crate.
//!
//! Patterns are handed to `regex` after a small syntax translation. Features
//! it has no equivalent for (look-around, backreferences) are rejected when
//! the literal is lowered. Offsets and `lastIndex` count `char`s, the same
//! unit string indexing uses.

use regex::{Captures, Regex, RegexBuilder};
use std::cell::Cell;
use std::rc::Rc;

use crate::interpreter::{EvalResult, Interpreter};
use crate::intrinsics;
use crate::value::Value;

const VALID_FLAGS: &str = "dgimsuy";

/// A checked pattern, shared by every evaluation of the same literal.
#[derive(Debug, Clone)]
pub struct CompiledRegExp {
    pub source: String,
    pub flags: String,
    regex: Regex,
}

impl CompiledRegExp {
    pub fn new(source: &str, flags: &str) -> Result<Self, String> {
        for (i, flag) in flags.char_indices() {
            if !VALID_FLAGS.contains(flag) || flags[..i].contains(flag) {
                return Err(format!("Invalid flags supplied to RegExp constructor '{}'", flags));
            }
        }
        let regex = RegexBuilder::new(&translate(source))
            .case_insensitive(flags.contains('i'))
            .multi_line(flags.contains('m'))
            .dot_matches_new_line(flags.contains('s'))
            .build()
            .map_err(|e| {
                let reason = e.to_string();
                let reason = reason.lines().last().unwrap_or_default().trim_start_matches("error: ");
                format!("Invalid regular expression: /{}/{}: {}", source, flags, reason)
            })?;
        Ok(Self {
            source: source.to_string(),
            flags: flags.to_string(),
            regex,
        })
    }
}

/// JS-only spellings rewritten to their `regex` equivalents.
fn translate(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('/') => out.push('/'),
                Some(next) => {
                    out.push('\\');
                    out.push(next);
                }
                None => out.push_str("\\\\"),
            },
            '[' if chars.as_str().starts_with("^]") => {
                chars.nth(1);
                out.push_str("[\\s\\S]");
            }
            _ => out.push(c),
        }
    }
    out
}

/// A live `RegExp` object.
pub struct RegExpObject {
    compiled: CompiledRegExp,
    last_index: Cell<usize>,
}

impl RegExpObject {
    pub fn new(compiled: CompiledRegExp) -> Self {
        Self {
            compiled,
            last_index: Cell::new(0),
        }
    }

    pub fn source(&self) -> &str {
        &self.compiled.source
    }

    pub fn flags(&self) -> &str {
        &self.compiled.flags
    }

    pub fn global(&self) -> bool {
        self.compiled.flags.contains('g')
    }

    fn sticky(&self) -> bool {
        self.compiled.flags.contains('y')
    }

    pub fn last_index(&self) -> usize {
        self.last_index.get()
    }

    pub fn set_last_index(&self, index: usize) {
        self.last_index.set(index);
    }

    pub fn to_js_string(&self) -> String {
        format!("/{}/{}", self.compiled.source, self.compiled.flags)
    }

    /// One `exec` step: honours and advances `lastIndex` for `g` and `y`.
    fn next_match<'t>(&self, text: &'t str) -> Option<Captures<'t>> {
        let stateful = self.global() || self.sticky();
        let start = if stateful { self.last_index.get() } else { 0 };
        let found = char_to_byte(text, start).and_then(|from| {
            self.compiled
                .regex
                .captures_at(text, from)
                .filter(|caps| !self.sticky() || caps.get(0).map(|m| m.start()) == Some(from))
        });
        if stateful {
            let next = found
                .as_ref()
                .and_then(|caps| caps.get(0))
                .map_or(0, |m| byte_to_char(text, m.end()));
            self.last_index.set(next);
        }
        found
    }

    fn all_matches<'t>(&self, text: &'t str) -> Vec<Captures<'t>> {
        self.last_index.set(0);
        self.compiled.regex.captures_iter(text).collect()
    }
}

impl std::fmt::Debug for RegExpObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_js_string())
    }
}

fn char_to_byte(text: &str, index: usize) -> Option<usize> {
    if index == 0 {
        return Some(0);
    }
    text.char_indices()
        .map(|(b, _)| b)
        .chain(std::iter::once(text.len()))
        .nth(index)
}

fn byte_to_char(text: &str, byte: usize) -> usize {
    text[..byte].chars().count()
}

/// `[match, ...groups]`, non-participating groups as `undefined`.
fn match_array(caps: &Captures<'_>) -> Value {
    Value::array(
        caps.iter()
            .map(|group| group.map_or(Value::Undefined, |m| Value::string(m.as_str())))
            .collect(),
    )
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONSTRUCTOR & PROTOTYPE
// ═══════════════════════════════════════════════════════════════════════════════

/// `RegExp(pattern, flags)`, with or without `new`.
pub fn constructor() -> Value {
    Value::native("RegExp", |interp, _, args| {
        let pattern = args.first().cloned().unwrap_or(Value::Undefined);
        let flags = args.get(1).cloned().unwrap_or(Value::Undefined);
        let (source, default_flags) = match &pattern {
            Value::RegExp(re) => (re.source().to_string(), re.flags().to_string()),
            Value::Undefined => ("(?:)".to_string(), String::new()),
            other => (other.to_js_string(), String::new()),
        };
        let flags = match flags {
            Value::Undefined => default_flags,
            other => other.to_js_string(),
        };
        CompiledRegExp::new(&source, &flags)
            .map(|compiled| Value::RegExp(Rc::new(RegExpObject::new(compiled))))
            .map_err(|message| interp.error("SyntaxError", message))
    })
}

/// `RegExp.prototype.test`.
pub fn test(re: &RegExpObject, text: &str) -> Value {
    Value::Bool(re.next_match(text).is_some())
}

/// `RegExp.prototype.exec`.
pub fn exec(re: &RegExpObject, text: &str) -> Value {
    re.next_match(text).map_or(Value::Null, |caps| match_array(&caps))
}

/// Own-looking properties and prototype methods of a `RegExp`.
pub fn property(re: &RegExpObject, key: &str) -> Value {
    match key {
        "source" => Value::string(re.source()),
        "flags" => Value::string(re.flags()),
        "global" => Value::Bool(re.global()),
        "ignoreCase" => Value::Bool(re.flags().contains('i')),
        "multiline" => Value::Bool(re.flags().contains('m')),
        "sticky" => Value::Bool(re.sticky()),
        "lastIndex" => Value::Number(re.last_index() as f64),
        _ => intrinsics::regexp_method(key).unwrap_or(Value::Undefined),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// STRING METHODS WITH A PATTERN ARGUMENT
// ═══════════════════════════════════════════════════════════════════════════════

/// `String.prototype.replace` / `replaceAll` with a `RegExp` pattern.
pub fn replace(
    interp: &mut Interpreter,
    text: &str,
    re: &RegExpObject,
    replacement: &Value,
    all: bool,
) -> EvalResult<Value> {
    if all && !re.global() {
        return Err(interp.error(
            "TypeError",
            "replaceAll must be called with a global RegExp",
        ));
    }
    let matches: Vec<Captures<'_>> = if re.global() {
        re.all_matches(text)
    } else {
        re.next_match(text).into_iter().collect()
    };

    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for caps in &matches {
        let Some(whole) = caps.get(0) else { continue };
        out.push_str(&text[last..whole.start()]);
        let with = if replacement.is_callable() {
            let mut args: Vec<Value> = caps
                .iter()
                .map(|g| g.map_or(Value::Undefined, |m| Value::string(m.as_str())))
                .collect();
            args.push(Value::Number(byte_to_char(text, whole.start()) as f64));
            args.push(Value::string(text));
            interp.call(replacement, Value::Undefined, args)?.to_js_string()
        } else {
            expand(&replacement.to_js_string(), caps, text)
        };
        interp.string_length(out.len() + with.len())?;
        out.push_str(&with);
        last = whole.end();
    }
    out.push_str(&text[last..]);
    Ok(Value::from(out))
}

/// `$`-substitutions of a replacement string.
fn expand(template: &str, caps: &Captures<'_>, text: &str) -> String {
    let whole = caps.get(0);
    let (start, end) = whole.map_or((0, 0), |m| (m.start(), m.end()));
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let mut consumed = 1;
        match after.chars().next() {
            Some('$') => out.push('$'),
            Some('&') => out.push_str(&text[start..end]),
            Some('`') => out.push_str(&text[..start]),
            Some('\'') => out.push_str(&text[end..]),
            Some('<') => match after.find('>') {
                Some(close) => {
                    if let Some(m) = caps.name(&after[1..close]) {
                        out.push_str(m.as_str());
                    }
                    consumed = close + 1;
                }
                None => {
                    out.push('$');
                    consumed = 0;
                }
            },
            Some(d) if d.is_ascii_digit() => {
                let two: Option<usize> = after.get(..2).and_then(|s| s.parse().ok());
                let group = match two {
                    Some(n) if n > 0 && n < caps.len() => {
                        consumed = 2;
                        Some(n)
                    }
                    _ => {
                        let n = d as usize - '0' as usize;
                        if n > 0 && n < caps.len() {
                            Some(n)
                        } else {
                            None
                        }
                    }
                };
                match group {
                    Some(n) => {
                        if let Some(m) = caps.get(n) {
                            out.push_str(m.as_str());
                        }
                    }
                    None => {
                        out.push('$');
                        consumed = 0;
                    }
                }
            }
            _ => {
                out.push('$');
                consumed = 0;
            }
        }
        rest = &after[consumed..];
    }
    out.push_str(rest);
    out
}

/// `String.prototype.match`.
pub fn match_text(text: &str, re: &RegExpObject) -> Value {
    if re.global() {
        let found: Vec<Value> = re
            .all_matches(text)
            .iter()
            .filter_map(|caps| caps.get(0))
            .map(|m| Value::string(m.as_str()))
            .collect();
        if found.is_empty() {
            Value::Null
        } else {
            Value::array(found)
        }
    } else {
        re.next_match(text).map_or(Value::Null, |caps| match_array(&caps))
    }
}

/// `String.prototype.matchAll`, collected eagerly.
pub fn match_all(interp: &Interpreter, text: &str, re: &RegExpObject) -> EvalResult<Value> {
    if !re.global() {
        return Err(interp.error(
            "TypeError",
            "matchAll must be called with a global RegExp",
        ));
    }
    Ok(Value::array(re.all_matches(text).iter().map(match_array).collect()))
}

/// `String.prototype.search`.
pub fn search(text: &str, re: &RegExpObject) -> Value {
    let found = re.compiled.regex.find(text);
    Value::Number(found.map_or(-1.0, |m| byte_to_char(text, m.start()) as f64))
}

/// `String.prototype.split` with a `RegExp` separator. Captured groups are
/// spliced into the result.
pub fn split(text: &str, re: &RegExpObject, limit: usize) -> Value {
    if text.is_empty() {
        let parts = if re.compiled.regex.is_match(text) {
            Vec::new()
        } else {
            vec![Value::string("")]
        };
        return Value::array(parts.into_iter().take(limit).collect());
    }
    let mut parts = Vec::new();
    let mut last = 0;
    for caps in re.compiled.regex.captures_iter(text) {
        let Some(m) = caps.get(0) else { continue };
        if m.start() >= text.len() {
            break;
        }
        if m.end() == last {
            continue;
        }
        parts.push(Value::string(&text[last..m.start()]));
        for group in caps.iter().skip(1) {
            parts.push(group.map_or(Value::Undefined, |g| Value::string(g.as_str())));
        }
        last = m.end();
    }
    parts.push(Value::string(&text[last..]));
    Value::array(parts.into_iter().take(limit).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn re(source: &str, flags: &str) -> RegExpObject {
        RegExpObject::new(CompiledRegExp::new(source, flags).unwrap())
    }

    #[test]
    fn test_translation_of_js_spellings() {
        assert_eq!(translate(r"a\/b"), "a/b");
        assert_eq!(translate("[^]+"), r"[\s\S]+");
        assert!(CompiledRegExp::new(r"^\d{3}-\w+$", "i").is_ok());
    }

    #[test]
    fn test_unsupported_pattern_and_flags_are_rejected() {
        let err = CompiledRegExp::new("(?<=a)b", "").unwrap_err();
        assert!(err.starts_with("Invalid regular expression: /(?<=a)b/"));
        assert!(CompiledRegExp::new("a", "gg").is_err());
        assert!(CompiledRegExp::new("a", "x").is_err());
    }

    #[test]
    fn test_global_exec_advances_last_index() {
        let r = re("o", "g");
        assert!(r.next_match("foo").is_some());
        assert_eq!(r.last_index(), 2);
        assert!(r.next_match("foo").is_some());
        assert_eq!(r.last_index(), 3);
        assert!(r.next_match("foo").is_none());
        assert_eq!(r.last_index(), 0);
    }

    #[test]
    fn test_expand_substitutions() {
        let r = Regex::new(r"(?<first>\w+) (\w+)").unwrap();
        let caps = r.captures("ada lovelace").unwrap();
        assert_eq!(expand("$2, $<first> [$&] $$ $9", &caps, "ada lovelace"), "lovelace, ada [ada lovelace] $ $9");
    }

    #[test]
    fn test_split_on_empty_matches_and_groups() {
        let parts = split("ab", &re("(?:)", ""), usize::MAX);
        assert_eq!(parts.to_js_string(), "a,b");
        let parts = split("a1b2c", &re(r"(\d)", ""), usize::MAX);
        assert_eq!(parts.to_js_string(), "a,1,b,2,c");
        match split("", &re(",", ""), usize::MAX) {
            Value::Array(items) => assert_eq!(items.borrow().len(), 1),
            other => panic!("expected array, got {:?}", other),
        }
    }

    #[test]
    fn test_search_counts_chars() {
        assert_eq!(search("héllo", &re("l", "")), Value::Number(2.0));
        assert_eq!(search("abc", &re("z", "")), Value::Number(-1.0));
    }
}

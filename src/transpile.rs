//! Transpiler adapter: TSX text in, plain JavaScript text out.
//!
//! oxc parses, [`TypeStripper`] erases TypeScript, [`JsxLowerer`] rewrites JSX
//! into factory calls and `oxc_codegen` prints the result.

use oxc_allocator::Allocator;
use oxc_ast_visit::VisitMut;
use oxc_codegen::Codegen;
use oxc_parser::Parser;
use oxc_span::SourceType;
use tracing::debug;

use crate::config::CompilerConfig;
use crate::error::TranspileError;
use crate::jsx_lowerer::{JsxLowerer, TypeStripper};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transpiled {
    pub code: String,
}

pub fn transpile(source: &str, config: &CompilerConfig) -> Result<Transpiled, TranspileError> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, source, SourceType::tsx()).parse();

    if !ret.errors.is_empty() {
        let diagnostics: Vec<String> = ret.errors.iter().map(|e| e.to_string()).collect();
        debug!(count = diagnostics.len(), "transpile failed");
        return Err(TranspileError {
            message: diagnostics[0].clone(),
            diagnostics,
        });
    }

    let mut program = ret.program;
    TypeStripper::new(&allocator).visit_program(&mut program);
    JsxLowerer::new(&allocator, &config.jsx).visit_program(&mut program);

    let code = Codegen::new().build(&program).code;
    debug!(bytes = code.len(), "transpiled");
    Ok(Transpiled { code })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(source: &str) -> String {
        transpile(source, &CompilerConfig::default()).unwrap().code
    }

    #[test]
    fn test_jsx_becomes_factory_calls() {
        let code = run("const el = <div className=\"a\">hi {name}</div>;");
        assert!(code.contains("React.createElement("));
        assert!(code.contains("className"));
        assert!(!code.contains("<div"));
    }

    #[test]
    fn test_fragment_uses_configured_fragment() {
        let code = run("const el = <><b /></>;");
        assert!(code.contains("React.Fragment"));
    }

    #[test]
    fn test_component_tags_are_references() {
        let code = run("const el = <Card.Body><Item /></Card.Body>;");
        assert!(code.contains("createElement(Card.Body"));
        assert!(code.contains("createElement(Item"));
    }

    #[test]
    fn test_typescript_is_erased() {
        let code = run(
            "interface P { n: number }\ntype T = string;\nfunction f(a: number, b?: string): T { return (a as any)!; }\nconst x: number = f<number>(1);",
        );
        assert!(!code.contains("interface"));
        assert!(!code.contains("type T"));
        assert!(!code.contains(": number"));
        assert!(!code.contains(" as "));
        assert!(code.contains("function f(a, b)"));
    }

    #[test]
    fn test_enum_becomes_object() {
        let code = run("enum Color { Red, Green = 5, Blue }");
        assert!(code.contains("const Color"));
        assert!(code.contains("Blue"));
        assert!(code.contains('6'));
    }

    #[test]
    fn test_syntax_error_reports_first_diagnostic() {
        let err = transpile("const = ;", &CompilerConfig::default()).unwrap_err();
        assert!(!err.message.is_empty());
        assert_eq!(err.message, err.diagnostics[0]);
    }

    #[test]
    fn test_output_is_deterministic() {
        let source = "export const A = () => <p>{[1, 2].map(n => <i key={n}>{n}</i>)}</p>;";
        assert_eq!(run(source), run(source));
    }
}

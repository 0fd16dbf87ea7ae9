use serde::Serialize;
use sha2::{Digest, Sha256};

pub fn compute_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Content hashes of one compilation's stage outputs. Equal inputs give
/// equal fingerprints, which is how determinism is checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageFingerprints {
    pub source: String,
    pub preprocessed: String,
    pub transpiled: String,
}

impl StageFingerprints {
    pub fn new(source: &str, preprocessed: &str, transpiled: &str) -> Self {
        Self {
            source: compute_hash(source),
            preprocessed: compute_hash(preprocessed),
            transpiled: compute_hash(transpiled),
        }
    }

    /// First 12 hex digits of the transpiled hash, for log lines.
    pub fn short(&self) -> &str {
        &self.transpiled[..12]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_stable_hex() {
        let a = compute_hash("const a = 1;");
        assert_eq!(a, compute_hash("const a = 1;"));
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, compute_hash("const a = 2;"));
    }

    #[test]
    fn test_empty_input_hash() {
        assert_eq!(
            compute_hash(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}

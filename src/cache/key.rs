//! Cache key generation.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// A cache key: a hex SHA-256 digest plus the request fields it was derived
/// from. The digest alone addresses storage; the model and prompt ride along
/// so pattern-based invalidation has something readable to match against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub hash: String,
    pub model: Option<String>,
    pub prompt: Option<String>,
}

impl CacheKey {
    pub fn new(hash: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            model: None,
            prompt: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn as_str(&self) -> &str {
        &self.hash
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.hash)
    }
}

impl From<&str> for CacheKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for CacheKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Derives deterministic keys from request identity.
///
/// Fields are canonicalized through a `BTreeMap` before hashing so insertion
/// order can never change the digest.
pub struct CacheKeyGenerator {
    include_model: bool,
    include_options: bool,
    salt: Option<String>,
}

impl CacheKeyGenerator {
    pub fn new() -> Self {
        Self {
            include_model: true,
            include_options: true,
            salt: None,
        }
    }

    /// Add a salt so independent gateway instances keep disjoint key spaces
    /// on a shared backend.
    pub fn with_salt(mut self, salt: impl Into<String>) -> Self {
        self.salt = Some(salt.into());
        self
    }

    pub fn generate(
        &self,
        model: &str,
        prompt: &str,
        options: Option<&serde_json::Value>,
    ) -> CacheKey {
        let mut parts: BTreeMap<String, String> = BTreeMap::new();
        if self.include_model {
            parts.insert("model".into(), model.into());
        }
        parts.insert("prompt".into(), prompt.into());
        if self.include_options {
            if let Some(opts) = options {
                parts.insert("options".into(), opts.to_string());
            }
        }
        if let Some(ref s) = self.salt {
            parts.insert("salt".into(), s.clone());
        }

        let canonical = serde_json::to_string(&parts).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        let hash: String = hasher.finalize().iter().map(|b| format!("{:02x}", b)).collect();

        CacheKey::new(hash).with_model(model).with_prompt(prompt)
    }
}

impl Default for CacheKeyGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_same_request_same_key() {
        let generator = CacheKeyGenerator::new();
        let a = generator.generate("llama3", "hello", Some(&json!({"temperature": 0.2})));
        let b = generator.generate("llama3", "hello", Some(&json!({"temperature": 0.2})));
        assert_eq!(a.hash, b.hash);
        assert_eq!(a.hash.len(), 64);
    }

    #[test]
    fn test_any_field_changes_the_key() {
        let generator = CacheKeyGenerator::new();
        let base = generator.generate("llama3", "hello", None);
        let other_model = generator.generate("mistral", "hello", None);
        let other_prompt = generator.generate("llama3", "hello!", None);
        let with_options = generator.generate("llama3", "hello", Some(&json!({"temperature": 0.9})));
        assert_ne!(base.hash, other_model.hash);
        assert_ne!(base.hash, other_prompt.hash);
        assert_ne!(base.hash, with_options.hash);
    }

    #[test]
    fn test_salt_separates_key_spaces() {
        let plain = CacheKeyGenerator::new();
        let salted = CacheKeyGenerator::new().with_salt("tenant-a");
        assert_ne!(
            plain.generate("llama3", "hello", None).hash,
            salted.generate("llama3", "hello", None).hash
        );
    }

    #[test]
    fn test_key_carries_request_fields() {
        let key = CacheKeyGenerator::new().generate("llama3", "summarize this", None);
        assert_eq!(key.model.as_deref(), Some("llama3"));
        assert_eq!(key.prompt.as_deref(), Some("summarize this"));
    }
}

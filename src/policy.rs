//! Security/policy collaborator boundary.
//!
//! Every generation passes through a [`PolicyGate`] before any cache lookup
//! or runtime call. The gate is a black box that may sanitize the prompt and
//! approve or deny the request; a denial short-circuits the request and its
//! violations are kept verbatim so telemetry can report what was blocked.

use crate::{Error, Result};
use async_trait::async_trait;
use regex::Regex;

/// Outcome of a policy review. `sanitized_prompt` is what the gateway uses
/// for the cache key and the runtime call; it equals the input prompt when
/// no redaction applied.
#[derive(Debug, Clone)]
pub struct PolicyDecision {
    pub allowed: bool,
    pub sanitized_prompt: String,
    pub violations: Vec<String>,
}

impl PolicyDecision {
    pub fn allow(prompt: impl Into<String>) -> Self {
        Self {
            allowed: true,
            sanitized_prompt: prompt.into(),
            violations: Vec::new(),
        }
    }

    pub fn deny(prompt: impl Into<String>, violations: Vec<String>) -> Self {
        Self {
            allowed: false,
            sanitized_prompt: prompt.into(),
            violations,
        }
    }

    /// Violations joined into the one-line reason used for errors and events.
    pub fn reason(&self) -> String {
        if self.violations.is_empty() {
            "request denied by policy".to_string()
        } else {
            self.violations.join("; ")
        }
    }
}

/// Gate seam consulted before a request does any work.
#[async_trait]
pub trait PolicyGate: Send + Sync {
    async fn review(&self, prompt: &str, actor: Option<&str>) -> Result<PolicyDecision>;

    fn name(&self) -> &'static str {
        "custom"
    }
}

/// Default gate: everything passes, nothing is rewritten.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAllGate;

impl AllowAllGate {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PolicyGate for AllowAllGate {
    async fn review(&self, prompt: &str, _actor: Option<&str>) -> Result<PolicyDecision> {
        Ok(PolicyDecision::allow(prompt))
    }

    fn name(&self) -> &'static str {
        "allow_all"
    }
}

/// Keyword gate: denies prompts containing a blocked keyword
/// (case-insensitive) and redacts matches of the configured patterns before
/// the prompt travels further.
#[derive(Debug, Clone, Default)]
pub struct KeywordGate {
    blocked: Vec<String>,
    redact: Vec<Regex>,
}

impl KeywordGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn block_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.blocked.push(keyword.into().to_lowercase());
        self
    }

    pub fn block_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for keyword in keywords {
            self.blocked.push(keyword.into().to_lowercase());
        }
        self
    }

    /// Add a redaction pattern; matches are replaced with `[redacted]`.
    pub fn redact_pattern(mut self, pattern: &str) -> Result<Self> {
        let re = Regex::new(&format!("(?i){}", pattern)).map_err(|e| {
            Error::InvalidInput(format!("invalid redaction pattern '{}': {}", pattern, e))
        })?;
        self.redact.push(re);
        Ok(self)
    }
}

#[async_trait]
impl PolicyGate for KeywordGate {
    async fn review(&self, prompt: &str, _actor: Option<&str>) -> Result<PolicyDecision> {
        let mut violations = Vec::new();

        let prompt_lower = prompt.to_lowercase();
        for keyword in &self.blocked {
            if prompt_lower.contains(keyword) {
                violations.push(format!("prompt contains blocked keyword '{}'", keyword));
            }
        }
        if !violations.is_empty() {
            return Ok(PolicyDecision::deny(prompt, violations));
        }

        let mut sanitized = prompt.to_string();
        for re in &self.redact {
            if re.is_match(&sanitized) {
                violations.push(format!("redacted matches of '{}'", re.as_str()));
                sanitized = re.replace_all(&sanitized, "[redacted]").into_owned();
            }
        }

        Ok(PolicyDecision {
            allowed: true,
            sanitized_prompt: sanitized,
            violations,
        })
    }

    fn name(&self) -> &'static str {
        "keyword"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_allow_all_gate_passes_prompt_through() {
        let gate = AllowAllGate::new();
        let decision = gate.review("anything at all", None).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.sanitized_prompt, "anything at all");
        assert!(decision.violations.is_empty());
    }

    #[tokio::test]
    async fn test_keyword_gate_blocks_case_insensitive() {
        let gate = KeywordGate::new().block_keywords(["forbidden", "secret"]);
        let decision = gate.review("tell me the FORBIDDEN thing", None).await.unwrap();
        assert!(!decision.allowed);
        assert!(decision.reason().contains("forbidden"));

        let ok = gate.review("an innocuous prompt", None).await.unwrap();
        assert!(ok.allowed);
    }

    #[tokio::test]
    async fn test_keyword_gate_redacts_but_allows() {
        let gate = KeywordGate::new()
            .redact_pattern(r"\b\d{3}-\d{2}-\d{4}\b")
            .unwrap();
        let decision = gate.review("my ssn is 123-45-6789 ok", None).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.sanitized_prompt, "my ssn is [redacted] ok");
        assert_eq!(decision.violations.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_gate_allows_everything() {
        let gate = KeywordGate::new();
        let decision = gate.review("whatever", None).await.unwrap();
        assert!(decision.allowed);
    }

    #[test]
    fn test_invalid_redaction_pattern_rejected() {
        let result = KeywordGate::new().redact_pattern("(unclosed");
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }
}

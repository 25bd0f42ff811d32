pub mod generic_provider;
pub mod registry;

use async_trait::async_trait;

pub use generic_provider::GenericProvider;
pub use registry::ProviderRegistry;

/// Errors at the completion-service boundary. Content problems are not
/// represented here: a reply that arrives is returned as text and judged by
/// the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LlmError {
    /// Transport failure, timeout or non-success HTTP status.
    #[error("completion service unavailable: {0}")]
    Unavailable(String),
    /// Rate limiting or billing exhaustion.
    #[error("completion quota exceeded: {0}")]
    Quota(String),
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: &str) -> Self {
        Self {
            role: "system".to_string(),
            content: content.to_string(),
        }
    }

    pub fn user(content: &str) -> Self {
        Self {
            role: "user".to_string(),
            content: content.to_string(),
        }
    }
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn provider_id(&self) -> &str;

    fn model_id(&self) -> &str;

    /// One synchronous request/response round trip. Provider envelopes are
    /// unwrapped here; the returned text is the model's reply verbatim.
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, LlmError>;
}

/// Maps a non-success HTTP reply to the boundary taxonomy.
pub fn classify_http_failure(provider: &str, status: u16, body: &str) -> LlmError {
    let lowered = body.to_lowercase();
    let quota = status == 429
        || status == 402
        || lowered.contains("insufficient_quota")
        || lowered.contains("quota")
        || lowered.contains("billing")
        || lowered.contains("rate limit");
    let msg = format!("{} API error {}: {}", provider, status, truncate(body, 500));
    if quota {
        LlmError::Quota(msg)
    } else {
        LlmError::Unavailable(msg)
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_and_billing_are_quota() {
        assert!(matches!(
            classify_http_failure("openai", 429, "slow down"),
            LlmError::Quota(_)
        ));
        assert!(matches!(
            classify_http_failure("openai", 402, ""),
            LlmError::Quota(_)
        ));
        assert!(matches!(
            classify_http_failure(
                "openai",
                400,
                r#"{"error":{"code":"insufficient_quota"}}"#
            ),
            LlmError::Quota(_)
        ));
    }

    #[test]
    fn server_errors_are_unavailable() {
        let err = classify_http_failure("google", 503, "overloaded");
        assert!(matches!(err, LlmError::Unavailable(_)));
        assert!(err.to_string().contains("google API error 503"));
    }

    #[test]
    fn long_bodies_are_truncated_on_char_boundaries() {
        let body = "é".repeat(2000);
        let err = classify_http_failure("x", 500, &body);
        let LlmError::Unavailable(msg) = err else {
            panic!("expected unavailable");
        };
        assert!(msg.chars().count() < 600);
    }
}

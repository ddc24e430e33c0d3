//! Token usage accounting.

use serde::{Deserialize, Serialize};

/// Token usage statistics.
///
/// Accepts both the short field names and the `*_input_tokens` names agent
/// streams use for cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Input tokens.
    #[serde(default)]
    pub input_tokens: u64,

    /// Output tokens.
    #[serde(default)]
    pub output_tokens: u64,

    /// Cache creation tokens.
    #[serde(default, alias = "cache_creation_input_tokens")]
    pub cache_creation_tokens: u64,

    /// Cache read tokens.
    #[serde(default, alias = "cache_read_input_tokens")]
    pub cache_read_tokens: u64,
}

impl TokenUsage {
    /// Get the total token count.
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens + self.cache_creation_tokens + self.cache_read_tokens
    }

    /// Check whether every counter is zero.
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Add another usage to this one.
    pub fn add(&mut self, other: &TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.cache_creation_tokens += other.cache_creation_tokens;
        self.cache_read_tokens += other.cache_read_tokens;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_accepts_stream_field_names() {
        let usage: TokenUsage = serde_json::from_value(serde_json::json!({
            "input_tokens": 10,
            "output_tokens": 5,
            "cache_creation_input_tokens": 3,
            "cache_read_input_tokens": 2
        }))
        .unwrap();

        assert_eq!(usage.cache_creation_tokens, 3);
        assert_eq!(usage.cache_read_tokens, 2);
        assert_eq!(usage.total(), 20);
    }

    #[test]
    fn test_usage_add() {
        let mut total = TokenUsage::default();
        assert!(total.is_empty());
        total.add(&TokenUsage {
            input_tokens: 1,
            output_tokens: 2,
            ..Default::default()
        });
        total.add(&TokenUsage {
            input_tokens: 3,
            ..Default::default()
        });
        assert_eq!(total.input_tokens, 4);
        assert_eq!(total.output_tokens, 2);
    }
}

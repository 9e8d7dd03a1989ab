//! Token usage counters and the static per-model price table.

use serde::{Deserialize, Serialize};

/// Price of one model in USD per million tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPrice {
    pub model: &'static str,
    pub prompt: f64,
    pub cached: f64,
    pub completion: f64,
}

/// Known model prices. Lookup is by exact id, then by longest prefix.
pub const PRICE_TABLE: &[ModelPrice] = &[
    ModelPrice { model: "gpt-4o", prompt: 2.5, cached: 1.25, completion: 10.0 },
    ModelPrice { model: "gpt-4o-mini", prompt: 0.15, cached: 0.075, completion: 0.6 },
    ModelPrice { model: "gpt-4.1", prompt: 2.0, cached: 0.5, completion: 8.0 },
    ModelPrice { model: "gpt-4.1-mini", prompt: 0.4, cached: 0.1, completion: 1.6 },
    ModelPrice { model: "o3-mini", prompt: 1.1, cached: 0.55, completion: 4.4 },
    ModelPrice { model: "mistral-large", prompt: 2.0, cached: 2.0, completion: 6.0 },
    ModelPrice { model: "mistral-small", prompt: 0.1, cached: 0.1, completion: 0.3 },
    ModelPrice { model: "llama-3.3-70b", prompt: 0.59, cached: 0.59, completion: 0.79 },
    ModelPrice { model: "deepseek-chat", prompt: 0.27, cached: 0.07, completion: 1.1 },
    ModelPrice { model: "deepseek-reasoner", prompt: 0.55, cached: 0.14, completion: 2.19 },
];

/// Find the price entry for `model`.
pub fn find_price(model: &str) -> Option<&'static ModelPrice> {
    if let Some(exact) = PRICE_TABLE.iter().find(|p| p.model == model) {
        return Some(exact);
    }
    PRICE_TABLE
        .iter()
        .filter(|p| model.starts_with(p.model))
        .max_by_key(|p| p.model.len())
}

/// Usage of one assistant message, or a sum over several.
///
/// Reasoning tokens are billed at the completion rate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UsageCounters {
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub model: String,

    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub cached_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub reasoning_tokens: u64,

    #[serde(default)]
    pub prompt_price: f64,
    #[serde(default)]
    pub cached_price: f64,
    #[serde(default)]
    pub completion_price: f64,
    #[serde(default)]
    pub reasoning_price: f64,

    /// Seconds from request start to the first streamed token.
    #[serde(default)]
    pub first_token_sec: f64,
    /// Seconds from request start to the end of the stream.
    #[serde(default)]
    pub total_sec: f64,
}

impl UsageCounters {
    /// Fill the `*_price` fields from [`PRICE_TABLE`]. Unknown models cost 0.
    pub fn apply_prices(&mut self) {
        let Some(price) = find_price(&self.model) else {
            return;
        };
        let per_token = |rate: f64, n: u64| rate * n as f64 / 1_000_000.0;
        // Cached tokens are a subset of prompt tokens.
        let uncached = self.prompt_tokens.saturating_sub(self.cached_tokens);
        self.prompt_price = per_token(price.prompt, uncached);
        self.cached_price = per_token(price.cached, self.cached_tokens);
        self.completion_price = per_token(price.completion, self.completion_tokens);
        self.reasoning_price = per_token(price.completion, self.reasoning_tokens);
    }

    pub fn total_price(&self) -> f64 {
        self.prompt_price + self.cached_price + self.completion_price + self.reasoning_price
    }

    /// Tokens per second of generated output, if timing is known.
    pub fn tokens_per_sec(&self) -> f64 {
        let gen_time = self.total_sec - self.first_token_sec;
        if gen_time <= 0.0 {
            return 0.0;
        }
        (self.completion_tokens + self.reasoning_tokens) as f64 / gen_time
    }

    /// Accumulate `other` into `self`. Timings add up.
    pub fn add(&mut self, other: &UsageCounters) {
        if self.provider.is_empty() {
            self.provider = other.provider.clone();
        }
        if self.model.is_empty() {
            self.model = other.model.clone();
        }
        self.prompt_tokens += other.prompt_tokens;
        self.cached_tokens += other.cached_tokens;
        self.completion_tokens += other.completion_tokens;
        self.reasoning_tokens += other.reasoning_tokens;
        self.prompt_price += other.prompt_price;
        self.cached_price += other.cached_price;
        self.completion_price += other.completion_price;
        self.reasoning_price += other.reasoning_price;
        self.first_token_sec += other.first_token_sec;
        self.total_sec += other.total_sec;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_lookup_prefers_longest() {
        assert_eq!(find_price("gpt-4o-mini-2024-07-18").unwrap().model, "gpt-4o-mini");
        assert_eq!(find_price("gpt-4o-2024-08-06").unwrap().model, "gpt-4o");
        assert!(find_price("unknown-model").is_none());
    }

    #[test]
    fn reasoning_uses_completion_rate() {
        let mut usage = UsageCounters {
            model: "o3-mini".to_string(),
            prompt_tokens: 1_000_000,
            cached_tokens: 0,
            completion_tokens: 1_000_000,
            reasoning_tokens: 1_000_000,
            ..UsageCounters::default()
        };
        usage.apply_prices();
        assert!((usage.prompt_price - 1.1).abs() < 1e-9);
        assert!((usage.completion_price - 4.4).abs() < 1e-9);
        assert!((usage.reasoning_price - usage.completion_price).abs() < 1e-9);
    }

    #[test]
    fn cached_tokens_are_split_from_prompt() {
        let mut usage = UsageCounters {
            model: "gpt-4o".to_string(),
            prompt_tokens: 2_000_000,
            cached_tokens: 1_000_000,
            ..UsageCounters::default()
        };
        usage.apply_prices();
        assert!((usage.prompt_price - 2.5).abs() < 1e-9);
        assert!((usage.cached_price - 1.25).abs() < 1e-9);
    }

    #[test]
    fn add_accumulates_counts_and_time() {
        let mut total = UsageCounters::default();
        let one = UsageCounters {
            model: "gpt-4o".to_string(),
            prompt_tokens: 10,
            completion_tokens: 5,
            first_token_sec: 0.5,
            total_sec: 2.0,
            ..UsageCounters::default()
        };
        total.add(&one);
        total.add(&one);
        assert_eq!(total.model, "gpt-4o");
        assert_eq!(total.prompt_tokens, 20);
        assert_eq!(total.completion_tokens, 10);
        assert!((total.total_sec - 4.0).abs() < 1e-9);
    }

    #[test]
    fn tokens_per_sec_excludes_first_token_latency() {
        let usage = UsageCounters {
            completion_tokens: 100,
            first_token_sec: 1.0,
            total_sec: 3.0,
            ..UsageCounters::default()
        };
        assert!((usage.tokens_per_sec() - 50.0).abs() < 1e-9);
    }
}

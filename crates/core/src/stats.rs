use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::ModelPricing;

/// Per-chat running totals. Fields missing on disk read as zero.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Statistics {
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub total_time: f64,
    pub request_count: u64,
}

impl Statistics {
    pub fn record(
        &mut self,
        input_tokens: u64,
        output_tokens: u64,
        total_tokens: u64,
        cost: Option<f64>,
        elapsed_secs: f64,
    ) {
        self.total_input_tokens = self.total_input_tokens.saturating_add(input_tokens);
        self.total_output_tokens = self.total_output_tokens.saturating_add(output_tokens);
        self.total_tokens = self.total_tokens.saturating_add(total_tokens);
        if let Some(c) = cost {
            if c.is_finite() && c > 0.0 {
                self.total_cost += c;
            }
        }
        if elapsed_secs.is_finite() && elapsed_secs > 0.0 {
            self.total_time += elapsed_secs;
        }
        self.request_count = self.request_count.saturating_add(1);
    }
}

/// `None` when the model has no pricing entry.
pub fn calculate_cost(
    pricing: &BTreeMap<String, ModelPricing>,
    model: &str,
    input_tokens: u64,
    output_tokens: u64,
) -> Option<f64> {
    let p = pricing.get(model)?;
    Some(
        (input_tokens as f64 / 1_000_000.0) * p.input
            + (output_tokens as f64 / 1_000_000.0) * p.output,
    )
}

pub fn format_statistics(
    input_tokens: u64,
    output_tokens: u64,
    total_tokens: u64,
    cost: Option<f64>,
    elapsed_secs: f64,
) -> String {
    let cost = match cost {
        Some(c) => format!("${:.6}", c),
        None => "n/a".to_string(),
    };
    format!(
        "Tokens: {} ({} in / {} out) | Cost: {} | Time: {:.2}s",
        total_tokens, input_tokens, output_tokens, cost, elapsed_secs
    )
}

/// `1234567` -> `1,234,567`.
pub fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GlobalConfig;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn cost_is_linear_in_tokens() {
        let pricing = GlobalConfig::default().pricing;
        let cost = calculate_cost(&pricing, "gpt-5.1", 1000, 2000).unwrap();
        let expected = (1000.0 / 1_000_000.0) * 2.50 + (2000.0 / 1_000_000.0) * 10.00;
        assert!(approx(cost, expected));

        let doubled = calculate_cost(&pricing, "gpt-5.1", 2000, 4000).unwrap();
        assert!(approx(doubled, 2.0 * cost));

        let large = calculate_cost(&pricing, "gpt-5.1", 1_000_000, 2_000_000).unwrap();
        assert!(approx(large, 22.5));
    }

    #[test]
    fn cost_zero_tokens_and_unknown_model() {
        let pricing = GlobalConfig::default().pricing;
        assert_eq!(calculate_cost(&pricing, "gpt-5.1", 0, 0), Some(0.0));
        assert_eq!(calculate_cost(&pricing, "unknown-model", 1000, 2000), None);
    }

    #[test]
    fn format_statistics_line() {
        let line = format_statistics(100, 200, 300, Some(0.123456), 1.5);
        assert!(line.contains("Tokens: 300 (100 in / 200 out)"));
        assert!(line.contains("Cost: $0.123456"));
        assert!(line.contains("Time: 1.50s"));
        assert!(format_statistics(1, 2, 3, None, 0.0).contains("Cost: n/a"));
    }

    #[test]
    fn record_accumulates_monotonically() {
        let mut s = Statistics::default();
        s.record(100, 200, 300, Some(0.5), 1.0);
        s.record(50, 75, 125, Some(0.25), 0.5);
        assert_eq!(s.total_input_tokens, 150);
        assert_eq!(s.total_output_tokens, 275);
        assert_eq!(s.total_tokens, 425);
        assert!(approx(s.total_cost, 0.75));
        assert!(approx(s.total_time, 1.5));
        assert_eq!(s.request_count, 2);

        s.record(0, 0, 0, None, 0.0);
        assert!(approx(s.total_cost, 0.75));
        assert_eq!(s.request_count, 3);
    }

    #[test]
    fn record_saturates_at_the_counter_limit() {
        let mut s: Statistics =
            serde_json::from_str(r#"{"total_tokens": 18446744073709551615, "request_count": 18446744073709551615}"#)
                .unwrap();
        s.record(1, 1, 2, None, 0.1);
        assert_eq!(s.total_tokens, u64::MAX);
        assert_eq!(s.request_count, u64::MAX);
        assert_eq!(s.total_input_tokens, 1);
    }

    #[test]
    fn missing_fields_default_to_zero() {
        let s: Statistics = serde_json::from_str(r#"{"total_input_tokens": 100}"#).unwrap();
        assert_eq!(s.total_input_tokens, 100);
        assert_eq!(s.total_output_tokens, 0);
        assert_eq!(s.request_count, 0);
    }

    #[test]
    fn thousands_grouping() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1000), "1,000");
        assert_eq!(group_thousands(1234567), "1,234,567");
    }
}

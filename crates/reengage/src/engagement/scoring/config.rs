use serde::{Deserialize, Serialize};

/// Weights and thresholds for the engagement heuristic.
///
/// The defaults are fixed design constants; changing them changes every score, so
/// they are only overridden deliberately (the cooldown window follows `COOLDOWN_DAYS`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub base_score: f64,
    pub recency_tiers: Vec<RecencyTier>,
    pub order_count_cap: f64,
    pub order_count_weight: f64,
    pub order_value_cap: f64,
    pub order_value_weight: f64,
    pub frequency_window_days: i64,
    pub frequency_penalty: f64,
    pub no_email_days: i64,
    pub min_score: f64,
    pub max_score: f64,
}

/// Penalty applied once more than `after_days` have passed since the last order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecencyTier {
    pub after_days: i64,
    pub penalty: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            base_score: 100.0,
            recency_tiers: vec![
                RecencyTier {
                    after_days: 90,
                    penalty: 40.0,
                },
                RecencyTier {
                    after_days: 60,
                    penalty: 30.0,
                },
                RecencyTier {
                    after_days: 30,
                    penalty: 15.0,
                },
            ],
            order_count_cap: 10.0,
            order_count_weight: 15.0,
            order_value_cap: 200.0,
            order_value_weight: 10.0,
            frequency_window_days: 7,
            frequency_penalty: 10.0,
            no_email_days: 365,
            min_score: 0.0,
            max_score: 100.0,
        }
    }
}

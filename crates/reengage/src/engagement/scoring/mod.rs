mod config;
mod rules;

pub use config::{RecencyTier, ScoringConfig};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::domain::{CustomerId, CustomerSnapshot};

/// Stateless calculator that applies the heuristic weights to a snapshot.
#[derive(Debug, Clone)]
pub struct ScoreCalculator {
    config: ScoringConfig,
}

impl ScoreCalculator {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Score a snapshot as of `now`. Never fails; malformed timestamps degrade.
    pub fn compute(&self, snapshot: &CustomerSnapshot, now: DateTime<Utc>) -> EngagementScore {
        let (components, value, signals) = rules::score_snapshot(snapshot, &self.config, now);

        debug!(
            customer_id = %snapshot.customer_id,
            score = value,
            days_since_last_order = signals.days_since_last_order,
            days_since_last_email = signals.days_since_last_email,
            "computed engagement score"
        );

        EngagementScore {
            customer_id: snapshot.customer_id.clone(),
            value,
            computed_at: now,
            components,
        }
    }
}

impl Default for ScoreCalculator {
    fn default() -> Self {
        Self::new(ScoringConfig::default())
    }
}

/// Which part of the heuristic a component came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreFactor {
    Baseline,
    OrderRecency,
    OrderCount,
    OrderValue,
    EmailFrequency,
    Clamp,
}

/// Discrete contribution to a score, kept for audits and the CLI breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreComponent {
    pub factor: ScoreFactor,
    pub delta: f64,
    pub note: String,
}

/// Score in [0, 100]; lower means more at risk of disengagement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngagementScore {
    pub customer_id: CustomerId,
    pub value: f64,
    pub computed_at: DateTime<Utc>,
    pub components: Vec<ScoreComponent>,
}

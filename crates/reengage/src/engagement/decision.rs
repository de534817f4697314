use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::clock::{elapsed_days, parse_timestamp};

/// Send gate configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecisionConfig {
    pub score_threshold: f64,
    pub cooldown_days: i64,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            score_threshold: 50.0,
            cooldown_days: 7,
        }
    }
}

/// Verdict of the send gate together with the reason it was reached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum SendDecision {
    Send,
    AboveThreshold {
        score: f64,
        threshold: f64,
    },
    CoolingDown {
        days_since_last_email: i64,
        cooldown_days: i64,
    },
}

impl SendDecision {
    pub fn should_send(&self) -> bool {
        matches!(self, SendDecision::Send)
    }

    pub fn summary(&self) -> String {
        match self {
            SendDecision::Send => "customer at risk, email scheduled".to_string(),
            SendDecision::AboveThreshold { score, threshold } => format!(
                "score {:.2} above threshold {:.2}, customer engaged",
                score, threshold
            ),
            SendDecision::CoolingDown {
                days_since_last_email,
                cooldown_days,
            } => format!(
                "last email {days_since_last_email} day(s) ago, cooldown is {cooldown_days} day(s)"
            ),
        }
    }
}

/// Combine a score with the cooldown state.
///
/// The score check runs first; a last-email timestamp that does not parse counts
/// as no previous email.
pub fn evaluate(
    score: f64,
    last_email_date: Option<&str>,
    config: &DecisionConfig,
    now: DateTime<Utc>,
) -> SendDecision {
    if score > config.score_threshold {
        return SendDecision::AboveThreshold {
            score,
            threshold: config.score_threshold,
        };
    }

    if let Some(last_email) = last_email_date.and_then(parse_timestamp) {
        let days_since_last_email = elapsed_days(last_email, now);
        if days_since_last_email < config.cooldown_days {
            return SendDecision::CoolingDown {
                days_since_last_email,
                cooldown_days: config.cooldown_days,
            };
        }
    }

    SendDecision::Send
}

pub fn should_send(
    score: f64,
    last_email_date: Option<&str>,
    cooldown_days: i64,
    score_threshold: f64,
    now: DateTime<Utc>,
) -> bool {
    let config = DecisionConfig {
        score_threshold,
        cooldown_days,
    };
    evaluate(score, last_email_date, &config, now).should_send()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0)
            .single()
            .expect("valid instant")
    }

    fn days_ago(days: i64) -> String {
        (now() - Duration::days(days)).to_rfc3339()
    }

    #[test]
    fn engaged_customers_are_never_emailed() {
        for score in [50.01, 62.5, 100.0] {
            for last_email in [None, Some(days_ago(1)), Some(days_ago(400))] {
                assert!(!should_send(score, last_email.as_deref(), 7, 50.0, now()));
            }
        }
    }

    #[test]
    fn threshold_is_inclusive_for_sending() {
        assert!(should_send(50.0, None, 7, 50.0, now()));
        assert!(should_send(10.0, None, 7, 50.0, now()));
    }

    #[test]
    fn cooldown_blocks_regardless_of_score() {
        for score in [0.0, 10.0, 49.9] {
            for days in 0..7 {
                let last_email = days_ago(days);
                let decision =
                    evaluate(score, Some(&last_email), &DecisionConfig::default(), now());
                assert_eq!(
                    decision,
                    SendDecision::CoolingDown {
                        days_since_last_email: days,
                        cooldown_days: 7
                    }
                );
            }
        }
    }

    #[test]
    fn cooldown_expires_on_the_boundary_day() {
        assert!(should_send(10.0, Some(&days_ago(7)), 7, 50.0, now()));
    }

    #[test]
    fn unparsable_last_email_counts_as_none() {
        assert!(should_send(10.0, Some("garbage"), 7, 50.0, now()));
    }

    #[test]
    fn summary_names_the_reason() {
        let decision = evaluate(62.5, None, &DecisionConfig::default(), now());
        assert!(decision.summary().contains("62.50"));
        assert!(!decision.should_send());
    }
}

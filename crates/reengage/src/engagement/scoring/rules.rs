use chrono::{DateTime, Utc};
use tracing::debug;

use super::super::clock::{elapsed_days, parse_timestamp};
use super::super::domain::CustomerSnapshot;
use super::config::ScoringConfig;
use super::{ScoreComponent, ScoreFactor};

pub(crate) struct ScoreSignals {
    pub days_since_last_order: i64,
    pub days_since_last_email: i64,
}

pub(crate) fn score_snapshot(
    snapshot: &CustomerSnapshot,
    config: &ScoringConfig,
    now: DateTime<Utc>,
) -> (Vec<ScoreComponent>, f64, ScoreSignals) {
    let mut components = Vec::new();
    let mut total = config.base_score;
    components.push(ScoreComponent {
        factor: ScoreFactor::Baseline,
        delta: config.base_score,
        note: "starting score".to_string(),
    });

    let days_since_last_order = match parse_timestamp(&snapshot.last_order_date) {
        Some(last_order) => elapsed_days(last_order, now),
        None => {
            debug!(
                customer_id = %snapshot.customer_id,
                raw = %snapshot.last_order_date,
                "unparsable last order date, treating as today"
            );
            0
        }
    };

    let tier = config
        .recency_tiers
        .iter()
        .filter(|tier| days_since_last_order > tier.after_days)
        .max_by_key(|tier| tier.after_days);
    match tier {
        Some(tier) => {
            components.push(ScoreComponent {
                factor: ScoreFactor::OrderRecency,
                delta: -tier.penalty,
                note: format!(
                    "{days_since_last_order} days since last order exceeds {} days",
                    tier.after_days
                ),
            });
            total -= tier.penalty;
        }
        None => components.push(ScoreComponent {
            factor: ScoreFactor::OrderRecency,
            delta: 0.0,
            note: format!("recent order {days_since_last_order} days ago"),
        }),
    }

    let order_count_factor = (f64::from(snapshot.order_count) / config.order_count_cap).min(1.0);
    let order_count_bonus = order_count_factor * config.order_count_weight;
    components.push(ScoreComponent {
        factor: ScoreFactor::OrderCount,
        delta: order_count_bonus,
        note: format!(
            "{} orders (factor {:.2})",
            snapshot.order_count, order_count_factor
        ),
    });
    total += order_count_bonus;

    let order_value_factor = (snapshot.average_order_value / config.order_value_cap).min(1.0);
    let order_value_bonus = order_value_factor * config.order_value_weight;
    components.push(ScoreComponent {
        factor: ScoreFactor::OrderValue,
        delta: order_value_bonus,
        note: format!(
            "average order value {:.2} (factor {:.2})",
            snapshot.average_order_value, order_value_factor
        ),
    });
    total += order_value_bonus;

    let days_since_last_email = snapshot
        .last_email_date
        .as_deref()
        .and_then(parse_timestamp)
        .map(|sent| elapsed_days(sent, now))
        .unwrap_or(config.no_email_days);

    if days_since_last_email < config.frequency_window_days {
        components.push(ScoreComponent {
            factor: ScoreFactor::EmailFrequency,
            delta: -config.frequency_penalty,
            note: format!(
                "emailed {days_since_last_email} days ago, inside {} day window",
                config.frequency_window_days
            ),
        });
        total -= config.frequency_penalty;
    }

    let clamped = total.clamp(config.min_score, config.max_score);
    if clamped != total {
        components.push(ScoreComponent {
            factor: ScoreFactor::Clamp,
            delta: clamped - total,
            note: format!("clamped {total:.2} into [{}, {}]", config.min_score, config.max_score),
        });
    }

    let signals = ScoreSignals {
        days_since_last_order,
        days_since_last_email,
    };

    (components, clamped, signals)
}

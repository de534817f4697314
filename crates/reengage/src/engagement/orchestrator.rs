use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::clock::{Clock, SystemClock};
use super::content::{ContentError, ContentGenerator, GeneratedContent};
use super::decision::{self, DecisionConfig, SendDecision};
use super::delivery::{DeliveryError, MailDelivery, OutboundEmail};
use super::domain::{
    CustomerFacts, CustomerId, CustomerSnapshot, EmailArtifact, EmailId, EmailStatus,
};
use super::scoring::{ScoreCalculator, ScoringConfig};
use super::store::{RecordStore, StoreError};

/// What to persist for a customer that has never been scored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnscoredPolicy {
    /// Treat the customer as at risk with a fixed score.
    AtRiskDefault(f64),
    /// Persist the calculator's output.
    Computed,
}

impl Default for UnscoredPolicy {
    fn default() -> Self {
        Self::AtRiskDefault(10.0)
    }
}

/// Exponential backoff applied to unavailable generation calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    /// Delay after the given failed attempt (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_backoff.saturating_mul(1u32 << exponent)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorSettings {
    pub scoring: ScoringConfig,
    pub decision: DecisionConfig,
    pub unscored: UnscoredPolicy,
    pub retry: RetryPolicy,
    pub generation_timeout: Duration,
    pub delivery_timeout: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            scoring: ScoringConfig::default(),
            decision: DecisionConfig::default(),
            unscored: UnscoredPolicy::default(),
            retry: RetryPolicy::default(),
            generation_timeout: Duration::from_secs(30),
            delivery_timeout: Duration::from_secs(10),
        }
    }
}

/// Result of processing one customer-affecting event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessOutcome {
    pub customer_id: CustomerId,
    pub computed_score: f64,
    pub decision_score: f64,
    pub score_bootstrapped: bool,
    pub decision: SendDecision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<EmailDispatch>,
}

/// Identity and final status of the artifact created for an event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmailDispatch {
    pub email_id: EmailId,
    pub status: EmailStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

/// Write that failed, so callers know which commits already happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteStep {
    ScoreBootstrap,
    ScoreRefresh,
    EmailInsert,
    EmailStatus,
    LastEmail,
}

impl std::fmt::Display for WriteStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            WriteStep::ScoreBootstrap => "score bootstrap",
            WriteStep::ScoreRefresh => "score refresh",
            WriteStep::EmailInsert => "email insert",
            WriteStep::EmailStatus => "email status update",
            WriteStep::LastEmail => "last email update",
        };
        f.write_str(label)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngagementError {
    #[error("customer {0} not found")]
    CustomerNotFound(CustomerId),
    #[error(transparent)]
    Generation(#[from] ContentError),
    #[error("store write failed during {step}: {source}")]
    StoreWrite {
        step: WriteStep,
        #[source]
        source: StoreError,
    },
    #[error("store read failed: {0}")]
    StoreRead(#[source] StoreError),
}

/// Drives score, decision, generation, persistence and delivery for one customer.
pub struct EngagementOrchestrator<S: ?Sized, G: ?Sized, D: ?Sized> {
    store: Arc<S>,
    generator: Arc<G>,
    delivery: Arc<D>,
    calculator: ScoreCalculator,
    settings: OrchestratorSettings,
    clock: Arc<dyn Clock>,
}

impl<S, G, D> EngagementOrchestrator<S, G, D>
where
    S: RecordStore + ?Sized,
    G: ContentGenerator + ?Sized,
    D: MailDelivery + ?Sized,
{
    pub fn new(
        store: Arc<S>,
        generator: Arc<G>,
        delivery: Arc<D>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self::with_clock(store, generator, delivery, settings, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<S>,
        generator: Arc<G>,
        delivery: Arc<D>,
        settings: OrchestratorSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let calculator = ScoreCalculator::new(settings.scoring.clone());
        Self {
            store,
            generator,
            delivery,
            calculator,
            settings,
            clock,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    pub fn calculator(&self) -> &ScoreCalculator {
        &self.calculator
    }

    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }

    /// Run the full per-event contract for a resolved snapshot.
    ///
    /// Each write commits on its own; a failure leaves earlier writes in place.
    pub async fn process(
        &self,
        snapshot: &CustomerSnapshot,
    ) -> Result<ProcessOutcome, EngagementError> {
        let now = self.clock.now();
        let customer_id = snapshot.customer_id.clone();
        let computed = self.calculator.compute(snapshot, now);

        let (decision_score, score_bootstrapped) = match snapshot.engagement_score {
            Some(prior) => (prior, false),
            None => {
                let initial = match self.settings.unscored {
                    UnscoredPolicy::AtRiskDefault(score) => score,
                    UnscoredPolicy::Computed => computed.value,
                };
                let stored = self
                    .store
                    .bootstrap_score(&customer_id, initial)
                    .await
                    .map_err(|source| EngagementError::StoreWrite {
                        step: WriteStep::ScoreBootstrap,
                        source,
                    })?;
                (stored, true)
            }
        };

        let decision = decision::evaluate(
            decision_score,
            snapshot.last_email_date.as_deref(),
            &self.settings.decision,
            now,
        );

        info!(
            customer_id = %customer_id,
            computed_score = computed.value,
            decision_score,
            score_bootstrapped,
            send = decision.should_send(),
            "evaluated customer engagement"
        );

        // The decision above used the known score; later events see the fresh one.
        if decision_score != computed.value {
            self.store
                .set_engagement_score(&customer_id, computed.value)
                .await
                .map_err(|source| EngagementError::StoreWrite {
                    step: WriteStep::ScoreRefresh,
                    source,
                })?;
        }

        let mut outcome = ProcessOutcome {
            customer_id,
            computed_score: computed.value,
            decision_score,
            score_bootstrapped,
            decision,
            email: None,
        };

        if !outcome.decision.should_send() {
            debug!(
                customer_id = %outcome.customer_id,
                reason = %outcome.decision.summary(),
                "no email sent"
            );
            return Ok(outcome);
        }

        let content = self.generate_with_retry(&snapshot.facts()).await?;
        let dispatch = self
            .persist_and_deliver(snapshot, decision_score, content)
            .await?;
        outcome.email = Some(dispatch);
        Ok(outcome)
    }

    async fn generate_with_retry(
        &self,
        facts: &CustomerFacts,
    ) -> Result<GeneratedContent, EngagementError> {
        if !self.generator.is_configured() {
            warn!("content generation is not configured, skipping retries");
            return Err(ContentError::Unavailable(
                "generation credential not configured".to_string(),
            )
            .into());
        }

        let max_attempts = self.settings.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let result = tokio::time::timeout(
                self.settings.generation_timeout,
                self.generator.generate(facts),
            )
            .await
            .unwrap_or_else(|_| {
                Err(ContentError::Unavailable(format!(
                    "timed out after {:?}",
                    self.settings.generation_timeout
                )))
            });

            match result {
                Ok(content) => return Ok(content),
                Err(ContentError::Unavailable(reason)) if attempt < max_attempts => {
                    let delay = self.settings.retry.backoff_for(attempt);
                    warn!(attempt, ?delay, %reason, "content generation unavailable, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    warn!(attempt, error = %err, "content generation failed");
                    return Err(err.into());
                }
            }
        }
    }

    async fn persist_and_deliver(
        &self,
        snapshot: &CustomerSnapshot,
        score: f64,
        content: GeneratedContent,
    ) -> Result<EmailDispatch, EngagementError> {
        let GeneratedContent { subject, body } = content;
        let artifact = EmailArtifact::generated(
            snapshot.customer_id.clone(),
            subject.clone(),
            body.clone(),
            score,
            self.clock.now(),
        );
        let email_id = artifact.email_id.clone();

        self.store
            .insert_email(artifact)
            .await
            .map_err(|source| EngagementError::StoreWrite {
                step: WriteStep::EmailInsert,
                source,
            })?;
        metrics::counter!("reengage_emails_total", "status" => EmailStatus::Generated.label())
            .increment(1);

        let outbound = OutboundEmail {
            to: snapshot.email.clone(),
            subject,
            html_body: body,
        };
        let delivered = tokio::time::timeout(
            self.settings.delivery_timeout,
            self.delivery.send(&outbound),
        )
        .await
        .unwrap_or(Err(DeliveryError::TimedOut(self.settings.delivery_timeout)));

        let (status, failure) = match delivered {
            Ok(()) => (EmailStatus::Sent, None),
            Err(err) => {
                warn!(
                    customer_id = %snapshot.customer_id,
                    email_id = %email_id,
                    error = %err,
                    "email delivery failed"
                );
                (EmailStatus::Failed, Some(err.to_string()))
            }
        };

        self.store
            .update_email_status(&email_id, status)
            .await
            .map_err(|source| EngagementError::StoreWrite {
                step: WriteStep::EmailStatus,
                source,
            })?;
        metrics::counter!("reengage_emails_total", "status" => status.label()).increment(1);

        if status == EmailStatus::Sent {
            self.store
                .record_email_sent(&snapshot.customer_id, self.clock.now())
                .await
                .map_err(|source| EngagementError::StoreWrite {
                    step: WriteStep::LastEmail,
                    source,
                })?;
            info!(
                customer_id = %snapshot.customer_id,
                email_id = %email_id,
                "re-engagement email sent"
            );
        }

        Ok(EmailDispatch {
            email_id,
            status,
            failure,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_from_initial_delay() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_for(1), Duration::from_secs(1));
        assert_eq!(policy.backoff_for(2), Duration::from_secs(2));
        assert_eq!(policy.backoff_for(3), Duration::from_secs(4));
    }

    #[test]
    fn backoff_saturates_for_large_attempts() {
        let policy = RetryPolicy {
            max_attempts: 100,
            initial_backoff: Duration::from_millis(250),
        };
        assert_eq!(policy.backoff_for(40), policy.backoff_for(17));
    }

    #[test]
    fn default_policy_treats_unscored_customers_as_at_risk() {
        assert_eq!(
            OrchestratorSettings::default().unscored,
            UnscoredPolicy::AtRiskDefault(10.0)
        );
    }

    #[test]
    fn write_step_names_the_failed_write() {
        let err = EngagementError::StoreWrite {
            step: WriteStep::EmailInsert,
            source: StoreError::Conflict,
        };
        assert_eq!(
            err.to_string(),
            "store write failed during email insert: record already exists"
        );
    }
}

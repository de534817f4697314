#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

use reengage::engagement::{
    Clock, ContentError, ContentGenerator, CustomerFacts, CustomerId, CustomerSnapshot,
    CustomerStore, DeliveryError, EmailArtifact, EmailId, EmailStatus, EmailStore,
    EngagementOrchestrator, FixedClock, GeneratedContent, InMemoryStore, MailDelivery,
    OrchestratorSettings, OutboundEmail, RetryPolicy, StoreError,
};

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0)
        .single()
        .expect("valid instant")
}

pub fn days_ago(days: i64) -> String {
    (now() - Duration::days(days)).to_rfc3339()
}

pub fn snapshot(id: &str, order_count: u32, aov: f64, days_since_order: i64) -> CustomerSnapshot {
    CustomerSnapshot {
        customer_id: CustomerId(id.to_string()),
        email: format!("{id}@example.com"),
        name: "Ada Lovelace".to_string(),
        last_order_date: days_ago(days_since_order),
        order_count,
        average_order_value: aov,
        preferred_categories: vec!["outerwear".to_string()],
        engagement_score: None,
        last_email_date: None,
        created_at: "2024-01-01T00:00:00Z".to_string(),
        updated_at: "2025-01-01T00:00:00Z".to_string(),
    }
}

pub fn settings() -> OrchestratorSettings {
    OrchestratorSettings {
        retry: RetryPolicy {
            max_attempts: 3,
            initial_backoff: std::time::Duration::from_millis(10),
        },
        ..OrchestratorSettings::default()
    }
}

pub fn content() -> GeneratedContent {
    GeneratedContent {
        subject: "We miss you, Ada".to_string(),
        body: "<p>New outerwear just landed.</p>".to_string(),
    }
}

/// Generator replaying scripted results, then succeeding.
#[derive(Default)]
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<Result<GeneratedContent, ContentError>>>,
    calls: AtomicUsize,
    panic_on_call: bool,
    missing_credential: bool,
}

impl ScriptedGenerator {
    pub fn succeeding() -> Self {
        Self::default()
    }

    pub fn with_script(results: Vec<Result<GeneratedContent, ContentError>>) -> Self {
        Self {
            script: Mutex::new(results.into()),
            ..Self::default()
        }
    }

    pub fn panicking() -> Self {
        Self {
            panic_on_call: true,
            ..Self::default()
        }
    }

    pub fn unconfigured() -> Self {
        Self {
            missing_credential: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentGenerator for ScriptedGenerator {
    async fn generate(&self, _facts: &CustomerFacts) -> Result<GeneratedContent, ContentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.panic_on_call {
            panic!("generator exploded");
        }
        self.script
            .lock()
            .expect("script mutex poisoned")
            .pop_front()
            .unwrap_or_else(|| Ok(content()))
    }

    fn is_configured(&self) -> bool {
        !self.missing_credential
    }
}

/// Delivery double that records every message it accepts.
#[derive(Default)]
pub struct RecordingDelivery {
    sent: Mutex<Vec<OutboundEmail>>,
    failure: Option<DeliveryError>,
}

impl RecordingDelivery {
    pub fn failing(error: DeliveryError) -> Self {
        Self {
            failure: Some(error),
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<OutboundEmail> {
        self.sent.lock().expect("delivery mutex poisoned").clone()
    }
}

#[async_trait]
impl MailDelivery for RecordingDelivery {
    async fn send(&self, email: &OutboundEmail) -> Result<(), DeliveryError> {
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        self.sent
            .lock()
            .expect("delivery mutex poisoned")
            .push(email.clone());
        Ok(())
    }
}

/// Which store write the flaky store refuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokenWrite {
    Bootstrap,
    ScoreRefresh,
    InsertEmail,
    StatusUpdate,
    LastEmail,
}

/// In-memory store that fails one kind of write.
pub struct FlakyStore {
    pub inner: InMemoryStore,
    broken: BrokenWrite,
}

impl FlakyStore {
    pub fn new(broken: BrokenWrite) -> Self {
        Self {
            inner: InMemoryStore::default(),
            broken,
        }
    }

    fn check(&self, write: BrokenWrite) -> Result<(), StoreError> {
        if self.broken == write {
            Err(StoreError::Unavailable("write throttled".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CustomerStore for FlakyStore {
    async fn get_customer(&self, id: &CustomerId) -> Result<Option<CustomerSnapshot>, StoreError> {
        self.inner.get_customer(id).await
    }

    async fn put_customer(&self, snapshot: CustomerSnapshot) -> Result<(), StoreError> {
        self.inner.put_customer(snapshot).await
    }

    async fn bootstrap_score(&self, id: &CustomerId, score: f64) -> Result<f64, StoreError> {
        self.check(BrokenWrite::Bootstrap)?;
        self.inner.bootstrap_score(id, score).await
    }

    async fn set_engagement_score(&self, id: &CustomerId, score: f64) -> Result<(), StoreError> {
        self.check(BrokenWrite::ScoreRefresh)?;
        self.inner.set_engagement_score(id, score).await
    }

    async fn record_email_sent(
        &self,
        id: &CustomerId,
        sent_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.check(BrokenWrite::LastEmail)?;
        self.inner.record_email_sent(id, sent_at).await
    }

    async fn list_customers(&self) -> Result<Vec<CustomerSnapshot>, StoreError> {
        self.inner.list_customers().await
    }
}

#[async_trait]
impl EmailStore for FlakyStore {
    async fn insert_email(&self, artifact: EmailArtifact) -> Result<(), StoreError> {
        self.check(BrokenWrite::InsertEmail)?;
        self.inner.insert_email(artifact).await
    }

    async fn get_email(&self, id: &EmailId) -> Result<Option<EmailArtifact>, StoreError> {
        self.inner.get_email(id).await
    }

    async fn update_email_status(
        &self,
        id: &EmailId,
        status: EmailStatus,
    ) -> Result<EmailArtifact, StoreError> {
        self.check(BrokenWrite::StatusUpdate)?;
        self.inner.update_email_status(id, status).await
    }

    async fn emails_for_customer(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Vec<EmailArtifact>, StoreError> {
        self.inner.emails_for_customer(customer_id).await
    }

    async fn list_emails(&self) -> Result<Vec<EmailArtifact>, StoreError> {
        self.inner.list_emails().await
    }
}

pub struct Harness<S> {
    pub store: Arc<S>,
    pub generator: Arc<ScriptedGenerator>,
    pub delivery: Arc<RecordingDelivery>,
    pub clock: Arc<FixedClock>,
    pub orchestrator: Arc<EngagementOrchestrator<S, ScriptedGenerator, RecordingDelivery>>,
}

pub fn harness_with<S>(
    store: S,
    generator: ScriptedGenerator,
    delivery: RecordingDelivery,
) -> Harness<S>
where
    S: CustomerStore + EmailStore + 'static,
{
    let store = Arc::new(store);
    let generator = Arc::new(generator);
    let delivery = Arc::new(delivery);
    let clock = Arc::new(FixedClock::new(now()));
    let orchestrator = Arc::new(EngagementOrchestrator::with_clock(
        store.clone(),
        generator.clone(),
        delivery.clone(),
        settings(),
        clock.clone() as Arc<dyn Clock>,
    ));
    Harness {
        store,
        generator,
        delivery,
        clock,
        orchestrator,
    }
}

pub fn harness() -> Harness<InMemoryStore> {
    harness_with(
        InMemoryStore::default(),
        ScriptedGenerator::succeeding(),
        RecordingDelivery::default(),
    )
}

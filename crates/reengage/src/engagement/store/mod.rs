//! Persistence seams for customers and generated emails.
//!
//! Consistency contract: every operation is atomic for a single key and nothing more.
//! Field updates (`set_engagement_score`, `record_email_sent`) overwrite only their
//! field, last write wins. The two conditional operations, `bootstrap_score` and
//! `insert_email`, are the only compare-and-set primitives. Two events for the same
//! customer processed concurrently may both pass the send gate; callers needing
//! stronger guarantees must serialize per customer upstream.

mod memory;

pub use memory::InMemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::domain::{CustomerId, CustomerSnapshot, EmailArtifact, EmailId, EmailStatus};

#[async_trait]
pub trait CustomerStore: Send + Sync {
    async fn get_customer(&self, id: &CustomerId) -> Result<Option<CustomerSnapshot>, StoreError>;

    /// Insert or replace the whole record.
    async fn put_customer(&self, snapshot: CustomerSnapshot) -> Result<(), StoreError>;

    /// Write `score` only when the record has no score yet; returns the stored value.
    async fn bootstrap_score(&self, id: &CustomerId, score: f64) -> Result<f64, StoreError>;

    async fn set_engagement_score(&self, id: &CustomerId, score: f64) -> Result<(), StoreError>;

    async fn record_email_sent(
        &self,
        id: &CustomerId,
        sent_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn list_customers(&self) -> Result<Vec<CustomerSnapshot>, StoreError>;
}

#[async_trait]
pub trait EmailStore: Send + Sync {
    /// Conditional insert; an existing `email_id` yields `StoreError::Conflict`.
    async fn insert_email(&self, artifact: EmailArtifact) -> Result<(), StoreError>;

    async fn get_email(&self, id: &EmailId) -> Result<Option<EmailArtifact>, StoreError>;

    /// Status-only update. Every other field stays as written at insert time.
    async fn update_email_status(
        &self,
        id: &EmailId,
        status: EmailStatus,
    ) -> Result<EmailArtifact, StoreError>;

    async fn emails_for_customer(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Vec<EmailArtifact>, StoreError>;

    async fn list_emails(&self) -> Result<Vec<EmailArtifact>, StoreError>;
}

/// Both collections behind one handle.
pub trait RecordStore: CustomerStore + EmailStore {}

impl<T> RecordStore for T where T: CustomerStore + EmailStore {}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition { from: EmailStatus, to: EmailStatus },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

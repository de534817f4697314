use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier wrapper for customers, keyed the same way as the customer collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerId(pub String);

impl fmt::Display for CustomerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier wrapper for generated emails.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmailId(pub String);

impl EmailId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for EmailId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Read-only copy of a customer record held for the duration of one event.
///
/// Timestamps are kept exactly as received; scoring degrades gracefully when
/// they do not parse instead of rejecting the whole record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerSnapshot {
    #[serde(rename = "userId")]
    pub customer_id: CustomerId,
    pub email: String,
    pub name: String,
    pub last_order_date: String,
    pub order_count: u32,
    pub average_order_value: f64,
    #[serde(default)]
    pub preferred_categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engagement_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_email_date: Option<String>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

impl CustomerSnapshot {
    /// Check the invariants the type system does not already enforce.
    pub fn validate(&self) -> Result<(), SnapshotViolation> {
        if self.customer_id.0.trim().is_empty() {
            return Err(SnapshotViolation::MissingIdentity);
        }
        if self.email.trim().is_empty() {
            return Err(SnapshotViolation::MissingContactAddress);
        }
        if !self.average_order_value.is_finite() || self.average_order_value < 0.0 {
            return Err(SnapshotViolation::NegativeOrderValue(
                self.average_order_value,
            ));
        }
        if let Some(score) = self.engagement_score {
            if !(0.0..=100.0).contains(&score) {
                return Err(SnapshotViolation::ScoreOutOfRange(score));
            }
        }
        Ok(())
    }

    /// Projection handed to the text-generation capability. Carries no identifiers
    /// or contact details.
    pub fn facts(&self) -> CustomerFacts {
        CustomerFacts {
            name: self.name.clone(),
            last_order_date: self.last_order_date.clone(),
            order_count: self.order_count,
            average_order_value: self.average_order_value,
            preferred_categories: self.preferred_categories.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SnapshotViolation {
    #[error("customer identity is empty")]
    MissingIdentity,
    #[error("customer contact address is empty")]
    MissingContactAddress,
    #[error("average order value {0} must be a non-negative number")]
    NegativeOrderValue(f64),
    #[error("engagement score {0} outside 0..=100")]
    ScoreOutOfRange(f64),
}

/// Minimal customer description used to personalise generated content.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerFacts {
    pub name: String,
    pub last_order_date: String,
    pub order_count: u32,
    pub average_order_value: f64,
    pub preferred_categories: Vec<String>,
}

/// Lifecycle of a generated email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmailStatus {
    Generated,
    Sent,
    Opened,
    Clicked,
    Failed,
}

impl EmailStatus {
    pub const fn label(self) -> &'static str {
        match self {
            EmailStatus::Generated => "GENERATED",
            EmailStatus::Sent => "SENT",
            EmailStatus::Opened => "OPENED",
            EmailStatus::Clicked => "CLICKED",
            EmailStatus::Failed => "FAILED",
        }
    }

    pub fn can_transition_to(self, next: EmailStatus) -> bool {
        matches!(
            (self, next),
            (EmailStatus::Generated, EmailStatus::Sent)
                | (EmailStatus::Generated, EmailStatus::Failed)
                | (EmailStatus::Sent, EmailStatus::Opened)
                | (EmailStatus::Sent, EmailStatus::Clicked)
                | (EmailStatus::Opened, EmailStatus::Clicked)
        )
    }
}

impl fmt::Display for EmailStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A generated email tied to one customer and one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailArtifact {
    pub email_id: EmailId,
    #[serde(rename = "userId")]
    pub customer_id: CustomerId,
    pub subject: String,
    #[serde(rename = "content")]
    pub body: String,
    pub generated_at: DateTime<Utc>,
    pub engagement_score_at_time: f64,
    pub status: EmailStatus,
    pub created_at: DateTime<Utc>,
}

impl EmailArtifact {
    pub fn generated(
        customer_id: CustomerId,
        subject: String,
        body: String,
        score: f64,
        generated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            email_id: EmailId::generate(),
            customer_id,
            subject,
            body,
            generated_at,
            engagement_score_at_time: score,
            status: EmailStatus::Generated,
            created_at: generated_at,
        }
    }
}

/// Order notification body. Only the owning customer is needed for routing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPayload {
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(rename = "userId")]
    pub customer_id: CustomerId,
    #[serde(default)]
    pub order_date: Option<String>,
    #[serde(default)]
    pub total_value: Option<f64>,
    #[serde(default)]
    pub items: Vec<OrderItem>,
    #[serde(default)]
    pub status: Option<OrderStatus>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub item_id: String,
    pub product_id: String,
    pub name: String,
    pub category: String,
    pub price: f64,
    pub quantity: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Created,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Returned,
}

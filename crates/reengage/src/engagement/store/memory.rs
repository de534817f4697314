use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use tracing::debug;

use super::{CustomerStore, EmailStore, StoreError};
use crate::config::StoreConfig;
use crate::engagement::domain::{
    CustomerId, CustomerSnapshot, EmailArtifact, EmailId, EmailStatus,
};

/// Process-local store backing the worker and the test suites.
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    customers_table: String,
    emails_table: String,
    customers: Arc<Mutex<HashMap<CustomerId, CustomerSnapshot>>>,
    emails: Arc<Mutex<HashMap<EmailId, EmailArtifact>>>,
}

impl InMemoryStore {
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            customers_table: config.customers_table.clone(),
            emails_table: config.emails_table.clone(),
            customers: Arc::default(),
            emails: Arc::default(),
        }
    }

    pub fn customers_table(&self) -> &str {
        &self.customers_table
    }

    pub fn emails_table(&self) -> &str {
        &self.emails_table
    }

    fn customers(
        &self,
    ) -> Result<MutexGuard<'_, HashMap<CustomerId, CustomerSnapshot>>, StoreError> {
        self.customers.lock().map_err(|_| {
            StoreError::Unavailable(format!("{} table lock poisoned", self.customers_table))
        })
    }

    fn emails(&self) -> Result<MutexGuard<'_, HashMap<EmailId, EmailArtifact>>, StoreError> {
        self.emails.lock().map_err(|_| {
            StoreError::Unavailable(format!("{} table lock poisoned", self.emails_table))
        })
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(&StoreConfig::default())
    }
}

#[async_trait]
impl CustomerStore for InMemoryStore {
    async fn get_customer(&self, id: &CustomerId) -> Result<Option<CustomerSnapshot>, StoreError> {
        Ok(self.customers()?.get(id).cloned())
    }

    async fn put_customer(&self, snapshot: CustomerSnapshot) -> Result<(), StoreError> {
        self.customers()?
            .insert(snapshot.customer_id.clone(), snapshot);
        Ok(())
    }

    async fn bootstrap_score(&self, id: &CustomerId, score: f64) -> Result<f64, StoreError> {
        let mut guard = self.customers()?;
        let record = guard.get_mut(id).ok_or(StoreError::NotFound)?;
        match record.engagement_score {
            Some(existing) => {
                debug!(customer_id = %id, existing, "score already present, bootstrap skipped");
                Ok(existing)
            }
            None => {
                record.engagement_score = Some(score);
                Ok(score)
            }
        }
    }

    async fn set_engagement_score(&self, id: &CustomerId, score: f64) -> Result<(), StoreError> {
        let mut guard = self.customers()?;
        let record = guard.get_mut(id).ok_or(StoreError::NotFound)?;
        record.engagement_score = Some(score);
        Ok(())
    }

    async fn record_email_sent(
        &self,
        id: &CustomerId,
        sent_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut guard = self.customers()?;
        let record = guard.get_mut(id).ok_or(StoreError::NotFound)?;
        record.last_email_date = Some(sent_at.to_rfc3339_opts(SecondsFormat::Millis, true));
        Ok(())
    }

    async fn list_customers(&self) -> Result<Vec<CustomerSnapshot>, StoreError> {
        let mut customers: Vec<CustomerSnapshot> = self.customers()?.values().cloned().collect();
        customers.sort_by(|a, b| a.customer_id.cmp(&b.customer_id));
        Ok(customers)
    }
}

#[async_trait]
impl EmailStore for InMemoryStore {
    async fn insert_email(&self, artifact: EmailArtifact) -> Result<(), StoreError> {
        let mut guard = self.emails()?;
        if guard.contains_key(&artifact.email_id) {
            return Err(StoreError::Conflict);
        }
        guard.insert(artifact.email_id.clone(), artifact);
        Ok(())
    }

    async fn get_email(&self, id: &EmailId) -> Result<Option<EmailArtifact>, StoreError> {
        Ok(self.emails()?.get(id).cloned())
    }

    async fn update_email_status(
        &self,
        id: &EmailId,
        status: EmailStatus,
    ) -> Result<EmailArtifact, StoreError> {
        let mut guard = self.emails()?;
        let artifact = guard.get_mut(id).ok_or(StoreError::NotFound)?;
        if !artifact.status.can_transition_to(status) {
            return Err(StoreError::InvalidTransition {
                from: artifact.status,
                to: status,
            });
        }
        artifact.status = status;
        Ok(artifact.clone())
    }

    async fn emails_for_customer(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Vec<EmailArtifact>, StoreError> {
        let mut emails: Vec<EmailArtifact> = self
            .emails()?
            .values()
            .filter(|artifact| &artifact.customer_id == customer_id)
            .cloned()
            .collect();
        emails.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(emails)
    }

    async fn list_emails(&self) -> Result<Vec<EmailArtifact>, StoreError> {
        let mut emails: Vec<EmailArtifact> = self.emails()?.values().cloned().collect();
        emails.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(emails)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn customer(id: &str, score: Option<f64>) -> CustomerSnapshot {
        CustomerSnapshot {
            customer_id: CustomerId(id.to_string()),
            email: format!("{id}@example.com"),
            name: "Ada".to_string(),
            last_order_date: "2025-01-01T00:00:00Z".to_string(),
            order_count: 2,
            average_order_value: 40.0,
            preferred_categories: Vec::new(),
            engagement_score: score,
            last_email_date: None,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    fn artifact(customer: &str) -> EmailArtifact {
        let at = Utc
            .with_ymd_and_hms(2025, 6, 1, 9, 0, 0)
            .single()
            .expect("valid instant");
        EmailArtifact::generated(
            CustomerId(customer.to_string()),
            "Subject".to_string(),
            "<p>Body</p>".to_string(),
            10.0,
            at,
        )
    }

    #[tokio::test]
    async fn bootstrap_only_writes_when_unscored() {
        let store = InMemoryStore::default();
        store
            .put_customer(customer("c-1", None))
            .await
            .expect("put");
        store
            .put_customer(customer("c-2", Some(72.0)))
            .await
            .expect("put");

        let id = CustomerId("c-1".to_string());
        assert_eq!(store.bootstrap_score(&id, 10.0).await, Ok(10.0));
        assert_eq!(store.bootstrap_score(&id, 55.0).await, Ok(10.0));

        let scored = CustomerId("c-2".to_string());
        assert_eq!(store.bootstrap_score(&scored, 10.0).await, Ok(72.0));
    }

    #[tokio::test]
    async fn field_updates_require_existing_customer() {
        let store = InMemoryStore::default();
        let missing = CustomerId("ghost".to_string());
        assert_eq!(
            store.set_engagement_score(&missing, 20.0).await,
            Err(StoreError::NotFound)
        );
        assert_eq!(
            store.record_email_sent(&missing, Utc::now()).await,
            Err(StoreError::NotFound)
        );
    }

    #[tokio::test]
    async fn record_email_sent_touches_only_last_email() {
        let store = InMemoryStore::default();
        store
            .put_customer(customer("c-1", Some(30.0)))
            .await
            .expect("put");
        let id = CustomerId("c-1".to_string());
        let at = Utc
            .with_ymd_and_hms(2025, 6, 2, 8, 30, 0)
            .single()
            .expect("valid instant");
        store.record_email_sent(&id, at).await.expect("update");

        let stored = store
            .get_customer(&id)
            .await
            .expect("read")
            .expect("present");
        assert_eq!(
            stored.last_email_date.as_deref(),
            Some("2025-06-02T08:30:00.000Z")
        );
        assert_eq!(stored.engagement_score, Some(30.0));
    }

    #[tokio::test]
    async fn insert_email_is_conditional() {
        let store = InMemoryStore::default();
        let email = artifact("c-1");
        store.insert_email(email.clone()).await.expect("insert");
        assert_eq!(store.insert_email(email).await, Err(StoreError::Conflict));
    }

    #[tokio::test]
    async fn status_updates_follow_lifecycle() {
        let store = InMemoryStore::default();
        let email = artifact("c-1");
        let id = email.email_id.clone();
        store.insert_email(email.clone()).await.expect("insert");

        let sent = store
            .update_email_status(&id, EmailStatus::Sent)
            .await
            .expect("sent");
        assert_eq!(sent.status, EmailStatus::Sent);
        assert_eq!(sent.subject, email.subject);
        assert_eq!(sent.body, email.body);
        assert_eq!(sent.engagement_score_at_time, email.engagement_score_at_time);

        assert_eq!(
            store.update_email_status(&id, EmailStatus::Failed).await,
            Err(StoreError::InvalidTransition {
                from: EmailStatus::Sent,
                to: EmailStatus::Failed
            })
        );
        assert_eq!(
            store
                .update_email_status(&EmailId("missing".to_string()), EmailStatus::Sent)
                .await,
            Err(StoreError::NotFound)
        );
    }

    #[tokio::test]
    async fn emails_are_listed_per_customer() {
        let store = InMemoryStore::default();
        store.insert_email(artifact("c-1")).await.expect("insert");
        store.insert_email(artifact("c-1")).await.expect("insert");
        store.insert_email(artifact("c-2")).await.expect("insert");

        let emails = store
            .emails_for_customer(&CustomerId("c-1".to_string()))
            .await
            .expect("list");
        assert_eq!(emails.len(), 2);
    }
}

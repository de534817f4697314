use std::io::Read;

use serde::{Deserialize, Deserializer};

use super::domain::{CustomerId, CustomerSnapshot, SnapshotViolation};

#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("seed file unreadable: {0}")]
    Csv(#[from] csv::Error),
    #[error("row {row}: {field} value '{value}' is not a number")]
    InvalidNumber {
        row: usize,
        field: &'static str,
        value: String,
    },
    #[error("row {row}: {source}")]
    InvalidSnapshot {
        row: usize,
        #[source]
        source: SnapshotViolation,
    },
}

/// Parse customer seed rows. Rows are numbered from 1, excluding the header.
pub fn load_customers<R: Read>(reader: R) -> Result<Vec<CustomerSnapshot>, SeedError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut customers = Vec::new();

    for (index, record) in csv_reader.deserialize::<SeedRow>().enumerate() {
        let row = index + 1;
        let snapshot = record?.into_snapshot(row)?;
        snapshot
            .validate()
            .map_err(|source| SeedError::InvalidSnapshot { row, source })?;
        customers.push(snapshot);
    }

    Ok(customers)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeedRow {
    user_id: String,
    email: String,
    name: String,
    last_order_date: String,
    order_count: u32,
    average_order_value: f64,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    preferred_categories: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    engagement_score: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    last_email_date: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    created_at: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    updated_at: Option<String>,
}

impl SeedRow {
    fn into_snapshot(self, row: usize) -> Result<CustomerSnapshot, SeedError> {
        let engagement_score = match self.engagement_score {
            Some(raw) => Some(raw.parse::<f64>().map_err(|_| SeedError::InvalidNumber {
                row,
                field: "engagementScore",
                value: raw.clone(),
            })?),
            None => None,
        };

        let preferred_categories = self
            .preferred_categories
            .map(|raw| {
                raw.split(';')
                    .map(str::trim)
                    .filter(|category| !category.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(CustomerSnapshot {
            customer_id: CustomerId(self.user_id),
            email: self.email,
            name: self.name,
            last_order_date: self.last_order_date,
            order_count: self.order_count,
            average_order_value: self.average_order_value,
            preferred_categories,
            engagement_score,
            last_email_date: self.last_email_date,
            created_at: self.created_at.unwrap_or_default(),
            updated_at: self.updated_at.unwrap_or_default(),
        })
    }
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}

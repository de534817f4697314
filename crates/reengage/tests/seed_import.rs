//! Seeding the store from a CSV export.

use std::io::Cursor;

use reengage::engagement::{load_customers, CustomerId, CustomerStore, InMemoryStore};

const SEED: &str = "\
userId,email,name,lastOrderDate,orderCount,averageOrderValue,preferredCategories,engagementScore,lastEmailDate,createdAt,updatedAt
cust-001,ada@example.com,Ada Lovelace,2025-03-14T09:00:00Z,7,120.5,dresses;shoes,,,2024-01-01T00:00:00Z,2025-03-14T09:00:00Z
cust-002,grace@example.com,Grace Hopper,2024-12-01,1,19.99,,35.0,2025-05-01T00:00:00Z,,
";

#[tokio::test]
async fn seeded_customers_round_trip_through_store() {
    let customers = load_customers(Cursor::new(SEED)).expect("valid seed");
    let store = InMemoryStore::default();
    for customer in customers {
        store.put_customer(customer).await.expect("stored");
    }

    let listed = store.list_customers().await.expect("list");
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].customer_id, CustomerId("cust-001".to_string()));
    assert_eq!(listed[0].preferred_categories, vec!["dresses", "shoes"]);
    assert_eq!(listed[0].updated_at, "2025-03-14T09:00:00Z");
    assert_eq!(listed[1].engagement_score, Some(35.0));
    assert!(listed[1].created_at.is_empty());
}

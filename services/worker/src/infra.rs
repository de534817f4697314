use std::fs::File;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use reengage::config::AppConfig;
use reengage::engagement::{
    delivery_from_config, load_customers, Clock, ContentGenerator, CustomerStore,
    EngagementOrchestrator, EventDispatcher, FixedClock, InMemoryStore, MailDelivery,
    OpenRouterGenerator, SystemClock,
};
use reengage::error::AppError;
use tracing::{info, warn};

pub(crate) type WorkerDispatcher =
    EventDispatcher<InMemoryStore, dyn ContentGenerator, dyn MailDelivery>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Wire the store and adapters described by the configuration.
pub(crate) fn build_dispatcher(
    config: &AppConfig,
    as_of: Option<DateTime<Utc>>,
) -> Arc<WorkerDispatcher> {
    let store = Arc::new(InMemoryStore::new(&config.store));

    if config.generation.api_key.is_none() {
        warn!("OPENROUTER_API_KEY not set, content generation will be unavailable");
    }
    let generator: Arc<dyn ContentGenerator> =
        Arc::new(OpenRouterGenerator::new(&config.generation));
    let delivery: Arc<dyn MailDelivery> = delivery_from_config(&config.delivery);

    let clock: Arc<dyn Clock> = match as_of {
        Some(instant) => Arc::new(FixedClock::new(instant)),
        None => Arc::new(SystemClock),
    };

    let orchestrator = EngagementOrchestrator::with_clock(
        store,
        generator,
        delivery,
        config.engagement.clone(),
        clock,
    );
    Arc::new(EventDispatcher::new(Arc::new(orchestrator)))
}

/// Load customers from a CSV export into the store.
pub(crate) async fn seed_store<S>(store: &S, path: &Path) -> Result<usize, AppError>
where
    S: CustomerStore + ?Sized,
{
    let customers = load_customers(File::open(path)?)?;
    let count = customers.len();
    for customer in customers {
        store.put_customer(customer).await?;
    }
    info!(count, path = %path.display(), "seeded customers");
    Ok(count)
}

pub(crate) fn parse_instant(raw: &str) -> Result<DateTime<Utc>, String> {
    reengage::engagement::clock::parse_timestamp(raw)
        .ok_or_else(|| format!("failed to parse '{raw}' as RFC 3339 or YYYY-MM-DD"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parse_instant_accepts_dates_and_timestamps() {
        assert!(parse_instant("2025-06-01").is_ok());
        assert!(parse_instant("2025-06-01T12:00:00Z").is_ok());
        assert!(parse_instant("June first").is_err());
    }

    #[tokio::test]
    async fn seed_store_loads_csv_file() {
        let path = std::env::temp_dir().join(format!("reengage-seed-{}.csv", std::process::id()));
        {
            let mut file = File::create(&path).expect("create seed");
            writeln!(
                file,
                "userId,email,name,lastOrderDate,orderCount,averageOrderValue,preferredCategories"
            )
            .expect("write header");
            writeln!(file, "cust-1,ada@example.com,Ada,2025-01-01,3,40,shoes").expect("write row");
        }

        let store = InMemoryStore::default();
        let count = seed_store(&store, &path).await.expect("seeded");
        std::fs::remove_file(&path).ok();

        assert_eq!(count, 1);
        assert_eq!(store.list_customers().await.expect("list").len(), 1);
    }
}

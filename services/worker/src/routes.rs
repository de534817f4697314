use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::infra::AppState;
use reengage::engagement::{
    BatchReport, ContentGenerator, CustomerId, CustomerSnapshot, EmailArtifact, EmailId,
    EmailStatus, EnvelopeBatch, EventDispatcher, MailDelivery, RecordStore, StoreError,
};
use reengage::error::AppError;

#[derive(Debug, Deserialize)]
pub(crate) struct StatusUpdateRequest {
    pub(crate) status: EmailStatus,
}

type Dispatcher<S, G, D> = Arc<EventDispatcher<S, G, D>>;

/// Ingestion and read endpoints over the engagement dispatcher.
pub(crate) fn engagement_router<S, G, D>(dispatcher: Dispatcher<S, G, D>) -> Router
where
    S: RecordStore + 'static,
    G: ContentGenerator + ?Sized + 'static,
    D: MailDelivery + ?Sized + 'static,
{
    Router::new()
        .route("/api/v1/events", post(ingest_events::<S, G, D>))
        .route("/api/v1/customers", get(customers_handler::<S, G, D>))
        .route("/api/v1/customers/:customer_id", get(customer_handler::<S, G, D>))
        .route(
            "/api/v1/customers/:customer_id/emails",
            get(customer_emails_handler::<S, G, D>),
        )
        .route("/api/v1/emails", get(emails_handler::<S, G, D>))
        .route("/api/v1/emails/:email_id", get(email_handler::<S, G, D>))
        .route(
            "/api/v1/emails/:email_id/status",
            post(email_status_handler::<S, G, D>),
        )
        .with_state(dispatcher)
}

pub(crate) fn with_operational_routes(router: Router) -> Router {
    router
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
}

pub(crate) async fn ingest_events<S, G, D>(
    State(dispatcher): State<Dispatcher<S, G, D>>,
    Json(batch): Json<EnvelopeBatch>,
) -> Json<BatchReport>
where
    S: RecordStore + 'static,
    G: ContentGenerator + ?Sized + 'static,
    D: MailDelivery + ?Sized + 'static,
{
    Json(dispatcher.dispatch_batch(&batch).await)
}

pub(crate) async fn customers_handler<S, G, D>(
    State(dispatcher): State<Dispatcher<S, G, D>>,
) -> Result<Json<Vec<CustomerSnapshot>>, AppError>
where
    S: RecordStore + 'static,
    G: ContentGenerator + ?Sized + 'static,
    D: MailDelivery + ?Sized + 'static,
{
    let customers = dispatcher.orchestrator().store().list_customers().await?;
    Ok(Json(customers))
}

pub(crate) async fn customer_handler<S, G, D>(
    State(dispatcher): State<Dispatcher<S, G, D>>,
    Path(customer_id): Path<String>,
) -> Result<Json<CustomerSnapshot>, AppError>
where
    S: RecordStore + 'static,
    G: ContentGenerator + ?Sized + 'static,
    D: MailDelivery + ?Sized + 'static,
{
    let store = dispatcher.orchestrator().store();
    let snapshot = store
        .get_customer(&CustomerId(customer_id))
        .await?
        .ok_or(StoreError::NotFound)?;
    Ok(Json(snapshot))
}

pub(crate) async fn customer_emails_handler<S, G, D>(
    State(dispatcher): State<Dispatcher<S, G, D>>,
    Path(customer_id): Path<String>,
) -> Result<Json<Vec<EmailArtifact>>, AppError>
where
    S: RecordStore + 'static,
    G: ContentGenerator + ?Sized + 'static,
    D: MailDelivery + ?Sized + 'static,
{
    let store = dispatcher.orchestrator().store();
    let emails = store.emails_for_customer(&CustomerId(customer_id)).await?;
    Ok(Json(emails))
}

pub(crate) async fn emails_handler<S, G, D>(
    State(dispatcher): State<Dispatcher<S, G, D>>,
) -> Result<Json<Vec<EmailArtifact>>, AppError>
where
    S: RecordStore + 'static,
    G: ContentGenerator + ?Sized + 'static,
    D: MailDelivery + ?Sized + 'static,
{
    let emails = dispatcher.orchestrator().store().list_emails().await?;
    Ok(Json(emails))
}

pub(crate) async fn email_handler<S, G, D>(
    State(dispatcher): State<Dispatcher<S, G, D>>,
    Path(email_id): Path<String>,
) -> Result<Json<EmailArtifact>, AppError>
where
    S: RecordStore + 'static,
    G: ContentGenerator + ?Sized + 'static,
    D: MailDelivery + ?Sized + 'static,
{
    let store = dispatcher.orchestrator().store();
    let artifact = store
        .get_email(&EmailId(email_id))
        .await?
        .ok_or(StoreError::NotFound)?;
    Ok(Json(artifact))
}

pub(crate) async fn email_status_handler<S, G, D>(
    State(dispatcher): State<Dispatcher<S, G, D>>,
    Path(email_id): Path<String>,
    Json(request): Json<StatusUpdateRequest>,
) -> Result<Json<EmailArtifact>, AppError>
where
    S: RecordStore + 'static,
    G: ContentGenerator + ?Sized + 'static,
    D: MailDelivery + ?Sized + 'static,
{
    let store = dispatcher.orchestrator().store();
    let artifact = store
        .update_email_status(&EmailId(email_id), request.status)
        .await?;
    metrics_counter(request.status);
    Ok(Json(artifact))
}

fn metrics_counter(status: EmailStatus) {
    metrics::counter!("reengage_emails_total", "status" => status.label()).increment(1);
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

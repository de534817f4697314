//! Engagement scoring and re-engagement email orchestration.
//!
//! Inbound customer and order lifecycle events are decoded by the
//! [`engagement::EventDispatcher`], scored, gated against the send policy and,
//! when a customer looks at risk, turned into a generated email that is
//! persisted and handed to a delivery adapter.

pub mod config;
pub mod engagement;
pub mod error;
pub mod telemetry;

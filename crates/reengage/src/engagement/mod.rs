//! Customer engagement scoring and re-engagement email orchestration.

pub mod clock;
pub mod content;
pub mod decision;
pub mod delivery;
pub mod dispatch;
pub mod domain;
pub mod orchestrator;
pub mod scoring;
pub mod seed;
pub mod store;

pub use clock::{Clock, FixedClock, SystemClock};
pub use content::{ContentError, ContentGenerator, GeneratedContent, OpenRouterGenerator};
pub use decision::{evaluate, should_send, DecisionConfig, SendDecision};
pub use delivery::{
    delivery_from_config, DeliveryError, HttpRelayDelivery, LoggingDelivery, MailDelivery,
    OutboundEmail,
};
pub use dispatch::{
    decode_message, BatchReport, DecodeError, DecodedEvent, EnvelopeBatch, EventDispatcher,
    EventDisposition, InboundEvent, InboundMessage, MessageReport, SkipReason,
};
pub use domain::{
    CustomerFacts, CustomerId, CustomerSnapshot, EmailArtifact, EmailId, EmailStatus,
    OrderItem, OrderPayload, OrderStatus, SnapshotViolation,
};
pub use orchestrator::{
    EmailDispatch, EngagementError, EngagementOrchestrator, OrchestratorSettings,
    ProcessOutcome, RetryPolicy, UnscoredPolicy, WriteStep,
};
pub use scoring::{EngagementScore, ScoreCalculator, ScoreComponent, ScoreFactor, ScoringConfig};
pub use seed::{load_customers, SeedError};
pub use store::{CustomerStore, EmailStore, InMemoryStore, RecordStore, StoreError};

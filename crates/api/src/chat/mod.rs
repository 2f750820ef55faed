//! Support chat core
//!
//! - **EscalationStateMachine**: session lifecycle rules
//! - **IngestionPipeline**: persist inbound messages and decide what to emit
//! - **SubscriptionManager**: checked subscribe/unsubscribe
//! - **ChatCoordinator**: per-session serialization plus fan-out

pub mod coordinator;
pub mod escalation;
pub mod ingest;
pub mod locks;
pub mod subscription;

pub use coordinator::{ChatCoordinator, CoordinatorSettings};
pub use escalation::{EscalationError, EscalationEvent, EscalationStateMachine, Transition};
pub use ingest::{
    CloseOutcome, EscalationOutcome, IngestError, IngestOutcome, IngestRequest, IngestionPipeline,
    Outbound,
};
pub use subscription::{SubscribeError, SubscriptionManager};

// Conveyor - Workflow Orchestration Engine
// Drives orders and provisioning jobs through validated state machines,
// exactly once, under concurrent delivery, partial failure, and retries.

pub mod config;
pub mod notify;
pub mod runner;
pub mod store;
pub mod telemetry;
pub mod workflow;

// Re-export key types for easy access
pub use config::{config, init_config, ConveyorConfig};
pub use notify::{idempotency_key, Notifier, NotifyOutcome, RecordingNotifier};
pub use runner::{JobRunner, LeaseLock, ProvisionError, Provisioner, RunOutcome, WorkerId};
pub use store::{Condition, DocumentStore, InMemoryDocumentStore, Predicate, StoreError};
pub use telemetry::{create_workflow_span, generate_correlation_id, init_telemetry};
pub use workflow::{
    ActorType, EntityId, EntityKind, EntityRecord, JobState, LifecycleController, OrderState,
    TransitionClass, TransitionRecord, TransitionRequest, TransitionTable, WorkflowError,
    WorkflowState,
};

pub mod coordinator;
pub mod state;

pub use coordinator::{
    CoordinatorConfig, DEFAULT_BATCH_INTERVAL, DEFAULT_BATCH_SIZE, DeliveryCoordinator,
};
pub use state::{CoordinatorState, FlushOutcome};

//! In-memory buffering: the FIFO event queue, batches cut from it, and the
//! scheduler that decides when a batch is due.

pub mod batch;
pub mod error;
pub mod queue;
pub mod scheduler;

pub use batch::{Batch, BatchTrigger};
pub use error::BufferError;
pub use queue::EventQueue;
pub use scheduler::BatchScheduler;

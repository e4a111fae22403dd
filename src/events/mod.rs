//! Run events and their distribution
//!
//! Every run gets its own [`EventBus`]. The orchestrator is the only publisher;
//! any number of observers subscribe and read events in emission order.

pub mod bus;
pub mod recorder;
pub mod types;

pub use bus::{DEFAULT_QUEUE_CAPACITY, EventBus, Subscription};
pub use recorder::spawn_event_log;
pub use types::{AgentEvent, EventKind};

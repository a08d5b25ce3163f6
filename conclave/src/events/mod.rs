//! Run event stream: typed events over a broadcast bus.

pub mod bus;
pub mod types;

pub use bus::{EventBus, EventBusExt, EventFilter, FilteredReceiver, SharedEventBus};
pub use types::{EventId, RunEvent};

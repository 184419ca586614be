//! Event distribution.
//!
//! - **`event`**: `Event`, its `EventKind` tag and severity, and the
//!   `EventInput` builder.
//! - **`bus`**: `EventBus`, a synchronous publish/subscribe hub with a
//!   bounded, queryable history and drop-to-unsubscribe handles.

pub mod bus;
pub mod event;

pub use bus::{
    BusStats, EventBus, HistoryFilter, Subscription, Topic, DEFAULT_HISTORY_CAPACITY,
    DEFAULT_SOURCE,
};
pub use event::{Event, EventId, EventInput, EventKind, Severity};

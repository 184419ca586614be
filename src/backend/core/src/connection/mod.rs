//! Real-time connection to the dashboard backend.
//!
//! - **`state`**: the table-driven state machine and reconnect policy
//! - **`message`**: inbound/outbound JSON frame types
//! - **`transport`**: the `Transport` seam and its WebSocket implementation
//! - **`manager`**: `ConnectionManager`, which drives the machine over a
//!   transport, routes inbound frames and keeps the heartbeat
//!
//! # State machine
//!
//! ```text
//! Disconnected --connect--> Connecting --opened--> Connected
//!                              ^    |                 |
//!                 backoff      |    | failed          | failed
//!                 elapsed      |    v                 v
//!                            Reconnecting <-----------+
//!
//! attempts >= max  => Closed      disconnect() from anywhere => Closed
//! ```

pub mod manager;
pub mod message;
pub mod state;
pub mod transport;

pub use manager::{
    ConnectionCallbacks, ConnectionManager, ConnectionOptions, ConnectionStats, MIN_HEARTBEAT_INTERVAL,
    WEBSOCKET_SOURCE,
};
pub use message::{InboundMessage, OutboundMessage};
pub use state::{
    transition, ConnectionEvent, ConnectionMachine, ConnectionState, ReconnectPolicy, Recovery,
};
pub use transport::{Link, LinkEvent, Transport, WsTransport};

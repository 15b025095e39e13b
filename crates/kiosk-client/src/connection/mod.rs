//! Connection lifecycle: manager, subscribers, heartbeat, status.

pub mod heartbeat;
pub mod manager;
pub mod registry;
pub mod status;

pub use heartbeat::{HeartbeatResult, run_heartbeat};
pub use manager::ConnectionManager;
pub use registry::{Listener, ListenerFailure, ListenerId, ListenerResult, SubscriberRegistry};
pub use status::ConnectionStatus;

//! Realtime fan-out of driver locations and ride lifecycle events.

pub mod broadcaster;
pub mod events;
pub mod registry;

pub use broadcaster::RideEventBroadcaster;
pub use events::RideEvent;
pub use registry::{BroadcastReport, ConnectionId, ConnectionRegistry, OutboundMessage, PeerRole};

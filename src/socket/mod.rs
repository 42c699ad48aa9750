//! Socket.IO channel to the remote voice service
//!
//! - `packet`: Engine.IO / Socket.IO text frame codec
//! - `transport`: connector abstraction and the WebSocket implementation
//! - `manager`: connection lifecycle, reconnection, heartbeat, emit
//! - `memory`: in-process transport for tests and standalone runs

pub mod manager;
pub mod memory;
pub mod packet;
mod state;
pub mod transport;

pub use manager::{ConnectionManager, EmitOutcome};
pub use memory::{Dial, MemoryConnector, MemoryPeer};
pub use packet::{OpenInfo, Packet};
pub use state::{ConnectionState, DisconnectReason};
pub use transport::{Connector, Transport, WebSocketConnector};

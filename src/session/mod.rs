//! Connection lifecycle of each robot: transport, auth handshake, liveness
//! and reconnect backoff.

pub mod backoff;
pub mod manager;
pub mod memory;
pub mod protocol;
pub mod transport;

pub use backoff::Backoff;
pub use manager::{SessionHandle, SessionManager};
pub use memory::{MemoryConnector, MemoryDevice};
pub use transport::{Connector, FrameReader, FrameWriter, TcpConnector};

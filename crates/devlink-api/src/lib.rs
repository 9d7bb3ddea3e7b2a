// devlink-api: Device links for home-automation controllers (TCP, WebSocket, HTTP)

pub mod error;
pub mod http;
pub mod memory;
pub mod tcp;
pub mod transport;
pub mod websocket;

pub use error::Error;
pub use http::HttpTransport;
pub use memory::{MemoryPeer, MemoryServer, MemoryTransport, OpenFailure};
pub use tcp::TcpTransport;
pub use transport::{BasicAuth, FrameSink, FrameStream, Framing, Link, Transport};
pub use websocket::WebSocketTransport;

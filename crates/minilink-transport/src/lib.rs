//! minilink transport layer
//!
//! The miniserver exposes one duplex WebSocket carrying both UTF-8 text
//! messages (commands, JSON replies) and raw binary frames (message
//! headers, event tables). This crate provides the transport traits the
//! session layer is written against, plus the tokio-tungstenite
//! implementation.

pub mod error;
pub mod traits;
pub mod websocket;

pub use error::{Result, TransportError};
pub use traits::{Transport, TransportEvent, TransportReceiver, TransportSender};
pub use websocket::{WebSocketReceiver, WebSocketSender, WebSocketTransport};

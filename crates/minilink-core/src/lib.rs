//! minilink core
//!
//! Wire-level types and decoders for the miniserver remote-control
//! protocol. The miniserver speaks a mixed text/binary protocol over a
//! single WebSocket: free-standing JSON replies, 8-byte binary message
//! headers, and binary event tables carrying batched device-state updates.
//!
//! This crate provides:
//! - The 128-bit device identifier codec ([`Uuid`])
//! - Message-header classification ([`MessageHeader`], [`MessageKind`])
//! - Event-table decoders ([`events`])
//! - The structure-file schema and flat device registry ([`structure`])
//!
//! Everything here is pure: no sockets, no clocks, no global state. The
//! session layer in `minilink-client` owns the I/O and feeds bytes in.

pub mod error;
pub mod events;
pub mod header;
pub mod structure;
pub mod uuid;

pub use error::{Error, Result};
pub use events::{
    decode_daytimer_states, decode_text_states, decode_value_states, decode_weather_states,
    DaytimerEntry, DaytimerEvent, TextEvent, ValueEvent, WeatherEntry, WeatherEvent,
};
pub use header::{MessageHeader, MessageKind};
pub use structure::{DeviceEntry, EntryKind, Registry, StateValue, StructureFile};
pub use uuid::Uuid;

/// First byte of every valid message header.
pub const HEADER_MARKER: u8 = 0x03;

/// Message headers are always exactly 8 bytes.
pub const HEADER_SIZE: usize = 8;

/// Wire size of an identifier.
pub const UUID_SIZE: usize = 16;

/// WebSocket subprotocol requested on connect.
pub const WS_SUBPROTOCOL: &str = "remotecontrol";

/// WebSocket endpoint path on the miniserver.
pub const WS_PATH: &str = "/ws/rfc6455";

/// Path of the structure document served over HTTP.
pub const STRUCTURE_PATH: &str = "/data/LoxAPP3.json";

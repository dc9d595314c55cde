//! minilink client library
//!
//! High-level async client for the miniserver remote-control protocol:
//! challenge-response authentication, binary status push, and a flat
//! device registry kept live from decoded event tables.
//!
//! # Example
//!
//! ```ignore
//! use minilink_client::Minilink;
//!
//! #[tokio::main]
//! async fn main() -> minilink_client::Result<()> {
//!     let client = Minilink::builder("192.168.1.77")
//!         .credentials("admin", "secret")
//!         .connect()
//!         .await?;
//!
//!     // Watch decoded state updates
//!     let mut updates = client.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(update) = updates.recv().await {
//!             println!("{update:?}");
//!         }
//!     });
//!
//!     // Command a control by identifier
//!     let lamp = minilink_core::Uuid::from("0f86a2fe-0378-3b08-ffffb2d4efc8b5b6");
//!     client.command(&lamp, "on").await?;
//!
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod builder;
pub mod client;
pub mod commands;
pub mod correlator;
pub mod error;
pub mod structure_fetch;

pub use builder::MinilinkBuilder;
pub use client::{Minilink, SessionState, StateUpdate};
pub use correlator::{Correlator, LlPayload};
pub use error::{ClientError, Result};
pub use structure_fetch::{HttpStructureSource, StructureSource};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::builder::MinilinkBuilder;
    pub use crate::client::{Minilink, SessionState, StateUpdate};
    pub use crate::error::{ClientError, Result};
    pub use minilink_core::{DeviceEntry, EntryKind, Registry, StateValue, Uuid};
}

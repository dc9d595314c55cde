//! Error types for the protocol core

use thiserror::Error;

use crate::uuid::Uuid;

/// Result type alias for core decode operations
pub type Result<T> = std::result::Result<T, Error>;

/// Wire-level decode errors.
///
/// None of these are fatal to a session: the caller logs the error, drops
/// the offending frame, and keeps consuming the channel.
#[derive(Error, Debug)]
pub enum Error {
    /// Identifier decode needs 16 bytes
    #[error("invalid identifier length: need 16 bytes, have {0}")]
    InvalidLength(usize),

    /// Frame is not a message header (wrong size or marker byte)
    #[error("not a message header: {0} bytes, marker 0x{1:02x}")]
    MalformedHeader(usize, u8),

    /// Message header carries an unassigned type code
    #[error("unknown message header type: 0x{0:02x}")]
    UnknownHeaderType(u8),

    /// Event table does not match its declared layout
    #[error("malformed event table: {0}")]
    MalformedTable(String),

    /// A decoder would read past the end of the frame
    #[error("buffer underrun: need {needed} bytes, have {have}")]
    BufferUnderrun { needed: usize, have: usize },

    /// A decoded update references an identifier the registry does not know
    #[error("unknown identifier: {0}")]
    UnknownIdentifier(Uuid),
}

//! Message-header classification
//!
//! Binary traffic from the miniserver arrives as pairs of frames: an
//! 8-byte header announcing what the next frame holds, then the body
//! itself. The header starts with the fixed marker `0x03`, carries the
//! body type in its second byte, and leaves the remaining six bytes
//! uninterpreted by this client.

use crate::error::{Error, Result};
use crate::{HEADER_MARKER, HEADER_SIZE};

/// Body type announced by a message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageKind {
    /// Free-standing text message
    Text = 0,
    /// Binary file (icon download etc.)
    BinaryFile = 1,
    /// Event table of value states
    ValueStates = 2,
    /// Event table of text states
    TextStates = 3,
    /// Event table of daytimer states
    DaytimerStates = 4,
    /// Out-of-service indicator
    OutOfService = 5,
    /// Keepalive acknowledgement
    Keepalive = 6,
    /// Event table of weather states
    WeatherStates = 7,
}

impl MessageKind {
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            0 => Some(MessageKind::Text),
            1 => Some(MessageKind::BinaryFile),
            2 => Some(MessageKind::ValueStates),
            3 => Some(MessageKind::TextStates),
            4 => Some(MessageKind::DaytimerStates),
            5 => Some(MessageKind::OutOfService),
            6 => Some(MessageKind::Keepalive),
            7 => Some(MessageKind::WeatherStates),
            _ => None,
        }
    }
}

/// A classified 8-byte message header.
#[derive(Debug, Clone, Copy)]
pub struct MessageHeader {
    pub kind: MessageKind,
}

impl MessageHeader {
    /// Quick shape check: does this frame look like a header at all?
    ///
    /// Used by the session to tell headers apart from table bodies before
    /// committing to [`parse`](Self::parse).
    pub fn matches(frame: &[u8]) -> bool {
        frame.len() == HEADER_SIZE && frame[0] == HEADER_MARKER
    }

    /// Classify an 8-byte header frame.
    ///
    /// Fails with [`Error::MalformedHeader`] when the frame is the wrong
    /// size or lacks the marker byte, and [`Error::UnknownHeaderType`] for
    /// an unassigned type code. Both are non-fatal: the caller logs, drops
    /// the frame, and clears any pending body type.
    pub fn parse(frame: &[u8]) -> Result<Self> {
        if frame.len() != HEADER_SIZE || frame[0] != HEADER_MARKER {
            let marker = frame.first().copied().unwrap_or(0);
            return Err(Error::MalformedHeader(frame.len(), marker));
        }
        let kind =
            MessageKind::from_u8(frame[1]).ok_or(Error::UnknownHeaderType(frame[1]))?;
        Ok(Self { kind })
    }
}

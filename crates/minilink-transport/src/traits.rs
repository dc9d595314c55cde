//! Transport trait definitions

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// Events delivered by a transport, in exact arrival order.
///
/// The miniserver protocol is dual-mode on one socket, so text and binary
/// frames stay distinct all the way up: a JSON reply must never be
/// mistaken for a table body, and vice versa.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Connection established
    Connected,
    /// UTF-8 text frame (command replies, free-standing messages)
    Text(String),
    /// Raw binary frame (message headers, event tables, files)
    Binary(Bytes),
    /// Connection closed (clean or error)
    Disconnected { reason: Option<String> },
    /// Error occurred
    Error(String),
}

/// Trait for the outbound half of a connection.
///
/// The client only ever sends text: every command in the protocol is a
/// plain string.
#[async_trait]
pub trait TransportSender: Send + Sync {
    /// Send one text frame
    async fn send_text(&self, payload: &str) -> Result<()>;

    /// Check if connected
    fn is_connected(&self) -> bool;

    /// Close the connection
    async fn close(&self) -> Result<()>;
}

/// Trait for the inbound half of a connection.
#[async_trait]
pub trait TransportReceiver: Send {
    /// Receive the next event; `None` once the connection is gone.
    async fn recv(&mut self) -> Option<TransportEvent>;
}

/// A connectable duplex message transport.
#[async_trait]
pub trait Transport: Send + Sync {
    type Sender: TransportSender;
    type Receiver: TransportReceiver;

    /// Connect to a remote endpoint
    async fn connect(url: &str) -> Result<(Self::Sender, Self::Receiver)>
    where
        Self: Sized;
}

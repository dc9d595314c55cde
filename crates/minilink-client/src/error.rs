//! Client error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("not connected")]
    NotConnected,

    #[error("already connected")]
    AlreadyConnected,

    #[error("send failed: {0}")]
    SendFailed(String),

    /// The miniserver rejected the authenticate request
    #[error("authentication failed")]
    AuthenticationFailed,

    /// The challenge key was not valid hex
    #[error("invalid challenge key: {0}")]
    InvalidChallengeKey(String),

    /// The miniserver rejected the config version query
    #[error("config version query failed")]
    VersionQueryFailed,

    /// A correlated request came back with a non-success status code
    #[error("request {control} rejected with code {code}")]
    RemoteRejected { control: String, code: String },

    /// The session closed while a reply was still outstanding
    #[error("transport closed")]
    TransportClosed,

    /// Structure document could not be fetched or parsed
    #[error("structure fetch failed: {0}")]
    StructureFetch(String),

    #[error("protocol error: {0}")]
    Protocol(#[from] minilink_core::Error),

    #[error("transport error: {0}")]
    Transport(#[from] minilink_transport::TransportError),
}

//! Client builder pattern

use std::sync::Arc;
use std::time::Duration;

use minilink_transport::{Transport, WebSocketTransport};

use crate::client::Minilink;
use crate::structure_fetch::{HttpStructureSource, StructureSource};
use crate::Result;

/// Builder for a [`Minilink`] client.
pub struct MinilinkBuilder {
    host: String,
    user: String,
    password: String,
    keepalive_interval: Duration,
    reconnect_delay: Duration,
    auto_reconnect: bool,
    structure_source: Option<Arc<dyn StructureSource>>,
}

impl MinilinkBuilder {
    /// Create a new builder for the miniserver at `host` (host or
    /// host:port, no scheme).
    pub fn new(host: &str) -> Self {
        Self {
            host: host.to_string(),
            user: String::new(),
            password: String::new(),
            keepalive_interval: Duration::from_secs(30),
            reconnect_delay: Duration::from_secs(5),
            auto_reconnect: true,
            structure_source: None,
        }
    }

    /// Set the credentials used for the challenge response and the
    /// structure fetch.
    pub fn credentials(mut self, user: &str, password: &str) -> Self {
        self.user = user.to_string();
        self.password = password.to_string();
        self
    }

    /// Set the keepalive send interval.
    pub fn keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self
    }

    /// Set the fixed delay before a reconnect attempt.
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Enable/disable the reconnect cycle on transport close.
    pub fn auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// Override where the structure document comes from (defaults to the
    /// miniserver's HTTP endpoint with basic auth).
    pub fn structure_source(mut self, source: impl StructureSource + 'static) -> Self {
        self.structure_source = Some(Arc::new(source));
        self
    }

    /// Build and connect over WebSocket.
    pub async fn connect(self) -> Result<Minilink> {
        self.connect_with::<WebSocketTransport>().await
    }

    /// Build and connect over a specific transport.
    pub async fn connect_with<T>(self) -> Result<Minilink<T>>
    where
        T: Transport + 'static,
        T::Sender: 'static,
        T::Receiver: 'static,
    {
        let structure_source = self.structure_source.unwrap_or_else(|| {
            Arc::new(HttpStructureSource::new(
                &self.host,
                &self.user,
                &self.password,
            ))
        });

        Minilink::connect_with(
            self.host,
            self.user,
            self.password,
            self.keepalive_interval,
            self.reconnect_delay,
            self.auto_reconnect,
            structure_source,
        )
        .await
    }
}

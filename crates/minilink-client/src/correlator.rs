//! Response correlation for a channel without request IDs
//!
//! The miniserver echoes the command name inside its JSON reply envelope
//! instead of carrying request identifiers, so pairing requests with
//! replies is done by matching a predicate against the echoed control
//! name. The client's usage pattern needs exactly one outstanding waiter
//! at a time (the handshake is strictly sequential), so the correlator
//! holds a single one-shot slot: registering while a waiter is pending
//! replaces it, and the session abandons the slot on close.

use parking_lot::Mutex;
use serde::Deserialize;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::{ClientError, Result};

/// Status code the miniserver uses for success.
const CODE_OK: &str = "200";

/// The `{"LL": {...}}` reply envelope.
#[derive(Debug, Clone, Deserialize)]
struct Envelope {
    #[serde(rename = "LL")]
    ll: LlPayload,
}

/// Payload of a correlated reply: the echoed control name, the returned
/// value, and the status code.
#[derive(Debug, Clone, Deserialize)]
pub struct LlPayload {
    #[serde(default)]
    pub control: String,
    #[serde(default)]
    pub value: serde_json::Value,
    #[serde(rename = "Code", alias = "code", default, deserialize_with = "status_code")]
    pub code: Option<String>,
}

/// Firmware revisions disagree on whether the code is a string or a
/// number; normalize to a string.
fn status_code<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.map(|v| match v {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }))
}

type Predicate = Box<dyn Fn(&LlPayload) -> bool + Send + Sync>;

struct Waiter {
    predicate: Predicate,
    tx: oneshot::Sender<Result<LlPayload>>,
}

/// Single-waiter, one-shot response matcher.
#[derive(Default)]
pub struct Correlator {
    waiter: Mutex<Option<Waiter>>,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter for the next reply matching `predicate`.
    ///
    /// The receiver resolves once: `Ok` for a success code, `RemoteRejected`
    /// otherwise. If the session closes first the sender is dropped and the
    /// receiver yields a channel error, which callers surface as
    /// [`ClientError::TransportClosed`]. A previously registered waiter is
    /// replaced (and thereby abandoned).
    pub fn register(
        &self,
        predicate: impl Fn(&LlPayload) -> bool + Send + Sync + 'static,
    ) -> oneshot::Receiver<Result<LlPayload>> {
        let (tx, rx) = oneshot::channel();
        let previous = self.waiter.lock().replace(Waiter {
            predicate: Box::new(predicate),
            tx,
        });
        if previous.is_some() {
            debug!("replacing pending correlator waiter");
        }
        rx
    }

    /// Offer an inbound text frame to the pending waiter.
    ///
    /// Frames that are not JSON, not a reply envelope, or do not match the
    /// predicate are ignored (not every text frame is a reply). Returns
    /// true if the frame resolved the waiter.
    pub fn offer(&self, text: &str) -> bool {
        let Ok(envelope) = serde_json::from_str::<Envelope>(text) else {
            return false;
        };

        let mut slot = self.waiter.lock();
        let matches = slot
            .as_ref()
            .map(|w| (w.predicate)(&envelope.ll))
            .unwrap_or(false);
        if !matches {
            return false;
        }

        let Some(waiter) = slot.take() else {
            return false;
        };
        drop(slot);

        let ll = envelope.ll;
        let result = if ll.code.as_deref() == Some(CODE_OK) {
            Ok(ll)
        } else {
            Err(ClientError::RemoteRejected {
                control: ll.control.clone(),
                code: ll.code.clone().unwrap_or_else(|| "none".to_string()),
            })
        };
        let _ = waiter.tx.send(result);
        true
    }

    /// Drop any pending waiter without resolving it.
    pub fn abandon(&self) {
        if self.waiter.lock().take().is_some() {
            debug!("abandoning pending correlator waiter");
        }
    }
}

//! Main miniserver client implementation
//!
//! One [`Minilink`] owns one session: one socket, one pending-frame slot,
//! one registry. All inbound frame classification, table decoding,
//! correlator checks and registry mutation happen on the single reader
//! task, in exact arrival order; the handshake and the keepalive/reconnect
//! timers are the only other actors, and they only ever write outbound.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use minilink_core::{
    decode_daytimer_states, decode_text_states, decode_value_states, decode_weather_states,
    DaytimerEvent, DeviceEntry, MessageHeader, MessageKind, Registry, StateValue, TextEvent,
    Uuid, ValueEvent, WeatherEvent, WS_PATH,
};
use minilink_transport::{
    Transport, TransportEvent, TransportReceiver, TransportSender, WebSocketTransport,
};

use crate::auth;
use crate::builder::MinilinkBuilder;
use crate::commands;
use crate::correlator::{Correlator, LlPayload};
use crate::error::{ClientError, Result};
use crate::structure_fetch::StructureSource;

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    AwaitingKey,
    Authenticating,
    FetchingVersion,
    Ready,
    Closing,
}

/// A decoded device-state update, fanned out to subscribers.
#[derive(Debug, Clone)]
pub enum StateUpdate {
    Value(ValueEvent),
    Text(TextEvent),
    Daytimer(DaytimerEvent),
    Weather(WeatherEvent),
}

/// A miniserver client over a pluggable transport (WebSocket by default).
pub struct Minilink<T: Transport = WebSocketTransport> {
    shared: Arc<Shared>,
    _transport: PhantomData<T>,
}

impl<T: Transport> std::fmt::Debug for Minilink<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Minilink")
            .field("state", &self.shared.state.read())
            .finish_non_exhaustive()
    }
}

impl Minilink {
    /// Create a builder.
    pub fn builder(host: &str) -> MinilinkBuilder {
        MinilinkBuilder::new(host)
    }
}

impl<T> Minilink<T>
where
    T: Transport + 'static,
    T::Sender: 'static,
    T::Receiver: 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn connect_with(
        host: String,
        user: String,
        password: String,
        keepalive_interval: Duration,
        reconnect_delay: Duration,
        auto_reconnect: bool,
        structure_source: Arc<dyn StructureSource>,
    ) -> Result<Self> {
        let shared = Arc::new(Shared::new(
            host,
            user,
            password,
            keepalive_interval,
            reconnect_delay,
            auto_reconnect,
            structure_source,
        ));

        match run_session::<T>(shared.clone()).await {
            SessionOutcome::Established => Ok(Self {
                shared,
                _transport: PhantomData,
            }),
            SessionOutcome::ConnectFailed(e) | SessionOutcome::HandshakeFailed(e) => {
                // The initial attempt surfaces its error to the caller
                // instead of leaving an unreachable client retrying in the
                // background.
                shared.shutdown.store(true, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        *self.shared.state.read()
    }

    /// True once the handshake completed and the registry is live.
    pub fn is_ready(&self) -> bool {
        self.state() == SessionState::Ready
    }

    /// Send a raw text command. No validation beyond it being text.
    pub async fn send(&self, payload: &str) -> Result<()> {
        self.shared.send(payload).await
    }

    /// Command a control: `jdev/sps/io/{uuid}/{state}`.
    pub async fn command(&self, uuid: &Uuid, state: &str) -> Result<()> {
        self.send(&commands::io_command(uuid, state)).await
    }

    /// Look up a device by identifier.
    pub fn device(&self, uuid: &Uuid) -> Option<DeviceEntry> {
        self.shared.registry.read().get(uuid).cloned()
    }

    /// Snapshot of all registry entries.
    pub fn devices(&self) -> Vec<(Uuid, DeviceEntry)> {
        self.shared
            .registry
            .read()
            .iter()
            .map(|(uuid, entry)| (uuid.clone(), entry.clone()))
            .collect()
    }

    /// Human-readable name for an identifier.
    pub fn display_name(&self, uuid: &Uuid) -> String {
        self.shared.registry.read().display_name(uuid).to_string()
    }

    /// Subscribe to decoded state updates.
    pub fn subscribe(&self) -> broadcast::Receiver<StateUpdate> {
        self.shared.updates.subscribe()
    }

    /// Close the session for good. Suppresses the reconnect cycle.
    pub async fn close(&self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.shared.teardown();
    }
}

/// State shared between the client handle, the reader task and the timers.
struct Shared {
    host: String,
    user: String,
    password: String,
    keepalive_interval: Duration,
    reconnect_delay: Duration,
    auto_reconnect: bool,
    structure_source: Arc<dyn StructureSource>,

    state: RwLock<SessionState>,
    registry: RwLock<Registry>,
    correlator: Correlator,

    /// Outbound text channel of the current transport
    sender: RwLock<Option<mpsc::Sender<String>>>,

    /// Keepalive timer of the current session
    keepalive: Mutex<Option<JoinHandle<()>>>,

    /// Fan-out of decoded updates
    updates: broadcast::Sender<StateUpdate>,

    /// Set by [`Minilink::close`]; suppresses reconnects
    shutdown: AtomicBool,

    /// True while a reconnect timer is pending
    reconnect_armed: AtomicBool,
}

impl Shared {
    fn new(
        host: String,
        user: String,
        password: String,
        keepalive_interval: Duration,
        reconnect_delay: Duration,
        auto_reconnect: bool,
        structure_source: Arc<dyn StructureSource>,
    ) -> Self {
        let (updates, _) = broadcast::channel(64);
        Self {
            host,
            user,
            password,
            keepalive_interval,
            reconnect_delay,
            auto_reconnect,
            structure_source,
            state: RwLock::new(SessionState::Disconnected),
            registry: RwLock::new(Registry::new()),
            correlator: Correlator::new(),
            sender: RwLock::new(None),
            keepalive: Mutex::new(None),
            updates,
            shutdown: AtomicBool::new(false),
            reconnect_armed: AtomicBool::new(false),
        }
    }

    fn set_state(&self, state: SessionState) {
        debug!("session state -> {:?}", state);
        *self.state.write() = state;
    }

    fn state(&self) -> SessionState {
        *self.state.read()
    }

    async fn send(&self, payload: &str) -> Result<()> {
        let tx = self.sender.read().clone();
        match tx {
            Some(tx) => {
                debug!("-> {}", payload);
                tx.send(payload.to_string())
                    .await
                    .map_err(|e| ClientError::SendFailed(e.to_string()))
            }
            None => Err(ClientError::NotConnected),
        }
    }

    /// Tear down the current session: cancel the keepalive, abandon any
    /// correlator waiter, drop the outbound channel. Idempotent.
    fn teardown(&self) {
        self.set_state(SessionState::Closing);
        if let Some(handle) = self.keepalive.lock().take() {
            handle.abort();
        }
        self.correlator.abandon();
        *self.sender.write() = None;
        self.set_state(SessionState::Disconnected);
    }

    fn start_keepalive(self: &Arc<Self>) {
        let shared = self.clone();
        let period = self.keepalive_interval;
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await; // the first tick fires immediately
            loop {
                interval.tick().await;
                if shared.send(commands::KEEPALIVE).await.is_err() {
                    break;
                }
            }
        });
        if let Some(old) = self.keepalive.lock().replace(handle) {
            old.abort();
        }
    }

    /// Route one inbound text frame.
    fn handle_text(&self, text: &str) {
        if !self.correlator.offer(text) {
            debug!("<- {}", text);
        }
    }

    /// Route one inbound binary frame through the header/body pairing.
    ///
    /// `pending` is the "next body type" slot: armed by a header frame,
    /// consumed by exactly the next frame.
    fn handle_binary(&self, data: &Bytes, pending: &mut Option<MessageKind>) {
        if MessageHeader::matches(data) {
            match MessageHeader::parse(data) {
                Ok(header) => *pending = Some(header.kind),
                Err(e) => {
                    warn!("dropping header frame: {}", e);
                    *pending = None;
                }
            }
            return;
        }

        let Some(kind) = pending.take() else {
            warn!(
                "dropping {} byte binary frame not preceded by a message header",
                data.len()
            );
            return;
        };

        if self.state() != SessionState::Ready {
            debug!("dropping {:?} body before session is ready", kind);
            return;
        }

        match kind {
            MessageKind::ValueStates => match decode_value_states(data) {
                Ok(events) => self.apply_value_events(events),
                Err(e) => warn!("dropping value table: {}", e),
            },
            MessageKind::TextStates => match decode_text_states(data) {
                Ok(events) => self.apply_text_events(events),
                Err(e) => warn!("dropping text table: {}", e),
            },
            MessageKind::DaytimerStates => match decode_daytimer_states(data) {
                Ok(event) => {
                    debug!(
                        "daytimer update for {} ({} entries)",
                        self.registry.read().display_name(&event.uuid),
                        event.entries.len()
                    );
                    let _ = self.updates.send(StateUpdate::Daytimer(event));
                }
                Err(e) => warn!("dropping daytimer table: {}", e),
            },
            MessageKind::WeatherStates => match decode_weather_states(data) {
                Ok(event) => {
                    debug!(
                        "weather update for {} ({} entries)",
                        self.registry.read().display_name(&event.uuid),
                        event.entries.len()
                    );
                    let _ = self.updates.send(StateUpdate::Weather(event));
                }
                Err(e) => warn!("dropping weather table: {}", e),
            },
            MessageKind::Text | MessageKind::BinaryFile => {
                debug!("{:?} body ({} bytes)", kind, data.len());
            }
            MessageKind::OutOfService => {
                warn!("miniserver signalled out-of-service");
            }
            MessageKind::Keepalive => {
                debug!("keepalive acknowledged");
            }
        }
    }

    fn apply_value_events(&self, events: Vec<ValueEvent>) {
        {
            let mut registry = self.registry.write();
            for event in &events {
                if let Err(e) = registry.apply(&event.uuid, StateValue::Float(event.value)) {
                    warn!("{}", e);
                }
            }
        }
        for event in events {
            let _ = self.updates.send(StateUpdate::Value(event));
        }
    }

    fn apply_text_events(&self, events: Vec<TextEvent>) {
        {
            let mut registry = self.registry.write();
            for event in &events {
                if let Err(e) =
                    registry.apply(&event.uuid, StateValue::Text(event.text.clone()))
                {
                    warn!("{}", e);
                }
            }
        }
        for event in events {
            let _ = self.updates.send(StateUpdate::Text(event));
        }
    }
}

/// What became of one connect-and-handshake cycle.
enum SessionOutcome {
    /// Handshake completed; the reader task owns the session from here.
    Established,
    /// The transport never opened; no reader task exists.
    ConnectFailed(ClientError),
    /// The transport opened but the handshake failed; the reader task
    /// observes the close and drives the reconnect cycle.
    HandshakeFailed(ClientError),
}

/// Run one session cycle: connect, spawn the writer/reader tasks, drive
/// the handshake.
async fn run_session<T>(shared: Arc<Shared>) -> SessionOutcome
where
    T: Transport + 'static,
    T::Sender: 'static,
    T::Receiver: 'static,
{
    shared.set_state(SessionState::Connecting);

    let url = format!("ws://{}{}", shared.host, WS_PATH);
    let (sender, receiver) = match T::connect(&url).await {
        Ok(pair) => pair,
        Err(e) => {
            shared.set_state(SessionState::Disconnected);
            return SessionOutcome::ConnectFailed(e.into());
        }
    };
    let sender = Arc::new(sender);

    let (tx, mut rx) = mpsc::channel::<String>(100);
    *shared.sender.write() = Some(tx);

    // Writer task
    let writer_sender = sender.clone();
    tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if let Err(e) = writer_sender.send_text(&payload).await {
                error!("send error: {}", e);
                break;
            }
        }
    });

    // Reader task: the session's single consumer
    let reader_shared = shared.clone();
    tokio::spawn(async move {
        read_loop::<T>(reader_shared, receiver).await;
    });

    match handshake(&shared).await {
        Ok(()) => SessionOutcome::Established,
        Err(e) => {
            error!("handshake failed: {}", e);
            let _ = sender.close().await;
            SessionOutcome::HandshakeFailed(e)
        }
    }
}

/// Drive the handshake sequence: challenge key, authenticate, config
/// version, structure fetch, enable push, keepalive.
async fn handshake(shared: &Arc<Shared>) -> Result<()> {
    shared.set_state(SessionState::AwaitingKey);
    let reply = shared.correlator.register(|ll| ll.control == commands::GET_KEY);
    shared.send(commands::GET_KEY).await?;
    let key_reply = await_reply(reply).await?;
    let challenge = key_reply
        .value
        .as_str()
        .ok_or_else(|| ClientError::InvalidChallengeKey("challenge key is not a string".into()))?;

    shared.set_state(SessionState::Authenticating);
    let digest = auth::auth_digest(challenge, &shared.user, &shared.password)?;
    let reply = shared
        .correlator
        .register(|ll| ll.control.starts_with(commands::AUTHENTICATE_PREFIX));
    shared.send(&commands::authenticate(&digest)).await?;
    match await_reply(reply).await {
        Ok(_) => info!("authentication successful"),
        Err(ClientError::RemoteRejected { .. }) => return Err(ClientError::AuthenticationFailed),
        Err(e) => return Err(e),
    }

    shared.set_state(SessionState::FetchingVersion);
    let reply = shared
        .correlator
        .register(|ll| ll.control.contains(commands::CONFIG_VERSION_MATCH));
    shared.send(commands::CONFIG_VERSION).await?;
    let version = match await_reply(reply).await {
        Ok(ll) => ll.value,
        Err(ClientError::RemoteRejected { .. }) => return Err(ClientError::VersionQueryFailed),
        Err(e) => return Err(e),
    };
    info!("config version: {}", version);

    let structure = shared.structure_source.fetch().await?;
    *shared.registry.write() = Registry::from_structure(&structure);
    info!("registry loaded: {} entries", shared.registry.read().len());

    shared.send(commands::ENABLE_STATUS_UPDATE).await?;
    shared.start_keepalive();
    shared.set_state(SessionState::Ready);
    Ok(())
}

async fn await_reply(
    rx: tokio::sync::oneshot::Receiver<Result<LlPayload>>,
) -> Result<LlPayload> {
    // A dropped sender means the waiter was abandoned by session close.
    rx.await.map_err(|_| ClientError::TransportClosed)?
}

/// The single inbound consumer: classifies headers, decodes bodies,
/// resolves correlator waiters. The pending-frame slot lives here and
/// dies with the loop, so a new session always starts clean.
async fn read_loop<T>(shared: Arc<Shared>, mut receiver: T::Receiver)
where
    T: Transport + 'static,
    T::Sender: 'static,
    T::Receiver: 'static,
{
    let mut pending: Option<MessageKind> = None;

    while let Some(event) = receiver.recv().await {
        match event {
            TransportEvent::Connected => {}
            TransportEvent::Text(text) => {
                // Any non-header frame consumes the pending slot.
                pending = None;
                shared.handle_text(&text);
            }
            TransportEvent::Binary(data) => {
                shared.handle_binary(&data, &mut pending);
            }
            TransportEvent::Error(e) => {
                error!("transport error: {}", e);
            }
            TransportEvent::Disconnected { reason } => {
                info!("transport closed: {:?}", reason);
                break;
            }
        }
    }

    shared.teardown();
    schedule_reconnect::<T>(&shared);
}

/// Arm the single reconnect timer, unless one is already pending or the
/// client shut down. Rapid repeated close events collapse into one timer.
fn schedule_reconnect<T>(shared: &Arc<Shared>)
where
    T: Transport + 'static,
    T::Sender: 'static,
    T::Receiver: 'static,
{
    if !shared.auto_reconnect || shared.shutdown.load(Ordering::SeqCst) {
        return;
    }
    if shared
        .reconnect_armed
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return;
    }

    let delay = shared.reconnect_delay;
    info!("reconnecting in {:?}", delay);

    let shared = shared.clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(delay).await;
            shared.reconnect_armed.store(false, Ordering::SeqCst);
            if shared.shutdown.load(Ordering::SeqCst) {
                return;
            }
            match run_session::<T>(shared.clone()).await {
                SessionOutcome::Established => return,
                SessionOutcome::HandshakeFailed(_) => {
                    // The reader observed the close and arms the next timer.
                    return;
                }
                SessionOutcome::ConnectFailed(e) => {
                    warn!("reconnect attempt failed: {}", e);
                    if shared
                        .reconnect_armed
                        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                        .is_err()
                    {
                        return;
                    }
                }
            }
        }
    });
}

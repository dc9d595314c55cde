//! Session tests against an in-process mock transport
//!
//! The mock stands in for the miniserver socket: each test registers a
//! named endpoint, the transport's `connect` hands the server side of the
//! channel pair to the test, and a small responder script answers the
//! handshake commands. This exercises the full session path — handshake
//! sequencing, header/body routing, registry mutation, keepalive,
//! reconnect — without a network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

use minilink_client::{
    commands, ClientError, MinilinkBuilder, Result as ClientResult, StateUpdate, StructureSource,
};
use minilink_core::{StateValue, StructureFile, Uuid, WS_PATH};
use minilink_transport::{
    Result as TransportResult, Transport, TransportError, TransportEvent, TransportReceiver,
    TransportSender,
};

// ============================================================================
// Mock transport
// ============================================================================

/// Server side of one mock connection.
struct ServerConn {
    events: mpsc::UnboundedSender<TransportEvent>,
    commands: mpsc::UnboundedReceiver<String>,
}

impl ServerConn {
    fn text(&self, payload: &str) {
        let _ = self.events.send(TransportEvent::Text(payload.to_string()));
    }

    fn binary(&self, payload: Vec<u8>) {
        let _ = self.events.send(TransportEvent::Binary(Bytes::from(payload)));
    }

    fn error(&self, message: &str) {
        let _ = self.events.send(TransportEvent::Error(message.to_string()));
    }

    fn disconnect(&self) {
        let _ = self.events.send(TransportEvent::Disconnected { reason: None });
    }
}

struct Endpoint {
    connects: Arc<AtomicUsize>,
    conn_tx: mpsc::UnboundedSender<ServerConn>,
}

fn endpoints() -> &'static Mutex<HashMap<String, Endpoint>> {
    static ENDPOINTS: OnceLock<Mutex<HashMap<String, Endpoint>>> = OnceLock::new();
    ENDPOINTS.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Register a mock miniserver under a unique host name.
fn register_host(host: &str) -> (Arc<AtomicUsize>, mpsc::UnboundedReceiver<ServerConn>) {
    let connects = Arc::new(AtomicUsize::new(0));
    let (conn_tx, conn_rx) = mpsc::unbounded_channel();
    endpoints().lock().unwrap().insert(
        host.to_string(),
        Endpoint {
            connects: connects.clone(),
            conn_tx,
        },
    );
    (connects, conn_rx)
}

struct MockTransport;

struct MockSender {
    tx: mpsc::UnboundedSender<String>,
    events: mpsc::UnboundedSender<TransportEvent>,
    connected: Arc<AtomicBool>,
}

#[async_trait]
impl TransportSender for MockSender {
    async fn send_text(&self, payload: &str) -> TransportResult<()> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.tx
            .send(payload.to_string())
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn close(&self) -> TransportResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        let _ = self.events.send(TransportEvent::Disconnected { reason: None });
        Ok(())
    }
}

struct MockReceiver {
    rx: mpsc::UnboundedReceiver<TransportEvent>,
}

#[async_trait]
impl TransportReceiver for MockReceiver {
    async fn recv(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Sender = MockSender;
    type Receiver = MockReceiver;

    async fn connect(url: &str) -> TransportResult<(Self::Sender, Self::Receiver)> {
        let host = url
            .strip_prefix("ws://")
            .and_then(|rest| rest.strip_suffix(WS_PATH))
            .ok_or_else(|| TransportError::InvalidUrl(url.to_string()))?;

        let guard = endpoints().lock().unwrap();
        let endpoint = guard
            .get(host)
            .ok_or_else(|| TransportError::ConnectionFailed(format!("no endpoint for {host}")))?;

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        endpoint.connects.fetch_add(1, Ordering::SeqCst);
        let _ = event_tx.send(TransportEvent::Connected);
        let _ = endpoint.conn_tx.send(ServerConn {
            events: event_tx.clone(),
            commands: cmd_rx,
        });

        Ok((
            MockSender {
                tx: cmd_tx,
                events: event_tx,
                connected: Arc::new(AtomicBool::new(true)),
            },
            MockReceiver { rx: event_rx },
        ))
    }
}

// ============================================================================
// Responder script
// ============================================================================

type CommandLog = Arc<Mutex<Vec<String>>>;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn ll_reply(control: &str, value: &str, code: &str) -> String {
    serde_json::json!({ "LL": { "control": control, "value": value, "Code": code } }).to_string()
}

#[derive(Clone, Copy)]
struct ServerScript {
    challenge: &'static str,
    auth_ok: bool,
    version_ok: bool,
}

impl Default for ServerScript {
    fn default() -> Self {
        Self {
            challenge: "1234",
            auth_ok: true,
            version_ok: true,
        }
    }
}

/// Answer handshake commands until status push is enabled, then hand the
/// live connection back.
async fn serve_handshake(mut conn: ServerConn, script: ServerScript, log: CommandLog) -> ServerConn {
    while let Some(cmd) = conn.commands.recv().await {
        log.lock().unwrap().push(cmd.clone());
        if cmd == commands::GET_KEY {
            conn.text(&ll_reply(commands::GET_KEY, script.challenge, "200"));
        } else if cmd.starts_with(commands::AUTHENTICATE_PREFIX) {
            let code = if script.auth_ok { "200" } else { "401" };
            conn.text(&ll_reply(&cmd, "", code));
        } else if cmd == commands::CONFIG_VERSION {
            let code = if script.version_ok { "200" } else { "500" };
            conn.text(&ll_reply(commands::CONFIG_VERSION, "2023-11-02 21:09:23", code));
        } else if cmd == commands::ENABLE_STATUS_UPDATE {
            break;
        }
    }
    conn
}

// ============================================================================
// Test fixtures
// ============================================================================

const LAMP_UUID: &str = "01020304-0605-0807-0910111213141516";

const LAMP_UUID_BYTES: [u8; 16] = [
    0x04, 0x03, 0x02, 0x01, 0x05, 0x06, 0x07, 0x08, 0x09, 0x10, 0x11, 0x12, 0x13, 0x14, 0x15,
    0x16,
];

const STRUCTURE_JSON: &str = r#"{
    "controls": {
        "01020304-0605-0807-0910111213141516": { "name": "Lamp", "type": "Switch" }
    }
}"#;

struct StaticStructure;

#[async_trait]
impl StructureSource for StaticStructure {
    async fn fetch(&self) -> ClientResult<StructureFile> {
        Ok(serde_json::from_str(STRUCTURE_JSON).unwrap())
    }
}

fn builder(host: &str) -> MinilinkBuilder {
    MinilinkBuilder::new(host)
        .credentials("a", "b")
        .structure_source(StaticStructure)
        .auto_reconnect(false)
}

fn value_table_frames(value: f64) -> (Vec<u8>, Vec<u8>) {
    let header = vec![0x03, 2, 0, 0, 0, 0, 0, 0];
    let mut table = LAMP_UUID_BYTES.to_vec();
    table.extend_from_slice(&value.to_le_bytes());
    (header, table)
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 2s");
}

// ============================================================================
// Handshake tests
// ============================================================================

#[tokio::test]
async fn handshake_establishes_ready_session() {
    init_tracing();
    let (_, mut conn_rx) = register_host("mock-handshake");
    let log: CommandLog = Arc::new(Mutex::new(Vec::new()));

    let server_log = log.clone();
    let server = tokio::spawn(async move {
        let conn = conn_rx.recv().await.expect("no connection");
        serve_handshake(conn, ServerScript::default(), server_log).await
    });

    let client = builder("mock-handshake")
        .connect_with::<MockTransport>()
        .await
        .expect("connect failed");

    assert!(client.is_ready());

    // The server task finishes once status push was enabled, so the log
    // is complete here.
    let conn = server.await.unwrap();
    drop(conn);

    // The handshake sends its commands in a fixed order, with the digest
    // of "a:b" keyed by the hex bytes of "1234".
    let sent = log.lock().unwrap().clone();
    assert_eq!(
        sent,
        vec![
            "jdev/sys/getkey".to_string(),
            "authenticate/48ef7e0de610580c07a92e0cc39bb552a873117c".to_string(),
            "jdev/sps/LoxAPPversion3".to_string(),
            "jdev/sps/enablebinstatusupdate".to_string(),
        ]
    );

    // The registry was built from the structure document.
    let lamp = Uuid::from(LAMP_UUID);
    let entry = client.device(&lamp).expect("lamp not in registry");
    assert_eq!(entry.name, "Lamp");
    assert_eq!(entry.value, None);

    client.close().await;
}

#[tokio::test]
async fn authentication_rejection_fails_connect() {
    init_tracing();
    let (_, mut conn_rx) = register_host("mock-auth-reject");
    let log: CommandLog = Arc::new(Mutex::new(Vec::new()));

    let server_log = log.clone();
    tokio::spawn(async move {
        let conn = conn_rx.recv().await.expect("no connection");
        serve_handshake(
            conn,
            ServerScript {
                auth_ok: false,
                ..ServerScript::default()
            },
            server_log,
        )
        .await
    });

    let err = builder("mock-auth-reject")
        .connect_with::<MockTransport>()
        .await
        .expect_err("connect should fail");
    assert!(matches!(err, ClientError::AuthenticationFailed));
}

#[tokio::test]
async fn version_rejection_fails_connect() {
    init_tracing();
    let (_, mut conn_rx) = register_host("mock-version-reject");
    let log: CommandLog = Arc::new(Mutex::new(Vec::new()));

    let server_log = log.clone();
    tokio::spawn(async move {
        let conn = conn_rx.recv().await.expect("no connection");
        serve_handshake(
            conn,
            ServerScript {
                version_ok: false,
                ..ServerScript::default()
            },
            server_log,
        )
        .await
    });

    let err = builder("mock-version-reject")
        .connect_with::<MockTransport>()
        .await
        .expect_err("connect should fail");
    assert!(matches!(err, ClientError::VersionQueryFailed));
}

#[tokio::test]
async fn close_during_handshake_abandons_waiter() {
    init_tracing();
    let (_, mut conn_rx) = register_host("mock-drop-mid-handshake");

    tokio::spawn(async move {
        let mut conn = conn_rx.recv().await.expect("no connection");
        // Swallow the challenge request and close the connection instead
        // of answering.
        let _ = conn.commands.recv().await;
        conn.disconnect();
        drop(conn);
    });

    let err = builder("mock-drop-mid-handshake")
        .connect_with::<MockTransport>()
        .await
        .expect_err("connect should fail");
    assert!(matches!(err, ClientError::TransportClosed));
}

// ============================================================================
// Live session tests
// ============================================================================

#[tokio::test]
async fn pushed_value_table_updates_registry_and_subscribers() {
    init_tracing();
    let (_, mut conn_rx) = register_host("mock-push");
    let log: CommandLog = Arc::new(Mutex::new(Vec::new()));

    let server_log = log.clone();
    let server = tokio::spawn(async move {
        let conn = conn_rx.recv().await.expect("no connection");
        serve_handshake(conn, ServerScript::default(), server_log).await
    });

    let client = builder("mock-push")
        .connect_with::<MockTransport>()
        .await
        .expect("connect failed");
    let mut updates = client.subscribe();

    let conn = server.await.unwrap();
    let (header, table) = value_table_frames(23.5);
    conn.binary(header);
    conn.binary(table);

    let update = timeout(Duration::from_secs(2), updates.recv())
        .await
        .expect("no update within 2s")
        .expect("update channel closed");
    match update {
        StateUpdate::Value(event) => {
            assert_eq!(event.uuid.as_str(), LAMP_UUID);
            assert_eq!(event.value, 23.5);
        }
        other => panic!("unexpected update: {other:?}"),
    }

    let lamp = Uuid::from(LAMP_UUID);
    assert_eq!(
        client.device(&lamp).unwrap().value,
        Some(StateValue::Float(23.5))
    );

    client.close().await;
}

#[tokio::test]
async fn keepalive_pings_on_interval() {
    init_tracing();
    let (_, mut conn_rx) = register_host("mock-keepalive");
    let log: CommandLog = Arc::new(Mutex::new(Vec::new()));

    let server_log = log.clone();
    let server = tokio::spawn(async move {
        let conn = conn_rx.recv().await.expect("no connection");
        serve_handshake(conn, ServerScript::default(), server_log).await
    });

    let client = builder("mock-keepalive")
        .keepalive_interval(Duration::from_millis(50))
        .connect_with::<MockTransport>()
        .await
        .expect("connect failed");

    let mut conn = server.await.unwrap();
    let ping = timeout(Duration::from_secs(2), conn.commands.recv())
        .await
        .expect("no keepalive within 2s")
        .expect("command channel closed");
    assert_eq!(ping, commands::KEEPALIVE);

    client.close().await;
}

// ============================================================================
// Reconnect tests
// ============================================================================

#[tokio::test]
async fn reconnect_fires_after_delay_not_before() {
    init_tracing();
    let (connects, mut conn_rx) = register_host("mock-reconnect-timing");
    let log: CommandLog = Arc::new(Mutex::new(Vec::new()));

    // First connection: handshake, then error + close in quick succession.
    let server_log = log.clone();
    tokio::spawn(async move {
        let conn = conn_rx.recv().await.expect("no first connection");
        let conn = serve_handshake(conn, ServerScript::default(), server_log.clone()).await;

        conn.error("simulated read error");
        conn.disconnect();
        drop(conn);

        // Second connection after the reconnect delay.
        while let Some(conn) = conn_rx.recv().await {
            let _live = serve_handshake(conn, ServerScript::default(), server_log.clone()).await;
            // Keep it open until the test ends.
            std::future::pending::<()>().await;
        }
    });

    let client = MinilinkBuilder::new("mock-reconnect-timing")
        .credentials("a", "b")
        .structure_source(StaticStructure)
        .reconnect_delay(Duration::from_millis(200))
        .connect_with::<MockTransport>()
        .await
        .expect("connect failed");

    assert_eq!(connects.load(Ordering::SeqCst), 1);

    // Shortly after the close, the timer must not have fired yet.
    sleep(Duration::from_millis(50)).await;
    assert_eq!(connects.load(Ordering::SeqCst), 1, "reconnected too early");

    // After the delay, exactly one reconnect.
    wait_until(|| connects.load(Ordering::SeqCst) == 2).await;
    wait_until(|| client.is_ready()).await;

    // No further attempts stack up behind it.
    sleep(Duration::from_millis(500)).await;
    assert_eq!(connects.load(Ordering::SeqCst), 2, "reconnects stacked");

    client.close().await;
}

#[tokio::test]
async fn explicit_close_suppresses_reconnect() {
    init_tracing();
    let (connects, mut conn_rx) = register_host("mock-close");
    let log: CommandLog = Arc::new(Mutex::new(Vec::new()));

    let server_log = log.clone();
    let server = tokio::spawn(async move {
        let conn = conn_rx.recv().await.expect("no connection");
        serve_handshake(conn, ServerScript::default(), server_log).await
    });

    let client = MinilinkBuilder::new("mock-close")
        .credentials("a", "b")
        .structure_source(StaticStructure)
        .reconnect_delay(Duration::from_millis(50))
        .connect_with::<MockTransport>()
        .await
        .expect("connect failed");

    let conn = server.await.unwrap();
    client.close().await;
    conn.disconnect();
    drop(conn);

    sleep(Duration::from_millis(300)).await;
    assert_eq!(connects.load(Ordering::SeqCst), 1, "reconnected after close");
    assert!(!client.is_ready());
}

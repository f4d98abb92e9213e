//! Resilient ledger-stream client
//!
//! Owns the WebSocket connection lifecycle: subscription to the validated
//! transaction stream, redundant ledger-close fetching, degraded polling
//! when subscribing is refused, session-scoped deduplication, and
//! exponential-backoff reconnection with a bounded attempt budget.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::Utc;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use chimes_common::config::NetworkConfig;
use chimes_common::{ChimesEvent, ConnectionState, EventBus, Notifier, TransactionRecord};

use super::normalizer;
use super::protocol::{self, Command, Inbound, Request, StreamName};

type WsWrite = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsRead = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Reconnection backoff base delay.
const BACKOFF_BASE_MS: u64 = 1000;

/// Reconnection backoff ceiling.
const BACKOFF_CAP_MS: u64 = 30_000;

/// Backoff retries granted before the client gives up.
const MAX_BACKOFF_RETRIES: u32 = 5;

/// How long to wait for a command response before treating the transport as
/// unresponsive.
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Which path a record arrived through (diagnostics only)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordSource {
    /// Live transaction stream push
    Stream,
    /// Redundant expanded fetch after a ledger close
    FallbackFetch,
    /// Degraded-mode ledger polling
    Poll,
}

/// Stream client tunables
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Entry points tried in rotation across reconnect attempts
    pub endpoints: Vec<String>,
    /// Expanded entries released per fallback fetch
    pub fallback_fetch_limit: usize,
    /// Delay between staggered fallback releases
    pub fallback_stagger_ms: u64,
    /// Poll period while degraded
    pub poll_interval_ms: u64,
    /// Backoff base delay (test hook; production keeps the default)
    pub backoff_base_ms: u64,
    /// Backoff delay ceiling
    pub backoff_cap_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoints: NetworkConfig::default().endpoints,
            fallback_fetch_limit: 5,
            fallback_stagger_ms: 250,
            poll_interval_ms: 4000,
            backoff_base_ms: BACKOFF_BASE_MS,
            backoff_cap_ms: BACKOFF_CAP_MS,
        }
    }
}

impl From<&NetworkConfig> for ClientConfig {
    fn from(net: &NetworkConfig) -> Self {
        Self {
            endpoints: net.endpoints.clone(),
            fallback_fetch_limit: net.fallback_fetch_limit,
            fallback_stagger_ms: net.fallback_stagger_ms,
            poll_interval_ms: net.poll_interval_ms,
            ..Self::default()
        }
    }
}

/// Backoff delay for the given 1-based failure count: `min(base × 2^(n−1), cap)`
pub fn backoff_delay_ms(failures: u32, base_ms: u64, cap_ms: u64) -> u64 {
    let shift = failures.saturating_sub(1).min(16);
    base_ms.saturating_mul(1u64 << shift).min(cap_ms)
}

/// How a single connection session ended
enum SessionEnd {
    /// `disconnect()` was called
    Shutdown,
    /// Transport dialed/failed; counts against the reconnect budget
    Failed(String),
}

/// What `establish_subscription` settled on
enum SessionMode {
    /// Live transaction stream (plus ledger closes when granted)
    Streaming,
    /// Both subscribe shapes refused; poll closed ledgers instead
    Polling,
}

enum AwaitError {
    /// The node answered with an error status
    Rejected(String),
    /// The transport died or timed out while waiting
    Transport(String),
}

/// State shared between the public handle and the connection task
struct ClientShared {
    config: ClientConfig,
    state: RwLock<ConnectionState>,
    seen: Mutex<HashSet<String>>,
    notifier: Arc<Notifier<TransactionRecord>>,
    events: EventBus,
    request_id: AtomicU64,
}

impl ClientShared {
    fn next_request_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::SeqCst)
    }

    fn set_state(&self, new_state: ConnectionState) {
        let old_state = {
            let mut state = self.state.write().unwrap();
            let old = *state;
            *state = new_state;
            old
        };
        if old_state != new_state {
            info!("Connection state: {} -> {}", old_state, new_state);
            self.events.emit_lossy(ChimesEvent::ConnectionStateChanged {
                old_state,
                new_state,
                timestamp: Utc::now(),
            });
        }
    }

    /// Shared acceptance path for every record source.
    ///
    /// Normalizes, deduplicates against the session's seen-id set, then
    /// delivers synchronously to all listeners in registration order.
    fn ingest(&self, payload: &Value, source: RecordSource) {
        let record = match normalizer::normalize(payload) {
            Ok(record) => record,
            Err(e) => {
                warn!("Dropping malformed record from {:?}: {}", source, e);
                return;
            }
        };

        if !self.seen.lock().unwrap().insert(record.id.clone()) {
            debug!("Duplicate transaction {} via {:?} discarded", record.id, source);
            return;
        }

        debug!(
            "Accepted {} {} ({} XRP) via {:?}",
            record.kind.name(),
            record.id,
            record.amount,
            source
        );
        self.events.emit_lossy(ChimesEvent::TransactionAccepted {
            record: record.clone(),
            timestamp: Utc::now(),
        });
        self.notifier.publish(&record);
    }
}

/// Ledger-stream client handle
///
/// Lifecycle is bound to explicit `connect()`/`disconnect()` calls; the
/// composition root owns exactly one instance per session.
pub struct LedgerStreamClient {
    shared: Arc<ClientShared>,
    shutdown_tx: Mutex<Option<mpsc::Sender<()>>>,
}

impl LedgerStreamClient {
    /// Create a client wired to the given listener fan-out and event bus
    pub fn new(
        config: ClientConfig,
        notifier: Arc<Notifier<TransactionRecord>>,
        events: EventBus,
    ) -> Self {
        Self {
            shared: Arc::new(ClientShared {
                config,
                state: RwLock::new(ConnectionState::Disconnected),
                seen: Mutex::new(HashSet::new()),
                notifier,
                events,
                request_id: AtomicU64::new(1),
            }),
            shutdown_tx: Mutex::new(None),
        }
    }

    /// Start the connection task.
    ///
    /// Resets the reconnect-attempt counter and the session's seen-id set.
    /// A no-op (with a warning) while a session is already active.
    pub fn connect(&self) -> chimes_common::Result<()> {
        let mut slot = self.shutdown_tx.lock().unwrap();
        match self.state() {
            ConnectionState::Disconnected | ConnectionState::Terminated => {}
            state => {
                warn!("connect() ignored: client is {}", state);
                return Ok(());
            }
        }

        self.shared.seen.lock().unwrap().clear();
        self.shared.set_state(ConnectionState::Connecting);
        let (tx, rx) = mpsc::channel(1);
        *slot = Some(tx);

        let shared = Arc::clone(&self.shared);
        tokio::spawn(connection_loop(shared, rx));
        Ok(())
    }

    /// Tear the session down.
    ///
    /// Best-effort remote unsubscribe, then transport teardown. Idempotent:
    /// safe to call when already disconnected or terminated.
    pub async fn disconnect(&self) {
        let tx = self.shutdown_tx.lock().unwrap().take();
        match tx {
            Some(tx) if tx.send(()).await.is_ok() => {}
            _ => {
                // Connection task already gone; just settle the state
                if self.state() != ConnectionState::Terminated {
                    self.shared.set_state(ConnectionState::Disconnected);
                }
                debug!("disconnect() with no active session");
            }
        }
    }

    /// Register a record listener (delivered in registration order)
    pub fn subscribe<F>(&self, listener: F) -> chimes_common::SubscriptionId
    where
        F: Fn(&TransactionRecord) -> chimes_common::Result<()> + Send + Sync + 'static,
    {
        self.shared.notifier.subscribe(listener)
    }

    /// Remove a record listener
    pub fn unsubscribe(&self, id: chimes_common::SubscriptionId) -> bool {
        self.shared.notifier.unsubscribe(id)
    }

    /// Whether records are currently flowing (live stream or degraded poll)
    pub fn is_connected(&self) -> bool {
        matches!(
            self.state(),
            ConnectionState::Subscribed | ConnectionState::Degraded
        )
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.read().unwrap()
    }

    /// Feed one raw payload through the acceptance path (normalize,
    /// deduplicate, deliver). Used by the connection task for every source;
    /// public so the pipeline can be exercised without a network.
    pub fn ingest(&self, payload: &Value, source: RecordSource) {
        self.shared.ingest(payload, source);
    }

    /// Number of distinct transactions accepted this session
    pub fn seen_count(&self) -> usize {
        self.shared.seen.lock().unwrap().len()
    }
}

/// Connection loop with bounded reconnection.
///
/// Failure `n` (1-based) sleeps `min(base × 2^(n−1), cap)` before retrying;
/// the 6th consecutive failure transitions to `Terminated` and stops. Only a
/// fresh `connect()` resets the counter.
async fn connection_loop(shared: Arc<ClientShared>, mut shutdown_rx: mpsc::Receiver<()>) {
    let mut failures: u32 = 0;

    loop {
        let endpoint = {
            let endpoints = &shared.config.endpoints;
            endpoints[failures as usize % endpoints.len()].clone()
        };
        shared.set_state(if failures == 0 {
            ConnectionState::Connecting
        } else {
            ConnectionState::Reconnecting
        });

        match run_connection(&shared, &endpoint, &mut shutdown_rx).await {
            SessionEnd::Shutdown => {
                shared.set_state(ConnectionState::Disconnected);
                return;
            }
            SessionEnd::Failed(reason) => {
                failures += 1;
                warn!(
                    "Connection to {} lost (failure {}): {}",
                    endpoint, failures, reason
                );

                if failures > MAX_BACKOFF_RETRIES {
                    error!(
                        "Reconnection budget exhausted after {} failures; terminating",
                        failures
                    );
                    shared.set_state(ConnectionState::Terminated);
                    shared.events.emit_lossy(ChimesEvent::ClientTerminated {
                        reason,
                        timestamp: Utc::now(),
                    });
                    return;
                }

                let delay = backoff_delay_ms(
                    failures,
                    shared.config.backoff_base_ms,
                    shared.config.backoff_cap_ms,
                );
                shared.set_state(ConnectionState::Reconnecting);
                debug!("Backing off {} ms before reconnect", delay);
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(delay)) => {}
                    _ = shutdown_rx.recv() => {
                        shared.set_state(ConnectionState::Disconnected);
                        return;
                    }
                }
            }
        }
    }
}

/// Dial one endpoint and run a session until shutdown or transport loss
async fn run_connection(
    shared: &Arc<ClientShared>,
    endpoint: &str,
    shutdown_rx: &mut mpsc::Receiver<()>,
) -> SessionEnd {
    info!("Connecting to {}", endpoint);

    let connect = tokio::time::timeout(RESPONSE_TIMEOUT, connect_async(endpoint)).await;
    let ws = match connect {
        Ok(Ok((ws, _))) => ws,
        Ok(Err(e)) => return SessionEnd::Failed(format!("connect failed: {}", e)),
        Err(_) => return SessionEnd::Failed("connect timed out".to_string()),
    };

    let (mut write, mut read) = ws.split();

    let mode = match establish_subscription(shared, &mut write, &mut read).await {
        Ok(mode) => mode,
        Err(reason) => return SessionEnd::Failed(reason),
    };

    match mode {
        SessionMode::Streaming => {
            shared.set_state(ConnectionState::Subscribed);

            // One server_info round-trip for the connection log
            let id = shared.next_request_id();
            if send_request(&mut write, &Request::new(id, Command::ServerInfo))
                .await
                .is_ok()
            {
                if let Ok(result) = await_response(shared, &mut read, id).await {
                    if let Some(version) = result
                        .get("info")
                        .and_then(|i| i.get("build_version"))
                        .and_then(|v| v.as_str())
                    {
                        info!("Connected to server version {}", version);
                    }
                }
            }

            run_streaming(shared, &mut write, &mut read, shutdown_rx).await
        }
        SessionMode::Polling => {
            shared.set_state(ConnectionState::Degraded);
            run_polling(shared, &mut write, &mut read, shutdown_rx).await
        }
    }
}

/// Issue the subscribe command; retry once with the alternate shape before
/// settling for degraded polling.
async fn establish_subscription(
    shared: &Arc<ClientShared>,
    write: &mut WsWrite,
    read: &mut WsRead,
) -> Result<SessionMode, String> {
    let id = shared.next_request_id();
    let primary = Request::new(
        id,
        Command::Subscribe {
            streams: vec![StreamName::Transactions, StreamName::Ledger],
        },
    );
    send_request(write, &primary).await?;
    match await_response(shared, read, id).await {
        Ok(_) => {
            info!("Subscribed to transaction and ledger streams");
            return Ok(SessionMode::Streaming);
        }
        Err(AwaitError::Transport(e)) => return Err(e),
        Err(AwaitError::Rejected(e)) => {
            warn!("Primary subscribe rejected ({}), retrying alternate shape", e);
        }
    }

    let id = shared.next_request_id();
    let alternate = Request::new(
        id,
        Command::Subscribe {
            streams: vec![StreamName::Transactions],
        },
    );
    send_request(write, &alternate).await?;
    match await_response(shared, read, id).await {
        Ok(_) => {
            info!("Subscribed to transaction stream (no ledger notifications)");
            Ok(SessionMode::Streaming)
        }
        Err(AwaitError::Transport(e)) => Err(e),
        Err(AwaitError::Rejected(e)) => {
            warn!("Alternate subscribe rejected ({}); degrading to ledger polling", e);
            Ok(SessionMode::Polling)
        }
    }
}

/// Subscribed-mode session: live pushes plus redundant ledger-close fetches
async fn run_streaming(
    shared: &Arc<ClientShared>,
    write: &mut WsWrite,
    read: &mut WsRead,
    shutdown_rx: &mut mpsc::Receiver<()>,
) -> SessionEnd {
    let mut pending_fetch: Option<u64> = None;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                teardown(shared, write).await;
                return SessionEnd::Shutdown;
            }
            msg = read.next() => {
                let msg = match msg {
                    None => return SessionEnd::Failed("stream ended".to_string()),
                    Some(Err(e)) => return SessionEnd::Failed(e.to_string()),
                    Some(Ok(msg)) => msg,
                };
                match msg {
                    Message::Text(text) => {
                        if let Some(end) = handle_stream_message(
                            shared, write, &text, &mut pending_fetch,
                        ).await {
                            return end;
                        }
                    }
                    Message::Ping(data) => {
                        let _ = write.send(Message::Pong(data)).await;
                    }
                    Message::Close(_) => {
                        return SessionEnd::Failed("closed by remote".to_string());
                    }
                    _ => {}
                }
            }
        }
    }
}

/// Handle one text frame in streaming mode
async fn handle_stream_message(
    shared: &Arc<ClientShared>,
    write: &mut WsWrite,
    text: &str,
    pending_fetch: &mut Option<u64>,
) -> Option<SessionEnd> {
    match protocol::classify_message(text) {
        Some(Inbound::Transaction(raw)) => {
            shared.ingest(&raw, RecordSource::Stream);
        }
        Some(Inbound::LedgerClosed {
            ledger_index,
            txn_count,
        }) if txn_count > 0 => {
            // Redundancy against stream messages silently dropped by the
            // transport: fetch the closed ledger's expanded transactions.
            debug!(
                "Ledger {} closed with {} transactions, fetching",
                ledger_index, txn_count
            );
            let id = shared.next_request_id();
            let fetch = Request::new(
                id,
                Command::Ledger {
                    ledger_index,
                    transactions: true,
                    expand: true,
                },
            );
            if let Err(e) = send_request(write, &fetch).await {
                return Some(SessionEnd::Failed(e));
            }
            *pending_fetch = Some(id);
        }
        Some(Inbound::Response { id, result }) if Some(id) == *pending_fetch => {
            *pending_fetch = None;
            release_fetched(shared, result);
        }
        Some(Inbound::Failure { id, message }) => {
            warn!("Command {:?} failed: {}", id, message);
            if id == *pending_fetch {
                *pending_fetch = None;
            }
        }
        _ => {}
    }
    None
}

/// Release fetched ledger entries to listeners, bounded and staggered so a
/// whole ledger never bursts into the audio engine at once.
fn release_fetched(shared: &Arc<ClientShared>, result: Value) {
    let entries = protocol::expanded_transactions(&result);
    if entries.is_empty() {
        return;
    }
    let limit = shared.config.fallback_fetch_limit;
    if entries.len() > limit {
        debug!(
            "Releasing first {} of {} fetched ledger transactions",
            limit,
            entries.len()
        );
    }
    let stagger = Duration::from_millis(shared.config.fallback_stagger_ms);
    let shared = Arc::clone(shared);
    tokio::spawn(async move {
        for entry in entries.into_iter().take(limit) {
            // Stop releasing once the session is gone
            let state = *shared.state.read().unwrap();
            if !matches!(
                state,
                ConnectionState::Subscribed | ConnectionState::Degraded
            ) {
                break;
            }
            shared.ingest(&entry, RecordSource::FallbackFetch);
            tokio::time::sleep(stagger).await;
        }
    });
}

/// Degraded-mode session: periodically fetch newly closed ledgers
async fn run_polling(
    shared: &Arc<ClientShared>,
    write: &mut WsWrite,
    read: &mut WsRead,
    shutdown_rx: &mut mpsc::Receiver<()>,
) -> SessionEnd {
    let mut poll = tokio::time::interval(Duration::from_millis(shared.config.poll_interval_ms));
    poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut last_index: u64 = 0;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                teardown(shared, write).await;
                return SessionEnd::Shutdown;
            }
            _ = poll.tick() => {}
        }

        let id = shared.next_request_id();
        if let Err(e) = send_request(write, &Request::new(id, Command::LedgerCurrent)).await {
            return SessionEnd::Failed(e);
        }
        let index = match await_response(shared, read, id).await {
            Ok(result) => protocol::current_ledger_index(&result),
            Err(AwaitError::Transport(e)) => return SessionEnd::Failed(e),
            Err(AwaitError::Rejected(e)) => {
                warn!("ledger_current rejected: {}", e);
                continue;
            }
        };
        let Some(index) = index else { continue };
        if index <= last_index {
            continue;
        }
        last_index = index;

        let id = shared.next_request_id();
        let fetch = Request::new(
            id,
            Command::Ledger {
                ledger_index: index,
                transactions: true,
                expand: true,
            },
        );
        if let Err(e) = send_request(write, &fetch).await {
            return SessionEnd::Failed(e);
        }
        match await_response(shared, read, id).await {
            Ok(result) => release_fetched(shared, result),
            Err(AwaitError::Transport(e)) => return SessionEnd::Failed(e),
            Err(AwaitError::Rejected(e)) => warn!("Ledger fetch rejected: {}", e),
        }
    }
}

/// Best-effort remote unsubscribe followed by transport close
async fn teardown(shared: &Arc<ClientShared>, write: &mut WsWrite) {
    let unsubscribe = Request::new(
        shared.next_request_id(),
        Command::Unsubscribe {
            streams: vec![StreamName::Transactions, StreamName::Ledger],
        },
    );
    if let Err(e) = send_request(write, &unsubscribe).await {
        debug!("Unsubscribe on teardown failed (ignored): {}", e);
    }
    let _ = write.send(Message::Close(None)).await;
    info!("Disconnected from ledger stream");
}

async fn send_request(write: &mut WsWrite, request: &Request) -> Result<(), String> {
    write
        .send(Message::Text(request.to_json().into()))
        .await
        .map_err(|e| format!("send failed: {}", e))
}

/// Wait for the response matching `id`, ingesting any transactions that
/// arrive in the meantime so the stream never stalls behind a command.
async fn await_response(
    shared: &Arc<ClientShared>,
    read: &mut WsRead,
    id: u64,
) -> Result<Value, AwaitError> {
    let wait = tokio::time::timeout(RESPONSE_TIMEOUT, async {
        while let Some(msg) = read.next().await {
            match msg {
                Ok(Message::Text(text)) => match protocol::classify_message(&text) {
                    Some(Inbound::Response { id: rid, result }) if rid == id => {
                        return Ok(result);
                    }
                    Some(Inbound::Failure { id: rid, message }) if rid == Some(id) => {
                        return Err(AwaitError::Rejected(message));
                    }
                    Some(Inbound::Transaction(raw)) => {
                        shared.ingest(&raw, RecordSource::Stream);
                    }
                    _ => {}
                },
                Ok(Message::Close(_)) => {
                    return Err(AwaitError::Transport("closed by remote".to_string()));
                }
                Err(e) => return Err(AwaitError::Transport(e.to_string())),
                _ => {}
            }
        }
        Err(AwaitError::Transport("stream ended".to_string()))
    })
    .await;

    match wait {
        Ok(result) => result,
        Err(_) => Err(AwaitError::Transport("response timed out".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn test_client(config: ClientConfig) -> (LedgerStreamClient, Arc<AtomicUsize>) {
        let notifier = Arc::new(Notifier::new());
        let delivered = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&delivered);
        notifier.subscribe(move |_record: &TransactionRecord| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let client = LedgerStreamClient::new(config, notifier, EventBus::new(64));
        (client, delivered)
    }

    fn payload(hash: &str) -> Value {
        json!({
            "type": "transaction",
            "ledger_index": 1,
            "transaction": {
                "hash": hash,
                "TransactionType": "Payment",
                "Account": "rSender",
                "Amount": "2000000",
                "Fee": "12",
                "date": 0
            }
        })
    }

    #[test]
    fn test_backoff_sequence() {
        let delays: Vec<u64> = (1..=5)
            .map(|n| backoff_delay_ms(n, 1000, 30_000))
            .collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16_000]);

        // The cap holds even for hypothetical later attempts
        assert_eq!(backoff_delay_ms(6, 1000, 30_000), 30_000);
        assert_eq!(backoff_delay_ms(40, 1000, 30_000), 30_000);
    }

    #[tokio::test]
    async fn test_ingest_deduplicates_across_sources() {
        let (client, delivered) = test_client(ClientConfig::default());

        client.ingest(&payload("AAAA"), RecordSource::Stream);
        client.ingest(&payload("AAAA"), RecordSource::FallbackFetch);
        client.ingest(&payload("BBBB"), RecordSource::FallbackFetch);

        assert_eq!(delivered.load(Ordering::SeqCst), 2);
        assert_eq!(client.seen_count(), 2);
    }

    #[tokio::test]
    async fn test_ingest_drops_malformed() {
        let (client, delivered) = test_client(ClientConfig::default());

        client.ingest(&json!({"transaction": {"Account": "rX"}}), RecordSource::Stream);
        client.ingest(&json!("nonsense"), RecordSource::Stream);

        assert_eq!(delivered.load(Ordering::SeqCst), 0);
        assert_eq!(client.seen_count(), 0);
    }

    #[tokio::test]
    async fn test_initial_state() {
        let (client, _) = test_client(ClientConfig::default());
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let (client, _) = test_client(ClientConfig::default());
        client.disconnect().await;
        client.disconnect().await;
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_terminates_after_budget() {
        let config = ClientConfig {
            endpoints: vec!["ws://127.0.0.1:1".to_string()],
            backoff_base_ms: 1,
            backoff_cap_ms: 10,
            ..ClientConfig::default()
        };
        let (client, _) = test_client(config);
        let mut rx = client.shared.events.subscribe();

        client.connect().unwrap();

        // 6 consecutive dial failures with millisecond backoff
        let terminated = tokio::time::timeout(Duration::from_secs(30), async {
            loop {
                match rx.recv().await {
                    Ok(ChimesEvent::ClientTerminated { .. }) => break,
                    Ok(_) => continue,
                    Err(e) => panic!("event bus closed: {}", e),
                }
            }
        })
        .await;

        assert!(terminated.is_ok(), "expected ClientTerminated event");
        assert_eq!(client.state(), ConnectionState::Terminated);

        // A fresh connect() resets the budget and starts over
        client.connect().unwrap();
        assert_ne!(client.state(), ConnectionState::Terminated);
        client.disconnect().await;
    }
}

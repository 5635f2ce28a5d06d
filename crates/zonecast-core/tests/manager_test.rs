//! Behavioural tests for `StreamManager` over an in-memory transport.
//!
//! Time is paused, so retry delays and heartbeat timeouts elapse as soon
//! as the runtime goes idle.
#![allow(clippy::unwrap_used)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::StreamExt;
use futures_util::future::BoxFuture;
use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use url::Url;

use zonecast_api::{Error, FrameStream, HeaderMap, ReconnectConfig, Transport};
use zonecast_core::{
    ConnectionHandlers, ConnectionId, ConnectionState, CoreError, Disconnect, Endpoints,
    ManagerConfig, StateChange, StreamManager, TokenStore, ZoneKey, ZoneUpdate,
};

// ── Fake transport ──────────────────────────────────────────────────

type FrameTx = mpsc::UnboundedSender<Result<String, Error>>;

struct Opened {
    url: Url,
    auth: Option<String>,
    tx: Option<FrameTx>,
}

#[derive(Default)]
struct FakeState {
    opens: Vec<Opened>,
    /// Statuses to refuse the next opens with, in order.
    refuse_next: VecDeque<u16>,
    refuse_all: bool,
    /// Number of upcoming opens that never resolve.
    stall_next: usize,
}

/// Records every open and hands back a channel-fed frame stream.
#[derive(Clone, Default)]
struct FakeTransport {
    state: Arc<Mutex<FakeState>>,
}

impl FakeTransport {
    fn refusing() -> Self {
        let fake = Self::default();
        fake.state.lock().unwrap().refuse_all = true;
        fake
    }

    fn refuse_next(&self, statuses: &[u16]) {
        self.state.lock().unwrap().refuse_next.extend(statuses);
    }

    fn stall_next(&self, opens: usize) {
        self.state.lock().unwrap().stall_next += opens;
    }

    fn open_count(&self) -> usize {
        self.state.lock().unwrap().opens.len()
    }

    fn url(&self, idx: usize) -> Url {
        self.state.lock().unwrap().opens[idx].url.clone()
    }

    fn auth(&self, idx: usize) -> Option<String> {
        self.state.lock().unwrap().opens[idx].auth.clone()
    }

    fn push(&self, item: Result<String, Error>) {
        let state = self.state.lock().unwrap();
        let tx = state.opens.last().and_then(|o| o.tx.as_ref()).unwrap();
        let _ = tx.send(item);
    }

    fn send(&self, frame: &Value) {
        self.push(Ok(frame.to_string()));
    }

    fn send_raw(&self, frame: &str) {
        self.push(Ok(frame.to_owned()));
    }

    fn fail(&self) {
        self.push(Err(Error::Stream("connection reset".into())));
    }
}

impl Transport for FakeTransport {
    fn open(&self, url: &Url, headers: HeaderMap) -> BoxFuture<'static, Result<FrameStream, Error>> {
        let mut state = self.state.lock().unwrap();
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        if state.stall_next > 0 {
            state.stall_next -= 1;
            state.opens.push(Opened {
                url: url.clone(),
                auth,
                tx: None,
            });
            return futures_util::future::pending().boxed();
        }

        let refused = if state.refuse_all {
            Some(503)
        } else {
            state.refuse_next.pop_front()
        };

        if let Some(status) = refused {
            state.opens.push(Opened {
                url: url.clone(),
                auth,
                tx: None,
            });
            return async move {
                Err::<FrameStream, _>(Error::HttpStatus {
                    status,
                    body: String::new(),
                })
            }
            .boxed();
        }

        let (tx, rx) = mpsc::unbounded_channel();
        state.opens.push(Opened {
            url: url.clone(),
            auth,
            tx: Some(tx),
        });

        let frames: FrameStream =
            futures_util::stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|item| (item, rx))
            })
            .boxed();
        async move { Ok(frames) }.boxed()
    }
}

// ── Handler recorder ────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Ev {
    Open,
    Message(Value),
    Error(CoreError),
}

#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<Ev>>>);

impl Recorder {
    fn handlers(&self) -> ConnectionHandlers {
        let (a, b, c) = (self.clone(), self.clone(), self.clone());
        ConnectionHandlers::new()
            .on_open(move || a.0.lock().unwrap().push(Ev::Open))
            .on_message(move |v| b.0.lock().unwrap().push(Ev::Message(v.clone())))
            .on_error(move |e| c.0.lock().unwrap().push(Ev::Error(e.clone())))
    }

    fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }

    fn opens(&self) -> usize {
        self.count(|e| matches!(e, Ev::Open))
    }

    fn messages(&self) -> Vec<Value> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                Ev::Message(v) => Some(v.clone()),
                _ => None,
            })
            .collect()
    }

    fn errors(&self) -> Vec<CoreError> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                Ev::Error(err) => Some(err.clone()),
                _ => None,
            })
            .collect()
    }

    fn count(&self, pred: impl Fn(&Ev) -> bool) -> usize {
        self.0.lock().unwrap().iter().filter(|e| pred(e)).count()
    }
}

type Seen = Arc<Mutex<Vec<Value>>>;

fn sink(seen: &Seen) -> impl Fn(&ZoneUpdate) + Send + Sync + 'static {
    let seen = Arc::clone(seen);
    move |u: &ZoneUpdate| seen.lock().unwrap().push(u.to_value())
}

// ── Helpers ─────────────────────────────────────────────────────────

fn endpoints() -> Endpoints {
    let base = Url::parse("http://plant.test/").unwrap();
    Endpoints::from_base(&base, "/api/sse/stream", "/api/sse/zone").unwrap()
}

fn token(value: &str) -> TokenStore {
    TokenStore::with_token(SecretString::from(value.to_owned()))
}

fn manager(transport: &FakeTransport, tokens: &TokenStore) -> StreamManager {
    manager_with(transport, tokens, ManagerConfig::default())
}

fn manager_with(
    transport: &FakeTransport,
    tokens: &TokenStore,
    config: ManagerConfig,
) -> StreamManager {
    StreamManager::new(
        config,
        endpoints(),
        Arc::new(transport.clone()),
        Arc::new(tokens.clone()),
    )
    .unwrap()
}

/// Poll `cond` while letting (virtual) time move in small steps.
async fn wait_until(what: &str, cond: impl Fn() -> bool) {
    for _ in 0..40_000 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}

// ── At-most-one connection per id ───────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_connect_main_twice_reuses_connection() {
    let transport = FakeTransport::default();
    let mgr = manager(&transport, &token("tok"));
    let rec = Recorder::default();

    let first = mgr.connect_main(rec.handlers());
    let second = mgr.connect_main(rec.handlers());
    wait_until("main open", || rec.opens() == 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(transport.open_count(), 1);
    assert_eq!(first.id(), Some(&ConnectionId::Main));
    assert_eq!(second.id(), Some(&ConnectionId::Main));
    assert_eq!(mgr.live_connections(), vec![ConnectionId::Main]);
    assert_eq!(
        mgr.connection_state(&ConnectionId::Main),
        ConnectionState::Connected
    );
    assert_eq!(transport.auth(0).as_deref(), Some("Bearer tok"));
    assert_eq!(transport.url(0).as_str(), "http://plant.test/api/sse/stream");
}

// ── Fan-out ─────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_main_stream_fans_out_per_zone() {
    let transport = FakeTransport::default();
    let mgr = manager(&transport, &token("tok"));
    let rec = Recorder::default();

    let (cb1, cb2, cb3, cb4): (Seen, Seen, Seen, Seen) = Default::default();
    let _s1 = mgr.subscribe("A01", sink(&cb1)).unwrap();
    let _s2 = mgr.subscribe("A01", sink(&cb2)).unwrap();
    let _s3 = mgr.subscribe("B02", sink(&cb3)).unwrap();
    let _s4 = mgr.subscribe("C03", sink(&cb4)).unwrap();

    let _conn = mgr.connect_main(rec.handlers());
    wait_until("main open", || transport.open_count() == 1 && rec.opens() == 1).await;

    let frame = json!({ "data": [ { "zoneName": "a01", "v": 1 }, { "zoneName": "B02", "v": 2 } ] });
    transport.send(&frame);
    wait_until("frame handled", || rec.messages().len() == 1).await;

    assert_eq!(*cb1.lock().unwrap(), vec![json!({ "zoneName": "a01", "v": 1 })]);
    assert_eq!(*cb2.lock().unwrap(), vec![json!({ "zoneName": "a01", "v": 1 })]);
    assert_eq!(*cb3.lock().unwrap(), vec![json!({ "zoneName": "B02", "v": 2 })]);
    assert!(cb4.lock().unwrap().is_empty());
    assert_eq!(rec.messages(), vec![frame]);
}

#[tokio::test]
async fn test_zone_matching_is_case_insensitive() {
    let transport = FakeTransport::default();
    let mgr = manager(&transport, &token("tok"));

    let (lower, upper): (Seen, Seen) = Default::default();
    let _l = mgr.subscribe("a01", sink(&lower)).unwrap();
    let _u = mgr.subscribe("B02", sink(&upper)).unwrap();

    mgr.dispatch(&json!({ "data": [ { "zoneName": "A01" }, { "zoneName": "b02" } ] }));

    assert_eq!(lower.lock().unwrap().len(), 1);
    assert_eq!(upper.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_panicking_subscriber_does_not_block_others() {
    let transport = FakeTransport::default();
    let mgr = manager(&transport, &token("tok"));
    let rec = Recorder::default();

    let (cb2, cb3): (Seen, Seen) = Default::default();
    let _s1 = mgr.subscribe("A01", |_| panic!("subscriber bug")).unwrap();
    let _s2 = mgr.subscribe("A01", sink(&cb2)).unwrap();
    let _s3 = mgr.subscribe("B02", sink(&cb3)).unwrap();

    let _conn = mgr.connect_main(rec.handlers());
    wait_until("main open", || rec.opens() == 1).await;

    transport.send(&json!({ "data": [ { "zoneName": "A01" }, { "zoneName": "B02" } ] }));
    wait_until("frame handled", || rec.messages().len() == 1).await;

    assert_eq!(cb2.lock().unwrap().len(), 1);
    assert_eq!(cb3.lock().unwrap().len(), 1);
    assert!(rec.errors().is_empty(), "subscriber panics are not connection errors");
    assert_eq!(
        mgr.connection_state(&ConnectionId::Main),
        ConnectionState::Connected
    );
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_from_subscriber_suppresses_on_message() {
    let transport = FakeTransport::default();
    let mgr = manager(&transport, &token("tok"));
    let rec = Recorder::default();

    let handle: Arc<Mutex<Option<Disconnect>>> = Arc::default();
    let slot = Arc::clone(&handle);
    let _sub = mgr
        .subscribe("A01", move |_| {
            if let Some(conn) = slot.lock().unwrap().as_ref() {
                conn.disconnect();
            }
        })
        .unwrap();

    let conn = mgr.connect_main(rec.handlers());
    *handle.lock().unwrap() = Some(conn);
    wait_until("main open", || rec.opens() == 1).await;

    transport.send(&json!({ "data": [ { "zoneName": "A01" } ] }));
    wait_until("disconnected", || !mgr.is_live(&ConnectionId::Main)).await;
    tokio::time::sleep(Duration::from_secs(300)).await;

    assert!(rec.messages().is_empty(), "on_message fired after disconnect");
    assert!(rec.errors().is_empty());
    assert_eq!(transport.open_count(), 1);
    assert_eq!(
        mgr.connection_state(&ConnectionId::Main),
        ConnectionState::Disconnected
    );
}

#[tokio::test]
async fn test_unsubscribe_removes_exactly_one_callback() {
    let transport = FakeTransport::default();
    let mgr = manager(&transport, &token("tok"));

    let (cb1, cb2): (Seen, Seen) = Default::default();
    let s1 = mgr.subscribe("A01", sink(&cb1)).unwrap();
    let _s2 = mgr.subscribe("A01", sink(&cb2)).unwrap();

    assert!(s1.unsubscribe());
    mgr.dispatch(&json!({ "data": [ { "zoneName": "A01", "v": 9 } ] }));

    assert!(cb1.lock().unwrap().is_empty());
    assert_eq!(*cb2.lock().unwrap(), vec![json!({ "zoneName": "A01", "v": 9 })]);
    assert_eq!(mgr.registry().subscriber_count(&ZoneKey::new("a01").unwrap()), 1);
}

// ── Frames ──────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_malformed_frame_keeps_stream_open() {
    let transport = FakeTransport::default();
    let mgr = manager(&transport, &token("tok"));
    let rec = Recorder::default();

    let _conn = mgr.connect_main(rec.handlers());
    wait_until("main open", || rec.opens() == 1).await;

    transport.send_raw("{not json");
    transport.send(&json!({ "data": [] }));
    wait_until("valid frame", || rec.messages().len() == 1).await;

    let errors = rec.errors();
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], CoreError::Parse { id: ConnectionId::Main, .. }));
    assert_eq!(transport.open_count(), 1, "parse errors must not reconnect");
    assert_eq!(
        mgr.connection_state(&ConnectionId::Main),
        ConnectionState::Connected
    );
}

#[tokio::test(start_paused = true)]
async fn test_zone_stream_bypasses_dispatcher() {
    let transport = FakeTransport::default();
    let mgr = manager(&transport, &token("tok"));
    let rec = Recorder::default();

    let seen: Seen = Arc::default();
    let _sub = mgr.subscribe("A01", sink(&seen)).unwrap();

    let conn = mgr.connect_zone("a01", rec.handlers()).unwrap();
    wait_until("zone open", || rec.opens() == 1).await;

    let zone_id = ConnectionId::Zone(ZoneKey::new("A01").unwrap());
    assert_eq!(conn.id(), Some(&zone_id));
    assert_eq!(
        transport.url(0).as_str(),
        "http://plant.test/api/sse/zone?zoneId=A01"
    );

    let update = json!({ "zoneName": "A01", "temperature": 22.5 });
    transport.send(&update);
    wait_until("zone frame", || rec.messages().len() == 1).await;

    assert_eq!(rec.messages(), vec![update]);
    assert!(seen.lock().unwrap().is_empty());
    assert_eq!(mgr.connection_state(&zone_id), ConnectionState::Connected);
    assert_eq!(
        mgr.connection_state(&ConnectionId::Main),
        ConnectionState::Disconnected
    );
}

#[tokio::test]
async fn test_connect_zone_rejects_empty_zone() {
    let mgr = manager(&FakeTransport::default(), &token("tok"));
    let err = mgr.connect_zone("  ", ConnectionHandlers::new()).unwrap_err();
    assert!(matches!(err, CoreError::InvalidZone { .. }));
    assert!(mgr.live_connections().is_empty());
}

// ── Retry / backoff ─────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_retry_bound() {
    let transport = FakeTransport::refusing();
    let config = ManagerConfig {
        reconnect: ReconnectConfig {
            max_retries: 3,
            ..ReconnectConfig::default()
        },
        ..ManagerConfig::default()
    };
    let mgr = manager_with(&transport, &token("tok"), config);
    let rec = Recorder::default();

    let _conn = mgr.connect_main(rec.handlers());
    wait_until("retries exhausted", || !mgr.is_live(&ConnectionId::Main)).await;

    // Initial attempt plus three reconnects.
    assert_eq!(transport.open_count(), 4);
    assert_eq!(
        mgr.connection_state(&ConnectionId::Main),
        ConnectionState::Error
    );

    let errors = rec.errors();
    assert_eq!(errors.len(), 5);
    assert!(errors[..4]
        .iter()
        .all(|e| matches!(e, CoreError::Transport { status: Some(503), .. })));
    assert!(matches!(
        errors[4],
        CoreError::RetriesExhausted { attempts: 3, .. }
    ));

    // Nothing else is scheduled.
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(transport.open_count(), 4);
    assert_eq!(rec.len(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_stalled_open_times_out_and_retries() {
    let transport = FakeTransport::default();
    transport.stall_next(1);
    let mgr = manager(&transport, &token("tok"));
    let rec = Recorder::default();

    let _conn = mgr.connect_main(rec.handlers());
    wait_until("open timed out", || rec.errors().len() == 1).await;

    match &rec.errors()[0] {
        CoreError::Transport { id, reason, status } => {
            assert_eq!(*id, ConnectionId::Main);
            assert_eq!(*status, None);
            assert!(reason.contains("did not open"), "reason: {reason}");
        }
        other => panic!("expected Transport, got {other:?}"),
    }

    wait_until("second attempt opens", || rec.opens() == 1).await;
    assert_eq!(transport.open_count(), 2);
    assert_eq!(
        mgr.connection_state(&ConnectionId::Main),
        ConnectionState::Connected
    );
}

#[tokio::test(start_paused = true)]
async fn test_stalled_opens_count_against_retry_budget() {
    let transport = FakeTransport::default();
    transport.stall_next(usize::MAX);
    let config = ManagerConfig {
        reconnect: ReconnectConfig {
            max_retries: 1,
            ..ReconnectConfig::default()
        },
        ..ManagerConfig::default()
    };
    let mgr = manager_with(&transport, &token("tok"), config);
    let rec = Recorder::default();

    let _conn = mgr.connect_main(rec.handlers());
    wait_until("gave up", || !mgr.is_live(&ConnectionId::Main)).await;

    assert_eq!(transport.open_count(), 2);
    let errors = rec.errors();
    assert_eq!(errors.len(), 3);
    assert!(matches!(errors[2], CoreError::RetriesExhausted { attempts: 1, .. }));
    assert_eq!(
        mgr.connection_state(&ConnectionId::Main),
        ConnectionState::Error
    );
}

#[tokio::test(start_paused = true)]
async fn test_successful_open_resets_retry_budget() {
    let transport = FakeTransport::default();
    transport.refuse_next(&[503, 503, 503]);
    let mgr = manager(&transport, &token("tok"));
    let rec = Recorder::default();

    let _conn = mgr.connect_main(rec.handlers());
    wait_until("fourth attempt opens", || rec.opens() == 1).await;
    assert_eq!(transport.open_count(), 4);

    // Budget is fresh again: a mid-stream failure still reconnects.
    transport.fail();
    wait_until("reconnected", || rec.opens() == 2).await;
    assert_eq!(transport.open_count(), 5);
    assert_eq!(
        mgr.connection_state(&ConnectionId::Main),
        ConnectionState::Connected
    );
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_reuses_token_from_connect() {
    let transport = FakeTransport::default();
    let tokens = token("first");
    let mgr = manager(&transport, &tokens);
    let rec = Recorder::default();

    let conn = mgr.connect_main(rec.handlers());
    wait_until("open", || rec.opens() == 1).await;

    tokens.set(SecretString::from("second".to_owned()));
    transport.fail();
    wait_until("reconnected", || rec.opens() == 2).await;
    assert_eq!(transport.auth(1).as_deref(), Some("Bearer first"));

    conn.disconnect();
    let _conn = mgr.connect_main(rec.handlers());
    wait_until("fresh connect", || rec.opens() == 3).await;
    assert_eq!(transport.auth(2).as_deref(), Some("Bearer second"));
}

// ── Heartbeat ───────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_silent_stream_is_reconnected() {
    let transport = FakeTransport::default();
    let mgr = manager(&transport, &token("tok"));
    let rec = Recorder::default();

    let _conn = mgr.connect_main(rec.handlers());
    wait_until("open", || rec.opens() == 1).await;

    // No frames at all: stale at the 90s tick, reconnect 2s later.
    wait_until("stale reconnect", || rec.opens() == 2).await;

    let errors = rec.errors();
    assert_eq!(errors.len(), 1);
    match &errors[0] {
        CoreError::StaleConnection { id, silent_for } => {
            assert_eq!(*id, ConnectionId::Main);
            assert!(*silent_for > Duration::from_secs(60));
        }
        other => panic!("expected StaleConnection, got {other:?}"),
    }
    assert_eq!(transport.open_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_frames_keep_heartbeat_satisfied() {
    let transport = FakeTransport::default();
    let mgr = manager(&transport, &token("tok"));
    let rec = Recorder::default();

    let _conn = mgr.connect_main(rec.handlers());
    wait_until("open", || rec.opens() == 1).await;

    for n in 0..8 {
        tokio::time::sleep(Duration::from_secs(20)).await;
        transport.send(&json!({ "data": [], "n": n }));
    }
    wait_until("all frames", || rec.messages().len() == 8).await;

    assert!(rec.errors().is_empty());
    assert_eq!(transport.open_count(), 1);
}

// ── Disconnect ──────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_disconnect_is_idempotent_and_silences_handlers() {
    let transport = FakeTransport::default();
    let mgr = manager(&transport, &token("tok"));
    let rec = Recorder::default();

    let conn = mgr.connect_main(rec.handlers());
    wait_until("open", || rec.opens() == 1).await;
    let before = rec.len();

    conn.disconnect();
    conn.disconnect();

    assert_eq!(
        mgr.connection_state(&ConnectionId::Main),
        ConnectionState::Disconnected
    );
    assert!(!mgr.is_live(&ConnectionId::Main));

    transport.send(&json!({ "data": [] }));
    transport.fail();
    tokio::time::sleep(Duration::from_secs(300)).await;

    assert_eq!(rec.len(), before, "handler fired after disconnect");
    assert_eq!(transport.open_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_cancels_pending_retry() {
    let transport = FakeTransport::refusing();
    let mgr = manager(&transport, &token("tok"));
    let rec = Recorder::default();

    let conn = mgr.connect_main(rec.handlers());
    wait_until("first failure", || rec.errors().len() == 1).await;
    assert_eq!(
        mgr.connection_state(&ConnectionId::Main),
        ConnectionState::Error
    );

    conn.disconnect();
    tokio::time::sleep(Duration::from_secs(120)).await;

    assert_eq!(transport.open_count(), 1);
    assert_eq!(rec.errors().len(), 1);
    assert_eq!(
        mgr.connection_state(&ConnectionId::Main),
        ConnectionState::Disconnected
    );
}

#[tokio::test(start_paused = true)]
async fn test_stale_handle_leaves_replacement_alone() {
    let transport = FakeTransport::default();
    let mgr = manager(&transport, &token("tok"));
    let rec = Recorder::default();

    let old = mgr.connect_main(rec.handlers());
    old.disconnect();
    let _new = mgr.connect_main(rec.handlers());
    wait_until("replacement open", || rec.opens() == 1).await;

    old.disconnect();
    assert!(mgr.is_live(&ConnectionId::Main));
    assert_eq!(
        mgr.connection_state(&ConnectionId::Main),
        ConnectionState::Connected
    );
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_all() {
    let transport = FakeTransport::default();
    let mgr = manager(&transport, &token("tok"));
    let rec = Recorder::default();

    let _main = mgr.connect_main(rec.handlers());
    let _zone = mgr.connect_zone("B02", rec.handlers()).unwrap();
    wait_until("both open", || rec.opens() == 2).await;
    assert_eq!(mgr.live_connections().len(), 2);

    mgr.disconnect_all();

    assert!(mgr.live_connections().is_empty());
    assert_eq!(
        mgr.connection_state(&ConnectionId::Main),
        ConnectionState::Disconnected
    );
    assert_eq!(
        mgr.connection_state(&"B02".parse().unwrap()),
        ConnectionState::Disconnected
    );
}

// ── Authentication ──────────────────────────────────────────────────

#[tokio::test]
async fn test_missing_token_short_circuits() {
    let transport = FakeTransport::default();
    let mgr = manager(&transport, &TokenStore::new());
    let rec = Recorder::default();

    let conn = mgr.connect_main(rec.handlers());

    // Reported synchronously, before any await.
    let errors = rec.errors();
    assert_eq!(errors.len(), 1);
    assert!(matches!(
        errors[0],
        CoreError::AuthenticationMissing { id: ConnectionId::Main }
    ));
    assert!(conn.is_noop());

    tokio::task::yield_now().await;
    assert_eq!(transport.open_count(), 0);
    assert!(!mgr.is_live(&ConnectionId::Main));
    assert_eq!(
        mgr.connection_state(&ConnectionId::Main),
        ConnectionState::Disconnected
    );
    conn.disconnect();
}

// ── State observation ───────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_state_changes_are_published() {
    let transport = FakeTransport::default();
    let mgr = manager(&transport, &token("tok"));
    let mut changes = mgr.state_changes();

    let conn = mgr.connect_main(ConnectionHandlers::new());
    let connecting = changes.recv().await.unwrap();
    let connected = changes.recv().await.unwrap();
    conn.disconnect();
    let disconnected = changes.recv().await.unwrap();

    let state = |state| StateChange {
        id: ConnectionId::Main,
        state,
    };
    assert_eq!(connecting, state(ConnectionState::Connecting));
    assert_eq!(connected, state(ConnectionState::Connected));
    assert_eq!(disconnected, state(ConnectionState::Disconnected));
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_after_exhaustion_needs_explicit_connect() {
    let transport = FakeTransport::default();
    transport.refuse_next(&[500, 500, 500, 500]);
    let mgr = manager(&transport, &token("tok"));
    let rec = Recorder::default();

    let _conn = mgr.connect_main(rec.handlers());
    wait_until("gave up", || !mgr.is_live(&ConnectionId::Main)).await;
    assert_eq!(transport.open_count(), 4);

    let _again = mgr.connect_main(rec.handlers());
    wait_until("open", || rec.opens() == 1).await;
    assert_eq!(transport.open_count(), 5);
    assert_eq!(
        mgr.connection_state(&ConnectionId::Main),
        ConnectionState::Connected
    );
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_after_exhaustion_reports_disconnected() {
    let transport = FakeTransport::refusing();
    let config = ManagerConfig {
        reconnect: ReconnectConfig {
            max_retries: 1,
            ..ReconnectConfig::default()
        },
        ..ManagerConfig::default()
    };
    let mgr = manager_with(&transport, &token("tok"), config);
    let rec = Recorder::default();

    let main = mgr.connect_main(rec.handlers());
    let _zone = mgr.connect_zone("B02", rec.handlers()).unwrap();
    let zone_id: ConnectionId = "B02".parse().unwrap();
    wait_until("both gave up", || mgr.live_connections().is_empty()).await;
    assert_eq!(
        mgr.connection_state(&ConnectionId::Main),
        ConnectionState::Error
    );
    assert_eq!(mgr.connection_state(&zone_id), ConnectionState::Error);

    let mut changes = mgr.state_changes();
    main.disconnect();
    assert_eq!(
        mgr.connection_state(&ConnectionId::Main),
        ConnectionState::Disconnected
    );
    assert_eq!(
        changes.recv().await.unwrap(),
        StateChange {
            id: ConnectionId::Main,
            state: ConnectionState::Disconnected,
        }
    );

    mgr.disconnect_all();
    assert_eq!(mgr.connection_state(&zone_id), ConnectionState::Disconnected);

    // A second disconnect has nothing left to do.
    main.disconnect();
    assert_eq!(changes.recv().await.unwrap().id, zone_id);
    assert!(changes.try_recv().is_err());
    assert_eq!(transport.open_count(), 4);
}

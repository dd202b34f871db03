//! Client Tests
//!
//! Lifecycle, submission and cancellation against the in-process server.

#[path = "../common/mod.rs"]
mod common;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use atlaskv_client::{
    Client, ClientError, CommandError, CommandId, CommandState, Config, ConnectionObserver,
    ConnectionState,
};
use common::{closed_port_endpoint, TestServer};
use crossbeam::channel;
use parking_lot::Mutex;

const WAIT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct Recorder {
    states: Mutex<Vec<ConnectionState>>,
    send_errors: Mutex<Vec<(CommandId, CommandError)>>,
}

/// Forwards events to a shared recorder the test keeps a handle to
struct Observer(Arc<Recorder>);

impl ConnectionObserver for Observer {
    fn on_state(&self, state: ConnectionState) {
        self.0.states.lock().push(state);
    }

    fn on_send_error(&self, id: CommandId, error: &CommandError) {
        self.0.send_errors.lock().push((id, error.clone()));
    }
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_start_and_stop_report_every_transition() {
    let server = TestServer::tcp();
    let client = Client::new(server.config()).unwrap();

    let recorder = Arc::new(Recorder::default());
    client.on_connection_state(Observer(Arc::clone(&recorder)));

    client.start().unwrap();
    assert_eq!(client.connection_state(), ConnectionState::Connected);
    assert!(client.is_running());

    client.stop().unwrap();
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);
    assert!(!client.is_running());

    assert_eq!(
        *recorder.states.lock(),
        vec![
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Disconnecting,
            ConnectionState::Disconnected,
        ]
    );
}

#[test]
fn test_closure_observer() {
    let server = TestServer::tcp();
    let client = Client::new(server.config()).unwrap();

    let (tx, rx) = channel::unbounded();
    client.on_connection_state(move |state: ConnectionState| {
        let _ = tx.send(state);
    });
    client.start().unwrap();

    assert_eq!(rx.recv_timeout(WAIT).unwrap(), ConnectionState::Connecting);
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), ConnectionState::Connected);
}

#[test]
fn test_connect_refused_is_connect_error() {
    let config = Config::builder()
        .endpoint(closed_port_endpoint())
        .connect_timeout(Duration::from_secs(2))
        .build();
    let client = Client::new(config).unwrap();

    let err = client.start().unwrap_err();
    assert!(matches!(err, ClientError::Connect(_)), "{:?}", err);
    assert_eq!(client.connection_state(), ConnectionState::ConnectError);

    let err = client.submit_detached::<String>("PING").unwrap_err();
    assert!(matches!(err, ClientError::NotRunning));
    client.stop().unwrap();
}

#[test]
fn test_invalid_config_rejected() {
    let config = Config::builder().poll_interval(Duration::ZERO).build();
    assert!(matches!(Client::new(config), Err(ClientError::Config(_))));
}

#[test]
fn test_submit_before_start_is_not_running() {
    let server = TestServer::tcp();
    let client = Client::new(server.config()).unwrap();

    let err = client.submit_detached::<String>("PING").unwrap_err();
    assert!(matches!(err, ClientError::NotRunning));
    assert_eq!(client.stats().created, 0);
}

#[test]
fn test_start_twice_is_rejected() {
    let server = TestServer::tcp();
    let client = Client::connect(server.config()).unwrap();
    assert!(matches!(client.start(), Err(ClientError::AlreadyStarted)));
}

#[test]
fn test_stop_without_start_returns() {
    let server = TestServer::tcp();
    let client = Client::new(server.config()).unwrap();
    client.stop().unwrap();
    assert!(matches!(client.start(), Err(ClientError::NotRunning)));
}

#[test]
fn test_submit_after_stop_is_not_running() {
    let server = TestServer::tcp();
    let client = Client::connect(server.config()).unwrap();
    client.stop().unwrap();

    let err = client.submit_detached::<String>("PING").unwrap_err();
    assert!(matches!(err, ClientError::NotRunning));
}

#[test]
fn test_stop_signal_then_block() {
    let server = TestServer::tcp();
    let client = Client::connect(server.config()).unwrap();

    client.stop_signal();
    client.block_until_stopped();
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);
}

#[test]
fn test_drop_stops_reactor() {
    let server = TestServer::tcp();
    let client = Client::connect(server.config()).unwrap();
    client.ping().unwrap();
    drop(client);
}

// =============================================================================
// Submission Tests
// =============================================================================

#[test]
fn test_callback_receives_text_and_value() {
    let server = TestServer::tcp();
    let client = Client::connect(server.config()).unwrap();

    let (tx, rx) = channel::unbounded();
    client
        .submit::<String, _>("ECHO hello", move |text, outcome| {
            tx.send((text.to_string(), outcome)).unwrap();
        })
        .unwrap();

    let (text, outcome) = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(text, "ECHO hello");
    assert_eq!(outcome, Ok("hello".to_string()));
}

#[test]
fn test_ids_are_unique_and_increasing() {
    let server = TestServer::tcp();
    let client = Client::connect(server.config()).unwrap();

    let a = client.submit_detached::<String>("PING").unwrap();
    let b = client.submit_detached::<String>("PING").unwrap();
    assert!(b > a);
}

#[test]
fn test_detached_command_is_released() {
    let server = TestServer::tcp();
    let client = Client::connect(server.config()).unwrap();

    client.submit_detached::<String>("SET k v").unwrap();
    // Replies are in order, so once PING answers the SET was handled
    assert_eq!(client.ping().unwrap(), "PONG");
    assert_eq!(server.value("k"), Some(b"v".to_vec()));

    client.stop().unwrap();
    let stats = client.stats();
    assert_eq!(stats.created, 2);
    assert_eq!(stats.released, 2);
    assert_eq!(stats.abandoned, 0);
}

#[test]
fn test_error_reply_reaches_callback() {
    let server = TestServer::tcp();
    let client = Client::connect(server.config()).unwrap();

    let err = client.submit_blocking::<String>("FROBNICATE").unwrap_err();
    match err.as_command_error() {
        Some(CommandError::ErrorReply(message)) => assert!(message.starts_with("ERR unknown")),
        other => panic!("Expected ErrorReply, got {:?}", other),
    }
}

#[test]
fn test_empty_request_is_send_error() {
    let server = TestServer::tcp();
    let client = Client::new(server.config()).unwrap();
    let recorder = Arc::new(Recorder::default());
    client.on_connection_state(Observer(Arc::clone(&recorder)));
    client.start().unwrap();

    let (tx, rx) = channel::unbounded();
    let id = client
        .submit::<String, _>("   ", move |_, outcome| tx.send(outcome).unwrap())
        .unwrap();

    let outcome = rx.recv_timeout(WAIT).unwrap();
    assert!(matches!(outcome, Err(CommandError::Send(_))));

    client.stop().unwrap();
    let send_errors = recorder.send_errors.lock();
    assert_eq!(send_errors.len(), 1);
    assert_eq!(send_errors[0].0, id);
}

// =============================================================================
// Blocking Call Tests
// =============================================================================

#[test]
fn test_blocking_from_other_thread() {
    let server = TestServer::tcp();
    server.put("k", b"value");
    let client = Arc::new(Client::connect(server.config()).unwrap());

    let caller = {
        let client = Arc::clone(&client);
        thread::spawn(move || client.submit_blocking::<String>("GET k"))
    };
    assert_eq!(caller.join().unwrap().unwrap(), "value");
}

#[test]
fn test_blocking_timeout_cancels_command() {
    let server = TestServer::tcp();
    let client = Client::connect(server.config()).unwrap();

    let err = client
        .submit_blocking_timeout::<String>("SLEEP 300", Some(Duration::from_millis(50)))
        .unwrap_err();
    assert_eq!(err.as_command_error(), Some(&CommandError::Timeout));

    client.stop().unwrap();
    let stats = client.stats();
    assert_eq!(stats.created, stats.released);
}

#[test]
fn test_blocking_from_callback_would_deadlock() {
    let server = TestServer::tcp();
    let client = Arc::new(Client::connect(server.config()).unwrap());

    let (tx, rx) = channel::unbounded();
    let inner = Arc::clone(&client);
    client
        .submit::<String, _>("PING", move |_, _| {
            let nested = inner.submit_blocking::<String>("PING");
            tx.send(matches!(nested, Err(ClientError::WouldDeadlock))).unwrap();
        })
        .unwrap();

    assert!(rx.recv_timeout(WAIT).unwrap());
    client.stop().unwrap();
}

// =============================================================================
// Scheduling Tests
// =============================================================================

#[test]
fn test_delayed_command_waits() {
    let server = TestServer::tcp();
    let client = Client::connect(server.config()).unwrap();

    let (tx, rx) = channel::unbounded();
    let id = client
        .command::<String>("PING")
        .after(Duration::from_millis(300))
        .callback(move |_, outcome| tx.send(outcome).unwrap())
        .submit()
        .unwrap();

    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    assert_eq!(client.command_state(id), Some(CommandState::Armed));
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), Ok("PONG".to_string()));
}

#[test]
fn test_cancel_delayed_command_never_sends() {
    let server = TestServer::tcp();
    let client = Client::connect(server.config()).unwrap();

    let (tx, rx) = channel::unbounded();
    let id = client
        .command::<i64>("INCR never")
        .after(Duration::from_millis(200))
        .callback(move |_, outcome| tx.send(outcome).unwrap())
        .submit()
        .unwrap();

    assert!(client.cancel(id));
    assert!(!client.cancel(id));

    assert!(rx.recv_timeout(Duration::from_millis(500)).is_err());
    assert_eq!(server.value("never"), None);
    assert!(client.command_state(id).is_none());
}

#[test]
fn test_cancel_unknown_id() {
    let server = TestServer::tcp();
    let client = Client::connect(server.config()).unwrap();
    assert!(!client.cancel(CommandId(999_999)));
}

#[test]
fn test_cancel_released_command_returns_false() {
    let server = TestServer::tcp();
    let client = Client::connect(server.config()).unwrap();

    let id = client.submit_detached::<String>("PING").unwrap();
    assert_eq!(client.ping().unwrap(), "PONG");
    assert!(client.command_state(id).is_none());
    assert!(!client.cancel(id));
}

#[test]
fn test_stop_from_callback_only_signals() {
    let server = TestServer::tcp();
    let client = Arc::new(Client::connect(server.config()).unwrap());

    let (tx, rx) = channel::unbounded();
    let inner = Arc::clone(&client);
    client
        .submit::<String, _>("PING", move |_, _| {
            tx.send(inner.stop().is_ok()).unwrap();
        })
        .unwrap();

    assert!(rx.recv_timeout(WAIT).unwrap());
    client.block_until_stopped();
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);
}

// =============================================================================
// Connection Failure Tests
// =============================================================================

#[test]
fn test_server_hangup_fails_pending_and_stops() {
    let server = TestServer::tcp();
    let client = Client::connect(server.config()).unwrap();

    let err = client.submit_blocking::<String>("HANGUP").unwrap_err();
    assert_eq!(err.as_command_error(), Some(&CommandError::Disconnected));

    client.block_until_stopped();
    assert_eq!(client.connection_state(), ConnectionState::DisconnectError);
    assert!(!client.is_running());

    let stats = client.stats();
    assert_eq!(stats.created, stats.released);
    assert_eq!(stats.abandoned, 1);
}

#[test]
fn test_stop_reports_lost_connection() {
    let server = TestServer::tcp();
    let client = Client::connect(server.config()).unwrap();

    let err = client.submit_blocking::<String>("HANGUP").unwrap_err();
    assert_eq!(err.as_command_error(), Some(&CommandError::Disconnected));

    let err = client.stop().unwrap_err();
    assert!(matches!(err, ClientError::Disconnect(_)), "{:?}", err);
    assert_eq!(client.connection_state(), ConnectionState::DisconnectError);
}

#[cfg(unix)]
#[test]
fn test_unix_socket_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let server = TestServer::unix(&dir.path().join("atlaskv.sock"));
    let client = Client::connect(server.config()).unwrap();

    client.set("k", "over unix").unwrap();
    assert_eq!(client.get("k").unwrap(), Some("over unix".to_string()));
    client.stop().unwrap();
}

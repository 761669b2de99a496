mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{fast_config, ScriptedSerial};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;
use volume_bridge_lib::serial::SessionBuilder;
use volume_bridge_lib::{CloseReason, ConnectionState, IoExecutor, SerialError, SessionEvent};

async fn recv(events: &mut UnboundedReceiver<SessionEvent>) -> SessionEvent {
    timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("timed out waiting for session event")
        .expect("event stream closed")
}

#[tokio::test]
async fn test_concurrent_starts_open_once() {
    let serial = ScriptedSerial::with_ports(&["COM3"]);
    let executor = IoExecutor::new().unwrap();
    let (handle, _events) = SessionBuilder::new(Arc::new(serial.clone()))
        .config(fast_config().session)
        .spawn(&executor);

    let other = handle.clone();
    let (a, b) = tokio::join!(handle.start("COM3"), other.start("COM3"));

    let opened = [&a, &b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(opened, 1, "exactly one start may win: {:?} / {:?}", a, b);
    assert!(
        matches!(a, Err(SerialError::AlreadyOpen(_))) || matches!(b, Err(SerialError::AlreadyOpen(_))),
        "the loser must see AlreadyOpen"
    );
    assert_eq!(serial.open_handles(), 1);
}

#[tokio::test]
async fn test_snapshot_watch_follows_state() {
    let serial = ScriptedSerial::with_ports(&["ttyACM0"]);
    let executor = IoExecutor::new().unwrap();
    let (handle, mut events) = SessionBuilder::new(Arc::new(serial.clone()))
        .config(fast_config().session)
        .spawn(&executor);

    let mut watch = handle.snapshot_receiver();
    assert_eq!(watch.borrow().state, ConnectionState::Closed);

    let snapshot = handle.start("ttyACM0").await.unwrap();
    assert_eq!(snapshot.port.as_deref(), Some("ttyACM0"));
    assert!(snapshot.opened_at.is_some());
    assert!(watch.has_changed().unwrap());
    assert_eq!(watch.borrow_and_update().session_id, snapshot.session_id);

    match recv(&mut events).await {
        SessionEvent::Opened { session_id, port } => {
            assert_eq!(Some(session_id), snapshot.session_id);
            assert_eq!(port, "ttyACM0");
        }
        other => panic!("expected Opened, got {:?}", other),
    }

    assert!(handle.stop().await.unwrap());
    let closed = handle.snapshot();
    assert_eq!(closed.state, ConnectionState::Closed);
    assert_eq!(closed.port, None);
    assert_eq!(closed.last_close, Some(CloseReason::Stopped));
}

#[tokio::test]
async fn test_events_carry_session_id() {
    let serial = ScriptedSerial::with_ports(&["COM7"]);
    let executor = IoExecutor::new().unwrap();
    let (handle, mut events) = SessionBuilder::new(Arc::new(serial.clone()))
        .config(fast_config().session)
        .spawn(&executor);

    let snapshot = handle.start("COM7").await.unwrap();
    let id = snapshot.session_id.unwrap();
    serial.feed("COM7", b"knob:2:512\n");

    let opened = recv(&mut events).await;
    let line = recv(&mut events).await;
    assert_eq!(opened.session_id(), id);
    assert_eq!(line.session_id(), id);
    match line {
        SessionEvent::Line(line) => assert_eq!(line.text, "knob:2:512"),
        other => panic!("expected Line, got {:?}", other),
    }
}

#[tokio::test]
async fn test_oversized_line_is_discarded() {
    let serial = ScriptedSerial::with_ports(&["COM3"]);
    let executor = IoExecutor::new().unwrap();
    let mut config = fast_config().session;
    config.max_line_len = 8;
    let (handle, mut events) = SessionBuilder::new(Arc::new(serial.clone())).config(config).spawn(&executor);

    handle.start("COM3").await.unwrap();
    recv(&mut events).await;

    serial.feed("COM3", b"0123456789abcdef\nok\n");
    match recv(&mut events).await {
        SessionEvent::Line(line) => assert_eq!(line.text, "ok"),
        other => panic!("expected the short line only, got {:?}", other),
    }

    handle.stop().await.unwrap();
    assert_eq!(handle.metrics().oversized_lines, 1);
}

#[tokio::test]
async fn test_executor_shutdown_makes_handle_unavailable() {
    let serial = ScriptedSerial::with_ports(&["COM3"]);
    let mut executor = IoExecutor::new().unwrap();
    let (handle, _events) = SessionBuilder::new(Arc::new(serial.clone()))
        .config(fast_config().session)
        .spawn(&executor);

    handle.start("COM3").await.unwrap();
    executor.shutdown();
    assert!(!executor.is_running());
    assert_eq!(serial.open_handles(), 0, "runtime teardown must drop the port");

    assert!(matches!(handle.start("COM3").await, Err(SerialError::SessionUnavailable(_))));
}

#[tokio::test]
async fn test_shutdown_closes_without_grace() {
    let serial = ScriptedSerial::with_ports(&["COM3"]);
    let executor = IoExecutor::new().unwrap();
    let mut config = fast_config().session;
    config.close_grace_ms = 5_000;
    let (handle, mut events) = SessionBuilder::new(Arc::new(serial.clone())).config(config).spawn(&executor);

    handle.start("COM3").await.unwrap();
    recv(&mut events).await;

    let asked_at = std::time::Instant::now();
    handle.shutdown();
    match recv(&mut events).await {
        SessionEvent::Closed { reason, .. } => assert_eq!(reason, CloseReason::Shutdown),
        other => panic!("expected Closed, got {:?}", other),
    }
    assert_eq!(serial.open_handles(), 0);

    // The task must be gone without sitting out the grace first
    assert!(matches!(handle.stop().await, Err(SerialError::SessionUnavailable(_))));
    assert!(asked_at.elapsed() < Duration::from_secs(1), "shutdown took {:?}", asked_at.elapsed());
    assert_eq!(handle.snapshot().state, ConnectionState::Closed);
}

//! Integration tests for the worker end to end
//!
//! These drive a real worker with the bundled doodle engine through the
//! in-process transport, the way the embedded easel does, and check the
//! protocol as observed from the presentation side:
//! - a full run from `init` to `done`, with drawing and captured output
//! - the input round-trip suspending and resuming a script
//! - run supersession via `RunFilter`
//! - error surfacing that leaves the worker usable
//! - the framed Unix socket path carrying the same traffic

use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::mpsc;

use terrapin_core::transport::{
    EaselTransport, InProcessTransport, UnixSocketClient, UnixSocketServer, WorkerTransport,
};
use terrapin_core::{
    CanvasCommand, DoodleEngine, EaselEvent, RunFilter, RunId, Worker, WorkerConfig, WorkerMessage,
};

/// Spawn a doodle worker wired to an in-process transport.
fn embedded_worker() -> InProcessTransport {
    let config = WorkerConfig::default();
    let (transport, event_rx, msg_tx) =
        InProcessTransport::new_pair_with_capacity(config.event_capacity);
    let worker = Worker::new(DoodleEngine::new, &config, event_rx, msg_tx);
    tokio::spawn(worker.run());
    transport
}

async fn recv(transport: &mut impl EaselTransport) -> WorkerMessage {
    tokio::time::timeout(Duration::from_secs(2), transport.recv())
        .await
        .expect("timed out waiting for worker message")
        .expect("transport closed")
}

/// Collect messages until (and including) the next done/error.
async fn collect_run(transport: &mut impl EaselTransport) -> Vec<WorkerMessage> {
    let mut out = Vec::new();
    loop {
        let msg = recv(transport).await;
        let terminal = matches!(
            msg,
            WorkerMessage::Done { .. } | WorkerMessage::Error { .. }
        );
        out.push(msg);
        if terminal {
            return out;
        }
    }
}

// =============================================================================
// Full run lifecycle
// =============================================================================

#[tokio::test]
async fn test_square_script_start_to_done() {
    let mut transport = embedded_worker();

    transport.send(EaselEvent::Init).await.unwrap();
    assert!(matches!(
        recv(&mut transport).await,
        WorkerMessage::Status {
            run_id: RunId::CONTROL,
            ..
        }
    ));
    assert_eq!(
        recv(&mut transport).await,
        WorkerMessage::Ready {
            run_id: RunId::CONTROL
        }
    );

    transport
        .send(EaselEvent::Run {
            run_id: RunId(1),
            code: "say \"drawing\"\nrepeat 4 [ forward 50 right 90 ]".to_string(),
        })
        .await
        .unwrap();

    let msgs = collect_run(&mut transport).await;
    assert!(msgs.iter().all(|m| m.run_id() == RunId(1)));
    assert_eq!(*msgs.last().unwrap(), WorkerMessage::Done { run_id: RunId(1) });

    let stdout: Vec<_> = msgs
        .iter()
        .filter_map(|m| match m {
            WorkerMessage::Stdout { text, .. } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(stdout, vec!["drawing\n"]);

    // Birth pose, then per side one stroke and one pose, per turn one pose.
    let strokes = msgs
        .iter()
        .filter(|m| {
            matches!(
                m,
                WorkerMessage::Canvas {
                    cmd: CanvasCommand::LineSegment { .. },
                    ..
                }
            )
        })
        .count();
    let poses = msgs
        .iter()
        .filter(|m| {
            matches!(
                m,
                WorkerMessage::Canvas {
                    cmd: CanvasCommand::TurtlePose { .. },
                    ..
                }
            )
        })
        .count();
    assert_eq!(strokes, 4);
    assert_eq!(poses, 1 + 8);

    // The square closes: the final pose is back at the origin.
    let last_pose = msgs
        .iter()
        .rev()
        .find_map(|m| match m {
            WorkerMessage::Canvas {
                cmd: CanvasCommand::TurtlePose { position, .. },
                ..
            } => Some(*position),
            _ => None,
        })
        .unwrap();
    assert!(last_pose.x.abs() < 1e-9);
    assert!(last_pose.y.abs() < 1e-9);
}

#[tokio::test]
async fn test_first_run_boots_lazily_without_init() {
    let mut transport = embedded_worker();

    transport
        .send(EaselEvent::Run {
            run_id: RunId(1),
            code: "say \"no init needed\"".to_string(),
        })
        .await
        .unwrap();

    let msgs = collect_run(&mut transport).await;
    // Boot chatter carries the run's own id, not the control sentinel.
    assert_eq!(
        msgs[0],
        WorkerMessage::Status {
            run_id: RunId(1),
            text: "starting script engine".to_string(),
        }
    );
    assert_eq!(msgs[1], WorkerMessage::Ready { run_id: RunId(1) });
    assert_eq!(*msgs.last().unwrap(), WorkerMessage::Done { run_id: RunId(1) });
}

// =============================================================================
// Input round-trip
// =============================================================================

#[tokio::test]
async fn test_ask_suspends_until_reply_arrives() {
    let mut transport = embedded_worker();

    transport
        .send(EaselEvent::Run {
            run_id: RunId(1),
            code: "ask distance \"how far? \"\nforward distance\nsay distance".to_string(),
        })
        .await
        .unwrap();

    // Nothing after the request until the reply lands.
    loop {
        match recv(&mut transport).await {
            WorkerMessage::InputRequest { run_id, prompt } => {
                assert_eq!(run_id, RunId(1));
                assert_eq!(prompt, "how far? ");
                break;
            }
            WorkerMessage::Status { .. }
            | WorkerMessage::Ready { .. }
            | WorkerMessage::Canvas { .. } => {}
            other => panic!("unexpected message before reply: {other:?}"),
        }
    }

    transport
        .send(EaselEvent::InputResponse {
            text: "5".to_string(),
        })
        .await
        .unwrap();

    let msgs = collect_run(&mut transport).await;
    assert!(msgs.iter().any(
        |m| matches!(m, WorkerMessage::Stdout { text, .. } if text == "5\n")
    ));
    assert!(msgs.iter().any(|m| matches!(
        m,
        WorkerMessage::Canvas {
            cmd: CanvasCommand::LineSegment { to, .. },
            ..
        } if (to.x - 5.0).abs() < 1e-9
    )));
    assert_eq!(*msgs.last().unwrap(), WorkerMessage::Done { run_id: RunId(1) });
}

#[tokio::test]
async fn test_two_asks_resolve_in_request_order() {
    let mut transport = embedded_worker();

    transport
        .send(EaselEvent::Run {
            run_id: RunId(1),
            code: "ask a\nask b\nsay a\nsay b".to_string(),
        })
        .await
        .unwrap();

    for reply in ["first", "second"] {
        loop {
            if matches!(recv(&mut transport).await, WorkerMessage::InputRequest { .. }) {
                break;
            }
        }
        transport
            .send(EaselEvent::InputResponse {
                text: reply.to_string(),
            })
            .await
            .unwrap();
    }

    let msgs = collect_run(&mut transport).await;
    let stdout: String = msgs
        .iter()
        .filter_map(|m| match m {
            WorkerMessage::Stdout { text, .. } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(stdout, "first\nsecond\n");
}

// =============================================================================
// Supersession
// =============================================================================

#[tokio::test]
async fn test_run_filter_drops_superseded_run() {
    let mut transport = embedded_worker();
    let mut filter = RunFilter::new();

    // Run 1 blocks on input; run 2 supersedes it from the easel's point of
    // view the moment it is submitted.
    transport
        .send(EaselEvent::Run {
            run_id: RunId(1),
            code: "say \"one\"\nask x".to_string(),
        })
        .await
        .unwrap();
    filter.activate(RunId(1));

    loop {
        if matches!(recv(&mut transport).await, WorkerMessage::InputRequest { .. }) {
            break;
        }
    }

    transport
        .send(EaselEvent::Run {
            run_id: RunId(2),
            code: "say \"two\"".to_string(),
        })
        .await
        .unwrap();
    filter.activate(RunId(2));

    // Unblock run 1 so it can unwind; its remaining messages are stale.
    transport
        .send(EaselEvent::InputResponse {
            text: "late".to_string(),
        })
        .await
        .unwrap();

    let mut kept = Vec::new();
    loop {
        let msg = recv(&mut transport).await;
        let done_for_two = matches!(msg, WorkerMessage::Done { run_id } if run_id == RunId(2));
        if filter.admits(&msg) {
            kept.push(msg);
        }
        if done_for_two {
            break;
        }
    }

    assert!(kept.iter().all(|m| m.run_id() == RunId(2)));
    assert!(kept.iter().any(
        |m| matches!(m, WorkerMessage::Stdout { text, .. } if text == "two\n")
    ));
}

// =============================================================================
// Errors
// =============================================================================

#[tokio::test]
async fn test_script_error_reported_and_worker_survives() {
    let mut transport = embedded_worker();

    transport
        .send(EaselEvent::Run {
            run_id: RunId(1),
            code: "forward \"not a number\"".to_string(),
        })
        .await
        .unwrap();
    let msgs = collect_run(&mut transport).await;
    match msgs.last().unwrap() {
        WorkerMessage::Error { run_id, text } => {
            assert_eq!(*run_id, RunId(1));
            assert!(text.contains("expected a number"), "got {text:?}");
        }
        other => panic!("expected error, got {other:?}"),
    }

    transport
        .send(EaselEvent::Run {
            run_id: RunId(2),
            code: "say \"recovered\"".to_string(),
        })
        .await
        .unwrap();
    let msgs = collect_run(&mut transport).await;
    assert_eq!(*msgs.last().unwrap(), WorkerMessage::Done { run_id: RunId(2) });
}

#[tokio::test]
async fn test_parse_error_is_a_script_error() {
    let mut transport = embedded_worker();

    transport
        .send(EaselEvent::Run {
            run_id: RunId(1),
            code: "repeat 2 [ fd 10".to_string(),
        })
        .await
        .unwrap();
    let msgs = collect_run(&mut transport).await;
    assert!(matches!(
        msgs.last().unwrap(),
        WorkerMessage::Error { run_id: RunId(1), text } if text.contains("syntax error")
    ));
}

// =============================================================================
// Unix socket path
// =============================================================================

#[tokio::test]
async fn test_socket_round_trip_with_live_worker() {
    let temp_dir = TempDir::new().unwrap();
    let socket_path = temp_dir.path().join("worker.sock");

    // Daemon side: worker behind a socket server, broadcast wiring as the
    // real daemon does it.
    let config = WorkerConfig::default();
    let (event_tx, event_rx) = mpsc::channel(config.event_capacity);
    let (msg_tx, mut msg_rx) = mpsc::unbounded_channel();
    let worker = Worker::new(DoodleEngine::new, &config, event_rx, msg_tx);
    tokio::spawn(worker.run());

    let mut server = UnixSocketServer::new(socket_path.clone());
    server.listen().await.unwrap();

    let server_task = tokio::spawn(async move {
        let (_conn_id, mut conn_events) = server.accept().await.unwrap();
        let forward = tokio::spawn(async move {
            while let Some(event) = conn_events.recv().await {
                if event_tx.send(event).await.is_err() {
                    break;
                }
            }
        });
        while let Some(msg) = msg_rx.recv().await {
            let terminal = matches!(
                msg,
                WorkerMessage::Done { .. } | WorkerMessage::Error { .. }
            );
            server.broadcast(msg).await.unwrap();
            if terminal {
                break;
            }
        }
        forward.abort();
        server.shutdown().await.unwrap();
    });

    tokio::time::sleep(Duration::from_millis(10)).await;

    let mut client = UnixSocketClient::new(socket_path);
    client.connect().await.unwrap();
    client
        .send(EaselEvent::Run {
            run_id: RunId(1),
            code: "forward 25\nsay \"over the wire\"".to_string(),
        })
        .await
        .unwrap();

    let msgs = collect_run(&mut client).await;
    assert_eq!(*msgs.last().unwrap(), WorkerMessage::Done { run_id: RunId(1) });
    assert!(msgs.iter().any(
        |m| matches!(m, WorkerMessage::Stdout { text, .. } if text == "over the wire\n")
    ));
    assert!(msgs.iter().any(|m| matches!(
        m,
        WorkerMessage::Canvas {
            cmd: CanvasCommand::LineSegment { .. },
            ..
        }
    )));

    server_task.await.unwrap();
}

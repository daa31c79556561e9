//! WebSocket connection handling: streams snapshots and phase cues to a UI and
//! takes commands back.

use crate::state::AppState;
use anyhow::Result;
use axum::extract::ws::{Message, WebSocket};
use calm_core::SessionCommand;
use calm_types::{ClockEvent, SessionState, WsClientMessage, WsServerMessage};
use futures::{Sink, SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream, WatchStream};
use tracing::{debug, info, trace};

pub async fn handle_websocket(socket: WebSocket, state: Arc<AppState>) -> Result<()> {
    let (ws_tx, mut ws_rx) = socket.split();

    // Yields the current snapshot first, then the latest one after each change.
    // A slow client skips intermediate snapshots instead of queueing them.
    let snapshots = WatchStream::new(state.controller.subscribe());
    let events = BroadcastStream::new(state.controller.events());

    // Replies produced by recv_task (pongs, errors, requested state)
    let (outgoing_tx, outgoing_rx) = mpsc::channel::<WsServerMessage>(32);

    info!(target: "calm::ws", "Client connected");

    let mut send_task = tokio::spawn(forward_to_client(ws_tx, snapshots, events, outgoing_rx));

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                Message::Text(text) => {
                    let reply = handle_client_message(&state, text.as_str());
                    if let Some(reply) = reply {
                        if outgoing_tx.send(reply).await.is_err() {
                            break;
                        }
                    }
                }
                Message::Close(_) => {
                    debug!(target: "calm::ws", "Client closed connection");
                    break;
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
        }
        _ = &mut recv_task => {
            send_task.abort();
        }
    }

    info!(target: "calm::ws", "Client disconnected");
    Ok(())
}

/// Write snapshots, cues and direct replies to the client until the sink fails
/// or every source has closed.
async fn forward_to_client<S>(
    mut sink: S,
    mut snapshots: WatchStream<SessionState>,
    mut events: BroadcastStream<ClockEvent>,
    mut outgoing: mpsc::Receiver<WsServerMessage>,
) where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    loop {
        let msg = tokio::select! {
            Some(snapshot) = snapshots.next() => WsServerMessage::state(snapshot),
            Some(event) = events.next() => match event {
                Ok(event) => match event_message(event) {
                    Some(msg) => msg,
                    None => continue,
                },
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    debug!(target: "calm::ws", "Client lagged, skipped {} events", skipped);
                    continue;
                }
            },
            Some(msg) = outgoing.recv() => msg,
            else => break,
        };

        let json = match serde_json::to_string(&msg) {
            Ok(json) => json,
            Err(e) => {
                debug!(target: "calm::ws", "Failed to serialize {:?}: {}", msg, e);
                continue;
            }
        };
        if let Err(e) = sink.send(Message::Text(json.into())).await {
            debug!(target: "calm::ws", "WebSocket send failed: {}", e);
            break;
        }
    }
}

/// Apply one client message, returning a direct reply if it needs one.
pub fn handle_client_message(state: &AppState, text: &str) -> Option<WsServerMessage> {
    let msg: WsClientMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            return Some(WsServerMessage::Error {
                code: "invalid_message".to_string(),
                message: e.to_string(),
            });
        }
    };
    trace!(target: "calm::ws", "Received {:?}", msg);

    let command = match msg {
        WsClientMessage::Start => SessionCommand::Start,
        WsClientMessage::Stop => SessionCommand::Stop,
        WsClientMessage::Reset => SessionCommand::Reset,
        WsClientMessage::SetPhaseDuration { seconds } => SessionCommand::SetPhaseDuration(seconds),
        WsClientMessage::SetSessionLength { seconds } => SessionCommand::SetSessionLength(seconds),
        WsClientMessage::IncreasePhaseDuration => SessionCommand::IncreasePhaseDuration,
        WsClientMessage::DecreasePhaseDuration => SessionCommand::DecreasePhaseDuration,
        WsClientMessage::IncreaseSessionLength => SessionCommand::IncreaseSessionLength,
        WsClientMessage::DecreaseSessionLength => SessionCommand::DecreaseSessionLength,
        WsClientMessage::GetState => {
            return Some(WsServerMessage::state(state.controller.state()));
        }
        WsClientMessage::Ping { timestamp } => {
            return Some(WsServerMessage::Pong { timestamp });
        }
    };

    // Accepted commands show up through the snapshot stream.
    match state.controller.execute(command) {
        Ok(_) => None,
        Err(e) => {
            debug!(target: "calm::ws", "Rejected {:?}: {}", command, e);
            Some(WsServerMessage::Error {
                code: e.code().to_string(),
                message: e.to_string(),
            })
        }
    }
}

fn event_message(event: ClockEvent) -> Option<WsServerMessage> {
    match event {
        ClockEvent::PhaseChanged {
            from,
            to,
            cycle_count,
            ..
        } => Some(WsServerMessage::PhaseChanged {
            from,
            to,
            cycle_count,
        }),
        ClockEvent::Stopped {
            reason,
            total_elapsed_seconds,
            ..
        } => Some(WsServerMessage::SessionStopped {
            reason,
            total_elapsed_seconds,
        }),
        ClockEvent::Started { .. } | ClockEvent::Reset => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use calm_types::{Phase, StopReason};
    use futures::channel::mpsc::{unbounded, UnboundedReceiver};
    use serde_json::Value;

    /// Read frames until one of the given type arrives.
    async fn next_of_type(rx: &mut UnboundedReceiver<Message>, kind: &str) -> Value {
        loop {
            let Some(Message::Text(text)) = rx.next().await else {
                panic!("sink closed before a {kind} message arrived");
            };
            let value: Value = serde_json::from_str(text.as_str()).unwrap();
            if value["type"] == kind {
                return value;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_forward_sends_snapshots_cues_and_replies() {
        let state = AppState::new(Config::default());
        let (sink, mut frames) = unbounded::<Message>();
        let (outgoing_tx, outgoing_rx) = mpsc::channel(4);
        let task = tokio::spawn(forward_to_client(
            sink,
            WatchStream::new(state.controller.subscribe()),
            BroadcastStream::new(state.controller.events()),
            outgoing_rx,
        ));

        let first = next_of_type(&mut frames, "state").await;
        assert_eq!(first["state"]["phase"], "idle");
        assert_eq!(first["instruction"], "Ready to begin");

        outgoing_tx
            .send(WsServerMessage::Pong { timestamp: 7 })
            .await
            .unwrap();
        let pong = next_of_type(&mut frames, "pong").await;
        assert_eq!(pong["timestamp"], 7);

        state.controller.start();
        state.controller.stop();
        let stopped = next_of_type(&mut frames, "session_stopped").await;
        assert_eq!(stopped["reason"], "user");

        task.abort();
    }

    #[tokio::test]
    async fn test_forward_ends_when_client_goes_away() {
        let state = AppState::new(Config::default());
        let (sink, frames) = unbounded::<Message>();
        let (_outgoing_tx, outgoing_rx) = mpsc::channel(4);
        drop(frames);

        // The first snapshot fails to send and ends the loop.
        forward_to_client(
            sink,
            WatchStream::new(state.controller.subscribe()),
            BroadcastStream::new(state.controller.events()),
            outgoing_rx,
        )
        .await;
    }

    #[test]
    fn test_invalid_json_gets_error_reply() {
        let state = AppState::new(Config::default());
        let reply = handle_client_message(&state, "{not json");
        assert!(matches!(
            reply,
            Some(WsServerMessage::Error { ref code, .. }) if code == "invalid_message"
        ));
    }

    #[test]
    fn test_ping_and_get_state_reply_directly() {
        let state = AppState::new(Config::default());

        let reply = handle_client_message(&state, r#"{"type":"ping","timestamp":42}"#);
        assert!(matches!(reply, Some(WsServerMessage::Pong { timestamp: 42 })));

        let reply = handle_client_message(&state, r#"{"type":"get_state"}"#);
        match reply {
            Some(WsServerMessage::State { state, instruction }) => {
                assert_eq!(state.phase, Phase::Idle);
                assert_eq!(instruction, "Ready to begin");
            }
            other => panic!("unexpected reply: {:?}", other),
        }
    }

    #[test]
    fn test_rejected_command_reports_code() {
        let state = AppState::new(Config::default());
        let reply = handle_client_message(&state, r#"{"type":"set_phase_duration","seconds":6}"#);
        assert!(matches!(
            reply,
            Some(WsServerMessage::Error { ref code, .. }) if code == "invalid_config"
        ));
        assert_eq!(state.controller.state().config.phase_duration_seconds, 4);

        let reply = handle_client_message(&state, r#"{"type":"set_phase_duration","seconds":3}"#);
        assert!(reply.is_none());
        assert_eq!(state.controller.state().config.phase_duration_seconds, 3);
    }

    #[test]
    fn test_event_mapping() {
        assert!(event_message(ClockEvent::Reset).is_none());

        let msg = event_message(ClockEvent::Stopped {
            run_id: Default::default(),
            reason: StopReason::Completed,
            total_elapsed_seconds: 30,
        });
        assert!(matches!(
            msg,
            Some(WsServerMessage::SessionStopped {
                reason: StopReason::Completed,
                total_elapsed_seconds: 30
            })
        ));
    }
}

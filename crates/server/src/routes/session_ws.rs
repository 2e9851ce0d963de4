//! WebSocket game session: one controller and one engine process per
//! connection.

use anyhow::Result;
use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::Query,
    response::IntoResponse,
    Extension,
};
use chess_core::MoveRequest;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{info, warn};
use uci_engine::EngineChannel;

use crate::auth::{jwt, middleware::MaybeIdentity};
use crate::clock::TimeControl;
use crate::config::Config;
use crate::error::AppError;
use crate::routes::ratings::load_ratings;
use crate::routes::RemoteProfiles;
use crate::session::{run_session, DriverSettings, SessionCommand, SessionController, SessionEvent, SessionSnapshot};

// ---- Message types ----

/// Server → Client messages
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerMessage {
    State { snapshot: SessionSnapshot },
    MoveRejected { from: String, to: String, reason: String },
    Error { message: String },
}

impl From<SessionEvent> for ServerMessage {
    fn from(event: SessionEvent) -> Self {
        match event {
            SessionEvent::State(snapshot) => ServerMessage::State { snapshot },
            SessionEvent::MoveRejected { from, to, reason } => ServerMessage::MoveRejected { from, to, reason },
        }
    }
}

/// Client → Server messages
#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    Start {
        #[serde(default)]
        time_control: Option<TimeControl>,
    },
    Move {
        from: String,
        to: String,
        #[serde(default)]
        promotion: Option<String>,
    },
    Reset,
    Pause {
        paused: bool,
    },
    RetryOpponent,
}

fn parse_command(text: &str) -> Result<SessionCommand, String> {
    let message: ClientMessage = serde_json::from_str(text).map_err(|e| format!("Invalid message: {e}"))?;
    Ok(match message {
        ClientMessage::Start { time_control } => SessionCommand::Start(time_control),
        ClientMessage::Move { from, to, promotion } => {
            let request = MoveRequest::parse(&from, &to, promotion.as_deref()).map_err(|e| e.to_string())?;
            SessionCommand::Move(request)
        }
        ClientMessage::Reset => SessionCommand::Reset,
        ClientMessage::Pause { paused } => SessionCommand::Pause(paused),
        ClientMessage::RetryOpponent => SessionCommand::RetryOpponent,
    })
}

/// What happened to a command handed to the session task.
#[derive(Debug, PartialEq, Eq)]
enum Forwarded {
    Queued,
    /// Queue full; the command is dropped and the client told so
    Busy,
    Closed,
}

/// Queue `command` without waiting. The socket loop must keep draining
/// session events, or a client that floods commands stalls both tasks.
fn forward(commands: &mpsc::Sender<SessionCommand>, command: SessionCommand) -> Forwarded {
    match commands.try_send(command) {
        Ok(()) => Forwarded::Queued,
        Err(TrySendError::Full(_)) => Forwarded::Busy,
        Err(TrySendError::Closed(_)) => Forwarded::Closed,
    }
}

#[derive(Deserialize)]
pub struct SessionQuery {
    token: Option<String>,
}

// ---- WebSocket handler ----

/// GET /ws/session?token=
///
/// Browsers cannot set headers on a WebSocket upgrade, so the identity token
/// may come as a query parameter. A token that fails to verify is rejected
/// rather than silently downgraded to a guest session.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<SessionQuery>,
    Extension(config): Extension<Config>,
    Extension(remote): Extension<RemoteProfiles>,
    MaybeIdentity(header_identity): MaybeIdentity,
) -> Result<impl IntoResponse, AppError> {
    let user_id = match query.token.as_deref() {
        Some(token) => Some(jwt::verify_token(token, &config.jwt_secret).ok_or(AppError::Unauthorized)?),
        None => header_identity,
    };

    let engine = EngineChannel::spawn(&config.stockfish_path, config.engine_settings()).await?;
    let ratings = load_ratings(&config, &remote, user_id).await;
    let controller = SessionController::new(ratings, config.engine_move_retries);
    let settings = config.driver_settings();

    info!(?user_id, "session connected");
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, controller, engine, settings)))
}

async fn handle_socket(socket: WebSocket, controller: SessionController, engine: EngineChannel, settings: DriverSettings) {
    let (mut sender, mut receiver) = socket.split();
    let (commands, command_rx) = mpsc::channel(32);
    let (event_tx, mut events) = mpsc::channel(64);
    let session = tokio::spawn(run_session(controller, engine, command_rx, event_tx, settings));

    loop {
        tokio::select! {
            msg = receiver.next() => {
                let text = match msg {
                    Some(Ok(Message::Text(t))) => t.to_string(),
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => continue,
                };
                let rejection = match parse_command(&text) {
                    Ok(command) => match forward(&commands, command) {
                        Forwarded::Queued => None,
                        Forwarded::Busy => {
                            warn!("session busy, dropping command");
                            Some("Too many pending commands".to_string())
                        }
                        Forwarded::Closed => break,
                    },
                    Err(message) => Some(message),
                };
                if let Some(message) = rejection {
                    if send_msg(&mut sender, &ServerMessage::Error { message }).await.is_err() {
                        break;
                    }
                }
            }
            event = events.recv() => {
                let Some(event) = event else {
                    break;
                };
                if send_msg(&mut sender, &event.into()).await.is_err() {
                    break;
                }
            }
        }
    }

    drop(commands);
    drop(events);
    match session.await {
        Ok(engine) => engine.quit().await,
        Err(e) => warn!(error = %e, "session task failed"),
    }
    info!("session disconnected");
}

// ---- Helper: send message ----

async fn send_msg(
    sender: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMessage,
) -> Result<()> {
    let json = serde_json::to_string(msg)?;
    sender.send(Message::Text(json.into())).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chess_core::{Role, Square};

    #[test]
    fn test_parse_start_messages() {
        let timed = parse_command(r#"{"type":"start","time_control":{"total_seconds":300}}"#).unwrap();
        assert!(matches!(
            timed,
            SessionCommand::Start(Some(TimeControl {
                total_seconds: 300,
                increment_seconds: 0
            }))
        ));

        let untimed = parse_command(r#"{"type":"start","time_control":null}"#).unwrap();
        assert!(matches!(untimed, SessionCommand::Start(None)));
        assert!(matches!(parse_command(r#"{"type":"start"}"#), Ok(SessionCommand::Start(None))));
    }

    #[test]
    fn test_parse_move_with_promotion() {
        let command = parse_command(r#"{"type":"move","from":"a7","to":"a8","promotion":"n"}"#).unwrap();
        match command {
            SessionCommand::Move(request) => {
                assert_eq!(request.from, Square::A7);
                assert_eq!(request.to, Square::A8);
                assert_eq!(request.promotion, Some(Role::Knight));
            }
            _ => panic!("expected a move"),
        }
    }

    #[test]
    fn test_parse_other_commands() {
        assert!(matches!(parse_command(r#"{"type":"reset"}"#), Ok(SessionCommand::Reset)));
        assert!(matches!(
            parse_command(r#"{"type":"pause","paused":true}"#),
            Ok(SessionCommand::Pause(true))
        ));
        assert!(matches!(
            parse_command(r#"{"type":"retry_opponent"}"#),
            Ok(SessionCommand::RetryOpponent)
        ));
    }

    #[test]
    fn test_bad_messages_are_errors() {
        assert!(parse_command("not json").unwrap_err().starts_with("Invalid message"));
        assert!(parse_command(r#"{"type":"resign"}"#).is_err());
        assert!(parse_command(r#"{"type":"move","from":"z9","to":"e4"}"#).is_err());
    }

    #[tokio::test]
    async fn test_forward_never_waits_on_a_full_queue() {
        let (commands, mut command_rx) = mpsc::channel(2);
        assert_eq!(forward(&commands, SessionCommand::Reset), Forwarded::Queued);
        assert_eq!(forward(&commands, SessionCommand::Pause(true)), Forwarded::Queued);
        for _ in 0..100 {
            assert_eq!(forward(&commands, SessionCommand::Reset), Forwarded::Busy);
        }

        // the queued commands are intact and room frees up once drained
        assert!(matches!(command_rx.recv().await, Some(SessionCommand::Reset)));
        assert_eq!(forward(&commands, SessionCommand::RetryOpponent), Forwarded::Queued);
        assert!(matches!(command_rx.recv().await, Some(SessionCommand::Pause(true))));
        assert!(matches!(command_rx.recv().await, Some(SessionCommand::RetryOpponent)));

        drop(command_rx);
        assert_eq!(forward(&commands, SessionCommand::Reset), Forwarded::Closed);
    }

    #[test]
    fn test_move_rejected_serialization() {
        let message: ServerMessage = SessionEvent::MoveRejected {
            from: "e2".into(),
            to: "e5".into(),
            reason: "illegal".into(),
        }
        .into();
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "move_rejected", "from": "e2", "to": "e5", "reason": "illegal"})
        );
    }
}

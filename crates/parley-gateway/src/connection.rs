use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use parley_types::PairKey;
use parley_types::api::Claims;
use parley_types::events::{GatewayCommand, GatewayEvent, MessagePayload};

use crate::rooms::{Channel, RoomRouter};

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Time a fresh socket has to send `identify`.
const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Identity of an authenticated gateway connection.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: Uuid,
    pub username: String,
}

/// Handle a single WebSocket connection: identify, then relay room traffic
/// until either side goes away.
pub async fn handle_connection(socket: WebSocket, router: RoomRouter, jwt_secret: String) {
    let (mut sender, mut receiver) = socket.split();

    let session = match wait_for_identify(&mut receiver, &jwt_secret).await {
        Some(session) => session,
        None => {
            warn!("WebSocket client failed to identify, closing");
            return;
        }
    };

    info!("{} ({}) connected to gateway", session.username, session.user_id);

    let ready = GatewayEvent::Ready {
        user_id: session.user_id,
        username: session.username.clone(),
    };
    if send_event(&mut sender, &ready).await.is_err() {
        return;
    }

    run_connection_loop(sender, receiver, router, session).await;
}

async fn run_connection_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    router: RoomRouter,
    session: Session,
) {
    let (channel, mut channel_rx) = Channel::new();
    let channel_id = channel.id();

    // Shared flag for heartbeat
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward room events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = channel_rx.recv() => {
                    let Some(event) = result else { break };
                    if send_event(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let recv_router = router.clone();
    let recv_session = session.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => handle_command(&recv_router, &recv_session, &channel, cmd).await,
                    Err(e) => {
                        let preview: String = text.chars().take(200).collect();
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            recv_session.username, recv_session.user_id, e, preview
                        );
                        channel.send(GatewayEvent::Error {
                            message: "Malformed command".into(),
                        });
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish, or for the server to shut down
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
        _ = router.closed() => {
            info!("{} ({}) closed by server shutdown", session.username, session.user_id);
            send_task.abort();
            recv_task.abort();
        }
    }

    let rooms = router.leave(channel_id).await;
    info!(
        "{} ({}) disconnected from gateway (left {} rooms)",
        session.username, session.user_id, rooms
    );
}

async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &GatewayEvent,
) -> Result<(), axum::Error> {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            warn!("Failed to serialize gateway event: {}", e);
            return Ok(());
        }
    };
    sender.send(Message::Text(text.into())).await
}

async fn wait_for_identify(receiver: &mut SplitStream<WebSocket>, jwt_secret: &str) -> Option<Session> {
    let identify = async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(GatewayCommand::Identify { token }) = serde_json::from_str::<GatewayCommand>(&text) {
                    return verify_token(&token, jwt_secret);
                }
            }
        }
        None
    };

    tokio::time::timeout(IDENTIFY_TIMEOUT, identify).await.ok().flatten()
}

fn verify_token(token: &str, jwt_secret: &str) -> Option<Session> {
    use jsonwebtoken::{DecodingKey, Validation, decode};

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .ok()?;

    Some(Session {
        user_id: data.claims.sub,
        username: data.claims.username,
    })
}

/// Resolve a client-supplied room id to a pair the session belongs to.
fn member_room(session: &Session, room: &str) -> Result<PairKey, &'static str> {
    let key: PairKey = room.parse().map_err(|_| "Malformed room id")?;
    if key.contains(session.user_id) {
        Ok(key)
    } else {
        Err("Not a member of this room")
    }
}

/// Apply one client command. `send_message` is a relay: the payload goes to
/// the other members of the room as an unconfirmed push and is not stored.
/// Persistence belongs to the REST send path.
pub async fn handle_command(
    router: &RoomRouter,
    session: &Session,
    channel: &Channel,
    cmd: GatewayCommand,
) {
    match cmd {
        GatewayCommand::Identify { .. } => {} // Already handled

        GatewayCommand::JoinRoom { room } => match member_room(session, &room) {
            Ok(key) => {
                if router.join(channel, key).await {
                    info!("{} ({}) joined room {}", session.username, session.user_id, key);
                }
            }
            Err(reason) => {
                warn!("{} ({}) join_room {} refused: {}", session.username, session.user_id, room, reason);
                channel.send(GatewayEvent::Error {
                    message: reason.to_string(),
                });
            }
        },

        GatewayCommand::SendMessage { room, message, sender } => {
            if sender.is_some_and(|claimed| claimed != session.user_id) {
                warn!(
                    "{} ({}) send_message claimed sender {:?}; using the identified user",
                    session.username, session.user_id, sender
                );
            }

            let key = match member_room(session, &room) {
                Ok(key) => key,
                Err(reason) => {
                    channel.send(GatewayEvent::Error {
                        message: reason.to_string(),
                    });
                    return;
                }
            };
            let Some(recipient) = key.other(session.user_id) else {
                return;
            };
            if message.trim().is_empty() {
                channel.send(GatewayEvent::Error {
                    message: "Message text is required".into(),
                });
                return;
            }

            let event = GatewayEvent::ReceiveMessage(MessagePayload {
                room: key,
                id: None,
                sender: session.user_id,
                from: session.user_id,
                to: recipient,
                text: message,
                time: Utc::now(),
                confirmed: false,
            });
            let reached = router.publish(&key, event, Some(channel.id())).await;
            debug!(
                "{} ({}) relayed to {} in {} (reached {})",
                session.username, session.user_id, recipient, key, reached
            );
        }
    }
}

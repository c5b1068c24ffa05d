use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use cloak_db::Database;
use cloak_types::api::Claims;
use cloak_types::events::{GatewayCommand, GatewayEvent, Topic};

use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// How long a fresh socket has to send Identify.
const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(10);

type Topics = Arc<RwLock<HashSet<Topic>>>;

/// Drive one WebSocket connection: Identify handshake, Ready, then relay
/// change events for the topics the client subscribed to.
pub async fn handle_connection(
    socket: WebSocket,
    dispatcher: Dispatcher,
    db: Arc<Database>,
    jwt_secret: String,
) {
    let (mut sender, mut receiver) = socket.split();

    let (user_id, username) = match wait_for_identify(&mut receiver, &jwt_secret, &db).await {
        Some(id) => id,
        None => {
            warn!("WebSocket client failed to identify, closing");
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
    };

    info!(user_id = %user_id, "{} connected to gateway", username);

    let ready = GatewayEvent::Ready {
        user_id,
        username: username.clone(),
    };
    if send_event(&mut sender, &ready).await.is_err() {
        return;
    }

    run_connection_loop(sender, receiver, dispatcher, db, user_id).await;
    info!(user_id = %user_id, "{} disconnected from gateway", username);
}

async fn run_connection_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    dispatcher: Dispatcher,
    db: Arc<Database>,
    user_id: Uuid,
) {
    let mut broadcast_rx = dispatcher.receiver();

    // Replies from the command side go through the send task, which owns the sink
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<GatewayEvent>();

    let topics: Topics = Arc::new(RwLock::new(HashSet::new()));
    let send_topics = topics.clone();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let event = match result {
                        Ok(event) => event,
                        Err(RecvError::Lagged(n)) => {
                            warn!(user_id = %user_id, "Gateway receiver lagged by {} events", n);
                            continue;
                        }
                        Err(RecvError::Closed) => break,
                    };

                    match &event {
                        GatewayEvent::SessionRevoked { user_id: revoked } if *revoked == user_id => {
                            info!(user_id = %user_id, "Session revoked, closing gateway connection");
                            let _ = send_event(&mut sender, &event).await;
                            let _ = sender.send(Message::Close(None)).await;
                            break;
                        }
                        GatewayEvent::Changed { topic, .. } => {
                            if !read_topics(&send_topics).contains(topic) {
                                continue;
                            }
                        }
                        _ => continue,
                    }

                    if send_event(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                reply = reply_rx.recv() => {
                    let Some(event) = reply else { break };
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
                            warn!(user_id = %user_id, "Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let recv_topics = topics.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => {
                        let reply = handle_command(&db, user_id, cmd, &recv_topics).await;
                        if let Some(event) = reply {
                            if reply_tx.send(event).is_err() {
                                break;
                            }
                        }
                    }
                    Err(e) => {
                        warn!(
                            user_id = %user_id,
                            "bad command: {} -- raw: {}",
                            e,
                            preview(&text)
                        );
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

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
}

async fn wait_for_identify(
    receiver: &mut SplitStream<WebSocket>,
    jwt_secret: &str,
    db: &Arc<Database>,
) -> Option<(Uuid, String)> {
    use jsonwebtoken::{DecodingKey, Validation, decode};

    let claims = tokio::time::timeout(IDENTIFY_TIMEOUT, async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(GatewayCommand::Identify { token }) =
                    serde_json::from_str::<GatewayCommand>(&text)
                {
                    let token_data = decode::<Claims>(
                        &token,
                        &DecodingKey::from_secret(jwt_secret.as_bytes()),
                        &Validation::default(),
                    )
                    .ok()?;
                    return Some(token_data.claims);
                }
            }
        }
        None
    })
    .await
    .ok()
    .flatten()?;

    // A valid token is not enough: the account must still exist and be active
    let db = db.clone();
    let user_id = claims.sub.to_string();
    let row = tokio::task::spawn_blocking(move || db.get_user_by_id(&user_id))
        .await
        .ok()?
        .ok()
        .flatten()?;
    if row.is_suspended {
        info!(user_id = %claims.sub, "Suspended account tried to identify");
        return None;
    }

    Some((claims.sub, row.username))
}

/// Apply a client command to the connection's topic set. Returns the event
/// to send back, if any.
async fn handle_command(
    db: &Arc<Database>,
    user_id: Uuid,
    cmd: GatewayCommand,
    topics: &Topics,
) -> Option<GatewayEvent> {
    match cmd {
        GatewayCommand::Identify { .. } => None, // Already handled

        GatewayCommand::Subscribe { topics: requested } => {
            let allowed = filter_allowed(db, user_id, requested).await;
            let current = {
                let mut subs = write_topics(topics);
                subs.extend(allowed);
                sorted(&subs)
            };
            debug!(user_id = %user_id, "now subscribed to {} topics", current.len());
            Some(GatewayEvent::Subscribed { topics: current })
        }

        GatewayCommand::Unsubscribe { topics: dropped } => {
            let current = {
                let mut subs = write_topics(topics);
                for topic in &dropped {
                    subs.remove(topic);
                }
                sorted(&subs)
            };
            Some(GatewayEvent::Subscribed { topics: current })
        }
    }
}

/// Conversation topics are only open to the two participants.
async fn filter_allowed(db: &Arc<Database>, user_id: Uuid, requested: Vec<Topic>) -> Vec<Topic> {
    let db = db.clone();
    let result = tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<Topic>> {
        let me = user_id.to_string();
        let mut allowed = Vec::with_capacity(requested.len());
        for topic in requested {
            match topic {
                Topic::Conversation(id) => {
                    if db.is_conversation_member(&id.to_string(), &me)? {
                        allowed.push(topic);
                    } else {
                        warn!(user_id = %user_id, %topic, "Refusing subscription to foreign conversation");
                    }
                }
                Topic::Group(_) | Topic::Statuses => allowed.push(topic),
            }
        }
        Ok(allowed)
    })
    .await;

    match result {
        Ok(Ok(allowed)) => allowed,
        Ok(Err(e)) => {
            warn!(user_id = %user_id, "Subscription check failed: {}", e);
            Vec::new()
        }
        Err(e) => {
            warn!(user_id = %user_id, "Subscription check panicked: {}", e);
            Vec::new()
        }
    }
}

async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &GatewayEvent,
) -> Result<(), axum::Error> {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            warn!("Failed to encode gateway event: {}", e);
            return Ok(());
        }
    };
    sender.send(Message::Text(text.into())).await
}

fn read_topics(topics: &Topics) -> std::sync::RwLockReadGuard<'_, HashSet<Topic>> {
    topics.read().unwrap_or_else(|e| e.into_inner())
}

fn write_topics(topics: &Topics) -> std::sync::RwLockWriteGuard<'_, HashSet<Topic>> {
    topics.write().unwrap_or_else(|e| e.into_inner())
}

/// Stable order for the Subscribed reply.
fn sorted(topics: &HashSet<Topic>) -> Vec<Topic> {
    let mut out: Vec<Topic> = topics.iter().copied().collect();
    out.sort_by_key(|t| t.to_string());
    out
}

/// The first 200 characters of a raw frame, for logs.
fn preview(text: &str) -> String {
    text.chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: &str = "2024-01-01T00:00:00.000000Z";

    fn setup() -> (Arc<Database>, Uuid, Uuid) {
        let db = Database::open_in_memory().unwrap();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        db.create_user(&a.to_string(), "alice", "hash", T).unwrap();
        db.create_user(&b.to_string(), "bob", "hash", T).unwrap();
        (Arc::new(db), a, b)
    }

    #[tokio::test]
    async fn foreign_conversation_topics_are_refused() {
        let (db, a, b) = setup();
        let conv = Uuid::new_v4();
        db.resolve_conversation(&a.to_string(), &b.to_string(), &conv.to_string(), T)
            .unwrap();
        let stranger = Uuid::new_v4();
        let group = Topic::Group(Uuid::new_v4());

        let allowed = filter_allowed(&db, stranger, vec![Topic::Conversation(conv), group]).await;
        assert_eq!(allowed, vec![group]);

        let allowed = filter_allowed(&db, a, vec![Topic::Conversation(conv)]).await;
        assert_eq!(allowed, vec![Topic::Conversation(conv)]);
    }

    #[tokio::test]
    async fn subscribe_then_unsubscribe_updates_topic_set() {
        let (db, a, _) = setup();
        let topics: Topics = Arc::new(RwLock::new(HashSet::new()));
        let group = Topic::Group(Uuid::new_v4());

        let reply = handle_command(
            &db,
            a,
            GatewayCommand::Subscribe { topics: vec![group, Topic::Statuses] },
            &topics,
        )
        .await;
        match reply {
            Some(GatewayEvent::Subscribed { topics: now }) => assert_eq!(now.len(), 2),
            other => panic!("unexpected reply: {:?}", other),
        }

        handle_command(&db, a, GatewayCommand::Unsubscribe { topics: vec![group] }, &topics).await;
        assert_eq!(sorted(&read_topics(&topics)), vec![Topic::Statuses]);
    }

    #[test]
    fn preview_stops_on_a_char_boundary() {
        let raw = format!("{{\"op\":\"{}", "€".repeat(300));
        let cut = preview(&raw);
        assert_eq!(cut.chars().count(), 200);
        assert!(raw.starts_with(&cut));
        assert_eq!(preview("short"), "short");
    }
}

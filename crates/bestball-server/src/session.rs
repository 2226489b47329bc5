// Per-connection protocol state: who the client is and which rooms it follows.

use std::collections::HashMap;
use std::sync::Arc;

use bestball_draft::commit::PickRequest;
use bestball_draft::engine::DraftEngine;
use bestball_draft::model::PickOrigin;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::identity::Identity;
use crate::protocol::{ClientMessage, ServerMessage};

/// Values advertised to clients in `WELCOME`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub ping_interval_secs: u64,
    pub warning_threshold_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        SessionSettings {
            ping_interval_secs: 10,
            warning_threshold_secs: 10,
        }
    }
}

pub struct Session {
    engine: Arc<DraftEngine>,
    identity: Arc<dyn Identity>,
    settings: SessionSettings,
    /// Pushes from room subscriptions go here, alongside direct replies.
    outbound: mpsc::Sender<ServerMessage>,
    addr: String,
    participant_id: Option<String>,
    subscriptions: HashMap<String, JoinHandle<()>>,
}

impl Session {
    pub fn new(
        engine: Arc<DraftEngine>,
        identity: Arc<dyn Identity>,
        settings: SessionSettings,
        outbound: mpsc::Sender<ServerMessage>,
        addr: &str,
    ) -> Self {
        Session {
            engine,
            identity,
            settings,
            outbound,
            addr: addr.to_string(),
            participant_id: None,
            subscriptions: HashMap::new(),
        }
    }

    pub fn participant_id(&self) -> Option<&str> {
        self.participant_id.as_deref()
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Parse and answer one raw text frame.
    pub async fn handle_text(&mut self, text: &str) -> ServerMessage {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(msg) => self.handle(msg).await,
            Err(e) => {
                warn!("Unparseable message from {}: {}", self.addr, e);
                ServerMessage::error(format!("invalid message: {e}"))
            }
        }
    }

    pub async fn handle(&mut self, msg: ClientMessage) -> ServerMessage {
        match msg {
            ClientMessage::Authenticate { token } => self.authenticate(&token),
            ClientMessage::Ping { client_send_ms } => {
                let reply = self.engine.ping(client_send_ms);
                ServerMessage::Pong {
                    client_send_ms: reply.client_send_ms,
                    server_time_ms: reply.server_time_ms,
                }
            }
            ClientMessage::GetRoomState { room_id } => {
                match self.engine.get_room_state(&room_id).await {
                    Ok(snapshot) => ServerMessage::RoomState { snapshot },
                    Err(e) => ServerMessage::error(e.to_string()),
                }
            }
            ClientMessage::Subscribe { room_id } => self.subscribe(room_id).await,
            ClientMessage::SubmitPick {
                room_id,
                player_id,
                expected_pick_index,
            } => {
                let Some(participant_id) = self.participant_id.clone() else {
                    return not_authenticated();
                };
                let req = PickRequest {
                    room_id,
                    participant_id,
                    player_id,
                    expected_pick_index,
                    origin: PickOrigin::Manual,
                };
                match self.engine.commit_pick(&req).await {
                    Ok(pick) => ServerMessage::PickCommitted { pick },
                    Err(e) => {
                        debug!("Pick from {} rejected: {}", self.addr, e);
                        ServerMessage::rejected(&e)
                    }
                }
            }
            ClientMessage::GetQueue { room_id } => {
                let Some(participant_id) = self.participant_id.clone() else {
                    return not_authenticated();
                };
                match self.engine.get_queue(&room_id, &participant_id).await {
                    Ok(entry) => ServerMessage::queue(&room_id, entry),
                    Err(e) => ServerMessage::error(e.to_string()),
                }
            }
            ClientMessage::SetQueue {
                room_id,
                player_ids,
            } => {
                let Some(participant_id) = self.participant_id.clone() else {
                    return not_authenticated();
                };
                match self.engine.set_queue(&room_id, &participant_id, player_ids).await {
                    Ok(entry) => ServerMessage::queue(&room_id, entry),
                    Err(e) => ServerMessage::error(e.to_string()),
                }
            }
            ClientMessage::RemoveFromQueue { room_id, player_id } => {
                let Some(participant_id) = self.participant_id.clone() else {
                    return not_authenticated();
                };
                match self
                    .engine
                    .remove_from_queue(&room_id, &participant_id, &player_id)
                    .await
                {
                    Ok(entry) => ServerMessage::queue(&room_id, entry),
                    Err(e) => ServerMessage::error(e.to_string()),
                }
            }
        }
    }

    fn authenticate(&mut self, token: &str) -> ServerMessage {
        match self.identity.resolve(token) {
            Some(participant_id) => {
                info!("Connection {} authenticated as {}", self.addr, participant_id);
                self.participant_id = Some(participant_id.clone());
                ServerMessage::Welcome {
                    participant_id,
                    ping_interval_secs: self.settings.ping_interval_secs,
                    warning_threshold_secs: self.settings.warning_threshold_secs,
                }
            }
            None => {
                warn!("Connection {} presented an unknown token", self.addr);
                ServerMessage::error("authentication failed")
            }
        }
    }

    /// Reply with the current snapshot, then forward every newer one.
    async fn subscribe(&mut self, room_id: String) -> ServerMessage {
        let mut updates = match self.engine.subscribe(&room_id).await {
            Ok(rx) => rx,
            Err(e) => return ServerMessage::error(e.to_string()),
        };
        let snapshot = updates.borrow_and_update().clone();

        let outbound = self.outbound.clone();
        let forwarder = tokio::spawn(async move {
            while updates.changed().await.is_ok() {
                let snapshot = updates.borrow_and_update().clone();
                if outbound.send(ServerMessage::RoomState { snapshot }).await.is_err() {
                    break;
                }
            }
        });
        if let Some(previous) = self.subscriptions.insert(room_id.clone(), forwarder) {
            previous.abort();
        }
        debug!("Connection {} subscribed to room {}", self.addr, room_id);

        ServerMessage::RoomState { snapshot }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        for (_, handle) in self.subscriptions.drain() {
            handle.abort();
        }
    }
}

fn not_authenticated() -> ServerMessage {
    ServerMessage::error("not authenticated")
}

// JSON wire protocol between draft clients and the server.
//
// Every frame is one JSON object tagged by `type`.

use bestball_draft::error::{CommitError, ErrorClass};
use bestball_draft::model::{Pick, QueueEntry, RoomSnapshot};
use serde::{Deserialize, Serialize};

/// Messages a client may send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    /// Bind this connection to a participant.
    Authenticate { token: String },

    /// Clock-offset probe; answered with `PONG` immediately.
    Ping { client_send_ms: i64 },

    GetRoomState { room_id: String },

    /// Stream `ROOM_STATE` for every committed change to the room.
    Subscribe { room_id: String },

    SubmitPick {
        room_id: String,
        player_id: String,
        expected_pick_index: u32,
    },

    GetQueue { room_id: String },

    SetQueue {
        room_id: String,
        player_ids: Vec<String>,
    },

    RemoveFromQueue { room_id: String, player_id: String },
}

/// Messages the server sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    Welcome {
        participant_id: String,
        ping_interval_secs: u64,
        warning_threshold_secs: u64,
    },

    Pong {
        client_send_ms: i64,
        server_time_ms: i64,
    },

    RoomState { snapshot: RoomSnapshot },

    PickCommitted { pick: Pick },

    PickRejected {
        code: String,
        class: ErrorClass,
        message: String,
    },

    Queue {
        room_id: String,
        player_ids: Vec<String>,
    },

    Error { message: String },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }

    pub fn rejected(err: &CommitError) -> Self {
        ServerMessage::PickRejected {
            code: err.code().to_string(),
            class: err.class(),
            message: err.to_string(),
        }
    }

    pub fn queue(room_id: &str, entry: QueueEntry) -> Self {
        ServerMessage::Queue {
            room_id: room_id.to_string(),
            player_ids: entry.player_ids,
        }
    }
}

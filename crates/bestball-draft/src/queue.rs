// Autodraft queue management.
//
// A queue is owned by one participant in one room and is only written by
// that participant's own requests. Entries for players drafted by someone
// else are left in place and skipped when the queue is consumed.

use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::model::QueueEntry;
use crate::pool::PlayerPool;
use crate::store::{DraftStore, StoreError};

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("room {0} not found")]
    RoomNotFound(String),

    #[error("participant {0} is not in this room")]
    UnknownParticipant(String),

    #[error("player {0} is not in the player pool")]
    UnknownPlayer(String),

    #[error("store failure: {0}")]
    Store(StoreError),
}

impl From<StoreError> for QueueError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::RoomNotFound(id) => QueueError::RoomNotFound(id),
            other => QueueError::Store(other),
        }
    }
}

pub struct QueueManager {
    store: Arc<dyn DraftStore>,
    pool: Arc<dyn PlayerPool>,
}

impl QueueManager {
    pub fn new(store: Arc<dyn DraftStore>, pool: Arc<dyn PlayerPool>) -> Self {
        QueueManager { store, pool }
    }

    /// Replace the participant's queue. Duplicate ids keep their first
    /// position; ids missing from the pool are rejected.
    pub async fn set_queue(
        &self,
        room_id: &str,
        participant_id: &str,
        player_ids: Vec<String>,
    ) -> Result<QueueEntry, QueueError> {
        self.check_participant(room_id, participant_id).await?;

        let mut seen = HashSet::new();
        let mut ordered = Vec::with_capacity(player_ids.len());
        for id in player_ids {
            if self.pool.get_player(&id).is_none() {
                return Err(QueueError::UnknownPlayer(id));
            }
            if seen.insert(id.clone()) {
                ordered.push(id);
            }
        }

        let entry = QueueEntry {
            participant_id: participant_id.to_string(),
            player_ids: ordered,
        };
        self.store.save_queue(room_id, &entry).await?;
        debug!(
            "queue set: room={} participant={} entries={}",
            room_id,
            participant_id,
            entry.player_ids.len()
        );
        Ok(entry)
    }

    /// Drop one player from the queue. Removing a player that is not queued
    /// is a no-op.
    pub async fn remove_from_queue(
        &self,
        room_id: &str,
        participant_id: &str,
        player_id: &str,
    ) -> Result<QueueEntry, QueueError> {
        self.check_participant(room_id, participant_id).await?;

        let mut entry = self.store.load_queue(room_id, participant_id).await?;
        let before = entry.player_ids.len();
        entry.player_ids.retain(|id| id != player_id);
        if entry.player_ids.len() != before {
            self.store.save_queue(room_id, &entry).await?;
        }
        Ok(entry)
    }

    pub async fn get_queue(
        &self,
        room_id: &str,
        participant_id: &str,
    ) -> Result<QueueEntry, QueueError> {
        self.check_participant(room_id, participant_id).await?;
        Ok(self.store.load_queue(room_id, participant_id).await?)
    }

    async fn check_participant(&self, room_id: &str, participant_id: &str) -> Result<(), QueueError> {
        let snapshot = self.store.load_room(room_id).await?;
        if snapshot.room.participant(participant_id).is_none() {
            return Err(QueueError::UnknownParticipant(participant_id.to_string()));
        }
        Ok(())
    }
}

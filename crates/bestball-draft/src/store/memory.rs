// In-process document store.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::{DraftStore, RoomNotifier, RoomSubscription, RoomWrite, StoreError};
use crate::model::{DraftRoom, QueueEntry, RoomSnapshot};

#[derive(Default)]
struct Documents {
    rooms: HashMap<String, RoomSnapshot>,
    queues: HashMap<(String, String), Vec<String>>,
}

/// Room and queue documents held in memory behind one mutex.
#[derive(Default)]
pub struct MemoryStore {
    docs: Mutex<Documents>,
    notifier: RoomNotifier,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn docs(&self) -> MutexGuard<'_, Documents> {
        self.docs.lock().expect("memory store mutex poisoned")
    }
}

#[async_trait]
impl DraftStore for MemoryStore {
    async fn create_room(&self, room: DraftRoom) -> Result<RoomSnapshot, StoreError> {
        let mut docs = self.docs();
        if docs.rooms.contains_key(&room.room_id) {
            return Err(StoreError::AlreadyExists(room.room_id));
        }
        let snapshot = RoomSnapshot {
            room,
            picks: Vec::new(),
            version: 1,
        };
        docs.rooms
            .insert(snapshot.room.room_id.clone(), snapshot.clone());
        Ok(snapshot)
    }

    async fn load_room(&self, room_id: &str) -> Result<RoomSnapshot, StoreError> {
        self.docs()
            .rooms
            .get(room_id)
            .cloned()
            .ok_or_else(|| StoreError::RoomNotFound(room_id.to_string()))
    }

    async fn commit_room(&self, write: RoomWrite) -> Result<RoomSnapshot, StoreError> {
        let mut docs = self.docs();
        let stored = docs
            .rooms
            .get_mut(&write.room.room_id)
            .ok_or_else(|| StoreError::RoomNotFound(write.room.room_id.clone()))?;

        if stored.version != write.expected_version {
            return Err(StoreError::Conflict);
        }

        if let Some(pick) = &write.pick {
            // Same guarantees the SQLite primary key / unique index give.
            if pick.pick_index as usize != stored.picks.len() || stored.is_taken(&pick.player_id) {
                return Err(StoreError::Conflict);
            }
        }

        if let Some(pick) = write.pick {
            stored.picks.push(pick);
        }
        stored.room = write.room;
        stored.version += 1;

        let snapshot = stored.clone();
        self.notifier.publish(&snapshot);
        Ok(snapshot)
    }

    async fn list_rooms(&self) -> Result<Vec<String>, StoreError> {
        let mut ids: Vec<String> = self.docs().rooms.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    async fn load_queue(
        &self,
        room_id: &str,
        participant_id: &str,
    ) -> Result<QueueEntry, StoreError> {
        let docs = self.docs();
        let player_ids = docs
            .queues
            .get(&(room_id.to_string(), participant_id.to_string()))
            .cloned()
            .unwrap_or_default();
        Ok(QueueEntry {
            participant_id: participant_id.to_string(),
            player_ids,
        })
    }

    async fn save_queue(&self, room_id: &str, entry: &QueueEntry) -> Result<(), StoreError> {
        self.docs().queues.insert(
            (room_id.to_string(), entry.participant_id.clone()),
            entry.player_ids.clone(),
        );
        Ok(())
    }

    async fn subscribe(&self, room_id: &str) -> Result<RoomSubscription, StoreError> {
        let docs = self.docs();
        let current = docs
            .rooms
            .get(room_id)
            .cloned()
            .ok_or_else(|| StoreError::RoomNotFound(room_id.to_string()))?;
        Ok(self.notifier.subscribe(current))
    }
}

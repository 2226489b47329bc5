// Room supervisor: seeds configured rooms and keeps one timer per live room.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use bestball_draft::engine::DraftEngine;
use bestball_draft::model::{DraftRoom, RoomStatus};
use bestball_draft::store::StoreError;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::RoomConfig;

pub struct RoomSupervisor {
    engine: Arc<DraftEngine>,
    watchers: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl RoomSupervisor {
    pub fn new(engine: Arc<DraftEngine>) -> Self {
        RoomSupervisor {
            engine,
            watchers: Mutex::new(HashMap::new()),
        }
    }

    /// Create every configured room the store does not know yet. Rooms that
    /// already exist are left alone, so a restart never resets a draft.
    /// Returns how many rooms were created.
    pub async fn seed_rooms(&self, rooms: &[RoomConfig]) -> anyhow::Result<usize> {
        let mut created = 0;
        for cfg in rooms {
            match self.engine.get_room_state(&cfg.id).await {
                Ok(_) => {
                    debug!("Room {} already stored, not seeding", cfg.id);
                    continue;
                }
                Err(StoreError::RoomNotFound(_)) => {}
                Err(e) => return Err(e).with_context(|| format!("failed to look up room {}", cfg.id)),
            }

            let room = DraftRoom::new(
                &cfg.id,
                cfg.participants.clone(),
                cfg.rounds,
                cfg.pick_time_secs,
                cfg.starts_at,
            );
            self.engine
                .create_room(room)
                .await
                .with_context(|| format!("failed to create room {}", cfg.id))?;
            for participant in &cfg.autodraft {
                self.engine
                    .set_autodraft(&cfg.id, participant, true)
                    .await
                    .with_context(|| format!("failed to enable autodraft for {participant} in {}", cfg.id))?;
            }
            info!(
                "Seeded room {} ({} participants, {} rounds, starts {})",
                cfg.id,
                cfg.participants.len(),
                cfg.rounds,
                cfg.starts_at
            );
            created += 1;
        }
        Ok(created)
    }

    /// Start a timer for every stored room that is not complete. Safe to call
    /// again: rooms with a running timer are skipped. Returns how many timers
    /// were started.
    pub async fn start_watchers(&self) -> anyhow::Result<usize> {
        let room_ids = self
            .engine
            .list_rooms()
            .await
            .context("failed to list rooms")?;

        let mut started = 0;
        for room_id in room_ids {
            let snapshot = self
                .engine
                .get_room_state(&room_id)
                .await
                .with_context(|| format!("failed to load room {room_id}"))?;
            if snapshot.room.status == RoomStatus::Complete {
                continue;
            }

            let mut watchers = self.watchers.lock().expect("watcher map lock poisoned");
            if watchers.get(&room_id).is_some_and(|h| !h.is_finished()) {
                continue;
            }
            info!(
                "Starting timer for room {} ({}, pick {})",
                room_id,
                snapshot.room.status.as_str(),
                snapshot.room.current_pick_index
            );
            watchers.insert(room_id.clone(), self.engine.spawn_watcher(&room_id));
            started += 1;
        }
        Ok(started)
    }

    pub fn running(&self) -> usize {
        let watchers = self.watchers.lock().expect("watcher map lock poisoned");
        watchers.values().filter(|h| !h.is_finished()).count()
    }

    /// Abort every timer.
    pub fn shutdown(&self) {
        let mut watchers = self.watchers.lock().expect("watcher map lock poisoned");
        for (room_id, handle) in watchers.drain() {
            debug!("Stopping timer for room {}", room_id);
            handle.abort();
        }
    }
}

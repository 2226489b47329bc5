// One-stop handle onto the draft engine for transports and supervisors.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::clock::Clock;
use crate::commit::{PickCommitService, PickRequest, DEFAULT_COMMIT_ATTEMPTS};
use crate::error::CommitError;
use crate::latency::{answer_ping, PingReply};
use crate::lifecycle::{LifecycleError, RoomLifecycle};
use crate::model::{DraftRoom, Pick, QueueEntry, RoomSnapshot};
use crate::pool::PlayerPool;
use crate::queue::{QueueError, QueueManager};
use crate::roster::RosterRules;
use crate::store::{DraftStore, RoomSubscription, StoreError};
use crate::timer::{AutoPickEngine, TimerSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub commit_attempts: u32,
    pub timer: TimerSettings,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            commit_attempts: DEFAULT_COMMIT_ATTEMPTS,
            timer: TimerSettings::default(),
        }
    }
}

pub struct DraftEngine {
    store: Arc<dyn DraftStore>,
    clock: Arc<dyn Clock>,
    commits: Arc<PickCommitService>,
    lifecycle: Arc<RoomLifecycle>,
    queues: QueueManager,
    timer: Arc<AutoPickEngine>,
}

impl DraftEngine {
    pub fn new(
        store: Arc<dyn DraftStore>,
        pool: Arc<dyn PlayerPool>,
        clock: Arc<dyn Clock>,
        rules: RosterRules,
        settings: EngineSettings,
    ) -> Self {
        let grace = chrono::Duration::from_std(settings.timer.grace)
            .unwrap_or_else(|_| chrono::Duration::zero());
        let commits = Arc::new(
            PickCommitService::new(store.clone(), pool.clone(), clock.clone(), Arc::new(rules))
                .with_max_attempts(settings.commit_attempts)
                .with_grace(grace),
        );
        let lifecycle = Arc::new(
            RoomLifecycle::new(store.clone(), clock.clone())
                .with_max_attempts(settings.commit_attempts),
        );
        let queues = QueueManager::new(store.clone(), pool);
        let timer = Arc::new(AutoPickEngine::new(
            store.clone(),
            commits.clone(),
            lifecycle.clone(),
            clock.clone(),
            settings.timer,
        ));

        DraftEngine {
            store,
            clock,
            commits,
            lifecycle,
            queues,
            timer,
        }
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn pool(&self) -> &dyn PlayerPool {
        self.commits.pool()
    }

    pub async fn commit_pick(&self, req: &PickRequest) -> Result<Pick, CommitError> {
        self.commits.commit_pick(req).await
    }

    pub async fn get_room_state(&self, room_id: &str) -> Result<RoomSnapshot, StoreError> {
        self.store.load_room(room_id).await
    }

    pub async fn subscribe(&self, room_id: &str) -> Result<RoomSubscription, StoreError> {
        self.store.subscribe(room_id).await
    }

    pub async fn list_rooms(&self) -> Result<Vec<String>, StoreError> {
        self.store.list_rooms().await
    }

    pub async fn set_queue(
        &self,
        room_id: &str,
        participant_id: &str,
        player_ids: Vec<String>,
    ) -> Result<QueueEntry, QueueError> {
        self.queues.set_queue(room_id, participant_id, player_ids).await
    }

    pub async fn remove_from_queue(
        &self,
        room_id: &str,
        participant_id: &str,
        player_id: &str,
    ) -> Result<QueueEntry, QueueError> {
        self.queues
            .remove_from_queue(room_id, participant_id, player_id)
            .await
    }

    pub async fn get_queue(&self, room_id: &str, participant_id: &str) -> Result<QueueEntry, QueueError> {
        self.queues.get_queue(room_id, participant_id).await
    }

    pub async fn create_room(&self, room: DraftRoom) -> Result<RoomSnapshot, LifecycleError> {
        self.lifecycle.create_room(room).await
    }

    pub async fn activate(&self, room_id: &str) -> Result<RoomSnapshot, LifecycleError> {
        self.lifecycle.activate(room_id).await
    }

    pub async fn pause(&self, room_id: &str) -> Result<RoomSnapshot, LifecycleError> {
        self.lifecycle.pause(room_id).await
    }

    pub async fn resume(&self, room_id: &str) -> Result<RoomSnapshot, LifecycleError> {
        self.lifecycle.resume(room_id).await
    }

    pub async fn set_autodraft(
        &self,
        room_id: &str,
        participant_id: &str,
        enabled: bool,
    ) -> Result<RoomSnapshot, LifecycleError> {
        self.lifecycle
            .set_autodraft(room_id, participant_id, enabled)
            .await
    }

    /// Answer a latency ping with the server clock.
    pub fn ping(&self, client_send_ms: i64) -> PingReply {
        answer_ping(self.clock.as_ref(), client_send_ms)
    }

    /// Start the auto-pick watcher for one room.
    pub fn spawn_watcher(&self, room_id: &str) -> JoinHandle<()> {
        self.timer.spawn(room_id)
    }
}

// Per-room turn timer and auto-pick engine.
//
// Each room gets one watcher task. The watcher reads the latest snapshot from
// the store's change feed, decides what to do with the pure `evaluate`, and
// either sleeps until the next interesting instant (waking early on any room
// change) or fires an automatic pick through the normal commit path.
//
//   WATCHING --deadline + grace--> FIRING --commit / STALE_TURN--> IDLE
//      ^                                                           |
//      +------------------------ next turn ------------------------+

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::autopick::choose_player;
use crate::clock::{self, Clock};
use crate::commit::{PickCommitService, PickRequest};
use crate::error::CommitError;
use crate::lifecycle::{LifecycleError, RoomLifecycle};
use crate::model::{PickOrigin, RoomSnapshot, RoomStatus};
use crate::store::{DraftStore, RoomSubscription, StoreError};

/// Where a room's watcher is in its per-turn cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    /// Waiting for the deadline (or start time) to pass.
    Watching,
    /// Selecting and committing an automatic pick.
    Firing,
    /// Nothing to watch: the room is paused or complete.
    Idle,
}

/// What the watcher should do given one snapshot and the current time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchDecision {
    /// Sleep until this instant unless the room changes first.
    WaitUntil(DateTime<Utc>),
    /// The room's start time has passed; move it to `active`.
    Activate,
    /// Make an automatic pick for this slot.
    Fire {
        pick_index: u32,
        participant_id: String,
        origin: PickOrigin,
    },
    /// Paused: wait for the next room change without a deadline.
    Suspended,
    /// Complete: the watcher exits.
    Finished,
}

impl WatchDecision {
    pub fn state(&self) -> TimerState {
        match self {
            WatchDecision::WaitUntil(_) | WatchDecision::Activate => TimerState::Watching,
            WatchDecision::Fire { .. } => TimerState::Firing,
            WatchDecision::Suspended | WatchDecision::Finished => TimerState::Idle,
        }
    }
}

/// Decide the watcher's next step. Pure.
///
/// An autodraft participant is picked for as soon as their turn starts.
/// Everyone else gets until `deadline + grace`.
pub fn evaluate(snapshot: &RoomSnapshot, now: DateTime<Utc>, grace: chrono::Duration) -> WatchDecision {
    let room = &snapshot.room;
    match room.status {
        RoomStatus::Complete => WatchDecision::Finished,
        RoomStatus::Paused => WatchDecision::Suspended,
        RoomStatus::Scheduled => {
            if now >= room.starts_at {
                WatchDecision::Activate
            } else {
                WatchDecision::WaitUntil(room.starts_at)
            }
        }
        RoomStatus::Active => {
            let Some(on_clock) = room.on_clock() else {
                return WatchDecision::Finished;
            };
            let fire = |origin| WatchDecision::Fire {
                pick_index: room.current_pick_index,
                participant_id: on_clock.participant_id.clone(),
                origin,
            };
            if on_clock.autodraft {
                return fire(PickOrigin::Queue);
            }
            match room.current_turn_deadline {
                Some(deadline) if now < deadline + grace => WatchDecision::WaitUntil(deadline + grace),
                // A turn with no deadline can never expire on its own.
                _ => fire(PickOrigin::Auto),
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerSettings {
    /// Buffer after the deadline before an automatic pick fires.
    pub grace: Duration,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
}

impl Default for TimerSettings {
    fn default() -> Self {
        TimerSettings {
            grace: Duration::from_millis(1500),
            backoff_initial: Duration::from_millis(250),
            backoff_max: Duration::from_secs(10),
        }
    }
}

/// Exponential backoff for retrying infrastructure failures.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Option<Duration>,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Backoff {
            initial,
            max: max.max(initial),
            current: None,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let next = match self.current {
            None => self.initial,
            Some(d) => (d * 2).min(self.max),
        };
        self.current = Some(next);
        next
    }

    pub fn reset(&mut self) {
        self.current = None;
    }
}

/// How one firing attempt ended.
#[derive(Debug, PartialEq, Eq)]
enum FireOutcome {
    /// A pick landed for this slot, ours or someone else's.
    Settled,
    /// Try again after a backoff.
    Retry,
}

/// Spawns and runs per-room watchers.
pub struct AutoPickEngine {
    store: Arc<dyn DraftStore>,
    commits: Arc<PickCommitService>,
    lifecycle: Arc<RoomLifecycle>,
    clock: Arc<dyn Clock>,
    settings: TimerSettings,
}

impl AutoPickEngine {
    pub fn new(
        store: Arc<dyn DraftStore>,
        commits: Arc<PickCommitService>,
        lifecycle: Arc<RoomLifecycle>,
        clock: Arc<dyn Clock>,
        settings: TimerSettings,
    ) -> Self {
        AutoPickEngine {
            store,
            commits,
            lifecycle,
            clock,
            settings,
        }
    }

    /// Start a watcher for one room on the current runtime.
    pub fn spawn(self: &Arc<Self>, room_id: &str) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        let room_id = room_id.to_string();
        tokio::spawn(async move { engine.watch_room(&room_id).await })
    }

    /// Run one room's watcher until the room completes or disappears.
    pub async fn watch_room(&self, room_id: &str) {
        let Some(mut updates) = self.subscribe_with_retry(room_id).await else {
            return;
        };
        let grace = chrono::Duration::from_std(self.settings.grace)
            .unwrap_or_else(|_| chrono::Duration::zero());
        let mut backoff = Backoff::new(self.settings.backoff_initial, self.settings.backoff_max);
        let mut state = TimerState::Idle;

        info!("timer started for room {}", room_id);

        loop {
            let snapshot = updates.borrow_and_update().clone();
            let now = self.clock.now();
            let decision = evaluate(&snapshot, now, grace);

            if decision.state() != state {
                debug!("room {} timer: {:?} -> {:?}", room_id, state, decision.state());
                state = decision.state();
            }

            match decision {
                WatchDecision::Finished => {
                    info!("room {} complete, timer exiting", room_id);
                    return;
                }
                WatchDecision::Suspended => {
                    if updates.changed().await.is_err() {
                        return;
                    }
                }
                WatchDecision::WaitUntil(at) => {
                    if !self.sleep_or_change(&mut updates, clock::until(now, at)).await {
                        return;
                    }
                }
                WatchDecision::Activate => match self.lifecycle.activate(room_id).await {
                    Ok(_) => backoff.reset(),
                    // Someone else moved it; the next snapshot says where to.
                    Err(LifecycleError::InvalidTransition { .. }) => backoff.reset(),
                    Err(e) => {
                        let delay = backoff.next_delay();
                        warn!("room {} activation failed: {} (retrying in {:?})", room_id, e, delay);
                        if !self.sleep_or_change(&mut updates, delay).await {
                            return;
                        }
                    }
                },
                WatchDecision::Fire {
                    pick_index,
                    participant_id,
                    origin,
                } => {
                    let outcome = self
                        .fire(&snapshot, pick_index, &participant_id, origin)
                        .await;
                    if outcome == FireOutcome::Settled {
                        backoff.reset();
                    } else {
                        let delay = backoff.next_delay();
                        warn!(
                            "room {} pick {}: auto-pick not settled, retrying in {:?}",
                            room_id, pick_index, delay
                        );
                        if !self.sleep_or_change(&mut updates, delay).await {
                            return;
                        }
                    }
                }
            }
        }
    }

    async fn subscribe_with_retry(&self, room_id: &str) -> Option<RoomSubscription> {
        let mut backoff = Backoff::new(self.settings.backoff_initial, self.settings.backoff_max);
        loop {
            match self.store.subscribe(room_id).await {
                Ok(rx) => return Some(rx),
                Err(StoreError::RoomNotFound(_)) => {
                    warn!("room {} not found, timer not started", room_id);
                    return None;
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    warn!("room {} subscribe failed: {} (retrying in {:?})", room_id, e, delay);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Sleep for `wait`, returning early on a room change. `false` once the
    /// change feed is gone.
    async fn sleep_or_change(&self, updates: &mut RoomSubscription, wait: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(wait) => true,
            changed = updates.changed() => changed.is_ok(),
        }
    }

    /// Pick for the on-clock participant. `STALE_TURN` means the slot was
    /// filled by another path and counts as settled.
    async fn fire(
        &self,
        snapshot: &RoomSnapshot,
        pick_index: u32,
        participant_id: &str,
        origin: PickOrigin,
    ) -> FireOutcome {
        let room_id = snapshot.room.room_id.as_str();

        let queue = match self.store.load_queue(room_id, participant_id).await {
            Ok(q) => q,
            Err(e) => {
                warn!("room {} pick {}: failed to load queue: {}", room_id, pick_index, e);
                return FireOutcome::Retry;
            }
        };

        let Some(choice) = choose_player(
            snapshot,
            participant_id,
            &queue,
            self.commits.pool(),
            self.commits.rules(),
        ) else {
            error!(
                "room {} pick {}: no legal player available for {}",
                room_id, pick_index, participant_id
            );
            return FireOutcome::Retry;
        };

        let req = PickRequest {
            room_id: room_id.to_string(),
            participant_id: participant_id.to_string(),
            player_id: choice.player_id.clone(),
            expected_pick_index: pick_index,
            origin,
        };

        match self.commits.commit_pick(&req).await {
            Ok(_) => {
                info!(
                    "auto-pick: room={} pick={} participant={} player={} source={:?}",
                    room_id, pick_index, participant_id, choice.player_id, choice.source
                );
                FireOutcome::Settled
            }
            Err(CommitError::StaleTurn { current, .. }) => {
                debug!(
                    "room {} pick {} already filled (now at {}), nothing to do",
                    room_id, pick_index, current
                );
                FireOutcome::Settled
            }
            Err(e) if e.is_infrastructure() => {
                warn!("room {} pick {}: store failure: {}", room_id, pick_index, e);
                FireOutcome::Retry
            }
            Err(e) => {
                warn!(
                    "room {} pick {}: auto-pick rejected with {}: {}",
                    room_id,
                    pick_index,
                    e.code(),
                    e
                );
                FireOutcome::Retry
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DraftRoom, Participant};
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 9, 1, 18, 0, 0).unwrap()
    }

    fn make_snapshot(status: RoomStatus) -> RoomSnapshot {
        let mut room = DraftRoom::new("r", vec!["a".into(), "b".into()], 2, 30, t0());
        room.status = status;
        if status == RoomStatus::Active {
            room.current_turn_deadline = Some(t0() + chrono::Duration::seconds(30));
        }
        RoomSnapshot {
            room,
            picks: vec![],
            version: 1,
        }
    }

    fn grace() -> chrono::Duration {
        chrono::Duration::milliseconds(1500)
    }

    #[test]
    fn scheduled_room_waits_for_start_then_activates() {
        let snap = make_snapshot(RoomStatus::Scheduled);
        let early = t0() - chrono::Duration::seconds(5);
        assert_eq!(evaluate(&snap, early, grace()), WatchDecision::WaitUntil(t0()));
        assert_eq!(evaluate(&snap, t0(), grace()), WatchDecision::Activate);
    }

    #[test]
    fn active_room_waits_for_deadline_plus_grace() {
        let snap = make_snapshot(RoomStatus::Active);
        let deadline = t0() + chrono::Duration::seconds(30);
        let decision = evaluate(&snap, deadline, grace());
        assert_eq!(decision, WatchDecision::WaitUntil(deadline + grace()));
        assert_eq!(decision.state(), TimerState::Watching);

        let decision = evaluate(&snap, deadline + grace(), grace());
        assert_eq!(
            decision,
            WatchDecision::Fire {
                pick_index: 0,
                participant_id: "a".into(),
                origin: PickOrigin::Auto,
            }
        );
        assert_eq!(decision.state(), TimerState::Firing);
    }

    #[test]
    fn autodraft_participant_fires_immediately_as_queue() {
        let mut snap = make_snapshot(RoomStatus::Active);
        snap.room.participants[0] = Participant {
            participant_id: "a".into(),
            seed_position: 1,
            autodraft: true,
        };
        assert_eq!(
            evaluate(&snap, t0(), grace()),
            WatchDecision::Fire {
                pick_index: 0,
                participant_id: "a".into(),
                origin: PickOrigin::Queue,
            }
        );
    }

    #[test]
    fn paused_and_complete_rooms_idle() {
        let far = t0() + chrono::Duration::hours(1);
        let paused = evaluate(&make_snapshot(RoomStatus::Paused), far, grace());
        assert_eq!(paused, WatchDecision::Suspended);
        assert_eq!(paused.state(), TimerState::Idle);
        assert_eq!(
            evaluate(&make_snapshot(RoomStatus::Complete), far, grace()),
            WatchDecision::Finished
        );
    }

    #[test]
    fn backoff_doubles_to_ceiling_and_resets() {
        let mut b = Backoff::new(Duration::from_millis(250), Duration::from_secs(1));
        let delays: Vec<u128> = (0..5).map(|_| b.next_delay().as_millis()).collect();
        assert_eq!(delays, vec![250, 500, 1000, 1000, 1000]);
        b.reset();
        assert_eq!(b.next_delay(), Duration::from_millis(250));
    }
}

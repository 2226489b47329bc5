// Pick commit service: the single write path for picks.
//
// Manual submissions and the auto-pick engine both land here. Every attempt
// re-reads the room, re-checks every precondition against that read, and
// commits with an optimistic version check; a lost race re-runs the whole
// sequence from the top.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::CommitError;
use crate::model::{Pick, PickOrigin, RoomSnapshot, RoomStatus};
use crate::pick_order::round_number;
use crate::pool::PlayerPool;
use crate::roster::{validate_pick, RosterRules};
use crate::store::{DraftStore, RoomWrite, StoreError};

/// Default bound on optimistic commit attempts.
pub const DEFAULT_COMMIT_ATTEMPTS: u32 = 5;

/// One request to draft a player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickRequest {
    pub room_id: String,
    pub participant_id: String,
    pub player_id: String,
    /// The pick index the caller believes is on the clock.
    pub expected_pick_index: u32,
    pub origin: PickOrigin,
}

pub struct PickCommitService {
    store: Arc<dyn DraftStore>,
    pool: Arc<dyn PlayerPool>,
    clock: Arc<dyn Clock>,
    rules: Arc<RosterRules>,
    max_attempts: u32,
    grace: Duration,
}

impl PickCommitService {
    pub fn new(
        store: Arc<dyn DraftStore>,
        pool: Arc<dyn PlayerPool>,
        clock: Arc<dyn Clock>,
        rules: Arc<RosterRules>,
    ) -> Self {
        PickCommitService {
            store,
            pool,
            clock,
            rules,
            max_attempts: DEFAULT_COMMIT_ATTEMPTS,
            grace: Duration::zero(),
        }
    }

    /// Slack past the turn deadline during which a manual pick still counts.
    /// Should match the auto-pick timer's grace.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace.max(Duration::zero());
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn rules(&self) -> &RosterRules {
        &self.rules
    }

    pub fn pool(&self) -> &dyn PlayerPool {
        self.pool.as_ref()
    }

    /// Validate and atomically commit one pick. Precondition failures come
    /// back as typed errors and never mutate state.
    pub async fn commit_pick(&self, req: &PickRequest) -> Result<Pick, CommitError> {
        for attempt in 1..=self.max_attempts {
            let snapshot = self.store.load_room(&req.room_id).await?;
            let now = self.clock.now();

            let (write, pick) =
                match plan_commit(&snapshot, req, self.pool.as_ref(), &self.rules, now, self.grace) {
                    Ok(planned) => planned,
                    Err(e) => {
                        debug!(
                            "pick rejected: room={} pick={} participant={} player={} origin={} code={}",
                            req.room_id,
                            req.expected_pick_index,
                            req.participant_id,
                            req.player_id,
                            req.origin.as_str(),
                            e.code()
                        );
                        return Err(e);
                    }
                };

            match self.store.commit_room(write).await {
                Ok(_) => {
                    info!(
                        "pick committed: room={} pick={} round={} participant={} player={} origin={}",
                        req.room_id,
                        pick.pick_index,
                        pick.round,
                        pick.participant_id,
                        pick.player_id,
                        pick.origin.as_str()
                    );
                    return Ok(pick);
                }
                Err(StoreError::Conflict) => {
                    debug!(
                        "commit conflict on room {} (attempt {}/{}), retrying",
                        req.room_id, attempt, self.max_attempts
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        warn!(
            "commit contention on room {}: gave up after {} attempts",
            req.room_id, self.max_attempts
        );
        Err(CommitError::CommitContention {
            attempts: self.max_attempts,
        })
    }
}

/// Check every precondition against one consistent read and build the write
/// that commits the pick. Pure: the same snapshot, request and `now` always
/// give the same result.
///
/// A manual pick landing at or past `deadline + grace` is refused with
/// `TurnExpired`; that slot now belongs to the auto-pick. Automatic picks are
/// exempt since they are what fills expired turns.
pub fn plan_commit(
    snapshot: &RoomSnapshot,
    req: &PickRequest,
    pool: &dyn PlayerPool,
    rules: &RosterRules,
    now: DateTime<Utc>,
    grace: Duration,
) -> Result<(RoomWrite, Pick), CommitError> {
    let room = &snapshot.room;

    if room.status != RoomStatus::Active {
        return Err(CommitError::RoomNotActive);
    }
    if req.expected_pick_index != room.current_pick_index {
        return Err(CommitError::StaleTurn {
            expected: req.expected_pick_index,
            current: room.current_pick_index,
        });
    }
    if req.origin == PickOrigin::Manual {
        if let Some(deadline) = room.current_turn_deadline {
            if now >= deadline + grace {
                return Err(CommitError::TurnExpired {
                    pick_index: room.current_pick_index,
                });
            }
        }
    }
    if room.participant(&req.participant_id).is_none() {
        return Err(CommitError::UnknownParticipant(req.participant_id.clone()));
    }
    let player = pool
        .get_player(&req.player_id)
        .ok_or_else(|| CommitError::UnknownPlayer(req.player_id.clone()))?;

    validate_pick(rules, snapshot, &req.participant_id, player)?;

    let pick = Pick {
        pick_index: room.current_pick_index,
        round: round_number(room.current_pick_index, room.participant_count()),
        participant_id: req.participant_id.clone(),
        player_id: player.player_id.clone(),
        position: player.position,
        committed_at: now,
        origin: req.origin,
    };

    let mut next = room.clone();
    next.current_pick_index += 1;
    next.paused_remaining_ms = None;
    if next.is_complete() {
        next.status = RoomStatus::Complete;
        next.current_turn_deadline = None;
    } else {
        next.current_turn_deadline = Some(now + next.pick_time_limit());
    }

    Ok((
        RoomWrite {
            room: next,
            expected_version: snapshot.version,
            pick: Some(pick.clone()),
        },
        pick,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::model::{DraftRoom, QueueEntry};
    use crate::pool::{PlayerPoolEntry, StaticPlayerPool};
    use crate::error::ErrorClass;
    use crate::roster::{Position, PositionLimit};
    use crate::store::{MemoryStore, RoomSubscription};
    use async_trait::async_trait;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 9, 1, 18, 0, 0).unwrap()
    }

    fn make_pool() -> StaticPlayerPool {
        let positions = [
            Position::RunningBack,
            Position::WideReceiver,
            Position::WideReceiver,
            Position::RunningBack,
            Position::Quarterback,
            Position::TightEnd,
            Position::WideReceiver,
            Position::TightEnd,
            Position::Quarterback,
        ];
        StaticPlayerPool::from_entries(
            positions
                .iter()
                .enumerate()
                .map(|(i, pos)| PlayerPoolEntry {
                    player_id: format!("p{}", i + 1),
                    name: format!("Player {}", i + 1),
                    position: *pos,
                    team: "FA".into(),
                    bye_week: None,
                    rank: Some(i as u32 + 1),
                })
                .collect(),
        )
    }

    fn active_room(ids: &[&str], rounds: u32) -> DraftRoom {
        let mut room = DraftRoom::new(
            "room",
            ids.iter().map(|s| s.to_string()).collect(),
            rounds,
            30,
            t0(),
        );
        room.status = RoomStatus::Active;
        room.current_turn_deadline = Some(t0() + chrono::Duration::seconds(30));
        room
    }

    async fn make_service(room: DraftRoom) -> (Arc<MemoryStore>, Arc<ManualClock>, PickCommitService) {
        make_service_with(room, RosterRules::default()).await
    }

    async fn make_service_with(
        room: DraftRoom,
        rules: RosterRules,
    ) -> (Arc<MemoryStore>, Arc<ManualClock>, PickCommitService) {
        let store = Arc::new(MemoryStore::new());
        store.create_room(room).await.unwrap();
        let clock = Arc::new(ManualClock::new(t0()));
        let svc = PickCommitService::new(
            store.clone(),
            Arc::new(make_pool()),
            clock.clone(),
            Arc::new(rules),
        )
        .with_grace(chrono::Duration::milliseconds(1500));
        (store, clock, svc)
    }

    fn limits(entries: &[(Position, u32, u32)]) -> RosterRules {
        RosterRules::new(
            entries
                .iter()
                .map(|(pos, min, max)| (*pos, PositionLimit { min: *min, max: *max }))
                .collect(),
        )
    }

    fn req(who: &str, player: &str, idx: u32) -> PickRequest {
        PickRequest {
            room_id: "room".into(),
            participant_id: who.into(),
            player_id: player.into(),
            expected_pick_index: idx,
            origin: PickOrigin::Manual,
        }
    }

    #[tokio::test]
    async fn three_by_two_room_runs_to_completion() {
        let (store, clock, svc) = make_service(active_room(&["A", "B", "C"], 2)).await;
        let order = ["A", "B", "C", "C", "B", "A"];
        for (idx, who) in order.iter().enumerate() {
            clock.advance(chrono::Duration::seconds(5));
            let pick = svc
                .commit_pick(&req(who, &format!("p{}", idx + 1), idx as u32))
                .await
                .unwrap();
            assert_eq!(pick.pick_index, idx as u32);
            assert_eq!(pick.round, idx as u32 / 3 + 1);
        }

        let snap = store.load_room("room").await.unwrap();
        assert_eq!(snap.room.status, RoomStatus::Complete);
        assert_eq!(snap.room.current_turn_deadline, None);
        let indices: Vec<u32> = snap.picks.iter().map(|p| p.pick_index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4, 5]);

        let err = svc.commit_pick(&req("A", "p7", 6)).await.unwrap_err();
        assert!(matches!(err, CommitError::RoomNotActive));
    }

    #[tokio::test]
    async fn success_recomputes_deadline_from_now() {
        let (store, clock, svc) = make_service(active_room(&["A", "B"], 2)).await;
        clock.advance(chrono::Duration::seconds(12));
        svc.commit_pick(&req("A", "p1", 0)).await.unwrap();
        let snap = store.load_room("room").await.unwrap();
        assert_eq!(
            snap.room.current_turn_deadline,
            Some(t0() + chrono::Duration::seconds(42))
        );
        assert_eq!(snap.room.current_pick_index, 1);
    }

    #[tokio::test]
    async fn wrong_expected_index_is_stale_and_replays_stay_stale() {
        let (store, _clock, svc) = make_service(active_room(&["A", "B"], 2)).await;
        svc.commit_pick(&req("A", "p1", 0)).await.unwrap();
        // Auto-pick for B lands first.
        let mut auto = req("B", "p2", 1);
        auto.origin = PickOrigin::Auto;
        svc.commit_pick(&auto).await.unwrap();

        for _ in 0..3 {
            let err = svc.commit_pick(&req("B", "p3", 1)).await.unwrap_err();
            assert!(matches!(err, CommitError::StaleTurn { expected: 1, current: 2 }));
        }
        assert_eq!(store.load_room("room").await.unwrap().picks.len(), 2);
    }

    #[tokio::test]
    async fn precondition_failures_do_not_mutate() {
        let (store, _clock, svc) = make_service(active_room(&["A", "B"], 2)).await;
        let before = store.load_room("room").await.unwrap();

        let err = svc.commit_pick(&req("B", "p1", 0)).await.unwrap_err();
        assert_eq!(err.code(), "NOT_PARTICIPANTS_TURN");
        let err = svc.commit_pick(&req("Z", "p1", 0)).await.unwrap_err();
        assert_eq!(err.code(), "UNKNOWN_PARTICIPANT");
        let err = svc.commit_pick(&req("A", "nobody", 0)).await.unwrap_err();
        assert_eq!(err.code(), "UNKNOWN_PLAYER");

        assert_eq!(store.load_room("room").await.unwrap(), before);
    }

    #[tokio::test]
    async fn taken_player_is_rejected() {
        let (_store, _clock, svc) = make_service(active_room(&["A", "B"], 2)).await;
        svc.commit_pick(&req("A", "p1", 0)).await.unwrap();
        let err = svc.commit_pick(&req("B", "p1", 1)).await.unwrap_err();
        assert_eq!(err.code(), "PLAYER_ALREADY_ROSTERED_ELSEWHERE");
    }

    #[tokio::test]
    async fn paused_room_rejects_picks() {
        let mut room = active_room(&["A", "B"], 2);
        room.status = RoomStatus::Paused;
        let (_store, _clock, svc) = make_service(room).await;
        let err = svc.commit_pick(&req("A", "p1", 0)).await.unwrap_err();
        assert!(matches!(err, CommitError::RoomNotActive));
    }

    #[test]
    fn plan_commit_checks_status_before_stale_index() {
        let mut room = active_room(&["A"], 1);
        room.status = RoomStatus::Complete;
        room.current_pick_index = 1;
        let snap = RoomSnapshot {
            room,
            picks: vec![],
            version: 3,
        };
        let err = plan_commit(
            &snap,
            &req("A", "p1", 0),
            &make_pool(),
            &RosterRules::default(),
            t0(),
            chrono::Duration::zero(),
        )
        .unwrap_err();
        assert!(matches!(err, CommitError::RoomNotActive));
    }

    // =======================================================================
    // Turn deadline
    // =======================================================================

    #[tokio::test]
    async fn manual_pick_past_deadline_and_grace_is_refused() {
        let (store, clock, svc) = make_service(active_room(&["A", "B"], 2)).await;
        let before = store.load_room("room").await.unwrap();

        // Deadline t0+30s, grace 1.5s.
        clock.advance(chrono::Duration::hours(2));
        let err = svc.commit_pick(&req("A", "p1", 0)).await.unwrap_err();
        assert!(matches!(err, CommitError::TurnExpired { pick_index: 0 }));
        assert_eq!(err.code(), "TURN_EXPIRED");
        assert_eq!(err.class(), ErrorClass::Superseded);
        assert_eq!(store.load_room("room").await.unwrap(), before);

        // The expired slot is still open to the auto-pick.
        let mut auto = req("A", "p1", 0);
        auto.origin = PickOrigin::Auto;
        let pick = svc.commit_pick(&auto).await.unwrap();
        assert_eq!(pick.origin, PickOrigin::Auto);
    }

    #[tokio::test]
    async fn manual_pick_inside_grace_still_counts() {
        let (_store, clock, svc) = make_service(active_room(&["A", "B"], 2)).await;
        clock.advance(chrono::Duration::milliseconds(31_499));
        assert!(svc.commit_pick(&req("A", "p1", 0)).await.is_ok());

        // B's fresh deadline is 30s after A's commit.
        clock.advance(chrono::Duration::milliseconds(31_500));
        let err = svc.commit_pick(&req("B", "p2", 1)).await.unwrap_err();
        assert_eq!(err.code(), "TURN_EXPIRED");
    }

    #[tokio::test]
    async fn late_replay_of_a_filled_turn_is_stale_not_expired() {
        let (_store, clock, svc) = make_service(active_room(&["A", "B"], 2)).await;
        svc.commit_pick(&req("A", "p1", 0)).await.unwrap();
        clock.advance(chrono::Duration::minutes(10));
        let err = svc.commit_pick(&req("A", "p1", 0)).await.unwrap_err();
        assert_eq!(err.code(), "STALE_TURN");
    }

    // =======================================================================
    // Roster rules at commit time
    // =======================================================================

    #[tokio::test]
    async fn second_quarterback_over_ceiling_is_refused_without_writing() {
        let rules = limits(&[(Position::Quarterback, 0, 1)]);
        let (store, _clock, svc) = make_service_with(active_room(&["A", "B"], 4), rules).await;
        svc.commit_pick(&req("A", "p5", 0)).await.unwrap();
        svc.commit_pick(&req("B", "p1", 1)).await.unwrap();
        svc.commit_pick(&req("B", "p2", 2)).await.unwrap();
        let before = store.load_room("room").await.unwrap();

        let err = svc.commit_pick(&req("A", "p9", 3)).await.unwrap_err();
        assert!(matches!(
            err,
            CommitError::PositionCeilingExceeded { position: Position::Quarterback, max: 1 }
        ));
        assert_eq!(err.code(), "POSITION_CEILING_EXCEEDED");
        assert_eq!(err.class(), ErrorClass::Rejected);
        assert_eq!(store.load_room("room").await.unwrap(), before);

        // A different position still goes through on the same turn.
        let pick = svc.commit_pick(&req("A", "p3", 3)).await.unwrap();
        assert_eq!(pick.pick_index, 3);
    }

    #[tokio::test]
    async fn pick_that_strands_a_minimum_is_refused() {
        let rules = limits(&[(Position::TightEnd, 2, 2)]);
        let (store, _clock, svc) = make_service_with(active_room(&["A", "B"], 2), rules).await;

        let err = svc.commit_pick(&req("A", "p1", 0)).await.unwrap_err();
        assert_eq!(err.code(), "ROSTER_MINIMUM_UNREACHABLE");
        assert!(store.load_room("room").await.unwrap().picks.is_empty());

        svc.commit_pick(&req("A", "p6", 0)).await.unwrap();
    }

    /// Store wrapper whose reads yield before returning, so two concurrent
    /// commits both read the same version.
    struct InterleavingStore {
        inner: MemoryStore,
        always_conflict: bool,
    }

    #[async_trait]
    impl DraftStore for InterleavingStore {
        async fn create_room(&self, room: DraftRoom) -> Result<RoomSnapshot, StoreError> {
            self.inner.create_room(room).await
        }
        async fn load_room(&self, room_id: &str) -> Result<RoomSnapshot, StoreError> {
            let snap = self.inner.load_room(room_id).await;
            tokio::task::yield_now().await;
            snap
        }
        async fn commit_room(&self, write: RoomWrite) -> Result<RoomSnapshot, StoreError> {
            if self.always_conflict {
                return Err(StoreError::Conflict);
            }
            self.inner.commit_room(write).await
        }
        async fn list_rooms(&self) -> Result<Vec<String>, StoreError> {
            self.inner.list_rooms().await
        }
        async fn load_queue(&self, room_id: &str, pid: &str) -> Result<QueueEntry, StoreError> {
            self.inner.load_queue(room_id, pid).await
        }
        async fn save_queue(&self, room_id: &str, entry: &QueueEntry) -> Result<(), StoreError> {
            self.inner.save_queue(room_id, entry).await
        }
        async fn subscribe(&self, room_id: &str) -> Result<RoomSubscription, StoreError> {
            self.inner.subscribe(room_id).await
        }
    }

    async fn interleaving_service(always_conflict: bool) -> (Arc<InterleavingStore>, PickCommitService) {
        let store = Arc::new(InterleavingStore {
            inner: MemoryStore::new(),
            always_conflict,
        });
        store.create_room(active_room(&["A", "B"], 2)).await.unwrap();
        let svc = PickCommitService::new(
            store.clone(),
            Arc::new(make_pool()),
            Arc::new(ManualClock::new(t0())),
            Arc::new(RosterRules::default()),
        );
        (store, svc)
    }

    #[tokio::test]
    async fn concurrent_commits_for_one_slot_have_one_winner() {
        let (store, svc) = interleaving_service(false).await;
        let manual = req("A", "p1", 0);
        let mut auto = req("A", "p2", 0);
        auto.origin = PickOrigin::Auto;

        let (a, b) = tokio::join!(svc.commit_pick(&manual), svc.commit_pick(&auto));
        let outcomes = [a, b];
        let wins = outcomes.iter().filter(|r| r.is_ok()).count();
        assert_eq!(wins, 1);
        let loser = outcomes.iter().find_map(|r| r.as_ref().err()).unwrap();
        assert!(matches!(
            loser,
            CommitError::StaleTurn { .. } | CommitError::PlayerAlreadyRosteredElsewhere { .. }
        ));

        let snap = store.load_room("room").await.unwrap();
        assert_eq!(snap.picks.len(), 1);
        assert_eq!(snap.room.current_pick_index, 1);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_contention() {
        let (_store, svc) = interleaving_service(true).await;
        let svc = svc.with_max_attempts(3);
        let err = svc.commit_pick(&req("A", "p1", 0)).await.unwrap_err();
        assert!(matches!(err, CommitError::CommitContention { attempts: 3 }));
        assert_eq!(err.code(), "COMMIT_CONTENTION");
    }
}

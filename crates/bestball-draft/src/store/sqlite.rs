// SQLite persistence for draft rooms, picks, and queues.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use tracing::info;

use super::{DraftStore, RoomNotifier, RoomSubscription, RoomWrite, StoreError};
use crate::model::{DraftRoom, Pick, PickOrigin, QueueEntry, RoomSnapshot};
use crate::roster::Position;

/// SQLite-backed store. The room header is kept as one JSON document with a
/// version column; picks live in their own table so the primary key on
/// `(room_id, pick_index)` and the unique index on `(room_id, player_id)`
/// back up the optimistic version check.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    notifier: RoomNotifier,
}

fn backend(context: &'static str) -> impl FnOnce(rusqlite::Error) -> StoreError {
    move |e| StoreError::Backend(format!("{context}: {e}"))
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation
    )
}

impl SqliteStore {
    /// Open (or create) a database at `path`. Pass `":memory:"` for an
    /// ephemeral database.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)
            .map_err(|e| StoreError::Backend(format!("failed to open database at {path}: {e}")))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )
        .map_err(backend("failed to set database pragmas"))?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS rooms (
                room_id  TEXT PRIMARY KEY,
                document TEXT NOT NULL,
                version  INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS picks (
                room_id        TEXT NOT NULL REFERENCES rooms(room_id),
                pick_index     INTEGER NOT NULL,
                round          INTEGER NOT NULL,
                participant_id TEXT NOT NULL,
                player_id      TEXT NOT NULL,
                position       TEXT NOT NULL,
                committed_at   TEXT NOT NULL,
                origin         TEXT NOT NULL,
                PRIMARY KEY (room_id, pick_index),
                UNIQUE (room_id, player_id)
            );

            CREATE TABLE IF NOT EXISTS queues (
                room_id        TEXT NOT NULL,
                participant_id TEXT NOT NULL,
                player_ids     TEXT NOT NULL,
                PRIMARY KEY (room_id, participant_id)
            );
            ",
        )
        .map_err(backend("failed to create database schema"))?;

        info!("opened draft database at {}", path);

        Ok(Self {
            conn: Mutex::new(conn),
            notifier: RoomNotifier::new(),
        })
    }

    /// Acquire the database connection.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }
}

/// Read a room header, its picks, and its version in one go.
fn read_snapshot(conn: &Connection, room_id: &str) -> Result<RoomSnapshot, StoreError> {
    let row: Option<(String, i64)> = conn
        .query_row(
            "SELECT document, version FROM rooms WHERE room_id = ?1",
            params![room_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(backend("failed to load room"))?;

    let Some((document, version)) = row else {
        return Err(StoreError::RoomNotFound(room_id.to_string()));
    };

    let room: DraftRoom = serde_json::from_str(&document)
        .map_err(|e| StoreError::Backend(format!("corrupt room document {room_id}: {e}")))?;

    Ok(RoomSnapshot {
        room,
        picks: read_picks(conn, room_id)?,
        version: version as u64,
    })
}

fn read_picks(conn: &Connection, room_id: &str) -> Result<Vec<Pick>, StoreError> {
    let mut stmt = conn
        .prepare(
            "SELECT pick_index, round, participant_id, player_id, position, committed_at, origin
             FROM picks WHERE room_id = ?1 ORDER BY pick_index",
        )
        .map_err(backend("failed to prepare picks query"))?;

    let rows = stmt
        .query_map(params![room_id], |row| {
            Ok((
                row.get::<_, u32>(0)?,
                row.get::<_, u32>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
            ))
        })
        .map_err(backend("failed to query picks"))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(backend("failed to read pick row"))?;

    rows.into_iter()
        .map(
            |(pick_index, round, participant_id, player_id, position, committed_at, origin)| {
                let position = Position::from_str_pos(&position).ok_or_else(|| {
                    StoreError::Backend(format!("pick {pick_index}: bad position '{position}'"))
                })?;
                let origin = PickOrigin::from_str_origin(&origin).ok_or_else(|| {
                    StoreError::Backend(format!("pick {pick_index}: bad origin '{origin}'"))
                })?;
                let committed_at = DateTime::parse_from_rfc3339(&committed_at)
                    .map_err(|e| {
                        StoreError::Backend(format!("pick {pick_index}: bad timestamp: {e}"))
                    })?
                    .with_timezone(&Utc);
                Ok(Pick {
                    pick_index,
                    round,
                    participant_id,
                    player_id,
                    position,
                    committed_at,
                    origin,
                })
            },
        )
        .collect()
}

fn encode_room(room: &DraftRoom) -> Result<String, StoreError> {
    serde_json::to_string(room)
        .map_err(|e| StoreError::Backend(format!("failed to serialize room: {e}")))
}

#[async_trait]
impl DraftStore for SqliteStore {
    async fn create_room(&self, room: DraftRoom) -> Result<RoomSnapshot, StoreError> {
        let conn = self.conn();
        let document = encode_room(&room)?;
        match conn.execute(
            "INSERT INTO rooms (room_id, document, version) VALUES (?1, ?2, 1)",
            params![room.room_id, document],
        ) {
            Ok(_) => {}
            Err(e) if is_constraint_violation(&e) => {
                return Err(StoreError::AlreadyExists(room.room_id));
            }
            Err(e) => return Err(backend("failed to insert room")(e)),
        }
        read_snapshot(&conn, &room.room_id)
    }

    async fn load_room(&self, room_id: &str) -> Result<RoomSnapshot, StoreError> {
        let conn = self.conn();
        read_snapshot(&conn, room_id)
    }

    async fn commit_room(&self, write: RoomWrite) -> Result<RoomSnapshot, StoreError> {
        let mut conn = self.conn();
        let room_id = write.room.room_id.clone();
        let document = encode_room(&write.room)?;

        let tx = conn
            .transaction()
            .map_err(backend("failed to begin transaction"))?;

        let updated = tx
            .execute(
                "UPDATE rooms SET document = ?1, version = version + 1
                 WHERE room_id = ?2 AND version = ?3",
                params![document, room_id, write.expected_version as i64],
            )
            .map_err(backend("failed to update room"))?;

        if updated == 0 {
            let exists: bool = tx
                .query_row(
                    "SELECT EXISTS(SELECT 1 FROM rooms WHERE room_id = ?1)",
                    params![room_id],
                    |row| row.get(0),
                )
                .map_err(backend("failed to check room"))?;
            return Err(if exists {
                StoreError::Conflict
            } else {
                StoreError::RoomNotFound(room_id)
            });
        }

        if let Some(pick) = &write.pick {
            let stored: u32 = tx
                .query_row(
                    "SELECT COUNT(*) FROM picks WHERE room_id = ?1",
                    params![room_id],
                    |row| row.get(0),
                )
                .map_err(backend("failed to count picks"))?;
            if pick.pick_index != stored {
                return Err(StoreError::Conflict);
            }

            let inserted = tx.execute(
                "INSERT INTO picks
                    (room_id, pick_index, round, participant_id, player_id, position, committed_at, origin)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    room_id,
                    pick.pick_index,
                    pick.round,
                    pick.participant_id,
                    pick.player_id,
                    pick.position.display_str(),
                    pick.committed_at.to_rfc3339(),
                    pick.origin.as_str(),
                ],
            );
            match inserted {
                Ok(_) => {}
                Err(e) if is_constraint_violation(&e) => return Err(StoreError::Conflict),
                Err(e) => return Err(backend("failed to insert pick")(e)),
            }
        }

        tx.commit().map_err(backend("failed to commit transaction"))?;

        // Publish under the connection lock so subscribers see versions in order.
        let snapshot = read_snapshot(&conn, &room_id)?;
        self.notifier.publish(&snapshot);
        Ok(snapshot)
    }

    async fn list_rooms(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT room_id FROM rooms ORDER BY room_id")
            .map_err(backend("failed to prepare list_rooms query"))?;
        let ids = stmt
            .query_map([], |row| row.get(0))
            .map_err(backend("failed to list rooms"))?
            .collect::<Result<Vec<String>, _>>()
            .map_err(backend("failed to read room row"))?;
        Ok(ids)
    }

    async fn load_queue(
        &self,
        room_id: &str,
        participant_id: &str,
    ) -> Result<QueueEntry, StoreError> {
        let conn = self.conn();
        let raw: Option<String> = conn
            .query_row(
                "SELECT player_ids FROM queues WHERE room_id = ?1 AND participant_id = ?2",
                params![room_id, participant_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(backend("failed to load queue"))?;

        let player_ids = match raw {
            Some(json) => serde_json::from_str(&json)
                .map_err(|e| StoreError::Backend(format!("corrupt queue: {e}")))?,
            None => Vec::new(),
        };
        Ok(QueueEntry {
            participant_id: participant_id.to_string(),
            player_ids,
        })
    }

    async fn save_queue(&self, room_id: &str, entry: &QueueEntry) -> Result<(), StoreError> {
        let conn = self.conn();
        let json = serde_json::to_string(&entry.player_ids)
            .map_err(|e| StoreError::Backend(format!("failed to serialize queue: {e}")))?;
        conn.execute(
            "INSERT OR REPLACE INTO queues (room_id, participant_id, player_ids)
             VALUES (?1, ?2, ?3)",
            params![room_id, entry.participant_id, json],
        )
        .map_err(backend("failed to save queue"))?;
        Ok(())
    }

    async fn subscribe(&self, room_id: &str) -> Result<RoomSubscription, StoreError> {
        let conn = self.conn();
        let current = read_snapshot(&conn, room_id)?;
        Ok(self.notifier.subscribe(current))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RoomStatus;
    use chrono::TimeZone;

    fn open() -> SqliteStore {
        SqliteStore::open(":memory:").unwrap()
    }

    fn room() -> DraftRoom {
        DraftRoom::new(
            "r1",
            vec!["a".into(), "b".into()],
            2,
            30,
            Utc.with_ymd_and_hms(2026, 9, 1, 18, 0, 0).unwrap(),
        )
    }

    fn pick(idx: u32, player: &str) -> Pick {
        Pick {
            pick_index: idx,
            round: 1,
            participant_id: "a".into(),
            player_id: player.into(),
            position: Position::TightEnd,
            committed_at: Utc.with_ymd_and_hms(2026, 9, 1, 18, 0, 12).unwrap(),
            origin: PickOrigin::Auto,
        }
    }

    #[tokio::test]
    async fn create_and_reload_room_document() {
        let store = open();
        let created = store.create_room(room()).await.unwrap();
        assert_eq!(created.version, 1);
        assert_eq!(created.room, room());

        let err = store.create_room(room()).await.unwrap_err();
        assert_eq!(err, StoreError::AlreadyExists("r1".into()));
        assert_eq!(store.list_rooms().await.unwrap(), vec!["r1".to_string()]);
    }

    #[tokio::test]
    async fn commit_appends_pick_and_bumps_version() {
        let store = open();
        let snap = store.create_room(room()).await.unwrap();
        let mut next_room = snap.room.clone();
        next_room.status = RoomStatus::Active;
        next_room.current_pick_index = 1;

        let next = store
            .commit_room(RoomWrite {
                room: next_room.clone(),
                expected_version: 1,
                pick: Some(pick(0, "kelce")),
            })
            .await
            .unwrap();

        assert_eq!(next.version, 2);
        assert_eq!(next.room, next_room);
        assert_eq!(next.picks, vec![pick(0, "kelce")]);
        assert_eq!(store.load_room("r1").await.unwrap(), next);
    }

    #[tokio::test]
    async fn stale_version_is_a_conflict() {
        let store = open();
        let snap = store.create_room(room()).await.unwrap();
        let write = RoomWrite {
            room: snap.room.clone(),
            expected_version: 1,
            pick: None,
        };
        store.commit_room(write.clone()).await.unwrap();
        assert_eq!(store.commit_room(write).await.unwrap_err(), StoreError::Conflict);
    }

    #[tokio::test]
    async fn duplicate_player_rolls_back_header_update() {
        let store = open();
        let snap = store.create_room(room()).await.unwrap();
        let snap = store
            .commit_room(RoomWrite {
                room: snap.room.clone(),
                expected_version: 1,
                pick: Some(pick(0, "kelce")),
            })
            .await
            .unwrap();

        let err = store
            .commit_room(RoomWrite {
                room: snap.room.clone(),
                expected_version: snap.version,
                pick: Some(pick(1, "kelce")),
            })
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::Conflict);

        // Version unchanged: the transaction was dropped.
        assert_eq!(store.load_room("r1").await.unwrap().version, snap.version);
    }

    #[tokio::test]
    async fn missing_room_reports_not_found() {
        let store = open();
        let err = store
            .commit_room(RoomWrite {
                room: room(),
                expected_version: 1,
                pick: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::RoomNotFound("r1".into()));
        assert!(matches!(
            store.load_room("r1").await,
            Err(StoreError::RoomNotFound(_))
        ));
    }

    #[tokio::test]
    async fn queue_roundtrip() {
        let store = open();
        assert!(store.load_queue("r1", "a").await.unwrap().player_ids.is_empty());
        let entry = QueueEntry {
            participant_id: "a".into(),
            player_ids: vec!["x".into(), "y".into()],
        };
        store.save_queue("r1", &entry).await.unwrap();
        store.save_queue("r1", &entry).await.unwrap();
        assert_eq!(store.load_queue("r1", "a").await.unwrap(), entry);
    }

    #[tokio::test]
    async fn subscription_receives_committed_snapshot() {
        let store = open();
        let snap = store.create_room(room()).await.unwrap();
        let mut sub = store.subscribe("r1").await.unwrap();
        store
            .commit_room(RoomWrite {
                room: snap.room,
                expected_version: 1,
                pick: Some(pick(0, "kelce")),
            })
            .await
            .unwrap();
        sub.changed().await.unwrap();
        assert_eq!(sub.borrow().version, 2);
    }

    #[tokio::test]
    async fn data_survives_reopen() {
        let path = std::env::temp_dir().join("bestball_sqlite_store_reopen.db");
        let _ = std::fs::remove_file(&path);
        let path_str = path.to_str().unwrap().to_string();
        {
            let store = SqliteStore::open(&path_str).unwrap();
            let snap = store.create_room(room()).await.unwrap();
            store
                .commit_room(RoomWrite {
                    room: snap.room,
                    expected_version: 1,
                    pick: Some(pick(0, "kelce")),
                })
                .await
                .unwrap();
        }
        let store = SqliteStore::open(&path_str).unwrap();
        let snap = store.load_room("r1").await.unwrap();
        assert_eq!(snap.version, 2);
        assert_eq!(snap.picks[0].player_id, "kelce");
        let _ = std::fs::remove_file(&path);
    }
}

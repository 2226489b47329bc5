// Read-only player pool and external rankings.
//
// Rankings come from a CSV export (rank, player id, name, position, team,
// bye week). The pool never changes during a draft; availability is derived
// per room from committed picks.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::roster::Position;

/// A draftable player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerPoolEntry {
    pub player_id: String,
    pub name: String,
    pub position: Position,
    pub team: String,
    pub bye_week: Option<u8>,
    /// Overall rank from the external ranking, 1 = best. `None` when the
    /// player is in the pool but unranked.
    pub rank: Option<u32>,
}

/// Lookup interface onto the external player pool.
pub trait PlayerPool: Send + Sync {
    fn get_player(&self, player_id: &str) -> Option<&PlayerPoolEntry>;

    /// Every player in default-pick order: ranked players by rank, then
    /// unranked players by player id. This order is total and deterministic,
    /// so it doubles as the cold-start fallback.
    fn ranked(&self) -> &[PlayerPoolEntry];

    fn len(&self) -> usize {
        self.ranked().len()
    }

    fn is_empty(&self) -> bool {
        self.ranked().is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("failed to read file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv { path: String, source: csv::Error },

    #[error("player pool is empty")]
    Empty,
}

/// In-memory pool built from a list of entries or a rankings CSV.
#[derive(Debug, Clone, Default)]
pub struct StaticPlayerPool {
    players: Vec<PlayerPoolEntry>,
    index: HashMap<String, usize>,
}

impl StaticPlayerPool {
    /// Build a pool, sorting into default-pick order. Duplicate player ids
    /// keep the first entry.
    pub fn from_entries(entries: Vec<PlayerPoolEntry>) -> Self {
        let mut seen = std::collections::HashSet::new();
        let mut players: Vec<PlayerPoolEntry> = entries
            .into_iter()
            .filter(|p| {
                let fresh = seen.insert(p.player_id.clone());
                if !fresh {
                    warn!("duplicate player id '{}' in pool, keeping first", p.player_id);
                }
                fresh
            })
            .collect();

        players.sort_by(|a, b| match (a.rank, b.rank) {
            (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.player_id.cmp(&b.player_id)),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.player_id.cmp(&b.player_id),
        });

        let index = players
            .iter()
            .enumerate()
            .map(|(i, p)| (p.player_id.clone(), i))
            .collect();

        StaticPlayerPool { players, index }
    }

    /// Load a rankings CSV from disk.
    pub fn load_csv(path: &Path) -> Result<Self, PoolError> {
        let file = std::fs::File::open(path).map_err(|e| PoolError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        let entries = load_rankings_from_reader(file).map_err(|e| PoolError::Csv {
            path: path.display().to_string(),
            source: e,
        })?;
        if entries.is_empty() {
            return Err(PoolError::Empty);
        }
        Ok(Self::from_entries(entries))
    }
}

impl PlayerPool for StaticPlayerPool {
    fn get_player(&self, player_id: &str) -> Option<&PlayerPoolEntry> {
        self.index.get(player_id).map(|&i| &self.players[i])
    }

    fn ranked(&self) -> &[PlayerPoolEntry] {
        &self.players
    }
}

// ---------------------------------------------------------------------------
// CSV parsing
// ---------------------------------------------------------------------------

/// One rankings row. Extra columns are ignored.
#[derive(Debug, Deserialize)]
struct RawRanking {
    #[serde(default)]
    rank: Option<u32>,
    player_id: String,
    name: String,
    position: String,
    #[serde(default)]
    team: String,
    #[serde(default)]
    bye_week: Option<u8>,
}

fn load_rankings_from_reader<R: Read>(rdr: R) -> Result<Vec<PlayerPoolEntry>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(rdr);
    let mut players = Vec::new();
    for result in reader.deserialize::<RawRanking>() {
        match result {
            Ok(raw) => {
                let Some(position) = Position::from_str_pos(&raw.position) else {
                    warn!(
                        "skipping player '{}': unknown position '{}'",
                        raw.name, raw.position
                    );
                    continue;
                };
                if raw.player_id.is_empty() {
                    warn!("skipping player '{}': empty player id", raw.name);
                    continue;
                }
                players.push(PlayerPoolEntry {
                    player_id: raw.player_id,
                    name: raw.name,
                    position,
                    team: raw.team,
                    bye_week: raw.bye_week,
                    rank: raw.rank,
                });
            }
            Err(e) => {
                warn!("skipping malformed ranking row: {}", e);
            }
        }
    }
    Ok(players)
}

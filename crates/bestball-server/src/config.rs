// Configuration loading and parsing (draft.toml).

use bestball_draft::engine::EngineSettings;
use bestball_draft::roster::{PositionLimit, RosterRules};
use bestball_draft::timer::TimerSettings;
use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub ws_port: u16,
    /// Resolved SQLite path, or ":memory:".
    pub db_path: String,
    pub draft: DraftConfig,
    pub rules: RosterRules,
    /// Rankings CSV, resolved against the project root.
    pub rankings_path: PathBuf,
    /// Bearer token -> participant id.
    pub tokens: HashMap<String, String>,
    pub rooms: Vec<RoomConfig>,
}

impl Config {
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            commit_attempts: self.draft.commit_retries,
            timer: self.draft.timer_settings(),
        }
    }
}

// ---------------------------------------------------------------------------
// draft.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
struct DraftFile {
    #[serde(default)]
    server: ServerConfig,
    #[serde(default)]
    draft: DraftConfig,
    roster: RosterConfig,
    pool: PoolConfig,
    #[serde(default)]
    identity: IdentityConfig,
    #[serde(default)]
    rooms: Vec<RoomConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_database")]
    pub database: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            port: default_port(),
            database: default_database(),
        }
    }
}

fn default_port() -> u16 {
    9010
}

fn default_database() -> String {
    "bestball.db".into()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DraftConfig {
    pub grace_period_ms: u64,
    pub commit_retries: u32,
    pub ping_interval_secs: u64,
    pub warning_threshold_secs: u64,
    pub backoff_initial_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for DraftConfig {
    fn default() -> Self {
        DraftConfig {
            grace_period_ms: 1500,
            commit_retries: 5,
            ping_interval_secs: 10,
            warning_threshold_secs: 10,
            backoff_initial_ms: 250,
            backoff_max_ms: 10_000,
        }
    }
}

impl DraftConfig {
    pub fn timer_settings(&self) -> TimerSettings {
        TimerSettings {
            grace: Duration::from_millis(self.grace_period_ms),
            backoff_initial: Duration::from_millis(self.backoff_initial_ms),
            backoff_max: Duration::from_millis(self.backoff_max_ms),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RosterConfig {
    limits: HashMap<String, PositionLimit>,
}

#[derive(Debug, Clone, Deserialize)]
struct PoolConfig {
    rankings: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct IdentityConfig {
    #[serde(default)]
    tokens: HashMap<String, String>,
}

/// A room seeded at startup when the store does not have it yet.
#[derive(Debug, Clone, Deserialize)]
pub struct RoomConfig {
    pub id: String,
    pub participants: Vec<String>,
    pub rounds: u32,
    pub pick_time_secs: u32,
    pub starts_at: DateTime<Utc>,
    /// Participants with autodraft on from the start.
    #[serde(default)]
    pub autodraft: Vec<String>,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load `config/draft.toml` relative to the given `base_dir`.
///
/// This is the lower-level loading primitive that does not auto-copy defaults.
/// Prefer `load_config()` which handles default initialization automatically.
pub(crate) fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let draft_path = base_dir.join("config").join("draft.toml");
    let text = read_file(&draft_path)?;
    let file: DraftFile = toml::from_str(&text).map_err(|e| ConfigError::ParseError {
        path: draft_path.clone(),
        source: e,
    })?;

    let rules = RosterRules::from_config(&file.roster.limits).map_err(|key| {
        ConfigError::ValidationError {
            field: format!("roster.limits.{key}"),
            message: "unknown position (expected QB, RB, WR or TE)".into(),
        }
    })?;

    let rankings = PathBuf::from(&file.pool.rankings);
    let rankings_path = if rankings.is_absolute() {
        rankings
    } else {
        base_dir.join(rankings)
    };

    let config = Config {
        ws_port: file.server.port,
        db_path: resolve_db_path(&file.server.database)?,
        draft: file.draft,
        rules,
        rankings_path,
        tokens: file.identity.tokens,
        rooms: file.rooms,
    };

    validate(&config)?;

    Ok(config)
}

/// Ensure all config files exist by copying missing ones from `defaults/`.
/// Returns the list of files that were copied. Skips `.example` files.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.exists() {
        if !config_dir.exists() {
            return Err(ConfigError::DefaultsCopyError {
                message: format!(
                    "neither defaults/ nor config/ directory found in {}; \
                     run from the project root or ensure defaults/ is present",
                    base_dir.display()
                ),
            });
        }
        return Ok(vec![]);
    }

    std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to create config directory: {e}"),
    })?;

    let mut copied = Vec::new();

    let entries = std::fs::read_dir(&defaults_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to read defaults directory: {e}"),
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| ConfigError::DefaultsCopyError {
            message: format!("failed to read defaults entry: {e}"),
        })?;
        let path = entry.path();

        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name() else {
            continue;
        };
        if file_name.to_str().is_some_and(|n| n.ends_with(".example")) {
            continue;
        }
        let target = config_dir.join(file_name);

        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
        {
            Ok(mut dest) => {
                let content = std::fs::read(&path).map_err(|e| ConfigError::DefaultsCopyError {
                    message: format!("failed to read {}: {e}", path.display()),
                })?;
                std::io::Write::write_all(&mut dest, &content).map_err(|e| {
                    ConfigError::DefaultsCopyError {
                        message: format!("failed to write {}: {e}", target.display()),
                    }
                })?;
                copied.push(target);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => {
                return Err(ConfigError::DefaultsCopyError {
                    message: format!("failed to create {}: {e}", target.display()),
                });
            }
        }
    }

    Ok(copied)
}

/// Convenience wrapper: loads config relative to the current working directory.
/// Ensures default config files are copied before loading.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_files(&cwd)?;
    load_config_from(&cwd)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

/// An empty database setting means "bestball.db in the platform data dir".
fn resolve_db_path(database: &str) -> Result<String, ConfigError> {
    if !database.trim().is_empty() {
        return Ok(database.to_string());
    }
    let dirs = ProjectDirs::from("", "", "bestball").ok_or_else(|| ConfigError::ValidationError {
        field: "server.database".into(),
        message: "empty and no platform data directory could be determined".into(),
    })?;
    Ok(dirs.data_dir().join("bestball.db").display().to_string())
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn invalid(field: impl Into<String>, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.into(),
        message: message.into(),
    }
}

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.ws_port == 0 {
        return Err(invalid("server.port", "must be greater than 0"));
    }

    let draft = &config.draft;
    if draft.grace_period_ms > 5000 {
        return Err(invalid(
            "draft.grace_period_ms",
            format!("must be between 0 and 5000, got {}", draft.grace_period_ms),
        ));
    }
    if draft.commit_retries == 0 {
        return Err(invalid("draft.commit_retries", "must be at least 1"));
    }
    if draft.ping_interval_secs == 0 {
        return Err(invalid("draft.ping_interval_secs", "must be greater than 0"));
    }
    if draft.backoff_initial_ms == 0 {
        return Err(invalid("draft.backoff_initial_ms", "must be greater than 0"));
    }
    if draft.backoff_max_ms < draft.backoff_initial_ms {
        return Err(invalid(
            "draft.backoff_max_ms",
            format!(
                "must be >= backoff_initial_ms ({}), got {}",
                draft.backoff_initial_ms, draft.backoff_max_ms
            ),
        ));
    }

    for (pos, limit) in &config.rules.limits {
        if limit.min > limit.max {
            return Err(invalid(
                format!("roster.limits.{pos}"),
                format!("min {} exceeds max {}", limit.min, limit.max),
            ));
        }
    }

    let total_minimum = config.rules.total_minimum();
    let mut seen_rooms = HashSet::new();
    for (i, room) in config.rooms.iter().enumerate() {
        let field = |name: &str| format!("rooms[{i}].{name}");

        if room.id.trim().is_empty() {
            return Err(invalid(field("id"), "must not be empty"));
        }
        if !seen_rooms.insert(room.id.as_str()) {
            return Err(invalid(field("id"), format!("duplicate room id {}", room.id)));
        }
        if room.participants.is_empty() {
            return Err(invalid(field("participants"), "must not be empty"));
        }
        let mut seen = HashSet::new();
        for p in &room.participants {
            if !seen.insert(p.as_str()) {
                return Err(invalid(field("participants"), format!("duplicate participant {p}")));
            }
        }
        if room.rounds == 0 {
            return Err(invalid(field("rounds"), "must be greater than 0"));
        }
        if room.rounds < total_minimum {
            return Err(invalid(
                field("rounds"),
                format!("{} rounds cannot fill the roster minimum of {total_minimum}", room.rounds),
            ));
        }
        if room.pick_time_secs == 0 {
            return Err(invalid(field("pick_time_secs"), "must be greater than 0"));
        }
        if let Some(p) = room.autodraft.iter().find(|p| !seen.contains(p.as_str())) {
            return Err(invalid(field("autodraft"), format!("{p} is not a participant")));
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

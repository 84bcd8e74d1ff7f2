//! Configuration loading from environment variables.

use crate::constants::{
    DEFAULT_CLEANUP_INTERVAL_SECS, DEFAULT_MAX_FILES, DEFAULT_MAX_FILE_SIZE, DEFAULT_PORT,
    DEFAULT_RATING_MAX_ATTEMPTS,
};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;

/// How the rating engine keeps a note and its rater consistent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RatingConsistency {
    /// One write transaction per attempt, retried on transient conflicts.
    #[default]
    Transactional,
    /// Separate user and note writes with a compensating rollback.
    Compensating,
}

impl RatingConsistency {
    /// Parse a `RATING_CONSISTENCY` value.
    ///
    /// # Returns
    /// `Some(mode)` for `transactional` / `compensating` (case-insensitive).
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "transactional" | "txn" => Some(Self::Transactional),
            "compensating" | "optimistic" => Some(Self::Compensating),
            _ => None,
        }
    }
}

/// Runtime configuration for Noteabl.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub db_path: String,
    pub blob_dir: String,
    pub port: u16,
    pub max_file_size: usize,
    pub max_files: usize,
    pub rating_consistency: RatingConsistency,
    pub rating_max_attempts: u32,
    pub cleanup_interval_secs: u64,
    /// Emit raw verification and reset tokens at `debug`. Local development only.
    pub log_account_tokens: bool,
}

/// Expand tilde (~) in paths to the user's home directory
fn expand_tilde(path: String) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = resolve_home_dir() {
            return home.join(rest).to_string_lossy().to_string();
        }
    }
    path
}

fn resolve_home_dir() -> Option<PathBuf> {
    if let Ok(home) = env::var("HOME") {
        if !home.trim().is_empty() {
            return Some(PathBuf::from(home));
        }
    }

    if let Ok(profile) = env::var("USERPROFILE") {
        if !profile.trim().is_empty() {
            return Some(PathBuf::from(profile));
        }
    }

    std::env::current_dir().ok()
}

fn default_blob_dir(db_path: &str) -> String {
    let db_path = PathBuf::from(db_path);
    db_path
        .parent()
        .map(|parent| parent.join("blobs"))
        .unwrap_or_else(|| PathBuf::from("blobs"))
        .to_string_lossy()
        .to_string()
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|value| value.trim().parse().ok())
}

/// Parse a boolean-like environment flag value.
///
/// # Supported Values
/// - Truthy: `1`, `true`, `yes`, `on`
/// - Falsy: `0`, `false`, `no`, `off`, empty string
///
/// Matching is case-insensitive and ignores surrounding whitespace.
///
/// # Returns
/// `Some(bool)` when the value is recognized, otherwise `None`.
pub fn parse_env_flag(value: &str) -> Option<bool> {
    let normalized = value.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "" | "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Read a boolean flag from the environment.
///
/// Missing or unrecognized values are treated as `false`.
pub fn env_flag_enabled(name: &str) -> bool {
    env::var(name)
        .ok()
        .and_then(|value| parse_env_flag(&value))
        .unwrap_or(false)
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Returns
    /// A populated [`Config`] with defaults applied when env vars are missing.
    pub fn from_env() -> Self {
        let db_path = env::var("DB_PATH").map(expand_tilde).unwrap_or_else(|_| {
            let home = resolve_home_dir().unwrap_or_else(|| PathBuf::from("."));
            let cache_dir = home.join(".cache").join("noteabl");
            cache_dir.join("db").to_string_lossy().to_string()
        });
        let blob_dir = env::var("BLOB_DIR")
            .map(expand_tilde)
            .unwrap_or_else(|_| default_blob_dir(&db_path));

        let rating_consistency = match env::var("RATING_CONSISTENCY") {
            Ok(value) => RatingConsistency::parse(&value).unwrap_or_else(|| {
                tracing::warn!(
                    "Unknown RATING_CONSISTENCY='{}'; using transactional ratings",
                    value
                );
                RatingConsistency::Transactional
            }),
            Err(_) => RatingConsistency::default(),
        };

        Self {
            db_path,
            blob_dir,
            port: parse_env("PORT").unwrap_or(DEFAULT_PORT),
            max_file_size: parse_env("MAX_FILE_SIZE").unwrap_or(DEFAULT_MAX_FILE_SIZE),
            max_files: parse_env("MAX_FILES")
                .filter(|count: &usize| *count > 0)
                .unwrap_or(DEFAULT_MAX_FILES),
            rating_consistency,
            rating_max_attempts: parse_env("RATING_MAX_ATTEMPTS")
                .filter(|attempts: &u32| *attempts > 0)
                .unwrap_or(DEFAULT_RATING_MAX_ATTEMPTS),
            cleanup_interval_secs: parse_env("CLEANUP_INTERVAL_SECS")
                .filter(|secs: &u64| *secs > 0)
                .unwrap_or(DEFAULT_CLEANUP_INTERVAL_SECS),
            log_account_tokens: env_flag_enabled("LOG_ACCOUNT_TOKENS"),
        }
    }

    /// Build a configuration rooted at `dir` with every other field defaulted.
    ///
    /// Used by tests and embedded setups that never consult the environment.
    pub fn for_data_dir(dir: &std::path::Path) -> Self {
        Self {
            db_path: dir.join("db").to_string_lossy().to_string(),
            blob_dir: dir.join("blobs").to_string_lossy().to_string(),
            port: 0,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_files: DEFAULT_MAX_FILES,
            rating_consistency: RatingConsistency::default(),
            rating_max_attempts: DEFAULT_RATING_MAX_ATTEMPTS,
            cleanup_interval_secs: DEFAULT_CLEANUP_INTERVAL_SECS,
            log_account_tokens: false,
        }
    }
}

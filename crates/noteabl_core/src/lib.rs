//! Core domain library for Noteabl (config, storage, search, ratings, uploads).

/// Account helpers: credential hashing, token minting, input validation.
pub mod accounts;
/// Object storage for note PDFs.
pub mod blob;
/// Configuration loading and defaults.
pub mod config;
/// Shared constants.
pub mod constants;
/// Database access layer and transactions.
pub mod db;
/// Process-global environment mutation helpers.
pub mod env;
/// Application error types (storage/domain).
pub mod error;
/// Paginated note listings and display records.
pub mod listing;
/// Data models for API requests and persistence.
pub mod models;
/// Like/dislike mutation engine.
pub mod rating;
/// Search request parsing into executable note queries.
pub mod search;
/// Batched upload and delete flows spanning both stores.
pub mod uploads;

#[cfg(test)]
pub(crate) mod test_support;

pub use blob::{BlobStore, FsBlobStore, MemoryBlobStore};
pub use config::{Config, RatingConsistency};
pub use constants::DEFAULT_PORT;
pub use db::Database;
pub use error::AppError;
pub use rating::RatingEngine;

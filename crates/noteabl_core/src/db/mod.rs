//! Database layer and transactional helpers for Noteabl.

#[cfg(test)]
pub(crate) mod failpoint;
/// Note storage helpers.
pub mod note;
/// Session storage helpers.
pub mod session;
/// redb table definitions.
pub mod tables;
/// Cross-document transactions for rating updates.
pub mod transactions;
/// User storage helpers.
pub mod user;

pub use transactions::{RatingApplied, TransactionOps};

use crate::error::AppError;
use crate::models::{note::Note, user::User};
use std::path::Path;
use std::sync::Arc;
use tables::*;

/// Database handle with accessors for every collection.
pub struct Database {
    pub db: Arc<redb::Database>,
    pub notes: note::NoteDb,
    pub users: user::UserDb,
    pub sessions: session::SessionDb,
}

#[cfg(test)]
mod tests;

impl Database {
    /// Open (or create) the database under `path` and initialize tables.
    ///
    /// `path` is a directory; the redb file lives at `<path>/data.redb`.
    ///
    /// # Returns
    /// A fully initialized [`Database`].
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created or redb cannot
    /// open the file (including when another process holds it).
    pub fn new(path: &str) -> Result<Self, AppError> {
        let dir = Path::new(path);
        std::fs::create_dir_all(dir).map_err(|err| {
            AppError::StorageMessage(format!(
                "Failed to create database directory '{}': {}",
                dir.display(),
                err
            ))
        })?;
        let file = dir.join(REDB_FILE_NAME);
        let db = redb::Database::create(&file).map_err(|err| match err {
            redb::DatabaseError::DatabaseAlreadyOpen => AppError::StorageMessage(format!(
                "Database '{}' is already open in another Noteabl process.\n\
                 Stop it first, or set DB_PATH to a different location.",
                file.display()
            )),
            other => other.into(),
        })?;
        Self::from_shared(Arc::new(db))
    }

    /// Build a database handle from an existing shared redb instance.
    ///
    /// # Errors
    /// Returns an error if table initialization fails.
    pub fn from_shared(db: Arc<redb::Database>) -> Result<Self, AppError> {
        let write_txn = db.begin_write()?;
        write_txn.open_table(NOTES)?;
        write_txn.open_table(NOTES_BY_CREATED)?;
        write_txn.open_table(NOTES_BY_LIKES)?;
        write_txn.open_table(NOTES_BY_TUPLE)?;
        write_txn.open_table(USERS)?;
        write_txn.open_table(USERS_BY_EMAIL)?;
        write_txn.open_table(VERIFICATION_TOKENS)?;
        write_txn.open_table(RESET_TOKENS)?;
        write_txn.open_table(SESSIONS)?;
        write_txn.commit()?;

        Ok(Self {
            notes: note::NoteDb::new(db.clone()),
            users: user::UserDb::new(db.clone()),
            sessions: session::SessionDb::new(db.clone()),
            db,
        })
    }

    /// Clone this handle for another worker in the same process.
    ///
    /// # Errors
    /// Returns an error if table initialization fails.
    pub fn share(&self) -> Result<Self, AppError> {
        Self::from_shared(self.db.clone())
    }
}

pub(crate) fn deserialize_note(bytes: &[u8]) -> Result<Note, AppError> {
    Ok(bincode::deserialize(bytes)?)
}

pub(crate) fn deserialize_user(bytes: &[u8]) -> Result<User, AppError> {
    Ok(bincode::deserialize(bytes)?)
}

pub(crate) fn load_note(
    notes: &impl redb::ReadableTable<&'static str, &'static [u8]>,
    note_id: &str,
) -> Result<Option<Note>, AppError> {
    match notes.get(note_id)? {
        Some(guard) => Ok(Some(deserialize_note(guard.value())?)),
        None => Ok(None),
    }
}

pub(crate) fn load_user(
    users: &impl redb::ReadableTable<&'static str, &'static [u8]>,
    user_id: &str,
) -> Result<Option<User>, AppError> {
    match users.get(user_id)? {
        Some(guard) => Ok(Some(deserialize_user(guard.value())?)),
        None => Ok(None),
    }
}

/// Creation index key component for a note.
pub(crate) fn created_key(note: &Note) -> i64 {
    note.created_at.timestamp_millis()
}

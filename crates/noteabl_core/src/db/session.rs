//! Session storage: bearer tokens are stored only as hashes.

use super::{load_user, tables::*};
use crate::accounts::{generate_token, hash_token};
use crate::constants::SESSION_EXPIRY_DAYS;
use crate::error::AppError;
use crate::models::user::{Session, User};
use chrono::{Duration, Utc};
use redb::{ReadableDatabase, ReadableTable};
use std::sync::Arc;

/// Accessor for the `sessions` table.
pub struct SessionDb {
    db: Arc<redb::Database>,
}

impl SessionDb {
    /// Bind an accessor to `db`; tables are created by [`super::Database::from_shared`].
    pub fn new(db: Arc<redb::Database>) -> Self {
        Self { db }
    }

    /// Open a session for `user_id`.
    ///
    /// # Returns
    /// The raw bearer token. Only its hash is persisted.
    ///
    /// # Errors
    /// Returns an error when serialization or storage fails.
    pub fn create(&self, user_id: &str) -> Result<String, AppError> {
        let token = generate_token();
        let now = Utc::now();
        let session = Session {
            user_id: user_id.to_string(),
            created_at: now,
            expires_at: now + Duration::days(SESSION_EXPIRY_DAYS),
        };
        let encoded = bincode::serialize(&session)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut sessions = write_txn.open_table(SESSIONS)?;
            sessions.insert(hash_token(&token).as_str(), encoded.as_slice())?;
        }
        write_txn.commit()?;
        Ok(token)
    }

    /// Resolve a bearer token to its live, verified user.
    ///
    /// # Returns
    /// `None` for unknown or expired tokens, deleted users and unverified accounts.
    ///
    /// # Errors
    /// Returns an error when storage access or deserialization fails.
    pub fn resolve(&self, token: &str) -> Result<Option<User>, AppError> {
        let read_txn = self.db.begin_read()?;
        let sessions = read_txn.open_table(SESSIONS)?;
        let users = read_txn.open_table(USERS)?;

        let Some(guard) = sessions.get(hash_token(token).as_str())? else {
            return Ok(None);
        };
        let session: Session = bincode::deserialize(guard.value())?;
        if session.expires_at <= Utc::now() {
            return Ok(None);
        }
        Ok(load_user(&users, &session.user_id)?.filter(|user| user.is_verified))
    }

    /// Revoke the session for `token`.
    ///
    /// # Returns
    /// `true` when a session was removed.
    ///
    /// # Errors
    /// Returns an error when storage access fails.
    pub fn revoke(&self, token: &str) -> Result<bool, AppError> {
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut sessions = write_txn.open_table(SESSIONS)?;
            let removed = sessions.remove(hash_token(token).as_str())?.is_some();
            removed
        };
        write_txn.commit()?;
        Ok(removed)
    }

    /// Drop every expired session.
    ///
    /// # Returns
    /// Number of sessions removed.
    ///
    /// # Errors
    /// Returns an error when storage access or deserialization fails.
    pub fn purge_expired(&self) -> Result<usize, AppError> {
        let now = Utc::now();
        let write_txn = self.db.begin_write()?;
        let purged = {
            let mut sessions = write_txn.open_table(SESSIONS)?;
            let mut expired = Vec::new();
            for item in sessions.iter()? {
                let (key, value) = item?;
                let session: Session = bincode::deserialize(value.value())?;
                if session.expires_at <= now {
                    expired.push(key.value().to_string());
                }
            }
            for key in &expired {
                let _ = sessions.remove(key.as_str())?;
            }
            expired.len()
        };
        write_txn.commit()?;
        Ok(purged)
    }
}

//! User storage operations backed by redb.

use super::{deserialize_user, load_user, tables::*};
use crate::error::AppError;
use crate::models::note::AuthorSummary;
use crate::models::user::User;
use chrono::{DateTime, Utc};
use redb::{ReadableDatabase, ReadableTable, ReadableTableMetadata};
use std::collections::HashMap;
use std::sync::Arc;

/// Accessor for user rows, the email index and one-time token tables.
pub struct UserDb {
    db: Arc<redb::Database>,
}

/// Reference lists dropped by [`UserDb::prune_references`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrunedReferences {
    pub recently_viewed: usize,
    pub liked: usize,
    pub disliked: usize,
}

impl PrunedReferences {
    pub fn total(&self) -> usize {
        self.recently_viewed + self.liked + self.disliked
    }
}

fn store_user(users: &mut redb::Table<&str, &[u8]>, user: &User) -> Result<(), AppError> {
    let encoded = bincode::serialize(user)?;
    users.insert(user.id.as_str(), encoded.as_slice())?;
    Ok(())
}

/// Remove every session owned by `user_id`.
pub(crate) fn revoke_sessions_for(
    sessions: &mut redb::Table<&str, &[u8]>,
    user_id: &str,
) -> Result<usize, AppError> {
    let mut owned = Vec::new();
    for item in sessions.iter()? {
        let (key, value) = item?;
        let session: crate::models::user::Session = bincode::deserialize(value.value())?;
        if session.user_id == user_id {
            owned.push(key.value().to_string());
        }
    }
    for key in &owned {
        let _ = sessions.remove(key.as_str())?;
    }
    Ok(owned.len())
}

fn is_expired(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    expires_at.map_or(true, |expires_at| expires_at <= now)
}

impl UserDb {
    /// Bind an accessor to `db`; tables are created by [`super::Database::from_shared`].
    pub fn new(db: Arc<redb::Database>) -> Self {
        Self { db }
    }

    /// Insert a user, its email index row and its pending verification token.
    ///
    /// # Errors
    /// Returns [`AppError::Conflict`] when the email is already registered,
    /// or a storage error.
    pub fn create(&self, user: &User) -> Result<(), AppError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut users = write_txn.open_table(USERS)?;
            let mut by_email = write_txn.open_table(USERS_BY_EMAIL)?;
            let mut verification = write_txn.open_table(VERIFICATION_TOKENS)?;

            if by_email.get(user.email.as_str())?.is_some() {
                return Err(AppError::Conflict(
                    "An account with this email already exists".to_string(),
                ));
            }

            store_user(&mut users, user)?;
            by_email.insert(user.email.as_str(), user.id.as_str())?;
            if let Some(token_hash) = &user.verification_token_hash {
                verification.insert(token_hash.as_str(), user.id.as_str())?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Fetch a user by id.
    ///
    /// # Errors
    /// Returns an error when storage access or deserialization fails.
    pub fn get(&self, id: &str) -> Result<Option<User>, AppError> {
        let read_txn = self.db.begin_read()?;
        let users = read_txn.open_table(USERS)?;
        load_user(&users, id)
    }

    /// Fetch a user by normalized email.
    ///
    /// # Errors
    /// Returns an error when storage access or deserialization fails.
    pub fn get_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let read_txn = self.db.begin_read()?;
        let by_email = read_txn.open_table(USERS_BY_EMAIL)?;
        let users = read_txn.open_table(USERS)?;
        let Some(user_id) = by_email.get(email)? else {
            return Ok(None);
        };
        load_user(&users, user_id.value())
    }

    /// Minimal `(id, name)` projections for a set of authors.
    ///
    /// Missing authors are absent from the map.
    ///
    /// # Errors
    /// Returns an error when storage access or deserialization fails.
    pub fn author_summaries<'a, I>(
        &self,
        ids: I,
    ) -> Result<HashMap<String, AuthorSummary>, AppError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let read_txn = self.db.begin_read()?;
        let users = read_txn.open_table(USERS)?;
        let mut summaries = HashMap::new();
        for id in ids {
            if summaries.contains_key(id) {
                continue;
            }
            if let Some(user) = load_user(&users, id)? {
                summaries.insert(
                    user.id.clone(),
                    AuthorSummary {
                        id: user.id,
                        name: user.name,
                    },
                );
            }
        }
        Ok(summaries)
    }

    /// Consume a verification token exactly once.
    ///
    /// The lookup, expiry check and state change share one write
    /// transaction, so a replayed token can never verify twice.
    ///
    /// # Returns
    /// The verified user.
    ///
    /// # Errors
    /// Returns [`AppError::NotFound`] for unknown or already consumed tokens
    /// and [`AppError::BadRequest`] for expired ones (which are discarded).
    pub fn consume_verification(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<User, AppError> {
        let write_txn = self.db.begin_write()?;
        let outcome = {
            let mut users = write_txn.open_table(USERS)?;
            let mut verification = write_txn.open_table(VERIFICATION_TOKENS)?;

            let Some(user_id) = verification
                .remove(token_hash)?
                .map(|guard| guard.value().to_string())
            else {
                return Err(AppError::NotFound);
            };
            let Some(mut user) = load_user(&users, &user_id)? else {
                return Err(AppError::NotFound);
            };

            if is_expired(user.verification_expires_at, now) {
                Err(AppError::BadRequest(
                    "Verification link has expired".to_string(),
                ))
            } else {
                user.is_verified = true;
                user.verification_token_hash = None;
                user.verification_expires_at = None;
                store_user(&mut users, &user)?;
                Ok(user)
            }
        };
        // Expired tokens are removed either way.
        write_txn.commit()?;
        outcome
    }

    /// Replace the user's pending reset token.
    ///
    /// # Errors
    /// Returns [`AppError::NotFound`] when the user is missing, or a storage error.
    pub fn set_reset_token(
        &self,
        user_id: &str,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut users = write_txn.open_table(USERS)?;
            let mut reset = write_txn.open_table(RESET_TOKENS)?;

            let Some(mut user) = load_user(&users, user_id)? else {
                return Err(AppError::NotFound);
            };
            if let Some(previous) = user.reset_token_hash.take() {
                let _ = reset.remove(previous.as_str())?;
            }
            user.reset_token_hash = Some(token_hash.to_string());
            user.reset_expires_at = Some(expires_at);
            store_user(&mut users, &user)?;
            reset.insert(token_hash, user_id)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Consume a reset token, store the new password hash and revoke every session.
    ///
    /// # Errors
    /// Returns [`AppError::BadRequest`] for unknown, replayed or expired
    /// tokens, or a storage error.
    pub fn consume_reset(
        &self,
        token_hash: &str,
        new_password_hash: String,
        now: DateTime<Utc>,
    ) -> Result<User, AppError> {
        let invalid = || AppError::BadRequest("Reset link is invalid or has expired".to_string());

        let write_txn = self.db.begin_write()?;
        let outcome = {
            let mut users = write_txn.open_table(USERS)?;
            let mut reset = write_txn.open_table(RESET_TOKENS)?;
            let mut sessions = write_txn.open_table(SESSIONS)?;

            let Some(user_id) = reset
                .remove(token_hash)?
                .map(|guard| guard.value().to_string())
            else {
                return Err(invalid());
            };
            let Some(mut user) = load_user(&users, &user_id)? else {
                return Err(invalid());
            };

            let expired = is_expired(user.reset_expires_at, now);
            user.reset_token_hash = None;
            user.reset_expires_at = None;
            if !expired {
                user.password_hash = new_password_hash;
                let revoked = revoke_sessions_for(&mut sessions, &user.id)?;
                tracing::debug!(
                    user_id = %user.id,
                    revoked,
                    "revoked sessions after password reset"
                );
            }
            store_user(&mut users, &user)?;

            if expired {
                Err(invalid())
            } else {
                Ok(user)
            }
        };
        write_txn.commit()?;
        outcome
    }

    /// Delete a user with its email index, tokens and sessions.
    ///
    /// Notes and other users' references are left alone; readers prune them.
    ///
    /// # Returns
    /// `true` when a user was deleted.
    ///
    /// # Errors
    /// Returns an error when storage access or deserialization fails.
    pub fn delete(&self, user_id: &str) -> Result<bool, AppError> {
        let write_txn = self.db.begin_write()?;
        let deleted = {
            let mut users = write_txn.open_table(USERS)?;
            let mut by_email = write_txn.open_table(USERS_BY_EMAIL)?;
            let mut verification = write_txn.open_table(VERIFICATION_TOKENS)?;
            let mut reset = write_txn.open_table(RESET_TOKENS)?;
            let mut sessions = write_txn.open_table(SESSIONS)?;

            let Some(user) = load_user(&users, user_id)? else {
                return Ok(false);
            };
            let _ = users.remove(user_id)?;
            let _ = by_email.remove(user.email.as_str())?;
            if let Some(token_hash) = &user.verification_token_hash {
                let _ = verification.remove(token_hash.as_str())?;
            }
            if let Some(token_hash) = &user.reset_token_hash {
                let _ = reset.remove(token_hash.as_str())?;
            }
            revoke_sessions_for(&mut sessions, user_id)?;
            true
        };
        write_txn.commit()?;
        Ok(deleted)
    }

    /// Record that `user_id` viewed `note_id`.
    ///
    /// # Errors
    /// Returns [`AppError::NotFound`] when the user is missing, or a storage error.
    pub fn record_view(&self, user_id: &str, note_id: &str, cap: usize) -> Result<(), AppError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut users = write_txn.open_table(USERS)?;
            let Some(mut user) = load_user(&users, user_id)? else {
                return Err(AppError::NotFound);
            };
            user.record_view(note_id, cap);
            store_user(&mut users, &user)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Drop references to deleted notes from all three reference lists.
    ///
    /// Runs in one write transaction so the existence checks and the
    /// rewrite see the same snapshot. The user row is only rewritten when
    /// something was pruned.
    ///
    /// # Returns
    /// The current user row and what was pruned, or `None` when the user is missing.
    ///
    /// # Errors
    /// Returns an error when storage access or serialization fails.
    pub fn prune_references(
        &self,
        user_id: &str,
    ) -> Result<Option<(User, PrunedReferences)>, AppError> {
        let write_txn = self.db.begin_write()?;
        let outcome = {
            let mut users = write_txn.open_table(USERS)?;
            let notes = write_txn.open_table(NOTES)?;

            let Some(mut user) = load_user(&users, user_id)? else {
                return Ok(None);
            };

            let retain_live = |list: &mut Vec<String>| -> Result<usize, AppError> {
                let before = list.len();
                let mut live = Vec::with_capacity(before);
                for id in list.drain(..) {
                    if notes.get(id.as_str())?.is_some() {
                        live.push(id);
                    }
                }
                *list = live;
                Ok(before - list.len())
            };

            let pruned = PrunedReferences {
                recently_viewed: retain_live(&mut user.recently_viewed_notes)?,
                liked: retain_live(&mut user.liked_notes)?,
                disliked: retain_live(&mut user.disliked_notes)?,
            };
            if pruned.total() > 0 {
                store_user(&mut users, &user)?;
                tracing::debug!(
                    user_id = %user.id,
                    pruned = pruned.total(),
                    "pruned stale note references"
                );
            }
            Some((user, pruned))
        };
        write_txn.commit()?;
        Ok(outcome)
    }

    /// Persist the user's like/dislike sets over the stored row.
    ///
    /// Used by the compensating rating flow, both for the forward write and
    /// for restoring the pre-rating sets.
    ///
    /// # Returns
    /// `Ok(false)` when the user no longer exists.
    ///
    /// # Errors
    /// Returns an error when storage access or serialization fails.
    pub fn save_rating_sets(&self, user: &User) -> Result<bool, AppError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut users = write_txn.open_table(USERS)?;
            let Some(mut stored) = load_user(&users, &user.id)? else {
                return Ok(false);
            };
            stored.liked_notes = user.liked_notes.clone();
            stored.disliked_notes = user.disliked_notes.clone();
            store_user(&mut users, &stored)?;
        }
        write_txn.commit()?;
        Ok(true)
    }

    /// Delete unverified accounts whose verification window has closed.
    ///
    /// # Returns
    /// Number of accounts removed.
    ///
    /// # Errors
    /// Returns an error when storage access or deserialization fails.
    pub fn delete_expired_unverified(&self, now: DateTime<Utc>) -> Result<usize, AppError> {
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut users = write_txn.open_table(USERS)?;
            let mut by_email = write_txn.open_table(USERS_BY_EMAIL)?;
            let mut verification = write_txn.open_table(VERIFICATION_TOKENS)?;

            let mut expired = Vec::new();
            for item in users.iter()? {
                let (_, value) = item?;
                let user = deserialize_user(value.value())?;
                if !user.is_verified && is_expired(user.verification_expires_at, now) {
                    expired.push(user);
                }
            }

            for user in &expired {
                let _ = users.remove(user.id.as_str())?;
                let _ = by_email.remove(user.email.as_str())?;
                if let Some(token_hash) = &user.verification_token_hash {
                    let _ = verification.remove(token_hash.as_str())?;
                }
            }
            expired.len()
        };
        write_txn.commit()?;
        Ok(removed)
    }

    /// Number of user rows.
    ///
    /// # Errors
    /// Returns an error when storage access fails.
    pub fn count(&self) -> Result<u64, AppError> {
        let read_txn = self.db.begin_read()?;
        let users = read_txn.open_table(USERS)?;
        Ok(users.len()?)
    }
}

//! Atomic cross-table transaction helpers for rating mutations.

use super::note::reindex_likes;
use super::tables::{NOTES, NOTES_BY_LIKES, USERS};
use super::{load_note, load_user, Database};
use crate::error::AppError;
use crate::models::note::Note;
use crate::models::user::User;
use crate::rating::{apply_transition, RatingRequest};

/// Atomic operations that update note and user rows together.
pub struct TransactionOps;

/// Rows as committed by one rating attempt.
#[derive(Debug, Clone)]
pub struct RatingApplied {
    pub note: Note,
    pub user: User,
    /// `false` when the request was a no-op for the current state.
    pub changed: bool,
}

impl TransactionOps {
    /// Run one rating read-modify-write attempt in a single write transaction.
    ///
    /// Both rows are read inside the transaction, so the transition always
    /// applies to committed state and the counters and the user's sets
    /// commit together or not at all.
    ///
    /// # Arguments
    /// - `db`: Open database handle.
    /// - `user_id`: Rating user.
    /// - `note_id`: Rated note.
    /// - `request`: Validated rating request.
    ///
    /// # Returns
    /// The committed rows.
    ///
    /// # Errors
    /// Returns [`AppError::NotFound`] when either row is missing; storage
    /// errors are returned as-is so the caller can classify them with
    /// [`AppError::is_retryable`].
    pub fn apply_rating(
        db: &Database,
        user_id: &str,
        note_id: &str,
        request: &RatingRequest,
    ) -> Result<RatingApplied, AppError> {
        #[cfg(test)]
        super::failpoint::on_transaction_attempt(note_id)?;

        let write_txn = db.db.begin_write()?;
        let applied = {
            let mut notes = write_txn.open_table(NOTES)?;
            let mut users = write_txn.open_table(USERS)?;
            let mut likes = write_txn.open_table(NOTES_BY_LIKES)?;

            let Some(mut note) = load_note(&notes, note_id)? else {
                return Err(AppError::NotFound);
            };
            let Some(mut user) = load_user(&users, user_id)? else {
                return Err(AppError::NotFound);
            };

            let old_likes = note.likes;
            let changed = apply_transition(&mut note, &mut user, request);
            if changed {
                let encoded_note = bincode::serialize(&note)?;
                let encoded_user = bincode::serialize(&user)?;
                notes.insert(note_id, encoded_note.as_slice())?;
                users.insert(user_id, encoded_user.as_slice())?;
                reindex_likes(&mut likes, old_likes, &note)?;
            }

            RatingApplied {
                note,
                user,
                changed,
            }
        };

        write_txn.commit()?;
        Ok(applied)
    }
}

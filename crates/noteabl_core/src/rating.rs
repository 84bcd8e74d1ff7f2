//! Like/dislike mutation engine.
//!
//! A note's counters and each user's like/dislike sets must agree: for every
//! note, `likes` equals the number of users whose `liked_notes` contains it
//! (likewise for dislikes). Two write disciplines keep that true:
//!
//! - [`RatingConsistency::Transactional`]: read both rows, apply the
//!   transition and write both rows inside one redb write transaction,
//!   retrying the whole read-modify-write on retryable failures.
//! - [`RatingConsistency::Compensating`]: write the user, then the note, and
//!   restore the user's sets if the note write fails. Concurrent writers
//!   can lose updates in this mode, and a failed restore leaves the two
//!   rows disagreeing until repaired.

use crate::config::{Config, RatingConsistency};
use crate::db::{Database, RatingApplied, TransactionOps};
use crate::error::AppError;
use crate::listing;
use crate::models::note::{Note, NoteDisplay};
use crate::models::user::{push_front_unique, remove_ref, RatingState, User};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const RETRY_BASE_DELAY_MS: u64 = 5;
const RETRY_MAX_DELAY_MS: u64 = 100;

/// Requested change on one rating axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RatingDelta {
    #[serde(rename = "+")]
    Add,
    #[serde(rename = "-")]
    Remove,
}

/// Body of `PATCH /notes/:id/rating`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingRequest {
    #[serde(default)]
    pub likes: Option<RatingDelta>,
    #[serde(default)]
    pub dislikes: Option<RatingDelta>,
}

/// Result of a rating request, shaped for an immediate UI refresh.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingOutcome {
    pub likes: u64,
    pub dislikes: u64,
    pub state: RatingState,
    pub liked_notes: Vec<String>,
    pub disliked_notes: Vec<String>,
    pub liked_preview: Vec<NoteDisplay>,
}

impl RatingRequest {
    /// Reject requests that carry no change or ask for both ratings at once.
    ///
    /// # Errors
    /// Returns [`AppError::BadRequest`] for an empty request or `+` on both axes.
    pub fn validate(&self) -> Result<(), AppError> {
        match (self.likes, self.dislikes) {
            (None, None) => Err(AppError::BadRequest(
                "Rating request must set likes or dislikes".to_string(),
            )),
            (Some(RatingDelta::Add), Some(RatingDelta::Add)) => Err(AppError::BadRequest(
                "A note cannot be liked and disliked at once".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

fn add_rating(list: &mut Vec<String>, counter: &mut u64, note_id: &str) -> bool {
    if list.first().is_some_and(|first| first == note_id) {
        return false;
    }
    let already_rated = remove_ref(list, note_id);
    push_front_unique(list, note_id);
    if !already_rated {
        *counter = counter.saturating_add(1);
    }
    true
}

/// Explicit `-`: applies only while rated and the counter is above zero.
fn remove_rating(list: &mut Vec<String>, counter: &mut u64, note_id: &str) -> bool {
    if *counter == 0 || !list.iter().any(|id| id == note_id) {
        return false;
    }
    remove_ref(list, note_id);
    *counter -= 1;
    true
}

/// Implicit clear of the opposite axis when a `+` lands, keeping the
/// two sets exclusive even if the counter has already drifted to zero.
fn clear_opposite(list: &mut Vec<String>, counter: &mut u64, note_id: &str) -> bool {
    if !remove_ref(list, note_id) {
        return false;
    }
    *counter = counter.saturating_sub(1);
    true
}

/// Apply `request` to in-memory copies of `note` and `user`.
///
/// Removals run before additions, and adding one rating clears the other,
/// so a user never holds both. Repeating a request is a no-op, and counters
/// never drop below zero.
///
/// # Returns
/// `true` when either row changed.
pub fn apply_transition(note: &mut Note, user: &mut User, request: &RatingRequest) -> bool {
    let note_id = note.id.clone();
    let mut changed = false;

    if request.likes == Some(RatingDelta::Remove) {
        changed |= remove_rating(&mut user.liked_notes, &mut note.likes, &note_id);
    }
    if request.dislikes == Some(RatingDelta::Remove) {
        changed |= remove_rating(&mut user.disliked_notes, &mut note.dislikes, &note_id);
    }

    if request.likes == Some(RatingDelta::Add) {
        changed |= clear_opposite(&mut user.disliked_notes, &mut note.dislikes, &note_id);
        changed |= add_rating(&mut user.liked_notes, &mut note.likes, &note_id);
    }
    if request.dislikes == Some(RatingDelta::Add) {
        changed |= clear_opposite(&mut user.liked_notes, &mut note.likes, &note_id);
        changed |= add_rating(&mut user.disliked_notes, &mut note.dislikes, &note_id);
    }

    changed
}

fn retry_delay(attempt: u32) -> Duration {
    let exponent = attempt.clamp(1, 6) - 1;
    let exponential = RETRY_BASE_DELAY_MS.saturating_mul(1u64 << exponent);
    let capped = exponential.min(RETRY_MAX_DELAY_MS);
    let jitter = rand::thread_rng().gen_range(0..=capped / 2);
    Duration::from_millis(capped / 2 + jitter)
}

/// Applies rating requests with the configured consistency discipline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatingEngine {
    pub mode: RatingConsistency,
    pub max_attempts: u32,
}

impl RatingEngine {
    pub fn new(mode: RatingConsistency, max_attempts: u32) -> Self {
        Self {
            mode,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.rating_consistency, config.rating_max_attempts)
    }

    /// Apply a rating request from `user_id` to `note_id`.
    ///
    /// Blocking: storage writes and retry backoff run on the calling thread.
    ///
    /// # Returns
    /// Updated counters, the caller's refreshed sets, and a liked-notes preview.
    ///
    /// # Errors
    /// - [`AppError::BadRequest`] for malformed requests.
    /// - [`AppError::NotFound`] when the note or user does not exist.
    /// - [`AppError::Unavailable`] when transactional retries are exhausted.
    /// - [`AppError::Internal`] when a compensating write sequence fails.
    pub fn rate(
        &self,
        db: &Database,
        user_id: &str,
        note_id: &str,
        request: &RatingRequest,
    ) -> Result<RatingOutcome, AppError> {
        request.validate()?;

        let applied = match self.mode {
            RatingConsistency::Transactional => {
                self.rate_transactional(db, user_id, note_id, request)?
            }
            RatingConsistency::Compensating => rate_compensating(db, user_id, note_id, request)?,
        };

        if applied.changed {
            tracing::info!(
                note_id,
                user_id,
                likes = applied.note.likes,
                dislikes = applied.note.dislikes,
                "rating applied"
            );
        }

        let liked_preview = listing::liked_preview(db, &applied.user)?;
        Ok(RatingOutcome {
            likes: applied.note.likes,
            dislikes: applied.note.dislikes,
            state: applied.user.rating_state(note_id),
            liked_notes: applied.user.liked_notes,
            disliked_notes: applied.user.disliked_notes,
            liked_preview,
        })
    }

    fn rate_transactional(
        &self,
        db: &Database,
        user_id: &str,
        note_id: &str,
        request: &RatingRequest,
    ) -> Result<RatingApplied, AppError> {
        let mut attempt = 1;
        loop {
            match TransactionOps::apply_rating(db, user_id, note_id, request) {
                Ok(applied) => return Ok(applied),
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    tracing::debug!(note_id, attempt, error = %err, "retrying rating transaction");
                    std::thread::sleep(retry_delay(attempt));
                    attempt += 1;
                }
                Err(err) if err.is_retryable() => {
                    tracing::warn!(
                        note_id,
                        attempts = attempt,
                        error = %err,
                        "rating transaction retries exhausted"
                    );
                    return Err(AppError::Unavailable(
                        "Rating is temporarily unavailable, try again later".to_string(),
                    ));
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Write-user-then-note rating flow for stores without multi-row transactions.
///
/// Known limitations, both accepted for this mode:
/// - Two requests that interleave between the reads and the writes lose one
///   update (last writer wins on the counters).
/// - If the note write fails and the user restore also fails, the user's
///   sets disagree with the counters until repaired by hand. That case is
///   logged at `error!` with both row ids.
fn rate_compensating(
    db: &Database,
    user_id: &str,
    note_id: &str,
    request: &RatingRequest,
) -> Result<RatingApplied, AppError> {
    let mut user = db.users.get(user_id)?.ok_or(AppError::NotFound)?;
    let mut note = db.notes.get(note_id)?.ok_or(AppError::NotFound)?;
    let previous = user.clone();

    let changed = apply_transition(&mut note, &mut user, request);
    if !changed {
        return Ok(RatingApplied {
            note,
            user,
            changed,
        });
    }

    match db.users.save_rating_sets(&user) {
        Ok(true) => {}
        Ok(false) => return Err(AppError::NotFound),
        Err(err) => {
            tracing::error!(user_id, note_id, error = %err, "rating user write failed");
            return Err(AppError::Internal);
        }
    }

    let note_write = match db.notes.save_rating_counters(&note) {
        Ok(true) => Ok(()),
        Ok(false) => Err(AppError::NotFound),
        Err(err) => {
            tracing::error!(note_id, error = %err, "rating note write failed");
            Err(AppError::Internal)
        }
    };
    if let Err(err) = note_write {
        restore_rating_sets(db, &previous, note_id);
        return Err(err);
    }

    Ok(RatingApplied {
        note,
        user,
        changed,
    })
}

/// Compensating write: put back the user's pre-rating sets. Failures are logged only.
fn restore_rating_sets(db: &Database, previous: &User, note_id: &str) {
    match write_previous_sets(db, previous, note_id) {
        Ok(_) => tracing::warn!(
            user_id = %previous.id,
            note_id,
            "rating rolled back after note write failure"
        ),
        Err(err) => tracing::error!(
            user_id = %previous.id,
            note_id,
            error = %err,
            "rating rollback failed; user sets and note counters disagree"
        ),
    }
}

fn write_previous_sets(db: &Database, previous: &User, note_id: &str) -> Result<bool, AppError> {
    #[cfg(test)]
    crate::db::failpoint::on_user_restore_write(note_id)?;
    #[cfg(not(test))]
    let _ = note_id;
    db.users.save_rating_sets(previous)
}

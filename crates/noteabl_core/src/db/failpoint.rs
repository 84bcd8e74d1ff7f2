//! Test-only fault injection for rating writes, keyed by note id.

use crate::error::AppError;
use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

/// Fault to inject on the next rating writes against one note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RatingFailpoint {
    /// Fail the next `n` transactional attempts with a transient conflict.
    TransientConflicts(u32),
    /// Fail every transactional attempt with a transient conflict.
    AlwaysConflict,
    /// Fail the note write of the compensating flow (after the user write).
    NoteWriteFails,
    /// Fail both the note write and the compensating user restore.
    NoteAndRestoreWritesFail,
}

fn registry() -> &'static Mutex<HashMap<String, RatingFailpoint>> {
    static FAILPOINTS: OnceLock<Mutex<HashMap<String, RatingFailpoint>>> = OnceLock::new();
    FAILPOINTS.get_or_init(|| Mutex::new(HashMap::new()))
}

pub(crate) fn set_rating_failpoint(note_id: &str, failpoint: Option<RatingFailpoint>) {
    let mut registry = registry().lock().expect("failpoint registry");
    match failpoint {
        Some(failpoint) => {
            registry.insert(note_id.to_string(), failpoint);
        }
        None => {
            registry.remove(note_id);
        }
    }
}

/// Called at the start of every transactional rating attempt.
pub(crate) fn on_transaction_attempt(note_id: &str) -> Result<(), AppError> {
    let mut registry = registry().lock().expect("failpoint registry");
    match registry.get_mut(note_id) {
        Some(RatingFailpoint::TransientConflicts(remaining)) if *remaining > 0 => {
            *remaining -= 1;
            Err(AppError::TransientConflict(
                "Injected rating transaction conflict".to_string(),
            ))
        }
        Some(RatingFailpoint::AlwaysConflict) => Err(AppError::TransientConflict(
            "Injected rating transaction conflict".to_string(),
        )),
        _ => Ok(()),
    }
}

/// Called before the compensating flow persists the note counters.
pub(crate) fn on_note_counter_write(note_id: &str) -> Result<(), AppError> {
    let registry = registry().lock().expect("failpoint registry");
    match registry.get(note_id) {
        Some(RatingFailpoint::NoteWriteFails | RatingFailpoint::NoteAndRestoreWritesFail) => Err(
            AppError::StorageMessage("Injected note write failure".to_string()),
        ),
        _ => Ok(()),
    }
}

/// Called before the compensating flow restores the user's rating sets.
pub(crate) fn on_user_restore_write(note_id: &str) -> Result<(), AppError> {
    let registry = registry().lock().expect("failpoint registry");
    match registry.get(note_id) {
        Some(RatingFailpoint::NoteAndRestoreWritesFail) => Err(AppError::StorageMessage(
            "Injected user restore failure".to_string(),
        )),
        _ => Ok(()),
    }
}

/// Clears the failpoint for one note on drop.
pub(crate) struct FailpointGuard {
    note_id: String,
}

impl FailpointGuard {
    pub(crate) fn set(note_id: &str, failpoint: RatingFailpoint) -> Self {
        set_rating_failpoint(note_id, Some(failpoint));
        Self {
            note_id: note_id.to_string(),
        }
    }
}

impl Drop for FailpointGuard {
    fn drop(&mut self) {
        set_rating_failpoint(&self.note_id, None);
    }
}

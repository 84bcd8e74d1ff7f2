//! Database integration tests.

use super::*;
use crate::error::AppError;
use crate::models::note::{CourseMetadata, Note, UpdateNoteRequest};
use crate::models::user::User;
use crate::test_support::{at_millis, seed_note, seed_note_with, seed_user, setup_temp_db};
use std::sync::{Arc, Barrier, Mutex, OnceLock};
use std::thread;

/// Serializes tests that install rating failpoints.
fn rating_failpoint_test_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

mod rating;

//! Shared test-only helpers for noteabl_core.

use crate::accounts::hash_password;
use crate::models::note::{CourseMetadata, Note};
use crate::models::user::User;
use crate::Database;
use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;

/// Creates an isolated temporary database and returns it with the temp dir.
///
/// Keep the [`TempDir`] alive for the full test to preserve the backing files.
///
/// # Panics
/// Panics if temp-dir creation, path conversion, or database initialization
/// fails in the test environment.
pub(crate) fn setup_temp_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().expect("temp dir");
    let db_path = temp_dir.path().join("test.db");
    let db = Database::new(db_path.to_str().expect("db path")).expect("db");
    (db, temp_dir)
}

/// Insert a verified user whose email is derived from `name`.
pub(crate) fn seed_user(db: &Database, name: &str) -> User {
    let email = format!("{}@example.com", name.to_lowercase().replace(' ', "."));
    let password_hash = hash_password("Sup3r-secret!").expect("hash password");
    let mut user = User::new(name, &email, password_hash);
    user.is_verified = true;
    db.users.create(&user).expect("create user");
    user
}

/// Insert a note owned by `owner` in course `CS101`, year `2024`.
pub(crate) fn seed_note(db: &Database, owner: &User, title: &str) -> Note {
    let note = Note::new(
        &owner.id,
        title,
        &CourseMetadata::new("CS101", "2024", None, false),
    );
    db.notes.create(&note).expect("create note");
    note
}

/// Insert a note with a fixed creation time and like count.
pub(crate) fn seed_note_with(
    db: &Database,
    owner: &User,
    title: &str,
    created_at: DateTime<Utc>,
    likes: u64,
) -> Note {
    let mut note = Note::new(
        &owner.id,
        title,
        &CourseMetadata::new("CS101", "2024", None, false),
    );
    note.created_at = created_at;
    note.updated_at = created_at;
    note.likes = likes;
    db.notes.create(&note).expect("create note");
    note
}

/// Midnight UTC on 2024-01-01 plus `millis`.
pub(crate) fn at_millis(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(1_704_067_200_000 + millis)
        .single()
        .expect("valid timestamp")
}

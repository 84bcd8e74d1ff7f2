//! redb table definitions shared by storage modules.

use redb::TableDefinition;

/// File name for the redb database within the configured DB directory.
pub const REDB_FILE_NAME: &str = "data.redb";

/// Canonical note rows (`Note`, bincode-encoded).
pub const NOTES: TableDefinition<&str, &[u8]> = TableDefinition::new("notes");
/// Creation-order index: (created millis, note id).
pub const NOTES_BY_CREATED: TableDefinition<(i64, &str), ()> =
    TableDefinition::new("notes_by_created");
/// Popularity index: (like count, note id). Rewritten on every rating change.
pub const NOTES_BY_LIKES: TableDefinition<(u64, &str), ()> = TableDefinition::new("notes_by_likes");
/// Uniqueness index: composite note key -> note id.
pub const NOTES_BY_TUPLE: TableDefinition<&str, &str> = TableDefinition::new("notes_by_tuple");

/// Canonical user rows (`User`, bincode-encoded).
pub const USERS: TableDefinition<&str, &[u8]> = TableDefinition::new("users");
/// Email uniqueness index: normalized email -> user id.
pub const USERS_BY_EMAIL: TableDefinition<&str, &str> = TableDefinition::new("users_by_email");
/// Verification token hash -> user id.
pub const VERIFICATION_TOKENS: TableDefinition<&str, &str> =
    TableDefinition::new("verification_tokens");
/// Password reset token hash -> user id.
pub const RESET_TOKENS: TableDefinition<&str, &str> = TableDefinition::new("reset_tokens");

/// Session token hash -> `Session` (bincode-encoded).
pub const SESSIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("sessions");

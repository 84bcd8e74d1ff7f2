//! Shared constants used across Noteabl crates.

/// Default API port for Noteabl.
pub const DEFAULT_PORT: u16 = 38480;

/// Default maximum size of a single uploaded PDF.
pub const DEFAULT_MAX_FILE_SIZE: usize = 10 * 1024 * 1024;

/// Default maximum number of files accepted in one upload batch.
pub const DEFAULT_MAX_FILES: usize = 5;

/// Page size for every note listing (browse, own notes, liked notes).
pub const MAX_NOTES_PER_SEARCH: usize = 50;

/// Recently viewed notes kept per user and shown on the dashboard.
pub const MAX_RECENT_NOTES: usize = 20;

/// Liked notes shown on the dashboard and in rating responses.
pub const MAX_LIKED_NOTES_DASHBOARD: usize = 20;

/// Default attempt bound for transactional rating updates.
pub const DEFAULT_RATING_MAX_ATTEMPTS: u32 = 5;

/// Default interval between unverified-account sweeps.
pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 24 * 60 * 60;

/// Lifetime of an email verification token.
pub const VERIFICATION_LINK_EXPIRY_HRS: i64 = 24;

/// Lifetime of a password reset token.
pub const PASSWORD_RESET_EXPIRY_MINS: i64 = 15;

/// Lifetime of a login session.
pub const SESSION_EXPIRY_DAYS: i64 = 7;

/// Minimum accepted password length.
pub const MIN_PASSWORD_LENGTH: usize = 10;

/// Display name substituted for the author of anonymous notes.
pub const ANONYMOUS_AUTHOR_NAME: &str = "Anonymous";

/// Display name used when a note's author account no longer exists.
pub const DELETED_AUTHOR_NAME: &str = "Deleted user";

/// Content type accepted for uploads and served for downloads.
pub const PDF_CONTENT_TYPE: &str = "application/pdf";

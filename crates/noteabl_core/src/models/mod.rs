//! Data models for persistence and API payloads.

/// Note rows, display records, and note request payloads.
pub mod note;
/// User accounts, sessions, and account request payloads.
pub mod user;

#[cfg(test)]
mod tests;

//! User accounts, sessions, and account request payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A registered account.
///
/// `liked_notes` and `disliked_notes` have set semantics with the most
/// recent entry first; a note id never sits in both at once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub is_verified: bool,
    pub verification_token_hash: Option<String>,
    pub verification_expires_at: Option<DateTime<Utc>>,
    pub reset_token_hash: Option<String>,
    pub reset_expires_at: Option<DateTime<Utc>>,
    pub recently_viewed_notes: Vec<String>,
    pub liked_notes: Vec<String>,
    pub disliked_notes: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Rating state of one (user, note) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RatingState {
    Neutral,
    Liked,
    Disliked,
}

/// Account fields safe to return to the account owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub email: String,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
}

/// A login session; stored under the hash of its bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Request payload for account registration.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Request payload for login.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Request payload for starting a password reset.
#[derive(Debug, Clone, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

/// Request payload for completing a password reset.
#[derive(Debug, Clone, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
}

impl User {
    /// Create an unverified account.
    pub fn new(name: &str, email: &str, password_hash: String) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            name: name.trim().to_string(),
            email: email.to_string(),
            password_hash,
            is_verified: false,
            verification_token_hash: None,
            verification_expires_at: None,
            reset_token_hash: None,
            reset_expires_at: None,
            recently_viewed_notes: Vec::new(),
            liked_notes: Vec::new(),
            disliked_notes: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Owner-facing projection without credentials or tokens.
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
            is_verified: self.is_verified,
            created_at: self.created_at,
        }
    }

    /// Current rating state for `note_id`.
    pub fn rating_state(&self, note_id: &str) -> RatingState {
        if contains_ref(&self.liked_notes, note_id) {
            RatingState::Liked
        } else if contains_ref(&self.disliked_notes, note_id) {
            RatingState::Disliked
        } else {
            RatingState::Neutral
        }
    }

    /// Record a view: move `note_id` to the front and cap the list at `cap`.
    pub fn record_view(&mut self, note_id: &str, cap: usize) {
        push_front_unique(&mut self.recently_viewed_notes, note_id);
        self.recently_viewed_notes.truncate(cap);
    }
}

/// Whether `list` references `id`.
pub fn contains_ref(list: &[String], id: &str) -> bool {
    list.iter().any(|entry| entry == id)
}

/// Insert `id` at the front, removing any earlier occurrence.
pub fn push_front_unique(list: &mut Vec<String>, id: &str) {
    list.retain(|entry| entry != id);
    list.insert(0, id.to_string());
}

/// Remove every occurrence of `id`.
///
/// # Returns
/// `true` when at least one entry was removed.
pub fn remove_ref(list: &mut Vec<String>, id: &str) -> bool {
    let before = list.len();
    list.retain(|entry| entry != id);
    list.len() != before
}

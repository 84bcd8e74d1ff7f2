//! Note rows, display records, and note request payloads.

use crate::constants::ANONYMOUS_AUTHOR_NAME;
use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Separator for composite uniqueness keys; stripped from input by [`clean_text`].
const KEY_SEPARATOR: char = '\u{1f}';

/// Uploaded note metadata stored in the database.
///
/// The PDF bytes live in the blob store under [`Note::storage_key`], derived
/// from `uuid` rather than `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub uuid: String,
    pub user_id: String,
    pub title: String,
    pub course_code: String,
    pub academic_year: String,
    pub instructor: Option<String>,
    pub is_anonymous: bool,
    pub likes: u64,
    pub dislikes: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Course metadata shared by every file of one upload batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CourseMetadata {
    pub course_code: String,
    pub academic_year: String,
    pub instructor: Option<String>,
    pub is_anonymous: bool,
}

/// Minimal author projection attached to listed notes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorSummary {
    pub id: String,
    pub name: String,
}

/// Note representation safe to return to any viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteDisplay {
    pub id: String,
    pub title: String,
    pub course_code: String,
    pub academic_year: String,
    pub instructor: Option<String>,
    pub is_anonymous: bool,
    pub likes: u64,
    pub dislikes: u64,
    pub created_at: DateTime<Utc>,
    pub author: AuthorSummary,
}

/// Request payload for the owner's metadata edit.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateNoteRequest {
    pub title: Option<String>,
    pub course_code: Option<String>,
    pub academic_year: Option<String>,
    pub instructor: Option<String>,
    pub is_anonymous: Option<bool>,
}

/// Drop control characters and surrounding whitespace.
pub fn clean_text(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_control())
        .collect::<String>()
        .trim()
        .to_string()
}

/// Clean a free-form optional field, treating blank input as absent.
pub fn normalize_optional(value: Option<&str>) -> Option<String> {
    value.map(clean_text).filter(|value| !value.is_empty())
}

/// Canonical course code form: cleaned and upper-cased.
pub fn normalize_course_code(value: &str) -> String {
    clean_text(value).to_uppercase()
}

/// Current time truncated to millisecond precision.
///
/// Cursor values round-trip through RFC 3339 strings with millisecond
/// precision, so stored timestamps must not carry finer digits.
pub fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    now.duration_trunc(TimeDelta::milliseconds(1)).unwrap_or(now)
}

impl CourseMetadata {
    /// Normalize raw form values.
    pub fn new(
        course_code: &str,
        academic_year: &str,
        instructor: Option<&str>,
        is_anonymous: bool,
    ) -> Self {
        Self {
            course_code: normalize_course_code(course_code),
            academic_year: clean_text(academic_year),
            instructor: normalize_optional(instructor),
            is_anonymous,
        }
    }
}

impl Note {
    /// Create a new note row owned by `user_id` with zeroed counters.
    ///
    /// # Returns
    /// A [`Note`] with a fresh identity and a separate fresh storage uuid.
    pub fn new(user_id: &str, title: &str, metadata: &CourseMetadata) -> Self {
        let now = now_millis();
        Self {
            id: Uuid::now_v7().to_string(),
            uuid: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            title: clean_text(title),
            course_code: metadata.course_code.clone(),
            academic_year: metadata.academic_year.clone(),
            instructor: metadata.instructor.clone(),
            is_anonymous: metadata.is_anonymous,
            likes: 0,
            dislikes: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Object-store key for this note's PDF.
    pub fn storage_key(&self) -> String {
        storage_key_for(&self.uuid)
    }

    /// Composite key enforcing one note per (owner, title, course, year, instructor).
    pub fn uniqueness_key(&self) -> String {
        uniqueness_key(
            &self.user_id,
            &self.title,
            &self.course_code,
            &self.academic_year,
            self.instructor.as_deref(),
        )
    }

    /// Apply an owner edit in place.
    pub fn apply_update(&mut self, update: &UpdateNoteRequest) {
        if let Some(title) = normalize_optional(update.title.as_deref()) {
            self.title = title;
        }
        if let Some(course_code) = normalize_optional(update.course_code.as_deref()) {
            self.course_code = normalize_course_code(&course_code);
        }
        if let Some(year) = normalize_optional(update.academic_year.as_deref()) {
            self.academic_year = year;
        }
        if let Some(instructor) = update.instructor.as_deref() {
            // An explicit blank clears the instructor.
            self.instructor = normalize_optional(Some(instructor));
        }
        if let Some(is_anonymous) = update.is_anonymous {
            self.is_anonymous = is_anonymous;
        }
        self.updated_at = now_millis();
    }
}

/// Object-store key for a storage uuid.
pub fn storage_key_for(uuid: &str) -> String {
    format!("notes/{}.pdf", uuid)
}

/// Build the composite uniqueness key from already-normalized parts.
pub fn uniqueness_key(
    user_id: &str,
    title: &str,
    course_code: &str,
    academic_year: &str,
    instructor: Option<&str>,
) -> String {
    [
        user_id,
        title,
        course_code,
        academic_year,
        instructor.unwrap_or(""),
    ]
    .join(&KEY_SEPARATOR.to_string())
}

impl NoteDisplay {
    /// Build a display record, redacting the author name of anonymous notes.
    ///
    /// The author id is kept so owners can recognise their own rows.
    pub fn from_note(note: &Note, author: AuthorSummary) -> Self {
        let author = if note.is_anonymous {
            AuthorSummary {
                id: author.id,
                name: ANONYMOUS_AUTHOR_NAME.to_string(),
            }
        } else {
            author
        };
        Self {
            id: note.id.clone(),
            title: note.title.clone(),
            course_code: note.course_code.clone(),
            academic_year: note.academic_year.clone(),
            instructor: note.instructor.clone(),
            is_anonymous: note.is_anonymous,
            likes: note.likes,
            dislikes: note.dislikes,
            created_at: note.created_at,
            author,
        }
    }
}

//! Search request parsing into executable note queries.
//!
//! Listings use keyset pagination ordered by `(sort field DESC, id DESC)`.
//! A page after the cursor `(value, id)` contains exactly the rows with
//! `sort field < value OR (sort field == value AND id < cursor id)`, so rows
//! inserted between page fetches are never skipped or repeated.

use crate::error::AppError;
use crate::models::note::Note;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Compiled size bound for free-text filter patterns.
const FILTER_REGEX_SIZE_LIMIT: usize = 1 << 16;

/// Raw listing query string, exactly as received.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteSearchParams {
    pub title: Option<String>,
    pub course_code: Option<String>,
    pub academic_year: Option<String>,
    pub instructor: Option<String>,
    pub sort_by: Option<String>,
    pub cursor_id: Option<String>,
    pub cursor_value: Option<String>,
}

/// Allowed sort fields; both sort descending with id as tiebreak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    #[default]
    CreatedAt,
    Likes,
}

/// Sort-field value half of a keyset cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CursorValue {
    /// Creation time, compared at millisecond precision.
    CreatedAt(DateTime<Utc>),
    /// Like count. Negative values are valid input and admit no rows.
    Likes(i64),
}

/// Position of the last row of the previous page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    pub value: CursorValue,
    pub id: String,
}

/// Which notes a listing may include, independent of the search filters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ListingScope {
    #[default]
    All,
    /// Notes not owned by this user.
    OthersOf(String),
    /// Notes owned by this user.
    OwnedBy(String),
    /// Notes whose id is in the set.
    Among(HashSet<String>),
}

/// Conjunction of per-field predicates plus the keyset cursor clause.
#[derive(Debug, Clone, Default)]
pub struct NoteFilter {
    pub title: Option<Regex>,
    pub course_code: Option<Regex>,
    pub academic_year: Option<String>,
    pub instructor: Option<Regex>,
    pub cursor: Option<Cursor>,
    pub scope: ListingScope,
}

/// A validated query ready for execution by [`crate::db::note::NoteDb::query`].
#[derive(Debug, Clone, Default)]
pub struct NoteQuery {
    pub filter: NoteFilter,
    pub sort: SortField,
}

impl SortField {
    /// Resolve a raw `sortBy` value; anything outside the allow-list is `createdAt`.
    pub fn resolve(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("likes") => Self::Likes,
            _ => Self::CreatedAt,
        }
    }

    /// Wire value of this sort field's cursor for `note`.
    pub fn cursor_value_of(self, note: &Note) -> String {
        match self {
            Self::CreatedAt => note
                .created_at
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            Self::Likes => note.likes.to_string(),
        }
    }
}

/// RFC 3339 timestamp, or a bare `YYYY-MM-DD` date taken as midnight UTC.
fn parse_created_at(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc())
}

impl Cursor {
    /// Parse a cursor pair for `sort`.
    ///
    /// # Errors
    /// Returns [`AppError::BadRequest`] when the id is not a valid note id or
    /// the value does not parse for the sort field.
    pub fn parse(sort: SortField, id: &str, value: &str) -> Result<Self, AppError> {
        let id = Uuid::parse_str(id)
            .map_err(|_| AppError::BadRequest("Invalid cursor id".to_string()))?
            .to_string();
        let value = match sort {
            SortField::CreatedAt => parse_created_at(value)
                .map(CursorValue::CreatedAt)
                .ok_or_else(|| AppError::BadRequest("Invalid cursor value".to_string()))?,
            SortField::Likes => value
                .parse::<i64>()
                .map(CursorValue::Likes)
                .map_err(|_| AppError::BadRequest("Invalid cursor value".to_string()))?,
        };
        Ok(Self { value, id })
    }

    /// Keyset predicate: `sort value < cursor value OR (equal AND id < cursor id)`.
    pub fn admits(&self, note: &Note) -> bool {
        let ordering = match self.value {
            CursorValue::CreatedAt(at) => note
                .created_at
                .timestamp_millis()
                .cmp(&at.timestamp_millis()),
            CursorValue::Likes(likes) => i128::from(note.likes).cmp(&i128::from(likes)),
        };
        ordering.is_lt() || (ordering.is_eq() && note.id.as_str() < self.id.as_str())
    }
}

impl ListingScope {
    fn admits(&self, note: &Note) -> bool {
        match self {
            Self::All => true,
            Self::OthersOf(user_id) => note.user_id != *user_id,
            Self::OwnedBy(user_id) => note.user_id == *user_id,
            Self::Among(ids) => ids.contains(&note.id),
        }
    }
}

impl NoteFilter {
    /// Evaluate every predicate against `note`.
    pub fn matches(&self, note: &Note) -> bool {
        let pattern_matches = |pattern: &Option<Regex>, value: Option<&str>| match pattern {
            None => true,
            Some(pattern) => value.is_some_and(|value| pattern.is_match(value)),
        };

        pattern_matches(&self.title, Some(&note.title))
            && pattern_matches(&self.course_code, Some(&note.course_code))
            && pattern_matches(&self.instructor, note.instructor.as_deref())
            && self
                .academic_year
                .as_ref()
                .map_or(true, |year| *year == note.academic_year)
            && self.cursor.as_ref().map_or(true, |cursor| cursor.admits(note))
            && self.scope.admits(note)
    }
}

impl NoteQuery {
    /// Restrict this query to `scope`.
    pub fn with_scope(mut self, scope: ListingScope) -> Self {
        self.filter.scope = scope;
        self
    }
}

fn non_blank(value: Option<&String>) -> Option<&str> {
    value.map(|value| value.trim()).filter(|value| !value.is_empty())
}

/// Case-insensitive substring pattern with every metacharacter escaped.
fn contains_pattern(raw: &str) -> Result<Regex, AppError> {
    RegexBuilder::new(&regex::escape(raw))
        .case_insensitive(true)
        .size_limit(FILTER_REGEX_SIZE_LIMIT)
        .build()
        .map_err(|_| AppError::BadRequest("Search filter is too long".to_string()))
}

/// Translate raw listing parameters into an executable query.
///
/// # Returns
/// A [`NoteQuery`] with [`ListingScope::All`]; callers narrow the scope.
///
/// # Errors
/// Returns [`AppError::BadRequest`] when exactly one cursor half is supplied,
/// or when a supplied cursor does not parse for the resolved sort field.
pub fn build_query(params: &NoteSearchParams) -> Result<NoteQuery, AppError> {
    let sort = SortField::resolve(params.sort_by.as_deref());

    let cursor = match (
        non_blank(params.cursor_id.as_ref()),
        non_blank(params.cursor_value.as_ref()),
    ) {
        (Some(id), Some(value)) => Some(Cursor::parse(sort, id, value)?),
        (None, None) => None,
        _ => {
            return Err(AppError::BadRequest(
                "cursorId and cursorValue must be supplied together".to_string(),
            ))
        }
    };

    let filter = NoteFilter {
        title: non_blank(params.title.as_ref())
            .map(contains_pattern)
            .transpose()?,
        course_code: non_blank(params.course_code.as_ref())
            .map(contains_pattern)
            .transpose()?,
        academic_year: non_blank(params.academic_year.as_ref()).map(ToString::to_string),
        instructor: non_blank(params.instructor.as_ref())
            .map(contains_pattern)
            .transpose()?,
        cursor,
        scope: ListingScope::All,
    };

    Ok(NoteQuery { filter, sort })
}

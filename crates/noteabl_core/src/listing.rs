//! Paginated note listings, display records and the account dashboard.

use crate::constants::{
    DELETED_AUTHOR_NAME, MAX_LIKED_NOTES_DASHBOARD, MAX_NOTES_PER_SEARCH, MAX_RECENT_NOTES,
};
use crate::db::Database;
use crate::error::AppError;
use crate::models::note::{AuthorSummary, Note, NoteDisplay};
use crate::models::user::{User, UserProfile};
use crate::search::{build_query, ListingScope, NoteQuery, NoteSearchParams};
use serde::Serialize;
use std::collections::HashSet;

/// Keyset position of the last row on a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageCursor {
    pub id: String,
    pub value: String,
}

/// One page of display records.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotePage {
    pub notes: Vec<NoteDisplay>,
    pub has_more: bool,
    pub next_cursor: Option<PageCursor>,
}

/// Profile plus recently viewed and liked notes.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub user: UserProfile,
    pub recently_viewed: Vec<NoteDisplay>,
    pub liked_notes: Vec<NoteDisplay>,
}

/// Execute `query` and return at most `limit` display records.
///
/// Fetches `limit + 1` rows; the extra row only decides `has_more`.
///
/// # Errors
/// Returns an error when storage access or deserialization fails.
pub fn list_notes(db: &Database, query: &NoteQuery, limit: usize) -> Result<NotePage, AppError> {
    let mut rows = db.notes.query(query, limit.saturating_add(1))?;
    let has_more = rows.len() > limit;
    rows.truncate(limit);

    let next_cursor = if has_more {
        rows.last().map(|last| PageCursor {
            id: last.id.clone(),
            value: query.sort.cursor_value_of(last),
        })
    } else {
        None
    };

    Ok(NotePage {
        notes: display_notes(db, &rows)?,
        has_more,
        next_cursor,
    })
}

/// Map notes to display records with minimal author projections.
///
/// Authors that no longer exist are shown as [`DELETED_AUTHOR_NAME`].
///
/// # Errors
/// Returns an error when storage access or deserialization fails.
pub fn display_notes(db: &Database, notes: &[Note]) -> Result<Vec<NoteDisplay>, AppError> {
    let authors = db
        .users
        .author_summaries(notes.iter().map(|note| note.user_id.as_str()))?;
    Ok(notes
        .iter()
        .map(|note| {
            let author = authors
                .get(&note.user_id)
                .cloned()
                .unwrap_or_else(|| AuthorSummary {
                    id: note.user_id.clone(),
                    name: DELETED_AUTHOR_NAME.to_string(),
                });
            NoteDisplay::from_note(note, author)
        })
        .collect())
}

fn display_first(db: &Database, ids: &[String], cap: usize) -> Result<Vec<NoteDisplay>, AppError> {
    let mut notes = db.notes.get_many(ids)?;
    notes.truncate(cap);
    display_notes(db, &notes)
}

/// Most recently liked notes of `user`, capped for display.
///
/// # Errors
/// Returns an error when storage access or deserialization fails.
pub fn liked_preview(db: &Database, user: &User) -> Result<Vec<NoteDisplay>, AppError> {
    display_first(db, &user.liked_notes, MAX_LIKED_NOTES_DASHBOARD)
}

/// Browse notes uploaded by anyone but `viewer_id`.
///
/// # Errors
/// Returns [`AppError::BadRequest`] for invalid cursors, or a storage error.
pub fn browse_notes(
    db: &Database,
    viewer_id: &str,
    params: &NoteSearchParams,
) -> Result<NotePage, AppError> {
    let query = build_query(params)?.with_scope(ListingScope::OthersOf(viewer_id.to_string()));
    list_notes(db, &query, MAX_NOTES_PER_SEARCH)
}

/// Search the notes `owner_id` uploaded.
///
/// # Errors
/// Returns [`AppError::BadRequest`] for invalid cursors, or a storage error.
pub fn own_notes(
    db: &Database,
    owner_id: &str,
    params: &NoteSearchParams,
) -> Result<NotePage, AppError> {
    let query = build_query(params)?.with_scope(ListingScope::OwnedBy(owner_id.to_string()));
    list_notes(db, &query, MAX_NOTES_PER_SEARCH)
}

/// Search the notes `user` currently likes.
///
/// # Errors
/// Returns [`AppError::BadRequest`] for invalid cursors, or a storage error.
pub fn liked_notes(
    db: &Database,
    user: &User,
    params: &NoteSearchParams,
) -> Result<NotePage, AppError> {
    let liked: HashSet<String> = user.liked_notes.iter().cloned().collect();
    let query = build_query(params)?.with_scope(ListingScope::Among(liked));
    list_notes(db, &query, MAX_NOTES_PER_SEARCH)
}

/// Fetch one note for `viewer_id` and record the view.
///
/// # Errors
/// Returns [`AppError::NotFound`] when the note does not exist, or a storage error.
pub fn open_note(db: &Database, viewer_id: &str, note_id: &str) -> Result<NoteDisplay, AppError> {
    let note = db.notes.get(note_id)?.ok_or(AppError::NotFound)?;
    db.users.record_view(viewer_id, &note.id, MAX_RECENT_NOTES)?;
    display_notes(db, std::slice::from_ref(&note))?
        .pop()
        .ok_or(AppError::Internal)
}

/// Build the dashboard for `user_id`, pruning stale references first.
///
/// # Errors
/// Returns [`AppError::NotFound`] when the user does not exist, or a storage error.
pub fn dashboard(db: &Database, user_id: &str) -> Result<Dashboard, AppError> {
    let (user, _) = db
        .users
        .prune_references(user_id)?
        .ok_or(AppError::NotFound)?;

    Ok(Dashboard {
        recently_viewed: display_first(db, &user.recently_viewed_notes, MAX_RECENT_NOTES)?,
        liked_notes: liked_preview(db, &user)?,
        user: user.profile(),
    })
}

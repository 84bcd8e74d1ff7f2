//! Note storage operations backed by redb.

use super::{created_key, load_note, tables::*};
use crate::error::AppError;
use crate::models::note::{Note, UpdateNoteRequest};
use crate::search::{Cursor, CursorValue, NoteQuery, SortField};
use redb::{ReadableDatabase, ReadableTable, ReadableTableMetadata};
use std::sync::Arc;

/// Accessor for note rows and their derived index tables.
pub struct NoteDb {
    db: Arc<redb::Database>,
}

type IndexIds<'a> = Box<dyn Iterator<Item = Result<String, AppError>> + 'a>;

/// Insert the creation, popularity and uniqueness index rows for `note`.
pub(crate) fn insert_indexes(
    created: &mut redb::Table<(i64, &str), ()>,
    likes: &mut redb::Table<(u64, &str), ()>,
    tuple: &mut redb::Table<&str, &str>,
    note: &Note,
) -> Result<(), AppError> {
    let id = note.id.as_str();
    created.insert((created_key(note), id), ())?;
    likes.insert((note.likes, id), ())?;
    tuple.insert(note.uniqueness_key().as_str(), id)?;
    Ok(())
}

/// Remove every index row derived from `note`.
pub(crate) fn remove_indexes(
    created: &mut redb::Table<(i64, &str), ()>,
    likes: &mut redb::Table<(u64, &str), ()>,
    tuple: &mut redb::Table<&str, &str>,
    note: &Note,
) -> Result<(), AppError> {
    let id = note.id.as_str();
    let _ = created.remove((created_key(note), id))?;
    let _ = likes.remove((note.likes, id))?;
    let key = note.uniqueness_key();
    let owned_by_note = tuple
        .get(key.as_str())?
        .is_some_and(|guard| guard.value() == id);
    if owned_by_note {
        let _ = tuple.remove(key.as_str())?;
    }
    Ok(())
}

/// Move `note` within the popularity index after a counter change.
pub(crate) fn reindex_likes(
    likes: &mut redb::Table<(u64, &str), ()>,
    old_likes: u64,
    note: &Note,
) -> Result<(), AppError> {
    if old_likes != note.likes {
        let _ = likes.remove((old_likes, note.id.as_str()))?;
        likes.insert((note.likes, note.id.as_str()), ())?;
    }
    Ok(())
}

fn conflict_for(note: &Note) -> AppError {
    AppError::Conflict(format!(
        "A note titled '{}' for {} {} already exists",
        note.title, note.course_code, note.academic_year
    ))
}

impl NoteDb {
    /// Bind an accessor to `db`; tables are created by [`super::Database::from_shared`].
    pub fn new(db: Arc<redb::Database>) -> Self {
        Self { db }
    }

    /// Insert a note row and its index rows atomically.
    ///
    /// # Errors
    /// Returns [`AppError::Conflict`] when another note already holds the
    /// same uniqueness tuple, or a storage error.
    pub fn create(&self, note: &Note) -> Result<(), AppError> {
        let encoded = bincode::serialize(note)?;
        let key = note.uniqueness_key();

        let write_txn = self.db.begin_write()?;
        {
            let mut notes = write_txn.open_table(NOTES)?;
            let mut created = write_txn.open_table(NOTES_BY_CREATED)?;
            let mut likes = write_txn.open_table(NOTES_BY_LIKES)?;
            let mut tuple = write_txn.open_table(NOTES_BY_TUPLE)?;

            if tuple.get(key.as_str())?.is_some() {
                return Err(conflict_for(note));
            }
            if notes.get(note.id.as_str())?.is_some() {
                return Err(AppError::StorageMessage(format!(
                    "Note id '{}' already exists",
                    note.id
                )));
            }

            notes.insert(note.id.as_str(), encoded.as_slice())?;
            insert_indexes(&mut created, &mut likes, &mut tuple, note)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Fetch a note by id.
    ///
    /// # Errors
    /// Returns an error when storage access or deserialization fails.
    pub fn get(&self, id: &str) -> Result<Option<Note>, AppError> {
        let read_txn = self.db.begin_read()?;
        let notes = read_txn.open_table(NOTES)?;
        match notes.get(id)? {
            Some(value) => Ok(Some(super::deserialize_note(value.value())?)),
            None => Ok(None),
        }
    }

    /// Fetch several notes, preserving the order of `ids` and skipping missing rows.
    ///
    /// # Errors
    /// Returns an error when storage access or deserialization fails.
    pub fn get_many(&self, ids: &[String]) -> Result<Vec<Note>, AppError> {
        let read_txn = self.db.begin_read()?;
        let notes = read_txn.open_table(NOTES)?;
        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(note) = load_note(&notes, id)? {
                found.push(note);
            }
        }
        Ok(found)
    }

    /// Look up the note currently holding a uniqueness key.
    ///
    /// # Errors
    /// Returns an error when storage access fails.
    pub fn find_by_tuple(&self, key: &str) -> Result<Option<String>, AppError> {
        let read_txn = self.db.begin_read()?;
        let tuple = read_txn.open_table(NOTES_BY_TUPLE)?;
        Ok(tuple.get(key)?.map(|guard| guard.value().to_string()))
    }

    /// Delete a note and its index rows, returning the deleted row.
    ///
    /// # Returns
    /// `Ok(Some(note))` when deleted, `Ok(None)` when missing.
    ///
    /// # Errors
    /// Returns an error when storage access or deserialization fails.
    pub fn delete_and_return(&self, id: &str) -> Result<Option<Note>, AppError> {
        self.delete_inner(id, None)
    }

    /// Delete a note only when `owner_id` owns it.
    ///
    /// # Returns
    /// `Ok(None)` when the note is missing or owned by someone else.
    ///
    /// # Errors
    /// Returns an error when storage access or deserialization fails.
    pub fn delete_owned(&self, id: &str, owner_id: &str) -> Result<Option<Note>, AppError> {
        self.delete_inner(id, Some(owner_id))
    }

    fn delete_inner(&self, id: &str, owner_id: Option<&str>) -> Result<Option<Note>, AppError> {
        let write_txn = self.db.begin_write()?;
        let deleted = {
            let mut notes = write_txn.open_table(NOTES)?;
            let mut created = write_txn.open_table(NOTES_BY_CREATED)?;
            let mut likes = write_txn.open_table(NOTES_BY_LIKES)?;
            let mut tuple = write_txn.open_table(NOTES_BY_TUPLE)?;

            let Some(note) = load_note(&notes, id)? else {
                return Ok(None);
            };
            if owner_id.is_some_and(|owner| owner != note.user_id) {
                return Ok(None);
            }

            remove_indexes(&mut created, &mut likes, &mut tuple, &note)?;
            let _ = notes.remove(id)?;
            Some(note)
        };
        write_txn.commit()?;
        Ok(deleted)
    }

    /// Apply an owner's metadata edit, re-validating the uniqueness tuple.
    ///
    /// # Returns
    /// `Ok(None)` when the note is missing or not owned by `owner_id`.
    ///
    /// # Errors
    /// Returns [`AppError::Conflict`] when the edited tuple collides with
    /// another note, [`AppError::BadRequest`] when the edit would blank a
    /// required field, or a storage error.
    pub fn update_metadata(
        &self,
        id: &str,
        owner_id: &str,
        update: &UpdateNoteRequest,
    ) -> Result<Option<Note>, AppError> {
        let write_txn = self.db.begin_write()?;
        let updated = {
            let mut notes = write_txn.open_table(NOTES)?;
            let mut tuple = write_txn.open_table(NOTES_BY_TUPLE)?;

            let Some(mut note) = load_note(&notes, id)? else {
                return Ok(None);
            };
            if note.user_id != owner_id {
                return Ok(None);
            }

            let old_key = note.uniqueness_key();
            note.apply_update(update);
            if note.title.is_empty() || note.course_code.is_empty() || note.academic_year.is_empty()
            {
                return Err(AppError::BadRequest(
                    "Title, course code and academic year cannot be empty".to_string(),
                ));
            }

            let new_key = note.uniqueness_key();
            if new_key != old_key {
                let taken_by_other = tuple
                    .get(new_key.as_str())?
                    .is_some_and(|guard| guard.value() != id);
                if taken_by_other {
                    return Err(conflict_for(&note));
                }
                let _ = tuple.remove(old_key.as_str())?;
                tuple.insert(new_key.as_str(), id)?;
            }

            let encoded = bincode::serialize(&note)?;
            notes.insert(id, encoded.as_slice())?;
            Some(note)
        };
        write_txn.commit()?;
        Ok(updated)
    }

    /// Persist changed rating counters and reindex popularity.
    ///
    /// Used by the compensating rating flow only; the transactional flow
    /// writes counters inside [`super::TransactionOps::apply_rating`].
    ///
    /// # Returns
    /// `Ok(false)` when the note no longer exists.
    ///
    /// # Errors
    /// Returns an error when storage access or serialization fails.
    pub fn save_rating_counters(&self, note: &Note) -> Result<bool, AppError> {
        #[cfg(test)]
        super::failpoint::on_note_counter_write(&note.id)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut notes = write_txn.open_table(NOTES)?;
            let mut likes = write_txn.open_table(NOTES_BY_LIKES)?;

            let Some(mut stored) = load_note(&notes, &note.id)? else {
                return Ok(false);
            };
            let old_likes = stored.likes;
            stored.likes = note.likes;
            stored.dislikes = note.dislikes;

            let encoded = bincode::serialize(&stored)?;
            notes.insert(note.id.as_str(), encoded.as_slice())?;
            reindex_likes(&mut likes, old_likes, &stored)?;
        }
        write_txn.commit()?;
        Ok(true)
    }

    /// Execute a listing query in `(sort field DESC, id DESC)` order.
    ///
    /// Walks the index for the sort field backwards from the cursor position,
    /// loading canonical rows and applying the filter until `limit` rows match.
    ///
    /// # Returns
    /// Up to `limit` notes in sort order.
    ///
    /// # Errors
    /// Returns an error when storage access or deserialization fails.
    pub fn query(&self, query: &NoteQuery, limit: usize) -> Result<Vec<Note>, AppError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let read_txn = self.db.begin_read()?;
        let notes = read_txn.open_table(NOTES)?;
        let created = read_txn.open_table(NOTES_BY_CREATED)?;
        let likes = read_txn.open_table(NOTES_BY_LIKES)?;
        let cursor = query.filter.cursor.as_ref();

        let ids: IndexIds<'_> = match query.sort {
            SortField::CreatedAt => {
                let range = match cursor {
                    Some(Cursor {
                        value: CursorValue::CreatedAt(at),
                        id,
                    }) => created.range(..(at.timestamp_millis(), id.as_str()))?,
                    _ => created.iter()?,
                };
                Box::new(range.rev().map(|item| {
                    item.map(|(key, _)| key.value().1.to_string())
                        .map_err(AppError::from)
                }))
            }
            SortField::Likes => {
                let range = match cursor {
                    Some(Cursor {
                        value: CursorValue::Likes(value),
                        id,
                    }) => match u64::try_from(*value) {
                        Ok(value) => likes.range(..(value, id.as_str()))?,
                        // Nothing sorts below a negative like count.
                        Err(_) => return Ok(Vec::new()),
                    },
                    _ => likes.iter()?,
                };
                Box::new(range.rev().map(|item| {
                    item.map(|(key, _)| key.value().1.to_string())
                        .map_err(AppError::from)
                }))
            }
        };

        let mut matched = Vec::with_capacity(limit.min(64));
        for id in ids {
            let id = id?;
            let Some(note) = load_note(&notes, &id)? else {
                continue;
            };
            if !query.filter.matches(&note) {
                continue;
            }
            matched.push(note);
            if matched.len() >= limit {
                break;
            }
        }
        Ok(matched)
    }

    /// Number of canonical note rows.
    ///
    /// # Errors
    /// Returns an error when storage access fails.
    pub fn count(&self) -> Result<u64, AppError> {
        let read_txn = self.db.begin_read()?;
        let notes = read_txn.open_table(NOTES)?;
        Ok(notes.len()?)
    }
}

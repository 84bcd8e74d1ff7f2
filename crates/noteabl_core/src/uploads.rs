//! Batched upload and delete flows spanning the note table and the blob store.
//!
//! The two stores share no transaction. Uploads write the note row first
//! and the blob second, undoing everything the batch wrote if any step
//! fails. Deletes always remove the row even when the blob delete fails,
//! since a dangling row is worse than an orphaned blob.

use crate::blob::BlobStore;
use crate::config::{parse_env_flag, Config};
use crate::constants::PDF_CONTENT_TYPE;
use crate::db::Database;
use crate::error::AppError;
use crate::models::note::{clean_text, uniqueness_key, CourseMetadata, Note};
use bytes::Bytes;
use std::collections::HashSet;

const PDF_MAGIC: &[u8] = b"%PDF-";

/// One file part of an upload form, as received.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

/// Raw multipart upload form.
#[derive(Debug, Clone, Default)]
pub struct UploadForm {
    pub course_code: Option<String>,
    pub academic_year: Option<String>,
    pub instructor: Option<String>,
    pub is_anonymous: Option<String>,
    pub files: Vec<UploadFile>,
}

/// A file that passed validation, with its derived title.
#[derive(Debug, Clone)]
pub struct ValidatedFile {
    pub title: String,
    pub bytes: Bytes,
}

/// A validated batch sharing one set of course metadata.
#[derive(Debug, Clone)]
pub struct UploadBatch {
    pub metadata: CourseMetadata,
    pub files: Vec<ValidatedFile>,
}

/// Per-request upload bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadLimits {
    pub max_files: usize,
    pub max_file_size: usize,
}

impl UploadLimits {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_files: config.max_files,
            max_file_size: config.max_file_size,
        }
    }
}

/// Best-effort cleanup step. Running one never fails; the outcome is only logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompensatingAction {
    /// Delete a note row written earlier in a failed upload.
    RemoveRecord { note_id: String },
    /// Delete a stored blob.
    RemoveBlob { storage_key: String },
    /// Delete both halves of an upload that completed before a later failure.
    RemoveUpload { note_id: String, storage_key: String },
}

impl CompensatingAction {
    fn for_upload(note: &Note) -> Self {
        Self::RemoveUpload {
            note_id: note.id.clone(),
            storage_key: note.storage_key(),
        }
    }

    pub async fn run(self, db: &Database, blobs: &dyn BlobStore) {
        match self {
            Self::RemoveRecord { note_id } => remove_record(db, &note_id),
            Self::RemoveBlob { storage_key } => remove_blob(blobs, &storage_key).await,
            Self::RemoveUpload {
                note_id,
                storage_key,
            } => {
                remove_blob(blobs, &storage_key).await;
                remove_record(db, &note_id);
            }
        }
    }
}

fn remove_record(db: &Database, note_id: &str) {
    match db.notes.delete_and_return(note_id) {
        Ok(Some(_)) => tracing::info!(note_id, "compensation removed note record"),
        Ok(None) => tracing::debug!(note_id, "compensation found no note record to remove"),
        Err(err) => {
            tracing::error!(note_id, error = %err, "compensation failed to remove note record")
        }
    }
}

async fn remove_blob(blobs: &dyn BlobStore, storage_key: &str) {
    match blobs.delete(storage_key).await {
        Ok(()) => tracing::debug!(storage_key, "removed blob"),
        Err(err) => {
            tracing::warn!(storage_key, error = %err, "failed to remove blob; leaving orphan")
        }
    }
}

fn required(value: Option<&String>) -> Option<String> {
    value
        .map(|value| clean_text(value))
        .filter(|value| !value.is_empty())
}

/// Title for an uploaded file: its file-name stem without any client path.
fn title_from_file_name(file_name: &str) -> String {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(file_name);
    let stem = match base.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => base,
    };
    clean_text(stem)
}

/// Validate a raw upload form against `limits`.
///
/// # Errors
/// - [`AppError::BadRequest`] for missing metadata, no files, too many
///   files, non-PDF content, oversized files or untitled files.
/// - [`AppError::Conflict`] when two files in the batch share a title.
pub fn validate_batch(form: UploadForm, limits: UploadLimits) -> Result<UploadBatch, AppError> {
    let (Some(course_code), Some(academic_year)) = (
        required(form.course_code.as_ref()),
        required(form.academic_year.as_ref()),
    ) else {
        return Err(AppError::BadRequest(
            "courseCode and academicYear are required".to_string(),
        ));
    };

    let is_anonymous = match form.is_anonymous.as_deref() {
        None => false,
        Some(raw) => parse_env_flag(raw).ok_or_else(|| {
            AppError::BadRequest(format!("Invalid isAnonymous value '{}'", raw.trim()))
        })?,
    };

    if form.files.is_empty() {
        return Err(AppError::BadRequest("No files uploaded".to_string()));
    }
    if form.files.len() > limits.max_files {
        return Err(AppError::BadRequest(format!(
            "At most {} files can be uploaded at once",
            limits.max_files
        )));
    }

    let mut titles = HashSet::new();
    let mut files = Vec::with_capacity(form.files.len());
    for file in form.files {
        let content_type = file
            .content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if content_type != PDF_CONTENT_TYPE || !file.bytes.starts_with(PDF_MAGIC) {
            return Err(AppError::BadRequest(format!(
                "'{}' is not a PDF file",
                file.file_name
            )));
        }
        if file.bytes.len() > limits.max_file_size {
            return Err(AppError::BadRequest(format!(
                "'{}' exceeds the {} byte size limit",
                file.file_name, limits.max_file_size
            )));
        }

        let title = title_from_file_name(&file.file_name);
        if title.is_empty() {
            return Err(AppError::BadRequest(format!(
                "'{}' has no usable title",
                file.file_name
            )));
        }
        if !titles.insert(title.clone()) {
            return Err(AppError::Conflict(format!(
                "More than one file in this upload is titled '{}'",
                title
            )));
        }
        files.push(ValidatedFile {
            title,
            bytes: file.bytes,
        });
    }

    Ok(UploadBatch {
        metadata: CourseMetadata::new(
            &course_code,
            &academic_year,
            form.instructor.as_deref(),
            is_anonymous,
        ),
        files,
    })
}

/// Store every file of `batch` for `user_id`, all or nothing.
///
/// Duplicates are rejected before any write. Each file then gets its note
/// row followed by its blob; on the first failure every row and blob the
/// batch already wrote is removed before the error is returned.
///
/// # Returns
/// The created notes, in batch order.
///
/// # Errors
/// - [`AppError::Conflict`] when any file duplicates an existing note.
/// - [`AppError::Unavailable`] when a blob write fails.
/// - Storage errors from the note table.
pub async fn upload_batch(
    db: &Database,
    blobs: &dyn BlobStore,
    user_id: &str,
    batch: UploadBatch,
) -> Result<Vec<Note>, AppError> {
    let metadata = batch.metadata;
    for file in &batch.files {
        let key = uniqueness_key(
            user_id,
            &file.title,
            &metadata.course_code,
            &metadata.academic_year,
            metadata.instructor.as_deref(),
        );
        if db.notes.find_by_tuple(&key)?.is_some() {
            return Err(AppError::Conflict(format!(
                "A note titled '{}' for {} {} already exists",
                file.title, metadata.course_code, metadata.academic_year
            )));
        }
    }

    let mut completed: Vec<Note> = Vec::with_capacity(batch.files.len());
    for file in batch.files {
        let note = Note::new(user_id, &file.title, &metadata);

        if let Err(err) = db.notes.create(&note) {
            tracing::warn!(user_id, title = %note.title, error = %err, "note record write failed");
            roll_back(db, blobs, &completed).await;
            return Err(err);
        }

        let storage_key = note.storage_key();
        if let Err(err) = blobs.put(&storage_key, file.bytes, PDF_CONTENT_TYPE).await {
            tracing::error!(
                note_id = %note.id,
                storage_key = %storage_key,
                error = %err,
                "blob write failed; rolling back upload batch"
            );
            CompensatingAction::RemoveRecord {
                note_id: note.id.clone(),
            }
            .run(db, blobs)
            .await;
            roll_back(db, blobs, &completed).await;
            return Err(AppError::Unavailable(
                "File storage is unavailable, try again later".to_string(),
            ));
        }

        completed.push(note);
    }

    tracing::info!(user_id, count = completed.len(), "upload batch stored");
    Ok(completed)
}

async fn roll_back(db: &Database, blobs: &dyn BlobStore, completed: &[Note]) {
    for note in completed.iter().rev() {
        CompensatingAction::for_upload(note).run(db, blobs).await;
    }
}

/// Delete a note owned by `owner_id` together with its blob.
///
/// The blob delete is best effort and never blocks or reverses the row delete.
///
/// # Returns
/// The deleted note.
///
/// # Errors
/// Returns [`AppError::NotFound`] when the note is missing or owned by
/// someone else, or a storage error from the note table.
pub async fn delete_owned_note(
    db: &Database,
    blobs: &dyn BlobStore,
    owner_id: &str,
    note_id: &str,
) -> Result<Note, AppError> {
    let note = db
        .notes
        .get(note_id)?
        .filter(|note| note.user_id == owner_id)
        .ok_or(AppError::NotFound)?;

    let blob_cleanup = CompensatingAction::RemoveBlob {
        storage_key: note.storage_key(),
    };
    let ((), deleted) = tokio::join!(blob_cleanup.run(db, blobs), async {
        db.notes.delete_owned(note_id, owner_id)
    });

    let deleted = deleted?.ok_or(AppError::NotFound)?;
    tracing::info!(note_id, owner_id, "note deleted");
    Ok(deleted)
}

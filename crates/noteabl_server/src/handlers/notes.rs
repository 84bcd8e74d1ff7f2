//! Note HTTP handlers.

use crate::{
    auth::CurrentUser,
    error::HttpError,
    listing::{self, NotePage},
    models::note::{NoteDisplay, UpdateNoteRequest},
    rating::{RatingOutcome, RatingRequest},
    search::NoteSearchParams,
    uploads::{self, UploadFile, UploadForm, UploadLimits},
    AppError, AppState,
};
use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use noteabl_core::constants::PDF_CONTENT_TYPE;

/// Browse notes uploaded by other users.
///
/// # Errors
/// Returns an error for malformed cursors or storage failures.
pub async fn browse_notes(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(params): Query<NoteSearchParams>,
) -> Result<Json<NotePage>, HttpError> {
    Ok(Json(listing::browse_notes(
        &state.db,
        &current.user.id,
        &params,
    )?))
}

/// Fetch one note and record the view.
///
/// # Errors
/// Returns an error if the note does not exist or lookup fails.
pub async fn get_note(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<NoteDisplay>, HttpError> {
    Ok(Json(listing::open_note(&state.db, &current.user.id, &id)?))
}

/// Stream the note's PDF.
///
/// # Errors
/// Returns an error if the note or its blob is missing, or the blob store fails.
pub async fn download_note(
    State(state): State<AppState>,
    _current: CurrentUser,
    Path(id): Path<String>,
) -> Result<Response, HttpError> {
    let note = state.db.notes.get(&id)?.ok_or(AppError::NotFound)?;
    let bytes = state
        .blobs
        .get(&note.storage_key())
        .await?
        .ok_or_else(|| {
            tracing::warn!(note_id = %note.id, "note row has no stored file");
            AppError::NotFound
        })?;
    Ok(([(header::CONTENT_TYPE, PDF_CONTENT_TYPE)], bytes).into_response())
}

async fn read_upload_form(mut multipart: Multipart) -> Result<UploadForm, AppError> {
    let malformed = |err: axum::extract::multipart::MultipartError| {
        AppError::BadRequest(format!("Malformed upload: {}", err))
    };

    let mut form = UploadForm::default();
    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "files" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(malformed)?;
                form.files.push(UploadFile {
                    file_name,
                    content_type,
                    bytes,
                });
            }
            "courseCode" => form.course_code = Some(field.text().await.map_err(malformed)?),
            "academicYear" => form.academic_year = Some(field.text().await.map_err(malformed)?),
            "instructor" => form.instructor = Some(field.text().await.map_err(malformed)?),
            "isAnonymous" => form.is_anonymous = Some(field.text().await.map_err(malformed)?),
            other => tracing::debug!(field = other, "ignoring unknown upload field"),
        }
    }
    Ok(form)
}

/// Upload a batch of PDFs sharing one set of course metadata.
///
/// # Returns
/// `201 Created` with the stored notes as display records.
///
/// # Errors
/// Returns an error if validation fails, a note already exists, or storage fails.
pub async fn upload_notes(
    State(state): State<AppState>,
    current: CurrentUser,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Vec<NoteDisplay>>), HttpError> {
    let form = read_upload_form(multipart).await?;
    let batch = uploads::validate_batch(form, UploadLimits::from_config(&state.config))?;
    let notes =
        uploads::upload_batch(&state.db, state.blobs.as_ref(), &current.user.id, batch).await?;
    Ok((
        StatusCode::CREATED,
        Json(listing::display_notes(&state.db, &notes)?),
    ))
}

/// Like, dislike or clear a rating on a note.
///
/// Runs on the blocking pool: the engine sleeps between retry attempts.
///
/// # Errors
/// Returns an error for malformed requests, missing notes, or when the
/// update could not be committed.
pub async fn rate_note(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
    Json(request): Json<RatingRequest>,
) -> Result<Json<RatingOutcome>, HttpError> {
    let db = state.db.clone();
    let engine = state.ratings;
    let user_id = current.user.id;
    let outcome = tokio::task::spawn_blocking(move || engine.rate(&db, &user_id, &id, &request))
        .await
        .map_err(|err| {
            tracing::error!("Rating task failed: {}", err);
            AppError::Internal
        })??;
    Ok(Json(outcome))
}

/// List the caller's own notes.
///
/// # Errors
/// Returns an error for malformed cursors or storage failures.
pub async fn list_own_notes(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(params): Query<NoteSearchParams>,
) -> Result<Json<NotePage>, HttpError> {
    Ok(Json(listing::own_notes(&state.db, &current.user.id, &params)?))
}

/// List the notes the caller currently likes.
///
/// # Errors
/// Returns an error for malformed cursors or storage failures.
pub async fn list_liked_notes(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(params): Query<NoteSearchParams>,
) -> Result<Json<NotePage>, HttpError> {
    Ok(Json(listing::liked_notes(&state.db, &current.user, &params)?))
}

/// Edit metadata of one of the caller's notes.
///
/// # Errors
/// Returns an error if the note is not the caller's, the edit collides with
/// another of their notes, or storage fails.
pub async fn update_own_note(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
    Json(request): Json<UpdateNoteRequest>,
) -> Result<Json<NoteDisplay>, HttpError> {
    let updated = state
        .db
        .notes
        .update_metadata(&id, &current.user.id, &request)?
        .ok_or(AppError::NotFound)?;
    listing::display_notes(&state.db, std::slice::from_ref(&updated))?
        .pop()
        .map(Json)
        .ok_or_else(|| AppError::Internal.into())
}

/// Delete one of the caller's notes and its stored file.
///
/// # Errors
/// Returns an error if the note is not the caller's or the row delete fails.
pub async fn delete_own_note(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, HttpError> {
    uploads::delete_owned_note(&state.db, state.blobs.as_ref(), &current.user.id, &id).await?;
    Ok(super::success())
}

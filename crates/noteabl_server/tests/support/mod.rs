//! Shared integration-test server bootstrap helpers.

use axum::http::{header, HeaderName, HeaderValue};
use axum_test::multipart::{MultipartForm, Part};
use axum_test::TestServer;
use noteabl_server::accounts::hash_password;
use noteabl_server::models::note::{CourseMetadata, Note};
use noteabl_server::models::user::User;
use noteabl_server::{create_app, AppState, BlobStore, Config, Database, MemoryBlobStore};
use std::sync::Arc;
use tempfile::TempDir;

pub(crate) const TEST_PASSWORD: &str = "Sup3r-secret!";

pub(crate) struct TestApp {
    pub server: TestServer,
    pub db: Arc<Database>,
    pub blobs: Arc<MemoryBlobStore>,
    _temp: TempDir,
}

pub(crate) fn setup_test_app() -> TestApp {
    setup_test_app_with(|_| {})
}

pub(crate) fn setup_test_app_with(configure: impl FnOnce(&mut Config)) -> TestApp {
    let temp = TempDir::new().expect("temp dir");
    let mut config = Config::for_data_dir(temp.path());
    configure(&mut config);

    let db = Database::new(&config.db_path).expect("open db");
    let blobs = Arc::new(MemoryBlobStore::new());
    let state = AppState::new(config, db, blobs.clone() as Arc<dyn BlobStore>);
    let db = state.db.clone();
    let server = TestServer::new(create_app(state, false)).expect("server");
    TestApp {
        server,
        db,
        blobs,
        _temp: temp,
    }
}

/// A verified user with an open session.
pub(crate) fn signed_in_user(db: &Database, name: &str) -> (User, String) {
    let email = format!("{}@example.com", name.to_lowercase());
    let password_hash = hash_password(TEST_PASSWORD).expect("hash password");
    let mut user = User::new(name, &email, password_hash);
    user.is_verified = true;
    db.users.create(&user).expect("create user");
    let token = db.sessions.create(&user.id).expect("session");
    (user, token)
}

pub(crate) fn bearer(token: &str) -> (HeaderName, HeaderValue) {
    (
        header::AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", token)).expect("header value"),
    )
}

pub(crate) fn pdf_bytes(marker: &str) -> Vec<u8> {
    format!("%PDF-1.7\n% {}\n%%EOF\n", marker).into_bytes()
}

pub(crate) fn pdf_part(file_name: &str) -> Part {
    Part::bytes(pdf_bytes(file_name))
        .file_name(file_name)
        .mime_type("application/pdf")
}

pub(crate) fn upload_form(
    course_code: &str,
    academic_year: &str,
    file_names: &[&str],
) -> MultipartForm {
    file_names.iter().fold(
        MultipartForm::new()
            .add_text("courseCode", course_code)
            .add_text("academicYear", academic_year),
        |form, name| form.add_part("files", pdf_part(name)),
    )
}

/// Insert a note row directly, bypassing the upload flow.
pub(crate) fn seed_note(db: &Database, owner: &User, title: &str) -> Note {
    let note = Note::new(
        &owner.id,
        title,
        &CourseMetadata::new("CS101", "2024", None, false),
    );
    db.notes.create(&note).expect("create note");
    note
}

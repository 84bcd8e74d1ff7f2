use super::note::*;
use super::user::*;

fn sample_metadata() -> CourseMetadata {
    CourseMetadata::new("  cs101 ", " 2024-2025 ", Some("  "), false)
}

#[test]
fn course_metadata_normalizes_case_and_blank_instructor() {
    let metadata = sample_metadata();
    assert_eq!(metadata.course_code, "CS101");
    assert_eq!(metadata.academic_year, "2024-2025");
    assert_eq!(metadata.instructor, None);
}

#[test]
fn new_note_uses_distinct_identity_and_storage_uuid() {
    let note = Note::new("user-1", " Week 1 ", &sample_metadata());
    assert_ne!(note.id, note.uuid);
    assert_eq!(note.title, "Week 1");
    assert_eq!(note.likes, 0);
    assert_eq!(note.dislikes, 0);
    assert_eq!(note.storage_key(), format!("notes/{}.pdf", note.uuid));
    assert_eq!(note.created_at.timestamp_subsec_nanos() % 1_000_000, 0);
}

#[test]
fn uniqueness_key_strips_control_characters_from_input() {
    let plain = Note::new("user-1", "Week 1", &sample_metadata());
    let sneaky = Note::new("user-1", "Week\u{1f} 1", &sample_metadata());
    assert_eq!(plain.uniqueness_key(), sneaky.uniqueness_key());
    assert!(!sneaky.title.contains('\u{1f}'));

    let other_year = Note::new(
        "user-1",
        "Week 1",
        &CourseMetadata::new("CS101", "2025-2026", None, false),
    );
    assert_ne!(plain.uniqueness_key(), other_year.uniqueness_key());
}

#[test]
fn apply_update_clears_instructor_on_explicit_blank() {
    let mut note = Note::new(
        "user-1",
        "Week 1",
        &CourseMetadata::new("cs101", "2024", Some("Dr. Ada"), false),
    );
    note.apply_update(&UpdateNoteRequest {
        course_code: Some("math200".to_string()),
        instructor: Some("   ".to_string()),
        ..UpdateNoteRequest::default()
    });
    assert_eq!(note.course_code, "MATH200");
    assert_eq!(note.instructor, None);
    assert_eq!(note.title, "Week 1");
}

#[test]
fn display_redacts_author_name_but_keeps_id_for_anonymous_notes() {
    let mut note = Note::new("user-1", "Week 1", &sample_metadata());
    let author = AuthorSummary {
        id: "user-1".to_string(),
        name: "Ada".to_string(),
    };

    let visible = NoteDisplay::from_note(&note, author.clone());
    assert_eq!(visible.author, author);

    note.is_anonymous = true;
    let redacted = NoteDisplay::from_note(&note, author);
    assert_eq!(redacted.author.id, "user-1");
    assert_eq!(redacted.author.name, crate::constants::ANONYMOUS_AUTHOR_NAME);
}

#[test]
fn record_view_moves_existing_entry_to_front_and_caps() {
    let mut user = User::new("Ada", "ada@example.com", String::new());
    for id in ["a", "b", "c"] {
        user.record_view(id, 3);
    }
    user.record_view("a", 3);
    assert_eq!(user.recently_viewed_notes, vec!["a", "c", "b"]);

    user.record_view("d", 3);
    assert_eq!(user.recently_viewed_notes, vec!["d", "a", "c"]);
}

#[test]
fn rating_state_reflects_membership() {
    let mut user = User::new("Ada", "ada@example.com", String::new());
    assert_eq!(user.rating_state("n1"), RatingState::Neutral);
    push_front_unique(&mut user.liked_notes, "n1");
    assert_eq!(user.rating_state("n1"), RatingState::Liked);
    assert!(remove_ref(&mut user.liked_notes, "n1"));
    assert!(!remove_ref(&mut user.liked_notes, "n1"));
    push_front_unique(&mut user.disliked_notes, "n1");
    assert_eq!(user.rating_state("n1"), RatingState::Disliked);
}

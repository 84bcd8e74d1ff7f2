//! Rating engine tests over a real database, including injected failures.

use super::*;
use crate::config::RatingConsistency;
use crate::db::failpoint::{FailpointGuard, RatingFailpoint};
use crate::models::user::RatingState;
use crate::rating::{RatingDelta, RatingEngine, RatingRequest};

const LIKE: RatingRequest = RatingRequest {
    likes: Some(RatingDelta::Add),
    dislikes: None,
};
const UNLIKE: RatingRequest = RatingRequest {
    likes: Some(RatingDelta::Remove),
    dislikes: None,
};
const SWITCH_TO_DISLIKE: RatingRequest = RatingRequest {
    likes: Some(RatingDelta::Remove),
    dislikes: Some(RatingDelta::Add),
};
const UNDISLIKE: RatingRequest = RatingRequest {
    likes: None,
    dislikes: Some(RatingDelta::Remove),
};

fn engines() -> [RatingEngine; 2] {
    [
        RatingEngine::new(RatingConsistency::Transactional, 3),
        RatingEngine::new(RatingConsistency::Compensating, 3),
    ]
}

/// Assert the note counters match the number of users holding each rating.
fn assert_counters_match_users(db: &Database, note_id: &str, users: &[&User]) {
    let note = db.notes.get(note_id).expect("get").expect("note");
    let mut likers = 0;
    let mut dislikers = 0;
    for user in users {
        let stored = db.users.get(&user.id).expect("get").expect("user");
        match stored.rating_state(note_id) {
            RatingState::Liked => likers += 1,
            RatingState::Disliked => dislikers += 1,
            RatingState::Neutral => {}
        }
    }
    assert_eq!((note.likes, note.dislikes), (likers, dislikers));
}

#[test]
fn like_is_idempotent_in_both_modes() {
    for engine in engines() {
        let (db, _temp) = setup_temp_db();
        let author = seed_user(&db, "Author");
        let rater = seed_user(&db, "Rater");
        let note = seed_note(&db, &author, "Rated");

        engine.rate(&db, &rater.id, &note.id, &LIKE).expect("like");
        let outcome = engine.rate(&db, &rater.id, &note.id, &LIKE).expect("like again");

        assert_eq!(outcome.likes, 1, "{:?}", engine.mode);
        assert_eq!(outcome.state, RatingState::Liked);
        assert_eq!(outcome.liked_notes, vec![note.id.clone()]);
        assert_eq!(outcome.liked_preview.len(), 1);
        assert_counters_match_users(&db, &note.id, &[&rater]);
    }
}

#[test]
fn switching_ratings_keeps_them_exclusive() {
    for engine in engines() {
        let (db, _temp) = setup_temp_db();
        let author = seed_user(&db, "Author");
        let rater = seed_user(&db, "Rater");
        let note = seed_note(&db, &author, "Rated");

        engine.rate(&db, &rater.id, &note.id, &LIKE).expect("like");
        let outcome = engine
            .rate(&db, &rater.id, &note.id, &SWITCH_TO_DISLIKE)
            .expect("switch");

        assert_eq!((outcome.likes, outcome.dislikes), (0, 1));
        assert_eq!(outcome.state, RatingState::Disliked);
        assert!(outcome.liked_notes.is_empty());
        assert!(outcome.liked_preview.is_empty());
        assert_eq!(outcome.disliked_notes, vec![note.id.clone()]);

        let stored = db.notes.get(&note.id).expect("get").expect("note");
        assert_eq!((stored.likes, stored.dislikes), (0, 1));
        assert_counters_match_users(&db, &note.id, &[&rater]);
    }
}

#[test]
fn removals_without_a_rating_are_noops() {
    for engine in engines() {
        let (db, _temp) = setup_temp_db();
        let author = seed_user(&db, "Author");
        let rater = seed_user(&db, "Rater");
        let note = seed_note(&db, &author, "Rated");

        let outcome = engine
            .rate(&db, &rater.id, &note.id, &UNDISLIKE)
            .expect("noop");
        assert_eq!((outcome.likes, outcome.dislikes), (0, 0));
        let outcome = engine.rate(&db, &rater.id, &note.id, &UNLIKE).expect("noop");
        assert_eq!(outcome.state, RatingState::Neutral);

        // A stale like on a note whose counter is already zero stays put.
        let mut drifted = db.users.get(&rater.id).expect("get").expect("user");
        drifted.liked_notes = vec![note.id.clone()];
        assert!(db.users.save_rating_sets(&drifted).expect("save sets"));

        let outcome = engine.rate(&db, &rater.id, &note.id, &UNLIKE).expect("noop");
        assert_eq!(outcome.likes, 0, "{:?}", engine.mode);
        assert_eq!(outcome.liked_notes, vec![note.id.clone()]);
        let stored = db.users.get(&rater.id).expect("get").expect("user");
        assert_eq!(stored.liked_notes, vec![note.id.clone()]);
        let stored_note = db.notes.get(&note.id).expect("get").expect("note");
        assert_eq!(stored_note.likes, 0);
    }
}

#[test]
fn missing_rows_and_bad_requests_are_reported() {
    let (db, _temp) = setup_temp_db();
    let author = seed_user(&db, "Author");
    let note = seed_note(&db, &author, "Rated");
    let engine = RatingEngine::new(RatingConsistency::Transactional, 3);

    assert!(matches!(
        engine.rate(&db, &author.id, "missing", &LIKE),
        Err(AppError::NotFound)
    ));
    assert!(matches!(
        engine.rate(&db, "ghost", &note.id, &LIKE),
        Err(AppError::NotFound)
    ));
    assert!(matches!(
        engine.rate(&db, &author.id, &note.id, &RatingRequest::default()),
        Err(AppError::BadRequest(_))
    ));
}

#[test]
fn likes_reindex_popularity_order() {
    let (db, _temp) = setup_temp_db();
    let author = seed_user(&db, "Author");
    let raters: Vec<User> = (0..2).map(|i| seed_user(&db, &format!("Rater {}", i))).collect();
    let quiet = seed_note(&db, &author, "Quiet");
    let popular = seed_note(&db, &author, "Popular");
    let engine = RatingEngine::new(RatingConsistency::Transactional, 3);

    for rater in &raters {
        engine.rate(&db, &rater.id, &popular.id, &LIKE).expect("like");
    }
    engine.rate(&db, &raters[0].id, &quiet.id, &LIKE).expect("like");

    let query = crate::search::build_query(&crate::search::NoteSearchParams {
        sort_by: Some("likes".to_string()),
        ..Default::default()
    })
    .expect("query");
    let ordered: Vec<(String, u64)> = db
        .notes
        .query(&query, 10)
        .expect("query")
        .into_iter()
        .map(|note| (note.id, note.likes))
        .collect();
    assert_eq!(ordered, vec![(popular.id, 2), (quiet.id, 1)]);
}

#[test]
fn transient_conflicts_are_retried() {
    let _lock = rating_failpoint_test_lock()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    let (db, _temp) = setup_temp_db();
    let author = seed_user(&db, "Author");
    let rater = seed_user(&db, "Rater");
    let note = seed_note(&db, &author, "Contended");
    let _failpoint = FailpointGuard::set(&note.id, RatingFailpoint::TransientConflicts(2));

    let engine = RatingEngine::new(RatingConsistency::Transactional, 3);
    let outcome = engine.rate(&db, &rater.id, &note.id, &LIKE).expect("third attempt");
    assert_eq!(outcome.likes, 1);
    assert_counters_match_users(&db, &note.id, &[&rater]);
}

#[test]
fn exhausted_retries_report_unavailable_and_change_nothing() {
    let _lock = rating_failpoint_test_lock()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    let (db, _temp) = setup_temp_db();
    let author = seed_user(&db, "Author");
    let rater = seed_user(&db, "Rater");
    let note = seed_note(&db, &author, "Contended");
    let _failpoint = FailpointGuard::set(&note.id, RatingFailpoint::AlwaysConflict);

    let engine = RatingEngine::new(RatingConsistency::Transactional, 4);
    assert!(matches!(
        engine.rate(&db, &rater.id, &note.id, &LIKE),
        Err(AppError::Unavailable(_))
    ));

    let stored = db.notes.get(&note.id).expect("get").expect("note");
    assert_eq!(stored.likes, 0);
    let rater = db.users.get(&rater.id).expect("get").expect("user");
    assert!(rater.liked_notes.is_empty());
}

#[test]
fn compensating_flow_restores_user_when_note_write_fails() {
    let _lock = rating_failpoint_test_lock()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    let (db, _temp) = setup_temp_db();
    let author = seed_user(&db, "Author");
    let rater = seed_user(&db, "Rater");
    let note = seed_note(&db, &author, "Fragile");
    let _failpoint = FailpointGuard::set(&note.id, RatingFailpoint::NoteWriteFails);

    let engine = RatingEngine::new(RatingConsistency::Compensating, 1);
    assert!(matches!(
        engine.rate(&db, &rater.id, &note.id, &LIKE),
        Err(AppError::Internal)
    ));

    let stored = db.users.get(&rater.id).expect("get").expect("user");
    assert!(stored.liked_notes.is_empty(), "user write was rolled back");
    assert_counters_match_users(&db, &note.id, &[&rater]);
}

#[test]
fn compensating_flow_failed_rollback_leaves_known_inconsistency() {
    let _lock = rating_failpoint_test_lock()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    let (db, _temp) = setup_temp_db();
    let author = seed_user(&db, "Author");
    let rater = seed_user(&db, "Rater");
    let note = seed_note(&db, &author, "Fragile");
    let _failpoint = FailpointGuard::set(&note.id, RatingFailpoint::NoteAndRestoreWritesFail);

    let engine = RatingEngine::new(RatingConsistency::Compensating, 1);
    assert!(engine.rate(&db, &rater.id, &note.id, &LIKE).is_err());

    // The user's like persisted while the counter did not.
    let stored_user = db.users.get(&rater.id).expect("get").expect("user");
    let stored_note = db.notes.get(&note.id).expect("get").expect("note");
    assert_eq!(stored_user.liked_notes, vec![note.id.clone()]);
    assert_eq!(stored_note.likes, 0);
}

#[test]
fn transactional_mode_is_unaffected_by_compensating_failpoints() {
    let _lock = rating_failpoint_test_lock()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    let (db, _temp) = setup_temp_db();
    let author = seed_user(&db, "Author");
    let rater = seed_user(&db, "Rater");
    let note = seed_note(&db, &author, "Sturdy");
    let _failpoint = FailpointGuard::set(&note.id, RatingFailpoint::NoteWriteFails);

    let engine = RatingEngine::new(RatingConsistency::Transactional, 1);
    let outcome = engine.rate(&db, &rater.id, &note.id, &LIKE).expect("like");
    assert_eq!(outcome.likes, 1);
}

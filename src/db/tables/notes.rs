//! Note records and the conflict-aware update protocol.
//!
//! Every note carries two forms of the same store-assigned concurrency
//! marker: a `revision` counter and an `updated_at` timestamp. Both advance
//! strictly on every successful write. An update request must present the
//! marker the caller last observed; the write is a single conditional
//! UPDATE keyed on that marker, so two callers believing the same marker can
//! never both win — the loser gets the persisted state back to reconcile.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::super::Database;
use crate::error::ServiceError;
use crate::models::{AttemptedChanges, Note, UpdateOutcome};

/// The marker a caller believes to be current. Clients may track either
/// contract; the counter has no tie window and is preferred.
#[derive(Debug, Clone)]
pub enum BelievedMarker {
    Revision(i64),
    UpdatedAt(String),
}

/// Canonical marker format: RFC3339 UTC at microsecond resolution. Markers
/// are compared as exact strings, so all writes go through this one format.
fn fmt_marker(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Compute the next `updated_at` marker: wall-clock time, bumped past the
/// previous marker when the clock has not advanced a full microsecond —
/// successive writes to one note must never produce equal markers.
fn next_marker(prev: &str) -> String {
    let now = Utc::now();
    match DateTime::parse_from_rfc3339(prev) {
        Ok(p) => {
            let prev_utc = p.with_timezone(&Utc);
            if now > prev_utc {
                fmt_marker(now)
            } else {
                fmt_marker(prev_utc + Duration::microseconds(1))
            }
        }
        Err(_) => fmt_marker(now),
    }
}

impl Database {
    /// Create a note. The store assigns id, revision 1, and both timestamps.
    pub fn insert_note(
        &self,
        owner_id: i64,
        title: &str,
        content: &str,
    ) -> Result<Note, ServiceError> {
        let conn = self.conn.lock().unwrap();
        let now = fmt_marker(Utc::now());

        conn.execute(
            "INSERT INTO notes (title, content, owner_id, revision, created_at, updated_at)
             VALUES (?1, ?2, ?3, 1, ?4, ?4)",
            params![title, content, owner_id, now],
        )?;

        Ok(Note {
            id: conn.last_insert_rowid(),
            title: title.to_string(),
            content: content.to_string(),
            owner_id,
            revision: 1,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Fetch a note scoped to its owner. A note that exists but belongs to
    /// someone else is indistinguishable from one that doesn't exist.
    pub fn find_note(&self, id: i64, owner_id: i64) -> Result<Option<Note>, ServiceError> {
        let conn = self.conn.lock().unwrap();
        Ok(Self::query_note(&conn, id, owner_id)?)
    }

    /// All notes owned by the caller, most recently updated first.
    pub fn list_notes(&self, owner_id: i64) -> Result<Vec<Note>, ServiceError> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(
            "SELECT id, title, content, owner_id, revision, created_at, updated_at
             FROM notes WHERE owner_id = ?1 ORDER BY updated_at DESC",
        )?;

        let notes = stmt
            .query_map([owner_id], Self::row_to_note)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(notes)
    }

    /// Conditionally apply an update: write the new title/content only if the
    /// caller's believed marker still matches the stored one.
    ///
    /// The write is a single UPDATE keyed on (id, owner, marker) — an atomic
    /// compare-and-swap at the storage layer, never a read followed by an
    /// unconditional write. On a marker mismatch nothing is written and the
    /// caller receives the persisted note plus their rejected changes; they
    /// must re-fetch, re-decide, and resubmit with a fresh marker. The new
    /// marker is computed by the store and returned as part of the outcome.
    pub fn compare_and_update(
        &self,
        id: i64,
        owner_id: i64,
        believed: &BelievedMarker,
        title: &str,
        content: &str,
    ) -> Result<UpdateOutcome, ServiceError> {
        let conn = self.conn.lock().unwrap();

        let current = Self::query_note(&conn, id, owner_id)?.ok_or(ServiceError::NotFound)?;

        let new_revision = current.revision + 1;
        let new_updated_at = next_marker(&current.updated_at);

        let rows = match believed {
            BelievedMarker::Revision(revision) => conn.execute(
                "UPDATE notes SET title = ?1, content = ?2, revision = ?3, updated_at = ?4
                 WHERE id = ?5 AND owner_id = ?6 AND revision = ?7",
                params![title, content, new_revision, new_updated_at, id, owner_id, revision],
            )?,
            BelievedMarker::UpdatedAt(updated_at) => conn.execute(
                "UPDATE notes SET title = ?1, content = ?2, revision = ?3, updated_at = ?4
                 WHERE id = ?5 AND owner_id = ?6 AND updated_at = ?7",
                params![title, content, new_revision, new_updated_at, id, owner_id, updated_at],
            )?,
        };

        if rows == 0 {
            return Ok(UpdateOutcome::Rejected {
                current,
                attempted: AttemptedChanges {
                    title: title.to_string(),
                    content: content.to_string(),
                },
            });
        }

        Ok(UpdateOutcome::Applied(Note {
            id,
            title: title.to_string(),
            content: content.to_string(),
            owner_id,
            revision: new_revision,
            created_at: current.created_at,
            updated_at: new_updated_at,
        }))
    }

    /// Delete a note, owner-scoped. Deletion carries no concurrency check —
    /// a delete always wins regardless of the caller's belief about note
    /// state. Terminal and irreversible.
    pub fn delete_note(&self, id: i64, owner_id: i64) -> Result<(), ServiceError> {
        let conn = self.conn.lock().unwrap();

        let rows = conn.execute(
            "DELETE FROM notes WHERE id = ?1 AND owner_id = ?2",
            params![id, owner_id],
        )?;

        if rows == 0 {
            return Err(ServiceError::NotFound);
        }
        Ok(())
    }

    fn query_note(
        conn: &Connection,
        id: i64,
        owner_id: i64,
    ) -> rusqlite::Result<Option<Note>> {
        conn.query_row(
            "SELECT id, title, content, owner_id, revision, created_at, updated_at
             FROM notes WHERE id = ?1 AND owner_id = ?2",
            params![id, owner_id],
            Self::row_to_note,
        )
        .optional()
    }

    fn row_to_note(row: &rusqlite::Row) -> rusqlite::Result<Note> {
        Ok(Note {
            id: row.get(0)?,
            title: row.get(1)?,
            content: row.get(2)?,
            owner_id: row.get(3)?,
            revision: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn test_db() -> (tempfile::TempDir, Database) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::new(db_path.to_str().unwrap()).expect("Failed to create database");
        (dir, db)
    }

    fn seed_user(db: &Database, name: &str) -> i64 {
        db.insert_user(name, "irrelevant-hash").unwrap().id
    }

    fn applied(outcome: UpdateOutcome) -> Note {
        match outcome {
            UpdateOutcome::Applied(note) => note,
            UpdateOutcome::Rejected { .. } => panic!("expected Applied, got Rejected"),
        }
    }

    #[test]
    fn create_assigns_marker_and_equal_timestamps() {
        let (_dir, db) = test_db();
        let owner = seed_user(&db, "alice");

        let note = db.insert_note(owner, "A", "x").unwrap();
        assert_eq!(note.revision, 1);
        assert_eq!(note.created_at, note.updated_at);
    }

    #[test]
    fn fresh_marker_applies_and_advances() {
        let (_dir, db) = test_db();
        let owner = seed_user(&db, "alice");

        let note = db.insert_note(owner, "A", "x").unwrap();
        let updated = applied(
            db.compare_and_update(note.id, owner, &BelievedMarker::Revision(1), "A", "y")
                .unwrap(),
        );

        assert_eq!(updated.revision, 2);
        assert_eq!(updated.content, "y");
        assert!(updated.updated_at > note.updated_at);
        assert_eq!(updated.created_at, note.created_at);
    }

    #[test]
    fn stale_timestamp_marker_is_rejected_with_current_state() {
        let (_dir, db) = test_db();
        let owner = seed_user(&db, "alice");

        // create {A, x} at t0, update with believed t0 -> t1, resubmit t0
        let note = db.insert_note(owner, "A", "x").unwrap();
        let t0 = note.updated_at.clone();

        let first = applied(
            db.compare_and_update(
                note.id,
                owner,
                &BelievedMarker::UpdatedAt(t0.clone()),
                "A",
                "y",
            )
            .unwrap(),
        );
        assert!(first.updated_at > t0);

        let outcome = db
            .compare_and_update(note.id, owner, &BelievedMarker::UpdatedAt(t0), "A", "z")
            .unwrap();

        match outcome {
            UpdateOutcome::Rejected { current, attempted } => {
                assert_eq!(current.content, "y");
                assert_eq!(current.updated_at, first.updated_at);
                assert_eq!(attempted.content, "z");
            }
            UpdateOutcome::Applied(_) => panic!("stale marker must not apply"),
        }
    }

    #[test]
    fn stale_revision_marker_is_rejected() {
        let (_dir, db) = test_db();
        let owner = seed_user(&db, "alice");

        let note = db.insert_note(owner, "A", "x").unwrap();
        applied(
            db.compare_and_update(note.id, owner, &BelievedMarker::Revision(1), "A", "y")
                .unwrap(),
        );

        let outcome = db
            .compare_and_update(note.id, owner, &BelievedMarker::Revision(1), "A", "z")
            .unwrap();
        assert!(matches!(outcome, UpdateOutcome::Rejected { .. }));
    }

    #[test]
    fn refreshed_marker_always_applies_again() {
        // identical payloads are fine as long as the marker is fresh
        let (_dir, db) = test_db();
        let owner = seed_user(&db, "alice");

        let note = db.insert_note(owner, "A", "x").unwrap();
        let first = applied(
            db.compare_and_update(note.id, owner, &BelievedMarker::Revision(1), "B", "same")
                .unwrap(),
        );
        let second = applied(
            db.compare_and_update(
                note.id,
                owner,
                &BelievedMarker::Revision(first.revision),
                "B",
                "same",
            )
            .unwrap(),
        );
        assert_eq!(second.revision, 3);
    }

    #[test]
    fn markers_strictly_increase_under_rapid_updates() {
        let (_dir, db) = test_db();
        let owner = seed_user(&db, "alice");

        let mut note = db.insert_note(owner, "A", "v0").unwrap();
        for i in 1..=20 {
            let prev_marker = note.updated_at.clone();
            let prev_revision = note.revision;
            note = applied(
                db.compare_and_update(
                    note.id,
                    owner,
                    &BelievedMarker::Revision(prev_revision),
                    "A",
                    &format!("v{}", i),
                )
                .unwrap(),
            );
            assert!(note.updated_at > prev_marker);
            assert_eq!(note.revision, prev_revision + 1);
        }
    }

    #[test]
    fn update_unknown_note_is_not_found() {
        let (_dir, db) = test_db();
        let owner = seed_user(&db, "alice");

        let err = db
            .compare_and_update(999, owner, &BelievedMarker::Revision(1), "A", "x")
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound));
    }

    #[test]
    fn cross_user_access_is_not_found() {
        let (_dir, db) = test_db();
        let alice = seed_user(&db, "alice");
        let bob = seed_user(&db, "bob");

        let note = db.insert_note(alice, "private", "secret").unwrap();

        assert!(db.find_note(note.id, bob).unwrap().is_none());
        assert!(matches!(
            db.compare_and_update(note.id, bob, &BelievedMarker::Revision(1), "t", "c")
                .unwrap_err(),
            ServiceError::NotFound
        ));
        assert!(matches!(
            db.delete_note(note.id, bob).unwrap_err(),
            ServiceError::NotFound
        ));

        // the owner still sees it untouched
        let still = db.find_note(note.id, alice).unwrap().unwrap();
        assert_eq!(still.content, "secret");
    }

    #[test]
    fn list_orders_by_most_recently_updated() {
        let (_dir, db) = test_db();
        let owner = seed_user(&db, "alice");

        let a = db.insert_note(owner, "a", "1").unwrap();
        let _b = db.insert_note(owner, "b", "2").unwrap();
        let _c = db.insert_note(owner, "c", "3").unwrap();

        // touching the oldest note moves it to the front
        applied(
            db.compare_and_update(a.id, owner, &BelievedMarker::Revision(1), "a", "1'")
                .unwrap(),
        );

        let notes = db.list_notes(owner).unwrap();
        assert_eq!(notes.len(), 3);
        assert_eq!(notes[0].id, a.id);
    }

    #[test]
    fn delete_twice_is_not_found() {
        let (_dir, db) = test_db();
        let owner = seed_user(&db, "alice");

        let note = db.insert_note(owner, "A", "x").unwrap();
        db.delete_note(note.id, owner).unwrap();

        assert!(matches!(
            db.delete_note(note.id, owner).unwrap_err(),
            ServiceError::NotFound
        ));
        assert!(matches!(
            db.delete_note(12345, owner).unwrap_err(),
            ServiceError::NotFound
        ));
    }

    #[test]
    fn delete_ignores_staleness_by_design() {
        // Deletes carry no marker check: a delete always wins, even when the
        // caller's view of the note is stale. Intentional policy, not a bug.
        let (_dir, db) = test_db();
        let owner = seed_user(&db, "alice");

        let note = db.insert_note(owner, "A", "x").unwrap();
        applied(
            db.compare_and_update(note.id, owner, &BelievedMarker::Revision(1), "A", "y")
                .unwrap(),
        );

        db.delete_note(note.id, owner).unwrap();
        assert!(db.find_note(note.id, owner).unwrap().is_none());
    }

    #[test]
    fn concurrent_updates_with_same_marker_admit_one_winner() {
        let (_dir, db) = test_db();
        let db = Arc::new(db);
        let owner = seed_user(&db, "alice");
        let note = db.insert_note(owner, "A", "x").unwrap();

        let handles: Vec<_> = (0..2)
            .map(|i| {
                let db = Arc::clone(&db);
                let note_id = note.id;
                std::thread::spawn(move || {
                    db.compare_and_update(
                        note_id,
                        owner,
                        &BelievedMarker::Revision(1),
                        "A",
                        &format!("writer-{}", i),
                    )
                    .unwrap()
                })
            })
            .collect();

        let outcomes: Vec<UpdateOutcome> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();

        let wins = outcomes
            .iter()
            .filter(|o| matches!(o, UpdateOutcome::Applied(_)))
            .count();
        assert_eq!(wins, 1);

        // the loser saw the winner's persisted state
        for outcome in &outcomes {
            if let UpdateOutcome::Rejected { current, .. } = outcome {
                assert_eq!(current.revision, 2);
                assert!(current.content.starts_with("writer-"));
            }
        }
    }
}

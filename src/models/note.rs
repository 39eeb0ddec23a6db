use serde::{Deserialize, Serialize};

/// A note record. Timestamps are opaque RFC3339 strings assigned by the
/// store; `updated_at` doubles as the concurrency marker and is passed back
/// to clients verbatim so exact-equality comparison stays byte-stable.
/// `revision` is the counter form of the same marker.
#[derive(Debug, Clone, Serialize)]
pub struct Note {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub owner_id: i64,
    pub revision: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateNoteRequest {
    pub title: String,
    pub content: String,
}

/// A note update carries the caller's believed concurrency marker alongside
/// the proposed changes — either the revision counter or the `updated_at`
/// value they last observed. At least one must be present.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateNoteRequest {
    pub title: String,
    pub content: String,
    pub revision: Option<i64>,
    pub updated_at: Option<String>,
}

/// The proposed changes a conflicting update tried to apply, echoed back so
/// the client can offer a manual merge.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptedChanges {
    pub title: String,
    pub content: String,
}

/// Outcome of a conditional note update. Kept separate from the error
/// channel: a rejection is an expected, user-recoverable result that carries
/// the full reconciliation payload, not a failure.
#[derive(Debug)]
pub enum UpdateOutcome {
    /// The marker matched; the store applied the changes and assigned a new
    /// marker, returned here as a first-class value.
    Applied(Note),
    /// The marker was stale. Nothing was written. `current` is the persisted
    /// note the caller must reconcile against.
    Rejected {
        current: Note,
        attempted: AttemptedChanges,
    },
}

/// 409 response body for a rejected update.
#[derive(Debug, Serialize)]
pub struct ConflictResponse {
    pub error: String,
    pub message: String,
    pub current_note: Note,
    pub your_changes: AttemptedChanges,
}

impl ConflictResponse {
    pub fn new(current: Note, attempted: AttemptedChanges) -> Self {
        Self {
            error: "conflict".to_string(),
            message: "Note has been updated by another user. Please resolve conflicts.".to_string(),
            current_note: current,
            your_changes: attempted,
        }
    }
}

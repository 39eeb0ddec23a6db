//! Service error taxonomy.
//!
//! Every request either succeeds or fails with exactly one of these kinds —
//! nothing is retried internally. Marker conflicts are NOT an error: the
//! update protocol returns a tagged [`crate::models::UpdateOutcome`] so the
//! conflict path stays statically separate from the failure channel.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Registration with a username that already exists (case-sensitive).
    #[error("username already exists")]
    DuplicateUsername,

    /// Unknown username or wrong password — the two are indistinguishable
    /// so callers cannot enumerate usernames.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Missing, malformed, tampered, or expired session token.
    #[error("invalid token")]
    InvalidToken,

    /// Note absent, or owned by someone else — indistinguishable.
    #[error("note not found")]
    NotFound,

    /// Malformed input (empty title, missing concurrency marker, ...).
    #[error("{0}")]
    Validation(String),

    /// Unexpected storage failure. Detail is logged, never sent to clients.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Password hashing backend failure.
    #[error("password hashing error: {0}")]
    Hash(String),
}

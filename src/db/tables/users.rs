//! User identity records.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use super::super::Database;
use crate::error::ServiceError;
use crate::models::User;

impl Database {
    /// Persist a new identity record. Username uniqueness is enforced by the
    /// store itself, so of N concurrent identical registrations at most one
    /// insert can win; the rest surface as `DuplicateUsername`.
    pub fn insert_user(&self, username: &str, password_hash: &str) -> Result<User, ServiceError> {
        let conn = self.conn.lock().unwrap();
        let created_at = Utc::now();

        let result = conn.execute(
            "INSERT INTO users (username, password_hash, created_at) VALUES (?1, ?2, ?3)",
            params![username, password_hash, created_at.to_rfc3339()],
        );

        match result {
            Ok(_) => Ok(User {
                id: conn.last_insert_rowid(),
                username: username.to_string(),
                password_hash: password_hash.to_string(),
                created_at,
            }),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(ServiceError::DuplicateUsername)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Look up a user by exact (case-sensitive) username.
    pub fn find_user_by_username(&self, username: &str) -> Result<Option<User>, ServiceError> {
        let conn = self.conn.lock().unwrap();

        let user = conn
            .query_row(
                "SELECT id, username, password_hash, created_at FROM users WHERE username = ?1",
                [username],
                |row| {
                    let created_at_str: String = row.get(3)?;
                    Ok(User {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        password_hash: row.get(2)?,
                        created_at: DateTime::parse_from_rfc3339(&created_at_str)
                            .unwrap()
                            .with_timezone(&Utc),
                    })
                },
            )
            .optional()?;

        Ok(user)
    }
}

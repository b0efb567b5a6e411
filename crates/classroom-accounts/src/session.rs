//! Login sessions keyed by an opaque random token.
//!
//! Only the SHA-256 digest of a token is stored. Sessions older than the
//! caller's time-to-live are treated as ended and removed on sight or by
//! [`prune_sessions`].

use classroom_types::Role;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::AccountError;

/// `last_seen` is written at most once per this many seconds per user.
const LAST_SEEN_RESOLUTION_SECS: u64 = 60;

/// The identity attached to an authenticated request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: i64,
    pub username: String,
    pub role: Role,
}

fn token_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// SQLite `datetime` modifier for `secs` seconds ago.
fn seconds_ago(secs: u64) -> String {
    format!("-{secs} seconds")
}

/// Opens a session for `user_id` and returns its token.
pub fn create_session(conn: &Connection, user_id: i64) -> Result<String, AccountError> {
    let token = uuid::Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO sessions (token_hash, user_id) VALUES (?1, ?2)",
        params![token_digest(&token), user_id],
    )?;
    tracing::debug!(user_id, "session created");
    Ok(token)
}

/// Resolves a session token to its user.
///
/// Returns `None` for unknown or ended sessions, and for sessions older
/// than `ttl_secs` (which are deleted). A `ttl_secs` of 0 disables expiry.
/// The user's `last_seen` is refreshed when it is more than a minute old.
pub fn session_user(
    conn: &Connection,
    token: &str,
    ttl_secs: u64,
) -> Result<Option<SessionUser>, AccountError> {
    let digest = token_digest(token);
    let found = conn
        .query_row(
            "SELECT u.id, u.username, u.role,
                    ?2 > 0 AND s.created_at <= datetime('now', ?3)
             FROM sessions s JOIN users u ON u.id = s.user_id
             WHERE s.token_hash = ?1",
            params![digest, ttl_secs, seconds_ago(ttl_secs)],
            |row| {
                let user = SessionUser {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    role: row.get(2)?,
                };
                Ok((user, row.get::<_, bool>(3)?))
            },
        )
        .optional()?;

    let Some((user, expired)) = found else {
        return Ok(None);
    };
    if expired {
        conn.execute("DELETE FROM sessions WHERE token_hash = ?1", [&digest])?;
        tracing::debug!(user_id = user.id, "session expired");
        return Ok(None);
    }

    conn.execute(
        "UPDATE users SET last_seen = datetime('now')
         WHERE id = ?1 AND last_seen <= datetime('now', ?2)",
        params![user.id, seconds_ago(LAST_SEEN_RESOLUTION_SECS)],
    )?;
    Ok(Some(user))
}

/// Ends a session. Unknown tokens are ignored.
pub fn end_session(conn: &Connection, token: &str) -> Result<(), AccountError> {
    conn.execute(
        "DELETE FROM sessions WHERE token_hash = ?1",
        [token_digest(token)],
    )?;
    Ok(())
}

/// Ends every session of `user_id`. Returns how many were open.
pub fn end_user_sessions(conn: &Connection, user_id: i64) -> Result<usize, AccountError> {
    Ok(conn.execute("DELETE FROM sessions WHERE user_id = ?1", [user_id])?)
}

/// Deletes sessions older than `ttl_secs`. Returns how many were removed.
pub fn prune_sessions(conn: &Connection, ttl_secs: u64) -> Result<usize, AccountError> {
    if ttl_secs == 0 {
        return Ok(0);
    }
    Ok(conn.execute(
        "DELETE FROM sessions WHERE created_at <= datetime('now', ?1)",
        [seconds_ago(ttl_secs)],
    )?)
}

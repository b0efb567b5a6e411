//! User accounts for the classroom applications.
//!
//! Implements registration with Argon2 password hashes, credential checks,
//! token-based login sessions, default-admin seeding and the admin user
//! management operations. Every app with accounts shares the `users` and
//! `sessions` tables created by the `000_accounts` migration; which roles an
//! app accepts is decided by the caller (see
//! [`classroom_types::AppKind::roles`]).

mod password;
mod session;

pub use password::{hash_password, verify_password};
pub use session::{
    create_session, end_session, end_user_sessions, prune_sessions, session_user, SessionUser,
};

use classroom_db::{is_unique_violation, UpdateSet};
use classroom_types::Role;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during account operations.
#[derive(Debug, Error)]
pub enum AccountError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("{0}")]
    Validation(String),
    #[error("username or email already exists")]
    AlreadyExists,
    #[error("user not found: {0}")]
    NotFound(i64),
    #[error("password hashing failed: {0}")]
    PasswordHash(String),
}

/// A user account as exposed to clients. The password hash never leaves
/// this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    pub role: Role,
    pub bio: Option<String>,
    pub reputation: i64,
    pub created_at: String,
    pub last_seen: String,
}

/// Registration input.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewUser {
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    pub password: String,
}

/// Admin edits to an existing account. Unset fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserUpdate {
    pub role: Option<Role>,
    pub password: Option<String>,
    pub bio: Option<String>,
}

const USER_COLUMNS: &str =
    "id, username, email, role, bio, reputation, created_at, last_seen";

fn map_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        role: row.get(3)?,
        bio: row.get(4)?,
        reputation: row.get(5)?,
        created_at: row.get(6)?,
        last_seen: row.get(7)?,
    })
}

/// Creates an account with `role`.
///
/// Username and email are trimmed; a blank email is stored as `NULL`.
/// Duplicate usernames or emails are rejected with
/// [`AccountError::AlreadyExists`] and no row is written.
pub fn register(conn: &Connection, new: &NewUser, role: Role) -> Result<User, AccountError> {
    let username = new.username.trim();
    if username.is_empty() || new.password.is_empty() {
        return Err(AccountError::Validation(
            "username and password are required".to_string(),
        ));
    }
    let email = new
        .email
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty());

    let password_hash = hash_password(&new.password)?;
    let inserted = conn.execute(
        "INSERT INTO users (username, email, password_hash, role) VALUES (?1, ?2, ?3, ?4)",
        params![username, email, password_hash, role],
    );
    match inserted {
        Ok(_) => {}
        Err(e) if is_unique_violation(&e) => return Err(AccountError::AlreadyExists),
        Err(e) => return Err(e.into()),
    }

    let id = conn.last_insert_rowid();
    tracing::info!(user_id = id, username, role = %role, "user registered");
    get_user(conn, id)
}

/// Checks credentials. Returns `None` for an unknown username or a wrong
/// password.
pub fn authenticate(
    conn: &Connection,
    username: &str,
    password: &str,
) -> Result<Option<User>, AccountError> {
    let found = conn
        .query_row(
            "SELECT id, password_hash FROM users WHERE username = ?1",
            [username.trim()],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
        )
        .optional()?;

    match found {
        Some((id, stored)) if verify_password(password, &stored) => get_user(conn, id).map(Some),
        _ => Ok(None),
    }
}

/// Inserts the default admin account unless a user with `username` already
/// exists. Returns whether an account was created.
pub fn ensure_admin(
    conn: &Connection,
    username: &str,
    email: &str,
    password: &str,
) -> Result<bool, AccountError> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE username = ?1)",
        [username],
        |row| row.get(0),
    )?;
    if exists {
        return Ok(false);
    }
    let new = NewUser {
        username: username.to_string(),
        email: Some(email.to_string()),
        password: password.to_string(),
    };
    register(conn, &new, Role::Admin)?;
    tracing::info!(username, "seeded default admin account");
    Ok(true)
}

/// Lists every account, ordered by username.
pub fn list_users(conn: &Connection) -> Result<Vec<User>, AccountError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {USER_COLUMNS} FROM users ORDER BY username"
    ))?;
    let rows = stmt.query_map([], map_user)?;
    let mut users = Vec::new();
    for row in rows {
        users.push(row?);
    }
    Ok(users)
}

/// Fetches one account.
pub fn get_user(conn: &Connection, id: i64) -> Result<User, AccountError> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
        [id],
        map_user,
    )
    .optional()?
    .ok_or(AccountError::NotFound(id))
}

pub fn find_by_username(conn: &Connection, username: &str) -> Result<Option<User>, AccountError> {
    let user = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
            [username.trim()],
            map_user,
        )
        .optional()?;
    Ok(user)
}

/// Applies an admin edit. A new password is re-hashed with a fresh salt.
///
/// Changing the password or the role ends every open session of the user.
pub fn update_user(conn: &Connection, id: i64, update: &UserUpdate) -> Result<User, AccountError> {
    let password_hash = match update.password.as_deref() {
        Some("") => {
            return Err(AccountError::Validation("password must not be empty".to_string()))
        }
        Some(password) => Some(hash_password(password)?),
        None => None,
    };
    let credentials_changed = update.role.is_some() || password_hash.is_some();

    let changed = UpdateSet::new("users")
        .set_opt("role", update.role)
        .set_opt("password_hash", password_hash)
        .set_opt("bio", update.bio.clone())
        .execute(conn, id, &[])?;

    if changed == Some(0) {
        return Err(AccountError::NotFound(id));
    }
    if credentials_changed {
        let ended = end_user_sessions(conn, id)?;
        if ended > 0 {
            tracing::info!(user_id = id, sessions = ended, "ended sessions after credential change");
        }
    }
    get_user(conn, id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use classroom_types::AppKind;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        classroom_db::run_migrations(&conn, AppKind::Helpdesk).unwrap();
        conn
    }

    fn user_count(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .unwrap()
    }

    fn new_user(username: &str, email: &str) -> NewUser {
        NewUser {
            username: username.to_string(),
            email: Some(email.to_string()),
            password: "secret".to_string(),
        }
    }

    #[test]
    fn register_trims_and_hides_hash() {
        let conn = setup();
        let user = register(&conn, &new_user("  ann ", " ann@example.com "), Role::Customer)
            .unwrap();
        assert_eq!(user.username, "ann");
        assert_eq!(user.email.as_deref(), Some("ann@example.com"));
        assert_eq!(user.role, Role::Customer);
    }

    #[test]
    fn duplicate_username_or_email_leaves_row_count_unchanged() {
        let conn = setup();
        register(&conn, &new_user("ann", "ann@example.com"), Role::Customer).unwrap();
        let before = user_count(&conn);

        let same_name = register(&conn, &new_user("ann", "other@example.com"), Role::Customer);
        assert!(matches!(same_name, Err(AccountError::AlreadyExists)));

        let same_email = register(&conn, &new_user("bob", "ann@example.com"), Role::Customer);
        assert!(matches!(same_email, Err(AccountError::AlreadyExists)));

        assert_eq!(user_count(&conn), before);
    }

    #[test]
    fn blank_emails_do_not_collide() {
        let conn = setup();
        register(&conn, &new_user("a", ""), Role::User).unwrap();
        register(&conn, &new_user("b", "  "), Role::User).unwrap();
        assert_eq!(user_count(&conn), 2);
    }

    #[test]
    fn missing_fields_are_validation_errors() {
        let conn = setup();
        let err = register(&conn, &new_user("   ", "x@example.com"), Role::User).unwrap_err();
        assert!(matches!(err, AccountError::Validation(_)));
        assert_eq!(user_count(&conn), 0);
    }

    #[test]
    fn login_yields_session_with_identity() {
        let conn = setup();
        let user = register(&conn, &new_user("agent7", "a7@example.com"), Role::Agent).unwrap();

        let authed = authenticate(&conn, "agent7", "secret").unwrap().unwrap();
        let token = create_session(&conn, authed.id).unwrap();
        let session = session_user(&conn, &token, 3600).unwrap().unwrap();
        assert_eq!(
            session,
            SessionUser {
                id: user.id,
                username: "agent7".to_string(),
                role: Role::Agent,
            }
        );

        end_session(&conn, &token).unwrap();
        assert!(session_user(&conn, &token, 3600).unwrap().is_none());
    }

    #[test]
    fn wrong_password_creates_no_session() {
        let conn = setup();
        register(&conn, &new_user("ann", "ann@example.com"), Role::Customer).unwrap();

        assert!(authenticate(&conn, "ann", "wrong").unwrap().is_none());
        assert!(authenticate(&conn, "nobody", "secret").unwrap().is_none());

        let sessions: i64 = conn
            .query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))
            .unwrap();
        assert_eq!(sessions, 0);
    }

    #[test]
    fn ensure_admin_is_idempotent() {
        let conn = setup();
        assert!(ensure_admin(&conn, "admin", "admin@example.com", "admin123").unwrap());
        assert!(!ensure_admin(&conn, "admin", "admin@example.com", "admin123").unwrap());
        let admin = authenticate(&conn, "admin", "admin123").unwrap().unwrap();
        assert_eq!(admin.role, Role::Admin);
        assert_eq!(user_count(&conn), 1);
        let found = find_by_username(&conn, " admin ").unwrap().unwrap();
        assert_eq!(found.id, admin.id);
        assert!(find_by_username(&conn, "nobody").unwrap().is_none());
    }

    #[test]
    fn update_user_changes_role_and_password() {
        let conn = setup();
        let user = register(&conn, &new_user("ann", "ann@example.com"), Role::Customer).unwrap();

        let updated = update_user(
            &conn,
            user.id,
            &UserUpdate {
                role: Some(Role::Agent),
                password: Some("new-pass".to_string()),
                bio: None,
            },
        )
        .unwrap();
        assert_eq!(updated.role, Role::Agent);
        assert!(authenticate(&conn, "ann", "secret").unwrap().is_none());
        assert!(authenticate(&conn, "ann", "new-pass").unwrap().is_some());

        let missing = update_user(
            &conn,
            999,
            &UserUpdate {
                role: Some(Role::Admin),
                ..Default::default()
            },
        );
        assert!(matches!(missing, Err(AccountError::NotFound(999))));
    }

    #[test]
    fn credential_changes_end_open_sessions() {
        let conn = setup();
        let user = register(&conn, &new_user("ann", "ann@example.com"), Role::Customer).unwrap();

        let token = create_session(&conn, user.id).unwrap();
        update_user(
            &conn,
            user.id,
            &UserUpdate {
                bio: Some("hello".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(session_user(&conn, &token, 3600).unwrap().is_some());

        update_user(
            &conn,
            user.id,
            &UserUpdate {
                role: Some(Role::Agent),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(session_user(&conn, &token, 3600).unwrap().is_none());

        let token = create_session(&conn, user.id).unwrap();
        update_user(
            &conn,
            user.id,
            &UserUpdate {
                password: Some("rotated".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(session_user(&conn, &token, 3600).unwrap().is_none());
    }

    #[test]
    fn list_users_orders_by_username() {
        let conn = setup();
        register(&conn, &new_user("zed", "z@example.com"), Role::Customer).unwrap();
        register(&conn, &new_user("amy", "a@example.com"), Role::Customer).unwrap();
        let names: Vec<String> = list_users(&conn)
            .unwrap()
            .into_iter()
            .map(|u| u.username)
            .collect();
        assert_eq!(names, vec!["amy", "zed"]);
    }
}

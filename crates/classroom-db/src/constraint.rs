//! Classification of SQLite constraint failures.

use rusqlite::ffi;
use rusqlite::ErrorCode;

/// True when `err` is a `UNIQUE` or `PRIMARY KEY` constraint failure.
pub fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            e.code == ErrorCode::ConstraintViolation
                && matches!(
                    e.extended_code,
                    ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                )
        }
        _ => false,
    }
}

/// True when `err` is any constraint failure (`UNIQUE`, `CHECK`,
/// `FOREIGN KEY`, `NOT NULL`, ...).
pub fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

//! Embedded SQL migration runner.
//!
//! Each app owns a list of SQL files compiled into the binary. Apps with
//! accounts share the `000_accounts` migration. Applied migrations are
//! recorded in `_classroom_migrations` and skipped on later runs, so startup
//! is idempotent, and seed rows use `INSERT OR IGNORE`.

use classroom_types::AppKind;
use rusqlite::Connection;
use thiserror::Error;

/// A single embedded migration.
struct Migration {
    name: &'static str,
    sql: &'static str,
}

const ACCOUNTS: Migration = Migration {
    name: "000_accounts",
    sql: include_str!("migrations/000_accounts.sql"),
};

const ITEMS: &[Migration] = &[ACCOUNTS, Migration {
    name: "010_items",
    sql: include_str!("migrations/010_items.sql"),
}];

const HELPDESK: &[Migration] = &[ACCOUNTS, Migration {
    name: "020_helpdesk",
    sql: include_str!("migrations/020_helpdesk.sql"),
}];

const BLOG: &[Migration] = &[ACCOUNTS, Migration {
    name: "030_blog",
    sql: include_str!("migrations/030_blog.sql"),
}];

const STORE: &[Migration] = &[ACCOUNTS, Migration {
    name: "040_store",
    sql: include_str!("migrations/040_store.sql"),
}];

const TODO: &[Migration] = &[Migration {
    name: "050_todo",
    sql: include_str!("migrations/050_todo.sql"),
}];

const TRACKER: &[Migration] = &[Migration {
    name: "060_tracker",
    sql: include_str!("migrations/060_tracker.sql"),
}];

const FORUM: &[Migration] = &[ACCOUNTS, Migration {
    name: "070_forum",
    sql: include_str!("migrations/070_forum.sql"),
}];

const STARTER: &[Migration] = &[ACCOUNTS, Migration {
    name: "080_starter",
    sql: include_str!("migrations/080_starter.sql"),
}];

fn migrations_for(kind: AppKind) -> &'static [Migration] {
    match kind {
        AppKind::Items => ITEMS,
        AppKind::Helpdesk => HELPDESK,
        AppKind::Blog => BLOG,
        AppKind::Store => STORE,
        AppKind::Todo => TODO,
        AppKind::Tracker => TRACKER,
        AppKind::Forum => FORUM,
        AppKind::Starter => STARTER,
    }
}

/// Errors that can occur during migration execution.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// A SQL statement within a migration failed.
    #[error("migration '{name}' failed: {source}")]
    ExecutionFailed {
        /// The name of the migration that failed.
        name: String,
        /// The underlying SQLite error.
        source: rusqlite::Error,
    },

    /// Failed to query migration state.
    #[error("failed to check migration state: {0}")]
    StateQuery(rusqlite::Error),
}

/// Applies every pending migration of `kind` to the connection.
///
/// Returns the number of migrations applied by this call.
///
/// # Errors
///
/// Returns `MigrationError` if a migration fails (its changes are rolled
/// back) or the tracking table cannot be queried.
pub fn run_migrations(conn: &Connection, kind: AppKind) -> Result<usize, MigrationError> {
    run_migrations_from_list(conn, migrations_for(kind))
}

fn run_migrations_from_list(
    conn: &Connection,
    migrations: &[Migration],
) -> Result<usize, MigrationError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _classroom_migrations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .map_err(|e| MigrationError::ExecutionFailed {
        name: "_classroom_migrations_bootstrap".to_string(),
        source: e,
    })?;

    let mut applied = 0;

    for migration in migrations {
        let already_applied: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM _classroom_migrations WHERE name = ?1",
                [migration.name],
                |row| row.get(0),
            )
            .map_err(MigrationError::StateQuery)?;

        if already_applied {
            tracing::debug!(migration = migration.name, "migration already applied");
            continue;
        }

        tracing::info!(migration = migration.name, "applying migration");

        let failed = |source| MigrationError::ExecutionFailed {
            name: migration.name.to_string(),
            source,
        };

        let tx = conn.unchecked_transaction().map_err(failed)?;
        tx.execute_batch(migration.sql).map_err(failed)?;
        tx.execute(
            "INSERT INTO _classroom_migrations (name) VALUES (?1)",
            [migration.name],
        )
        .map_err(failed)?;
        tx.commit().map_err(failed)?;

        applied += 1;
    }

    Ok(applied)
}

//! Database layer for the classroom applications.
//!
//! Provides SQLite connection pooling (via `r2d2`), WAL-mode initialization,
//! embedded per-app SQL migrations, parameterized query composition and
//! classification of constraint failures. Every table an app uses is created
//! through the migrations selected for its [`classroom_types::AppKind`].
//!
//! # Design decisions
//!
//! - **One SQLite file per app**: each app runs against its own database, so
//!   migration sets never overlap except for the shared accounts tables.
//! - **`r2d2` connection pool**: handlers check out a connection per request
//!   and it returns to the pool when dropped, on every exit path.
//! - **Bound parameters only**: [`Query`] and [`UpdateSet`] assemble dynamic
//!   SQL from fixed fragments while every user value travels as a parameter.

mod constraint;
mod migrations;
mod pool;
mod query;

pub use constraint::{is_constraint_violation, is_unique_violation};
pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_pool, DbConn, DbPool, DbRuntimeSettings, PoolError};
pub use query::{like_pattern, Query, UpdateSet};

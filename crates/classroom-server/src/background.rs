//! Background tasks for the classroom server.
//!
//! Includes:
//! - Pruning expired login sessions.

use crate::AppState;
use std::sync::Arc;
use tokio::time::{sleep, Duration};

/// How often the pruning task runs for a given session lifetime: half the
/// lifetime, clamped to `[1, 60]` seconds.
pub fn pruning_interval(ttl_secs: u64) -> Duration {
    Duration::from_secs((ttl_secs / 2).clamp(1, 60))
}

/// Starts the session pruning task.
///
/// Runs indefinitely, deleting sessions older than `state.session_ttl_secs`.
/// Returns immediately when the lifetime is 0 (sessions never expire).
pub async fn start_session_pruning_task(state: Arc<AppState>) {
    let ttl_secs = state.session_ttl_secs;
    if ttl_secs == 0 {
        tracing::warn!("session pruning disabled (ttl=0)");
        return;
    }

    let interval = pruning_interval(ttl_secs);
    tracing::info!(
        ttl_secs,
        interval_secs = interval.as_secs(),
        "starting session pruning task"
    );

    loop {
        sleep(interval).await;

        let pool = state.pool.clone();
        let res = tokio::task::spawn_blocking(move || {
            let conn = pool.get().map_err(|e| e.to_string())?;
            classroom_accounts::prune_sessions(&conn, ttl_secs).map_err(|e| e.to_string())
        })
        .await;

        match res {
            Ok(Ok(0)) => {}
            Ok(Ok(count)) => tracing::info!(count, "pruned expired sessions"),
            Ok(Err(e)) => tracing::error!("failed to prune sessions: {}", e),
            Err(e) => tracing::error!("session pruning task join error: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::SeedConfig, prepare_database};
    use classroom_types::AppKind;

    #[test]
    fn interval_is_half_the_ttl_within_bounds() {
        assert_eq!(pruning_interval(1), Duration::from_secs(1));
        assert_eq!(pruning_interval(30), Duration::from_secs(15));
        assert_eq!(pruning_interval(7200), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn disabled_when_ttl_is_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("forum.db");
        let pool = classroom_db::create_pool(
            path.to_str().unwrap(),
            classroom_db::DbRuntimeSettings::default(),
        )
        .unwrap();
        prepare_database(&pool, AppKind::Forum, &SeedConfig::default()).unwrap();
        let state = Arc::new(
            AppState::new(pool, AppKind::Forum, dir.path().join("uploads"), 1024)
                .with_session_ttl(0),
        );

        let handle = tokio::spawn(start_session_pruning_task(state));
        let result = tokio::time::timeout(Duration::from_secs(2), handle).await;
        assert!(result.is_ok(), "pruning task with ttl=0 should return immediately");
    }

    #[tokio::test]
    async fn prunes_stale_sessions_on_each_tick() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("forum.db");
        let pool = classroom_db::create_pool(
            path.to_str().unwrap(),
            classroom_db::DbRuntimeSettings::default(),
        )
        .unwrap();
        prepare_database(&pool, AppKind::Forum, &SeedConfig::default()).unwrap();
        {
            let conn = pool.get().unwrap();
            let admin = classroom_accounts::find_by_username(&conn, "admin")
                .unwrap()
                .unwrap();
            classroom_accounts::create_session(&conn, admin.id).unwrap();
            conn.execute(
                "UPDATE sessions SET created_at = datetime('now', '-1 day')",
                [],
            )
            .unwrap();
        }
        let state = Arc::new(
            AppState::new(pool.clone(), AppKind::Forum, dir.path().join("uploads"), 1024)
                .with_session_ttl(2),
        );

        let handle = tokio::spawn(start_session_pruning_task(state));
        let conn = pool.get().unwrap();
        let mut remaining = 1i64;
        for _ in 0..25 {
            tokio::time::sleep(Duration::from_millis(200)).await;
            remaining = conn
                .query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))
                .unwrap();
            if remaining == 0 {
                break;
            }
        }
        handle.abort();
        assert_eq!(remaining, 0);
    }
}

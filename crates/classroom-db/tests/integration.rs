use classroom_db::{create_pool, run_migrations, DbRuntimeSettings};
use classroom_types::AppKind;

#[test]
fn pooled_connections_share_one_migrated_file() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let path = dir.path().join("helpdesk.db");
    let pool = create_pool(path.to_str().unwrap(), DbRuntimeSettings::default())
        .expect("failed to create pool");

    {
        let conn = pool.get().expect("failed to get connection");
        let applied = run_migrations(&conn, AppKind::Helpdesk).expect("failed to run migrations");
        assert_eq!(applied, 2);
    }

    let a = pool.get().expect("failed to get first connection");
    let b = pool.get().expect("failed to get second connection");
    a.execute(
        "INSERT INTO users (username, password_hash, role) VALUES ('ann', 'x', 'customer')",
        [],
    )
    .expect("insert should succeed");

    let seen: i64 = b
        .query_row("SELECT COUNT(*) FROM users WHERE username = 'ann'", [], |row| row.get(0))
        .expect("count should succeed");
    assert_eq!(seen, 1, "second connection should see the committed row");

    let mut stmt = b
        .prepare("SELECT name FROM _classroom_migrations ORDER BY id")
        .expect("failed to prepare migration query");
    let names: Vec<String> = stmt
        .query_map([], |row| row.get(0))
        .expect("failed to query migrations")
        .map(|r| r.expect("failed to read migration name"))
        .collect();
    assert_eq!(names, vec!["000_accounts", "020_helpdesk"]);
}

#[test]
fn foreign_keys_are_enforced_on_pooled_connections() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let path = dir.path().join("todo-fk.db");
    let pool = create_pool(path.to_str().unwrap(), DbRuntimeSettings::default())
        .expect("failed to create pool");
    let conn = pool.get().expect("failed to get connection");
    run_migrations(&conn, AppKind::Tracker).expect("failed to run migrations");

    let err = conn
        .execute(
            "INSERT INTO students (first_name, last_name, class_id) VALUES ('A', 'B', 404)",
            [],
        )
        .expect_err("dangling class reference should fail");
    assert!(classroom_db::is_constraint_violation(&err));
}

//! Threaded discussion forum.
//!
//! Threads belong to a category and collect replies. Threads and posts can
//! be voted on, liked, and carry file attachments. Administrators pin,
//! lock and delete threads; a locked thread accepts no new replies.

mod reactions;

pub use reactions::{toggle_like, vote, LikeOutcome, VoteOutcome};

use std::fmt;
use std::str::FromStr;

use classroom_accounts::SessionUser;
use classroom_db::{like_pattern, Query};
use classroom_types::Role;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// File extensions accepted for attachments.
pub const ATTACHMENT_EXTENSIONS: &[&str] =
    &["txt", "pdf", "png", "jpg", "jpeg", "gif", "doc", "docx"];

/// Errors that can occur during forum operations.
#[derive(Debug, Error)]
pub enum ForumError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: i64 },
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Validation(String),
}

/// What a vote, like or attachment applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    Thread,
    Post,
}

impl Target {
    fn column(self) -> &'static str {
        match self {
            Self::Thread => "thread_id",
            Self::Post => "post_id",
        }
    }

    fn table(self) -> &'static str {
        match self {
            Self::Thread => "threads",
            Self::Post => "posts",
        }
    }

    fn ensure_exists(self, conn: &Connection, id: i64) -> Result<(), ForumError> {
        self.owner(conn, id).map(|_| ())
    }

    /// The id of the user who wrote the thread or post.
    fn owner(self, conn: &Connection, id: i64) -> Result<i64, ForumError> {
        conn.query_row(
            &format!("SELECT user_id FROM {} WHERE id = ?1", self.table()),
            [id],
            |row| row.get(0),
        )
        .optional()?
        .ok_or(ForumError::NotFound {
            entity: self.as_str(),
            id,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Thread => "thread",
            Self::Post => "post",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Target {
    type Err = ForumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "thread" => Ok(Self::Thread),
            "post" => Ok(Self::Post),
            other => Err(ForumError::Validation(format!("Unknown target: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
}

/// A thread joined with its author, category, reply count and vote score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub user_id: i64,
    pub username: String,
    pub category_id: i64,
    pub category_name: String,
    pub is_pinned: bool,
    pub is_locked: bool,
    pub view_count: i64,
    pub created_at: String,
    pub updated_at: String,
    pub reply_count: i64,
    pub vote_score: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: i64,
    /// Stored name inside the upload directory.
    pub filename: String,
    pub original_filename: String,
    pub file_path: String,
    pub file_size: i64,
    pub mime_type: String,
    pub user_id: i64,
    pub thread_id: Option<i64>,
    pub post_id: Option<i64>,
    pub created_at: String,
}

/// Metadata for a file the caller has already written to disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAttachment {
    pub filename: String,
    pub original_filename: String,
    pub file_path: String,
    pub file_size: i64,
    pub mime_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostView {
    pub id: i64,
    pub content: String,
    pub user_id: i64,
    pub username: String,
    pub thread_id: i64,
    pub parent_post_id: Option<i64>,
    pub created_at: String,
    pub vote_score: i64,
    pub like_count: i64,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadDetail {
    pub thread: Thread,
    pub attachments: Vec<Attachment>,
    pub posts: Vec<PostView>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForumStats {
    pub threads: i64,
    pub users: i64,
    pub posts: i64,
}

/// Thread list ordering. Pinned threads always come first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadSort {
    #[default]
    Latest,
    Oldest,
    MostViewed,
    MostReplied,
    MostVoted,
}

impl ThreadSort {
    /// Unrecognized keys fall back to [`ThreadSort::Latest`].
    pub fn from_param(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("oldest") => Self::Oldest,
            Some("most_viewed") => Self::MostViewed,
            Some("most_replied") => Self::MostReplied,
            Some("most_voted") => Self::MostVoted,
            _ => Self::Latest,
        }
    }

    fn clause(self) -> &'static str {
        match self {
            Self::Latest => "t.is_pinned DESC, t.created_at DESC, t.id DESC",
            Self::Oldest => "t.is_pinned DESC, t.created_at ASC, t.id ASC",
            Self::MostViewed => "t.is_pinned DESC, t.view_count DESC, t.id DESC",
            Self::MostReplied => "t.is_pinned DESC, reply_count DESC, t.id DESC",
            Self::MostVoted => "t.is_pinned DESC, vote_score DESC, t.id DESC",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThreadFilters {
    pub category_id: Option<i64>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadList {
    pub threads: Vec<Thread>,
    pub categories: Vec<Category>,
    pub stats: ForumStats,
    pub sort: ThreadSort,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewThread {
    pub title: String,
    pub content: String,
    pub category_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserReputation {
    pub username: String,
    pub reputation: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminStats {
    #[serde(flatten)]
    pub totals: ForumStats,
    pub attachments: i64,
    pub recent_threads: Vec<Thread>,
    pub top_users: Vec<UserReputation>,
}

const THREAD_SELECT: &str = "SELECT t.id, t.title, t.content, t.user_id, u.username, t.category_id,
        c.name, t.is_pinned, t.is_locked, t.view_count, t.created_at, t.updated_at,
        (SELECT COUNT(*) FROM posts WHERE thread_id = t.id) AS reply_count,
        (SELECT COALESCE(SUM(CASE vote_type WHEN 'upvote' THEN 1 ELSE -1 END), 0)
           FROM votes WHERE thread_id = t.id) AS vote_score
     FROM threads t
     JOIN users u ON t.user_id = u.id
     JOIN categories c ON t.category_id = c.id";

const ATTACHMENT_SELECT: &str = "SELECT id, filename, original_filename, file_path, file_size,
        mime_type, user_id, thread_id, post_id, created_at
     FROM attachments";

fn map_thread(row: &Row<'_>) -> rusqlite::Result<Thread> {
    Ok(Thread {
        id: row.get(0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        user_id: row.get(3)?,
        username: row.get(4)?,
        category_id: row.get(5)?,
        category_name: row.get(6)?,
        is_pinned: row.get(7)?,
        is_locked: row.get(8)?,
        view_count: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
        reply_count: row.get(12)?,
        vote_score: row.get(13)?,
    })
}

fn map_attachment(row: &Row<'_>) -> rusqlite::Result<Attachment> {
    Ok(Attachment {
        id: row.get(0)?,
        filename: row.get(1)?,
        original_filename: row.get(2)?,
        file_path: row.get(3)?,
        file_size: row.get(4)?,
        mime_type: row.get(5)?,
        user_id: row.get(6)?,
        thread_id: row.get(7)?,
        post_id: row.get(8)?,
        created_at: row.get(9)?,
    })
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Whether `filename` has an accepted attachment extension.
pub fn allowed_attachment(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .is_some_and(|ext| ATTACHMENT_EXTENSIONS.contains(&ext.as_str()))
}

fn stats(conn: &Connection) -> rusqlite::Result<ForumStats> {
    conn.query_row(
        "SELECT (SELECT COUNT(*) FROM threads),
                (SELECT COUNT(*) FROM users),
                (SELECT COUNT(*) FROM posts)",
        [],
        |row| {
            Ok(ForumStats {
                threads: row.get(0)?,
                users: row.get(1)?,
                posts: row.get(2)?,
            })
        },
    )
}

pub fn list_categories(conn: &Connection) -> Result<Vec<Category>, ForumError> {
    let mut stmt = conn.prepare("SELECT id, name, description FROM categories ORDER BY name")?;
    let rows = stmt.query_map([], |row| {
        Ok(Category {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Threads matching `filters` in the requested order, plus the category
/// list and site totals.
pub fn list_threads(
    conn: &Connection,
    filters: &ThreadFilters,
    sort: ThreadSort,
) -> Result<ThreadList, ForumError> {
    let threads = Query::new(THREAD_SELECT)
        .filter_opt("t.category_id = ?", filters.category_id)
        .filter_opt(
            "(t.title LIKE ? ESCAPE '\\' OR t.content LIKE ? ESCAPE '\\')",
            non_blank(&filters.search).map(|s| like_pattern(&s)),
        )
        .order_by(sort.clause())
        .fetch(conn, map_thread)?;

    Ok(ThreadList {
        threads,
        categories: list_categories(conn)?,
        stats: stats(conn)?,
        sort,
    })
}

fn get_thread(conn: &Connection, id: i64) -> Result<Thread, ForumError> {
    conn.query_row(&format!("{THREAD_SELECT} WHERE t.id = ?1"), [id], map_thread)
        .optional()?
        .ok_or(ForumError::NotFound {
            entity: "thread",
            id,
        })
}

fn attachments_of(conn: &Connection, target: Target, id: i64) -> rusqlite::Result<Vec<Attachment>> {
    let mut stmt = conn.prepare(&format!(
        "{ATTACHMENT_SELECT} WHERE {} = ?1 ORDER BY id",
        target.column()
    ))?;
    let rows = stmt.query_map([id], map_attachment)?;
    rows.collect()
}

/// Loads a thread with its replies (oldest first) and attachments, counting
/// the visit.
pub fn view_thread(conn: &Connection, id: i64) -> Result<ThreadDetail, ForumError> {
    let bumped = conn.execute(
        "UPDATE threads SET view_count = view_count + 1 WHERE id = ?1",
        [id],
    )?;
    if bumped == 0 {
        return Err(ForumError::NotFound {
            entity: "thread",
            id,
        });
    }
    let thread = get_thread(conn, id)?;

    let mut stmt = conn.prepare(
        "SELECT p.id, p.content, p.user_id, u.username, p.thread_id, p.parent_post_id,
                p.created_at,
                (SELECT COALESCE(SUM(CASE vote_type WHEN 'upvote' THEN 1 ELSE -1 END), 0)
                   FROM votes WHERE post_id = p.id),
                (SELECT COUNT(*) FROM likes WHERE post_id = p.id)
         FROM posts p
         JOIN users u ON p.user_id = u.id
         WHERE p.thread_id = ?1
         ORDER BY p.created_at ASC, p.id ASC",
    )?;
    let mut posts = stmt
        .query_map([id], |row| {
            Ok(PostView {
                id: row.get(0)?,
                content: row.get(1)?,
                user_id: row.get(2)?,
                username: row.get(3)?,
                thread_id: row.get(4)?,
                parent_post_id: row.get(5)?,
                created_at: row.get(6)?,
                vote_score: row.get(7)?,
                like_count: row.get(8)?,
                attachments: Vec::new(),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    for post in &mut posts {
        post.attachments = attachments_of(conn, Target::Post, post.id)?;
    }

    Ok(ThreadDetail {
        attachments: attachments_of(conn, Target::Thread, id)?,
        thread,
        posts,
    })
}

pub fn create_thread(
    conn: &Connection,
    author: &SessionUser,
    new: &NewThread,
) -> Result<Thread, ForumError> {
    let title = new.title.trim();
    let content = new.content.trim();
    let category_id = match new.category_id {
        Some(id) if !title.is_empty() && !content.is_empty() => id,
        _ => return Err(ForumError::Validation("All fields are required!".to_string())),
    };
    let known: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM categories WHERE id = ?1)",
        [category_id],
        |row| row.get(0),
    )?;
    if !known {
        return Err(ForumError::NotFound {
            entity: "category",
            id: category_id,
        });
    }

    conn.execute(
        "INSERT INTO threads (title, content, user_id, category_id) VALUES (?1, ?2, ?3, ?4)",
        params![title, content, author.id, category_id],
    )?;
    let id = conn.last_insert_rowid();
    tracing::info!(thread_id = id, user_id = author.id, category_id, "thread created");
    get_thread(conn, id)
}

/// Adds a reply to a thread. A parent post, when given, must belong to the
/// same thread.
pub fn reply(
    conn: &Connection,
    author: &SessionUser,
    thread_id: i64,
    content: &str,
    parent_post_id: Option<i64>,
) -> Result<PostView, ForumError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(ForumError::Validation(
            "Reply content is required!".to_string(),
        ));
    }
    let thread = get_thread(conn, thread_id)?;
    if thread.is_locked {
        return Err(ForumError::Validation("Thread is locked".to_string()));
    }
    if let Some(parent) = parent_post_id {
        let parent_thread: Option<i64> = conn
            .query_row("SELECT thread_id FROM posts WHERE id = ?1", [parent], |row| {
                row.get(0)
            })
            .optional()?;
        if parent_thread != Some(thread_id) {
            return Err(ForumError::Validation(
                "Parent post does not belong to this thread".to_string(),
            ));
        }
    }

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO posts (content, user_id, thread_id, parent_post_id) VALUES (?1, ?2, ?3, ?4)",
        params![content, author.id, thread_id, parent_post_id],
    )?;
    let post_id = tx.last_insert_rowid();
    tx.execute(
        "UPDATE threads SET updated_at = datetime('now') WHERE id = ?1",
        [thread_id],
    )?;
    tx.commit()?;
    tracing::info!(post_id, thread_id, user_id = author.id, "reply posted");

    let created_at: String = conn.query_row(
        "SELECT created_at FROM posts WHERE id = ?1",
        [post_id],
        |row| row.get(0),
    )?;
    Ok(PostView {
        id: post_id,
        content: content.to_string(),
        user_id: author.id,
        username: author.username.clone(),
        thread_id,
        parent_post_id,
        created_at,
        vote_score: 0,
        like_count: 0,
        attachments: Vec::new(),
    })
}

/// Records an uploaded file against a thread or post. Only the author of
/// the target or an admin may attach files.
pub fn add_attachment(
    conn: &Connection,
    user: &SessionUser,
    target: Target,
    id: i64,
    file: &NewAttachment,
) -> Result<Attachment, ForumError> {
    if !allowed_attachment(&file.original_filename) {
        return Err(ForumError::Validation(format!(
            "File type not allowed: {}",
            file.original_filename
        )));
    }
    let owner = target.owner(conn, id)?;
    if owner != user.id && user.role != Role::Admin {
        return Err(ForumError::Forbidden(format!(
            "Only the author can attach files to this {target}"
        )));
    }

    conn.execute(
        &format!(
            "INSERT INTO attachments
                (filename, original_filename, file_path, file_size, mime_type, user_id, {})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            target.column()
        ),
        params![
            file.filename,
            file.original_filename,
            file.file_path,
            file.file_size,
            file.mime_type,
            user.id,
            id
        ],
    )?;
    let attachment_id = conn.last_insert_rowid();
    tracing::info!(attachment_id, target = %target, id, size = file.file_size, "attachment stored");

    let attachment = conn.query_row(
        &format!("{ATTACHMENT_SELECT} WHERE id = ?1"),
        [attachment_id],
        map_attachment,
    )?;
    Ok(attachment)
}

/// Site totals, the five newest threads and the five users with the
/// highest reputation.
pub fn admin_stats(conn: &Connection) -> Result<AdminStats, ForumError> {
    let attachments: i64 =
        conn.query_row("SELECT COUNT(*) FROM attachments", [], |row| row.get(0))?;

    let recent_threads = Query::new(THREAD_SELECT)
        .order_by("t.created_at DESC, t.id DESC")
        .limit(5)
        .fetch(conn, map_thread)?;

    let mut stmt = conn.prepare(
        "SELECT username, reputation FROM users ORDER BY reputation DESC, username LIMIT 5",
    )?;
    let top_users = stmt
        .query_map([], |row| {
            Ok(UserReputation {
                username: row.get(0)?,
                reputation: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(AdminStats {
        totals: stats(conn)?,
        attachments,
        recent_threads,
        top_users,
    })
}

/// Every thread, newest first.
pub fn admin_threads(conn: &Connection) -> Result<Vec<Thread>, ForumError> {
    Ok(Query::new(THREAD_SELECT)
        .order_by("t.created_at DESC, t.id DESC")
        .fetch(conn, map_thread)?)
}

fn toggle_flag(conn: &Connection, id: i64, column: &str) -> Result<bool, ForumError> {
    let changed = conn.execute(
        &format!("UPDATE threads SET {column} = 1 - {column} WHERE id = ?1"),
        [id],
    )?;
    if changed == 0 {
        return Err(ForumError::NotFound {
            entity: "thread",
            id,
        });
    }
    let value = conn.query_row(
        &format!("SELECT {column} FROM threads WHERE id = ?1"),
        [id],
        |row| row.get(0),
    )?;
    Ok(value)
}

/// Flips the pinned flag and returns the new value.
pub fn toggle_pin(conn: &Connection, id: i64) -> Result<bool, ForumError> {
    let pinned = toggle_flag(conn, id, "is_pinned")?;
    tracing::info!(thread_id = id, pinned, "thread pin toggled");
    Ok(pinned)
}

/// Flips the locked flag and returns the new value.
pub fn toggle_lock(conn: &Connection, id: i64) -> Result<bool, ForumError> {
    let locked = toggle_flag(conn, id, "is_locked")?;
    tracing::info!(thread_id = id, locked, "thread lock toggled");
    Ok(locked)
}

/// Deletes a thread with its replies and every vote, like and attachment
/// row on the thread or its replies. Returns the stored paths of the
/// removed attachments so the caller can delete the files.
pub fn delete_thread(conn: &Connection, id: i64) -> Result<Vec<String>, ForumError> {
    get_thread(conn, id)?;

    let tx = conn.unchecked_transaction()?;
    let mut stmt = tx.prepare(
        "SELECT file_path FROM attachments
         WHERE thread_id = ?1 OR post_id IN (SELECT id FROM posts WHERE thread_id = ?1)",
    )?;
    let file_paths = stmt
        .query_map([id], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    drop(stmt);

    for table in ["votes", "likes", "attachments"] {
        tx.execute(
            &format!(
                "DELETE FROM {table}
                 WHERE thread_id = ?1 OR post_id IN (SELECT id FROM posts WHERE thread_id = ?1)"
            ),
            [id],
        )?;
    }
    tx.execute("DELETE FROM posts WHERE thread_id = ?1", [id])?;
    tx.execute("DELETE FROM threads WHERE id = ?1", [id])?;
    tx.commit()?;

    tracing::info!(thread_id = id, files = file_paths.len(), "thread deleted");
    Ok(file_paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use classroom_accounts::{register, NewUser};
    use classroom_types::{AppKind, VoteKind};

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        classroom_db::run_migrations(&conn, AppKind::Forum).unwrap();
        conn
    }

    fn user(conn: &Connection, name: &str, role: Role) -> SessionUser {
        let u = register(
            conn,
            &NewUser {
                username: name.to_string(),
                email: None,
                password: "pw".to_string(),
            },
            role,
        )
        .unwrap();
        SessionUser {
            id: u.id,
            username: u.username,
            role: u.role,
        }
    }

    fn thread(conn: &Connection, author: &SessionUser, title: &str) -> Thread {
        create_thread(
            conn,
            author,
            &NewThread {
                title: title.to_string(),
                content: format!("About {title}"),
                category_id: Some(1),
            },
        )
        .unwrap()
    }

    fn upload(name: &str) -> NewAttachment {
        NewAttachment {
            filename: format!("20240101_120000_{name}"),
            original_filename: name.to_string(),
            file_path: format!("uploads/20240101_120000_{name}"),
            file_size: 42,
            mime_type: "text/plain".to_string(),
        }
    }

    #[test]
    fn seeded_categories() {
        let conn = setup();
        let names: Vec<String> = list_categories(&conn)
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(
            names,
            vec![
                "Announcements",
                "General Discussion",
                "Help & Support",
                "Technology"
            ]
        );
    }

    #[test]
    fn list_sorts_and_filters() {
        let conn = setup();
        let ada = user(&conn, "ada", Role::User);
        let quiet = thread(&conn, &ada, "Quiet topic");
        let busy = thread(&conn, &ada, "Busy topic");
        reply(&conn, &ada, busy.id, "first", None).unwrap();
        reply(&conn, &ada, busy.id, "second", None).unwrap();
        vote(&conn, &ada, Target::Thread, quiet.id, VoteKind::Upvote).unwrap();

        let replied = list_threads(
            &conn,
            &ThreadFilters::default(),
            ThreadSort::from_param(Some("most_replied")),
        )
        .unwrap();
        assert_eq!(replied.threads[0].id, busy.id);
        assert_eq!(replied.threads[0].reply_count, 2);
        assert_eq!(replied.stats, ForumStats { threads: 2, users: 1, posts: 2 });

        let voted = list_threads(&conn, &ThreadFilters::default(), ThreadSort::MostVoted).unwrap();
        assert_eq!(voted.threads[0].id, quiet.id);
        assert_eq!(voted.threads[0].vote_score, 1);

        toggle_pin(&conn, quiet.id).unwrap();
        let pinned = list_threads(&conn, &ThreadFilters::default(), ThreadSort::MostReplied).unwrap();
        assert_eq!(pinned.threads[0].id, quiet.id);

        let filters = ThreadFilters {
            search: Some("busy".to_string()),
            category_id: Some(1),
        };
        let found = list_threads(&conn, &filters, ThreadSort::Latest).unwrap();
        assert_eq!(found.threads.len(), 1);
        assert_eq!(found.threads[0].title, "Busy topic");
    }

    #[test]
    fn create_thread_requires_fields_and_known_category() {
        let conn = setup();
        let ada = user(&conn, "ada", Role::User);
        let missing = NewThread {
            title: "Hello".to_string(),
            content: " ".to_string(),
            category_id: Some(1),
        };
        assert!(matches!(
            create_thread(&conn, &ada, &missing),
            Err(ForumError::Validation(_))
        ));
        let unknown = NewThread {
            title: "Hello".to_string(),
            content: "World".to_string(),
            category_id: Some(99),
        };
        assert!(matches!(
            create_thread(&conn, &ada, &unknown),
            Err(ForumError::NotFound { entity: "category", id: 99 })
        ));
    }

    #[test]
    fn view_counts_visits_and_nests_attachments() {
        let conn = setup();
        let ada = user(&conn, "ada", Role::User);
        let t = thread(&conn, &ada, "Files");
        let post = reply(&conn, &ada, t.id, "see attached", None).unwrap();
        add_attachment(&conn, &ada, Target::Thread, t.id, &upload("notes.txt")).unwrap();
        add_attachment(&conn, &ada, Target::Post, post.id, &upload("diagram.png")).unwrap();
        toggle_like(&conn, &ada, Target::Post, post.id).unwrap();

        view_thread(&conn, t.id).unwrap();
        let detail = view_thread(&conn, t.id).unwrap();
        assert_eq!(detail.thread.view_count, 2);
        assert_eq!(detail.attachments.len(), 1);
        assert_eq!(detail.posts.len(), 1);
        assert_eq!(detail.posts[0].like_count, 1);
        assert_eq!(detail.posts[0].attachments[0].original_filename, "diagram.png");

        assert!(matches!(
            view_thread(&conn, 404),
            Err(ForumError::NotFound { entity: "thread", .. })
        ));
    }

    #[test]
    fn locked_threads_reject_replies() {
        let conn = setup();
        let ada = user(&conn, "ada", Role::User);
        let t = thread(&conn, &ada, "Closed");
        assert!(toggle_lock(&conn, t.id).unwrap());
        assert!(matches!(
            reply(&conn, &ada, t.id, "too late", None),
            Err(ForumError::Validation(_))
        ));
        assert!(!toggle_lock(&conn, t.id).unwrap());
        reply(&conn, &ada, t.id, "open again", None).unwrap();
    }

    #[test]
    fn reply_parent_must_share_thread() {
        let conn = setup();
        let ada = user(&conn, "ada", Role::User);
        let a = thread(&conn, &ada, "A");
        let b = thread(&conn, &ada, "B");
        let root = reply(&conn, &ada, a.id, "root", None).unwrap();
        let child = reply(&conn, &ada, a.id, "child", Some(root.id)).unwrap();
        assert_eq!(child.parent_post_id, Some(root.id));
        assert!(matches!(
            reply(&conn, &ada, b.id, "stray", Some(root.id)),
            Err(ForumError::Validation(_))
        ));
    }

    #[test]
    fn votes_replace_and_likes_toggle() {
        let conn = setup();
        let ada = user(&conn, "ada", Role::User);
        let bob = user(&conn, "bob", Role::User);
        let t = thread(&conn, &ada, "Poll");

        assert_eq!(vote(&conn, &ada, Target::Thread, t.id, VoteKind::Upvote).unwrap().vote_score, 1);
        assert_eq!(vote(&conn, &bob, Target::Thread, t.id, VoteKind::Upvote).unwrap().vote_score, 2);
        assert_eq!(vote(&conn, &ada, Target::Thread, t.id, VoteKind::Downvote).unwrap().vote_score, 0);
        let votes: i64 = conn
            .query_row("SELECT COUNT(*) FROM votes", [], |row| row.get(0))
            .unwrap();
        assert_eq!(votes, 2);

        let liked = toggle_like(&conn, &bob, Target::Thread, t.id).unwrap();
        assert_eq!(liked, LikeOutcome { liked: true, like_count: 1 });
        let unliked = toggle_like(&conn, &bob, Target::Thread, t.id).unwrap();
        assert_eq!(unliked, LikeOutcome { liked: false, like_count: 0 });

        assert!(matches!(
            vote(&conn, &ada, Target::Post, 77, VoteKind::Upvote),
            Err(ForumError::NotFound { entity: "post", id: 77 })
        ));
        assert!("comment".parse::<Target>().is_err());
    }

    #[test]
    fn attachments_check_extension_and_owner() {
        let conn = setup();
        let ada = user(&conn, "ada", Role::User);
        let bob = user(&conn, "bob", Role::User);
        let admin = user(&conn, "root", Role::Admin);
        let t = thread(&conn, &ada, "Files");

        assert!(allowed_attachment("Report.DOCX"));
        assert!(!allowed_attachment("script.sh"));
        assert!(!allowed_attachment("noext"));
        assert!(matches!(
            add_attachment(&conn, &ada, Target::Thread, t.id, &upload("run.exe")),
            Err(ForumError::Validation(_))
        ));
        assert!(matches!(
            add_attachment(&conn, &bob, Target::Thread, t.id, &upload("a.txt")),
            Err(ForumError::Forbidden(_))
        ));
        add_attachment(&conn, &admin, Target::Thread, t.id, &upload("a.txt")).unwrap();
    }

    #[test]
    fn delete_removes_everything_and_reports_files() {
        let conn = setup();
        let ada = user(&conn, "ada", Role::User);
        let t = thread(&conn, &ada, "Doomed");
        let keep = thread(&conn, &ada, "Survivor");
        let post = reply(&conn, &ada, t.id, "reply", None).unwrap();
        vote(&conn, &ada, Target::Post, post.id, VoteKind::Upvote).unwrap();
        toggle_like(&conn, &ada, Target::Thread, t.id).unwrap();
        add_attachment(&conn, &ada, Target::Thread, t.id, &upload("a.txt")).unwrap();
        add_attachment(&conn, &ada, Target::Post, post.id, &upload("b.pdf")).unwrap();
        add_attachment(&conn, &ada, Target::Thread, keep.id, &upload("c.txt")).unwrap();

        let mut files = delete_thread(&conn, t.id).unwrap();
        files.sort();
        assert_eq!(
            files,
            vec![
                "uploads/20240101_120000_a.txt".to_string(),
                "uploads/20240101_120000_b.pdf".to_string()
            ]
        );

        let remaining: (i64, i64, i64, i64, i64) = conn
            .query_row(
                "SELECT (SELECT COUNT(*) FROM threads), (SELECT COUNT(*) FROM posts),
                        (SELECT COUNT(*) FROM votes), (SELECT COUNT(*) FROM likes),
                        (SELECT COUNT(*) FROM attachments)",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
            )
            .unwrap();
        assert_eq!(remaining, (1, 0, 0, 0, 1));

        let stats = admin_stats(&conn).unwrap();
        assert_eq!(stats.totals.threads, 1);
        assert_eq!(stats.attachments, 1);
        assert_eq!(stats.top_users.len(), 1);
        assert_eq!(admin_threads(&conn).unwrap().len(), 1);
    }
}

//! Blog with categories, tags and threaded comments.
//!
//! Posts are addressed by a slug derived from their title. Published posts
//! are public; drafts are only visible to their author. Comments form a
//! two-level thread: top-level comments and their replies.

mod slug;

pub use slug::slugify;

use classroom_accounts::{SessionUser, User};
use classroom_db::{like_pattern, Query};
use classroom_types::PostStatus;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// File extensions accepted for featured images.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];

/// Largest accepted featured image, in bytes.
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// Errors that can occur during blog operations.
#[derive(Debug, Error)]
pub enum BlogError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("post not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Validation(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagCount {
    #[serde(flatten)]
    pub tag: Tag,
    pub post_count: i64,
}

/// A post joined with its author and category names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub excerpt: Option<String>,
    pub slug: String,
    pub status: PostStatus,
    pub featured: bool,
    pub category_id: Option<i64>,
    pub author_id: i64,
    pub view_count: i64,
    pub featured_image: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub author_name: String,
    pub category_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub user_id: i64,
    pub username: String,
    pub parent_id: Option<i64>,
    pub content: String,
    pub created_at: String,
}

/// A top-level comment with its approved replies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentThread {
    #[serde(flatten)]
    pub comment: Comment,
    pub replies: Vec<Comment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostDetail {
    pub post: Post,
    pub author_bio: Option<String>,
    pub tags: Vec<Tag>,
    pub comments: Vec<CommentThread>,
    pub related_posts: Vec<Post>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Home {
    pub featured_posts: Vec<Post>,
    pub recent_posts: Vec<Post>,
    pub categories: Vec<Category>,
    pub popular_tags: Vec<TagCount>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostFilters {
    /// Category name.
    pub category: Option<String>,
    /// Tag name.
    pub tag: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub excerpt: Option<String>,
    #[serde(default)]
    pub category_id: Option<i64>,
    /// Publish immediately instead of saving a draft.
    #[serde(default)]
    pub publish: bool,
    #[serde(default)]
    pub featured: bool,
    /// Comma-separated tag names. Unknown tags are created.
    #[serde(default)]
    pub tags: Option<String>,
}

/// A comment as listed on its author's profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileComment {
    pub id: i64,
    pub content: String,
    pub created_at: String,
    pub post_title: String,
    pub post_slug: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub user: User,
    pub posts: Vec<Post>,
    pub comments: Vec<ProfileComment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentComment {
    pub id: i64,
    pub username: String,
    pub post_title: String,
    pub content: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminStats {
    pub total_users: i64,
    pub total_posts: i64,
    pub total_comments: i64,
    pub pending_comments: i64,
    pub recent_posts: Vec<Post>,
    pub recent_comments: Vec<RecentComment>,
}

const POST_SELECT: &str = "SELECT p.id, p.title, p.content, p.excerpt, p.slug, p.status,
        p.featured, p.category_id, p.author_id, p.view_count, p.featured_image,
        p.created_at, p.updated_at, u.username, c.name
    FROM posts p
    JOIN users u ON p.author_id = u.id
    LEFT JOIN categories c ON p.category_id = c.id";

const VISIBLE_TO_VIEWER: &str = "(p.status = 'published' OR (p.status = 'draft' AND p.author_id = ?))";

const COMMENT_SELECT: &str = "SELECT c.id, c.post_id, c.user_id, u.username, c.parent_id,
        c.content, c.created_at
    FROM comments c JOIN users u ON c.user_id = u.id";

fn map_post(row: &Row<'_>) -> rusqlite::Result<Post> {
    Ok(Post {
        id: row.get(0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        excerpt: row.get(3)?,
        slug: row.get(4)?,
        status: row.get(5)?,
        featured: row.get(6)?,
        category_id: row.get(7)?,
        author_id: row.get(8)?,
        view_count: row.get(9)?,
        featured_image: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
        author_name: row.get(13)?,
        category_name: row.get(14)?,
    })
}

fn map_comment(row: &Row<'_>) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get(0)?,
        post_id: row.get(1)?,
        user_id: row.get(2)?,
        username: row.get(3)?,
        parent_id: row.get(4)?,
        content: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn viewer_id(viewer: Option<&SessionUser>) -> i64 {
    viewer.map_or(0, |v| v.id)
}

fn published_posts() -> Query {
    Query::new(POST_SELECT).filter("p.status = ?", PostStatus::Published)
}

/// Home page: three featured posts, six recent posts, categories and the
/// ten tags used by the most published posts.
pub fn home(conn: &Connection) -> Result<Home, BlogError> {
    let featured_posts = published_posts()
        .filter_raw("p.featured = 1")
        .order_by("p.created_at DESC, p.id DESC")
        .limit(3)
        .fetch(conn, map_post)?;
    let recent_posts = published_posts()
        .order_by("p.created_at DESC, p.id DESC")
        .limit(6)
        .fetch(conn, map_post)?;

    let mut stmt = conn.prepare(
        "SELECT t.id, t.name, t.color, COUNT(pt.post_id) AS post_count
         FROM tags t
         JOIN post_tags pt ON t.id = pt.tag_id
         JOIN posts p ON pt.post_id = p.id
         WHERE p.status = 'published'
         GROUP BY t.id
         ORDER BY post_count DESC, t.name
         LIMIT 10",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(TagCount {
            tag: Tag {
                id: row.get(0)?,
                name: row.get(1)?,
                color: row.get(2)?,
            },
            post_count: row.get(3)?,
        })
    })?;
    let mut popular_tags = Vec::new();
    for row in rows {
        popular_tags.push(row?);
    }

    Ok(Home {
        featured_posts,
        recent_posts,
        categories: list_categories(conn)?,
        popular_tags,
    })
}

/// Published posts plus the viewer's own drafts, newest first.
pub fn list_posts(
    conn: &Connection,
    viewer: Option<&SessionUser>,
    filters: &PostFilters,
) -> Result<Vec<Post>, BlogError> {
    let non_blank = |s: &Option<String>| {
        s.as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    let posts = Query::new(POST_SELECT)
        .filter(VISIBLE_TO_VIEWER, viewer_id(viewer))
        .filter_opt("c.name = ?", non_blank(&filters.category))
        .filter_opt(
            "p.id IN (SELECT pt.post_id FROM post_tags pt JOIN tags t ON pt.tag_id = t.id WHERE t.name = ?)",
            non_blank(&filters.tag),
        )
        .filter_opt(
            "(p.title LIKE ? ESCAPE '\\' OR p.content LIKE ? ESCAPE '\\' OR p.excerpt LIKE ? ESCAPE '\\')",
            non_blank(&filters.search).map(|s| like_pattern(&s)),
        )
        .order_by("p.created_at DESC, p.id DESC")
        .fetch(conn, map_post)?;
    Ok(posts)
}

/// Creates a post with a unique slug and links its tags, all in one
/// transaction.
pub fn create_post(conn: &Connection, author: &SessionUser, new: &NewPost) -> Result<Post, BlogError> {
    let (title, content) = (new.title.trim(), new.content.trim());
    if title.is_empty() || content.is_empty() {
        return Err(BlogError::Validation("Title and content are required".to_string()));
    }
    let status = if new.publish {
        PostStatus::Published
    } else {
        PostStatus::Draft
    };

    let tx = conn.unchecked_transaction()?;
    let slug = slug::unique_slug(&tx, title)?;
    tx.execute(
        "INSERT INTO posts (title, content, excerpt, slug, status, featured, category_id, author_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            title,
            content,
            new.excerpt.as_deref().unwrap_or(""),
            slug,
            status,
            new.featured,
            new.category_id,
            author.id
        ],
    )?;
    let post_id = tx.last_insert_rowid();

    let tag_names = new
        .tags
        .as_deref()
        .unwrap_or("")
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty());
    for name in tag_names {
        tx.execute("INSERT OR IGNORE INTO tags (name) VALUES (?1)", [name])?;
        tx.execute(
            "INSERT OR IGNORE INTO post_tags (post_id, tag_id)
             SELECT ?1, id FROM tags WHERE name = ?2",
            params![post_id, name],
        )?;
    }
    tx.commit()?;

    tracing::info!(post_id, slug = %slug, status = %status, "post created");
    fetch_post(conn, &slug)
}

fn fetch_post(conn: &Connection, slug: &str) -> Result<Post, BlogError> {
    conn.query_row(&format!("{POST_SELECT} WHERE p.slug = ?1"), [slug], map_post)
        .optional()?
        .ok_or_else(|| BlogError::NotFound(slug.to_string()))
}

/// The post at `slug` if `viewer` may see it; someone else's draft is
/// `NotFound`, same as a missing slug.
fn fetch_visible_post(
    conn: &Connection,
    viewer: Option<&SessionUser>,
    slug: &str,
) -> Result<Post, BlogError> {
    Query::new(POST_SELECT)
        .filter("p.slug = ?", slug.to_string())
        .filter(VISIBLE_TO_VIEWER, viewer_id(viewer))
        .fetch(conn, map_post)?
        .into_iter()
        .next()
        .ok_or_else(|| BlogError::NotFound(slug.to_string()))
}

/// A published post, or the viewer's own draft, with tags, approved
/// comment threads and up to three related posts. Each view increments the
/// post's view count.
pub fn view_post(
    conn: &Connection,
    viewer: Option<&SessionUser>,
    slug: &str,
) -> Result<PostDetail, BlogError> {
    let mut post = fetch_visible_post(conn, viewer, slug)?;

    conn.execute(
        "UPDATE posts SET view_count = view_count + 1 WHERE id = ?1",
        [post.id],
    )?;
    post.view_count += 1;

    let author_bio: Option<String> = conn.query_row(
        "SELECT bio FROM users WHERE id = ?1",
        [post.author_id],
        |row| row.get(0),
    )?;

    let mut stmt = conn.prepare(
        "SELECT t.id, t.name, t.color FROM tags t
         JOIN post_tags pt ON t.id = pt.tag_id
         WHERE pt.post_id = ?1 ORDER BY t.name",
    )?;
    let rows = stmt.query_map([post.id], |row| {
        Ok(Tag {
            id: row.get(0)?,
            name: row.get(1)?,
            color: row.get(2)?,
        })
    })?;
    let mut tags = Vec::new();
    for row in rows {
        tags.push(row?);
    }

    let top_level = Query::new(COMMENT_SELECT)
        .filter("c.post_id = ?", post.id)
        .filter_raw("c.is_approved = 1")
        .filter_raw("c.parent_id IS NULL")
        .order_by("c.created_at ASC, c.id ASC")
        .fetch(conn, map_comment)?;
    let mut comments = Vec::with_capacity(top_level.len());
    for comment in top_level {
        let replies = Query::new(COMMENT_SELECT)
            .filter("c.parent_id = ?", comment.id)
            .filter_raw("c.is_approved = 1")
            .order_by("c.created_at ASC, c.id ASC")
            .fetch(conn, map_comment)?;
        comments.push(CommentThread { comment, replies });
    }

    let related_posts = match post.category_id {
        Some(category_id) => published_posts()
            .filter("p.category_id = ?", category_id)
            .filter("p.id != ?", post.id)
            .order_by("p.created_at DESC, p.id DESC")
            .limit(3)
            .fetch(conn, map_post)?,
        None => Vec::new(),
    };

    Ok(PostDetail {
        post,
        author_bio,
        tags,
        comments,
        related_posts,
    })
}

/// Adds a comment, or a reply when `parent_id` names a comment on the same
/// post.
pub fn add_comment(
    conn: &Connection,
    user: &SessionUser,
    slug: &str,
    content: &str,
    parent_id: Option<i64>,
) -> Result<Comment, BlogError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(BlogError::Validation("Comment cannot be empty".to_string()));
    }
    let post = fetch_visible_post(conn, Some(user), slug)?;

    if let Some(parent_id) = parent_id {
        let same_post: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM comments WHERE id = ?1 AND post_id = ?2)",
            params![parent_id, post.id],
            |row| row.get(0),
        )?;
        if !same_post {
            return Err(BlogError::Validation(
                "parent comment does not belong to this post".to_string(),
            ));
        }
    }

    conn.execute(
        "INSERT INTO comments (post_id, user_id, parent_id, content) VALUES (?1, ?2, ?3, ?4)",
        params![post.id, user.id, parent_id, content],
    )?;
    let id = conn.last_insert_rowid();
    let comment = conn.query_row(
        &format!("{COMMENT_SELECT} WHERE c.id = ?1"),
        [id],
        map_comment,
    )?;
    Ok(comment)
}

/// Deletes a post together with its comments and tag links. Only the
/// author may delete a post.
pub fn delete_post(conn: &Connection, user: &SessionUser, slug: &str) -> Result<Post, BlogError> {
    let post = fetch_visible_post(conn, Some(user), slug)?;
    if post.author_id != user.id {
        return Err(BlogError::Forbidden(
            "You can only delete your own posts".to_string(),
        ));
    }

    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM comments WHERE post_id = ?1", [post.id])?;
    tx.execute("DELETE FROM post_tags WHERE post_id = ?1", [post.id])?;
    tx.execute("DELETE FROM posts WHERE id = ?1", [post.id])?;
    tx.commit()?;

    tracing::info!(post_id = post.id, slug, "post deleted");
    Ok(post)
}

/// Records `image_path` as the post's featured image and returns the post
/// with the previously stored path, if any. Only the author may do this.
pub fn set_featured_image(
    conn: &Connection,
    user: &SessionUser,
    slug: &str,
    image_path: &str,
) -> Result<(Post, Option<String>), BlogError> {
    let post = fetch_visible_post(conn, Some(user), slug)?;
    if post.author_id != user.id {
        return Err(BlogError::Forbidden(
            "You can only change your own posts".to_string(),
        ));
    }
    conn.execute(
        "UPDATE posts SET featured_image = ?1, updated_at = CURRENT_TIMESTAMP WHERE id = ?2",
        params![image_path, post.id],
    )?;
    let previous = post.featured_image;
    Ok((fetch_post(conn, slug)?, previous))
}

/// The user's account, all their posts, and their ten latest comments.
pub fn profile(conn: &Connection, user: &SessionUser) -> Result<Profile, BlogError> {
    let account = classroom_accounts::get_user(conn, user.id).map_err(|e| match e {
        classroom_accounts::AccountError::Database(e) => BlogError::Database(e),
        other => BlogError::NotFound(other.to_string()),
    })?;
    let posts = Query::new(POST_SELECT)
        .filter("p.author_id = ?", user.id)
        .order_by("p.created_at DESC, p.id DESC")
        .fetch(conn, map_post)?;
    let comments = Query::new(
        "SELECT c.id, c.content, c.created_at, p.title, p.slug
         FROM comments c JOIN posts p ON c.post_id = p.id",
    )
    .filter("c.user_id = ?", user.id)
    .order_by("c.created_at DESC, c.id DESC")
    .limit(10)
    .fetch(conn, |row| {
        Ok(ProfileComment {
            id: row.get(0)?,
            content: row.get(1)?,
            created_at: row.get(2)?,
            post_title: row.get(3)?,
            post_slug: row.get(4)?,
        })
    })?;

    Ok(Profile {
        user: account,
        posts,
        comments,
    })
}

pub fn list_categories(conn: &Connection) -> Result<Vec<Category>, BlogError> {
    let mut stmt = conn.prepare("SELECT id, name, description, color FROM categories ORDER BY name")?;
    let rows = stmt.query_map([], |row| {
        Ok(Category {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            color: row.get(3)?,
        })
    })?;
    let mut categories = Vec::new();
    for row in rows {
        categories.push(row?);
    }
    Ok(categories)
}

pub fn admin_stats(conn: &Connection) -> Result<AdminStats, BlogError> {
    let count = |sql: &str| -> rusqlite::Result<i64> { conn.query_row(sql, [], |row| row.get(0)) };
    let recent_posts = Query::new(POST_SELECT)
        .order_by("p.created_at DESC, p.id DESC")
        .limit(5)
        .fetch(conn, map_post)?;
    let recent_comments = Query::new(
        "SELECT c.id, u.username, p.title, c.content, c.created_at
         FROM comments c
         JOIN users u ON c.user_id = u.id
         JOIN posts p ON c.post_id = p.id",
    )
    .order_by("c.created_at DESC, c.id DESC")
    .limit(5)
    .fetch(conn, |row| {
        Ok(RecentComment {
            id: row.get(0)?,
            username: row.get(1)?,
            post_title: row.get(2)?,
            content: row.get(3)?,
            created_at: row.get(4)?,
        })
    })?;

    Ok(AdminStats {
        total_users: count("SELECT COUNT(*) FROM users")?,
        total_posts: count("SELECT COUNT(*) FROM posts")?,
        total_comments: count("SELECT COUNT(*) FROM comments")?,
        pending_comments: count("SELECT COUNT(*) FROM comments WHERE is_approved = 0")?,
        recent_posts,
        recent_comments,
    })
}

const WELCOME_CONTENT: &str = "This is our first blog post. Welcome to our platform where we share insights about technology, education, and more.

## Getting Started

This blog demonstrates a small but complete web application.

### Features
- User authentication
- Post management
- Comment system
- Tag-based organization

We hope you enjoy reading our content!";

/// Inserts the featured welcome post, authored by `author_id`, unless it
/// already exists.
pub fn seed_welcome_post(conn: &Connection, author_id: i64) -> Result<bool, BlogError> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO posts (title, content, excerpt, slug, status, featured, category_id, author_id)
         VALUES ('Welcome to Our Blog!', ?1, 'Welcome to our new blog platform!',
                 'welcome-to-our-blog', 'published', 1,
                 (SELECT id FROM categories WHERE name = 'Technology'), ?2)",
        params![WELCOME_CONTENT, author_id],
    )?;
    if inserted > 0 {
        tracing::info!("seeded welcome post");
    }
    Ok(inserted > 0)
}

//! URL slugs derived from post titles.

use rusqlite::Connection;

/// Lowercases `title`, drops everything except word characters, whitespace
/// and hyphens, then joins the remaining words with single hyphens.
///
/// ```
/// assert_eq!(classroom_blog::slugify("Hello, World!  2024 -- Recap"), "hello-world-2024-recap");
/// ```
pub fn slugify(title: &str) -> String {
    let kept: String = title
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-' || c.is_whitespace())
        .collect();

    let mut slug = String::with_capacity(kept.len());
    let mut pending_separator = false;
    for c in kept.chars() {
        if c == '-' || c.is_whitespace() {
            pending_separator = true;
            continue;
        }
        if pending_separator && !slug.is_empty() {
            slug.push('-');
        }
        pending_separator = false;
        slug.push(c);
    }
    slug
}

/// Returns a slug for `title` not yet used by any post: the plain slug,
/// else the first free of `slug-2`, `slug-3`, ...
pub(crate) fn unique_slug(conn: &Connection, title: &str) -> rusqlite::Result<String> {
    let base = match slugify(title) {
        s if s.is_empty() => "post".to_string(),
        s => s,
    };
    let taken = |candidate: &str| -> rusqlite::Result<bool> {
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM posts WHERE slug = ?1)",
            [candidate],
            |row| row.get(0),
        )
    };

    if !taken(&base)? {
        return Ok(base);
    }
    let mut n = 2;
    loop {
        let candidate = format!("{base}-{n}");
        if !taken(&candidate)? {
            return Ok(candidate);
        }
        n += 1;
    }
}

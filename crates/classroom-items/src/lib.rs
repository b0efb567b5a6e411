//! Basic item manager: items with a name and description, keyword search,
//! and a contact form whose messages admins read on their dashboard.

use classroom_db::{like_pattern, Query};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during item operations.
#[derive(Debug, Error)]
pub enum ItemError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("item not found: {0}")]
    NotFound(i64),
    #[error("{0}")]
    Validation(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    pub name: String,
    pub description: String,
}

/// A message submitted through the contact form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactMessage {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub message: String,
    pub created_at: String,
}

fn map_item(row: &Row<'_>) -> rusqlite::Result<Item> {
    Ok(Item {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
    })
}

pub fn list_items(conn: &Connection) -> Result<Vec<Item>, ItemError> {
    let items = Query::new("SELECT id, name, description FROM items")
        .order_by("id")
        .fetch(conn, map_item)?;
    Ok(items)
}

/// Creates an item. Both fields are trimmed and must be non-empty.
pub fn create_item(conn: &Connection, name: &str, description: &str) -> Result<Item, ItemError> {
    let (name, description) = (name.trim(), description.trim());
    if name.is_empty() || description.is_empty() {
        return Err(ItemError::Validation(
            "name and description are required".to_string(),
        ));
    }
    conn.execute(
        "INSERT INTO items (name, description) VALUES (?1, ?2)",
        params![name, description],
    )?;
    let id = conn.last_insert_rowid();
    tracing::info!(item_id = id, "item created");
    Ok(Item {
        id,
        name: name.to_string(),
        description: description.to_string(),
    })
}

pub fn get_item(conn: &Connection, id: i64) -> Result<Item, ItemError> {
    conn.query_row(
        "SELECT id, name, description FROM items WHERE id = ?1",
        [id],
        map_item,
    )
    .optional()?
    .ok_or(ItemError::NotFound(id))
}

/// Replaces both fields of an item.
///
/// When either trimmed field is empty the edit is ignored and the stored
/// item is returned unchanged.
pub fn update_item(
    conn: &Connection,
    id: i64,
    name: &str,
    description: &str,
) -> Result<Item, ItemError> {
    let current = get_item(conn, id)?;
    let (name, description) = (name.trim(), description.trim());
    if name.is_empty() || description.is_empty() {
        return Ok(current);
    }
    conn.execute(
        "UPDATE items SET name = ?1, description = ?2 WHERE id = ?3",
        params![name, description, id],
    )?;
    get_item(conn, id)
}

/// Deletes an item. Deleting an id that does not exist is a no-op.
pub fn delete_item(conn: &Connection, id: i64) -> Result<(), ItemError> {
    let removed = conn.execute("DELETE FROM items WHERE id = ?1", [id])?;
    tracing::debug!(item_id = id, removed, "item delete");
    Ok(())
}

/// Items whose name or description contains `query`. A blank query
/// matches nothing.
pub fn search_items(conn: &Connection, query: &str) -> Result<Vec<Item>, ItemError> {
    let query = query.trim();
    if query.is_empty() {
        return Ok(Vec::new());
    }
    let items = Query::new("SELECT id, name, description FROM items")
        .filter(
            "(name LIKE ? ESCAPE '\\' OR description LIKE ? ESCAPE '\\')",
            like_pattern(query),
        )
        .order_by("id")
        .fetch(conn, map_item)?;
    Ok(items)
}

/// Stores a contact-form message. All fields are trimmed and required.
pub fn create_contact_message(
    conn: &Connection,
    name: &str,
    email: &str,
    message: &str,
) -> Result<i64, ItemError> {
    let (name, email, message) = (name.trim(), email.trim(), message.trim());
    if name.is_empty() || email.is_empty() || message.is_empty() {
        return Err(ItemError::Validation(
            "name, email and message are required".to_string(),
        ));
    }
    conn.execute(
        "INSERT INTO contact_messages (name, email, message) VALUES (?1, ?2, ?3)",
        params![name, email, message],
    )?;
    Ok(conn.last_insert_rowid())
}

/// All contact messages, newest first.
pub fn list_contact_messages(conn: &Connection) -> Result<Vec<ContactMessage>, ItemError> {
    let messages = Query::new(
        "SELECT id, name, email, message, created_at FROM contact_messages",
    )
    .order_by("created_at DESC, id DESC")
    .fetch(conn, |row| {
        Ok(ContactMessage {
            id: row.get(0)?,
            name: row.get(1)?,
            email: row.get(2)?,
            message: row.get(3)?,
            created_at: row.get(4)?,
        })
    })?;
    Ok(messages)
}

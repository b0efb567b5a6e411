//! Starter project: personal item lists with categories and tags.
//!
//! Every item belongs to exactly one user. All reads and writes are scoped
//! to the owner, so another user's item behaves as if it did not exist.

use std::collections::BTreeSet;

use classroom_db::{like_pattern, Query};
use classroom_types::ItemStatus;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StarterError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("item not found: {0}")]
    NotFound(i64),
    #[error("{0}")]
    Validation(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub status: ItemStatus,
    pub category_id: i64,
    pub category_name: String,
    pub owner_id: i64,
    pub created_at: String,
    pub updated_at: String,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemFilters {
    pub q: Option<String>,
    pub category_id: Option<i64>,
    pub tag_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemInput {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<ItemStatus>,
    pub category_id: Option<i64>,
    #[serde(default)]
    pub tag_ids: Vec<i64>,
}

/// Home page totals for one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counts {
    pub item_count: i64,
    pub category_count: i64,
    pub tag_count: i64,
}

const ITEM_SELECT: &str = "SELECT i.id, i.name, i.description, i.status, i.category_id, c.name,
        i.owner_id, i.created_at, i.updated_at
     FROM items i
     JOIN categories c ON c.id = i.category_id";

fn map_item(row: &Row<'_>) -> rusqlite::Result<Item> {
    Ok(Item {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        status: row.get(3)?,
        category_id: row.get(4)?,
        category_name: row.get(5)?,
        owner_id: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
        tags: Vec::new(),
    })
}

fn item_tags(conn: &Connection, item_id: i64) -> rusqlite::Result<Vec<Tag>> {
    let mut stmt = conn.prepare(
        "SELECT t.id, t.name FROM tags t
         JOIN item_tags it ON it.tag_id = t.id
         WHERE it.item_id = ?1
         ORDER BY t.name",
    )?;
    let rows = stmt.query_map([item_id], |row| {
        Ok(Tag {
            id: row.get(0)?,
            name: row.get(1)?,
        })
    })?;
    rows.collect()
}

pub fn counts(conn: &Connection, owner_id: i64) -> Result<Counts, StarterError> {
    Ok(conn.query_row(
        "SELECT (SELECT COUNT(*) FROM items WHERE owner_id = ?1),
                (SELECT COUNT(*) FROM categories),
                (SELECT COUNT(*) FROM tags)",
        [owner_id],
        |row| {
            Ok(Counts {
                item_count: row.get(0)?,
                category_count: row.get(1)?,
                tag_count: row.get(2)?,
            })
        },
    )?)
}

pub fn list_categories(conn: &Connection) -> Result<Vec<Category>, StarterError> {
    let mut stmt = conn.prepare("SELECT id, name FROM categories ORDER BY name")?;
    let rows = stmt.query_map([], |row| {
        Ok(Category {
            id: row.get(0)?,
            name: row.get(1)?,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub fn list_tags(conn: &Connection) -> Result<Vec<Tag>, StarterError> {
    let mut stmt = conn.prepare("SELECT id, name FROM tags ORDER BY name")?;
    let rows = stmt.query_map([], |row| {
        Ok(Tag {
            id: row.get(0)?,
            name: row.get(1)?,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// The owner's items, newest first, optionally narrowed by a name search,
/// a category and a tag.
pub fn list_items(
    conn: &Connection,
    owner_id: i64,
    filters: &ItemFilters,
) -> Result<Vec<Item>, StarterError> {
    let q = filters
        .q
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(like_pattern);
    let mut items = Query::new(ITEM_SELECT)
        .filter("i.owner_id = ?", owner_id)
        .filter_opt("i.name LIKE ? ESCAPE '\\'", q)
        .filter_opt("i.category_id = ?", filters.category_id)
        .filter_opt(
            "i.id IN (SELECT it.item_id FROM item_tags it WHERE it.tag_id = ?)",
            filters.tag_id,
        )
        .order_by("i.created_at DESC, i.id DESC")
        .fetch(conn, map_item)?;
    for item in &mut items {
        item.tags = item_tags(conn, item.id)?;
    }
    Ok(items)
}

pub fn get_item(conn: &Connection, owner_id: i64, id: i64) -> Result<Item, StarterError> {
    let mut item = conn
        .query_row(
            &format!("{ITEM_SELECT} WHERE i.id = ?1 AND i.owner_id = ?2"),
            params![id, owner_id],
            map_item,
        )
        .optional()?
        .ok_or(StarterError::NotFound(id))?;
    item.tags = item_tags(conn, id)?;
    Ok(item)
}

struct ValidItem {
    name: String,
    description: String,
    status: ItemStatus,
    category_id: i64,
    tag_ids: BTreeSet<i64>,
}

fn validate(conn: &Connection, input: &ItemInput) -> Result<ValidItem, StarterError> {
    let name = input.name.trim();
    let category_id = match input.category_id {
        Some(id) if !name.is_empty() => id,
        _ => {
            return Err(StarterError::Validation(
                "Name and category are required.".to_string(),
            ))
        }
    };
    let known: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM categories WHERE id = ?1)",
        [category_id],
        |row| row.get(0),
    )?;
    if !known {
        return Err(StarterError::Validation(format!(
            "Unknown category: {category_id}"
        )));
    }

    let tag_ids: BTreeSet<i64> = input.tag_ids.iter().copied().collect();
    for tag_id in &tag_ids {
        let known: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM tags WHERE id = ?1)",
            [tag_id],
            |row| row.get(0),
        )?;
        if !known {
            return Err(StarterError::Validation(format!("Unknown tag: {tag_id}")));
        }
    }

    Ok(ValidItem {
        name: name.to_string(),
        description: input.description.as_deref().unwrap_or("").trim().to_string(),
        status: input.status.unwrap_or(ItemStatus::Active),
        category_id,
        tag_ids,
    })
}

pub fn create_item(
    conn: &Connection,
    owner_id: i64,
    input: &ItemInput,
) -> Result<Item, StarterError> {
    let v = validate(conn, input)?;

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO items (name, description, status, category_id, owner_id)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![v.name, v.description, v.status, v.category_id, owner_id],
    )?;
    let id = tx.last_insert_rowid();
    for tag_id in &v.tag_ids {
        tx.execute(
            "INSERT OR IGNORE INTO item_tags (item_id, tag_id) VALUES (?1, ?2)",
            params![id, tag_id],
        )?;
    }
    tx.commit()?;

    tracing::info!(item_id = id, owner_id, tags = v.tag_ids.len(), "item created");
    get_item(conn, owner_id, id)
}

/// Replaces an item's fields. Tags are reconciled against the submitted
/// set: only the tags that were added or removed are written.
pub fn update_item(
    conn: &Connection,
    owner_id: i64,
    id: i64,
    input: &ItemInput,
) -> Result<Item, StarterError> {
    let current = get_item(conn, owner_id, id)?;
    let v = validate(conn, input)?;
    let existing: BTreeSet<i64> = current.tags.iter().map(|t| t.id).collect();

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE items
         SET name = ?1, description = ?2, status = ?3, category_id = ?4,
             updated_at = datetime('now')
         WHERE id = ?5 AND owner_id = ?6",
        params![v.name, v.description, v.status, v.category_id, id, owner_id],
    )?;
    for tag_id in existing.difference(&v.tag_ids) {
        tx.execute(
            "DELETE FROM item_tags WHERE item_id = ?1 AND tag_id = ?2",
            params![id, tag_id],
        )?;
    }
    for tag_id in v.tag_ids.difference(&existing) {
        tx.execute(
            "INSERT OR IGNORE INTO item_tags (item_id, tag_id) VALUES (?1, ?2)",
            params![id, tag_id],
        )?;
    }
    tx.commit()?;

    get_item(conn, owner_id, id)
}

/// Deletes one of the owner's items. Missing or foreign ids are a no-op.
pub fn delete_item(conn: &Connection, owner_id: i64, id: i64) -> Result<(), StarterError> {
    let removed = conn.execute(
        "DELETE FROM items WHERE id = ?1 AND owner_id = ?2",
        params![id, owner_id],
    )?;
    if removed > 0 {
        tracing::info!(item_id = id, owner_id, "item deleted");
    }
    Ok(())
}

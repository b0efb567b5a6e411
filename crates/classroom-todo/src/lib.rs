//! Todo list with categories, comma-separated tags, priorities and due
//! dates. There are no accounts: every visitor shares one list.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use classroom_db::Query;
use classroom_types::TodoPriority;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during todo operations.
#[derive(Debug, Error)]
pub enum TodoError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("todo not found: {0}")]
    NotFound(i64),
    #[error("{0}")]
    Validation(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Todo {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    /// Normalized comma-separated tags, e.g. `"home,urgent"`.
    pub tags: Option<String>,
    pub due_date: Option<String>,
    pub priority: TodoPriority,
    pub completed: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TodoInput {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Option<String>,
    /// `YYYY-MM-DD`; blank means no due date.
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub priority: Option<TodoPriority>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TodoFilters {
    pub category: Option<String>,
    pub tag: Option<String>,
    pub priority: Option<TodoPriority>,
}

/// List ordering. Unrecognized keys fall back to [`TodoSort::DueDate`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoSort {
    /// Earliest due first, undated last.
    #[default]
    DueDate,
    /// High, Medium, Low.
    Priority,
    /// Newest first.
    CreatedAt,
    Title,
}

impl TodoSort {
    pub fn from_param(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("priority") => Self::Priority,
            Some("created_at") => Self::CreatedAt,
            Some("title") => Self::Title,
            _ => Self::DueDate,
        }
    }

    fn clause(self) -> &'static str {
        match self {
            Self::DueDate => "CASE WHEN due_date IS NULL THEN 1 ELSE 0 END, due_date ASC, id",
            Self::Priority => {
                "CASE priority WHEN 'High' THEN 1 WHEN 'Medium' THEN 2 WHEN 'Low' THEN 3 ELSE 4 END, id"
            }
            Self::CreatedAt => "created_at DESC, id DESC",
            Self::Title => "title ASC, id",
        }
    }
}

/// The todo list page: matching todos plus the distinct categories and tags
/// available for filtering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TodoList {
    pub todos: Vec<Todo>,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
    pub sort: TodoSort,
}

const TODO_SELECT: &str =
    "SELECT id, title, description, category, tags, due_date, priority, completed, created_at FROM todos";

fn map_todo(row: &Row<'_>) -> rusqlite::Result<Todo> {
    Ok(Todo {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        category: row.get(3)?,
        tags: row.get(4)?,
        due_date: row.get(5)?,
        priority: row.get(6)?,
        completed: row.get(7)?,
        created_at: row.get(8)?,
    })
}

/// Splits a comma-separated tag string into trimmed, non-empty tags.
pub fn split_tags(tags: &str) -> impl Iterator<Item = &str> {
    tags.split(',').map(str::trim).filter(|t| !t.is_empty())
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub fn list_todos(
    conn: &Connection,
    filters: &TodoFilters,
    sort: TodoSort,
) -> Result<TodoList, TodoError> {
    let tag = non_blank(&filters.tag);
    let mut query = Query::new(TODO_SELECT)
        .filter_opt("category = ?", non_blank(&filters.category))
        .filter_opt("priority = ?", filters.priority);
    // Stored tags are comma-joined without padding; a value with a comma
    // names no single tag.
    query = match tag {
        Some(t) if t.contains(',') => query.filter_raw("0 = 1"),
        t => query.filter_opt("instr(',' || tags || ',', ',' || ? || ',') > 0", t),
    };
    let todos = query.order_by(sort.clause()).fetch(conn, map_todo)?;

    let categories = Query::new("SELECT DISTINCT category FROM todos")
        .filter_raw("category IS NOT NULL")
        .filter_raw("category != ''")
        .order_by("category")
        .fetch(conn, |row| row.get(0))?;

    let tag_rows: Vec<String> = Query::new("SELECT tags FROM todos")
        .filter_raw("tags IS NOT NULL")
        .filter_raw("tags != ''")
        .fetch(conn, |row| row.get(0))?;
    let tags: BTreeSet<String> = tag_rows
        .iter()
        .flat_map(|t| split_tags(t))
        .map(str::to_string)
        .collect();

    Ok(TodoList {
        todos,
        categories,
        tags: tags.into_iter().collect(),
        sort,
    })
}

struct ValidTodo {
    title: String,
    description: String,
    category: String,
    tags: String,
    due_date: Option<String>,
    priority: TodoPriority,
}

fn validate(input: &TodoInput) -> Result<ValidTodo, TodoError> {
    let title = input.title.trim();
    if title.is_empty() {
        return Err(TodoError::Validation("Title is required!".to_string()));
    }
    let due_date = non_blank(&input.due_date);
    if let Some(date) = &due_date {
        NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map_err(|_| TodoError::Validation(format!("Invalid due date: {date}")))?;
    }
    Ok(ValidTodo {
        title: title.to_string(),
        description: input.description.as_deref().unwrap_or("").trim().to_string(),
        category: non_blank(&input.category).unwrap_or_else(|| "General".to_string()),
        tags: split_tags(input.tags.as_deref().unwrap_or(""))
            .collect::<Vec<_>>()
            .join(","),
        due_date,
        priority: input.priority.unwrap_or(TodoPriority::Medium),
    })
}

pub fn create_todo(conn: &Connection, input: &TodoInput) -> Result<Todo, TodoError> {
    let t = validate(input)?;
    conn.execute(
        "INSERT INTO todos (title, description, category, tags, due_date, priority)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![t.title, t.description, t.category, t.tags, t.due_date, t.priority],
    )?;
    let id = conn.last_insert_rowid();
    tracing::info!(todo_id = id, "todo created");
    get_todo(conn, id)
}

pub fn get_todo(conn: &Connection, id: i64) -> Result<Todo, TodoError> {
    conn.query_row(&format!("{TODO_SELECT} WHERE id = ?1"), [id], map_todo)
        .optional()?
        .ok_or(TodoError::NotFound(id))
}

pub fn update_todo(conn: &Connection, id: i64, input: &TodoInput) -> Result<Todo, TodoError> {
    let t = validate(input)?;
    let changed = conn.execute(
        "UPDATE todos
         SET title = ?1, description = ?2, category = ?3, tags = ?4, due_date = ?5, priority = ?6
         WHERE id = ?7",
        params![t.title, t.description, t.category, t.tags, t.due_date, t.priority, id],
    )?;
    if changed == 0 {
        return Err(TodoError::NotFound(id));
    }
    get_todo(conn, id)
}

/// Deletes a todo. A missing id is a no-op.
pub fn delete_todo(conn: &Connection, id: i64) -> Result<(), TodoError> {
    conn.execute("DELETE FROM todos WHERE id = ?1", [id])?;
    Ok(())
}

/// Flips the completed flag and returns the updated todo.
pub fn toggle_todo(conn: &Connection, id: i64) -> Result<Todo, TodoError> {
    let changed = conn.execute(
        "UPDATE todos SET completed = 1 - completed WHERE id = ?1",
        [id],
    )?;
    if changed == 0 {
        return Err(TodoError::NotFound(id));
    }
    get_todo(conn, id)
}

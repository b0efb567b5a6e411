//! Parameterized query composition.
//!
//! List endpoints build their `WHERE` clause from optional filters. Instead
//! of concatenating values into SQL, fragments carry `?` placeholders and
//! the values travel alongside in bind order.

use rusqlite::types::ToSql;
use rusqlite::{params_from_iter, Connection, Row};

/// A `SELECT` statement with optional filters, ordering and limit.
///
/// ```
/// use classroom_db::Query;
///
/// let q = Query::new("SELECT * FROM todos")
///     .filter("category = ?", "Home".to_string())
///     .filter("(title LIKE ? OR description LIKE ?)", "%milk%".to_string())
///     .order_by("created_at DESC");
/// assert_eq!(
///     q.sql(),
///     "SELECT * FROM todos WHERE category = ? AND (title LIKE ? OR description LIKE ?) ORDER BY created_at DESC"
/// );
/// assert_eq!(q.param_count(), 3);
/// ```
pub struct Query {
    base: String,
    conditions: Vec<String>,
    values: Vec<Box<dyn ToSql>>,
    group: Option<&'static str>,
    order: Option<&'static str>,
    limit: Option<i64>,
}

impl Query {
    /// Starts a query from a `SELECT ... FROM ... JOIN ...` without `WHERE`.
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            conditions: Vec::new(),
            values: Vec::new(),
            group: None,
            order: None,
            limit: None,
        }
    }

    /// Adds a condition, binding `value` once for every `?` in `fragment`.
    pub fn filter<V>(mut self, fragment: &str, value: V) -> Self
    where
        V: ToSql + Clone + 'static,
    {
        let placeholders = fragment.matches('?').count();
        for _ in 0..placeholders {
            self.values.push(Box::new(value.clone()));
        }
        self.conditions.push(fragment.to_string());
        self
    }

    /// Adds the condition only when `value` is present.
    pub fn filter_opt<V>(self, fragment: &str, value: Option<V>) -> Self
    where
        V: ToSql + Clone + 'static,
    {
        match value {
            Some(v) => self.filter(fragment, v),
            None => self,
        }
    }

    /// Adds a condition that binds no values.
    pub fn filter_raw(mut self, fragment: &str) -> Self {
        self.conditions.push(fragment.to_string());
        self
    }

    /// Sets the `GROUP BY` clause, rendered after the conditions.
    pub fn group_by(mut self, clause: &'static str) -> Self {
        self.group = Some(clause);
        self
    }

    /// Sets the `ORDER BY` clause. Only static clauses are accepted so a
    /// caller-supplied sort key must first be mapped onto a known clause.
    pub fn order_by(mut self, clause: &'static str) -> Self {
        self.order = Some(clause);
        self
    }

    /// Limits the number of rows returned.
    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Number of values that will be bound.
    pub fn param_count(&self) -> usize {
        self.values.len() + usize::from(self.limit.is_some())
    }

    /// Renders the final SQL text.
    pub fn sql(&self) -> String {
        let mut sql = self.base.clone();
        if !self.conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.conditions.join(" AND "));
        }
        if let Some(group) = self.group {
            sql.push_str(" GROUP BY ");
            sql.push_str(group);
        }
        if let Some(order) = self.order {
            sql.push_str(" ORDER BY ");
            sql.push_str(order);
        }
        if self.limit.is_some() {
            sql.push_str(" LIMIT ?");
        }
        sql
    }

    /// Executes the query and maps every row with `f`.
    pub fn fetch<T, F>(&self, conn: &Connection, f: F) -> rusqlite::Result<Vec<T>>
    where
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let mut params: Vec<&dyn ToSql> = self.values.iter().map(|v| v.as_ref()).collect();
        if let Some(limit) = &self.limit {
            params.push(limit);
        }
        let mut stmt = conn.prepare(&self.sql())?;
        let rows = stmt.query_map(params_from_iter(params), f)?;
        rows.collect()
    }
}

/// A partial `UPDATE` that only touches the columns that were set.
pub struct UpdateSet {
    table: &'static str,
    assignments: Vec<String>,
    values: Vec<Box<dyn ToSql>>,
}

impl UpdateSet {
    /// Starts an update of `table`.
    pub fn new(table: &'static str) -> Self {
        Self {
            table,
            assignments: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Assigns `value` to `column`.
    pub fn set<V>(mut self, column: &'static str, value: V) -> Self
    where
        V: ToSql + 'static,
    {
        self.assignments.push(format!("{column} = ?"));
        self.values.push(Box::new(value));
        self
    }

    /// Assigns `value` to `column` when present.
    pub fn set_opt<V>(self, column: &'static str, value: Option<V>) -> Self
    where
        V: ToSql + 'static,
    {
        match value {
            Some(v) => self.set(column, v),
            None => self,
        }
    }

    /// True when no column has been assigned.
    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    /// Runs the update for the row whose `id` matches, also setting each of
    /// `touch` to `CURRENT_TIMESTAMP`. Returns `None` without touching the
    /// database when nothing was assigned, otherwise the affected row count.
    pub fn execute(
        self,
        conn: &Connection,
        id: i64,
        touch: &[&str],
    ) -> rusqlite::Result<Option<usize>> {
        if self.is_empty() {
            return Ok(None);
        }
        let mut assignments = self.assignments;
        assignments.extend(touch.iter().map(|c| format!("{c} = CURRENT_TIMESTAMP")));
        let sql = format!(
            "UPDATE {} SET {} WHERE id = ?",
            self.table,
            assignments.join(", ")
        );
        let mut params: Vec<&dyn ToSql> = self.values.iter().map(|v| v.as_ref()).collect();
        params.push(&id);
        conn.execute(&sql, params_from_iter(params)).map(Some)
    }
}

/// Wraps `term` for a substring `LIKE` match, escaping `%`, `_` and `\`
/// so they match literally. The fragment must say `LIKE ? ESCAPE '\'`.
pub fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

//! Help desk ticketing.
//!
//! Customers open tickets, agents and admins respond and move them through
//! `open → in_progress → resolved → closed`. What a user sees is scoped by
//! role: admins see every ticket, agents the tickets assigned to them, and
//! customers their own.
//!
//! Status transitions are not constrained. Every update reports the
//! previous and the new status so callers can surface unusual transitions
//! such as reopening a closed ticket.

use classroom_accounts::SessionUser;
use classroom_db::{Query, UpdateSet};
use classroom_types::{Role, TicketPriority, TicketStatus};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during help desk operations.
#[derive(Debug, Error)]
pub enum HelpdeskError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("ticket not found: {0}")]
    NotFound(i64),
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

/// A ticket joined with the names of its customer, agent and category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub status: TicketStatus,
    pub priority: TicketPriority,
    pub category_id: Option<i64>,
    pub customer_id: i64,
    pub assigned_agent_id: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
    pub customer_name: String,
    pub agent_name: Option<String>,
    pub category_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub id: i64,
    pub ticket_id: i64,
    pub user_id: i64,
    pub username: String,
    pub message: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id: i64,
    pub username: String,
}

/// A ticket with its conversation. `agents` is only filled for admins,
/// who may reassign the ticket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketDetail {
    pub ticket: Ticket,
    pub responses: Vec<Response>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agents: Option<Vec<Agent>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketStats {
    pub total: i64,
    pub open: i64,
    pub in_progress: i64,
    pub resolved: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dashboard {
    pub stats: TicketStats,
    pub recent_tickets: Vec<Ticket>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TicketFilters {
    pub status: Option<TicketStatus>,
    pub priority: Option<TicketPriority>,
    pub category_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTicket {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub category_id: Option<i64>,
    #[serde(default = "default_priority")]
    pub priority: TicketPriority,
}

fn default_priority() -> TicketPriority {
    TicketPriority::Medium
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TicketUpdate {
    pub status: Option<TicketStatus>,
    pub priority: Option<TicketPriority>,
    pub assigned_agent_id: Option<i64>,
}

/// Result of [`update_ticket`]. `changed` is false when the update carried
/// no fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketUpdateOutcome {
    pub ticket: Ticket,
    pub previous_status: TicketStatus,
    pub status: TicketStatus,
    pub changed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminStats {
    pub total_users: i64,
    pub customers: i64,
    pub agents: i64,
    pub total_tickets: i64,
    pub open_tickets: i64,
    pub recent_tickets: Vec<Ticket>,
}

const TICKET_SELECT: &str = "SELECT t.id, t.title, t.description, t.status, t.priority,
        t.category_id, t.customer_id, t.assigned_agent_id, t.created_at, t.updated_at,
        u.username, a.username, c.name
    FROM tickets t
    JOIN users u ON t.customer_id = u.id
    LEFT JOIN users a ON t.assigned_agent_id = a.id
    LEFT JOIN categories c ON t.category_id = c.id";

fn map_ticket(row: &Row<'_>) -> rusqlite::Result<Ticket> {
    Ok(Ticket {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        status: row.get(3)?,
        priority: row.get(4)?,
        category_id: row.get(5)?,
        customer_id: row.get(6)?,
        assigned_agent_id: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
        customer_name: row.get(10)?,
        agent_name: row.get(11)?,
        category_name: row.get(12)?,
    })
}

/// Restricts `query` to the tickets `user` may see.
fn scoped(query: Query, user: &SessionUser) -> Query {
    match user.role {
        Role::Admin => query,
        Role::Agent => query.filter("t.assigned_agent_id = ?", user.id),
        _ => query.filter("t.customer_id = ?", user.id),
    }
}

fn is_staff(user: &SessionUser) -> bool {
    matches!(user.role, Role::Agent | Role::Admin)
}

/// Ticket counts for the user's scope plus the five most recently updated
/// tickets. Agents and admins see recent activity across all tickets.
pub fn dashboard(conn: &Connection, user: &SessionUser) -> Result<Dashboard, HelpdeskError> {
    let stats = scoped(
        Query::new(
            "SELECT COUNT(*),
                COALESCE(SUM(t.status = 'open'), 0),
                COALESCE(SUM(t.status = 'in_progress'), 0),
                COALESCE(SUM(t.status = 'resolved'), 0)
             FROM tickets t",
        ),
        user,
    )
    .fetch(conn, |row| {
        Ok(TicketStats {
            total: row.get(0)?,
            open: row.get(1)?,
            in_progress: row.get(2)?,
            resolved: row.get(3)?,
        })
    })?
    .into_iter()
    .next()
    .unwrap_or_default();

    let recent = Query::new(TICKET_SELECT);
    let recent = if is_staff(user) {
        recent
    } else {
        recent.filter("t.customer_id = ?", user.id)
    };
    let recent_tickets = recent
        .order_by("t.updated_at DESC, t.id DESC")
        .limit(5)
        .fetch(conn, map_ticket)?;

    Ok(Dashboard {
        stats,
        recent_tickets,
    })
}

/// Tickets visible to `user`, most recently updated first.
pub fn list_tickets(
    conn: &Connection,
    user: &SessionUser,
    filters: &TicketFilters,
) -> Result<Vec<Ticket>, HelpdeskError> {
    let tickets = scoped(Query::new(TICKET_SELECT), user)
        .filter_opt("t.status = ?", filters.status)
        .filter_opt("t.priority = ?", filters.priority)
        .filter_opt("t.category_id = ?", filters.category_id)
        .order_by("t.updated_at DESC, t.id DESC")
        .fetch(conn, map_ticket)?;
    Ok(tickets)
}

pub fn create_ticket(
    conn: &Connection,
    customer: &SessionUser,
    new: &NewTicket,
) -> Result<Ticket, HelpdeskError> {
    let (title, description) = (new.title.trim(), new.description.trim());
    if title.is_empty() || description.is_empty() {
        return Err(HelpdeskError::Validation(
            "title and description are required".to_string(),
        ));
    }
    conn.execute(
        "INSERT INTO tickets (title, description, category_id, priority, customer_id)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![title, description, new.category_id, new.priority, customer.id],
    )?;
    let id = conn.last_insert_rowid();
    tracing::info!(ticket_id = id, customer_id = customer.id, "ticket created");
    fetch_ticket(conn, id)
}

fn fetch_ticket(conn: &Connection, id: i64) -> Result<Ticket, HelpdeskError> {
    conn.query_row(&format!("{TICKET_SELECT} WHERE t.id = ?1"), [id], map_ticket)
        .optional()?
        .ok_or(HelpdeskError::NotFound(id))
}

fn ensure_visible(user: &SessionUser, ticket: &Ticket) -> Result<(), HelpdeskError> {
    if !is_staff(user) && ticket.customer_id != user.id {
        return Err(HelpdeskError::Forbidden(
            "you can only access your own tickets".to_string(),
        ));
    }
    Ok(())
}

/// A ticket with its responses in creation order. Customers may only view
/// their own tickets.
pub fn get_ticket(
    conn: &Connection,
    user: &SessionUser,
    id: i64,
) -> Result<TicketDetail, HelpdeskError> {
    let ticket = fetch_ticket(conn, id)?;
    ensure_visible(user, &ticket)?;

    let mut stmt = conn.prepare(
        "SELECT r.id, r.ticket_id, r.user_id, u.username, r.message, r.created_at
         FROM responses r JOIN users u ON r.user_id = u.id
         WHERE r.ticket_id = ?1
         ORDER BY r.created_at ASC, r.id ASC",
    )?;
    let rows = stmt.query_map([id], map_response)?;
    let mut responses = Vec::new();
    for row in rows {
        responses.push(row?);
    }

    let agents = if user.role == Role::Admin {
        Some(list_agents(conn)?)
    } else {
        None
    };

    Ok(TicketDetail {
        ticket,
        responses,
        agents,
    })
}

fn map_response(row: &Row<'_>) -> rusqlite::Result<Response> {
    Ok(Response {
        id: row.get(0)?,
        ticket_id: row.get(1)?,
        user_id: row.get(2)?,
        username: row.get(3)?,
        message: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn list_agents(conn: &Connection) -> Result<Vec<Agent>, HelpdeskError> {
    let mut stmt =
        conn.prepare("SELECT id, username FROM users WHERE role = 'agent' ORDER BY username")?;
    let rows = stmt.query_map([], |row| {
        Ok(Agent {
            id: row.get(0)?,
            username: row.get(1)?,
        })
    })?;
    let mut agents = Vec::new();
    for row in rows {
        agents.push(row?);
    }
    Ok(agents)
}

/// Appends a response to a ticket.
///
/// A response from an agent or admin on an `open` ticket moves it to
/// `in_progress`. The ticket's `updated_at` is bumped in every case.
pub fn add_response(
    conn: &Connection,
    user: &SessionUser,
    ticket_id: i64,
    message: &str,
) -> Result<Response, HelpdeskError> {
    let message = message.trim();
    if message.is_empty() {
        return Err(HelpdeskError::Validation("Response cannot be empty".to_string()));
    }
    let ticket = fetch_ticket(conn, ticket_id)?;
    ensure_visible(user, &ticket)?;

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO responses (ticket_id, user_id, message) VALUES (?1, ?2, ?3)",
        params![ticket_id, user.id, message],
    )?;
    let response_id = tx.last_insert_rowid();

    if is_staff(user) && ticket.status == TicketStatus::Open {
        tx.execute(
            "UPDATE tickets SET status = ?1 WHERE id = ?2",
            params![TicketStatus::InProgress, ticket_id],
        )?;
        tracing::info!(ticket_id, "ticket picked up by staff response");
    }
    tx.execute(
        "UPDATE tickets SET updated_at = CURRENT_TIMESTAMP WHERE id = ?1",
        [ticket_id],
    )?;
    tx.commit()?;

    let response = conn.query_row(
        "SELECT r.id, r.ticket_id, r.user_id, u.username, r.message, r.created_at
         FROM responses r JOIN users u ON r.user_id = u.id
         WHERE r.id = ?1",
        [response_id],
        map_response,
    )?;
    Ok(response)
}

/// Changes status, priority or assignment. Agents and admins only;
/// reassignment is admin only.
pub fn update_ticket(
    conn: &Connection,
    user: &SessionUser,
    id: i64,
    update: &TicketUpdate,
) -> Result<TicketUpdateOutcome, HelpdeskError> {
    if !is_staff(user) {
        return Err(HelpdeskError::Forbidden("Access denied".to_string()));
    }
    if update.assigned_agent_id.is_some() && user.role != Role::Admin {
        return Err(HelpdeskError::Forbidden(
            "only admins can assign tickets".to_string(),
        ));
    }
    let previous = fetch_ticket(conn, id)?;

    let changed = UpdateSet::new("tickets")
        .set_opt("status", update.status)
        .set_opt("priority", update.priority)
        .set_opt("assigned_agent_id", update.assigned_agent_id)
        .execute(conn, id, &["updated_at"])?
        .is_some();

    let ticket = fetch_ticket(conn, id)?;
    if ticket.status != previous.status {
        tracing::info!(
            ticket_id = id,
            from = %previous.status,
            to = %ticket.status,
            user_id = user.id,
            "ticket status changed"
        );
    }
    Ok(TicketUpdateOutcome {
        previous_status: previous.status,
        status: ticket.status,
        ticket,
        changed,
    })
}

pub fn list_categories(conn: &Connection) -> Result<Vec<Category>, HelpdeskError> {
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

/// Site-wide counts and the ten most recently created tickets.
pub fn admin_stats(conn: &Connection) -> Result<AdminStats, HelpdeskError> {
    let (total_users, customers, agents): (i64, i64, i64) = conn.query_row(
        "SELECT COUNT(*),
            COALESCE(SUM(role = 'customer'), 0),
            COALESCE(SUM(role = 'agent'), 0)
         FROM users",
        [],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )?;
    let (total_tickets, open_tickets): (i64, i64) = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(status = 'open'), 0) FROM tickets",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    let recent_tickets = Query::new(TICKET_SELECT)
        .order_by("t.created_at DESC, t.id DESC")
        .limit(10)
        .fetch(conn, map_ticket)?;

    Ok(AdminStats {
        total_users,
        customers,
        agents,
        total_tickets,
        open_tickets,
        recent_tickets,
    })
}

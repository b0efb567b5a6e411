//! Shared types for the classroom applications.
//!
//! Every enum that is persisted as a `TEXT` column lives here, together with
//! [`AppKind`], which selects which application a server process runs. The
//! enums round-trip through their lowercase database spelling via
//! [`std::str::FromStr`], [`std::fmt::Display`], serde, and rusqlite's
//! `ToSql`/`FromSql`, so domain crates never compare raw strings.

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when a string does not name a known enum variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: {value}")]
pub struct ParseEnumError {
    /// Human-readable name of the enum being parsed.
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}

macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $( $(#[$vmeta])* #[serde(rename = $text)] $variant ),+
        }

        impl $name {
            /// All variants, in declaration order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// Returns the stored spelling of this variant.
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(ParseEnumError {
                        kind: $kind,
                        value: s.to_string(),
                    }),
                }
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: ParseEnumError| FromSqlError::Other(Box::new(e)))
            }
        }
    };
}

text_enum! {
    /// Which of the classroom applications a server process runs.
    AppKind, "app kind" {
        /// Basic item manager with contact form and admin dashboard.
        Items => "items",
        /// Help desk ticketing.
        Helpdesk => "helpdesk",
        /// Blog with tags and threaded comments.
        Blog => "blog",
        /// School store inventory and point of sale.
        Store => "store",
        /// Todo list.
        Todo => "todo",
        /// Student project tracker.
        Tracker => "tracker",
        /// Threaded discussion board.
        Forum => "forum",
        /// Starter template with owned items, categories and tags.
        Starter => "starter",
    }
}

impl AppKind {
    /// Whether the app has user accounts and login sessions.
    pub fn has_accounts(self) -> bool {
        !matches!(self, Self::Todo | Self::Tracker)
    }

    /// Roles a visitor may pick when registering. The first entry is the
    /// default. Empty means self-registration is closed.
    pub fn registration_roles(self) -> &'static [Role] {
        match self {
            Self::Items => &[Role::Guest, Role::Admin],
            Self::Helpdesk => &[Role::Customer],
            Self::Blog | Self::Forum | Self::Starter => &[Role::User],
            Self::Store | Self::Todo | Self::Tracker => &[],
        }
    }

    /// Roles that may be assigned to accounts of this app.
    pub fn roles(self) -> &'static [Role] {
        match self {
            Self::Items => &[Role::Guest, Role::Admin],
            Self::Helpdesk => &[Role::Customer, Role::Agent, Role::Admin],
            Self::Blog | Self::Forum | Self::Starter => &[Role::User, Role::Admin],
            Self::Store => &[Role::Staff, Role::Admin],
            Self::Todo | Self::Tracker => &[],
        }
    }

    /// Default SQLite file name for this app.
    pub fn default_db_path(self) -> &'static str {
        match self {
            Self::Items => "items.db",
            Self::Helpdesk => "helpdesk.db",
            Self::Blog => "blog.db",
            Self::Store => "school_store.db",
            Self::Todo => "todos.db",
            Self::Tracker => "student_tracker.db",
            Self::Forum => "discussion.db",
            Self::Starter => "app.db",
        }
    }
}

text_enum! {
    /// Account role. Each app accepts a subset, see [`AppKind::roles`].
    Role, "role" {
        Guest => "guest",
        Customer => "customer",
        Agent => "agent",
        Staff => "staff",
        User => "user",
        Admin => "admin",
    }
}

text_enum! {
    /// Help desk ticket status. Transitions are unconstrained.
    TicketStatus, "ticket status" {
        Open => "open",
        InProgress => "in_progress",
        Resolved => "resolved",
        Closed => "closed",
    }
}

text_enum! {
    /// Help desk ticket priority.
    TicketPriority, "ticket priority" {
        Low => "low",
        Medium => "medium",
        High => "high",
        Critical => "critical",
    }
}

text_enum! {
    /// Blog post publication state.
    PostStatus, "post status" {
        Draft => "draft",
        Published => "published",
        Archived => "archived",
    }
}

text_enum! {
    /// State of a point-of-sale transaction.
    SaleStatus, "sale status" {
        Completed => "completed",
        Refunded => "refunded",
        Cancelled => "cancelled",
    }
}

text_enum! {
    /// Todo priority, stored capitalised.
    TodoPriority, "todo priority" {
        High => "High",
        Medium => "Medium",
        Low => "Low",
    }
}

text_enum! {
    /// Progress of a student's checkpoint submission.
    SubmissionStatus, "submission status" {
        Pending => "pending",
        InProgress => "in_progress",
        Completed => "completed",
        Late => "late",
    }
}

text_enum! {
    /// Direction of a forum vote.
    VoteKind, "vote type" {
        Upvote => "upvote",
        Downvote => "downvote",
    }
}

text_enum! {
    /// Lifecycle of a starter-template item.
    ItemStatus, "item status" {
        Active => "active",
        Inactive => "inactive",
        Archived => "archived",
    }
}

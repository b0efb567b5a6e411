//! Votes and likes on threads and posts.
//!
//! A user holds at most one vote and one like per target. Voting again
//! replaces the earlier vote; liking again removes the like.

use classroom_accounts::SessionUser;
use classroom_types::VoteKind;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::{ForumError, Target};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteOutcome {
    pub vote_type: VoteKind,
    /// Upvotes minus downvotes on the target after this vote.
    pub vote_score: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeOutcome {
    pub liked: bool,
    pub like_count: i64,
}

fn vote_score(conn: &Connection, target: Target, id: i64) -> rusqlite::Result<i64> {
    conn.query_row(
        &format!(
            "SELECT COALESCE(SUM(CASE vote_type WHEN 'upvote' THEN 1 ELSE -1 END), 0)
             FROM votes WHERE {} = ?1",
            target.column()
        ),
        [id],
        |row| row.get(0),
    )
}

fn like_count(conn: &Connection, target: Target, id: i64) -> rusqlite::Result<i64> {
    conn.query_row(
        &format!("SELECT COUNT(*) FROM likes WHERE {} = ?1", target.column()),
        [id],
        |row| row.get(0),
    )
}

/// Records `user`'s vote on a thread or post, replacing any earlier vote.
pub fn vote(
    conn: &Connection,
    user: &SessionUser,
    target: Target,
    id: i64,
    kind: VoteKind,
) -> Result<VoteOutcome, ForumError> {
    target.ensure_exists(conn, id)?;
    let column = target.column();

    let updated = conn.execute(
        &format!("UPDATE votes SET vote_type = ?1 WHERE user_id = ?2 AND {column} = ?3"),
        params![kind, user.id, id],
    )?;
    if updated == 0 {
        conn.execute(
            &format!("INSERT INTO votes (user_id, {column}, vote_type) VALUES (?1, ?2, ?3)"),
            params![user.id, id, kind],
        )?;
    }
    tracing::debug!(user_id = user.id, target = %target, id, vote = %kind, "vote recorded");

    Ok(VoteOutcome {
        vote_type: kind,
        vote_score: vote_score(conn, target, id)?,
    })
}

/// Likes the target, or removes the like if `user` already liked it.
pub fn toggle_like(
    conn: &Connection,
    user: &SessionUser,
    target: Target,
    id: i64,
) -> Result<LikeOutcome, ForumError> {
    target.ensure_exists(conn, id)?;
    let column = target.column();

    let removed = conn.execute(
        &format!("DELETE FROM likes WHERE user_id = ?1 AND {column} = ?2"),
        params![user.id, id],
    )?;
    let liked = removed == 0;
    if liked {
        conn.execute(
            &format!("INSERT INTO likes (user_id, {column}) VALUES (?1, ?2)"),
            params![user.id, id],
        )?;
    }

    Ok(LikeOutcome {
        liked,
        like_count: like_count(conn, target, id)?,
    })
}

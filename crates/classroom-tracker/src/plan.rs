//! Automatic checkpoint scheduling for new projects.
//!
//! A project is split into two, three or four checkpoints depending on how
//! far away its due date is. Checkpoint dates are spread evenly between
//! today and the due date, the last one always falling on the due date.
//! Points are divided evenly with integer division; whatever does not
//! divide evenly is reported as [`CheckpointPlan::lost_points`].

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::TrackerError;

const SHORT: &[&str] = &["Midpoint Review", "Final Submission"];
const MEDIUM: &[&str] = &["Initial Progress", "Midpoint Review", "Final Submission"];
const LONG: &[&str] = &[
    "Initial Progress",
    "Quarter Review",
    "Midpoint Review",
    "Final Submission",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedCheckpoint {
    pub title: String,
    pub due_date: NaiveDate,
    pub points: i64,
    /// 1-based position within the project.
    pub order_num: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointPlan {
    pub checkpoints: Vec<PlannedCheckpoint>,
    /// Points that integer division could not assign to any checkpoint.
    pub lost_points: i64,
}

/// Parses a `YYYY-MM-DD` date.
pub fn parse_due_date(value: &str) -> Result<NaiveDate, TrackerError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| TrackerError::InvalidDate(value.to_string()))
}

fn offset(start: NaiveDate, days: i64) -> NaiveDate {
    let shifted = if days >= 0 {
        start.checked_add_days(Days::new(days.unsigned_abs()))
    } else {
        start.checked_sub_days(Days::new(days.unsigned_abs()))
    };
    shifted.unwrap_or(start)
}

/// Plans the checkpoints of a project due on `due` with `total_points`,
/// counting from `today`.
///
/// Day offsets use floor division, so a due date in the past yields
/// checkpoints in the past as well.
pub fn plan_checkpoints(today: NaiveDate, due: NaiveDate, total_points: i64) -> CheckpointPlan {
    let d = (due - today).num_days();
    let (titles, offsets): (&[&str], Vec<i64>) = if d <= 7 {
        (SHORT, vec![d.div_euclid(2), d])
    } else if d <= 14 {
        (MEDIUM, vec![d / 3, 2 * d / 3, d])
    } else {
        (LONG, vec![d / 4, d / 2, 3 * d / 4, d])
    };

    let n = titles.len() as i64;
    let points = total_points.div_euclid(n);
    let checkpoints: Vec<PlannedCheckpoint> = titles
        .iter()
        .zip(offsets)
        .enumerate()
        .map(|(i, (title, days))| PlannedCheckpoint {
            title: (*title).to_string(),
            // The final checkpoint is always the due date itself.
            due_date: if days == d { due } else { offset(today, days) },
            points,
            order_num: i as i64 + 1,
        })
        .collect();

    CheckpointPlan {
        lost_points: total_points - points * n,
        checkpoints,
    }
}

//! Student project tracker.
//!
//! Teachers manage classes, enroll students, and assign projects to a
//! class. Creating a project schedules its checkpoints automatically (see
//! [`plan_checkpoints`]); each student's progress is then recorded per
//! checkpoint as a submission. There are no accounts.

mod plan;

pub use plan::{parse_due_date, plan_checkpoints, CheckpointPlan, PlannedCheckpoint};

use chrono::NaiveDate;
use classroom_types::SubmissionStatus;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during tracker operations.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: i64 },
    #[error("{0}")]
    Validation(String),
    #[error("Invalid date: {0}")]
    InvalidDate(String),
}

impl TrackerError {
    fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Class {
    pub id: i64,
    pub name: String,
    pub subject: String,
    pub academic_year: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassSummary {
    #[serde(flatten)]
    pub class: Class,
    pub student_count: i64,
    pub project_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassDetail {
    pub class: Class,
    pub students: Vec<Student>,
    pub projects: Vec<Project>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewClass {
    pub name: String,
    pub subject: String,
    pub academic_year: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub class_id: Option<i64>,
    pub class_name: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewStudent {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub class_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub class_id: i64,
    pub class_name: String,
    pub due_date: String,
    pub total_points: i64,
    pub created_at: String,
}

/// A project with the size of its class and how many submissions in it
/// are completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSummary {
    #[serde(flatten)]
    pub project: Project,
    pub total_students: i64,
    pub completed_submissions: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewProject {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub class_id: i64,
    /// `YYYY-MM-DD`.
    pub due_date: String,
    #[serde(default)]
    pub total_points: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedProject {
    pub project: Project,
    pub checkpoints: Vec<Checkpoint>,
    pub lost_points: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: i64,
    pub project_id: i64,
    pub title: String,
    pub due_date: String,
    pub points: i64,
    pub order_num: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentProgress {
    #[serde(flatten)]
    pub student: Student,
    pub completed_checkpoints: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectDetail {
    pub project: Project,
    pub checkpoints: Vec<Checkpoint>,
    pub students: Vec<StudentProgress>,
}

/// A student with a checkpoint that is past due and not yet handed in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverdueCheckpoint {
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub class_name: String,
    pub project_title: String,
    pub checkpoint_title: String,
    pub due_date: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dashboard {
    pub class_count: i64,
    pub student_count: i64,
    pub project_count: i64,
    pub upcoming_projects: Vec<ProjectSummary>,
    pub overdue_projects: Vec<Project>,
    pub students_to_contact: Vec<OverdueCheckpoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionUpdate {
    pub student_id: i64,
    pub checkpoint_id: i64,
    pub status: SubmissionStatus,
    #[serde(default)]
    pub points_earned: Option<i64>,
    #[serde(default)]
    pub feedback: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub id: i64,
    pub student_id: i64,
    pub project_id: i64,
    pub checkpoint_id: Option<i64>,
    pub status: SubmissionStatus,
    pub points_earned: i64,
    pub feedback: Option<String>,
    pub submitted_at: Option<String>,
}

/// One line of the progress report: a student's state on one checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRow {
    pub class_name: String,
    pub project_title: String,
    pub project_due_date: String,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub checkpoint_title: String,
    pub checkpoint_due_date: String,
    pub status: String,
    pub points_earned: i64,
    pub max_points: i64,
    pub submitted_at: String,
}

const PROJECT_SELECT: &str = "SELECT p.id, p.title, p.description, p.class_id, c.name, p.due_date,
        p.total_points, p.created_at
     FROM projects p
     JOIN classes c ON p.class_id = c.id";

const STUDENT_SELECT: &str = "SELECT s.id, s.first_name, s.last_name, s.email, s.class_id, c.name,
        s.created_at
     FROM students s
     LEFT JOIN classes c ON s.class_id = c.id";

const CHECKPOINT_SELECT: &str =
    "SELECT id, project_id, title, due_date, points, order_num FROM checkpoints";

fn map_class(row: &Row<'_>) -> rusqlite::Result<Class> {
    Ok(Class {
        id: row.get(0)?,
        name: row.get(1)?,
        subject: row.get(2)?,
        academic_year: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn map_student(row: &Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        id: row.get(0)?,
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        email: row.get(3)?,
        class_id: row.get(4)?,
        class_name: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn map_project(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        class_id: row.get(3)?,
        class_name: row.get(4)?,
        due_date: row.get(5)?,
        total_points: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn map_project_summary(row: &Row<'_>) -> rusqlite::Result<ProjectSummary> {
    Ok(ProjectSummary {
        project: map_project(row)?,
        total_students: row.get(8)?,
        completed_submissions: row.get(9)?,
    })
}

fn map_checkpoint(row: &Row<'_>) -> rusqlite::Result<Checkpoint> {
    Ok(Checkpoint {
        id: row.get(0)?,
        project_id: row.get(1)?,
        title: row.get(2)?,
        due_date: row.get(3)?,
        points: row.get(4)?,
        order_num: row.get(5)?,
    })
}

fn count(conn: &Connection, table: &str) -> rusqlite::Result<i64> {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

const PROJECT_SUMMARY_SELECT: &str = "SELECT p.id, p.title, p.description, p.class_id, c.name, p.due_date,
        p.total_points, p.created_at,
        (SELECT COUNT(*) FROM students WHERE class_id = p.class_id),
        (SELECT COUNT(*) FROM submissions sub
           JOIN students st ON sub.student_id = st.id
          WHERE st.class_id = p.class_id AND sub.project_id = p.id AND sub.status = 'completed')
     FROM projects p
     JOIN classes c ON p.class_id = c.id";

/// Counts, the five projects due soonest, every overdue project, and up to
/// ten students with an overdue checkpoint that is missing or still pending.
pub fn dashboard(conn: &Connection) -> Result<Dashboard, TrackerError> {
    let mut stmt = conn.prepare(&format!(
        "{PROJECT_SUMMARY_SELECT} ORDER BY p.due_date ASC LIMIT 5"
    ))?;
    let upcoming_projects = stmt
        .query_map([], map_project_summary)?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare(&format!(
        "{PROJECT_SELECT} WHERE p.due_date < date('now') ORDER BY p.due_date ASC"
    ))?;
    let overdue_projects = stmt
        .query_map([], map_project)?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare(
        "SELECT DISTINCT s.first_name, s.last_name, s.email, c.name, p.title, cp.title, cp.due_date
         FROM students s
         JOIN classes c ON s.class_id = c.id
         JOIN projects p ON s.class_id = p.class_id
         JOIN checkpoints cp ON p.id = cp.project_id
         LEFT JOIN submissions sub ON s.id = sub.student_id AND cp.id = sub.checkpoint_id
         WHERE cp.due_date < date('now')
           AND (sub.id IS NULL OR sub.status = 'pending')
         ORDER BY cp.due_date ASC
         LIMIT 10",
    )?;
    let students_to_contact = stmt
        .query_map([], |row| {
            Ok(OverdueCheckpoint {
                first_name: row.get(0)?,
                last_name: row.get(1)?,
                email: row.get(2)?,
                class_name: row.get(3)?,
                project_title: row.get(4)?,
                checkpoint_title: row.get(5)?,
                due_date: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Dashboard {
        class_count: count(conn, "classes")?,
        student_count: count(conn, "students")?,
        project_count: count(conn, "projects")?,
        upcoming_projects,
        overdue_projects,
        students_to_contact,
    })
}

/// Classes with their student and project counts, newest academic year first.
pub fn list_classes(conn: &Connection) -> Result<Vec<ClassSummary>, TrackerError> {
    let mut stmt = conn.prepare(
        "SELECT c.id, c.name, c.subject, c.academic_year, c.created_at,
                (SELECT COUNT(*) FROM students WHERE class_id = c.id),
                (SELECT COUNT(*) FROM projects WHERE class_id = c.id)
         FROM classes c
         ORDER BY c.academic_year DESC, c.name ASC",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(ClassSummary {
            class: map_class(row)?,
            student_count: row.get(5)?,
            project_count: row.get(6)?,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub fn create_class(conn: &Connection, input: &NewClass) -> Result<Class, TrackerError> {
    let name = input.name.trim();
    let subject = input.subject.trim();
    let academic_year = input.academic_year.trim();
    if name.is_empty() || subject.is_empty() || academic_year.is_empty() {
        return Err(TrackerError::Validation("All fields are required!".to_string()));
    }
    conn.execute(
        "INSERT INTO classes (name, subject, academic_year) VALUES (?1, ?2, ?3)",
        params![name, subject, academic_year],
    )?;
    let id = conn.last_insert_rowid();
    tracing::info!(class_id = id, "class created");
    get_class(conn, id)
}

fn get_class(conn: &Connection, id: i64) -> Result<Class, TrackerError> {
    conn.query_row(
        "SELECT id, name, subject, academic_year, created_at FROM classes WHERE id = ?1",
        [id],
        map_class,
    )
    .optional()?
    .ok_or_else(|| TrackerError::not_found("class", id))
}

/// A class with its roster (by last name) and projects (by due date).
pub fn view_class(conn: &Connection, id: i64) -> Result<ClassDetail, TrackerError> {
    let class = get_class(conn, id)?;

    let mut stmt = conn.prepare(&format!(
        "{STUDENT_SELECT} WHERE s.class_id = ?1 ORDER BY s.last_name, s.first_name"
    ))?;
    let students = stmt
        .query_map([id], map_student)?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare(&format!(
        "{PROJECT_SELECT} WHERE p.class_id = ?1 ORDER BY p.due_date ASC"
    ))?;
    let projects = stmt
        .query_map([id], map_project)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ClassDetail {
        class,
        students,
        projects,
    })
}

pub fn list_students(conn: &Connection) -> Result<Vec<Student>, TrackerError> {
    let mut stmt = conn.prepare(&format!(
        "{STUDENT_SELECT} ORDER BY s.last_name, s.first_name"
    ))?;
    let rows = stmt.query_map([], map_student)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Enrolls a student, optionally into a class. A blank email is stored as
/// `NULL`.
pub fn create_student(conn: &Connection, input: &NewStudent) -> Result<Student, TrackerError> {
    let first_name = input.first_name.trim();
    let last_name = input.last_name.trim();
    if first_name.is_empty() || last_name.is_empty() {
        return Err(TrackerError::Validation(
            "First and last names are required!".to_string(),
        ));
    }
    if let Some(class_id) = input.class_id {
        get_class(conn, class_id)?;
    }
    conn.execute(
        "INSERT INTO students (first_name, last_name, email, class_id) VALUES (?1, ?2, ?3, ?4)",
        params![first_name, last_name, non_blank(&input.email), input.class_id],
    )?;
    let id = conn.last_insert_rowid();
    tracing::info!(student_id = id, class_id = ?input.class_id, "student created");
    get_student(conn, id)
}

fn get_student(conn: &Connection, id: i64) -> Result<Student, TrackerError> {
    conn.query_row(&format!("{STUDENT_SELECT} WHERE s.id = ?1"), [id], map_student)
        .optional()?
        .ok_or_else(|| TrackerError::not_found("student", id))
}

pub fn list_projects(conn: &Connection) -> Result<Vec<ProjectSummary>, TrackerError> {
    let mut stmt = conn.prepare(&format!("{PROJECT_SUMMARY_SELECT} ORDER BY p.due_date ASC"))?;
    let rows = stmt.query_map([], map_project_summary)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

fn get_project(conn: &Connection, id: i64) -> Result<Project, TrackerError> {
    conn.query_row(&format!("{PROJECT_SELECT} WHERE p.id = ?1"), [id], map_project)
        .optional()?
        .ok_or_else(|| TrackerError::not_found("project", id))
}

fn project_checkpoints(conn: &Connection, project_id: i64) -> rusqlite::Result<Vec<Checkpoint>> {
    let mut stmt = conn.prepare(&format!(
        "{CHECKPOINT_SELECT} WHERE project_id = ?1 ORDER BY order_num"
    ))?;
    let rows = stmt.query_map([project_id], map_checkpoint)?;
    rows.collect()
}

/// Creates a project and its scheduled checkpoints in one transaction.
///
/// `today` anchors the checkpoint schedule. Total points default to 100.
pub fn create_project(
    conn: &Connection,
    input: &NewProject,
    today: NaiveDate,
) -> Result<CreatedProject, TrackerError> {
    let title = input.title.trim();
    if title.is_empty() || input.due_date.trim().is_empty() {
        return Err(TrackerError::Validation(
            "Title, class, and due date are required!".to_string(),
        ));
    }
    let due = parse_due_date(&input.due_date)?;
    let total_points = input.total_points.unwrap_or(100);
    if total_points < 0 {
        return Err(TrackerError::Validation(
            "Total points must not be negative".to_string(),
        ));
    }
    get_class(conn, input.class_id)?;

    let plan = plan_checkpoints(today, due, total_points);
    if plan.lost_points > 0 {
        tracing::warn!(
            total_points,
            lost_points = plan.lost_points,
            checkpoints = plan.checkpoints.len(),
            "checkpoint points do not add up to the project total"
        );
    }

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO projects (title, description, class_id, due_date, total_points)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            title,
            input.description.as_deref().unwrap_or("").trim(),
            input.class_id,
            due.format("%Y-%m-%d").to_string(),
            total_points
        ],
    )?;
    let project_id = tx.last_insert_rowid();
    for checkpoint in &plan.checkpoints {
        tx.execute(
            "INSERT INTO checkpoints (project_id, title, due_date, points, order_num)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                project_id,
                checkpoint.title,
                checkpoint.due_date.format("%Y-%m-%d").to_string(),
                checkpoint.points,
                checkpoint.order_num
            ],
        )?;
    }
    tx.commit()?;

    tracing::info!(
        project_id,
        class_id = input.class_id,
        checkpoints = plan.checkpoints.len(),
        "project created"
    );
    Ok(CreatedProject {
        project: get_project(conn, project_id)?,
        checkpoints: project_checkpoints(conn, project_id)?,
        lost_points: plan.lost_points,
    })
}

/// A project with its checkpoints and every student of its class together
/// with how many checkpoints they have completed.
pub fn view_project(conn: &Connection, id: i64) -> Result<ProjectDetail, TrackerError> {
    let project = get_project(conn, id)?;
    let checkpoints = project_checkpoints(conn, id)?;

    let mut stmt = conn.prepare(&format!(
        "{STUDENT_SELECT_PROGRESS} WHERE s.class_id = ?2 ORDER BY s.last_name, s.first_name"
    ))?;
    let students = stmt
        .query_map(params![id, project.class_id], |row| {
            Ok(StudentProgress {
                student: map_student(row)?,
                completed_checkpoints: row.get(7)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ProjectDetail {
        project,
        checkpoints,
        students,
    })
}

const STUDENT_SELECT_PROGRESS: &str = "SELECT s.id, s.first_name, s.last_name, s.email, s.class_id, c.name,
        s.created_at,
        (SELECT COUNT(*) FROM submissions sub
          WHERE sub.student_id = s.id AND sub.project_id = ?1 AND sub.status = 'completed')
     FROM students s
     LEFT JOIN classes c ON s.class_id = c.id";

/// Records a student's progress on a checkpoint, creating the submission on
/// first use and overwriting it afterwards. The project is taken from the
/// checkpoint and the submission time is set to now on every call.
pub fn update_submission(
    conn: &Connection,
    update: &SubmissionUpdate,
) -> Result<Submission, TrackerError> {
    let project_id: i64 = conn
        .query_row(
            "SELECT project_id FROM checkpoints WHERE id = ?1",
            [update.checkpoint_id],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| TrackerError::not_found("checkpoint", update.checkpoint_id))?;
    get_student(conn, update.student_id)?;

    let points = update.points_earned.unwrap_or(0);
    if points < 0 {
        return Err(TrackerError::Validation(
            "Points earned must not be negative".to_string(),
        ));
    }

    conn.execute(
        "INSERT INTO submissions
            (student_id, project_id, checkpoint_id, status, points_earned, feedback, submitted_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, datetime('now'))
         ON CONFLICT (student_id, checkpoint_id) DO UPDATE SET
            status = excluded.status,
            points_earned = excluded.points_earned,
            feedback = excluded.feedback,
            submitted_at = excluded.submitted_at",
        params![
            update.student_id,
            project_id,
            update.checkpoint_id,
            update.status,
            points,
            update.feedback.as_deref().unwrap_or("").trim()
        ],
    )?;
    tracing::info!(
        student_id = update.student_id,
        checkpoint_id = update.checkpoint_id,
        status = %update.status,
        "submission updated"
    );

    let submission = conn.query_row(
        "SELECT id, student_id, project_id, checkpoint_id, status, points_earned, feedback,
                submitted_at
         FROM submissions WHERE student_id = ?1 AND checkpoint_id = ?2",
        params![update.student_id, update.checkpoint_id],
        |row| {
            Ok(Submission {
                id: row.get(0)?,
                student_id: row.get(1)?,
                project_id: row.get(2)?,
                checkpoint_id: row.get(3)?,
                status: row.get(4)?,
                points_earned: row.get(5)?,
                feedback: row.get(6)?,
                submitted_at: row.get(7)?,
            })
        },
    )?;
    Ok(submission)
}

/// Every (project, student, checkpoint) combination with the student's
/// submission state. Checkpoints without a submission report `Not Started`,
/// zero points and `Not Submitted`.
pub fn report_rows(conn: &Connection) -> Result<Vec<ReportRow>, TrackerError> {
    let mut stmt = conn.prepare(
        "SELECT c.name, p.title, p.due_date, s.first_name, s.last_name, s.email,
                cp.title, cp.due_date,
                COALESCE(sub.status, 'Not Started'),
                COALESCE(sub.points_earned, 0),
                cp.points,
                COALESCE(sub.submitted_at, 'Not Submitted')
         FROM projects p
         JOIN classes c ON p.class_id = c.id
         JOIN students s ON s.class_id = c.id
         JOIN checkpoints cp ON p.id = cp.project_id
         LEFT JOIN submissions sub ON s.id = sub.student_id AND cp.id = sub.checkpoint_id
         ORDER BY c.name, p.title, s.last_name, s.first_name, cp.order_num",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(ReportRow {
            class_name: row.get(0)?,
            project_title: row.get(1)?,
            project_due_date: row.get(2)?,
            first_name: row.get(3)?,
            last_name: row.get(4)?,
            email: row.get(5)?,
            checkpoint_title: row.get(6)?,
            checkpoint_due_date: row.get(7)?,
            status: row.get(8)?,
            points_earned: row.get(9)?,
            max_points: row.get(10)?,
            submitted_at: row.get(11)?,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use classroom_types::AppKind;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        classroom_db::run_migrations(&conn, AppKind::Tracker).unwrap();
        conn
    }

    fn class(conn: &Connection) -> Class {
        create_class(
            conn,
            &NewClass {
                name: "Period 3".to_string(),
                subject: "Biology".to_string(),
                academic_year: "2024-2025".to_string(),
            },
        )
        .unwrap()
    }

    fn student(conn: &Connection, first: &str, last: &str, class_id: i64) -> Student {
        create_student(
            conn,
            &NewStudent {
                first_name: first.to_string(),
                last_name: last.to_string(),
                email: Some(format!("{first}@school.test")),
                class_id: Some(class_id),
            },
        )
        .unwrap()
    }

    fn project(conn: &Connection, class_id: i64, today: &str, due: &str) -> CreatedProject {
        create_project(
            conn,
            &NewProject {
                title: " Cell Model ".to_string(),
                class_id,
                due_date: due.to_string(),
                total_points: Some(100),
                ..Default::default()
            },
            parse_due_date(today).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn project_creation_stores_planned_checkpoints() {
        let conn = setup();
        let c = class(&conn);
        let created = project(&conn, c.id, "2030-01-01", "2030-01-11");

        assert_eq!(created.project.title, "Cell Model");
        assert_eq!(created.project.class_name, "Period 3");
        assert_eq!(created.checkpoints.len(), 3);
        assert_eq!(created.lost_points, 1);
        let dates: Vec<&str> = created
            .checkpoints
            .iter()
            .map(|c| c.due_date.as_str())
            .collect();
        assert_eq!(dates, vec!["2030-01-04", "2030-01-07", "2030-01-11"]);
        let points: i64 = created.checkpoints.iter().map(|c| c.points).sum();
        assert!(points <= created.project.total_points);
    }

    #[test]
    fn project_validation() {
        let conn = setup();
        let c = class(&conn);
        let today = parse_due_date("2030-01-01").unwrap();

        let bad_date = NewProject {
            title: "Essay".to_string(),
            class_id: c.id,
            due_date: "next week".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            create_project(&conn, &bad_date, today),
            Err(TrackerError::InvalidDate(_))
        ));

        let no_class = NewProject {
            title: "Essay".to_string(),
            class_id: 404,
            due_date: "2030-02-01".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            create_project(&conn, &no_class, today),
            Err(TrackerError::NotFound { entity: "class", id: 404 })
        ));
        assert_eq!(count(&conn, "projects").unwrap(), 0);
        assert_eq!(count(&conn, "checkpoints").unwrap(), 0);
    }

    #[test]
    fn class_and_student_validation() {
        let conn = setup();
        let blank = NewClass {
            name: "Art".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            create_class(&conn, &blank),
            Err(TrackerError::Validation(_))
        ));

        let unnamed = NewStudent {
            first_name: "Ada".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            create_student(&conn, &unnamed),
            Err(TrackerError::Validation(_))
        ));

        let unassigned = create_student(
            &conn,
            &NewStudent {
                first_name: "Ada".to_string(),
                last_name: "Lovelace".to_string(),
                email: Some("  ".to_string()),
                class_id: None,
            },
        )
        .unwrap();
        assert_eq!(unassigned.email, None);
        assert_eq!(unassigned.class_name, None);
    }

    #[test]
    fn submissions_upsert_and_feed_progress() {
        let conn = setup();
        let c = class(&conn);
        let ada = student(&conn, "Ada", "Lovelace", c.id);
        let alan = student(&conn, "Alan", "Turing", c.id);
        let created = project(&conn, c.id, "2030-01-01", "2030-01-11");
        let first = &created.checkpoints[0];

        let pending = update_submission(
            &conn,
            &SubmissionUpdate {
                student_id: ada.id,
                checkpoint_id: first.id,
                status: SubmissionStatus::InProgress,
                points_earned: None,
                feedback: None,
            },
        )
        .unwrap();
        assert_eq!(pending.project_id, created.project.id);

        let done = update_submission(
            &conn,
            &SubmissionUpdate {
                student_id: ada.id,
                checkpoint_id: first.id,
                status: SubmissionStatus::Completed,
                points_earned: Some(30),
                feedback: Some("Nice".to_string()),
            },
        )
        .unwrap();
        assert_eq!(done.id, pending.id);
        assert_eq!(done.points_earned, 30);
        assert_eq!(count(&conn, "submissions").unwrap(), 1);

        let detail = view_project(&conn, created.project.id).unwrap();
        let progress: Vec<(i64, i64)> = detail
            .students
            .iter()
            .map(|s| (s.student.id, s.completed_checkpoints))
            .collect();
        assert_eq!(progress, vec![(ada.id, 1), (alan.id, 0)]);

        let summary = &list_projects(&conn).unwrap()[0];
        assert_eq!(summary.total_students, 2);
        assert_eq!(summary.completed_submissions, 1);

        assert!(matches!(
            update_submission(
                &conn,
                &SubmissionUpdate {
                    student_id: ada.id,
                    checkpoint_id: 999,
                    status: SubmissionStatus::Late,
                    points_earned: None,
                    feedback: None,
                },
            ),
            Err(TrackerError::NotFound { entity: "checkpoint", .. })
        ));
    }

    #[test]
    fn report_fills_missing_submissions() {
        let conn = setup();
        let c = class(&conn);
        let ada = student(&conn, "Ada", "Lovelace", c.id);
        let created = project(&conn, c.id, "2030-01-01", "2030-01-05");
        update_submission(
            &conn,
            &SubmissionUpdate {
                student_id: ada.id,
                checkpoint_id: created.checkpoints[1].id,
                status: SubmissionStatus::Completed,
                points_earned: Some(50),
                feedback: None,
            },
        )
        .unwrap();

        let rows = report_rows(&conn).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].status, "Not Started");
        assert_eq!(rows[0].points_earned, 0);
        assert_eq!(rows[0].submitted_at, "Not Submitted");
        assert_eq!(rows[1].status, "completed");
        assert_eq!(rows[1].points_earned, 50);
        assert_eq!(rows[1].max_points, 50);
    }

    #[test]
    fn dashboard_flags_overdue_work() {
        let conn = setup();
        let c = class(&conn);
        student(&conn, "Ada", "Lovelace", c.id);
        project(&conn, c.id, "2000-01-01", "2000-01-05");
        project(&conn, c.id, "2999-01-01", "2999-01-20");

        let dash = dashboard(&conn).unwrap();
        assert_eq!(
            (dash.class_count, dash.student_count, dash.project_count),
            (1, 1, 2)
        );
        assert_eq!(dash.upcoming_projects.len(), 2);
        assert_eq!(dash.overdue_projects.len(), 1);
        assert_eq!(dash.students_to_contact.len(), 2);
        assert_eq!(dash.students_to_contact[0].checkpoint_title, "Midpoint Review");

        let classes = list_classes(&conn).unwrap();
        assert_eq!(classes[0].student_count, 1);
        assert_eq!(classes[0].project_count, 2);
        let detail = view_class(&conn, c.id).unwrap();
        assert_eq!(detail.projects[0].due_date, "2000-01-05");
        assert!(matches!(
            view_class(&conn, 77),
            Err(TrackerError::NotFound { entity: "class", id: 77 })
        ));
    }
}

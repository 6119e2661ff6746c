//! Record access for the sidecar: classes and their rosters, quizzes and
//! submissions. Records are stored as JSON bodies next to the columns the
//! queries filter on.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::roster::Student;
use crate::scorer::Quiz;
use crate::submission::Submission;

const JOIN_CODE_LEN: usize = 6;
const JOIN_CODE_ATTEMPTS: usize = 5;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("student {student_id} has already submitted quiz {quiz_id}")]
    DuplicateSubmission { quiz_id: String, student_id: String },
    #[error("{0} not found")]
    NotFound(String),
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("stored record is malformed: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::DuplicateSubmission { .. } => "already_submitted",
            StoreError::NotFound(_) => "not_found",
            StoreError::Sqlite(_) | StoreError::Json(_) => "db_query_failed",
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(f, _)
            if f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassRecord {
    pub id: String,
    pub name: String,
    pub join_code: String,
    pub created_at: String,
}

fn new_join_code() -> String {
    Uuid::new_v4().simple().to_string()[..JOIN_CODE_LEN].to_ascii_uppercase()
}

pub fn insert_class(conn: &Connection, name: &str, now: DateTime<Utc>) -> StoreResult<ClassRecord> {
    let id = Uuid::new_v4().to_string();
    let created_at = now.to_rfc3339();
    let mut last_err: Option<rusqlite::Error> = None;
    for _ in 0..JOIN_CODE_ATTEMPTS {
        let join_code = new_join_code();
        match conn.execute(
            "INSERT INTO classes(id, name, join_code, created_at) VALUES(?, ?, ?, ?)",
            (&id, name, &join_code, &created_at),
        ) {
            Ok(_) => {
                return Ok(ClassRecord {
                    id,
                    name: name.to_string(),
                    join_code,
                    created_at,
                })
            }
            Err(e) if is_unique_violation(&e) => {
                log::debug!("join code {} taken, retrying", join_code);
                last_err = Some(e);
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(last_err
        .map(StoreError::from)
        .unwrap_or_else(|| StoreError::NotFound("free join code".to_string())))
}

fn class_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<ClassRecord> {
    Ok(ClassRecord {
        id: r.get(0)?,
        name: r.get(1)?,
        join_code: r.get(2)?,
        created_at: r.get(3)?,
    })
}

pub fn find_class(conn: &Connection, class_id: &str) -> StoreResult<Option<ClassRecord>> {
    Ok(conn
        .query_row(
            "SELECT id, name, join_code, created_at FROM classes WHERE id = ?",
            [class_id],
            class_from_row,
        )
        .optional()?)
}

pub fn find_class_by_code(conn: &Connection, code: &str) -> StoreResult<Option<ClassRecord>> {
    Ok(conn
        .query_row(
            "SELECT id, name, join_code, created_at FROM classes WHERE join_code = ?",
            [code.trim().to_ascii_uppercase()],
            class_from_row,
        )
        .optional()?)
}

/// Returns `false` when the student was already on the roster.
pub fn enroll_student(
    conn: &Connection,
    class_id: &str,
    student: &Student,
    now: DateTime<Utc>,
) -> StoreResult<bool> {
    match conn.execute(
        "INSERT INTO enrollments(class_id, student_id, name, email, joined_at) VALUES(?, ?, ?, ?, ?)",
        (
            class_id,
            &student.id,
            &student.name,
            &student.email,
            now.to_rfc3339(),
        ),
    ) {
        Ok(_) => Ok(true),
        Err(e) if is_unique_violation(&e) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Submissions stay in the table; analytics drop them by roster membership.
pub fn remove_student(conn: &Connection, class_id: &str, student_id: &str) -> StoreResult<bool> {
    let n = conn.execute(
        "DELETE FROM enrollments WHERE class_id = ? AND student_id = ?",
        (class_id, student_id),
    )?;
    Ok(n > 0)
}

pub fn is_enrolled(conn: &Connection, class_id: &str, student_id: &str) -> StoreResult<bool> {
    let hit: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM enrollments WHERE class_id = ? AND student_id = ?",
            (class_id, student_id),
            |r| r.get(0),
        )
        .optional()?;
    Ok(hit.is_some())
}

pub fn list_students(conn: &Connection, class_id: &str) -> StoreResult<Vec<Student>> {
    let mut stmt = conn.prepare(
        "SELECT student_id, name, email
         FROM enrollments
         WHERE class_id = ?
         ORDER BY name, student_id",
    )?;
    let rows = stmt
        .query_map([class_id], |r| {
            Ok(Student {
                id: r.get(0)?,
                name: r.get(1)?,
                email: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Inserts or replaces a quiz. An existing quiz keeps its original
/// `createdAt`.
pub fn save_quiz(conn: &Connection, quiz: &Quiz, now: DateTime<Utc>) -> StoreResult<Quiz> {
    let existing = load_quiz(conn, &quiz.id)?;
    let mut stored = quiz.clone();
    stored.created_at = existing
        .and_then(|q| q.created_at)
        .or(quiz.created_at)
        .or(Some(now));
    let created_at = stored.created_at.unwrap_or(now).to_rfc3339();
    let body = serde_json::to_string(&stored)?;

    conn.execute(
        "INSERT INTO quizzes(id, class_id, title, body_json, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           class_id = excluded.class_id,
           title = excluded.title,
           body_json = excluded.body_json,
           updated_at = excluded.updated_at",
        (
            &stored.id,
            &stored.class_id,
            &stored.title,
            &body,
            &created_at,
            now.to_rfc3339(),
        ),
    )?;
    Ok(stored)
}

pub fn load_quiz(conn: &Connection, quiz_id: &str) -> StoreResult<Option<Quiz>> {
    let body: Option<String> = conn
        .query_row(
            "SELECT body_json FROM quizzes WHERE id = ?",
            [quiz_id],
            |r| r.get(0),
        )
        .optional()?;
    match body {
        Some(text) => Ok(Some(serde_json::from_str(&text)?)),
        None => Ok(None),
    }
}

pub fn list_quizzes(conn: &Connection, class_id: &str) -> StoreResult<Vec<Quiz>> {
    let mut stmt = conn.prepare(
        "SELECT body_json FROM quizzes WHERE class_id = ? ORDER BY created_at, id",
    )?;
    let bodies = stmt
        .query_map([class_id], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    let mut out = Vec::with_capacity(bodies.len());
    for text in bodies {
        out.push(serde_json::from_str(&text)?);
    }
    Ok(out)
}

/// The insert is the duplicate check: a second row for the same
/// (quiz, student) fails on the unique key.
pub fn insert_submission(conn: &Connection, submission: &Submission) -> StoreResult<()> {
    let body = serde_json::to_string(submission)?;
    match conn.execute(
        "INSERT INTO submissions(id, quiz_id, class_id, student_id, percentage, submitted_at, quiz_fingerprint, body_json)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &submission.id,
            &submission.quiz_id,
            &submission.class_id,
            &submission.student_id,
            submission.percentage,
            submission.submitted_at.to_rfc3339(),
            &submission.quiz_fingerprint,
            &body,
        ),
    ) {
        Ok(_) => Ok(()),
        Err(e) if is_unique_violation(&e) => Err(StoreError::DuplicateSubmission {
            quiz_id: submission.quiz_id.clone(),
            student_id: submission.student_id.clone(),
        }),
        Err(e) => Err(e.into()),
    }
}

fn load_submissions(conn: &Connection, sql: &str, key: &str) -> StoreResult<Vec<Submission>> {
    let mut stmt = conn.prepare(sql)?;
    let bodies = stmt
        .query_map([key], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    let mut out = Vec::with_capacity(bodies.len());
    for text in bodies {
        out.push(serde_json::from_str(&text)?);
    }
    Ok(out)
}

pub fn list_submissions_for_quiz(conn: &Connection, quiz_id: &str) -> StoreResult<Vec<Submission>> {
    load_submissions(
        conn,
        "SELECT body_json FROM submissions WHERE quiz_id = ? ORDER BY submitted_at, id",
        quiz_id,
    )
}

pub fn list_submissions_for_class(conn: &Connection, class_id: &str) -> StoreResult<Vec<Submission>> {
    load_submissions(
        conn,
        "SELECT body_json FROM submissions WHERE class_id = ? ORDER BY submitted_at, id",
        class_id,
    )
}

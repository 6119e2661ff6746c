use rusqlite::Connection;
use serde_json::json;
use std::path::PathBuf;

use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use crate::scorer::Quiz;
use crate::store::{self, ClassRecord, StoreError};

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<StoreError> for HandlerErr {
    fn from(e: StoreError) -> Self {
        let details = match &e {
            StoreError::DuplicateSubmission {
                quiz_id,
                student_id,
            } => Some(json!({ "quizId": quiz_id, "studentId": student_id })),
            _ => None,
        };
        Self {
            code: e.code(),
            message: e.to_string(),
            details,
        }
    }
}

pub fn db_conn(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::new("bad_params", format!("missing {}", key)))
}

pub fn get_optional_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Deserializes `params[key]`, reporting the serde message as `bad_params`.
pub fn get_param<T: serde::de::DeserializeOwned>(
    params: &serde_json::Value,
    key: &str,
) -> Result<T, HandlerErr> {
    let Some(raw) = params.get(key) else {
        return Err(HandlerErr::new("bad_params", format!("missing {}", key)));
    };
    serde_json::from_value(raw.clone())
        .map_err(|e| HandlerErr::new("bad_params", format!("invalid {}: {}", key, e)))
}

pub fn require_class(conn: &Connection, class_id: &str) -> Result<ClassRecord, HandlerErr> {
    store::find_class(conn, class_id)?.ok_or_else(|| {
        HandlerErr::new("not_found", "class not found").with_details(json!({ "classId": class_id }))
    })
}

pub fn require_quiz(conn: &Connection, quiz_id: &str) -> Result<Quiz, HandlerErr> {
    store::load_quiz(conn, quiz_id)?.ok_or_else(|| {
        HandlerErr::new("not_found", "quiz not found").with_details(json!({ "quizId": quiz_id }))
    })
}

pub fn write_text_file(path: &str, contents: &str) -> Result<(), HandlerErr> {
    let out = PathBuf::from(path);
    if let Some(parent) = out.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            HandlerErr::new("export_failed", e.to_string()).with_details(json!({ "path": path }))
        })?;
    }
    std::fs::write(&out, contents).map_err(|e| {
        HandlerErr::new("export_failed", e.to_string()).with_details(json!({ "path": path }))
    })
}

/// Runs a handler body and turns its error into the wire response.
pub fn respond(
    req: &Request,
    f: impl FnOnce() -> Result<serde_json::Value, HandlerErr>,
) -> serde_json::Value {
    match f() {
        Ok(result) => crate::ipc::error::ok(&req.id, result),
        Err(e) => e.response(&req.id),
    }
}

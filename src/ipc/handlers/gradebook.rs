use chrono::Utc;
use serde_json::json;

use crate::gradebook::{self, ExportScope};
use crate::ipc::helpers::{
    db_conn, get_optional_str, get_param, get_required_str, require_class, require_quiz, respond,
    write_text_file, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::store;

fn scope_param(req: &Request) -> Result<ExportScope, HandlerErr> {
    match req.params.get("scope") {
        None | Some(serde_json::Value::Null) => Ok(ExportScope::default()),
        Some(_) => get_param(&req.params, "scope"),
    }
}

fn handle_gradebook_export(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(req, || {
        let conn = db_conn(state)?;
        let class = require_class(conn, &get_required_str(&req.params, "classId")?)?;
        let scope = scope_param(req)?;
        if let ExportScope::DateRange { start, end } = &scope {
            if start > end {
                return Err(HandlerErr::new("bad_params", "scope.start is after scope.end"));
            }
        }

        let students = store::list_students(conn, &class.id)?;
        let all_quizzes = store::list_quizzes(conn, &class.id)?;
        let quizzes = gradebook::select_quizzes(&all_quizzes, &scope);
        if students.is_empty() || quizzes.is_empty() {
            return Err(HandlerErr::new("no_data", "nothing to export for this selection")
                .with_details(json!({
                    "students": students.len(),
                    "quizzes": quizzes.len(),
                })));
        }
        let submissions = store::list_submissions_for_class(conn, &class.id)?;

        let csv = gradebook::export_gradebook(&class.name, &students, &quizzes, &submissions);
        let filename =
            gradebook::gradebook_filename(&class.name, &scope, &all_quizzes, Utc::now().date_naive());
        let out_path = get_optional_str(&req.params, "outPath");
        if let Some(path) = out_path.as_deref() {
            write_text_file(path, &csv)?;
        }
        log::info!(
            "gradebook exported for class {}: {} students, {} quizzes",
            class.id,
            students.len(),
            quizzes.len()
        );
        Ok(json!({
            "filename": filename,
            "csv": csv,
            "path": out_path,
            "studentCount": students.len(),
            "quizCount": quizzes.len(),
        }))
    })
}

fn handle_gradebook_export_quiz(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(req, || {
        let conn = db_conn(state)?;
        let quiz = require_quiz(conn, &get_required_str(&req.params, "quizId")?)?;
        let class = require_class(conn, &quiz.class_id)?;
        let students = store::list_students(conn, &class.id)?;
        if students.is_empty() {
            return Err(HandlerErr::new("no_data", "class has no students"));
        }
        let submissions = store::list_submissions_for_quiz(conn, &quiz.id)?;

        let csv = gradebook::export_quiz_results(&students, &quiz, &submissions);
        let scope = ExportScope::Quiz {
            quiz_id: quiz.id.clone(),
        };
        let filename = gradebook::gradebook_filename(
            &class.name,
            &scope,
            std::slice::from_ref(&quiz),
            Utc::now().date_naive(),
        );
        let out_path = get_optional_str(&req.params, "outPath");
        if let Some(path) = out_path.as_deref() {
            write_text_file(path, &csv)?;
        }
        log::info!("quiz results exported for quiz {}", quiz.id);
        Ok(json!({
            "filename": filename,
            "csv": csv,
            "path": out_path,
        }))
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "gradebook.export" => Some(handle_gradebook_export(state, req)),
        "gradebook.exportQuiz" => Some(handle_gradebook_export_quiz(state, req)),
        _ => None,
    }
}

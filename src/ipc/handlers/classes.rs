use chrono::Utc;
use serde_json::json;

use crate::ipc::helpers::{db_conn, get_optional_str, get_required_str, require_class, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::roster::Student;
use crate::store;

fn handle_classes_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(req, || {
        let conn = db_conn(state)?;
        let name = get_required_str(&req.params, "name")?;
        let class = store::insert_class(conn, &name, Utc::now())
            .map_err(|e| HandlerErr::new("db_insert_failed", e.to_string()))?;
        log::info!("class {} created with join code {}", class.id, class.join_code);
        Ok(json!({ "class": class }))
    })
}

fn handle_classes_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(req, || {
        let conn = db_conn(state)?;
        let class_id = get_required_str(&req.params, "classId")?;
        let class = require_class(conn, &class_id)?;
        let students = store::list_students(conn, &class_id)?;
        let quizzes: Vec<serde_json::Value> = store::list_quizzes(conn, &class_id)?
            .iter()
            .map(|q| {
                json!({
                    "id": q.id,
                    "title": q.title,
                    "questionCount": q.questions.len(),
                    "totalPoints": q.total_points(),
                    "deadline": q.deadline,
                    "createdAt": q.created_at,
                })
            })
            .collect();
        Ok(json!({
            "class": class,
            "students": students,
            "quizzes": quizzes,
        }))
    })
}

fn handle_classes_join(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(req, || {
        let conn = db_conn(state)?;
        let code = get_required_str(&req.params, "joinCode")?;
        let student = Student {
            id: get_required_str(&req.params, "studentId")?,
            name: get_optional_str(&req.params, "name").unwrap_or_default(),
            email: get_optional_str(&req.params, "email"),
        };
        let Some(class) = store::find_class_by_code(conn, &code)? else {
            return Err(HandlerErr::new("not_found", "no class with that join code")
                .with_details(json!({ "joinCode": code })));
        };
        let joined = store::enroll_student(conn, &class.id, &student, Utc::now())
            .map_err(|e| HandlerErr::new("db_insert_failed", e.to_string()))?;
        if joined {
            log::info!("student {} joined class {}", student.id, class.id);
        }
        Ok(json!({ "class": class, "joined": joined }))
    })
}

fn handle_classes_remove_student(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(req, || {
        let conn = db_conn(state)?;
        let class_id = get_required_str(&req.params, "classId")?;
        let student_id = get_required_str(&req.params, "studentId")?;
        require_class(conn, &class_id)?;
        let removed = store::remove_student(conn, &class_id, &student_id)
            .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
        if !removed {
            return Err(HandlerErr::new("not_found", "student is not on the roster")
                .with_details(json!({ "classId": class_id, "studentId": student_id })));
        }
        log::info!("student {} removed from class {}", student_id, class_id);
        Ok(json!({ "removed": true }))
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classes.create" => Some(handle_classes_create(state, req)),
        "classes.get" => Some(handle_classes_get(state, req)),
        "classes.join" => Some(handle_classes_join(state, req)),
        "classes.removeStudent" => Some(handle_classes_remove_student(state, req)),
        _ => None,
    }
}

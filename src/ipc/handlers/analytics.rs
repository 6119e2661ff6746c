use serde_json::json;
use std::collections::HashMap;

use crate::classify;
use crate::ipc::helpers::{db_conn, get_required_str, require_class, require_quiz, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::roster::Student;
use crate::settings;
use crate::stats;
use crate::store;

fn handle_analytics_quiz(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(req, || {
        let conn = db_conn(state)?;
        let quiz = require_quiz(conn, &get_required_str(&req.params, "quizId")?)?;
        let submissions = store::list_submissions_for_quiz(conn, &quiz.id)?;
        let students = store::list_students(conn, &quiz.class_id)?;
        let names: HashMap<&str, &Student> = students.iter().map(|s| (s.id.as_str(), s)).collect();

        let scale = quiz.scale();
        let passing = quiz.passing_grade();
        // Students no longer on the roster stay in the rows but not the figures.
        let summary = stats::aggregate_class(&submissions, &students, &scale, passing);
        let latest = stats::latest_per_pair(&submissions);
        let percentages: Vec<i64> = latest
            .iter()
            .filter(|s| names.contains_key(s.student_id.as_str()))
            .map(|s| s.percentage)
            .collect();

        let rows: Vec<serde_json::Value> = latest
            .iter()
            .map(|s| {
                let verdict = classify::grade(s.percentage, &scale, passing);
                let rescored = s.rescore_from_snapshot().map(|r| r.percentage);
                if rescored.is_some_and(|p| p != s.percentage) {
                    log::warn!("submission {} no longer matches its quiz snapshot", s.id);
                }
                json!({
                    "studentId": s.student_id,
                    "name": names.get(s.student_id.as_str()).map(|st| st.display_name()).unwrap_or("Unknown"),
                    "enrolled": names.contains_key(s.student_id.as_str()),
                    "pointsEarned": s.points_earned,
                    "totalPoints": s.total_points,
                    "percentage": s.percentage,
                    "grade": verdict.grade.label,
                    "passed": verdict.passed,
                    "submittedAt": s.submitted_at,
                    "snapshotConsistent": rescored.map(|p| p == s.percentage),
                })
            })
            .collect();

        Ok(json!({
            "quizId": quiz.id,
            "title": quiz.title,
            "totalPoints": quiz.total_points(),
            "passingGrade": passing,
            "statistics": summary,
            "median": stats::median_percentage(&percentages),
            "highest": percentages.iter().copied().max(),
            "lowest": percentages.iter().copied().min(),
            "rows": rows,
        }))
    })
}

fn handle_analytics_class(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(req, || {
        let conn = db_conn(state)?;
        let class = require_class(conn, &get_required_str(&req.params, "classId")?)?;
        let defaults = settings::load_grading_defaults(conn)
            .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;
        let students = store::list_students(conn, &class.id)?;
        let quizzes = store::list_quizzes(conn, &class.id)?;
        let submissions = store::list_submissions_for_class(conn, &class.id)?;

        let scale = defaults.scale.resolve();
        let summary = stats::aggregate_class(&submissions, &students, &scale, defaults.passing_grade);
        let overview = stats::class_overview(&students, &quizzes, &submissions, defaults.passing_grade);
        Ok(json!({
            "class": class,
            "passingGrade": defaults.passing_grade,
            "statistics": summary,
            "overview": overview,
        }))
    })
}

fn handle_analytics_student(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(req, || {
        let conn = db_conn(state)?;
        let class = require_class(conn, &get_required_str(&req.params, "classId")?)?;
        let student_id = get_required_str(&req.params, "studentId")?;
        let students = store::list_students(conn, &class.id)?;
        let Some(student) = students.iter().find(|s| s.id == student_id) else {
            return Err(HandlerErr::new("not_found", "student is not on the roster")
                .with_details(json!({ "classId": class.id, "studentId": student_id })));
        };
        let quizzes = store::list_quizzes(conn, &class.id)?;
        let submissions = store::list_submissions_for_class(conn, &class.id)?;
        let summary = stats::student_summary(&student.id, &quizzes, &submissions);
        Ok(json!({
            "student": student,
            "summary": summary,
        }))
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "analytics.quiz" => Some(handle_analytics_quiz(state, req)),
        "analytics.class" => Some(handle_analytics_class(state, req)),
        "analytics.student" => Some(handle_analytics_student(state, req)),
        _ => None,
    }
}

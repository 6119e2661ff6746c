use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::classify;
use crate::ipc::helpers::{db_conn, get_param, get_required_str, require_class, require_quiz, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::scale::ScaleRef;
use crate::scorer::{self, AnswerSet, Quiz, ScoreResult};
use crate::settings;
use crate::store::{self, StoreError};
use crate::submission::Submission;

fn answers_param(req: &Request) -> Result<AnswerSet, HandlerErr> {
    match req.params.get("answers") {
        None | Some(serde_json::Value::Null) => Ok(AnswerSet::new()),
        Some(raw) => scorer::deserialize_answers(raw)
            .map_err(|e| HandlerErr::new("bad_params", format!("invalid answers: {}", e))),
    }
}

fn score_json(quiz: &Quiz, result: &ScoreResult) -> serde_json::Value {
    let verdict = classify::grade(result.percentage, &quiz.scale(), quiz.passing_grade());
    json!({
        "score": result,
        "grade": verdict.grade,
        "passed": verdict.passed,
    })
}

fn handle_quizzes_save(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(req, || {
        let conn = db_conn(state)?;
        let mut quiz: Quiz = get_param(&req.params, "quiz")?;
        if quiz.class_id.trim().is_empty() {
            return Err(HandlerErr::new("bad_params", "missing quiz.classId"));
        }
        require_class(conn, &quiz.class_id)?;
        if quiz.id.trim().is_empty() {
            quiz.id = Uuid::new_v4().to_string();
        } else if let Some(existing) = store::load_quiz(conn, &quiz.id)? {
            if existing.class_id != quiz.class_id {
                return Err(HandlerErr::new("wrong_class", "quiz belongs to another class")
                    .with_details(json!({ "quizId": quiz.id, "classId": existing.class_id })));
            }
        }

        let defaults = settings::load_grading_defaults(conn)
            .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;
        defaults.apply_to(&mut quiz);

        let issues = quiz.validate();
        if !issues.is_empty() {
            log::warn!("rejected quiz {}: {} issue(s)", quiz.id, issues.len());
            return Err(HandlerErr::new("invalid_quiz", "quiz failed validation")
                .with_details(json!({ "issues": issues })));
        }
        let warnings = match &quiz.grading_scale {
            Some(ScaleRef::Custom(s)) => s.validate().warnings,
            _ => Vec::new(),
        };

        let saved = store::save_quiz(conn, &quiz, Utc::now())
            .map_err(|e| HandlerErr::new("db_insert_failed", e.to_string()))?;
        log::info!(
            "quiz {} saved for class {} ({} questions)",
            saved.id,
            saved.class_id,
            saved.questions.len()
        );
        Ok(json!({
            "quiz": saved,
            "totalPoints": saved.total_points(),
            "warnings": warnings,
        }))
    })
}

fn handle_quizzes_questions(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(req, || {
        let conn = db_conn(state)?;
        let quiz = require_quiz(conn, &get_required_str(&req.params, "quizId")?)?;
        Ok(json!({
            "quizId": quiz.id,
            "classId": quiz.class_id,
            "title": quiz.title,
            "deadline": quiz.deadline,
            "totalPoints": quiz.total_points(),
            "questions": scorer::public_questions(&quiz),
        }))
    })
}

/// Self-check scoring. Uses the same scorer as submit and stores nothing.
fn handle_quizzes_preview(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(req, || {
        let conn = db_conn(state)?;
        let quiz = require_quiz(conn, &get_required_str(&req.params, "quizId")?)?;
        let answers = answers_param(req)?;
        let result = scorer::score(&quiz, &answers);
        Ok(score_json(&quiz, &result))
    })
}

fn handle_quizzes_submit(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(req, || {
        let conn = db_conn(state)?;
        let quiz_id = get_required_str(&req.params, "quizId")?;
        let class_id = get_required_str(&req.params, "classId")?;
        let student_id = get_required_str(&req.params, "studentId")?;
        let answers = answers_param(req)?;

        let quiz = require_quiz(conn, &quiz_id)?;
        if quiz.class_id != class_id {
            log::warn!("submit for quiz {} rejected: wrong class {}", quiz_id, class_id);
            return Err(HandlerErr::new("wrong_class", "quiz does not belong to this class")
                .with_details(json!({ "quizId": quiz_id, "classId": class_id })));
        }
        let now = Utc::now();
        if let Some(deadline) = quiz.deadline {
            if now > deadline {
                log::warn!("submit for quiz {} by {} rejected: deadline passed", quiz_id, student_id);
                return Err(HandlerErr::new("deadline_passed", "the deadline for this quiz has passed")
                    .with_details(json!({ "deadline": deadline })));
            }
        }
        if !store::is_enrolled(conn, &class_id, &student_id)? {
            log::warn!("submit for quiz {} rejected: {} not enrolled", quiz_id, student_id);
            return Err(HandlerErr::new("not_enrolled", "student is not enrolled in this class")
                .with_details(json!({ "classId": class_id, "studentId": student_id })));
        }

        let (submission, result) =
            Submission::grade(Uuid::new_v4().to_string(), &quiz, &student_id, answers, now);
        match store::insert_submission(conn, &submission) {
            Ok(()) => {}
            Err(e @ StoreError::DuplicateSubmission { .. }) => {
                log::warn!("duplicate submission for quiz {} by {}", quiz_id, student_id);
                return Err(e.into());
            }
            Err(e) => return Err(HandlerErr::new("db_insert_failed", e.to_string())),
        }
        log::info!(
            "submission {} recorded: quiz {} student {} {}%",
            submission.id,
            quiz_id,
            student_id,
            result.percentage
        );

        let mut out = score_json(&quiz, &result);
        out["submissionId"] = json!(submission.id);
        out["submittedAt"] = json!(submission.submitted_at);
        Ok(out)
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "quizzes.save" => Some(handle_quizzes_save(state, req)),
        "quizzes.questions" => Some(handle_quizzes_questions(state, req)),
        "quizzes.preview" => Some(handle_quizzes_preview(state, req)),
        "quizzes.submit" => Some(handle_quizzes_submit(state, req)),
        _ => None,
    }
}

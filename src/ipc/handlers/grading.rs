use serde_json::json;

use crate::classify;
use crate::ipc::helpers::{db_conn, get_param, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::scale::{self, GradingScale, ScaleRef};
use crate::settings::{self, GradingDefaults};
use crate::stats::round_half_up;

fn scale_from_ref(r: &ScaleRef) -> Result<GradingScale, HandlerErr> {
    match r {
        ScaleRef::Named(key) => scale::builtin(key).ok_or_else(|| {
            HandlerErr::new("invalid_scale", format!("unknown grading scale: {}", key))
                .with_details(json!({ "known": scale::builtin_keys() }))
        }),
        ScaleRef::Custom(s) => Ok(s.clone()),
    }
}

// Classification works without a workspace; an open one contributes its
// saved defaults.
fn current_defaults(state: &AppState) -> Result<GradingDefaults, HandlerErr> {
    match state.db.as_ref() {
        Some(conn) => settings::load_grading_defaults(conn)
            .map_err(|e| HandlerErr::new("db_query_failed", e.to_string())),
        None => Ok(GradingDefaults::default()),
    }
}

fn handle_settings_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(req, || {
        let conn = db_conn(state)?;
        let defaults = settings::load_grading_defaults(conn)
            .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;
        Ok(json!({ "gradingDefaults": defaults }))
    })
}

fn handle_settings_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(req, || {
        let conn = db_conn(state)?;
        let Some(patch) = req.params.get("gradingDefaults").filter(|v| v.is_object()) else {
            return Err(HandlerErr::new("bad_params", "missing gradingDefaults object"));
        };
        let saved = settings::update_grading_defaults(conn, patch)
            .map_err(|e| HandlerErr::new("bad_params", e.to_string()))?;
        log::info!(
            "grading defaults updated: passing {} scale {:?}",
            saved.passing_grade,
            saved.scale
        );
        Ok(json!({ "gradingDefaults": saved }))
    })
}

fn handle_scales_list(_state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(req, || {
        let scales: Vec<serde_json::Value> = scale::builtin_keys()
            .iter()
            .filter_map(|key| scale::builtin(key).map(|s| json!({ "key": key, "scale": s })))
            .collect();
        Ok(json!({ "scales": scales }))
    })
}

fn handle_scales_validate(_state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(req, || {
        let r: ScaleRef = get_param(&req.params, "scale")?;
        let s = scale_from_ref(&r)?;
        let report = s.validate();
        let uncovered: Vec<serde_json::Value> = s
            .uncovered_ranges()
            .into_iter()
            .map(|(lo, hi)| json!({ "min": lo, "max": hi }))
            .collect();
        Ok(json!({
            "valid": report.is_valid(),
            "errors": report.errors,
            "warnings": report.warnings,
            "uncoveredRanges": uncovered,
        }))
    })
}

fn handle_grades_classify(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(req, || {
        let Some(pct) = req.params.get("percentage").and_then(|v| v.as_f64()) else {
            return Err(HandlerErr::new("bad_params", "missing percentage"));
        };
        let defaults = current_defaults(state)?;
        let scale = match req.params.get("scale") {
            Some(raw) if !raw.is_null() => {
                let r: ScaleRef = serde_json::from_value(raw.clone())
                    .map_err(|e| HandlerErr::new("bad_params", format!("invalid scale: {}", e)))?;
                scale_from_ref(&r)?
            }
            _ => defaults.scale.resolve(),
        };
        let passing = req
            .params
            .get("passingGrade")
            .and_then(|v| v.as_i64())
            .unwrap_or(defaults.passing_grade);
        let verdict = classify::grade(round_half_up(pct), &scale, passing);
        Ok(json!({ "verdict": verdict }))
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "settings.get" => Some(handle_settings_get(state, req)),
        "settings.update" => Some(handle_settings_update(state, req)),
        "scales.list" => Some(handle_scales_list(state, req)),
        "scales.validate" => Some(handle_scales_validate(state, req)),
        "grades.classify" => Some(handle_grades_classify(state, req)),
        _ => None,
    }
}

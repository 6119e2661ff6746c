//! Workspace-level grading defaults, stored in the settings table.

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::classify::DEFAULT_PASSING_GRADE;
use crate::db;
use crate::scale::ScaleRef;
use crate::scorer::Quiz;

pub const GRADING_DEFAULTS_KEY: &str = "grading.defaults";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingDefaults {
    #[serde(default = "default_passing_grade")]
    pub passing_grade: i64,
    #[serde(default)]
    pub scale: ScaleRef,
}

fn default_passing_grade() -> i64 {
    DEFAULT_PASSING_GRADE
}

impl Default for GradingDefaults {
    fn default() -> Self {
        Self {
            passing_grade: DEFAULT_PASSING_GRADE,
            scale: ScaleRef::default(),
        }
    }
}

impl GradingDefaults {
    /// Fills in whatever the quiz left unset.
    pub fn apply_to(&self, quiz: &mut Quiz) {
        if quiz.passing_grade.is_none() {
            quiz.passing_grade = Some(self.passing_grade);
        }
        if quiz.grading_scale.is_none() {
            quiz.grading_scale = Some(self.scale.clone());
        }
    }
}

fn merge_json(base: &mut serde_json::Value, patch: &serde_json::Value) {
    match (base, patch) {
        (serde_json::Value::Object(b), serde_json::Value::Object(p)) => {
            for (k, v) in p {
                b.insert(k.clone(), v.clone());
            }
        }
        (b, p) => *b = p.clone(),
    }
}

/// Saved values are merged over the defaults field by field; a field that no
/// longer parses falls back to its default instead of failing the load.
pub fn load_grading_defaults(conn: &Connection) -> anyhow::Result<GradingDefaults> {
    let defaults = GradingDefaults::default();
    let Some(saved) = db::settings_get_json(conn, GRADING_DEFAULTS_KEY)? else {
        return Ok(defaults);
    };
    let mut merged = serde_json::to_value(&defaults)?;
    merge_json(&mut merged, &saved);

    let mut out = defaults.clone();
    if let Some(pg) = merged.get("passingGrade").and_then(|v| v.as_i64()) {
        if (0..=100).contains(&pg) {
            out.passing_grade = pg;
        } else {
            log::warn!("ignoring saved passingGrade {} outside 0..=100", pg);
        }
    }
    if let Some(raw) = merged.get("scale") {
        match serde_json::from_value::<ScaleRef>(raw.clone()) {
            Ok(scale) => out.scale = scale,
            Err(e) => log::warn!("ignoring saved grading scale: {}", e),
        }
    }
    Ok(out)
}

/// Applies a partial update and returns the stored result.
pub fn update_grading_defaults(
    conn: &Connection,
    patch: &serde_json::Value,
) -> anyhow::Result<GradingDefaults> {
    let current = load_grading_defaults(conn)?;
    let mut merged = serde_json::to_value(&current)?;
    merge_json(&mut merged, patch);
    let next: GradingDefaults = serde_json::from_value(merged)?;
    if !(0..=100).contains(&next.passing_grade) {
        anyhow::bail!("passingGrade must be between 0 and 100");
    }
    if let ScaleRef::Custom(scale) = &next.scale {
        let report = scale.validate();
        if !report.is_valid() {
            anyhow::bail!("invalid grading scale: {}", report.errors.join("; "));
        }
    }
    db::settings_set_json(
        conn,
        GRADING_DEFAULTS_KEY,
        &json!({
            "passingGrade": next.passing_grade,
            "scale": next.scale,
        }),
    )?;
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_db() -> Connection {
        let dir = std::env::temp_dir().join(format!("quizbook-settings-{}", uuid::Uuid::new_v4()));
        db::open_db(&dir).expect("open db")
    }

    #[test]
    fn fresh_workspace_uses_defaults() {
        let conn = temp_db();
        let d = load_grading_defaults(&conn).expect("load");
        assert_eq!(d.passing_grade, 70);
        assert_eq!(d.scale, ScaleRef::Named("traditional".to_string()));
    }

    #[test]
    fn partial_update_keeps_other_fields() {
        let conn = temp_db();
        update_grading_defaults(&conn, &json!({ "scale": "passFail" })).expect("update");
        let d = load_grading_defaults(&conn).expect("load");
        assert_eq!(d.passing_grade, 70);
        assert_eq!(d.scale, ScaleRef::Named("passFail".to_string()));
    }

    #[test]
    fn malformed_saved_values_fall_back() {
        let conn = temp_db();
        db::settings_set_json(
            &conn,
            GRADING_DEFAULTS_KEY,
            &json!({ "passingGrade": "high", "scale": 12 }),
        )
        .expect("seed");
        let d = load_grading_defaults(&conn).expect("load");
        assert_eq!(d, GradingDefaults::default());
    }

    #[test]
    fn out_of_range_update_is_rejected() {
        let conn = temp_db();
        assert!(update_grading_defaults(&conn, &json!({ "passingGrade": 150 })).is_err());
    }
}

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

pub const NEUTRAL_COLOR: &str = "#6b7280";
pub const DEFAULT_SCALE_KEY: &str = "traditional";

const BUILTIN_KEYS: [&str; 4] = ["traditional", "plusMinus", "passFail", "excellence"];

fn default_band_color() -> String {
    NEUTRAL_COLOR.to_string()
}

/// One labelled percentage range. Bounds are inclusive on both ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeBand {
    pub label: String,
    pub min: i64,
    pub max: i64,
    #[serde(default = "default_band_color")]
    pub color: String,
}

impl GradeBand {
    pub fn new(label: &str, min: i64, max: i64, color: &str) -> Self {
        Self {
            label: label.to_string(),
            min,
            max,
            color: color.to_string(),
        }
    }

    pub fn contains(&self, percentage: i64) -> bool {
        self.min <= percentage && percentage <= self.max
    }
}

/// Ordered set of bands. Classification walks `bands` front to back, so
/// when two bands overlap the earlier one wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingScale {
    pub name: String,
    pub bands: Vec<GradeBand>,
}

impl Default for GradingScale {
    fn default() -> Self {
        Self::traditional()
    }
}

impl GradingScale {
    pub fn traditional() -> Self {
        Self {
            name: "Traditional A-F".to_string(),
            bands: vec![
                GradeBand::new("A", 90, 100, "#10b981"),
                GradeBand::new("B", 80, 89, "#3b82f6"),
                GradeBand::new("C", 70, 79, "#f59e0b"),
                GradeBand::new("D", 60, 69, "#ef4444"),
                GradeBand::new("F", 0, 59, NEUTRAL_COLOR),
            ],
        }
    }

    pub fn plus_minus() -> Self {
        Self {
            name: "Plus/Minus System".to_string(),
            bands: vec![
                GradeBand::new("A+", 97, 100, "#10b981"),
                GradeBand::new("A", 93, 96, "#10b981"),
                GradeBand::new("A-", 90, 92, "#10b981"),
                GradeBand::new("B+", 87, 89, "#3b82f6"),
                GradeBand::new("B", 83, 86, "#3b82f6"),
                GradeBand::new("B-", 80, 82, "#3b82f6"),
                GradeBand::new("C+", 77, 79, "#f59e0b"),
                GradeBand::new("C", 73, 76, "#f59e0b"),
                GradeBand::new("C-", 70, 72, "#f59e0b"),
                GradeBand::new("D+", 67, 69, "#ef4444"),
                GradeBand::new("D", 63, 66, "#ef4444"),
                GradeBand::new("D-", 60, 62, "#ef4444"),
                GradeBand::new("F", 0, 59, NEUTRAL_COLOR),
            ],
        }
    }

    pub fn pass_fail() -> Self {
        Self {
            name: "Pass/Fail".to_string(),
            bands: vec![
                GradeBand::new("Pass", 70, 100, "#10b981"),
                GradeBand::new("Fail", 0, 69, "#ef4444"),
            ],
        }
    }

    pub fn excellence() -> Self {
        Self {
            name: "Excellence Scale".to_string(),
            bands: vec![
                GradeBand::new("Excellent", 95, 100, "#10b981"),
                GradeBand::new("Very Good", 85, 94, "#3b82f6"),
                GradeBand::new("Good", 75, 84, "#f59e0b"),
                GradeBand::new("Satisfactory", 65, 74, "#ef4444"),
                GradeBand::new("Needs Improvement", 0, 64, NEUTRAL_COLOR),
            ],
        }
    }

    pub fn validate(&self) -> ScaleReport {
        let mut report = ScaleReport::default();
        if self.bands.is_empty() {
            report.errors.push("scale has no bands".to_string());
            return report;
        }

        for (i, band) in self.bands.iter().enumerate() {
            if band.label.trim().is_empty() {
                report.errors.push(format!("bands[{}]: label must not be empty", i));
            }
            if band.min < 0 || band.max > 100 {
                report.errors.push(format!(
                    "bands[{}] '{}': bounds {}-{} fall outside 0-100",
                    i, band.label, band.min, band.max
                ));
            }
            if band.min > band.max {
                report.errors.push(format!(
                    "bands[{}] '{}': min {} is greater than max {}",
                    i, band.label, band.min, band.max
                ));
            }
        }

        for (i, a) in self.bands.iter().enumerate() {
            for b in self.bands.iter().skip(i + 1) {
                if a.min <= b.max && b.min <= a.max {
                    report.warnings.push(format!(
                        "bands '{}' and '{}' overlap; '{}' wins for shared percentages",
                        a.label, b.label, a.label
                    ));
                }
            }
        }

        for (start, end) in self.uncovered_ranges() {
            if start == end {
                report
                    .warnings
                    .push(format!("no band covers {}%", start));
            } else {
                report
                    .warnings
                    .push(format!("no band covers {}-{}%", start, end));
            }
        }

        report
    }

    /// Inclusive runs of whole percentages in 0..=100 that no band contains.
    pub fn uncovered_ranges(&self) -> Vec<(i64, i64)> {
        let mut out: Vec<(i64, i64)> = Vec::new();
        let mut run_start: Option<i64> = None;
        for p in 0..=100_i64 {
            let covered = self.bands.iter().any(|b| b.contains(p));
            match (covered, run_start) {
                (false, None) => run_start = Some(p),
                (true, Some(s)) => {
                    out.push((s, p - 1));
                    run_start = None;
                }
                _ => {}
            }
        }
        if let Some(s) = run_start {
            out.push((s, 100));
        }
        out
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ScaleReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

pub fn builtin_keys() -> &'static [&'static str] {
    &BUILTIN_KEYS
}

pub fn builtin(key: &str) -> Option<GradingScale> {
    match key {
        "traditional" => Some(GradingScale::traditional()),
        "plusMinus" => Some(GradingScale::plus_minus()),
        "passFail" => Some(GradingScale::pass_fail()),
        "excellence" | "excellent" => Some(GradingScale::excellence()),
        _ => None,
    }
}

/// How a quiz names its scale on the wire: a built-in key or an inline
/// custom definition.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ScaleRef {
    Named(String),
    Custom(GradingScale),
}

#[derive(Debug, Clone, Deserialize)]
struct LegacyBand {
    #[serde(default)]
    min: i64,
    #[serde(default)]
    max: i64,
    #[serde(default = "default_band_color")]
    color: String,
}

/// Older records keep bands as a `grades` map keyed by label.
#[derive(Debug, Clone, Deserialize)]
struct LegacyScale {
    #[serde(default)]
    name: String,
    grades: BTreeMap<String, LegacyBand>,
}

impl From<LegacyScale> for GradingScale {
    // Map order is not preserved through JSON values, so bands are ordered
    // highest range first, which is how every stored scale was written.
    fn from(legacy: LegacyScale) -> Self {
        let mut bands: Vec<GradeBand> = legacy
            .grades
            .into_iter()
            .map(|(label, b)| GradeBand {
                label,
                min: b.min,
                max: b.max,
                color: b.color,
            })
            .collect();
        bands.sort_by(|a, b| b.min.cmp(&a.min).then(b.max.cmp(&a.max)));
        GradingScale {
            name: legacy.name,
            bands,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawScaleRef {
    Named(String),
    Custom(GradingScale),
    Legacy(LegacyScale),
}

impl<'de> Deserialize<'de> for ScaleRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match RawScaleRef::deserialize(deserializer)? {
            RawScaleRef::Named(key) => ScaleRef::Named(key),
            RawScaleRef::Custom(scale) => ScaleRef::Custom(scale),
            RawScaleRef::Legacy(legacy) => ScaleRef::Custom(legacy.into()),
        })
    }
}

impl Default for ScaleRef {
    fn default() -> Self {
        ScaleRef::Named(DEFAULT_SCALE_KEY.to_string())
    }
}

impl ScaleRef {
    pub fn resolve(&self) -> GradingScale {
        match self {
            ScaleRef::Custom(scale) => scale.clone(),
            ScaleRef::Named(key) => builtin(key).unwrap_or_else(|| {
                log::warn!("unknown grading scale '{}', using traditional", key);
                GradingScale::traditional()
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_scales_partition_zero_to_hundred() {
        for key in builtin_keys() {
            let scale = builtin(key).expect("builtin");
            let report = scale.validate();
            assert!(report.is_valid(), "{}: {:?}", key, report.errors);
            assert!(report.warnings.is_empty(), "{}: {:?}", key, report.warnings);
        }
    }

    #[test]
    fn inverted_and_out_of_range_bands_are_errors() {
        let scale = GradingScale {
            name: "Broken".to_string(),
            bands: vec![
                GradeBand::new("Hi", 90, 80, "#000"),
                GradeBand::new("Lo", -5, 79, "#000"),
            ],
        };
        let report = scale.validate();
        assert!(!report.is_valid());
        assert!(report.errors.iter().any(|e| e.contains("greater than max")));
        assert!(report.errors.iter().any(|e| e.contains("outside 0-100")));
    }

    #[test]
    fn gaps_and_overlaps_are_warnings_only() {
        let scale = GradingScale {
            name: "Custom".to_string(),
            bands: vec![
                GradeBand::new("Top", 80, 100, "#000"),
                GradeBand::new("Mid", 75, 85, "#000"),
                GradeBand::new("Low", 0, 59, "#000"),
            ],
        };
        let report = scale.validate();
        assert!(report.is_valid());
        assert_eq!(scale.uncovered_ranges(), vec![(60, 74)]);
        assert!(report.warnings.iter().any(|w| w.contains("overlap")));
        assert!(report.warnings.iter().any(|w| w.contains("60-74")));
    }

    #[test]
    fn scale_ref_accepts_key_or_inline_definition() {
        let named: ScaleRef = serde_json::from_str("\"passFail\"").expect("named");
        assert_eq!(named.resolve(), GradingScale::pass_fail());

        let inline: ScaleRef = serde_json::from_value(serde_json::json!({
            "name": "Two band",
            "bands": [
                { "label": "Good", "min": 50, "max": 100 },
                { "label": "Bad", "min": 0, "max": 49, "color": "#ff0000" }
            ]
        }))
        .expect("inline");
        let scale = inline.resolve();
        assert_eq!(scale.bands.len(), 2);
        assert_eq!(scale.bands[0].color, NEUTRAL_COLOR);

        let unknown = ScaleRef::Named("nope".to_string());
        assert_eq!(unknown.resolve(), GradingScale::traditional());
    }

    #[test]
    fn legacy_grades_map_becomes_ordered_bands() {
        let r: ScaleRef = serde_json::from_value(serde_json::json!({
            "name": "Traditional A-F",
            "grades": {
                "A": { "min": 90, "max": 100, "color": "#10b981" },
                "B": { "min": 80, "max": 89, "color": "#3b82f6" },
                "C": { "min": 70, "max": 79, "color": "#f59e0b" },
                "D": { "min": 60, "max": 69, "color": "#ef4444" },
                "F": { "min": 0, "max": 59, "color": "#6b7280" }
            }
        }))
        .expect("legacy scale");
        assert_eq!(r.resolve(), GradingScale::traditional());

        let pass: ScaleRef = serde_json::from_value(serde_json::json!({
            "grades": { "Fail": { "min": 0, "max": 69 }, "Pass": { "min": 70, "max": 100 } }
        }))
        .expect("legacy pass/fail");
        let labels: Vec<String> = pass.resolve().bands.into_iter().map(|b| b.label).collect();
        assert_eq!(labels, vec!["Pass", "Fail"]);
    }

    #[test]
    fn excellent_key_names_the_excellence_scale() {
        let r = ScaleRef::Named("excellent".to_string());
        assert_eq!(r.resolve(), GradingScale::excellence());
    }
}

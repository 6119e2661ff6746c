use serde::Serialize;

use crate::scale::{GradingScale, NEUTRAL_COLOR};

pub const DEFAULT_PASSING_GRADE: i64 = 70;

const FALLBACK_LABEL: &str = "F";
const FALLBACK_MIN: i64 = 0;
const FALLBACK_MAX: i64 = 59;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub label: String,
    pub color: String,
    pub min: i64,
    pub max: i64,
}

impl Classification {
    fn fallback() -> Self {
        Self {
            label: FALLBACK_LABEL.to_string(),
            color: NEUTRAL_COLOR.to_string(),
            min: FALLBACK_MIN,
            max: FALLBACK_MAX,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeVerdict {
    pub percentage: i64,
    pub grade: Classification,
    pub passed: bool,
}

/// First band (in scale order) containing `percentage`. Percentages that no
/// band covers, including anything outside 0-100, land in the fallback `F`.
pub fn classify(percentage: i64, scale: &GradingScale) -> Classification {
    scale
        .bands
        .iter()
        .find(|b| b.contains(percentage))
        .map(|b| Classification {
            label: b.label.clone(),
            color: b.color.clone(),
            min: b.min,
            max: b.max,
        })
        .unwrap_or_else(Classification::fallback)
}

pub fn passed(percentage: i64, passing_grade: i64) -> bool {
    percentage >= passing_grade
}

pub fn grade(percentage: i64, scale: &GradingScale, passing_grade: i64) -> GradeVerdict {
    GradeVerdict {
        percentage,
        grade: classify(percentage, scale),
        passed: passed(percentage, passing_grade),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scale::GradeBand;

    #[test]
    fn traditional_boundaries() {
        let scale = GradingScale::traditional();
        assert_eq!(classify(89, &scale).label, "B");
        assert_eq!(classify(90, &scale).label, "A");
        assert_eq!(classify(100, &scale).label, "A");
        assert_eq!(classify(59, &scale).label, "F");
        assert_eq!(classify(60, &scale).label, "D");
        assert_eq!(classify(0, &scale).label, "F");
    }

    #[test]
    fn every_percentage_gets_exactly_one_band() {
        let scale = GradingScale::traditional();
        for p in 0..=100 {
            let c = classify(p, &scale);
            let hits = scale.bands.iter().filter(|b| b.contains(p)).count();
            assert_eq!(hits, 1, "{}", p);
            assert!(c.min <= p && p <= c.max, "{} -> {:?}", p, c);
        }
    }

    #[test]
    fn out_of_range_and_gaps_fall_back_to_f() {
        let scale = GradingScale::traditional();
        assert_eq!(classify(101, &scale).label, "F");
        assert_eq!(classify(-3, &scale).label, "F");

        let gappy = GradingScale {
            name: "Gappy".to_string(),
            bands: vec![GradeBand::new("Top", 90, 100, "#10b981")],
        };
        let c = classify(50, &gappy);
        assert_eq!(c.label, "F");
        assert_eq!(c.color, NEUTRAL_COLOR);
    }

    #[test]
    fn overlapping_bands_resolve_to_first_match() {
        let scale = GradingScale {
            name: "Overlap".to_string(),
            bands: vec![
                GradeBand::new("First", 50, 100, "#000"),
                GradeBand::new("Second", 0, 70, "#111"),
            ],
        };
        assert_eq!(classify(60, &scale).label, "First");
        assert_eq!(classify(40, &scale).label, "Second");
    }

    #[test]
    fn passing_is_independent_of_labels() {
        let scale = GradingScale::pass_fail();
        let v = grade(69, &scale, 60);
        assert_eq!(v.grade.label, "Fail");
        assert!(v.passed);
        assert!(passed(70, DEFAULT_PASSING_GRADE));
        assert!(!passed(69, DEFAULT_PASSING_GRADE));
    }
}

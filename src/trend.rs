use serde::{Deserialize, Serialize};

/// How many of the latest scores form the "recent" window.
pub const RECENT_WINDOW: usize = 3;
/// Percentage points the recent average must move before it counts.
pub const TREND_THRESHOLD: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Improving,
    Declining,
    Stable,
}

fn mean(values: &[i64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().map(|v| *v as f64).sum::<f64>() / values.len() as f64
}

/// `scores` must already be in time order, oldest first.
pub fn detect_trend(scores: &[i64]) -> Trend {
    if scores.len() < RECENT_WINDOW {
        return Trend::Stable;
    }
    let split = scores.len() - RECENT_WINDOW;
    let (older, recent) = scores.split_at(split);
    let avg_recent = mean(recent);
    let avg_older = if older.is_empty() {
        avg_recent
    } else {
        mean(older)
    };

    if avg_recent > avg_older + TREND_THRESHOLD {
        Trend::Improving
    } else if avg_recent < avg_older - TREND_THRESHOLD {
        Trend::Declining
    } else {
        Trend::Stable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_histories_are_stable() {
        assert_eq!(detect_trend(&[]), Trend::Stable);
        assert_eq!(detect_trend(&[80]), Trend::Stable);
        assert_eq!(detect_trend(&[80, 90]), Trend::Stable);
        assert_eq!(detect_trend(&[10, 50, 100]), Trend::Stable);
    }

    #[test]
    fn detects_direction_against_older_scores() {
        assert_eq!(detect_trend(&[50, 55, 52, 90, 92, 95]), Trend::Improving);
        assert_eq!(detect_trend(&[90, 92, 95, 50, 55, 52]), Trend::Declining);
        assert_eq!(detect_trend(&[70, 72, 74, 76]), Trend::Stable);
    }

    #[test]
    fn threshold_is_exclusive() {
        // recent avg 75 vs older 70: exactly +5 is not enough
        assert_eq!(detect_trend(&[70, 75, 75, 75]), Trend::Stable);
        assert_eq!(detect_trend(&[70, 76, 76, 76]), Trend::Improving);
        assert_eq!(detect_trend(&[70, 65, 65, 65]), Trend::Stable);
        assert_eq!(detect_trend(&[70, 64, 64, 64]), Trend::Declining);
    }

    #[test]
    fn serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(Trend::Improving).expect("serialize"),
            serde_json::json!("improving")
        );
        assert_eq!(
            serde_json::to_value(Trend::Declining).expect("serialize"),
            serde_json::json!("declining")
        );
    }
}

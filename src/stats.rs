use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::classify::{classify, passed};
use crate::roster::{enrolled_ids, Student};
use crate::scale::GradingScale;
use crate::scorer::Quiz;
use crate::submission::Submission;
use crate::trend::{detect_trend, Trend};

const TOP_BOTTOM_COUNT: usize = 5;

/// Half-up rounding to a whole number (`Math.round` semantics).
pub fn round_half_up(x: f64) -> i64 {
    (x + 0.5).floor() as i64
}

/// Half-up rounding to one decimal: `Int(10*x + 0.5) / 10`.
pub fn round_off_1_decimal(x: f64) -> f64 {
    ((10.0 * x) + 0.5).floor() / 10.0
}

pub fn mean_rounded(values: impl Iterator<Item = i64>) -> i64 {
    let mut sum = 0_i64;
    let mut n = 0_i64;
    for v in values {
        sum += v;
        n += 1;
    }
    if n == 0 {
        return 0;
    }
    round_half_up(sum as f64 / n as f64)
}

fn rate(part: usize, whole: usize) -> i64 {
    if whole == 0 {
        return 0;
    }
    round_half_up(part as f64 / whole as f64 * 100.0)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeCount {
    pub label: String,
    pub count: usize,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassStatistics {
    pub total_submissions: usize,
    pub total_students: usize,
    pub quiz_count: usize,
    pub average_percentage: i64,
    pub average_points: i64,
    pub passed_count: usize,
    pub failed_count: usize,
    pub pass_rate: i64,
    pub grade_distribution: Vec<GradeCount>,
}

/// Keeps the latest submission per (student, quiz). Equal timestamps go to
/// whichever appears later in `submissions`. Output follows first-seen order.
pub fn latest_per_pair(submissions: &[Submission]) -> Vec<&Submission> {
    let mut order: Vec<(&str, &str)> = Vec::new();
    let mut latest: HashMap<(&str, &str), &Submission> = HashMap::new();
    for s in submissions {
        let key = (s.student_id.as_str(), s.quiz_id.as_str());
        match latest.get(&key) {
            Some(existing) if existing.submitted_at > s.submitted_at => {}
            Some(_) => {
                latest.insert(key, s);
            }
            None => {
                order.push(key);
                latest.insert(key, s);
            }
        }
    }
    order
        .iter()
        .filter_map(|k| latest.get(k).copied())
        .collect()
}

/// One entry per distinct band label, in scale order, even at zero. A
/// fallback label outside the scale is appended so the counts always add up.
pub fn grade_distribution(percentages: &[i64], scale: &GradingScale) -> Vec<GradeCount> {
    let mut out: Vec<GradeCount> = Vec::new();
    for band in &scale.bands {
        if out.iter().any(|g| g.label == band.label) {
            continue;
        }
        out.push(GradeCount {
            label: band.label.clone(),
            count: 0,
            color: band.color.clone(),
        });
    }
    for p in percentages {
        let c = classify(*p, scale);
        match out.iter_mut().find(|g| g.label == c.label) {
            Some(entry) => entry.count += 1,
            None => out.push(GradeCount {
                label: c.label,
                count: 1,
                color: c.color,
            }),
        }
    }
    out
}

fn summarize(kept: &[&Submission], scale: &GradingScale, passing_grade: i64) -> ClassStatistics {
    let total = kept.len();
    let students: HashSet<&str> = kept.iter().map(|s| s.student_id.as_str()).collect();
    let quizzes: HashSet<&str> = kept.iter().map(|s| s.quiz_id.as_str()).collect();
    let percentages: Vec<i64> = kept.iter().map(|s| s.percentage).collect();
    let passed_count = percentages
        .iter()
        .filter(|p| passed(**p, passing_grade))
        .count();

    ClassStatistics {
        total_submissions: total,
        total_students: students.len(),
        quiz_count: quizzes.len(),
        average_percentage: mean_rounded(percentages.iter().copied()),
        average_points: mean_rounded(kept.iter().map(|s| s.points_earned)),
        passed_count,
        failed_count: total - passed_count,
        pass_rate: rate(passed_count, total),
        grade_distribution: grade_distribution(&percentages, scale),
    }
}

/// Quiz-level statistics. Duplicate (student, quiz) records collapse to the
/// latest one rather than counting twice.
pub fn aggregate(
    submissions: &[Submission],
    scale: &GradingScale,
    passing_grade: i64,
) -> ClassStatistics {
    summarize(&latest_per_pair(submissions), scale, passing_grade)
}

/// Class-level statistics over currently enrolled students only.
pub fn aggregate_class(
    submissions: &[Submission],
    enrolled: &[Student],
    scale: &GradingScale,
    passing_grade: i64,
) -> ClassStatistics {
    let ids = enrolled_ids(enrolled);
    let kept: Vec<&Submission> = latest_per_pair(submissions)
        .into_iter()
        .filter(|s| ids.contains(s.student_id.as_str()))
        .collect();
    summarize(&kept, scale, passing_grade)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizAverage {
    pub quiz_id: String,
    pub title: String,
    pub average: i64,
    pub submissions: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentAverage {
    pub student_id: String,
    pub name: String,
    pub average: i64,
    pub quizzes_taken: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassOverview {
    pub total_students: usize,
    pub total_quizzes: usize,
    pub class_average: i64,
    pub completion_rate: i64,
    pub quiz_averages: Vec<QuizAverage>,
    pub student_progress: Vec<StudentAverage>,
    pub top_performers: Vec<StudentAverage>,
    pub needs_help: Vec<StudentAverage>,
}

/// Dashboard view of a class: who is ahead, who is behind, and how much of
/// the assigned work has been handed in.
pub fn class_overview(
    students: &[Student],
    quizzes: &[Quiz],
    submissions: &[Submission],
    passing_grade: i64,
) -> ClassOverview {
    let ids = enrolled_ids(students);
    let quiz_ids: HashSet<&str> = quizzes.iter().map(|q| q.id.as_str()).collect();
    let kept: Vec<&Submission> = latest_per_pair(submissions)
        .into_iter()
        .filter(|s| ids.contains(s.student_id.as_str()) && quiz_ids.contains(s.quiz_id.as_str()))
        .collect();

    let quiz_averages: Vec<QuizAverage> = quizzes
        .iter()
        .map(|q| {
            let rows: Vec<&&Submission> = kept.iter().filter(|s| s.quiz_id == q.id).collect();
            QuizAverage {
                quiz_id: q.id.clone(),
                title: q.title.clone(),
                average: mean_rounded(rows.iter().map(|s| s.percentage)),
                submissions: rows.len(),
            }
        })
        .collect();

    let mut student_progress: Vec<StudentAverage> = students
        .iter()
        .map(|st| {
            let rows: Vec<&&Submission> = kept.iter().filter(|s| s.student_id == st.id).collect();
            StudentAverage {
                student_id: st.id.clone(),
                name: st.display_name().to_string(),
                average: mean_rounded(rows.iter().map(|s| s.percentage)),
                quizzes_taken: rows.len(),
            }
        })
        .collect();
    student_progress.sort_by(|a, b| b.average.cmp(&a.average));

    let top_performers: Vec<StudentAverage> = student_progress
        .iter()
        .take(TOP_BOTTOM_COUNT)
        .cloned()
        .collect();
    let struggling: Vec<&StudentAverage> = student_progress
        .iter()
        .filter(|s| s.average < passing_grade && s.quizzes_taken > 0)
        .collect();
    let needs_help: Vec<StudentAverage> = struggling
        .iter()
        .rev()
        .take(TOP_BOTTOM_COUNT)
        .map(|s| (*s).clone())
        .collect();

    ClassOverview {
        total_students: students.len(),
        total_quizzes: quizzes.len(),
        class_average: mean_rounded(kept.iter().map(|s| s.percentage)),
        completion_rate: rate(kept.len(), students.len() * quizzes.len()),
        quiz_averages,
        student_progress,
        top_performers,
        needs_help,
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressPoint {
    pub quiz_id: String,
    pub quiz_title: String,
    pub percentage: i64,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizScore {
    pub quiz_id: String,
    pub title: String,
    pub percentage: Option<i64>,
    pub submitted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentSummary {
    pub student_id: String,
    pub average: i64,
    pub quizzes_taken: usize,
    pub quizzes_available: usize,
    pub completion_rate: i64,
    pub highest_score: i64,
    pub lowest_score: i64,
    pub trend: Trend,
    pub progress: Vec<ProgressPoint>,
    pub quiz_scores: Vec<QuizScore>,
}

pub fn student_summary(
    student_id: &str,
    quizzes: &[Quiz],
    submissions: &[Submission],
) -> StudentSummary {
    let mut mine: Vec<&Submission> = latest_per_pair(submissions)
        .into_iter()
        .filter(|s| s.student_id == student_id)
        .collect();
    mine.sort_by(|a, b| a.submitted_at.cmp(&b.submitted_at));

    let title_of = |quiz_id: &str| -> String {
        quizzes
            .iter()
            .find(|q| q.id == quiz_id)
            .map(|q| q.title.clone())
            .unwrap_or_else(|| "Unknown Quiz".to_string())
    };

    let progress: Vec<ProgressPoint> = mine
        .iter()
        .map(|s| ProgressPoint {
            quiz_id: s.quiz_id.clone(),
            quiz_title: title_of(&s.quiz_id),
            percentage: s.percentage,
            submitted_at: s.submitted_at,
        })
        .collect();
    let scores: Vec<i64> = progress.iter().map(|p| p.percentage).collect();

    let quiz_scores = quizzes
        .iter()
        .map(|q| {
            let hit = mine.iter().find(|s| s.quiz_id == q.id);
            QuizScore {
                quiz_id: q.id.clone(),
                title: q.title.clone(),
                percentage: hit.map(|s| s.percentage),
                submitted_at: hit.map(|s| s.submitted_at),
            }
        })
        .collect();

    StudentSummary {
        student_id: student_id.to_string(),
        average: mean_rounded(scores.iter().copied()),
        quizzes_taken: mine.len(),
        quizzes_available: quizzes.len(),
        completion_rate: rate(mine.len(), quizzes.len()),
        highest_score: scores.iter().copied().max().unwrap_or(0),
        lowest_score: scores.iter().copied().min().unwrap_or(0),
        trend: detect_trend(&scores),
        progress,
        quiz_scores,
    }
}

/// Median of whole percentages; used by the quiz drill-down.
pub fn median_percentage(values: &[i64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2] as f64
    } else {
        (sorted[(n / 2) - 1] + sorted[n / 2]) as f64 / 2.0
    }
}

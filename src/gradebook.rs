use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::classify::{classify, passed};
use crate::roster::{enrolled_ids, Student};
use crate::scorer::{self, Quiz};
use crate::stats::{latest_per_pair, mean_rounded, round_off_1_decimal};
use crate::submission::Submission;

const NOT_SUBMITTED: &str = "Not Submitted";
const SUBMITTED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Every cell is quoted; embedded quotes are doubled.
pub fn csv_quote(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Rows are joined with `\n`, no trailing newline. An empty row renders as an
/// empty line and separates sections.
pub fn to_csv(rows: &[Vec<String>]) -> String {
    rows.iter()
        .map(|row| {
            row.iter()
                .map(|cell| csv_quote(cell))
                .collect::<Vec<_>>()
                .join(",")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Which quizzes a gradebook covers. The exporter never looks at this; it is
/// applied beforehand by `select_quizzes`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ExportScope {
    #[default]
    All,
    DateRange {
        start: NaiveDate,
        end: NaiveDate,
    },
    Quiz {
        #[serde(rename = "quizId")]
        quiz_id: String,
    },
}

impl ExportScope {
    pub fn suffix(&self, quizzes: &[Quiz]) -> String {
        match self {
            ExportScope::All => "all".to_string(),
            ExportScope::DateRange { start, end } => format!(
                "{}_to_{}",
                start.format("%Y-%m-%d"),
                end.format("%Y-%m-%d")
            ),
            ExportScope::Quiz { quiz_id } => {
                let title = quizzes
                    .iter()
                    .find(|q| q.id == *quiz_id)
                    .map(|q| q.title.as_str())
                    .unwrap_or(quiz_id.as_str());
                sanitize_filename_part(title, "quiz")
            }
        }
    }
}

/// Date ranges cover whole days: a quiz created at 23:59 on `end` is in.
/// Quizzes with no creation date never match a range.
pub fn select_quizzes(quizzes: &[Quiz], scope: &ExportScope) -> Vec<Quiz> {
    quizzes
        .iter()
        .filter(|q| match scope {
            ExportScope::All => true,
            ExportScope::DateRange { start, end } => q
                .created_at
                .map(|at| {
                    let day = at.date_naive();
                    *start <= day && day <= *end
                })
                .unwrap_or(false),
            ExportScope::Quiz { quiz_id } => q.id == *quiz_id,
        })
        .cloned()
        .collect()
}

fn sanitize_filename_part(s: &str, fallback: &str) -> String {
    let cleaned: String = s
        .trim()
        .chars()
        .map(|ch| {
            if ch.is_alphanumeric() || ch == '-' {
                ch
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_matches('_');
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn gradebook_filename(
    class_name: &str,
    scope: &ExportScope,
    quizzes: &[Quiz],
    export_date: NaiveDate,
) -> String {
    format!(
        "{}_gradebook_{}_{}.csv",
        sanitize_filename_part(class_name, "class"),
        scope.suffix(quizzes),
        export_date.format("%Y-%m-%d")
    )
}

fn pair_index<'a>(
    students: &[Student],
    quizzes: &[Quiz],
    submissions: &'a [Submission],
) -> HashMap<(&'a str, &'a str), &'a Submission> {
    let ids = enrolled_ids(students);
    let quiz_ids: HashSet<&str> = quizzes.iter().map(|q| q.id.as_str()).collect();
    latest_per_pair(submissions)
        .into_iter()
        .filter(|s| ids.contains(s.student_id.as_str()) && quiz_ids.contains(s.quiz_id.as_str()))
        .map(|s| ((s.student_id.as_str(), s.quiz_id.as_str()), s))
        .collect()
}

/// Consolidated gradebook in three sections: class summary, per-quiz
/// summary, then one row per student with one points column per quiz.
///
/// A student with no submission for a quiz shows 0 in that column; the
/// export does not distinguish that from a real zero.
pub fn export_gradebook(
    class_name: &str,
    students: &[Student],
    quizzes: &[Quiz],
    submissions: &[Submission],
) -> String {
    let by_pair = pair_index(students, quizzes, submissions);
    let totals: Vec<i64> = quizzes.iter().map(Quiz::total_points).collect();
    let total_possible: i64 = totals.iter().sum();
    let class_average = mean_rounded(by_pair.values().map(|s| s.percentage));

    let mut rows: Vec<Vec<String>> = Vec::new();
    rows.push(vec!["Class".to_string(), class_name.to_string()]);
    rows.push(vec!["Total Students".to_string(), students.len().to_string()]);
    rows.push(vec!["Class Average".to_string(), format!("{}%", class_average)]);
    rows.push(Vec::new());

    rows.push(vec![
        "Quiz".to_string(),
        "Average Points".to_string(),
        "Total Points".to_string(),
    ]);
    for (quiz, total) in quizzes.iter().zip(&totals) {
        let earned: Vec<i64> = students
            .iter()
            .filter_map(|st| by_pair.get(&(st.id.as_str(), quiz.id.as_str())))
            .map(|s| s.points_earned)
            .collect();
        let avg = if earned.is_empty() {
            0.0
        } else {
            round_off_1_decimal(earned.iter().sum::<i64>() as f64 / earned.len() as f64)
        };
        rows.push(vec![quiz.title.clone(), avg.to_string(), total.to_string()]);
    }
    rows.push(Vec::new());

    let mut header = vec![
        "Student Name".to_string(),
        "Overall Percentage".to_string(),
        "Points Earned".to_string(),
        "Total Points".to_string(),
    ];
    header.extend(quizzes.iter().map(|q| q.title.clone()));
    rows.push(header);

    for st in students {
        let cells: Vec<i64> = quizzes
            .iter()
            .map(|q| {
                by_pair
                    .get(&(st.id.as_str(), q.id.as_str()))
                    .map(|s| s.points_earned)
                    .unwrap_or(0)
            })
            .collect();
        let earned: i64 = cells.iter().sum();
        let mut row = vec![
            st.display_name().to_string(),
            format!("{}%", scorer::percentage(earned, total_possible)),
            earned.to_string(),
            total_possible.to_string(),
        ];
        row.extend(cells.iter().map(|c| c.to_string()));
        rows.push(row);
    }

    to_csv(&rows)
}

/// Single-quiz results sheet. Grades use the scale and passing grade the
/// submission was graded under when it carries a snapshot.
pub fn export_quiz_results(students: &[Student], quiz: &Quiz, submissions: &[Submission]) -> String {
    let quizzes = std::slice::from_ref(quiz);
    let by_pair = pair_index(students, quizzes, submissions);
    let quiz_total = quiz.total_points();
    let quiz_scale = quiz.scale();

    let mut rows: Vec<Vec<String>> = vec![vec![
        "Student Name".to_string(),
        "Email".to_string(),
        "Points Earned".to_string(),
        "Total Points".to_string(),
        "Percentage".to_string(),
        "Letter Grade".to_string(),
        "Pass/Fail".to_string(),
        "Submitted At".to_string(),
    ]];

    for st in students {
        let email = st.email.clone().unwrap_or_default();
        let Some(sub) = by_pair.get(&(st.id.as_str(), quiz.id.as_str())) else {
            rows.push(vec![
                st.display_name().to_string(),
                email,
                "0".to_string(),
                quiz_total.to_string(),
                "0%".to_string(),
                "F".to_string(),
                NOT_SUBMITTED.to_string(),
                String::new(),
            ]);
            continue;
        };

        let (scale, passing_grade) = match &sub.quiz_snapshot {
            Some(snap) => (snap.grading_scale.clone(), snap.passing_grade),
            None => (quiz_scale.clone(), quiz.passing_grade()),
        };
        let total = if sub.total_points > 0 {
            sub.total_points
        } else {
            quiz_total
        };
        let grade = classify(sub.percentage, &scale);
        rows.push(vec![
            st.display_name().to_string(),
            email,
            sub.points_earned.to_string(),
            total.to_string(),
            format!("{}%", sub.percentage),
            grade.label,
            if passed(sub.percentage, passing_grade) {
                "Pass".to_string()
            } else {
                "Fail".to_string()
            },
            sub.submitted_at.format(SUBMITTED_AT_FORMAT).to_string(),
        ]);
    }

    to_csv(&rows)
}

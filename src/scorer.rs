use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

use crate::classify::DEFAULT_PASSING_GRADE;
use crate::scale::{GradingScale, ScaleRef};

/// A submitted value: an option index for multiple choice, text otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Choice(i64),
    Text(String),
}

impl AnswerValue {
    pub fn as_text(&self) -> String {
        match self {
            AnswerValue::Choice(n) => n.to_string(),
            AnswerValue::Text(s) => s.clone(),
        }
    }
}

/// Question index -> submitted value. Unanswered questions are absent.
pub type AnswerSet = BTreeMap<usize, AnswerValue>;

/// Reads an answer map, treating `null` entries as unanswered.
pub fn deserialize_answers<'de, D: Deserializer<'de>>(deserializer: D) -> Result<AnswerSet, D::Error> {
    let raw = BTreeMap::<usize, Option<AnswerValue>>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .filter_map(|(index, value)| value.map(|v| (index, v)))
        .collect())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum QuestionKind {
    MultipleChoice {
        #[serde(default)]
        options: Vec<String>,
        #[serde(
            default,
            rename = "correctOptionIndex",
            alias = "correctAnswer",
            skip_serializing_if = "Option::is_none"
        )]
        correct_option_index: Option<i64>,
    },
    #[serde(alias = "enumeration")]
    FreeText {
        #[serde(
            default,
            rename = "correctAnswer",
            skip_serializing_if = "Option::is_none"
        )]
        correct_answer: Option<AnswerValue>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    #[serde(flatten)]
    pub kind: QuestionKind,
    #[serde(default, alias = "question")]
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<u32>,
}

impl Question {
    /// Legacy records carry no points field (or a zero); both count as 1.
    pub fn effective_points(&self) -> i64 {
        match self.points {
            Some(p) if p > 0 => i64::from(p),
            _ => 1,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            QuestionKind::MultipleChoice { .. } => "multiple-choice",
            QuestionKind::FreeText { .. } => "free-text",
        }
    }

    pub fn is_correct(&self, answer: Option<&AnswerValue>) -> bool {
        match &self.kind {
            QuestionKind::MultipleChoice {
                correct_option_index,
                ..
            } => match (answer, correct_option_index) {
                (Some(AnswerValue::Choice(given)), Some(expected)) => given == expected,
                _ => false,
            },
            QuestionKind::FreeText { correct_answer } => {
                let Some(expected) = correct_answer else {
                    return false;
                };
                let given = answer.map(AnswerValue::as_text).unwrap_or_default();
                normalize_text(&given) == normalize_text(&expected.as_text())
            }
        }
    }
}

fn normalize_text(s: &str) -> String {
    s.to_lowercase().trim().to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quiz {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub class_id: String,
    pub title: String,
    pub questions: Vec<Question>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grading_scale: Option<ScaleRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passing_grade: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Quiz {
    /// Always derived from the current question list.
    pub fn total_points(&self) -> i64 {
        total_points(&self.questions)
    }

    pub fn scale(&self) -> GradingScale {
        self.grading_scale
            .as_ref()
            .map(ScaleRef::resolve)
            .unwrap_or_default()
    }

    pub fn passing_grade(&self) -> i64 {
        self.passing_grade.unwrap_or(DEFAULT_PASSING_GRADE)
    }

    pub fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        if self.title.trim().is_empty() {
            issues.push(ValidationIssue::new("title", "title must not be empty"));
        }
        if self.questions.is_empty() {
            issues.push(ValidationIssue::new(
                "questions",
                "quiz must have at least one question",
            ));
        }
        if let Some(pg) = self.passing_grade {
            if !(0..=100).contains(&pg) {
                issues.push(ValidationIssue::new(
                    "passingGrade",
                    "passing grade must be between 0 and 100",
                ));
            }
        }
        if let Some(ScaleRef::Custom(scale)) = &self.grading_scale {
            for e in scale.validate().errors {
                issues.push(ValidationIssue::new("gradingScale", e));
            }
        }

        for (i, q) in self.questions.iter().enumerate() {
            let path = format!("questions[{}]", i);
            if q.prompt.trim().is_empty() {
                issues.push(ValidationIssue::new(&path, "prompt must not be empty"));
            }
            match &q.kind {
                QuestionKind::MultipleChoice {
                    options,
                    correct_option_index,
                } => {
                    if options.len() < 2 {
                        issues.push(ValidationIssue::new(
                            &path,
                            "multiple choice needs at least two options",
                        ));
                    }
                    let index_ok = correct_option_index
                        .and_then(|idx| usize::try_from(idx).ok())
                        .map(|idx| idx < options.len())
                        .unwrap_or(false);
                    if !index_ok {
                        issues.push(ValidationIssue::new(
                            &path,
                            "correctOptionIndex must point at one of the options",
                        ));
                    }
                }
                QuestionKind::FreeText { correct_answer } => {
                    let empty = correct_answer
                        .as_ref()
                        .map(|a| a.as_text().trim().is_empty())
                        .unwrap_or(true);
                    if empty {
                        issues.push(ValidationIssue::new(
                            &path,
                            "free text needs a non-empty correctAnswer",
                        ));
                    }
                }
            }
        }
        issues
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationIssue {
    pub path: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(path: &str, message: impl Into<String>) -> Self {
        Self {
            path: path.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreResult {
    pub points_earned: i64,
    pub correct_count: usize,
    pub total_questions: usize,
    pub total_points: i64,
    pub percentage: i64,
    pub per_question_correct: Vec<bool>,
    pub points_per_question: Vec<i64>,
}

pub fn total_points(questions: &[Question]) -> i64 {
    questions.iter().map(Question::effective_points).sum()
}

/// `round(earned / total * 100)`, half-up, in exact integer arithmetic so
/// every caller gets the same answer. Zero when there is nothing to earn.
pub fn percentage(points_earned: i64, total_points: i64) -> i64 {
    if total_points <= 0 {
        return 0;
    }
    let earned = points_earned.clamp(0, total_points);
    (earned * 200 + total_points) / (total_points * 2)
}

pub fn score(quiz: &Quiz, answers: &AnswerSet) -> ScoreResult {
    score_questions(&quiz.questions, answers)
}

pub fn score_questions(questions: &[Question], answers: &AnswerSet) -> ScoreResult {
    let mut points_earned = 0_i64;
    let mut correct_count = 0_usize;
    let mut per_question_correct = Vec::with_capacity(questions.len());
    let mut points_per_question = Vec::with_capacity(questions.len());

    for (index, question) in questions.iter().enumerate() {
        let correct = question.is_correct(answers.get(&index));
        let earned = if correct {
            question.effective_points()
        } else {
            0
        };
        if correct {
            correct_count += 1;
        }
        points_earned += earned;
        per_question_correct.push(correct);
        points_per_question.push(earned);
    }

    let total = total_points(questions);
    ScoreResult {
        points_earned,
        correct_count,
        total_questions: questions.len(),
        total_points: total,
        percentage: percentage(points_earned, total),
        per_question_correct,
        points_per_question,
    }
}

/// What a student sees while taking the quiz: no answer keys.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicQuestion {
    pub index: usize,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    pub points: i64,
}

pub fn public_questions(quiz: &Quiz) -> Vec<PublicQuestion> {
    quiz.questions
        .iter()
        .enumerate()
        .map(|(index, q)| PublicQuestion {
            index,
            kind: q.kind_name(),
            prompt: q.prompt.clone(),
            options: match &q.kind {
                QuestionKind::MultipleChoice { options, .. } => Some(options.clone()),
                QuestionKind::FreeText { .. } => None,
            },
            points: q.effective_points(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mc(options: &[&str], correct: i64, points: Option<u32>) -> Question {
        Question {
            kind: QuestionKind::MultipleChoice {
                options: options.iter().map(|s| s.to_string()).collect(),
                correct_option_index: Some(correct),
            },
            prompt: "Pick one".to_string(),
            points,
        }
    }

    fn text(answer: &str, points: Option<u32>) -> Question {
        Question {
            kind: QuestionKind::FreeText {
                correct_answer: Some(AnswerValue::Text(answer.to_string())),
            },
            prompt: "Type it".to_string(),
            points,
        }
    }

    fn quiz(questions: Vec<Question>) -> Quiz {
        Quiz {
            id: "q1".to_string(),
            class_id: "c1".to_string(),
            title: "Quiz".to_string(),
            questions,
            deadline: None,
            grading_scale: None,
            passing_grade: None,
            created_at: None,
        }
    }

    #[test]
    fn weighted_points_drive_percentage() {
        let q = quiz(vec![mc(&["a", "b"], 0, Some(1)), mc(&["a", "b"], 1, Some(3))]);
        let answers: AnswerSet = [(0, AnswerValue::Choice(1)), (1, AnswerValue::Choice(1))]
            .into_iter()
            .collect();
        let r = score(&q, &answers);
        assert_eq!(r.points_earned, 3);
        assert_eq!(r.total_points, 4);
        assert_eq!(r.percentage, 75);
        assert_eq!(r.correct_count, 1);
        assert_eq!(r.per_question_correct, vec![false, true]);
        assert_eq!(r.points_per_question, vec![0, 3]);
    }

    #[test]
    fn free_text_ignores_case_and_surrounding_space() {
        let q = quiz(vec![text("Paris", None)]);
        for given in ["Paris", "  paris ", "PARIS"] {
            let answers: AnswerSet = [(0, AnswerValue::Text(given.to_string()))]
                .into_iter()
                .collect();
            let r = score(&q, &answers);
            assert_eq!(r.percentage, 100, "{:?}", given);
        }
    }

    #[test]
    fn multiple_choice_requires_an_index_not_text() {
        let q = quiz(vec![mc(&["a", "b", "c"], 2, None)]);
        let answers: AnswerSet = [(0, AnswerValue::Text("2".to_string()))].into_iter().collect();
        assert_eq!(score(&q, &answers).points_earned, 0);
    }

    #[test]
    fn free_text_compares_stringified_numbers() {
        let q = quiz(vec![text("42", None)]);
        let answers: AnswerSet = [(0, AnswerValue::Choice(42))].into_iter().collect();
        assert_eq!(score(&q, &answers).correct_count, 1);
    }

    #[test]
    fn empty_answers_score_zero() {
        let q = quiz(vec![mc(&["a", "b"], 0, None), text("x", Some(2))]);
        let r = score(&q, &AnswerSet::new());
        assert_eq!(r.points_earned, 0);
        assert_eq!(r.percentage, 0);
        assert_eq!(r.total_questions, 2);
        assert_eq!(r.total_points, 3);
    }

    #[test]
    fn missing_keys_never_match() {
        let q = quiz(vec![
            Question {
                kind: QuestionKind::MultipleChoice {
                    options: vec!["a".into(), "b".into()],
                    correct_option_index: None,
                },
                prompt: "?".into(),
                points: None,
            },
            Question {
                kind: QuestionKind::FreeText {
                    correct_answer: None,
                },
                prompt: "?".into(),
                points: None,
            },
        ]);
        let answers: AnswerSet = [(0, AnswerValue::Choice(0)), (1, AnswerValue::Text(String::new()))]
            .into_iter()
            .collect();
        assert_eq!(score(&q, &answers).points_earned, 0);
    }

    #[test]
    fn zero_total_points_is_zero_percent() {
        let q = quiz(vec![]);
        let r = score(&q, &AnswerSet::new());
        assert_eq!(r.total_points, 0);
        assert_eq!(r.percentage, 0);
    }

    #[test]
    fn percentage_rounds_half_up() {
        assert_eq!(percentage(1, 8), 13);
        assert_eq!(percentage(57, 200), 29);
        assert_eq!(percentage(2, 3), 67);
        assert_eq!(percentage(1, 3), 33);
        assert_eq!(percentage(5, 5), 100);
    }

    #[test]
    fn legacy_json_shapes_deserialize() {
        let q: Quiz = serde_json::from_value(json!({
            "title": "Legacy",
            "questions": [
                { "type": "multiple-choice", "question": "2+2?", "options": ["3", "4"], "correctAnswer": 1 },
                { "type": "enumeration", "question": "Capital of France", "correctAnswer": "Paris" },
                { "type": "free-text", "prompt": "Zero pts", "correctAnswer": "x", "points": 0 }
            ]
        }))
        .expect("deserialize quiz");
        assert_eq!(q.total_points(), 3);
        assert_eq!(q.questions[0].kind_name(), "multiple-choice");
        assert_eq!(q.questions[1].kind_name(), "free-text");
        assert!(q.validate().is_empty());

        let answers: AnswerSet = serde_json::from_value(json!({ "0": 1, "1": "paris" }))
            .expect("deserialize answers");
        assert_eq!(score(&q, &answers).points_earned, 2);
    }

    #[test]
    fn null_answers_count_as_unanswered() {
        let q = quiz(vec![mc(&["a", "b"], 0, None), text("x", None)]);
        let answers = deserialize_answers(&json!({ "0": 0, "1": null })).expect("answers");
        assert_eq!(answers.len(), 1);
        let r = score(&q, &answers);
        assert_eq!(r.per_question_correct, vec![true, false]);

        let all_null = deserialize_answers(&json!({ "0": null, "1": null })).expect("answers");
        assert_eq!(score(&q, &all_null).points_earned, 0);
    }

    #[test]
    fn legacy_scale_map_on_a_quiz_loads() {
        let q: Quiz = serde_json::from_value(json!({
            "title": "Legacy scale",
            "gradingScale": {
                "name": "Pass/Fail",
                "grades": {
                    "Pass": { "min": 70, "max": 100, "color": "#10b981" },
                    "Fail": { "min": 0, "max": 69, "color": "#ef4444" }
                }
            },
            "questions": [
                { "type": "free-text", "prompt": "x?", "correctAnswer": "x" }
            ]
        }))
        .expect("deserialize quiz");
        assert_eq!(q.scale(), crate::scale::GradingScale::pass_fail());
        assert!(q.validate().is_empty());
    }

    #[test]
    fn validation_flags_malformed_questions() {
        let mut q = quiz(vec![mc(&["only"], 0, None), text("  ", None)]);
        q.passing_grade = Some(120);
        let issues = q.validate();
        assert!(issues.iter().any(|i| i.message.contains("at least two options")));
        assert!(issues.iter().any(|i| i.message.contains("non-empty correctAnswer")));
        assert!(issues.iter().any(|i| i.path == "passingGrade"));

        let out_of_range = quiz(vec![mc(&["a", "b"], 5, None)]);
        assert!(out_of_range
            .validate()
            .iter()
            .any(|i| i.message.contains("correctOptionIndex")));
    }

    #[test]
    fn public_view_hides_answer_keys() {
        let q = quiz(vec![mc(&["a", "b"], 1, Some(2)), text("secret", None)]);
        let view = serde_json::to_value(public_questions(&q)).expect("serialize");
        let rendered = view.to_string();
        assert!(!rendered.contains("secret"));
        assert!(!rendered.contains("correct"));
        assert_eq!(view[0]["points"], 2);
        assert_eq!(view[1]["type"], "free-text");
    }
}

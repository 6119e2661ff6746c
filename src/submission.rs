use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::scale::GradingScale;
use crate::scorer::{self, AnswerSet, Question, Quiz, ScoreResult};

/// The scoring-relevant parts of a quiz as they stood when a submission was
/// graded. Later edits to the quiz do not touch it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizSnapshot {
    pub title: String,
    pub questions: Vec<Question>,
    pub grading_scale: GradingScale,
    pub passing_grade: i64,
    pub total_points: i64,
}

impl QuizSnapshot {
    pub fn of(quiz: &Quiz) -> Self {
        Self {
            title: quiz.title.clone(),
            questions: quiz.questions.clone(),
            grading_scale: quiz.scale(),
            passing_grade: quiz.passing_grade(),
            total_points: quiz.total_points(),
        }
    }

    /// Hex SHA-256 over the snapshot's JSON. Two submissions graded against
    /// the same quiz revision share a fingerprint.
    pub fn fingerprint(&self) -> String {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let digest = hasher.finalize();
        digest.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: String,
    pub quiz_id: String,
    #[serde(default)]
    pub class_id: String,
    pub student_id: String,
    #[serde(default, deserialize_with = "scorer::deserialize_answers")]
    pub answers: AnswerSet,
    pub points_earned: i64,
    #[serde(default)]
    pub total_points: i64,
    #[serde(default)]
    pub correct_count: usize,
    #[serde(default)]
    pub total_questions: usize,
    pub percentage: i64,
    pub submitted_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quiz_snapshot: Option<QuizSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quiz_fingerprint: Option<String>,
}

impl Submission {
    /// Scores `answers` against `quiz` and builds the record the caller
    /// persists. Nothing here checks for an earlier submission.
    pub fn grade(
        id: String,
        quiz: &Quiz,
        student_id: &str,
        answers: AnswerSet,
        submitted_at: DateTime<Utc>,
    ) -> (Self, ScoreResult) {
        let result = scorer::score(quiz, &answers);
        let snapshot = QuizSnapshot::of(quiz);
        let fingerprint = snapshot.fingerprint();
        let submission = Self {
            id,
            quiz_id: quiz.id.clone(),
            class_id: quiz.class_id.clone(),
            student_id: student_id.to_string(),
            answers,
            points_earned: result.points_earned,
            total_points: result.total_points,
            correct_count: result.correct_count,
            total_questions: result.total_questions,
            percentage: result.percentage,
            submitted_at,
            quiz_snapshot: Some(snapshot),
            quiz_fingerprint: Some(fingerprint),
        };
        (submission, result)
    }

    /// Re-scores the stored answers against the snapshot taken at grading
    /// time. Returns `None` for legacy records without a snapshot.
    pub fn rescore_from_snapshot(&self) -> Option<ScoreResult> {
        self.quiz_snapshot
            .as_ref()
            .map(|s| scorer::score_questions(&s.questions, &self.answers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scorer::{AnswerValue, QuestionKind};
    use chrono::TimeZone;

    fn sample_quiz() -> Quiz {
        Quiz {
            id: "quiz-1".to_string(),
            class_id: "class-1".to_string(),
            title: "Capitals".to_string(),
            questions: vec![Question {
                kind: QuestionKind::FreeText {
                    correct_answer: Some(AnswerValue::Text("Paris".to_string())),
                },
                prompt: "France?".to_string(),
                points: Some(2),
            }],
            deadline: None,
            grading_scale: None,
            passing_grade: Some(60),
            created_at: None,
        }
    }

    #[test]
    fn snapshot_survives_quiz_edits() {
        let mut quiz = sample_quiz();
        let answers: AnswerSet = [(0, AnswerValue::Text("paris".to_string()))]
            .into_iter()
            .collect();
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
        let (sub, result) = Submission::grade("s1".to_string(), &quiz, "stu", answers, at);
        assert_eq!(result.percentage, 100);
        assert_eq!(sub.total_points, 2);

        quiz.questions[0].kind = QuestionKind::FreeText {
            correct_answer: Some(AnswerValue::Text("Lyon".to_string())),
        };
        let again = sub.rescore_from_snapshot().expect("snapshot");
        assert_eq!(again.percentage, 100);
        assert_ne!(
            QuizSnapshot::of(&quiz).fingerprint(),
            sub.quiz_fingerprint.clone().unwrap_or_default()
        );
    }

    #[test]
    fn fingerprint_is_stable() {
        let quiz = sample_quiz();
        let a = QuizSnapshot::of(&quiz).fingerprint();
        let b = QuizSnapshot::of(&quiz).fingerprint();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }
}

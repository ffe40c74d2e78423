use chrono::Utc;
use serde::{Deserialize, Serialize};

fn default_points_possible() -> f64 {
    3.0
}

/// One submitted exam question. The caller-supplied `order` (zero-based
/// position in the batch) is the durable identity used for result
/// correlation and is never reassigned internally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    #[serde(default)]
    pub order: usize,
    #[serde(default)]
    pub question_text: String,
    #[serde(flatten)]
    pub answer: QuestionAnswer,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course: Option<String>,
    #[serde(default = "default_points_possible")]
    pub points_possible: f64,
}

/// Type-dependent answer payload, tagged by `question_type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "question_type", rename_all = "snake_case")]
pub enum QuestionAnswer {
    Text {
        #[serde(default)]
        answer: String,
    },
    MultipleChoice {
        #[serde(default)]
        choices: Vec<String>,
        #[serde(default)]
        selected_answers: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GradeStatus {
    Success,
    Error,
}

/// The grading result for exactly one question. Immutable once created.
///
/// `question_id` is always equal to `order`, never to any identifier the
/// grading engine itself proposes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeOutcome {
    pub question_id: usize,
    pub order: usize,
    pub points_earned: f64,
    pub points_possible: f64,
    pub feedback: String,
    pub correct_answer: String,
    pub status: GradeStatus,
    pub error_message: Option<String>,
}

impl GradeOutcome {
    pub fn success(
        order: usize,
        points_earned: f64,
        points_possible: f64,
        feedback: String,
        correct_answer: String,
    ) -> Self {
        Self {
            question_id: order,
            order,
            points_earned,
            points_possible,
            feedback,
            correct_answer,
            status: GradeStatus::Success,
            error_message: None,
        }
    }

    pub fn failure(
        order: usize,
        points_possible: f64,
        feedback: String,
        error_message: String,
    ) -> Self {
        Self {
            question_id: order,
            order,
            points_earned: 0.0,
            points_possible,
            feedback,
            correct_answer: String::new(),
            status: GradeStatus::Error,
            error_message: Some(error_message),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == GradeStatus::Success
    }
}

/// Aggregate statistics for one processed batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchMetadata {
    pub total_questions: usize,
    pub successful: usize,
    pub failed: usize,
    pub processing_time_seconds: f64,
    pub timestamp: String,
}

/// The final payload for one batch submission: outcomes in ascending
/// `order`, aggregate metadata, and the delivery flag set after the
/// webhook attempt completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub results: Vec<GradeOutcome>,
    pub metadata: BatchMetadata,
    pub webhook_sent: bool,
}

impl BatchResult {
    pub fn new(results: Vec<GradeOutcome>, processing_time_seconds: f64) -> Self {
        let successful = results.iter().filter(|r| r.is_success()).count();
        let failed = results.len() - successful;
        let metadata = BatchMetadata {
            total_questions: results.len(),
            successful,
            failed,
            processing_time_seconds,
            timestamp: Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        };
        Self {
            results,
            metadata,
            webhook_sent: false,
        }
    }
}

/// Acknowledgment body for fire-and-forget submissions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptedResponse {
    pub status: String,
    pub message: String,
    pub questions_received: usize,
}

impl AcceptedResponse {
    pub fn new(questions_received: usize) -> Self {
        Self {
            status: "accepted".to_string(),
            message: format!("Grading {} questions", questions_received),
            questions_received,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_question_deserializes_text_variant() {
        let json = r#"{
            "order": 2,
            "question_text": "What is inertia?",
            "question_type": "text",
            "answer": "Resistance to change in motion",
            "course": "physics-1"
        }"#;

        let question: Question = serde_json::from_str(json).unwrap();
        assert_eq!(question.order, 2);
        assert_eq!(question.points_possible, 3.0);
        assert_eq!(question.course.as_deref(), Some("physics-1"));
        match question.answer {
            QuestionAnswer::Text { ref answer } => {
                assert_eq!(answer, "Resistance to change in motion")
            }
            _ => panic!("expected text variant"),
        }
    }

    #[test]
    fn test_question_deserializes_multiple_choice_variant() {
        let json = r#"{
            "order": 0,
            "question_text": "Pick one",
            "question_type": "multiple_choice",
            "choices": ["a", "b"],
            "selected_answers": ["b"],
            "points_possible": 5
        }"#;

        let question: Question = serde_json::from_str(json).unwrap();
        assert_eq!(question.points_possible, 5.0);
        match question.answer {
            QuestionAnswer::MultipleChoice {
                ref choices,
                ref selected_answers,
            } => {
                assert_eq!(choices.len(), 2);
                assert_eq!(selected_answers, &["b".to_string()]);
            }
            _ => panic!("expected multiple_choice variant"),
        }
    }

    #[test]
    fn test_multiple_choice_allows_empty_selection() {
        let json = r#"{
            "order": 1,
            "question_text": "Pick one",
            "question_type": "multiple_choice",
            "choices": ["a", "b"]
        }"#;

        let question: Question = serde_json::from_str(json).unwrap();
        match question.answer {
            QuestionAnswer::MultipleChoice {
                ref selected_answers,
                ..
            } => assert!(selected_answers.is_empty()),
            _ => panic!("expected multiple_choice variant"),
        }
    }

    #[test]
    fn test_batch_result_counts_outcomes() {
        let outcomes = vec![
            GradeOutcome::success(0, 3.0, 3.0, "ok".into(), "a".into()),
            GradeOutcome::failure(1, 3.0, "failed".into(), "boom".into()),
            GradeOutcome::success(2, 2.0, 3.0, "ok".into(), "b".into()),
        ];

        let result = BatchResult::new(outcomes, 1.25);
        assert_eq!(result.metadata.total_questions, 3);
        assert_eq!(result.metadata.successful, 2);
        assert_eq!(result.metadata.failed, 1);
        assert_eq!(result.metadata.processing_time_seconds, 1.25);
        assert!(!result.webhook_sent);
        assert!(result.metadata.timestamp.ends_with('Z'));
    }

    #[test]
    fn test_grade_status_serializes_lowercase() {
        let outcome = GradeOutcome::failure(0, 3.0, "f".into(), "e".into());
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(value["question_id"], value["order"]);
    }
}

use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use tokio::time::timeout;
use tracing::{debug, error, info};

use crate::errors::GradeError;
use crate::llm_providers::{GradingEngine, JsonResponseParser};
use crate::models::{GradeOutcome, Question, QuestionAnswer};

/// Shown to the student when a question could not be graded after all
/// retry attempts.
const GRADING_FAILED_FEEDBACK: &str = "Arvostelua ei voitu suorittaa teknisen virheen vuoksi.";

const GRADING_SYSTEM_MESSAGE: &str = "You are an exam grading assistant. Evaluate the student's \
    answer against the question and respond with a single JSON object containing the fields \
    points_earned, points_possible, feedback and correct_answer. Do not include any other text.";

/// Retry and timeout policy for a single question.
#[derive(Debug, Clone)]
pub struct GradingSettings {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub request_timeout: Duration,
}

impl Default for GradingSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(2),
            request_timeout: Duration::from_secs(120),
        }
    }
}

/// Fields the grading engine is expected to embed in its response.
/// Anything else it returns, including a proposed question_id, is ignored.
#[derive(Debug, Deserialize)]
struct EngineGrade {
    #[serde(default)]
    points_earned: f64,
    #[serde(default = "EngineGrade::default_points_possible")]
    points_possible: f64,
    #[serde(default)]
    feedback: String,
    #[serde(default)]
    correct_answer: String,
}

impl EngineGrade {
    fn default_points_possible() -> f64 {
        3.0
    }
}

/// Grades one question at a time against the external engine, with a hard
/// per-attempt timeout and bounded linear-backoff retries.
#[derive(Clone)]
pub struct GradingService {
    engine: Arc<dyn GradingEngine>,
    settings: GradingSettings,
}

impl GradingService {
    pub fn new(engine: Arc<dyn GradingEngine>, settings: GradingSettings) -> Self {
        Self { engine, settings }
    }

    /// Make exactly one grading call and parse its response.
    pub async fn invoke(&self, question: &Question) -> Result<GradeOutcome, GradeError> {
        if question.question_text.trim().is_empty() {
            return Err(GradeError::EmptyQuestion);
        }

        let prompt = format_question_prompt(question);
        let response_text = self
            .engine
            .grade_submission(Some(GRADING_SYSTEM_MESSAGE), &prompt)
            .await?;

        debug!(
            order = question.order,
            response_length = response_text.len(),
            "Raw engine response for grading"
        );

        parse_engine_response(&response_text, question.order)
    }

    /// Grade one question with retries. This never fails: exhausting the
    /// retry budget returns a synthetic error-status outcome so the batch
    /// can proceed.
    pub async fn grade_with_retry(&self, question: &Question) -> GradeOutcome {
        let max_retries = self.settings.max_retries;
        let mut last_error = String::from("no grading attempts were made");

        for attempt in 1..=max_retries {
            info!(
                order = question.order,
                attempt,
                max_retries,
                "Grading question"
            );

            match timeout(self.settings.request_timeout, self.invoke(question)).await {
                Ok(Ok(outcome)) => {
                    info!(
                        order = question.order,
                        points_earned = outcome.points_earned,
                        points_possible = outcome.points_possible,
                        "Question graded successfully"
                    );
                    return outcome;
                }
                Ok(Err(e)) => {
                    error!(
                        order = question.order,
                        attempt,
                        error = %e,
                        "Error grading question"
                    );
                    last_error = e.to_string();
                }
                Err(_) => {
                    let e = GradeError::Timeout(self.settings.request_timeout.as_secs());
                    error!(
                        order = question.order,
                        attempt,
                        error = %e,
                        "Grading attempt timed out"
                    );
                    last_error = e.to_string();
                }
            }

            // Linear backoff, only between attempts
            if attempt < max_retries {
                tokio::time::sleep(self.settings.retry_delay * attempt).await;
            }
        }

        GradeOutcome::failure(
            question.order,
            question.points_possible,
            GRADING_FAILED_FEEDBACK.to_string(),
            last_error,
        )
    }
}

/// Format a question into the JSON prompt the engine expects, shaping the
/// student answer by question type.
pub fn format_question_prompt(question: &Question) -> String {
    let mut formatted = json!({
        "question_text": question.question_text,
    });

    match &question.answer {
        QuestionAnswer::Text { answer } => {
            formatted["question_type"] = json!("text");
            formatted["student_answer"] = json!(extract_answer_text(answer));
        }
        QuestionAnswer::MultipleChoice {
            choices,
            selected_answers,
        } => {
            formatted["question_type"] = json!("multiple_choice");
            formatted["choices"] = json!(choices);
            formatted["student_answer"] = json!(selected_answers);
        }
    }

    if let Some(course) = &question.course {
        formatted["course"] = json!(course);
    }

    formatted["points_possible"] = json!(question.points_possible);

    formatted.to_string()
}

/// Free-text answers sometimes arrive as an HTML image tag whose alt text
/// carries the actual answer; fall back to that text when present.
fn extract_answer_text(answer: &str) -> String {
    if answer.contains("<img") && answer.contains("alt=\"") {
        if let Ok(re) = Regex::new(r#"alt="([^"]*)""#) {
            if let Some(captures) = re.captures(answer) {
                return captures[1].to_string();
            }
        }
    }
    answer.to_string()
}

/// Parse the engine's free-form response into an outcome.
///
/// `question_id` is always derived from the caller-supplied `order`,
/// regardless of what the engine returned.
pub fn parse_engine_response(response: &str, order: usize) -> Result<GradeOutcome, GradeError> {
    let json_content = JsonResponseParser::extract_json_from_response(response).ok_or_else(
        || GradeError::MalformedResponse("no JSON object found in engine response".to_string()),
    )?;

    let grade: EngineGrade = serde_json::from_str(&json_content)
        .map_err(|e| GradeError::MalformedResponse(e.to_string()))?;

    Ok(GradeOutcome::success(
        order,
        grade.points_earned,
        grade.points_possible,
        grade.feedback,
        grade.correct_answer,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GradeStatus;

    fn text_question(order: usize, answer: &str) -> Question {
        Question {
            order,
            question_text: "Explain Newton's first law".to_string(),
            answer: QuestionAnswer::Text {
                answer: answer.to_string(),
            },
            course: None,
            points_possible: 3.0,
        }
    }

    #[test]
    fn test_parse_engine_response_full_object() {
        let response = r#"{"points_earned": 2.5, "points_possible": 3, "feedback": "Mostly right", "correct_answer": "F = ma"}"#;
        let outcome = parse_engine_response(response, 4).unwrap();

        assert_eq!(outcome.question_id, 4);
        assert_eq!(outcome.order, 4);
        assert_eq!(outcome.points_earned, 2.5);
        assert_eq!(outcome.points_possible, 3.0);
        assert_eq!(outcome.feedback, "Mostly right");
        assert_eq!(outcome.correct_answer, "F = ma");
        assert_eq!(outcome.status, GradeStatus::Success);
        assert!(outcome.error_message.is_none());
    }

    #[test]
    fn test_parse_engine_response_ignores_engine_question_id() {
        let response = r#"{"question_id": 99, "points_earned": 3, "points_possible": 3}"#;
        let outcome = parse_engine_response(response, 1).unwrap();
        assert_eq!(outcome.question_id, 1);
        assert_eq!(outcome.order, 1);
    }

    #[test]
    fn test_parse_engine_response_with_prose_matches_bare_object() {
        let bare = r#"{"points_earned": 1, "points_possible": 3, "feedback": "Partial"}"#;
        let wrapped = format!("Sure! Here is the grade:\n{}\nLet me know if needed.", bare);

        let a = parse_engine_response(bare, 0).unwrap();
        let b = parse_engine_response(&wrapped, 0).unwrap();
        assert_eq!(a.points_earned, b.points_earned);
        assert_eq!(a.points_possible, b.points_possible);
        assert_eq!(a.feedback, b.feedback);
    }

    #[test]
    fn test_parse_engine_response_coerces_missing_fields() {
        let outcome = parse_engine_response("{}", 0).unwrap();
        assert_eq!(outcome.points_earned, 0.0);
        assert_eq!(outcome.points_possible, 3.0);
        assert_eq!(outcome.feedback, "");
        assert_eq!(outcome.correct_answer, "");
    }

    #[test]
    fn test_parse_engine_response_without_json_fails() {
        let err = parse_engine_response("I cannot grade this.", 0).unwrap_err();
        assert!(matches!(err, GradeError::MalformedResponse(_)));
    }

    #[test]
    fn test_parse_engine_response_with_invalid_json_fails() {
        let err = parse_engine_response("{points_earned: oops}", 0).unwrap_err();
        assert!(matches!(err, GradeError::MalformedResponse(_)));
    }

    #[test]
    fn test_format_question_prompt_text_answer() {
        let question = text_question(0, "Objects keep moving unless acted on");
        let prompt = format_question_prompt(&question);
        let value: serde_json::Value = serde_json::from_str(&prompt).unwrap();

        assert_eq!(value["question_type"], "text");
        assert_eq!(value["student_answer"], "Objects keep moving unless acted on");
        assert_eq!(value["points_possible"], 3.0);
    }

    #[test]
    fn test_format_question_prompt_extracts_img_alt_text() {
        let question = text_question(0, r#"<p><img src="plot.png" alt="v = 9.8t"></p>"#);
        let prompt = format_question_prompt(&question);
        let value: serde_json::Value = serde_json::from_str(&prompt).unwrap();
        assert_eq!(value["student_answer"], "v = 9.8t");
    }

    #[test]
    fn test_format_question_prompt_multiple_choice() {
        let question = Question {
            order: 3,
            question_text: "Which unit measures force?".to_string(),
            answer: QuestionAnswer::MultipleChoice {
                choices: vec!["Newton".into(), "Joule".into(), "Watt".into()],
                selected_answers: vec!["Newton".into()],
            },
            course: Some("physics-1".to_string()),
            points_possible: 2.0,
        };

        let prompt = format_question_prompt(&question);
        let value: serde_json::Value = serde_json::from_str(&prompt).unwrap();
        assert_eq!(value["question_type"], "multiple_choice");
        assert_eq!(value["choices"].as_array().unwrap().len(), 3);
        assert_eq!(value["student_answer"][0], "Newton");
        assert_eq!(value["course"], "physics-1");
    }

    #[test]
    fn test_format_question_prompt_empty_selection_is_kept() {
        let question = Question {
            order: 0,
            question_text: "Which unit measures force?".to_string(),
            answer: QuestionAnswer::MultipleChoice {
                choices: vec!["Newton".into(), "Joule".into()],
                selected_answers: vec![],
            },
            course: None,
            points_possible: 3.0,
        };

        let prompt = format_question_prompt(&question);
        let value: serde_json::Value = serde_json::from_str(&prompt).unwrap();
        assert!(value["student_answer"].as_array().unwrap().is_empty());
    }
}

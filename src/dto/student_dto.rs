use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;
use validator::Validate;

use crate::services::eligibility_service::Availability;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SaveAnswerRequest {
    #[validate(length(min = 1))]
    pub question_id: String,
    pub answer: JsonValue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveAnswerResponse {
    pub saved: bool,
    pub question_id: String,
    pub timestamp: DateTime<Utc>,
}

/// One row of the student's test list, classified by the eligibility
/// resolver. Score fields stay empty until the attempt is completed and
/// the test's visibility rules allow them out.
#[derive(Debug, Serialize)]
pub struct StudentTestSummary {
    pub test_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_minutes: i32,
    pub total_questions: usize,
    pub availability: Availability,
    pub score: Option<f64>,
    pub percentage: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct SubmitTestResponse {
    pub attempt_id: Uuid,
    pub status: String,
    pub score: Option<f64>,
    pub total_marks: Option<f64>,
    pub percentage: Option<f64>,
    pub passed: Option<bool>,
    pub show_results: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct AnswerReview {
    pub question_id: String,
    pub answer: JsonValue,
    pub is_correct: Option<bool>,
    pub marks_awarded: Option<f64>,
    pub adjustment_marks: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct AttemptResultResponse {
    pub attempt_id: Uuid,
    pub test_id: Uuid,
    pub title: String,
    pub status: String,
    pub submitted_at: Option<DateTime<Utc>>,
    pub termination_reason: Option<String>,
    pub results_visible: bool,
    pub score: Option<f64>,
    pub total_marks: Option<f64>,
    pub percentage: Option<f64>,
    pub passed: Option<bool>,
    pub grace_marks: Option<f64>,
    pub grace_reason: Option<String>,
    pub answers: Vec<AnswerReview>,
}

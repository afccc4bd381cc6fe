use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::question::Question;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateTestPayload {
    #[validate(length(min = 1))]
    pub title: String,
    #[serde(default, deserialize_with = "trim_optional_string")]
    pub description: Option<String>,
    pub questions: Option<Vec<Question>>,
    #[validate(range(min = 1, message = "Duration must be at least 1 minute"))]
    pub duration_minutes: i32,
    #[validate(range(
        min = 0.0,
        max = 100.0,
        message = "Passing percentage must be between 0 and 100"
    ))]
    pub passing_percentage: Option<f64>,
    #[validate(range(min = 1))]
    pub questions_per_student: Option<i32>,
    pub show_results: Option<bool>,
    pub show_results_immediately: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateTestPayload {
    #[serde(default, deserialize_with = "trim_optional_string")]
    pub title: Option<String>,

    #[serde(default, deserialize_with = "trim_optional_string")]
    pub description: Option<String>,

    pub questions: Option<Vec<Question>>,

    #[validate(range(min = 1, message = "Duration must be at least 1 minute"))]
    pub duration_minutes: Option<i32>,

    #[validate(range(
        min = 0.0,
        max = 100.0,
        message = "Passing percentage must be between 0 and 100"
    ))]
    pub passing_percentage: Option<f64>,

    #[validate(range(min = 1))]
    pub questions_per_student: Option<i32>,

    pub show_results: Option<bool>,
    pub show_results_immediately: Option<bool>,

    // test-level grace accompanying a question edit; the re-grade writes it
    // as given, absent meaning zero
    #[validate(range(min = 0.0))]
    pub grace_marks: Option<f64>,
    #[serde(default, deserialize_with = "trim_optional_string")]
    pub grace_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct DeployTestPayload {
    #[validate(length(min = 1, message = "At least one batch must be targeted"))]
    pub batches: Vec<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[validate(range(min = 1, message = "Duration must be at least 1 minute"))]
    pub duration_minutes: Option<i32>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ReassignTestPayload {
    pub batches: Option<Vec<String>>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkAdjustment {
    pub question_id: String,
    pub adjustment_marks: f64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AdjustMarksPayload {
    #[validate(length(min = 1))]
    pub student_phone: String,
    #[validate(length(min = 1, message = "At least one adjustment is required"))]
    pub adjustments: Vec<MarkAdjustment>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ListTestsQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub status: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ListAttemptsQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SweepResponse {
    pub test_id: Uuid,
    pub completed: u32,
}

// Custom deserializer to trim strings and convert empty strings to None
pub fn trim_optional_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    Ok(opt.and_then(|s| {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }))
}

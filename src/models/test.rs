use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::question::Question;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Test {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub questions: JsonValue,
    pub batches: JsonValue,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_minutes: i32,
    pub questions_per_student: Option<i32>,
    pub passing_percentage: rust_decimal::Decimal,
    pub show_results: bool,
    pub show_results_immediately: bool,
    pub status: String,
    pub total_marks: rust_decimal::Decimal,
    pub created_by: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Test {
    pub fn question_bank(&self) -> Vec<Question> {
        serde_json::from_value(self.questions.clone()).unwrap_or_default()
    }

    pub fn batch_names(&self) -> Vec<String> {
        serde_json::from_value(self.batches.clone()).unwrap_or_default()
    }

    /// Results become visible once the staff allowed them at all, and either
    /// immediately after submission or only after the window has closed.
    pub fn results_visible(&self, now: DateTime<Utc>) -> bool {
        if !self.show_results {
            return false;
        }
        if self.show_results_immediately {
            return true;
        }
        self.status == "completed" || self.end_time.map(|end| now > end).unwrap_or(false)
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::answer::Answer;
use crate::models::question::Question;
use crate::models::test::Test;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TestAttempt {
    pub id: Uuid,
    pub test_id: Uuid,
    pub student_phone: String,
    pub student_name: String,
    pub questions_snapshot: Option<JsonValue>,
    pub answers: JsonValue,
    pub score: Option<rust_decimal::Decimal>,
    pub total_marks: Option<rust_decimal::Decimal>,
    pub percentage: Option<rust_decimal::Decimal>,
    pub grace_marks: rust_decimal::Decimal,
    pub grace_reason: Option<String>,
    pub status: String,
    pub started_at: Option<DateTime<Utc>>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub termination_reason: Option<String>,
    pub time_spent_seconds: Option<i32>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl TestAttempt {
    /// The question set this student was actually served: the per-attempt
    /// snapshot when one was taken, otherwise the live test bank. Grading
    /// and total-marks computation must always go through this.
    pub fn served_questions(&self, test: &Test) -> Vec<Question> {
        let snapshot: Vec<Question> = self
            .questions_snapshot
            .clone()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();
        if snapshot.is_empty() {
            test.question_bank()
        } else {
            snapshot
        }
    }

    pub fn answer_list(&self) -> Vec<Answer> {
        serde_json::from_value(self.answers.clone()).unwrap_or_default()
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::models::question::QuestionType;

/// One graded entry of an attempt's answer set, stored as a JSONB array
/// element on the attempt row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub question_id: String,
    pub answer: JsonValue,
    #[serde(default)]
    pub is_correct: bool,
    #[serde(default)]
    pub marks_awarded: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adjustment_marks: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_grace_awarded: Option<bool>,
    pub answered_at: Option<DateTime<Utc>>,
}

/// Submitted answers arrive as loosely shaped JSON (an index, an index
/// array, a string or a number). The question's type decides which shape is
/// meaningful; resolution happens at grading time.
#[derive(Debug, Clone, PartialEq)]
pub enum AnswerValue {
    Index(i64),
    Indices(Vec<i64>),
    Text(String),
}

impl AnswerValue {
    /// Returns None for a blank submission (null, empty string, empty
    /// array) or a value that cannot be read as the expected shape.
    pub fn resolve(question_type: &QuestionType, raw: &JsonValue) -> Option<AnswerValue> {
        if raw.is_null() {
            return None;
        }
        match question_type {
            QuestionType::Mcq => match raw {
                JsonValue::Number(n) => n.as_i64().map(AnswerValue::Index),
                JsonValue::String(s) => s.trim().parse::<i64>().ok().map(AnswerValue::Index),
                _ => None,
            },
            QuestionType::Msq => {
                let items = raw.as_array()?;
                let indices: Vec<i64> = items.iter().filter_map(|v| v.as_i64()).collect();
                if indices.is_empty() {
                    None
                } else {
                    Some(AnswerValue::Indices(indices))
                }
            }
            QuestionType::FillBlank => match raw {
                JsonValue::String(s) if !s.is_empty() => Some(AnswerValue::Text(s.clone())),
                JsonValue::Number(n) => Some(AnswerValue::Text(n.to_string())),
                _ => None,
            },
            QuestionType::Comprehension => None,
        }
    }
}

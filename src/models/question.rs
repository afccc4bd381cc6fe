use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub text: String,
    #[serde(default = "default_marks")]
    pub marks: f64,
    #[serde(default)]
    pub negative_marks: f64,
    #[serde(default)]
    pub is_grace: bool,
    #[serde(flatten)]
    pub details: QuestionDetails,
}

fn default_marks() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    Mcq,
    Msq,
    FillBlank,
    Comprehension,
}

/// Type-specific payload, flattened into the question object. Mcq and msq
/// share the choice shape; the type tag decides how a submission is read.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QuestionDetails {
    Choice(ChoiceDetails),
    Comprehension(ComprehensionDetails),
    FillBlank(FillBlankDetails),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoiceDetails {
    pub options: Vec<String>,
    pub correct_indices: Vec<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillBlankDetails {
    pub fill_blank_answer: String,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default)]
    pub is_number_range: bool,
    pub number_range_min: Option<f64>,
    pub number_range_max: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComprehensionDetails {
    pub sub_questions: Vec<Question>,
}

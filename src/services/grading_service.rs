use std::collections::BTreeSet;

use serde_json::Value as JsonValue;

use crate::models::answer::{Answer, AnswerValue};
use crate::models::question::{Question, QuestionDetails, QuestionType};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradeOutcome {
    pub is_correct: bool,
    pub marks_awarded: f64,
}

impl GradeOutcome {
    fn unscored() -> Self {
        Self {
            is_correct: false,
            marks_awarded: 0.0,
        }
    }
}

pub struct GradingService;

impl GradingService {
    /// Grades one leaf question against a raw submitted value.
    ///
    /// A blank submission never attracts negative marking; a grace question
    /// is awarded full marks no matter what was submitted.
    pub fn grade(question: &Question, submitted: &JsonValue) -> GradeOutcome {
        if question.is_grace {
            return GradeOutcome {
                is_correct: true,
                marks_awarded: question.marks,
            };
        }

        let Some(value) = AnswerValue::resolve(&question.question_type, submitted) else {
            return GradeOutcome::unscored();
        };

        let correct = match (&question.question_type, &question.details, &value) {
            (QuestionType::Mcq, QuestionDetails::Choice(c), AnswerValue::Index(idx)) => {
                c.correct_indices.first().map(|&i| i as i64) == Some(*idx)
            }
            (QuestionType::Msq, QuestionDetails::Choice(c), AnswerValue::Indices(picked)) => {
                let want: BTreeSet<i64> = c.correct_indices.iter().map(|&i| i as i64).collect();
                let got: BTreeSet<i64> = picked.iter().copied().collect();
                want == got
            }
            (QuestionType::FillBlank, QuestionDetails::FillBlank(f), AnswerValue::Text(text)) => {
                if f.is_number_range {
                    match text.trim().parse::<f64>() {
                        Ok(v) => {
                            let min = f.number_range_min.unwrap_or(f64::NEG_INFINITY);
                            let max = f.number_range_max.unwrap_or(f64::INFINITY);
                            min <= v && v <= max
                        }
                        Err(_) => false,
                    }
                } else {
                    let expected = f.fill_blank_answer.trim();
                    let got = text.trim();
                    if f.case_sensitive {
                        got == expected
                    } else {
                        got.to_lowercase() == expected.to_lowercase()
                    }
                }
            }
            // comprehension parents carry no score of their own; a question
            // whose details do not match its type degrades instead of failing
            // the whole attempt
            _ => return GradeOutcome::unscored(),
        };

        if correct {
            GradeOutcome {
                is_correct: true,
                marks_awarded: question.marks,
            }
        } else {
            GradeOutcome {
                is_correct: false,
                marks_awarded: -question.negative_marks,
            }
        }
    }

    /// Flattens a question set to its scored leaves: comprehension parents
    /// are replaced by their sub-questions, everything else passes through.
    pub fn leaf_questions(questions: &[Question]) -> Vec<&Question> {
        let mut leaves = Vec::new();
        for q in questions {
            match &q.details {
                QuestionDetails::Comprehension(c) => leaves.extend(c.sub_questions.iter()),
                _ => leaves.push(q),
            }
        }
        leaves
    }

    /// Maximum marks of a served question set (leaf sum).
    pub fn total_marks(questions: &[Question]) -> f64 {
        Self::leaf_questions(questions).iter().map(|q| q.marks).sum()
    }

    /// Re-runs grading over every stored answer entry in place. An entry
    /// whose question id no longer resolves degrades to unscored rather
    /// than erroring; manual adjustment marks are left untouched.
    pub fn regrade_answers(questions: &[Question], answers: &mut [Answer]) {
        let leaves = Self::leaf_questions(questions);
        for entry in answers.iter_mut() {
            match leaves.iter().find(|q| q.id == entry.question_id) {
                Some(q) => {
                    let outcome = Self::grade(q, &entry.answer);
                    entry.is_correct = outcome.is_correct;
                    entry.marks_awarded = outcome.marks_awarded;
                    entry.is_grace_awarded = q.is_grace.then_some(true);
                }
                None => {
                    entry.is_correct = false;
                    entry.marks_awarded = 0.0;
                    entry.is_grace_awarded = None;
                }
            }
        }
    }

    /// Visible score: awarded marks plus manual adjustments plus the global
    /// grace bonus, floored at zero so aggregate negative marking can never
    /// push the result below it.
    pub fn final_score(answers: &[Answer], grace_marks: f64) -> f64 {
        let earned: f64 = answers
            .iter()
            .map(|a| a.marks_awarded + a.adjustment_marks.unwrap_or(0.0))
            .sum();
        (earned + grace_marks).max(0.0)
    }

    pub fn percentage(score: f64, total_marks: f64) -> f64 {
        if total_marks > 0.0 {
            (score / total_marks * 100.0).round()
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::{ChoiceDetails, ComprehensionDetails, FillBlankDetails};
    use serde_json::json;

    fn mcq(id: &str, marks: f64, negative: f64, correct: u32) -> Question {
        Question {
            id: id.to_string(),
            question_type: QuestionType::Mcq,
            text: format!("mcq {}", id),
            marks,
            negative_marks: negative,
            is_grace: false,
            details: QuestionDetails::Choice(ChoiceDetails {
                options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
                correct_indices: vec![correct],
            }),
        }
    }

    fn msq(id: &str, correct: Vec<u32>) -> Question {
        Question {
            id: id.to_string(),
            question_type: QuestionType::Msq,
            text: format!("msq {}", id),
            marks: 2.0,
            negative_marks: 1.0,
            is_grace: false,
            details: QuestionDetails::Choice(ChoiceDetails {
                options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
                correct_indices: correct,
            }),
        }
    }

    fn range_question(id: &str, marks: f64, min: f64, max: f64) -> Question {
        Question {
            id: id.to_string(),
            question_type: QuestionType::FillBlank,
            text: format!("range {}", id),
            marks,
            negative_marks: 0.0,
            is_grace: false,
            details: QuestionDetails::FillBlank(FillBlankDetails {
                fill_blank_answer: String::new(),
                case_sensitive: false,
                is_number_range: true,
                number_range_min: Some(min),
                number_range_max: Some(max),
            }),
        }
    }

    fn text_question(id: &str, expected: &str, case_sensitive: bool) -> Question {
        Question {
            id: id.to_string(),
            question_type: QuestionType::FillBlank,
            text: format!("fill {}", id),
            marks: 1.0,
            negative_marks: 0.0,
            is_grace: false,
            details: QuestionDetails::FillBlank(FillBlankDetails {
                fill_blank_answer: expected.to_string(),
                case_sensitive,
                is_number_range: false,
                number_range_min: None,
                number_range_max: None,
            }),
        }
    }

    fn answer_entry(question_id: &str, answer: JsonValue) -> Answer {
        Answer {
            question_id: question_id.to_string(),
            answer,
            is_correct: false,
            marks_awarded: 0.0,
            adjustment_marks: None,
            is_grace_awarded: None,
            answered_at: None,
        }
    }

    #[test]
    fn mcq_correct_earns_marks() {
        let q = mcq("q1", 4.0, 1.0, 2);
        let out = GradingService::grade(&q, &json!(2));
        assert!(out.is_correct);
        assert_eq!(out.marks_awarded, 4.0);
    }

    #[test]
    fn mcq_wrong_attracts_negative_marks() {
        let q = mcq("q1", 4.0, 1.0, 2);
        let out = GradingService::grade(&q, &json!(0));
        assert!(!out.is_correct);
        assert_eq!(out.marks_awarded, -1.0);
    }

    #[test]
    fn blank_answers_never_score_negative() {
        let q = mcq("q1", 4.0, 1.0, 2);
        for blank in [json!(null), json!(""), json!([])] {
            let out = GradingService::grade(&q, &blank);
            assert!(!out.is_correct);
            assert_eq!(out.marks_awarded, 0.0);
        }
    }

    #[test]
    fn msq_requires_exact_set_match() {
        let q = msq("q1", vec![1, 2, 3]);
        let partial = GradingService::grade(&q, &json!([1, 2]));
        assert!(!partial.is_correct);
        assert_eq!(partial.marks_awarded, -1.0);

        let exact = GradingService::grade(&q, &json!([1, 2, 3]));
        assert!(exact.is_correct);
        assert_eq!(exact.marks_awarded, 2.0);

        let reordered = GradingService::grade(&q, &json!([3, 2, 1]));
        assert!(reordered.is_correct);

        let superset = GradingService::grade(&q, &json!([0, 1, 2, 3]));
        assert!(!superset.is_correct);
    }

    #[test]
    fn number_range_bounds_are_inclusive() {
        let q = range_question("q1", 6.0, 5.0, 10.0);
        assert!(GradingService::grade(&q, &json!(5)).is_correct);
        assert!(GradingService::grade(&q, &json!(10)).is_correct);
        assert!(GradingService::grade(&q, &json!("7.5")).is_correct);
        assert!(!GradingService::grade(&q, &json!(4.999)).is_correct);
        assert!(!GradingService::grade(&q, &json!(10.001)).is_correct);
        assert!(!GradingService::grade(&q, &json!("not a number")).is_correct);
    }

    #[test]
    fn fill_blank_text_trims_and_honors_case_flag() {
        let relaxed = text_question("q1", "Paris", false);
        assert!(GradingService::grade(&relaxed, &json!("  paris ")).is_correct);

        let strict = text_question("q2", "Paris", true);
        assert!(!GradingService::grade(&strict, &json!("paris")).is_correct);
        assert!(GradingService::grade(&strict, &json!(" Paris ")).is_correct);
    }

    #[test]
    fn grace_question_overrides_any_submission() {
        let mut q = mcq("q1", 4.0, 1.0, 2);
        q.is_grace = true;
        for submitted in [json!(0), json!(null), json!("garbage")] {
            let out = GradingService::grade(&q, &submitted);
            assert!(out.is_correct);
            assert_eq!(out.marks_awarded, 4.0);
        }
    }

    #[test]
    fn grading_is_deterministic() {
        let q = msq("q1", vec![0, 2]);
        let submitted = json!([2, 0]);
        let first = GradingService::grade(&q, &submitted);
        for _ in 0..5 {
            assert_eq!(GradingService::grade(&q, &submitted), first);
        }
    }

    #[test]
    fn comprehension_scores_leaves_not_parent() {
        let parent = Question {
            id: "q1".to_string(),
            question_type: QuestionType::Comprehension,
            text: "passage".to_string(),
            marks: 99.0,
            negative_marks: 0.0,
            is_grace: false,
            details: QuestionDetails::Comprehension(ComprehensionDetails {
                sub_questions: vec![mcq("q1.1", 2.0, 0.0, 1), mcq("q1.2", 3.0, 0.0, 0)],
            }),
        };
        let bank = vec![parent, mcq("q2", 1.0, 0.0, 3)];

        let leaves = GradingService::leaf_questions(&bank);
        let ids: Vec<&str> = leaves.iter().map(|q| q.id.as_str()).collect();
        assert_eq!(ids, vec!["q1.1", "q1.2", "q2"]);
        // parent's own 99 marks never enter the total
        assert_eq!(GradingService::total_marks(&bank), 6.0);
    }

    #[test]
    fn regrade_degrades_unresolvable_question_ids() {
        let bank = vec![mcq("q1", 4.0, 1.0, 2)];
        let mut answers = vec![
            answer_entry("q1", json!(2)),
            answer_entry("deleted", json!(1)),
        ];
        GradingService::regrade_answers(&bank, &mut answers);
        assert!(answers[0].is_correct);
        assert_eq!(answers[0].marks_awarded, 4.0);
        assert!(!answers[1].is_correct);
        assert_eq!(answers[1].marks_awarded, 0.0);
    }

    #[test]
    fn score_is_floored_at_zero() {
        let answers = vec![
            Answer {
                marks_awarded: -1.0,
                ..answer_entry("q1", json!(0))
            },
            Answer {
                marks_awarded: -2.0,
                ..answer_entry("q2", json!(1))
            },
        ];
        assert_eq!(GradingService::final_score(&answers, 0.0), 0.0);
        assert_eq!(GradingService::final_score(&answers, 5.0), 2.0);
    }

    #[test]
    fn adjustments_and_grace_feed_the_score() {
        let answers = vec![
            Answer {
                marks_awarded: 3.0,
                adjustment_marks: Some(1.0),
                ..answer_entry("q1", json!(2))
            },
            Answer {
                marks_awarded: -1.0,
                ..answer_entry("q2", json!(0))
            },
        ];
        assert_eq!(GradingService::final_score(&answers, 2.0), 5.0);
    }

    #[test]
    fn percentage_uses_served_total_and_rounds() {
        assert_eq!(GradingService::percentage(10.0, 10.0), 100.0);
        assert_eq!(GradingService::percentage(1.0, 3.0), 33.0);
        assert_eq!(GradingService::percentage(2.0, 3.0), 67.0);
        assert_eq!(GradingService::percentage(5.0, 0.0), 0.0);
    }

    #[test]
    fn worked_scenario_from_the_handbook() {
        // one mcq worth 4 (-1) and one numeric range worth 6
        let bank = vec![mcq("q1", 4.0, 1.0, 2), range_question("q2", 6.0, 10.0, 20.0)];

        let mut best = vec![answer_entry("q1", json!(2)), answer_entry("q2", json!(15))];
        GradingService::regrade_answers(&bank, &mut best);
        let score = GradingService::final_score(&best, 0.0);
        assert_eq!(score, 10.0);
        assert_eq!(
            GradingService::percentage(score, GradingService::total_marks(&bank)),
            100.0
        );

        let mut worst = vec![answer_entry("q1", json!(0)), answer_entry("q2", json!(null))];
        GradingService::regrade_answers(&bank, &mut worst);
        let score = GradingService::final_score(&worst, 0.0);
        assert_eq!(score, 0.0);
        assert_eq!(
            GradingService::percentage(score, GradingService::total_marks(&bank)),
            0.0
        );
    }
}

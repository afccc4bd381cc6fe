use futures::TryStreamExt;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::dto::staff_dto::MarkAdjustment;
use crate::error::{Error, Result};
use crate::models::answer::Answer;
use crate::models::question::Question;
use crate::models::test::Test;
use crate::models::test_attempt::TestAttempt;
use crate::services::grading_service::GradingService;

/// Test-level grace update carried by a question edit. Absent fields
/// overwrite: re-grading without grace marks resets previously awarded
/// grace to zero (last write wins, kept for compatibility with the
/// established contract).
#[derive(Debug, Clone, Default)]
pub struct GraceUpdate {
    pub grace_marks: f64,
    pub grace_reason: Option<String>,
}

#[derive(Clone)]
pub struct RegradeService {
    pool: PgPool,
}

impl RegradeService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Re-applies the grading engine to every completed attempt of a test
    /// whose questions were just edited. Attempts are processed and
    /// persisted one by one; a failing save is logged and skipped so the
    /// rest of the batch still goes through. Returns how many attempts were
    /// re-graded.
    pub async fn regrade_test(&self, test: &Test, grace: &GraceUpdate) -> Result<u32> {
        let bank = test.question_bank();
        let mut regraded = 0u32;

        let mut rows = sqlx::query_as::<_, TestAttempt>(
            r#"SELECT * FROM test_attempts WHERE test_id = $1 AND status = 'completed'"#,
        )
        .bind(test.id)
        .fetch(&self.pool);

        while let Some(attempt) = rows.try_next().await? {
            match self.regrade_attempt(&bank, attempt, grace).await {
                Ok(()) => regraded += 1,
                Err(e) => {
                    tracing::error!(test_id = %test.id, error = ?e, "re-grade failed for one attempt");
                }
            }
        }

        Ok(regraded)
    }

    async fn regrade_attempt(
        &self,
        bank: &[Question],
        attempt: TestAttempt,
        grace: &GraceUpdate,
    ) -> Result<()> {
        let snapshot: Vec<Question> = attempt
            .questions_snapshot
            .clone()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();

        let (snapshot_json, served) = if snapshot.is_empty() {
            (None, bank.to_vec())
        } else {
            let merged = merge_snapshot(snapshot, bank);
            (Some(serde_json::to_value(&merged)?), merged)
        };

        let mut answers = attempt.answer_list();
        let (score, total, percentage) = regraded_totals(&served, &mut answers, grace.grace_marks);

        sqlx::query(
            r#"
            UPDATE test_attempts
            SET questions_snapshot = COALESCE($1, questions_snapshot),
                answers = $2, score = $3, total_marks = $4, percentage = $5,
                grace_marks = $6, grace_reason = $7, updated_at = NOW()
            WHERE id = $8
            "#,
        )
        .bind(snapshot_json)
        .bind(serde_json::to_value(&answers)?)
        .bind(Decimal::from_f64(score).unwrap_or_default())
        .bind(Decimal::from_f64(total).unwrap_or_default())
        .bind(Decimal::from_f64(percentage).unwrap_or_default())
        .bind(Decimal::from_f64(grace.grace_marks).unwrap_or_default())
        .bind(&grace.grace_reason)
        .bind(attempt.id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Manual per-question mark adjustment on a completed attempt. The
    /// score and percentage are recomputed from their components.
    pub async fn adjust_marks(
        &self,
        test: &Test,
        student_phone: &str,
        adjustments: &[MarkAdjustment],
    ) -> Result<TestAttempt> {
        let attempt = sqlx::query_as::<_, TestAttempt>(
            r#"SELECT * FROM test_attempts WHERE test_id = $1 AND student_phone = $2"#,
        )
        .bind(test.id)
        .bind(student_phone)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound("Attempt not found".to_string()))?;

        if attempt.status != "completed" {
            return Err(Error::Conflict(
                "Only completed attempts can be adjusted".to_string(),
            ));
        }

        let mut answers = attempt.answer_list();
        apply_adjustments(&mut answers, adjustments)?;

        let served = attempt.served_questions(test);
        let grace = attempt.grace_marks.to_f64().unwrap_or(0.0);
        let score = GradingService::final_score(&answers, grace);
        let total = GradingService::total_marks(&served);
        let percentage = GradingService::percentage(score, total);

        let updated = sqlx::query_as::<_, TestAttempt>(
            r#"
            UPDATE test_attempts
            SET answers = $1, score = $2, total_marks = $3, percentage = $4, updated_at = NOW()
            WHERE id = $5
            RETURNING *
            "#,
        )
        .bind(serde_json::to_value(&answers)?)
        .bind(Decimal::from_f64(score).unwrap_or_default())
        .bind(Decimal::from_f64(total).unwrap_or_default())
        .bind(Decimal::from_f64(percentage).unwrap_or_default())
        .bind(attempt.id)
        .fetch_one(&self.pool)
        .await?;

        Ok(updated)
    }
}

/// Refreshes a per-student snapshot against the edited bank: a snapshot
/// question is replaced wholesale by the edited question with the same id,
/// so the edit wins on every field, a cleared grace flag included. Snapshot
/// questions whose id disappeared stay (they degrade to unscored at
/// grading but keep the served set the student actually saw).
pub fn merge_snapshot(snapshot: Vec<Question>, edited: &[Question]) -> Vec<Question> {
    snapshot
        .into_iter()
        .map(|old| {
            edited
                .iter()
                .find(|e| e.id == old.id)
                .cloned()
                .unwrap_or(old)
        })
        .collect()
}

/// Re-grades stored answers against a served question set and returns
/// (score, total, percentage) with the given grace bonus applied.
pub fn regraded_totals(
    served: &[Question],
    answers: &mut [Answer],
    grace_marks: f64,
) -> (f64, f64, f64) {
    GradingService::regrade_answers(served, answers);
    let score = GradingService::final_score(answers, grace_marks);
    let total = GradingService::total_marks(served);
    let percentage = GradingService::percentage(score, total);
    (score, total, percentage)
}

fn apply_adjustments(answers: &mut [Answer], adjustments: &[MarkAdjustment]) -> Result<()> {
    for adj in adjustments {
        match answers
            .iter_mut()
            .find(|a| a.question_id == adj.question_id)
        {
            Some(entry) => entry.adjustment_marks = Some(adj.adjustment_marks),
            None => {
                return Err(Error::NotFound(format!(
                    "No answer recorded for question {}",
                    adj.question_id
                )))
            }
        }
    }
    Ok(())
}

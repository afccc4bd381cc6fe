use chrono::{DateTime, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::dto::student_dto::SaveAnswerRequest;
use crate::error::{Error, Result};
use crate::models::answer::Answer;
use crate::models::question::Question;
use crate::models::student::StudentProfile;
use crate::models::test::Test;
use crate::models::test_attempt::TestAttempt;
use crate::services::grading_service::GradingService;

#[derive(Clone)]
pub struct AttemptService {
    pool: PgPool,
}

impl AttemptService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_attempt(
        &self,
        test_id: Uuid,
        student_phone: &str,
    ) -> Result<Option<TestAttempt>> {
        let attempt = sqlx::query_as::<_, TestAttempt>(
            r#"SELECT * FROM test_attempts WHERE test_id = $1 AND student_phone = $2"#,
        )
        .bind(test_id)
        .bind(student_phone)
        .fetch_optional(&self.pool)
        .await?;
        Ok(attempt)
    }

    pub async fn get_attempt(&self, test_id: Uuid, student_phone: &str) -> Result<TestAttempt> {
        self.find_attempt(test_id, student_phone)
            .await?
            .ok_or_else(|| Error::NotFound("Attempt not found".to_string()))
    }

    /// Saves one answer, creating the in_progress attempt on the first save.
    /// An attempt that was already submitted conflicts; a first save after
    /// the window closed is rejected while an in_progress attempt may keep
    /// writing (the sweeper is the backstop).
    pub async fn save_answer(
        &self,
        test: &Test,
        student: &StudentProfile,
        req: &SaveAnswerRequest,
    ) -> Result<TestAttempt> {
        let now = Utc::now();
        let attempt = match self.find_attempt(test.id, &student.phone).await? {
            Some(a) if a.status == "completed" => {
                return Err(Error::Conflict(
                    "Test has already been submitted".to_string(),
                ))
            }
            Some(a) => a,
            None => self.create_attempt(test, student, now).await?,
        };

        let served = attempt.served_questions(test);
        let known = GradingService::leaf_questions(&served)
            .iter()
            .any(|q| q.id == req.question_id);
        if !known {
            return Err(Error::NotFound(format!(
                "Question {} is not part of this test",
                req.question_id
            )));
        }

        let mut answers = attempt.answer_list();
        let entry = Answer {
            question_id: req.question_id.clone(),
            answer: req.answer.clone(),
            is_correct: false,
            marks_awarded: 0.0,
            adjustment_marks: None,
            is_grace_awarded: None,
            answered_at: Some(now),
        };
        if let Some(pos) = answers.iter().position(|a| a.question_id == req.question_id) {
            answers[pos] = entry;
        } else {
            answers.push(entry);
        }

        let updated = sqlx::query_as::<_, TestAttempt>(
            r#"UPDATE test_attempts SET answers = $1, updated_at = NOW() WHERE id = $2 RETURNING *"#,
        )
        .bind(serde_json::to_value(&answers)?)
        .bind(attempt.id)
        .fetch_one(&self.pool)
        .await?;

        Ok(updated)
    }

    /// Finalizes the attempt: grades every stored answer against the served
    /// question set and marks it completed. Submitting twice conflicts;
    /// submitting an attempt that is still in_progress is honored even past
    /// the end time.
    pub async fn submit(&self, test: &Test, student: &StudentProfile) -> Result<TestAttempt> {
        let now = Utc::now();
        let attempt = match self.find_attempt(test.id, &student.phone).await? {
            Some(a) if a.status == "completed" => {
                return Err(Error::Conflict(
                    "Test has already been submitted".to_string(),
                ))
            }
            Some(a) => a,
            None => self.create_attempt(test, student, now).await?,
        };

        self.finalize(test, attempt, now, "normal").await
    }

    /// Grades whatever answers exist and closes the attempt. Shared by the
    /// student submit path and the auto-completion sweeper.
    pub async fn finalize(
        &self,
        test: &Test,
        attempt: TestAttempt,
        now: DateTime<Utc>,
        termination_reason: &str,
    ) -> Result<TestAttempt> {
        let served = attempt.served_questions(test);
        let mut answers = attempt.answer_list();
        GradingService::regrade_answers(&served, &mut answers);

        let grace = attempt.grace_marks.to_f64().unwrap_or(0.0);
        let score = GradingService::final_score(&answers, grace);
        let total = GradingService::total_marks(&served);
        let percentage = GradingService::percentage(score, total);
        let time_spent = attempt
            .started_at
            .map(|started| (now - started).num_seconds().max(0) as i32);

        let updated = sqlx::query_as::<_, TestAttempt>(
            r#"
            UPDATE test_attempts
            SET status = 'completed', submitted_at = $1, termination_reason = $2,
                answers = $3, score = $4, total_marks = $5, percentage = $6,
                time_spent_seconds = COALESCE(time_spent_seconds, $7),
                updated_at = NOW()
            WHERE id = $8
            RETURNING *
            "#,
        )
        .bind(now)
        .bind(termination_reason)
        .bind(serde_json::to_value(&answers)?)
        .bind(Decimal::from_f64(score).unwrap_or_default())
        .bind(Decimal::from_f64(total).unwrap_or_default())
        .bind(Decimal::from_f64(percentage).unwrap_or_default())
        .bind(time_spent)
        .bind(attempt.id)
        .fetch_one(&self.pool)
        .await?;

        Ok(updated)
    }

    pub async fn list_attempts(
        &self,
        test_id: Uuid,
        status: Option<String>,
        page: i64,
        limit: i64,
    ) -> Result<(Vec<TestAttempt>, i64)> {
        let offset = (page - 1) * limit;
        let rows = sqlx::query_as::<_, TestAttempt>(
            r#"
            SELECT * FROM test_attempts
            WHERE test_id = $1
              AND ($2::text IS NULL OR status = $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(test_id)
        .bind(status.clone())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM test_attempts
            WHERE test_id = $1 AND ($2::text IS NULL OR status = $2)
            "#,
        )
        .bind(test_id)
        .bind(status)
        .fetch_one(&self.pool)
        .await?;

        Ok((rows, total))
    }

    async fn create_attempt(
        &self,
        test: &Test,
        student: &StudentProfile,
        now: DateTime<Utc>,
    ) -> Result<TestAttempt> {
        if let Some(end) = test.end_time {
            if now > end {
                return Err(Error::AlreadyExpired(
                    "The test window has closed".to_string(),
                ));
            }
        }
        if test.status != "deployed" {
            return Err(Error::NotFound("Test is not open".to_string()));
        }
        if let Some(start) = test.start_time {
            if now < start {
                return Err(Error::BadRequest("Test has not started yet".to_string()));
            }
        }

        let snapshot = match snapshot_questions(test) {
            Some(questions) => Some(serde_json::to_value(&questions)?),
            None => None,
        };

        // the unique (test_id, student_phone) constraint turns a concurrent
        // duplicate start into a clean Conflict instead of a second row
        let attempt = sqlx::query_as::<_, TestAttempt>(
            r#"
            INSERT INTO test_attempts (
                test_id, student_phone, student_name, questions_snapshot,
                answers, status, started_at
            )
            VALUES ($1, $2, $3, $4, '[]'::jsonb, 'in_progress', $5)
            RETURNING *
            "#,
        )
        .bind(test.id)
        .bind(&student.phone)
        .bind(&student.name)
        .bind(snapshot)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(attempt)
    }
}

/// Per-student random subset, taken only when the test asks for fewer
/// questions than the bank holds. Bank order is preserved so numbering on
/// the student side stays stable.
fn snapshot_questions(test: &Test) -> Option<Vec<Question>> {
    let count = test.questions_per_student? as usize;
    let bank = test.question_bank();
    if count == 0 || count >= bank.len() {
        return None;
    }
    let mut rng = rand::thread_rng();
    let mut picked = rand::seq::index::sample(&mut rng, bank.len(), count).into_vec();
    picked.sort_unstable();
    Some(picked.into_iter().map(|i| bank[i].clone()).collect())
}

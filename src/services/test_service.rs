use chrono::{DateTime, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::dto::staff_dto::{CreateTestPayload, DeployTestPayload, ReassignTestPayload, UpdateTestPayload};
use crate::error::{Error, Result};
use crate::models::question::{Question, QuestionDetails, QuestionType};
use crate::models::test::Test;
use crate::services::grading_service::GradingService;

#[derive(Debug, serde::Serialize)]
pub struct PaginatedTests {
    #[serde(rename = "items")]
    pub tests: Vec<Test>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

#[derive(Debug, Default)]
pub struct TestFilter {
    pub status: Option<String>,
    pub created_by: Option<String>,
    pub search: Option<String>,
}

#[derive(Clone)]
pub struct TestService {
    pool: PgPool,
}

impl TestService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create_test(&self, payload: CreateTestPayload, created_by: &str) -> Result<Test> {
        let questions = assign_question_ids(&payload.questions.unwrap_or_default());
        validate_questions(&questions)?;
        let total_marks = GradingService::total_marks(&questions);

        let test = sqlx::query_as::<_, Test>(
            r#"
            INSERT INTO tests (
                title, description, questions, batches, duration_minutes,
                questions_per_student, passing_percentage, show_results,
                show_results_immediately, status, total_marks, created_by
            )
            VALUES ($1, $2, $3, '[]'::jsonb, $4, $5, $6, $7, $8, 'draft', $9, $10)
            RETURNING *
            "#,
        )
        .bind(payload.title)
        .bind(payload.description)
        .bind(serde_json::to_value(&questions)?)
        .bind(payload.duration_minutes)
        .bind(payload.questions_per_student)
        .bind(decimal(payload.passing_percentage.unwrap_or(0.0))?)
        .bind(payload.show_results.unwrap_or(true))
        .bind(payload.show_results_immediately.unwrap_or(false))
        .bind(decimal(total_marks)?)
        .bind(created_by)
        .fetch_one(&self.pool)
        .await?;

        Ok(test)
    }

    pub async fn get_test(&self, test_id: Uuid) -> Result<Test> {
        let test = sqlx::query_as::<_, Test>(r#"SELECT * FROM tests WHERE id = $1"#)
            .bind(test_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(test)
    }

    /// Fetches a test for a staff operation. Faculty only see their own
    /// tests; an admin sees everything. A test owned by someone else is
    /// reported as absent rather than forbidden.
    pub async fn get_owned_test(&self, test_id: Uuid, caller: &str, is_admin: bool) -> Result<Test> {
        let test = self.get_test(test_id).await?;
        if !is_admin && test.created_by != caller {
            return Err(Error::NotFound("Test not found".to_string()));
        }
        Ok(test)
    }

    pub async fn list_tests(
        &self,
        page: i64,
        per_page: i64,
        filter: TestFilter,
    ) -> Result<PaginatedTests> {
        let offset = (page - 1) * per_page;
        let search = filter.search.map(|s| format!("%{}%", s));

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM tests
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::text IS NULL OR created_by = $2)
              AND ($3::text IS NULL OR title ILIKE $3)
            "#,
        )
        .bind(filter.status.clone())
        .bind(filter.created_by.clone())
        .bind(search.clone())
        .fetch_one(&self.pool)
        .await?;

        let total_pages = if per_page > 0 {
            ((total as f64) / (per_page as f64)).ceil() as i64
        } else {
            1
        };

        let tests = sqlx::query_as::<_, Test>(
            r#"
            SELECT * FROM tests
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::text IS NULL OR created_by = $2)
              AND ($3::text IS NULL OR title ILIKE $3)
            ORDER BY created_at DESC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(filter.status)
        .bind(filter.created_by)
        .bind(search)
        .bind(per_page)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(PaginatedTests {
            tests,
            total,
            page,
            per_page,
            total_pages,
        })
    }

    /// Deployed (and already closed) tests targeting any of the given
    /// batches, newest window first.
    pub async fn list_for_batches(&self, batches: &[String]) -> Result<Vec<Test>> {
        let tests = sqlx::query_as::<_, Test>(
            r#"
            SELECT * FROM tests
            WHERE status IN ('deployed', 'completed')
              AND batches ?| $1
            ORDER BY start_time DESC NULLS LAST
            "#,
        )
        .bind(batches)
        .fetch_all(&self.pool)
        .await?;
        Ok(tests)
    }

    /// Updates test metadata and, when `questions` is present, replaces the
    /// question bank (ids reassigned, totals re-derived). The caller is
    /// responsible for running the re-grading pipeline afterwards when the
    /// test is already deployed.
    pub async fn update_test(&self, test_id: Uuid, payload: &UpdateTestPayload) -> Result<Test> {
        let (questions_json, total_marks) = match &payload.questions {
            Some(qs) => {
                let questions = assign_question_ids(qs);
                validate_questions(&questions)?;
                let total = GradingService::total_marks(&questions);
                (
                    Some(serde_json::to_value(&questions)?),
                    Some(decimal(total)?),
                )
            }
            None => (None, None),
        };

        let passing = match payload.passing_percentage {
            Some(p) => Some(decimal(p)?),
            None => None,
        };

        let test = sqlx::query_as::<_, Test>(
            r#"
            UPDATE tests
            SET
                title = COALESCE($1, title),
                description = COALESCE($2, description),
                questions = COALESCE($3, questions),
                duration_minutes = COALESCE($4, duration_minutes),
                questions_per_student = COALESCE($5, questions_per_student),
                passing_percentage = COALESCE($6, passing_percentage),
                show_results = COALESCE($7, show_results),
                show_results_immediately = COALESCE($8, show_results_immediately),
                total_marks = COALESCE($9, total_marks),
                updated_at = NOW()
            WHERE id = $10
            RETURNING *
            "#,
        )
        .bind(&payload.title)
        .bind(&payload.description)
        .bind(questions_json)
        .bind(payload.duration_minutes)
        .bind(payload.questions_per_student)
        .bind(passing)
        .bind(payload.show_results)
        .bind(payload.show_results_immediately)
        .bind(total_marks)
        .bind(test_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(test)
    }

    pub async fn deploy(&self, test: &Test, payload: &DeployTestPayload) -> Result<Test> {
        if test.status != "draft" {
            return Err(Error::Conflict(format!(
                "Test is already {}; use reassign to open a new window",
                test.status
            )));
        }
        validate_window(payload.start_time, payload.end_time)?;
        if payload.batches.is_empty() {
            return Err(Error::BadRequest(
                "At least one batch must be targeted".to_string(),
            ));
        }

        let updated = sqlx::query_as::<_, Test>(
            r#"
            UPDATE tests
            SET batches = $1, start_time = $2, end_time = $3,
                duration_minutes = COALESCE($4, duration_minutes),
                status = 'deployed', updated_at = NOW()
            WHERE id = $5
            RETURNING *
            "#,
        )
        .bind(serde_json::to_value(&payload.batches)?)
        .bind(payload.start_time)
        .bind(payload.end_time)
        .bind(payload.duration_minutes)
        .bind(test.id)
        .fetch_one(&self.pool)
        .await?;

        Ok(updated)
    }

    /// The one sanctioned backwards transition: an already deployed (or
    /// closed-out) test gets a fresh open window.
    pub async fn reassign(&self, test: &Test, payload: &ReassignTestPayload) -> Result<Test> {
        if test.status == "draft" {
            return Err(Error::Conflict(
                "Draft tests are deployed, not reassigned".to_string(),
            ));
        }
        validate_window(payload.start_time, payload.end_time)?;

        let updated = sqlx::query_as::<_, Test>(
            r#"
            UPDATE tests
            SET batches = COALESCE($1, batches), start_time = $2, end_time = $3,
                status = 'deployed', updated_at = NOW()
            WHERE id = $4
            RETURNING *
            "#,
        )
        .bind(match &payload.batches {
            Some(b) => Some(serde_json::to_value(b)?),
            None => None,
        })
        .bind(payload.start_time)
        .bind(payload.end_time)
        .bind(test.id)
        .fetch_one(&self.pool)
        .await?;

        Ok(updated)
    }

    pub async fn mark_completed(&self, test_id: Uuid) -> Result<()> {
        sqlx::query(r#"UPDATE tests SET status = 'completed', updated_at = NOW() WHERE id = $1 AND status = 'deployed'"#)
            .bind(test_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete_test(&self, test: &Test) -> Result<()> {
        if test.status != "draft" {
            return Err(Error::Conflict(
                "Only draft tests can be deleted".to_string(),
            ));
        }
        sqlx::query(r#"DELETE FROM tests WHERE id = $1"#)
            .bind(test.id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn decimal(value: f64) -> Result<Decimal> {
    Decimal::from_f64(value)
        .ok_or_else(|| Error::BadRequest(format!("Value {} is not representable", value)))
}

fn validate_window(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<()> {
    if end <= start {
        return Err(Error::BadRequest(
            "End time must be after start time".to_string(),
        ));
    }
    Ok(())
}

/// Server-assigned ids: `q1`, `q2`, ... with `q3.1`-style ids for the
/// sub-questions of a comprehension block. Client-supplied ids are ignored.
pub fn assign_question_ids(questions: &[Question]) -> Vec<Question> {
    questions
        .iter()
        .enumerate()
        .map(|(idx, q)| {
            let mut q = q.clone();
            q.id = format!("q{}", idx + 1);
            if let QuestionDetails::Comprehension(ref mut c) = q.details {
                for (sub_idx, sub) in c.sub_questions.iter_mut().enumerate() {
                    sub.id = format!("q{}.{}", idx + 1, sub_idx + 1);
                }
            }
            q
        })
        .collect()
}

pub fn validate_questions(questions: &[Question]) -> Result<()> {
    for q in questions {
        validate_question(q, false)?;
    }
    Ok(())
}

fn validate_question(q: &Question, is_sub: bool) -> Result<()> {
    if q.marks < 0.0 || q.negative_marks < 0.0 {
        return Err(Error::BadRequest(format!(
            "Question {}: marks and negative marks must not be negative",
            q.id
        )));
    }

    match (&q.question_type, &q.details) {
        (QuestionType::Mcq, QuestionDetails::Choice(c)) => {
            if c.correct_indices.len() != 1 {
                return Err(Error::BadRequest(format!(
                    "Question {}: mcq needs exactly one correct option",
                    q.id
                )));
            }
            check_indices(q, c.correct_indices.as_slice(), c.options.len())
        }
        (QuestionType::Msq, QuestionDetails::Choice(c)) => {
            if c.correct_indices.is_empty() {
                return Err(Error::BadRequest(format!(
                    "Question {}: msq needs at least one correct option",
                    q.id
                )));
            }
            check_indices(q, c.correct_indices.as_slice(), c.options.len())
        }
        (QuestionType::FillBlank, QuestionDetails::FillBlank(f)) => {
            if f.is_number_range {
                match (f.number_range_min, f.number_range_max) {
                    (Some(min), Some(max)) if min <= max => Ok(()),
                    _ => Err(Error::BadRequest(format!(
                        "Question {}: number range needs min <= max",
                        q.id
                    ))),
                }
            } else {
                Ok(())
            }
        }
        (QuestionType::Comprehension, QuestionDetails::Comprehension(c)) => {
            if is_sub {
                return Err(Error::BadRequest(format!(
                    "Question {}: comprehension blocks cannot be nested",
                    q.id
                )));
            }
            if c.sub_questions.is_empty() {
                return Err(Error::BadRequest(format!(
                    "Question {}: comprehension needs at least one sub-question",
                    q.id
                )));
            }
            for sub in &c.sub_questions {
                validate_question(sub, true)?;
            }
            Ok(())
        }
        _ => Err(Error::BadRequest(format!(
            "Question {}: fields do not match the declared type",
            q.id
        ))),
    }
}

fn check_indices(q: &Question, indices: &[u32], option_count: usize) -> Result<()> {
    if option_count < 2 {
        return Err(Error::BadRequest(format!(
            "Question {}: at least two options required",
            q.id
        )));
    }
    for &idx in indices {
        if idx as usize >= option_count {
            return Err(Error::BadRequest(format!(
                "Question {}: correct index {} is out of range",
                q.id, idx
            )));
        }
    }
    Ok(())
}

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::error::Result;
use crate::models::test::Test;
use crate::models::test_attempt::TestAttempt;
use crate::services::attempt_service::AttemptService;
use crate::services::test_service::TestService;

#[derive(Clone)]
pub struct SweeperService {
    pool: PgPool,
}

impl SweeperService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Force-completes every in_progress attempt of the test that has run
    /// out of time, grading whatever answers were stored. Nothing is
    /// fabricated and nothing already completed is touched, so running the
    /// sweep twice completes nothing further. Returns the number of
    /// attempts closed.
    pub async fn sweep_test(&self, test: &Test) -> Result<u32> {
        let now = Utc::now();
        let attempts = sqlx::query_as::<_, TestAttempt>(
            r#"SELECT * FROM test_attempts WHERE test_id = $1 AND status = 'in_progress'"#,
        )
        .bind(test.id)
        .fetch_all(&self.pool)
        .await?;

        let attempt_service = AttemptService::new(self.pool.clone());
        let mut completed = 0u32;
        for attempt in attempts {
            if !is_expired(&attempt, test, now) {
                continue;
            }
            let attempt_id = attempt.id;
            match attempt_service
                .finalize(test, attempt, now, "server_auto_expired")
                .await
            {
                Ok(_) => completed += 1,
                Err(e) => {
                    tracing::error!(test_id = %test.id, attempt_id = %attempt_id, error = ?e,
                        "auto-completion failed for one attempt");
                }
            }
        }

        if completed > 0 {
            tracing::info!(test_id = %test.id, completed, "swept expired attempts");
        }
        Ok(completed)
    }

    /// One pass over every deployed test: sweep expired attempts, then
    /// close out tests whose window has fully passed. Driven by the
    /// background loop in main and re-runnable at any time.
    pub async fn sweep_deployed(&self) -> Result<u32> {
        let now = Utc::now();
        let tests = sqlx::query_as::<_, Test>(r#"SELECT * FROM tests WHERE status = 'deployed'"#)
            .fetch_all(&self.pool)
            .await?;

        let test_service = TestService::new(self.pool.clone());
        let mut completed = 0u32;
        for test in tests {
            match self.sweep_test(&test).await {
                Ok(n) => completed += n,
                Err(e) => {
                    tracing::error!(test_id = %test.id, error = ?e, "sweep failed for one test");
                    continue;
                }
            }
            if test.end_time.map(|end| now > end).unwrap_or(false) {
                if let Err(e) = test_service.mark_completed(test.id).await {
                    tracing::warn!(test_id = %test.id, error = ?e, "could not close out test");
                }
            }
        }
        Ok(completed)
    }
}

/// An in_progress attempt is expired once it outran the test's duration or
/// the deployment window closed, whichever comes first.
pub fn is_expired(attempt: &TestAttempt, test: &Test, now: DateTime<Utc>) -> bool {
    let by_duration = attempt
        .started_at
        .map(|started| (now - started).num_seconds() > (test.duration_minutes as i64) * 60)
        .unwrap_or(false);
    let by_end_time = test.end_time.map(|end| now > end).unwrap_or(false);
    by_duration || by_end_time
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal::Decimal;
    use serde_json::json;
    use uuid::Uuid;

    fn t(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 10, minute, 0).unwrap()
    }

    fn deployed_test(duration_minutes: i32, end_time: Option<DateTime<Utc>>) -> Test {
        Test {
            id: Uuid::new_v4(),
            title: "t".to_string(),
            description: None,
            questions: json!([]),
            batches: json!(["alpha"]),
            start_time: Some(t(0)),
            end_time,
            duration_minutes,
            questions_per_student: None,
            passing_percentage: Decimal::ZERO,
            show_results: true,
            show_results_immediately: false,
            status: "deployed".to_string(),
            total_marks: Decimal::ZERO,
            created_by: "staff@example.com".to_string(),
            created_at: None,
            updated_at: None,
        }
    }

    fn in_progress(started_at: Option<DateTime<Utc>>) -> TestAttempt {
        TestAttempt {
            id: Uuid::new_v4(),
            test_id: Uuid::new_v4(),
            student_phone: "9000000001".to_string(),
            student_name: "A".to_string(),
            questions_snapshot: None,
            answers: json!([]),
            score: None,
            total_marks: None,
            percentage: None,
            grace_marks: Decimal::ZERO,
            grace_reason: None,
            status: "in_progress".to_string(),
            started_at,
            submitted_at: None,
            termination_reason: None,
            time_spent_seconds: None,
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn within_duration_and_window_is_left_alone() {
        let test = deployed_test(30, Some(t(50)));
        let attempt = in_progress(Some(t(5)));
        assert!(!is_expired(&attempt, &test, t(20)));
    }

    #[test]
    fn outrunning_the_duration_expires() {
        let test = deployed_test(30, Some(t(50)));
        let attempt = in_progress(Some(t(5)));
        assert!(is_expired(&attempt, &test, t(5) + Duration::minutes(31)));
    }

    #[test]
    fn a_closed_window_expires_even_fresh_attempts() {
        let test = deployed_test(30, Some(t(10)));
        let attempt = in_progress(Some(t(9)));
        assert!(is_expired(&attempt, &test, t(11)));
    }

    #[test]
    fn no_end_time_leaves_only_the_duration_bound() {
        let test = deployed_test(30, None);
        let attempt = in_progress(Some(t(0)));
        assert!(!is_expired(&attempt, &test, t(29)));
        assert!(is_expired(&attempt, &test, t(31)));
    }
}

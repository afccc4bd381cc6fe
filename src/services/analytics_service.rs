use std::collections::BTreeMap;

use futures::TryStreamExt;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::Result;
use crate::models::answer::Answer;
use crate::models::student::StudentProfile;
use crate::models::test::Test;

#[derive(Debug, Serialize)]
pub struct QuestionAccuracy {
    pub question_id: String,
    pub attempted: i64,
    pub correct: i64,
    pub accuracy: f64,
}

#[derive(Debug, Serialize)]
pub struct LeaderboardEntry {
    pub student_name: String,
    pub student_phone: String,
    pub score: f64,
    pub percentage: f64,
}

#[derive(Debug, Serialize)]
pub struct TestAnalytics {
    pub test_id: Uuid,
    pub completed_attempts: i64,
    pub highest_score: f64,
    pub average_score: f64,
    pub percentage_histogram: [i64; 10],
    pub question_accuracy: Vec<QuestionAccuracy>,
    pub leaderboard: Vec<LeaderboardEntry>,
}

#[derive(Debug, Serialize)]
pub struct StudentTestComparison {
    pub test_id: Uuid,
    pub title: String,
    pub my_score: f64,
    pub my_percentage: f64,
    pub batch_highest: f64,
    pub batch_average: f64,
    pub rank: i64,
    pub leaderboard: Vec<LeaderboardEntry>,
}

#[derive(Debug, Serialize)]
pub struct StudentOverview {
    pub student_phone: String,
    pub tests: Vec<StudentTestComparison>,
}

#[derive(Clone)]
pub struct AnalyticsService {
    pool: PgPool,
}

impl AnalyticsService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn test_analytics(&self, test: &Test) -> Result<TestAnalytics> {
        let (completed_attempts, highest, average) = self.score_summary(test.id).await?;

        // histogram and per-question accuracy accumulate over a row stream
        // so a large attempt collection is never materialized at once
        let mut histogram = [0i64; 10];
        let mut per_question: BTreeMap<String, (i64, i64)> = BTreeMap::new();
        let mut rows = sqlx::query_as::<_, (Option<Decimal>, JsonValue)>(
            r#"SELECT percentage, answers FROM test_attempts WHERE test_id = $1 AND status = 'completed'"#,
        )
        .bind(test.id)
        .fetch(&self.pool);

        while let Some((percentage, answers)) = rows.try_next().await? {
            let p = percentage.and_then(|d| d.to_f64()).unwrap_or(0.0);
            histogram[percentage_bucket(p)] += 1;

            let answers: Vec<Answer> = serde_json::from_value(answers).unwrap_or_default();
            for answer in answers {
                let stat = per_question.entry(answer.question_id).or_insert((0, 0));
                stat.0 += 1;
                if answer.is_correct {
                    stat.1 += 1;
                }
            }
        }

        let question_accuracy = per_question
            .into_iter()
            .map(|(question_id, (attempted, correct))| QuestionAccuracy {
                question_id,
                attempted,
                correct,
                accuracy: if attempted > 0 {
                    correct as f64 / attempted as f64
                } else {
                    0.0
                },
            })
            .collect();

        Ok(TestAnalytics {
            test_id: test.id,
            completed_attempts,
            highest_score: highest,
            average_score: average,
            percentage_histogram: histogram,
            question_accuracy,
            leaderboard: self.leaderboard(test.id).await?,
        })
    }

    /// Batch-relative view for one student across the given tests: their
    /// completed attempts against the batch highest and average, with a
    /// strictly-higher-count rank (ties share the rank) and the capped
    /// leaderboard.
    pub async fn student_overview(
        &self,
        tests: &[Test],
        student: &StudentProfile,
    ) -> Result<StudentOverview> {
        let mut comparisons = Vec::new();
        for test in tests {
            let mine = sqlx::query_as::<_, (Option<Decimal>, Option<Decimal>)>(
                r#"
                SELECT score, percentage FROM test_attempts
                WHERE test_id = $1 AND student_phone = $2 AND status = 'completed'
                "#,
            )
            .bind(test.id)
            .bind(&student.phone)
            .fetch_optional(&self.pool)
            .await?;

            let Some((score, percentage)) = mine else {
                continue;
            };
            let my_score = score.and_then(|d| d.to_f64()).unwrap_or(0.0);

            let (_, batch_highest, batch_average) = self.score_summary(test.id).await?;

            comparisons.push(StudentTestComparison {
                test_id: test.id,
                title: test.title.clone(),
                my_score,
                my_percentage: percentage.and_then(|d| d.to_f64()).unwrap_or(0.0),
                batch_highest,
                batch_average,
                rank: self.rank(test.id, my_score).await?,
                leaderboard: self.leaderboard(test.id).await?,
            });
        }

        Ok(StudentOverview {
            student_phone: student.phone.clone(),
            tests: comparisons,
        })
    }

    /// Rank = 1 + number of strictly higher scores, so tied students share
    /// a rank and the next distinct score drops by the size of the tie.
    pub async fn rank(&self, test_id: Uuid, score: f64) -> Result<i64> {
        let higher: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM test_attempts
            WHERE test_id = $1 AND status = 'completed' AND score > $2
            "#,
        )
        .bind(test_id)
        .bind(Decimal::from_f64_retain(score).unwrap_or_default())
        .fetch_one(&self.pool)
        .await?;
        Ok(higher + 1)
    }

    async fn score_summary(&self, test_id: Uuid) -> Result<(i64, f64, f64)> {
        let (count, highest, average) =
            sqlx::query_as::<_, (i64, Option<Decimal>, Option<Decimal>)>(
                r#"
                SELECT COUNT(*), MAX(score), AVG(score) FROM test_attempts
                WHERE test_id = $1 AND status = 'completed'
                "#,
            )
            .bind(test_id)
            .fetch_one(&self.pool)
            .await?;
        Ok((
            count,
            highest.and_then(|d| d.to_f64()).unwrap_or(0.0),
            average.and_then(|d| d.to_f64()).unwrap_or(0.0),
        ))
    }

    async fn leaderboard(&self, test_id: Uuid) -> Result<Vec<LeaderboardEntry>> {
        let rows = sqlx::query_as::<_, (String, String, Option<Decimal>, Option<Decimal>)>(
            r#"
            SELECT student_name, student_phone, score, percentage FROM test_attempts
            WHERE test_id = $1 AND status = 'completed'
            ORDER BY score DESC NULLS LAST
            LIMIT 10
            "#,
        )
        .bind(test_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(student_name, student_phone, score, percentage)| LeaderboardEntry {
                    student_name,
                    student_phone,
                    score: score.and_then(|d| d.to_f64()).unwrap_or(0.0),
                    percentage: percentage.and_then(|d| d.to_f64()).unwrap_or(0.0),
                },
            )
            .collect())
    }
}

/// Fixed ten-point-wide buckets: [0-9], [10-19], ... [90-99], with 100
/// clamped into the top bucket.
pub fn percentage_bucket(percentage: f64) -> usize {
    ((percentage / 10.0).floor() as usize).min(9)
}

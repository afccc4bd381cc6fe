use std::env;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    routing::get,
    Router,
};
use chrono::{Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use serde_json::{json, Value as JsonValue};
use tower::ServiceExt;
use uuid::Uuid;

use institute_backend::dto::staff_dto::{CreateTestPayload, DeployTestPayload, UpdateTestPayload};
use institute_backend::dto::student_dto::SaveAnswerRequest;
use institute_backend::error::Error;
use institute_backend::middleware::auth::Claims;
use institute_backend::models::question::{
    ChoiceDetails, FillBlankDetails, Question, QuestionDetails, QuestionType,
};
use institute_backend::models::student::StudentProfile;
use institute_backend::services::regrade_service::{GraceUpdate, RegradeService};
use institute_backend::services::sweeper_service::SweeperService;

fn mcq_question() -> Question {
    Question {
        id: String::new(),
        question_type: QuestionType::Mcq,
        text: "Pick the third option".to_string(),
        marks: 4.0,
        negative_marks: 1.0,
        is_grace: false,
        details: QuestionDetails::Choice(ChoiceDetails {
            options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            correct_indices: vec![2],
        }),
    }
}

fn range_question() -> Question {
    Question {
        id: String::new(),
        question_type: QuestionType::FillBlank,
        text: "A number between 10 and 20".to_string(),
        marks: 6.0,
        negative_marks: 0.0,
        is_grace: false,
        details: QuestionDetails::FillBlank(FillBlankDetails {
            fill_blank_answer: String::new(),
            case_sensitive: false,
            is_number_range: true,
            number_range_min: Some(10.0),
            number_range_max: Some(20.0),
        }),
    }
}

fn student(phone: &str, batch: &str) -> StudentProfile {
    StudentProfile {
        name: format!("Student {}", phone),
        phone: phone.to_string(),
        batches: vec![batch.to_string()],
        created_at: Utc::now() - Duration::days(30),
    }
}

fn staff_token(secret: &str) -> String {
    let claims = Claims {
        sub: "staff@example.com".to_string(),
        exp: (Utc::now() + Duration::hours(2)).timestamp() as usize,
        role: Some("admin".to_string()),
        phone: None,
    };
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("encode token")
}

#[tokio::test]
async fn attempt_flow_end_to_end() {
    if env::var("DATABASE_URL").is_err() {
        eprintln!("skipping attempt_flow_end_to_end: DATABASE_URL not set");
        return;
    }
    dotenvy::dotenv().ok();
    env::set_var("SERVER_ADDRESS", "127.0.0.1:0");
    env::set_var("JWT_SECRET", "test_secret_key");
    env::set_var("ROSTER_API_URL", "http://localhost:9");
    env::set_var("STAFF_RPS", "100");
    env::set_var("STUDENT_RPS", "100");
    env::set_var("SWEEP_INTERVAL_SECS", "60");

    let _ = institute_backend::config::init_config();
    let pool = institute_backend::database::pool::create_pool()
        .await
        .expect("pool");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations");

    let batch = format!("batch-{}", Uuid::new_v4());
    let state = institute_backend::AppState::new(pool.clone());

    let test = state
        .test_service
        .create_test(
            CreateTestPayload {
                title: "Unit Test".to_string(),
                description: None,
                questions: Some(vec![mcq_question(), range_question()]),
                duration_minutes: 30,
                passing_percentage: Some(40.0),
                questions_per_student: None,
                show_results: Some(true),
                show_results_immediately: Some(true),
            },
            "staff@example.com",
        )
        .await
        .expect("create test");
    assert_eq!(test.status, "draft");
    assert_eq!(test.total_marks.to_f64().unwrap(), 10.0);

    let test = state
        .test_service
        .deploy(
            &test,
            &DeployTestPayload {
                batches: vec![batch.clone()],
                start_time: Utc::now() - Duration::minutes(5),
                end_time: Utc::now() + Duration::hours(2),
                duration_minutes: None,
            },
        )
        .await
        .expect("deploy");
    assert_eq!(test.status, "deployed");

    // first student answers everything correctly and submits
    let alice = student("9000000001", &batch);
    state
        .attempt_service
        .save_answer(
            &test,
            &alice,
            &SaveAnswerRequest {
                question_id: "q1".to_string(),
                answer: json!(2),
            },
        )
        .await
        .expect("save q1");
    state
        .attempt_service
        .save_answer(
            &test,
            &alice,
            &SaveAnswerRequest {
                question_id: "q2".to_string(),
                answer: json!(15),
            },
        )
        .await
        .expect("save q2");

    let attempt = state
        .attempt_service
        .submit(&test, &alice)
        .await
        .expect("submit");
    assert_eq!(attempt.status, "completed");
    assert_eq!(attempt.score.unwrap().to_f64().unwrap(), 10.0);
    assert_eq!(attempt.percentage.unwrap().to_f64().unwrap(), 100.0);
    assert_eq!(attempt.termination_reason.as_deref(), Some("normal"));

    // resubmission conflicts
    let resubmit = state.attempt_service.submit(&test, &alice).await;
    assert!(matches!(resubmit, Err(Error::Conflict(_))));

    // second student saves one answer and stalls past the duration
    let bob = student("9000000002", &batch);
    state
        .attempt_service
        .save_answer(
            &test,
            &bob,
            &SaveAnswerRequest {
                question_id: "q1".to_string(),
                answer: json!(2),
            },
        )
        .await
        .expect("save bob q1");
    sqlx::query("UPDATE test_attempts SET started_at = NOW() - INTERVAL '3 hours' WHERE test_id = $1 AND student_phone = $2")
        .bind(test.id)
        .bind(&bob.phone)
        .execute(&pool)
        .await
        .expect("age attempt");

    let sweeper = SweeperService::new(pool.clone());
    let swept = sweeper.sweep_test(&test).await.expect("sweep");
    assert_eq!(swept, 1);
    let swept_again = sweeper.sweep_test(&test).await.expect("sweep again");
    assert_eq!(swept_again, 0, "sweep must be idempotent");

    let bob_attempt = state
        .attempt_service
        .get_attempt(test.id, &bob.phone)
        .await
        .expect("bob attempt");
    assert_eq!(bob_attempt.status, "completed");
    assert_eq!(
        bob_attempt.termination_reason.as_deref(),
        Some("server_auto_expired")
    );
    assert_eq!(bob_attempt.score.unwrap().to_f64().unwrap(), 4.0);

    // answer-key fix: option 1 becomes correct, with 5 grace marks on top
    let mut fixed_mcq = mcq_question();
    if let QuestionDetails::Choice(ref mut c) = fixed_mcq.details {
        c.correct_indices = vec![1];
    }
    let updated = state
        .test_service
        .update_test(
            test.id,
            &UpdateTestPayload {
                title: None,
                description: None,
                questions: Some(vec![fixed_mcq, range_question()]),
                duration_minutes: None,
                passing_percentage: None,
                questions_per_student: None,
                show_results: None,
                show_results_immediately: None,
                grace_marks: Some(5.0),
                grace_reason: Some("Faulty question".to_string()),
            },
        )
        .await
        .expect("edit questions");

    let regrade = RegradeService::new(pool.clone());
    let regraded = regrade
        .regrade_test(
            &updated,
            &GraceUpdate {
                grace_marks: 5.0,
                grace_reason: Some("Faulty question".to_string()),
            },
        )
        .await
        .expect("regrade");
    assert_eq!(regraded, 2);

    // alice's mcq is now wrong (-1), range still right (+6), grace +5
    let alice_attempt = state
        .attempt_service
        .get_attempt(test.id, &alice.phone)
        .await
        .expect("alice attempt");
    assert_eq!(alice_attempt.score.unwrap().to_f64().unwrap(), 10.0);
    assert_eq!(alice_attempt.grace_marks.to_f64().unwrap(), 5.0);

    // re-grading again without grace resets it to zero
    let regraded = regrade
        .regrade_test(&updated, &GraceUpdate::default())
        .await
        .expect("regrade without grace");
    assert_eq!(regraded, 2);
    let alice_attempt = state
        .attempt_service
        .get_attempt(test.id, &alice.phone)
        .await
        .expect("alice attempt after reset");
    assert_eq!(alice_attempt.grace_marks.to_f64().unwrap(), 0.0);
    assert_eq!(alice_attempt.score.unwrap().to_f64().unwrap(), 5.0);
    assert_eq!(alice_attempt.percentage.unwrap().to_f64().unwrap(), 50.0);

    // staff surface over HTTP: authorized list works, missing token is 401
    let config = institute_backend::config::get_config();
    let app = Router::new()
        .route(
            "/api/staff/tests",
            get(institute_backend::routes::staff::list_tests),
        )
        .layer(axum::middleware::from_fn(
            institute_backend::middleware::auth::require_staff,
        ))
        .with_state(state.clone());

    let req = Request::builder()
        .method("GET")
        .uri("/api/staff/tests")
        .header(
            "authorization",
            format!("Bearer {}", staff_token(&config.jwt_secret)),
        )
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
    let body: JsonValue = serde_json::from_slice(&bytes).unwrap();
    assert!(body["total"].as_i64().unwrap() >= 1);

    let req = Request::builder()
        .method("GET")
        .uri("/api/staff/tests")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

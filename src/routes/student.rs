use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Extension, Json,
};
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::student_dto::{
        AnswerReview, AttemptResultResponse, SaveAnswerRequest, SaveAnswerResponse,
        StudentTestSummary, SubmitTestResponse,
    },
    error::{Error, Result},
    middleware::auth::Claims,
    models::student::StudentProfile,
    models::test::Test,
    services::eligibility_service::EligibilityService,
    services::grading_service::GradingService,
    AppState,
};

fn student_phone(claims: &Claims) -> Result<&str> {
    claims
        .phone
        .as_deref()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| Error::Unauthorized("Missing student identity".to_string()))
}

/// A test only exists for a student when it was deployed to one of their
/// batches; anything else reads as absent, not forbidden.
async fn load_targeted_test(
    state: &AppState,
    test_id: Uuid,
    profile: &StudentProfile,
) -> Result<Test> {
    let test = state.test_service.get_test(test_id).await?;
    if test.status == "draft" {
        return Err(Error::NotFound("Test not found".to_string()));
    }
    let targeted = test
        .batch_names()
        .iter()
        .any(|b| profile.batches.contains(b));
    if !targeted {
        return Err(Error::NotFound("Test not found".to_string()));
    }
    Ok(test)
}

#[axum::debug_handler]
pub async fn list_tests(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse> {
    let phone = student_phone(&claims)?;
    let profile = state.roster_service.student_profile(phone).await?;
    let tests = state.test_service.list_for_batches(&profile.batches).await?;

    let now = Utc::now();
    let mut items = Vec::with_capacity(tests.len());
    for test in tests {
        let attempt = state
            .attempt_service
            .find_attempt(test.id, &profile.phone)
            .await?;
        let availability = EligibilityService::classify(
            profile.created_at,
            test.start_time,
            test.end_time,
            attempt.as_ref().map(|a| a.status.as_str()),
            now,
        );

        let visible = test.results_visible(now);
        let (score, percentage) = match &attempt {
            Some(a) if a.status == "completed" && visible => (
                a.score.and_then(|d| d.to_f64()),
                a.percentage.and_then(|d| d.to_f64()),
            ),
            _ => (None, None),
        };

        let served = match &attempt {
            Some(a) => a.served_questions(&test),
            None => test.question_bank(),
        };
        items.push(StudentTestSummary {
            test_id: test.id,
            title: test.title,
            description: test.description,
            start_time: test.start_time,
            end_time: test.end_time,
            duration_minutes: test.duration_minutes,
            total_questions: GradingService::leaf_questions(&served).len(),
            availability,
            score,
            percentage,
        });
    }

    Ok(Json(items))
}

#[axum::debug_handler]
pub async fn save_answer(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(test_id): Path<Uuid>,
    Json(req): Json<SaveAnswerRequest>,
) -> Result<impl IntoResponse> {
    req.validate()?;
    let phone = student_phone(&claims)?;
    let profile = state.roster_service.student_profile(phone).await?;
    let test = load_targeted_test(&state, test_id, &profile).await?;

    let question_id = req.question_id.clone();
    let attempt = state.attempt_service.save_answer(&test, &profile, &req).await?;
    Ok(Json(SaveAnswerResponse {
        saved: true,
        question_id,
        timestamp: attempt.updated_at.unwrap_or_else(Utc::now),
    }))
}

#[axum::debug_handler]
pub async fn submit_test(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(test_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let phone = student_phone(&claims)?;
    let profile = state.roster_service.student_profile(phone).await?;
    let test = load_targeted_test(&state, test_id, &profile).await?;

    let attempt = state.attempt_service.submit(&test, &profile).await?;
    tracing::info!(attempt_id = %attempt.id, test_id = %test.id, "attempt submitted");

    let visible = test.results_visible(Utc::now());
    let (score, total_marks, percentage, passed) = if visible {
        let passed = attempt.percentage.map(|p| p >= test.passing_percentage);
        (
            attempt.score.and_then(|d| d.to_f64()),
            attempt.total_marks.and_then(|d| d.to_f64()),
            attempt.percentage.and_then(|d| d.to_f64()),
            passed,
        )
    } else {
        (None, None, None, None)
    };

    let message = if visible {
        "Test submitted successfully.".to_string()
    } else {
        "Test submitted successfully. Results will be published by your institute.".to_string()
    };

    Ok(Json(SubmitTestResponse {
        attempt_id: attempt.id,
        status: attempt.status,
        score,
        total_marks,
        percentage,
        passed,
        show_results: visible,
        message,
    }))
}

#[axum::debug_handler]
pub async fn get_result(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(test_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let phone = student_phone(&claims)?;
    let profile = state.roster_service.student_profile(phone).await?;
    let test = load_targeted_test(&state, test_id, &profile).await?;

    let attempt = state
        .attempt_service
        .get_attempt(test.id, &profile.phone)
        .await?;
    if attempt.status != "completed" {
        return Err(Error::Conflict(
            "Test has not been submitted yet".to_string(),
        ));
    }

    // scores stay stored in full; only the response is redacted while the
    // visibility rules keep results hidden
    let visible = test.results_visible(Utc::now());
    let answers = attempt
        .answer_list()
        .into_iter()
        .map(|a| AnswerReview {
            question_id: a.question_id,
            answer: a.answer,
            is_correct: visible.then_some(a.is_correct),
            marks_awarded: visible.then_some(a.marks_awarded),
            adjustment_marks: if visible { a.adjustment_marks } else { None },
        })
        .collect();

    let passed = visible
        .then(|| attempt.percentage.map(|p| p >= test.passing_percentage))
        .flatten();

    Ok(Json(AttemptResultResponse {
        attempt_id: attempt.id,
        test_id: test.id,
        title: test.title,
        status: attempt.status,
        submitted_at: attempt.submitted_at,
        termination_reason: attempt.termination_reason,
        results_visible: visible,
        score: if visible {
            attempt.score.and_then(|d| d.to_f64())
        } else {
            None
        },
        total_marks: if visible {
            attempt.total_marks.and_then(|d| d.to_f64())
        } else {
            None
        },
        percentage: if visible {
            attempt.percentage.and_then(|d| d.to_f64())
        } else {
            None
        },
        passed,
        grace_marks: if visible {
            attempt.grace_marks.to_f64()
        } else {
            None
        },
        grace_reason: if visible { attempt.grace_reason } else { None },
        answers,
    }))
}

#[axum::debug_handler]
pub async fn student_analytics(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse> {
    let phone = student_phone(&claims)?;
    let profile = state.roster_service.student_profile(phone).await?;
    let tests = state.test_service.list_for_batches(&profile.batches).await?;
    let overview = state
        .analytics_service
        .student_overview(&tests, &profile)
        .await?;
    Ok(Json(overview))
}

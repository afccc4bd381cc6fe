use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::staff_dto::{
        AdjustMarksPayload, CreateTestPayload, DeployTestPayload, ListAttemptsQuery,
        ListTestsQuery, ReassignTestPayload, SweepResponse, UpdateTestPayload,
    },
    error::Result,
    middleware::auth::Claims,
    services::regrade_service::GraceUpdate,
    services::test_service::TestFilter,
    AppState,
};

#[utoipa::path(
    post,
    path = "/api/staff/tests",
    request_body = CreateTestPayload,
    responses(
        (status = 201, description = "Test created as a draft"),
        (status = 400, description = "Invalid payload")
    )
)]
#[axum::debug_handler]
pub async fn create_test(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateTestPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let test = state.test_service.create_test(payload, &claims.sub).await?;
    Ok((StatusCode::CREATED, Json(test)))
}

pub async fn list_tests(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<ListTestsQuery>,
) -> Result<impl IntoResponse> {
    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(10).clamp(1, 100);

    let filter = TestFilter {
        status: query.status,
        created_by: if claims.is_admin() {
            None
        } else {
            Some(claims.sub.clone())
        },
        search: query.search,
    };

    let result = state.test_service.list_tests(page, per_page, filter).await?;
    Ok(Json(result))
}

pub async fn get_test(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let test = state
        .test_service
        .get_owned_test(id, &claims.sub, claims.is_admin())
        .await?;
    Ok(Json(test))
}

/// Question edits on a deployed test kick off the re-grading pipeline over
/// every completed attempt; the grace fields of the payload are written as
/// given (absent = zero) on that pass.
#[utoipa::path(
    patch,
    path = "/api/staff/tests/{id}",
    params(
        ("id" = Uuid, Path, description = "Test ID")
    ),
    request_body = UpdateTestPayload,
    responses(
        (status = 200, description = "Test updated; completed attempts re-graded when questions changed"),
        (status = 404, description = "Test not found or not owned by the caller")
    )
)]
#[axum::debug_handler]
pub async fn update_test(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateTestPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let test = state
        .test_service
        .get_owned_test(id, &claims.sub, claims.is_admin())
        .await?;
    let updated = state.test_service.update_test(id, &payload).await?;

    let regraded = if payload.questions.is_some() && test.status == "deployed" {
        let grace = GraceUpdate {
            grace_marks: payload.grace_marks.unwrap_or(0.0),
            grace_reason: payload.grace_reason.clone(),
        };
        state.regrade_service.regrade_test(&updated, &grace).await?
    } else {
        0
    };

    Ok(Json(json!({
        "test": updated,
        "regraded_attempts": regraded,
    })))
}

pub async fn delete_test(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let test = state
        .test_service
        .get_owned_test(id, &claims.sub, claims.is_admin())
        .await?;
    state.test_service.delete_test(&test).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/staff/tests/{id}/deploy",
    params(
        ("id" = Uuid, Path, description = "Test ID")
    ),
    request_body = DeployTestPayload,
    responses(
        (status = 200, description = "Test deployed to the targeted batches"),
        (status = 400, description = "Invalid window"),
        (status = 409, description = "Test is not a draft")
    )
)]
#[axum::debug_handler]
pub async fn deploy_test(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DeployTestPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let test = state
        .test_service
        .get_owned_test(id, &claims.sub, claims.is_admin())
        .await?;
    let updated = state.test_service.deploy(&test, &payload).await?;
    Ok(Json(updated))
}

pub async fn reassign_test(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReassignTestPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let test = state
        .test_service
        .get_owned_test(id, &claims.sub, claims.is_admin())
        .await?;
    let updated = state.test_service.reassign(&test, &payload).await?;
    Ok(Json(updated))
}

pub async fn adjust_marks(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AdjustMarksPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let test = state
        .test_service
        .get_owned_test(id, &claims.sub, claims.is_admin())
        .await?;
    let attempt = state
        .regrade_service
        .adjust_marks(&test, &payload.student_phone, &payload.adjustments)
        .await?;
    Ok(Json(attempt))
}

#[utoipa::path(
    post,
    path = "/api/staff/tests/{id}/sweep",
    params(
        ("id" = Uuid, Path, description = "Test ID")
    ),
    responses(
        (status = 200, description = "Expired in-progress attempts force-completed"),
        (status = 404, description = "Test not found or not owned by the caller")
    )
)]
#[axum::debug_handler]
pub async fn sweep_test(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let test = state
        .test_service
        .get_owned_test(id, &claims.sub, claims.is_admin())
        .await?;
    let completed = state.sweeper_service.sweep_test(&test).await?;
    Ok(Json(SweepResponse {
        test_id: test.id,
        completed,
    }))
}

pub async fn test_analytics(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let test = state
        .test_service
        .get_owned_test(id, &claims.sub, claims.is_admin())
        .await?;
    let analytics = state.analytics_service.test_analytics(&test).await?;
    Ok(Json(analytics))
}

/// Roster-side view of a deployed test: every student in the targeted
/// batches with the state of their attempt, so staff can see who never
/// started.
pub async fn test_roster(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let test = state
        .test_service
        .get_owned_test(id, &claims.sub, claims.is_admin())
        .await?;

    let mut seen = std::collections::HashSet::new();
    let mut students = Vec::new();
    for batch in test.batch_names() {
        for entry in state.roster_service.batch_students(&batch).await? {
            if !seen.insert(entry.phone.clone()) {
                continue;
            }
            let attempt = state.attempt_service.find_attempt(test.id, &entry.phone).await?;
            students.push(json!({
                "name": entry.name,
                "phone": entry.phone,
                "batch": &batch,
                "status": attempt
                    .map(|a| a.status)
                    .unwrap_or_else(|| "not_started".to_string()),
            }));
        }
    }

    Ok(Json(json!({
        "test_id": test.id,
        "students": students,
    })))
}

pub async fn list_attempts(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Query(query): Query<ListAttemptsQuery>,
) -> Result<impl IntoResponse> {
    let test = state
        .test_service
        .get_owned_test(id, &claims.sub, claims.is_admin())
        .await?;
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(20).clamp(1, 100);
    let (items, total) = state
        .attempt_service
        .list_attempts(test.id, query.status, page, limit)
        .await?;
    Ok(Json(json!({
        "items": items,
        "total": total,
        "page": page,
        "limit": limit,
    })))
}

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, patch, post},
    Router,
};
use institute_backend::services::sweeper_service::SweeperService;
use institute_backend::{
    config::{get_config, init_config},
    database::pool::create_pool,
    middleware, routes, AppState,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    init_config()?;
    let config = get_config();

    let pool = create_pool().await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let app_state = AppState::new(pool);

    {
        let state = app_state.clone();
        let interval = config.sweep_interval_secs;
        tokio::spawn(async move {
            let sweeper = SweeperService::new(state.pool.clone());
            loop {
                if let Err(e) = sweeper.sweep_deployed().await {
                    tracing::error!("Sweep loop error: {:?}", e);
                }
                tokio::time::sleep(Duration::from_secs(interval)).await;
            }
        });
    }

    let base_routes = Router::new().route("/health", get(routes::health::health));

    let staff_api = Router::new()
        .route(
            "/api/staff/tests",
            get(routes::staff::list_tests).post(routes::staff::create_test),
        )
        .route(
            "/api/staff/tests/:id",
            get(routes::staff::get_test)
                .patch(routes::staff::update_test)
                .delete(routes::staff::delete_test),
        )
        .route(
            "/api/staff/tests/:id/deploy",
            post(routes::staff::deploy_test),
        )
        .route(
            "/api/staff/tests/:id/reassign",
            post(routes::staff::reassign_test),
        )
        .route(
            "/api/staff/tests/:id/adjust-marks",
            post(routes::staff::adjust_marks),
        )
        .route("/api/staff/tests/:id/sweep", post(routes::staff::sweep_test))
        .route(
            "/api/staff/tests/:id/analytics",
            get(routes::staff::test_analytics),
        )
        .route(
            "/api/staff/tests/:id/attempts",
            get(routes::staff::list_attempts),
        )
        .route(
            "/api/staff/tests/:id/roster",
            get(routes::staff::test_roster),
        )
        .layer(axum::middleware::from_fn(middleware::auth::require_staff))
        .layer(axum::middleware::from_fn_with_state(
            middleware::rate_limit::SurfaceLimiter::new(config.staff_rps),
            middleware::rate_limit::rps_middleware,
        ));

    let student_api = Router::new()
        .route("/api/student/tests", get(routes::student::list_tests))
        .route(
            "/api/student/tests/:id/answer",
            patch(routes::student::save_answer),
        )
        .route(
            "/api/student/tests/:id/submit",
            post(routes::student::submit_test),
        )
        .route(
            "/api/student/tests/:id/result",
            get(routes::student::get_result),
        )
        .route(
            "/api/student/analytics",
            get(routes::student::student_analytics),
        )
        .layer(axum::middleware::from_fn(middleware::auth::require_student))
        .layer(axum::middleware::from_fn_with_state(
            middleware::rate_limit::SurfaceLimiter::new(config.student_rps),
            middleware::rate_limit::rps_middleware,
        ));

    let app = base_routes
        .merge(staff_api)
        .merge(student_api)
        .with_state(app_state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(2 * 1024 * 1024));

    let addr: SocketAddr = config.server_address.parse()?;
    info!("Server listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

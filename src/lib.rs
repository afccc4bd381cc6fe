pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use crate::services::{
    analytics_service::AnalyticsService, attempt_service::AttemptService,
    regrade_service::RegradeService, roster_service::RosterService,
    sweeper_service::SweeperService, test_service::TestService,
};
use sqlx::PgPool;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub test_service: TestService,
    pub attempt_service: AttemptService,
    pub regrade_service: RegradeService,
    pub sweeper_service: SweeperService,
    pub analytics_service: AnalyticsService,
    pub roster_service: RosterService,
}

impl AppState {
    pub fn new(pool: PgPool) -> Self {
        let config = crate::config::get_config();

        let test_service = TestService::new(pool.clone());
        let attempt_service = AttemptService::new(pool.clone());
        let regrade_service = RegradeService::new(pool.clone());
        let sweeper_service = SweeperService::new(pool.clone());
        let analytics_service = AnalyticsService::new(pool.clone());
        let roster_service = RosterService::new(config.roster_api_url.clone());

        Self {
            pool,
            test_service,
            attempt_service,
            regrade_service,
            sweeper_service,
            analytics_service,
            roster_service,
        }
    }
}

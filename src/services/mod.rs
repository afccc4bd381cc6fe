pub mod analytics_service;
pub mod attempt_service;
pub mod eligibility_service;
pub mod grading_service;
pub mod regrade_service;
pub mod roster_service;
pub mod sweeper_service;
pub mod test_service;

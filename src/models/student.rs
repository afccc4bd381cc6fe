use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Roster entry as returned by the batch listing of the roster service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterStudent {
    pub name: String,
    pub phone: String,
}

/// Full roster profile for one student. `created_at` is the join date used
/// by the eligibility resolver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentProfile {
    pub name: String,
    pub phone: String,
    pub batches: Vec<String>,
    pub created_at: DateTime<Utc>,
}

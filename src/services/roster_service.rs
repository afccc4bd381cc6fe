use reqwest::Client;

use crate::error::{Error, Result};
use crate::models::student::{RosterStudent, StudentProfile};

/// Client for the roster service that owns batch membership and student
/// join dates (a spreadsheet-backed system upstream; only this lookup
/// interface matters here).
#[derive(Clone)]
pub struct RosterService {
    client: Client,
    base_url: String,
}

impl RosterService {
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
        }
    }

    pub async fn batch_students(&self, batch: &str) -> Result<Vec<RosterStudent>> {
        let url = format!("{}/api/batches/{}/students", self.base_url, batch);
        let response = self.client.get(&url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::NotFound(format!("Batch {} not found", batch)));
        }
        let students = response.error_for_status()?.json::<Vec<RosterStudent>>().await?;
        Ok(students)
    }

    pub async fn student_profile(&self, phone: &str) -> Result<StudentProfile> {
        let url = format!("{}/api/students/{}", self.base_url, phone);
        let response = self.client.get(&url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::NotFound("Student is not on the roster".to_string()));
        }
        let profile = response.error_for_status()?.json::<StudentProfile>().await?;
        Ok(profile)
    }
}

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Where one test stands for one student right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    Upcoming,
    Available,
    Completed,
    Missed,
    NotEnrolled,
}

pub struct EligibilityService;

impl EligibilityService {
    /// Classifies a test for a student. The order of checks is load-bearing:
    /// an in_progress attempt stays available even past the end time, and a
    /// student who joined after the window opened must come out as
    /// not_enrolled rather than missed.
    pub fn classify(
        student_joined_at: DateTime<Utc>,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
        attempt_status: Option<&str>,
        now: DateTime<Utc>,
    ) -> Availability {
        match attempt_status {
            Some("completed") => return Availability::Completed,
            Some("in_progress") => return Availability::Available,
            _ => {}
        }

        if let Some(start) = start_time {
            if now < start {
                return Availability::Upcoming;
            }
        }

        match end_time {
            Some(end) if now > end => {
                if let Some(start) = start_time {
                    if student_joined_at > start {
                        return Availability::NotEnrolled;
                    }
                }
                Availability::Missed
            }
            _ => Availability::Available,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn before_the_window_is_upcoming() {
        let got = EligibilityService::classify(t(0), Some(t(10)), Some(t(12)), None, t(9));
        assert_eq!(got, Availability::Upcoming);
    }

    #[test]
    fn inside_the_window_with_no_attempt_is_available() {
        let got = EligibilityService::classify(t(0), Some(t(10)), Some(t(12)), None, t(11));
        assert_eq!(got, Availability::Available);
    }

    #[test]
    fn in_progress_attempt_stays_available_past_the_end() {
        let got =
            EligibilityService::classify(t(0), Some(t(10)), Some(t(12)), Some("in_progress"), t(13));
        assert_eq!(got, Availability::Available);
    }

    #[test]
    fn completed_attempt_wins_over_everything() {
        let got =
            EligibilityService::classify(t(0), Some(t(10)), Some(t(12)), Some("completed"), t(11));
        assert_eq!(got, Availability::Completed);
    }

    #[test]
    fn late_joiner_is_not_enrolled_rather_than_missed() {
        // joined after the window opened, never attempted, window now over
        let joined = t(10) + Duration::minutes(30);
        let got = EligibilityService::classify(joined, Some(t(10)), Some(t(12)), None, t(13));
        assert_eq!(got, Availability::NotEnrolled);
    }

    #[test]
    fn early_joiner_who_never_attempted_has_missed() {
        let got = EligibilityService::classify(t(0), Some(t(10)), Some(t(12)), None, t(13));
        assert_eq!(got, Availability::Missed);
    }

    #[test]
    fn open_ended_window_never_expires() {
        let got = EligibilityService::classify(t(0), Some(t(10)), None, None, t(23));
        assert_eq!(got, Availability::Available);
    }
}

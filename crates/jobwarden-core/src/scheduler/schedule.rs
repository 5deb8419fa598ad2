//! Schedule expression evaluation
//!
//! Jobs carry a cron expression. Three forms are accepted:
//!
//! - standard 5-field Unix cron (`min hour dom month dow`), run at second 0
//! - 6/7-field cron with a leading seconds field (and optional year)
//! - descriptors such as `@daily` or `@hourly`
//!
//! The `cron` crate wants the seconds field, so 5-field input is widened
//! before parsing.

use chrono::{DateTime, Utc};
use cron::Schedule;
use std::str::FromStr;

use super::types::{Result, SchedulerError};

/// Parsed schedule for a job
#[derive(Debug, Clone)]
pub struct JobSchedule {
    expression: String,
    schedule: Schedule,
}

impl JobSchedule {
    /// Parse a schedule expression
    pub fn parse(expression: &str) -> Result<Self> {
        let normalized = normalize_expression(expression);
        let schedule = Schedule::from_str(&normalized).map_err(|e| {
            SchedulerError::InvalidSchedule(format!("'{}': {}", expression, e))
        })?;
        Ok(Self {
            expression: expression.to_string(),
            schedule,
        })
    }

    /// First instant strictly after `from`
    pub fn next_after(&self, from: DateTime<Utc>) -> Result<DateTime<Utc>> {
        self.schedule.after(&from).next().ok_or_else(|| {
            SchedulerError::InvalidSchedule(format!("'{}' has no upcoming run", self.expression))
        })
    }

    /// The expression as supplied
    pub fn expression(&self) -> &str {
        &self.expression
    }
}

/// Validate an expression without keeping the parsed schedule
pub fn validate_expression(expression: &str) -> Result<()> {
    JobSchedule::parse(expression).map(|_| ())
}

fn normalize_expression(expression: &str) -> String {
    let trimmed = expression.trim();
    if trimmed.starts_with('@') {
        return trimmed.to_string();
    }
    let fields = trimmed.split_whitespace().count();
    if fields == 5 {
        format!("0 {}", trimmed)
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn test_normalize_expression() {
        assert_eq!(normalize_expression("* * * * *"), "0 * * * * *");
        assert_eq!(normalize_expression("*/5 * * * * *"), "*/5 * * * * *");
        assert_eq!(normalize_expression(" @daily "), "@daily");
    }

    #[test]
    fn test_five_field_runs_on_minute_boundary() {
        let schedule = JobSchedule::parse("*/10 * * * *").unwrap();
        let from = Utc.with_ymd_and_hms(2024, 5, 1, 12, 3, 27).unwrap();
        let next = schedule.next_after(from).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 5, 1, 12, 10, 0).unwrap());
    }

    #[test]
    fn test_seconds_field() {
        let schedule = JobSchedule::parse("*/15 * * * * *").unwrap();
        let from = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 15).unwrap();
        let next = schedule.next_after(from).unwrap();
        assert!(next > from);
        assert_eq!(next.second(), 30);
    }

    #[test]
    fn test_descriptor() {
        let schedule = JobSchedule::parse("@daily").unwrap();
        let from = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let next = schedule.next_after(from).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_invalid_expression() {
        let result = JobSchedule::parse("not a schedule");
        assert!(matches!(result, Err(SchedulerError::InvalidSchedule(_))));
        assert!(validate_expression("61 * * * *").is_err());
        assert!(validate_expression("0 3 * * *").is_ok());
    }
}

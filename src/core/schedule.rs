//! Trigger schedules for scan jobs.
//!
//! Polling jobs mostly use fixed intervals (`@every 5s`), but cron
//! expressions (5 or 6 fields, evaluated in UTC) and the usual `@hourly`
//! style shortcuts are accepted too.

use chrono::{DateTime, Utc};
use cron::Schedule as CronSchedule;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when parsing or using schedules.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// Invalid cron expression.
    #[error("invalid cron expression: {0}")]
    InvalidCron(String),

    /// Invalid interval expression.
    #[error("invalid interval expression: {0}")]
    InvalidInterval(String),

    /// No more occurrences.
    #[error("no more occurrences")]
    NoMoreOccurrences,
}

#[derive(Debug, Clone)]
enum Trigger {
    Cron(Box<CronSchedule>),
    Every(Duration),
}

/// A parsed schedule.
#[derive(Debug, Clone)]
pub struct Schedule {
    expression: String,
    trigger: Trigger,
}

impl Schedule {
    /// Parse a schedule expression.
    pub fn new(expression: impl Into<String>) -> Result<Self, ScheduleError> {
        let expression = expression.into();
        let trigger = parse_trigger(expression.trim())?;
        Ok(Self {
            expression,
            trigger,
        })
    }

    /// A fixed-interval schedule.
    pub fn every(interval: Duration) -> Result<Self, ScheduleError> {
        if interval.is_zero() {
            return Err(ScheduleError::InvalidInterval("interval must be positive".into()));
        }
        Ok(Self {
            expression: format!("@every {}ms", interval.as_millis()),
            trigger: Trigger::Every(interval),
        })
    }

    /// The original expression.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// The interval, for `@every` schedules.
    pub fn interval(&self) -> Option<Duration> {
        match &self.trigger {
            Trigger::Every(d) => Some(*d),
            Trigger::Cron(_) => None,
        }
    }

    /// The first occurrence strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Result<DateTime<Utc>, ScheduleError> {
        match &self.trigger {
            Trigger::Cron(schedule) => schedule
                .after(&after)
                .next()
                .ok_or(ScheduleError::NoMoreOccurrences),
            Trigger::Every(interval) => {
                let step = chrono::Duration::from_std(*interval)
                    .map_err(|e| ScheduleError::InvalidInterval(e.to_string()))?;
                after
                    .checked_add_signed(step)
                    .ok_or(ScheduleError::NoMoreOccurrences)
            }
        }
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

fn parse_trigger(expression: &str) -> Result<Trigger, ScheduleError> {
    let lower = expression.to_lowercase();
    let cron = match lower.as_str() {
        "@yearly" | "@annually" => "0 0 1 1 *",
        "@monthly" => "0 0 1 * *",
        "@weekly" => "0 0 * * SUN",
        "@daily" | "@midnight" => "0 0 * * *",
        "@hourly" => "0 * * * *",
        s if s.starts_with("@every ") => {
            return parse_duration(s["@every ".len()..].trim()).map(Trigger::Every);
        }
        s if s.starts_with('@') => {
            return Err(ScheduleError::InvalidCron(format!(
                "unknown shortcut: {}",
                expression
            )));
        }
        _ => expression,
    };
    parse_cron(cron)
}

fn parse_cron(expression: &str) -> Result<Trigger, ScheduleError> {
    let fields = expression.split_whitespace().count();
    let expression = match fields {
        5 => format!("0 {}", expression),
        6 => expression.to_string(),
        n => {
            return Err(ScheduleError::InvalidCron(format!(
                "expected 5 or 6 fields, got {}",
                n
            )));
        }
    };
    CronSchedule::from_str(&expression)
        .map(|s| Trigger::Cron(Box::new(s)))
        .map_err(|e| ScheduleError::InvalidCron(e.to_string()))
}

/// Parse durations like `500ms`, `30s`, `5m`, `1h30m`, `1d`.
pub(crate) fn parse_duration(s: &str) -> Result<Duration, ScheduleError> {
    let invalid = || ScheduleError::InvalidInterval(s.to_string());
    let mut total = Duration::ZERO;
    let mut rest = s;

    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit()).ok_or_else(invalid)?;
        if digits == 0 {
            return Err(invalid());
        }
        let value: u64 = rest[..digits].parse().map_err(|_| invalid())?;
        rest = &rest[digits..];

        let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let unit = match &rest[..unit_len] {
            "ms" => Duration::from_millis(value),
            "s" => Duration::from_secs(value),
            "m" => Duration::from_secs(value.checked_mul(60).ok_or_else(invalid)?),
            "h" => Duration::from_secs(value.checked_mul(3600).ok_or_else(invalid)?),
            "d" => Duration::from_secs(value.checked_mul(86400).ok_or_else(invalid)?),
            _ => return Err(invalid()),
        };
        total = total.checked_add(unit).ok_or_else(invalid)?;
        rest = &rest[unit_len..];
    }

    if total.is_zero() {
        return Err(invalid());
    }
    Ok(total)
}

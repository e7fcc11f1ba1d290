//! Lifecycle settings resolved once from configuration, plus local-day arithmetic

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;

use crate::{
    config::LifecycleConfig,
    error::{AppError, AppResult},
    models::visit::DayWindow,
};

#[derive(Debug, Clone)]
pub struct LifecyclePolicy {
    pub timezone: Tz,
    /// Ascending reminder thresholds, in minutes since arrival
    pub reminder_intervals: Vec<i64>,
    pub reminder_window_minutes: i64,
    pub end_of_day: NaiveTime,
    pub default_duration_minutes: i32,
    pub max_duration_minutes: i32,
    pub still_here_extension_minutes: i32,
    pub qr_token_bytes: usize,
    pub action_token_bytes: usize,
    pub max_token_attempts: u32,
    pub arrival_token_validity: Duration,
    pub reminder_token_validity: Duration,
    pub supervisor_emails: Vec<String>,
    /// `None` keeps departed visits forever
    pub retention: Option<Duration>,
}

impl LifecyclePolicy {
    pub fn from_config(config: &LifecycleConfig) -> AppResult<Self> {
        let timezone: Tz = config
            .timezone
            .parse()
            .map_err(|e| AppError::Internal(format!("Invalid timezone '{}': {}", config.timezone, e)))?;

        let end_of_day = NaiveTime::parse_from_str(&config.end_of_day_time, "%H:%M").map_err(|e| {
            AppError::Internal(format!(
                "Invalid end of day time '{}': {}",
                config.end_of_day_time, e
            ))
        })?;

        if config.max_duration_minutes < 1 {
            return Err(AppError::Internal(
                "max_duration_minutes must be positive".to_string(),
            ));
        }

        let mut reminder_intervals: Vec<i64> = config
            .reminder_intervals
            .iter()
            .copied()
            .filter(|i| *i > 0)
            .collect();
        reminder_intervals.sort_unstable();
        reminder_intervals.dedup();

        let supervisor_emails = config
            .supervisor_emails
            .iter()
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .collect();

        Ok(Self {
            timezone,
            reminder_intervals,
            reminder_window_minutes: config.reminder_window_minutes,
            end_of_day,
            default_duration_minutes: config
                .default_duration_minutes
                .clamp(1, config.max_duration_minutes),
            max_duration_minutes: config.max_duration_minutes,
            still_here_extension_minutes: config.still_here_extension_minutes,
            qr_token_bytes: config.qr_token_bytes,
            action_token_bytes: config.action_token_bytes,
            max_token_attempts: config.max_token_attempts.max(1),
            arrival_token_validity: Duration::hours(config.arrival_token_validity_hours),
            reminder_token_validity: Duration::hours(config.reminder_token_validity_hours),
            supervisor_emails,
            retention: (config.retention_days > 0).then(|| Duration::days(config.retention_days)),
        })
    }

    /// Requested duration if within `[1, max]`, the default otherwise
    pub fn clamp_duration(&self, requested: Option<i32>) -> i32 {
        match requested {
            Some(minutes) if (1..=self.max_duration_minutes).contains(&minutes) => minutes,
            _ => self.default_duration_minutes,
        }
    }

    pub fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.timezone).date_naive()
    }

    /// Local wall-clock instant as UTC. A time skipped by a DST jump falls back to UTC.
    pub fn local_instant(&self, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
        let naive = date.and_time(time);
        naive
            .and_local_timezone(self.timezone)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| naive.and_utc())
    }

    pub fn date_window(&self, date: NaiveDate) -> DayWindow {
        let next = date.succ_opt().unwrap_or(date);
        DayWindow {
            start: self.local_instant(date, NaiveTime::MIN),
            end: self.local_instant(next, NaiveTime::MIN),
        }
    }

    /// Local calendar day containing `at`
    pub fn day_window(&self, at: DateTime<Utc>) -> DayWindow {
        self.date_window(self.local_date(at))
    }

    /// Monday 00:00 local of the week containing `at`
    pub fn week_start(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        let date = self.local_date(at);
        let monday = date - Duration::days(date.weekday().num_days_from_monday() as i64);
        self.local_instant(monday, NaiveTime::MIN)
    }

    pub fn end_of_day_instant(&self, date: NaiveDate) -> DateTime<Utc> {
        self.local_instant(date, self.end_of_day)
    }

    pub fn is_after_end_of_day(&self, at: DateTime<Utc>) -> bool {
        at >= self.end_of_day_instant(self.local_date(at))
    }

    pub fn format_local(&self, at: DateTime<Utc>, fmt: &str) -> String {
        at.with_timezone(&self.timezone).format(fmt).to_string()
    }
}

impl Default for LifecyclePolicy {
    /// Default settings in UTC
    fn default() -> Self {
        let config = LifecycleConfig::default();
        Self {
            timezone: Tz::UTC,
            reminder_intervals: config.reminder_intervals,
            reminder_window_minutes: config.reminder_window_minutes,
            end_of_day: NaiveTime::from_hms_opt(18, 0, 0).unwrap_or(NaiveTime::MIN),
            default_duration_minutes: config.default_duration_minutes,
            max_duration_minutes: config.max_duration_minutes,
            still_here_extension_minutes: config.still_here_extension_minutes,
            qr_token_bytes: config.qr_token_bytes,
            action_token_bytes: config.action_token_bytes,
            max_token_attempts: config.max_token_attempts,
            arrival_token_validity: Duration::hours(config.arrival_token_validity_hours),
            reminder_token_validity: Duration::hours(config.reminder_token_validity_hours),
            supervisor_emails: config.supervisor_emails,
            retention: Some(Duration::days(config.retention_days)),
        }
    }
}

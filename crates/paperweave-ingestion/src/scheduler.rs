//! Daily trigger loop for the incremental sync.
//!
//! One run at a time. A trigger that passes while a run is still executing
//! is skipped; the loop waits for the next trigger after the run finishes.

use async_trait::async_trait;
use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use paperweave_common::clock::Clock;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::error::SyncError;
use crate::sync::{SyncOrchestrator, SyncReport};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("invalid schedule time {0:?}, expected HH:MM")]
    InvalidTime(String),
    #[error("unknown timezone {0:?}")]
    UnknownTimezone(String),
}

/// A wall-clock time of day in an IANA timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailySchedule {
    time: NaiveTime,
    tz: Tz,
}

impl DailySchedule {
    pub fn new(time: NaiveTime, tz: Tz) -> Self {
        Self { time, tz }
    }

    pub fn parse(time: &str, timezone: &str) -> Result<Self, ScheduleError> {
        let time = NaiveTime::parse_from_str(time.trim(), "%H:%M")
            .map_err(|_| ScheduleError::InvalidTime(time.to_string()))?;
        let tz: Tz = timezone
            .trim()
            .parse()
            .map_err(|_| ScheduleError::UnknownTimezone(timezone.to_string()))?;
        Ok(Self { time, tz })
    }

    /// The trigger instant on a given local date.
    ///
    /// A time that falls in a DST gap fires at the first valid instant after
    /// it; an ambiguous time fires at the earlier of its two instants.
    fn on_date(&self, date: NaiveDate) -> Option<DateTime<Utc>> {
        let mut local = date.and_time(self.time);
        // Gaps are at most a few hours; step forward a minute at a time.
        for _ in 0..=(4 * 60) {
            match self.tz.from_local_datetime(&local) {
                LocalResult::Single(t) => return Some(t.with_timezone(&Utc)),
                LocalResult::Ambiguous(a, b) => return Some(a.min(b).with_timezone(&Utc)),
                LocalResult::None => local += Duration::minutes(1),
            }
        }
        None
    }

    /// First trigger strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> DateTime<Utc> {
        let mut date = after.with_timezone(&self.tz).date_naive();
        loop {
            if let Some(t) = self.on_date(date) {
                if t > after {
                    return t;
                }
            }
            date = date.succ_opt().unwrap_or(date);
        }
    }
}

/// Work the scheduler triggers.
#[async_trait]
pub trait SyncJob: Send + Sync {
    async fn run(&self) -> Result<SyncReport, SyncError>;
}

#[async_trait]
impl SyncJob for SyncOrchestrator {
    async fn run(&self) -> Result<SyncReport, SyncError> {
        self.run_once().await
    }
}

/// What happened on one trigger.
#[derive(Debug)]
pub struct TickOutcome {
    pub fired_at: DateTime<Utc>,
    pub result: Result<SyncReport, SyncError>,
    /// Triggers that passed while the run was executing.
    pub skipped_triggers: u32,
    pub next_trigger: DateTime<Utc>,
}

pub struct Scheduler {
    schedule: DailySchedule,
    job: Arc<dyn SyncJob>,
    clock: Arc<dyn Clock>,
}

impl Scheduler {
    pub fn new(schedule: DailySchedule, job: Arc<dyn SyncJob>, clock: Arc<dyn Clock>) -> Self {
        Self { schedule, job, clock }
    }

    /// Run one sync immediately, bypassing the schedule.
    pub async fn run_now(&self) -> Result<SyncReport, SyncError> {
        self.job.run().await
    }

    /// Execute the job for a trigger that has just fired and work out the next one.
    async fn fire(&self, fired_at: DateTime<Utc>) -> TickOutcome {
        let result = self.job.run().await;
        match &result {
            Ok(report) if report.success => info!(fired_at = %fired_at, "Scheduled sync succeeded"),
            Ok(report) => warn!(errors = report.stats.errors, "Scheduled sync finished unsuccessfully"),
            Err(e) => error!(error = %e, "Scheduled sync failed"),
        }

        let finished = self.clock.now();
        let mut next = self.schedule.next_after(fired_at);
        let mut skipped_triggers = 0;
        while next <= finished {
            warn!(trigger = %next, "Run overran its next trigger; skipping it");
            skipped_triggers += 1;
            next = self.schedule.next_after(next);
        }
        TickOutcome { fired_at, result, skipped_triggers, next_trigger: next }
    }

    /// Wait for the next trigger, then run.
    pub async fn tick_once(&self) -> TickOutcome {
        let next = self.schedule.next_after(self.clock.now());
        info!(next = %next, "⏰ Waiting for next scheduled sync");
        self.clock.sleep_until(next).await;
        self.fire(next).await
    }

    /// Loop until `shutdown` resolves. Shutdown is honoured between runs,
    /// never in the middle of one.
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        tokio::pin!(shutdown);
        let mut next = self.schedule.next_after(self.clock.now());
        loop {
            info!(next = %next, "⏰ Waiting for next scheduled sync");
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested; scheduler stopping");
                    return;
                }
                _ = self.clock.sleep_until(next) => {}
            }
            next = self.fire(next).await.next_trigger;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;
    use pretty_assertions::assert_eq;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(DailySchedule::parse("23:30", "America/New_York").is_ok());
        assert_eq!(
            DailySchedule::parse("25:00", "America/New_York"),
            Err(ScheduleError::InvalidTime("25:00".into()))
        );
        assert_eq!(
            DailySchedule::parse("23:30", "Mars/Olympus_Mons"),
            Err(ScheduleError::UnknownTimezone("Mars/Olympus_Mons".into()))
        );
    }

    #[test]
    fn test_next_after_same_day_and_next_day() {
        let s = DailySchedule::parse("23:30", "America/New_York").unwrap();
        // 2025-01-15 12:00 EST = 17:00Z -> 23:30 EST = 04:30Z next day
        assert_eq!(s.next_after(utc(2025, 1, 15, 17, 0)), utc(2025, 1, 16, 4, 30));
        // exactly at the trigger -> following day
        assert_eq!(s.next_after(utc(2025, 1, 16, 4, 30)), utc(2025, 1, 17, 4, 30));
    }

    #[test]
    fn test_spring_forward_gap_fires_at_first_valid_instant() {
        // 2025-03-09 02:30 does not exist in New York; clocks jump 02:00 -> 03:00 EDT.
        let s = DailySchedule::parse("02:30", "America/New_York").unwrap();
        let t = s.next_after(utc(2025, 3, 9, 0, 0));
        assert_eq!(t, utc(2025, 3, 9, 7, 0));
        assert_eq!(t.with_timezone(&chrono_tz::America::New_York).hour(), 3);
    }

    #[test]
    fn test_fall_back_ambiguity_fires_at_earlier_instant() {
        // 2025-11-02 01:30 happens twice in New York: 05:30Z (EDT) and 06:30Z (EST).
        let s = DailySchedule::parse("01:30", "America/New_York").unwrap();
        assert_eq!(s.next_after(utc(2025, 11, 2, 0, 0)), utc(2025, 11, 2, 5, 30));
    }
}

// ⏱️ Scheduler - decides which jobs are due; the run loop executes them in order
//
// Ticks: once immediately, then every `tick_every`.
// Purge: once per calendar day, at or after `purge_at`.

use crate::publisher::{Publisher, TickOutcome};
use chrono::{Duration, Local, NaiveDate, NaiveDateTime, NaiveTime};
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    Purge,
    Tick,
}

#[derive(Debug, Clone)]
pub struct Scheduler {
    tick_every: Duration,
    purge_at: NaiveTime,
    next_tick: Option<NaiveDateTime>,
    last_purge: Option<NaiveDate>,
}

impl Scheduler {
    pub fn new(tick_every: Duration, purge_at: NaiveTime) -> Self {
        Scheduler {
            tick_every,
            purge_at,
            next_tick: None,
            last_purge: None,
        }
    }

    /// Jobs due at `now`, purge first. Marks them as done.
    pub fn due(&mut self, now: NaiveDateTime) -> Vec<Job> {
        let mut jobs = Vec::new();

        if now.time() >= self.purge_at && self.last_purge != Some(now.date()) {
            self.last_purge = Some(now.date());
            jobs.push(Job::Purge);
        }

        if self.next_tick.map_or(true, |next| now >= next) {
            self.next_tick = Some(now + self.tick_every);
            jobs.push(Job::Tick);
        }

        jobs
    }

    /// Start the day as already purged when launched after the purge time,
    /// so a restart at 23:59:30 does not wipe the channel twice
    pub fn skip_purge_today(&mut self, today: NaiveDate) {
        self.last_purge = Some(today);
    }
}

/// Run one job, logging instead of propagating: nothing here may end the process
pub fn run_job(publisher: &mut Publisher, job: Job, now: NaiveDateTime) {
    match job {
        Job::Tick => match publisher.tick(now) {
            Ok(TickOutcome::Published { meal, message_id, retired }) => {
                info!(meal = %meal, message_id = %message_id,
                    retired = ?retired.map(|r| r.message_id.to_string()), "Tick published");
            }
            Ok(outcome) => info!(outcome = ?outcome, "Tick finished"),
            Err(e) => error!(error = %e, "Tick failed"),
        },
        Job::Purge => match publisher.daily_purge() {
            Ok(report) => info!(deleted = report.deleted, failed = report.failed, "Daily purge finished"),
            Err(e) => error!(error = %e, "Daily purge failed"),
        },
    }
}

/// Daemon loop. Checks once a second; never returns.
pub fn run_forever(publisher: &mut Publisher, mut scheduler: Scheduler) -> ! {
    info!("Monitoring started");
    loop {
        let now = Local::now().naive_local();
        for job in scheduler.due(now) {
            run_job(publisher, job, now);
        }
        std::thread::sleep(std::time::Duration::from_secs(1));
    }
}

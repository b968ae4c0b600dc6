//! Recurring jobs.
//!
//! Pending jobs live in a persisted *job book* (the `cron` option), so a job
//! registered by one process is still pending when the next one boots.
//! Callbacks cannot be persisted; each process re-attaches them through
//! [`Scheduler::ensure_scheduled`], which is why that call has to be safe to
//! repeat on every bootstrap.
//!
//! ```text
//!  unscheduled ──ensure_scheduled──► pending ──run_due──► (callback) ─┐
//!       ▲                               ▲                              │
//!       └───────────cancel──────────────┴──────────next_run += k·iv───┘
//! ```
//!
//! [`spawn`] drives [`Scheduler::run_due`] from a background thread and
//! reports every firing over a channel.

use std::collections::{BTreeMap, HashMap};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::error::OptionError;
use crate::options::{OptionStore, CRON_KEY};

/// Work attached to a task name.  The `Ok` string is a one-line summary.
pub type JobCallback = dyn Fn() -> anyhow::Result<String> + Send + Sync;

/// One pending recurring job, as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobEntry {
    pub interval_secs: u64,
    pub next_run: DateTime<Utc>,
}

type JobBook = BTreeMap<String, JobEntry>;

/// Sent by the runner thread after each firing.
#[derive(Debug)]
pub struct JobReport {
    pub task: String,
    pub fired_at: DateTime<Utc>,
    pub next_run: DateTime<Utc>,
    pub outcome: anyhow::Result<String>,
}

pub struct Scheduler {
    options: Arc<OptionStore>,
    clock: Arc<dyn Clock>,
    callbacks: Mutex<HashMap<String, Arc<JobCallback>>>,
}

impl Scheduler {
    pub fn new(options: Arc<OptionStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            options,
            clock,
            callbacks: Mutex::new(HashMap::new()),
        }
    }

    fn load_book(&self) -> Result<JobBook, OptionError> {
        Ok(self.options.get::<JobBook>(CRON_KEY)?.unwrap_or_default())
    }

    /// Change the job book as one read-modify-write on the option store.  An
    /// empty book removes the option.
    fn edit_book<R>(&self, change: impl FnOnce(&mut JobBook) -> R) -> Result<R, OptionError> {
        self.options.update::<JobBook, _>(CRON_KEY, |slot| {
            let mut book = slot.take().unwrap_or_default();
            let out = change(&mut book);
            if !book.is_empty() {
                *slot = Some(book);
            }
            out
        })
    }

    /// Attach `callback` to `task` and make sure exactly one recurring job
    /// exists for it.  A new job is due immediately and then every
    /// `interval`.  A job that is already pending keeps its next firing time;
    /// only its interval follows the new value.  Returns `true` when a new job
    /// was added to the book.
    pub fn ensure_scheduled<F>(
        &self,
        task: &str,
        interval: Duration,
        callback: F,
    ) -> Result<bool, OptionError>
    where
        F: Fn() -> anyhow::Result<String> + Send + Sync + 'static,
    {
        let interval_secs = interval.as_secs().max(1);
        self.callbacks
            .lock()
            .insert(task.to_string(), Arc::new(callback));

        let now = self.clock.now();
        self.edit_book(|book| match book.get_mut(task) {
            Some(entry) => {
                if entry.interval_secs != interval_secs {
                    log::info!(
                        "Job {task}: interval changed {}s -> {}s",
                        entry.interval_secs,
                        interval_secs
                    );
                    entry.interval_secs = interval_secs;
                }
                false
            }
            None => {
                book.insert(
                    task.to_string(),
                    JobEntry {
                        interval_secs,
                        next_run: now,
                    },
                );
                log::info!("Scheduled job {task} every {interval_secs}s starting {now}");
                true
            }
        })
    }

    /// Remove the job and its callback.  Returns whether a job was pending.
    pub fn cancel(&self, task: &str) -> Result<bool, OptionError> {
        self.callbacks.lock().remove(task);

        let removed = self.edit_book(|book| book.remove(task).is_some())?;
        if removed {
            log::info!("Cancelled job {task}");
        }
        Ok(removed)
    }

    pub fn next_run(&self, task: &str) -> Result<Option<DateTime<Utc>>, OptionError> {
        Ok(self.load_book()?.get(task).map(|e| e.next_run))
    }

    /// Names of every pending job.
    pub fn pending(&self) -> Result<Vec<String>, OptionError> {
        Ok(self.load_book()?.into_keys().collect())
    }

    /// Fire every job due at `now` that has a callback in this process.
    ///
    /// Each fired job's next run moves forward by whole intervals until it is
    /// past `now`, so a long gap produces one firing rather than a burst.
    /// Jobs registered by another process without a callback here stay as
    /// they are, and a job cancelled by another process does not fire.
    pub fn run_due(&self, now: DateTime<Utc>) -> Result<Vec<JobReport>, OptionError> {
        let callbacks = self.callbacks.lock().clone();
        let due: Vec<(String, Arc<JobCallback>, DateTime<Utc>)> = self.edit_book(|book| {
            let mut due = Vec::new();

            for (task, entry) in book.iter_mut() {
                if entry.next_run > now {
                    continue;
                }
                let Some(callback) = callbacks.get(task) else {
                    log::debug!("Job {task} is due but has no handler in this process");
                    continue;
                };
                let step = entry.interval_secs.max(1) as i64;
                let behind = (now - entry.next_run).num_seconds();
                entry.next_run += chrono::Duration::seconds((behind / step + 1) * step);
                due.push((task.clone(), Arc::clone(callback), entry.next_run));
            }
            due
        })?;

        let reports = due
            .into_iter()
            .map(|(task, callback, next_run)| {
                log::debug!("Firing job {task}");
                let outcome = callback();
                match &outcome {
                    Ok(summary) => log::info!("Job {task}: {summary}"),
                    Err(e) => log::warn!("Job {task} failed: {e:#}"),
                }
                JobReport {
                    task,
                    fired_at: now,
                    next_run,
                    outcome,
                }
            })
            .collect();
        Ok(reports)
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}

/// Spawn the background runner.
///
/// Checks for due jobs every `tick` and sends one [`JobReport`] per firing.
/// The thread stops the first time a send fails, i.e. once the receiver has
/// been dropped.
pub fn spawn(scheduler: Arc<Scheduler>, tick: Duration) -> mpsc::Receiver<JobReport> {
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || loop {
        let now = scheduler.clock().now();
        match scheduler.run_due(now) {
            Ok(reports) => {
                for report in reports {
                    if tx.send(report).is_err() {
                        return;
                    }
                }
            }
            Err(e) => log::error!("Scheduler could not read its job book: {e}"),
        }
        thread::sleep(tick);
    });

    rx
}

//! State for the interactive `watch` view.
//!
//! `App` holds the record listing, the selection, and the status line.  It
//! never touches the store or the network itself: key handlers set
//! `fetch_requested` / `reload_requested` and the main loop acts on them.

use chrono::{DateTime, Utc};
use ratatui::widgets::ListState;

use crate::pipeline::PipelineResult;
use crate::present::format_timestamp;
use crate::record::{newest_first, FetchedRecord};
use crate::scheduler::JobReport;

pub struct App {
    /// Stored records, newest first.
    pub records: Vec<FetchedRecord>,
    /// List selection state for scrolling.
    pub list_state: ListState,
    /// Whether the user has requested to quit.
    pub quit: bool,
    /// The user asked for a manual fetch.
    pub fetch_requested: bool,
    /// A manual fetch is running on the worker thread.
    pub fetching: bool,
    /// The user asked to re-read the store.
    pub reload_requested: bool,
    /// Last fetch / job outcome.
    pub status: String,
    /// When the recurring job fires next, if scheduled.
    pub next_run: Option<DateTime<Utc>>,
}

impl App {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            list_state: ListState::default(),
            quit: false,
            fetch_requested: false,
            fetching: false,
            reload_requested: false,
            status: "Starting…".into(),
            next_run: None,
        }
    }

    /// Replace the listing, keeping the same record selected when it is still
    /// present.
    pub fn set_records(&mut self, mut records: Vec<FetchedRecord>) {
        records.sort_by(newest_first);
        let selected_id = self.selected().map(|r| r.id);
        self.records = records;

        let index = if self.records.is_empty() {
            None
        } else {
            Some(
                selected_id
                    .and_then(|id| self.records.iter().position(|r| r.id == id))
                    .unwrap_or(0),
            )
        };
        self.list_state.select(index);
    }

    pub fn selected(&self) -> Option<&FetchedRecord> {
        self.list_state.selected().and_then(|i| self.records.get(i))
    }

    /// Take a pending fetch request.  Returns `false` while a fetch is
    /// already running, so key repeats do not queue extra runs.
    pub fn start_fetch(&mut self) -> bool {
        if !std::mem::take(&mut self.fetch_requested) || self.fetching {
            return false;
        }
        self.fetching = true;
        self.status = "Fetching…".into();
        true
    }

    pub fn apply_fetch(&mut self, result: &PipelineResult) {
        self.fetching = false;
        self.status = match result {
            Ok(record) => format!(
                "Fetched \"{}\" at {}",
                record.key,
                format_timestamp(record.retrieved_at)
            ),
            Err(e) => format!("Manual {e}"),
        };
    }

    pub fn apply_report(&mut self, report: &JobReport) {
        self.next_run = Some(report.next_run);
        self.status = match &report.outcome {
            Ok(summary) => format!("[{}] {summary}", report.task),
            Err(e) => format!("[{}] failed: {e:#}", report.task),
        };
    }

    // -- navigation ----------------------------------------------------------

    pub fn select_next(&mut self) {
        if self.records.is_empty() {
            return;
        }
        let i = match self.list_state.selected() {
            Some(i) => (i + 1).min(self.records.len() - 1),
            None => 0,
        };
        self.list_state.select(Some(i));
    }

    pub fn select_previous(&mut self) {
        if self.records.is_empty() {
            return;
        }
        let i = match self.list_state.selected() {
            Some(i) => i.saturating_sub(1),
            None => 0,
        };
        self.list_state.select(Some(i));
    }

    pub fn select_first(&mut self) {
        if !self.records.is_empty() {
            self.list_state.select(Some(0));
        }
    }

    pub fn select_last(&mut self) {
        if !self.records.is_empty() {
            self.list_state.select(Some(self.records.len() - 1));
        }
    }
}

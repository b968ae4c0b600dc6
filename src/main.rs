//! api-fetcher: fetch a JSON document on a schedule and keep the latest
//! snapshot per key.
//!
//! ## Architecture overview
//!
//! ```text
//!  fetch-now ─┐                     ┌──────────────┐
//!  watch 'f' ─┼─► TriggerRegistry ─►│ FetchPipeline│─► HttpFetcher
//!  scheduler ─┘        ▲            └──────┬───────┘─► PayloadDecoder
//!   (thread)           │                   ▼
//!                      │              RecordStore ◄── present / ui
//!                 OptionStore (job book, install metadata)
//! ```
//!
//! * **`source/`**: the `HttpFetcher` trait and the reqwest implementation.
//! * **`decode`**: JSON validation, natural key, canonical payload.
//! * **`store/`**: keyed upsert storage (memory, JSON file).
//! * **`pipeline`**: fetch → decode → upsert, with logging of failures.
//! * **`scheduler`**: persisted recurring jobs and the background runner.
//! * **`triggers`**: named entry points shared by CLI, UI and scheduler.
//! * **`present`**: text / HTML / listing renderings of stored records.
//! * **`app`**, **`ui`**, **`input`**: the `watch` terminal view.
//! * **`main`**: parse args, set up logging, wire components, dispatch.

mod app;
mod clock;
mod config;
mod decode;
mod error;
mod input;
mod options;
mod pipeline;
mod present;
mod record;
mod scheduler;
mod source;
mod store;
mod triggers;
mod ui;

use std::fs;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    event::{self, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use log::LevelFilter;
use log4rs::{
    append::console::{ConsoleAppender, Target},
    append::file::FileAppender,
    config::{Appender, Root},
    encode::pattern::PatternEncoder,
    filter::threshold::ThresholdFilter,
    Config,
};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;

use app::App;
use clock::{Clock, SystemClock};
use config::{Command, CommandLineInput, FetcherConfig};
use decode::PayloadDecoder;
use options::OptionStore;
use pipeline::FetchPipeline;
use scheduler::Scheduler;
use source::{HttpFetcher, HttpSource};
use store::{JsonFileStore, MemoryStore, RecordStore};
use triggers::{TriggerRegistry, FETCH_NOW, SCHEDULED_FETCH};

/// How often the scheduler runner checks for due jobs.
const SCHEDULER_TICK: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Sets up logging: everything to the log file, and to stderr as well unless
/// the terminal view owns the screen.
fn setup_logging(config: &FetcherConfig) -> Result<()> {
    let root_level = if config.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let console_level = match (&config.command, config.verbose) {
        (_, true) => LevelFilter::Debug,
        (Command::Run, false) => LevelFilter::Info,
        _ => LevelFilter::Warn,
    };

    let log_file_path = config.log_path();
    if let Some(parent) = log_file_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let file_appender = FileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(
            "{d(%Y-%m-%d %H:%M:%S)} [{l}] - {m}{n}",
        )))
        .build(&log_file_path)?;

    let mut builder = Config::builder()
        .appender(Appender::builder().build("file", Box::new(file_appender)));
    let mut root = Root::builder().appender("file");

    if config.command != Command::Watch {
        let pattern = if config.verbose {
            "{d(%Y-%m-%d %H:%M:%S)} [{l}] - {m}{n}"
        } else {
            "{m}{n}"
        };
        let stderr_appender = ConsoleAppender::builder()
            .target(Target::Stderr)
            .encoder(Box::new(PatternEncoder::new(pattern)))
            .build();
        builder = builder.appender(
            Appender::builder()
                .filter(Box::new(ThresholdFilter::new(console_level)))
                .build("stderr", Box::new(stderr_appender)),
        );
        root = root.appender("stderr");
    }

    log4rs::init_config(builder.build(root.build(root_level))?)?;
    log::debug!("Logging initialized. Log file: {}", log_file_path.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

/// Everything a command needs, constructed once per process.
struct Runtime {
    store: Arc<dyn RecordStore>,
    options: Arc<OptionStore>,
    scheduler: Arc<Scheduler>,
    pipeline: Arc<FetchPipeline>,
    triggers: TriggerRegistry,
    interval: Duration,
}

/// File-backed stores under the data directory, or in-memory ones for
/// ephemeral runs.
fn open_stores(config: &FetcherConfig) -> Result<(Arc<dyn RecordStore>, Arc<OptionStore>)> {
    match (config.records_path(), config.options_path()) {
        (Some(records), Some(options)) => {
            let store = JsonFileStore::open(&records)?;
            log::debug!("Records: {}", store.path().display());
            log::debug!("Options: {}", options.display());
            Ok((Arc::new(store), Arc::new(OptionStore::open(&options)?)))
        }
        _ => {
            log::debug!("Ephemeral run; nothing is persisted");
            Ok((Arc::new(MemoryStore::new()), Arc::new(OptionStore::in_memory())))
        }
    }
}

fn build_runtime(
    config: &FetcherConfig,
    fetcher: Arc<dyn HttpFetcher>,
    store: Arc<dyn RecordStore>,
    options: Arc<OptionStore>,
    clock: Arc<dyn Clock>,
) -> Runtime {
    let pipeline = Arc::new(FetchPipeline::new(
        config.endpoint.as_str(),
        fetcher,
        PayloadDecoder::new(&config.key_field),
        Arc::clone(&store),
        Arc::clone(&clock),
    ));

    let mut triggers = TriggerRegistry::new();
    for name in [FETCH_NOW, SCHEDULED_FETCH] {
        let pipeline = Arc::clone(&pipeline);
        triggers.register(name, move || pipeline.run());
    }
    log::debug!("Triggers: {}", triggers.names().join(", "));

    Runtime {
        store,
        scheduler: Arc::new(Scheduler::new(Arc::clone(&options), clock)),
        options,
        pipeline,
        triggers,
        interval: config.interval,
    }
}

impl Runtime {
    /// Per-process startup: record install metadata and make sure the
    /// recurring fetch is registered.  Safe to repeat on every launch.
    fn bootstrap(&self) -> Result<()> {
        self.options.install(self.scheduler.clock().now())?;

        let triggers = self.triggers.clone();
        self.scheduler
            .ensure_scheduled(SCHEDULED_FETCH, self.interval, move || {
                let record = triggers.invoke(SCHEDULED_FETCH)??;
                Ok(format!("stored {} \"{}\"", record.id, record.key))
            })?;
        Ok(())
    }

    /// Run the manual trigger, then list what is stored.  A failed run is
    /// already logged by the pipeline; only `strict` turns it into an error.
    fn fetch_now(&self, strict: bool) -> Result<String> {
        if let Err(e) = self.triggers.invoke(FETCH_NOW)? {
            if strict {
                let stage = e.stage();
                return Err(anyhow::Error::new(e).context(format!("fetch-now failed at the {stage} stage")));
            }
        }
        Ok(present::render_listing(&self.store.list()?))
    }

    fn show(&self, html: bool) -> Result<String> {
        let display = present::render_latest(self.store.as_ref())?;
        Ok(if html {
            display.render_html()
        } else {
            display.render_text()
        })
    }

    /// Cancel the recurring job and delete every program-owned option.
    /// Stored records are kept.
    fn teardown(&self) -> Result<String> {
        let cancelled = self.scheduler.cancel(SCHEDULED_FETCH)?;
        let removed = self.options.remove_plugin_keys()?;
        let job = if cancelled {
            "Recurring fetch cancelled"
        } else {
            "No recurring fetch was scheduled"
        };
        let settings = if removed.is_empty() {
            "none".to_string()
        } else {
            removed.join(", ")
        };
        Ok(format!("{job}; removed settings: {settings}"))
    }

    /// Fire scheduled jobs in the foreground until the process is killed.
    fn run_foreground(&self) -> Result<()> {
        log::info!(
            "Fetching {} every {}s (pending jobs: {})",
            self.pipeline.endpoint(),
            self.interval.as_secs(),
            self.scheduler.pending()?.join(", ")
        );
        let rx = scheduler::spawn(Arc::clone(&self.scheduler), SCHEDULER_TICK);
        for report in rx {
            log::debug!(
                "Job {} fired at {}; next run {}",
                report.task,
                report.fired_at,
                report.next_run
            );
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RAII terminal guard
// ---------------------------------------------------------------------------

/// Enters raw mode and the alternate screen on construction; restores the
/// terminal on [`Drop`], including during unwinding.
struct TerminalGuard {
    terminal: Terminal<CrosstermBackend<io::Stdout>>,
}

impl TerminalGuard {
    fn new() -> Result<Self> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let terminal = Terminal::new(backend)?;
        Ok(Self { terminal })
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(self.terminal.backend_mut(), LeaveAlternateScreen);
        let _ = self.terminal.show_cursor();
    }
}

/// Restore the terminal before the default hook prints the panic message.
fn install_panic_hook() {
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        original_hook(info);
    }));
}

/// The interactive view: scheduler in the background, records on screen.
fn watch(runtime: &Runtime) -> Result<()> {
    install_panic_hook();

    let rx = scheduler::spawn(Arc::clone(&runtime.scheduler), SCHEDULER_TICK);
    let (fetch_tx, fetch_rx) = triggers::spawn_worker(runtime.triggers.clone(), FETCH_NOW);

    let mut guard = TerminalGuard::new()?;
    let mut app = App::new();
    app.set_records(runtime.store.list()?);
    app.next_run = runtime.scheduler.next_run(SCHEDULED_FETCH)?;
    app.status = format!("Watching {}", runtime.pipeline.endpoint());

    // ~10 fps.  Each iteration:
    //   1. Drain job reports and manual fetch results.
    //   2. Act on fetch / reload requests from the last key press.
    //   3. Render.
    //   4. Poll for keyboard input, up to tick_rate.
    let tick_rate = Duration::from_millis(100);

    loop {
        let mut stale = false;
        while let Ok(report) = rx.try_recv() {
            app.apply_report(&report);
            stale = true;
        }

        while let Ok(outcome) = fetch_rx.try_recv() {
            app.apply_fetch(&outcome?);
            stale = true;
        }

        if app.start_fetch() {
            fetch_tx.send(())?;
        }
        if std::mem::take(&mut app.reload_requested) {
            app.next_run = runtime.scheduler.next_run(SCHEDULED_FETCH)?;
            app.status = "Reloaded".into();
            stale = true;
        }
        if stale {
            app.set_records(runtime.store.list()?);
        }

        guard.terminal.draw(|f| ui::draw(&mut app, f))?;

        if event::poll(tick_rate)? {
            if let Event::Key(key) = event::read()? {
                input::handle_key_event(&mut app, key);
            }
        }

        if app.quit {
            break;
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = CommandLineInput::parse();
    let config = FetcherConfig::resolve(cli)?;
    setup_logging(&config)?;
    log::debug!("Configuration: {config:?}");

    let (store, options) = open_stores(&config)?;
    let fetcher = HttpSource::new("HTTP", config.timeout)
        .context("could not set up the HTTP client")?;
    let runtime = build_runtime(&config, Arc::new(fetcher), store, options, Arc::new(SystemClock));

    if config.command != Command::Teardown {
        runtime.bootstrap()?;
    }

    match config.command {
        Command::FetchNow { strict } => println!("{}", runtime.fetch_now(strict)?),
        Command::Show { html } => println!("{}", runtime.show(html)?),
        Command::List => println!("{}", present::render_listing(&runtime.store.list()?)),
        Command::Run => runtime.run_foreground()?,
        Command::Watch => watch(&runtime)?,
        Command::Teardown => println!("{}", runtime.teardown()?),
    }

    Ok(())
}

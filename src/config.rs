//! Command-line input and the validated configuration built from it.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use url::Url;

use crate::decode::DEFAULT_KEY_FIELD;
use crate::error::ConfigError;

pub const DEFAULT_ENDPOINT: &str = "https://api.coindesk.com/v1/bpi/currentprice.json";
pub const ENDPOINT_ENV: &str = "API_FETCHER_ENDPOINT";
pub const DEFAULT_INTERVAL_SECS: u64 = 1800;

const RECORDS_FILE: &str = "records.json";
const OPTIONS_FILE: &str = "options.json";
const LOG_FILE: &str = "api-fetcher.log";

/// Parsed command-line input.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CommandLineInput {
    #[command(subcommand)]
    pub command: Command,

    /// JSON endpoint to fetch (defaults to $API_FETCHER_ENDPOINT, then the CoinDesk BPI feed)
    #[arg(long, global = true)]
    pub endpoint: Option<String>,

    /// Seconds between scheduled fetches
    #[arg(long, global = true, default_value_t = DEFAULT_INTERVAL_SECS)]
    pub interval_secs: u64,

    /// HTTP request timeout in seconds
    #[arg(long, global = true, default_value_t = 30)]
    pub timeout_secs: u64,

    /// Dotted path of the field that names a record
    #[arg(long, global = true, default_value = DEFAULT_KEY_FIELD)]
    pub key_field: String,

    /// Where records, options and the log file live
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Keep everything in memory; nothing is read from or written to disk
    #[arg(long, global = true, default_value_t = false)]
    pub ephemeral: bool,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Fetch once now, then list stored records
    FetchNow {
        /// Exit non-zero when the fetch fails instead of only logging it
        #[arg(long, default_value_t = false)]
        strict: bool,
    },
    /// Show the most recent record
    Show {
        /// Render as an HTML fragment
        #[arg(long, default_value_t = false)]
        html: bool,
    },
    /// List stored records, newest first
    List,
    /// Run the scheduler in the foreground, fetching on every interval
    Run,
    /// Interactive view of stored records with the scheduler running
    Watch,
    /// Cancel the recurring job and remove this program's settings
    Teardown,
}

/// Validated configuration, ready to wire components.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub command: Command,
    pub endpoint: Url,
    pub interval: Duration,
    pub timeout: Duration,
    pub key_field: String,
    /// `None` when running ephemerally.
    pub data_dir: Option<PathBuf>,
    pub verbose: bool,
}

impl FetcherConfig {
    /// Resolve CLI input against the environment and validate it.
    pub fn resolve(cli: CommandLineInput) -> Result<Self, ConfigError> {
        let env_endpoint = std::env::var(ENDPOINT_ENV).ok();
        Self::resolve_with(cli, env_endpoint, default_data_dir())
    }

    fn resolve_with(
        cli: CommandLineInput,
        env_endpoint: Option<String>,
        default_dir: Option<PathBuf>,
    ) -> Result<Self, ConfigError> {
        let raw = cli
            .endpoint
            .or(env_endpoint)
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        let endpoint = parse_endpoint(&raw)?;

        if cli.interval_secs == 0 {
            return Err(ConfigError::ZeroDuration {
                name: "--interval-secs",
            });
        }
        if cli.timeout_secs == 0 {
            return Err(ConfigError::ZeroDuration {
                name: "--timeout-secs",
            });
        }
        if cli.key_field.trim().is_empty() {
            return Err(ConfigError::EmptyKeyField);
        }

        let data_dir = if cli.ephemeral {
            None
        } else {
            Some(cli.data_dir.or(default_dir).ok_or(ConfigError::NoDataDir)?)
        };

        Ok(Self {
            command: cli.command,
            endpoint,
            interval: Duration::from_secs(cli.interval_secs),
            timeout: Duration::from_secs(cli.timeout_secs),
            key_field: cli.key_field.trim().to_string(),
            data_dir,
            verbose: cli.verbose,
        })
    }

    pub fn records_path(&self) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|d| d.join(RECORDS_FILE))
    }

    pub fn options_path(&self) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|d| d.join(OPTIONS_FILE))
    }

    /// Log file location; ephemeral runs log to the temp dir.
    pub fn log_path(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
            .join(LOG_FILE)
    }
}

fn parse_endpoint(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::InvalidEndpoint {
        input: raw.to_string(),
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::InvalidEndpoint {
            input: raw.to_string(),
            reason: format!("unsupported scheme {other}"),
        }),
    }
}

/// `$XDG_DATA_HOME/api-fetcher`, else `~/.local/share/api-fetcher`.
fn default_data_dir() -> Option<PathBuf> {
    std::env::var_os("XDG_DATA_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local").join("share")))
        .map(|base| base.join(env!("CARGO_PKG_NAME")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CommandLineInput {
        CommandLineInput::try_parse_from(std::iter::once("api-fetcher").chain(args.iter().copied()))
            .unwrap()
    }

    fn resolve(args: &[&str]) -> Result<FetcherConfig, ConfigError> {
        FetcherConfig::resolve_with(parse(args), None, Some(PathBuf::from("/data")))
    }

    #[test]
    fn defaults() {
        let config = resolve(&["fetch-now"]).unwrap();
        assert_eq!(config.command, Command::FetchNow { strict: false });
        assert_eq!(config.endpoint.as_str(), DEFAULT_ENDPOINT);
        assert_eq!(config.interval, Duration::from_secs(1800));
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.key_field, "chartName");
        assert_eq!(config.records_path(), Some(PathBuf::from("/data/records.json")));
        assert_eq!(config.options_path(), Some(PathBuf::from("/data/options.json")));
        assert_eq!(config.log_path(), PathBuf::from("/data/api-fetcher.log"));
    }

    #[test]
    fn global_flags_after_subcommand() {
        let config = resolve(&[
            "show",
            "--html",
            "--interval-secs",
            "60",
            "--endpoint",
            "http://localhost:8080/x.json",
        ])
        .unwrap();
        assert_eq!(config.command, Command::Show { html: true });
        assert_eq!(config.interval, Duration::from_secs(60));
        assert_eq!(config.endpoint.as_str(), "http://localhost:8080/x.json");
    }

    #[test]
    fn flag_beats_environment_beats_default() {
        let from_env = FetcherConfig::resolve_with(
            parse(&["list"]),
            Some("https://env.example.com/a.json".into()),
            None,
        );
        assert_eq!(
            from_env.unwrap_err().to_string(),
            "could not determine a data directory; pass --data-dir"
        );

        let config = FetcherConfig::resolve_with(
            parse(&["list", "--ephemeral"]),
            Some("https://env.example.com/a.json".into()),
            None,
        )
        .unwrap();
        assert_eq!(config.endpoint.as_str(), "https://env.example.com/a.json");
        assert!(config.data_dir.is_none());
        assert!(config.records_path().is_none());

        let config = FetcherConfig::resolve_with(
            parse(&["list", "--ephemeral", "--endpoint", "https://flag.example.com/"]),
            Some("https://env.example.com/a.json".into()),
            None,
        )
        .unwrap();
        assert_eq!(config.endpoint.as_str(), "https://flag.example.com/");
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            resolve(&["run", "--interval-secs", "0"]),
            Err(ConfigError::ZeroDuration { .. })
        ));
        assert!(matches!(
            resolve(&["run", "--endpoint", "ftp://example.com/x"]),
            Err(ConfigError::InvalidEndpoint { .. })
        ));
        assert!(matches!(
            resolve(&["run", "--endpoint", "not a url"]),
            Err(ConfigError::InvalidEndpoint { .. })
        ));
        assert!(matches!(
            resolve(&["run", "--key-field", "  "]),
            Err(ConfigError::EmptyKeyField)
        ));
    }

    #[test]
    fn strict_flag_parses() {
        let config = resolve(&["fetch-now", "--strict"]).unwrap();
        assert_eq!(config.command, Command::FetchNow { strict: true });
    }
}

//! Configuration for the orchestrator
//!
//! Configuration is loaded in order of precedence:
//! 1. Environment variables (highest priority)
//! 2. Config file (~/.config/shepherd/config.toml)
//! 3. Built-in defaults (lowest priority)

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;

#[cfg(test)]
mod tests;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ─────────────────────────────────────────────────────────────────────────────
// Logging
// ─────────────────────────────────────────────────────────────────────────────

/// Log file rotation strategy
#[derive(Debug, Clone, Default, PartialEq)]
pub enum LogRotation {
    /// Rotate log files hourly
    Hourly,
    /// Rotate log files daily (default)
    #[default]
    Daily,
    /// Never rotate - single log file
    Never,
}

impl LogRotation {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "hourly" => Self::Hourly,
            "daily" => Self::Daily,
            "never" => Self::Never,
            _ => Self::Daily, // Default to daily for unknown values
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hourly => "hourly",
            Self::Daily => "daily",
            Self::Never => "never",
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Enable file logging (in addition to stdout)
    pub file_enabled: bool,
    /// Directory for log files
    pub file_dir: PathBuf,
    /// Log file rotation strategy
    pub file_rotation: LogRotation,
    /// Prefix for log file names
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_enabled: false, // Opt-in feature
            file_dir: PathBuf::from("./logs"),
            file_rotation: LogRotation::Daily,
            file_prefix: "shepherd".to_string(),
        }
    }
}

/// Logging settings as loaded from config file
#[derive(Debug, Deserialize, Default)]
pub(crate) struct FileLogging {
    pub level: Option<String>,
    pub file_enabled: Option<bool>,
    pub file_dir: Option<String>,
    pub file_rotation: Option<String>,
    pub file_prefix: Option<String>,
}

impl LoggingConfig {
    fn from_file(file: Option<FileLogging>) -> Self {
        let file = file.unwrap_or_default();
        let defaults = Self::default();

        Self {
            level: file.level.unwrap_or(defaults.level),
            file_enabled: file.file_enabled.unwrap_or(defaults.file_enabled),
            file_dir: file
                .file_dir
                .map(PathBuf::from)
                .unwrap_or(defaults.file_dir),
            file_rotation: file
                .file_rotation
                .map(|s| LogRotation::from_str(&s))
                .unwrap_or(defaults.file_rotation),
            file_prefix: file.file_prefix.unwrap_or(defaults.file_prefix),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Pipeline tunables
// ─────────────────────────────────────────────────────────────────────────────

/// Health-checker cadence
#[derive(Debug, Clone)]
pub struct CheckerSettings {
    /// Seconds between heartbeat polls per registrant
    pub interval_secs: u64,
}

impl Default for CheckerSettings {
    fn default() -> Self {
        Self { interval_secs: 10 }
    }
}

#[derive(Debug, Deserialize, Default)]
pub(crate) struct FileChecker {
    pub interval_secs: Option<u64>,
}

/// Aggregator flush cadence and ingestion bound
#[derive(Debug, Clone)]
pub struct AggregatorSettings {
    /// Seconds between flushes of the in-memory summaries
    pub flush_secs: u64,
    /// Bound on the sample ingestion channel
    pub channel_capacity: usize,
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        Self {
            flush_secs: 60,
            channel_capacity: 10_000,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub(crate) struct FileAggregator {
    pub flush_secs: Option<u64>,
    pub channel_capacity: Option<usize>,
}

/// Rollup cadences and scan window
#[derive(Debug, Clone)]
pub struct RollupSettings {
    /// Seconds of raw history each rollup pass re-reads
    pub lookback_secs: u64,
    /// Seconds between 120 s-bucket rounds
    pub cadence_120_secs: u64,
    /// Seconds between 300 s-bucket rounds
    pub cadence_300_secs: u64,
}

impl Default for RollupSettings {
    fn default() -> Self {
        Self {
            lookback_secs: 600,
            cadence_120_secs: 120,
            cadence_300_secs: 300,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub(crate) struct FileRollup {
    pub lookback_secs: Option<u64>,
    pub cadence_120_secs: Option<u64>,
    pub cadence_300_secs: Option<u64>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Application Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Address to bind the orchestrator's HTTP surface to
    pub bind_addr: SocketAddr,

    /// Path to the SQLite metrics database
    pub db_path: PathBuf,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Health-checker settings
    pub checker: CheckerSettings,

    /// Aggregator settings
    pub aggregator: AggregatorSettings,

    /// Rollup settings
    pub rollup: RollupSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8500".parse().unwrap(),
            db_path: PathBuf::from("./data/metrics.db"),
            logging: LoggingConfig::default(),
            checker: CheckerSettings::default(),
            aggregator: AggregatorSettings::default(),
            rollup: RollupSettings::default(),
        }
    }
}

/// Config file structure (subset of Config that makes sense to persist)
#[derive(Debug, Deserialize, Default)]
pub(crate) struct FileConfig {
    pub bind_addr: Option<String>,
    pub db_path: Option<String>,

    /// Optional [logging] section
    pub logging: Option<FileLogging>,

    /// Optional [checker] section
    pub checker: Option<FileChecker>,

    /// Optional [aggregator] section
    pub aggregator: Option<FileAggregator>,

    /// Optional [rollup] section
    pub rollup: Option<FileRollup>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration Loading
// ─────────────────────────────────────────────────────────────────────────────

impl Config {
    /// Get the config file path: ~/.config/shepherd/config.toml
    /// Uses Unix-style ~/.config on all platforms for consistency
    pub fn config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|p| p.join(".config").join("shepherd").join("config.toml"))
    }

    /// Create config file with defaults if it doesn't exist
    /// Called during startup to help users discover configuration options
    pub fn ensure_config_exists() {
        let Some(path) = Self::config_path() else {
            return;
        };

        // Don't overwrite existing config
        if path.exists() {
            return;
        }

        if let Some(parent) = path.parent() {
            if std::fs::create_dir_all(parent).is_err() {
                return; // Silently fail - config is optional
            }
        }

        // Write config (ignore errors - config is optional)
        let _ = std::fs::write(&path, Config::default().to_toml());
    }

    /// Load file config if it exists
    ///
    /// A config file that exists but cannot be parsed fails fast with a
    /// clear error instead of silently falling back to defaults.
    fn load_file_config() -> FileConfig {
        let Some(path) = Self::config_path() else {
            return FileConfig::default();
        };

        match std::fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("CONFIG ERROR - Failed to parse {}", path.display());
                    eprintln!("  {e}");
                    eprintln!("  To reset, delete the file and restart shepherd.");
                    std::process::exit(1);
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => FileConfig::default(),
            Err(e) => {
                eprintln!("CONFIG ERROR - Cannot read {}: {e}", path.display());
                std::process::exit(1);
            }
        }
    }

    /// Merge a file config over the defaults.
    pub(crate) fn from_file_config(file: FileConfig) -> Self {
        let defaults = Self::default();

        Self {
            bind_addr: file
                .bind_addr
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.bind_addr),
            db_path: file.db_path.map(PathBuf::from).unwrap_or(defaults.db_path),
            logging: LoggingConfig::from_file(file.logging),
            checker: {
                let section = file.checker.unwrap_or_default();
                CheckerSettings {
                    interval_secs: section
                        .interval_secs
                        .unwrap_or(defaults.checker.interval_secs),
                }
            },
            aggregator: {
                let section = file.aggregator.unwrap_or_default();
                AggregatorSettings {
                    flush_secs: section
                        .flush_secs
                        .unwrap_or(defaults.aggregator.flush_secs),
                    channel_capacity: section
                        .channel_capacity
                        .unwrap_or(defaults.aggregator.channel_capacity),
                }
            },
            rollup: {
                let section = file.rollup.unwrap_or_default();
                RollupSettings {
                    lookback_secs: section
                        .lookback_secs
                        .unwrap_or(defaults.rollup.lookback_secs),
                    cadence_120_secs: section
                        .cadence_120_secs
                        .unwrap_or(defaults.rollup.cadence_120_secs),
                    cadence_300_secs: section
                        .cadence_300_secs
                        .unwrap_or(defaults.rollup.cadence_300_secs),
                }
            },
        }
    }

    /// Load configuration: file -> env vars -> defaults
    pub fn from_env() -> Self {
        let mut config = Self::from_file_config(Self::load_file_config());

        // Bind address: env > file > default
        if let Ok(bind) = std::env::var("SHEPHERD_BIND") {
            match bind.parse() {
                Ok(addr) => config.bind_addr = addr,
                Err(_) => eprintln!("Ignoring invalid SHEPHERD_BIND={bind}"),
            }
        }

        // Database path: env > file > default
        if let Ok(db) = std::env::var("SHEPHERD_DB") {
            config.db_path = PathBuf::from(db);
        }

        config
    }

    /// Render the config as TOML, the template written on first run. A
    /// round-trip test guards this against drifting from `FileConfig`.
    pub fn to_toml(&self) -> String {
        format!(
            r#"# shepherd configuration
# Precedence: environment variables > this file > built-in defaults
# Env overrides: SHEPHERD_BIND, SHEPHERD_DB

bind_addr = "{bind_addr}"
db_path = "{db_path}"

[logging]
# trace, debug, info, warn, error
level = "{level}"
file_enabled = {file_enabled}
file_dir = "{file_dir}"
# hourly, daily, never
file_rotation = "{file_rotation}"
file_prefix = "{file_prefix}"

[checker]
# seconds between heartbeat polls per registrant
interval_secs = {checker_interval}

[aggregator]
# seconds between flushes of in-memory summaries
flush_secs = {flush_secs}
# bound on the sample ingestion channel
channel_capacity = {channel_capacity}

[rollup]
# seconds of raw history each rollup pass re-reads
lookback_secs = {lookback_secs}
cadence_120_secs = {cadence_120}
cadence_300_secs = {cadence_300}
"#,
            bind_addr = self.bind_addr,
            db_path = self.db_path.display(),
            level = self.logging.level,
            file_enabled = self.logging.file_enabled,
            file_dir = self.logging.file_dir.display(),
            file_rotation = self.logging.file_rotation.as_str(),
            file_prefix = self.logging.file_prefix,
            checker_interval = self.checker.interval_secs,
            flush_secs = self.aggregator.flush_secs,
            channel_capacity = self.aggregator.channel_capacity,
            lookback_secs = self.rollup.lookback_secs,
            cadence_120 = self.rollup.cadence_120_secs,
            cadence_300 = self.rollup.cadence_300_secs,
        )
    }
}

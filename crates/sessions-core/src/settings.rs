use clap::{CommandFactory, FromArgMatches, Parser};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{LoaderError, Result};

/// Registration window applied when neither the CLI nor the config file set one.
pub const DEFAULT_REGISTRATION_DAYS: u32 = 45;

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Load, link and summarise user / session / session-text CSV exports
#[derive(Parser, Debug, Clone)]
#[command(
    name = "sessions-loader",
    about = "Load, link and summarise user / session / session-text CSV exports",
    version
)]
pub struct Settings {
    /// Directory containing the CSV files (auto-discovered if not specified)
    #[arg(long, env = "SESSIONS_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Only keep users registered within this many days
    #[arg(long, env = "SESSIONS_REGISTRATION_DAYS", default_value_t = DEFAULT_REGISTRATION_DAYS)]
    pub registration_days: u32,

    /// User CSV file name inside the data directory
    #[arg(long, default_value = "user.csv")]
    pub user_file: String,

    /// Session CSV file name inside the data directory
    #[arg(long, default_value = "session.csv")]
    pub session_file: String,

    /// Session text CSV file name inside the data directory
    #[arg(long, default_value = "session_text.csv")]
    pub session_text_file: String,

    /// Timezone for timestamps without an offset ("auto" uses the system zone)
    #[arg(long, default_value = "auto")]
    pub timezone: String,

    /// JSON config file (defaults to ~/.sessions-loader/config.json)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Write a JSON export of the loaded dataset to this path
    #[arg(long)]
    pub export: Option<PathBuf>,

    /// Sections to include in the JSON export
    #[arg(
        long,
        value_delimiter = ',',
        default_values = ["users", "stats"],
        value_parser = ["users", "sessions", "session_texts", "stats", "report"]
    )]
    pub include: Vec<String>,

    /// Number of sample users to print
    #[arg(long, default_value = "3")]
    pub sample: usize,

    /// Logging level
    #[arg(long, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"])]
    pub log_level: String,

    /// Log file path
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}

// ── LoaderConfig ───────────────────────────────────────────────────────────────

/// Optional on-disk configuration, read from `~/.sessions-loader/config.json`
/// or the path given by `--config`.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct LoaderConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration_days: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_text_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

impl LoaderConfig {
    /// Return the default path to the config file.
    pub fn config_path() -> PathBuf {
        Self::config_path_in(&dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
    }

    /// Return the config path rooted at `base_dir`.
    pub fn config_path_in(base_dir: &Path) -> PathBuf {
        base_dir.join(".sessions-loader").join("config.json")
    }

    /// Load the config from `path`.
    ///
    /// A missing file yields the default config; an unreadable or malformed
    /// one is an error.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(LoaderError::FileRead {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        Ok(serde_json::from_str(&content)?)
    }
}

// ── Settings impl ──────────────────────────────────────────────────────────────

impl Settings {
    /// Parse CLI arguments and merge the config file underneath them.
    ///
    /// Exits the process on `--help`, `--version` or malformed arguments,
    /// like any clap front end.
    pub fn load() -> Result<Self> {
        let matches = Settings::command().get_matches();
        Self::from_matches(&matches, &LoaderConfig::config_path())
    }

    /// Same as [`Settings::load`] but with explicit arguments and default
    /// config path, reporting argument errors instead of exiting.
    pub fn load_impl(args: Vec<std::ffi::OsString>, default_config: &Path) -> Result<Self> {
        let matches = Settings::command()
            .try_get_matches_from(args)
            .map_err(|e| LoaderError::Config(e.to_string()))?;
        Self::from_matches(&matches, default_config)
    }

    /// Precedence: command line (or environment) > config file > defaults.
    fn from_matches(matches: &clap::ArgMatches, default_config: &Path) -> Result<Self> {
        let mut settings =
            Settings::from_arg_matches(matches).map_err(|e| LoaderError::Config(e.to_string()))?;

        let config_path = settings
            .config
            .clone()
            .unwrap_or_else(|| default_config.to_path_buf());
        let file = LoaderConfig::load_from(&config_path)?;

        // NOTE: clap stores the arg id using the *field name* (underscores).
        if !is_arg_explicitly_set(matches, "data_dir") && settings.data_dir.is_none() {
            settings.data_dir = file.data_dir;
        }
        if !is_arg_explicitly_set(matches, "registration_days") {
            if let Some(v) = file.registration_days {
                settings.registration_days = v;
            }
        }
        if !is_arg_explicitly_set(matches, "user_file") {
            if let Some(v) = file.user_file {
                settings.user_file = v;
            }
        }
        if !is_arg_explicitly_set(matches, "session_file") {
            if let Some(v) = file.session_file {
                settings.session_file = v;
            }
        }
        if !is_arg_explicitly_set(matches, "session_text_file") {
            if let Some(v) = file.session_text_file {
                settings.session_text_file = v;
            }
        }
        if !is_arg_explicitly_set(matches, "timezone") {
            if let Some(v) = file.timezone {
                settings.timezone = v;
            }
        }

        Ok(Self::resolve_auto_values(settings))
    }

    /// Resolve the `"auto"` timezone and apply the `--debug` flag.
    fn resolve_auto_values(mut settings: Settings) -> Settings {
        if settings.timezone.eq_ignore_ascii_case("auto") {
            settings.timezone = crate::time_utils::get_system_timezone();
        }

        if settings.debug {
            settings.log_level = "DEBUG".to_string();
        }

        settings
    }
}

// ── Helper: check if an arg was explicitly set ─────────────────────────────────

/// Returns `true` when `name` was supplied on the command line or through
/// its environment variable, not by a default value.
fn is_arg_explicitly_set(matches: &clap::ArgMatches, name: &str) -> bool {
    matches!(
        matches.value_source(name),
        Some(clap::parser::ValueSource::CommandLine) | Some(clap::parser::ValueSource::EnvVariable)
    )
}

// ── Tests ──────────────────────────────────────────────────────────────────────

use crate::error::{IngestError, Result};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone)]
pub struct Config {
    pub paths: PathsConfig,
    pub compression: CompressionConfig,
    pub lock: LockConfig,
    pub retry: RetryConfig,
    pub api: ApiConfig,
    pub telegram: TelegramConfig,
}

/// Source, destination and state locations
#[derive(Debug, Clone)]
pub struct PathsConfig {
    /// Tree where new product photos are dropped (often a network share).
    pub source_dir: PathBuf,
    /// Directory receiving the compressed `<stem>.jpg` outputs.
    pub dest_dir: PathBuf,
    /// Holds the lock file and the run-state record.
    pub state_dir: PathBuf,
}

/// Parameters of the iterative JPEG re-encode
#[derive(Debug, Clone, PartialEq)]
pub struct CompressionConfig {
    pub max_width: u32,
    pub initial_quality: u8,
    pub min_quality: u8,
    pub max_size_kb: u64,
    pub quality_step: u8,
    pub max_iterations: u32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            max_width: 225,
            initial_quality: 50,
            min_quality: 10,
            max_size_kb: 100,
            quality_step: 5,
            max_iterations: 12,
        }
    }
}

/// Single-instance lock behaviour
#[derive(Debug, Clone)]
pub struct LockConfig {
    /// Grace period for each termination stage of a previous instance.
    pub timeout: Duration,
    /// Terminate a live previous instance instead of refusing to start.
    pub takeover: bool,
}

/// A bounded, fixed-delay retry budget.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    /// Single attempt, no waiting. Handy in tests.
    pub fn immediate() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

/// Retry budgets for the flaky source/destination media
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub read: RetryPolicy,
    pub write: RetryPolicy,
}

/// Product photo API (remote update sink)
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub enabled: bool,
    pub base_url: String,
    pub timeout: Duration,
}

/// Telegram notification sink
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub enabled: bool,
    pub bot_token: String,
    pub chat_id: String,
    pub timeout: Duration,
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("state")
}

impl Config {
    /// Load configuration from the environment
    ///
    /// Loads variables from a `.env` file (if present) first; variables already
    /// set in the process environment win over the file.
    pub fn load() -> Result<Self> {
        // Optional file, a missing .env is not an error
        let _ = dotenv::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let source_dir = get("SOURCE_DIR").map(PathBuf::from).ok_or_else(|| {
            IngestError::Config("SOURCE_DIR not set. Configure it in the .env file".to_string())
        })?;
        let dest_dir = get("DEST_DIR").map(PathBuf::from).ok_or_else(|| {
            IngestError::Config("DEST_DIR not set. Configure it in the .env file".to_string())
        })?;
        let state_dir = get("STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(default_state_dir);

        let defaults = CompressionConfig::default();
        let compression = CompressionConfig {
            max_width: parse_or(&get, "IMAGE_MAX_WIDTH", defaults.max_width)?,
            initial_quality: parse_or(&get, "IMAGE_QUALITY_INITIAL", defaults.initial_quality)?,
            min_quality: parse_or(&get, "IMAGE_QUALITY_MIN", defaults.min_quality)?,
            max_size_kb: parse_or(&get, "IMAGE_MAX_SIZE_KB", defaults.max_size_kb)?,
            quality_step: parse_or(&get, "IMAGE_COMPRESSION_STEP", defaults.quality_step)?,
            max_iterations: parse_or(&get, "IMAGE_MAX_ITERATIONS", defaults.max_iterations)?,
        };

        let lock = LockConfig {
            timeout: Duration::from_secs(parse_or(&get, "LOCK_TIMEOUT", 5u64)?),
            takeover: parse_bool_or(&get, "LOCK_TAKEOVER", true),
        };

        let retry = RetryConfig {
            read: RetryPolicy::new(
                parse_or(&get, "READ_RETRY_ATTEMPTS", 10u32)?,
                Duration::from_millis(parse_or(&get, "READ_RETRY_DELAY_MS", 500u64)?),
            ),
            write: RetryPolicy::new(
                parse_or(&get, "WRITE_RETRY_ATTEMPTS", 12u32)?,
                Duration::from_millis(parse_or(&get, "WRITE_RETRY_DELAY_MS", 1000u64)?),
            ),
        };

        let api = ApiConfig {
            enabled: parse_bool_or(&get, "API_ENABLED", true),
            base_url: get("API_BASE_URL").unwrap_or_default(),
            timeout: Duration::from_secs(parse_or(&get, "API_TIMEOUT", 15u64)?),
        };

        let telegram = TelegramConfig {
            enabled: parse_bool_or(&get, "TELEGRAM_ENABLED", true),
            bot_token: get("TELEGRAM_BOT_TOKEN").unwrap_or_default(),
            chat_id: get("TELEGRAM_CHAT_ID").unwrap_or_default(),
            timeout: Duration::from_secs(parse_or(&get, "TELEGRAM_TIMEOUT", 10u64)?),
        };

        let mut config = Config {
            paths: PathsConfig {
                source_dir,
                dest_dir,
                state_dir,
            },
            compression,
            lock,
            retry,
            api,
            telegram,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// Sinks switched on without credentials are switched off again rather
    /// than failing the run; they are best-effort collaborators.
    fn validate(&mut self) -> Result<()> {
        let c = &self.compression;

        if c.max_width == 0 {
            return Err(IngestError::Config(
                "IMAGE_MAX_WIDTH must be greater than 0".to_string(),
            ));
        }

        if !(1..=100).contains(&c.initial_quality) {
            return Err(IngestError::Config(
                "IMAGE_QUALITY_INITIAL must be between 1 and 100".to_string(),
            ));
        }

        if c.min_quality == 0 || c.min_quality > c.initial_quality {
            return Err(IngestError::Config(
                "IMAGE_QUALITY_MIN must be between 1 and IMAGE_QUALITY_INITIAL".to_string(),
            ));
        }

        if c.quality_step == 0 {
            return Err(IngestError::Config(
                "IMAGE_COMPRESSION_STEP must be greater than 0".to_string(),
            ));
        }

        if c.max_iterations == 0 {
            return Err(IngestError::Config(
                "IMAGE_MAX_ITERATIONS must be greater than 0".to_string(),
            ));
        }

        if c.max_size_kb == 0 {
            return Err(IngestError::Config(
                "IMAGE_MAX_SIZE_KB must be greater than 0".to_string(),
            ));
        }

        if self.api.enabled && self.api.base_url.is_empty() {
            log::warn!("API_ENABLED is set but API_BASE_URL is empty; product API updates disabled");
            self.api.enabled = false;
        }

        if self.telegram.enabled
            && (self.telegram.bot_token.is_empty() || self.telegram.chat_id.is_empty())
        {
            log::warn!(
                "TELEGRAM_ENABLED is set but TELEGRAM_BOT_TOKEN or TELEGRAM_CHAT_ID is missing; notifications disabled"
            );
            self.telegram.enabled = false;
        }

        Ok(())
    }

    /// Get the watched source tree
    pub fn source_dir(&self) -> &Path {
        &self.paths.source_dir
    }

    /// Get the output directory
    pub fn dest_dir(&self) -> &Path {
        &self.paths.dest_dir
    }

    /// Path of the single-instance lock file
    pub fn lock_path(&self) -> PathBuf {
        self.paths.state_dir.join("photo_ingest.lock")
    }

    /// Path of the persisted run-state record
    pub fn state_path(&self) -> PathBuf {
        self.paths.state_dir.join("run_state.json")
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| IngestError::Config(format!("{} has an invalid value: {:?}", key, raw))),
    }
}

fn parse_bool_or<G>(get: &G, key: &str, default: bool) -> bool
where
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => default,
        Some(raw) => matches!(raw.to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
    }
}

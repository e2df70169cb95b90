//! Configuration loader
//!
//! Builds a [`ClientConfig`] from an optional file plus environment
//! overrides.
//!
//! ## Loading Strategy
//! 1. Probe the standard paths for a config file; use defaults if none exists
//! 2. Apply `STEADFAST_*` environment overrides on top
//! 3. Validate the result
//!
//! ## Environment Variables
//! - `STEADFAST_BASE_URL`: Prefix for relative request paths
//! - `STEADFAST_FAILURE_THRESHOLD`: Consecutive failures before a breaker opens
//! - `STEADFAST_RESET_TIMEOUT_MS`: Open-state cooldown
//! - `STEADFAST_HALF_OPEN_RETRIES`: Trial calls admitted while half-open
//! - `STEADFAST_MAX_CONCURRENT`: In-flight request cap
//! - `STEADFAST_CACHE_TTL_MS`: Lifetime of cached GET responses
//! - `STEADFAST_MAX_RETRIES`: Retries after the initial attempt
//! - `STEADFAST_BASE_RETRY_DELAY_MS`: First backoff delay
//! - `STEADFAST_REQUEST_TIMEOUT_MS`: Per-attempt timeout
//! - `STEADFAST_OFFLINE_QUEUE_TIMEOUT_MS`: How long offline requests wait
//! - `STEADFAST_OFFLINE_POLL_INTERVAL_MS`: Connectivity poll period
//! - `STEADFAST_USER_AGENT`: User-Agent header value
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./steadfast.toml`, `./steadfast.json`, `./config.toml`, `./config.json`
//!    (current working directory)
//! 2. The same names next to the executable

use std::path::{Path, PathBuf};
use std::str::FromStr;

use steadfast_domain::constants::ENV_PREFIX;
use steadfast_domain::{ClientConfig, Result, SteadfastError};

const CONFIG_FILE_NAMES: [&str; 4] = ["steadfast.toml", "steadfast.json", "config.toml", "config.json"];

/// Load configuration from the first config file found (or defaults), then
/// environment overrides
///
/// # Errors
/// Returns `SteadfastError::Config` if:
/// - A config file exists but cannot be read or parsed
/// - An environment override has an invalid value
/// - The merged configuration fails validation
pub fn load() -> Result<ClientConfig> {
    let base = match probe_config_paths() {
        Some(path) => load_from_file(Some(path))?,
        None => {
            tracing::debug!("No config file found, using defaults");
            ClientConfig::default()
        }
    };

    let config = load_from_env(base)?;
    config.validate()?;
    Ok(config)
}

/// Apply `STEADFAST_*` overrides on top of `base`
///
/// Unset variables leave the corresponding option untouched; an empty
/// `STEADFAST_BASE_URL` or `STEADFAST_USER_AGENT` clears it.
///
/// # Errors
/// Returns `SteadfastError::Config` if a variable cannot be parsed.
pub fn load_from_env(base: ClientConfig) -> Result<ClientConfig> {
    let mut config = base;

    if let Some(base_url) = env_string("BASE_URL") {
        config.base_url = (!base_url.is_empty()).then_some(base_url);
    }
    if let Some(agent) = env_string("USER_AGENT") {
        config.user_agent = (!agent.is_empty()).then_some(agent);
    }

    override_with(&mut config.failure_threshold, "FAILURE_THRESHOLD")?;
    override_with(&mut config.reset_timeout_ms, "RESET_TIMEOUT_MS")?;
    override_with(&mut config.half_open_retries, "HALF_OPEN_RETRIES")?;
    override_with(&mut config.max_concurrent, "MAX_CONCURRENT")?;
    override_with(&mut config.cache_ttl_ms, "CACHE_TTL_MS")?;
    override_with(&mut config.max_retries, "MAX_RETRIES")?;
    override_with(&mut config.base_retry_delay_ms, "BASE_RETRY_DELAY_MS")?;
    override_with(&mut config.request_timeout_ms, "REQUEST_TIMEOUT_MS")?;
    override_with(&mut config.offline_queue_timeout_ms, "OFFLINE_QUEUE_TIMEOUT_MS")?;
    override_with(&mut config.offline_poll_interval_ms, "OFFLINE_POLL_INTERVAL_MS")?;

    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, probes the standard locations. Supports JSON and
/// TOML (detected by file extension). Options missing from the file keep
/// their defaults.
///
/// # Errors
/// Returns `SteadfastError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
pub fn load_from_file(path: Option<PathBuf>) -> Result<ClientConfig> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(SteadfastError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            SteadfastError::Config(
                "No config file found in any of the standard locations".to_string(),
            )
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| SteadfastError::Config(format!("Failed to read config file: {}", e)))?;

    parse_config(&contents, &config_path)
}

/// Parse configuration from string content
///
/// Format is detected by file extension (`.json` or `.toml`).
fn parse_config(contents: &str, path: &Path) -> Result<ClientConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| SteadfastError::Config(format!("Invalid TOML format: {}", e))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| SteadfastError::Config(format!("Invalid JSON format: {}", e))),
        _ => Err(SteadfastError::Config(format!("Unsupported config format: {}", extension))),
    }
}

/// Probe the standard locations for a configuration file
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut dirs = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        dirs.push(cwd);
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            dirs.push(exe_dir.to_path_buf());
        }
    }

    dirs.iter()
        .flat_map(|dir| CONFIG_FILE_NAMES.iter().map(move |name| dir.join(name)))
        .find(|path| path.exists())
}

fn env_key(name: &str) -> String {
    format!("{ENV_PREFIX}{name}")
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(env_key(name)).ok().map(|value| value.trim().to_string())
}

/// Parse an optional numeric override
///
/// # Errors
/// Returns `SteadfastError::Config` naming the variable if it is set but
/// does not parse.
fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_string(name) {
        None => Ok(None),
        Some(raw) => raw.parse::<T>().map(Some).map_err(|e| {
            SteadfastError::Config(format!("Invalid value for {}: {} ({})", env_key(name), raw, e))
        }),
    }
}

fn override_with<T>(slot: &mut T, name: &str) -> Result<()>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(value) = env_parse(name)? {
        *slot = value;
    }
    Ok(())
}

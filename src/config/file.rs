//! Optional config file with harvest defaults.
//!
//! The format is a flat subset of TOML: one `key = value` per line, `#`
//! comments, double-quoted strings, bare integers and booleans. Unknown keys
//! and out-of-range values are rejected so typos don't silently fall back to
//! defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use url::Url;

use super::{HarvestSettings, MAX_CAPTCHA_ATTEMPTS, MAX_PAGE};

/// Directory name under the user config home.
const CONFIG_DIR_NAME: &str = "portal-harvester";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Errors raised while loading or applying a config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config syntax on line {line}: expected key = value")]
    Syntax { line: usize },

    #[error("unknown configuration key '{key}' on line {line}")]
    UnknownKey { key: String, line: usize },

    #[error("invalid `{key}` value on line {line}: {reason}")]
    InvalidValue {
        key: &'static str,
        line: usize,
        reason: String,
    },

    #[error("invalid config value for `{key}`: {value}. Expected range: {expected}")]
    OutOfRange {
        key: &'static str,
        value: u64,
        expected: &'static str,
    },
}

/// Values read from a config file. `None` means "not set in the file".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    pub base_url: Option<Url>,
    pub first_page: Option<u32>,
    pub last_page: Option<u32>,
    pub output_dir: Option<PathBuf>,
    pub requester_name: Option<String>,
    pub requester_email: Option<String>,
    pub requester_purpose: Option<String>,
    pub usage_type: Option<String>,
    pub dedupe_links: Option<bool>,
    pub stop_on_empty_page: Option<bool>,
    pub write_report: Option<bool>,
    pub headless: Option<bool>,
    pub captcha_attempts: Option<u32>,
    pub page_retry_attempts: Option<u32>,
    pub max_consecutive_page_failures: Option<u32>,
    pub navigation_timeout_secs: Option<u64>,
    pub page_settle_ms: Option<u64>,
    pub form_wait_ms: Option<u64>,
    pub download_timeout_secs: Option<u64>,
    pub chromium_path: Option<PathBuf>,
    pub tesseract_path: Option<PathBuf>,
}

impl FileConfig {
    /// Validates values against runtime constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::OutOfRange`] for the first value outside its range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("first_page", self.first_page.map(u64::from), 1, u64::from(MAX_PAGE), "1..=10000")?;
        check_range("last_page", self.last_page.map(u64::from), 1, u64::from(MAX_PAGE), "1..=10000")?;
        check_range(
            "captcha_attempts",
            self.captcha_attempts.map(u64::from),
            1,
            u64::from(MAX_CAPTCHA_ATTEMPTS),
            "1..=10",
        )?;
        check_range("page_retry_attempts", self.page_retry_attempts.map(u64::from), 1, 10, "1..=10")?;
        check_range(
            "max_consecutive_page_failures",
            self.max_consecutive_page_failures.map(u64::from),
            1,
            100,
            "1..=100",
        )?;
        check_range("navigation_timeout_secs", self.navigation_timeout_secs, 1, 600, "1..=600")?;
        check_range("page_settle_ms", self.page_settle_ms, 0, 60_000, "0..=60000")?;
        check_range("form_wait_ms", self.form_wait_ms, 0, 60_000, "0..=60000")?;
        check_range("download_timeout_secs", self.download_timeout_secs, 1, 3600, "1..=3600")?;
        Ok(())
    }

    /// Overlays every value set in the file onto `settings`.
    pub fn apply_to(&self, settings: &mut HarvestSettings) {
        if let Some(base_url) = &self.base_url {
            settings.base_url = base_url.clone();
        }
        if let Some(first_page) = self.first_page {
            settings.first_page = first_page;
        }
        if let Some(last_page) = self.last_page {
            settings.last_page = last_page;
        }
        if let Some(output_dir) = &self.output_dir {
            settings.output_dir.clone_from(output_dir);
        }
        if let Some(name) = &self.requester_name {
            settings.requester.name.clone_from(name);
        }
        if let Some(email) = &self.requester_email {
            settings.requester.email.clone_from(email);
        }
        if let Some(purpose) = &self.requester_purpose {
            settings.requester.purpose.clone_from(purpose);
        }
        if let Some(usage_type) = &self.usage_type {
            settings.requester.usage_type.clone_from(usage_type);
        }
        if let Some(dedupe) = self.dedupe_links {
            settings.dedupe_links = dedupe;
        }
        if let Some(stop) = self.stop_on_empty_page {
            settings.stop_on_empty_page = stop;
        }
        if let Some(write_report) = self.write_report {
            settings.write_report = write_report;
        }
        if let Some(headless) = self.headless {
            settings.browser.headless = headless;
        }
        if let Some(attempts) = self.captcha_attempts {
            settings.captcha_attempts = attempts;
        }
        if let Some(attempts) = self.page_retry_attempts {
            settings.page_retry_attempts = attempts;
        }
        if let Some(limit) = self.max_consecutive_page_failures {
            settings.max_consecutive_page_failures = limit;
        }
        if let Some(secs) = self.navigation_timeout_secs {
            settings.waits.navigation_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = self.page_settle_ms {
            settings.waits.page_settle = Duration::from_millis(ms);
        }
        if let Some(ms) = self.form_wait_ms {
            settings.waits.form_wait = Duration::from_millis(ms);
        }
        if let Some(secs) = self.download_timeout_secs {
            settings.waits.download_timeout = Duration::from_secs(secs);
        }
        if let Some(path) = &self.chromium_path {
            settings.browser.executable = Some(path.clone());
        }
        if let Some(path) = &self.tesseract_path {
            settings.tesseract_path = Some(path.clone());
        }
    }
}

fn check_range(
    key: &'static str,
    value: Option<u64>,
    min: u64,
    max: u64,
    expected: &'static str,
) -> Result<(), ConfigError> {
    match value {
        Some(value) if !(min..=max).contains(&value) => Err(ConfigError::OutOfRange {
            key,
            value,
            expected,
        }),
        _ => Ok(()),
    }
}

/// Loaded config metadata.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Resolved config path if a base directory is known.
    pub path: Option<PathBuf>,
    /// Parsed file config when a config file exists and was valid.
    pub config: Option<FileConfig>,
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/portal-harvester/config.toml`
/// 2. `$HOME/.config/portal-harvester/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join(CONFIG_DIR_NAME)
                .join(CONFIG_FILE_NAME),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads config from the default path if present. A missing file is not an error.
///
/// # Errors
///
/// Returns [`ConfigError`] when the file exists but cannot be read or parsed.
pub fn load_default_file_config() -> Result<LoadedConfig, ConfigError> {
    let path = resolve_default_config_path();
    let config = match path.as_deref() {
        Some(path_ref) if path_ref.exists() => Some(load_config_file(path_ref)?),
        _ => None,
    };
    Ok(LoadedConfig { path, config })
}

/// Loads and validates the config file at `path`.
///
/// # Errors
///
/// Returns [`ConfigError`] when the file cannot be read or parsed.
pub fn load_config_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config_str(&raw)
}

/// Parses config text.
///
/// # Errors
///
/// Returns [`ConfigError`] on bad syntax, unknown keys, or invalid values.
pub fn parse_config_str(raw: &str) -> Result<FileConfig, ConfigError> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line_no = line_index + 1;
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            return Err(ConfigError::Syntax { line: line_no });
        };
        let value = Value {
            raw: raw_value.trim(),
            line: line_no,
        };

        match raw_key.trim() {
            "base_url" => {
                let parsed = value.string("base_url")?;
                let url = Url::parse(&parsed).map_err(|e| value.invalid("base_url", e))?;
                cfg.base_url = Some(url);
            }
            "first_page" => cfg.first_page = Some(value.u32("first_page")?),
            "last_page" => cfg.last_page = Some(value.u32("last_page")?),
            "output_dir" => cfg.output_dir = Some(PathBuf::from(value.string("output_dir")?)),
            "requester_name" => cfg.requester_name = Some(value.string("requester_name")?),
            "requester_email" => cfg.requester_email = Some(value.string("requester_email")?),
            "requester_purpose" => {
                cfg.requester_purpose = Some(value.string("requester_purpose")?);
            }
            "usage_type" => cfg.usage_type = Some(value.string("usage_type")?),
            "dedupe_links" => cfg.dedupe_links = Some(value.boolean("dedupe_links")?),
            "stop_on_empty_page" => {
                cfg.stop_on_empty_page = Some(value.boolean("stop_on_empty_page")?);
            }
            "write_report" => cfg.write_report = Some(value.boolean("write_report")?),
            "headless" => cfg.headless = Some(value.boolean("headless")?),
            "captcha_attempts" => cfg.captcha_attempts = Some(value.u32("captcha_attempts")?),
            "page_retry_attempts" => {
                cfg.page_retry_attempts = Some(value.u32("page_retry_attempts")?);
            }
            "max_consecutive_page_failures" => {
                cfg.max_consecutive_page_failures =
                    Some(value.u32("max_consecutive_page_failures")?);
            }
            "navigation_timeout_secs" => {
                cfg.navigation_timeout_secs = Some(value.u64("navigation_timeout_secs")?);
            }
            "page_settle_ms" => cfg.page_settle_ms = Some(value.u64("page_settle_ms")?),
            "form_wait_ms" => cfg.form_wait_ms = Some(value.u64("form_wait_ms")?),
            "download_timeout_secs" => {
                cfg.download_timeout_secs = Some(value.u64("download_timeout_secs")?);
            }
            "chromium_path" => {
                cfg.chromium_path = Some(PathBuf::from(value.string("chromium_path")?));
            }
            "tesseract_path" => {
                cfg.tesseract_path = Some(PathBuf::from(value.string("tesseract_path")?));
            }
            unknown => {
                return Err(ConfigError::UnknownKey {
                    key: unknown.to_string(),
                    line: line_no,
                });
            }
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

/// Raw right-hand side of one `key = value` line.
struct Value<'a> {
    raw: &'a str,
    line: usize,
}

impl Value<'_> {
    fn invalid(&self, key: &'static str, reason: impl ToString) -> ConfigError {
        ConfigError::InvalidValue {
            key,
            line: self.line,
            reason: reason.to_string(),
        }
    }

    fn string(&self, key: &'static str) -> Result<String, ConfigError> {
        let raw = self.raw;
        if raw.len() < 2 || !raw.starts_with('"') || !raw.ends_with('"') {
            return Err(self.invalid(key, "expected double-quoted string"));
        }
        Ok(raw[1..raw.len() - 1].to_string())
    }

    fn u64(&self, key: &'static str) -> Result<u64, ConfigError> {
        if self.raw.is_empty() {
            return Err(self.invalid(key, "expected integer value"));
        }
        self.raw
            .parse::<u64>()
            .map_err(|_| self.invalid(key, "expected non-negative integer"))
    }

    fn u32(&self, key: &'static str) -> Result<u32, ConfigError> {
        let value = self.u64(key)?;
        u32::try_from(value).map_err(|_| self.invalid(key, "integer value out of range"))
    }

    fn boolean(&self, key: &'static str) -> Result<bool, ConfigError> {
        match self.raw {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(self.invalid(key, "expected `true` or `false`")),
        }
    }
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

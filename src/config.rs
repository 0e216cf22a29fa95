//! Scraper configuration: defaults, optional config file, validation.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};

/// Default catalog index URL.
pub const DEFAULT_BASE_URL: &str = "https://books.toscrape.com";

/// Default delay between page fetches, in seconds.
pub const DEFAULT_PAGE_DELAY_SECS: f64 = 1.0;

/// Default HTTP request timeout, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Resolved scraper settings. Every field has a default; a config file only
/// overrides the keys it names.
#[derive(Debug, Clone, PartialEq)]
pub struct ScraperConfig {
    /// Catalog index URL the walker starts from.
    pub base_url: String,
    /// Delay between consecutive page fetches, in seconds.
    pub page_delay_secs: f64,
    /// Retry budget per page (attempts = retries + 1).
    pub max_retries: u32,
    /// HTTP request timeout, in seconds.
    pub timeout_secs: u64,
    /// Directory holding the store and history files.
    pub data_dir: PathBuf,
    /// Store file name, relative to `data_dir`.
    pub store_filename: String,
    /// History log file name, relative to `data_dir`.
    pub history_filename: String,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            page_delay_secs: DEFAULT_PAGE_DELAY_SECS,
            max_retries: crate::fetch::DEFAULT_MAX_RETRIES,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            data_dir: PathBuf::from("data"),
            store_filename: "books_data.csv".to_string(),
            history_filename: "scraping_history.csv".to_string(),
        }
    }
}

impl ScraperConfig {
    /// Full path to the durable store file.
    #[must_use]
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join(&self.store_filename)
    }

    /// Full path to the history log file.
    #[must_use]
    pub fn history_path(&self) -> PathBuf {
        self.data_dir.join(&self.history_filename)
    }

    /// Delay between page fetches as a [`Duration`].
    #[must_use]
    pub fn page_delay(&self) -> Duration {
        Duration::from_secs_f64(self.page_delay_secs.max(0.0))
    }

    /// Validates field values against runtime constraints.
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            bail!("Invalid config value for `base_url`: must not be empty");
        }
        if !(0.0..=60.0).contains(&self.page_delay_secs) {
            bail!(
                "Invalid config value for `page_delay_secs`: {}. Expected range: 0..=60",
                self.page_delay_secs
            );
        }
        if self.max_retries > 10 {
            bail!(
                "Invalid config value for `max_retries`: {}. Expected range: 0..=10",
                self.max_retries
            );
        }
        if !(1..=3600).contains(&self.timeout_secs) {
            bail!(
                "Invalid config value for `timeout_secs`: {}. Expected range: 1..=3600",
                self.timeout_secs
            );
        }
        Ok(())
    }
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/bookdex/config.toml`
/// 2. `$HOME/.config/bookdex/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("bookdex")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("bookdex")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads configuration, merging the config file (if any) over the defaults.
///
/// With an explicit `path`, the file must exist and parse. Without one, a
/// missing default-path file is not an error and plain defaults are returned.
pub fn load_config(path: Option<&Path>) -> Result<ScraperConfig> {
    match path {
        Some(explicit) => load_config_file(explicit),
        None => {
            let Some(default_path) = resolve_default_config_path() else {
                return Ok(ScraperConfig::default());
            };
            if !default_path.exists() {
                return Ok(ScraperConfig::default());
            }
            load_config_file(&default_path)
        }
    }
}

fn load_config_file(path: &Path) -> Result<ScraperConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<ScraperConfig> {
    let mut cfg = ScraperConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!(
                "Invalid config syntax on line {}: expected key = value",
                line_index + 1
            );
        };

        let key = raw_key.trim();
        let value = raw_value.trim();

        match key {
            "base_url" => {
                cfg.base_url = parse_string_literal(value).with_context(|| {
                    format!("Invalid `base_url` value on line {}", line_index + 1)
                })?;
            }
            "page_delay_secs" => {
                cfg.page_delay_secs = parse_float(value).with_context(|| {
                    format!("Invalid `page_delay_secs` value on line {}", line_index + 1)
                })?;
            }
            "max_retries" => {
                let parsed = parse_integer_u64(value).with_context(|| {
                    format!("Invalid `max_retries` value on line {}", line_index + 1)
                })?;
                cfg.max_retries = u32::try_from(parsed)
                    .map_err(|_| anyhow::anyhow!("max_retries out of range for u32"))?;
            }
            "timeout_secs" => {
                cfg.timeout_secs = parse_integer_u64(value).with_context(|| {
                    format!("Invalid `timeout_secs` value on line {}", line_index + 1)
                })?;
            }
            "data_dir" => {
                let parsed = parse_string_literal(value).with_context(|| {
                    format!("Invalid `data_dir` value on line {}", line_index + 1)
                })?;
                cfg.data_dir = PathBuf::from(parsed);
            }
            "store_filename" => {
                cfg.store_filename = parse_string_literal(value).with_context(|| {
                    format!("Invalid `store_filename` value on line {}", line_index + 1)
                })?;
            }
            "history_filename" => {
                cfg.history_filename = parse_string_literal(value).with_context(|| {
                    format!("Invalid `history_filename` value on line {}", line_index + 1)
                })?;
            }
            unknown => {
                bail!(
                    "Unknown configuration key: '{}' on line {}",
                    unknown,
                    line_index + 1
                );
            }
        }
    }
    cfg.validate()?;
    Ok(cfg)
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

fn parse_string_literal(raw_value: &str) -> Result<String> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        bail!("Expected double-quoted string");
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

fn parse_integer_u64(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i128>()?;
    if value < 0 {
        bail!("Expected non-negative integer");
    }
    u64::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u64"))
}

fn parse_float(raw_value: &str) -> Result<f64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected numeric value");
    }
    let value = token.parse::<f64>()?;
    if !value.is_finite() {
        bail!("Expected finite numeric value");
    }
    Ok(value)
}

//! Configuration file loading for decision thresholds and history storage.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use releasegate_core::DecisionSettings;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Database file used when neither the CLI nor the config names one.
pub const DEFAULT_DATABASE_PATH: &str = "releasegate.db";

/// `key = value` file configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    /// Minimum release size per album in megabytes.
    pub min_size_mb: Option<u64>,
    /// Maximum release size per album in megabytes.
    pub max_size_mb: Option<u64>,
    /// Minimum seeders for torrent releases.
    pub min_seeders: Option<u32>,
    /// Usenet retention in days.
    pub retention_days: Option<u64>,
    /// Minimum Usenet post age in minutes.
    pub minimum_age_minutes: Option<u64>,
    /// Reject encrypted releases (default true).
    pub reject_encrypted: Option<bool>,
    /// Search for a replacement after a failed download (default true).
    pub auto_redownload_failed: Option<bool>,
    /// Grab history database file.
    pub database_path: Option<PathBuf>,
}

impl FileConfig {
    /// Validates config values against runtime constraints.
    pub fn validate(&self) -> Result<()> {
        validate_max("min_size_mb", self.min_size_mb, 1_000_000)?;
        validate_max("max_size_mb", self.max_size_mb, 1_000_000)?;
        if let (Some(min), Some(max)) = (self.min_size_mb, self.max_size_mb)
            && min > max
        {
            bail!(
                "Invalid config value for `min_size_mb`: {min}. Must not exceed `max_size_mb` ({max})"
            );
        }
        validate_max("min_seeders", self.min_seeders.map(u64::from), 100_000)?;
        validate_max("retention_days", self.retention_days, 36_500)?;
        validate_max("minimum_age_minutes", self.minimum_age_minutes, 10_080)?;
        Ok(())
    }

    /// Thresholds for the admission chain.
    #[must_use]
    pub fn decision_settings(&self) -> DecisionSettings {
        let defaults = DecisionSettings::default();
        DecisionSettings {
            min_size: self.min_size_mb.map(|mb| mb * BYTES_PER_MB),
            max_size: self.max_size_mb.map(|mb| mb * BYTES_PER_MB),
            min_seeders: self.min_seeders,
            retention_days: self.retention_days,
            minimum_age_minutes: self.minimum_age_minutes,
            reject_encrypted: self.reject_encrypted.unwrap_or(defaults.reject_encrypted),
        }
    }

    #[must_use]
    pub fn auto_redownload(&self) -> bool {
        self.auto_redownload_failed.unwrap_or(true)
    }
}

fn validate_max(field: &str, value: Option<u64>, max: u64) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if value > max {
        bail!("Invalid config value for `{field}`: {value}. Expected range: 0..={max}");
    }
    Ok(())
}

/// Loaded config metadata.
#[derive(Debug, Clone, Default)]
pub struct LoadedConfig {
    /// Resolved config path if a base directory is known.
    pub path: Option<PathBuf>,
    /// Parsed config; defaults when no file was found.
    pub config: FileConfig,
    /// Indicates whether configuration was loaded from disk.
    pub loaded_from_file: bool,
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/releasegate/config.toml`
/// 2. `$HOME/.config/releasegate/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("releasegate")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("releasegate")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads config from `explicit` or, failing that, the default path.
///
/// An explicit path must exist; a missing default file yields defaults.
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    if let Some(path) = explicit {
        let config = load_file_config(path)?;
        return Ok(LoadedConfig {
            path: Some(path.to_path_buf()),
            config,
            loaded_from_file: true,
        });
    }

    let path = resolve_default_config_path();
    match path.as_deref() {
        Some(path_ref) if path_ref.exists() => {
            let config = load_file_config(path_ref)?;
            Ok(LoadedConfig {
                path,
                config,
                loaded_from_file: true,
            })
        }
        _ => Ok(LoadedConfig {
            path,
            config: FileConfig::default(),
            loaded_from_file: false,
        }),
    }
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
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
        let line_number = line_index + 1;

        match key {
            "min_size_mb" => {
                cfg.min_size_mb = Some(parse_integer_u64(value).with_context(|| {
                    format!("Invalid `min_size_mb` value on line {line_number}")
                })?);
            }
            "max_size_mb" => {
                cfg.max_size_mb = Some(parse_integer_u64(value).with_context(|| {
                    format!("Invalid `max_size_mb` value on line {line_number}")
                })?);
            }
            "min_seeders" => {
                let parsed = parse_integer_u64(value).with_context(|| {
                    format!("Invalid `min_seeders` value on line {line_number}")
                })?;
                let n = u32::try_from(parsed)
                    .map_err(|_| anyhow::anyhow!("min_seeders out of range for u32"))?;
                cfg.min_seeders = Some(n);
            }
            "retention_days" => {
                cfg.retention_days = Some(parse_integer_u64(value).with_context(|| {
                    format!("Invalid `retention_days` value on line {line_number}")
                })?);
            }
            "minimum_age_minutes" => {
                cfg.minimum_age_minutes = Some(parse_integer_u64(value).with_context(|| {
                    format!("Invalid `minimum_age_minutes` value on line {line_number}")
                })?);
            }
            "reject_encrypted" => {
                cfg.reject_encrypted = Some(parse_boolean(value).with_context(|| {
                    format!("Invalid `reject_encrypted` value on line {line_number}")
                })?);
            }
            "auto_redownload_failed" => {
                cfg.auto_redownload_failed = Some(parse_boolean(value).with_context(|| {
                    format!("Invalid `auto_redownload_failed` value on line {line_number}")
                })?);
            }
            "database_path" => {
                let parsed = parse_string_literal(value).with_context(|| {
                    format!("Invalid `database_path` value on line {line_number}")
                })?;
                cfg.database_path = Some(PathBuf::from(parsed));
            }
            unknown => {
                bail!("Unknown configuration key: '{unknown}' on line {line_number}");
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

fn parse_boolean(raw_value: &str) -> Result<bool> {
    match raw_value.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => bail!("Expected 'true' or 'false'"),
    }
}

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Deserializer};

use crate::destination::client::DEFAULT_DESTINATION_URL;
use crate::destination::DestinationClientConfig;
use crate::retry::RetryConfig;
use crate::source::client::DEFAULT_SOURCE_URL;
use crate::source::SourceClientConfig;
use crate::sync::{SyncConfig, DEFAULT_DEVICE_ID};

/// The config file as written by users of the earlier youai export scripts.
///
/// Key names follow that format (`Cookie` is capitalised). Keys this tool
/// has no use for, such as `need_thumbnail`, are ignored.
#[derive(Deserialize)]
pub struct FileConfig {
    #[serde(rename = "Cookie")]
    pub cookie: String,
    #[serde(deserialize_with = "string_or_number")]
    pub clienttype: String,
    #[serde(deserialize_with = "string_or_number")]
    pub bdstoken: String,
    #[serde(default = "default_flag", deserialize_with = "string_or_number")]
    pub need_amount: String,
    #[serde(default = "default_flag", deserialize_with = "string_or_number")]
    pub need_member: String,
    #[serde(default)]
    pub immich_key: Option<String>,
    #[serde(default = "default_retry_times")]
    pub retry_times: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    #[serde(default = "default_immich_url")]
    pub immich_url: String,
    #[serde(default = "default_source_url")]
    pub source_url: String,
    #[serde(default = "default_skip_extensions")]
    pub skip_extensions: Vec<String>,
    #[serde(default = "default_true")]
    pub clear_downloads: bool,
}

fn default_flag() -> String {
    "1".to_string()
}

fn default_retry_times() -> u32 {
    RetryConfig::default().max_attempts
}

fn default_retry_delay() -> u64 {
    RetryConfig::default().delay_secs
}

fn default_request_timeout() -> u64 {
    30
}

fn default_immich_url() -> String {
    DEFAULT_DESTINATION_URL.to_string()
}

fn default_source_url() -> String {
    DEFAULT_SOURCE_URL.to_string()
}

fn default_skip_extensions() -> Vec<String> {
    vec!["livp".to_string()]
}

fn default_true() -> bool {
    true
}

/// Accept `70`, `"70"` or `true` for parameters the service takes as strings.
fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Int(i64),
        Bool(bool),
    }
    Ok(match Raw::deserialize(deserializer)? {
        Raw::Str(s) => s,
        Raw::Int(n) => n.to_string(),
        Raw::Bool(b) => u8::from(b).to_string(),
    })
}

/// Application configuration, resolved from the config file and CLI.
///
/// `Debug` is safe to log: both client configs redact their credentials.
#[derive(Debug)]
pub struct Config {
    pub source: SourceClientConfig,
    pub destination: DestinationClientConfig,
    pub retry: RetryConfig,
    pub sync: SyncConfig,
    pub out_dir: PathBuf,
    pub clear_downloads: bool,
}

pub(crate) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

/// `".LIVP"` and `"livp"` both mean the same deny-list entry.
fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_ascii_lowercase()
}

impl Config {
    pub fn load(cli: &crate::cli::Cli) -> anyhow::Result<Self> {
        let path = expand_tilde(&cli.config);
        let file = read_file_config(&path)?;
        Self::resolve(file, cli)
    }

    pub fn resolve(file: FileConfig, cli: &crate::cli::Cli) -> anyhow::Result<Self> {
        let api_key = cli
            .immich_key
            .clone()
            .or(file.immich_key)
            .filter(|k| !k.is_empty())
            .context(
                "No Immich API key: set `immich_key` in the config file, \
                 pass --immich-key, or set IMMICH_API_KEY",
            )?;
        let timeout = Duration::from_secs(file.request_timeout);

        Ok(Self {
            source: SourceClientConfig {
                base_url: file.source_url,
                cookie: file.cookie,
                clienttype: file.clienttype,
                bdstoken: file.bdstoken,
                need_amount: file.need_amount,
                need_member: file.need_member,
                timeout,
            },
            destination: DestinationClientConfig {
                base_url: file.immich_url,
                api_key,
                timeout,
            },
            retry: RetryConfig {
                max_attempts: file.retry_times,
                delay_secs: file.retry_delay,
            },
            sync: SyncConfig {
                skip_extensions: file
                    .skip_extensions
                    .iter()
                    .map(|e| normalize_extension(e))
                    .filter(|e| !e.is_empty())
                    .collect(),
                device_id: DEFAULT_DEVICE_ID.to_string(),
                no_progress_bar: cli.no_progress_bar,
            },
            out_dir: expand_tilde(&cli.out_dir),
            clear_downloads: file.clear_downloads,
        })
    }
}

fn read_file_config(path: &Path) -> anyhow::Result<FileConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read config file {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid config file {}", path.display()))
}

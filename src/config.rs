use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::preferences::Preferences;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub portal: PortalConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub raw_pages: RawPagesConfig,
    #[serde(default)]
    pub mock: MockConfig,
    #[serde(default)]
    pub digest: DigestConfig,
    #[serde(default)]
    pub preferences: Preferences,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalConfig {
    #[serde(default = "default_portal_base_url")]
    pub base_url: String,
    #[serde(default = "default_portal_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_scorer_url")]
    pub scorer_url: String,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// No request timeout when unset; failures surface only as transport errors.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPagesConfig {
    #[serde(default = "default_raw_ttl_secs")]
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockConfig {
    #[serde(default = "default_mock_count")]
    pub count: usize,
    /// Fixed seed for reproducible sample data; a time-based seed is used when unset.
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DigestSource {
    Portal,
    Mock,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigestConfig {
    #[serde(default = "default_schedule_time")]
    pub schedule_time: String,
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    #[serde(default = "default_digest_source")]
    pub source: DigestSource,
    #[serde(default = "default_true")]
    pub enable_stdout: bool,
    #[serde(default)]
    pub webhook_url: String,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub scorer_url: Option<String>,
    pub db_path: Option<String>,
}

impl Config {
    pub fn default_path() -> PathBuf {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home.join(".config/shiftmatch/config.toml")
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(|p| p.to_path_buf())
            .unwrap_or_else(Self::default_path);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(&path)
            .with_context(|| format!("failed reading config: {}", path.display()))?;
        let parsed: Self = toml::from_str(&data)
            .with_context(|| format!("failed parsing TOML config: {}", path.display()))?;
        parsed
            .preferences
            .validate()
            .with_context(|| format!("invalid [preferences] in {}", path.display()))?;
        parsed.digest.schedule()?;
        Ok(parsed)
    }

    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(host) = overrides.host {
            self.server.host = host;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(scorer_url) = overrides.scorer_url {
            self.sync.scorer_url = scorer_url;
        }
        if let Some(db_path) = overrides.db_path {
            self.storage.db_path = db_path;
        }
    }

    pub fn write_template(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed creating config directory: {}", parent.display())
            })?;
        }
        fs::write(path, Self::default_template())
            .with_context(|| format!("failed writing config template: {}", path.display()))
    }

    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }

    pub fn default_template() -> String {
        let template = r#"[server]
host = "127.0.0.1"
port = 5050

[portal]
base_url = "https://members.foodcoop.com"
timeout_secs = 15

[sync]
scorer_url = "http://127.0.0.1:5050/api/shifts"
debounce_ms = 500

[storage]
db_path = "~/.local/share/shiftmatch/shiftmatch.db"

[raw_pages]
ttl_secs = 600

[mock]
count = 30

[digest]
schedule_time = "20:01"
top_n = 5
source = "portal"
enable_stdout = true
webhook_url = ""

[preferences]
days = ["Monday", "Saturday"]
times = ["Morning"]
committees = ["Receiving", "Produce"]
excluded_committees = []
"#;
        template.to_string()
    }
}

impl SyncConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

impl PortalConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

impl RawPagesConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl DigestConfig {
    pub fn schedule(&self) -> Result<NaiveTime> {
        NaiveTime::parse_from_str(self.schedule_time.trim(), "%H:%M").map_err(|e| {
            anyhow!(
                "invalid digest schedule_time {:?} (expected HH:MM): {e}",
                self.schedule_time
            )
        })
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            base_url: default_portal_base_url(),
            timeout_secs: default_portal_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            scorer_url: default_scorer_url(),
            debounce_ms: default_debounce_ms(),
            request_timeout_secs: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

impl Default for RawPagesConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_raw_ttl_secs(),
        }
    }
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            count: default_mock_count(),
            seed: None,
        }
    }
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            schedule_time: default_schedule_time(),
            top_n: default_top_n(),
            source: default_digest_source(),
            enable_stdout: true,
            webhook_url: String::new(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5050
}

fn default_portal_base_url() -> String {
    "https://members.foodcoop.com".to_string()
}

fn default_portal_timeout_secs() -> u64 {
    15
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
        .to_string()
}

fn default_scorer_url() -> String {
    "http://127.0.0.1:5050/api/shifts".to_string()
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_db_path() -> String {
    "~/.local/share/shiftmatch/shiftmatch.db".to_string()
}

fn default_raw_ttl_secs() -> u64 {
    600
}

fn default_mock_count() -> usize {
    30
}

fn default_schedule_time() -> String {
    "20:01".to_string()
}

fn default_top_n() -> usize {
    5
}

fn default_digest_source() -> DigestSource {
    DigestSource::Portal
}

fn default_true() -> bool {
    true
}

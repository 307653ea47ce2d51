use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub sources: SourcesConfig,

    #[serde(default)]
    pub acquisition: AcquisitionConfig,

    #[serde(default)]
    pub transcode: TranscodeConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Origins allowed by CORS (empty = any origin)
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// Remote REST blob service
    #[default]
    Http,
    /// Directory on the local filesystem
    Local,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub kind: StoreKind,

    /// Base URL of the blob service (kind = "http")
    #[serde(default)]
    pub base_url: Option<String>,

    /// Bearer token sent to the blob service
    #[serde(default)]
    pub token: Option<String>,

    /// Root directory (kind = "local")
    #[serde(default = "default_store_root")]
    pub root: PathBuf,

    /// Maximum concurrent connections to the store (default: 50)
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_store_root() -> PathBuf {
    PathBuf::from("./objects")
}
fn default_max_connections() -> usize {
    50
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_request_timeout() -> u64 {
    30
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::default(),
            base_url: None,
            token: None,
            root: default_store_root(),
            max_connections: default_max_connections(),
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourcesConfig {
    /// Registry listing the live provider instances
    #[serde(default)]
    pub registry_url: Option<String>,

    /// Instances used when the registry is unset or unreachable
    #[serde(default = "default_fallback_instances")]
    pub fallback_instances: Vec<String>,

    /// How long a fetched instance list stays fresh (default: 1 hour)
    #[serde(default = "default_refresh_ttl")]
    pub refresh_ttl_secs: u64,

    /// Per-provider timeout for search and stream lookups (default: 6s)
    #[serde(default = "default_search_timeout")]
    pub search_timeout_secs: u64,

    /// Codec families in order of preference
    #[serde(default = "default_preferred_codecs")]
    pub preferred_codecs: Vec<String>,
}

fn default_fallback_instances() -> Vec<String> {
    vec![
        "https://pipedapi.kavin.rocks".to_string(),
        "https://pipedapi.adminforge.de".to_string(),
    ]
}
fn default_refresh_ttl() -> u64 {
    3600
}
fn default_search_timeout() -> u64 {
    6
}
fn default_preferred_codecs() -> Vec<String> {
    vec!["opus".to_string(), "mp4a".to_string()]
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            registry_url: None,
            fallback_instances: default_fallback_instances(),
            refresh_ttl_secs: default_refresh_ttl(),
            search_timeout_secs: default_search_timeout(),
            preferred_codecs: default_preferred_codecs(),
        }
    }
}

impl SourcesConfig {
    pub fn search_timeout(&self) -> Duration {
        Duration::from_secs(self.search_timeout_secs)
    }

    pub fn refresh_ttl(&self) -> Duration {
        Duration::from_secs(self.refresh_ttl_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AcquisitionConfig {
    /// Folder used when a download request names none
    #[serde(default)]
    pub default_destination: Option<String>,

    /// Progress polling interval (default: 500ms)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Time a terminal job stays readable after first delivery (default: 5s)
    #[serde(default = "default_delivery_grace")]
    pub delivery_grace_secs: u64,

    /// Time an unobserved terminal job is kept (default: 10 minutes)
    #[serde(default = "default_orphan_ttl")]
    pub orphan_ttl_secs: u64,

    /// Abort a download when no bytes arrive for this long (default: 30s)
    #[serde(default = "default_idle_timeout")]
    pub download_idle_timeout_secs: u64,

    /// Parent directory for per-job scratch space (default: system temp)
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
}

fn default_poll_interval() -> u64 {
    500
}
fn default_delivery_grace() -> u64 {
    5
}
fn default_orphan_ttl() -> u64 {
    600
}
fn default_idle_timeout() -> u64 {
    30
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            default_destination: None,
            poll_interval_ms: default_poll_interval(),
            delivery_grace_secs: default_delivery_grace(),
            orphan_ttl_secs: default_orphan_ttl(),
            download_idle_timeout_secs: default_idle_timeout(),
            temp_dir: None,
        }
    }
}

impl AcquisitionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn delivery_grace(&self) -> Duration {
        Duration::from_secs(self.delivery_grace_secs)
    }

    pub fn orphan_ttl(&self) -> Duration {
        Duration::from_secs(self.orphan_ttl_secs)
    }

    pub fn download_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.download_idle_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TranscodeConfig {
    /// Convert downloads with ffmpeg; otherwise store the source audio as-is
    #[serde(default = "default_transcode_enabled")]
    pub enabled: bool,

    /// Explicit ffmpeg binary (default: looked up on PATH)
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    #[serde(default = "default_codec")]
    pub codec: String,

    #[serde(default = "default_bitrate")]
    pub bitrate: String,

    /// Output container, also used as the file extension
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_transcode_enabled() -> bool {
    true
}
fn default_codec() -> String {
    "libmp3lame".to_string()
}
fn default_bitrate() -> String {
    "192k".to_string()
}
fn default_format() -> String {
    "mp3".to_string()
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            enabled: default_transcode_enabled(),
            ffmpeg_path: None,
            codec: default_codec(),
            bitrate: default_bitrate(),
            format: default_format(),
        }
    }
}

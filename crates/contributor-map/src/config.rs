//! Pipeline configuration
//!
//! Defaults are overlaid by `CONTRIB_MAP_*` environment variables, then by
//! command-line flags in the binary.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_API_BASE: &str = "CONTRIB_MAP_API_BASE";
pub const ENV_GEOCODER_URL: &str = "CONTRIB_MAP_GEOCODER_URL";
pub const ENV_GOOGLE_KEY: &str = "CONTRIB_MAP_GOOGLE_KEY";
pub const ENV_DATA_DIR: &str = "CONTRIB_MAP_DATA_DIR";
pub const ENV_DELAY_MS: &str = "CONTRIB_MAP_DELAY_MS";

/// Top-level configuration for one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub forge: ForgeConfig,
    pub geocoder: GeocoderConfig,
    pub activity: ActivitySourceConfig,
    pub snapshot: SnapshotConfig,
    /// Minimum delay between enrichment iterations (default: 500)
    pub enrich_delay_ms: u64,
    /// HTTP request timeout in seconds (default: 30)
    pub timeout_sec: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            forge: ForgeConfig::default(),
            geocoder: GeocoderConfig::default(),
            activity: ActivitySourceConfig::Forge,
            snapshot: SnapshotConfig::default(),
            enrich_delay_ms: 500,
            timeout_sec: 30,
        }
    }
}

impl PipelineConfig {
    /// Defaults overlaid with any `CONTRIB_MAP_*` environment variables
    pub fn from_env() -> Self {
        Self::default().with_env(|key| std::env::var(key).ok())
    }

    /// Overlay values from an environment lookup
    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(base) = lookup(ENV_API_BASE) {
            self.forge.api_base = base.trim().trim_end_matches('/').to_string();
        }
        if let Some(url) = lookup(ENV_GEOCODER_URL) {
            self.geocoder.base_url = Some(url.trim().trim_end_matches('/').to_string());
        }
        if let Some(key) = lookup(ENV_GOOGLE_KEY) {
            // A key only makes sense for Google; it also selects that provider
            self.geocoder.provider = GeocoderProvider::GoogleMaps {
                api_key: Some(key.trim().to_string()),
            };
        }
        if let Some(dir) = lookup(ENV_DATA_DIR) {
            self.snapshot.data_dir = PathBuf::from(dir.trim());
        }
        if let Some(ms) = lookup(ENV_DELAY_MS).and_then(|v| v.trim().parse().ok()) {
            self.enrich_delay_ms = ms;
        }

        self
    }

    pub fn enrich_delay(&self) -> Duration {
        Duration::from_millis(self.enrich_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_sec)
    }
}

/// Forge REST API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForgeConfig {
    /// API root without trailing slash
    pub api_base: String,
    /// Page size for the contributor list (forge maximum is 100)
    pub per_page: u32,
    /// Upper bound on contributor list pages
    pub max_pages: u32,
    pub user_agent: String,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".to_string(),
            per_page: 100,
            max_pages: 50,
            user_agent: format!("contributor-map/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Supported geocoding providers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GeocoderProvider {
    /// OpenStreetMap Nominatim address search (no API key)
    Nominatim,
    /// Google Maps Geocoding API
    GoogleMaps { api_key: Option<String> },
}

impl GeocoderProvider {
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::Nominatim => "https://nominatim.openstreetmap.org",
            Self::GoogleMaps { .. } => "https://maps.googleapis.com",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocoderConfig {
    pub provider: GeocoderProvider,
    /// Overrides the provider's public endpoint
    pub base_url: Option<String>,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            provider: GeocoderProvider::Nominatim,
            base_url: None,
        }
    }
}

impl GeocoderConfig {
    pub fn base_url(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| self.provider.default_base_url().to_string())
    }
}

/// Where top-contributor weekly statistics come from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActivitySourceConfig {
    /// The forge's contributor statistics endpoint
    Forge,
    /// A fixed mirror URL serving the same JSON shape
    Url(String),
    /// A local fixture file
    File(PathBuf),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    pub data_dir: PathBuf,
    /// File name of the "most recent snapshot" copy inside `data_dir`
    pub latest_name: String,
    /// Explicit snapshot path replacing the timestamped name
    pub output: Option<PathBuf>,
    pub sort_by_impact: bool,
    pub geojson: bool,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            latest_name: "newest.json".to_string(),
            output: None,
            sort_by_impact: true,
            geojson: false,
        }
    }
}

//! Contributor Map
//!
//! Collects every contributor of a forge-hosted repository, weights them by
//! impact, geocodes their self-reported profile location, and writes the
//! result as a JSON snapshot for the map front end.
//!
//! # Pipeline
//!
//! ```text
//! activity source ──► roster merge ──► enrich (profile + geocode) ──► snapshot
//!   (top 100)          (+ full list)      (paced, sequential)         (timestamped + newest.json)
//! ```
//!
//! | Stage | Module | Output |
//! |-------|--------|--------|
//! | 1 | [`activity`] | `(name, impact)` for the top contributors |
//! | 2 | [`forge`], [`roster`] | merged roster, unmeasured names at impact 1 |
//! | 3 | [`enrich`], [`geocode`] | location + coordinates or the `"MOON"` sentinel |
//! | 4 | [`snapshot`] | `data/YYYYMMDD_HHMM.json` and a copy at `data/newest.json` |

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod activity;
pub mod config;
pub mod credentials;
pub mod enrich;
pub mod forge;
pub mod geocode;
pub mod pipeline;
pub mod roster;
pub mod snapshot;

pub use activity::{ActivitySource, TopContributor};
pub use config::{ActivitySourceConfig, GeocoderProvider, PipelineConfig};
pub use credentials::{CredentialProvider, Credentials};
pub use forge::{Forge, GithubForge, RepoId};
pub use geocode::Geocoder;
pub use pipeline::Pipeline;
pub use snapshot::{SnapshotPaths, SnapshotWriter};

/// Impact assigned to contributors with no activity statistics
pub const DEFAULT_IMPACT: u64 = 1;

/// Coordinate value written for contributors whose location cannot be geocoded
pub const UNLOCATABLE: &str = "MOON";

#[derive(Error, Debug)]
pub enum MapError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{url} returned status {status}")]
    ForgeStatus { url: String, status: u16 },
    #[error("Invalid repository identifier {0:?}: expected owner/name")]
    InvalidRepository(String),
    #[error("No credential available for {0}")]
    MissingCredential(String),
    #[error("Malformed contributor record {name:?}: {reason}")]
    MalformedRecord { name: String, reason: String },
}

pub type Result<T> = std::result::Result<T, MapError>;

/// Geographic position of a contributor
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Position {
    /// Not geocoded yet
    #[default]
    Pending,
    Located { lat: f64, lon: f64 },
    /// Geocoding found no match
    Unlocatable,
}

impl Position {
    pub fn is_located(&self) -> bool {
        matches!(self, Position::Located { .. })
    }
}

/// One contributor in the snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "SnapshotRecord", try_from = "SnapshotRecord")]
pub struct Contributor {
    pub name: String,
    pub impact: u64,
    pub location: String,
    pub position: Position,
}

impl Contributor {
    /// Contributor taken from the activity statistics
    pub fn measured(name: impl Into<String>, impact: u64) -> Self {
        Self {
            name: name.into(),
            impact,
            location: String::new(),
            position: Position::Pending,
        }
    }

    /// Contributor only known from the full contributor list
    pub fn unmeasured(name: impl Into<String>) -> Self {
        Self::measured(name, DEFAULT_IMPACT)
    }
}

/// A single `lat` or `lon` value on the wire: degrees or the sentinel string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
enum Coordinate {
    Degrees(f64),
    Sentinel(String),
}

/// Flat JSON shape consumed by the map front end
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotRecord {
    name: String,
    impact: u64,
    #[serde(default)]
    location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    lat: Option<Coordinate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    lon: Option<Coordinate>,
}

impl From<Contributor> for SnapshotRecord {
    fn from(c: Contributor) -> Self {
        let (lat, lon) = match c.position {
            Position::Pending => (None, None),
            Position::Located { lat, lon } => {
                (Some(Coordinate::Degrees(lat)), Some(Coordinate::Degrees(lon)))
            }
            Position::Unlocatable => (
                Some(Coordinate::Sentinel(UNLOCATABLE.to_string())),
                Some(Coordinate::Sentinel(UNLOCATABLE.to_string())),
            ),
        };
        Self {
            name: c.name,
            impact: c.impact,
            location: c.location,
            lat,
            lon,
        }
    }
}

impl TryFrom<SnapshotRecord> for Contributor {
    type Error = MapError;

    fn try_from(r: SnapshotRecord) -> Result<Self> {
        let malformed = |reason: &str| MapError::MalformedRecord {
            name: r.name.clone(),
            reason: reason.to_string(),
        };

        if r.name.is_empty() {
            return Err(malformed("empty name"));
        }

        let position = match (&r.lat, &r.lon) {
            (None, None) => Position::Pending,
            (Some(Coordinate::Degrees(lat)), Some(Coordinate::Degrees(lon))) => {
                Position::Located { lat: *lat, lon: *lon }
            }
            (Some(Coordinate::Sentinel(a)), Some(Coordinate::Sentinel(b)))
                if a == UNLOCATABLE && b == UNLOCATABLE =>
            {
                Position::Unlocatable
            }
            _ => return Err(malformed("lat and lon must both be numeric or both be the sentinel")),
        };

        Ok(Self {
            name: r.name,
            impact: r.impact,
            location: r.location,
            position,
        })
    }
}

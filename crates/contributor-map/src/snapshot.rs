//! Snapshot output
//!
//! Each run writes `{data_dir}/YYYYMMDD_HHMM.json` and then copies that file
//! over `{data_dir}/newest.json`, which the map front end loads.

use crate::config::SnapshotConfig;
use crate::{Contributor, Position, Result};
use chrono::{DateTime, Local};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Timestamp format for snapshot file names (minute resolution)
pub const SNAPSHOT_TIME_FORMAT: &str = "%Y%m%d_%H%M";

/// Stable sort by impact, largest first
///
/// The front end draws markers in file order, so big markers go first and
/// small ones stay clickable on top of them.
pub fn sort_by_impact(contributors: &mut [Contributor]) {
    contributors.sort_by(|a, b| b.impact.cmp(&a.impact));
}

/// Paths written by one snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotPaths {
    pub snapshot: PathBuf,
    pub latest: PathBuf,
    pub geojson: Option<PathBuf>,
}

pub struct SnapshotWriter {
    config: SnapshotConfig,
}

impl SnapshotWriter {
    pub fn new(config: SnapshotConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SnapshotConfig {
        &self.config
    }

    /// Timestamped snapshot path, or the explicit output path if configured
    pub fn snapshot_path(&self, now: DateTime<Local>) -> PathBuf {
        match &self.config.output {
            Some(path) => path.clone(),
            None => self
                .config
                .data_dir
                .join(format!("{}.json", now.format(SNAPSHOT_TIME_FORMAT))),
        }
    }

    pub fn latest_path(&self) -> PathBuf {
        self.config.data_dir.join(&self.config.latest_name)
    }

    /// Write the snapshot and refresh the latest copy
    pub fn write(&self, contributors: &[Contributor], now: DateTime<Local>) -> Result<SnapshotPaths> {
        let snapshot = self.snapshot_path(now);
        let latest = self.latest_path();

        ensure_parent(&snapshot)?;
        ensure_parent(&latest)?;

        let bytes = serde_json::to_vec(contributors)?;
        info!(
            "Writing {} contributors to {:?} ({} bytes)",
            contributors.len(),
            snapshot,
            bytes.len()
        );
        fs::write(&snapshot, &bytes)?;

        if same_file(&snapshot, &latest)? {
            info!("Snapshot already is {:?}, nothing to copy", latest);
        } else {
            // Full copy, never a link: the latest file must stand alone
            fs::copy(&snapshot, &latest)?;
            info!("Copied snapshot to {:?}", latest);
        }

        let geojson = if self.config.geojson {
            let path = snapshot.with_extension("geojson");
            info!("Writing GeoJSON to {:?}", path);
            fs::write(&path, serde_json::to_vec_pretty(&to_geojson(contributors))?)?;
            Some(path)
        } else {
            None
        };

        Ok(SnapshotPaths {
            snapshot,
            latest,
            geojson,
        })
    }
}

/// Whether two paths name the same file on disk
///
/// `written` must exist; `other` may not.
fn same_file(written: &Path, other: &Path) -> Result<bool> {
    if !other.exists() {
        return Ok(false);
    }
    Ok(fs::canonicalize(written)? == fs::canonicalize(other)?)
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Export located contributors as a GeoJSON FeatureCollection
pub fn to_geojson(contributors: &[Contributor]) -> serde_json::Value {
    let features: Vec<serde_json::Value> = contributors
        .iter()
        .filter_map(|c| match c.position {
            Position::Located { lat, lon } => Some(serde_json::json!({
                "type": "Feature",
                "geometry": {
                    "type": "Point",
                    "coordinates": [lon, lat]
                },
                "properties": {
                    "name": c.name,
                    "impact": c.impact,
                    "location": c.location
                }
            })),
            _ => None,
        })
        .collect();

    let located = features.len();

    serde_json::json!({
        "type": "FeatureCollection",
        "features": features,
        "metadata": {
            "total_contributors": contributors.len(),
            "located": located,
            "unlocatable": contributors.len() - located
        }
    })
}

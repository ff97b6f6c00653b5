//! Top-contributor activity statistics
//!
//! The statistics payload is a list of `{author: {login}, weeks: [{a, d, ...}]}`
//! entries, one per top contributor (the forge caps it at 100). Impact is the
//! sum of additions and deletions over every week.
//!
//! Missing or malformed statistics are never fatal: the stage degrades to an
//! empty list and every contributor is later added at the default impact.

use crate::{MapError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// A contributor with measured impact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopContributor {
    pub name: String,
    pub impact: u64,
}

/// Source of top-contributor statistics
#[async_trait]
pub trait ActivitySource: Send + Sync {
    /// Human-readable origin for log lines
    fn describe(&self) -> String;

    async fn top_contributors(&self) -> Result<Vec<TopContributor>>;
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    #[serde(default)]
    author: Option<RawAuthor>,
    #[serde(default)]
    weeks: Option<Vec<RawWeek>>,
}

#[derive(Debug, Deserialize)]
struct RawAuthor {
    #[serde(default)]
    login: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawWeek {
    #[serde(default)]
    a: u64,
    #[serde(default)]
    d: u64,
}

/// Forge logins: alphanumeric, dash, underscore, dot, and the `[bot]` suffix
pub fn is_valid_login(login: &str) -> bool {
    !login.is_empty()
        && login.len() <= 128
        && login
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_.[]".contains(c))
}

/// Sum of additions and deletions over all weeks
fn impact_of(weeks: &[RawWeek]) -> u64 {
    weeks.iter().map(|w| w.a.saturating_add(w.d)).fold(0, u64::saturating_add)
}

/// Parse a statistics payload, skipping entries that cannot be used
///
/// Anything other than a JSON array yields an empty list. Duplicate logins
/// keep their first occurrence.
pub fn parse_activity(payload: &Value) -> Vec<TopContributor> {
    let entries = match payload.as_array() {
        Some(entries) => entries,
        None => {
            warn!("Activity payload is not a list, treating as no top contributors");
            return Vec::new();
        }
    };

    let mut seen = HashSet::new();
    let mut top = Vec::with_capacity(entries.len());
    let mut skipped = 0;

    for entry in entries {
        let raw: RawEntry = match serde_json::from_value(entry.clone()) {
            Ok(raw) => raw,
            Err(e) => {
                debug!("Skipping malformed activity entry: {}", e);
                skipped += 1;
                continue;
            }
        };

        let name = match raw.author.and_then(|a| a.login) {
            Some(login) if is_valid_login(&login) => login,
            _ => {
                skipped += 1;
                continue;
            }
        };

        if !seen.insert(name.clone()) {
            skipped += 1;
            continue;
        }

        let impact = impact_of(raw.weeks.as_deref().unwrap_or_default());
        top.push(TopContributor { name, impact });
    }

    if skipped > 0 {
        warn!("Skipped {} unusable activity entries", skipped);
    }

    top
}

/// Run an activity source, degrading any failure to an empty list
pub async fn fetch_top_contributors(source: &dyn ActivitySource) -> Vec<TopContributor> {
    info!("Fetching top contributors from {}", source.describe());

    match source.top_contributors().await {
        Ok(top) => {
            info!("Found {} top contributors", top.len());
            top
        }
        Err(e) => {
            warn!(
                "Top contributor data unavailable from {} ({}), continuing without it",
                source.describe(),
                e
            );
            Vec::new()
        }
    }
}

/// Statistics served from a fixed URL, fetched without credentials
pub struct MirrorUrl {
    client: reqwest::Client,
    url: String,
}

impl MirrorUrl {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl ActivitySource for MirrorUrl {
    fn describe(&self) -> String {
        self.url.clone()
    }

    async fn top_contributors(&self) -> Result<Vec<TopContributor>> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(MapError::ForgeStatus {
                url: self.url.clone(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        let payload: Value = serde_json::from_str(&body)?;
        Ok(parse_activity(&payload))
    }
}

/// Statistics read from a local JSON file
pub struct FixtureFile {
    path: PathBuf,
}

impl FixtureFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ActivitySource for FixtureFile {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn top_contributors(&self) -> Result<Vec<TopContributor>> {
        let bytes = tokio::fs::read(&self.path).await?;
        let payload: Value = serde_json::from_slice(&bytes)?;
        Ok(parse_activity(&payload))
    }
}

/// Fixed list, for tests and callers that already hold statistics
pub struct StaticActivity(pub Vec<TopContributor>);

#[async_trait]
impl ActivitySource for StaticActivity {
    fn describe(&self) -> String {
        "in-memory statistics".to_string()
    }

    async fn top_contributors(&self) -> Result<Vec<TopContributor>> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    struct Failing;

    #[async_trait]
    impl ActivitySource for Failing {
        fn describe(&self) -> String {
            "failing source".to_string()
        }

        async fn top_contributors(&self) -> Result<Vec<TopContributor>> {
            Err(MapError::ForgeStatus {
                url: "http://stats".to_string(),
                status: 500,
            })
        }
    }

    #[test]
    fn test_impact_sums_additions_and_deletions() {
        let payload = json!([
            {"author": {"login": "alice"}, "weeks": [{"w": 1, "a": 10, "d": 2, "c": 1}, {"a": 3, "d": 1}]}
        ]);

        let top = parse_activity(&payload);
        assert_eq!(
            top,
            vec![TopContributor { name: "alice".to_string(), impact: 16 }]
        );
    }

    #[test]
    fn test_order_preserved_and_duplicates_dropped() {
        let payload = json!([
            {"author": {"login": "zed"}, "weeks": [{"a": 1, "d": 0}]},
            {"author": {"login": "amy"}, "weeks": []},
            {"author": {"login": "zed"}, "weeks": [{"a": 500, "d": 0}]}
        ]);

        let top = parse_activity(&payload);
        let names: Vec<_> = top.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["zed", "amy"]);
        assert_eq!(top[0].impact, 1);
        assert_eq!(top[1].impact, 0);
    }

    #[test]
    fn test_unusable_entries_skipped() {
        let payload = json!([
            {"author": null, "weeks": [{"a": 1, "d": 1}]},
            {"weeks": [{"a": 1, "d": 1}]},
            {"author": {"login": "../etc"}, "weeks": []},
            {"author": {"login": "dependabot[bot]"}},
            {"author": {"login": "ok"}, "weeks": [{"a": 2}]},
            "garbage"
        ]);

        let top = parse_activity(&payload);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0], TopContributor { name: "dependabot[bot]".to_string(), impact: 0 });
        assert_eq!(top[1], TopContributor { name: "ok".to_string(), impact: 2 });
    }

    #[test]
    fn test_non_array_payload_is_empty() {
        assert!(parse_activity(&json!({})).is_empty());
        assert!(parse_activity(&Value::Null).is_empty());
    }

    #[tokio::test]
    async fn test_fixture_file_source() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(br#"[{"author": {"login": "alice"}, "weeks": [{"a": 4, "d": 4}]}]"#)
            .unwrap();

        let top = fetch_top_contributors(&FixtureFile::new(file.path())).await;
        assert_eq!(top, vec![TopContributor { name: "alice".to_string(), impact: 8 }]);
    }

    #[tokio::test]
    async fn test_failures_degrade_to_empty() {
        assert!(fetch_top_contributors(&Failing).await.is_empty());

        let missing = FixtureFile::new("/nonexistent/contrib.json");
        assert!(fetch_top_contributors(&missing).await.is_empty());

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"<html>not json</html>").unwrap();
        assert!(fetch_top_contributors(&FixtureFile::new(file.path())).await.is_empty());
    }
}

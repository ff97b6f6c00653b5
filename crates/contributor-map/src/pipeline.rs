//! End-to-end collection run

use crate::activity::{fetch_top_contributors, ActivitySource, FixtureFile, MirrorUrl};
use crate::config::{ActivitySourceConfig, PipelineConfig};
use crate::credentials::Credentials;
use crate::enrich::{enrich_all, EnrichSummary, Pacer};
use crate::forge::{Forge, GithubForge, RepoId};
use crate::geocode::{Geocoder, HttpGeocoder};
use crate::roster::merge_roster;
use crate::snapshot::{sort_by_impact, SnapshotPaths, SnapshotWriter};
use crate::{Contributor, Result};
use chrono::Local;
use std::collections::HashSet;
use std::time::Duration;
use tracing::info;

/// Enriched roster, ready to write
#[derive(Debug, Clone)]
pub struct Collection {
    pub contributors: Vec<Contributor>,
    /// Contributors whose impact came from activity statistics
    pub measured: usize,
    pub enrichment: EnrichSummary,
}

/// Outcome of a full run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub contributors: usize,
    pub measured: usize,
    pub enrichment: EnrichSummary,
    pub paths: SnapshotPaths,
}

/// Fetch → merge → enrich → write, strictly in order
pub struct Pipeline {
    activity: Box<dyn ActivitySource>,
    forge: Box<dyn Forge>,
    geocoder: Box<dyn Geocoder>,
    writer: SnapshotWriter,
    delay: Duration,
}

impl Pipeline {
    pub fn new(
        activity: Box<dyn ActivitySource>,
        forge: Box<dyn Forge>,
        geocoder: Box<dyn Geocoder>,
        writer: SnapshotWriter,
        delay: Duration,
    ) -> Self {
        Self {
            activity,
            forge,
            geocoder,
            writer,
            delay,
        }
    }

    /// Build the HTTP-backed pipeline for one repository
    pub fn from_config(
        config: &PipelineConfig,
        repo: RepoId,
        credentials: Credentials,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(config.forge.user_agent.clone())
            .build()?;

        let forge = GithubForge::new(client.clone(), config.forge.clone(), repo, credentials);

        let activity: Box<dyn ActivitySource> = match &config.activity {
            ActivitySourceConfig::Forge => Box::new(forge.clone()),
            ActivitySourceConfig::Url(url) => Box::new(MirrorUrl::new(client.clone(), url)),
            ActivitySourceConfig::File(path) => Box::new(FixtureFile::new(path)),
        };

        let geocoder = HttpGeocoder::new(client, &config.geocoder);

        Ok(Self::new(
            activity,
            Box::new(forge),
            Box::new(geocoder),
            SnapshotWriter::new(config.snapshot.clone()),
            config.enrich_delay(),
        ))
    }

    /// Stages 1–3 plus the optional sort; nothing is written
    pub async fn collect(&self) -> Result<Collection> {
        let top = fetch_top_contributors(self.activity.as_ref()).await;
        let measured = top.iter().map(|t| t.name.as_str()).collect::<HashSet<_>>().len();
        let all = self.forge.contributors().await?;
        let mut roster = merge_roster(top, all);

        let mut pacer = Pacer::new(self.delay);
        let enrichment = enrich_all(
            self.forge.as_ref(),
            self.geocoder.as_ref(),
            &mut roster,
            &mut pacer,
        )
        .await?;

        if self.writer.config().sort_by_impact {
            sort_by_impact(&mut roster);
        }

        Ok(Collection {
            contributors: roster,
            measured,
            enrichment,
        })
    }

    /// Collect and write the snapshot
    pub async fn run(&self) -> Result<RunReport> {
        let collection = self.collect().await?;
        let paths = self.writer.write(&collection.contributors, Local::now())?;

        let report = RunReport {
            contributors: collection.contributors.len(),
            measured: collection.measured,
            enrichment: collection.enrichment,
            paths,
        };
        info!("Snapshot complete: {:?}", report.paths.snapshot);

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::{StaticActivity, TopContributor};
    use crate::config::SnapshotConfig;
    use crate::geocode::GeocodeError;
    use crate::Position;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct TwoPersonForge;

    #[async_trait]
    impl Forge for TwoPersonForge {
        async fn contributors(&self) -> Result<Vec<String>> {
            Ok(vec!["alice".to_string(), "bob".to_string()])
        }

        async fn user_location(&self, login: &str) -> Result<String> {
            Ok(match login {
                "alice" => "San Francisco".to_string(),
                _ => String::new(),
            })
        }
    }

    struct SfGeocoder;

    #[async_trait]
    impl Geocoder for SfGeocoder {
        async fn geocode(&self, query: &str) -> std::result::Result<Position, GeocodeError> {
            match query {
                "San Francisco" => Ok(Position::Located { lat: 37.0, lon: -122.0 }),
                _ => Ok(Position::Unlocatable),
            }
        }
    }

    fn pipeline(dir: &TempDir, top: Vec<TopContributor>, sort: bool) -> Pipeline {
        Pipeline::new(
            Box::new(StaticActivity(top)),
            Box::new(TwoPersonForge),
            Box::new(SfGeocoder),
            SnapshotWriter::new(SnapshotConfig {
                data_dir: dir.path().to_path_buf(),
                sort_by_impact: sort,
                ..SnapshotConfig::default()
            }),
            Duration::ZERO,
        )
    }

    #[tokio::test]
    async fn test_worked_example() {
        let dir = TempDir::new().unwrap();
        let top = vec![TopContributor { name: "alice".to_string(), impact: 16 }];

        let report = pipeline(&dir, top, true).run().await.unwrap();
        assert_eq!(report.contributors, 2);
        assert_eq!(report.measured, 1);

        let latest = std::fs::read_to_string(&report.paths.latest).unwrap();
        assert_eq!(
            latest,
            r#"[{"name":"alice","impact":16,"location":"San Francisco","lat":37.0,"lon":-122.0},{"name":"bob","impact":1,"location":"","lat":"MOON","lon":"MOON"}]"#
        );
    }

    #[tokio::test]
    async fn test_unsorted_keeps_merge_order() {
        let dir = TempDir::new().unwrap();
        let top = vec![TopContributor { name: "bob".to_string(), impact: 0 }];

        let roster = pipeline(&dir, top.clone(), false).collect().await.unwrap().contributors;
        let order: Vec<_> = roster.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(order, vec!["bob", "alice"]);

        let roster = pipeline(&dir, top, true).collect().await.unwrap().contributors;
        let order: Vec<_> = roster.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(order, vec!["alice", "bob"]);
    }

    #[tokio::test]
    async fn test_every_record_has_paired_coordinates() {
        let dir = TempDir::new().unwrap();
        let collection = pipeline(&dir, Vec::new(), true).collect().await.unwrap();
        assert_eq!(collection.measured, 0);
        assert!(collection
            .contributors
            .iter()
            .all(|c| !matches!(c.position, Position::Pending)));
    }
}

//! Location enrichment
//!
//! [`enrich_contributor`] does the work for one contributor with no delay.
//! [`enrich_all`] runs it sequentially over the roster, spaced by a
//! [`Pacer`] so third-party quotas are respected.

use crate::forge::Forge;
use crate::geocode::Geocoder;
use crate::{Contributor, Position, Result};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Enforces a minimum interval between consecutive iterations
#[derive(Debug)]
pub struct Pacer {
    interval: Duration,
    last: Option<Instant>,
}

impl Pacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// No delay at all
    pub fn unpaced() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until the interval since the previous tick has elapsed
    ///
    /// The first tick returns immediately.
    pub async fn tick(&mut self) {
        if let Some(last) = self.last {
            if !self.interval.is_zero() {
                tokio::time::sleep_until(last + self.interval).await;
            }
        }
        self.last = Some(Instant::now());
    }
}

/// Counts from one enrichment pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrichSummary {
    pub located: usize,
    pub unlocatable: usize,
    pub geocode_failures: usize,
}

/// Look up one contributor's location and geocode it
///
/// Geocoder failures degrade to [`Position::Unlocatable`]; only a failed
/// profile request is an error. Returns `true` when the geocoder failed
/// (as opposed to finding no match).
pub async fn enrich_contributor(
    forge: &dyn Forge,
    geocoder: &dyn Geocoder,
    contributor: &mut Contributor,
) -> Result<bool> {
    let location = forge.user_location(&contributor.name).await?;

    let (position, failed) = if location.trim().is_empty() {
        debug!("{} has no profile location", contributor.name);
        (Position::Unlocatable, false)
    } else {
        match geocoder.geocode(&location).await {
            Ok(position) => (position, false),
            Err(e) => {
                warn!(
                    "Geocoding {:?} for {} failed: {}",
                    location, contributor.name, e
                );
                (Position::Unlocatable, true)
            }
        }
    };

    debug!("{} @ {:?} -> {:?}", contributor.name, location, position);
    contributor.location = location;
    contributor.position = position;

    Ok(failed)
}

/// Enrich every contributor in order, one at a time
pub async fn enrich_all(
    forge: &dyn Forge,
    geocoder: &dyn Geocoder,
    contributors: &mut [Contributor],
    pacer: &mut Pacer,
) -> Result<EnrichSummary> {
    info!(
        "Enriching {} contributors ({}ms between lookups)",
        contributors.len(),
        pacer.interval().as_millis()
    );

    let mut summary = EnrichSummary::default();

    for contributor in contributors.iter_mut() {
        pacer.tick().await;

        if enrich_contributor(forge, geocoder, contributor).await? {
            summary.geocode_failures += 1;
        }
        match contributor.position {
            Position::Located { .. } => summary.located += 1,
            _ => summary.unlocatable += 1,
        }
    }

    info!(
        "Enrichment done: {} located, {} unlocatable ({} geocoder failures)",
        summary.located, summary.unlocatable, summary.geocode_failures
    );

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geocode::GeocodeError;
    use crate::MapError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct FakeForge {
        locations: HashMap<String, String>,
        calls: Mutex<Vec<(String, Instant)>>,
    }

    impl FakeForge {
        fn new(pairs: &[(&str, &str)]) -> Self {
            Self {
                locations: pairs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Forge for FakeForge {
        async fn contributors(&self) -> Result<Vec<String>> {
            Ok(self.locations.keys().cloned().collect())
        }

        async fn user_location(&self, login: &str) -> Result<String> {
            self.calls
                .lock()
                .unwrap()
                .push((login.to_string(), Instant::now()));
            if login == "broken" {
                return Err(MapError::ForgeStatus {
                    url: "http://forge/users/broken".to_string(),
                    status: 599,
                });
            }
            Ok(self.locations.get(login).cloned().unwrap_or_default())
        }
    }

    struct FakeGeocoder {
        queries: Mutex<Vec<String>>,
    }

    impl FakeGeocoder {
        fn new() -> Self {
            Self {
                queries: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Geocoder for FakeGeocoder {
        async fn geocode(&self, query: &str) -> std::result::Result<Position, GeocodeError> {
            self.queries.lock().unwrap().push(query.to_string());
            match query {
                "San Francisco" => Ok(Position::Located { lat: 37.0, lon: -122.0 }),
                "Atlantis" => Ok(Position::Unlocatable),
                _ => Err(GeocodeError::Status(503)),
            }
        }
    }

    #[tokio::test]
    async fn test_enrich_located_and_sentinel() {
        let forge = FakeForge::new(&[("alice", "San Francisco"), ("bob", "")]);
        let geocoder = FakeGeocoder::new();
        let mut roster = vec![Contributor::measured("alice", 16), Contributor::unmeasured("bob")];

        let summary = enrich_all(&forge, &geocoder, &mut roster, &mut Pacer::unpaced())
            .await
            .unwrap();

        assert_eq!(roster[0].location, "San Francisco");
        assert_eq!(roster[0].position, Position::Located { lat: 37.0, lon: -122.0 });
        assert_eq!(roster[1].location, "");
        assert_eq!(roster[1].position, Position::Unlocatable);
        assert_eq!(summary, EnrichSummary { located: 1, unlocatable: 1, geocode_failures: 0 });

        // Empty locations never reach the geocoder
        assert_eq!(*geocoder.queries.lock().unwrap(), vec!["San Francisco".to_string()]);
    }

    #[tokio::test]
    async fn test_geocoder_failure_does_not_abort() {
        let forge = FakeForge::new(&[
            ("a", "Nowhere Special"),
            ("b", "Atlantis"),
            ("c", "San Francisco"),
        ]);
        let geocoder = FakeGeocoder::new();
        let mut roster = vec![
            Contributor::unmeasured("a"),
            Contributor::unmeasured("b"),
            Contributor::unmeasured("c"),
        ];

        let summary = enrich_all(&forge, &geocoder, &mut roster, &mut Pacer::unpaced())
            .await
            .unwrap();

        assert_eq!(roster[0].position, Position::Unlocatable);
        assert_eq!(roster[0].location, "Nowhere Special");
        assert_eq!(roster[1].position, Position::Unlocatable);
        assert!(roster[2].position.is_located());
        assert_eq!(summary.geocode_failures, 1);
        assert_eq!(summary.unlocatable, 2);
    }

    #[tokio::test]
    async fn test_profile_failure_is_fatal() {
        let forge = FakeForge::new(&[]);
        let geocoder = FakeGeocoder::new();
        let mut roster = vec![Contributor::unmeasured("broken")];

        let result = enrich_all(&forge, &geocoder, &mut roster, &mut Pacer::unpaced()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_enrich_overwrites_prior_values() {
        let forge = FakeForge::new(&[("alice", "")]);
        let geocoder = FakeGeocoder::new();
        let mut alice = Contributor::measured("alice", 3);
        alice.location = "stale".to_string();
        alice.position = Position::Located { lat: 1.0, lon: 2.0 };

        enrich_contributor(&forge, &geocoder, &mut alice).await.unwrap();
        assert_eq!(alice.location, "");
        assert_eq!(alice.position, Position::Unlocatable);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacer_spaces_iterations() {
        let forge = FakeForge::new(&[("a", ""), ("b", ""), ("c", "")]);
        let geocoder = FakeGeocoder::new();
        let mut roster = vec![
            Contributor::unmeasured("a"),
            Contributor::unmeasured("b"),
            Contributor::unmeasured("c"),
        ];
        let interval = Duration::from_millis(500);

        let start = Instant::now();
        enrich_all(&forge, &geocoder, &mut roster, &mut Pacer::new(interval))
            .await
            .unwrap();

        let calls = forge.calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        for pair in calls.windows(2) {
            assert!(pair[1].1 - pair[0].1 >= interval);
        }
        // No trailing delay after the last contributor
        assert!(start.elapsed() < interval * 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_immediate() {
        let mut pacer = Pacer::new(Duration::from_secs(10));
        let start = Instant::now();
        pacer.tick().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}

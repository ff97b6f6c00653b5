//! Forge REST API client (GitHub v3 contract)
//!
//! Three endpoints are used:
//!
//! | Endpoint | Purpose |
//! |----------|---------|
//! | `GET /repos/{owner}/{repo}/stats/contributors` | weekly additions/deletions for the top 100 |
//! | `GET /repos/{owner}/{repo}/contributors` | every contributor login, paginated |
//! | `GET /users/{login}` | profile with the free-text `location` |

use crate::activity::{parse_activity, ActivitySource, TopContributor};
use crate::config::ForgeConfig;
use crate::credentials::Credentials;
use crate::{MapError, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Repository identifier in `owner/name` form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoId {
    pub owner: String,
    pub name: String,
}

impl FromStr for RepoId {
    type Err = MapError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || MapError::InvalidRepository(s.to_string());
        let (owner, name) = s.trim().split_once('/').ok_or_else(invalid)?;

        let part_ok = |p: &str| {
            !p.is_empty()
                && p
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || "-_.".contains(c))
        };
        if !part_ok(owner) || !part_ok(name) {
            return Err(invalid());
        }

        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Contributor list and profile lookups
#[async_trait]
pub trait Forge: Send + Sync {
    /// Every contributor login, in forge order
    async fn contributors(&self) -> Result<Vec<String>>;

    /// Profile location, empty when absent, null, or the profile is unavailable
    async fn user_location(&self, login: &str) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct ContributorEntry {
    #[serde(default)]
    login: Option<String>,
}

/// Authenticated GitHub REST client
#[derive(Clone)]
pub struct GithubForge {
    client: reqwest::Client,
    config: ForgeConfig,
    repo: RepoId,
    credentials: Credentials,
}

impl GithubForge {
    pub fn new(
        client: reqwest::Client,
        config: ForgeConfig,
        repo: RepoId,
        credentials: Credentials,
    ) -> Self {
        Self {
            client,
            config,
            repo,
            credentials,
        }
    }

    fn headers() -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        h
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .get(url)
            .headers(Self::headers())
            .basic_auth(&self.credentials.username, Some(&self.credentials.secret))
    }

    fn repo_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/{}",
            self.config.api_base, self.repo.owner, self.repo.name, path
        )
    }
}

#[async_trait]
impl Forge for GithubForge {
    async fn contributors(&self) -> Result<Vec<String>> {
        let url = self.repo_url("contributors");
        let per_page = self.config.per_page.max(1);
        let mut logins = Vec::new();
        let mut anonymous = 0;

        for page in 1..=self.config.max_pages {
            let response = self
                .get(&url)
                .query(&[("per_page", per_page), ("page", page)])
                .send()
                .await?;

            let status = response.status();
            // Empty repositories answer 204 with no body
            if status == StatusCode::NO_CONTENT {
                break;
            }
            if !status.is_success() {
                return Err(MapError::ForgeStatus {
                    url,
                    status: status.as_u16(),
                });
            }

            let entries: Vec<ContributorEntry> = response.json().await?;
            let count = entries.len();
            debug!("Contributor page {}: {} entries", page, count);

            for entry in entries {
                match entry.login {
                    Some(login) if !login.is_empty() => logins.push(login),
                    _ => anonymous += 1,
                }
            }

            if count < per_page as usize {
                break;
            }
            if page == self.config.max_pages {
                warn!(
                    "Stopped after {} contributor pages; list may be truncated",
                    page
                );
            }
        }

        if anonymous > 0 {
            debug!("Ignored {} contributors without a login", anonymous);
        }
        info!("Forge lists {} contributors for {}", logins.len(), self.repo);

        Ok(logins)
    }

    async fn user_location(&self, login: &str) -> Result<String> {
        let url = format!("{}/users/{}", self.config.api_base, login);
        let response = self.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            warn!("Profile for {} unavailable (status {})", login, status.as_u16());
            return Ok(String::new());
        }

        let body = response.text().await?;
        let profile: Value = match serde_json::from_str(&body) {
            Ok(v) => v,
            Err(e) => {
                warn!("Profile for {} is not valid JSON: {}", login, e);
                return Ok(String::new());
            }
        };

        Ok(location_of(&profile))
    }
}

/// Statistics straight from the forge endpoint
#[async_trait]
impl ActivitySource for GithubForge {
    fn describe(&self) -> String {
        self.repo_url("stats/contributors")
    }

    async fn top_contributors(&self) -> Result<Vec<TopContributor>> {
        let url = self.repo_url("stats/contributors");
        let response = self.get(&url).send().await?;

        let status = response.status();
        // 202: statistics are still being computed; 204: empty repository
        if status == StatusCode::ACCEPTED || status == StatusCode::NO_CONTENT {
            info!("Forge has no statistics ready yet (status {})", status.as_u16());
            return Ok(Vec::new());
        }
        if !status.is_success() {
            return Err(MapError::ForgeStatus {
                url,
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        let payload: Value = serde_json::from_str(&body)?;
        Ok(parse_activity(&payload))
    }
}

/// `location` field of a profile payload, or empty
pub fn location_of(profile: &Value) -> String {
    profile
        .get("location")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

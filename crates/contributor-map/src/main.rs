//! Contributor Map data collector
//!
//! Fetches every contributor of a repository, geocodes their profile
//! locations, and writes the snapshot consumed by the map page.
//!
//! Usage:
//!   CONTRIB_MAP_TOKEN=... fetch-contributors mozilla/rust octocat
//!   fetch-contributors mozilla/rust octocat --password-stdin < token.txt
//!   fetch-contributors mozilla/rust octocat --activity-file data/contrib.json --geojson

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{Parser, ValueEnum};
use contributor_map::config::{ActivitySourceConfig, GeocoderProvider, PipelineConfig};
use contributor_map::credentials::{
    CredentialProvider, EnvCredentials, ReaderCredentials, DEFAULT_TOKEN_VAR,
};
use contributor_map::{Pipeline, RepoId};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "fetch-contributors",
    version,
    about = "Collect and geocode repository contributors for the contributor map",
    after_help = "Example: fetch-contributors mozilla/rust octocat\n\nThe forge credential is read from $CONTRIB_MAP_TOKEN, from stdin with --password-stdin, or prompted for on a terminal."
)]
struct Args {
    /// Repository as owner/name
    repo: String,

    /// Forge username the credential belongs to
    username: String,

    /// Directory for snapshots and newest.json
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Write the snapshot here instead of the timestamped name
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Read top-contributor statistics from a mirror URL
    #[arg(long, conflicts_with = "activity_file")]
    activity_url: Option<String>,

    /// Read top-contributor statistics from a local JSON file
    #[arg(long)]
    activity_file: Option<PathBuf>,

    /// Geocoding provider
    #[arg(long, value_enum)]
    geocoder: Option<GeocoderArg>,

    /// Minimum delay between contributor lookups in milliseconds
    #[arg(long)]
    delay_ms: Option<u64>,

    /// Keep merge order instead of sorting by impact
    #[arg(long)]
    no_sort: bool,

    /// Also write a GeoJSON file next to the snapshot
    #[arg(long)]
    geojson: bool,

    /// Read the credential from standard input
    #[arg(long)]
    password_stdin: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum GeocoderArg {
    Nominatim,
    Google,
}

impl Args {
    /// Apply flags on top of defaults and environment
    fn apply(&self, mut config: PipelineConfig) -> PipelineConfig {
        if let Some(dir) = &self.data_dir {
            config.snapshot.data_dir = dir.clone();
        }
        if let Some(output) = &self.output {
            config.snapshot.output = Some(output.clone());
        }
        if let Some(url) = &self.activity_url {
            config.activity = ActivitySourceConfig::Url(url.clone());
        }
        if let Some(path) = &self.activity_file {
            config.activity = ActivitySourceConfig::File(path.clone());
        }
        match self.geocoder {
            Some(GeocoderArg::Nominatim) => config.geocoder.provider = GeocoderProvider::Nominatim,
            Some(GeocoderArg::Google) => {
                if !matches!(config.geocoder.provider, GeocoderProvider::GoogleMaps { .. }) {
                    config.geocoder.provider = GeocoderProvider::GoogleMaps { api_key: None };
                }
            }
            None => {}
        }
        if let Some(ms) = self.delay_ms {
            config.enrich_delay_ms = ms;
        }
        if self.no_sort {
            config.snapshot.sort_by_impact = false;
        }
        if self.geojson {
            config.snapshot.geojson = true;
        }
        config
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            print!("{}", e.render());
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            // Usage problems go to stdout with status 2
            print!("{}", e.render());
            return ExitCode::from(2);
        }
    };

    let default_filter = if args.verbose {
        "contributor_map=debug,fetch_contributors=debug,info"
    } else {
        "contributor_map=info,fetch_contributors=info,warn"
    };
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let repo: RepoId = match args.repo.parse() {
        Ok(repo) => repo,
        Err(e) => {
            println!("error: {}\n\nUsage: fetch-contributors <OWNER/REPO> <USERNAME>", e);
            println!("Example: fetch-contributors mozilla/rust octocat");
            return ExitCode::from(2);
        }
    };

    match run(&args, repo).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &Args, repo: RepoId) -> Result<()> {
    info!("{}", "=".repeat(60));
    info!("Contributor Map collector: {}", repo);
    info!("{}", "=".repeat(60));

    let config = args.apply(PipelineConfig::from_env());

    let env_credentials = EnvCredentials::default();
    let credentials = (if args.password_stdin {
        ReaderCredentials::new(std::io::stdin().lock()).credentials(&args.username)
    } else if env_credentials.is_set() || !std::io::stdin().is_terminal() {
        env_credentials.credentials(&args.username)
    } else {
        ReaderCredentials::new(std::io::stdin().lock())
            .with_prompt()
            .credentials(&args.username)
    })
    .with_context(|| format!("no forge credential (use ${} or --password-stdin)", DEFAULT_TOKEN_VAR))?;

    let pipeline = Pipeline::from_config(&config, repo, credentials)
        .context("failed to set up HTTP clients")?;
    let report = pipeline.run().await.context("contributor collection failed")?;

    info!("{}", "=".repeat(60));
    info!("SUMMARY");
    info!("{}", "=".repeat(60));
    info!("Contributors: {} ({} measured)", report.contributors, report.measured);
    info!(
        "Located: {}  Unlocatable: {}",
        report.enrichment.located, report.enrichment.unlocatable
    );
    info!("Snapshot: {}", report.paths.snapshot.display());
    info!("Latest:   {}", report.paths.latest.display());
    if let Some(geojson) = &report.paths.geojson {
        info!("GeoJSON:  {}", geojson.display());
    }

    Ok(())
}

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rinkstat_adapters::{parse_roster, FixtureSession, FixtureSet, PageSession};
use rinkstat_core::PlayerSeed;
use rinkstat_storage::{CareerStore, MemoryStore, PgCareerStore};
use rinkstat_sync::{write_run_report, SyncConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "rinkstat-cli")]
#[command(about = "Rink career statistics sync")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Walk and store the careers of new players.
    Ingest {
        /// JSON array of player seeds.
        #[arg(long)]
        seeds: PathBuf,
        /// Serve pages from a fixture set instead of the live site.
        #[arg(long)]
        fixtures: Option<PathBuf>,
        /// Write into an in-memory store and discard it.
        #[arg(long)]
        dry_run: bool,
    },
    /// Re-scrape and reconcile every stored current-year season.
    Refresh {
        #[arg(long)]
        fixtures: Option<PathBuf>,
    },
    /// Print the player seeds found in a saved roster page.
    Roster {
        #[arg(long)]
        html: PathBuf,
    },
    /// Create missing tables.
    Migrate,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .try_init();
}

fn load_seeds(path: &Path) -> Result<Vec<PlayerSeed>> {
    let data = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parsing seeds in {}", path.display()))
}

fn page_session(config: &SyncConfig, fixtures: Option<&Path>) -> Result<Box<dyn PageSession>> {
    Ok(match fixtures {
        Some(path) => Box::new(FixtureSession::new(FixtureSet::from_json_file(path)?)),
        None => Box::new(config.http_session()?),
    })
}

async fn postgres_store(config: &SyncConfig) -> Result<PgCareerStore> {
    let store = PgCareerStore::connect(&config.database_url)
        .await
        .context("connecting to the database")?;
    store.ensure_schema().await.context("ensuring schema")?;
    Ok(store)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = SyncConfig::from_env();

    match cli.command {
        Commands::Ingest {
            seeds,
            fixtures,
            dry_run,
        } => {
            let seeds = load_seeds(&seeds)?;
            let sync = config.career_sync()?;
            let mut session = page_session(&config, fixtures.as_deref())?;
            let store: Box<dyn CareerStore> = if dry_run {
                Box::new(MemoryStore::new())
            } else {
                Box::new(postgres_store(&config).await?)
            };

            let summary = sync.ingest_players(session.as_mut(), store.as_ref(), &seeds).await;
            let report = write_run_report(&config.reports_dir, "ingest", summary.run_id, &summary).await?;
            println!(
                "ingest complete: run_id={} ingested={} skipped={} failed={} seasons={} levels={} report={}",
                summary.run_id,
                summary.ingested,
                summary.skipped,
                summary.failures.len(),
                summary.seasons,
                summary.season_levels,
                report.display()
            );
        }
        Commands::Refresh { fixtures } => {
            let sync = config.career_sync()?;
            let mut session = page_session(&config, fixtures.as_deref())?;
            let store = postgres_store(&config).await?;

            let summary = sync.refresh_current_season(session.as_mut(), &store).await?;
            let report = write_run_report(&config.reports_dir, "refresh", summary.run_id, &summary).await?;
            println!(
                "refresh complete: run_id={} year={} seasons={} updated={} inserted={} failed={} report={}",
                summary.run_id,
                summary.current_year,
                summary.seasons,
                summary.updated,
                summary.inserted,
                summary.failures.len(),
                report.display()
            );
        }
        Commands::Roster { html } => {
            let markup = std::fs::read_to_string(&html).with_context(|| format!("reading {}", html.display()))?;
            let seeds = parse_roster(&markup, &config.site_base_url)?;
            info!(players = seeds.len(), "roster parsed");
            println!("{}", serde_json::to_string_pretty(&seeds)?);
        }
        Commands::Migrate => {
            postgres_store(&config).await?;
            println!("schema ready");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeds_load_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seeds.json");
        std::fs::write(
            &path,
            r#"[{"sjl_name": "LAINE Eetu", "ep_name": "Eetu Laine", "sjl_link": "https://example.test/p/1"}]"#,
        )
        .unwrap();
        let seeds = load_seeds(&path).unwrap();
        assert_eq!(seeds.len(), 1);
        assert_eq!(seeds[0].ep_name, "Eetu Laine");

        assert!(load_seeds(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn cli_parses_ingest_flags() {
        let cli = Cli::try_parse_from(["rinkstat-cli", "ingest", "--seeds", "s.json", "--dry-run"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Ingest { dry_run: true, fixtures: None, .. }
        ));
    }
}

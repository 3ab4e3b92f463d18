//! tzsync: timezone dataset cache and sync
//!
//! Operator CLI over a tzsync node:
//! - Loads the dataset from an LMDB store or a zip archive
//! - Serves zone, alias, expansion and conversion queries
//! - Compares and applies updates from a primary archive
//! - Watches the source and reloads when it changes

mod logging;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::builder::styling::{AnsiColor, Effects};
use clap::{Parser, Subcommand, builder::Styles};
use color_eyre::Result;
use tracing::{debug, error, info, warn};

use tzsync_core::datetime::format_dtstamp;
use tzsync_core::{
    ArchiveSource, DataSource as _, Orchestrator, ReloadOutcome, State, StoreSource, TzConfig,
    admin,
};

const STYLES: Styles = Styles::styled()
    .header(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Cyan.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default())
    .valid(AnsiColor::Green.on_default())
    .invalid(AnsiColor::Red.on_default());

#[derive(Parser)]
#[command(name = "tzsync")]
#[command(version)]
#[command(styles = STYLES)]
#[command(about = "Timezone dataset cache with diff-then-reload sync")]
#[command(long_about = r#"
tzsync serves timezone definitions from a bulk dataset and keeps secondary
nodes in step with a primary.

Sources are tried in order: the LMDB store (if configured), then the zip
archive at tzdata_url.

Examples:
  tzsync --archive ./tzdata.zip lookup US/Eastern     Print a zone definition
  tzsync expand Europe/Paris --start 20240101         Offset changes from 2024
  tzsync utc 20240701T120000 America/New_York         Local time to UTC
  tzsync compare https://primary/tzdata.zip           Diff against a primary
  tzsync watch                                        Reload on change
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file
    #[arg(short, long, global = true, default_value = tzsync_core::config::CONFIG_FILE)]
    config: PathBuf,

    /// Archive origin (path or URL), overrides tzdata_url
    #[arg(long, global = true)]
    archive: Option<String>,

    /// LMDB store directory, overrides store_path
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    Node(NodeCommand),

    /// Seed the store from an archive
    Import {
        /// Archive origin; defaults to tzdata_url
        origin: Option<String>,
    },

    /// Check periodically and reload on new data (Ctrl+C to stop)
    Watch {
        /// Seconds between checks, overrides refresh_delay_secs
        #[arg(short, long)]
        interval: Option<u64>,
    },

    /// Show or save the effective configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Commands served by a started orchestrator
#[derive(Subcommand)]
enum NodeCommand {
    /// Reload the dataset from its source
    Refresh,

    /// Check the source for new data and reload
    Check,

    /// Show differences between an archive and the live dataset
    Compare {
        /// Archive origin (path or URL)
        origin: String,
    },

    /// Apply an archive's differences to the live source
    Update {
        /// Archive origin; defaults to primary_url
        origin: Option<String>,
    },

    /// Show operational statistics
    Stats,

    /// Print a zone definition by id or alias
    Lookup {
        name: String,
    },

    /// List aliases of a zone
    Aliases {
        id: String,
    },

    /// Find zones whose id or aliases contain a string
    Find {
        partial: String,
    },

    /// List zones changed since a timestamp
    Changed {
        /// RFC 3339 timestamp; all zones when omitted
        #[arg(long)]
        since: Option<String>,
    },

    /// Expand a zone's offset changes over a window
    Expand {
        id: String,

        /// Window start (date or date-time, UTC); defaults to today
        #[arg(long)]
        start: Option<String>,

        /// Window end; defaults to ten years after the start
        #[arg(long)]
        end: Option<String>,
    },

    /// Convert a local date-time to UTC
    Utc {
        /// YYYYMMDDTHHMMSS, or YYYYMMDDTHHMMSSZ to pass through
        datetime: String,
        tzid: String,
    },

    /// Convert a date-time between zones
    Convert {
        datetime: String,

        #[arg(long)]
        from: String,

        #[arg(long)]
        to: String,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Write the effective configuration to the config file
    Save,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    let session = logging::init(cli.verbose);
    debug!("Debug log: {}", session.log_path.display());

    let mut config = admin::load_config(&cli.config)?;
    if let Some(archive) = &cli.archive {
        config.tzdata_url = Some(archive.clone());
    }
    if let Some(store) = &cli.store {
        config.store_path = Some(store.clone());
    }

    match cli.command {
        Commands::Config { action } => config_command(&cli.config, &config, &action)?,
        Commands::Import { origin } => {
            let config = config.clone();
            tokio::task::spawn_blocking(move || import_command(&config, origin.as_deref()))
                .await??;
        }
        Commands::Watch { interval } => {
            if let Some(interval) = interval {
                config.refresh_delay_secs = interval;
            }
            let orchestrator = start(&config).await?;
            watch_command(orchestrator, &config).await?;
        }
        Commands::Node(command) => {
            let orchestrator = start(&config).await?;
            let json = cli.json;
            let config_path = cli.config.clone();
            tokio::task::spawn_blocking(move || {
                let result = run_command(&orchestrator, command, &config, &config_path, json);
                orchestrator.shutdown();
                result
            })
            .await??;
        }
    }

    Ok(())
}

/// Build the orchestrator and load the first available source
async fn start(config: &TzConfig) -> Result<Arc<Orchestrator>> {
    let config = config.clone();
    let orchestrator =
        tokio::task::spawn_blocking(move || Orchestrator::from_config(&config)).await??;

    match orchestrator.state() {
        State::Ready => {
            let snapshot = orchestrator.snapshot();
            debug!(
                "Loaded {} zones ({}) from {}",
                snapshot.len(),
                format_dtstamp(snapshot.dtstamp()),
                orchestrator.source_description().unwrap_or_default()
            );
        }
        state => warn!("No dataset loaded (state: {state}); serving an empty dataset"),
    }
    Ok(Arc::new(orchestrator))
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_lines(lines: &[String], empty: &str) {
    if lines.is_empty() {
        println!("{empty}");
    }
    for line in lines {
        println!("{line}");
    }
}

fn not_found(what: &str) -> color_eyre::Report {
    color_eyre::eyre::eyre!("{what} not found")
}

fn run_command(
    orchestrator: &Orchestrator,
    command: NodeCommand,
    config: &TzConfig,
    config_path: &Path,
    json: bool,
) -> Result<()> {
    match command {
        NodeCommand::Refresh => println!("{}", admin::refresh_report(orchestrator)),
        NodeCommand::Check => println!("{}", admin::check_report(orchestrator)),
        NodeCommand::Compare { origin } => {
            if json {
                print_json(&orchestrator.compare(&origin)?)?;
            } else {
                print_lines(&admin::compare_report(orchestrator, &origin), "No differences");
            }
        }
        NodeCommand::Update { origin } => {
            let origin = origin
                .or_else(|| config.primary_url.clone())
                .ok_or_else(|| color_eyre::eyre::eyre!("no origin given and no primary_url configured"))?;
            update_command(orchestrator, &origin, config_path, json)?;
        }
        NodeCommand::Stats => {
            let stats = admin::stats(orchestrator);
            if json {
                print_json(&stats)?;
            } else {
                for stat in &stats {
                    match &stat.extra {
                        Some(extra) => println!("{:<20} {} ({extra})", stat.name, stat.value),
                        None => println!("{:<20} {}", stat.name, stat.value),
                    }
                }
            }
        }
        NodeCommand::Lookup { name } => {
            let record = match orchestrator.get_zone(&name)? {
                Some(record) => record,
                None => orchestrator
                    .get_aliased_zone(&name)?
                    .ok_or_else(|| not_found(&format!("zone {name}")))?,
            };
            if json {
                let snapshot = orchestrator.snapshot();
                print_json(&serde_json::json!({
                    "summary": snapshot.summary(&record),
                    "hash": record.hash.to_hex(),
                    "etag": orchestrator.etag(),
                    "definition": &*record.definition,
                }))?;
            } else {
                print!("{}", record.definition);
            }
        }
        NodeCommand::Aliases { id } => {
            let aliases: Vec<String> = orchestrator.aliases_of(&id).into_iter().collect();
            if json {
                print_json(&aliases)?;
            } else {
                print_lines(&aliases, &format!("No aliases for {id}"));
            }
        }
        NodeCommand::Find { partial } => {
            let zones = orchestrator.find_zones(&partial);
            if json {
                print_json(&zones)?;
            } else {
                for zone in &zones {
                    if zone.aliases.is_empty() {
                        println!("{}", zone.tzid);
                    } else {
                        println!("{} ({})", zone.tzid, zone.aliases.join(", "));
                    }
                }
            }
        }
        NodeCommand::Changed { since } => {
            let zones = orchestrator
                .list_changed_since(since.as_deref())?
                .ok_or_else(|| color_eyre::eyre::eyre!("invalid timestamp: {}", since.unwrap_or_default()))?;
            if json {
                print_json(&zones)?;
            } else {
                for zone in &zones {
                    println!("{} {}", format_dtstamp(zone.last_modified), zone.tzid);
                }
            }
        }
        NodeCommand::Expand { id, start, end } => {
            let result = orchestrator
                .expand(&id, start.as_deref(), end.as_deref())?
                .ok_or_else(|| not_found(&format!("zone {id} or window")))?;
            if json {
                print_json(&*result)?;
            } else {
                for observance in &result.observances {
                    println!(
                        "{} {:<8} {} -> {}",
                        tzsync_core::datetime::format_local(observance.onset),
                        observance.name,
                        observance.utc_offset_from,
                        observance.utc_offset_to
                    );
                }
            }
        }
        NodeCommand::Utc { datetime, tzid } => {
            let utc = orchestrator
                .local_to_utc(&datetime, &tzid)?
                .ok_or_else(|| color_eyre::eyre::eyre!("cannot convert {datetime} in {tzid}"))?;
            println!("{utc}");
        }
        NodeCommand::Convert { datetime, from, to } => {
            let converted = orchestrator
                .convert(&datetime, &from, &to)?
                .ok_or_else(|| color_eyre::eyre::eyre!("cannot convert {datetime} from {from} to {to}"))?;
            println!("{converted}");
        }
    }
    Ok(())
}

fn update_command(
    orchestrator: &Orchestrator,
    origin: &str,
    config_path: &Path,
    json: bool,
) -> Result<()> {
    let applied = orchestrator.update(origin)?;
    if json {
        print_json(&applied)?;
    } else {
        let lines: Vec<String> = applied.iter().map(|e| e.to_short_string()).collect();
        print_lines(&lines, "No differences");
    }

    if !applied.is_empty() && config_path.exists() {
        let mut saved = admin::load_config(config_path)?;
        saved.dtstamp = Some(format_dtstamp(orchestrator.dtstamp()));
        admin::save_config(config_path, &saved)?;
        debug!("Recorded dtstamp in {}", config_path.display());
    }
    Ok(())
}

fn import_command(config: &TzConfig, origin: Option<&str>) -> Result<()> {
    let origin = origin
        .map(str::to_string)
        .or_else(|| config.tzdata_url.clone())
        .ok_or_else(|| color_eyre::eyre::eyre!("no origin given and no tzdata_url configured"))?;
    let store_path = config
        .store_path
        .as_ref()
        .ok_or_else(|| color_eyre::eyre::eyre!("no store configured (use --store or store_path)"))?;

    info!("Importing {origin} into {}", store_path.display());
    let mut archive = ArchiveSource::open(&origin, config.fetch_timeout())?;
    let snapshot = archive.load()?;
    archive.close();

    let mut store = StoreSource::open(store_path)?;
    let zones = store.import(&snapshot)?;
    info!(
        "Imported {zones} zones and {} aliases ({})",
        snapshot.aliases().len(),
        format_dtstamp(snapshot.dtstamp())
    );
    Ok(())
}

fn config_command(path: &Path, config: &TzConfig, action: &ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => print!("{}", config.to_toml_string()?),
        ConfigAction::Save => {
            admin::save_config(path, config)?;
            info!("Saved configuration to {}", path.display());
        }
    }
    Ok(())
}

/// One watch tick: secondaries pull from the primary, everyone else
/// reloads when the source reports new data.
fn watch_tick(orchestrator: &Orchestrator, config: &TzConfig) -> tzsync_core::Result<String> {
    if let (false, Some(primary)) = (config.primary_server, &config.primary_url) {
        let applied = orchestrator.update(primary)?;
        return Ok(format!("applied {} differences from {primary}", applied.len()));
    }

    if !orchestrator.has_new_data()? {
        return Ok("no new data".to_string());
    }
    match orchestrator.check()? {
        ReloadOutcome::Reloaded { zones, generation } => {
            Ok(format!("reloaded {zones} zones (generation {generation})"))
        }
        ReloadOutcome::AlreadyReloading => Ok("reload already in progress".to_string()),
    }
}

async fn watch_command(orchestrator: Arc<Orchestrator>, config: &TzConfig) -> Result<()> {
    let delay = config.refresh_delay();
    info!("Checking every {}s (Ctrl+C to stop)...", delay.as_secs());

    let mut ticker = tokio::time::interval(delay);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately; the dataset was just loaded
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let orchestrator = Arc::clone(&orchestrator);
                let config = config.clone();
                match tokio::task::spawn_blocking(move || watch_tick(&orchestrator, &config)).await? {
                    Ok(report) => info!("{report}"),
                    Err(e) => error!("Check failed: {e}"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Stopping");
                break;
            }
        }
    }

    let closing = Arc::clone(&orchestrator);
    tokio::task::spawn_blocking(move || closing.shutdown()).await?;
    Ok(())
}

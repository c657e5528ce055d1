use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use stowage_cargo::{ItemSpec, ItemStatus};
use stowage_core::UserId;
use stowage_engine::dto::{PlacementRequest, SimulateRequest, StowRequest};
use stowage_engine::{CargoService, EngineConfig, ImportReport, UsageRequest};
use stowage_observability::LogFormat;

#[derive(Debug, Parser)]
#[command(name = "stowage")]
#[command(about = "Cargo placement, retrieval and waste planning over CSV inputs")]
#[command(version)]
struct Cli {
    /// Log output on stderr: json or pretty
    #[arg(long, global = true, default_value = "json")]
    log_format: LogFormat,

    /// Mission start date (overrides STOWAGE_START_DATE)
    #[arg(long, global = true, value_name = "YYYY-MM-DD")]
    start_date: Option<NaiveDate>,

    #[command(subcommand)]
    command: Command,
}

/// The three CSV files describing the cargo state.
#[derive(Debug, Args)]
struct Inputs {
    #[arg(long, value_name = "FILE")]
    containers: PathBuf,

    #[arg(long, value_name = "FILE")]
    items: PathBuf,

    /// Existing placements; without it every item starts staged
    #[arg(long, value_name = "FILE")]
    arrangement: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Recommend placements for every staged item without committing them
    Plan {
        #[command(flatten)]
        inputs: Inputs,
    },

    /// Advance the mission clock and report what was used, expired or depleted
    Simulate {
        #[command(flatten)]
        inputs: Inputs,

        #[arg(long, conflicts_with = "to")]
        days: Option<i64>,

        /// Target date instead of a day count
        #[arg(long, value_name = "YYYY-MM-DD")]
        to: Option<NaiveDate>,

        /// Item used once per simulated day (repeatable)
        #[arg(long = "use", value_name = "ITEM_ID")]
        usage: Vec<String>,
    },

    /// Write the (optionally re-stowed) state back out as CSV
    Export {
        #[command(flatten)]
        inputs: Inputs,

        #[arg(long, value_name = "DIR")]
        out_dir: PathBuf,

        /// Stow every staged item before exporting
        #[arg(long)]
        stow: bool,

        #[arg(long, default_value = "stowage-cli")]
        user: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    stowage_observability::tracing::init(cli.log_format);

    let mut config = EngineConfig::from_env();
    if let Some(date) = cli.start_date {
        config = config.with_start_date(date);
    }
    let service = CargoService::new(config);

    match cli.command {
        Command::Plan { inputs } => {
            load(&service, &inputs)?;
            let response = service.placement(PlacementRequest {
                items: staged(&service)?,
                containers: Vec::new(),
            })?;
            emit(&response)
        }
        Command::Simulate {
            inputs,
            days,
            to,
            usage,
        } => {
            load(&service, &inputs)?;
            let request = match (days, to) {
                (Some(days), _) => SimulateRequest::days(days),
                (None, Some(date)) => SimulateRequest {
                    to_timestamp: date.and_hms_opt(0, 0, 0).map(|t| t.and_utc()),
                    ..SimulateRequest::default()
                },
                (None, None) => bail!("either --days or --to is required"),
            };
            let request = request.using(usage.into_iter().map(UsageRequest::by_id).collect());
            let simulation = service.simulate(request)?;
            let waste = service.identify_waste()?;
            emit(&json!({ "simulation": simulation, "waste": waste.waste_items }))
        }
        Command::Export {
            inputs,
            out_dir,
            stow,
            user,
        } => {
            load(&service, &inputs)?;
            let mut failed = Vec::new();
            if stow {
                failed = stow_staged(&service, UserId::parse(user)?)?;
            }
            fs::create_dir_all(&out_dir)
                .with_context(|| format!("creating {}", out_dir.display()))?;
            let files = [
                out_dir.join("containers.csv"),
                out_dir.join("items.csv"),
                out_dir.join("arrangement.csv"),
            ];
            service.export_containers(create(&files[0])?)?;
            service.export_items(create(&files[1])?)?;
            service.export_arrangement(create(&files[2])?)?;
            info!(dir = %out_dir.display(), "export written");
            emit(&json!({ "files": files, "unplaced": failed }))
        }
    }
}

/// Import containers, items and (if given) the arrangement, in that order.
fn load(service: &CargoService, inputs: &Inputs) -> Result<()> {
    report("containers", service.import_containers(open(&inputs.containers)?, None)?);
    report("items", service.import_items(open(&inputs.items)?, None)?);
    if let Some(path) = &inputs.arrangement {
        report("arrangement", service.import_arrangement(open(path)?, None)?);
    }
    Ok(())
}

fn report(kind: &str, imported: ImportReport) {
    for error in &imported.errors {
        warn!(kind, row = error.row, message = %error.message, "row skipped");
    }
}

fn staged(service: &CargoService) -> Result<Vec<ItemSpec>> {
    Ok(service
        .snapshot()?
        .items()
        .filter(|i| i.status() == ItemStatus::Staged)
        .map(|i| i.spec().clone())
        .collect())
}

/// Stow staged items one at a time, most important first. Returns the items
/// that found no space, with the reason.
fn stow_staged(service: &CargoService, user: UserId) -> Result<Vec<serde_json::Value>> {
    let mut specs = staged(service)?;
    specs.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.dimensions.volume().total_cmp(&b.dimensions.volume()))
            .then_with(|| a.item_id.cmp(&b.item_id))
    });

    let mut failed = Vec::new();
    for spec in specs {
        let request = StowRequest {
            item_id: spec.item_id.clone(),
            user_id: user.clone(),
            timestamp: Utc::now(),
            containers: None,
        };
        if let Err(err) = service.stow(request) {
            failed.push(json!({ "itemId": spec.item_id, "reason": err.to_string() }));
        }
    }
    Ok(failed)
}

fn open(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    Ok(BufReader::new(file))
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    Ok(BufWriter::new(file))
}

fn emit<T: Serialize>(value: &T) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    Ok(())
}

//! downtime: resolve a period's downtime submissions against campaign data.
//!
//! World state is seeded from the data directory on every run. Records are
//! carried between runs through a snapshot file and pack checklists through
//! a JSON file, so packs can be generated and ticked off after the
//! submissions that produced them.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use downtime_core::id::{CharacterId, GroupId, PeriodId};
use downtime_core::inventory::Owner;
use downtime_data::load_campaign;
use downtime_resolve::orchestrator::SubmitOutcome;
use downtime_resolve::pack::{PackFulfilment, PackTracker};
use downtime_resolve::{Orchestrator, RecordStore, Submission};
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "downtime")]
#[command(about = "Validate and commit LARP downtime submissions")]
struct Cli {
    /// Campaign data directory
    #[arg(long, env = "DOWNTIME_DATA", default_value = "data")]
    data: PathBuf,

    /// Record snapshot to load before and save after the command
    #[arg(long, env = "DOWNTIME_RECORDS")]
    records: Option<PathBuf>,

    /// Pack checklist file (JSON)
    #[arg(long, env = "DOWNTIME_PACKS")]
    packs: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check submissions without writing anything
    Validate {
        /// Submission files (JSON)
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Validate and commit submissions in order
    Submit {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Period pack checklists
    #[command(subcommand)]
    Pack(PackCommand),
}

#[derive(Subcommand)]
enum PackCommand {
    /// Build the pack for an owner from the period's records
    Generate(PackTarget),
    /// Show a generated pack
    View(PackTarget),
    /// Tick or untick checklist entries, e.g. `--set exotic_3=true`
    Update {
        #[command(flatten)]
        target: PackTarget,
        #[arg(long = "set", value_parser = parse_flag, required = true)]
        flags: Vec<(String, bool)>,
    },
}

#[derive(Args)]
struct PackTarget {
    #[arg(long, conflicts_with = "group", required_unless_present = "group")]
    character: Option<u32>,
    #[arg(long, required_unless_present = "character")]
    group: Option<u32>,
    #[arg(long)]
    period: u32,
}

impl PackTarget {
    fn owner(&self) -> anyhow::Result<Owner> {
        match (self.character, self.group) {
            (Some(c), None) => Ok(Owner::Character(CharacterId(c))),
            (None, Some(g)) => Ok(Owner::Group(GroupId(g))),
            _ => bail!("exactly one of --character or --group is required"),
        }
    }

    fn period(&self) -> PeriodId {
        PeriodId(self.period)
    }
}

fn parse_flag(s: &str) -> Result<(String, bool), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=true|false, got `{s}`"))?;
    let value = value
        .parse::<bool>()
        .map_err(|_| format!("`{value}` is not true or false"))?;
    Ok((key.to_string(), value))
}

fn init_logging(json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive("downtime=info".parse()?)
        .add_directive("downtime_resolve=info".parse()?);
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Persistence between runs
// ---------------------------------------------------------------------------

fn load_records(path: Option<&Path>) -> anyhow::Result<RecordStore> {
    match path {
        Some(path) if path.exists() => {
            let bytes = std::fs::read(path)
                .with_context(|| format!("reading record snapshot {}", path.display()))?;
            Ok(RecordStore::import(&bytes)?)
        }
        _ => Ok(RecordStore::new()),
    }
}

fn save_records(path: Option<&Path>, orch: &Orchestrator) -> anyhow::Result<()> {
    if let Some(path) = path {
        std::fs::write(path, orch.records().export()?)
            .with_context(|| format!("writing record snapshot {}", path.display()))?;
        info!(path = %path.display(), records = orch.records().len(), "records saved");
    }
    Ok(())
}

fn load_packs(path: Option<&Path>) -> anyhow::Result<PackTracker> {
    match path {
        Some(path) if path.exists() => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading packs {}", path.display()))?;
            let packs: Vec<PackFulfilment> = serde_json::from_str(&text)?;
            Ok(PackTracker::restore(packs))
        }
        _ => Ok(PackTracker::new()),
    }
}

fn save_packs(path: Option<&Path>, orch: &Orchestrator) -> anyhow::Result<()> {
    if let Some(path) = path {
        let text = serde_json::to_string_pretty(&orch.packs().all())?;
        std::fs::write(path, text).with_context(|| format!("writing packs {}", path.display()))?;
    }
    Ok(())
}

fn read_submission(path: &Path) -> anyhow::Result<Submission> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading submission {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing submission {}", path.display()))
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn validate(orch: &Orchestrator, files: &[PathBuf]) -> anyhow::Result<bool> {
    let submissions = files
        .iter()
        .map(|f| read_submission(f))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let outcomes = orch.validate_all(&submissions);
    let mut all_ok = true;
    let report: Vec<_> = submissions
        .iter()
        .zip(&outcomes)
        .map(|(sub, outcome)| {
            all_ok &= outcome.is_ok();
            json!({
                "key": sub.key,
                "valid": outcome.is_ok(),
                "total_cost": outcome.total_cost,
                "results": outcome.results,
                "errors": outcome.errors,
            })
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(all_ok)
}

fn submit(orch: &Orchestrator, files: &[PathBuf]) -> anyhow::Result<bool> {
    let mut all_ok = true;
    let mut report = Vec::new();
    for file in files {
        let sub = read_submission(file)?;
        let entry = match orch.submit(&sub) {
            SubmitOutcome::Committed { record, replayed } => json!({
                "key": sub.key,
                "state": "committed",
                "replayed": replayed,
                "record": record,
            }),
            SubmitOutcome::Rejected {
                errors,
                results,
                at_commit,
            } => {
                all_ok = false;
                warn!(key = %sub.key, errors = errors.len(), "submission rejected");
                json!({
                    "key": sub.key,
                    "state": "rejected",
                    "at_commit": at_commit,
                    "results": results,
                    "errors": errors,
                })
            }
        };
        report.push(entry);
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(all_ok)
}

fn pack(orch: &Orchestrator, command: &PackCommand) -> anyhow::Result<()> {
    let pack = match command {
        PackCommand::Generate(target) => orch.generate_pack(target.owner()?, target.period())?,
        PackCommand::View(target) => orch.view_pack(target.owner()?, target.period())?,
        PackCommand::Update { target, flags } => {
            let flags: BTreeMap<String, bool> = flags.iter().cloned().collect();
            orch.update_pack(target.owner()?, target.period(), &flags)?
        }
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "pack": pack,
            "complete": pack.is_complete(),
            "outstanding": pack.outstanding(),
        }))?
    );
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_json)?;

    let campaign = load_campaign(&cli.data)
        .with_context(|| format!("loading campaign data from {}", cli.data.display()))?;
    let orch = campaign
        .into_orchestrator()?
        .with_records(load_records(cli.records.as_deref())?)
        .with_packs(load_packs(cli.packs.as_deref())?);

    let ok = match &cli.command {
        Command::Validate { files } => validate(&orch, files)?,
        Command::Submit { files } => {
            let ok = submit(&orch, files)?;
            save_records(cli.records.as_deref(), &orch)?;
            ok
        }
        Command::Pack(command) => {
            pack(&orch, command)?;
            save_packs(cli.packs.as_deref(), &orch)?;
            true
        }
    };

    if !ok {
        std::process::exit(2);
    }
    Ok(())
}

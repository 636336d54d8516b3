//! labdaq command line interface.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use labdaq::config::Settings;
use labdaq::instrument::b1500::{KeysightB1500, B1520A};
use labdaq::instrument::{link, VisaLink};
use labdaq::metadata::{perform_db_upgrade, RunRegistry, LATEST_SCHEMA_VERSION};

#[derive(Parser)]
#[command(name = "labdaq", version, about = "Run metadata and B1520A CMU tools")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upgrade the run-metadata database schema
    Upgrade {
        /// Database file (defaults to the configured path)
        #[arg(long)]
        db: Option<PathBuf>,
        /// Target schema version
        #[arg(long, default_value_t = LATEST_SCHEMA_VERSION)]
        to: i64,
    },
    /// Print the schema version of a run-metadata database
    SchemaVersion {
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Take one spot capacitance reading with the B1520A
    SpotC {
        /// VISA resource (defaults to the configured resource)
        #[arg(long)]
        resource: Option<String>,
        /// Mainframe slot of the CMU
        #[arg(long)]
        slot: Option<u8>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::new(cli.config.as_deref()).context("failed to load configuration")?;
    labdaq::logging::init(&settings.log_level)?;

    match cli.command {
        Command::Upgrade { db, to } => {
            let path = db.unwrap_or_else(|| settings.database.path.clone());
            let registry = RunRegistry::open(&path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            let version = perform_db_upgrade(&registry, to)
                .with_context(|| format!("upgrade of {} failed", path.display()))?;
            info!("{} is at schema version {}", path.display(), version);
        }
        Command::SchemaVersion { db } => {
            let path = db.unwrap_or_else(|| settings.database.path.clone());
            let registry = RunRegistry::open(&path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            println!("{}", registry.schema_version()?);
        }
        Command::SpotC { resource, slot } => {
            let resource = resource.unwrap_or_else(|| settings.instrument.resource.clone());
            let slot = slot.unwrap_or(settings.instrument.cmu_slot);

            let visa = VisaLink::open(&resource)
                .with_context(|| format!("failed to open {resource}"))?
                .with_write_timeout(settings.timeouts.link_timeout());
            let mainframe = KeysightB1500::new(link::shared(visa), settings.timeouts.clone());
            let mut cmu = B1520A::new(mainframe, slot)?;

            let (primary, secondary) = cmu.capacitance().await?;
            println!("{primary:e}\t{secondary:e}");
        }
    }

    Ok(())
}

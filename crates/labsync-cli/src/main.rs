//! labsync command-line driver
//!
//! - `simulate`: run a scripted multi-participant workshop and print the result
//! - `report`: print the leaderboard, summary and failure points of a stored run
//!
//! Both load an optional TOML [`EngineConfig`]. With `storage_path` set, a
//! simulation persists its state and a later `report` reads it back.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use labsync_core::{ContentCatalog, EngineConfig, StaticCatalog, WorkshopEngine, WorkshopOptions};
use labsync_model::{Clock, ManualClock, SystemClock, WorkshopMode};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod demo;
mod output;
mod simulate;

use output::Report;
use simulate::Plan;

#[derive(Parser, Debug)]
#[command(
    name = "labsync",
    version,
    about = "Workshop session and progress engine",
    long_about = None
)]
struct Cli {
    /// Engine configuration (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Content catalog (JSON); the built-in encryption workshop otherwise
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    /// Log line format on stderr
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Compact)]
    log_format: LogFormat,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start a workshop and drive simulated participants through it
    Simulate {
        /// Number of participants
        #[arg(short, long, default_value_t = 4)]
        participants: usize,

        /// Customer label of the new session
        #[arg(long, default_value = "Demo Customer")]
        customer: String,

        /// Workshop template id
        #[arg(short, long)]
        template: Option<String>,

        /// Session mode, overriding the template default
        #[arg(short, long, value_enum)]
        mode: Option<ModeArg>,

        /// Simulated minutes between actions
        #[arg(long, default_value_t = 3)]
        minutes_per_step: i64,

        /// Reject every n-th verification call
        #[arg(long, default_value_t = 5)]
        fail_every: usize,
    },

    /// Print the current session's results
    Report,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Compact,
    Json,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeArg {
    Demo,
    Lab,
    Challenge,
}

impl From<ModeArg> for WorkshopMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Demo => Self::Demo,
            ModeArg::Lab => Self::Lab,
            ModeArg::Challenge => Self::Challenge,
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Compact => registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load(path).with_context(|| format!("loading {}", path.display())),
        None => Ok(EngineConfig::default()),
    }
}

fn load_catalog(path: Option<&Path>) -> Result<Arc<dyn ContentCatalog>> {
    let Some(path) = path else {
        return Ok(Arc::new(demo::catalog()));
    };
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let catalog = StaticCatalog::from_json(&raw).with_context(|| format!("parsing {}", path.display()))?;
    Ok(Arc::new(catalog))
}

fn report(engine: &WorkshopEngine) -> Result<Report> {
    let Some(session) = engine.session() else {
        bail!("no workshop session found; run `labsync simulate` with a storage_path first");
    };
    Ok(Report {
        summary: engine.metrics_summary()?,
        leaderboard: engine.ranked_leaderboard(),
        failure_points: engine.failure_points(),
        session,
    })
}

fn print(report: &Report, json: bool) -> Result<()> {
    if json {
        println!("{}", report.to_json()?);
    } else {
        print!("{report}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let config = load_config(cli.config.as_deref())?;
    let catalog = load_catalog(cli.catalog.as_deref())?;

    match cli.command {
        Command::Simulate {
            participants,
            customer,
            template,
            mode,
            minutes_per_step,
            fail_every,
        } => {
            // simulations run offline unless a workshop server is configured
            let offline = config.remote.is_none();
            let clock = ManualClock::new(SystemClock.now_ms());
            let mut builder =
                WorkshopEngine::builder(config, catalog).with_clock(Arc::new(clock.clone()) as Arc<dyn Clock>);
            if offline {
                builder = builder.with_oracle(Arc::new(demo::DemoOracle::new(fail_every)));
            }
            let engine = builder.build()?;

            let mut options = WorkshopOptions::new(customer);
            if let Some(template) = template {
                options = options.with_template(template);
            }
            if let Some(mode) = mode {
                options = options.with_mode(mode.into());
            }
            let session = engine.facilitator().start_new_workshop(options)?;
            info!(session = %session.id, participants, "simulating workshop");

            simulate::run(
                &engine,
                &clock,
                Plan {
                    participants,
                    minutes_per_step,
                },
            )
            .await?;
            print(&report(&engine)?, cli.json)
        }
        Command::Report => {
            let engine = WorkshopEngine::builder(config, catalog).build()?;
            if engine.config().remote.is_some() {
                engine.refresh_leaderboard().await;
            }
            print(&report(&engine)?, cli.json)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_follow_the_subcommand() {
        let cli = Cli::try_parse_from(["labsync", "simulate", "-p", "6", "--mode", "challenge", "--json"]).unwrap();
        assert!(cli.json);
        match cli.command {
            Command::Simulate {
                participants, mode, ..
            } => {
                assert_eq!(participants, 6);
                assert!(matches!(mode, Some(ModeArg::Challenge)));
            }
            Command::Report => panic!("expected simulate"),
        }
    }
}

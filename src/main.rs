//! patchvm - CLI

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use patchvm::linker::Linker;
use patchvm::project::Project;
use patchvm::runtime::primitives::PrimitiveRegistry;
use patchvm::runtime::uid::SafeIdentifierGenerator;
use patchvm::util::config::load_config;
use patchvm::util::logger::{self, LogLevel};
use patchvm::worker::WorkerMode;
use patchvm::{run_project, NAME, VERSION};

/// Execution engine for block-based visual programs
#[derive(Parser, Debug)]
#[command(name = "patchvm")]
#[command(version = VERSION)]
#[command(about = NAME, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to ~/.config/patchvm/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a project until its scripts finish
    Run {
        /// Project file
        #[arg(value_name = "PROJECT")]
        file: PathBuf,

        /// Stop after this many ticks
        #[arg(long)]
        ticks: Option<u64>,

        /// Where the script backend runs
        #[arg(long, value_enum)]
        worker: Option<WorkerMode>,

        /// Do not pace ticks to the configured rate
        #[arg(long)]
        fast: bool,
    },

    /// Link a project's scripts and print the event map as JSON
    Link {
        #[arg(value_name = "PROJECT")]
        file: PathBuf,
    },

    /// List registered opcodes
    Opcodes,

    /// Print version information
    Version,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = load_config(args.config.as_deref()).context("Failed to load config")?;
    let level = if args.verbose {
        LogLevel::Debug
    } else {
        config.log.level
    };
    logger::init_with_level(level);

    if args.verbose {
        eprintln!("patchvm version: {}", VERSION);
        eprintln!("Host: {}", std::env::consts::OS);
    }

    match args.command {
        Commands::Run {
            file,
            ticks,
            worker,
            fast,
        } => {
            if let Some(mode) = worker {
                config.worker.mode = mode;
            }
            let project = Project::load(&file).with_context(|| format!("Failed to load: {}", file.display()))?;
            let summary = run_project(&project, &config, ticks, fast)
                .with_context(|| format!("Failed to run: {}", file.display()))?;
            println!(
                "ticks={} blocks={} threads={} faults={} script_errors={} live={}",
                summary.ticks,
                summary.stats.blocks_executed,
                summary.stats.threads_registered,
                summary.stats.faults,
                summary.stats.script_errors,
                summary.live_threads
            );
        }
        Commands::Link { file } => {
            let project = Project::load(&file).with_context(|| format!("Failed to load: {}", file.display()))?;
            let mut uid = SafeIdentifierGenerator::new();
            let known: Vec<_> = project.targets.iter().map(|t| t.id.clone()).collect();
            let output = Linker::new()
                .link(&project.scripts, |id| known.contains(id), &mut uid)
                .context("Link failed")?;
            let json = serde_json::to_string_pretty(&output.unit.event_map)
                .context("Failed to serialize the event map")?;
            println!("{}", json);
            if args.verbose {
                eprintln!("{}", output.unit.source);
            }
        }
        Commands::Opcodes => {
            let registry = PrimitiveRegistry::with_defaults();
            for opcode in registry.opcodes() {
                println!("{}", opcode);
            }
            for (hat, info) in registry.hat_opcodes() {
                let restart = if info.restart_existing_threads {
                    "restart"
                } else {
                    "no-restart"
                };
                println!("{} (hat, {})", hat, restart);
            }
        }
        Commands::Version => {
            println!("{} {}", NAME, VERSION);
        }
    }

    Ok(())
}

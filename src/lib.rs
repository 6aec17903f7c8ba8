//! patchvm: execution engine for block-based visual programs
//!
//! A cooperative scheduler runs script threads at a fixed tick rate. Script
//! bodies execute in a separate backend that calls back into the host for
//! each block through a token-correlated message protocol; block packages
//! implement those blocks against a stage of sprites and a set of I/O
//! devices.
//!
//! # Example
//!
//! ```no_run
//! use patchvm::project::Project;
//! use patchvm::util::config::VmConfig;
//! use patchvm::Result;
//!
//! fn main() -> Result<()> {
//!     let project = Project::load("demo.json".as_ref())?;
//!     let summary = patchvm::run_project(&project, &VmConfig::default(), Some(600), false)?;
//!     println!("{} ticks", summary.ticks);
//!     Ok(())
//! }
//! ```

#![warn(rust_2018_idioms)]

// Public modules
pub mod blocks;
pub mod io;
pub mod linker;
pub mod project;
pub mod render;
pub mod runtime;
pub mod worker;

// Utility modules
pub mod util;

// Re-exports
pub use anyhow::{Context, Result};
pub use thiserror::Error;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::project::Project;
use crate::render::HeadlessRenderer;
use crate::runtime::primitives::PrimitiveRegistry;
use crate::runtime::scheduler::{Scheduler, SchedulerConfig, SchedulerStats, TickDriver};
use crate::runtime::stage::Target;
use crate::util::config::VmConfig;

/// Engine version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name
pub const NAME: &str = "patchvm";

/// Build a scheduler with the default packages and the configured worker.
pub fn build_scheduler(config: &VmConfig) -> Result<Scheduler> {
    let scheduler_config = SchedulerConfig::from(config);
    let bridge = worker::script_worker_bridge(
        config.worker.mode,
        scheduler_config.request_timeout,
        scheduler_config.block_timeout,
    )
    .context("Failed to start the script worker")?;
    let registry = Arc::new(PrimitiveRegistry::with_defaults());
    debug!("Registered {} opcodes", registry.len());
    Ok(Scheduler::new(scheduler_config, registry, bridge))
}

/// Create the project's targets and register its scripts.
pub fn load_project(
    scheduler: &mut Scheduler,
    project: &Project,
) -> Result<()> {
    for spec in &project.targets {
        scheduler.add_target(Target::from_spec(spec.clone()));
    }
    scheduler
        .load_scripts(&project.scripts)
        .context("Failed to load scripts")?;
    Ok(())
}

/// Outcome of [`run_project`].
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub ticks: u64,
    pub stats: SchedulerStats,
    /// Threads still live when the run ended.
    pub live_threads: usize,
}

/// Load a project, click the green flag and tick until every thread has
/// finished or `max_ticks` is reached. `fast` skips the pacing sleep.
pub fn run_project(
    project: &Project,
    config: &VmConfig,
    max_ticks: Option<u64>,
    fast: bool,
) -> Result<RunSummary> {
    let mut scheduler = build_scheduler(config)?;
    scheduler.attach_renderer(Box::new(HeadlessRenderer::default()));
    scheduler
        .init_backend(&config.worker.backend_url)
        .context("Backend did not come up")?;
    load_project(&mut scheduler, project)?;

    let started = scheduler.green_flag().context("Failed to start scripts")?;
    info!("Green flag started {} threads", started.len());

    let interval = if fast {
        Duration::ZERO
    } else {
        config.tick_interval()
    };
    let driver = TickDriver::new(interval);
    let ticks = driver.run(&mut scheduler, max_ticks, |scheduler, report| {
        for fault in &report.faults {
            debug!("Tick {} fault: {}", report.tick, fault);
        }
        scheduler.thread_count() > 0 || report.messages > 0
    });

    let summary = RunSummary {
        ticks,
        stats: scheduler.stats().clone(),
        live_threads: scheduler.thread_count(),
    };
    scheduler.dispose();
    Ok(summary)
}

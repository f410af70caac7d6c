//! semsim -- terminal view of N processes sharing R resources through a
//! fair semaphore.
//!
//! # Configuration
//!
//! Run parameters come from, in priority order:
//!
//! 1. CLI arguments (`--resources`, `--processes`, `--duration-ms`)
//! 2. A config file passed with `--config` (`.toml`, `.ron` or `.json`)
//! 3. Default values (3 resources, 10 processes, 2000 ms)
//!
//! Log output goes to stderr. `--debug` enables per-worker events;
//! otherwise `RUST_LOG` is honoured, falling back to `info`.

mod error;
mod render;

use std::io::{IsTerminal, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use semsim_core::config::SimConfig;
use semsim_core::id::WorkerId;
use semsim_core::simulation::{Simulation, Simulator};
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing_subscriber::EnvFilter;

use crate::error::DemoError;

/// Semaphore synchronization simulation
#[derive(Parser, Debug)]
#[command(name = "semsim")]
#[command(version, about, long_about = None)]
struct Args {
    /// Number of resource permits (overrides the config file)
    #[arg(short, long)]
    resources: Option<usize>,

    /// Number of processes (overrides the config file)
    #[arg(short, long)]
    processes: Option<usize>,

    /// Task duration per process in milliseconds (overrides the config file)
    #[arg(short = 't', long)]
    duration_ms: Option<u64>,

    /// Load run parameters from a TOML, RON or JSON file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Interrupt the process with this ID (repeatable)
    #[arg(short, long = "interrupt", value_name = "ID")]
    interrupts: Vec<u32>,

    /// Delay before the interrupts are delivered
    #[arg(long, default_value_t = 500)]
    interrupt_after_ms: u64,

    /// Minimum time between two redraws
    #[arg(long, default_value_t = 100)]
    frame_ms: u64,

    /// Number of consecutive runs
    #[arg(long, default_value_t = 1)]
    runs: u64,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

impl Args {
    /// Merge file values and CLI overrides, then validate.
    fn resolve_config(&self) -> Result<SimConfig, DemoError> {
        let mut config = match &self.config {
            Some(path) => SimConfig::load(path)?,
            None => SimConfig::default(),
        };
        if let Some(resources) = self.resources {
            config.resource_count = resources;
        }
        if let Some(processes) = self.processes {
            config.process_count = processes;
        }
        if let Some(duration_ms) = self.duration_ms {
            config.task_duration_ms = duration_ms;
        }
        config.validate()?;

        if self.runs == 0 {
            return Err(DemoError::NoRuns);
        }
        if let Some(&id) = self
            .interrupts
            .iter()
            .find(|&&id| id as usize >= config.process_count)
        {
            return Err(DemoError::InterruptOutOfRange {
                id,
                processes: config.process_count,
            });
        }
        Ok(config)
    }
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.debug);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), DemoError> {
    let config = args.resolve_config()?;

    let mut simulator = Simulator::default();
    let redraw = Arc::new(Notify::new());
    {
        let redraw = redraw.clone();
        simulator.notifier().set(move || redraw.notify_one());
    }

    let mut out = std::io::stdout().lock();
    writeln!(out, "{}\n", render::EXPLANATION)?;

    for run in 1..=args.runs {
        simulator.start(config)?;
        let Some(sim) = simulator.take_current() else {
            continue;
        };
        watch(&sim, run, &args, &redraw, &mut out).await?;

        let capacity = sim.gate().capacity();
        let gate = sim.gate().clone();
        let report = sim.join().await?;
        writeln!(out, "{}\n", render::summary(run, &report, gate.available(), capacity))?;
    }
    Ok(())
}

/// Redraw on change, at most once per `--frame-ms`, until every worker is
/// terminal. Interrupts are delivered once, `--interrupt-after-ms` after
/// the run starts, even in the middle of a throttle pause.
async fn watch(
    sim: &Simulation,
    run: u64,
    args: &Args,
    redraw: &Notify,
    out: &mut impl Write,
) -> Result<(), DemoError> {
    let started = Instant::now();
    let interrupt_at = started + Duration::from_millis(args.interrupt_after_ms);
    let mut interrupts_pending = !args.interrupts.is_empty();
    let throttle = Duration::from_millis(args.frame_ms);
    let clear = std::io::stdout().is_terminal();

    loop {
        let snapshot = sim.snapshot();
        if clear {
            write!(out, "\x1b[2J\x1b[H")?;
        }
        write!(
            out,
            "{}",
            render::frame(run, started.elapsed(), sim.gate().capacity(), &snapshot)
        )?;
        writeln!(out, "{}\n", render::legend())?;
        out.flush()?;

        if snapshot.all_terminal() {
            return Ok(());
        }

        let next_frame = Instant::now() + throttle;
        tokio::select! {
            biased;
            _ = tokio::time::sleep_until(interrupt_at), if interrupts_pending => {
                interrupts_pending = false;
                deliver_interrupts(sim, run, &args.interrupts);
                continue;
            }
            _ = tokio::time::sleep_until(next_frame) => {}
        }
        tokio::select! {
            biased;
            _ = tokio::time::sleep_until(interrupt_at), if interrupts_pending => {
                interrupts_pending = false;
                deliver_interrupts(sim, run, &args.interrupts);
            }
            _ = redraw.notified() => {}
        }
    }
}

fn deliver_interrupts(sim: &Simulation, run: u64, ids: &[u32]) {
    for &id in ids {
        tracing::info!(run, process = id, "interrupting");
        sim.cancel(WorkerId(id));
    }
}

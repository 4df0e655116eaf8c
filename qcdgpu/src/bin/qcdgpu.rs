// SPDX-License-Identifier: AGPL-3.0-only

//! Run a lattice simulation from a `Variable=Value` parameter file.
//!
//! ```text
//! qcdgpu run.cfg --set BETA=2.3 --set PLATFORM=0 --json
//! qcdgpu --list-devices
//! ```
//!
//! Logging follows `RUST_LOG` (default `info`). Ctrl-C stops the run at the
//! next sweep boundary after writing a checkpoint.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use qcdgpu::config::ParameterSet;
use qcdgpu::device::wgpu_device::enumerate_adapters;
use qcdgpu::report::{self, RunSummary};
use qcdgpu::{LatticeController, QcdError, RunState};
use qcdgpu_forge::inventory;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "qcdgpu", version, about = "Domain-decomposed SU(N) lattice gauge simulation")]
struct Cli {
    /// Parameter file of `Variable=Value` lines.
    config: Option<PathBuf>,

    /// Extra `KEY=VALUE` entries applied after the file.
    #[arg(short = 's', long = "set", value_name = "KEY=VALUE")]
    set: Vec<String>,

    /// Also write a JSON summary next to the text report.
    #[arg(long)]
    json: bool,

    /// Print compute substrates and wgpu adapters, then exit.
    #[arg(long)]
    list_devices: bool,
}

fn watch_interrupt(flag: Arc<AtomicBool>) -> anyhow::Result<()> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("signal runtime")?;
    std::thread::spawn(move || {
        rt.block_on(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, stopping at the next boundary");
                flag.store(true, Ordering::Relaxed);
            }
        });
    });
    Ok(())
}

fn list_devices() {
    inventory::print_inventory(&inventory::discover());
    println!();
    for adapter in enumerate_adapters() {
        println!("  {adapter}");
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    if cli.list_devices {
        list_devices();
        return Ok(());
    }

    let mut set = match &cli.config {
        Some(path) => ParameterSet::from_file(path)
            .with_context(|| format!("reading {}", path.display()))?,
        None => ParameterSet::new(),
    };
    for entry in &cli.set {
        set.push_entry(entry)?;
    }

    let mut controller = LatticeController::configure(&set)?;
    for line in controller.params().to_string().lines() {
        info!("{line}");
    }
    watch_interrupt(controller.shutdown_handle())?;

    let state = controller.run()?;
    match state {
        RunState::Done => {
            if let Some(path) = controller.report_path() {
                info!(report = %path.display(), "done");
            }
        }
        RunState::Interrupted => warn!(
            checkpoint = %controller.params().checkpoint_path().display(),
            "interrupted; rerun with RESUME to continue"
        ),
        other => warn!(state = ?other, "run ended early"),
    }

    if cli.json {
        let summary = RunSummary::collect(&controller);
        let path = report::write_json(&summary, &controller.params().output_path)?;
        info!(path = %path.display(), "JSON summary written");
    }

    if !controller.params().turnoff_waiting {
        println!("press Enter to exit");
        let mut line = String::new();
        let _ = std::io::stdin().read_line(&mut line);
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let fatal = e.downcast_ref::<QcdError>().is_some_and(QcdError::is_fatal);
            error!(fatal, "{e:#}");
            ExitCode::FAILURE
        }
    }
}

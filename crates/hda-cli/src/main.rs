//! `sof-audio-dump`: map the HD-Audio controller, self-test it, dump it.
//!
//! ```text
//! USAGE:
//!   sof-audio-dump                     Locate, map and self-test the controller
//!   sof-audio-dump -o hda.bin          ... then dump the HDA region to hda.bin
//!   sof-audio-dump --probe-bar-size    Size BARs from hardware, not constants
//! ```
//!
//! Diagnostics (BAR words, region table, mapped address) are logged at info
//! level; run with `RUST_LOG=hda_driver=info` to see them.
//!
//! Exit codes: 0 success, 3 device not found, 4 unsupported platform,
//! 5 permission denied, 6 mapping failed, 7 dump failed.

use anyhow::{Context, Result};
use clap::Parser;
use hda_driver::{
    Pipeline, PipelineConfig, PipelineError, PipelineReport, SizeStrategy, SysfsBus,
    DEFAULT_SYSFS_ROOT,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "sof-audio-dump",
    about = "Map the Intel HD-Audio controller BAR, self-test it and optionally dump it",
    after_help = "Please run this as root.\n\n\
                  BAR words, the region table and the mapped address are logged at info \
                  level: RUST_LOG=hda_driver=info sof-audio-dump",
    version
)]
struct Cli {
    /// Dump the HDA register region to FILE after the self-test.
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// PCI sysfs root to enumerate.
    #[arg(long, value_name = "DIR", env = "SOF_DUMP_SYSFS_ROOT", default_value = DEFAULT_SYSFS_ROOT)]
    sysfs_root: PathBuf,

    /// Size BARs by probing config space instead of using the fixed sizes.
    #[arg(long)]
    probe_bar_size: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();

    match run(&cli) {
        Ok(report) => {
            print_report(&report);
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("Error: {err:#}");
            let code = err
                .downcast_ref::<PipelineError>()
                .map_or(1, PipelineError::exit_code);
            ExitCode::from(code)
        }
    }
}

fn run(cli: &Cli) -> Result<PipelineReport> {
    let bus = SysfsBus::with_root(&cli.sysfs_root).map_err(PipelineError::from)?;

    let config = PipelineConfig {
        output: cli.output.clone(),
        size_strategy: if cli.probe_bar_size {
            SizeStrategy::Probe
        } else {
            SizeStrategy::Static
        },
    };

    tracing::debug!("Using sysfs root {}", bus.root().display());

    let report = Pipeline::new(bus, config)
        .run()
        .context("sof-audio-dump failed")?;
    Ok(report)
}

fn print_report(report: &PipelineReport) {
    println!(
        "{} HD-Audio controller {:04x}:{:04x} @ {}",
        report.platform.name(),
        report.device.vendor_id(),
        report.device.device_id(),
        report.device.address()
    );
    println!("  {}", report.hda);
    match &report.dsp {
        Some(dsp) => println!("  {dsp}"),
        None => println!("  DSP BAR unavailable"),
    }

    match report.self_test {
        Some(t) if t.passed() => println!("  HDA Global capabilities {:#x}", t.gcap),
        Some(t) => println!(
            "  HDA Global capabilities {:#x} (should be {:#x})",
            t.gcap, t.expected
        ),
        None => println!("  HDA Global capabilities unreadable"),
    }

    if let Some(dump) = &report.dump {
        println!(
            "  {} ({:#x}) bytes written to file {}",
            dump.bytes,
            dump.bytes,
            dump.path.display()
        );
    }
}

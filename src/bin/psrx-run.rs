// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 itsakeyfut
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! PSRX headless runner
//!
//! Boots a session from a BIOS image, runs it for a number of frames or
//! cycles and prints a report of where the machine ended up.
//!
//! Defaults for `--bios` and `--config` may come from `PSRX_BIOS` and
//! `PSRX_CONFIG`, read from the environment or a `.env` file.

use chrono::{DateTime, Local};
use clap::{Parser, ValueEnum};
use psrx_core::core::config::SessionConfig;
use psrx_core::core::system::{RunOutcome, System};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;

/// Headless PSX system runner
#[derive(Parser, Debug)]
#[command(name = "psrx-run")]
#[command(about = "Run the PSX emulation core without a frontend", long_about = None)]
struct Args {
    /// Session configuration (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// BIOS image, overriding the configuration
    #[arg(short, long)]
    bios: Option<PathBuf>,

    /// Number of frames to run
    #[arg(short, long, default_value = "60")]
    frames: u64,

    /// Run for this many cycles instead of whole frames
    #[arg(long)]
    cycles: Option<u64>,

    /// Trace the first N instructions
    #[arg(long, value_name = "N")]
    trace: Option<u64>,

    /// Trace output file
    #[arg(long, default_value = "trace.log")]
    trace_file: PathBuf,

    /// Write a save state here when the run ends
    #[arg(long)]
    snapshot_out: Option<PathBuf>,

    /// Report format
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    report: ReportFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ReportFormat {
    Text,
    Json,
}

/// End-of-run summary
#[derive(Debug, Serialize)]
struct Report {
    started_at: DateTime<Local>,
    elapsed_ms: u64,
    frames: u64,
    cycles: u64,
    pc: u32,
    interrupt_status: u32,
    interrupt_mask: u32,
    gp0_words: usize,
    gp0_dropped: u64,
    post_code: u8,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env file is normal
    let _ = dotenvy::dotenv();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} {:<5} {}",
                Local::now().format("%H:%M:%S%.3f"),
                record.level(),
                record.args()
            )
        })
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;
    let mut system = System::with_config(config)?;

    if let Some(limit) = args.trace {
        let file = File::create(&args.trace_file)?;
        system.enable_tracing(BufWriter::new(file), Some(limit));
        log::info!("Tracing to {}", args.trace_file.display());
    }

    let started_at = Local::now();
    let clock = Instant::now();
    let frames = run(&mut system, &args);
    system.disable_tracing();

    if let Some(path) = &args.snapshot_out {
        std::fs::write(path, system.snapshot()?)?;
        log::info!("Save state written to {}", path.display());
    }

    let report = build_report(&system, started_at, clock.elapsed().as_millis() as u64, frames);
    match args.report {
        ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        ReportFormat::Text => print_report(&report),
    }

    Ok(())
}

/// Configuration file first, then the BIOS override
fn load_config(args: &Args) -> psrx_core::Result<SessionConfig> {
    let config_path = args
        .config
        .clone()
        .or_else(|| std::env::var_os("PSRX_CONFIG").map(PathBuf::from));
    let mut config = match config_path {
        Some(path) => SessionConfig::load(path)?,
        None => SessionConfig::default(),
    };

    if let Some(bios) = args
        .bios
        .clone()
        .or_else(|| std::env::var_os("PSRX_BIOS").map(PathBuf::from))
    {
        config.bios_path = Some(bios);
    }
    if config.bios_path.is_none() {
        log::warn!("No BIOS configured, running from an empty ROM");
    }
    Ok(config)
}

/// Returns the number of frames completed
fn run(system: &mut System, args: &Args) -> u64 {
    let first_frame = system.gpu().borrow().frame_count();

    if let Some(budget) = args.cycles {
        let outcome = system.run_until(budget, |_| false);
        log::info!("Ran {} cycles", outcome.cycles());
    } else {
        for frame in 0..args.frames {
            if let RunOutcome::BudgetExhausted { cycles } = system.run_frame() {
                log::warn!("Frame {} never reached vblank after {} cycles", frame, cycles);
                break;
            }
        }
    }

    system.gpu().borrow().frame_count() - first_frame
}

fn build_report(system: &System, started_at: DateTime<Local>, elapsed_ms: u64, frames: u64) -> Report {
    let interrupts = system.interrupt_controller();
    let interrupts = interrupts.borrow();
    let gpu = system.gpu();
    let gpu = gpu.borrow();

    Report {
        started_at,
        elapsed_ms,
        frames,
        cycles: system.cycles(),
        pc: system.pc(),
        interrupt_status: interrupts.read_status(),
        interrupt_mask: interrupts.read_mask(),
        gp0_words: gpu.pending_words(),
        gp0_dropped: gpu.dropped_words(),
        post_code: system.expansion2().borrow().post_code(),
    }
}

fn print_report(report: &Report) {
    println!("Run started {}", report.started_at.format("%Y-%m-%d %H:%M:%S"));
    println!("  Frames:     {}", report.frames);
    println!("  Cycles:     {}", report.cycles);
    println!("  Elapsed:    {} ms", report.elapsed_ms);
    println!("  PC:         0x{:08X}", report.pc);
    println!("  I_STAT:     0x{:04X}", report.interrupt_status);
    println!("  I_MASK:     0x{:04X}", report.interrupt_mask);
    println!(
        "  GP0 queue:  {} words ({} dropped)",
        report.gp0_words, report.gp0_dropped
    );
    println!("  POST code:  0x{:02X}", report.post_code);
}

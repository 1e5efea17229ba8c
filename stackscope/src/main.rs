//! # stackscope - Main Entry Point
//!
//! Supports two operational modes:
//! - **Demo** (`--demo`): profile synthetic worker threads in-process and dump
//!   the reports selected by `--options` when the run ends
//! - **Replay** (`--replay dump.jsonl`): render reports from a raw record dump
//!   written by an earlier run with the `records` option

mod workload;

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::bounded;
use log::{info, warn};
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use stackscope::cli::Args;
use stackscope::config::{Action, Arguments};
use stackscope::domain::{ConfigError, ProfilerError};
use stackscope::export::load_records;
use stackscope::profiling::{Profiler, ThreadStackWalker};
use stackscope::report::ReportGenerator;

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    let bad_options = err.downcast_ref::<ConfigError>().is_some()
        || matches!(err.downcast_ref::<ProfilerError>(), Some(ProfilerError::Config(_)));
    if bad_options || err.to_string().to_lowercase().contains("missing required argument") {
        EXIT_USAGE
    } else {
        EXIT_ERROR
    }
}

#[tokio::main]
async fn run() -> Result<()> {
    let args = Args::parse();
    let options = Arguments::parse(&args.options)?;

    if let Some(ref path) = args.replay {
        return replay(path, &options);
    }
    if args.demo {
        return demo(&args, options).await;
    }

    anyhow::bail!(
        "Missing required argument: --demo or --replay FILE\n\n\
         Usage:\n  \
         stackscope --demo                  Profile a synthetic workload\n  \
         stackscope --replay dump.jsonl     Render a saved record dump\n\n\
         Run 'stackscope --help' for more options"
    )
}

/// Render the reports selected in `options` from a record dump
fn replay(path: &Path, options: &Arguments) -> Result<()> {
    let snapshot = load_records(path)
        .with_context(|| format!("Failed to load record dump {}", path.display()))?;
    info!(
        "Loaded {} traces and {} methods (generation {})",
        snapshot.traces.len(),
        snapshot.methods.len(),
        snapshot.info.generation
    );

    let options = options.or_default_outputs();
    let report = ReportGenerator::new(&snapshot);
    match options.file {
        Some(ref out_path) => {
            let file = File::create(out_path)
                .with_context(|| format!("Failed to create {}", out_path.display()))?;
            report.dump(&options, &mut BufWriter::new(file))?;
        }
        None => report.dump(&options, &mut io::stdout().lock())?,
    }
    Ok(())
}

async fn demo(args: &Args, options: Arguments) -> Result<()> {
    let quiet = args.quiet;
    let profiler = Arc::new(Profiler::new(ThreadStackWalker));
    workload::install(&profiler);

    match profiler.refresh_native_libraries() {
        Ok(count) => info!("Loaded symbols of {count} native libraries"),
        Err(e) => warn!("Native symbols unavailable: {e:#}"),
    }

    profiler.start(&options)?;
    let pacing = workload::pacing(&options);
    if !quiet {
        println!("stackscope v{}", env!("CARGO_PKG_VERSION"));
        println!("event: {}", options.event);
        println!("workers: {}", args.threads);
        println!("pacing: {:.3} ms", pacing.as_secs_f64() * 1000.0);
    }

    // Workers exit once the sender is dropped
    let (stop_tx, stop_rx) = bounded::<()>(0);
    let workers = workload::spawn_workers(&profiler, args.threads, options.event, pacing, &stop_rx)?;
    drop(stop_rx);

    // Setup Ctrl+C handler
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let profiling_start = Instant::now();
    let duration_limit =
        if args.duration > 0 { Some(Duration::from_secs(args.duration)) } else { None };
    let mut exit_reason = "interrupted";

    loop {
        if let Some(limit) = duration_limit {
            if profiling_start.elapsed() >= limit {
                exit_reason = "duration limit reached";
                break;
            }
        }

        tokio::select! {
            () = tokio::time::sleep(Duration::from_millis(100)) => {}
            _ = &mut ctrl_c => {
                break;
            }
        }
    }

    drop(stop_tx);
    let mut recorded = 0;
    for handle in workers {
        match handle.join() {
            Ok(count) => recorded += count,
            Err(_) => warn!("Demo worker panicked"),
        }
    }

    if !quiet {
        eprintln!(
            "\n{}: {:.1}s, {} samples recorded by {} workers",
            exit_reason,
            profiling_start.elapsed().as_secs_f64(),
            recorded,
            args.threads
        );
    }

    // `stop` dumps what the options select, or the default reports
    let stop = Arguments { action: Action::Stop, ..options };
    profiler.run(&stop, &mut io::stdout().lock())?;
    profiler.shutdown(&stop, &mut io::sink())?;

    if !quiet {
        if let Some(ref path) = stop.file {
            println!("saved: {}", path.display());
        }
    }
    Ok(())
}

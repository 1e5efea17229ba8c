//! Flags of the `stackscope` binary
//!
//! Profiler behaviour itself is configured through `--options`, the same
//! comma-delimited string an embedding runtime passes to the engine.

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "stackscope",
    about = "Low-overhead sampling profiler engine",
    after_help = "\
EXAMPLES:
    stackscope --demo                                   Profile a synthetic workload for 5s
    stackscope --demo --options event=alloc,collapsed   Allocation profile as collapsed stacks
    stackscope --demo --options records,file=out.jsonl  Save a raw record dump
    stackscope --replay out.jsonl --options flamegraph  Re-render a saved dump offline"
)]
pub struct Args {
    /// Profile a synthetic multi-threaded workload
    #[arg(long, conflicts_with = "replay")]
    pub demo: bool,

    /// Render reports from a raw record dump
    #[arg(long, value_name = "FILE")]
    pub replay: Option<PathBuf>,

    /// Profiler options, e.g. "event=cpu,interval=1ms,threads,collapsed"
    #[arg(short, long, default_value = "")]
    pub options: String,

    /// Number of worker threads in demo mode
    #[arg(long, default_value = "4", value_parser = clap::value_parser!(u16).range(1..))]
    pub threads: u16,

    /// Stop the demo after N seconds (0 = until Ctrl+C)
    #[arg(long, default_value = "5")]
    pub duration: u64,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,
}

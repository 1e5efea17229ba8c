//! Collapsed stacks: `root;caller;leaf weight`, one line per stack

use std::collections::HashMap;
use std::io::{self, Write};

use super::snapshot::{Snapshot, TraceSample};
use crate::config::Counter;

pub(crate) fn weight(trace: &TraceSample, counter: Counter) -> u64 {
    match counter {
        Counter::Samples => trace.samples,
        Counter::Total => trace.counter,
    }
}

/// Rendered stacks with their weights, heaviest first
///
/// Traces whose frames render to the same text are merged. Ties are broken
/// by the stack text, so the output only depends on the trace set.
#[must_use]
pub fn collapsed_lines(snapshot: &Snapshot, counter: Counter) -> Vec<(String, u64)> {
    let mut stacks: HashMap<String, u64> = HashMap::new();
    for trace in &snapshot.traces {
        let weight = weight(trace, counter);
        if weight == 0 {
            continue;
        }
        let stack = trace.frames.iter().map(|f| f.name.as_str()).collect::<Vec<_>>().join(";");
        *stacks.entry(stack).or_insert(0) += weight;
    }

    let mut lines: Vec<(String, u64)> = stacks.into_iter().collect();
    lines.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    lines
}

pub(crate) fn write_collapsed(
    snapshot: &Snapshot,
    out: &mut dyn Write,
    counter: Counter,
) -> io::Result<()> {
    for (stack, weight) in collapsed_lines(snapshot, counter) {
        writeln!(out, "{stack} {weight}")?;
    }
    Ok(())
}

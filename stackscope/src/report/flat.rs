//! Top-N listings: heaviest call traces and the flat profile

use std::cmp::Reverse;
use std::io::{self, Write};

use super::snapshot::{MethodEntry, Snapshot, TraceSample};
use super::summary::percent;

/// Traces by weighted counter, heaviest first, ties in first-seen order
#[must_use]
pub fn top_traces(snapshot: &Snapshot, max: usize) -> Vec<&TraceSample> {
    let mut traces: Vec<_> = snapshot.traces.iter().collect();
    traces.sort_by_key(|t| (Reverse(t.counter), t.sequence));
    traces.truncate(max);
    traces
}

/// Leaf frames by weighted counter, heaviest first, ties in first-seen order
#[must_use]
pub fn top_methods(snapshot: &Snapshot, max: usize) -> Vec<&MethodEntry> {
    let mut methods: Vec<_> = snapshot.methods.iter().collect();
    methods.sort_by_key(|m| (Reverse(m.counter), m.sequence));
    methods.truncate(max);
    methods
}

pub(crate) fn write_traces(snapshot: &Snapshot, out: &mut dyn Write, max: usize) -> io::Result<()> {
    let units = snapshot.info.event.units();
    for trace in top_traces(snapshot, max) {
        writeln!(
            out,
            "--- {} {units} ({:.2}%), {} samples",
            trace.counter,
            percent(trace.counter, snapshot.info.total_counter),
            trace.samples
        )?;
        for (depth, frame) in trace.frames.iter().rev().enumerate() {
            writeln!(out, "  [{depth:>2}] {}", frame.name)?;
        }
        writeln!(out)?;
    }
    Ok(())
}

pub(crate) fn write_flat(snapshot: &Snapshot, out: &mut dyn Write, max: usize) -> io::Result<()> {
    let methods = top_methods(snapshot, max);
    if methods.is_empty() {
        return Ok(());
    }

    writeln!(out, "{:>12}  percent  samples  top", snapshot.info.event.units())?;
    writeln!(out, "  ----------  -------  -------  ---")?;
    for method in methods {
        writeln!(
            out,
            "{:>12}  {:>6.2}%  {:>7}  {}",
            method.counter,
            percent(method.counter, snapshot.info.total_counter),
            method.samples,
            method.frame.name
        )?;
    }
    writeln!(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::testing::{method, snapshot_of, trace, with_methods};

    #[test]
    fn test_top_traces_order_and_limit() {
        let snapshot = snapshot_of(vec![
            trace(&["a"], 1, 5),
            trace(&["b"], 1, 9),
            trace(&["c"], 1, 5),
        ]);
        let names: Vec<_> =
            top_traces(&snapshot, 2).iter().map(|t| t.frames[0].name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn test_traces_print_leaf_first() {
        let snapshot = snapshot_of(vec![trace(&["main", "work"], 2, 8)]);
        let mut out = Vec::new();
        write_traces(&snapshot, &mut out, usize::MAX).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "--- 8 ns (100.00%), 2 samples\n  [ 0] work\n  [ 1] main\n\n");
    }

    #[test]
    fn test_flat_profile() {
        let snapshot = with_methods(
            snapshot_of(vec![trace(&["x"], 3, 10)]),
            vec![method("light", 1, 2), method("heavy", 2, 8)],
        );
        let mut out = Vec::new();
        write_flat(&snapshot, &mut out, 10).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();

        assert_eq!(lines[0], "          ns  percent  samples  top");
        assert_eq!(lines[2], "           8   80.00%        2  heavy");
        assert_eq!(lines[3], "           2   20.00%        1  light");
    }
}

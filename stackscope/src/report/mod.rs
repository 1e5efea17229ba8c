//! # Report Generation
//!
//! Renders a [`Snapshot`] into the human-readable outputs:
//!
//! - **summary**: uptime, totals, per-failure counts, frame buffer usage
//! - **traces**: heaviest distinct call traces, leaf first
//! - **flat**: heaviest leaf frames
//! - **collapsed**: `root;...;leaf weight` lines, the interchange format of
//!   flame graph tools
//! - **tree**: indented call tree
//! - **flame graph**: nested width-weighted node data (JSON)
//!
//! Collapsed, tree and flame graph output weigh traces by sample count or
//! by the weighted counter, see [`Counter`].

pub mod call_tree;
pub mod collapsed;
pub mod flat;
pub mod snapshot;
pub mod summary;

use std::io::{self, Write};

pub use call_tree::{CallTree, FlameGraphData, FlameNode};
pub use collapsed::collapsed_lines;
pub use flat::{top_methods, top_traces};
pub use snapshot::{
    FrameBufferUsage, FrameNamer, MethodEntry, NamedFrame, SessionInfo, Snapshot, TraceSample,
};

use crate::config::{Arguments, Counter, FlameGraphParams};
use crate::domain::ProfilerError;

pub struct ReportGenerator<'a> {
    snapshot: &'a Snapshot,
}

impl<'a> ReportGenerator<'a> {
    #[must_use]
    pub fn new(snapshot: &'a Snapshot) -> Self {
        Self { snapshot }
    }

    /// # Errors
    /// Propagates write errors
    pub fn summary(&self, out: &mut dyn Write) -> io::Result<()> {
        summary::write_summary(self.snapshot, out)
    }

    /// # Errors
    /// Propagates write errors
    pub fn collapsed(&self, out: &mut dyn Write, counter: Counter) -> io::Result<()> {
        collapsed::write_collapsed(self.snapshot, out, counter)
    }

    /// # Errors
    /// Propagates write errors
    pub fn tree(
        &self,
        out: &mut dyn Write,
        params: &FlameGraphParams,
        counter: Counter,
    ) -> io::Result<()> {
        CallTree::build(self.snapshot, counter, params.reverse).write_text(out, params)
    }

    /// Flame graph node data as JSON
    ///
    /// # Errors
    /// Propagates write and serialization errors
    pub fn flame_graph(
        &self,
        out: &mut dyn Write,
        params: &FlameGraphParams,
        counter: Counter,
    ) -> io::Result<()> {
        let data = CallTree::build(self.snapshot, counter, params.reverse)
            .flame_graph(params, counter);
        serde_json::to_writer_pretty(&mut *out, &data)?;
        writeln!(out)
    }

    /// # Errors
    /// Propagates write errors
    pub fn traces(&self, out: &mut dyn Write, max: usize) -> io::Result<()> {
        flat::write_traces(self.snapshot, out, max)
    }

    /// # Errors
    /// Propagates write errors
    pub fn flat(&self, out: &mut dyn Write, max: usize) -> io::Result<()> {
        flat::write_flat(self.snapshot, out, max)
    }

    /// Write every output selected in `args`
    ///
    /// # Errors
    /// Propagates write and serialization errors
    pub fn dump(&self, args: &Arguments, out: &mut dyn Write) -> Result<(), ProfilerError> {
        if args.dump_summary {
            self.summary(out)?;
        }
        if args.dump_traces > 0 {
            self.traces(out, args.dump_traces)?;
        }
        if args.dump_flat > 0 {
            self.flat(out, args.dump_flat)?;
        }
        if args.dump_collapsed {
            self.collapsed(out, args.counter)?;
        }
        if args.dump_tree {
            self.tree(out, &args.flame_graph, args.counter)?;
        }
        if args.dump_flame_graph {
            self.flame_graph(out, &args.flame_graph, args.counter)?;
        }
        if args.dump_records {
            crate::export::write_records(self.snapshot, out)?;
        }
        out.flush()?;
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{snapshot_of, trace};
    use super::*;

    #[test]
    fn test_dump_writes_selected_outputs_only() {
        let snapshot = snapshot_of(vec![trace(&["main", "run"], 1, 1)]);
        let args = Arguments::parse("collapsed,summary").unwrap();

        let mut out = Vec::new();
        ReportGenerator::new(&snapshot).dump(&args, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("--- Execution profile ---"));
        assert!(text.ends_with("main;run 1\n"));
        assert!(!text.contains("percent  samples"));
    }

    #[test]
    fn test_flame_graph_is_json() {
        let snapshot = snapshot_of(vec![trace(&["main", "run"], 2, 2)]);
        let mut out = Vec::new();
        ReportGenerator::new(&snapshot)
            .flame_graph(&mut out, &FlameGraphParams::default(), Counter::Samples)
            .unwrap();

        let data: FlameGraphData = serde_json::from_slice(&out).unwrap();
        assert_eq!(data.title, "Flame Graph");
        assert_eq!(data.root.children[0].children[0].name, "run");
    }
}

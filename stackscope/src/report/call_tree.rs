//! Call tree and flame graph data
//!
//! Traces are merged into a prefix tree rooted at `all`. A node's value is
//! the total weight of every trace passing through it. When rendering, a
//! node narrower than `min_width` pixels (at the configured canvas width)
//! is elided together with its subtree; its weight still counts in its
//! ancestors.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{self, Write};

use super::collapsed::weight;
use super::snapshot::Snapshot;
use super::summary::percent;
use crate::config::{Counter, FlameGraphParams};

pub const ROOT_NAME: &str = "all";

#[derive(Debug, Default)]
struct TreeNode {
    total: u64,
    children: BTreeMap<String, TreeNode>,
}

#[derive(Debug, Default)]
pub struct CallTree {
    root: TreeNode,
}

/// Flame graph node as rendered by a flame graph viewer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlameNode {
    pub name: String,
    pub value: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<FlameNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlameGraphData {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub min_width: f64,
    pub reverse: bool,
    pub counter: String,
    /// Number of levels below the root that survived elision
    pub depth: usize,
    pub root: FlameNode,
}

impl CallTree {
    /// Merge all traces; `reverse` merges from the leaf instead of the root
    #[must_use]
    pub fn build(snapshot: &Snapshot, counter: Counter, reverse: bool) -> Self {
        let mut root = TreeNode::default();
        for trace in &snapshot.traces {
            let weight = weight(trace, counter);
            if weight == 0 {
                continue;
            }
            root.total += weight;

            let mut node = &mut root;
            let names: Box<dyn Iterator<Item = &str>> = if reverse {
                Box::new(trace.frames.iter().rev().map(|f| f.name.as_str()))
            } else {
                Box::new(trace.frames.iter().map(|f| f.name.as_str()))
            };
            for name in names {
                node = node.children.entry(name.to_string()).or_default();
                node.total += weight;
            }
        }
        Self { root }
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.root.total
    }

    /// Structural flame graph data with narrow nodes elided
    #[must_use]
    pub fn flame_graph(&self, params: &FlameGraphParams, counter: Counter) -> FlameGraphData {
        let keep = Visibility::new(self.root.total, params);
        let root = FlameNode {
            name: ROOT_NAME.to_string(),
            value: self.root.total,
            children: flame_children(&self.root, &keep),
        };
        FlameGraphData {
            title: params.title.clone(),
            width: params.width,
            height: params.height,
            min_width: params.min_width,
            reverse: params.reverse,
            counter: match counter {
                Counter::Samples => "samples".to_string(),
                Counter::Total => "total".to_string(),
            },
            depth: depth(&root),
            root,
        }
    }

    /// Indented text rendering, heaviest children first
    ///
    /// # Errors
    /// Propagates write errors
    pub fn write_text(&self, out: &mut dyn Write, params: &FlameGraphParams) -> io::Result<()> {
        writeln!(out, "--- {} ---", params.title)?;
        let keep = Visibility::new(self.root.total, params);
        self.write_children(out, &self.root, 0, &keep)
    }

    fn write_children(
        &self,
        out: &mut dyn Write,
        node: &TreeNode,
        depth: usize,
        keep: &Visibility,
    ) -> io::Result<()> {
        for (name, child) in sorted_children(node, keep) {
            writeln!(
                out,
                "{:>7.2}% {:>10}  {:indent$}{name}",
                percent(child.total, self.root.total),
                child.total,
                "",
                indent = depth * 2
            )?;
            self.write_children(out, child, depth + 1, keep)?;
        }
        Ok(())
    }
}

/// Decides whether a node is wide enough to render
struct Visibility {
    total: f64,
    width: f64,
    min_width: f64,
}

impl Visibility {
    #[allow(clippy::cast_precision_loss)]
    fn new(total: u64, params: &FlameGraphParams) -> Self {
        Self { total: total as f64, width: f64::from(params.width), min_width: params.min_width }
    }

    #[allow(clippy::cast_precision_loss)]
    fn visible(&self, value: u64) -> bool {
        self.total > 0.0 && value as f64 * self.width >= self.min_width * self.total
    }
}

fn sorted_children<'a>(node: &'a TreeNode, keep: &Visibility) -> Vec<(&'a String, &'a TreeNode)> {
    let mut children: Vec<_> =
        node.children.iter().filter(|(_, child)| keep.visible(child.total)).collect();
    children.sort_by(|a, b| b.1.total.cmp(&a.1.total).then_with(|| a.0.cmp(b.0)));
    children
}

fn flame_children(node: &TreeNode, keep: &Visibility) -> Vec<FlameNode> {
    node.children
        .iter()
        .filter(|(_, child)| keep.visible(child.total))
        .map(|(name, child)| FlameNode {
            name: name.clone(),
            value: child.total,
            children: flame_children(child, keep),
        })
        .collect()
}

fn depth(node: &FlameNode) -> usize {
    node.children.iter().map(|c| depth(c) + 1).max().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::testing::{snapshot_of, trace};

    fn sample() -> Snapshot {
        snapshot_of(vec![
            trace(&["main", "parse", "read"], 6, 60),
            trace(&["main", "parse", "lex"], 3, 30),
            trace(&["main", "tiny"], 1, 10),
        ])
    }

    #[test]
    fn test_prefix_merge() {
        let tree = CallTree::build(&sample(), Counter::Samples, false);
        let graph = tree.flame_graph(&FlameGraphParams::default(), Counter::Samples);

        assert_eq!(graph.root.name, "all");
        assert_eq!(graph.root.value, 10);
        let main = &graph.root.children[0];
        assert_eq!((main.name.as_str(), main.value), ("main", 10));
        let names: Vec<_> = main.children.iter().map(|c| (c.name.as_str(), c.value)).collect();
        assert_eq!(names, vec![("parse", 9), ("tiny", 1)]);
        assert_eq!(graph.depth, 3);
    }

    #[test]
    fn test_narrow_nodes_elided_but_counted() {
        let tree = CallTree::build(&sample(), Counter::Samples, false);
        // 1 of 10 samples at width 100 is 10px
        let params = FlameGraphParams { width: 100, min_width: 20.0, ..FlameGraphParams::default() };
        let graph = tree.flame_graph(&params, Counter::Samples);

        let main = &graph.root.children[0];
        assert_eq!(main.value, 10);
        let names: Vec<_> = main.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["parse"]);
        let parse = &main.children[0];
        // lex is 30px, read 60px
        assert_eq!(parse.children.len(), 2);
    }

    #[test]
    fn test_reverse_merges_from_leaf() {
        let snapshot = snapshot_of(vec![trace(&["a", "leaf"], 2, 2), trace(&["b", "leaf"], 3, 3)]);
        let tree = CallTree::build(&snapshot, Counter::Samples, true);
        let params = FlameGraphParams { reverse: true, ..FlameGraphParams::default() };
        let graph = tree.flame_graph(&params, Counter::Samples);

        assert_eq!(graph.root.children.len(), 1);
        let leaf = &graph.root.children[0];
        assert_eq!((leaf.name.as_str(), leaf.value), ("leaf", 5));
        assert!(graph.reverse);
    }

    #[test]
    fn test_counter_selects_weight() {
        let tree = CallTree::build(&sample(), Counter::Total, false);
        assert_eq!(tree.total(), 100);
    }

    #[test]
    fn test_text_tree() {
        let tree = CallTree::build(&sample(), Counter::Samples, false);
        let mut out = Vec::new();
        tree.write_text(&mut out, &FlameGraphParams::default()).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();

        assert_eq!(lines[0], "--- Flame Graph ---");
        assert_eq!(lines[1], " 100.00%         10  main");
        assert_eq!(lines[2], "  90.00%          9    parse");
        assert_eq!(lines[3], "  60.00%          6      read");
        assert_eq!(lines.len(), 6);
    }

    #[test]
    fn test_empty_snapshot() {
        let tree = CallTree::build(&snapshot_of(Vec::new()), Counter::Samples, false);
        let graph = tree.flame_graph(&FlameGraphParams::default(), Counter::Samples);
        assert_eq!(graph.root.value, 0);
        assert!(graph.root.children.is_empty());
        assert_eq!(graph.depth, 0);
    }
}

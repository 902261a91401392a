//! Network tree view: projects the daemon's full topology snapshot into
//! a rooted, depth-bounded set of colored nodes and weighted edges.
//!
//! The snapshot is an arena of nodes addressed by index. Each node carries
//! `parents`, its cached ancestor chain, so subtree membership is a lookup
//! rather than a walk. Node 0 is the global root.

pub mod color;
mod source;
mod task;

use std::collections::HashMap;

use serde::Serialize;
use shared_types::{NetworkJsonTransport, NetworkTreeEntry};

pub use color::{lerp_green_to_red_via_orange, Rgb};
pub use source::{HttpSnapshotSource, SnapshotError, SnapshotSource};
pub use task::{Cycle, ProjectionCycle, ScheduledTask, TreeRenderer};

/// Upper bound of the RTT color ramp, in milliseconds
pub const RTT_RAMP_MAX_MS: f64 = 200.0;

/// One rendered node
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisualNode {
    pub index: usize,
    pub name: String,
    /// `None` when labels are redacted
    pub label: Option<String>,
    /// Latency color
    pub color: Rgb,
    pub rtt_ms: f32,
}

/// One rendered parent -> child link
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisualEdge {
    pub source: String,
    pub target: String,
    /// Current down + up throughput, bytes per second
    pub value: u64,
    /// Utilization color
    pub color: Rgb,
    pub utilization_pct: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TreeView {
    pub root_index: usize,
    pub root_name: Option<String>,
    pub nodes: Vec<VisualNode>,
    pub edges: Vec<VisualEdge>,
}

/// Download utilization as a percentage capped at 100.
///
/// Current throughput is bytes/s scaled to megabits by 1e6; the stored
/// maximum is divided by 8.
pub fn utilization_pct(node: &NetworkJsonTransport) -> f64 {
    let current = node.current_throughput.0 as f64 / 1_000_000.0;
    let max = f64::from(node.max_throughput.0) / 8.0;
    if max <= 0.0 {
        return if current > 0.0 { 100.0 } else { 0.0 };
    }
    ((current / max) * 100.0).min(100.0)
}

pub struct TreeSnapshotProjector {
    root_index: usize,
    max_depth: usize,
    last_rtt: HashMap<String, f32>,
    /// (index, name) of every node in the last snapshot, for root selection
    last_names: Vec<(usize, String)>,
}

impl TreeSnapshotProjector {
    pub fn new(max_depth: usize) -> Self {
        Self {
            root_index: 0,
            max_depth,
            last_rtt: HashMap::new(),
            last_names: Vec::new(),
        }
    }

    pub fn root_index(&self) -> usize {
        self.root_index
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn set_max_depth(&mut self, max_depth: usize) {
        self.max_depth = max_depth;
    }

    /// Return to the global root on the next cycle.
    pub fn reset_root(&mut self) {
        self.root_index = 0;
    }

    /// Make the node called `name` the root for the next cycle.
    ///
    /// Matches by exact name against the last snapshot, so it is only
    /// unambiguous while visible names are unique. Link names
    /// (`"a > b"`) are ignored. Returns whether a node matched.
    pub fn select_root_by_name(&mut self, name: &str) -> bool {
        if name.contains(" > ") {
            return false;
        }
        match self.last_names.iter().find(|(_, n)| n == name) {
            Some((index, _)) => {
                self.root_index = *index;
                true
            }
            None => false,
        }
    }

    /// Last known RTT for a node name, if it was ever projected
    pub fn last_rtt(&self, name: &str) -> Option<f32> {
        self.last_rtt.get(name).copied()
    }

    /// Filter and decorate one snapshot.
    pub fn project(&mut self, snapshot: &[NetworkTreeEntry], redact: bool) -> TreeView {
        self.last_names = snapshot
            .iter()
            .map(|(index, node)| (*index, node.name.clone()))
            .collect();

        if !snapshot.iter().any(|(index, _)| *index == self.root_index) {
            tracing::warn!(root = self.root_index, "Selected root left the tree; returning to global root");
            self.root_index = 0;
        }
        let root = self.root_index;

        let names: HashMap<usize, &str> = snapshot
            .iter()
            .map(|(index, node)| (*index, node.name.as_str()))
            .collect();

        let mut view = TreeView {
            root_index: root,
            root_name: names.get(&root).map(|name| name.to_string()),
            ..TreeView::default()
        };

        for (index, node) in snapshot {
            let is_root = *index == root;
            if !is_root && (node.parents.len() > self.max_depth || !node.parents.contains(&root)) {
                continue;
            }

            let utilization = utilization_pct(node);
            let capacity_color = lerp_green_to_red_via_orange(100.0 - utilization, 100.0);

            let rtt = node
                .rtts
                .first()
                .copied()
                .or_else(|| self.last_rtt.get(&node.name).copied())
                .unwrap_or(0.0);
            self.last_rtt.insert(node.name.clone(), rtt);
            let latency_color = lerp_green_to_red_via_orange(RTT_RAMP_MAX_MS - f64::from(rtt), RTT_RAMP_MAX_MS);

            view.nodes.push(VisualNode {
                index: *index,
                name: node.name.clone(),
                label: (!redact).then(|| node.name.clone()),
                color: latency_color,
                rtt_ms: rtt,
            });

            if is_root {
                continue;
            }
            let Some(parent_name) = node.immediate_parent.and_then(|p| names.get(&p)) else {
                continue;
            };
            view.edges.push(VisualEdge {
                source: parent_name.to_string(),
                target: node.name.clone(),
                value: node.current_throughput.0 + node.current_throughput.1,
                color: capacity_color,
                utilization_pct: utilization,
            });
        }

        view
    }
}

// ============================================================================
// Tests
// ============================================================================

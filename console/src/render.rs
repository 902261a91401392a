//! Log-based renderers for the headless console

use shared_types::{QueueDropsSample, ThroughputSample};

use crate::tree::{TreeRenderer, TreeView};
use crate::units::{rtt_band, scale_number};

/// Writes each projected tree cycle to the tracing log
#[derive(Debug, Default)]
pub struct LogRenderer {
    cycles: u64,
}

impl LogRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }
}

impl TreeRenderer for LogRenderer {
    fn render(&mut self, view: &TreeView) {
        self.cycles += 1;
        tracing::info!(
            cycle = self.cycles,
            root = view.root_name.as_deref().unwrap_or("?"),
            nodes = view.nodes.len(),
            edges = view.edges.len(),
            "Network tree"
        );
        for node in &view.nodes {
            tracing::debug!(
                node = node.label.as_deref().unwrap_or("(redacted)"),
                rtt_ms = node.rtt_ms,
                band = rtt_band(f64::from(node.rtt_ms)).as_str(),
                color = %node.color,
                "Node"
            );
        }
        for edge in &view.edges {
            tracing::debug!(
                from = %edge.source,
                to = %edge.target,
                bytes_per_sec = %scale_number(edge.value as f64, 2),
                utilization = format_args!("{:.1}%", edge.utilization_pct),
                color = %edge.color,
                "Link"
            );
        }
    }
}

/// One-line summary of a throughput series, newest sample last
pub fn summarize_throughput(series: &[ThroughputSample]) -> String {
    let Some(latest) = series.last() else {
        return "no throughput samples".to_string();
    };
    let peak_down = series.iter().map(|s| s.bps.0).max().unwrap_or(0);
    let peak_up = series.iter().map(|s| s.bps.1).max().unwrap_or(0);
    format!(
        "throughput {}bps down / {}bps up (shaped {} / {}), peak {} / {} over {} samples",
        scale_number(latest.bps.0 as f64, 1),
        scale_number(latest.bps.1 as f64, 1),
        scale_number(latest.shaped.0 as f64, 1),
        scale_number(latest.shaped.1 as f64, 1),
        scale_number(peak_down as f64, 1),
        scale_number(peak_up as f64, 1),
        series.len(),
    )
}

/// One-line summary of per-tin drop totals across a series
pub fn summarize_queue_drops(series: &[QueueDropsSample]) -> String {
    const TINS: [&str; 4] = ["bulk", "best-effort", "video", "voice"];
    let mut totals = [(0u64, 0u64); 4];
    for sample in series {
        for (total, tin) in totals.iter_mut().zip(sample.tins.iter()) {
            total.0 = total.0.saturating_add(tin.0);
            total.1 = total.1.saturating_add(tin.1);
        }
    }
    let parts: Vec<String> = TINS
        .iter()
        .zip(totals.iter())
        .map(|(name, (down, up))| {
            format!("{name} {}/{}", scale_number(*down as f64, 0), scale_number(*up as f64, 0))
        })
        .collect();
    format!("drops {}", parts.join(", "))
}

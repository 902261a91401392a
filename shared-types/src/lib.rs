//! Wire types shared between the shaping daemon and its telemetry console
//!
//! Two framing conventions coexist on the live connection:
//! - Outbound (console -> daemon): a flat object tagged by a `msg` field.
//! - Inbound (daemon -> console): a single-key wrapper object whose only
//!   key names the message kind, e.g. `{"throughput": {...}}`.
//!
//! Serializable with serde for JSON over WebSocket/HTTP

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ============================================================================
// Outbound Requests
// ============================================================================

/// Requests the console sends to the daemon.
///
/// Serializes to `{ "msg": "<kind>", ...fields }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "msg")]
#[ts(export, export_to = "../../bindings/wire.ts")]
pub enum BusRequest {
    /// Handshake frame sent as soon as the socket opens
    #[serde(rename = "auth")]
    Auth { token: String },

    #[serde(rename = "throughputChartCircuit")]
    ThroughputChartCircuit { period: String, circuit_id: String },

    #[serde(rename = "throughputChartSite")]
    ThroughputChartSite { period: String, site_id: String },

    #[serde(rename = "rttChartSite")]
    RttChartSite { period: String, site_id: String },

    #[serde(rename = "rttChartCircuit")]
    RttChartCircuit { period: String, circuit_id: String },

    #[serde(rename = "siteHeat")]
    SiteHeat { period: String, site_id: String },

    #[serde(rename = "search")]
    Search { term: String },

    #[serde(rename = "siteInfo")]
    SiteInfo { site_id: String },

    #[serde(rename = "circuitInfo")]
    CircuitInfo { circuit_id: String },

    #[serde(rename = "siteParents")]
    SiteParents { site_id: String },
}

impl BusRequest {
    /// The `msg` discriminator this request serializes with.
    pub fn kind(&self) -> &'static str {
        match self {
            BusRequest::Auth { .. } => "auth",
            BusRequest::ThroughputChartCircuit { .. } => "throughputChartCircuit",
            BusRequest::ThroughputChartSite { .. } => "throughputChartSite",
            BusRequest::RttChartSite { .. } => "rttChartSite",
            BusRequest::RttChartCircuit { .. } => "rttChartCircuit",
            BusRequest::SiteHeat { .. } => "siteHeat",
            BusRequest::Search { .. } => "search",
            BusRequest::SiteInfo { .. } => "siteInfo",
            BusRequest::CircuitInfo { .. } => "circuitInfo",
            BusRequest::SiteParents { .. } => "siteParents",
        }
    }
}

// ============================================================================
// Authentication
// ============================================================================

/// Payload of the `authOk` reply to the handshake frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../bindings/wire.ts")]
pub struct AuthOkPayload {
    pub token: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub license_key: String,
}

// ============================================================================
// Network Tree
// ============================================================================

/// A "transport-friendly" topology node as served by the daemon's
/// `networkTree` endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../bindings/wire.ts")]
pub struct NetworkJsonTransport {
    /// Display name
    pub name: String,
    /// True if this node is a logical-only node
    #[serde(rename = "virtual", default)]
    pub is_virtual: bool,
    /// Max throughput for node, in bits (down, up)
    pub max_throughput: (u32, u32),
    /// Current node throughput, in bytes per second (down, up)
    pub current_throughput: (u64, u64),
    #[serde(default)]
    pub current_packets: (u64, u64),
    #[serde(default)]
    pub current_retransmits: (u64, u64),
    #[serde(default)]
    pub current_marks: (u64, u64),
    #[serde(default)]
    pub current_drops: (u64, u64),
    /// Recent RTT samples in milliseconds, newest first
    #[serde(default)]
    pub rtts: Vec<f32>,
    /// Ancestor chain, root first, ending with the immediate parent.
    ///
    /// Derived from `immediate_parent`; see [`rebuild_parent_chains`].
    #[serde(default)]
    pub parents: Vec<usize>,
    /// The immediate parent node in the tree
    #[serde(default)]
    pub immediate_parent: Option<usize>,
    /// The type of node (site, ap, etc.)
    #[serde(rename = "type", default)]
    pub node_type: Option<String>,
}

/// One `[index, node]` pair of a network tree snapshot
pub type NetworkTreeEntry = (usize, NetworkJsonTransport);

/// Recompute every node's `parents` chain by walking `immediate_parent`
/// links up to the root.
///
/// Entries are addressed by their index field. A chain stops at a missing
/// parent or on revisiting a node, so malformed trees cannot loop.
pub fn rebuild_parent_chains(entries: &mut [NetworkTreeEntry]) {
    let parent_of: std::collections::HashMap<usize, Option<usize>> = entries
        .iter()
        .map(|(index, node)| (*index, node.immediate_parent))
        .collect();

    for (index, node) in entries.iter_mut() {
        let mut chain = Vec::new();
        let mut cursor = parent_of.get(index).copied().flatten();
        while let Some(parent) = cursor {
            if parent == *index || chain.contains(&parent) {
                break;
            }
            chain.push(parent);
            cursor = parent_of.get(&parent).copied().flatten();
        }
        chain.reverse();
        node.parents = chain;
    }
}

// ============================================================================
// Rolling Series Samples
// ============================================================================

/// One throughput sample pushed by the daemon once per tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../bindings/wire.ts")]
pub struct ThroughputSample {
    /// All traffic, bits per second (down, up)
    pub bps: (u64, u64),
    /// Shaped traffic, bits per second (down, up)
    #[serde(default)]
    pub shaped: (u64, u64),
}

/// Per-tin shaper drop counters for one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../bindings/wire.ts")]
pub struct QueueDropsSample {
    /// Bulk, Best Effort, Video, Voice; each (down, up)
    pub tins: [(u64, u64); 4],
}

// ============================================================================
// Inbound Message Kinds
// ============================================================================

pub const MSG_AUTH_OK: &str = "authOk";
pub const MSG_AUTH_FAIL: &str = "authFail";
pub const MSG_THROUGHPUT: &str = "throughput";
pub const MSG_QUEUE_DROPS: &str = "queueDrops";

/// Path of the daemon's full topology snapshot endpoint
pub const NETWORK_TREE_PATH: &str = "/local-api/networkTree";

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use ts_rs::Config;

    fn node(name: &str, immediate_parent: Option<usize>) -> NetworkJsonTransport {
        NetworkJsonTransport {
            name: name.to_string(),
            is_virtual: false,
            max_throughput: (0, 0),
            current_throughput: (0, 0),
            current_packets: (0, 0),
            current_retransmits: (0, 0),
            current_marks: (0, 0),
            current_drops: (0, 0),
            rtts: Vec::new(),
            parents: Vec::new(),
            immediate_parent,
            node_type: None,
        }
    }

    #[test]
    fn test_request_is_flat_and_tagged() {
        let req = BusRequest::ThroughputChartSite {
            period: "5m".to_string(),
            site_id: "Tower 1".to_string(),
        };
        let value = serde_json::to_value(&req).unwrap();

        assert_eq!(
            value,
            serde_json::json!({
                "msg": "throughputChartSite",
                "period": "5m",
                "site_id": "Tower 1",
            })
        );
        assert_eq!(req.kind(), "throughputChartSite");
    }

    #[test]
    fn test_request_kind_matches_serialized_tag() {
        let requests = vec![
            BusRequest::Auth { token: String::new() },
            BusRequest::ThroughputChartCircuit { period: String::new(), circuit_id: String::new() },
            BusRequest::RttChartSite { period: String::new(), site_id: String::new() },
            BusRequest::RttChartCircuit { period: String::new(), circuit_id: String::new() },
            BusRequest::SiteHeat { period: String::new(), site_id: String::new() },
            BusRequest::Search { term: String::new() },
            BusRequest::SiteInfo { site_id: String::new() },
            BusRequest::CircuitInfo { circuit_id: String::new() },
            BusRequest::SiteParents { site_id: String::new() },
        ];
        for req in requests {
            let value = serde_json::to_value(&req).unwrap();
            assert_eq!(value["msg"], req.kind());
        }
    }

    #[test]
    fn test_network_node_accepts_sparse_json() {
        let json = r#"{
            "name": "Site A",
            "max_throughput": [1000, 500],
            "current_throughput": [125000, 6000],
            "rtts": [12.5, 14.0],
            "parents": [0],
            "immediate_parent": 0,
            "type": "Site"
        }"#;
        let parsed: NetworkJsonTransport = serde_json::from_str(json).unwrap();

        assert_eq!(parsed.name, "Site A");
        assert_eq!(parsed.max_throughput, (1000, 500));
        assert_eq!(parsed.rtts.first().copied(), Some(12.5));
        assert_eq!(parsed.immediate_parent, Some(0));
        assert_eq!(parsed.node_type.as_deref(), Some("Site"));
        assert!(!parsed.is_virtual);
    }

    #[test]
    fn test_tree_snapshot_parses_index_pairs() {
        let json = r#"[[0, {"name": "Root", "max_throughput": [0,0], "current_throughput": [0,0]}]]"#;
        let parsed: Vec<NetworkTreeEntry> = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].0, 0);
        assert_eq!(parsed[0].1.name, "Root");
        assert!(parsed[0].1.parents.is_empty());
    }

    #[test]
    fn test_rebuild_parent_chains() {
        let mut entries = vec![
            (0, node("root", None)),
            (1, node("a", Some(0))),
            (2, node("b", Some(1))),
            (3, node("c", Some(0))),
        ];
        rebuild_parent_chains(&mut entries);

        assert!(entries[0].1.parents.is_empty());
        assert_eq!(entries[1].1.parents, vec![0]);
        assert_eq!(entries[2].1.parents, vec![0, 1]);
        assert_eq!(entries[3].1.parents, vec![0]);
    }

    #[test]
    fn test_rebuild_parent_chains_breaks_cycles() {
        let mut entries = vec![(0, node("x", Some(1))), (1, node("y", Some(0)))];
        rebuild_parent_chains(&mut entries);

        assert_eq!(entries[0].1.parents, vec![1]);
        assert_eq!(entries[1].1.parents, vec![0]);
    }

    #[test]
    fn test_queue_drops_sample_shape() {
        let json = r#"{"tins": [[1,2],[3,4],[5,6],[7,8]]}"#;
        let parsed: QueueDropsSample = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.tins[2], (5, 6));
    }

    #[test]
    fn export_types() {
        // Every type writes into bindings/wire.ts via its export_to path
        let config = Config::default();
        BusRequest::export(&config).unwrap();
        AuthOkPayload::export(&config).unwrap();
        NetworkJsonTransport::export(&config).unwrap();
        ThroughputSample::export(&config).unwrap();
        QueueDropsSample::export(&config).unwrap();
    }
}

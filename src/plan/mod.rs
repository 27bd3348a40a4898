// Plan decomposition: a raw EXPLAIN document is flattened into an arena of
// nodes addressed by pre-order position, then stitched back into a tree.
pub mod detail;
pub mod document;
pub mod flatten;
pub mod tree;

pub use detail::PlanDetail;
pub use document::PlanDocument;
pub use flatten::flatten;
pub use tree::{reconstruct, PlanTree};

use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while decomposing a plan payload.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanError {
    #[error("malformed plan at {path}: {reason}")]
    Malformed { path: String, reason: String },

    #[error("record has no \"QUERY PLAN\" entry")]
    MissingPlan,

    #[error("plan text is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("plan has no nodes")]
    EmptyPlan,

    #[error("node id {0} appears more than once")]
    DuplicateNode(NodeId),

    #[error("plan has {} root nodes: {}", .roots.len(), join_ids(.roots))]
    AmbiguousRoot { roots: Vec<NodeId> },

    #[error("node {node} refers to missing parent {parent}")]
    DanglingParent { node: NodeId, parent: NodeId },

    #[error("node {node} is not reachable from a root (parent cycle)")]
    Cyclic { node: NodeId },
}

fn join_ids(ids: &[NodeId]) -> String {
    ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(", ")
}

/// Stable synthetic identifier: the node's pre-order position in its plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node_{}", self.0)
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

pub const NODE_TYPE: &str = "Node Type";
pub const ACTUAL_TOTAL_TIME: &str = "Actual Total Time";
pub const ACTUAL_ROWS: &str = "Actual Rows";
pub const ACTUAL_LOOPS: &str = "Actual Loops";
pub const LOOPS: &str = "Loops";
pub const SHARED_HIT_BLOCKS: &str = "Shared Hit Blocks";
pub const SHARED_READ_BLOCKS: &str = "Shared Read Blocks";
pub const CHILD_PLAN: &str = "Plan";
pub const CHILD_PLANS: &str = "Plans";

/// One operation of a decomposed plan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanNode {
    pub id: NodeId,
    pub node_type: String,
    pub actual_total_time: Option<f64>,
    pub actual_rows: Option<u64>,
    pub loops: u64,
    pub shared_hit_blocks: Option<u64>,
    pub shared_read_blocks: Option<u64>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// Node fields as captured, minus the nested child plans.
    #[serde(rename = "raw_data")]
    pub raw: Arc<PlanDocument>,
}

impl PlanNode {
    /// Builds a node from its sub-document, reading known metrics defensively.
    pub fn from_document(id: NodeId, parent: Option<NodeId>, raw: PlanDocument) -> Self {
        let loops = raw
            .u64_field(ACTUAL_LOOPS)
            .or_else(|| raw.u64_field(LOOPS))
            .filter(|loops| *loops > 0)
            .unwrap_or(1);

        Self {
            id,
            node_type: raw.str_field(NODE_TYPE).unwrap_or("Unknown").to_string(),
            actual_total_time: raw.f64_field(ACTUAL_TOTAL_TIME),
            actual_rows: raw.u64_field(ACTUAL_ROWS),
            loops,
            shared_hit_blocks: raw.u64_field(SHARED_HIT_BLOCKS),
            shared_read_blocks: raw.u64_field(SHARED_READ_BLOCKS),
            parent,
            children: Vec::new(),
            raw: Arc::new(raw),
        }
    }
}

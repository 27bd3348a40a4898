use serde::{Serialize, Serializer};

use super::document::extract_plan_payload;
use super::{flatten, reconstruct, NodeId, PlanError, PlanTree};
use crate::model::{ExecutionRecord, ExecutionStatus};

/// Per-plan view: record summary plus the decomposed node tree.
#[derive(Debug, Clone, Serialize)]
pub struct PlanDetail {
    pub plan_id: String,
    pub sql_content: String,
    pub execution_time_ms: f64,
    pub status: ExecutionStatus,
    pub row_count: u64,
    #[serde(rename = "nodes", serialize_with = "serialize_nodes")]
    pub tree: PlanTree,
    pub root_node: NodeId,
    /// The decoded plan document, pretty printed.
    pub plan_content: String,
}

impl PlanDetail {
    /// Decomposes a record's plan payload. Recomputed on every call.
    pub fn from_record(record: &ExecutionRecord) -> Result<Self, PlanError> {
        let payload = extract_plan_payload(&record.data)?;
        let tree = reconstruct(flatten(&payload)?)?;
        let plan_content = serde_json::to_string_pretty(&payload)
            .map_err(|e| PlanError::InvalidJson(e.to_string()))?;

        Ok(Self {
            plan_id: record.id.clone(),
            sql_content: record.sql_content.clone(),
            execution_time_ms: record.execution_time_ms,
            status: record.status,
            row_count: record.row_count,
            root_node: tree.root_id(),
            tree,
            plan_content,
        })
    }

    pub fn node_count(&self) -> usize {
        self.tree.len()
    }
}

fn serialize_nodes<S: Serializer>(tree: &PlanTree, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(tree.nodes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::record;
    use serde_json::json;

    #[test]
    fn test_detail_from_record() {
        let mut source = record("r1", ExecutionStatus::Success, 12.0);
        source.data = vec![json!({
            "QUERY PLAN": ["[{\"Plan\": {\"Node Type\": \"Hash Join\", \"Plans\": [{\"Node Type\": \"Seq Scan\"}, {\"Node Type\": \"Hash\"}]}}]"]
        })];

        let detail = PlanDetail::from_record(&source).unwrap();
        assert_eq!(detail.plan_id, "r1");
        assert_eq!(detail.node_count(), 3);
        assert_eq!(detail.root_node, NodeId(0));
        assert!(detail.plan_content.contains("Hash Join"));

        let body = serde_json::to_value(&detail).unwrap();
        assert_eq!(body["root_node"], "node_0");
        assert_eq!(body["nodes"][0]["children"], json!(["node_1", "node_2"]));
        assert_eq!(body["nodes"][2]["parent"], "node_0");
        assert_eq!(body["status"], "success");
    }

    #[test]
    fn test_deep_plan_stored_as_text() {
        let depth = 500;
        let mut text = String::from("[{\"Plan\": ");
        for _ in 0..depth {
            text.push_str("{\"Node Type\": \"Materialize\", \"Plans\": [");
        }
        text.push_str("{\"Node Type\": \"Seq Scan\"}");
        text.push_str(&"]}".repeat(depth));
        text.push_str("}]");

        let mut source = record("deep", ExecutionStatus::Success, 3.0);
        source.data = vec![json!({"QUERY PLAN": [text]})];

        let detail = PlanDetail::from_record(&source).unwrap();
        assert_eq!(detail.node_count(), depth + 1);
        assert_eq!(detail.tree.max_depth(), depth);
        assert_eq!(detail.tree.nodes()[depth].node_type, "Seq Scan");
    }

    #[test]
    fn test_detail_without_plan_fails() {
        let mut source = record("r2", ExecutionStatus::Success, 1.0);
        source.data = vec![json!({"count": 1})];
        assert_eq!(PlanDetail::from_record(&source).unwrap_err(), PlanError::MissingPlan);
    }
}

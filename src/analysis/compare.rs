use std::collections::HashSet;

use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use super::stats::{sort_times, TimingSummary};
use crate::db::{PlanStore, StoreError};
use crate::model::ExecutionRecord;
use crate::plan::{NodeId, PlanDetail, PlanError};

#[derive(Debug, Error)]
pub enum CompareError {
    #[error("comparison needs at least 2 successful plans ({successful} of {requested} usable)")]
    InsufficientPlans { requested: usize, successful: usize },

    #[error("plan '{plan_id}' could not be decomposed: {source}")]
    Decomposition {
        plan_id: String,
        #[source]
        source: PlanError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Serialize)]
pub struct ComparisonMetrics {
    pub total_plans: usize,
    pub avg_execution_time: f64,
    pub max_execution_time: f64,
    pub min_execution_time: f64,
    pub fastest_plan_id: String,
    pub slowest_plan_id: String,
}

/// Shape and cost of one plan, side by side with the others.
#[derive(Debug, Clone, Serialize)]
pub struct PlanMetrics {
    pub plan_id: String,
    pub execution_time_ms: f64,
    pub row_count: u64,
    pub node_count: usize,
    pub max_depth: usize,
    pub root_node_type: String,
    pub total_shared_hit_blocks: u64,
    pub total_shared_read_blocks: u64,
}

/// One row of the cross-plan node table.
#[derive(Debug, Clone, Serialize)]
pub struct NodeRow {
    pub plan_id: String,
    pub node_id: NodeId,
    pub parent: Option<NodeId>,
    pub depth: usize,
    pub node_type: String,
    pub actual_total_time: Option<f64>,
    pub actual_rows: Option<u64>,
    pub loops: u64,
    pub shared_hit_blocks: Option<u64>,
    pub shared_read_blocks: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComparisonResult {
    pub plans: Vec<PlanDetail>,
    pub comparison_metrics: ComparisonMetrics,
    pub plan_metrics: Vec<PlanMetrics>,
    pub node_table: Vec<NodeRow>,
}

/// Compares two or more stored plans.
///
/// Repeated ids count once. Every plan must exist and be a successful run;
/// the whole comparison fails otherwise, as it does when any plan cannot be
/// decomposed.
pub fn compare<S: PlanStore + ?Sized>(
    plan_ids: &[String],
    collection: &str,
    store: &S,
) -> Result<ComparisonResult, CompareError> {
    let mut seen = HashSet::new();
    let ids: Vec<&String> = plan_ids.iter().filter(|id| seen.insert(id.as_str())).collect();

    if ids.len() < 2 {
        return Err(CompareError::InsufficientPlans {
            requested: ids.len(),
            successful: 0,
        });
    }

    let records = ids
        .iter()
        .map(|id| store.fetch_by_id(collection, id))
        .collect::<Result<Vec<ExecutionRecord>, _>>()?;

    let successful = records.iter().filter(|r| r.is_success()).count();
    if successful < records.len() {
        warn!(
            "Rejecting comparison in {}: {} of {} plans are not successful runs",
            collection,
            records.len() - successful,
            records.len()
        );
        return Err(CompareError::InsufficientPlans {
            requested: records.len(),
            successful,
        });
    }

    // Decompose everything, then report the first failure in request order.
    let outcomes: Vec<Result<PlanDetail, CompareError>> = records
        .par_iter()
        .map(|record| {
            PlanDetail::from_record(record).map_err(|source| CompareError::Decomposition {
                plan_id: record.id.clone(),
                source,
            })
        })
        .collect();
    let plans = outcomes.into_iter().collect::<Result<Vec<_>, _>>()?;

    debug!("Decomposed {} plans for comparison", plans.len());

    let comparison_metrics = comparison_metrics(&plans);
    let plan_metrics = plans.iter().map(plan_metrics).collect();
    let node_table = plans.iter().flat_map(node_rows).collect();

    Ok(ComparisonResult {
        plans,
        comparison_metrics,
        plan_metrics,
        node_table,
    })
}

fn comparison_metrics(plans: &[PlanDetail]) -> ComparisonMetrics {
    let mut times: Vec<f64> = plans.iter().map(|p| p.execution_time_ms).collect();
    sort_times(&mut times);
    let timing = TimingSummary::from_sorted(&times);

    // First in caller order wins ties.
    let fastest = plans
        .iter()
        .reduce(|best, p| if p.execution_time_ms < best.execution_time_ms { p } else { best });
    let slowest = plans
        .iter()
        .reduce(|worst, p| if p.execution_time_ms > worst.execution_time_ms { p } else { worst });

    ComparisonMetrics {
        total_plans: plans.len(),
        avg_execution_time: timing.avg,
        max_execution_time: timing.max,
        min_execution_time: timing.min,
        fastest_plan_id: fastest.map(|p| p.plan_id.clone()).unwrap_or_default(),
        slowest_plan_id: slowest.map(|p| p.plan_id.clone()).unwrap_or_default(),
    }
}

fn plan_metrics(plan: &PlanDetail) -> PlanMetrics {
    let nodes = plan.tree.nodes();
    PlanMetrics {
        plan_id: plan.plan_id.clone(),
        execution_time_ms: plan.execution_time_ms,
        row_count: plan.row_count,
        node_count: nodes.len(),
        max_depth: plan.tree.max_depth(),
        root_node_type: plan.tree.root().node_type.clone(),
        total_shared_hit_blocks: nodes.iter().filter_map(|n| n.shared_hit_blocks).sum(),
        total_shared_read_blocks: nodes.iter().filter_map(|n| n.shared_read_blocks).sum(),
    }
}

fn node_rows(plan: &PlanDetail) -> Vec<NodeRow> {
    let mut depths = vec![0; plan.tree.len()];
    for (depth, node) in plan.tree.walk() {
        if let Some(slot) = depths.get_mut(node.id.0) {
            *slot = depth;
        }
    }

    plan.tree
        .nodes()
        .iter()
        .map(|node| NodeRow {
            plan_id: plan.plan_id.clone(),
            node_id: node.id,
            parent: node.parent,
            depth: depths.get(node.id.0).copied().unwrap_or(0),
            node_type: node.node_type.clone(),
            actual_total_time: node.actual_total_time,
            actual_rows: node.actual_rows,
            loops: node.loops,
            shared_hit_blocks: node.shared_hit_blocks,
            shared_read_blocks: node.shared_read_blocks,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::model::tests::record;
    use crate::model::{ExecutionStatus, Page};
    use crate::search::RecordQuery;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts lookups so tests can assert the store was never touched.
    struct CountingStore {
        inner: MemoryStore,
        lookups: AtomicUsize,
    }

    impl PlanStore for CountingStore {
        fn list_collections(&self) -> Result<Vec<String>, StoreError> {
            self.inner.list_collections()
        }

        fn fetch_page(&self, collection: &str, query: &RecordQuery) -> Result<Page<ExecutionRecord>, StoreError> {
            self.inner.fetch_page(collection, query)
        }

        fn fetch_by_id(&self, collection: &str, id: &str) -> Result<ExecutionRecord, StoreError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.inner.fetch_by_id(collection, id)
        }

        fn fetch_all_for_stats(&self, collection: &str) -> Result<Vec<ExecutionRecord>, StoreError> {
            self.inner.fetch_all_for_stats(collection)
        }

        fn insert_records(&self, collection: &str, records: &[ExecutionRecord]) -> Result<usize, StoreError> {
            self.inner.insert_records(collection, records)
        }
    }

    fn store_with(records: Vec<ExecutionRecord>) -> CountingStore {
        let inner = MemoryStore::new();
        inner.insert_records("runs", &records).unwrap();
        CountingStore {
            inner,
            lookups: AtomicUsize::new(0),
        }
    }

    fn ids(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    #[test]
    fn test_two_plan_comparison() {
        let mut join = record("b", ExecutionStatus::Success, 40.0);
        join.data = vec![json!({"QUERY PLAN": [{"Plan": {
            "Node Type": "Hash Join",
            "Shared Hit Blocks": 4,
            "Plans": [
                {"Node Type": "Seq Scan", "Shared Hit Blocks": 6, "Shared Read Blocks": 2},
                {"Node Type": "Hash", "Plans": [{"Node Type": "Index Scan"}]}
            ]
        }}]})];
        let store = store_with(vec![record("a", ExecutionStatus::Success, 10.0), join]);

        let result = compare(&ids(&["a", "b"]), "runs", &store).unwrap();
        let metrics = &result.comparison_metrics;
        assert_eq!(metrics.total_plans, 2);
        assert!(metrics.min_execution_time <= metrics.avg_execution_time);
        assert!(metrics.avg_execution_time <= metrics.max_execution_time);
        assert_eq!(metrics.avg_execution_time, 25.0);
        assert_eq!(metrics.fastest_plan_id, "a");
        assert_eq!(metrics.slowest_plan_id, "b");

        assert_eq!(result.plans[0].plan_id, "a");
        let b = &result.plan_metrics[1];
        assert_eq!((b.node_count, b.max_depth), (4, 2));
        assert_eq!(b.root_node_type, "Hash Join");
        assert_eq!((b.total_shared_hit_blocks, b.total_shared_read_blocks), (10, 2));

        assert_eq!(result.node_table.len(), 5);
        let last = result.node_table.last().unwrap();
        assert_eq!((last.plan_id.as_str(), last.node_id, last.depth), ("b", NodeId(3), 2));
        assert_eq!(last.parent, Some(NodeId(2)));
    }

    #[test]
    fn test_single_id_never_reaches_store() {
        let store = store_with(vec![record("a", ExecutionStatus::Success, 10.0)]);

        let err = compare(&ids(&["a"]), "runs", &store).unwrap_err();
        assert!(matches!(err, CompareError::InsufficientPlans { requested: 1, .. }));

        let err = compare(&ids(&["a", "a", "a"]), "runs", &store).unwrap_err();
        assert!(matches!(err, CompareError::InsufficientPlans { requested: 1, .. }));
        assert_eq!(store.lookups.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_missing_plan_passes_through() {
        let store = store_with(vec![record("a", ExecutionStatus::Success, 10.0)]);
        let err = compare(&ids(&["a", "ghost"]), "runs", &store).unwrap_err();
        assert!(matches!(
            err,
            CompareError::Store(StoreError::RecordNotFound { ref id, .. }) if id == "ghost"
        ));
    }

    #[test]
    fn test_failed_run_rejects_comparison() {
        let store = store_with(vec![
            record("a", ExecutionStatus::Success, 10.0),
            record("b", ExecutionStatus::Success, 20.0),
            record("c", ExecutionStatus::Error, 0.0),
        ]);
        let err = compare(&ids(&["a", "b", "c"]), "runs", &store).unwrap_err();
        assert!(matches!(
            err,
            CompareError::InsufficientPlans {
                requested: 3,
                successful: 2
            }
        ));
    }

    #[test]
    fn test_undecomposable_plan_is_named() {
        let mut broken = record("b", ExecutionStatus::Success, 20.0);
        broken.data = vec![json!({"QUERY PLAN": ["{not json"]})];
        let store = store_with(vec![record("a", ExecutionStatus::Success, 10.0), broken]);

        match compare(&ids(&["a", "b"]), "runs", &store).unwrap_err() {
            CompareError::Decomposition { plan_id, source } => {
                assert_eq!(plan_id, "b");
                assert!(matches!(source, PlanError::InvalidJson(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_first_failure_follows_request_order() {
        let mut records = vec![record("ok", ExecutionStatus::Success, 1.0)];
        for id in ["p1", "p2", "p3", "p4", "p5", "p6"] {
            let mut broken = record(id, ExecutionStatus::Success, 5.0);
            broken.data = vec![json!({"QUERY PLAN": ["{not json"]})];
            records.push(broken);
        }
        let store = store_with(records);

        for _ in 0..20 {
            match compare(&ids(&["ok", "p4", "p2", "p6", "p1"]), "runs", &store).unwrap_err() {
                CompareError::Decomposition { plan_id, .. } => assert_eq!(plan_id, "p4"),
                other => panic!("unexpected error: {other}"),
            }
        }
    }
}

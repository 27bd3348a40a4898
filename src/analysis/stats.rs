use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;

use crate::model::{ExecutionRecord, ExecutionStatus};
use crate::plan::PlanDetail;

pub const DEFAULT_BUCKET_BOUNDARIES_MS: [f64; 4] = [10.0, 50.0, 100.0, 500.0];

/// Node-count ranges for the plan shape distribution, inclusive on both ends.
const NODE_COUNT_RANGES: [(usize, Option<usize>); 5] =
    [(1, Some(5)), (6, Some(10)), (11, Some(20)), (21, Some(50)), (51, None)];

#[derive(Debug, Clone, PartialEq, Error)]
#[error("bucket boundaries must be positive, finite and strictly ascending: {0:?}")]
pub struct LayoutError(pub Vec<f64>);

/// Ascending execution-time ranges used for the distribution histogram.
///
/// `n` boundaries give `n + 1` buckets: `[0, b0)`, `[b0, b1)`, ... `[b(n-1), +inf)`.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketLayout {
    boundaries: Vec<f64>,
}

impl BucketLayout {
    pub fn new(boundaries: Vec<f64>) -> Result<Self, LayoutError> {
        let valid = boundaries.iter().all(|b| b.is_finite() && *b > 0.0)
            && boundaries.windows(2).all(|pair| pair[0] < pair[1]);
        if valid {
            Ok(Self { boundaries })
        } else {
            Err(LayoutError(boundaries))
        }
    }

    pub fn bucket_count(&self) -> usize {
        self.boundaries.len() + 1
    }

    fn index_of(&self, time_ms: f64) -> usize {
        self.boundaries.partition_point(|boundary| *boundary <= time_ms)
    }

    fn range(&self, index: usize) -> (f64, Option<f64>) {
        let start = if index == 0 { 0.0 } else { self.boundaries[index - 1] };
        (start, self.boundaries.get(index).copied())
    }
}

impl Default for BucketLayout {
    fn default() -> Self {
        Self {
            boundaries: DEFAULT_BUCKET_BOUNDARIES_MS.to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistributionBucket {
    pub range: String,
    pub start: f64,
    /// Exclusive upper bound; `None` for the open-ended last bucket.
    pub end: Option<f64>,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatisticsSummary {
    pub total_plans: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub avg_execution_time: f64,
    pub max_execution_time: f64,
    pub min_execution_time: f64,
    pub p95_execution_time: f64,
    pub p99_execution_time: f64,
    pub total_rows: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slow_sql_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slow_sql_threshold: Option<f64>,
    pub execution_time_distribution: Vec<DistributionBucket>,
}

/// Average / min / max over a set of execution times, zero when empty.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TimingSummary {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
}

impl TimingSummary {
    pub fn from_sorted(sorted: &[f64]) -> Self {
        let (Some(min), Some(max)) = (sorted.first(), sorted.last()) else {
            return Self::default();
        };
        let avg = sorted.iter().sum::<f64>() / sorted.len() as f64;
        Self {
            // Float summation can drift past the extremes for near-equal values.
            avg: avg.clamp(*min, *max),
            min: *min,
            max: *max,
        }
    }
}

pub fn sort_times(times: &mut [f64]) {
    times.sort_by(f64::total_cmp);
}

/// Nearest-rank percentile over ascending values; 0 when empty.
pub fn percentile(sorted: &[f64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (pct * sorted.len() as f64 / 100.0).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

/// Summarizes a record collection.
///
/// Timing and row metrics only consider successful runs. A success whose
/// time is negative or not finite is corrupt and counts toward `total_plans`
/// alone. Without a threshold the slow-query fields are left out, which is
/// what the basic stats view returns.
pub fn summarize(
    records: &[ExecutionRecord],
    slow_threshold_ms: Option<f64>,
    layout: &BucketLayout,
) -> StatisticsSummary {
    let error_count = records
        .iter()
        .filter(|r| r.status == ExecutionStatus::Error)
        .count() as u64;

    let mut times: Vec<f64> = records.iter().filter_map(ExecutionRecord::timed_execution_ms).collect();
    sort_times(&mut times);
    let success_count = times.len() as u64;
    let timing = TimingSummary::from_sorted(&times);

    let total_rows = records
        .iter()
        .filter_map(ExecutionRecord::counted_rows)
        .fold(0u64, u64::saturating_add);

    let slow_sql_count =
        slow_threshold_ms.map(|threshold| times.iter().filter(|t| **t >= threshold).count() as u64);

    StatisticsSummary {
        total_plans: records.len() as u64,
        success_count,
        error_count,
        avg_execution_time: timing.avg,
        max_execution_time: timing.max,
        min_execution_time: timing.min,
        p95_execution_time: percentile(&times, 95.0),
        p99_execution_time: percentile(&times, 99.0),
        total_rows,
        slow_sql_count,
        slow_sql_threshold: slow_threshold_ms,
        execution_time_distribution: distribution(&times, layout),
    }
}

fn distribution(times: &[f64], layout: &BucketLayout) -> Vec<DistributionBucket> {
    let mut counts = vec![0u64; layout.bucket_count()];
    for time in times {
        counts[layout.index_of(*time)] += 1;
    }

    counts
        .into_iter()
        .enumerate()
        .map(|(index, count)| {
            let (start, end) = layout.range(index);
            let range = match end {
                Some(end) => format!("{}-{}ms", format_ms(start), format_ms(end)),
                None => format!("{}ms+", format_ms(start)),
            };
            DistributionBucket {
                range,
                start,
                end,
                count,
            }
        })
        .collect()
}

fn format_ms(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{}", value)
    }
}

/// Slow-query list entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlowQuery {
    #[serde(rename = "_id")]
    pub id: String,
    pub file_name: String,
    pub sql_content: String,
    pub execution_time_ms: f64,
    pub row_count: u64,
    pub timestamp: f64,
}

impl From<&ExecutionRecord> for SlowQuery {
    fn from(record: &ExecutionRecord) -> Self {
        Self {
            id: record.id.clone(),
            file_name: record.file_name.clone(),
            sql_content: record.sql_content.clone(),
            execution_time_ms: record.execution_time_ms,
            row_count: record.row_count,
            timestamp: record.timestamp,
        }
    }
}

/// Successful runs at or above the threshold, slowest first, ties by id.
pub fn slow_queries(records: &[ExecutionRecord], threshold_ms: f64, limit: usize) -> Vec<SlowQuery> {
    let mut slow: Vec<&ExecutionRecord> = records
        .iter()
        .filter(|r| r.timed_execution_ms().is_some_and(|t| t >= threshold_ms))
        .collect();

    slow.sort_by(|a, b| {
        b.execution_time_ms
            .total_cmp(&a.execution_time_ms)
            .then_with(|| a.id.cmp(&b.id))
    });

    slow.into_iter().take(limit).map(SlowQuery::from).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeCountBucket {
    pub range: String,
    pub min: usize,
    pub max: Option<usize>,
    pub count: u64,
}

/// Plan size statistics over successful runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanShapeSummary {
    pub analyzed_plans: u64,
    /// Successful runs whose plan could not be decomposed.
    pub undecomposable_plans: u64,
    pub avg_plan_nodes: f64,
    pub max_plan_nodes: usize,
    pub plan_node_distribution: Vec<NodeCountBucket>,
}

pub fn plan_shapes(records: &[ExecutionRecord]) -> PlanShapeSummary {
    let outcomes: Vec<Option<usize>> = records
        .par_iter()
        .filter(|r| r.is_success())
        .map(|r| PlanDetail::from_record(r).ok().map(|detail| detail.node_count()))
        .collect();

    let counts: Vec<usize> = outcomes.iter().flatten().copied().collect();
    let undecomposable_plans = (outcomes.len() - counts.len()) as u64;

    let avg_plan_nodes = if counts.is_empty() {
        0.0
    } else {
        counts.iter().sum::<usize>() as f64 / counts.len() as f64
    };

    let plan_node_distribution = NODE_COUNT_RANGES
        .iter()
        .map(|(min, max)| {
            let count = counts
                .iter()
                .filter(|n| **n >= *min && max.is_none_or(|max| **n <= max))
                .count() as u64;
            NodeCountBucket {
                range: match max {
                    Some(max) => format!("{}-{}", min, max),
                    None => format!("{}+", min),
                },
                min: *min,
                max: *max,
                count,
            }
        })
        .collect();

    PlanShapeSummary {
        analyzed_plans: counts.len() as u64,
        undecomposable_plans,
        avg_plan_nodes,
        max_plan_nodes: counts.iter().copied().max().unwrap_or(0),
        plan_node_distribution,
    }
}

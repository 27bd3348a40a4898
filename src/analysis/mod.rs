pub mod compare;
pub mod stats;

pub use compare::{compare, CompareError, ComparisonResult};
pub use stats::{plan_shapes, slow_queries, summarize, BucketLayout, StatisticsSummary};

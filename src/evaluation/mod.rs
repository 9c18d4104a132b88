//! Evaluation of trained models on held-out data

pub mod folds;
pub mod metrics;
pub mod report;

pub use folds::{fold_aggregate, FoldSummary, MetricStatistics};
pub use metrics::{evaluate, ConfusionMatrix, MulticlassMetrics, LOG_LOSS_EPSILON};
pub use report::{log_fold_summary, log_metrics};

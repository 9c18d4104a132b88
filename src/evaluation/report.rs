//! Log-formatted metric reports

use tracing::info;

use super::folds::{FoldSummary, MetricStatistics};
use super::metrics::MulticlassMetrics;
use crate::dataset::LabelKeyMapper;

const RULE: &str = "************************************************************";

/// Log the metrics of one evaluation run, naming classes via `labels`
pub fn log_metrics(name: &str, metrics: &MulticlassMetrics, labels: &LabelKeyMapper) {
    info!("{}", RULE);
    info!("*    Metrics for {} multi-class classification model", name);
    info!("*-----------------------------------------------------------");
    info!("    Samples          = {}", metrics.total_samples);
    info!("    AccuracyMacro    = {:.4}", metrics.macro_accuracy);
    info!("    AccuracyMicro    = {:.4}", metrics.micro_accuracy);
    info!("    LogLoss          = {:.4}", metrics.log_loss);
    info!("    LogLossReduction = {:.4}", metrics.log_loss_reduction);
    for (key, loss) in metrics.per_class_log_loss.iter().enumerate() {
        let label = labels.to_label(key as u32).unwrap_or("?");
        info!("    LogLoss for class {} ({}) = {:.4}", key, label, loss);
    }
    info!("    Confusion matrix (rows = actual, columns = predicted):");
    let cm = &metrics.confusion_matrix;
    for actual in 0..cm.num_classes {
        let row: Vec<String> = (0..cm.num_classes)
            .map(|predicted| format!("{:>5}", cm.get(actual, predicted)))
            .collect();
        info!("    {:>12} |{}", labels.to_label(actual as u32).unwrap_or("?"), row.join(""));
    }
    info!("{}", RULE);
}

fn log_statistic(name: &str, stats: &MetricStatistics) {
    info!(
        "*       Average {:<16} {:.3}  - Standard deviation: ({:.3})  - Confidence Interval 95%: ({:.3})",
        name, stats.mean, stats.std_dev, stats.ci95
    );
}

/// Log mean, spread and 95% interval of each metric across folds
pub fn log_fold_summary(name: &str, summary: &FoldSummary) {
    info!("{}", RULE);
    info!("*    Metrics for {} across {} folds", name, summary.folds);
    info!("*-----------------------------------------------------------");
    log_statistic("MicroAccuracy:", &summary.micro_accuracy);
    log_statistic("MacroAccuracy:", &summary.macro_accuracy);
    log_statistic("LogLoss:", &summary.log_loss);
    log_statistic("LogLossReduction:", &summary.log_loss_reduction);
    info!("{}", RULE);
}

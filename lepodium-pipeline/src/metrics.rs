use ndarray::Array1;
use serde::{Deserialize, Serialize};

use lepodium_store::store::VersionedArtifact;

/// Decision threshold applied to probabilities when a hard label is needed.
pub const PROBA_THRESHOLD: f64 = 0.5;

/// Evaluation bundle for a fitted classifier on the held-out test set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsBundle {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub roc_auc: f64,
}

/// Persisted form of a metrics bundle, tagged with the model it measures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsArtifact {
    pub version: u32,
    pub model_name: String,
    pub metrics: MetricsBundle,
}

impl MetricsArtifact {
    pub fn new(model_name: &str, metrics: MetricsBundle) -> Self {
        Self {
            version: <Self as VersionedArtifact>::VERSION,
            model_name: model_name.to_string(),
            metrics,
        }
    }
}

impl VersionedArtifact for MetricsArtifact {
    const VERSION: u32 = 1;
    fn version(&self) -> u32 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confusion {
    pub true_negatives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    pub true_positives: usize,
}

pub fn confusion(y_true: &Array1<f64>, proba: &Array1<f64>) -> Confusion {
    let mut c = Confusion {
        true_negatives: 0,
        false_positives: 0,
        false_negatives: 0,
        true_positives: 0,
    };
    for (&truth, &p) in y_true.iter().zip(proba.iter()) {
        let predicted = p >= PROBA_THRESHOLD;
        let actual = truth == 1.0;
        match (actual, predicted) {
            (false, false) => c.true_negatives += 1,
            (false, true) => c.false_positives += 1,
            (true, false) => c.false_negatives += 1,
            (true, true) => c.true_positives += 1,
        }
    }
    c
}

/// Compute the full metric set from true labels and predicted probabilities.
/// Precision/recall/F1 fall back to 0 when their denominator is empty.
pub fn evaluate(y_true: &Array1<f64>, proba: &Array1<f64>) -> MetricsBundle {
    let c = confusion(y_true, proba);
    let total = y_true.len().max(1) as f64;

    let accuracy = (c.true_positives + c.true_negatives) as f64 / total;
    let precision = ratio(c.true_positives, c.true_positives + c.false_positives);
    let recall = ratio(c.true_positives, c.true_positives + c.false_negatives);
    let f1_score = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };

    MetricsBundle {
        accuracy,
        precision,
        recall,
        f1_score,
        roc_auc: roc_auc(y_true, proba),
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Area under the ROC curve via the rank statistic (Mann-Whitney U),
/// with average ranks for tied scores. Returns 0.5 when one class is
/// absent, where the curve is undefined.
pub fn roc_auc(y_true: &Array1<f64>, scores: &Array1<f64>) -> f64 {
    let n = y_true.len();
    let n_pos = y_true.iter().filter(|&&v| v == 1.0).count();
    let n_neg = n - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return 0.5;
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        scores[a]
            .partial_cmp(&scores[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    // Average rank within each group of tied scores (1-based ranks)
    let mut ranks = vec![0.0f64; n];
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        let avg_rank = (i + 1 + j + 1) as f64 / 2.0;
        for k in i..=j {
            ranks[order[k]] = avg_rank;
        }
        i = j + 1;
    }

    let sum_pos_ranks: f64 = y_true
        .iter()
        .zip(ranks.iter())
        .filter(|(&truth, _)| truth == 1.0)
        .map(|(_, &r)| r)
        .sum();

    let u = sum_pos_ranks - (n_pos * (n_pos + 1)) as f64 / 2.0;
    u / (n_pos * n_neg) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_classifier() {
        let y = Array1::from_vec(vec![0.0, 0.0, 1.0, 1.0]);
        let proba = Array1::from_vec(vec![0.1, 0.2, 0.8, 0.9]);
        let m = evaluate(&y, &proba);
        assert_eq!(m.accuracy, 1.0);
        assert_eq!(m.precision, 1.0);
        assert_eq!(m.recall, 1.0);
        assert_eq!(m.f1_score, 1.0);
        assert_eq!(m.roc_auc, 1.0);
    }

    #[test]
    fn test_degenerate_all_negative_predictions() {
        let y = Array1::from_vec(vec![0.0, 0.0, 0.0, 1.0]);
        let proba = Array1::from_vec(vec![0.1, 0.1, 0.1, 0.1]);
        let m = evaluate(&y, &proba);
        assert_eq!(m.accuracy, 0.75);
        assert_eq!(m.precision, 0.0);
        assert_eq!(m.recall, 0.0);
        assert_eq!(m.f1_score, 0.0);
    }

    #[test]
    fn test_confusion_counts() {
        let y = Array1::from_vec(vec![0.0, 0.0, 1.0, 1.0, 1.0]);
        let proba = Array1::from_vec(vec![0.9, 0.1, 0.8, 0.2, 0.6]);
        let c = confusion(&y, &proba);
        assert_eq!(
            c,
            Confusion {
                true_negatives: 1,
                false_positives: 1,
                false_negatives: 1,
                true_positives: 2,
            }
        );
    }

    #[test]
    fn test_auc_reversed_classifier_is_zero() {
        let y = Array1::from_vec(vec![0.0, 0.0, 1.0, 1.0]);
        let proba = Array1::from_vec(vec![0.9, 0.8, 0.2, 0.1]);
        assert_eq!(roc_auc(&y, &proba), 0.0);
    }

    #[test]
    fn test_auc_with_ties() {
        // All scores tied: the curve is the diagonal.
        let y = Array1::from_vec(vec![0.0, 1.0, 0.0, 1.0]);
        let proba = Array1::from_vec(vec![0.5, 0.5, 0.5, 0.5]);
        assert!((roc_auc(&y, &proba) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_auc_single_class_is_half() {
        let y = Array1::from_vec(vec![0.0, 0.0]);
        let proba = Array1::from_vec(vec![0.4, 0.6]);
        assert_eq!(roc_auc(&y, &proba), 0.5);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let y = Array1::from_vec(vec![1.0]);
        let proba = Array1::from_vec(vec![PROBA_THRESHOLD]);
        let c = confusion(&y, &proba);
        assert_eq!(c.true_positives, 1);
    }
}

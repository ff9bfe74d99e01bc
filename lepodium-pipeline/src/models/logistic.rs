use std::collections::HashMap;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use super::{balanced_sample_weights, WinClassifier};

pub const LEARNING_RATE: f64 = 0.1;
pub const LAMBDA: f64 = 0.001;
pub const EPOCHS: usize = 1000;

/// Régression logistique par descente de gradient, pondérée par classe.
/// Les features d'entrée sont supposées déjà standardisées.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticModel {
    pub weights: Vec<f64>,
    pub bias: f64,
    pub learning_rate: f64,
    pub lambda: f64,
    pub epochs: usize,
}

impl LogisticModel {
    pub fn fit(
        x: &Array2<f64>,
        y: &Array1<f64>,
        learning_rate: f64,
        lambda: f64,
        epochs: usize,
    ) -> Self {
        let n_features = x.ncols();
        let sample_weights = balanced_sample_weights(y);
        let total_weight: f64 = sample_weights.iter().sum::<f64>().max(1e-12);

        // Initialisation à zéro : l'ajustement est entièrement déterministe.
        let mut weights = Array1::<f64>::zeros(n_features);
        let mut bias = 0.0f64;

        for _ in 0..epochs {
            let logits = x.dot(&weights) + bias;
            let preds = logits.mapv(sigmoid);
            let errors = (&preds - y) * &sample_weights;

            let grad_w =
                x.t().dot(&errors) / total_weight + &weights * (lambda * 2.0);
            let grad_b = errors.sum() / total_weight;

            weights = weights - &grad_w * learning_rate;
            bias -= grad_b * learning_rate;
        }

        Self {
            weights: weights.to_vec(),
            bias,
            learning_rate,
            lambda,
            epochs,
        }
    }
}

impl WinClassifier for LogisticModel {
    fn name(&self) -> &str {
        "LogisticRegression"
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Array1<f64> {
        let weights = Array1::from_vec(self.weights.clone());
        (x.dot(&weights) + self.bias).mapv(sigmoid)
    }

    fn params(&self) -> HashMap<String, f64> {
        HashMap::from([
            ("learning_rate".to_string(), self.learning_rate),
            ("lambda".to_string(), self.lambda),
            ("epochs".to_string(), self.epochs as f64),
        ])
    }

    /// Les coefficients font office d'importance, au signe près.
    fn feature_importance(&self) -> Vec<f64> {
        self.weights.clone()
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

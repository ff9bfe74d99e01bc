pub mod forest;
pub mod logistic;

use std::collections::HashMap;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use lepodium_store::store::VersionedArtifact;

pub use forest::{ForestModel, ForestParams};
pub use logistic::LogisticModel;

/// Graine commune à tout ce qui est aléatoire côté entraînement.
pub const TRAIN_SEED: u64 = 42;

/// Un classifieur binaire « ce pilote va-t-il gagner ? ».
/// Les deux variantes (régression logistique, forêt aléatoire) exposent la
/// même surface : une probabilité de victoire par ligne de features.
pub trait WinClassifier: Send + Sync {
    fn name(&self) -> &str;
    /// x doit être standardisé avec le scaler persisté. Retourne la
    /// probabilité de la classe « vainqueur » pour chaque ligne.
    fn predict_proba(&self, x: &Array2<f64>) -> Array1<f64>;
    fn params(&self) -> HashMap<String, f64>;
    /// Importance de chaque feature, alignée sur l'ordre d'entraînement.
    fn feature_importance(&self) -> Vec<f64>;
}

/// Poids d'échantillons « balanced » : chaque classe pèse autant au total,
/// w = n / (2 × effectif de la classe). Sans cela le modèle dégénère en
/// « personne ne gagne jamais », la classe vainqueur étant très minoritaire.
pub fn balanced_sample_weights(y: &Array1<f64>) -> Array1<f64> {
    let n = y.len() as f64;
    let n_pos = y.iter().filter(|&&v| v == 1.0).count() as f64;
    let n_neg = n - n_pos;

    let w_pos = if n_pos > 0.0 { n / (2.0 * n_pos) } else { 0.0 };
    let w_neg = if n_neg > 0.0 { n / (2.0 * n_neg) } else { 0.0 };

    y.mapv(|v| if v == 1.0 { w_pos } else { w_neg })
}

/// Charge utile sérialisée d'un modèle ajusté, auto-décrite par `kind`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelArtifact {
    LogisticRegression(LogisticModel),
    RandomForest(ForestModel),
}

impl ModelArtifact {
    pub fn classifier(&self) -> &dyn WinClassifier {
        match self {
            ModelArtifact::LogisticRegression(m) => m,
            ModelArtifact::RandomForest(m) => m,
        }
    }
}

/// Enveloppe versionnée persistée sur disque.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedModel {
    pub version: u32,
    pub model: ModelArtifact,
}

impl SavedModel {
    pub fn new(model: ModelArtifact) -> Self {
        Self {
            version: <Self as VersionedArtifact>::VERSION,
            model,
        }
    }
}

impl VersionedArtifact for SavedModel {
    const VERSION: u32 = 1;
    fn version(&self) -> u32 {
        self.version
    }
}

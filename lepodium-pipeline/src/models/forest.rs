use std::collections::HashMap;

use ndarray::{Array1, Array2};
use rand::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::{balanced_sample_weights, WinClassifier, TRAIN_SEED};

/// Hyperparamètres de la forêt, figés : un seul ajustement, pas de
/// recherche d'hyperparamètres.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 15,
            min_samples_split: 10,
            min_samples_leaf: 4,
            seed: TRAIN_SEED,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    Leaf {
        value: f64,
    },
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

/// Forêt d'arbres de décision en bagging, pondérée par classe.
/// Chaque arbre reçoit sa propre graine dérivée : l'ajustement parallèle
/// reste déterministe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestModel {
    pub trees: Vec<TreeNode>,
    pub params: ForestParams,
    pub importances: Vec<f64>,
}

struct TreeContext<'a> {
    rows: &'a [Vec<f64>],
    labels: &'a [f64],
    weights: &'a [f64],
    n_features: usize,
    features_per_split: usize,
    min_samples_split: usize,
    min_samples_leaf: usize,
    total_weight: f64,
}

impl ForestModel {
    pub fn fit(x: &Array2<f64>, y: &Array1<f64>, params: ForestParams) -> Self {
        let rows: Vec<Vec<f64>> = x.rows().into_iter().map(|r| r.to_vec()).collect();
        let labels: Vec<f64> = y.to_vec();
        let weights: Vec<f64> = balanced_sample_weights(y).to_vec();
        let n_features = x.ncols();
        let features_per_split = (n_features as f64).sqrt().ceil() as usize;

        let fitted: Vec<(TreeNode, Vec<f64>)> = (0..params.n_trees)
            .into_par_iter()
            .map(|t| {
                let mut rng = StdRng::seed_from_u64(params.seed.wrapping_add(t as u64));
                let n = rows.len();

                // Échantillonnage bootstrap
                let indices: Vec<usize> = (0..n).map(|_| rng.random_range(0..n)).collect();
                let total_weight: f64 =
                    indices.iter().map(|&i| weights[i]).sum::<f64>().max(1e-12);

                let ctx = TreeContext {
                    rows: &rows,
                    labels: &labels,
                    weights: &weights,
                    n_features,
                    features_per_split,
                    min_samples_split: params.min_samples_split,
                    min_samples_leaf: params.min_samples_leaf,
                    total_weight,
                };

                let mut importances = vec![0.0; n_features];
                let tree =
                    build_node(&ctx, &indices, params.max_depth, &mut importances, &mut rng);
                (tree, importances)
            })
            .collect();

        let mut trees = Vec::with_capacity(params.n_trees);
        let mut importances = vec![0.0; n_features];
        for (tree, local) in fitted {
            trees.push(tree);
            for (total, v) in importances.iter_mut().zip(local) {
                *total += v;
            }
        }
        let sum: f64 = importances.iter().sum();
        if sum > 0.0 {
            for v in &mut importances {
                *v /= sum;
            }
        }

        Self {
            trees,
            params,
            importances,
        }
    }
}

impl WinClassifier for ForestModel {
    fn name(&self) -> &str {
        "RandomForest"
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Array1<f64> {
        Array1::from_iter(x.rows().into_iter().map(|row| {
            let features = row.to_vec();
            let sum: f64 = self
                .trees
                .iter()
                .map(|tree| predict_tree(tree, &features))
                .sum();
            sum / self.trees.len().max(1) as f64
        }))
    }

    fn params(&self) -> HashMap<String, f64> {
        HashMap::from([
            ("n_trees".to_string(), self.params.n_trees as f64),
            ("max_depth".to_string(), self.params.max_depth as f64),
            (
                "min_samples_split".to_string(),
                self.params.min_samples_split as f64,
            ),
            (
                "min_samples_leaf".to_string(),
                self.params.min_samples_leaf as f64,
            ),
            ("seed".to_string(), self.params.seed as f64),
        ])
    }

    /// Importance par décroissance d'impureté, normalisée à 1.
    fn feature_importance(&self) -> Vec<f64> {
        self.importances.clone()
    }
}

fn build_node(
    ctx: &TreeContext<'_>,
    indices: &[usize],
    depth: usize,
    importances: &mut [f64],
    rng: &mut StdRng,
) -> TreeNode {
    if depth == 0 || indices.len() < ctx.min_samples_split {
        return TreeNode::Leaf {
            value: weighted_mean(ctx, indices),
        };
    }

    // Toutes les étiquettes identiques : rien à séparer.
    let first = ctx.labels[indices[0]];
    if indices
        .iter()
        .all(|&i| (ctx.labels[i] - first).abs() < 1e-10)
    {
        return TreeNode::Leaf { value: first };
    }

    // Sous-ensemble aléatoire de features (sqrt du total)
    let mut feature_indices: Vec<usize> = (0..ctx.n_features).collect();
    feature_indices.shuffle(rng);
    feature_indices.truncate(ctx.features_per_split);

    let parent_gini = gini(ctx, indices);
    let mut best_gini = f64::MAX;
    let mut best_feature = 0usize;
    let mut best_threshold = 0.0f64;

    for &feat_idx in &feature_indices {
        let mut values: Vec<f64> = indices.iter().map(|&i| ctx.rows[i][feat_idx]).collect();
        values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        values.dedup();
        if values.len() < 2 {
            continue;
        }

        // Seuils entre valeurs consécutives, échantillonnés pour la vitesse
        let step = (values.len() / 10).max(1);
        for i in (0..values.len() - 1).step_by(step) {
            let threshold = (values[i] + values[i + 1]) / 2.0;
            let (split, n_left, n_right) = split_gini(ctx, indices, feat_idx, threshold);
            if n_left < ctx.min_samples_leaf || n_right < ctx.min_samples_leaf {
                continue;
            }
            if split < best_gini {
                best_gini = split;
                best_feature = feat_idx;
                best_threshold = threshold;
            }
        }
    }

    if best_gini >= parent_gini {
        return TreeNode::Leaf {
            value: weighted_mean(ctx, indices),
        };
    }

    let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
        .iter()
        .copied()
        .partition(|&i| ctx.rows[i][best_feature] <= best_threshold);

    let node_weight: f64 = indices.iter().map(|&i| ctx.weights[i]).sum();
    importances[best_feature] += node_weight / ctx.total_weight * (parent_gini - best_gini);

    TreeNode::Split {
        feature_idx: best_feature,
        threshold: best_threshold,
        left: Box::new(build_node(ctx, &left_indices, depth - 1, importances, rng)),
        right: Box::new(build_node(ctx, &right_indices, depth - 1, importances, rng)),
    }
}

/// Proportion pondérée de la classe 1 sur la tranche.
fn weighted_mean(ctx: &TreeContext<'_>, indices: &[usize]) -> f64 {
    let total: f64 = indices.iter().map(|&i| ctx.weights[i]).sum();
    if total <= 0.0 {
        return 0.0;
    }
    indices
        .iter()
        .map(|&i| ctx.weights[i] * ctx.labels[i])
        .sum::<f64>()
        / total
}

fn gini(ctx: &TreeContext<'_>, indices: &[usize]) -> f64 {
    let p = weighted_mean(ctx, indices);
    2.0 * p * (1.0 - p)
}

fn split_gini(
    ctx: &TreeContext<'_>,
    indices: &[usize],
    feature_idx: usize,
    threshold: f64,
) -> (f64, usize, usize) {
    let mut left = Vec::new();
    let mut right = Vec::new();
    for &i in indices {
        if ctx.rows[i][feature_idx] <= threshold {
            left.push(i);
        } else {
            right.push(i);
        }
    }

    let w_left: f64 = left.iter().map(|&i| ctx.weights[i]).sum();
    let w_right: f64 = right.iter().map(|&i| ctx.weights[i]).sum();
    let w_total = w_left + w_right;
    if w_left <= 0.0 || w_right <= 0.0 || w_total <= 0.0 {
        return (f64::MAX, left.len(), right.len());
    }

    let split = w_left / w_total * gini(ctx, &left) + w_right / w_total * gini(ctx, &right);
    (split, left.len(), right.len())
}

fn predict_tree(node: &TreeNode, features: &[f64]) -> f64 {
    match node {
        TreeNode::Leaf { value } => *value,
        TreeNode::Split {
            feature_idx,
            threshold,
            left,
            right,
        } => {
            if features[*feature_idx] <= *threshold {
                predict_tree(left, features)
            } else {
                predict_tree(right, features)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_params() -> ForestParams {
        ForestParams {
            n_trees: 20,
            max_depth: 4,
            min_samples_split: 2,
            min_samples_leaf: 1,
            seed: TRAIN_SEED,
        }
    }

    /// Jeu séparable : deux features, positif quand la première est > 0.
    fn separable(n: usize) -> (Array2<f64>, Array1<f64>) {
        let mut values = Vec::with_capacity(n * 2);
        let mut labels = Vec::with_capacity(n);
        for i in 0..n {
            let v = (i as f64 / n as f64) * 4.0 - 2.0;
            values.push(v);
            values.push((i % 3) as f64);
            labels.push(if v > 0.0 { 1.0 } else { 0.0 });
        }
        (
            Array2::from_shape_vec((n, 2), values).unwrap(),
            Array1::from_vec(labels),
        )
    }

    #[test]
    fn test_fits_separable_data() {
        let (x, y) = separable(60);
        let model = ForestModel::fit(&x, &y, small_params());
        let proba = model.predict_proba(&x);
        let correct = proba
            .iter()
            .zip(y.iter())
            .filter(|(p, &l)| (**p >= 0.5) == (l == 1.0))
            .count();
        assert!(correct >= 55, "seulement {correct}/60 corrects");
    }

    #[test]
    fn test_proba_in_unit_interval() {
        let (x, y) = separable(40);
        let model = ForestModel::fit(&x, &y, small_params());
        for &p in model.predict_proba(&x).iter() {
            assert!((0.0..=1.0).contains(&p), "proba hors bornes : {p}");
        }
    }

    #[test]
    fn test_deterministic_with_same_seed() {
        let (x, y) = separable(40);
        let a = ForestModel::fit(&x, &y, small_params());
        let b = ForestModel::fit(&x, &y, small_params());
        assert_eq!(a.predict_proba(&x), b.predict_proba(&x));
    }

    #[test]
    fn test_tiny_dataset_yields_constant_trees() {
        // Moins de lignes que min_samples_split : chaque arbre est une
        // feuille, la prédiction ne dépend plus de l'entrée.
        let (x, y) = separable(6);
        let params = ForestParams {
            n_trees: 10,
            min_samples_split: 10,
            ..small_params()
        };
        let model = ForestModel::fit(&x, &y, params);
        let probe =
            Array2::from_shape_vec((2, 2), vec![-5.0, 0.0, 5.0, 2.0]).unwrap();
        let proba = model.predict_proba(&probe);
        assert!((proba[0] - proba[1]).abs() < 1e-12);
    }

    #[test]
    fn test_importances_normalized() {
        let (x, y) = separable(60);
        let model = ForestModel::fit(&x, &y, small_params());
        let sum: f64 = model.importances.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9, "somme = {sum}");
        // La feature séparatrice domine.
        assert!(model.importances[0] > model.importances[1]);
    }

    #[test]
    fn test_json_roundtrip() {
        let (x, y) = separable(30);
        let model = ForestModel::fit(&x, &y, small_params());
        let json = serde_json::to_string(&model).unwrap();
        let back: ForestModel = serde_json::from_str(&json).unwrap();
        assert_eq!(back.predict_proba(&x), model.predict_proba(&x));
    }
}

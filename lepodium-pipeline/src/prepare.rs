use std::collections::HashMap;

use anyhow::{bail, Result};
use ndarray::{Array1, Array2, Axis};
use rand::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use lepodium_store::models::CleanedRow;
use lepodium_store::store::VersionedArtifact;

/// Les 7 colonnes de features, dans l'ordre d'entraînement. Cet ordre est
/// persisté avec les artefacts et fait foi à la prédiction.
pub const FEATURE_COLUMNS: [&str; 7] = [
    "GridPosition",
    "driver_recent_form",
    "driver_win_percentage",
    "team_win_percentage",
    "driver_dnf_rate",
    "driver_podium_rate",
    "driver_races_competed",
];

pub const LABEL_COLUMN: &str = "is_winner";
pub const TEST_FRACTION: f64 = 0.2;
pub const SPLIT_SEED: u64 = 42;

/// Transformation de standardisation ajustée (moyenne nulle, variance
/// unitaire par feature), stockée en clair : un tableau de moyennes, un
/// tableau d'échelles, et l'ordre de colonnes sur lequel elle a été
/// ajustée.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalerArtifact {
    pub version: u32,
    pub feature_columns: Vec<String>,
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl VersionedArtifact for ScalerArtifact {
    const VERSION: u32 = 1;
    fn version(&self) -> u32 {
        self.version
    }
}

impl ScalerArtifact {
    /// Ajuste sur la partition d'entraînement UNIQUEMENT : réajuster sur
    /// les données de test serait une fuite.
    pub fn fit(x: &Array2<f64>, feature_columns: &[String]) -> Self {
        let n = x.nrows().max(1) as f64;
        let mean = x
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(x.ncols()));

        let mut scale = Vec::with_capacity(x.ncols());
        for (j, m) in mean.iter().enumerate() {
            let var = x.column(j).iter().map(|v| (v - m) * (v - m)).sum::<f64>() / n;
            let std = var.sqrt();
            // Une colonne constante garde une échelle de 1 pour ne pas
            // faire exploser les valeurs.
            scale.push(if std > 0.0 { std } else { 1.0 });
        }

        Self {
            version: Self::VERSION,
            feature_columns: feature_columns.to_vec(),
            mean: mean.to_vec(),
            scale,
        }
    }

    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.mean.len() {
            bail!(
                "Largeur incompatible avec la standardisation : {} colonnes, {} attendues",
                x.ncols(),
                self.mean.len()
            );
        }
        let mut out = x.clone();
        for mut row in out.rows_mut() {
            for j in 0..self.mean.len() {
                row[j] = (row[j] - self.mean[j]) / self.scale[j];
            }
        }
        Ok(out)
    }
}

/// Liste ordonnée des colonnes de features, artefact à part entière :
/// c'est elle que la prédiction relit pour assembler ses lignes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureColumnsArtifact {
    pub version: u32,
    pub columns: Vec<String>,
}

impl VersionedArtifact for FeatureColumnsArtifact {
    const VERSION: u32 = 1;
    fn version(&self) -> u32 {
        self.version
    }
}

impl FeatureColumnsArtifact {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            version: Self::VERSION,
            columns,
        }
    }
}

/// Valeur d'une colonne de feature sur une ligne nettoyée. Un nom de
/// colonne inconnu est fatal : un désalignement silencieux corromprait
/// les prédictions.
pub fn feature_value(row: &CleanedRow, column: &str) -> Result<f64> {
    let value = match column {
        "GridPosition" => row.grid_position as f64,
        "driver_recent_form" => row.driver_recent_form as f64,
        "driver_win_percentage" => row.driver_win_percentage as f64,
        "team_win_percentage" => row.team_win_percentage as f64,
        "driver_dnf_rate" => row.driver_dnf_rate as f64,
        "driver_podium_rate" => row.driver_podium_rate as f64,
        "driver_races_competed" => row.driver_races_competed as f64,
        _ => bail!("Colonne de feature inconnue : {}", column),
    };
    Ok(value)
}

/// Matrice de features (non standardisée) dans l'ordre de colonnes donné.
pub fn feature_matrix(rows: &[CleanedRow], columns: &[String]) -> Result<Array2<f64>> {
    let mut matrix = Array2::zeros((rows.len(), columns.len()));
    for (i, row) in rows.iter().enumerate() {
        for (j, column) in columns.iter().enumerate() {
            matrix[[i, j]] = feature_value(row, column)?;
        }
    }
    Ok(matrix)
}

pub fn labels(rows: &[CleanedRow]) -> Array1<f64> {
    Array1::from_iter(rows.iter().map(|r| r.is_winner as f64))
}

/// Découpage stratifié : chaque classe est mélangée puis coupée à la même
/// proportion, ce qui préserve l'équilibre des classes dans les deux
/// partitions. Une classe à effectif 1 reste dans l'entraînement.
pub fn stratified_split_indices(
    labels: &Array1<f64>,
    test_fraction: f64,
    seed: u64,
) -> (Vec<usize>, Vec<usize>) {
    let mut by_class: HashMap<i64, Vec<usize>> = HashMap::new();
    for (i, &y) in labels.iter().enumerate() {
        by_class.entry(y as i64).or_default().push(i);
    }

    let mut classes: Vec<i64> = by_class.keys().copied().collect();
    classes.sort_unstable();

    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::new();
    let mut test = Vec::new();

    for class in classes {
        let mut indices = by_class.remove(&class).unwrap_or_default();
        indices.shuffle(&mut rng);
        let n_test = if indices.len() < 2 {
            0
        } else {
            (indices.len() as f64 * test_fraction).round() as usize
        };
        test.extend_from_slice(&indices[..n_test]);
        train.extend_from_slice(&indices[n_test..]);
    }

    (train, test)
}

/// Données prêtes pour l'entraînement : partitions standardisées,
/// étiquettes, et la transformation ajustée.
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub x_train: Array2<f64>,
    pub x_test: Array2<f64>,
    pub y_train: Array1<f64>,
    pub y_test: Array1<f64>,
    pub scaler: ScalerArtifact,
}

pub fn prepare(rows: &[CleanedRow]) -> Result<PreparedData> {
    if rows.is_empty() {
        bail!("Table nettoyée vide : rien à préparer");
    }

    let columns: Vec<String> = FEATURE_COLUMNS.iter().map(|c| c.to_string()).collect();
    let x = feature_matrix(rows, &columns)?;
    let y = labels(rows);

    let (train_idx, test_idx) = stratified_split_indices(&y, TEST_FRACTION, SPLIT_SEED);

    let x_train = x.select(Axis(0), &train_idx);
    let x_test = x.select(Axis(0), &test_idx);
    let y_train = Array1::from_iter(train_idx.iter().map(|&i| y[i]));
    let y_test = Array1::from_iter(test_idx.iter().map(|&i| y[i]));

    let scaler = ScalerArtifact::fit(&x_train, &columns);
    let x_train = scaler.transform(&x_train)?;
    let x_test = scaler.transform(&x_test)?;

    Ok(PreparedData {
        x_train,
        x_test,
        y_train,
        y_test,
        scaler,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cleaned_row(name: &str, is_winner: i8, grid: f32) -> CleanedRow {
        CleanedRow {
            abbreviation: "ABC".to_string(),
            full_name: name.to_string(),
            team_name: "Ecurie".to_string(),
            position: if is_winner == 1 { 1.0 } else { 5.0 },
            grid_position: grid,
            points: 0.0,
            status: "Finished".to_string(),
            season: 2024,
            round: 1,
            race_name: "Grand Prix".to_string(),
            driver_recent_form: 4.0,
            driver_win_percentage: 10.0,
            team_win_percentage: 20.0,
            starting_position_quality: grid,
            driver_dnf_rate: 30.0,
            driver_podium_rate: 40.0,
            driver_races_competed: 12,
            is_winner,
        }
    }

    #[test]
    fn test_seven_feature_columns() {
        assert_eq!(FEATURE_COLUMNS.len(), 7);
    }

    #[test]
    fn test_feature_value_unknown_column_fails() {
        let row = cleaned_row("Alice", 0, 3.0);
        assert!(feature_value(&row, "Position").is_err());
        assert!(feature_value(&row, "driver_recent_form").is_ok());
    }

    #[test]
    fn test_stratified_split_preserves_class_balance() {
        // 100 lignes, 10 positives : la partition de test (20 %) doit
        // contenir 2 positives et 18 négatives.
        let y = Array1::from_iter((0..100).map(|i| if i < 10 { 1.0 } else { 0.0 }));
        let (train, test) = stratified_split_indices(&y, 0.2, 42);

        assert_eq!(train.len(), 80);
        assert_eq!(test.len(), 20);
        let test_pos = test.iter().filter(|&&i| y[i] == 1.0).count();
        let train_pos = train.iter().filter(|&&i| y[i] == 1.0).count();
        assert_eq!(test_pos, 2);
        assert_eq!(train_pos, 8);
    }

    #[test]
    fn test_stratified_split_deterministic() {
        let y = Array1::from_iter((0..50).map(|i| if i % 10 == 0 { 1.0 } else { 0.0 }));
        let a = stratified_split_indices(&y, 0.2, 42);
        let b = stratified_split_indices(&y, 0.2, 42);
        assert_eq!(a, b);
    }

    #[test]
    fn test_stratified_split_singleton_class_stays_in_train() {
        let y = Array1::from_vec(vec![0.0, 0.0, 0.0, 0.0, 1.0]);
        let (train, test) = stratified_split_indices(&y, 0.2, 42);
        assert!(train.contains(&4));
        assert!(!test.contains(&4));
    }

    #[test]
    fn test_scaler_zero_mean_unit_variance() {
        let x = Array2::from_shape_vec(
            (4, 2),
            vec![1.0, 10.0, 2.0, 20.0, 3.0, 30.0, 4.0, 40.0],
        )
        .unwrap();
        let columns = vec!["a".to_string(), "b".to_string()];
        let scaler = ScalerArtifact::fit(&x, &columns);
        let scaled = scaler.transform(&x).unwrap();

        for j in 0..2 {
            let col = scaled.column(j);
            let mean: f64 = col.iter().sum::<f64>() / col.len() as f64;
            let var: f64 = col.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>()
                / col.len() as f64;
            assert!(mean.abs() < 1e-12, "moyenne = {mean}");
            assert!((var.sqrt() - 1.0).abs() < 1e-12, "écart-type = {}", var.sqrt());
        }
    }

    #[test]
    fn test_scaler_constant_column_keeps_scale_one() {
        let x = Array2::from_shape_vec((3, 1), vec![7.0, 7.0, 7.0]).unwrap();
        let scaler = ScalerArtifact::fit(&x, &["a".to_string()]);
        assert_eq!(scaler.scale[0], 1.0);
        let scaled = scaler.transform(&x).unwrap();
        assert_eq!(scaled[[0, 0]], 0.0);
    }

    #[test]
    fn test_scaler_width_mismatch_fails() {
        let x = Array2::from_shape_vec((2, 2), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let scaler = ScalerArtifact::fit(&x, &["a".to_string(), "b".to_string()]);
        let narrow = Array2::from_shape_vec((2, 1), vec![1.0, 2.0]).unwrap();
        assert!(scaler.transform(&narrow).is_err());
    }

    #[test]
    fn test_prepare_end_to_end() {
        let mut rows = Vec::new();
        for i in 0..40 {
            let winner = i8::from(i % 20 == 0);
            rows.push(cleaned_row(&format!("Pilote{}", i), winner, (i % 10) as f32 + 1.0));
        }
        let prep = prepare(&rows).unwrap();

        assert_eq!(prep.x_train.nrows() + prep.x_test.nrows(), 40);
        assert_eq!(prep.x_train.ncols(), 7);
        assert_eq!(prep.y_train.len(), prep.x_train.nrows());
        assert_eq!(prep.y_test.len(), prep.x_test.nrows());
        assert_eq!(prep.scaler.feature_columns.len(), 7);

        // Équilibre de classes préservé à l'arrondi près (2 positifs sur 40).
        let total_pos = prep.y_train.iter().chain(prep.y_test.iter()).filter(|&&y| y == 1.0).count();
        assert_eq!(total_pos, 2);
    }

    #[test]
    fn test_prepare_empty_fails() {
        assert!(prepare(&[]).is_err());
    }
}

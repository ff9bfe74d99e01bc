use anyhow::{bail, Context, Result};
use ndarray::{Array1, Array2};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::models::RaceResult;

/// Fichiers produits par le pipeline, un fichier par étape.
pub const COMBINED_FILE: &str = "f1_all_races_combined.csv";
pub const ENGINEERED_FILE: &str = "f1_features_engineered.csv";
pub const CLEANED_FILE: &str = "f1_data_cleaned.csv";
pub const X_TRAIN_FILE: &str = "X_train_scaled.csv";
pub const X_TEST_FILE: &str = "X_test_scaled.csv";
pub const Y_TRAIN_FILE: &str = "y_train.csv";
pub const Y_TEST_FILE: &str = "y_test.csv";
pub const SCALER_FILE: &str = "scaler.json";
pub const FEATURE_COLUMNS_FILE: &str = "feature_columns.json";
pub const BASELINE_MODEL_FILE: &str = "logistic_regression_model.json";
pub const FOREST_MODEL_FILE: &str = "random_forest_model.json";
pub const BASELINE_METRICS_FILE: &str = "baseline_metrics.json";
pub const FOREST_METRICS_FILE: &str = "random_forest_metrics.json";
pub const PREDICTIONS_FILE: &str = "predictions.csv";
pub const DRIVERS_FILE: &str = "drivers.csv";

/// En-tête exact attendu pour toute table de résultats de course.
/// Un fichier qui s'en écarte est une erreur de schéma, fatale.
pub const RESULT_HEADERS: [&str; 10] = [
    "Abbreviation",
    "FullName",
    "TeamName",
    "Position",
    "GridPosition",
    "Points",
    "Status",
    "Season",
    "Round",
    "RaceName",
];

/// Artefact versionné : le chargement échoue si la version sur disque
/// ne correspond pas à celle que le code sait lire.
pub trait VersionedArtifact: DeserializeOwned {
    const VERSION: u32;
    fn version(&self) -> u32;
}

/// Couche d'accès au répertoire de données. Toutes les étapes lisent et
/// écrivent à travers elle, jamais par des chemins construits à la main.
#[derive(Debug, Clone)]
pub struct Store {
    data_dir: PathBuf,
}

impl Store {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn default_dir() -> PathBuf {
        let mut path = std::env::current_dir().unwrap_or_default();
        path.push("data");
        path
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.data_dir.join(name)
    }

    pub fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("Impossible de créer le répertoire {:?}", self.data_dir))
    }

    pub fn race_file_name(season: u16, round: u8) -> String {
        format!("f1_{}_race_{:02}.csv", season, round)
    }

    /// Liste les fichiers par-course, triés lexicographiquement pour un
    /// ordre de concaténation reproductible. La table combinée, qui vit
    /// dans le même répertoire, n'en fait pas partie.
    pub fn list_race_files(&self) -> Result<Vec<PathBuf>> {
        let entries = fs::read_dir(&self.data_dir)
            .with_context(|| format!("Impossible de lire le répertoire {:?}", self.data_dir))?;

        let mut files: Vec<PathBuf> = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(n) => n,
                None => continue,
            };
            if name.starts_with("f1_") && name.contains("_race_") && name.ends_with(".csv") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Lit une table de résultats en vérifiant strictement son en-tête.
    pub fn read_results(&self, path: &Path) -> Result<Vec<RaceResult>> {
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("Impossible d'ouvrir {:?}", path))?;

        let headers: Vec<String> = reader
            .headers()
            .with_context(|| format!("En-tête illisible dans {:?}", path))?
            .iter()
            .map(|h| h.to_string())
            .collect();
        if headers != RESULT_HEADERS {
            bail!(
                "Schéma divergent dans {:?} : attendu {:?}, trouvé {:?}",
                path,
                RESULT_HEADERS,
                headers
            );
        }

        let mut rows = Vec::new();
        for record in reader.deserialize() {
            let row: RaceResult =
                record.with_context(|| format!("Ligne invalide dans {:?}", path))?;
            rows.push(row);
        }
        Ok(rows)
    }

    /// Écrit une table typée (en-têtes dérivés de serde).
    pub fn write_csv<T: Serialize>(&self, name: &str, rows: &[T]) -> Result<()> {
        self.ensure_dir()?;
        let path = self.path(name);
        let mut writer = csv::Writer::from_path(&path)
            .with_context(|| format!("Impossible d'écrire {:?}", path))?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer
            .flush()
            .with_context(|| format!("Échec de l'écriture de {:?}", path))?;
        Ok(())
    }

    pub fn read_csv<T: DeserializeOwned>(&self, name: &str) -> Result<Vec<T>> {
        let path = self.path(name);
        let mut reader = csv::Reader::from_path(&path)
            .with_context(|| format!("Impossible d'ouvrir {:?}", path))?;
        let mut rows = Vec::new();
        for record in reader.deserialize() {
            let row: T = record.with_context(|| format!("Ligne invalide dans {:?}", path))?;
            rows.push(row);
        }
        Ok(rows)
    }

    /// Matrice de features : une colonne par feature, en-tête explicite.
    pub fn write_matrix(&self, name: &str, columns: &[String], matrix: &Array2<f64>) -> Result<()> {
        if columns.len() != matrix.ncols() {
            bail!(
                "Largeur incohérente pour {} : {} colonnes nommées, {} colonnes de données",
                name,
                columns.len(),
                matrix.ncols()
            );
        }
        self.ensure_dir()?;
        let path = self.path(name);
        let mut writer = csv::Writer::from_path(&path)
            .with_context(|| format!("Impossible d'écrire {:?}", path))?;
        writer.write_record(columns)?;
        for row in matrix.rows() {
            let record: Vec<String> = row.iter().map(|v| v.to_string()).collect();
            writer.write_record(&record)?;
        }
        writer
            .flush()
            .with_context(|| format!("Échec de l'écriture de {:?}", path))?;
        Ok(())
    }

    pub fn read_matrix(&self, name: &str) -> Result<(Vec<String>, Array2<f64>)> {
        let path = self.path(name);
        let mut reader = csv::Reader::from_path(&path)
            .with_context(|| format!("Impossible d'ouvrir {:?}", path))?;
        let columns: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();

        let mut values: Vec<f64> = Vec::new();
        let mut n_rows = 0usize;
        for record in reader.records() {
            let record = record.with_context(|| format!("Ligne invalide dans {:?}", path))?;
            if record.len() != columns.len() {
                bail!("Largeur de ligne incohérente dans {:?}", path);
            }
            for field in record.iter() {
                let v: f64 = field
                    .parse()
                    .with_context(|| format!("Valeur non numérique '{}' dans {:?}", field, path))?;
                values.push(v);
            }
            n_rows += 1;
        }
        let matrix = Array2::from_shape_vec((n_rows, columns.len()), values)
            .with_context(|| format!("Forme de matrice invalide dans {:?}", path))?;
        Ok((columns, matrix))
    }

    /// Vecteur d'étiquettes : une colonne unique.
    pub fn write_vector(&self, name: &str, column: &str, vector: &Array1<f64>) -> Result<()> {
        self.ensure_dir()?;
        let path = self.path(name);
        let mut writer = csv::Writer::from_path(&path)
            .with_context(|| format!("Impossible d'écrire {:?}", path))?;
        writer.write_record([column])?;
        for v in vector.iter() {
            writer.write_record([v.to_string()])?;
        }
        writer
            .flush()
            .with_context(|| format!("Échec de l'écriture de {:?}", path))?;
        Ok(())
    }

    pub fn read_vector(&self, name: &str) -> Result<Array1<f64>> {
        let path = self.path(name);
        let mut reader = csv::Reader::from_path(&path)
            .with_context(|| format!("Impossible d'ouvrir {:?}", path))?;
        let mut values = Vec::new();
        for record in reader.records() {
            let record = record.with_context(|| format!("Ligne invalide dans {:?}", path))?;
            let field = record
                .get(0)
                .with_context(|| format!("Colonne manquante dans {:?}", path))?;
            let v: f64 = field
                .parse()
                .with_context(|| format!("Valeur non numérique '{}' dans {:?}", field, path))?;
            values.push(v);
        }
        Ok(Array1::from_vec(values))
    }

    pub fn save_json<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        self.ensure_dir()?;
        let path = self.path(name);
        let json = serde_json::to_string_pretty(value)?;
        fs::write(&path, json).with_context(|| format!("Impossible d'écrire {:?}", path))?;
        Ok(())
    }

    pub fn load_json<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let path = self.path(name);
        let json =
            fs::read_to_string(&path).with_context(|| format!("Impossible de lire {:?}", path))?;
        let value: T = serde_json::from_str(&json)
            .with_context(|| format!("Contenu invalide dans {:?}", path))?;
        Ok(value)
    }

    pub fn load_artifact<T: VersionedArtifact>(&self, name: &str) -> Result<T> {
        let value: T = self.load_json(name)?;
        if value.version() != T::VERSION {
            bail!(
                "Version d'artefact inattendue dans {} : trouvé {}, attendu {}",
                name,
                value.version(),
                T::VERSION
            );
        }
        Ok(value)
    }
}

/// Résumé de la concaténation, pour l'affichage.
#[derive(Debug, Clone)]
pub struct CombineSummary {
    pub files: usize,
    pub rows: usize,
}

/// Union ligne à ligne de tous les fichiers par-course, dans l'ordre
/// lexicographique des noms de fichiers. Un schéma divergent est fatal.
pub fn combine(store: &Store) -> Result<(Vec<RaceResult>, CombineSummary)> {
    let files = store.list_race_files()?;
    if files.is_empty() {
        bail!("Aucun fichier de course dans {:?}", store.data_dir());
    }

    let mut combined: Vec<RaceResult> = Vec::new();
    for file in &files {
        let rows = store.read_results(file)?;
        combined.extend(rows);
    }

    store.write_csv(COMBINED_FILE, &combined)?;
    let summary = CombineSummary {
        files: files.len(),
        rows: combined.len(),
    };
    Ok((combined, summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FINISHED_STATUS;
    use serde::Deserialize;

    fn temp_store(name: &str) -> Store {
        let dir = std::env::temp_dir().join(format!("lepodium-store-test-{}", name));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        Store::new(dir)
    }

    fn row(name: &str, season: u16, round: u8, position: Option<f64>) -> RaceResult {
        RaceResult {
            abbreviation: "ABC".to_string(),
            full_name: name.to_string(),
            team_name: "Ecurie".to_string(),
            position,
            grid_position: Some(3.0),
            points: Some(10.0),
            status: FINISHED_STATUS.to_string(),
            season,
            round,
            race_name: "Grand Prix".to_string(),
        }
    }

    #[test]
    fn test_results_roundtrip_with_missing_position() {
        let store = temp_store("roundtrip");
        let rows = vec![row("Alice", 2024, 1, Some(1.0)), row("Bob", 2024, 1, None)];
        store
            .write_csv(&Store::race_file_name(2024, 1), &rows)
            .unwrap();

        let path = store.path(&Store::race_file_name(2024, 1));
        let back = store.read_results(&path).unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back[0].position, Some(1.0));
        assert_eq!(back[1].position, None);
    }

    #[test]
    fn test_read_results_rejects_divergent_schema() {
        let store = temp_store("schema");
        let path = store.path("f1_2024_race_01.csv");
        fs::write(&path, "FullName,Position\nAlice,1\n").unwrap();
        let err = store.read_results(&path).unwrap_err();
        assert!(err.to_string().contains("Schéma divergent"), "{err}");
    }

    #[test]
    fn test_list_race_files_sorted_and_excludes_combined() {
        let store = temp_store("listing");
        store
            .write_csv(&Store::race_file_name(2024, 12), &[row("A", 2024, 12, Some(1.0))])
            .unwrap();
        store
            .write_csv(&Store::race_file_name(2024, 2), &[row("A", 2024, 2, Some(1.0))])
            .unwrap();
        store
            .write_csv(COMBINED_FILE, &[row("A", 2024, 2, Some(1.0))])
            .unwrap();

        let files = store.list_race_files().unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["f1_2024_race_02.csv", "f1_2024_race_12.csv"]);
    }

    #[test]
    fn test_combine_concatenates_in_file_order() {
        let store = temp_store("combine");
        store
            .write_csv(&Store::race_file_name(2024, 2), &[row("Bob", 2024, 2, Some(1.0))])
            .unwrap();
        store
            .write_csv(&Store::race_file_name(2024, 1), &[row("Alice", 2024, 1, Some(1.0))])
            .unwrap();

        let (rows, summary) = combine(&store).unwrap();
        assert_eq!(summary.files, 2);
        assert_eq!(summary.rows, 2);
        assert_eq!(rows[0].full_name, "Alice");
        assert_eq!(rows[1].full_name, "Bob");
        assert!(store.path(COMBINED_FILE).exists());
    }

    #[test]
    fn test_combine_empty_dir_fails() {
        let store = temp_store("combine-empty");
        assert!(combine(&store).is_err());
    }

    #[test]
    fn test_matrix_roundtrip() {
        let store = temp_store("matrix");
        let columns = vec!["a".to_string(), "b".to_string()];
        let matrix =
            Array2::from_shape_vec((2, 2), vec![1.0, 2.5, -3.0, 0.125]).unwrap();
        store.write_matrix("m.csv", &columns, &matrix).unwrap();

        let (cols, back) = store.read_matrix("m.csv").unwrap();
        assert_eq!(cols, columns);
        assert_eq!(back, matrix);
    }

    #[test]
    fn test_vector_roundtrip() {
        let store = temp_store("vector");
        let v = Array1::from_vec(vec![0.0, 1.0, 1.0]);
        store.write_vector("y.csv", "is_winner", &v).unwrap();
        let back = store.read_vector("y.csv").unwrap();
        assert_eq!(back, v);
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct FakeArtifact {
        version: u32,
        value: f64,
    }

    impl VersionedArtifact for FakeArtifact {
        const VERSION: u32 = 1;
        fn version(&self) -> u32 {
            self.version
        }
    }

    #[test]
    fn test_artifact_version_check() {
        let store = temp_store("artifact");
        store
            .save_json("ok.json", &FakeArtifact { version: 1, value: 2.0 })
            .unwrap();
        store
            .save_json("bad.json", &FakeArtifact { version: 7, value: 2.0 })
            .unwrap();

        assert!(store.load_artifact::<FakeArtifact>("ok.json").is_ok());
        let err = store.load_artifact::<FakeArtifact>("bad.json").unwrap_err();
        assert!(err.to_string().contains("Version d'artefact"), "{err}");
    }

    #[test]
    fn test_load_json_missing_file() {
        let store = temp_store("missing");
        assert!(store.load_json::<FakeArtifact>("absent.json").is_err());
    }
}

mod display;
mod fetch;
mod schedule;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;

use lepodium_pipeline::aggregate::driver_aggregates;
use lepodium_pipeline::clean::clean;
use lepodium_pipeline::engineer::engineer_features;
use lepodium_pipeline::metrics::{confusion, evaluate, MetricsArtifact};
use lepodium_pipeline::models::{
    logistic, ForestModel, ForestParams, LogisticModel, ModelArtifact, SavedModel, WinClassifier,
};
use lepodium_pipeline::predict::{dark_horses, predict_race, GridPolicy};
use lepodium_pipeline::prepare::{
    prepare, FeatureColumnsArtifact, ScalerArtifact, LABEL_COLUMN,
};
use lepodium_store::models::{CleanedRow, DatasetSummary, EngineeredRow};
use lepodium_store::store::{
    self, Store, BASELINE_METRICS_FILE, BASELINE_MODEL_FILE, CLEANED_FILE, COMBINED_FILE,
    ENGINEERED_FILE, FEATURE_COLUMNS_FILE, FOREST_METRICS_FILE, FOREST_MODEL_FILE,
    PREDICTIONS_FILE, SCALER_FILE, X_TEST_FILE, X_TRAIN_FILE, Y_TEST_FILE, Y_TRAIN_FILE,
};

use crate::display::{
    display_combine_summary, display_comparison, display_dark_horses, display_dataset_overview,
    display_feature_importance, display_fetch_summary, display_metrics, display_predictions,
    display_top_winners,
};

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum TrainChoice {
    Baseline,
    Forest,
    #[default]
    All,
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum PredictModel {
    Baseline,
    #[default]
    Forest,
}

#[derive(Parser)]
#[command(name = "lepodium", about = "Prédicteur de vainqueur de Grand Prix")]
struct Cli {
    /// Répertoire de données partagé par toutes les étapes
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Collecter les résultats de course depuis la source de télémétrie
    Fetch {
        /// Limiter la collecte à une saison
        #[arg(short, long)]
        season: Option<u16>,

        /// Pause entre deux requêtes (millisecondes)
        #[arg(long, default_value_t = fetch::REQUEST_DELAY_MS)]
        delay_ms: u64,
    },

    /// Concaténer les fichiers par-course en une table unique
    Combine,

    /// Dériver les statistiques pilote/écurie sur toute la table
    Engineer,

    /// Remplir les valeurs manquantes et dériver l'étiquette
    Clean,

    /// Sélectionner les features, découper et standardiser
    Prepare,

    /// Ajuster et évaluer les classifieurs
    Train {
        /// Modèle à ajuster
        #[arg(short, long, default_value = "all")]
        model: TrainChoice,
    },

    /// Comparer les métriques des modèles entraînés
    Compare,

    /// Prédire le vainqueur d'une course cible
    Predict {
        /// Saison de la course cible
        #[arg(short, long)]
        season: u16,

        /// Manche de la course cible
        #[arg(short, long)]
        round: u8,

        /// Modèle à utiliser
        #[arg(short, long, default_value = "forest")]
        model: PredictModel,

        /// Fichier CSV de grilles fournies (FullName,GridPosition) ;
        /// sans lui, grilles enregistrées puis moyenne puis 20
        #[arg(long)]
        grid_file: Option<PathBuf>,

        /// Nombre de pilotes affichés
        #[arg(short, long, default_value = "10")]
        top: usize,
    },

    /// Vue d'ensemble de la table combinée
    Stats,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let store = Store::new(&cli.data_dir);

    match cli.command {
        Command::Fetch { season, delay_ms } => cmd_fetch(&store, season, delay_ms),
        Command::Combine => cmd_combine(&store),
        Command::Engineer => cmd_engineer(&store),
        Command::Clean => cmd_clean(&store),
        Command::Prepare => cmd_prepare(&store),
        Command::Train { model } => cmd_train(&store, model),
        Command::Compare => cmd_compare(&store),
        Command::Predict {
            season,
            round,
            model,
            grid_file,
            top,
        } => cmd_predict(&store, season, round, model, grid_file.as_deref(), top),
        Command::Stats => cmd_stats(&store),
    }
}

fn cmd_fetch(store: &Store, season: Option<u16>, delay_ms: u64) -> Result<()> {
    let schedule = schedule::full_schedule(season);
    if schedule.is_empty() {
        bail!("Aucune manche au calendrier pour cette saison");
    }
    println!(
        "Collecte de {} manches depuis {}...",
        schedule.len(),
        fetch::BASE_URL
    );
    let report = fetch::fetch_all(store, &schedule, delay_ms)?;
    display_fetch_summary(&report);
    Ok(())
}

fn cmd_combine(store: &Store) -> Result<()> {
    let (rows, summary) = store::combine(store)?;
    let dataset = DatasetSummary::from_rows(&rows);
    display_combine_summary(&summary, dataset.as_ref());
    Ok(())
}

fn cmd_engineer(store: &Store) -> Result<()> {
    let combined = store.read_results(&store.path(COMBINED_FILE))?;
    let engineered = engineer_features(combined);
    store.write_csv(ENGINEERED_FILE, &engineered)?;
    println!(
        "Features dérivées pour {} lignes → {}",
        engineered.len(),
        ENGINEERED_FILE
    );
    Ok(())
}

fn cmd_clean(store: &Store) -> Result<()> {
    let engineered: Vec<EngineeredRow> = store.read_csv(ENGINEERED_FILE)?;
    let cleaned = clean(&engineered)?;

    let winners = cleaned.iter().filter(|r| r.is_winner == 1).count();
    store.write_csv(CLEANED_FILE, &cleaned)?;
    println!("Table nettoyée : {} lignes → {}", cleaned.len(), CLEANED_FILE);
    println!(
        "  Vainqueurs : {} ({:.2} % des lignes)",
        winners,
        winners as f64 / cleaned.len().max(1) as f64 * 100.0
    );
    Ok(())
}

fn cmd_prepare(store: &Store) -> Result<()> {
    let cleaned: Vec<CleanedRow> = store.read_csv(CLEANED_FILE)?;
    let prep = prepare(&cleaned)?;

    let columns = prep.scaler.feature_columns.clone();
    store.write_matrix(X_TRAIN_FILE, &columns, &prep.x_train)?;
    store.write_matrix(X_TEST_FILE, &columns, &prep.x_test)?;
    store.write_vector(Y_TRAIN_FILE, LABEL_COLUMN, &prep.y_train)?;
    store.write_vector(Y_TEST_FILE, LABEL_COLUMN, &prep.y_test)?;
    store.save_json(SCALER_FILE, &prep.scaler)?;
    store.save_json(
        FEATURE_COLUMNS_FILE,
        &FeatureColumnsArtifact::new(columns),
    )?;

    println!(
        "Partitions prêtes : {} lignes d'entraînement, {} de test",
        prep.x_train.nrows(),
        prep.x_test.nrows()
    );
    Ok(())
}

fn cmd_train(store: &Store, choice: TrainChoice) -> Result<()> {
    let (columns, x_train) = store.read_matrix(X_TRAIN_FILE)?;
    let (_, x_test) = store.read_matrix(X_TEST_FILE)?;
    let y_train = store.read_vector(Y_TRAIN_FILE)?;
    let y_test = store.read_vector(Y_TEST_FILE)?;

    println!(
        "Données chargées : {} lignes d'entraînement, {} de test",
        x_train.nrows(),
        x_test.nrows()
    );

    if matches!(choice, TrainChoice::Baseline | TrainChoice::All) {
        let model = LogisticModel::fit(
            &x_train,
            &y_train,
            logistic::LEARNING_RATE,
            logistic::LAMBDA,
            logistic::EPOCHS,
        );
        let proba = model.predict_proba(&x_test);
        let metrics = evaluate(&y_test, &proba);

        display_metrics(model.name(), &metrics, Some(&confusion(&y_test, &proba)));
        display_feature_importance(&columns, &model.feature_importance());

        store.save_json(
            BASELINE_METRICS_FILE,
            &MetricsArtifact::new(model.name(), metrics),
        )?;
        store.save_json(
            BASELINE_MODEL_FILE,
            &SavedModel::new(ModelArtifact::LogisticRegression(model)),
        )?;
        println!("\nModèle de référence sauvegardé → {}", BASELINE_MODEL_FILE);
    }

    if matches!(choice, TrainChoice::Forest | TrainChoice::All) {
        let model = ForestModel::fit(&x_train, &y_train, ForestParams::default());
        let proba = model.predict_proba(&x_test);
        let metrics = evaluate(&y_test, &proba);

        display_metrics(model.name(), &metrics, Some(&confusion(&y_test, &proba)));
        display_feature_importance(&columns, &model.feature_importance());

        store.save_json(
            FOREST_METRICS_FILE,
            &MetricsArtifact::new(model.name(), metrics),
        )?;
        store.save_json(
            FOREST_MODEL_FILE,
            &SavedModel::new(ModelArtifact::RandomForest(model)),
        )?;
        println!("\nForêt aléatoire sauvegardée → {}", FOREST_MODEL_FILE);
    }

    Ok(())
}

fn cmd_compare(store: &Store) -> Result<()> {
    let baseline: MetricsArtifact = store
        .load_artifact(BASELINE_METRICS_FILE)
        .context("Entraînez d'abord le modèle de référence : lepodium train")?;
    let forest: MetricsArtifact = store
        .load_artifact(FOREST_METRICS_FILE)
        .context("Entraînez d'abord la forêt : lepodium train")?;
    display_comparison(&[baseline, forest]);
    Ok(())
}

/// Une ligne du fichier de grilles fournies.
#[derive(Debug, Deserialize)]
struct GridEntry {
    #[serde(rename = "FullName")]
    full_name: String,
    #[serde(rename = "GridPosition")]
    grid_position: Option<f64>,
}

fn read_grid_file(path: &std::path::Path) -> Result<GridPolicy> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Impossible d'ouvrir le fichier de grilles {:?}", path))?;
    let mut grids = Vec::new();
    for record in reader.deserialize() {
        let entry: GridEntry =
            record.with_context(|| format!("Ligne invalide dans {:?}", path))?;
        grids.push((entry.full_name, entry.grid_position));
    }
    if grids.is_empty() {
        bail!("Fichier de grilles vide : {:?}", path);
    }
    Ok(GridPolicy::Manual(grids))
}

fn cmd_predict(
    store: &Store,
    season: u16,
    round: u8,
    model_choice: PredictModel,
    grid_file: Option<&std::path::Path>,
    top: usize,
) -> Result<()> {
    let cleaned: Vec<CleanedRow> = store.read_csv(CLEANED_FILE)?;
    let scaler: ScalerArtifact = store.load_artifact(SCALER_FILE)?;
    let columns: FeatureColumnsArtifact = store.load_artifact(FEATURE_COLUMNS_FILE)?;

    // L'ordre des colonnes fait foi : le scaler doit l'avoir vu tel quel.
    if scaler.feature_columns != columns.columns {
        bail!(
            "Artefacts incohérents : le scaler a été ajusté sur {:?}, la liste publiée est {:?}",
            scaler.feature_columns,
            columns.columns
        );
    }

    let saved: SavedModel = match model_choice {
        PredictModel::Baseline => store.load_artifact(BASELINE_MODEL_FILE)?,
        PredictModel::Forest => store.load_artifact(FOREST_MODEL_FILE)?,
    };
    let model = saved.model.classifier();

    let grid_policy = match grid_file {
        Some(path) => read_grid_file(path)?,
        None => GridPolicy::Recorded,
    };

    let predictions = predict_race(
        &cleaned,
        season,
        round,
        &grid_policy,
        &scaler,
        &columns.columns,
        model,
    )?;

    store.write_csv(PREDICTIONS_FILE, &predictions)?;
    println!(
        "Prédiction saison {} manche {} ({} partants, modèle {}) → {}",
        season,
        round,
        predictions.len(),
        model.name(),
        PREDICTIONS_FILE
    );
    display_predictions(&predictions, top);
    display_dark_horses(&dark_horses(&predictions));
    Ok(())
}

fn cmd_stats(store: &Store) -> Result<()> {
    let combined = store.read_results(&store.path(COMBINED_FILE))?;
    match DatasetSummary::from_rows(&combined) {
        Some(summary) => display_dataset_overview(&summary),
        None => {
            println!("Table combinée vide. Lancez d'abord : lepodium fetch puis combine");
            return Ok(());
        }
    }

    let aggregates = driver_aggregates(&combined);
    let mut winners: Vec<(String, u32)> = aggregates
        .into_iter()
        .filter(|(_, agg)| agg.wins > 0)
        .map(|(name, agg)| (name, agg.wins))
        .collect();
    winners.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    winners.truncate(15);
    display_top_winners(&winners);
    Ok(())
}

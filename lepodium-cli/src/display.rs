use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};

use lepodium_pipeline::metrics::{Confusion, MetricsArtifact, MetricsBundle};
use lepodium_store::models::{DatasetSummary, PredictionRow};
use lepodium_store::store::CombineSummary;

use crate::fetch::FetchReport;

pub fn display_fetch_summary(report: &FetchReport) {
    println!("\nCollecte terminée :");
    println!("  Courses téléchargées : {}", report.downloaded);
    println!("  Manches sautées      : {}", report.skipped);
    println!("  Lignes écrites       : {}", report.total_rows);
}

pub fn display_combine_summary(summary: &CombineSummary, dataset: Option<&DatasetSummary>) {
    println!("\nConcaténation terminée :");
    println!("  Fichiers lus : {}", summary.files);
    println!("  Lignes       : {}", summary.rows);
    if let Some(d) = dataset {
        display_dataset_overview(d);
    }
}

pub fn display_dataset_overview(d: &DatasetSummary) {
    println!("\n📊 Vue d'ensemble du jeu de données\n");
    println!("  Résultats     : {}", d.total_rows);
    println!("  Saisons       : {} à {}", d.first_season, d.last_season);
    println!("  Courses       : {}", d.race_count);
    println!("  Pilotes       : {}", d.driver_count);
    println!("  Écuries       : {}", d.team_count);
}

pub fn display_top_winners(winners: &[(String, u32)]) {
    if winners.is_empty() {
        println!("Aucun vainqueur dans la table.");
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Pilote", "Victoires"]);

    for (name, wins) in winners {
        table.add_row(vec![name.clone(), wins.to_string()]);
    }

    println!("\n── Pilotes les plus victorieux ──");
    println!("{table}");
}

pub fn display_predictions(predictions: &[PredictionRow], top: usize) {
    if predictions.is_empty() {
        println!("Aucune prédiction à afficher.");
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            "Rang",
            "Pilote",
            "Grille",
            "Forme",
            "Vict. %",
            "Probabilité",
        ]);

    for (i, p) in predictions.iter().take(top).enumerate() {
        let proba_cell = Cell::new(format!("{:.4}", p.win_probability));
        let proba_cell = if i == 0 {
            proba_cell.fg(Color::Green)
        } else {
            proba_cell
        };
        table.add_row(vec![
            Cell::new(format!("{}", i + 1)),
            Cell::new(&p.full_name),
            Cell::new(format!("{:.0}", p.grid_position)),
            Cell::new(format!("{:.1}", p.driver_recent_form)),
            Cell::new(format!("{:.1}", p.driver_win_percentage)),
            proba_cell,
        ]);
    }

    println!("{table}");
}

pub fn display_dark_horses(horses: &[&PredictionRow]) {
    if horses.is_empty() {
        return;
    }
    println!("\n🐎 Outsiders possibles (victoires < 5 %, probabilité > 0,1) :");
    for p in horses {
        println!(
            "  {} — victoires {:.1} %, probabilité {:.3}",
            p.full_name, p.driver_win_percentage, p.win_probability
        );
    }
}

pub fn display_metrics(model_name: &str, metrics: &MetricsBundle, confusion: Option<&Confusion>) {
    println!("\nPerformance sur le jeu de test — {} :", model_name);
    println!("  Exactitude : {:.4}", metrics.accuracy);
    println!("  Précision  : {:.4}", metrics.precision);
    println!("  Rappel     : {:.4}", metrics.recall);
    println!("  F1         : {:.4}", metrics.f1_score);
    println!("  ROC-AUC    : {:.4}", metrics.roc_auc);

    if let Some(c) = confusion {
        println!("\nMatrice de confusion :");
        println!("  Vrais négatifs  : {}", c.true_negatives);
        println!("  Faux positifs   : {}", c.false_positives);
        println!("  Faux négatifs   : {}", c.false_negatives);
        println!("  Vrais positifs  : {}", c.true_positives);
    }
}

pub fn display_feature_importance(columns: &[String], importances: &[f64]) {
    let mut ranked: Vec<(&String, f64)> = columns.iter().zip(importances.iter().copied()).collect();
    ranked.sort_by(|a, b| {
        b.1.abs()
            .partial_cmp(&a.1.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    println!("\nImportance des features :");
    for (name, value) in ranked {
        println!("  {:30} {:+.4}", name, value);
    }
}

pub fn display_comparison(artifacts: &[MetricsArtifact]) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            "Modèle",
            "Exactitude",
            "Précision",
            "Rappel",
            "F1",
            "ROC-AUC",
        ]);

    let best = artifacts
        .iter()
        .max_by(|a, b| {
            a.metrics
                .roc_auc
                .partial_cmp(&b.metrics.roc_auc)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|a| a.model_name.clone());

    for artifact in artifacts {
        let m = &artifact.metrics;
        let name_cell = if Some(&artifact.model_name) == best.as_ref() {
            Cell::new(&artifact.model_name).fg(Color::Green)
        } else {
            Cell::new(&artifact.model_name)
        };
        table.add_row(vec![
            name_cell,
            Cell::new(format!("{:.4}", m.accuracy)),
            Cell::new(format!("{:.4}", m.precision)),
            Cell::new(format!("{:.4}", m.recall)),
            Cell::new(format!("{:.4}", m.f1_score)),
            Cell::new(format!("{:.4}", m.roc_auc)),
        ]);
    }

    println!("{table}");
    if let Some(name) = best {
        println!("\nMeilleur modèle (ROC-AUC) : {}", name);
    }
}

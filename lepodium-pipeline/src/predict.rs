use std::collections::HashMap;

use anyhow::{bail, Result};
use ndarray::Array2;

use lepodium_store::models::{
    sort_chronological, CleanedRow, PredictionRow, RaceResult, GRID_DEFAULT,
};

use crate::aggregate::{driver_aggregates, team_aggregates, RACES_BACK};
use crate::clean::FORM_SENTINEL;
use crate::models::WinClassifier;
use crate::prepare::ScalerArtifact;

/// Seuils de l'annotation « outsider » : faible taux de victoire
/// historique mais probabilité prédite au-dessus du seuil.
pub const DARK_HORSE_MAX_WIN_PCT: f64 = 5.0;
pub const DARK_HORSE_MIN_PROBA: f64 = 0.1;

/// Résolution de la grille de départ pour la course cible.
#[derive(Debug, Clone)]
pub enum GridPolicy {
    /// Grille réelle de la course cible si elle existe, sinon moyenne du
    /// pilote sur la saison avant la cible, sinon 20.
    Recorded,
    /// Grilles fournies à la main ; la liste des partants est celle du
    /// fichier, dans son ordre, et une valeur manquante vaut 20.
    Manual(Vec<(String, Option<f64>)>),
}

/// Prédiction du vainqueur d'une course cible (saison, manche).
///
/// L'historique est restreint aux manches STRICTEMENT antérieures à la
/// cible dans la saison cible : c'est la frontière de fuite que toute
/// cette étape existe pour garantir. Les statistiques passent par les
/// mêmes agrégations groupées que l'ingénierie globale, seule la tranche
/// change.
pub fn predict_race(
    cleaned: &[CleanedRow],
    season: u16,
    round: u8,
    grid_policy: &GridPolicy,
    scaler: &ScalerArtifact,
    columns: &[String],
    model: &dyn WinClassifier,
) -> Result<Vec<PredictionRow>> {
    let all: Vec<RaceResult> = cleaned.iter().map(|r| r.to_result()).collect();

    let mut before: Vec<RaceResult> = all
        .iter()
        .filter(|r| r.season == season && r.round < round)
        .cloned()
        .collect();
    sort_chronological(&mut before);

    let drivers = entrants(&all, season, grid_policy);
    if drivers.is_empty() {
        bail!("Aucun partant pour la saison {}, manche {}", season, round);
    }

    let driver_stats = driver_aggregates(&before);
    let team_stats = team_aggregates(&before);

    // Grille réelle de la course cible, quand elle est déjà connue.
    let target_grid: HashMap<&str, f64> = all
        .iter()
        .filter(|r| r.season == season && r.round == round)
        .filter_map(|r| r.grid_position.map(|g| (r.full_name.as_str(), g)))
        .collect();

    let mut features = Vec::with_capacity(drivers.len());
    for driver in &drivers {
        let stats = driver_stats.get(driver);

        let grid = match grid_policy {
            GridPolicy::Recorded => target_grid
                .get(driver.as_str())
                .copied()
                .or_else(|| stats.and_then(|s| s.average_grid()))
                .unwrap_or(GRID_DEFAULT),
            GridPolicy::Manual(grids) => grids
                .iter()
                .find(|(name, _)| name == driver)
                .and_then(|(_, g)| *g)
                .unwrap_or(GRID_DEFAULT),
        };

        let team_win_pct = current_team(&all, driver)
            .and_then(|team| team_stats.get(team))
            .map(|t| t.win_percentage())
            .unwrap_or(0.0);

        // Un débutant sans historique reçoit les valeurs par défaut,
        // jamais une erreur.
        let row: HashMap<&str, f64> = HashMap::from([
            ("GridPosition", grid),
            (
                "driver_recent_form",
                stats
                    .and_then(|s| s.recent_form(RACES_BACK))
                    .unwrap_or(FORM_SENTINEL),
            ),
            (
                "driver_win_percentage",
                stats.map(|s| s.win_percentage()).unwrap_or(0.0),
            ),
            ("team_win_percentage", team_win_pct),
            (
                "driver_dnf_rate",
                stats.map(|s| s.dnf_percentage()).unwrap_or(0.0),
            ),
            (
                "driver_podium_rate",
                stats.map(|s| s.podium_percentage()).unwrap_or(0.0),
            ),
            (
                "driver_races_competed",
                stats.map(|s| s.entries as f64).unwrap_or(0.0),
            ),
        ]);
        features.push(row);
    }

    // Assemblage dans l'ordre de colonnes persisté, et dans cet ordre
    // seulement : un désalignement corromprait silencieusement tout.
    let mut x = Array2::zeros((features.len(), columns.len()));
    for (i, row) in features.iter().enumerate() {
        for (j, column) in columns.iter().enumerate() {
            match row.get(column.as_str()) {
                Some(&v) => x[[i, j]] = v,
                None => bail!("Colonne de feature inconnue : {}", column),
            }
        }
    }

    let x_scaled = scaler.transform(&x)?;
    let proba = model.predict_proba(&x_scaled);

    let mut predictions: Vec<PredictionRow> = drivers
        .iter()
        .zip(features.iter())
        .zip(proba.iter())
        .map(|((driver, row), &p)| PredictionRow {
            full_name: driver.clone(),
            grid_position: row["GridPosition"],
            driver_recent_form: row["driver_recent_form"],
            driver_win_percentage: row["driver_win_percentage"],
            driver_podium_rate: row["driver_podium_rate"],
            team_win_percentage: row["team_win_percentage"],
            driver_dnf_rate: row["driver_dnf_rate"],
            driver_races_competed: row["driver_races_competed"],
            win_probability: p,
        })
        .collect();

    // Le livrable est le classement, pas les probabilités brutes.
    predictions.sort_by(|a, b| {
        b.win_probability
            .partial_cmp(&a.win_probability)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    Ok(predictions)
}

/// Partants : tous les pilotes vus dans la saison cible (politique
/// enregistrée), ou la liste du fichier de grilles (politique manuelle).
fn entrants(all: &[RaceResult], season: u16, grid_policy: &GridPolicy) -> Vec<String> {
    match grid_policy {
        GridPolicy::Manual(grids) => grids.iter().map(|(name, _)| name.clone()).collect(),
        GridPolicy::Recorded => {
            let mut seen = Vec::new();
            for row in all.iter().filter(|r| r.season == season) {
                if !seen.contains(&row.full_name) {
                    seen.push(row.full_name.clone());
                }
            }
            seen
        }
    }
}

/// Écurie actuelle d'un pilote : sa plus récente apparition dans la table.
fn current_team<'a>(all: &'a [RaceResult], driver: &str) -> Option<&'a str> {
    all.iter()
        .rev()
        .find(|r| r.full_name == driver)
        .map(|r| r.team_name.as_str())
}

/// Outsiders : taux de victoire historique sous le seuil mais probabilité
/// prédite au-dessus. Annotation d'affichage, pas une sortie du modèle.
pub fn dark_horses(predictions: &[PredictionRow]) -> Vec<&PredictionRow> {
    predictions
        .iter()
        .filter(|p| {
            p.driver_win_percentage < DARK_HORSE_MAX_WIN_PCT
                && p.win_probability > DARK_HORSE_MIN_PROBA
        })
        .collect()
}

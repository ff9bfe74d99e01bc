use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Statut exact renvoyé par la télémétrie pour une arrivée classée.
/// Tout autre statut ("Engine", "Collision", "+1 Lap", ...) compte comme abandon.
pub const FINISHED_STATUS: &str = "Finished";

/// Sentinelle pour une position d'arrivée absente (abandon / non classé).
pub const POSITION_SENTINEL: f64 = 999.0;

/// Position de grille par défaut quand aucune information n'est disponible.
pub const GRID_DEFAULT: f64 = 20.0;

/// Une ligne de résultat de course : un pilote, une course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceResult {
    #[serde(rename = "Abbreviation")]
    pub abbreviation: String,
    #[serde(rename = "FullName")]
    pub full_name: String,
    #[serde(rename = "TeamName")]
    pub team_name: String,
    /// Position d'arrivée (1..N) ; None = abandon / non classé.
    #[serde(rename = "Position")]
    pub position: Option<f64>,
    #[serde(rename = "GridPosition")]
    pub grid_position: Option<f64>,
    #[serde(rename = "Points")]
    pub points: Option<f64>,
    #[serde(rename = "Status")]
    pub status: String,
    #[serde(rename = "Season")]
    pub season: u16,
    #[serde(rename = "Round")]
    pub round: u8,
    #[serde(rename = "RaceName")]
    pub race_name: String,
}

impl RaceResult {
    pub fn is_finished(&self) -> bool {
        self.status == FINISHED_STATUS
    }

    pub fn is_win(&self) -> bool {
        self.position == Some(1.0)
    }

    pub fn is_podium(&self) -> bool {
        matches!(self.position, Some(p) if p <= 3.0)
    }
}

/// Tri chronologique : saison puis manche. Le tri est stable, l'ordre
/// d'arrivée des pilotes à l'intérieur d'une course est conservé.
pub fn sort_chronological(rows: &mut [RaceResult]) {
    rows.sort_by_key(|r| (r.season, r.round));
}

/// Vérifie les invariants d'une table de résultats :
/// nom de pilote unique par (saison, manche), au plus un vainqueur par course,
/// et une position absente implique un statut d'abandon.
pub fn validate_results(rows: &[RaceResult]) -> Result<()> {
    let mut seen: HashSet<(u16, u8, &str)> = HashSet::new();
    let mut winners: HashMap<(u16, u8), u32> = HashMap::new();

    for row in rows {
        if !seen.insert((row.season, row.round, row.full_name.as_str())) {
            bail!(
                "Pilote en double : {} (saison {}, manche {})",
                row.full_name,
                row.season,
                row.round
            );
        }
        if row.is_win() {
            let count = winners.entry((row.season, row.round)).or_insert(0);
            *count += 1;
            if *count > 1 {
                bail!(
                    "Plusieurs vainqueurs pour la saison {}, manche {}",
                    row.season,
                    row.round
                );
            }
        }
        if row.position.is_none() && row.is_finished() {
            bail!(
                "Position absente avec statut « {} » : {} (saison {}, manche {})",
                FINISHED_STATUS,
                row.full_name,
                row.season,
                row.round
            );
        }
    }
    Ok(())
}

/// Ligne de résultat enrichie des 7 colonnes dérivées.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineeredRow {
    #[serde(rename = "Abbreviation")]
    pub abbreviation: String,
    #[serde(rename = "FullName")]
    pub full_name: String,
    #[serde(rename = "TeamName")]
    pub team_name: String,
    #[serde(rename = "Position")]
    pub position: Option<f64>,
    #[serde(rename = "GridPosition")]
    pub grid_position: Option<f64>,
    #[serde(rename = "Points")]
    pub points: Option<f64>,
    #[serde(rename = "Status")]
    pub status: String,
    #[serde(rename = "Season")]
    pub season: u16,
    #[serde(rename = "Round")]
    pub round: u8,
    #[serde(rename = "RaceName")]
    pub race_name: String,
    /// Moyenne des 5 dernières arrivées classées ; None si aucune.
    pub driver_recent_form: Option<f64>,
    pub driver_win_percentage: f64,
    pub team_win_percentage: f64,
    pub starting_position_quality: f64,
    pub driver_dnf_rate: f64,
    pub driver_podium_rate: f64,
    pub driver_races_competed: u32,
}

/// Ligne nettoyée : plus aucune valeur manquante, types numériques resserrés.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanedRow {
    #[serde(rename = "Abbreviation")]
    pub abbreviation: String,
    #[serde(rename = "FullName")]
    pub full_name: String,
    #[serde(rename = "TeamName")]
    pub team_name: String,
    #[serde(rename = "Position")]
    pub position: f32,
    #[serde(rename = "GridPosition")]
    pub grid_position: f32,
    #[serde(rename = "Points")]
    pub points: f32,
    #[serde(rename = "Status")]
    pub status: String,
    #[serde(rename = "Season")]
    pub season: i16,
    #[serde(rename = "Round")]
    pub round: i8,
    #[serde(rename = "RaceName")]
    pub race_name: String,
    pub driver_recent_form: f32,
    pub driver_win_percentage: f32,
    pub team_win_percentage: f32,
    pub starting_position_quality: f32,
    pub driver_dnf_rate: f32,
    pub driver_podium_rate: f32,
    pub driver_races_competed: u32,
    pub is_winner: i8,
}

impl CleanedRow {
    /// Revient à la vue « résultat de course » : la sentinelle 999 redevient
    /// une position absente, ce qui permet aux agrégations de partager le
    /// même code avant et après nettoyage.
    pub fn to_result(&self) -> RaceResult {
        RaceResult {
            abbreviation: self.abbreviation.clone(),
            full_name: self.full_name.clone(),
            team_name: self.team_name.clone(),
            position: if self.position >= POSITION_SENTINEL as f32 {
                None
            } else {
                Some(self.position as f64)
            },
            grid_position: Some(self.grid_position as f64),
            points: Some(self.points as f64),
            status: self.status.clone(),
            season: self.season as u16,
            round: self.round as u8,
            race_name: self.race_name.clone(),
        }
    }
}

/// Ligne de la table de prédiction finale, dans l'ordre de colonnes publié.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRow {
    #[serde(rename = "FullName")]
    pub full_name: String,
    #[serde(rename = "GridPosition")]
    pub grid_position: f64,
    pub driver_recent_form: f64,
    pub driver_win_percentage: f64,
    pub driver_podium_rate: f64,
    pub team_win_percentage: f64,
    pub driver_dnf_rate: f64,
    pub driver_races_competed: f64,
    pub win_probability: f64,
}

/// Fiche pilote statique servie par l'API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverRecord {
    #[serde(rename = "FullName")]
    pub full_name: String,
    #[serde(rename = "TeamName")]
    pub team_name: String,
    #[serde(rename = "Number")]
    pub number: u8,
    #[serde(rename = "Country")]
    pub country: String,
}

/// Vue d'ensemble d'une table combinée, pour l'affichage.
#[derive(Debug, Clone)]
pub struct DatasetSummary {
    pub total_rows: usize,
    pub first_season: u16,
    pub last_season: u16,
    pub race_count: usize,
    pub driver_count: usize,
    pub team_count: usize,
}

impl DatasetSummary {
    pub fn from_rows(rows: &[RaceResult]) -> Option<Self> {
        if rows.is_empty() {
            return None;
        }
        let races: HashSet<(u16, u8)> = rows.iter().map(|r| (r.season, r.round)).collect();
        let drivers: HashSet<&str> = rows.iter().map(|r| r.full_name.as_str()).collect();
        let teams: HashSet<&str> = rows.iter().map(|r| r.team_name.as_str()).collect();
        Some(Self {
            total_rows: rows.len(),
            first_season: rows.iter().map(|r| r.season).min().unwrap_or_default(),
            last_season: rows.iter().map(|r| r.season).max().unwrap_or_default(),
            race_count: races.len(),
            driver_count: drivers.len(),
            team_count: teams.len(),
        })
    }
}

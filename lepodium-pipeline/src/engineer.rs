use lepodium_store::models::{sort_chronological, EngineeredRow, RaceResult, GRID_DEFAULT};

use crate::aggregate::{driver_aggregates, team_aggregates, RACES_BACK};

/// Ingénierie des features « globale » : les statistiques de chaque pilote
/// et de chaque écurie sont calculées sur la table ENTIÈRE, y compris les
/// courses postérieures à la ligne enrichie. C'est le comportement
/// historique du jeu d'entraînement, conservé tel quel ; la variante sans
/// fuite du futur est `predict::predict_race`, qui passe aux mêmes
/// agrégations la tranche avant-cible uniquement.
pub fn engineer_features(mut rows: Vec<RaceResult>) -> Vec<EngineeredRow> {
    sort_chronological(&mut rows);

    let drivers = driver_aggregates(&rows);
    let teams = team_aggregates(&rows);

    rows.into_iter()
        .map(|row| {
            let driver = &drivers[&row.full_name];
            let team = &teams[&row.team_name];
            EngineeredRow {
                driver_recent_form: driver.recent_form(RACES_BACK),
                driver_win_percentage: driver.win_percentage(),
                team_win_percentage: team.win_percentage(),
                starting_position_quality: row.grid_position.unwrap_or(GRID_DEFAULT),
                driver_dnf_rate: driver.dnf_percentage(),
                driver_podium_rate: driver.podium_percentage(),
                driver_races_competed: driver.entries,
                abbreviation: row.abbreviation,
                full_name: row.full_name,
                team_name: row.team_name,
                position: row.position,
                grid_position: row.grid_position,
                points: row.points,
                status: row.status,
                season: row.season,
                round: row.round,
                race_name: row.race_name,
            }
        })
        .collect()
}

use anyhow::{bail, Result};

use lepodium_store::models::{CleanedRow, EngineeredRow, POSITION_SENTINEL};

/// Sentinelle pour une forme récente inconnue (aucune arrivée classée).
/// La même valeur que côté prédiction, pour qu'un pilote sans historique
/// ait le même profil dans les deux chemins.
pub const FORM_SENTINEL: f64 = 999.0;

/// Nettoyage : remplissages, écrêtage des taux, étiquette binaire,
/// resserrement des types. Chaque transformation est un no-op sur des
/// données déjà nettoyées, le nettoyage est donc idempotent.
pub fn clean(rows: &[EngineeredRow]) -> Result<Vec<CleanedRow>> {
    // Médiane des positions de grille connues, pour remplir les absentes.
    let mut known_grids: Vec<f64> = rows.iter().filter_map(|r| r.grid_position).collect();
    let median_grid = median(&mut known_grids);

    let mut cleaned = Vec::with_capacity(rows.len());
    for row in rows {
        // L'étiquette se lit sur la position d'origine : la sentinelle 999
        // ne peut jamais valoir 1, mais autant ne pas en dépendre.
        let is_winner = i8::from(row.position == Some(1.0));

        let grid_position = match row.grid_position {
            Some(g) => g,
            None => match median_grid {
                Some(m) => m,
                None => bail!("Aucune position de grille connue : médiane incalculable"),
            },
        };

        cleaned.push(CleanedRow {
            abbreviation: row.abbreviation.clone(),
            full_name: row.full_name.clone(),
            team_name: row.team_name.clone(),
            position: row.position.unwrap_or(POSITION_SENTINEL) as f32,
            grid_position: grid_position as f32,
            points: row.points.unwrap_or(0.0) as f32,
            status: row.status.clone(),
            season: row.season as i16,
            round: row.round as i8,
            race_name: row.race_name.clone(),
            driver_recent_form: row.driver_recent_form.unwrap_or(FORM_SENTINEL) as f32,
            driver_win_percentage: clip_rate(row.driver_win_percentage),
            team_win_percentage: clip_rate(row.team_win_percentage),
            starting_position_quality: row.starting_position_quality as f32,
            driver_dnf_rate: clip_rate(row.driver_dnf_rate),
            driver_podium_rate: clip_rate(row.driver_podium_rate),
            driver_races_competed: row.driver_races_competed,
            is_winner,
        });
    }

    verify_no_missing(&cleaned)?;
    Ok(cleaned)
}

/// Les taux vivent dans [0, 100].
fn clip_rate(rate: f64) -> f32 {
    rate.clamp(0.0, 100.0) as f32
}

/// Médiane à la façon des dataframes : moyenne des deux valeurs centrales
/// pour un effectif pair. None sur une tranche vide.
fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        Some(values[mid])
    } else {
        Some((values[mid - 1] + values[mid]) / 2.0)
    }
}

/// Contrôle d'intégrité final : après les remplissages, plus aucune valeur
/// manquante (NaN) ne doit subsister. Fatal sinon.
pub fn verify_no_missing(rows: &[CleanedRow]) -> Result<()> {
    for (i, row) in rows.iter().enumerate() {
        let columns: [(&str, f32); 8] = [
            ("Position", row.position),
            ("GridPosition", row.grid_position),
            ("Points", row.points),
            ("driver_recent_form", row.driver_recent_form),
            ("driver_win_percentage", row.driver_win_percentage),
            ("team_win_percentage", row.team_win_percentage),
            ("driver_dnf_rate", row.driver_dnf_rate),
            ("driver_podium_rate", row.driver_podium_rate),
        ];
        for (name, value) in columns {
            if value.is_nan() {
                bail!(
                    "Valeur manquante après nettoyage : colonne {}, ligne {} ({})",
                    name,
                    i,
                    row.full_name
                );
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engineered(
        name: &str,
        position: Option<f64>,
        grid: Option<f64>,
        points: Option<f64>,
    ) -> EngineeredRow {
        EngineeredRow {
            abbreviation: "ABC".to_string(),
            full_name: name.to_string(),
            team_name: "Ecurie".to_string(),
            position,
            grid_position: grid,
            points,
            status: if position.is_some() {
                "Finished".to_string()
            } else {
                "Engine".to_string()
            },
            season: 2024,
            round: 1,
            race_name: "Grand Prix".to_string(),
            driver_recent_form: Some(4.0),
            driver_win_percentage: 10.0,
            team_win_percentage: 20.0,
            starting_position_quality: grid.unwrap_or(20.0),
            driver_dnf_rate: 30.0,
            driver_podium_rate: 40.0,
            driver_races_competed: 12,
        }
    }

    fn back_to_engineered(row: &CleanedRow) -> EngineeredRow {
        EngineeredRow {
            abbreviation: row.abbreviation.clone(),
            full_name: row.full_name.clone(),
            team_name: row.team_name.clone(),
            position: Some(row.position as f64),
            grid_position: Some(row.grid_position as f64),
            points: Some(row.points as f64),
            status: row.status.clone(),
            season: row.season as u16,
            round: row.round as u8,
            race_name: row.race_name.clone(),
            driver_recent_form: Some(row.driver_recent_form as f64),
            driver_win_percentage: row.driver_win_percentage as f64,
            team_win_percentage: row.team_win_percentage as f64,
            starting_position_quality: row.starting_position_quality as f64,
            driver_dnf_rate: row.driver_dnf_rate as f64,
            driver_podium_rate: row.driver_podium_rate as f64,
            driver_races_competed: row.driver_races_competed,
        }
    }

    #[test]
    fn test_fills_position_grid_points() {
        let rows = vec![
            engineered("Alice", Some(1.0), Some(2.0), Some(25.0)),
            engineered("Bob", None, None, None),
            engineered("Carol", Some(3.0), Some(6.0), Some(15.0)),
        ];
        let cleaned = clean(&rows).unwrap();

        assert_eq!(cleaned[1].position, 999.0);
        // Médiane des grilles connues (2, 6) = 4.
        assert_eq!(cleaned[1].grid_position, 4.0);
        assert_eq!(cleaned[1].points, 0.0);
    }

    #[test]
    fn test_is_winner_from_original_position() {
        let rows = vec![
            engineered("Alice", Some(1.0), Some(1.0), Some(25.0)),
            engineered("Bob", Some(2.0), Some(2.0), Some(18.0)),
            engineered("Carol", None, Some(3.0), None),
        ];
        let cleaned = clean(&rows).unwrap();
        assert_eq!(cleaned[0].is_winner, 1);
        assert_eq!(cleaned[1].is_winner, 0);
        assert_eq!(cleaned[2].is_winner, 0);
    }

    #[test]
    fn test_clips_adversarial_rates() {
        let mut row = engineered("Alice", Some(1.0), Some(1.0), Some(25.0));
        row.driver_win_percentage = 150.0;
        row.team_win_percentage = -3.0;
        row.driver_dnf_rate = 100.0001;
        row.driver_podium_rate = 55.5;
        let cleaned = clean(&[row]).unwrap();

        assert_eq!(cleaned[0].driver_win_percentage, 100.0);
        assert_eq!(cleaned[0].team_win_percentage, 0.0);
        assert_eq!(cleaned[0].driver_dnf_rate, 100.0);
        assert_eq!(cleaned[0].driver_podium_rate, 55.5);
    }

    #[test]
    fn test_missing_form_gets_sentinel() {
        let mut row = engineered("Alice", None, Some(5.0), None);
        row.driver_recent_form = None;
        let cleaned = clean(&[row]).unwrap();
        assert_eq!(cleaned[0].driver_recent_form, 999.0);
    }

    #[test]
    fn test_no_known_grid_is_fatal() {
        let rows = vec![engineered("Alice", Some(1.0), None, Some(25.0))];
        let err = clean(&rows).unwrap_err();
        assert!(err.to_string().contains("médiane"), "{err}");
    }

    #[test]
    fn test_idempotent_on_clean_data() {
        let rows = vec![
            engineered("Alice", Some(1.0), Some(2.0), Some(25.0)),
            engineered("Bob", None, None, None),
            engineered("Carol", Some(3.0), Some(6.0), Some(15.0)),
        ];
        let once = clean(&rows).unwrap();
        let twice_input: Vec<EngineeredRow> = once.iter().map(back_to_engineered).collect();
        let twice = clean(&twice_input).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_median_odd_and_even() {
        assert_eq!(median(&mut [3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&mut [4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median(&mut []), None);
    }

    #[test]
    fn test_verify_no_missing_detects_nan() {
        let rows = vec![engineered("Alice", Some(1.0), Some(2.0), Some(25.0))];
        let mut cleaned = clean(&rows).unwrap();
        cleaned[0].driver_recent_form = f32::NAN;
        let err = verify_no_missing(&cleaned).unwrap_err();
        assert!(err.to_string().contains("driver_recent_form"), "{err}");
    }

    #[test]
    fn test_empty_table() {
        assert!(clean(&[]).unwrap().is_empty());
    }
}

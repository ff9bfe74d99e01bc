use std::collections::HashMap;

use lepodium_store::models::RaceResult;

/// Profondeur de la forme récente : moyenne des k dernières arrivées classées.
pub const RACES_BACK: usize = 5;

/// Statistiques cumulées d'un pilote sur une tranche d'historique.
/// La tranche passée à `driver_aggregates` définit la portée : la table
/// entière pour l'ingénierie globale, la tranche avant-cible pour la
/// prédiction. Le calcul est identique dans les deux cas.
#[derive(Debug, Clone, Default)]
pub struct DriverAggregate {
    pub entries: u32,
    pub wins: u32,
    pub podiums: u32,
    pub dnfs: u32,
    /// Arrivées classées, dans l'ordre chronologique de la tranche.
    pub positions: Vec<f64>,
    grid_sum: f64,
    grid_count: u32,
}

impl DriverAggregate {
    pub fn win_percentage(&self) -> f64 {
        percentage(self.wins, self.entries)
    }

    pub fn podium_percentage(&self) -> f64 {
        percentage(self.podiums, self.entries)
    }

    pub fn dnf_percentage(&self) -> f64 {
        percentage(self.dnfs, self.entries)
    }

    /// Moyenne des `races_back` dernières arrivées classées ; None si le
    /// pilote n'a aucune arrivée classée dans la tranche.
    pub fn recent_form(&self, races_back: usize) -> Option<f64> {
        if self.positions.is_empty() {
            return None;
        }
        let start = self.positions.len().saturating_sub(races_back);
        let window = &self.positions[start..];
        Some(window.iter().sum::<f64>() / window.len() as f64)
    }

    pub fn average_grid(&self) -> Option<f64> {
        if self.grid_count == 0 {
            None
        } else {
            Some(self.grid_sum / self.grid_count as f64)
        }
    }
}

/// Statistiques cumulées d'une écurie sur une tranche d'historique.
#[derive(Debug, Clone, Default)]
pub struct TeamAggregate {
    pub entries: u32,
    pub wins: u32,
}

impl TeamAggregate {
    pub fn win_percentage(&self) -> f64 {
        percentage(self.wins, self.entries)
    }
}

fn percentage(count: u32, total: u32) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}

/// Réduction groupée par pilote. Les lignes doivent être triées par
/// (saison, manche) : l'ordre des positions en dépend.
pub fn driver_aggregates(rows: &[RaceResult]) -> HashMap<String, DriverAggregate> {
    let mut map: HashMap<String, DriverAggregate> = HashMap::new();
    for row in rows {
        let agg = map.entry(row.full_name.clone()).or_default();
        agg.entries += 1;
        if row.is_win() {
            agg.wins += 1;
        }
        if row.is_podium() {
            agg.podiums += 1;
        }
        if !row.is_finished() {
            agg.dnfs += 1;
        }
        if let Some(p) = row.position {
            agg.positions.push(p);
        }
        if let Some(g) = row.grid_position {
            agg.grid_sum += g;
            agg.grid_count += 1;
        }
    }
    map
}

/// Réduction groupée par écurie.
pub fn team_aggregates(rows: &[RaceResult]) -> HashMap<String, TeamAggregate> {
    let mut map: HashMap<String, TeamAggregate> = HashMap::new();
    for row in rows {
        let agg = map.entry(row.team_name.clone()).or_default();
        agg.entries += 1;
        if row.is_win() {
            agg.wins += 1;
        }
    }
    map
}

/// Ligne de résultat synthétique pour les tests du pipeline.
pub fn make_race_row(
    name: &str,
    team: &str,
    season: u16,
    round: u8,
    position: Option<f64>,
    grid: Option<f64>,
) -> RaceResult {
    RaceResult {
        abbreviation: name.chars().take(3).collect::<String>().to_uppercase(),
        full_name: name.to_string(),
        team_name: team.to_string(),
        position,
        grid_position: grid,
        points: Some(0.0),
        status: if position.is_some() {
            lepodium_store::models::FINISHED_STATUS.to_string()
        } else {
            "Collision".to_string()
        },
        season,
        round,
        race_name: "Grand Prix".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn race_row(
        name: &str,
        team: &str,
        season: u16,
        round: u8,
        position: Option<f64>,
        grid: Option<f64>,
    ) -> RaceResult {
        make_race_row(name, team, season, round, position, grid)
    }

    #[test]
    fn test_driver_three_races_one_win_one_dnf() {
        // Un pilote, trois courses : victoire, 5e place, abandon.
        let rows = vec![
            race_row("Alice", "Rouge", 2024, 1, Some(1.0), Some(1.0)),
            race_row("Alice", "Rouge", 2024, 2, Some(5.0), Some(3.0)),
            race_row("Alice", "Rouge", 2024, 3, None, Some(2.0)),
        ];
        let aggs = driver_aggregates(&rows);
        let alice = &aggs["Alice"];

        assert_eq!(alice.entries, 3);
        assert!((alice.win_percentage() - 100.0 / 3.0).abs() < 1e-9);
        assert!((alice.podium_percentage() - 100.0 / 3.0).abs() < 1e-9);
        assert!((alice.dnf_percentage() - 100.0 / 3.0).abs() < 1e-9);
        assert_eq!(alice.recent_form(RACES_BACK), Some(3.0));
        assert_eq!(alice.average_grid(), Some(2.0));
    }

    #[test]
    fn test_recent_form_window() {
        let rows: Vec<RaceResult> = (1..=8)
            .map(|i| race_row("Alice", "Rouge", 2024, i, Some(i as f64), None))
            .collect();
        let aggs = driver_aggregates(&rows);
        // Positions 4..8 sur une fenêtre de 5 : moyenne 6.
        assert_eq!(aggs["Alice"].recent_form(5), Some(6.0));
        // Fenêtre plus large que l'historique : moyenne de tout.
        assert_eq!(aggs["Alice"].recent_form(100), Some(4.5));
    }

    #[test]
    fn test_recent_form_ignores_dnf() {
        let rows = vec![
            race_row("Alice", "Rouge", 2024, 1, Some(2.0), None),
            race_row("Alice", "Rouge", 2024, 2, None, None),
            race_row("Alice", "Rouge", 2024, 3, Some(4.0), None),
        ];
        let aggs = driver_aggregates(&rows);
        assert_eq!(aggs["Alice"].recent_form(5), Some(3.0));
    }

    #[test]
    fn test_all_dnf_driver_has_no_form() {
        let rows = vec![
            race_row("Alice", "Rouge", 2024, 1, None, None),
            race_row("Alice", "Rouge", 2024, 2, None, None),
        ];
        let aggs = driver_aggregates(&rows);
        let alice = &aggs["Alice"];
        assert_eq!(alice.recent_form(RACES_BACK), None);
        assert_eq!(alice.average_grid(), None);
        assert!((alice.dnf_percentage() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_team_aggregates_group_both_cars() {
        let rows = vec![
            race_row("Alice", "Rouge", 2024, 1, Some(1.0), None),
            race_row("Bob", "Rouge", 2024, 1, Some(4.0), None),
            race_row("Carol", "Bleue", 2024, 1, Some(2.0), None),
        ];
        let aggs = team_aggregates(&rows);
        assert_eq!(aggs["Rouge"].entries, 2);
        assert_eq!(aggs["Rouge"].wins, 1);
        assert!((aggs["Rouge"].win_percentage() - 50.0).abs() < 1e-9);
        assert!((aggs["Bleue"].win_percentage() - 0.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_slice() {
        assert!(driver_aggregates(&[]).is_empty());
        assert!(team_aggregates(&[]).is_empty());
    }
}

/// Calendrier figé : nombre de manches par saison couverte. La collecte
/// interroge chaque (saison, manche) de ce calendrier ; une manche
/// annulée ou vide est simplement sautée.
pub const SEASON_ROUNDS: &[(u16, u8)] = &[
    (2020, 17),
    (2021, 22),
    (2022, 22),
    (2023, 22),
    (2024, 24),
    (2025, 24),
];

pub fn full_schedule(season_filter: Option<u16>) -> Vec<(u16, u8)> {
    let mut schedule = Vec::new();
    for &(season, rounds) in SEASON_ROUNDS {
        if let Some(filter) = season_filter {
            if season != filter {
                continue;
            }
        }
        for round in 1..=rounds {
            schedule.push((season, round));
        }
    }
    schedule
}

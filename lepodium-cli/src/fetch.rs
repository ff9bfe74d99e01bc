use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;

use lepodium_store::models::RaceResult;
use lepodium_store::store::Store;

/// Source de télémétrie compatible Ergast.
pub const BASE_URL: &str = "https://api.jolpi.ca/ergast/f1";

/// Pause entre deux requêtes, pour ne pas marteler la source.
pub const REQUEST_DELAY_MS: u64 = 300;

/// Bilan d'une collecte, dans l'esprit d'un import : on compte, on ne
/// s'arrête pas.
#[derive(Debug, Default)]
pub struct FetchReport {
    pub downloaded: u32,
    pub skipped: u32,
    pub total_rows: u32,
}

// Charge utile Ergast, réduite aux champs utilisés.
#[derive(Debug, Deserialize)]
struct ErgastResponse {
    #[serde(rename = "MRData")]
    mr_data: MrData,
}

#[derive(Debug, Deserialize)]
struct MrData {
    #[serde(rename = "RaceTable")]
    race_table: RaceTable,
}

#[derive(Debug, Deserialize)]
struct RaceTable {
    #[serde(rename = "Races")]
    races: Vec<Race>,
}

#[derive(Debug, Deserialize)]
struct Race {
    #[serde(rename = "raceName")]
    race_name: String,
    #[serde(rename = "Results", default)]
    results: Vec<ErgastResult>,
}

#[derive(Debug, Deserialize)]
struct ErgastResult {
    #[serde(rename = "positionText")]
    position_text: String,
    grid: String,
    points: String,
    status: String,
    #[serde(rename = "Driver")]
    driver: ErgastDriver,
    #[serde(rename = "Constructor")]
    constructor: ErgastConstructor,
}

#[derive(Debug, Deserialize)]
struct ErgastDriver {
    code: Option<String>,
    #[serde(rename = "givenName")]
    given_name: String,
    #[serde(rename = "familyName")]
    family_name: String,
}

#[derive(Debug, Deserialize)]
struct ErgastConstructor {
    name: String,
}

/// Transforme la charge utile d'une manche en lignes de résultats.
/// None si la source ne connaît pas (encore) cette manche.
pub fn parse_race_payload(
    season: u16,
    round: u8,
    payload: &str,
) -> Result<Option<(String, Vec<RaceResult>)>> {
    let response: ErgastResponse =
        serde_json::from_str(payload).context("Charge utile Ergast invalide")?;

    let race = match response.mr_data.race_table.races.into_iter().next() {
        Some(race) if !race.results.is_empty() => race,
        _ => return Ok(None),
    };

    let rows = race
        .results
        .into_iter()
        .map(|r| {
            let abbreviation = r.driver.code.unwrap_or_else(|| {
                r.driver
                    .family_name
                    .chars()
                    .take(3)
                    .collect::<String>()
                    .to_uppercase()
            });
            RaceResult {
                abbreviation,
                full_name: format!("{} {}", r.driver.given_name, r.driver.family_name),
                team_name: r.constructor.name,
                // « R », « D », « W »... : pas de position d'arrivée.
                position: r.position_text.parse::<f64>().ok(),
                grid_position: r.grid.parse::<f64>().ok(),
                points: r.points.parse::<f64>().ok(),
                status: r.status,
                season,
                round,
                race_name: race.race_name.clone(),
            }
        })
        .collect();

    Ok(Some((race.race_name, rows)))
}

fn fetch_round(
    client: &reqwest::blocking::Client,
    base_url: &str,
    season: u16,
    round: u8,
) -> Result<Option<(String, Vec<RaceResult>)>> {
    let url = format!("{}/{}/{}/results.json", base_url, season, round);
    let payload = client
        .get(&url)
        .send()
        .with_context(|| format!("Requête échouée : {}", url))?
        .error_for_status()
        .with_context(|| format!("Réponse en erreur : {}", url))?
        .text()
        .with_context(|| format!("Corps illisible : {}", url))?;
    parse_race_payload(season, round, &payload)
}

/// Collecte toutes les manches du calendrier donné, un fichier par course.
/// Les erreurs par manche sont comptées et sautées, jamais fatales : la
/// source est réputée peu fiable.
pub fn fetch_all(
    store: &Store,
    schedule: &[(u16, u8)],
    delay_ms: u64,
) -> Result<FetchReport> {
    store.ensure_dir()?;
    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .context("Impossible de construire le client HTTP")?;

    let bar = ProgressBar::new(schedule.len() as u64);
    bar.set_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let mut report = FetchReport::default();
    for &(season, round) in schedule {
        match fetch_round(&client, BASE_URL, season, round) {
            Ok(Some((race_name, rows))) => {
                store.write_csv(&Store::race_file_name(season, round), &rows)?;
                report.downloaded += 1;
                report.total_rows += rows.len() as u32;
                bar.set_message(format!("{} {} ({} pilotes)", season, race_name, rows.len()));
            }
            Ok(None) => {
                report.skipped += 1;
                bar.set_message(format!("{} manche {} : aucune donnée", season, round));
            }
            Err(e) => {
                report.skipped += 1;
                bar.set_message(format!("{} manche {} : erreur", season, round));
                eprintln!("Erreur saison {} manche {} : {:#}", season, round, e);
            }
        }
        bar.inc(1);
        std::thread::sleep(Duration::from_millis(delay_ms));
    }
    bar.finish_and_clear();

    Ok(report)
}

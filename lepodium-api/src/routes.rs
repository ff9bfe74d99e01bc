use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use tower_http::cors::CorsLayer;

use lepodium_store::models::{DriverRecord, PredictionRow};
use lepodium_store::store::{Store, DRIVERS_FILE, PREDICTIONS_FILE};

#[derive(Clone)]
pub struct AppState {
    store: Arc<Store>,
}

/// Routeur en lecture seule : les fichiers sont produits hors-ligne par le
/// pipeline, l'API se contente de les relire à chaque requête.
pub fn router(store: Store) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/predictions", get(predictions))
        .route("/api/drivers", get(drivers))
        .route("/api/race-info", get(race_info))
        .layer(CorsLayer::permissive())
        .with_state(AppState {
            store: Arc::new(store),
        })
}

/// Un artefact absent ou illisible vaut 500 pour la requête concernée,
/// jamais un arrêt du processus.
struct ApiError(anyhow::Error);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::error!("lecture d'artefact échouée : {:#}", self.0);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        Self(e)
    }
}

async fn index() -> &'static str {
    "F1 Winner Predictor API is running."
}

#[derive(Debug, Serialize)]
struct PredictionOut {
    name: String,
    probability: f64,
}

/// Projection de la table de prédiction, dans l'ordre du fichier.
async fn predictions(State(state): State<AppState>) -> Result<Json<Vec<PredictionOut>>, ApiError> {
    let rows: Vec<PredictionRow> = state.store.read_csv(PREDICTIONS_FILE)?;
    let out = rows
        .into_iter()
        .map(|r| PredictionOut {
            name: r.full_name,
            probability: r.win_probability,
        })
        .collect();
    Ok(Json(out))
}

async fn drivers(State(state): State<AppState>) -> Result<Json<Vec<DriverRecord>>, ApiError> {
    let rows: Vec<DriverRecord> = state.store.read_csv(DRIVERS_FILE)?;
    Ok(Json(rows))
}

async fn race_info() -> Json<serde_json::Value> {
    Json(json!({
        "name": "Las Vegas Grand Prix 2025",
        "circuit_length": "6.12 km",
        "laps": 50,
        "distance": "306 km",
        "track_map": "https://www.formula1.com/content/dam/fom-website/manual/Misc/Track%20maps/LasVegas_Circuit.png",
        "highlights": "The race returned to F1 in 2023 after decades of absence, quickly becoming a fan favorite due to its vibrant atmosphere and night-time setting.",
        "description": "The Las Vegas Grand Prix is a spectacular night race held on the streets of Las Vegas. The circuit combines a high-speed oval section with tight corners on the city streets, presenting unique challenges to drivers and teams.",
    }))
}

use anyhow::Result;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{
    Router,
    extract::{Path, State},
    response::Json,
    routing::get,
};
use data_ingestion::StoreError;
use data_ingestion::store::PredictionStore;
use log::{error, info};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::misc::{PredictionView, to_views};
use crate::trend::{TrendSummary, summarize};

/// Read-only access to recorded predictions.
#[derive(Clone)]
struct AppState {
    predictions: Arc<dyn PredictionStore>,
}

struct ApiError(StoreError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!("Prediction query failed: {}", self.0);
        let body = Json(json!({ "error": self.0.to_string() }));
        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}

/// GET /predictions/{instrument_id} returns the labelled prediction history.
async fn get_predictions(
    State(state): State<AppState>,
    Path(instrument_id): Path<String>,
) -> Result<Json<Vec<PredictionView>>, ApiError> {
    let history = state
        .predictions
        .fetch_predictions(&instrument_id)
        .await
        .map_err(ApiError)?;
    Ok(Json(to_views(&history)))
}

/// GET /summary/{instrument_id} returns trend agreement counts and the latest outlook.
async fn get_summary(
    State(state): State<AppState>,
    Path(instrument_id): Path<String>,
) -> Result<Json<TrendSummary>, ApiError> {
    let history = state
        .predictions
        .fetch_predictions(&instrument_id)
        .await
        .map_err(ApiError)?;
    Ok(Json(summarize(&history)))
}

pub struct Server {
    state: AppState,
    addr: SocketAddr,
}

impl Server {
    pub fn init(predictions: Arc<dyn PredictionStore>, addr: SocketAddr) -> Self {
        Self {
            state: AppState { predictions },
            addr,
        }
    }

    fn router(&self) -> Router {
        Router::new()
            .route("/predictions/{instrument_id}", get(get_predictions))
            .route("/summary/{instrument_id}", get(get_summary))
            .with_state(self.state.clone())
    }

    pub async fn run(self) -> Result<()> {
        let app = self.router();
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        info!("HTTP server running on {}", self.addr);
        axum::serve(listener, app).await?;
        Ok(())
    }
}

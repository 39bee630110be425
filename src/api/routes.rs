use axum::{
    routing::{get, post},
    Router,
    extract::{rejection::JsonRejection, Json, Query, State},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::time::Instant;
use tower_http::cors::{CorsLayer, Any};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::error::{Result, AppError};
use crate::api::models::{
    HealthResponse, SocialCaption, SocialSynthesizeRequest, SynthesizeRequest,
    SynthesizeResponse, UrlQuery,
};
use crate::api::response;
use crate::extract::ExtractReport;
use crate::social::extract_caption;
use crate::synth::SynthesisInput;
use crate::AppState;

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/extract", get(extract_handler))
        .route("/extract-social", get(extract_social_handler))
        .route("/synthesize", post(synthesize_handler))
        .route("/synthesize-social", post(synthesize_social_handler))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(app_state)
}

async fn health_handler() -> impl IntoResponse {
    response::success(HealthResponse { status: "ok" })
}

async fn extract_handler(
    State(state): State<AppState>,
    Query(query): Query<UrlQuery>,
) -> Response {
    let start_time = Instant::now();
    let result = process_extract(&state, query).await;
    finish("extract", start_time, result)
}

async fn extract_social_handler(
    State(state): State<AppState>,
    Query(query): Query<UrlQuery>,
) -> Response {
    let start_time = Instant::now();
    let result = process_extract_social(&state, query).await;
    finish("extract-social", start_time, result)
}

async fn synthesize_handler(
    State(state): State<AppState>,
    payload: std::result::Result<Json<SynthesizeRequest>, JsonRejection>,
) -> Response {
    let start_time = Instant::now();
    let result = match json_body(payload) {
        Ok(req) => process_synthesize(&state, req).await,
        Err(err) => Err(err),
    };
    finish("synthesize", start_time, result)
}

async fn synthesize_social_handler(
    State(state): State<AppState>,
    payload: std::result::Result<Json<SocialSynthesizeRequest>, JsonRejection>,
) -> Response {
    let start_time = Instant::now();
    let result = match json_body(payload) {
        Ok(req) => process_synthesize_social(&state, req).await,
        Err(err) => Err(err),
    };
    finish("synthesize-social", start_time, result)
}

/// Turn body rejections (bad JSON, wrong content type) into the usual error body.
fn json_body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    payload
        .map(|Json(req)| req)
        .map_err(|rejection| AppError::Validation(rejection.body_text()))
}

fn require_url(url: Option<String>) -> Result<String> {
    url.map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .ok_or_else(|| AppError::Validation("URL parameter is required".to_string()))
}

async fn process_extract(state: &AppState, query: UrlQuery) -> Result<ExtractReport> {
    let url = require_url(query.url)?;
    info!(url = %url, "extracting listing content");
    let report = state.extract(&url).await?;
    info!(
        url = %url,
        details = report.stats.details_count,
        features = report.stats.features_count,
        images = report.stats.images_count,
        coordinates = report.stats.coordinates_found,
        "listing content extracted"
    );
    Ok(report)
}

async fn fetch_caption(state: &AppState, url: &str) -> Result<String> {
    let html = state
        .social_fetcher
        .fetch(url)
        .await
        .map_err(AppError::into_internal)?;
    extract_caption(&html).ok_or_else(|| AppError::NotFound("No description found".to_string()))
}

async fn process_extract_social(state: &AppState, query: UrlQuery) -> Result<SocialCaption> {
    let url = require_url(query.url)?;
    info!(url = %url, "extracting social caption");
    let description = fetch_caption(state, &url).await?;
    Ok(SocialCaption { description })
}

async fn process_synthesize(state: &AppState, req: SynthesizeRequest) -> Result<SynthesizeResponse> {
    let url = require_url(req.url)?;
    let report = state
        .load_summary(&url)
        .await
        .map_err(AppError::into_internal)?;

    info!(url = %url, contract = ?state.synthesizer.contract(), "synthesizing listing");
    let result = state
        .synthesizer
        .synthesize(SynthesisInput::Summary(&report))
        .await?;
    Ok(SynthesizeResponse { result })
}

async fn process_synthesize_social(
    state: &AppState,
    req: SocialSynthesizeRequest,
) -> Result<SynthesizeResponse> {
    let caption = match req.caption.filter(|c| !c.trim().is_empty()) {
        Some(caption) => caption,
        None => {
            let url = require_url(req.url)?;
            fetch_caption(state, &url).await?
        }
    };

    info!(contract = ?state.social_synthesizer.contract(), "synthesizing listing from caption");
    let result = state
        .social_synthesizer
        .synthesize(SynthesisInput::Caption(&caption))
        .await?;
    Ok(SynthesizeResponse { result })
}

fn finish<T: Serialize>(route: &str, start_time: Instant, result: Result<T>) -> Response {
    let elapsed = start_time.elapsed();
    match result {
        Ok(data) => {
            info!(route, ?elapsed, "request completed");
            response::success(data).into_response()
        }
        Err(err) => {
            if err.status().is_client_error() {
                warn!(route, ?elapsed, error = %err, "request rejected");
            } else {
                error!(route, ?elapsed, error = %err, "request failed");
            }
            err.into_response()
        }
    }
}

//! HTTP handlers for the pricing API.
//!
//! Handlers only translate JSON to service calls and back; all rules live in
//! the services and the engine.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use uuid::Uuid;

use crate::error::Result;
use crate::AppState;

use super::queries;
use super::requests::{
    AddLineRequest, CheckoutRequest, CreateCartRequest, DistanceRequest, QuoteRequest,
    UpdateLineRequest, UpdateZipRequest, ZipCheckRequest,
};
use super::responses::{DistanceResponse, HealthResponse, OrderResponse, ZipCheckResponse};
use super::services::{self, LineChanges, NewLine};

/// Pricing and order routes
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/api/pricing/zip-check", post(zip_check))
        .route("/api/pricing/distance", post(distance))
        .route("/api/orders", post(create_cart))
        .route("/api/orders/:id", get(get_order))
        .route("/api/orders/:id/quote", post(quote))
        .route("/api/orders/:id/zip", post(update_zip))
        .route("/api/orders/:id/lines", post(add_line))
        .route(
            "/api/orders/:id/lines/:line_id",
            patch(update_line).delete(remove_line),
        )
        .route("/api/orders/:id/checkout", post(checkout))
}

async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>> {
    queries::ping(&state.db).await?;
    Ok(Json(HealthResponse {
        status: "ok",
        database: "ok",
        cache: state.cache.stats(),
    }))
}

async fn zip_check(
    State(state): State<AppState>,
    Json(req): Json<ZipCheckRequest>,
) -> Result<Json<ZipCheckResponse>> {
    let result =
        services::zip_check(&state.db, &state.cache, &state.config.pricing, &req.zip_code).await?;
    Ok(Json(result.into()))
}

async fn distance(
    State(state): State<AppState>,
    Json(req): Json<DistanceRequest>,
) -> Result<Json<DistanceResponse>> {
    let result =
        services::distance_between_zips(&state.db, &state.cache, &req.from_zip, &req.to_zip)
            .await?;
    Ok(Json(result.into()))
}

async fn create_cart(
    State(state): State<AppState>,
    Json(req): Json<CreateCartRequest>,
) -> Result<(StatusCode, Json<OrderResponse>)> {
    let view = services::create_cart(&state.db, req.zip_code.as_deref()).await?;
    Ok((StatusCode::CREATED, Json(view.into())))
}

async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderResponse>> {
    let view = services::get_order(&state.db, &state.cache, id).await?;
    Ok(Json(view.into()))
}

async fn quote(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<QuoteRequest>,
) -> Result<Json<OrderResponse>> {
    let view = services::quote_order(
        &state.db,
        &state.cache,
        &state.config.pricing,
        id,
        req.distance_override,
    )
    .await?;
    Ok(Json(view.into()))
}

async fn update_zip(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateZipRequest>,
) -> Result<Json<OrderResponse>> {
    let view = services::update_zip(
        &state.db,
        &state.cache,
        &state.config.pricing,
        id,
        &req.zip_code,
    )
    .await?;
    Ok(Json(view.into()))
}

async fn add_line(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<AddLineRequest>,
) -> Result<Json<OrderResponse>> {
    let new_line = NewLine::try_from(req)?;
    let view =
        services::add_line(&state.db, &state.cache, &state.config.pricing, id, new_line).await?;
    Ok(Json(view.into()))
}

async fn update_line(
    State(state): State<AppState>,
    Path((id, line_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<UpdateLineRequest>,
) -> Result<Json<OrderResponse>> {
    let changes = LineChanges::try_from(req)?;
    let view = services::update_line(
        &state.db,
        &state.cache,
        &state.config.pricing,
        id,
        line_id,
        changes,
    )
    .await?;
    Ok(Json(view.into()))
}

async fn remove_line(
    State(state): State<AppState>,
    Path((id, line_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<OrderResponse>> {
    let view =
        services::remove_line(&state.db, &state.cache, &state.config.pricing, id, line_id).await?;
    Ok(Json(view.into()))
}

async fn checkout(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<CheckoutRequest>,
) -> Result<Json<OrderResponse>> {
    let view = services::checkout(
        &state.db,
        &state.cache,
        &state.config.pricing,
        id,
        req.into(),
    )
    .await?;
    Ok(Json(view.into()))
}

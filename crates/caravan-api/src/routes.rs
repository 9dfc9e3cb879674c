use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use http::{header, StatusCode};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use caravan_core::dedupe::DuplicateCandidate;
use caravan_core::export::{render_clients_csv, render_trips_csv};
use caravan_core::models::{
    AuditEntry, Booking, BookingId, ChangeRecord, Client, ClientDraft, ClientId, Trip, TripId,
};
use caravan_core::services::{ClientCreateOutcome, DatabaseService, Stats};
use caravan_core::sync::ApplySummary;

use crate::config::AppConfig;
use crate::error::AppError;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub service: DatabaseService,
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/clients", post(create_client).get(list_clients))
        .route("/clients/export", get(export_clients_csv))
        .route(
            "/clients/{id}",
            get(get_client).put(update_client).delete(delete_client),
        )
        .route("/clients/{id}/audit", get(client_audit))
        .route("/clients/{id}/merge/{duplicate_id}", post(merge_clients))
        .route("/trips", post(create_trip).get(list_trips))
        .route("/trips/export", get(export_trips_csv))
        .route("/trips/{id}", get(get_trip).delete(delete_trip))
        .route("/bookings", post(create_booking).get(list_bookings))
        .route("/bookings/{id}", get(get_booking).delete(delete_booking))
        .route("/sync/pull", get(sync_pull))
        .route("/sync/push", post(sync_push))
        .route("/stats", get(stats))
        .route("/admin/backup-now", post(backup_now))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
}

async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp(),
    })
}

#[derive(Debug, Deserialize)]
struct CreateClientQuery {
    #[serde(default)]
    force: bool,
}

#[derive(Debug, Serialize)]
struct DuplicateReview {
    error: String,
    candidates: Vec<DuplicateCandidate>,
}

async fn create_client(
    State(state): State<AppState>,
    Query(query): Query<CreateClientQuery>,
    Json(draft): Json<ClientDraft>,
) -> Result<Response, AppError> {
    match state.service.create_client(&draft, query.force).await? {
        ClientCreateOutcome::Created(client) => {
            Ok((StatusCode::CREATED, Json(client)).into_response())
        }
        ClientCreateOutcome::DuplicatesFound(candidates) => {
            let review = DuplicateReview {
                error: format!(
                    "{} potential duplicate(s) found; retry with ?force=true to create anyway",
                    candidates.len()
                ),
                candidates,
            };
            Ok((StatusCode::CONFLICT, Json(review)).into_response())
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListClientsQuery {
    q: Option<String>,
}

async fn list_clients(
    State(state): State<AppState>,
    Query(query): Query<ListClientsQuery>,
) -> Result<Json<Vec<Client>>, AppError> {
    Ok(Json(state.service.list_clients(query.q.as_deref()).await?))
}

async fn get_client(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Client>, AppError> {
    let id = parse_client_id(&id)?;
    let client = state
        .service
        .get_client(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("client {id}")))?;
    Ok(Json(client))
}

async fn update_client(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(draft): Json<ClientDraft>,
) -> Result<Json<Client>, AppError> {
    let id = parse_client_id(&id)?;
    Ok(Json(state.service.update_client(&id, &draft).await?))
}

async fn delete_client(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let id = parse_client_id(&id)?;
    state.service.delete_client(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn client_audit(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<AuditEntry>>, AppError> {
    let id = parse_client_id(&id)?;
    Ok(Json(state.service.client_audit(&id).await?))
}

async fn merge_clients(
    State(state): State<AppState>,
    Path((id, duplicate_id)): Path<(String, String)>,
) -> Result<Json<Client>, AppError> {
    let first = parse_client_id(&id)?;
    let second = parse_client_id(&duplicate_id)?;
    Ok(Json(state.service.merge_clients(&first, &second).await?))
}

async fn export_clients_csv(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let clients = state.service.list_clients(None).await?;
    Ok((
        [(header::CONTENT_TYPE, "text/csv")],
        render_clients_csv(&clients),
    ))
}

#[derive(Debug, Deserialize)]
struct CreateTripRequest {
    name: String,
}

async fn create_trip(
    State(state): State<AppState>,
    Json(request): Json<CreateTripRequest>,
) -> Result<impl IntoResponse, AppError> {
    let trip = state.service.create_trip(&request.name).await?;
    Ok((StatusCode::CREATED, Json(trip)))
}

async fn list_trips(State(state): State<AppState>) -> Result<Json<Vec<Trip>>, AppError> {
    Ok(Json(state.service.list_trips().await?))
}

async fn get_trip(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Trip>, AppError> {
    let id = parse_trip_id(&id)?;
    let trip = state
        .service
        .get_trip(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("trip {id}")))?;
    Ok(Json(trip))
}

async fn delete_trip(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let id = parse_trip_id(&id)?;
    state.service.delete_trip(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn export_trips_csv(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let trips = state.service.list_trips().await?;
    Ok((
        [(header::CONTENT_TYPE, "text/csv")],
        render_trips_csv(&trips),
    ))
}

#[derive(Debug, Deserialize)]
struct CreateBookingRequest {
    client_id: String,
    trip_id: String,
}

async fn create_booking(
    State(state): State<AppState>,
    Json(request): Json<CreateBookingRequest>,
) -> Result<impl IntoResponse, AppError> {
    let client_id = parse_client_id(&request.client_id)?;
    let trip_id = parse_trip_id(&request.trip_id)?;
    let booking = state.service.create_booking(&client_id, &trip_id).await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

#[derive(Debug, Deserialize)]
struct ListBookingsQuery {
    client_id: Option<String>,
}

async fn list_bookings(
    State(state): State<AppState>,
    Query(query): Query<ListBookingsQuery>,
) -> Result<Json<Vec<Booking>>, AppError> {
    let client_id = query
        .client_id
        .as_deref()
        .map(parse_client_id)
        .transpose()?;
    Ok(Json(state.service.list_bookings(client_id.as_ref()).await?))
}

async fn get_booking(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Booking>, AppError> {
    let id = parse_booking_id(&id)?;
    let booking = state
        .service
        .get_booking(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("booking {id}")))?;
    Ok(Json(booking))
}

async fn delete_booking(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let id = parse_booking_id(&id)?;
    state.service.delete_booking(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct PullQuery {
    #[serde(default)]
    after_clock: i64,
}

#[derive(Debug, Serialize)]
struct PullResponse {
    changes: Vec<ChangeRecord>,
}

async fn sync_pull(
    State(state): State<AppState>,
    Query(query): Query<PullQuery>,
) -> Result<Json<PullResponse>, AppError> {
    Ok(Json(PullResponse {
        changes: state.service.pull_changes(query.after_clock).await?,
    }))
}

#[derive(Debug, Deserialize)]
struct PushRequest {
    changes: Vec<ChangeRecord>,
}

#[derive(Debug, Serialize)]
struct PushResponse {
    status: &'static str,
    #[serde(flatten)]
    summary: ApplySummary,
}

async fn sync_push(
    State(state): State<AppState>,
    Json(request): Json<PushRequest>,
) -> Result<Json<PushResponse>, AppError> {
    let summary = state.service.apply_changes(&request.changes).await?;
    tracing::info!(
        received = request.changes.len(),
        applied = summary.applied,
        discarded = summary.discarded,
        skipped = summary.skipped,
        "applied pushed changes"
    );
    Ok(Json(PushResponse {
        status: "ok",
        summary,
    }))
}

async fn stats(State(state): State<AppState>) -> Result<Json<Stats>, AppError> {
    Ok(Json(state.service.stats().await?))
}

async fn backup_now(State(state): State<AppState>) -> Result<String, AppError> {
    let path = state.service.backup_to(&state.config.backup_dir).await?;
    Ok(format!("Backup created: {}", path.display()))
}

fn parse_client_id(raw: &str) -> Result<ClientId, AppError> {
    raw.parse()
        .map_err(|_| AppError::BadRequest(format!("invalid client id: {raw}")))
}

fn parse_trip_id(raw: &str) -> Result<TripId, AppError> {
    raw.parse()
        .map_err(|_| AppError::BadRequest(format!("invalid trip id: {raw}")))
}

fn parse_booking_id(raw: &str) -> Result<BookingId, AppError> {
    raw.parse()
        .map_err(|_| AppError::BadRequest(format!("invalid booking id: {raw}")))
}

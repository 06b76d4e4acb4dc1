//! API Routes

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::caller_from_headers;
use super::realtime_ws::realtime_handler;
use crate::control_panel::{GlobalScreenStats, ScreenQueueStats};
use crate::display_client::DisplaySnapshot;
use crate::error::{Error, Result};
use crate::models::{ApiResponse, MutationResult};
use crate::queue_store::{
    AddToQueueRequest, Photo, QueueEntry, QueueScope, QueuedPhoto, Reordered, ReorderRequest,
};
use crate::screen_registry::{Screen, ScreenStatus, ScreenView};
use crate::state::AppState;

const DEFAULT_QUEUE_LIMIT: usize = 50;
const MAX_QUEUE_LIMIT: usize = 500;
const DEFAULT_AVAILABLE_LIMIT: usize = 100;

/// Create API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/healthz", get(super::health_check))
        // Screens
        .route("/api/screens", get(list_screens))
        .route("/api/screens/:id/queue", get(get_screen_queue))
        .route("/api/screens/:id/queue", post(add_to_screen_queue))
        .route("/api/screens/:id/queue/:entry_id", delete(remove_from_screen_queue))
        .route("/api/screens/:id/queue/:entry_id/position", put(reorder_screen_queue_item))
        .route("/api/screens/:id/skip", post(skip_screen_photo))
        .route("/api/screens/:id/pause", post(toggle_pause))
        .route("/api/screens/:id/stats", get(get_screen_queue_stats))
        .route("/api/screens/:id/display", get(get_display_descriptor))
        // Global pool
        .route("/api/global/queue", get(get_global_queue))
        .route("/api/global/queue", post(add_to_global_queue))
        .route("/api/global/queue/:entry_id", delete(remove_from_global_queue))
        .route("/api/global/queue/:entry_id/position", put(reorder_global_queue_item))
        .route("/api/global/skip", post(skip_global_photo))
        // Stats
        .route("/api/stats/screens", get(get_global_screen_stats))
        // Photos
        .route("/api/photos/available", get(get_available_photos))
        // Display devices
        .route("/api/device/screens/:id/queue", get(device_fetch_queue))
        .route("/api/device/screens/:id/claim", post(device_claim_global))
        .route("/api/device/screens/:id/heartbeat", post(device_heartbeat))
        .route("/api/device/screens/:id/offline", post(device_offline))
        .route("/api/device/entries/:entry_id/consume", post(device_consume))
        // In-process displays
        .route("/api/displays", get(list_local_displays))
        .route("/api/displays/:id/advance", post(advance_local_display))
        // WebSocket
        .route("/api/realtime", get(realtime_handler))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct LimitQuery {
    limit: Option<usize>,
}

impl LimitQuery {
    fn resolve(&self, default: usize) -> usize {
        self.limit.unwrap_or(default).clamp(1, MAX_QUEUE_LIMIT)
    }
}

#[derive(Debug, Deserialize)]
struct AvailableQuery {
    /// Omitted = global pool
    screen_id: Option<String>,
    limit: Option<usize>,
}

// ========================================
// Screens (Control Panel)
// ========================================

async fn list_screens(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<Vec<ScreenView>>>> {
    let caller = caller_from_headers(&headers);
    let screens = state.control_panel.list_screens(&caller).await?;
    Ok(Json(ApiResponse::success(screens)))
}

async fn get_screen_queue(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(screen_id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<ApiResponse<Vec<QueuedPhoto>>>> {
    let caller = caller_from_headers(&headers);
    let queue = state
        .control_panel
        .get_screen_queue(&caller, Some(&screen_id), query.resolve(DEFAULT_QUEUE_LIMIT))
        .await?;
    Ok(Json(ApiResponse::success(queue)))
}

async fn add_to_screen_queue(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(screen_id): Path<String>,
    Json(req): Json<AddToQueueRequest>,
) -> Json<MutationResult<QueueEntry>> {
    let caller = caller_from_headers(&headers);
    Json(
        state
            .control_panel
            .add_to_queue(&caller, Some(&screen_id), &req.photo_id, req.position)
            .await,
    )
}

async fn remove_from_screen_queue(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((screen_id, entry_id)): Path<(String, String)>,
) -> Json<MutationResult<QueueEntry>> {
    let caller = caller_from_headers(&headers);
    Json(
        state
            .control_panel
            .remove_from_queue(&caller, Some(&screen_id), &entry_id)
            .await,
    )
}

async fn reorder_screen_queue_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((screen_id, entry_id)): Path<(String, String)>,
    Json(req): Json<ReorderRequest>,
) -> Json<MutationResult<Reordered>> {
    let caller = caller_from_headers(&headers);
    Json(
        state
            .control_panel
            .reorder_queue_item(&caller, Some(&screen_id), &entry_id, req.position)
            .await,
    )
}

async fn skip_screen_photo(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(screen_id): Path<String>,
) -> Json<MutationResult<QueueEntry>> {
    let caller = caller_from_headers(&headers);
    Json(
        state
            .control_panel
            .skip_current_photo(&caller, Some(&screen_id))
            .await,
    )
}

async fn toggle_pause(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(screen_id): Path<String>,
) -> Json<MutationResult<Screen>> {
    let caller = caller_from_headers(&headers);
    Json(state.control_panel.toggle_pause(&caller, &screen_id).await)
}

async fn get_screen_queue_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(screen_id): Path<String>,
) -> Result<Json<ApiResponse<ScreenQueueStats>>> {
    let caller = caller_from_headers(&headers);
    let stats = state
        .control_panel
        .get_screen_queue_stats(&caller, &screen_id)
        .await?;
    Ok(Json(ApiResponse::success(stats)))
}

/// What a display route needs besides the queue itself
#[derive(Debug, Serialize)]
struct DisplayDescriptor {
    screen_id: String,
    /// Badge shown on the display
    name: String,
    effective_status: ScreenStatus,
    /// Target of the scannable code rendered on every display
    landing_url: String,
    /// Present when this process drives the screen itself
    #[serde(skip_serializing_if = "Option::is_none")]
    local: Option<DisplaySnapshot>,
}

async fn get_display_descriptor(
    State(state): State<AppState>,
    Path(screen_id): Path<String>,
) -> Result<Json<ApiResponse<DisplayDescriptor>>> {
    let view = state.screens.view(&screen_id, Utc::now()).await?;
    let local = match state.displays.read().await.get(&screen_id) {
        Some(handle) => Some(handle.snapshot().await),
        None => None,
    };

    Ok(Json(ApiResponse::success(DisplayDescriptor {
        screen_id: view.screen.id,
        name: view.screen.name,
        effective_status: view.effective_status,
        landing_url: state.config.public_landing_url.clone(),
        local,
    })))
}

// ========================================
// Global pool (Control Panel)
// ========================================

async fn get_global_queue(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<LimitQuery>,
) -> Result<Json<ApiResponse<Vec<QueuedPhoto>>>> {
    let caller = caller_from_headers(&headers);
    let queue = state
        .control_panel
        .get_screen_queue(&caller, None, query.resolve(DEFAULT_QUEUE_LIMIT))
        .await?;
    Ok(Json(ApiResponse::success(queue)))
}

async fn add_to_global_queue(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<AddToQueueRequest>,
) -> Json<MutationResult<QueueEntry>> {
    let caller = caller_from_headers(&headers);
    Json(
        state
            .control_panel
            .add_to_queue(&caller, None, &req.photo_id, req.position)
            .await,
    )
}

async fn remove_from_global_queue(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(entry_id): Path<String>,
) -> Json<MutationResult<QueueEntry>> {
    let caller = caller_from_headers(&headers);
    Json(
        state
            .control_panel
            .remove_from_queue(&caller, None, &entry_id)
            .await,
    )
}

async fn reorder_global_queue_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(entry_id): Path<String>,
    Json(req): Json<ReorderRequest>,
) -> Json<MutationResult<Reordered>> {
    let caller = caller_from_headers(&headers);
    Json(
        state
            .control_panel
            .reorder_queue_item(&caller, None, &entry_id, req.position)
            .await,
    )
}

async fn skip_global_photo(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Json<MutationResult<QueueEntry>> {
    let caller = caller_from_headers(&headers);
    Json(state.control_panel.skip_current_photo(&caller, None).await)
}

async fn get_global_screen_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<GlobalScreenStats>>> {
    let caller = caller_from_headers(&headers);
    let stats = state.control_panel.get_global_screen_stats(&caller).await?;
    Ok(Json(ApiResponse::success(stats)))
}

async fn get_available_photos(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<AvailableQuery>,
) -> Result<Json<ApiResponse<Vec<Photo>>>> {
    let caller = caller_from_headers(&headers);
    let limit = query
        .limit
        .unwrap_or(DEFAULT_AVAILABLE_LIMIT)
        .clamp(1, MAX_QUEUE_LIMIT);
    let photos = state
        .control_panel
        .get_available_photos(&caller, query.screen_id.as_deref(), limit)
        .await?;
    Ok(Json(ApiResponse::success(photos)))
}

// ========================================
// Display devices
// ========================================

async fn device_fetch_queue(
    State(state): State<AppState>,
    Path(screen_id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<ApiResponse<Vec<QueuedPhoto>>>> {
    state.screens.get_screen(&screen_id).await?;
    let limit = query.resolve(state.config.policy.prefetch_count);
    let queue = state
        .queue
        .get_screen_queue(&QueueScope::Screen(screen_id), limit)
        .await?;
    Ok(Json(ApiResponse::success(queue)))
}

async fn device_claim_global(
    State(state): State<AppState>,
    Path(screen_id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<ApiResponse<Vec<QueuedPhoto>>>> {
    state.screens.get_screen(&screen_id).await?;
    let limit = query.resolve(state.config.policy.prefetch_count);
    let claimed = state
        .queue
        .claim_global(&screen_id, limit, state.config.policy.global_claim_ttl())
        .await?;
    tracing::debug!(screen_id = %screen_id, claimed = claimed.len(), "Global pool entries claimed");
    Ok(Json(ApiResponse::success(claimed)))
}

async fn device_heartbeat(
    State(state): State<AppState>,
    Path(screen_id): Path<String>,
) -> Result<Json<ApiResponse<Screen>>> {
    let screen = state.screens.heartbeat(&screen_id, Utc::now()).await?;
    Ok(Json(ApiResponse::success(screen)))
}

async fn device_offline(
    State(state): State<AppState>,
    Path(screen_id): Path<String>,
) -> Result<Json<ApiResponse<Screen>>> {
    let screen = state.screens.go_offline(&screen_id).await?;
    Ok(Json(ApiResponse::success(screen)))
}

async fn device_consume(
    State(state): State<AppState>,
    Path(entry_id): Path<String>,
) -> Result<Json<ApiResponse<QueueEntry>>> {
    let consumed = state.queue.consume_entry(&entry_id, Utc::now()).await?;
    if let Err(e) = state
        .queue
        .increment_displayed_count(&consumed.photo_id)
        .await
    {
        tracing::warn!(
            entry_id = %entry_id,
            photo_id = %consumed.photo_id,
            error = %e,
            "Failed to increment displayed count"
        );
    }
    Ok(Json(ApiResponse::success(consumed)))
}

// ========================================
// In-process displays
// ========================================

#[derive(Debug, Serialize)]
struct AdvanceRequested {
    screen_id: String,
}

async fn list_local_displays(
    State(state): State<AppState>,
) -> Json<ApiResponse<Vec<DisplaySnapshot>>> {
    let displays = state.displays.read().await;
    let mut snapshots = Vec::with_capacity(displays.len());
    for handle in displays.values() {
        snapshots.push(handle.snapshot().await);
    }
    snapshots.sort_by(|a, b| a.screen_id.cmp(&b.screen_id));
    Json(ApiResponse::success(snapshots))
}

/// Advance is queued to the display loop; poll `/api/displays` for the result
async fn advance_local_display(
    State(state): State<AppState>,
    Path(screen_id): Path<String>,
) -> Result<(StatusCode, Json<ApiResponse<AdvanceRequested>>)> {
    let displays = state.displays.read().await;
    let handle = displays
        .get(&screen_id)
        .ok_or_else(|| Error::NotFound(format!("local display {}", screen_id)))?;
    handle.advance();
    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::success(AdvanceRequested { screen_id })),
    ))
}

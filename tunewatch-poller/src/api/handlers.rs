//! API handlers

use super::AppContext;
use crate::registry;
use crate::Error;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tunewatch_common::db::{ArtistKey, Platform};
use tunewatch_common::Error as CommonError;

/// Map service errors onto HTTP statuses
fn error_response(err: Error) -> (StatusCode, Json<Value>) {
    let status = match &err {
        Error::Store(CommonError::InvalidInput(_)) => StatusCode::BAD_REQUEST,
        Error::Store(CommonError::NotFound(_)) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": err.to_string() })))
}

type HandlerResult = Result<Json<Value>, (StatusCode, Json<Value>)>;

/// Health check endpoint
pub async fn health(State(ctx): State<AppContext>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "module": "tunewatch-poller",
        "version": env!("CARGO_PKG_VERSION"),
        "port": ctx.port,
    }))
}

/// Telemetry snapshot: roster counts and the last completed cycle
pub async fn status(State(ctx): State<AppContext>) -> HandlerResult {
    let counts = ctx
        .store
        .artist_counts()
        .await
        .map_err(|e| error_response(e.into()))?;

    let mut artists = json!({ "total": 0 });
    let mut total = 0i64;
    for (platform, count) in counts {
        artists[platform.as_str()] = json!(count);
        total += count;
    }
    artists["total"] = json!(total);

    Ok(Json(json!({
        "started_at": ctx.state.started_at,
        "cycles_completed": ctx.state.cycles_completed(),
        "last_cycle": ctx.state.last_cycle().await,
        "artists": artists,
    })))
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub user_id: String,
    pub username: String,
}

pub async fn register_user(
    State(ctx): State<AppContext>,
    Json(request): Json<RegisterRequest>,
) -> HandlerResult {
    let user = registry::register_user(&ctx.store, request.user_id, request.username)
        .await
        .map_err(error_response)?;
    Ok(Json(json!({
        "user_id": user.user_id,
        "username": user.username,
        "registered_at": user.registered_at,
    })))
}

pub async fn track_artist(
    State(ctx): State<AppContext>,
    Json(request): Json<registry::TrackRequest>,
) -> HandlerResult {
    let artist = registry::track_artist(&ctx.store, request, tunewatch_common::time::now())
        .await
        .map_err(error_response)?;
    Ok(Json(serde_json::to_value(artist).unwrap_or_default()))
}

pub async fn untrack_artist(
    State(ctx): State<AppContext>,
    Json(key): Json<ArtistKey>,
) -> HandlerResult {
    let removed = registry::untrack_artist(&ctx.store, &key)
        .await
        .map_err(error_response)?;
    if removed {
        Ok(Json(json!({ "removed": true })))
    } else {
        Err((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("artist {} not tracked", key.artist_id) })),
        ))
    }
}

#[derive(Deserialize)]
pub struct ListQuery {
    pub owner: String,
}

pub async fn list_artists(
    State(ctx): State<AppContext>,
    Query(query): Query<ListQuery>,
) -> HandlerResult {
    let artists = registry::list_artists(&ctx.store, &query.owner)
        .await
        .map_err(error_response)?;
    Ok(Json(json!({
        "count": artists.len(),
        "artists": artists,
    })))
}

#[derive(Deserialize)]
pub struct SetChannelRequest {
    pub guild_id: String,
    pub platform: Platform,
    pub webhook_url: String,
}

pub async fn set_channel(
    State(ctx): State<AppContext>,
    Json(request): Json<SetChannelRequest>,
) -> HandlerResult {
    registry::set_notification_channel(
        &ctx.store,
        request.guild_id,
        request.platform,
        request.webhook_url,
    )
    .await
    .map_err(error_response)?;
    Ok(Json(json!({ "configured": true })))
}

//! Bot control endpoints.
//!
//! - `GET  /bots`            list bots
//! - `GET  /:id/html`        markup of the live page body
//! - `GET  /:id/screenshot`  PNG of the live page
//! - `POST /:id/start`       start a stopped bot
//! - `POST /:id/stop`        stop a bot
//! - `POST /:id/restart`     restart a bot in the background

use crate::api::error::{ApiError, ApiResult};
use crate::bot::{Bot, BotError, BotInfo, BotRegistry};
use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

pub fn router(registry: Arc<BotRegistry>) -> Router {
    Router::new()
        .route("/bots", get(list_bots))
        .route("/:id/html", get(page_html))
        .route("/:id/screenshot", get(screenshot))
        .route("/:id/start", post(start_bot))
        .route("/:id/stop", post(stop_bot))
        .route("/:id/restart", post(restart_bot))
        .with_state(registry)
}

async fn find(registry: &BotRegistry, id: &str) -> ApiResult<Arc<Bot>> {
    registry
        .lookup(id)
        .await
        .ok_or_else(|| ApiError::not_found(format!("Bot {} not found", id)))
}

async fn list_bots(State(registry): State<Arc<BotRegistry>>) -> Json<Vec<BotInfo>> {
    Json(registry.list().await)
}

async fn page_html(
    State(registry): State<Arc<BotRegistry>>,
    Path(id): Path<String>,
) -> ApiResult<Json<String>> {
    let bot = find(&registry, &id).await?;
    let page = bot.page().await?;
    let html = page.outer_html("body").await.map_err(BotError::from)?;
    Ok(Json(html))
}

async fn screenshot(
    State(registry): State<Arc<BotRegistry>>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let bot = find(&registry, &id).await?;
    let page = bot.page().await?;
    let png = page
        .capture_screenshot(true)
        .await
        .map_err(BotError::from)?;
    Ok(([(header::CONTENT_TYPE, "image/png")], png).into_response())
}

async fn start_bot(
    State(registry): State<Arc<BotRegistry>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let bot = find(&registry, &id).await?;
    bot.spawn_start().await?;
    info!("Bot {} start requested via API", id);
    Ok(Json(json!({
        "success": true,
        "message": "Bot starting",
    })))
}

async fn stop_bot(
    State(registry): State<Arc<BotRegistry>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let bot = find(&registry, &id).await?;
    bot.stop().await;
    info!("Bot {} stopped via API", id);
    Ok(Json(json!({
        "success": true,
        "message": "Bot stopped",
    })))
}

async fn restart_bot(
    State(registry): State<Arc<BotRegistry>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let bot = find(&registry, &id).await?;
    info!("Bot {} restart requested via API", id);
    tokio::spawn(async move {
        if let Err(e) = bot.restart().await {
            warn!("Restart of bot {} failed: {}", bot.id(), e);
        }
    });
    Ok(Json(json!({
        "success": true,
        "message": "Bot restarting",
    })))
}

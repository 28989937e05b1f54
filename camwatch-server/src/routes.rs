use crate::auth;
use crate::error::Result;
use crate::state::AppState;
use crate::streaming;
use axum::{extract::State, middleware, routing::get, Json, Router};
use camwatch::camera::CameraSnapshot;
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/video/:id", get(streaming::video))
        .route("/cameras", get(list_cameras))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_token));

    Router::new()
        .route("/health", get(health))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn list_cameras(State(state): State<AppState>) -> Result<Json<Vec<CameraSnapshot>>> {
    Ok(Json(state.manager.get_cameras().await?))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let status = if state.manager.is_closed() { "stopping" } else { "ok" };
    Json(json!({
        "status": status,
        "version": env!("CARGO_PKG_VERSION"),
        "viewers": state.viewers.current(),
    }))
}

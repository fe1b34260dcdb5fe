use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::engine::switch::SwitchController;
use crate::stats::RelayStats;

use super::input::{InputSource, InputSourceManager};

#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<SwitchController>,
    pub input: Arc<InputSourceManager>,
    pub stats: Arc<RelayStats>,
}

#[derive(Serialize, Deserialize)]
struct PrivacyBody {
    privacy_enabled: bool,
}

#[derive(Serialize, Deserialize)]
struct InputBody {
    source: InputSource,
}

#[derive(Serialize)]
struct HealthResponse {
    rtmp_connected: bool,
    packets_written: u64,
    ms_since_last_write: u64,
    stream_incompatible: bool,
    packets_dropped: u64,
    pts_discontinuities: u64,
    pcr_discontinuities: u64,
}

pub async fn start_server(state: AppState, port: u16) -> Result<(), std::io::Error> {
    let app = router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("starting HTTP server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/privacy", get(get_privacy).post(set_privacy))
        .route("/input", get(get_input).post(set_input))
        .route("/health", get(health))
        .with_state(state)
}

async fn get_privacy(State(state): State<AppState>) -> Json<PrivacyBody> {
    Json(PrivacyBody {
        privacy_enabled: state.controller.privacy(),
    })
}

async fn set_privacy(
    State(state): State<AppState>,
    Json(body): Json<PrivacyBody>,
) -> Json<PrivacyBody> {
    state.controller.set_privacy(body.privacy_enabled);
    Json(PrivacyBody {
        privacy_enabled: state.controller.privacy(),
    })
}

async fn get_input(State(state): State<AppState>) -> Json<InputBody> {
    Json(InputBody {
        source: state.input.current(),
    })
}

async fn set_input(State(state): State<AppState>, Json(body): Json<InputBody>) -> Response {
    match state.input.set(body.source) {
        Ok(()) => Json(InputBody {
            source: state.input.current(),
        })
        .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to persist input selection");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "failed to persist input selection",
            )
                .into_response()
        }
    }
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let stats = &state.stats;
    Json(HealthResponse {
        rtmp_connected: stats.rtmp_connected.load(Ordering::Relaxed),
        packets_written: stats.packets_written.load(Ordering::Relaxed),
        ms_since_last_write: stats.ms_since_last_write(),
        stream_incompatible: stats.stream_incompatible.load(Ordering::Relaxed),
        packets_dropped: stats.packets_dropped.load(Ordering::Relaxed),
        pts_discontinuities: stats.pts_discontinuities.load(Ordering::Relaxed),
        pcr_discontinuities: stats.pcr_discontinuities.load(Ordering::Relaxed),
    })
}

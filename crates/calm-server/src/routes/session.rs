//! Session command routes.

use crate::state::AppState;
use axum::{extract::State, http::StatusCode, Json};
use calm_core::{CalmError, SessionCommand};
use calm_types::SessionState;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Serialize)]
pub struct SessionResponse {
    pub state: SessionState,
    pub instruction: &'static str,
    pub seconds_remaining_in_phase: u32,
    pub session_seconds_remaining: u32,
}

impl From<SessionState> for SessionResponse {
    fn from(state: SessionState) -> Self {
        Self {
            instruction: state.instruction(),
            seconds_remaining_in_phase: state.seconds_remaining_in_phase(),
            session_seconds_remaining: state.session_seconds_remaining(),
            state,
        }
    }
}

type ApiResult = Result<Json<SessionResponse>, (StatusCode, String)>;

fn rejection(e: CalmError) -> (StatusCode, String) {
    let status = match e {
        CalmError::AlreadyActive | CalmError::SessionActive => StatusCode::CONFLICT,
        CalmError::InvalidConfig(_) => StatusCode::UNPROCESSABLE_ENTITY,
        CalmError::NoRuntime => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}

fn run(state: &AppState, command: SessionCommand) -> ApiResult {
    let snapshot = state.controller.execute(command).map_err(|e| {
        debug!(target: "calm::api", "Rejected {:?}: {}", command, e);
        rejection(e)
    })?;
    Ok(Json(snapshot.into()))
}

pub async fn get(State(state): State<Arc<AppState>>) -> Json<SessionResponse> {
    Json(state.controller.state().into())
}

pub async fn start(State(state): State<Arc<AppState>>) -> ApiResult {
    let response = run(&state, SessionCommand::Start)?;
    info!(target: "calm::api", "Session started");
    Ok(response)
}

pub async fn stop(State(state): State<Arc<AppState>>) -> ApiResult {
    run(&state, SessionCommand::Stop)
}

pub async fn reset(State(state): State<Arc<AppState>>) -> ApiResult {
    run(&state, SessionCommand::Reset)
}

#[derive(Debug, Deserialize)]
pub struct UpdateConfigRequest {
    #[serde(default)]
    pub phase_duration_seconds: Option<u32>,
    #[serde(default)]
    pub session_length_seconds: Option<u32>,
}

/// Apply one or both settings. Nothing is applied unless every given value is accepted.
pub async fn update_config(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UpdateConfigRequest>,
) -> ApiResult {
    let mut config = state.controller.state().config;
    if let Some(seconds) = req.phase_duration_seconds {
        config.phase_duration_seconds = seconds;
    }
    if let Some(seconds) = req.session_length_seconds {
        config.session_length_seconds = seconds;
    }

    run(&state, SessionCommand::Configure(config))
}

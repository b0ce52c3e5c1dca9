//! Mission REST handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use tracing::info;

use crate::budget::CognitiveBudget;
use crate::mission::{parse_signal, ManagerError, MissionSignal, SignalParseError};
use crate::types::ScanInput;

use super::AppState;

/// API error rendered as a JSON body with a matching status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

impl From<ManagerError> for ApiError {
    fn from(error: ManagerError) -> Self {
        match &error {
            ManagerError::NotFound(_) => Self::new(StatusCode::NOT_FOUND, error.to_string()),
            ManagerError::InvalidInput(_) => {
                Self::new(StatusCode::BAD_REQUEST, error.to_string())
            }
            ManagerError::Store(_) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
            }
        }
    }
}

impl From<SignalParseError> for ApiError {
    fn from(error: SignalParseError) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error.to_string())
    }
}

/// Body of `POST /missions`.
#[derive(Debug, Deserialize)]
pub struct CreateMissionRequest {
    /// Natural-language objective.
    pub objective: String,
    /// Target set.
    pub targets: Vec<String>,
    /// Allowed scope patterns.
    pub allowed_scope: Vec<String>,
    /// Excluded scope patterns.
    #[serde(default)]
    pub excluded_scope: Vec<String>,
    /// Budget overrides (defaults applied for omitted fields).
    #[serde(default)]
    pub budget: CognitiveBudget,
    /// Self-approve every step.
    #[serde(default)]
    pub auto_pilot: bool,
    /// Dispatch integrations on findings.
    #[serde(default = "default_true")]
    pub notify_on_finding: bool,
    /// Requesting user.
    #[serde(default = "default_user")]
    pub user_id: String,
}

fn default_true() -> bool {
    true
}

fn default_user() -> String {
    "operator".to_owned()
}

/// `POST /missions` — create and start a mission.
pub async fn create(
    State(state): State<AppState>,
    Json(request): Json<CreateMissionRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let input = ScanInput {
        mission_id: uuid::Uuid::new_v4().to_string(),
        tenant_id: state.tenant_id.clone(),
        user_id: request.user_id,
        objective: request.objective,
        targets: request.targets,
        allowed_scope: request.allowed_scope,
        excluded_scope: request.excluded_scope,
        budget: request.budget,
        auto_pilot: request.auto_pilot,
        notify_on_finding: request.notify_on_finding,
    };

    let mission_id = state.manager.start_mission(input).await?;
    info!(mission_id = %mission_id, "mission created via API");
    Ok(Json(serde_json::json!({ "mission_id": mission_id })))
}

/// `GET /missions` — list the tenant's missions.
pub async fn list(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let records = state.manager.list(&state.tenant_id).await?;
    Ok(Json(serde_json::json!({ "missions": records })))
}

/// `GET /missions/{id}` — full status snapshot.
pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let snapshot = state.manager.status(&id).await?;
    Ok(Json(serde_json::to_value(snapshot).unwrap_or_default()))
}

/// `GET /missions/{id}/findings` — current findings list.
pub async fn findings(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let findings = state.manager.findings(&id).await?;
    Ok(Json(serde_json::json!({ "findings": findings })))
}

/// `POST /missions/{id}/cancel` — graceful kill.
pub async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .manager
        .signal(
            &id,
            MissionSignal::Kill {
                reason: "user cancel".to_owned(),
            },
        )
        .await?;
    Ok(StatusCode::ACCEPTED)
}

/// `POST /missions/{id}/terminate` — forced kill.
pub async fn terminate(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .manager
        .signal(
            &id,
            MissionSignal::Kill {
                reason: "forced".to_owned(),
            },
        )
        .await?;
    Ok(StatusCode::ACCEPTED)
}

/// Body of `POST /missions/{id}/signal`.
#[derive(Debug, Deserialize)]
pub struct SignalRequest {
    /// Name in the signal dispatch table.
    pub signal_name: String,
    /// Signal payload.
    #[serde(default)]
    pub data: serde_json::Value,
}

/// `POST /missions/{id}/signal` — forward an arbitrary signal.
pub async fn signal(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<SignalRequest>,
) -> Result<StatusCode, ApiError> {
    let signal = parse_signal(&request.signal_name, &request.data)?;
    state.manager.signal(&id, signal).await?;
    Ok(StatusCode::ACCEPTED)
}

/// `DELETE /missions/{id}` — remove the record (running workflow
/// unaffected).
pub async fn remove(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.manager.delete(&id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::new(StatusCode::NOT_FOUND, "mission not found"))
    }
}

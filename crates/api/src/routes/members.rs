//! Member registration endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use coordinator::{Propagation, TransactionContext};
use serde::{Deserialize, Serialize};
use services::{Log, Member, Store};

use super::{AppState, run_to_completion};
use crate::error::ApiError;

// -- Request types --

/// How the join is delimited.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinMode {
    /// One outer transaction that propagates a failed log write.
    V1,
    /// One outer transaction that recovers from a failed log write.
    #[default]
    V2,
}

#[derive(Deserialize)]
pub struct JoinRequest {
    pub username: String,
    #[serde(default)]
    pub mode: JoinMode,
    /// `"required"` (default) or `"requires_new"`.
    pub log_propagation: Option<String>,
}

// -- Response types --

#[derive(Serialize)]
pub struct MemberResponse {
    pub username: String,
    pub joined_at: String,
    pub log: Option<LogResponse>,
}

#[derive(Serialize)]
pub struct LogResponse {
    pub message: String,
    pub logged_at: String,
}

impl MemberResponse {
    fn new(member: Member, log: Option<Log>) -> Self {
        Self {
            username: member.username,
            joined_at: member.joined_at.to_rfc3339(),
            log: log.map(|log| LogResponse {
                message: log.message,
                logged_at: log.logged_at.to_rfc3339(),
            }),
        }
    }
}

// -- Handlers --

/// POST /members: register a member and write its log entry.
#[tracing::instrument(skip(state, req), fields(username = %req.username, mode = ?req.mode))]
pub async fn join<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<JoinRequest>,
) -> Result<(StatusCode, Json<MemberResponse>), ApiError> {
    let propagation = match req.log_propagation.as_deref() {
        None => Propagation::Required,
        Some(value) => value.parse::<Propagation>().map_err(ApiError::BadRequest)?,
    };
    let (member, log) = run_to_completion(async move {
        let service = match propagation {
            Propagation::Required => &state.members,
            Propagation::RequiresNew => &state.members_isolated_log,
        };
        let ctx = TransactionContext::new();
        let member = match req.mode {
            JoinMode::V1 => service.join_v1(&ctx, &req.username).await?,
            JoinMode::V2 => service.join_v2(&ctx, &req.username).await?,
        };
        let log = service.find_log(&member.username).await?;
        Ok((member, log))
    })
    .await?;

    Ok((StatusCode::CREATED, Json(MemberResponse::new(member, log))))
}

/// GET /members/{username}: get a committed member and its log entry.
#[tracing::instrument(skip(state))]
pub async fn get<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(username): Path<String>,
) -> Result<Json<MemberResponse>, ApiError> {
    let member = state
        .members
        .find_member(&username)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Member not found: {username}")))?;
    let log = state.members.find_log(&username).await?;

    Ok(Json(MemberResponse::new(member, log)))
}

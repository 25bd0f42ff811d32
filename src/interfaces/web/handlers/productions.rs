use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use serde_json::{Value, json};

use super::super::AppState;
use super::{AfterQuery, ApiError, WaitQuery};
use crate::core::orchestrator::{Command, StartTarget};
use crate::core::production::Production;

type ApiResult = Result<Json<Value>, ApiError>;

fn production_body(p: &Production) -> Json<Value> {
    Json(json!({ "success": true, "production": p }))
}

async fn run(state: &AppState, id: &str, command: Command, wait: bool) -> ApiResult {
    let production = if wait {
        state.orchestrator.advance(id, command).await?
    } else {
        state.orchestrator.advance_detached(id, command).await?
    };
    Ok(production_body(&production))
}

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "success": true,
        "status": "ok",
        "provider": state.provider_id,
        "model": state.model_id,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    owner: Option<String>,
    limit: Option<usize>,
}

pub async fn list_productions(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult {
    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    let productions = state
        .orchestrator
        .list(query.owner.as_deref(), limit)
        .await?;
    Ok(Json(json!({ "success": true, "productions": productions })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductionRequest {
    name: String,
    owner_id: Option<String>,
    /// When present the production is started right away.
    client_context: Option<String>,
    #[serde(default)]
    tone_of_voice: String,
}

pub async fn create_production(
    State(state): State<AppState>,
    Query(wait): Query<WaitQuery>,
    Json(payload): Json<CreateProductionRequest>,
) -> ApiResult {
    let owner = payload
        .owner_id
        .filter(|o| !o.trim().is_empty())
        .unwrap_or_else(|| state.default_owner.clone());
    let Some(client_context) = payload.client_context else {
        let created = state.orchestrator.create(&owner, &payload.name).await?;
        return Ok(production_body(&created));
    };
    // Goes through `start` so a rejected context leaves no row behind.
    let target = StartTarget::New {
        owner_id: owner,
        name: payload.name,
    };
    let production = if wait.wait {
        state
            .orchestrator
            .start(target, &client_context, &payload.tone_of_voice)
            .await?
    } else {
        state
            .orchestrator
            .start_detached(target, &client_context, &payload.tone_of_voice)
            .await?
    };
    Ok(production_body(&production))
}

pub async fn get_production(Path(id): Path<String>, State(state): State<AppState>) -> ApiResult {
    let production = state.orchestrator.status(&id).await?;
    Ok(production_body(&production))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    client_context: String,
    #[serde(default)]
    tone_of_voice: String,
}

pub async fn start_production(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Query(wait): Query<WaitQuery>,
    Json(payload): Json<StartRequest>,
) -> ApiResult {
    let command = Command::Start {
        client_context: payload.client_context,
        tone_of_voice: payload.tone_of_voice,
    };
    run(&state, &id, command, wait.wait).await
}

#[derive(Debug, Deserialize)]
pub struct SelectThemeRequest {
    index: usize,
}

pub async fn select_theme(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Query(wait): Query<WaitQuery>,
    Json(payload): Json<SelectThemeRequest>,
) -> ApiResult {
    run(&state, &id, Command::SelectTheme(payload.index), wait.wait).await
}

#[derive(Debug, Deserialize)]
pub struct ApproveNarrativeRequest {
    angle: String,
}

pub async fn approve_narrative(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Query(wait): Query<WaitQuery>,
    Json(payload): Json<ApproveNarrativeRequest>,
) -> ApiResult {
    run(
        &state,
        &id,
        Command::ApproveNarrative(payload.angle),
        wait.wait,
    )
    .await
}

pub async fn retry(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Query(wait): Query<WaitQuery>,
) -> ApiResult {
    run(&state, &id, Command::Retry, wait.wait).await
}

pub async fn reset(Path(id): Path<String>, State(state): State<AppState>) -> ApiResult {
    run(&state, &id, Command::Reset, true).await
}

pub async fn list_messages(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Query(query): Query<AfterQuery>,
) -> ApiResult {
    let messages = state.orchestrator.messages(&id, query.after.max(0)).await?;
    Ok(Json(json!({ "success": true, "messages": messages })))
}

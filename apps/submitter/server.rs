use crate::{
    forms::{FormRegistry, FormValues, ProposalFormDefinition, ProposalType, RegistryError},
    polls::{PendingPoll, PollError, PollTracker},
    resolver::NameResolver,
    submission::{FlowError, SubmissionFlow},
};
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<FormRegistry>,
    pub flow: Arc<SubmissionFlow>,
    pub tracker: Arc<PollTracker>,
    pub names: Arc<dyn NameResolver>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: Value,
}

impl ApiError {
    fn new(status: StatusCode, message: impl ToString) -> Self {
        Self {
            status,
            body: json!({ "error": message.to_string() }),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<RegistryError> for ApiError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::NotFound(_) => ApiError::new(StatusCode::NOT_FOUND, e),
            RegistryError::UnknownRequiredField { .. } => {
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e)
            }
        }
    }
}

impl From<PollError> for ApiError {
    fn from(e: PollError) -> Self {
        match e {
            PollError::Duplicate(_) => ApiError::new(StatusCode::CONFLICT, e),
            PollError::Unknown(_) => ApiError::new(StatusCode::NOT_FOUND, e),
            PollError::Store(_) => ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e),
        }
    }
}

impl From<FlowError> for ApiError {
    fn from(e: FlowError) -> Self {
        match e {
            FlowError::Registry(e) => e.into(),
            FlowError::Poll(e) => e.into(),
            FlowError::Validation(validation) => Self {
                status: StatusCode::UNPROCESSABLE_ENTITY,
                body: json!({
                    "error": validation.to_string(),
                    "field": validation.first_field(),
                    "validation": validation,
                }),
            },
            FlowError::Modifier(_)
            | FlowError::MissingArgument(_)
            | FlowError::InvalidArgument { .. } => {
                ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, e)
            }
            FlowError::SubmissionInFlight(_) => ApiError::new(StatusCode::CONFLICT, e),
            FlowError::Details(_) | FlowError::Invocation(_) => {
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e)
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalSubmission {
    pub proposal_type: String,
    #[serde(default)]
    pub values: FormValues,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/forms", get(list_forms))
        .route("/forms/{proposal_type}", get(get_form))
        .route("/polls", get(list_polls))
        .route("/polls/{id}", axum::routing::delete(abandon_poll))
        .route("/polls/{id}/resolve", post(resolve_poll))
        .route("/proposals", post(create_proposal))
        .route("/names/{name}", get(resolve_name))
        .with_state(state)
}

async fn list_forms(State(state): State<AppState>) -> Json<Vec<ProposalFormDefinition>> {
    Json(
        state
            .registry
            .definitions()
            .iter()
            .map(|definition| definition.as_ref().clone())
            .collect(),
    )
}

async fn get_form(
    State(state): State<AppState>,
    Path(proposal_type): Path<String>,
) -> Result<Json<ProposalFormDefinition>, ApiError> {
    let definition = state.registry.resolve_id(&proposal_type)?;
    Ok(Json(definition.as_ref().clone()))
}

async fn list_polls(State(state): State<AppState>) -> Json<Vec<PendingPoll>> {
    Json(state.tracker.pending())
}

async fn abandon_poll(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PendingPoll>, ApiError> {
    match state.tracker.abandon(&id).await? {
        Some(poll) => Ok(Json(poll)),
        None => Err(ApiError::new(StatusCode::NOT_FOUND, format!("no pending poll for {id}"))),
    }
}

/// Resolving an unknown or settled identifier is not an error.
async fn resolve_poll(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    Ok(match state.tracker.resolve(&id).await? {
        Some(poll) => Json(poll).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    })
}

async fn resolve_name(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Value>, ApiError> {
    match state.names.resolve(&name).await {
        Some(address) => Ok(Json(json!({ "name": name, "address": address }))),
        None => Err(ApiError::new(StatusCode::NOT_FOUND, "No ENS Set")),
    }
}

async fn create_proposal(
    State(state): State<AppState>,
    Json(submission): Json<ProposalSubmission>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let proposal_type: ProposalType = submission.proposal_type.parse()?;

    let request = state
        .flow
        .prepare(proposal_type, submission.values)
        .inspect_err(|e| warn!(%proposal_type, error = %e, "Submission rejected"))?;
    // the poll is registered and the in-flight slot held before answering
    let pending = state
        .flow
        .track(request)
        .await
        .inspect_err(|e| warn!(%proposal_type, error = %e, "Submission not tracked"))?;
    let poll_id = pending.poll_id().clone();

    let flow = state.flow.clone();
    tokio::spawn(async move {
        let receipt = flow.dispatch(pending).await;
        info!(
            poll_id = %receipt.poll_id,
            tx_hash = ?receipt.tx_hash,
            outcome = ?receipt.outcome,
            "Submission finished"
        );
    });

    Ok((StatusCode::ACCEPTED, Json(json!({ "pollId": poll_id }))))
}

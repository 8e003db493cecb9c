//! HTTP facade.
//!
//! A thin REST surface over the frozen graph and the session interface. It
//! only calls graph/interface operations and marshals results as JSON; no
//! domain logic lives here.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

use crate::construct::{Construct, Domain, Event, Feature, Metadata, Purpose, Rule, Variant};
use crate::error::KunskapError;
use crate::graph::KnowledgeGraph;
use crate::interface::{SessionStore, SessionView};

#[derive(Clone)]
pub struct AppState {
    graph: Arc<KnowledgeGraph>,
    sessions: Arc<SessionStore>,
}

pub fn router(graph: Arc<KnowledgeGraph>, sessions: Arc<SessionStore>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers(Any);
    Router::new()
        .route("/v1/export", get(export))
        .route("/v1/metadata", get(metadata))
        .route("/v1/purposes", get(purposes))
        .route("/v1/purposes/root", get(root_purposes))
        .route("/v1/purposes/:id/variants", get(fulfilling_variants))
        .route("/v1/variants", get(variants))
        .route("/v1/variants/:id/purposes", get(constituting_purposes))
        .route("/v1/variants/:id/features", get(features))
        .route("/v1/variants/:id/events", get(attached_events))
        .route("/v1/variants/:id/rules", get(attached_rules))
        .route("/v1/sessions", post(init_session))
        .route("/v1/sessions/:id", get(current_session))
        .route("/v1/sessions/:id/select", post(select))
        .layer(cors)
        .with_state(AppState { graph, sessions })
}

// ------------- Error marshalling -------------
struct ApiError(KunskapError);

impl From<KunskapError> for ApiError {
    fn from(error: KunskapError) -> Self {
        Self(error)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    status: String,
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            KunskapError::NotFound { .. } => StatusCode::NOT_FOUND,
            KunskapError::DoesNotFulfil { .. } => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = format!("{}", self.0);
        warn!(%message, code = %status.as_u16(), "request failed");
        let body = ErrorBody {
            status: "error".into(),
            error: message,
        };
        (status, Json(body)).into_response()
    }
}

// ------------- DTOs -------------
#[derive(Serialize)]
struct MetadataDto {
    name: String,
    version: String,
    created: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    locale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    checksum: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fingerprint: Option<String>,
}

#[derive(Serialize)]
struct PurposeDto {
    id: String,
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    root: bool,
}

impl From<&Purpose> for PurposeDto {
    fn from(purpose: &Purpose) -> Self {
        Self {
            id: purpose.id().to_owned(),
            name: purpose.name().to_owned(),
            description: purpose.description().map(str::to_owned),
            root: purpose.is_root(),
        }
    }
}

#[derive(Serialize)]
struct VariantDto {
    id: String,
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

impl From<&Variant> for VariantDto {
    fn from(variant: &Variant) -> Self {
        Self {
            id: variant.id().to_owned(),
            name: variant.name().to_owned(),
            description: variant.description().map(str::to_owned),
        }
    }
}

#[derive(Serialize)]
struct FeatureDto {
    id: String,
    variant: String,
    name: String,
    domain: Domain,
}

impl From<&Feature> for FeatureDto {
    fn from(feature: &Feature) -> Self {
        Self {
            id: feature.id().to_owned(),
            variant: feature.variant().to_owned(),
            name: feature.name().to_owned(),
            domain: feature.domain().clone(),
        }
    }
}

#[derive(Serialize)]
struct EventDto {
    id: String,
    name: String,
    variants: Vec<String>,
}

impl From<&Event> for EventDto {
    fn from(event: &Event) -> Self {
        Self {
            id: event.id().to_owned(),
            name: event.name().to_owned(),
            variants: event.variants().to_vec(),
        }
    }
}

#[derive(Serialize)]
struct RuleDto {
    id: String,
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    expr: Option<String>,
    variants: Vec<String>,
}

impl From<&Rule> for RuleDto {
    fn from(rule: &Rule) -> Self {
        Self {
            id: rule.id().to_owned(),
            name: rule.name().to_owned(),
            expr: rule.expression().map(str::to_owned),
            variants: rule.variants().to_vec(),
        }
    }
}

fn metadata_dto(metadata: &Metadata, fingerprint: Option<&str>) -> MetadataDto {
    MetadataDto {
        name: metadata.name().to_owned(),
        version: metadata.version().to_owned(),
        created: metadata.created().to_string(),
        author: metadata.author().map(str::to_owned),
        description: metadata.description().map(str::to_owned),
        locale: metadata.locale().map(str::to_owned),
        generator: metadata.generator().map(str::to_owned),
        checksum: metadata.checksum().map(str::to_owned),
        fingerprint: fingerprint.map(str::to_owned),
    }
}

// ------------- Handlers -------------
async fn export(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(state.graph.export())
}

async fn metadata(State(state): State<AppState>) -> Json<MetadataDto> {
    Json(metadata_dto(state.graph.metadata(), state.graph.fingerprint()))
}

async fn purposes(State(state): State<AppState>) -> Json<Vec<PurposeDto>> {
    Json(
        state
            .graph
            .purposes()
            .iter()
            .map(|purpose| PurposeDto::from(purpose.as_ref()))
            .collect(),
    )
}

async fn root_purposes(State(state): State<AppState>) -> Json<Vec<PurposeDto>> {
    Json(
        state
            .graph
            .root_purposes()
            .iter()
            .map(|purpose| PurposeDto::from(purpose.as_ref()))
            .collect(),
    )
}

async fn variants(State(state): State<AppState>) -> Json<Vec<VariantDto>> {
    Json(
        state
            .graph
            .variants()
            .iter()
            .map(|variant| VariantDto::from(variant.as_ref()))
            .collect(),
    )
}

async fn fulfilling_variants(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<VariantDto>>, ApiError> {
    let variants = state.graph.fulfilling_variants(&id)?;
    Ok(Json(
        variants
            .iter()
            .map(|variant| VariantDto::from(variant.as_ref()))
            .collect(),
    ))
}

async fn constituting_purposes(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<PurposeDto>>, ApiError> {
    let purposes = state.graph.constituting_purposes(&id)?;
    Ok(Json(
        purposes
            .iter()
            .map(|purpose| PurposeDto::from(purpose.as_ref()))
            .collect(),
    ))
}

async fn features(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<FeatureDto>>, ApiError> {
    let features = state.graph.features(&id)?;
    Ok(Json(
        features
            .iter()
            .map(|feature| FeatureDto::from(feature.as_ref()))
            .collect(),
    ))
}

async fn attached_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<EventDto>>, ApiError> {
    let events = state.graph.attached_events(&id)?;
    Ok(Json(
        events
            .iter()
            .map(|event| EventDto::from(event.as_ref()))
            .collect(),
    ))
}

async fn attached_rules(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<RuleDto>>, ApiError> {
    let rules = state.graph.attached_rules(&id)?;
    Ok(Json(
        rules
            .iter()
            .map(|rule| RuleDto::from(rule.as_ref()))
            .collect(),
    ))
}

#[derive(Serialize)]
struct SessionCreated {
    id: String,
}

async fn init_session(State(state): State<AppState>) -> Result<Json<SessionCreated>, ApiError> {
    let id = state.sessions.init()?;
    Ok(Json(SessionCreated { id }))
}

async fn current_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, ApiError> {
    Ok(Json(state.sessions.current(&id)?))
}

#[derive(Deserialize)]
struct SelectRequest {
    purpose: String,
    variant: String,
}

#[derive(Serialize)]
struct SelectResponse {
    status: String,
}

async fn select(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<SelectRequest>,
) -> Result<Json<SelectResponse>, ApiError> {
    state.sessions.select(&id, &request.purpose, &request.variant)?;
    Ok(Json(SelectResponse {
        status: "ok".into(),
    }))
}

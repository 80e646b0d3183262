//! The spec.md §6 RPC surface: `/admit`, `/retrieve`, `/anchors/*`,
//! `/journeys/*`. Error handling modeled on `http-rpc-gateway`'s `AppError`
//! / `IntoResponse` pattern: one error enum, one place that maps it to a
//! status code and a `{"error": {"code", "message"}}` JSON body.

use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use stat7_anchor::{Anchor, AnchorId};
use stat7_core::{BitChain, Coord, Horizon, Payload, Polarity, Realm};
use stat7_orchestrator::{AdmissionStatus, Journey};
use stat7_retrieval::{CoordFilter, RetrievalQuery};
use std::str::FromStr;
use std::sync::Arc;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/admit", post(admit))
        .route("/retrieve", post(retrieve))
        .route("/anchors/by-coord", get(list_anchors_by_coord))
        .route("/anchors/:id", get(get_anchor))
        .route("/journeys", get(list_journeys_since))
        .route("/journeys/:id", get(get_journey))
        .with_state(state)
}

// --- Error handling -------------------------------------------------

// `/admit` never routes through `AppError`: even rejections (auth, policy,
// presence) return a 2xx-shaped `AdmitResponse` body via
// `AdmissionStatus::http_status()`/`as_str()` (journey.rs), so this enum
// only needs the variants the other routes actually construct.
pub enum AppError {
    BadRequest(String),
    NotFound(String),
    Timeout(String),
    /// Transient internal failure (spec §6 `/admit`: "503 on transient
    /// internal failure") — distinct from `/retrieve`'s 408 `Timeout`.
    ServiceUnavailable(String),
    Internal(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, msg, code) = match self {
            AppError::BadRequest(s) => (StatusCode::BAD_REQUEST, s, "INVALID_REQUEST"),
            AppError::NotFound(s) => (StatusCode::NOT_FOUND, s, "NOT_FOUND"),
            AppError::Timeout(s) => (StatusCode::REQUEST_TIMEOUT, s, "TIMEOUT"),
            AppError::ServiceUnavailable(s) => (StatusCode::SERVICE_UNAVAILABLE, s, "UNAVAILABLE"),
            AppError::Internal(e) => {
                tracing::error!(target: "stat7d", error = %e, "internal error");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "internal error".to_string(),
                    "INTERNAL_ERROR",
                )
            }
        };
        (status, Json(serde_json::json!({ "error": {"code": code, "message": msg} }))).into_response()
    }
}

// --- /admit -----------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct AdmitCoordInput {
    pub realm: String,
    pub lineage: u64,
    pub adjacency: f64,
    pub horizon: String,
    pub luminosity: f64,
    pub polarity: String,
    pub dimensionality: u32,
}

impl AdmitCoordInput {
    /// Built via [`Coord::from_raw_unchecked`]: an ingress candidate may
    /// legitimately be out of range before the WFC gate and conservator
    /// have had a chance to act on it (spec §4.6/§4.8).
    fn into_coord(self) -> Result<Coord, AppError> {
        let realm = Realm::from_str(&self.realm).map_err(|e| AppError::BadRequest(e.to_string()))?;
        let horizon =
            Horizon::from_str(&self.horizon).map_err(|e| AppError::BadRequest(e.to_string()))?;
        let polarity =
            Polarity::from_str(&self.polarity).map_err(|e| AppError::BadRequest(e.to_string()))?;
        Coord::from_raw_unchecked(
            realm,
            self.lineage,
            self.adjacency,
            horizon,
            self.luminosity,
            polarity,
            self.dimensionality,
        )
        .map_err(|e| AppError::BadRequest(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
pub struct AdmitRequest {
    pub coord: AdmitCoordInput,
    pub text: String,
    #[serde(default)]
    pub lineage_parent_id: Option<String>,
    #[serde(default)]
    pub provenance_chain: Vec<String>,
    #[serde(default)]
    pub signature: Option<Vec<u8>>,
    pub auth_token: String,
    pub requester_id: String,
    #[serde(default)]
    pub intent: String,
}

#[derive(Debug, Serialize)]
pub struct AdmitResponse {
    pub success: bool,
    pub status: String,
    pub journey_id: String,
}

async fn admit(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AdmitRequest>,
) -> Result<Response, AppError> {
    let coord = req.coord.into_coord()?;

    let lineage_parent_id = req
        .lineage_parent_id
        .as_deref()
        .map(stat7_core::BitChainId::from_hex)
        .transpose()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let provenance_chain = req
        .provenance_chain
        .iter()
        .map(|s| stat7_core::BitChainId::from_hex(s))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let bc = BitChain::new(
        coord,
        Payload::from_text(req.text),
        lineage_parent_id,
        provenance_chain,
        req.signature,
    )
    .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let (status, journey) = state
        .orchestrator
        .process_bitchain(bc, &req.auth_token, &req.requester_id)
        .await
        .map_err(|e| AppError::ServiceUnavailable(e.to_string()))?;

    let http_status =
        StatusCode::from_u16(status.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = AdmitResponse {
        success: status.is_success(),
        status: status.as_str().to_string(),
        journey_id: journey.journey_id.clone(),
    };
    Ok((http_status, Json(body)).into_response())
}

// --- /retrieve ----------------------------------------------------------

async fn retrieve(
    State(state): State<Arc<AppState>>,
    Json(query): Json<RetrievalQuery>,
) -> Result<Response, AppError> {
    match state.retrieval.retrieve(&query).await {
        Ok(assembly) => Ok((StatusCode::OK, Json(assembly)).into_response()),
        Err(stat7_retrieval::RetrievalError::MalformedQuery(msg)) => Err(AppError::BadRequest(msg)),
        Err(stat7_retrieval::RetrievalError::Timeout(ms)) => {
            Err(AppError::Timeout(format!("retrieval timed out after {ms}ms")))
        }
        Err(stat7_retrieval::RetrievalError::Cancelled) => {
            Err(AppError::Timeout("retrieval cancelled".to_string()))
        }
        Err(stat7_retrieval::RetrievalError::Embed(stat7_embed::EmbedError::EmptyInput)) => {
            Err(AppError::BadRequest("semantic_query must not be empty".to_string()))
        }
        Err(e @ stat7_retrieval::RetrievalError::Embed(_)) => {
            tracing::warn!(target: "stat7d", error = %e, "embedding provider unavailable, returning degraded response");
            let degraded = stat7_retrieval::ContextAssembly {
                results: Vec::new(),
                aggregate: stat7_retrieval::AssemblyMetadata {
                    degraded: true,
                    reason: Some("provider_unavailable".to_string()),
                    ..Default::default()
                },
            };
            Ok((StatusCode::SERVICE_UNAVAILABLE, Json(degraded)).into_response())
        }
        Err(e) => Err(AppError::Internal(e.into())),
    }
}

// --- /anchors/{id}, /anchors/by-coord -----------------------------------

fn parse_anchor_id(raw: &str) -> Result<AnchorId, AppError> {
    let (realm, index) = raw
        .rsplit_once(':')
        .ok_or_else(|| AppError::BadRequest(format!("malformed anchor id: {raw}")))?;
    let realm = Realm::from_str(realm).map_err(|e| AppError::BadRequest(e.to_string()))?;
    let index: u64 = index
        .parse()
        .map_err(|_| AppError::BadRequest(format!("malformed anchor id: {raw}")))?;
    Ok(AnchorId { realm, index })
}

async fn get_anchor(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Anchor>, AppError> {
    let anchor_id = parse_anchor_id(&id)?;
    state
        .anchors
        .get(anchor_id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("no anchor {id}")))
}

#[derive(Debug, Deserialize)]
pub struct ByCoordParams {
    pub realm: Option<String>,
    pub horizon: Option<String>,
    pub polarity: Option<String>,
}

async fn list_anchors_by_coord(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ByCoordParams>,
) -> Result<Json<Vec<Anchor>>, AppError> {
    let filter = CoordFilter {
        realm: params
            .realm
            .as_deref()
            .map(Realm::from_str)
            .transpose()
            .map_err(|e| AppError::BadRequest(e.to_string()))?,
        horizon: params
            .horizon
            .as_deref()
            .map(Horizon::from_str)
            .transpose()
            .map_err(|e| AppError::BadRequest(e.to_string()))?,
        polarity: params
            .polarity
            .as_deref()
            .map(Polarity::from_str)
            .transpose()
            .map_err(|e| AppError::BadRequest(e.to_string()))?,
    };
    let matched: Vec<Anchor> = state
        .anchors
        .all_anchors()
        .into_iter()
        .filter(|a| filter.matches(&a.coord))
        .collect();
    Ok(Json(matched))
}

// --- /journeys/{id}, /journeys?since= -----------------------------------

async fn get_journey(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Journey>, AppError> {
    let journey: Option<Journey> = state
        .store
        .get_journey(id.as_bytes())
        .map_err(|e| AppError::Internal(e.into()))?;
    journey
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("no journey {id}")))
}

#[derive(Debug, Deserialize)]
pub struct SinceParams {
    #[serde(default)]
    pub since: u64,
}

async fn list_journeys_since(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SinceParams>,
) -> Result<Response, AppError> {
    let mut body = String::new();
    for entry in state.store.journeys_since(params.since) {
        let entry = entry.map_err(|e| AppError::Internal(e.into()))?;
        let line = serde_json::to_string(&entry).map_err(|e| AppError::Internal(e.into()))?;
        body.push_str(&line);
        body.push('\n');
    }
    Ok((
        StatusCode::OK,
        [("content-type", "application/x-ndjson")],
        body,
    )
        .into_response())
}

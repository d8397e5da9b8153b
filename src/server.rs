use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Query, State};
use axum::http::{Method, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::construct::{PathName, ZoneId, ZoneSnapshot};
use crate::datatype::Value;
use crate::engine::{Engine, Schedule};
use crate::error::{AtlasError, Result};

#[derive(Deserialize)]
pub struct QueryRequest {
    pub zone: String,
    pub query: String,
}

#[derive(Deserialize)]
pub struct InstallRequest {
    pub zone: String,
    pub name: String,
    pub queries: String,
}

#[derive(Deserialize)]
pub struct UninstallRequest {
    pub zone: String,
    pub name: String,
}

#[derive(Deserialize)]
pub struct AttributeParams {
    pub zone: String,
    pub name: String,
}

#[derive(Deserialize)]
pub struct ZoneParams {
    pub zone: String,
}

/// A value as `{ "type": "DOUBLE", "value": "0.5" }`; nulls have no value.
#[derive(Debug, Serialize, PartialEq)]
pub struct ValueBody {
    #[serde(rename = "type")]
    pub ty: String,
    pub value: Option<String>,
}
impl From<&Value> for ValueBody {
    fn from(value: &Value) -> Self {
        Self {
            ty: value.get_type().to_string(),
            value: if value.is_null() { None } else { Some(value.to_string()) },
        }
    }
}

#[derive(Serialize)]
pub struct QueryResponse {
    pub status: String,
    pub elapsed_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<BTreeMap<String, ValueBody>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize)]
pub struct AckResponse {
    pub status: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct ZoneBody {
    pub path: String,
    pub attributes: BTreeMap<String, ValueBody>,
    pub children: Vec<ZoneBody>,
}
impl From<&ZoneSnapshot> for ZoneBody {
    fn from(snapshot: &ZoneSnapshot) -> Self {
        Self {
            path: snapshot.path.to_string(),
            attributes: snapshot
                .attributes
                .iter()
                .map(|(attribute, value)| (attribute.to_string(), ValueBody::from(value)))
                .collect(),
            children: snapshot.children.iter().map(ZoneBody::from).collect(),
        }
    }
}

/// One running schedule: `{ "name": "&procs", "id": 3, "running_ms": 1520 }`.
#[derive(Debug, Serialize, PartialEq)]
pub struct ScheduleBody {
    pub name: String,
    pub id: u64,
    pub running_ms: u64,
}
impl From<&Schedule> for ScheduleBody {
    fn from(schedule: &Schedule) -> Self {
        Self {
            name: schedule.attribute.to_string(),
            id: schedule.id.value(),
            running_ms: schedule.running_for.as_millis() as u64,
        }
    }
}

#[derive(Serialize)]
#[serde(untagged)]
pub enum Reply<T: Serialize> {
    Ok(T),
    Error { status: String, error: String },
}

pub fn router(engine: Arc<Engine>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);
    Router::new()
        .route("/v1/query", post(query))
        .route("/v1/install", post(install))
        .route("/v1/uninstall", post(uninstall))
        .route("/v1/attribute", get(attribute))
        .route("/v1/zone", get(zone))
        .route("/v1/installed", get(installed))
        .layer(cors)
        .with_state(engine)
}

/// Parse and validation problems are the caller's fault; unknown zones and
/// attributes are not found; anything else is on us.
pub fn status_of(error: &AtlasError) -> StatusCode {
    match error.root_cause() {
        AtlasError::Parse { .. } | AtlasError::UnaliasedItem(_) | AtlasError::AliasCollision(_) => {
            StatusCode::BAD_REQUEST
        }
        AtlasError::NoSuchZone(_) | AtlasError::NoSuchAttribute(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// The engine is synchronous; keep it off the async workers.
async fn blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AtlasError::Execution(format!("join error: {e}")))?
}

fn locate(engine: &Engine, zone: &str) -> Result<ZoneId> {
    let path: PathName = zone.parse()?;
    engine.find(&path)
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

async fn query(State(engine): State<Arc<Engine>>, Json(req): Json<QueryRequest>) -> (StatusCode, Json<QueryResponse>) {
    let started = Instant::now();
    let zone = req.zone.clone();
    let outcome = blocking(move || {
        let id = locate(&engine, &req.zone)?;
        engine.execute_text(id, &req.query)
    })
    .await;
    let ms = elapsed_ms(started);
    match outcome {
        Ok(results) => {
            info!(ms, zone = %zone, results = results.len(), "query complete");
            let results = results.iter().map(|(key, value)| (key.clone(), ValueBody::from(value))).collect();
            let body = QueryResponse { status: "ok".into(), elapsed_ms: ms, results: Some(results), error: None };
            (StatusCode::OK, Json(body))
        }
        Err(e) => {
            let status = status_of(&e);
            let msg = e.to_string();
            warn!(%msg, code = %status.as_u16(), zone = %zone, "query error");
            let body = QueryResponse { status: "error".into(), elapsed_ms: ms, results: None, error: Some(msg) };
            (status, Json(body))
        }
    }
}

fn acknowledge(outcome: Result<String>, what: &str) -> (StatusCode, Json<AckResponse>) {
    match outcome {
        Ok(message) => {
            info!(%message, "{what} complete");
            (StatusCode::OK, Json(AckResponse { status: "ok".into(), message }))
        }
        Err(e) => {
            let status = status_of(&e);
            let message = e.to_string();
            warn!(%message, code = %status.as_u16(), "{what} error");
            (status, Json(AckResponse { status: "error".into(), message }))
        }
    }
}

async fn install(State(engine): State<Arc<Engine>>, Json(req): Json<InstallRequest>) -> (StatusCode, Json<AckResponse>) {
    let outcome = blocking(move || {
        let id = locate(&engine, &req.zone)?;
        engine.install(id, &req.name, &req.queries).map(|ack| ack.to_string())
    })
    .await;
    acknowledge(outcome, "install")
}

async fn uninstall(
    State(engine): State<Arc<Engine>>,
    Json(req): Json<UninstallRequest>,
) -> (StatusCode, Json<AckResponse>) {
    let outcome = blocking(move || {
        let id = locate(&engine, &req.zone)?;
        engine.uninstall(id, &req.name).map(|ack| ack.to_string())
    })
    .await;
    acknowledge(outcome, "uninstall")
}

async fn attribute(
    State(engine): State<Arc<Engine>>,
    Query(params): Query<AttributeParams>,
) -> (StatusCode, Json<Reply<ValueBody>>) {
    let outcome = blocking(move || {
        let id = locate(&engine, &params.zone)?;
        engine.attribute(id, &params.name)
    })
    .await;
    reply(outcome.map(|value| ValueBody::from(&value)))
}

async fn zone(State(engine): State<Arc<Engine>>, Query(params): Query<ZoneParams>) -> (StatusCode, Json<Reply<ZoneBody>>) {
    let outcome = blocking(move || {
        let id = locate(&engine, &params.zone)?;
        engine.snapshot(id)
    })
    .await;
    reply(outcome.map(|snapshot| ZoneBody::from(&snapshot)))
}

async fn installed(
    State(engine): State<Arc<Engine>>,
    Query(params): Query<ZoneParams>,
) -> (StatusCode, Json<Reply<Vec<ScheduleBody>>>) {
    let outcome = blocking(move || {
        let id = locate(&engine, &params.zone)?;
        engine.schedules(id)
    })
    .await;
    reply(outcome.map(|schedules| schedules.iter().map(ScheduleBody::from).collect()))
}

fn reply<T: Serialize>(outcome: Result<T>) -> (StatusCode, Json<Reply<T>>) {
    match outcome {
        Ok(body) => (StatusCode::OK, Json(Reply::Ok(body))),
        Err(e) => {
            let status = status_of(&e);
            let error = e.to_string();
            warn!(%error, code = %status.as_u16(), "lookup error");
            (status, Json(Reply::Error { status: "error".into(), error }))
        }
    }
}

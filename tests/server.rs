use std::sync::Arc;

use axum::http::StatusCode;
use cloudatlas::construct::PathName;
use cloudatlas::datatype::Value;
use cloudatlas::engine::{Engine, EngineSettings};
use cloudatlas::error::AtlasError;
use cloudatlas::sample;
use cloudatlas::server::{ScheduleBody, ValueBody, ZoneBody, router, status_of};
use serde_json::json;

#[test]
fn errors_map_to_statuses() {
    let parse = AtlasError::Parse { message: "unexpected".into(), line: Some(1), col: Some(1) };
    assert_eq!(status_of(&parse), StatusCode::BAD_REQUEST);
    assert_eq!(status_of(&AtlasError::UnaliasedItem("1".into())), StatusCode::BAD_REQUEST);
    assert_eq!(status_of(&AtlasError::NoSuchZone("/x".into())), StatusCode::NOT_FOUND);
    let nested = AtlasError::inside("count(&q)", AtlasError::NoSuchAttribute("&q".into()));
    assert_eq!(status_of(&nested), StatusCode::NOT_FOUND);
    assert_eq!(status_of(&AtlasError::division_by_zero()), StatusCode::INTERNAL_SERVER_ERROR);
}

#[test]
fn values_serialize_with_their_type() {
    let body = serde_json::to_value(ValueBody::from(&Value::double(0.5))).unwrap();
    assert_eq!(body, json!({ "type": "DOUBLE", "value": "0.5" }));
    let body = serde_json::to_value(ValueBody::from(&Value::Int(None))).unwrap();
    assert_eq!(body, json!({ "type": "INT", "value": null }));
}

#[test]
fn zones_serialize_recursively() {
    let engine = Engine::new(sample::hierarchy().unwrap(), EngineSettings::default()).unwrap();
    let uw = engine.find(&"/uw".parse::<PathName>().unwrap()).unwrap();
    let body = serde_json::to_value(ZoneBody::from(&engine.snapshot(uw).unwrap())).unwrap();
    assert_eq!(body["path"], json!("/uw"));
    assert_eq!(body["attributes"]["level"], json!({ "type": "INT", "value": "1" }));
    assert_eq!(body["children"].as_array().map(Vec::len), Some(3));
    let _ = router(Arc::new(engine));
}

#[tokio::test(flavor = "multi_thread")]
async fn schedules_serialize_by_name() {
    let engine = Arc::new(Engine::new(sample::hierarchy().unwrap(), EngineSettings::default()).unwrap());
    let uw = engine.find(&"/uw".parse::<PathName>().unwrap()).unwrap();
    engine.install(uw, "procs", "SELECT sum(num_processes) AS procs").unwrap();
    let schedules = engine.schedules(uw).unwrap();
    let body = serde_json::to_value(ScheduleBody::from(&schedules[0])).unwrap();
    assert_eq!(body["name"], json!("&procs"));
    assert_eq!(body["id"], json!(schedules[0].id.value()));
    engine.shutdown().unwrap();
}

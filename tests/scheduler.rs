use std::sync::Arc;
use std::time::Duration;

use cloudatlas::construct::{Attribute, AttributesMap, PathName, ZoneId};
use cloudatlas::datatype::{Type, Value};
use cloudatlas::engine::{Ack, Engine, EngineSettings};
use cloudatlas::error::AtlasError;
use cloudatlas::sample;

fn setup(interval_ms: u64) -> Arc<Engine> {
    let settings = EngineSettings { query_interval: Duration::from_millis(interval_ms) };
    Arc::new(Engine::new(sample::hierarchy().expect("reference hierarchy"), settings).expect("engine"))
}

fn zone(engine: &Engine, path: &str) -> ZoneId {
    engine.find(&path.parse::<PathName>().unwrap()).expect("zone exists")
}

// Polls until the attribute holds `expected`, for at most two seconds.
async fn wait_for(engine: &Engine, zone: ZoneId, name: &str, expected: Value) {
    for _ in 0..200 {
        if engine.attribute(zone, name).ok().as_ref() == Some(&expected) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{name} never became {expected}: {:?}", engine.attribute(zone, name));
}

#[tokio::test(flavor = "multi_thread")]
async fn installed_queries_run_at_once_and_refresh() {
    let engine = setup(50);
    let uw = zone(&engine, "/uw");
    let ack = engine.install(uw, "cores", "SELECT count(num_cores) AS n").expect("install");
    assert_eq!(ack.to_string(), "Query installed");
    assert_eq!(engine.attribute(uw, "&cores").unwrap().to_string(), "[SELECT count(num_cores) AS n]");
    wait_for(&engine, uw, "n", Value::int(2)).await;

    let khaki13 = zone(&engine, "/uw/khaki13");
    engine.set_attribute(khaki13, Attribute::new("num_cores").unwrap(), Value::int(5)).unwrap();
    wait_for(&engine, uw, "n", Value::int(3)).await;
    engine.shutdown().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn uninstall_stops_the_schedule() {
    let engine = setup(20);
    let uw = zone(&engine, "/uw");
    engine.install(uw, "&procs", "SELECT sum(num_processes) AS procs").expect("install");
    wait_for(&engine, uw, "procs", Value::int(369)).await;

    let ack = engine.uninstall(uw, "procs").unwrap();
    assert_eq!(ack.to_string(), "Attribute &procs was removed");
    assert!(matches!(engine.attribute(uw, "&procs"), Err(AtlasError::NoSuchAttribute(_))));
    // let a run that was already on the blocking pool finish
    tokio::time::sleep(Duration::from_millis(50)).await;
    let violet07 = zone(&engine, "/uw/violet07");
    engine.set_attribute(violet07, Attribute::new("num_processes").unwrap(), Value::int(1)).unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(engine.attribute(uw, "procs").unwrap(), Value::int(369));
    assert_eq!(engine.uninstall(uw, "procs").unwrap(), Ack::NoSuchAttribute);
}

#[tokio::test(flavor = "multi_thread")]
async fn reinstalling_replaces_the_previous_query() {
    let engine = setup(20);
    let uw = zone(&engine, "/uw");
    engine.install(uw, "q", "SELECT count(name) AS c").unwrap();
    engine.install(uw, "q", "SELECT count(num_cores) AS c").unwrap();
    assert_eq!(engine.installed(uw).unwrap(), vec![Attribute::new("&q").unwrap()]);
    wait_for(&engine, uw, "c", Value::int(2)).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(engine.attribute(uw, "c").unwrap(), Value::int(2));
}

#[tokio::test(flavor = "multi_thread")]
async fn remote_query_attributes_are_installed() {
    let engine = setup(20);
    let pjwstk = zone(&engine, "/pjwstk");
    let mut remote = AttributesMap::new();
    let queries = Value::list(Type::String, vec![Value::string("SELECT max(num_processes) AS most")]).unwrap();
    remote.add(Attribute::new("&top").unwrap(), queries).unwrap();
    remote.add(Attribute::new("contacts_seen").unwrap(), Value::int(7)).unwrap();
    engine.merge_remote(pjwstk, remote).expect("merge");

    assert_eq!(engine.attribute(pjwstk, "contacts_seen").unwrap(), Value::int(7));
    assert_eq!(engine.installed(pjwstk).unwrap(), vec![Attribute::new("&top").unwrap()]);
    wait_for(&engine, pjwstk, "most", Value::int(222)).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn bad_queries_are_rejected_at_install() {
    let engine = setup(20);
    let uw = zone(&engine, "/uw");
    assert!(matches!(engine.install(uw, "bad", "SELEKT 1"), Err(AtlasError::Parse { .. })));
    assert!(matches!(engine.install(uw, "bad", "SELECT 1"), Err(AtlasError::UnaliasedItem(_))));
    assert!(matches!(engine.install(uw, "bad name", "SELECT 1 AS a"), Err(AtlasError::IllegalArgument(_))));
    assert!(engine.installed(uw).unwrap().is_empty());
}

#[test]
fn installing_needs_a_runtime() {
    let engine = setup(20);
    let uw = zone(&engine, "/uw");
    let err = engine.install(uw, "q", "SELECT count(name) AS c").unwrap_err();
    assert!(matches!(err, AtlasError::Execution(_)), "got {err}");
    assert!(engine.attribute(uw, "&q").is_err());
}

#[test]
fn the_interval_must_be_positive() {
    let settings = EngineSettings { query_interval: Duration::ZERO };
    let err = Engine::new(sample::hierarchy().unwrap(), settings).err().expect("rejected");
    assert!(matches!(err, AtlasError::Config(_)));
}

#[tokio::test(flavor = "multi_thread")]
async fn a_bad_remote_query_does_not_stop_the_merge() {
    let engine = setup(20);
    let pjwstk = zone(&engine, "/pjwstk");
    engine.install(pjwstk, "top", "SELECT max(num_processes) AS most").unwrap();
    let mut remote = AttributesMap::new();
    let bad = Value::list(Type::String, vec![Value::string("SELEKT 1")]).unwrap();
    remote.add(Attribute::new("&top").unwrap(), bad).unwrap();
    remote.add(Attribute::new("zz").unwrap(), Value::int(7)).unwrap();

    assert_eq!(engine.merge_remote(pjwstk, remote).expect("merge"), 1);
    assert_eq!(engine.attribute(pjwstk, "zz").unwrap(), Value::int(7));
    assert_eq!(engine.installed(pjwstk).unwrap(), vec![Attribute::new("&top").unwrap()]);
    assert_eq!(engine.attribute(pjwstk, "&top").unwrap().to_string(), "[SELECT max(num_processes) AS most]");
    wait_for(&engine, pjwstk, "most", Value::int(222)).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn uninstall_needs_a_running_schedule() {
    let engine = setup(20);
    let uw = zone(&engine, "/uw");
    let plain = Value::list(Type::String, vec![Value::string("SELECT 1 AS one")]).unwrap();
    engine.set_attribute(uw, Attribute::new("&ghost").unwrap(), plain.clone()).unwrap();
    assert_eq!(engine.uninstall(uw, "ghost").unwrap(), Ack::NoSuchAttribute);
    assert_eq!(engine.attribute(uw, "&ghost").unwrap(), plain);
}

#[tokio::test(flavor = "multi_thread")]
async fn schedules_report_ids_and_age() {
    let engine = setup(20);
    let uw = zone(&engine, "/uw");
    engine.install(uw, "b", "SELECT count(name) AS nb").unwrap();
    engine.install(uw, "a", "SELECT count(name) AS na").unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    let schedules = engine.schedules(uw).unwrap();
    let names: Vec<String> = schedules.iter().map(|s| s.attribute.to_string()).collect();
    assert_eq!(names, ["&a", "&b"]);
    assert_ne!(schedules[0].id, schedules[1].id);
    assert!(schedules.iter().all(|s| s.running_for >= Duration::from_millis(30)));
    engine.uninstall(uw, "a").unwrap();
    assert_eq!(engine.schedules(uw).unwrap().len(), 1);
}

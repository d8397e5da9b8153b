use cloudatlas::construct::{Attribute, AttributesMap, PathName, ZoneTree};
use cloudatlas::datatype::Value;
use cloudatlas::error::AtlasError;
use cloudatlas::sample;

fn setup() -> ZoneTree {
    sample::hierarchy().expect("reference hierarchy")
}

fn path(text: &str) -> PathName {
    text.parse().expect("path ok")
}

#[test]
fn attribute_names() {
    assert!(Attribute::new("cpu_usage").is_ok());
    assert!(Attribute::new("&query").unwrap().is_query());
    assert_eq!(Attribute::query("avg").unwrap().name(), "&avg");
    assert_eq!(Attribute::query("&avg").unwrap().name(), "&avg");
    assert!(Attribute::new("1abc").is_err());
    assert!(Attribute::new("a-b").is_err());
}

#[test]
fn attribute_map_operations() {
    let mut map = AttributesMap::new();
    let level = Attribute::new("level").unwrap();
    map.add(level.clone(), Value::int(1)).expect("first add");
    let err = map.add(level.clone(), Value::int(2)).unwrap_err();
    assert!(err.to_string().contains("already exists"), "got {err}");
    assert_eq!(map.add_or_change(level.clone(), Value::int(3)), Some(Value::int(1)));
    assert_eq!(map.get("level").unwrap(), &Value::int(3));
    assert!(matches!(map.get("owner").unwrap_err(), AtlasError::NoSuchAttribute(_)));
    assert_eq!(map.remove("level"), Some(Value::int(3)));
    assert!(map.is_empty());
}

#[test]
fn path_names() {
    let p = path("/uw/violet07");
    assert_eq!(p.components(), ["uw", "violet07"]);
    assert_eq!(p.singleton_name(), "violet07");
    assert_eq!(p.level_up().to_string(), "/uw");
    assert_eq!(p.level_up().level_up(), PathName::root());
    assert_eq!(PathName::root().to_string(), "/");
    assert_eq!(PathName::root().level_down("pjwstk").to_string(), "/pjwstk");
    assert!("uw".parse::<PathName>().is_err());
    assert!("/uw/".parse::<PathName>().is_err());
}

#[test]
fn reference_hierarchy_shape() {
    let tree = setup();
    assert_eq!(tree.len(), 8);
    let uw = tree.find(&path("/uw")).expect("uw exists");
    assert_eq!(tree.children(uw).unwrap().len(), 3);
    let khaki31 = tree.find(&path("/uw/khaki31")).expect("khaki31 exists");
    assert_eq!(tree.path_name(khaki31).unwrap().to_string(), "/uw/khaki31");
    assert_eq!(tree.parent(khaki31).unwrap(), Some(uw));
    assert_eq!(tree.attribute(khaki31, "cpu_usage").unwrap(), Value::Double(None));
    assert!(tree.find(&path("/uw/nonexistent")).is_none());
    assert_eq!(tree.find(&PathName::root()), Some(tree.root()));
}

#[test]
fn removing_a_child_drops_its_subtree() {
    let mut tree = setup();
    let uw = tree.find(&path("/uw")).unwrap();
    tree.remove_child(tree.root(), uw).expect("remove uw");
    assert_eq!(tree.len(), 4);
    assert!(tree.find(&path("/uw/violet07")).is_none());
    assert!(tree.find(&path("/pjwstk/whatever01")).is_some());
    assert!(tree.remove_child(tree.root(), uw).is_err());
}

#[test]
fn snapshots_and_printing() {
    let tree = setup();
    let snapshot = tree.snapshot(tree.root()).unwrap();
    assert_eq!(snapshot.children.len(), 2);
    assert_eq!(snapshot.children[0].path.to_string(), "/uw");
    assert_eq!(snapshot.children[0].children.len(), 3);
    let violet07 = tree.find(&path("/uw/violet07")).unwrap();
    let printed = tree.print_attributes(violet07).unwrap();
    assert!(printed.contains("cardinality : INT = 1"), "{printed}");
    assert!(printed.contains("some_names : LIST of (STRING) = [tola, tosia]"), "{printed}");
}

#[test]
fn attribute_writes_are_visible_in_snapshots() {
    let tree = setup();
    let uw = tree.find(&path("/uw")).unwrap();
    tree.attributes(uw).unwrap().add_or_change(Attribute::new("extra").unwrap(), Value::string("x"));
    let copy = tree.attributes_snapshot(uw).unwrap();
    assert_eq!(copy.get("extra").unwrap(), &Value::string("x"));
    assert_eq!(tree.attribute_or_none(uw, "missing").unwrap(), None);
}

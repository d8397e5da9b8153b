use std::net::{IpAddr, Ipv4Addr};

use cloudatlas::construct::PathName;
use cloudatlas::datatype::{Contact, Type, Value};
use cloudatlas::error::AtlasError;
use pretty_assertions::assert_eq;

fn strings(items: &[&str]) -> Vec<Value> {
    items.iter().map(|s| Value::string(*s)).collect()
}

fn contact(path: &str, last: u8) -> Value {
    let name: PathName = path.parse().expect("path ok");
    Value::contact(Contact::new(name, IpAddr::V4(Ipv4Addr::new(10, 1, 1, last))))
}

#[test]
fn three_valued_logic() {
    let t = Value::boolean(true);
    let f = Value::boolean(false);
    let n = Value::Boolean(None);
    assert_eq!(t.and(&n).unwrap(), Value::Boolean(None));
    assert_eq!(f.and(&n).unwrap(), Value::boolean(false));
    assert_eq!(t.or(&n).unwrap(), Value::boolean(true));
    assert_eq!(f.or(&n).unwrap(), Value::Boolean(None));
    assert_eq!(n.not().unwrap(), Value::Boolean(None));
    assert_eq!(Value::Null.and(&f).unwrap(), Value::boolean(false));
    let err = Value::int(1).and(&t).unwrap_err();
    assert!(matches!(err, AtlasError::IncompatibleTypes { .. }), "got {err}");
}

#[test]
fn equality_with_nulls_and_widening() {
    assert_eq!(Value::Int(None).is_equal(&Value::Int(None)).unwrap(), Value::boolean(true));
    assert_eq!(Value::Int(None).is_equal(&Value::int(1)).unwrap(), Value::boolean(false));
    assert_eq!(Value::int(1).is_equal(&Value::double(1.0)).unwrap(), Value::boolean(true));
    assert_eq!(Value::double(0.9).is_lower_than(&Value::int(1)).unwrap(), Value::boolean(true));
    assert_eq!(Value::Double(None).is_lower_than(&Value::int(0)).unwrap(), Value::Boolean(None));
    let err = Value::int(1).is_equal(&Value::string("1")).unwrap_err();
    assert_eq!(err.to_string(), "Incompatible types: INT and STRING in operation EQUAL");
}

#[test]
fn ordering_is_not_defined_for_contacts_and_collections() {
    let a = contact("/uw/violet07", 10);
    let b = contact("/uw/khaki31", 39);
    assert!(matches!(a.is_lower_than(&b).unwrap_err(), AtlasError::UnsupportedOperation { .. }));
    let list = Value::list(Type::String, strings(&["a"])).unwrap();
    assert!(list.is_lower_than(&list).is_err());
    assert_eq!(a.is_equal(&a).unwrap(), Value::boolean(true));
}

#[test]
fn integer_division_and_zero_divisors() {
    assert_eq!(Value::int(3).divide(&Value::int(2)).unwrap(), Value::double(1.5));
    assert_eq!(Value::int(7).modulo(&Value::int(3)).unwrap(), Value::int(1));
    assert_eq!(Value::double(1.0).divide(&Value::double(0.0)).unwrap(), Value::double(f64::INFINITY));
    let err = Value::int(1).divide(&Value::int(0)).unwrap_err();
    assert_eq!(err.to_string(), "Arithmetic error: Division by zero.");
    // the divisor is checked before the dividend's nullness
    assert!(Value::Int(None).modulo(&Value::int(0)).is_err());
    assert_eq!(Value::Int(None).divide(&Value::int(2)).unwrap(), Value::Double(None));
    assert_eq!(Value::Null.add(&Value::int(2)).unwrap(), Value::Int(None));
}

#[test]
fn integer_overflow_is_an_error() {
    let err = Value::int(i64::MAX).add(&Value::int(1)).unwrap_err();
    assert!(matches!(err, AtlasError::Arithmetic(_)), "got {err}");
    assert!(Value::int(i64::MIN).negate().is_err());
}

#[test]
fn time_and_duration_arithmetic() {
    let start = Value::time("2012/11/09 18:00:00.000").unwrap();
    let end = Value::time("2012/11/09 21:03:00.000").unwrap();
    let span = end.subtract(&start).unwrap();
    assert_eq!(span, Value::duration(0, 3, 3, 0, 0));
    assert_eq!(span.to_string(), "+0 03:03:00.000");
    assert_eq!(start.add(&span).unwrap(), end);
    assert_eq!(span.add(&start).unwrap(), end);
    assert_eq!(Value::int(2).multiply(&Value::duration_ms(500)).unwrap(), Value::duration_ms(1000));
    assert_eq!(Value::duration_ms(1000).divide(&Value::int(4)).unwrap(), Value::duration_ms(250));
    assert!(start.add(&end).is_err());
}

#[test]
fn textual_forms() {
    assert_eq!(Value::duration(13, 12, 0, 0, 0).to_string(), "+13 12:00:00.000");
    assert_eq!(Value::duration(-13, -11, 0, 0, 0).to_string(), "-13 11:00:00.000");
    assert_eq!(Value::time("2011/11/09 20:08:13.123").unwrap().to_string(), "2011/11/09 20:08:13.123");
    assert_eq!(contact("/uw/violet07", 10).to_string(), "(/uw/violet07, 10.1.1.10)");
    assert_eq!(Value::list(Type::String, strings(&["a", "b"])).unwrap().to_string(), "[a, b]");
    assert_eq!(Value::set(Type::String, strings(&["a", "b", "a"])).unwrap().to_string(), "{a, b}");
    assert_eq!(Type::list(Type::String).to_string(), "LIST of (STRING)");
    assert_eq!(Value::Time(None).to_string(), "NULL");
}

#[test]
fn conversions() {
    let via_double = Value::int(3).convert_to(&Type::Double).unwrap();
    assert_eq!(via_double, Value::double(3.0));
    assert_eq!(via_double.convert_to(&Type::String).unwrap(), Value::string("3"));
    assert_eq!(Value::Int(None).convert_to(&Type::String).unwrap(), Value::string("NULL"));
    assert_eq!(Value::Null.convert_to(&Type::Time).unwrap(), Value::Time(None));
    assert_eq!(Value::string("TRUE").convert_to(&Type::Boolean).unwrap(), Value::boolean(true));
    assert_eq!(Value::string("maybe").convert_to(&Type::Boolean).unwrap(), Value::Boolean(None));
    assert_eq!(Value::string("42").convert_to(&Type::Int).unwrap(), Value::int(42));
    assert_eq!(Value::string("forty").convert_to(&Type::Int).unwrap(), Value::Int(None));
    let duration = Value::string("+1 02:03:04.005").convert_to(&Type::Duration).unwrap();
    assert_eq!(duration, Value::duration(1, 2, 3, 4, 5));
    assert_eq!(duration.to_string(), "+1 02:03:04.005");
    let list = Value::list(Type::String, strings(&["x", "y", "x"])).unwrap();
    let set = list.convert_to(&Type::set(Type::String)).unwrap();
    assert_eq!(set.items().map(<[Value]>::len), Some(2));
    let err = Value::boolean(true).convert_to(&Type::Int).unwrap_err();
    assert!(matches!(err, AtlasError::UnsupportedConversion { .. }));
}

#[test]
fn collections() {
    let a = Value::list(Type::String, strings(&["a", "b"])).unwrap();
    let b = Value::list(Type::String, strings(&["b"])).unwrap();
    assert_eq!(a.add(&b).unwrap().to_string(), "[a, b, b]");
    let sa = Value::set(Type::String, strings(&["a", "b"])).unwrap();
    let sb = Value::set(Type::String, strings(&["b", "c"])).unwrap();
    assert_eq!(sa.add(&sb).unwrap().to_string(), "{a, b, c}");
    // sets compare regardless of order
    let reversed = Value::set(Type::String, strings(&["b", "a"])).unwrap();
    assert_eq!(sa.is_equal(&reversed).unwrap(), Value::boolean(true));
    assert!(Value::list(Type::Int, strings(&["a"])).is_err());
    let err = Value::list_of(vec![Value::int(1), Value::string("a")]).unwrap_err();
    assert!(err.to_string().contains("different types"));
    assert_eq!(Value::string("żółw").value_size().unwrap(), Value::int(4));
}

#[test]
fn regular_expressions_match_whole_strings() {
    let host = Value::string("khaki31");
    assert_eq!(host.matches(&Value::string("khaki.*")).unwrap(), Value::boolean(true));
    assert_eq!(host.matches(&Value::string("khaki")).unwrap(), Value::boolean(false));
    assert_eq!(Value::String(None).matches(&Value::string("x")).unwrap(), Value::Boolean(None));
    assert!(host.matches(&Value::string("(")).is_err());
}

//! The reference zone hierarchy: two organisations under the root, five
//! machines in total, carrying the usual monitoring attributes.
//!
//! ```text
//! /
//! ├── uw       { violet07, khaki31, khaki13 }
//! └── pjwstk   { whatever01, whatever02 }
//! ```

use std::net::{IpAddr, Ipv4Addr};

use crate::construct::{Attribute, AttributesMap, PathName, ZoneTree};
use crate::datatype::{Contact, Type, Value};
use crate::error::Result;

fn contact(path: &str, ip: [u8; 4]) -> Result<Value> {
    let [a, b, c, d] = ip;
    Ok(Value::contact(Contact::new(path.parse::<PathName>()?, IpAddr::V4(Ipv4Addr::new(a, b, c, d)))))
}

fn attributes(entries: Vec<(&str, Value)>) -> Result<AttributesMap> {
    let mut map = AttributesMap::new();
    for (name, value) in entries {
        map.add(Attribute::new(name)?, value)?;
    }
    Ok(map)
}

fn names(items: &[&str]) -> Result<Value> {
    Value::list(Type::String, items.iter().map(|s| Value::string(*s)).collect())
}

fn zone(level: i64, name: &str, owner: &str) -> Vec<(&'static str, Value)> {
    vec![
        ("level", Value::int(level)),
        ("name", Value::string(name)),
        ("owner", Value::string(owner)),
    ]
}

pub fn hierarchy() -> Result<ZoneTree> {
    let violet07_contact = contact("/uw/violet07", [10, 1, 1, 10])?;
    let khaki13_contact = contact("/uw/khaki13", [10, 1, 1, 38])?;
    let khaki31_contact = contact("/uw/khaki31", [10, 1, 1, 39])?;
    let whatever01_contact = contact("/uw/whatever01", [82, 111, 52, 56])?;
    let whatever02_contact = contact("/uw/whatever02", [82, 111, 52, 57])?;
    let contacts = |items: Vec<Value>| Value::set(Type::Contact, items);

    let mut tree = ZoneTree::with_root(attributes(vec![
        ("level", Value::int(0)),
        ("name", Value::String(None)),
        ("owner", Value::String(None)),
    ])?);
    let root = tree.root();
    let uw = tree.add_child(root, attributes(zone(1, "uw", "/uw"))?)?;
    let pjwstk = tree.add_child(root, attributes(zone(1, "pjwstk", "/pjwstk"))?)?;

    let mut violet07 = zone(2, "violet07", "/uw/violet07");
    violet07.extend([
        ("timestamp", Value::time("2012/11/09 18:00:00.000")?),
        ("contacts", contacts(vec![khaki31_contact.clone(), whatever01_contact.clone()])?),
        ("cardinality", Value::int(1)),
        ("members", contacts(vec![violet07_contact.clone()])?),
        ("creation", Value::time("2011/11/09 20:08:13.123")?),
        ("cpu_usage", Value::double(0.9)),
        ("num_cores", Value::int(3)),
        ("num_processes", Value::int(131)),
        ("has_ups", Value::Boolean(None)),
        ("some_names", names(&["tola", "tosia"])?),
        ("expiry", Value::duration(13, 12, 0, 0, 0)),
    ]);
    tree.add_child(uw, attributes(violet07)?)?;

    let mut khaki31 = zone(2, "khaki31", "/uw/khaki31");
    khaki31.extend([
        ("timestamp", Value::time("2012/11/09 20:03:00.000")?),
        ("contacts", contacts(vec![violet07_contact.clone(), whatever02_contact.clone()])?),
        ("cardinality", Value::int(1)),
        ("members", contacts(vec![khaki31_contact.clone()])?),
        ("creation", Value::time("2011/11/09 20:12:13.123")?),
        ("cpu_usage", Value::Double(None)),
        ("num_processes", Value::int(131)),
        ("num_cores", Value::int(3)),
        ("has_ups", Value::boolean(false)),
        ("some_names", names(&["agatka", "beatka", "celina"])?),
        ("expiry", Value::duration(-13, -11, 0, 0, 0)),
    ]);
    tree.add_child(uw, attributes(khaki31)?)?;

    let mut khaki13 = zone(2, "khaki13", "/uw/khaki13");
    khaki13.extend([
        ("timestamp", Value::time("2012/11/09 21:03:00.000")?),
        ("contacts", contacts(vec![])?),
        ("cardinality", Value::int(1)),
        ("members", contacts(vec![khaki13_contact])?),
        ("creation", Value::Time(None)),
        ("cpu_usage", Value::double(0.1)),
        ("num_cores", Value::Int(None)),
        ("num_processes", Value::int(107)),
        ("has_ups", Value::boolean(true)),
        ("some_names", names(&[])?),
        ("expiry", Value::Duration(None)),
    ]);
    tree.add_child(uw, attributes(khaki13)?)?;

    let mut whatever01 = zone(2, "whatever01", "/uw/whatever01");
    whatever01.extend([
        ("timestamp", Value::time("2012/11/09 21:12:00.000")?),
        ("contacts", contacts(vec![violet07_contact.clone(), whatever02_contact.clone()])?),
        ("cardinality", Value::int(1)),
        ("members", contacts(vec![whatever01_contact.clone()])?),
        ("creation", Value::time("2012/10/18 07:03:00.000")?),
        ("cpu_usage", Value::double(0.1)),
        ("num_cores", Value::int(7)),
        ("num_processes", Value::int(215)),
        ("php_modules", names(&["rewrite"])?),
    ]);
    tree.add_child(pjwstk, attributes(whatever01)?)?;

    let mut whatever02 = zone(2, "whatever02", "/uw/whatever02");
    whatever02.extend([
        ("timestamp", Value::time("2012/11/09 21:13:00.000")?),
        ("contacts", contacts(vec![khaki31_contact, whatever01_contact])?),
        ("cardinality", Value::int(1)),
        ("members", contacts(vec![whatever02_contact])?),
        ("creation", Value::time("2012/10/18 07:04:00.000")?),
        ("cpu_usage", Value::double(0.4)),
        ("num_cores", Value::int(13)),
        ("num_processes", Value::int(222)),
        ("php_modules", names(&["odbc"])?),
    ]);
    tree.add_child(pjwstk, attributes(whatever02)?)?;

    Ok(tree)
}

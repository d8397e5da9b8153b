use std::sync::{Arc, Mutex, MutexGuard};

// attribute maps use a HashMap with a fast hasher
use core::hash::BuildHasherDefault;
use std::borrow::Borrow;
use std::collections::HashMap;
use seahash::SeaHasher;

// used to print out readable forms of a construct
use std::fmt;
use std::str::FromStr;

// so regular expressions don't have to be recompiled
use lazy_static::lazy_static;
use regex::Regex;

// our own stuff that we need
use crate::datatype::Value;
use crate::error::{AtlasError, Result};

pub type OtherHasher = BuildHasherDefault<SeaHasher>;

lazy_static! {
    static ref ATTRIBUTE_NAME: Regex = Regex::new(r"^&?[A-Za-z][A-Za-z0-9_]*$").unwrap();
    static ref PATH_NAME: Regex = Regex::new(r"^(/\w+)+$").unwrap();
}

// ------------- Attribute -------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Attribute(Arc<str>);

impl Attribute {
    pub fn new(name: &str) -> Result<Self> {
        if !ATTRIBUTE_NAME.is_match(name) {
            return Err(AtlasError::IllegalArgument(format!(
                "Invalid attribute name `{name}`: it must start with a letter, optionally preceded by '&', \
                 and contain only letters, digits and underscores"
            )));
        }
        Ok(Self(Arc::from(name)))
    }
    /// A query attribute; the `&` prefix is added when missing.
    pub fn query(name: &str) -> Result<Self> {
        if name.starts_with('&') {
            Self::new(name)
        } else {
            Self::new(&format!("&{name}"))
        }
    }
    pub fn name(&self) -> &str {
        &self.0
    }
    /// Query attributes hold installed query text rather than data.
    pub fn is_query(&self) -> bool {
        self.0.starts_with('&')
    }
}
impl Borrow<str> for Attribute {
    fn borrow(&self) -> &str {
        &self.0
    }
}
impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ------------- AttributesMap -------------
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributesMap {
    map: HashMap<Attribute, Value, OtherHasher>,
}

impl AttributesMap {
    pub fn new() -> Self {
        Self::default()
    }
    /// Adds a new attribute; an attribute that is already present is an error.
    pub fn add(&mut self, attribute: Attribute, value: Value) -> Result<()> {
        if self.map.contains_key(&attribute) {
            return Err(AtlasError::IllegalArgument(format!(
                "Attribute \"{attribute}\" already exists. Use add_or_change instead."
            )));
        }
        self.map.insert(attribute, value);
        Ok(())
    }
    /// Upserts, returning the replaced value if there was one.
    pub fn add_or_change(&mut self, attribute: Attribute, value: Value) -> Option<Value> {
        self.map.insert(attribute, value)
    }
    pub fn get(&self, name: &str) -> Result<&Value> {
        self.map
            .get(name)
            .ok_or_else(|| AtlasError::NoSuchAttribute(name.to_string()))
    }
    pub fn get_or_none(&self, name: &str) -> Option<&Value> {
        self.map.get(name)
    }
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.map.remove(name)
    }
    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }
    pub fn iter(&self) -> impl Iterator<Item = (&Attribute, &Value)> {
        self.map.iter()
    }
    pub fn attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.map.keys()
    }
    /// Entries ordered by attribute name.
    pub fn sorted(&self) -> Vec<(&Attribute, &Value)> {
        let mut entries: Vec<_> = self.map.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
    }
    pub fn len(&self) -> usize {
        self.map.len()
    }
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
impl fmt::Display for AttributesMap {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (attribute, value) in self.sorted() {
            writeln!(f, "{} : {} = {}", attribute, value.get_type(), value)?;
        }
        Ok(())
    }
}

// ------------- PathName -------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct PathName {
    components: Vec<String>,
}

impl PathName {
    pub fn root() -> Self {
        Self::default()
    }
    pub fn components(&self) -> &[String] {
        &self.components
    }
    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }
    pub fn level_up(&self) -> Self {
        let mut components = self.components.clone();
        components.pop();
        Self { components }
    }
    pub fn level_down(&self, name: &str) -> Self {
        let mut components = self.components.clone();
        components.push(name.to_string());
        Self { components }
    }
    /// The last component; empty for the root.
    pub fn singleton_name(&self) -> &str {
        self.components.last().map_or("", String::as_str)
    }
}
impl FromStr for PathName {
    type Err = AtlasError;
    fn from_str(name: &str) -> Result<Self> {
        if name == "/" {
            return Ok(Self::root());
        }
        if !PATH_NAME.is_match(name) {
            return Err(AtlasError::IllegalArgument(format!("Incorrect fully qualified name `{name}`")));
        }
        Ok(Self { components: name[1..].split('/').map(String::from).collect() })
    }
}
impl fmt::Display for PathName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_root() {
            return f.write_str("/");
        }
        for component in &self.components {
            write!(f, "/{component}")?;
        }
        Ok(())
    }
}

// ------------- Zone -------------
pub type ZoneId = usize;

/// A node of the zone tree. The attribute map has its own lock so that
/// evaluation at one zone never waits on another zone's writers.
#[derive(Debug)]
pub struct Zone {
    parent: Option<ZoneId>,
    children: Vec<ZoneId>,
    attributes: Mutex<AttributesMap>,
}

impl Zone {
    fn new(parent: Option<ZoneId>, attributes: AttributesMap) -> Self {
        Self { parent, children: Vec::new(), attributes: Mutex::new(attributes) }
    }
    pub fn parent(&self) -> Option<ZoneId> {
        self.parent
    }
    pub fn children(&self) -> &[ZoneId] {
        &self.children
    }
}

/// Read-only deep copy of a subtree.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneSnapshot {
    pub path: PathName,
    pub attributes: AttributesMap,
    pub children: Vec<ZoneSnapshot>,
}

// ------------- ZoneTree -------------
/// Arena owning every zone. Zones refer to each other by index; removed
/// subtrees leave empty slots so that identifiers are never reused.
#[derive(Debug)]
pub struct ZoneTree {
    zones: Vec<Option<Zone>>,
}

impl ZoneTree {
    pub const ROOT: ZoneId = 0;

    pub fn new() -> Self {
        Self::with_root(AttributesMap::new())
    }
    pub fn with_root(attributes: AttributesMap) -> Self {
        Self { zones: vec![Some(Zone::new(None, attributes))] }
    }
    pub fn root(&self) -> ZoneId {
        Self::ROOT
    }
    pub fn zone(&self, id: ZoneId) -> Result<&Zone> {
        self.zones
            .get(id)
            .and_then(Option::as_ref)
            .ok_or_else(|| AtlasError::IllegalArgument(format!("no zone with id {id}")))
    }
    fn zone_mut(&mut self, id: ZoneId) -> Result<&mut Zone> {
        self.zones
            .get_mut(id)
            .and_then(Option::as_mut)
            .ok_or_else(|| AtlasError::IllegalArgument(format!("no zone with id {id}")))
    }
    /// Number of zones currently in the tree.
    pub fn len(&self) -> usize {
        self.zones.iter().flatten().count()
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn add_child(&mut self, parent: ZoneId, attributes: AttributesMap) -> Result<ZoneId> {
        self.zone(parent)?;
        let id = self.zones.len();
        self.zones.push(Some(Zone::new(Some(parent), attributes)));
        self.zone_mut(parent)?.children.push(id);
        Ok(id)
    }
    /// Detaches `child` from `parent` and drops its whole subtree.
    pub fn remove_child(&mut self, parent: ZoneId, child: ZoneId) -> Result<()> {
        let siblings = &mut self.zone_mut(parent)?.children;
        let position = siblings
            .iter()
            .position(|c| *c == child)
            .ok_or_else(|| AtlasError::IllegalArgument(format!("zone {child} is not a child of zone {parent}")))?;
        siblings.remove(position);
        let mut pending = vec![child];
        while let Some(id) = pending.pop() {
            if let Some(zone) = self.zones.get_mut(id).and_then(Option::take) {
                pending.extend(zone.children);
            }
        }
        Ok(())
    }
    pub fn children(&self, id: ZoneId) -> Result<&[ZoneId]> {
        Ok(self.zone(id)?.children())
    }
    pub fn parent(&self, id: ZoneId) -> Result<Option<ZoneId>> {
        Ok(self.zone(id)?.parent())
    }

    /// Locks the zone's attribute map. Hold the guard only briefly and never
    /// while locking another zone.
    pub fn attributes(&self, id: ZoneId) -> Result<MutexGuard<'_, AttributesMap>> {
        Ok(self.zone(id)?.attributes.lock()?)
    }
    /// Shallow copy of the zone's attributes taken under its lock.
    pub fn attributes_snapshot(&self, id: ZoneId) -> Result<AttributesMap> {
        Ok(self.attributes(id)?.clone())
    }
    pub fn attribute(&self, id: ZoneId, name: &str) -> Result<Value> {
        self.attributes(id)?.get(name).cloned()
    }
    pub fn attribute_or_none(&self, id: ZoneId, name: &str) -> Result<Option<Value>> {
        Ok(self.attributes(id)?.get_or_none(name).cloned())
    }

    /// Walks to the root collecting each zone's `name` attribute.
    pub fn path_name(&self, id: ZoneId) -> Result<PathName> {
        let mut names = Vec::new();
        let mut current = id;
        while let Some(parent) = self.zone(current)?.parent {
            match self.attribute(current, "name")? {
                Value::String(Some(name)) => names.push(name),
                other => {
                    return Err(AtlasError::InvalidType {
                        expected: "non-null STRING zone name".into(),
                        actual: other.get_type().to_string(),
                    });
                }
            }
            current = parent;
        }
        names.reverse();
        Ok(names.iter().fold(PathName::root(), |path, name| path.level_down(name)))
    }
    /// Resolves a path by matching the `name` attribute of children level by level.
    pub fn find(&self, path: &PathName) -> Option<ZoneId> {
        let mut current = Self::ROOT;
        self.zone(current).ok()?;
        for component in path.components() {
            current = *self.children(current).ok()?.iter().find(|child| {
                matches!(self.attribute_or_none(**child, "name"), Ok(Some(Value::String(Some(ref n)))) if n == component)
            })?;
        }
        Some(current)
    }

    pub fn snapshot(&self, id: ZoneId) -> Result<ZoneSnapshot> {
        let children = self
            .children(id)?
            .iter()
            .map(|child| self.snapshot(*child))
            .collect::<Result<Vec<_>>>()?;
        Ok(ZoneSnapshot { path: self.path_name(id)?, attributes: self.attributes_snapshot(id)?, children })
    }
    /// One `name : TYPE = value` line per attribute.
    pub fn print_attributes(&self, id: ZoneId) -> Result<String> {
        Ok(self.attributes(id)?.to_string())
    }
}

impl Default for ZoneTree {
    fn default() -> Self {
        Self::new()
    }
}

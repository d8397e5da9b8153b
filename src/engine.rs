//! The agent-side engine: a zone tree plus the queries installed in it.
//!
//! Executing a query walks the subtree below a zone in post-order. Each
//! non-leaf zone evaluates the query against a snapshot of its children's
//! attributes and writes the aliased results back into its own attributes,
//! so parents see the values their children computed in the same pass.
//! Leaves produce nothing.
//!
//! Locking: the tree itself sits behind a `RwLock` that structural changes
//! take for writing; execution holds it for reading. Attribute maps have a
//! lock per zone, which is only ever held briefly and never two at a time.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::ast::Program;
use crate::construct::{Attribute, AttributesMap, OtherHasher, PathName, ZoneId, ZoneSnapshot, ZoneTree};
use crate::datatype::{Type, Value};
use crate::error::{AtlasError, Result};
use crate::interface::{QueryHandle, QueryId, Scheduler, Tick};
use crate::interpreter::{Interpreter, QueryResult};

#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub query_interval: Duration,
}
impl Default for EngineSettings {
    fn default() -> Self {
        Self { query_interval: Duration::from_millis(4000) }
    }
}

/// Outcome of installing or uninstalling a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ack {
    Installed,
    Uninstalled(Attribute),
    NoSuchAttribute,
}
impl fmt::Display for Ack {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Ack::Installed => write!(f, "Query installed"),
            Ack::Uninstalled(attribute) => write!(f, "Attribute {attribute} was removed"),
            Ack::NoSuchAttribute => write!(f, "No such attribute"),
        }
    }
}

/// A running schedule as reported by [`Engine::schedules`].
#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    pub attribute: Attribute,
    pub id: QueryId,
    pub running_for: Duration,
}

/// Results of one execution, keyed `"<zone path>: <alias>"`. A zone whose
/// evaluation failed contributes `"<zone path>: error"` with the message.
pub type ExecutionResults = BTreeMap<String, Value>;

type Installed = HashMap<(ZoneId, Attribute), QueryHandle, OtherHasher>;

pub struct Engine {
    tree: RwLock<ZoneTree>,
    installed: Mutex<Installed>,
    scheduler: Scheduler,
}

impl Engine {
    pub fn new(tree: ZoneTree, settings: EngineSettings) -> Result<Self> {
        Ok(Self {
            tree: RwLock::new(tree),
            installed: Mutex::new(Installed::default()),
            scheduler: Scheduler::new(settings.query_interval)?,
        })
    }
    pub fn tree(&self) -> Result<RwLockReadGuard<'_, ZoneTree>> {
        Ok(self.tree.read()?)
    }
    /// Exclusive access for adding or removing zones.
    pub fn tree_mut(&self) -> Result<RwLockWriteGuard<'_, ZoneTree>> {
        Ok(self.tree.write()?)
    }
    pub fn query_interval(&self) -> Duration {
        self.scheduler.period()
    }

    /// Resolves a path to a zone identifier.
    pub fn find(&self, path: &PathName) -> Result<ZoneId> {
        self.tree()?.find(path).ok_or_else(|| AtlasError::NoSuchZone(path.to_string()))
    }
    pub fn attribute(&self, zone: ZoneId, name: &str) -> Result<Value> {
        self.tree()?.attribute(zone, name)
    }
    pub fn snapshot(&self, zone: ZoneId) -> Result<ZoneSnapshot> {
        self.tree()?.snapshot(zone)
    }
    /// Sets one attribute of a zone, replacing any previous value.
    pub fn set_attribute(&self, zone: ZoneId, attribute: Attribute, value: Value) -> Result<Option<Value>> {
        Ok(self.tree()?.attributes(zone)?.add_or_change(attribute, value))
    }

    // ------------- Execution -------------
    /// Parses and executes query text once, without installing it.
    pub fn execute_text(&self, zone: ZoneId, text: &str) -> Result<ExecutionResults> {
        self.execute(zone, &prepare(text)?)
    }

    /// Executes `program` at `zone` and at every non-leaf zone below it.
    /// Each statement is evaluated on its own: the results of those that
    /// succeed are written back, and failures are reported per zone under
    /// `"<path>: error"`. Only an unknown zone or a poisoned lock aborts the
    /// run.
    pub fn execute(&self, zone: ZoneId, program: &Program) -> Result<ExecutionResults> {
        let tree = self.tree()?;
        let mut results = ExecutionResults::new();
        execute_at(&tree, zone, program, &mut results)?;
        Ok(results)
    }

    // ------------- Installation -------------
    /// Installs queries under `&name` at `zone` and schedules them. The first
    /// run happens immediately; an existing query of the same name is replaced.
    pub fn install(self: &Arc<Self>, zone: ZoneId, name: &str, queries: &str) -> Result<Ack> {
        let attribute = Attribute::query(name)?;
        let program = prepare(queries)?;
        self.install_program(zone, attribute, program)
    }

    fn install_program(self: &Arc<Self>, zone: ZoneId, attribute: Attribute, program: Program) -> Result<Ack> {
        let texts: Vec<Value> = program.statements.iter().map(|s| Value::string(s.to_string())).collect();
        let stored = Value::list(Type::String, texts)?;
        self.tree()?.zone(zone)?;

        let engine = Arc::downgrade(self);
        let program = Arc::new(program);
        let handle = self.scheduler.schedule(attribute.to_string(), move || run_installed(&engine, zone, &program))?;
        self.set_attribute(zone, attribute.clone(), stored)?;
        let replaced = self.installed.lock()?.insert((zone, attribute.clone()), handle);
        if let Some(old) = replaced {
            old.cancel();
        }
        info!(zone, query = %attribute, "query installed");
        Ok(Ack::Installed)
    }

    /// Stops the schedule of `&name` at `zone` and removes its attribute.
    /// A name without a running schedule is reported, not removed.
    pub fn uninstall(&self, zone: ZoneId, name: &str) -> Result<Ack> {
        let attribute = Attribute::query(name)?;
        let Some(handle) = self.installed.lock()?.remove(&(zone, attribute.clone())) else {
            return Ok(Ack::NoSuchAttribute);
        };
        handle.cancel();
        self.tree()?.attributes(zone)?.remove(attribute.name());
        info!(zone, query = %attribute, "query uninstalled");
        Ok(Ack::Uninstalled(attribute))
    }

    /// Names of the queries installed at `zone`, sorted.
    pub fn installed(&self, zone: ZoneId) -> Result<Vec<Attribute>> {
        let mut names: Vec<Attribute> = self
            .installed
            .lock()?
            .keys()
            .filter(|(z, _)| *z == zone)
            .map(|(_, attribute)| attribute.clone())
            .collect();
        names.sort();
        Ok(names)
    }

    /// The running schedules at `zone`, sorted by attribute.
    pub fn schedules(&self, zone: ZoneId) -> Result<Vec<Schedule>> {
        let mut schedules: Vec<Schedule> = self
            .installed
            .lock()?
            .iter()
            .filter(|((z, _), _)| *z == zone)
            .map(|((_, attribute), handle)| Schedule {
                attribute: attribute.clone(),
                id: handle.id(),
                running_for: handle.elapsed(),
            })
            .collect();
        schedules.sort_by(|a, b| a.attribute.cmp(&b.attribute));
        Ok(schedules)
    }

    /// Merges attributes received from another agent into `zone`. Query
    /// attributes holding a list of query strings are reinstalled so that
    /// they run here too; everything else is upserted. A query that does not
    /// parse or install is logged and skipped, leaving any query already
    /// installed under that name in place. Returns how many were skipped.
    pub fn merge_remote(self: &Arc<Self>, zone: ZoneId, attributes: AttributesMap) -> Result<usize> {
        let mut skipped = 0;
        for (attribute, value) in attributes.sorted() {
            let Some(queries) = installable(attribute, value) else {
                self.set_attribute(zone, attribute.clone(), value.clone())?;
                continue;
            };
            let program = match prepare(&queries) {
                Ok(program) => program,
                Err(e) => {
                    warn!(zone, query = %attribute, error = %e, "remote query rejected");
                    skipped += 1;
                    continue;
                }
            };
            if let Err(e) = self.install_program(zone, attribute.clone(), program) {
                warn!(zone, query = %attribute, error = %e, "remote query not installed");
                skipped += 1;
            }
        }
        debug!(zone, count = attributes.len(), skipped, "remote attributes merged");
        Ok(skipped)
    }

    /// Cancels every installed query.
    pub fn shutdown(&self) -> Result<()> {
        let handles: Vec<QueryHandle> = self.installed.lock()?.drain().map(|(_, h)| h).collect();
        for handle in &handles {
            handle.cancel();
        }
        info!(count = handles.len(), "installed queries cancelled");
        Ok(())
    }
}

fn execute_at(tree: &ZoneTree, zone: ZoneId, program: &Program, results: &mut ExecutionResults) -> Result<()> {
    let children = tree.children(zone)?.to_vec();
    if children.is_empty() {
        return Ok(());
    }
    for child in &children {
        execute_at(tree, *child, program, results)?;
    }
    // a zone that cannot be named or read is reported and its siblings go on
    let mut errors = Vec::new();
    let label = match tree.path_name(zone) {
        Ok(path) => path.to_string(),
        Err(e) => {
            errors.push(e.to_string());
            format!("zone #{zone}")
        }
    };
    match evaluate_at(tree, zone, &children, program) {
        Ok(outcomes) => {
            for outcome in outcomes {
                match outcome {
                    Ok(values) => {
                        for QueryResult { name, value } in values {
                            if let Some(name) = name {
                                results.insert(format!("{label}: {name}"), value);
                            }
                        }
                    }
                    Err(e) => errors.push(e.to_string()),
                }
            }
        }
        Err(e) => errors.push(e.to_string()),
    }
    if !errors.is_empty() {
        debug!(zone = %label, errors = errors.len(), "query failed at zone");
        results.insert(format!("{label}: error"), Value::string(errors.join("; ")));
    }
    Ok(())
}

// Evaluates every statement at `zone` and writes back the results of those
// that succeeded.
fn evaluate_at(
    tree: &ZoneTree,
    zone: ZoneId,
    children: &[ZoneId],
    program: &Program,
) -> Result<Vec<Result<Vec<QueryResult>>>> {
    let snapshots = children
        .iter()
        .map(|child| tree.attributes_snapshot(*child))
        .collect::<Result<Vec<_>>>()?;
    let outcomes = Interpreter::from_children(&snapshots).interpret_each(program)?;
    let mut attributes = tree.attributes(zone)?;
    for values in outcomes.iter().flatten() {
        for QueryResult { name, value } in values {
            if let Some(name) = name {
                attributes.add_or_change(name.clone(), value.clone());
            }
        }
    }
    Ok(outcomes)
}

fn run_installed(engine: &Weak<Engine>, zone: ZoneId, program: &Program) -> Result<Tick> {
    let Some(engine) = engine.upgrade() else {
        return Ok(Tick::Stop);
    };
    let results = engine.execute(zone, program)?;
    let failures = results.keys().filter(|key| key.ends_with(": error")).count();
    if failures > 0 {
        warn!(zone, failures, "installed query failed in some zones");
    }
    debug!(zone, results = results.len(), "installed query refreshed");
    Ok(Tick::Continue)
}

// Parses and validates query text before anything is scheduled.
fn prepare(queries: &str) -> Result<Program> {
    let program: Program = queries.parse()?;
    program.validate()?;
    Ok(program)
}

// The query text of an attribute that carries installable queries.
fn installable(attribute: &Attribute, value: &Value) -> Option<String> {
    if !attribute.is_query() {
        return None;
    }
    let items = match value {
        Value::List(collection) if *collection.element_type() == Type::String => collection.items()?,
        _ => return None,
    };
    let texts: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
    if texts.is_empty() { None } else { Some(texts.join("; ")) }
}

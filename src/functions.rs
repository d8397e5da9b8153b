//! Built-in functions of the query language.
//!
//! * scalar functions apply per row and pass nulls through;
//! * aggregates fold a column (or a collection value) into one value,
//!   skipping null elements;
//! * transforms reshape a column and return a column, or a list when they
//!   were given a collection value.

use std::cmp::Ordering;

use chrono::Utc;
use rand::seq::SliceRandom;

use crate::datatype::{Type, Value, element_type_of};
use crate::error::{AtlasError, Result};
use crate::result::ResultSet;

/// `2000/01/01 00:00:00.000` UTC.
pub const EPOCH_MS: i64 = 946_684_800_000;

pub fn call(name: &str, args: &[ResultSet]) -> Result<ResultSet> {
    match name {
        // scalar
        "now" => nullary(name, args, || Value::time_ms(Utc::now().timestamp_millis())),
        "epoch" => nullary(name, args, || Value::time_ms(EPOCH_MS)),
        "round" => per_row(name, args, |v| rounding(name, v, f64::round)),
        "floor" => per_row(name, args, |v| rounding(name, v, f64::floor)),
        "ceil" => per_row(name, args, |v| rounding(name, v, f64::ceil)),
        "size" => per_row(name, args, Value::value_size),
        "isNull" => per_row(name, args, |v| Ok(Value::boolean(v.is_null()))),
        "to_boolean" => per_row(name, args, |v| v.convert_to(&Type::Boolean)),
        "to_contact" => per_row(name, args, |v| v.convert_to(&Type::Contact)),
        "to_double" => per_row(name, args, |v| v.convert_to(&Type::Double)),
        "to_duration" => per_row(name, args, |v| v.convert_to(&Type::Duration)),
        "to_integer" => per_row(name, args, |v| v.convert_to(&Type::Int)),
        "to_string" => per_row(name, args, |v| v.convert_to(&Type::String)),
        "to_time" => per_row(name, args, |v| v.convert_to(&Type::Time)),
        "to_list" => collect(name, args, false),
        "to_set" => collect(name, args, true),
        // aggregates
        "count" => aggregate(name, args, count),
        "sum" => aggregate(name, args, sum),
        "avg" => aggregate(name, args, avg),
        "land" => aggregate(name, args, land),
        "lor" => aggregate(name, args, lor),
        "min" => aggregate(name, args, |e| extreme(e, Ordering::Less)),
        "max" => aggregate(name, args, |e| extreme(e, Ordering::Greater)),
        // transforms
        "unfold" => transform(name, args, unfold),
        "distinct" => transform(name, args, |e| Ok(distinct(e.items))),
        "sort" => transform(name, args, |e| sort(e.items)),
        "filterNulls" => transform(name, args, |e| Ok(without_nulls(e.items))),
        "first" => take(name, args, |items, n| items.into_iter().take(n).collect()),
        "last" => take(name, args, |items, n| {
            let skip = items.len().saturating_sub(n);
            items.into_iter().skip(skip).collect()
        }),
        "random" => take(name, args, |items, n| {
            let mut rng = rand::thread_rng();
            items.choose_multiple(&mut rng, n).cloned().collect()
        }),
        _ => Err(AtlasError::IllegalArgument(format!("Illegal function name `{name}`."))),
    }
}

fn arity(name: &str, args: &[ResultSet], expected: usize) -> Result<()> {
    if args.len() != expected {
        return Err(AtlasError::IllegalArgument(format!(
            "Illegal number of arguments: {name} takes {expected}, got {}.",
            args.len()
        )));
    }
    Ok(())
}

// ------------- Scalar -------------
fn nullary(name: &str, args: &[ResultSet], f: impl FnOnce() -> Value) -> Result<ResultSet> {
    arity(name, args, 0)?;
    Ok(ResultSet::Single(f()))
}

fn per_row(name: &str, args: &[ResultSet], f: impl Fn(&Value) -> Result<Value>) -> Result<ResultSet> {
    arity(name, args, 1)?;
    args[0].unary(f)
}

fn rounding(name: &str, value: &Value, f: fn(f64) -> f64) -> Result<Value> {
    match value {
        Value::Double(d) => Ok(Value::Double(d.map(f))),
        Value::Null => Ok(Value::Double(None)),
        other => Err(AtlasError::IllegalArgument(format!(
            "{name} expects a DOUBLE, got {}",
            other.get_type()
        ))),
    }
}

/// `to_list`/`to_set`: a column collapses into one collection value, a
/// single value is converted.
fn collect(name: &str, args: &[ResultSet], set: bool) -> Result<ResultSet> {
    arity(name, args, 1)?;
    match &args[0] {
        ResultSet::Column(values) => {
            let value = if set { Value::set_of(values.clone())? } else { Value::list_of(values.clone())? };
            Ok(ResultSet::Single(value))
        }
        ResultSet::Single(value) => {
            let element = value.get_type().element_type().cloned().unwrap_or(Type::Null);
            let target = if set { Type::set(element) } else { Type::list(element) };
            value.convert_to(&target).map(ResultSet::Single)
        }
    }
}

// ------------- Aggregates and transforms -------------
/// The elements an aggregate or transform works on.
struct Elements {
    items: Vec<Value>,
    element: Type,
}

/// `None` when the collection itself is null.
fn elements(name: &str, arg: &ResultSet) -> Result<Option<Elements>> {
    match arg {
        ResultSet::Column(values) => Ok(Some(Elements { items: values.clone(), element: element_type_of(values)? })),
        ResultSet::Single(Value::Null) => Ok(None),
        ResultSet::Single(value @ (Value::List(_) | Value::Set(_))) => {
            let element = value.get_type().element_type().cloned().unwrap_or(Type::Null);
            Ok(value.items().map(|items| Elements { items: items.to_vec(), element }))
        }
        ResultSet::Single(value) => Err(AtlasError::IllegalArgument(format!(
            "{name} expects a column or a collection, got {}",
            value.get_type()
        ))),
    }
}

fn aggregate(name: &str, args: &[ResultSet], fold: impl FnOnce(Elements) -> Result<Value>) -> Result<ResultSet> {
    arity(name, args, 1)?;
    let result = match elements(name, &args[0])? {
        Some(mut e) => {
            e.items = without_nulls(e.items);
            fold(e)?
        }
        None => null_aggregate(name, &args[0]),
    };
    Ok(ResultSet::Single(result))
}

// The result of an aggregate over a null collection.
fn null_aggregate(name: &str, arg: &ResultSet) -> Value {
    let element = match arg {
        ResultSet::Single(v) => v.get_type().element_type().cloned().unwrap_or(Type::Null),
        ResultSet::Column(_) => Type::Null,
    };
    match name {
        "count" => Value::Int(None),
        "land" | "lor" => Value::Boolean(None),
        "avg" => null_average(&element),
        _ => Value::null_of(&element),
    }
}

fn count(e: Elements) -> Result<Value> {
    Ok(Value::int(e.items.len() as i64))
}

fn summable(e: &Elements, name: &str) -> Result<()> {
    match e.element {
        Type::Int | Type::Double | Type::Duration | Type::Null => Ok(()),
        ref other => Err(AtlasError::IllegalArgument(format!(
            "Aggregation doesn't support type {other}: {name} needs INT, DOUBLE or DURATION"
        ))),
    }
}

fn sum(e: Elements) -> Result<Value> {
    summable(&e, "sum")?;
    if e.items.is_empty() {
        return Ok(Value::null_of(&e.element));
    }
    e.items.iter().try_fold(Value::default_of(&e.element), |total, v| total.add(v))
}

fn avg(e: Elements) -> Result<Value> {
    summable(&e, "avg")?;
    let n = e.items.len() as i64;
    if n == 0 {
        return Ok(null_average(&e.element));
    }
    let divisor = if e.element == Type::Double { Value::double(n as f64) } else { Value::int(n) };
    sum(e)?.divide(&divisor)
}

// INT averages are DOUBLE, like INT division.
fn null_average(element: &Type) -> Value {
    match element {
        Type::Int | Type::Double => Value::Double(None),
        other => Value::null_of(other),
    }
}

fn logical(e: &Elements, name: &str) -> Result<()> {
    match e.element {
        Type::Boolean | Type::Null => Ok(()),
        ref other => Err(AtlasError::IllegalArgument(format!("{name} needs BOOLEAN values, got {other}"))),
    }
}

fn land(e: Elements) -> Result<Value> {
    logical(&e, "land")?;
    e.items.iter().try_fold(Value::boolean(true), |acc, v| acc.and(v))
}

fn lor(e: Elements) -> Result<Value> {
    logical(&e, "lor")?;
    e.items.iter().try_fold(Value::boolean(false), |acc, v| acc.or(v))
}

/// Minimum (`Less`) or maximum (`Greater`); on ties the first occurrence wins.
fn extreme(e: Elements, wanted: Ordering) -> Result<Value> {
    let mut best: Option<&Value> = None;
    for candidate in &e.items {
        best = match best {
            Some(current) if candidate.order(current)? != Some(wanted) => Some(current),
            _ => Some(candidate),
        };
    }
    Ok(best.cloned().unwrap_or_else(|| Value::null_of(&e.element)))
}

fn transform(name: &str, args: &[ResultSet], f: impl FnOnce(Elements) -> Result<Vec<Value>>) -> Result<ResultSet> {
    arity(name, args, 1)?;
    reshape(name, &args[0], f)
}

// Runs a transform and gives the output the shape of the input.
fn reshape(name: &str, arg: &ResultSet, f: impl FnOnce(Elements) -> Result<Vec<Value>>) -> Result<ResultSet> {
    match (arg, elements(name, arg)?) {
        (_, None) => Ok(ResultSet::Single(Value::null_of(&arg.element_type()?))),
        (ResultSet::Column(_), Some(e)) => f(e).map(ResultSet::Column),
        (ResultSet::Single(_), Some(e)) => {
            let items = f(e)?;
            Value::list_of(items).map(ResultSet::Single)
        }
    }
}

fn unfold(e: Elements) -> Result<Vec<Value>> {
    if !e.element.is_collection() && !e.element.is_null() {
        return Err(AtlasError::IllegalArgument(format!(
            "unfold needs a collection of collections, got elements of type {}",
            e.element
        )));
    }
    Ok(e.items.iter().filter_map(Value::items).flat_map(|items| items.iter().cloned()).collect())
}

fn distinct(items: Vec<Value>) -> Vec<Value> {
    let mut kept: Vec<Value> = Vec::with_capacity(items.len());
    for item in items {
        if !kept.iter().any(|k| k.same_as(&item)) {
            kept.push(item);
        }
    }
    kept
}

/// Stable ascending sort, nulls first.
fn sort(mut items: Vec<Value>) -> Result<Vec<Value>> {
    let mut failure = None;
    items.sort_by(|a, b| match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => match a.order(b) {
            Ok(ordering) => ordering.unwrap_or(Ordering::Equal),
            Err(e) => {
                failure.get_or_insert(e);
                Ordering::Equal
            }
        },
    });
    match failure {
        Some(e) => Err(e),
        None => Ok(items),
    }
}

fn without_nulls(items: Vec<Value>) -> Vec<Value> {
    items.into_iter().filter(|v| !v.is_null()).collect()
}

/// `first`, `last` and `random`: at most `n` of the non-null elements.
fn take(name: &str, args: &[ResultSet], pick: impl FnOnce(Vec<Value>, usize) -> Vec<Value>) -> Result<ResultSet> {
    arity(name, args, 2)?;
    let n = match &args[0] {
        ResultSet::Single(Value::Int(Some(n))) if *n >= 0 => *n as usize,
        _ => {
            return Err(AtlasError::IllegalArgument(format!(
                "First argument of {name} must have type INT and be >= 0."
            )));
        }
    };
    reshape(name, &args[1], |e| Ok(pick(without_nulls(e.items), n)))
}

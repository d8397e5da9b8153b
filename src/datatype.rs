// used to print out readable forms of types and values
use std::fmt;
// used for the address part of a contact
use std::net::IpAddr;
// used when ordering values
use std::cmp::Ordering;
// used when an INT operand is widened next to a DOUBLE
use std::borrow::Cow;
// used to cache compiled REGEXP patterns
use std::collections::HashMap;
use std::sync::Mutex;

// used for the textual form of TIME values
use chrono::{DateTime, NaiveDateTime, Utc};
// so regular expressions don't have to be recompiled
use lazy_static::lazy_static;
use regex::Regex;

use crate::construct::{OtherHasher, PathName};
use crate::error::{AtlasError, Result};

pub const TIME_FORMAT: &str = "%Y/%m/%d %H:%M:%S%.3f";
const TIME_PARSE_FORMAT: &str = "%Y/%m/%d %H:%M:%S%.f";

const MILLIS_PER_SECOND: i64 = 1_000;
const MILLIS_PER_MINUTE: i64 = 60 * MILLIS_PER_SECOND;
const MILLIS_PER_HOUR: i64 = 60 * MILLIS_PER_MINUTE;
const MILLIS_PER_DAY: i64 = 24 * MILLIS_PER_HOUR;

lazy_static! {
    static ref DURATION: Regex =
        Regex::new(r"^([+-])(\d+) (\d{1,2}):(\d{1,2}):(\d{1,2})\.(\d{1,3})$").unwrap();
    static ref PATTERNS: Mutex<HashMap<String, Regex, OtherHasher>> = Mutex::new(HashMap::default());
}

// ------------- Type -------------
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Boolean,
    Contact,
    Double,
    Duration,
    Int,
    Null,
    String,
    Time,
    List(Box<Type>),
    Set(Box<Type>),
}

impl Type {
    pub fn list(element: Type) -> Self {
        Type::List(Box::new(element))
    }
    pub fn set(element: Type) -> Self {
        Type::Set(Box::new(element))
    }
    pub fn is_null(&self) -> bool {
        matches!(self, Type::Null)
    }
    pub fn is_collection(&self) -> bool {
        matches!(self, Type::List(_) | Type::Set(_))
    }
    pub fn element_type(&self) -> Option<&Type> {
        match self {
            Type::List(element) | Type::Set(element) => Some(element),
            _ => None,
        }
    }
    /// Two types are compatible when they are identical, when either one is
    /// NULL, or when both are the same kind of collection with compatible
    /// element types.
    pub fn is_compatible(&self, other: &Type) -> bool {
        self.refine(other).is_some()
    }
    /// The most specific type that is compatible with both, if any.
    pub fn refine(&self, other: &Type) -> Option<Type> {
        match (self, other) {
            (Type::Null, t) | (t, Type::Null) => Some(t.clone()),
            (Type::List(a), Type::List(b)) => a.refine(b).map(Type::list),
            (Type::Set(a), Type::Set(b)) => a.refine(b).map(Type::set),
            (a, b) if a == b => Some(a.clone()),
            _ => None,
        }
    }
    pub fn primary_name(&self) -> &'static str {
        match self {
            Type::Boolean => "BOOLEAN",
            Type::Contact => "CONTACT",
            Type::Double => "DOUBLE",
            Type::Duration => "DURATION",
            Type::Int => "INT",
            Type::Null => "NULL",
            Type::String => "STRING",
            Type::Time => "TIME",
            Type::List(_) => "LIST",
            Type::Set(_) => "SET",
        }
    }
}
impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Type::List(element) | Type::Set(element) => {
                write!(f, "{} of ({})", self.primary_name(), element)
            }
            _ => write!(f, "{}", self.primary_name()),
        }
    }
}

// ------------- Operation -------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Equal,
    Compare,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    And,
    Or,
    RegExpr,
    Negate,
    ValueSize,
}
impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Operation::Equal => "EQUAL",
            Operation::Compare => "COMPARE",
            Operation::Add => "ADD",
            Operation::Subtract => "SUBTRACT",
            Operation::Multiply => "MULTIPLY",
            Operation::Divide => "DIVIDE",
            Operation::Modulo => "MODULO",
            Operation::And => "AND",
            Operation::Or => "OR",
            Operation::RegExpr => "REG_EXPR",
            Operation::Negate => "NEGATE",
            Operation::ValueSize => "VALUE_SIZE",
        };
        f.write_str(name)
    }
}

// ------------- Contact -------------
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Contact {
    name: PathName,
    address: IpAddr,
}
impl Contact {
    pub fn new(name: PathName, address: IpAddr) -> Self {
        Self { name, address }
    }
    pub fn name(&self) -> &PathName {
        &self.name
    }
    pub fn address(&self) -> IpAddr {
        self.address
    }
}
impl fmt::Display for Contact {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({}, {})", self.name, self.address)
    }
}

// ------------- Collection -------------
/// Payload of LIST and SET values: a declared element type and the elements,
/// or `None` for a null collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Collection {
    element: Type,
    items: Option<Vec<Value>>,
}
impl Collection {
    pub fn element_type(&self) -> &Type {
        &self.element
    }
    pub fn items(&self) -> Option<&[Value]> {
        self.items.as_deref()
    }
    pub fn len(&self) -> usize {
        self.items.as_ref().map_or(0, Vec::len)
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ------------- Value -------------
/// A dynamically typed value. Every kind except `Null` carries an `Option`
/// payload where `None` is a null of that kind; `Null` is the untyped null.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(Option<bool>),
    Int(Option<i64>),
    Double(Option<f64>),
    /// milliseconds
    Duration(Option<i64>),
    String(Option<String>),
    /// milliseconds since the Unix epoch
    Time(Option<i64>),
    Contact(Option<Contact>),
    List(Collection),
    Set(Collection),
}

impl Value {
    pub fn boolean(b: bool) -> Self {
        Value::Boolean(Some(b))
    }
    pub fn int(i: i64) -> Self {
        Value::Int(Some(i))
    }
    pub fn double(d: f64) -> Self {
        Value::Double(Some(d))
    }
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(Some(s.into()))
    }
    pub fn duration_ms(ms: i64) -> Self {
        Value::Duration(Some(ms))
    }
    pub fn duration(days: i64, hours: i64, minutes: i64, seconds: i64, millis: i64) -> Self {
        Value::Duration(Some(
            days * MILLIS_PER_DAY
                + hours * MILLIS_PER_HOUR
                + minutes * MILLIS_PER_MINUTE
                + seconds * MILLIS_PER_SECOND
                + millis,
        ))
    }
    pub fn time_ms(ms: i64) -> Self {
        Value::Time(Some(ms))
    }
    /// Strict counterpart of the lenient STRING to TIME conversion.
    pub fn time(text: &str) -> Result<Self> {
        parse_time(text)
            .map(Value::time_ms)
            .ok_or_else(|| AtlasError::IllegalArgument(format!("malformed time literal `{text}`")))
    }
    pub fn contact(contact: Contact) -> Self {
        Value::Contact(Some(contact))
    }

    /// Builds a list, rejecting elements incompatible with `element`.
    pub fn list(element: Type, items: Vec<Value>) -> Result<Self> {
        check_elements(&element, &items)?;
        Ok(Value::List(Collection { element, items: Some(items) }))
    }
    /// Builds a set, rejecting incompatible elements and dropping duplicates
    /// (first occurrence wins).
    pub fn set(element: Type, items: Vec<Value>) -> Result<Self> {
        check_elements(&element, &items)?;
        Ok(Value::Set(Collection { element, items: Some(dedup(items)) }))
    }
    /// Builds a list whose element type is inferred from its non-null elements.
    pub fn list_of(items: Vec<Value>) -> Result<Self> {
        let element = element_type_of(&items)?;
        Value::list(element, items)
    }
    pub fn set_of(items: Vec<Value>) -> Result<Self> {
        let element = element_type_of(&items)?;
        Value::set(element, items)
    }

    /// A null carrying the given type.
    pub fn null_of(ty: &Type) -> Self {
        match ty {
            Type::Boolean => Value::Boolean(None),
            Type::Contact => Value::Contact(None),
            Type::Double => Value::Double(None),
            Type::Duration => Value::Duration(None),
            Type::Int => Value::Int(None),
            Type::Null => Value::Null,
            Type::String => Value::String(None),
            Type::Time => Value::Time(None),
            Type::List(element) => Value::List(Collection { element: (**element).clone(), items: None }),
            Type::Set(element) => Value::Set(Collection { element: (**element).clone(), items: None }),
        }
    }
    /// The additive identity of a type, used to seed aggregation folds.
    pub fn default_of(ty: &Type) -> Self {
        match ty {
            Type::Boolean => Value::boolean(false),
            Type::Double => Value::double(0.0),
            Type::Duration => Value::duration_ms(0),
            Type::Int => Value::int(0),
            Type::String => Value::string(""),
            Type::Time => Value::time_ms(0),
            Type::List(element) => Value::List(Collection { element: (**element).clone(), items: Some(Vec::new()) }),
            Type::Set(element) => Value::Set(Collection { element: (**element).clone(), items: Some(Vec::new()) }),
            Type::Contact | Type::Null => Value::null_of(ty),
        }
    }

    pub fn get_type(&self) -> Type {
        match self {
            Value::Null => Type::Null,
            Value::Boolean(_) => Type::Boolean,
            Value::Int(_) => Type::Int,
            Value::Double(_) => Type::Double,
            Value::Duration(_) => Type::Duration,
            Value::String(_) => Type::String,
            Value::Time(_) => Type::Time,
            Value::Contact(_) => Type::Contact,
            Value::List(c) => Type::list(c.element.clone()),
            Value::Set(c) => Type::set(c.element.clone()),
        }
    }
    pub fn is_null(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Boolean(v) => v.is_none(),
            Value::Int(v) => v.is_none(),
            Value::Double(v) => v.is_none(),
            Value::Duration(v) => v.is_none(),
            Value::String(v) => v.is_none(),
            Value::Time(v) => v.is_none(),
            Value::Contact(v) => v.is_none(),
            Value::List(c) | Value::Set(c) => c.items.is_none(),
        }
    }
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => *b,
            _ => None,
        }
    }
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => *i,
            _ => None,
        }
    }
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(d) => *d,
            _ => None,
        }
    }
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => s.as_deref(),
            _ => None,
        }
    }
    /// Elements of a non-null LIST or SET.
    pub fn items(&self) -> Option<&[Value]> {
        match self {
            Value::List(c) | Value::Set(c) => c.items(),
            _ => None,
        }
    }

    fn check_compatible(&self, other: &Value, operation: Operation) -> Result<()> {
        let (left, right) = (self.get_type(), other.get_type());
        if left.is_compatible(&right) {
            Ok(())
        } else {
            Err(AtlasError::incompatible(left, right, operation))
        }
    }
    fn mismatch(&self, other: &Value, operation: Operation) -> AtlasError {
        let (left, right) = (self.get_type(), other.get_type());
        if left.is_compatible(&right) {
            AtlasError::unsupported(left, operation)
        } else {
            AtlasError::incompatible(left, right, operation)
        }
    }

    // ------------- Comparison -------------
    /// Null-aware equality: two nulls are equal, a null and a non-null are not.
    pub fn is_equal(&self, other: &Value) -> Result<Value> {
        let (left, right) = widened(self, other);
        left.equal_widened(&right)
    }
    fn equal_widened(&self, other: &Value) -> Result<Value> {
        self.check_compatible(other, Operation::Equal)?;
        if self.is_null() || other.is_null() {
            return Ok(Value::boolean(self.is_null() && other.is_null()));
        }
        self.equals(other).map(Value::boolean)
    }
    fn equals(&self, other: &Value) -> Result<bool> {
        match (self, other) {
            (Value::Boolean(a), Value::Boolean(b)) => Ok(a == b),
            (Value::Int(a), Value::Int(b)) => Ok(a == b),
            (Value::Double(a), Value::Double(b)) => Ok(a == b),
            (Value::Duration(a), Value::Duration(b)) => Ok(a == b),
            (Value::String(a), Value::String(b)) => Ok(a == b),
            (Value::Time(a), Value::Time(b)) => Ok(a == b),
            (Value::Contact(a), Value::Contact(b)) => Ok(a == b),
            (Value::List(a), Value::List(b)) => {
                let (a, b) = (a.items().unwrap_or_default(), b.items().unwrap_or_default());
                if a.len() != b.len() {
                    return Ok(false);
                }
                for (x, y) in a.iter().zip(b) {
                    if !x.same_as(y) {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            (Value::Set(a), Value::Set(b)) => {
                let (a, b) = (a.items().unwrap_or_default(), b.items().unwrap_or_default());
                Ok(a.len() == b.len() && a.iter().all(|x| b.iter().any(|y| x.same_as(y))))
            }
            _ => Err(self.mismatch(other, Operation::Equal)),
        }
    }
    /// Equality as a plain boolean, treating errors as "not the same".
    pub fn same_as(&self, other: &Value) -> bool {
        matches!(self.is_equal(other), Ok(Value::Boolean(Some(true))))
    }

    pub fn is_lower_than(&self, other: &Value) -> Result<Value> {
        let ordering = self.order(other)?;
        Ok(Value::Boolean(ordering.map(|o| o == Ordering::Less)))
    }
    /// The ordering behind `is_lower_than`, or `None` when either side is null.
    pub fn order(&self, other: &Value) -> Result<Option<Ordering>> {
        let (left, right) = widened(self, other);
        left.order_widened(&right)
    }
    fn order_widened(&self, other: &Value) -> Result<Option<Ordering>> {
        self.check_compatible(other, Operation::Compare)?;
        match (self, other) {
            (Value::Boolean(a), Value::Boolean(b)) => Ok(lift_cmp(a, b, |a, b| a.cmp(b))),
            (Value::Int(a), Value::Int(b)) => Ok(lift_cmp(a, b, |a, b| a.cmp(b))),
            (Value::Double(a), Value::Double(b)) => Ok(lift_cmp(a, b, |a, b| a.total_cmp(b))),
            (Value::Duration(a), Value::Duration(b)) => Ok(lift_cmp(a, b, |a, b| a.cmp(b))),
            (Value::String(a), Value::String(b)) => Ok(lift_cmp(a, b, |a, b| a.cmp(b))),
            (Value::Time(a), Value::Time(b)) => Ok(lift_cmp(a, b, |a, b| a.cmp(b))),
            (Value::Null, Value::Null) => Ok(None),
            (Value::Null, v) | (v, Value::Null) if v.is_orderable() => Ok(None),
            (Value::Null, v) | (v, _) => Err(AtlasError::unsupported(v.get_type(), Operation::Compare)),
        }
    }
    fn is_orderable(&self) -> bool {
        matches!(
            self,
            Value::Boolean(_) | Value::Int(_) | Value::Double(_) | Value::Duration(_) | Value::String(_) | Value::Time(_)
        )
    }

    // ------------- Arithmetic -------------
    pub fn add(&self, other: &Value) -> Result<Value> {
        self.arithmetic(other, Operation::Add)
    }
    pub fn subtract(&self, other: &Value) -> Result<Value> {
        self.arithmetic(other, Operation::Subtract)
    }
    pub fn multiply(&self, other: &Value) -> Result<Value> {
        self.arithmetic(other, Operation::Multiply)
    }
    pub fn divide(&self, other: &Value) -> Result<Value> {
        self.arithmetic(other, Operation::Divide)
    }
    pub fn modulo(&self, other: &Value) -> Result<Value> {
        self.arithmetic(other, Operation::Modulo)
    }

    fn arithmetic(&self, other: &Value, op: Operation) -> Result<Value> {
        use Value::*;
        if matches!(op, Operation::Divide | Operation::Modulo) && matches!(other, Int(Some(0))) {
            return Err(AtlasError::division_by_zero());
        }
        let (left, right) = widened(self, other);
        let (left, right) = (left.as_ref(), right.as_ref());
        match (left, right) {
            (Null, Null) => Ok(Null),
            (Null, typed) | (typed, Null) => typed.null_result(op),
            _ => match op {
                Operation::Add => left.plus(right),
                Operation::Subtract => left.minus(right),
                Operation::Multiply => left.times(right),
                Operation::Divide => left.over(right),
                Operation::Modulo => left.remainder(right),
                _ => Err(AtlasError::unsupported(left.get_type(), op)),
            },
        }
    }
    // The null an operation yields when its other operand is the untyped null.
    fn null_result(&self, op: Operation) -> Result<Value> {
        use Operation::*;
        let result = match (self, op) {
            (Value::Int(_), Add | Subtract | Multiply | Modulo) => Value::Int(None),
            (Value::Int(_), Divide) => Value::Double(None),
            (Value::Double(_), Add | Subtract | Multiply | Divide) => Value::Double(None),
            (Value::Duration(_), Add | Subtract | Multiply | Divide) => Value::Duration(None),
            (Value::Time(_), Add | Subtract) => Value::Time(None),
            (Value::String(_), Add) => Value::String(None),
            (Value::String(_), RegExpr) => Value::Boolean(None),
            (Value::List(_) | Value::Set(_), Add) => Value::null_of(&self.get_type()),
            _ => return Err(AtlasError::unsupported(self.get_type(), op)),
        };
        Ok(result)
    }

    fn plus(&self, other: &Value) -> Result<Value> {
        use Value::*;
        let op = Operation::Add;
        match (self, other) {
            (Int(a), Int(b)) => Ok(Int(lift(a, b, |a, b| a.checked_add(*b).ok_or_else(|| AtlasError::overflow(op)))?)),
            (Double(a), Double(b)) => Ok(Double(lift(a, b, |a, b| Ok(a + b))?)),
            (Duration(a), Duration(b)) => Ok(Duration(lift(a, b, |a, b| a.checked_add(*b).ok_or_else(|| AtlasError::overflow(op)))?)),
            (Time(a), Duration(b)) | (Duration(b), Time(a)) => {
                Ok(Time(lift(a, b, |a, b| a.checked_add(*b).ok_or_else(|| AtlasError::overflow(op)))?))
            }
            (String(a), String(b)) => Ok(String(lift(a, b, |a, b| Ok(format!("{a}{b}")))?)),
            (List(a), List(b)) => {
                let element = combined_element(self, other, op)?;
                let items = lift(&a.items, &b.items, |a, b| Ok(a.iter().chain(b).cloned().collect::<Vec<_>>()))?;
                Ok(List(Collection { element, items }))
            }
            (Set(a), Set(b)) => {
                let element = combined_element(self, other, op)?;
                let items = lift(&a.items, &b.items, |a, b| Ok(dedup(a.iter().chain(b).cloned().collect())))?;
                Ok(Set(Collection { element, items }))
            }
            _ => Err(self.mismatch(other, op)),
        }
    }
    fn minus(&self, other: &Value) -> Result<Value> {
        use Value::*;
        let op = Operation::Subtract;
        let checked = |a: &i64, b: &i64| a.checked_sub(*b).ok_or_else(|| AtlasError::overflow(op));
        match (self, other) {
            (Int(a), Int(b)) => Ok(Int(lift(a, b, checked)?)),
            (Double(a), Double(b)) => Ok(Double(lift(a, b, |a, b| Ok(a - b))?)),
            (Duration(a), Duration(b)) => Ok(Duration(lift(a, b, checked)?)),
            (Time(a), Duration(b)) => Ok(Time(lift(a, b, checked)?)),
            (Time(a), Time(b)) => Ok(Duration(lift(a, b, checked)?)),
            _ => Err(self.mismatch(other, op)),
        }
    }
    fn times(&self, other: &Value) -> Result<Value> {
        use Value::*;
        let op = Operation::Multiply;
        let checked = |a: &i64, b: &i64| a.checked_mul(*b).ok_or_else(|| AtlasError::overflow(op));
        match (self, other) {
            (Int(a), Int(b)) => Ok(Int(lift(a, b, checked)?)),
            (Double(a), Double(b)) => Ok(Double(lift(a, b, |a, b| Ok(a * b))?)),
            (Duration(a), Int(b)) | (Int(b), Duration(a)) => Ok(Duration(lift(a, b, checked)?)),
            _ => Err(self.mismatch(other, op)),
        }
    }
    fn over(&self, other: &Value) -> Result<Value> {
        use Value::*;
        let op = Operation::Divide;
        match (self, other) {
            (Int(a), Int(b)) => Ok(Double(lift(a, b, |a, b| Ok(*a as f64 / *b as f64))?)),
            (Double(a), Double(b)) => Ok(Double(lift(a, b, |a, b| Ok(a / b))?)),
            (Duration(a), Int(b)) => Ok(Duration(lift(a, b, |a, b| a.checked_div(*b).ok_or_else(|| AtlasError::overflow(op)))?)),
            _ => Err(self.mismatch(other, op)),
        }
    }
    fn remainder(&self, other: &Value) -> Result<Value> {
        use Value::*;
        let op = Operation::Modulo;
        match (self, other) {
            (Int(a), Int(b)) => Ok(Int(lift(a, b, |a, b| a.checked_rem(*b).ok_or_else(|| AtlasError::overflow(op)))?)),
            _ => Err(self.mismatch(other, op)),
        }
    }

    // ------------- Logic -------------
    /// Three-valued AND: false wins over null.
    pub fn and(&self, other: &Value) -> Result<Value> {
        let (a, b) = (self.logical(other, Operation::And)?, other.logical(self, Operation::And)?);
        Ok(Value::Boolean(match (a, b) {
            (Some(false), _) | (_, Some(false)) => Some(false),
            (Some(true), Some(true)) => Some(true),
            _ => None,
        }))
    }
    /// Three-valued OR: true wins over null.
    pub fn or(&self, other: &Value) -> Result<Value> {
        let (a, b) = (self.logical(other, Operation::Or)?, other.logical(self, Operation::Or)?);
        Ok(Value::Boolean(match (a, b) {
            (Some(true), _) | (_, Some(true)) => Some(true),
            (Some(false), Some(false)) => Some(false),
            _ => None,
        }))
    }
    fn logical(&self, other: &Value, op: Operation) -> Result<Option<bool>> {
        self.check_compatible(other, op)?;
        match self {
            Value::Boolean(b) => Ok(*b),
            Value::Null => Ok(None),
            _ => Err(AtlasError::unsupported(self.get_type(), op)),
        }
    }

    // ------------- Unary -------------
    /// Logical negation; only BOOLEAN (or the untyped null) qualifies.
    pub fn not(&self) -> Result<Value> {
        match self {
            Value::Boolean(b) => Ok(Value::Boolean(b.map(|b| !b))),
            Value::Null => Ok(Value::Boolean(None)),
            _ => Err(AtlasError::unsupported(self.get_type(), Operation::Negate)),
        }
    }
    pub fn negate(&self) -> Result<Value> {
        let op = Operation::Negate;
        match self {
            Value::Null => Ok(Value::Null),
            Value::Boolean(b) => Ok(Value::Boolean(b.map(|b| !b))),
            Value::Int(i) => Ok(Value::Int(i.map(|i| i.checked_neg().ok_or_else(|| AtlasError::overflow(op))).transpose()?)),
            Value::Double(d) => Ok(Value::Double(d.map(|d| -d))),
            Value::Duration(d) => Ok(Value::Duration(d.map(|d| d.checked_neg().ok_or_else(|| AtlasError::overflow(op))).transpose()?)),
            _ => Err(AtlasError::unsupported(self.get_type(), op)),
        }
    }
    /// Length of a string, element count of a collection.
    pub fn value_size(&self) -> Result<Value> {
        match self {
            Value::Null => Ok(Value::Int(None)),
            Value::String(s) => Ok(Value::Int(s.as_ref().map(|s| s.chars().count() as i64))),
            Value::List(c) | Value::Set(c) => Ok(Value::Int(c.items.as_ref().map(|i| i.len() as i64))),
            _ => Err(AtlasError::unsupported(self.get_type(), Operation::ValueSize)),
        }
    }

    // ------------- Regular expressions -------------
    /// Whether the whole string matches `pattern`.
    pub fn matches(&self, pattern: &Value) -> Result<Value> {
        let op = Operation::RegExpr;
        match (self, pattern) {
            (Value::String(s), Value::String(p)) => Ok(Value::Boolean(lift(s, p, |s, p| Ok(compiled(p)?.is_match(s)))?)),
            (Value::Null, Value::String(_)) | (Value::String(_), Value::Null) => Ok(Value::Boolean(None)),
            _ => Err(self.mismatch(pattern, op)),
        }
    }

    // ------------- Conversion -------------
    pub fn convert_to(&self, to: &Type) -> Result<Value> {
        use Value::*;
        let converted = match (self, to) {
            (_, Type::String) => String(Some(self.to_string())),
            (Null, t) => Value::null_of(t),
            (Boolean(_), Type::Boolean)
            | (Int(_), Type::Int)
            | (Double(_), Type::Double)
            | (Duration(_), Type::Duration)
            | (Time(_), Type::Time)
            | (Contact(_), Type::Contact)
            | (List(_), Type::List(_))
            | (Set(_), Type::Set(_)) => self.clone(),
            (Int(i), Type::Double) => Double(i.map(|i| i as f64)),
            (Int(i), Type::Duration) => Duration(*i),
            (Double(d), Type::Int) => Int(d.map(|d| d as i64)),
            (Duration(d), Type::Int) => Int(*d),
            (Duration(d), Type::Double) => Double(d.map(|d| d as f64)),
            (String(s), Type::Boolean) => Boolean(s.as_deref().and_then(parse_boolean)),
            (String(s), Type::Int) => Int(s.as_deref().and_then(|s| s.trim().parse().ok())),
            (String(s), Type::Double) => Double(s.as_deref().and_then(|s| s.trim().parse().ok())),
            (String(s), Type::Duration) => Duration(s.as_deref().and_then(parse_duration)),
            (String(s), Type::Time) => Time(s.as_deref().and_then(parse_time)),
            (List(c), Type::Set(_)) => Set(Collection { element: c.element.clone(), items: c.items.clone().map(dedup) }),
            (Set(c), Type::List(_)) => List(c.clone()),
            _ => return Err(AtlasError::conversion(self.get_type(), to.clone())),
        };
        Ok(converted)
    }
}

/// Nulls print as `NULL`; the result of converting anything to STRING.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_null() {
            return f.write_str("NULL");
        }
        match self {
            Value::Boolean(Some(b)) => write!(f, "{b}"),
            Value::Int(Some(i)) => write!(f, "{i}"),
            Value::Double(Some(d)) => write!(f, "{d}"),
            Value::Duration(Some(d)) => f.write_str(&format_duration(*d)),
            Value::String(Some(s)) => f.write_str(s),
            Value::Time(Some(t)) => f.write_str(&format_time(*t)),
            Value::Contact(Some(c)) => write!(f, "{c}"),
            Value::List(c) => write_items(f, c.items().unwrap_or_default(), "[", "]"),
            Value::Set(c) => write_items(f, c.items().unwrap_or_default(), "{", "}"),
            _ => f.write_str("NULL"),
        }
    }
}

fn write_items(f: &mut fmt::Formatter, items: &[Value], open: &str, close: &str) -> fmt::Result {
    f.write_str(open)?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    f.write_str(close)
}

// ------------- Helpers -------------
/// INT next to DOUBLE is read as DOUBLE, so `cpu_usage > 0` compares numbers.
fn widened<'a>(a: &'a Value, b: &'a Value) -> (Cow<'a, Value>, Cow<'a, Value>) {
    match (a, b) {
        (Value::Int(i), Value::Double(_)) => (Cow::Owned(Value::Double(i.map(|i| i as f64))), Cow::Borrowed(b)),
        (Value::Double(_), Value::Int(i)) => (Cow::Borrowed(a), Cow::Owned(Value::Double(i.map(|i| i as f64)))),
        _ => (Cow::Borrowed(a), Cow::Borrowed(b)),
    }
}

fn lift<A, B, R>(a: &Option<A>, b: &Option<B>, f: impl FnOnce(&A, &B) -> Result<R>) -> Result<Option<R>> {
    match (a, b) {
        (Some(a), Some(b)) => f(a, b).map(Some),
        _ => Ok(None),
    }
}

fn lift_cmp<T>(a: &Option<T>, b: &Option<T>, f: impl FnOnce(&T, &T) -> Ordering) -> Option<Ordering> {
    match (a, b) {
        (Some(a), Some(b)) => Some(f(a, b)),
        _ => None,
    }
}

fn combined_element(left: &Value, right: &Value, op: Operation) -> Result<Type> {
    let (l, r) = (left.get_type(), right.get_type());
    match (l.element_type(), r.element_type()) {
        (Some(a), Some(b)) => a.refine(b).ok_or_else(|| AtlasError::incompatible(l.clone(), r.clone(), op)),
        _ => Err(AtlasError::incompatible(l, r, op)),
    }
}

fn check_elements(element: &Type, items: &[Value]) -> Result<()> {
    for item in items {
        let ty = item.get_type();
        if !element.is_compatible(&ty) {
            return Err(AtlasError::IllegalArgument(format!(
                "element of type {ty} does not fit a collection of {element}"
            )));
        }
    }
    Ok(())
}

/// The common type of the non-null elements, `NULL` when there are none.
pub fn element_type_of(items: &[Value]) -> Result<Type> {
    let mut found = Type::Null;
    for item in items.iter().filter(|v| !v.is_null()) {
        let ty = item.get_type();
        found = found.refine(&ty).ok_or_else(|| {
            AtlasError::IllegalArgument("Collection has non-null elements of different types.".into())
        })?;
    }
    Ok(found)
}

fn dedup(items: Vec<Value>) -> Vec<Value> {
    let mut kept: Vec<Value> = Vec::with_capacity(items.len());
    for item in items {
        if !kept.iter().any(|k| k.same_as(&item)) {
            kept.push(item);
        }
    }
    kept
}

fn compiled(pattern: &str) -> Result<Regex> {
    let mut cache = PATTERNS.lock()?;
    if let Some(regex) = cache.get(pattern) {
        return Ok(regex.clone());
    }
    let regex = Regex::new(&format!("^(?:{pattern})$"))
        .map_err(|e| AtlasError::IllegalArgument(format!("invalid regular expression `{pattern}`: {e}")))?;
    cache.insert(pattern.to_string(), regex.clone());
    Ok(regex)
}

fn parse_boolean(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

pub fn format_time(ms: i64) -> String {
    match DateTime::<Utc>::from_timestamp_millis(ms) {
        Some(t) => t.format(TIME_FORMAT).to_string(),
        None => ms.to_string(),
    }
}

pub fn parse_time(text: &str) -> Option<i64> {
    NaiveDateTime::parse_from_str(text.trim(), TIME_PARSE_FORMAT)
        .ok()
        .map(|t| t.and_utc().timestamp_millis())
}

pub fn format_duration(ms: i64) -> String {
    let sign = if ms < 0 { '-' } else { '+' };
    let abs = ms.unsigned_abs();
    let day = MILLIS_PER_DAY as u64;
    let (days, rest) = (abs / day, abs % day);
    format!(
        "{sign}{days} {:02}:{:02}:{:02}.{:03}",
        rest / MILLIS_PER_HOUR as u64,
        rest / MILLIS_PER_MINUTE as u64 % 60,
        rest / MILLIS_PER_SECOND as u64 % 60,
        rest % MILLIS_PER_SECOND as u64
    )
}

pub fn parse_duration(text: &str) -> Option<i64> {
    let caps = DURATION.captures(text.trim())?;
    let field = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<i64>().ok());
    let (days, hours, minutes, seconds) = (field(2)?, field(3)?, field(4)?, field(5)?);
    // the fraction is written with up to three digits, ".5" meaning 500 ms
    let fraction = caps.get(6)?.as_str();
    let millis = format!("{fraction:0<3}").parse::<i64>().ok()?;
    if hours > 23 || minutes > 59 || seconds > 59 {
        return None;
    }
    let magnitude = days
        .checked_mul(MILLIS_PER_DAY)?
        .checked_add(hours * MILLIS_PER_HOUR + minutes * MILLIS_PER_MINUTE + seconds * MILLIS_PER_SECOND + millis)?;
    if &caps[1] == "-" { Some(-magnitude) } else { Some(magnitude) }
}

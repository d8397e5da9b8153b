//! Evaluates parsed queries against the table built from a zone's children.
//!
//! A statement runs in four steps: the table is built, WHERE keeps the rows
//! whose predicate is true, ORDER BY sorts them, and every SELECT item is
//! evaluated once against the resulting table. Errors carry the text of each
//! enclosing construct, outermost first.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;

use crate::ast::*;
use crate::construct::{Attribute, AttributesMap};
use crate::datatype::Value;
use crate::error::{AtlasError, Result};
use crate::functions;
use crate::result::ResultSet;
use crate::table::{Environment, Table};

/// One named output of a query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub name: Option<Attribute>,
    pub value: Value,
}

type BinaryOp = fn(&Value, &Value) -> Result<Value>;

pub struct Interpreter {
    table: Table,
}

impl Interpreter {
    pub fn new(table: Table) -> Self {
        Self { table }
    }
    pub fn from_children(children: &[AttributesMap]) -> Self {
        Self::new(Table::from_children(children))
    }
    pub fn table(&self) -> &Table {
        &self.table
    }

    /// Runs every statement and stops at the first failure. All top-level
    /// items must be aliased and the aliases distinct, which is checked
    /// before anything is evaluated.
    pub fn interpret_program(&self, program: &Program) -> Result<Vec<QueryResult>> {
        let mut results = Vec::new();
        for outcome in self.interpret_each(program)? {
            results.extend(outcome?);
        }
        Ok(results)
    }

    /// Runs every statement on its own: a failing statement yields its error
    /// in place and the others still produce their results. Only validation
    /// fails the program as a whole.
    pub fn interpret_each(&self, program: &Program) -> Result<Vec<Result<Vec<QueryResult>>>> {
        program.validate()?;
        Ok(program
            .statements
            .iter()
            .map(|statement| wrap(statement, || self.select(statement, true)))
            .collect())
    }

    pub fn interpret_statement(&self, statement: &Statement) -> Result<Vec<QueryResult>> {
        wrap(statement, || self.select(statement, false))
    }

    fn select(&self, statement: &Statement, top_level: bool) -> Result<Vec<QueryResult>> {
        let filtered = self.filter(statement.filter.as_ref())?;
        let ordered = self.order(filtered, &statement.order_by)?;
        let env = Environment::table(&ordered);
        let mut aliases = HashSet::new();
        let mut results = Vec::with_capacity(statement.select.len());
        for item in &statement.select {
            let name = match &item.alias {
                Some(alias) => {
                    let attribute = Attribute::new(alias)?;
                    if attribute.is_query() {
                        return Err(AtlasError::IllegalArgument(format!(
                            "query results cannot be stored in query attribute {attribute}"
                        )));
                    }
                    if !aliases.insert(alias.as_str()) {
                        return Err(AtlasError::AliasCollision(alias.clone()));
                    }
                    Some(attribute)
                }
                None if top_level => return Err(AtlasError::UnaliasedItem(item.to_string())),
                None => None,
            };
            let value = wrap(item, || self.eval_cond(&item.expr, env)?.into_value())?;
            results.push(QueryResult { name, value });
        }
        Ok(results)
    }

    fn filter(&self, cond: Option<&CondExpr>) -> Result<Table> {
        let Some(cond) = cond else {
            return Ok(self.table.clone());
        };
        let mut filtered = Table::empty_like(&self.table);
        for row in self.table.rows() {
            let env = Environment::row(row, &self.table);
            let keep = wrap(&Clause("WHERE", cond), || {
                match self.eval_cond(cond, env)?.into_value()? {
                    Value::Boolean(b) => Ok(b == Some(true)),
                    Value::Null => Ok(false),
                    other => Err(AtlasError::InvalidType {
                        expected: "BOOLEAN".into(),
                        actual: other.get_type().to_string(),
                    }),
                }
            })?;
            if keep {
                filtered.append_row(row.clone())?;
            }
        }
        Ok(filtered)
    }

    fn order(&self, mut table: Table, items: &[OrderItem]) -> Result<Table> {
        if items.is_empty() {
            return Ok(table);
        }
        let mut keys: Vec<Vec<Value>> = Vec::with_capacity(table.len());
        for row in table.rows() {
            let env = Environment::row(row, &table);
            let row_keys = items
                .iter()
                .map(|item| wrap(item, || self.eval_cond(&item.expr, env)?.into_value()))
                .collect::<Result<Vec<_>>>();
            keys.push(row_keys.map_err(|e| AtlasError::inside(order_clause(items), e))?);
        }
        let mut permutation: Vec<usize> = (0..table.len()).collect();
        let mut failure = None;
        permutation.sort_by(|&a, &b| {
            for (i, item) in items.iter().enumerate() {
                match compare_keys(&keys[a][i], &keys[b][i], item) {
                    Ok(Ordering::Equal) => continue,
                    Ok(ordering) => return ordering,
                    Err(e) => {
                        failure.get_or_insert_with(|| AtlasError::inside(item.to_string(), e));
                        return Ordering::Equal;
                    }
                }
            }
            Ordering::Equal
        });
        if let Some(e) = failure {
            return Err(AtlasError::inside(order_clause(items), e));
        }
        table.reorder(&permutation)?;
        Ok(table)
    }

    // ------------- Expressions -------------
    fn eval_cond(&self, expr: &CondExpr, env: Environment) -> Result<ResultSet> {
        match expr {
            CondExpr::Or(l, r) => wrap(expr, || self.eval_cond(l, env)?.binary(&self.eval_cond(r, env)?, Value::or)),
            CondExpr::And(l, r) => wrap(expr, || self.eval_cond(l, env)?.binary(&self.eval_cond(r, env)?, Value::and)),
            CondExpr::Not(e) => wrap(expr, || self.eval_cond(e, env)?.unary(Value::not)),
            CondExpr::Bool(e) => self.eval_bool(e, env),
        }
    }

    fn eval_bool(&self, expr: &BoolExpr, env: Environment) -> Result<ResultSet> {
        match expr {
            BoolExpr::Cmp(l, op, r) => wrap(expr, || {
                let (left, right) = (self.eval_basic(l, env)?, self.eval_basic(r, env)?);
                left.binary(&right, |a, b| compare(a, *op, b))
            }),
            BoolExpr::RegExp(e, pattern) => wrap(expr, || {
                let pattern = Value::string(pattern.as_str());
                self.eval_basic(e, env)?.unary(|v| v.matches(&pattern))
            }),
            BoolExpr::Basic(e) => self.eval_basic(e, env),
        }
    }

    fn eval_basic(&self, expr: &BasicExpr, env: Environment) -> Result<ResultSet> {
        match expr {
            BasicExpr::Arith(l, op, r) => wrap(expr, || {
                let f: BinaryOp = match op {
                    ArithOp::Add => Value::add,
                    ArithOp::Sub => Value::subtract,
                    ArithOp::Mul => Value::multiply,
                    ArithOp::Div => Value::divide,
                    ArithOp::Mod => Value::modulo,
                };
                self.eval_basic(l, env)?.binary(&self.eval_basic(r, env)?, f)
            }),
            BasicExpr::Neg(e) => wrap(expr, || self.eval_basic(e, env)?.unary(Value::negate)),
            BasicExpr::Ident(name) => env.resolve(name),
            BasicExpr::Call(name, args) => wrap(expr, || {
                let args = args.iter().map(|a| self.eval_cond(a, env)).collect::<Result<Vec<_>>>()?;
                functions::call(name, &args)
            }),
            BasicExpr::Str(s) => Ok(ResultSet::Single(Value::string(s.as_str()))),
            BasicExpr::Bool(b) => Ok(ResultSet::Single(Value::boolean(*b))),
            BasicExpr::Int(i) => Ok(ResultSet::Single(Value::int(*i))),
            BasicExpr::Double(d) => Ok(ResultSet::Single(Value::double(*d))),
            BasicExpr::Paren(e) => self.eval_cond(e, env),
            BasicExpr::Stmt(statement) => wrap(expr, || self.nested(statement)),
        }
    }

    // A nested query runs against the same children as the enclosing one.
    fn nested(&self, statement: &Statement) -> Result<ResultSet> {
        if statement.select.len() != 1 {
            return Err(AtlasError::IllegalArgument("Nested queries must SELECT exactly one item.".into()));
        }
        let result = self
            .select(statement, false)?
            .into_iter()
            .next()
            .ok_or_else(|| AtlasError::Invariant("nested query produced no result".into()))?;
        Ok(ResultSet::Single(result.value))
    }
}

fn wrap<N: fmt::Display, T>(node: &N, f: impl FnOnce() -> Result<T>) -> Result<T> {
    f().map_err(|e| AtlasError::inside(node.to_string(), e))
}

// Prints a clause keyword in front of its condition.
struct Clause<'a>(&'static str, &'a CondExpr);
impl fmt::Display for Clause<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}", self.0, self.1)
    }
}

fn order_clause(items: &[OrderItem]) -> String {
    let items: Vec<String> = items.iter().map(ToString::to_string).collect();
    format!("ORDER BY {}", items.join(", "))
}

/// Relational operators built from equality and `is_lower_than`.
pub fn compare(a: &Value, op: RelOp, b: &Value) -> Result<Value> {
    match op {
        RelOp::Eq => a.is_equal(b),
        RelOp::Ne => a.is_equal(b)?.not(),
        RelOp::Lt => a.is_lower_than(b),
        RelOp::Le => a.is_lower_than(b)?.or(&a.is_equal(b)?),
        RelOp::Gt => a.is_lower_than(b)?.not()?.and(&a.is_equal(b)?.not()?),
        RelOp::Ge => a.is_lower_than(b)?.not(),
    }
}

// Nulls come first unless NULLS LAST is given; ASC/DESC only orders non-nulls.
fn compare_keys(a: &Value, b: &Value, item: &OrderItem) -> Result<Ordering> {
    let nulls_last = item.nulls == Nulls::Last;
    match (a.is_null(), b.is_null()) {
        (true, true) => Ok(Ordering::Equal),
        (true, false) => Ok(if nulls_last { Ordering::Greater } else { Ordering::Less }),
        (false, true) => Ok(if nulls_last { Ordering::Less } else { Ordering::Greater }),
        (false, false) => {
            let ordering = a.order(b)?.unwrap_or(Ordering::Equal);
            Ok(if item.order == Order::Desc { ordering.reverse() } else { ordering })
        }
    }
}

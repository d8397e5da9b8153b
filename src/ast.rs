//! Syntax tree of the zone query language.
//!
//! Every node prints back to canonical query text through `Display`; the
//! evaluator uses that text to tell where inside a query an error happened.

use std::collections::HashSet;
use std::fmt;

use crate::error::{AtlasError, Result};

// ------------- Program -------------
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub statements: Vec<Statement>,
}

impl Program {
    /// Checks that hold before anything is evaluated: every top-level item
    /// carries an alias and no alias is used twice.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for statement in &self.statements {
            for item in &statement.select {
                let alias = item
                    .alias
                    .as_ref()
                    .ok_or_else(|| AtlasError::UnaliasedItem(item.to_string()))?;
                if !seen.insert(alias.as_str()) {
                    return Err(AtlasError::AliasCollision(alias.clone()));
                }
            }
        }
        Ok(())
    }
}
impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, statement) in self.statements.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{statement}")?;
        }
        Ok(())
    }
}

// ------------- Statement -------------
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub select: Vec<SelItem>,
    pub filter: Option<CondExpr>,
    pub order_by: Vec<OrderItem>,
}
impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("SELECT ")?;
        write_list(f, &self.select)?;
        if let Some(filter) = &self.filter {
            write!(f, " WHERE {filter}")?;
        }
        if !self.order_by.is_empty() {
            f.write_str(" ORDER BY ")?;
            write_list(f, &self.order_by)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelItem {
    pub expr: CondExpr,
    pub alias: Option<String>,
}
impl fmt::Display for SelItem {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.alias {
            Some(alias) => write!(f, "{} AS {}", self.expr, alias),
            None => write!(f, "{}", self.expr),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    #[default]
    Unspecified,
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Nulls {
    #[default]
    Unspecified,
    First,
    Last,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderItem {
    pub expr: CondExpr,
    pub order: Order,
    pub nulls: Nulls,
}
impl fmt::Display for OrderItem {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.expr)?;
        match self.order {
            Order::Asc => f.write_str(" ASC")?,
            Order::Desc => f.write_str(" DESC")?,
            Order::Unspecified => (),
        }
        match self.nulls {
            Nulls::First => f.write_str(" NULLS FIRST"),
            Nulls::Last => f.write_str(" NULLS LAST"),
            Nulls::Unspecified => Ok(()),
        }
    }
}

// ------------- Expressions -------------
#[derive(Debug, Clone, PartialEq)]
pub enum CondExpr {
    Or(Box<CondExpr>, Box<CondExpr>),
    And(Box<CondExpr>, Box<CondExpr>),
    Not(Box<CondExpr>),
    Bool(BoolExpr),
}
impl fmt::Display for CondExpr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CondExpr::Or(l, r) => write!(f, "{l} OR {r}"),
            CondExpr::And(l, r) => {
                write_operand(f, l, matches!(**l, CondExpr::Or(..)))?;
                f.write_str(" AND ")?;
                write_operand(f, r, matches!(**r, CondExpr::Or(..)))
            }
            CondExpr::Not(e) => {
                f.write_str("NOT ")?;
                write_operand(f, e, matches!(**e, CondExpr::Or(..) | CondExpr::And(..)))
            }
            CondExpr::Bool(e) => write!(f, "{e}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}
impl fmt::Display for RelOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            RelOp::Eq => "=",
            RelOp::Ne => "<>",
            RelOp::Lt => "<",
            RelOp::Le => "<=",
            RelOp::Gt => ">",
            RelOp::Ge => ">=",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BoolExpr {
    Cmp(BasicExpr, RelOp, BasicExpr),
    RegExp(BasicExpr, String),
    Basic(BasicExpr),
}
impl fmt::Display for BoolExpr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BoolExpr::Cmp(l, op, r) => write!(f, "{l} {op} {r}"),
            BoolExpr::RegExp(e, pattern) => write!(f, "{e} REGEXP {}", quote(pattern)),
            BoolExpr::Basic(e) => write!(f, "{e}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}
impl ArithOp {
    fn binds_tighter(&self) -> bool {
        matches!(self, ArithOp::Mul | ArithOp::Div | ArithOp::Mod)
    }
}
impl fmt::Display for ArithOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
            ArithOp::Mod => "%",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BasicExpr {
    Arith(Box<BasicExpr>, ArithOp, Box<BasicExpr>),
    Neg(Box<BasicExpr>),
    Ident(String),
    Call(String, Vec<CondExpr>),
    Str(String),
    Bool(bool),
    Int(i64),
    Double(f64),
    Paren(Box<CondExpr>),
    Stmt(Box<Statement>),
}
impl fmt::Display for BasicExpr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BasicExpr::Arith(l, op, r) => {
                // left-associative: a right operand of equal strength needs parentheses
                let wrap_left = op.binds_tighter() && matches!(**l, BasicExpr::Arith(_, o, _) if !o.binds_tighter());
                let wrap_right = matches!(**r, BasicExpr::Arith(_, o, _) if op.binds_tighter() || !o.binds_tighter());
                write_operand(f, l, wrap_left)?;
                write!(f, " {op} ")?;
                write_operand(f, r, wrap_right)
            }
            BasicExpr::Neg(e) => {
                f.write_str("-")?;
                write_operand(f, e, matches!(**e, BasicExpr::Arith(..)))
            }
            BasicExpr::Ident(name) => f.write_str(name),
            BasicExpr::Call(name, args) => {
                write!(f, "{name}(")?;
                write_list(f, args)?;
                f.write_str(")")
            }
            BasicExpr::Str(s) => f.write_str(&quote(s)),
            BasicExpr::Bool(b) => write!(f, "{b}"),
            BasicExpr::Int(i) => write!(f, "{i}"),
            BasicExpr::Double(d) => f.write_str(&double_literal(*d)),
            BasicExpr::Paren(e) => write!(f, "({e})"),
            BasicExpr::Stmt(s) => write!(f, "({s})"),
        }
    }
}

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

fn write_operand<T: fmt::Display>(f: &mut fmt::Formatter, operand: &T, parenthesize: bool) -> fmt::Result {
    if parenthesize {
        write!(f, "({operand})")
    } else {
        write!(f, "{operand}")
    }
}

// Plain decimal digits with a fraction, never exponent notation.
fn double_literal(d: f64) -> String {
    let text = d.to_string();
    if text.contains('.') { text } else { format!("{text}.0") }
}

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

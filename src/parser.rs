//! Text to syntax tree. The grammar lives in `query.pest`; this module folds
//! the pest pairs into the [`crate::ast`] types.

use std::str::FromStr;

use pest::Parser;
use pest::error::LineColLocation;
use pest::iterators::{Pair, Pairs};
use pest_derive::Parser;

use crate::ast::*;
use crate::error::{AtlasError, Result};

#[derive(Parser)]
#[grammar = "query.pest"]
struct QueryParser;

/// Parses `;`-separated statements.
pub fn parse_program(text: &str) -> Result<Program> {
    let mut pairs = QueryParser::parse(Rule::program, text).map_err(parse_error)?;
    let program = next(&mut pairs)?;
    let statements = program
        .into_inner()
        .filter(|p| p.as_rule() == Rule::statement)
        .map(build_statement)
        .collect::<Result<Vec<_>>>()?;
    Ok(Program { statements })
}

impl FromStr for Program {
    type Err = AtlasError;
    fn from_str(text: &str) -> Result<Self> {
        parse_program(text)
    }
}

fn parse_error(e: pest::error::Error<Rule>) -> AtlasError {
    let (line, col) = match e.line_col {
        LineColLocation::Pos((l, c)) => (l, c),
        LineColLocation::Span((l, c), _) => (l, c),
    };
    AtlasError::Parse { message: format!("{} at {line}:{col}", e.variant.message()), line: Some(line), col: Some(col) }
}

fn malformed(pair: &Pair<Rule>, message: &str) -> AtlasError {
    let (line, col) = pair.line_col();
    AtlasError::Parse { message: format!("{message} `{}` at {line}:{col}", pair.as_str()), line: Some(line), col: Some(col) }
}

fn next<'i>(pairs: &mut Pairs<'i, Rule>) -> Result<Pair<'i, Rule>> {
    pairs.next().ok_or_else(|| AtlasError::Invariant("parse tree ended early".into()))
}

fn unexpected(pair: &Pair<Rule>) -> AtlasError {
    AtlasError::Invariant(format!("unexpected {:?} in parse tree", pair.as_rule()))
}

// keywords are kept in the tree but carry nothing
fn is_keyword(rule: Rule) -> bool {
    matches!(
        rule,
        Rule::kw_select
            | Rule::kw_where
            | Rule::kw_order
            | Rule::kw_by
            | Rule::kw_as
            | Rule::kw_nulls
            | Rule::kw_and
            | Rule::kw_or
            | Rule::kw_not
            | Rule::kw_regexp
    )
}

fn build_statement(pair: Pair<Rule>) -> Result<Statement> {
    let mut statement = Statement { select: Vec::new(), filter: None, order_by: Vec::new() };
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::sel_item => statement.select.push(build_sel_item(inner)?),
            Rule::where_clause => {
                let cond = inner.into_inner().find(|p| p.as_rule() == Rule::cond_expr);
                statement.filter = Some(build_cond(cond.ok_or_else(|| AtlasError::Invariant("WHERE without condition".into()))?)?);
            }
            Rule::order_clause => {
                for item in inner.into_inner().filter(|p| p.as_rule() == Rule::order_item) {
                    statement.order_by.push(build_order_item(item)?);
                }
            }
            rule if is_keyword(rule) => (),
            _ => return Err(unexpected(&inner)),
        }
    }
    Ok(statement)
}

fn build_sel_item(pair: Pair<Rule>) -> Result<SelItem> {
    let mut expr = None;
    let mut alias = None;
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::cond_expr => expr = Some(build_cond(inner)?),
            Rule::identifier => alias = Some(inner.as_str().to_string()),
            rule if is_keyword(rule) => (),
            _ => return Err(unexpected(&inner)),
        }
    }
    let expr = expr.ok_or_else(|| AtlasError::Invariant("select item without expression".into()))?;
    Ok(SelItem { expr, alias })
}

fn build_order_item(pair: Pair<Rule>) -> Result<OrderItem> {
    let mut expr = None;
    let mut order = Order::Unspecified;
    let mut nulls = Nulls::Unspecified;
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::cond_expr => expr = Some(build_cond(inner)?),
            Rule::direction => {
                order = match inner.into_inner().next().map(|p| p.as_rule()) {
                    Some(Rule::kw_desc) => Order::Desc,
                    _ => Order::Asc,
                }
            }
            Rule::nulls => {
                nulls = if inner.into_inner().any(|p| p.as_rule() == Rule::kw_last) { Nulls::Last } else { Nulls::First }
            }
            _ => return Err(unexpected(&inner)),
        }
    }
    let expr = expr.ok_or_else(|| AtlasError::Invariant("order item without expression".into()))?;
    Ok(OrderItem { expr, order, nulls })
}

fn build_cond(pair: Pair<Rule>) -> Result<CondExpr> {
    let mut operands = pair.into_inner().filter(|p| p.as_rule() == Rule::and_expr);
    let first = operands.next().ok_or_else(|| AtlasError::Invariant("empty condition".into()))?;
    let mut expr = build_and(first)?;
    for operand in operands {
        expr = CondExpr::Or(Box::new(expr), Box::new(build_and(operand)?));
    }
    Ok(expr)
}

fn build_and(pair: Pair<Rule>) -> Result<CondExpr> {
    let mut operands = pair.into_inner().filter(|p| p.as_rule() == Rule::not_expr);
    let first = operands.next().ok_or_else(|| AtlasError::Invariant("empty conjunction".into()))?;
    let mut expr = build_not(first)?;
    for operand in operands {
        expr = CondExpr::And(Box::new(expr), Box::new(build_not(operand)?));
    }
    Ok(expr)
}

fn build_not(pair: Pair<Rule>) -> Result<CondExpr> {
    let mut inner = pair.into_inner();
    let first = next(&mut inner)?;
    match first.as_rule() {
        Rule::kw_not => Ok(CondExpr::Not(Box::new(build_not(next(&mut inner)?)?))),
        Rule::bool_expr => Ok(CondExpr::Bool(build_bool(first)?)),
        _ => Err(unexpected(&first)),
    }
}

fn build_bool(pair: Pair<Rule>) -> Result<BoolExpr> {
    let mut inner = pair.into_inner();
    let left = build_basic(next(&mut inner)?)?;
    let Some(operator) = inner.next() else {
        return Ok(BoolExpr::Basic(left));
    };
    match operator.as_rule() {
        Rule::rel_op => {
            let op = match operator.as_str() {
                "=" => RelOp::Eq,
                "<>" => RelOp::Ne,
                "<" => RelOp::Lt,
                "<=" => RelOp::Le,
                ">" => RelOp::Gt,
                ">=" => RelOp::Ge,
                _ => return Err(malformed(&operator, "unknown comparison")),
            };
            Ok(BoolExpr::Cmp(left, op, build_basic(next(&mut inner)?)?))
        }
        Rule::kw_regexp => Ok(BoolExpr::RegExp(left, build_string(next(&mut inner)?)?)),
        _ => Err(unexpected(&operator)),
    }
}

fn build_basic(pair: Pair<Rule>) -> Result<BasicExpr> {
    let mut inner = pair.into_inner();
    let mut expr = build_term(next(&mut inner)?)?;
    while let Some(operator) = inner.next() {
        let op = if operator.as_str() == "+" { ArithOp::Add } else { ArithOp::Sub };
        let right = build_term(next(&mut inner)?)?;
        expr = BasicExpr::Arith(Box::new(expr), op, Box::new(right));
    }
    Ok(expr)
}

fn build_term(pair: Pair<Rule>) -> Result<BasicExpr> {
    let mut inner = pair.into_inner();
    let mut expr = build_factor(next(&mut inner)?)?;
    while let Some(operator) = inner.next() {
        let op = match operator.as_str() {
            "*" => ArithOp::Mul,
            "/" => ArithOp::Div,
            _ => ArithOp::Mod,
        };
        let right = build_factor(next(&mut inner)?)?;
        expr = BasicExpr::Arith(Box::new(expr), op, Box::new(right));
    }
    Ok(expr)
}

fn build_factor(pair: Pair<Rule>) -> Result<BasicExpr> {
    let mut inner = pair.into_inner();
    let first = next(&mut inner)?;
    match first.as_rule() {
        Rule::neg => Ok(BasicExpr::Neg(Box::new(build_factor(next(&mut inner)?)?))),
        Rule::atom => build_atom(first),
        _ => Err(unexpected(&first)),
    }
}

fn build_atom(pair: Pair<Rule>) -> Result<BasicExpr> {
    let inner = next(&mut pair.into_inner())?;
    match inner.as_rule() {
        Rule::statement => Ok(BasicExpr::Stmt(Box::new(build_statement(inner)?))),
        Rule::cond_expr => Ok(BasicExpr::Paren(Box::new(build_cond(inner)?))),
        Rule::call => {
            let mut parts = inner.into_inner();
            let name = next(&mut parts)?.as_str().to_string();
            let args = parts.map(build_cond).collect::<Result<Vec<_>>>()?;
            Ok(BasicExpr::Call(name, args))
        }
        Rule::boolean => Ok(BasicExpr::Bool(inner.as_str() == "true")),
        Rule::double => inner
            .as_str()
            .parse()
            .map(BasicExpr::Double)
            .map_err(|_| malformed(&inner, "malformed double literal")),
        Rule::integer => inner
            .as_str()
            .parse()
            .map(BasicExpr::Int)
            .map_err(|_| malformed(&inner, "integer literal out of range")),
        Rule::string => Ok(BasicExpr::Str(build_string(inner)?)),
        Rule::identifier => Ok(BasicExpr::Ident(inner.as_str().to_string())),
        _ => Err(unexpected(&inner)),
    }
}

fn build_string(pair: Pair<Rule>) -> Result<String> {
    let raw = pair.into_inner().next().map_or("", |p| p.as_str());
    let mut text = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    text.push(escaped);
                }
            }
            _ => text.push(c),
        }
    }
    Ok(text)
}

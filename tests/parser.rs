use cloudatlas::ast::{BasicExpr, BoolExpr, CondExpr, Nulls, Order, Program};
use cloudatlas::error::AtlasError;
use cloudatlas::parser::parse_program;
use pretty_assertions::assert_eq;

fn canonical(text: &str) -> String {
    parse_program(text).unwrap_or_else(|e| panic!("`{text}` should parse: {e}")).to_string()
}

#[test]
fn canonical_text_round_trips() {
    let queries = [
        "SELECT avg(cpu_usage) AS cpu_usage WHERE cpu_usage > 0",
        "SELECT to_set(unfold(contacts)) AS contacts ORDER BY name DESC NULLS LAST",
        "SELECT count(name) AS n WHERE name REGEXP \"khaki.*\" AND NOT has_ups",
        "SELECT (SELECT count(name)) + 1 AS n; SELECT epoch() AS e",
        "SELECT first(2, name) AS f, last(1, name) AS l",
        "SELECT -num_cores * (1 + 2) AS x",
        "SELECT 1 - (2 - 3) AS x",
        "SELECT 0.5 AS half, \"quoted \\\"text\\\"\" AS q, true AS t",
    ];
    for query in queries {
        let printed = canonical(query);
        assert_eq!(printed, query);
        assert_eq!(canonical(&printed), printed, "printing is stable for {query}");
    }
}

#[test]
fn large_and_small_doubles_print_as_plain_decimals() {
    assert_eq!(canonical("SELECT 100000000000000000000.0 AS big"), "SELECT 100000000000000000000.0 AS big");
    assert_eq!(canonical("SELECT 0.0000001 AS tiny"), "SELECT 0.0000001 AS tiny");
    assert_eq!(canonical("SELECT 3.0 AS whole"), "SELECT 3.0 AS whole");
}

#[test]
fn keywords_are_case_insensitive() {
    assert_eq!(
        canonical("select count(x) as n where y or z order by w asc nulls first"),
        "SELECT count(x) AS n WHERE y OR z ORDER BY w ASC NULLS FIRST"
    );
}

#[test]
fn precedence() {
    assert_eq!(canonical("SELECT 1 + 2 * 3 AS x"), "SELECT 1 + 2 * 3 AS x");
    assert_eq!(canonical("SELECT a OR b AND c AS x"), "SELECT a OR b AND c AS x");
    assert_eq!(canonical("SELECT (a OR b) AND c AS x"), "SELECT (a OR b) AND c AS x");
    let program = parse_program("SELECT NOT a = b AS x").unwrap();
    match &program.statements[0].select[0].expr {
        CondExpr::Not(inner) => assert!(matches!(**inner, CondExpr::Bool(BoolExpr::Cmp(..)))),
        other => panic!("expected NOT over a comparison, got {other:?}"),
    }
}

#[test]
fn order_items_and_literals() {
    let program: Program = "SELECT x AS y ORDER BY a, b DESC, c NULLS LAST;".parse().unwrap();
    let order = &program.statements[0].order_by;
    assert_eq!(order.len(), 3);
    assert_eq!((order[0].order, order[0].nulls), (Order::Unspecified, Nulls::Unspecified));
    assert_eq!(order[1].order, Order::Desc);
    assert_eq!(order[2].nulls, Nulls::Last);
    let program = parse_program("SELECT \"a\\\\b\" AS s").unwrap();
    assert!(matches!(
        &program.statements[0].select[0].expr,
        CondExpr::Bool(BoolExpr::Basic(BasicExpr::Str(s))) if s == "a\\b"
    ));
}

#[test]
fn query_attributes_are_identifiers() {
    let program = parse_program("SELECT count(&q) AS n").unwrap();
    assert_eq!(program.to_string(), "SELECT count(&q) AS n");
}

#[test]
fn syntax_errors_have_positions() {
    let err = parse_program("SELECT").unwrap_err();
    assert!(matches!(err, AtlasError::Parse { line: Some(1), .. }), "got {err:?}");
    let err = parse_program("SELECT a AS b\nWHERE").unwrap_err();
    match err {
        AtlasError::Parse { line, .. } => assert_eq!(line, Some(2)),
        other => panic!("expected a parse error, got {other:?}"),
    }
    assert!(parse_program("SELECT select AS x").is_err());
    assert!(parse_program("SELECT 99999999999999999999 AS x").is_err());
}

#[test]
fn validation_runs_before_evaluation() {
    let program = parse_program("SELECT 1 AS a; SELECT 2 AS a").unwrap();
    assert!(matches!(program.validate(), Err(AtlasError::AliasCollision(_))));
    let program = parse_program("SELECT 1").unwrap();
    let err = program.validate().unwrap_err();
    assert_eq!(err.to_string(), "All items in top-level SELECT must be aliased: 1");
}

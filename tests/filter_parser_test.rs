//! Unit tests for the filter expression parser and lowering.
//!
//! Run with: cargo test --test filter_parser_test

use telemetry_db::filter::{
    lower, parse, FilterExpression, FilterOperator, FilterValue, ParseError,
};

fn parse_one(expr: &str) -> FilterExpression {
    parse(expr)
        .expect("expression should parse")
        .expect("expression should not be empty")
}

#[test]
fn empty_expression_means_no_filter() {
    assert!(parse("").unwrap().is_none());
    assert!(parse("   ").unwrap().is_none());
}

#[test]
fn simple_condition_with_json_path() {
    let expr = parse_one("foo.a.b.gteq.3");
    let conditions = lower(&expr);

    assert_eq!(conditions.len(), 1);
    let c = &conditions[0];
    assert_eq!(c.type_name, "foo");
    assert_eq!(c.json_path, vec!["a", "b"]);
    assert_eq!(c.operator, FilterOperator::Gteq);
    assert_eq!(c.value, FilterValue::Number(3.0));
}

#[test]
fn list_condition() {
    let expr = parse_one("foo.in.(1,2,3)");
    let conditions = lower(&expr);

    assert_eq!(conditions.len(), 1);
    assert_eq!(conditions[0].operator, FilterOperator::In);
    assert_eq!(
        conditions[0].value,
        FilterValue::List(vec![
            FilterValue::Number(1.0),
            FilterValue::Number(2.0),
            FilterValue::Number(3.0),
        ])
    );
}

#[test]
fn value_dispatch() {
    assert_eq!(lower(&parse_one("t.eq.null"))[0].value, FilterValue::Null);
    assert_eq!(
        lower(&parse_one("t.eq.true"))[0].value,
        FilterValue::Bool(true)
    );
    assert_eq!(
        lower(&parse_one("t.eq.false"))[0].value,
        FilterValue::Bool(false)
    );
    assert_eq!(
        lower(&parse_one("t.eq.\"22.5\""))[0].value,
        FilterValue::Text("22.5".to_string())
    );
    assert_eq!(
        lower(&parse_one("t.eq.22.5"))[0].value,
        FilterValue::Number(22.5)
    );
    assert_eq!(
        lower(&parse_one("t.eq.warm"))[0].value,
        FilterValue::Text("warm".to_string())
    );
}

#[test]
fn rightmost_operator_wins() {
    // "eq" before the rightmost "re" is a JSON path segment, not the operator.
    let expr = parse_one("meta.eq.re.\"abc\"");
    let conditions = lower(&expr);

    assert_eq!(conditions[0].type_name, "meta");
    assert_eq!(conditions[0].json_path, vec!["eq"]);
    assert_eq!(conditions[0].operator, FilterOperator::Re);
    assert_eq!(conditions[0].value, FilterValue::Text("abc".to_string()));
}

#[test]
fn numeric_value_with_dot_is_not_split() {
    let expr = parse_one("temp.gteq.20.5");
    let conditions = lower(&expr);

    assert_eq!(conditions[0].json_path, Vec::<String>::new());
    assert_eq!(conditions[0].value, FilterValue::Number(20.5));
}

#[test]
fn nested_logical_expression_lowers_in_order() {
    let expr = parse_one("or(temp.gteq.20, and(humidity.lt.80, location.bbi.(11,46,12,47)))");
    let conditions = lower(&expr);

    assert_eq!(conditions.len(), 3);
    assert_eq!(conditions[0].type_name, "temp");
    assert_eq!(conditions[1].type_name, "humidity");
    assert_eq!(conditions[2].type_name, "location");
    assert!(conditions[2].is_spatial());
    assert!(!conditions[0].is_spatial());
    assert_eq!(
        conditions[2].value,
        FilterValue::Coordinates(vec![11.0, 46.0, 12.0, 47.0])
    );
}

#[test]
fn stringify_round_trips_to_the_same_conditions() {
    let inputs = [
        "temp.gteq.20",
        "foo.a.b.gteq.3",
        "foo.in.(1,2,3)",
        "t.eq.\"quoted text\"",
        "location.dlt.(11.3,46.5,5000)",
        "or(temp.gteq.20, and(humidity.lt.80, location.bbi.(11,46,12,47)))",
        "and(o2.eq.2, status.nin.(\"a\",\"b\"))",
    ];

    for input in inputs {
        let parsed = parse_one(input);
        let reparsed = parse_one(&parsed.to_string());
        assert_eq!(
            lower(&parsed),
            lower(&reparsed),
            "round trip failed for '{input}'"
        );
    }
}

#[test]
fn missing_closing_paren_is_an_error() {
    assert!(matches!(
        parse("and(temp.gteq.20"),
        Err(ParseError::MissingClosingParen(_))
    ));
}

#[test]
fn unknown_operator_is_an_error() {
    assert!(matches!(
        parse("temp.almost.20"),
        Err(ParseError::UnknownOperator(_))
    ));
    assert!(matches!(
        parse("nodots"),
        Err(ParseError::MalformedCondition(_))
    ));
}

#[test]
fn coordinate_arity_is_enforced() {
    assert!(matches!(
        parse("location.bbi.(11,46,12)"),
        Err(ParseError::CoordinateArity { expected: 4, .. })
    ));
    assert!(matches!(
        parse("location.dlt.(11,46)"),
        Err(ParseError::CoordinateArity { expected: 3, .. })
    ));
    assert!(matches!(
        parse("location.bbi.(11,46,12,oops)"),
        Err(ParseError::BadNumber(_))
    ));
}

#[test]
fn in_requires_a_parenthesized_list() {
    assert!(matches!(
        parse("temp.in.5"),
        Err(ParseError::ExpectedList { .. })
    ));
}

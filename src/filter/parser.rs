//! Parser for the compact infix-free filter DSL.
//!
//! ```text
//! expr      := logical | condition
//! logical   := ("and" | "or") "(" expr ("," expr)* ")"
//! condition := type ("." segment)* "." operator "." value
//! ```
//!
//! The operator of a condition is the *rightmost* recognized operator token
//! delimited by dots; everything between the type name and the operator is a
//! JSON path, everything after it is the value.

use super::types::{
    FilterCondition, FilterExpression, FilterOperator, FilterValue, ValueCondition,
};

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("missing closing parenthesis in '{0}'")]
    MissingClosingParen(String),

    #[error("no valid operator found in '{0}'")]
    UnknownOperator(String),

    #[error("condition must have at least type.operator.value: '{0}'")]
    MalformedCondition(String),

    #[error("operator '{operator}' requires a parenthesized list: '{value}'")]
    ExpectedList {
        operator: FilterOperator,
        value: String,
    },

    #[error("operator '{operator}' expects {expected} coordinates, got {got}")]
    CoordinateArity {
        operator: FilterOperator,
        expected: usize,
        got: usize,
    },

    #[error("invalid number literal '{0}' in coordinate list")]
    BadNumber(String),
}

/// Parse a filter expression. An empty string means "no filter".
pub fn parse(expr: &str) -> Result<Option<FilterExpression>, ParseError> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Ok(None);
    }
    parse_expression(expr).map(Some)
}

/// Flatten an expression tree into the ordered list of value conditions.
///
/// The and/or structure is intentionally discarded; the query compiler
/// re-derives conjunctive semantics from the flat list.
#[must_use]
pub fn lower(expr: &FilterExpression) -> Vec<ValueCondition> {
    let mut conditions = Vec::new();
    collect(expr, &mut conditions);
    conditions
}

fn collect(expr: &FilterExpression, out: &mut Vec<ValueCondition>) {
    match expr {
        FilterExpression::Condition(c) => out.push(ValueCondition {
            type_name: c.type_name.clone(),
            operator: c.operator,
            value: c.value.clone(),
            json_path: c.json_path.clone(),
        }),
        FilterExpression::And(children) | FilterExpression::Or(children) => {
            for child in children {
                collect(child, out);
            }
        }
    }
}

fn parse_expression(expr: &str) -> Result<FilterExpression, ParseError> {
    let expr = expr.trim();

    if let Some(content) = expr.strip_prefix("and(") {
        return Ok(FilterExpression::And(parse_logical_children(expr, content)?));
    }
    if let Some(content) = expr.strip_prefix("or(") {
        return Ok(FilterExpression::Or(parse_logical_children(expr, content)?));
    }

    parse_condition(expr).map(FilterExpression::Condition)
}

fn parse_logical_children(
    full: &str,
    content: &str,
) -> Result<Vec<FilterExpression>, ParseError> {
    let content = content
        .strip_suffix(')')
        .ok_or_else(|| ParseError::MissingClosingParen(full.to_string()))?;

    split_arguments(content)
        .into_iter()
        .map(|arg| parse_expression(arg))
        .collect()
}

/// Split comma-separated arguments, respecting nested parentheses.
fn split_arguments(content: &str) -> Vec<&str> {
    let mut args = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;

    for (i, ch) in content.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                let arg = content[start..i].trim();
                if !arg.is_empty() {
                    args.push(arg);
                }
                start = i + 1;
            }
            _ => {}
        }
    }

    let last = content[start..].trim();
    if !last.is_empty() {
        args.push(last);
    }
    args
}

/// Parse a single condition like `o2.eq.2` or `meta.key1.key2.gteq.30`.
fn parse_condition(expr: &str) -> Result<FilterCondition, ParseError> {
    let first_dot = expr
        .find('.')
        .ok_or_else(|| ParseError::MalformedCondition(expr.to_string()))?;

    let type_name = &expr[..first_dot];
    let remainder = &expr[first_dot + 1..];

    let (operator_pos, operator) = find_rightmost_operator(remainder)
        .ok_or_else(|| ParseError::UnknownOperator(expr.to_string()))?;

    let json_path = if operator_pos > 0 {
        remainder[..operator_pos - 1]
            .split('.')
            .map(str::to_string)
            .collect()
    } else {
        Vec::new()
    };

    let value_part = &remainder[operator_pos + operator.as_str().len() + 1..];

    let value = match operator {
        FilterOperator::In | FilterOperator::Nin => parse_list(operator, value_part)?,
        FilterOperator::Bbi | FilterOperator::Bbc => {
            parse_coordinates(operator, value_part, 4)?
        }
        FilterOperator::Dlt => parse_coordinates(operator, value_part, 3)?,
        _ => parse_value(value_part),
    };

    Ok(FilterCondition {
        type_name: type_name.to_string(),
        json_path,
        operator,
        value,
    })
}

/// Scan right-to-left for the last known operator token delimited by dots.
fn find_rightmost_operator(remainder: &str) -> Option<(usize, FilterOperator)> {
    let bytes = remainder.as_bytes();

    for i in (0..bytes.len()).rev() {
        if bytes[i] != b'.' {
            continue;
        }
        for op in super::types::ALL_OPERATORS {
            let token = op.as_str();
            if i < token.len() {
                continue;
            }
            let start = i - token.len();
            if &remainder[start..i] != token {
                continue;
            }
            // The token must be at the start of the remainder or preceded by a dot.
            if start == 0 || bytes[start - 1] == b'.' {
                return Some((start, *op));
            }
        }
    }
    None
}

fn parse_value(value: &str) -> FilterValue {
    match value {
        "null" => return FilterValue::Null,
        "true" => return FilterValue::Bool(true),
        "false" => return FilterValue::Bool(false),
        _ => {}
    }

    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        return FilterValue::Text(value[1..value.len() - 1].to_string());
    }

    if value.starts_with('(') && value.ends_with(')') {
        let items = split_arguments(&value[1..value.len() - 1])
            .into_iter()
            .map(parse_value)
            .collect();
        return FilterValue::List(items);
    }

    if let Ok(num) = value.parse::<f64>() {
        return FilterValue::Number(num);
    }

    FilterValue::Text(value.to_string())
}

fn parse_list(operator: FilterOperator, value: &str) -> Result<FilterValue, ParseError> {
    if !(value.starts_with('(') && value.ends_with(')')) {
        return Err(ParseError::ExpectedList {
            operator,
            value: value.to_string(),
        });
    }

    let items = split_arguments(&value[1..value.len() - 1])
        .into_iter()
        .map(parse_value)
        .collect();
    Ok(FilterValue::List(items))
}

fn parse_coordinates(
    operator: FilterOperator,
    value: &str,
    expected: usize,
) -> Result<FilterValue, ParseError> {
    if !(value.starts_with('(') && value.ends_with(')')) {
        return Err(ParseError::ExpectedList {
            operator,
            value: value.to_string(),
        });
    }

    let coords = split_arguments(&value[1..value.len() - 1])
        .into_iter()
        .map(|part| {
            part.parse::<f64>()
                .map_err(|_| ParseError::BadNumber(part.to_string()))
        })
        .collect::<Result<Vec<f64>, ParseError>>()?;

    if coords.len() != expected {
        return Err(ParseError::CoordinateArity {
            operator,
            expected,
            got: coords.len(),
        });
    }

    Ok(FilterValue::Coordinates(coords))
}

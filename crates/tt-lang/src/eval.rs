//! Row-level evaluation of values and filters, used by the optimizer's
//! equivalence tests and by the compiled-rule interpreter. Get-predicates
//! need an environment to run their subquery, so they evaluate to `None`
//! here; the interpreter resolves them before calling in.

use std::collections::HashMap;

use crate::ast::{BooleanExpr, FilterOp, Value, unit_factor};

pub type Tuple = HashMap<String, Value>;

// ---------------------------------------------------------------------------
// Value evaluation
// ---------------------------------------------------------------------------

/// Resolve a value against a row: variable references read row fields,
/// computations are folded. Returns `None` when a reference is missing or
/// an operation does not apply.
pub fn eval_value(value: &Value, row: &Tuple) -> Option<Value> {
    match value {
        Value::VarRef(name) => row.get(name).cloned(),
        Value::Array(items) => items
            .iter()
            .map(|v| eval_value(v, row))
            .collect::<Option<Vec<_>>>()
            .map(Value::Array),
        Value::Computation { op, args, .. } => {
            let args: Vec<Value> = args
                .iter()
                .map(|a| eval_value(a, row))
                .collect::<Option<Vec<_>>>()?;
            eval_computation(op, &args)
        }
        other => Some(other.clone()),
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => Some(*n),
        Value::Measure(v, unit) => Some(v * unit_factor(unit)),
        Value::Currency(v, _) => Some(*v),
        _ => None,
    }
}

fn eval_computation(op: &str, args: &[Value]) -> Option<Value> {
    match (op, args) {
        ("+", [a, b]) => match (a, b) {
            (Value::String(x), Value::String(y)) => Some(Value::String(format!("{x}{y}"))),
            _ => Some(Value::Number(numeric(a)? + numeric(b)?)),
        },
        ("-", [a, b]) => Some(Value::Number(numeric(a)? - numeric(b)?)),
        ("*", [a, b]) => Some(Value::Number(numeric(a)? * numeric(b)?)),
        ("/", [a, b]) => Some(Value::Number(numeric(a)? / numeric(b)?)),
        ("count", [Value::Array(items)]) => Some(Value::Number(items.len() as f64)),
        ("sum", [Value::Array(items)]) => {
            let mut total = 0.0;
            for item in items {
                total += numeric(item)?;
            }
            Some(Value::Number(total))
        }
        ("avg", [Value::Array(items)]) => {
            if items.is_empty() {
                return None;
            }
            let mut total = 0.0;
            for item in items {
                total += numeric(item)?;
            }
            Some(Value::Number(total / items.len() as f64))
        }
        ("max", [Value::Array(items)]) => items
            .iter()
            .map(numeric)
            .collect::<Option<Vec<_>>>()?
            .into_iter()
            .reduce(f64::max)
            .map(Value::Number),
        ("min", [Value::Array(items)]) => items
            .iter()
            .map(numeric)
            .collect::<Option<Vec<_>>>()?
            .into_iter()
            .reduce(f64::min)
            .map(Value::Number),
        ("distance", [Value::Location(a), Value::Location(b)]) => {
            Some(Value::Measure(haversine_m(a.latitude, a.longitude, b.latitude, b.longitude), "m".to_string()))
        }
        _ => None,
    }
}

fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    const EARTH_RADIUS_M: f64 = 6_371_000.0;
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();
    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
}

// ---------------------------------------------------------------------------
// Comparison
// ---------------------------------------------------------------------------

/// Structural equality with measure normalization; entities compare by
/// value and kind, ignoring display text.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Measure(..), _) | (_, Value::Measure(..)) => match (numeric(a), numeric(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
        (
            Value::Entity { value: va, ty: ta, .. },
            Value::Entity { value: vb, ty: tb, .. },
        ) => va == vb && ta == tb,
        _ => a == b,
    }
}

fn as_text(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) | Value::Enum(s) => Some(s),
        Value::Entity { value, .. } => Some(value),
        _ => None,
    }
}

/// Apply a filter operator to two already-evaluated values.
pub fn compare(op: FilterOp, lhs: &Value, rhs: &Value) -> Option<bool> {
    match op {
        FilterOp::Eq => Some(values_equal(lhs, rhs)),
        FilterOp::Ge | FilterOp::Le | FilterOp::Gt | FilterOp::Lt => {
            let ord = match (numeric(lhs), numeric(rhs)) {
                (Some(a), Some(b)) => a.partial_cmp(&b)?,
                _ => as_text(lhs)?.cmp(&as_text(rhs)?),
            };
            Some(match op {
                FilterOp::Ge => ord.is_ge(),
                FilterOp::Le => ord.is_le(),
                FilterOp::Gt => ord.is_gt(),
                FilterOp::Lt => ord.is_lt(),
                _ => unreachable!(),
            })
        }
        FilterOp::Like => {
            Some(as_text(lhs)?.to_lowercase().contains(&as_text(rhs)?.to_lowercase()))
        }
        FilterOp::SubstringOf => {
            Some(as_text(rhs)?.to_lowercase().contains(&as_text(lhs)?.to_lowercase()))
        }
        FilterOp::Contains => match lhs {
            Value::Array(items) => Some(items.iter().any(|item| values_equal(item, rhs))),
            _ => None,
        },
        FilterOp::InArray => match rhs {
            Value::Array(items) => Some(items.iter().any(|item| values_equal(item, lhs))),
            _ => None,
        },
        FilterOp::StartsWith => Some(as_text(lhs)?.starts_with(as_text(rhs)?)),
        FilterOp::EndsWith => Some(as_text(lhs)?.ends_with(as_text(rhs)?)),
        FilterOp::PrefixOf => Some(as_text(rhs)?.starts_with(as_text(lhs)?)),
        FilterOp::SuffixOf => Some(as_text(rhs)?.ends_with(as_text(lhs)?)),
    }
}

// ---------------------------------------------------------------------------
// Filter evaluation
// ---------------------------------------------------------------------------

/// Evaluate a filter against a row. `None` means the filter could not be
/// decided (missing field, get-predicate, type confusion).
pub fn eval_filter(filter: &BooleanExpr, row: &Tuple) -> Option<bool> {
    match filter {
        BooleanExpr::True => Some(true),
        BooleanExpr::False => Some(false),
        BooleanExpr::And(children) => {
            let mut result = true;
            for child in children {
                result = result && eval_filter(child, row)?;
            }
            Some(result)
        }
        BooleanExpr::Or(children) => {
            let mut result = false;
            for child in children {
                result = result || eval_filter(child, row)?;
            }
            Some(result)
        }
        BooleanExpr::Not(inner) => eval_filter(inner, row).map(|b| !b),
        BooleanExpr::Atom { name, op, value } => {
            let lhs = row.get(name)?;
            let rhs = eval_value(value, row)?;
            compare(*op, lhs, &rhs)
        }
        BooleanExpr::Compute { lhs, op, rhs } => {
            let lhs = eval_value(lhs, row)?;
            let rhs = eval_value(rhs, row)?;
            compare(*op, &lhs, &rhs)
        }
        BooleanExpr::External { .. } => None,
    }
}

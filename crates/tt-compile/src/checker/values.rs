use tt_lang::ast::{Resolved, Type, Value};

use crate::error::{CompileReason, CompileResult, err_detail};

use super::scope::Scope;

// ---------------------------------------------------------------------------
// Unification
// ---------------------------------------------------------------------------

/// Can a value of type `found` be passed where `declared` is expected?
///
/// Numeric unification: plain numbers fit `Currency` (the currency code is
/// implied by the runtime locale); measures fit measures of the same base
/// unit; everything else follows structural identity with `Any` as top and
/// enum label-set inclusion.
pub fn unifies(found: &Type, declared: &Type) -> bool {
    match (found, declared) {
        (Type::Number, Type::Currency) => true,
        (Type::Array(a), Type::Array(b)) => unifies(a, b),
        _ => found.is_assignable_to(declared),
    }
}

pub fn check_assignable(found: &Type, declared: &Type, path: &str) -> CompileResult<()> {
    if unifies(found, declared) {
        Ok(())
    } else {
        Err(err_detail(
            CompileReason::TypeMismatch,
            format!("expected {declared}, found {found} for {path}"),
        ))
    }
}

// ---------------------------------------------------------------------------
// Value typing
// ---------------------------------------------------------------------------

/// Infer the type of a value. Variable references resolve through the
/// scope; computations get their result type written back into the node.
pub fn infer_value(value: &mut Value, scope: &Scope) -> CompileResult<Type> {
    match value {
        Value::VarRef(name) => scope.lookup(name).cloned().ok_or_else(|| {
            err_detail(
                CompileReason::UndeclaredName,
                format!("`{name}` is not in scope"),
            )
        }),
        Value::Undefined(_) => Ok(Type::Any),
        Value::Array(items) => {
            let mut elem = Type::Any;
            for item in items.iter_mut() {
                let t = infer_value(item, scope)?;
                if elem == Type::Any {
                    elem = t;
                } else if t != Type::Any && t != elem {
                    return Err(err_detail(
                        CompileReason::TypeMismatch,
                        format!("array mixes {elem} and {t}"),
                    ));
                }
            }
            Ok(Type::Array(Box::new(elem)))
        }
        Value::Computation { op, args, ty } => {
            let mut arg_types = Vec::with_capacity(args.len());
            for arg in args.iter_mut() {
                arg_types.push(infer_value(arg, scope)?);
            }
            let result = computation_type(op, &arg_types)?;
            *ty = Resolved::new(result.clone());
            Ok(result)
        }
        other => Ok(other.type_of()),
    }
}

fn computation_type(op: &str, args: &[Type]) -> CompileResult<Type> {
    let bad = |msg: String| Err(err_detail(CompileReason::TypeMismatch, msg));
    match (op, args) {
        ("count", [Type::Array(_)]) => Ok(Type::Number),
        ("count", [other]) => bad(format!("count expects an array, found {other}")),
        ("sum" | "min" | "max", [Type::Array(elem)]) if elem.is_numeric() => {
            Ok((**elem).clone())
        }
        ("sum" | "min" | "max", [other]) => {
            bad(format!("{op} expects a numeric array, found {other}"))
        }
        ("avg", [Type::Array(elem)]) if elem.is_numeric() => Ok(Type::Number),
        ("avg", [other]) => bad(format!("avg expects a numeric array, found {other}")),
        ("distance", [Type::Location, Type::Location]) => {
            Ok(Type::Measure("m".to_string()))
        }
        ("distance", _) => bad("distance expects two locations".to_string()),
        ("+", [Type::String, Type::String]) => Ok(Type::String),
        ("+" | "-" | "*" | "/", [a, b]) if a.is_numeric() && b.is_numeric() => {
            if a == b {
                Ok(a.clone())
            } else if matches!((a, b), (Type::Number, _) | (_, Type::Number)) {
                // A plain number scales the other operand.
                Ok(if *a == Type::Number { b.clone() } else { a.clone() })
            } else {
                bad(format!("cannot combine {a} and {b}"))
            }
        }
        ("+" | "-" | "*" | "/", [a, b]) => bad(format!("cannot apply `{op}` to {a} and {b}")),
        _ => bad(format!("unknown operator `{op}`")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_unify_with_currency_but_not_measures() {
        assert!(unifies(&Type::Number, &Type::Currency));
        assert!(!unifies(&Type::Number, &Type::Measure("C".into())));
        assert!(unifies(
            &Type::Measure("F".into()),
            &Type::Measure("C".into())
        ));
    }

    #[test]
    fn computation_types_resolve() {
        let mut scope = Scope::new();
        scope.bind("tags", Type::Array(Box::new(Type::String)));
        let mut v = Value::Computation {
            op: "count".into(),
            args: vec![Value::VarRef("tags".into())],
            ty: Resolved::none(),
        };
        assert_eq!(infer_value(&mut v, &scope).unwrap(), Type::Number);
        match v {
            Value::Computation { ty, .. } => assert_eq!(ty.get(), Some(&Type::Number)),
            _ => unreachable!(),
        }
    }

    #[test]
    fn unbound_varref_is_undeclared() {
        let mut v = Value::VarRef("ghost".into());
        assert!(infer_value(&mut v, &Scope::new()).is_err());
    }
}

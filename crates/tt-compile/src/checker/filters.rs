use tt_lang::ast::{FilterOp, Type};

// ---------------------------------------------------------------------------
// Operator admissibility
// ---------------------------------------------------------------------------

/// Is `op` declared admissible for a left-hand side of type `lhs`?
pub fn op_admissible(op: FilterOp, lhs: &Type) -> bool {
    match op {
        FilterOp::Eq => true,
        FilterOp::Ge | FilterOp::Le | FilterOp::Gt | FilterOp::Lt => matches!(
            lhs,
            Type::Number
                | Type::Measure(_)
                | Type::Currency
                | Type::Date
                | Type::Time
                | Type::String
        ),
        FilterOp::Like
        | FilterOp::SubstringOf
        | FilterOp::StartsWith
        | FilterOp::EndsWith
        | FilterOp::PrefixOf
        | FilterOp::SuffixOf => matches!(lhs, Type::String | Type::Entity(_)),
        FilterOp::Contains => matches!(lhs, Type::Array(_)),
        FilterOp::InArray => true,
    }
}

/// The type the right-hand side must unify with, given the left-hand type.
pub fn expected_rhs(op: FilterOp, lhs: &Type) -> Type {
    match op {
        FilterOp::Contains => match lhs {
            Type::Array(elem) => (**elem).clone(),
            other => other.clone(),
        },
        FilterOp::InArray => Type::Array(Box::new(lhs.clone())),
        FilterOp::Like
        | FilterOp::SubstringOf
        | FilterOp::StartsWith
        | FilterOp::EndsWith
        | FilterOp::PrefixOf
        | FilterOp::SuffixOf => Type::String,
        _ => lhs.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comparison_needs_ordered_types() {
        assert!(op_admissible(FilterOp::Ge, &Type::Number));
        assert!(op_admissible(FilterOp::Ge, &Type::Date));
        assert!(!op_admissible(FilterOp::Ge, &Type::Boolean));
        assert!(!op_admissible(FilterOp::Ge, &Type::Location));
    }

    #[test]
    fn string_ops_cover_entities() {
        assert!(op_admissible(FilterOp::Like, &Type::String));
        assert!(op_admissible(
            FilterOp::StartsWith,
            &Type::Entity("tt:contact".into())
        ));
        assert!(!op_admissible(FilterOp::Like, &Type::Number));
    }

    #[test]
    fn array_ops_expect_matching_shapes() {
        let arr = Type::Array(Box::new(Type::String));
        assert!(op_admissible(FilterOp::Contains, &arr));
        assert_eq!(expected_rhs(FilterOp::Contains, &arr), Type::String);
        assert_eq!(
            expected_rhs(FilterOp::InArray, &Type::Number),
            Type::Array(Box::new(Type::Number))
        );
    }
}

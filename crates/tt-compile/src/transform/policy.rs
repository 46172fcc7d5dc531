use tt_lang::ast::*;
use tt_lang::optimize_filter;

// ---------------------------------------------------------------------------
// Program → policy
// ---------------------------------------------------------------------------

/// Derive permission entries from a program: one per rule, with a `true`
/// precondition and the rule's filters folded into the function scopes.
pub fn program_to_policy(program: &Program) -> Vec<PermissionRule> {
    program
        .rules()
        .map(|rule| PermissionRule {
            principal: BooleanExpr::True,
            query: query_side(rule),
            action: action_side(rule),
        })
        .collect()
}

fn query_side(rule: &Rule) -> PermissionFunction {
    let table = match (&rule.stream, rule.tables.first()) {
        (Some(stream), _) => {
            let mut current = stream;
            loop {
                match current {
                    Stream::Monitor { table, .. } => break Some(&**table),
                    Stream::Filter { stream, .. } | Stream::Join { stream, .. } => {
                        current = stream;
                    }
                    Stream::Timer { .. } | Stream::AtTimer { .. } => break None,
                }
            }
        }
        (None, Some(table)) => Some(table),
        (None, None) => None,
    };
    match table {
        Some(table) => table_permission(table),
        None => PermissionFunction::Builtin,
    }
}

/// Flatten a table chain into `(kind, channel, conjunction of filters)`.
fn table_permission(table: &Table) -> PermissionFunction {
    let mut filters = Vec::new();
    let mut current = table;
    loop {
        match current {
            Table::Invocation(inv) => {
                return PermissionFunction::Specified {
                    kind: inv.selector.kind.clone(),
                    channel: inv.channel.clone(),
                    filter: optimize_filter(&BooleanExpr::And(filters)),
                };
            }
            Table::Filter { table, filter } => {
                filters.push(filter.clone());
                current = table;
            }
            Table::Projection { table, .. }
            | Table::Sort { table, .. }
            | Table::Index { table, .. }
            | Table::Slice { table, .. }
            | Table::Aggregation { table, .. }
            | Table::ArgMinMax { table, .. } => current = table,
            Table::Join { lhs, .. } => current = lhs,
            Table::VarRef { .. } | Table::Result { .. } => return PermissionFunction::Any,
        }
    }
}

fn action_side(rule: &Rule) -> PermissionFunction {
    match rule.actions.first() {
        None | Some(Action::Notify) | Some(Action::Return) => PermissionFunction::Builtin,
        Some(Action::Invocation(inv)) => PermissionFunction::Specified {
            kind: inv.selector.kind.clone(),
            channel: inv.channel.clone(),
            filter: BooleanExpr::True,
        },
        Some(Action::VarRef { .. }) => PermissionFunction::Any,
    }
}

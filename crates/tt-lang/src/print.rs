//! Canonical serialization of the AST. Parsing the printed form yields a
//! structurally equal program, so this is the wire format between tools.

use std::fmt;

use chrono::SecondsFormat;

use crate::ast::*;
use crate::parse_utils::escape_string;

// ---------------------------------------------------------------------------
// Numbers
// ---------------------------------------------------------------------------

pub(crate) fn fmt_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Boolean(b) => write!(f, "{b}"),
            Value::String(s) => write!(f, "\"{}\"", escape_string(s)),
            Value::Number(n) => write!(f, "{}", fmt_number(*n)),
            Value::Measure(v, unit) => write!(f, "{}{unit}", fmt_number(*v)),
            Value::Currency(v, code) => write!(f, "new Currency({}, {code})", fmt_number(*v)),
            Value::Date(d) => write!(f, "{d}"),
            Value::Time(t) => {
                if t.second != 0 {
                    write!(f, "new Time({}, {}, {})", t.hour, t.minute, t.second)
                } else {
                    write!(f, "new Time({}, {})", t.hour, t.minute)
                }
            }
            Value::Location(l) => match &l.display {
                Some(d) => write!(
                    f,
                    "new Location({}, {}, \"{}\")",
                    fmt_number(l.latitude),
                    fmt_number(l.longitude),
                    escape_string(d)
                ),
                None => write!(
                    f,
                    "new Location({}, {})",
                    fmt_number(l.latitude),
                    fmt_number(l.longitude)
                ),
            },
            Value::Entity { value, display, ty } => {
                write!(f, "\"{}\"^^{ty}", escape_string(value))?;
                if let Some(d) = display {
                    write!(f, "(\"{}\")", escape_string(d))?;
                }
                Ok(())
            }
            Value::Enum(label) => write!(f, "enum({label})"),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Event(None) => write!(f, "$event"),
            Value::Event(Some(field)) => write!(f, "$event.{field}"),
            Value::VarRef(name) => write!(f, "{name}"),
            Value::Computation { op, args, .. } => {
                if args.len() == 2 && matches!(op.as_str(), "+" | "-" | "*" | "/") {
                    write!(f, "({} {op} {})", args[0], args[1])
                } else {
                    write!(f, "{op}(")?;
                    for (i, arg) in args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{arg}")?;
                    }
                    write!(f, ")")
                }
            }
            Value::Undefined(true) => write!(f, "$?"),
            Value::Undefined(false) => write!(f, "$undefined"),
        }
    }
}

impl fmt::Display for DateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateValue::Absolute(dt) => write!(
                f,
                "new Date(\"{}\")",
                dt.to_rfc3339_opts(SecondsFormat::Secs, true)
            ),
            DateValue::Now => write!(f, "$now"),
            DateValue::StartOf(unit) => write!(f, "$start_of({unit})"),
            DateValue::EndOf(unit) => write!(f, "$end_of({unit})"),
        }
    }
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

/// Connective operands are always parenthesized; atoms stand alone.
impl fmt::Display for BooleanExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BooleanExpr::True => write!(f, "true"),
            BooleanExpr::False => write!(f, "false"),
            BooleanExpr::And(children) if children.is_empty() => write!(f, "true"),
            BooleanExpr::Or(children) if children.is_empty() => write!(f, "false"),
            BooleanExpr::And(children) => {
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, " && ")?;
                    }
                    write!(f, "({child})")?;
                }
                Ok(())
            }
            BooleanExpr::Or(children) => {
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, " || ")?;
                    }
                    write!(f, "({child})")?;
                }
                Ok(())
            }
            BooleanExpr::Not(inner) => write!(f, "!({inner})"),
            BooleanExpr::Atom { name, op, value } => {
                write!(f, "{name} {} {value}", op.as_str())
            }
            BooleanExpr::External { invocation, filter } => {
                write!(f, "{invocation} {{ {filter} }}")
            }
            BooleanExpr::Compute { lhs, op, rhs } => {
                write!(f, "{lhs} {} {rhs}", op.as_str())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Invocations, tables & streams
// ---------------------------------------------------------------------------

fn write_params(f: &mut fmt::Formatter<'_>, params: &[InputParam]) -> fmt::Result {
    write!(f, "(")?;
    for (i, p) in params.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}={}", p.name, p.value)?;
    }
    write!(f, ")")
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.selector.kind)?;
        if !self.selector.attributes.is_empty() {
            write_params(f, &self.selector.attributes)?;
        }
        write!(f, ".{}", self.channel)?;
        write_params(f, &self.in_params)
    }
}

/// Print a table as the operand of a combinator: primitives stand bare,
/// compound tables are parenthesized.
struct TableOperand<'a>(&'a Table);

impl fmt::Display for TableOperand<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Table::Invocation(_) | Table::VarRef { .. } | Table::Result { .. } => {
                write!(f, "{}", self.0)
            }
            other => write!(f, "({other})"),
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Table::Invocation(inv) => write!(f, "{inv}"),
            Table::VarRef {
                name, in_params, ..
            } => {
                write!(f, "{name}")?;
                write_params(f, in_params)
            }
            Table::Result { name, .. } => write!(f, "result(@{name})"),
            Table::Filter { table, filter } => {
                write!(f, "{}, {filter}", TableOperand(table))
            }
            Table::Projection { table, fields, .. } => {
                write!(f, "[{}] of {}", fields.join(", "), TableOperand(table))
            }
            Table::Sort {
                table,
                field,
                direction,
            } => write!(
                f,
                "sort {field} {} of {}",
                direction.as_str(),
                TableOperand(table)
            ),
            Table::Index { table, indices } => {
                write!(f, "{}[", TableOperand(table))?;
                for (i, idx) in indices.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{idx}")?;
                }
                write!(f, "]")
            }
            Table::Slice { table, base, limit } => {
                write!(f, "{}[{base} : {limit}]", TableOperand(table))
            }
            Table::Join { lhs, rhs, on, .. } => {
                write!(f, "{} join {}", TableOperand(lhs), TableOperand(rhs))?;
                if !on.is_empty() {
                    write!(f, " on (")?;
                    for (i, p) in on.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}={}", p.name, p.value)?;
                    }
                    write!(f, ")")?;
                }
                Ok(())
            }
            Table::Aggregation {
                table, op, field, ..
            } => match field {
                Some(field) => write!(
                    f,
                    "aggregate {} {field} of {}",
                    op.as_str(),
                    TableOperand(table)
                ),
                None => write!(f, "aggregate {} of {}", op.as_str(), TableOperand(table)),
            },
            Table::ArgMinMax {
                table,
                op,
                field,
                base,
                limit,
            } => {
                let name = match op {
                    MinMax::Min => "argmin",
                    MinMax::Max => "argmax",
                };
                write!(
                    f,
                    "{name} {base}, {limit} {field} of {}",
                    TableOperand(table)
                )
            }
        }
    }
}

struct StreamOperand<'a>(&'a Stream);

impl fmt::Display for StreamOperand<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Stream::Monitor { .. } | Stream::Timer { .. } | Stream::AtTimer { .. } => {
                write!(f, "{}", self.0)
            }
            other => write!(f, "({other})"),
        }
    }
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stream::Monitor { table, on_new } => {
                write!(f, "monitor {}", TableOperand(table))?;
                if let Some(fields) = on_new {
                    write!(f, " on new [{}]", fields.join(", "))?;
                }
                Ok(())
            }
            Stream::Timer {
                base,
                interval,
                frequency,
            } => {
                write!(f, "timer(base={base}, interval={interval}")?;
                if let Some(freq) = frequency {
                    write!(f, ", frequency={freq}")?;
                }
                write!(f, ")")
            }
            Stream::AtTimer { times, expiration } => {
                write!(f, "attimer(time=[")?;
                for (i, t) in times.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{t}")?;
                }
                write!(f, "]")?;
                if let Some(e) = expiration {
                    write!(f, ", expiration_date={e}")?;
                }
                write!(f, ")")
            }
            Stream::Filter { stream, filter } => {
                write!(f, "{}, {filter}", StreamOperand(stream))
            }
            Stream::Join {
                stream, table, on, ..
            } => {
                write!(f, "{} join {}", StreamOperand(stream), TableOperand(table))?;
                if !on.is_empty() {
                    write!(f, " on (")?;
                    for (i, p) in on.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}={}", p.name, p.value)?;
                    }
                    write!(f, ")")?;
                }
                Ok(())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Actions, rules & statements
// ---------------------------------------------------------------------------

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Notify => write!(f, "notify"),
            Action::Return => write!(f, "return"),
            Action::Invocation(inv) => write!(f, "{inv}"),
            Action::VarRef {
                name, in_params, ..
            } => {
                write!(f, "{name}")?;
                write_params(f, in_params)
            }
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // `now => t => notify` collapses to the expression-statement form.
        let implicit_notify =
            self.stream.is_none() && !self.tables.is_empty() && self.actions == [Action::Notify];
        let mut first = true;
        let mut sep = |f: &mut fmt::Formatter<'_>| -> fmt::Result {
            if first {
                first = false;
                Ok(())
            } else {
                write!(f, " => ")
            }
        };
        match &self.stream {
            Some(stream) => {
                sep(f)?;
                write!(f, "{stream}")?;
            }
            None => {
                if !implicit_notify {
                    sep(f)?;
                    write!(f, "now")?;
                }
            }
        }
        for table in &self.tables {
            sep(f)?;
            write!(f, "{table}")?;
        }
        if !implicit_notify {
            sep(f)?;
            for (i, action) in self.actions.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{action}")?;
            }
        }
        write!(f, ";")
    }
}

// ---------------------------------------------------------------------------
// Classes & datasets
// ---------------------------------------------------------------------------

impl fmt::Display for ArgDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dir = match self.direction {
            ArgDirection::InReq => "in req",
            ArgDirection::InOpt => "in opt",
            ArgDirection::Out => "out",
        };
        write!(f, "{dir} {} : {}", self.name, self.ty)?;
        let a = &self.annotations;
        if let Some(c) = &a.canonical {
            write!(f, " #[canonical=\"{}\"]", escape_string(c))?;
        }
        if let Some(p) = &a.prompt {
            write!(f, " #[prompt=\"{}\"]", escape_string(p))?;
        }
        if let Some(ri) = &a.required_if {
            write!(f, " #[required_if=\"{}\"]", escape_string(ri))?;
        }
        if a.unique {
            write!(f, " #[unique=true]")?;
        }
        if !a.filterable {
            write!(f, " #[filterable=false]")?;
        }
        Ok(())
    }
}

fn write_function(f: &mut fmt::Formatter<'_>, func: &FunctionDef) -> fmt::Result {
    write!(f, "  ")?;
    if func.is_monitorable {
        write!(f, "monitorable ")?;
    }
    if func.is_list {
        write!(f, "list ")?;
    }
    write!(f, "{} {}(", func.kind.as_str(), func.name)?;
    for (i, arg) in func.args.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{arg}")?;
    }
    write!(f, ")")?;
    if !func.require_either.is_empty() {
        write!(f, " #[require_either=[")?;
        for (i, group) in func.require_either.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "[")?;
            for (j, name) in group.iter().enumerate() {
                if j > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "\"{name}\"")?;
            }
            write!(f, "]")?;
        }
        write!(f, "]]")?;
    }
    if let Some(mp) = &func.minimal_projection {
        write!(f, " #[minimal_projection=[")?;
        for (i, name) in mp.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "\"{name}\"")?;
        }
        write!(f, "]]")?;
    }
    if let Some(pi) = &func.poll_interval {
        write!(f, " #[poll_interval={pi}]")?;
    }
    if let Some(c) = &func.canonical {
        write!(f, " #[canonical=\"{}\"]", escape_string(c))?;
    }
    writeln!(f, ";")
}

impl fmt::Display for ClassDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "class @{}", self.kind)?;
        for parent in &self.extends {
            write!(f, " extends @{parent}")?;
        }
        for (key, value) in &self.annotations {
            write!(f, " #[{key}={value}]")?;
        }
        writeln!(f, " {{")?;
        for query in &self.queries {
            write_function(f, query)?;
        }
        for action in &self.actions {
            write_function(f, action)?;
        }
        write!(f, "}}")
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "dataset @{} {{", self.name)?;
        for ex in &self.examples {
            write!(f, "  {}", ex.kind.as_str())?;
            if !ex.params.is_empty() {
                write!(f, " (")?;
                for (i, p) in ex.params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} : {}", p.name, p.ty)?;
                }
                write!(f, ")")?;
            }
            write!(f, " := ")?;
            match &ex.body {
                DeclarationBody::Table(t) => write!(f, "{t}")?,
                DeclarationBody::Stream(s) => write!(f, "{s}")?,
                DeclarationBody::Action(a) => write!(f, "{a}")?,
            }
            if !ex.utterances.is_empty() {
                write!(f, " #_[utterances=[")?;
                for (i, u) in ex.utterances.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "\"{}\"", escape_string(u))?;
                }
                write!(f, "]]")?;
            }
            writeln!(f, ";")?;
        }
        write!(f, "}}")
    }
}

impl fmt::Display for Declaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "let {} {}", self.kind.as_str(), self.name)?;
        if !self.params.is_empty() {
            write!(f, "(")?;
            for (i, p) in self.params.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{} : {}", p.name, p.ty)?;
            }
            write!(f, ")")?;
        }
        write!(f, " := ")?;
        match &self.body {
            DeclarationBody::Table(t) => write!(f, "{t}")?,
            DeclarationBody::Stream(s) => write!(f, "{s}")?,
            DeclarationBody::Action(a) => write!(f, "{a}")?,
        }
        write!(f, ";")
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::ClassDef(c) => write!(f, "{c}"),
            Statement::Dataset(d) => write!(f, "{d}"),
            Statement::Declaration(d) => write!(f, "{d}"),
            Statement::Rule(r) => write!(f, "{r}"),
        }
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(principal) = &self.principal {
            write!(f, "executor = {principal} : ")?;
        }
        for (i, statement) in self.statements.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{statement}")?;
        }
        Ok(())
    }
}

/// The canonical text of a program.
pub fn pretty_print(program: &Program) -> String {
    program.to_string()
}

use super::filters::BooleanExpr;
use super::function_def::FunctionSchema;
use super::resolved::Resolved;
use super::values::Value;

// ---------------------------------------------------------------------------
// Selectors & invocations
// ---------------------------------------------------------------------------

/// Device-side reference of an invocation: the class kind plus optional
/// attributes (`id`, `name`, `principal`) constraining which device runs it.
#[derive(Debug, Clone, PartialEq)]
pub struct Selector {
    pub kind: String,
    pub attributes: Vec<InputParam>,
}

impl Selector {
    pub fn new(kind: impl Into<String>) -> Self {
        Selector {
            kind: kind.into(),
            attributes: Vec::new(),
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InputParam {
    pub name: String,
    pub value: Value,
}

impl InputParam {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        InputParam {
            name: name.into(),
            value,
        }
    }
}

/// `@kind.channel(in_params)` — the primitive of the expression algebra.
/// `schema` is attached by the type checker.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub selector: Selector,
    pub channel: String,
    pub in_params: Vec<InputParam>,
    pub schema: Resolved<FunctionSchema>,
}

impl Invocation {
    pub fn new(kind: impl Into<String>, channel: impl Into<String>) -> Self {
        Invocation {
            selector: Selector::new(kind),
            channel: channel.into(),
            in_params: Vec::new(),
            schema: Resolved::none(),
        }
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.selector.kind, self.channel)
    }

    pub fn in_param(&self, name: &str) -> Option<&Value> {
        self.in_params
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.value)
    }
}

// ---------------------------------------------------------------------------
// Table algebra
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationOp {
    Count,
    Min,
    Max,
    Sum,
    Avg,
}

impl AggregationOp {
    pub fn as_str(self) -> &'static str {
        match self {
            AggregationOp::Count => "count",
            AggregationOp::Min => "min",
            AggregationOp::Max => "max",
            AggregationOp::Sum => "sum",
            AggregationOp::Avg => "avg",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinMax {
    Min,
    Max,
}

/// Query algebra. Combinators that change the output signature (`Projection`,
/// `Join`, `Aggregation`) carry their own schema slot; the rest derive their
/// schema from the wrapped table.
#[derive(Debug, Clone, PartialEq)]
pub enum Table {
    Invocation(Invocation),
    /// Call of a declared query: `name(in_params)`.
    VarRef {
        name: String,
        in_params: Vec<InputParam>,
        schema: Resolved<FunctionSchema>,
    },
    /// `result(@name)` — the latest result of a previous statement.
    Result {
        name: String,
        schema: Resolved<FunctionSchema>,
    },
    Filter {
        table: Box<Table>,
        filter: BooleanExpr,
    },
    Projection {
        table: Box<Table>,
        fields: Vec<String>,
        schema: Resolved<FunctionSchema>,
    },
    Sort {
        table: Box<Table>,
        field: String,
        direction: SortDirection,
    },
    Index {
        table: Box<Table>,
        indices: Vec<Value>,
    },
    Slice {
        table: Box<Table>,
        base: Value,
        limit: Value,
    },
    Join {
        lhs: Box<Table>,
        rhs: Box<Table>,
        /// `on (x = y)` bindings: named inputs of the right side fed from
        /// the left side's outputs.
        on: Vec<InputParam>,
        schema: Resolved<FunctionSchema>,
    },
    Aggregation {
        table: Box<Table>,
        op: AggregationOp,
        /// `None` only for `count`.
        field: Option<String>,
        schema: Resolved<FunctionSchema>,
    },
    ArgMinMax {
        table: Box<Table>,
        op: MinMax,
        field: String,
        base: Value,
        limit: Value,
    },
}

impl Table {
    /// The signature describing this table's output, when type-checked.
    pub fn schema(&self) -> Option<&FunctionSchema> {
        match self {
            Table::Invocation(inv) => inv.schema.get(),
            Table::VarRef { schema, .. }
            | Table::Result { schema, .. }
            | Table::Projection { schema, .. }
            | Table::Join { schema, .. }
            | Table::Aggregation { schema, .. } => schema.get(),
            Table::Filter { table, .. }
            | Table::Sort { table, .. }
            | Table::Index { table, .. }
            | Table::Slice { table, .. }
            | Table::ArgMinMax { table, .. } => table.schema(),
        }
    }

    /// The primitive invocations of this table, left to right.
    pub fn invocations<'a>(&'a self, out: &mut Vec<&'a Invocation>) {
        match self {
            Table::Invocation(inv) => out.push(inv),
            Table::VarRef { .. } | Table::Result { .. } => {}
            Table::Filter { table, .. }
            | Table::Projection { table, .. }
            | Table::Sort { table, .. }
            | Table::Index { table, .. }
            | Table::Slice { table, .. }
            | Table::Aggregation { table, .. }
            | Table::ArgMinMax { table, .. } => table.invocations(out),
            Table::Join { lhs, rhs, .. } => {
                lhs.invocations(out);
                rhs.invocations(out);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Stream algebra
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Stream {
    /// Change-detection over a monitorable table, optionally narrowed to the
    /// named fields.
    Monitor {
        table: Box<Table>,
        on_new: Option<Vec<String>>,
    },
    Timer {
        base: Value,
        interval: Value,
        frequency: Option<Value>,
    },
    AtTimer {
        times: Vec<Value>,
        expiration: Option<Value>,
    },
    Filter {
        stream: Box<Stream>,
        filter: BooleanExpr,
    },
    /// Stream-table join: every stream tuple is joined against the table's
    /// current results.
    Join {
        stream: Box<Stream>,
        table: Box<Table>,
        on: Vec<InputParam>,
        schema: Resolved<FunctionSchema>,
    },
}

impl Stream {
    pub fn schema(&self) -> Option<&FunctionSchema> {
        match self {
            Stream::Monitor { table, .. } => table.schema(),
            Stream::Timer { .. } | Stream::AtTimer { .. } => None,
            Stream::Filter { stream, .. } => stream.schema(),
            Stream::Join { schema, .. } => schema.get(),
        }
    }
}

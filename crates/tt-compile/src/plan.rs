use tt_lang::ast::{AggregationOp, BooleanExpr, MinMax, SortDirection, Value};

// ---------------------------------------------------------------------------
// ProgramPlan / RulePlan
// ---------------------------------------------------------------------------

/// Compiled form of a whole program: one rule descriptor per rule
/// statement. State slots are numbered program-wide so that rules sharing a
/// slot (procedure results) serialize on it.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramPlan {
    pub rules: Vec<RulePlan>,
    pub state_slot_count: usize,
}

/// One compiled rule: a head that produces tuples, a linear step pipeline,
/// and finalizer steps that run once the head's iteration completes.
#[derive(Debug, Clone, PartialEq)]
pub struct RulePlan {
    pub name: String,
    pub head: HeadPlan,
    pub steps: Vec<Step>,
    pub finalizers: Vec<Step>,
    pub state_slot_count: usize,
    pub input_channels: Vec<String>,
    pub output_channels: Vec<String>,
}

// ---------------------------------------------------------------------------
// Heads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum HeadPlan {
    /// Run the pipeline once, immediately.
    Now,
    Timer {
        base: Value,
        interval: Value,
        frequency: Option<Value>,
    },
    AtTimer {
        times: Vec<Value>,
        expiration: Option<Value>,
    },
    Monitor(MonitorPlan),
}

/// Change detection over a monitorable query: poll, compare against the
/// last-observed result set in `state_slot`, and pass only new tuples.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorPlan {
    pub invocation: InvokePlan,
    pub state_slot: usize,
    /// Fields whose equality defines "same tuple": the minimal projection
    /// (or all outputs) plus the input bindings.
    pub key_fields: Vec<String>,
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

/// A single function call emitted by the compiler. Parameter values may
/// reference upstream tuple fields by name.
#[derive(Debug, Clone, PartialEq)]
pub struct InvokePlan {
    /// Qualified function name (`kind.channel`), or a bare declaration name.
    pub function: String,
    pub params: Vec<(String, Value)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Invoke a query per incoming tuple and merge each result row into it.
    Query(InvokePlan),
    /// Get-predicate gate: keep the tuple iff the subquery yields at least
    /// one row passing the filter.
    GetPredicate {
        invocation: InvokePlan,
        filter: BooleanExpr,
        negated: bool,
    },
    Filter(BooleanExpr),
    Project(Vec<String>),
    /// Buffering barrier: sort the accumulated tuples.
    Sort {
        field: String,
        direction: SortDirection,
    },
    /// 1-based selection over the buffer; negative indices count from the
    /// end; out of range yields nothing.
    Index(Vec<Value>),
    Slice {
        base: Value,
        limit: Value,
    },
    Aggregate {
        op: AggregationOp,
        field: Option<String>,
    },
    /// Bounded top-k with first-seen tie-breaking.
    ArgMinMax {
        op: MinMax,
        field: String,
        base: Value,
        limit: Value,
        state_slot: usize,
    },
    /// Nested-loop join: run the sub-pipeline per incoming tuple and emit
    /// the concatenated tuples. `dedup_slot` is set for stream joins, which
    /// share a deduplication state across firings.
    Join {
        steps: Vec<Step>,
        dedup_slot: Option<usize>,
    },
    Action(InvokePlan),
    /// `output(notify)` — emit the tuple downstream.
    Emit,
    /// Memoize the current tuple for `result(...)` readers.
    SaveResult {
        state_slot: usize,
    },
    /// Read the memoized tuple of an earlier statement.
    ReadResult {
        state_slot: usize,
    },
    SendEndOfFlow {
        principal: Value,
        flow: Value,
    },
}

/// Named error-recovery boundaries. A failure inside a boundary is reported
/// via `report_error` and confined to it; a failure outside any boundary
/// aborts the rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorScope {
    Trigger,
    Timer,
    AtTimer,
    Query,
    GetPredicate,
    Action,
}

impl ErrorScope {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorScope::Trigger => "trigger",
            ErrorScope::Timer => "timer",
            ErrorScope::AtTimer => "at-timer",
            ErrorScope::Query => "query",
            ErrorScope::GetPredicate => "get-predicate",
            ErrorScope::Action => "action",
        }
    }
}

// ---------------------------------------------------------------------------
// Structural equality modulo slot numbering
// ---------------------------------------------------------------------------

/// Two rules are equivalent when their plans are structurally equal after
/// renumbering state slots in first-use order.
pub fn plan_equivalent(a: &RulePlan, b: &RulePlan) -> bool {
    normalize_slots(a) == normalize_slots(b)
}

fn normalize_slots(plan: &RulePlan) -> RulePlan {
    let mut map = SlotMap::default();
    let mut plan = plan.clone();
    // The name identifies the statement, not the dataflow.
    plan.name = String::new();
    if let HeadPlan::Monitor(monitor) = &mut plan.head {
        monitor.state_slot = map.renumber(monitor.state_slot);
    }
    for step in plan.steps.iter_mut().chain(plan.finalizers.iter_mut()) {
        renumber_step(step, &mut map);
    }
    plan
}

#[derive(Default)]
struct SlotMap {
    seen: Vec<usize>,
}

impl SlotMap {
    fn renumber(&mut self, slot: usize) -> usize {
        match self.seen.iter().position(|s| *s == slot) {
            Some(i) => i,
            None => {
                self.seen.push(slot);
                self.seen.len() - 1
            }
        }
    }
}

fn renumber_step(step: &mut Step, map: &mut SlotMap) {
    match step {
        Step::ArgMinMax { state_slot, .. }
        | Step::SaveResult { state_slot }
        | Step::ReadResult { state_slot } => *state_slot = map.renumber(*state_slot),
        Step::Join { steps, dedup_slot } => {
            if let Some(slot) = dedup_slot {
                *slot = map.renumber(*slot);
            }
            for step in steps {
                renumber_step(step, map);
            }
        }
        _ => {}
    }
}

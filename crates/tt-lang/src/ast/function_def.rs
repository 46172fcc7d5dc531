use std::collections::BTreeMap;
use std::sync::Arc;

use super::types::Type;
use super::values::Value;

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgDirection {
    InReq,
    InOpt,
    Out,
}

impl ArgDirection {
    pub fn is_input(self) -> bool {
        matches!(self, ArgDirection::InReq | ArgDirection::InOpt)
    }
}

/// Per-argument annotations. `filterable` defaults to true; everything else
/// defaults to absent.
#[derive(Debug, Clone, PartialEq)]
pub struct ArgAnnotations {
    pub canonical: Option<String>,
    pub prompt: Option<String>,
    /// `"param=value"`: this argument becomes required when `param` is
    /// bound to the stated enum literal.
    pub required_if: Option<String>,
    pub unique: bool,
    pub filterable: bool,
}

impl Default for ArgAnnotations {
    fn default() -> Self {
        ArgAnnotations {
            canonical: None,
            prompt: None,
            required_if: None,
            unique: false,
            filterable: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArgDef {
    pub direction: ArgDirection,
    pub name: String,
    pub ty: Type,
    pub annotations: ArgAnnotations,
}

impl ArgDef {
    pub fn new(direction: ArgDirection, name: impl Into<String>, ty: Type) -> Self {
        ArgDef {
            direction,
            name: name.into(),
            ty,
            annotations: ArgAnnotations::default(),
        }
    }

    pub fn is_input(&self) -> bool {
        self.direction.is_input()
    }

    pub fn is_required(&self) -> bool {
        self.direction == ArgDirection::InReq
    }
}

// ---------------------------------------------------------------------------
// FunctionDef
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Query,
    Action,
    Stream,
}

impl FunctionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FunctionKind::Query => "query",
            FunctionKind::Action => "action",
            FunctionKind::Stream => "stream",
        }
    }
}

/// The typed signature of a single channel of a class.
///
/// Functions do not hold a reference back to their class: they carry the
/// owning kind string, and `qualified_name` is derived from it once.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub class_kind: String,
    pub name: String,
    pub kind: FunctionKind,
    pub args: Vec<ArgDef>,
    pub is_list: bool,
    pub is_monitorable: bool,
    /// Groups of parameter names where at least one member must be bound.
    pub require_either: Vec<Vec<String>>,
    /// Output fields whose equality defines "same tuple" for monitors.
    pub minimal_projection: Option<Vec<String>>,
    pub poll_interval: Option<Value>,
    pub canonical: Option<String>,
}

impl FunctionDef {
    pub fn new(
        class_kind: impl Into<String>,
        name: impl Into<String>,
        kind: FunctionKind,
        args: Vec<ArgDef>,
    ) -> Self {
        FunctionDef {
            class_kind: class_kind.into(),
            name: name.into(),
            kind,
            args,
            is_list: false,
            is_monitorable: false,
            require_either: Vec::new(),
            minimal_projection: None,
            poll_interval: None,
            canonical: None,
        }
    }

    /// `kind.name`, e.g. `com.twitter.post`.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.class_kind, self.name)
    }

    pub fn arg(&self, name: &str) -> Option<&ArgDef> {
        self.args.iter().find(|a| a.name == name)
    }

    pub fn in_args(&self) -> impl Iterator<Item = &ArgDef> {
        self.args.iter().filter(|a| a.is_input())
    }

    pub fn out_args(&self) -> impl Iterator<Item = &ArgDef> {
        self.args.iter().filter(|a| a.direction == ArgDirection::Out)
    }

    pub fn out_names(&self) -> Vec<String> {
        self.out_args().map(|a| a.name.clone()).collect()
    }

    pub fn out_types(&self) -> BTreeMap<String, Type> {
        self.out_args()
            .map(|a| (a.name.clone(), a.ty.clone()))
            .collect()
    }

    /// The key fields for change detection: the declared minimal projection
    /// when present, otherwise every output field.
    pub fn change_keys(&self) -> Vec<String> {
        self.minimal_projection
            .clone()
            .unwrap_or_else(|| self.out_names())
    }

    /// Narrow the signature to the named output fields. Inputs are kept.
    pub fn project(&self, fields: &[String]) -> FunctionDef {
        let mut out = self.clone();
        out.args.retain(|a| {
            a.direction != ArgDirection::Out || fields.iter().any(|f| f == &a.name)
        });
        if let Some(mp) = &mut out.minimal_projection {
            mp.retain(|f| fields.contains(f));
        }
        out
    }

    /// Merge two signatures for a join. Output name collisions are reported
    /// back to the caller; inputs of the right side that are bound by the
    /// `on` clause are expected to be removed by the checker.
    pub fn join(&self, other: &FunctionDef) -> Result<FunctionDef, String> {
        let mut merged = self.clone();
        merged.name = format!("{}+{}", self.name, other.name);
        merged.is_list = true;
        merged.is_monitorable = self.is_monitorable && other.is_monitorable;
        for arg in &other.args {
            if arg.direction == ArgDirection::Out {
                if self
                    .out_args()
                    .any(|a| a.name == arg.name && a.ty != arg.ty)
                {
                    return Err(arg.name.clone());
                }
                if merged.out_args().all(|a| a.name != arg.name) {
                    merged.args.push(arg.clone());
                }
            }
        }
        Ok(merged)
    }
}

// ---------------------------------------------------------------------------
// ClassDef
// ---------------------------------------------------------------------------

/// A named registry entry describing a device or builtin. Classes own their
/// functions; resolution against `extends` parents happens in the schema
/// resolver, which produces a flattened class.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDef {
    pub kind: String,
    pub extends: Vec<String>,
    pub queries: Vec<FunctionDef>,
    pub actions: Vec<FunctionDef>,
    /// Loader / config metadata and other class-level annotations.
    pub annotations: BTreeMap<String, Value>,
}

impl ClassDef {
    pub fn new(kind: impl Into<String>) -> Self {
        ClassDef {
            kind: kind.into(),
            extends: Vec::new(),
            queries: Vec::new(),
            actions: Vec::new(),
            annotations: BTreeMap::new(),
        }
    }

    pub fn query(&self, name: &str) -> Option<&FunctionDef> {
        self.queries.iter().find(|f| f.name == name)
    }

    pub fn action(&self, name: &str) -> Option<&FunctionDef> {
        self.actions.iter().find(|f| f.name == name)
    }

    /// Look up a function by invocation kind. Stream lookups resolve to
    /// monitorable queries.
    pub fn function(&self, kind: FunctionKind, name: &str) -> Option<&FunctionDef> {
        match kind {
            FunctionKind::Query => self.query(name),
            FunctionKind::Action => self.action(name),
            FunctionKind::Stream => self.query(name).filter(|f| f.is_monitorable),
        }
    }
}

/// Shared handle used wherever a schema is attached to an AST node.
pub type FunctionSchema = Arc<FunctionDef>;

#[cfg(test)]
mod tests {
    use super::*;

    fn weather_query() -> FunctionDef {
        let mut f = FunctionDef::new(
            "org.weather",
            "current",
            FunctionKind::Query,
            vec![
                ArgDef::new(ArgDirection::InReq, "location", Type::Location),
                ArgDef::new(ArgDirection::Out, "temperature", Type::Measure("C".into())),
                ArgDef::new(ArgDirection::Out, "summary", Type::String),
            ],
        );
        f.is_monitorable = true;
        f
    }

    #[test]
    fn qualified_name_is_kind_dot_name() {
        assert_eq!(weather_query().qualified_name(), "org.weather.current");
    }

    #[test]
    fn projection_narrows_outputs() {
        let f = weather_query();
        let p = f.project(&["temperature".to_string()]);
        assert_eq!(p.out_names(), vec!["temperature"]);
        // Inputs survive projection.
        assert!(p.arg("location").is_some());
    }

    #[test]
    fn change_keys_default_to_all_outputs() {
        let mut f = weather_query();
        assert_eq!(f.change_keys(), vec!["temperature", "summary"]);
        f.minimal_projection = Some(vec!["temperature".into()]);
        assert_eq!(f.change_keys(), vec!["temperature"]);
    }

    #[test]
    fn join_flags_conflicting_outputs() {
        let f = weather_query();
        let mut other = weather_query();
        other.name = "forecast".into();
        // Same name, different type: conflict.
        other.args[1].ty = Type::Number;
        assert_eq!(f.join(&other), Err("temperature".to_string()));
    }

    #[test]
    fn stream_lookup_requires_monitorable() {
        let mut class = ClassDef::new("org.weather");
        class.queries.push(weather_query());
        assert!(class.function(FunctionKind::Stream, "current").is_some());
        class.queries[0].is_monitorable = false;
        assert!(class.function(FunctionKind::Stream, "current").is_none());
    }
}

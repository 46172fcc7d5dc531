use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Value as Json, json};

use super::resolved::Resolved;
use super::types::{Type, base_unit};

// ---------------------------------------------------------------------------
// Date / Time / Location helpers
// ---------------------------------------------------------------------------

/// A date value: either an absolute instant or a symbolic edge resolved by
/// the runtime at invocation time.
#[derive(Debug, Clone, PartialEq)]
pub enum DateValue {
    Absolute(DateTime<Utc>),
    Now,
    StartOf(String),
    EndOf(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeValue {
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocationValue {
    pub latitude: f64,
    pub longitude: f64,
    pub display: Option<String>,
}

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// A closed tagged variant spanning every type in the language.
///
/// `Undefined(true)` is the `$?` slot marker: it satisfies the type checker
/// but marks the program as non-executable.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Boolean(bool),
    String(String),
    Number(f64),
    Measure(f64, String),
    Currency(f64, String),
    Date(DateValue),
    Time(TimeValue),
    Location(LocationValue),
    Entity {
        value: String,
        display: Option<String>,
        ty: String,
    },
    Enum(String),
    Array(Vec<Value>),
    /// `$event` / `$event.title` / `$event.type` — the tuple that triggered
    /// the current rule, as formatted text.
    Event(Option<String>),
    VarRef(String),
    Computation {
        op: String,
        args: Vec<Value>,
        /// Result type, filled in by the type checker.
        ty: Resolved<Type>,
    },
    Undefined(bool),
}

impl Value {
    /// The static type of this value. `VarRef` and `Undefined` are typed by
    /// the scope they appear in, so they report `Any` here; `Computation`
    /// reports the checker-resolved type when present.
    pub fn type_of(&self) -> Type {
        match self {
            Value::Boolean(_) => Type::Boolean,
            Value::String(_) => Type::String,
            Value::Number(_) => Type::Number,
            Value::Measure(_, unit) => Type::Measure(base_unit(unit).to_string()),
            Value::Currency(_, _) => Type::Currency,
            Value::Date(_) => Type::Date,
            Value::Time(_) => Type::Time,
            Value::Location(_) => Type::Location,
            Value::Entity { ty, .. } => Type::Entity(ty.clone()),
            Value::Enum(label) => Type::Enum(vec![label.clone()]),
            Value::Array(items) => {
                let elem = items.first().map(Value::type_of).unwrap_or(Type::Any);
                Type::Array(Box::new(elem))
            }
            Value::Event(_) => Type::String,
            Value::VarRef(_) => Type::Any,
            Value::Computation { ty, .. } => ty.get().cloned().unwrap_or(Type::Any),
            Value::Undefined(_) => Type::Any,
        }
    }

    /// Compositional constantness: literals are constant, `VarRef`s only
    /// when they carry the `__const_` prefix; events, undefined markers,
    /// computations and ordinary variables are not.
    pub fn is_constant(&self) -> bool {
        match self {
            Value::Boolean(_)
            | Value::String(_)
            | Value::Number(_)
            | Value::Measure(_, _)
            | Value::Currency(_, _)
            | Value::Date(_)
            | Value::Time(_)
            | Value::Location(_)
            | Value::Entity { .. }
            | Value::Enum(_) => true,
            Value::Array(items) => items.iter().all(Value::is_constant),
            Value::VarRef(name) => name.starts_with("__const_"),
            Value::Event(_) | Value::Computation { .. } | Value::Undefined(_) => false,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined(_))
    }

    // -----------------------------------------------------------------------
    // JSON bridging
    // -----------------------------------------------------------------------

    /// Serialize to the runtime JSON representation. The inverse is
    /// [`Value::from_json`], which needs the declared type to disambiguate.
    pub fn to_json(&self) -> Json {
        match self {
            Value::Boolean(b) => json!(b),
            Value::String(s) => json!(s),
            Value::Number(n) => json!(n),
            Value::Measure(v, unit) => json!({"value": v, "unit": unit}),
            Value::Currency(v, code) => json!({"value": v, "code": code}),
            Value::Date(DateValue::Absolute(dt)) => {
                json!(dt.to_rfc3339_opts(SecondsFormat::Secs, true))
            }
            Value::Date(DateValue::Now) => json!({"edge": "now"}),
            Value::Date(DateValue::StartOf(unit)) => json!({"edge": "start_of", "unit": unit}),
            Value::Date(DateValue::EndOf(unit)) => json!({"edge": "end_of", "unit": unit}),
            Value::Time(t) => json!({"hour": t.hour, "minute": t.minute, "second": t.second}),
            Value::Location(l) => {
                json!({"latitude": l.latitude, "longitude": l.longitude, "display": l.display})
            }
            Value::Entity { value, display, ty } => {
                json!({"value": value, "display": display, "type": ty})
            }
            Value::Enum(label) => json!(label),
            Value::Array(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Value::Event(field) => json!({"event": field}),
            Value::VarRef(name) => json!({"var": name}),
            Value::Computation { op, args, .. } => {
                json!({"op": op, "args": args.iter().map(Value::to_json).collect::<Vec<_>>()})
            }
            Value::Undefined(required) => json!({"undefined": required}),
        }
    }

    /// Reconstruct a value of declared type `ty` from its JSON form.
    /// `from_json(T, v.to_json()) == v` for every well-typed `v`.
    pub fn from_json(ty: &Type, js: &Json) -> Result<Value, String> {
        match (ty, js) {
            (Type::Boolean, Json::Bool(b)) => Ok(Value::Boolean(*b)),
            (Type::String, Json::String(s)) => Ok(Value::String(s.clone())),
            (Type::String, Json::Object(o)) if o.contains_key("event") => {
                let field = o["event"].as_str().map(str::to_string);
                Ok(Value::Event(field))
            }
            (Type::Number, Json::Number(_)) => Ok(Value::Number(js.as_f64().unwrap_or(0.0))),
            (Type::Measure(_), Json::Object(o)) => {
                let v = o.get("value").and_then(Json::as_f64);
                let unit = o.get("unit").and_then(Json::as_str);
                match (v, unit) {
                    (Some(v), Some(unit)) => Ok(Value::Measure(v, unit.to_string())),
                    _ => Err(format!("malformed measure: {js}")),
                }
            }
            (Type::Currency, Json::Object(o)) => {
                let v = o.get("value").and_then(Json::as_f64);
                let code = o.get("code").and_then(Json::as_str);
                match (v, code) {
                    (Some(v), Some(code)) => Ok(Value::Currency(v, code.to_string())),
                    _ => Err(format!("malformed currency: {js}")),
                }
            }
            (Type::Date, Json::String(s)) => DateTime::parse_from_rfc3339(s)
                .map(|dt| Value::Date(DateValue::Absolute(dt.with_timezone(&Utc))))
                .map_err(|e| format!("bad date `{s}`: {e}")),
            (Type::Date, Json::Object(o)) => match o.get("edge").and_then(Json::as_str) {
                Some("now") => Ok(Value::Date(DateValue::Now)),
                Some("start_of") => Ok(Value::Date(DateValue::StartOf(
                    o.get("unit")
                        .and_then(Json::as_str)
                        .unwrap_or("day")
                        .to_string(),
                ))),
                Some("end_of") => Ok(Value::Date(DateValue::EndOf(
                    o.get("unit")
                        .and_then(Json::as_str)
                        .unwrap_or("day")
                        .to_string(),
                ))),
                _ => Err(format!("malformed date: {js}")),
            },
            (Type::Time, Json::Object(o)) => {
                let get = |k: &str| o.get(k).and_then(Json::as_u64).unwrap_or(0) as u8;
                Ok(Value::Time(TimeValue {
                    hour: get("hour"),
                    minute: get("minute"),
                    second: get("second"),
                }))
            }
            (Type::Location, Json::Object(o)) => {
                let lat = o.get("latitude").and_then(Json::as_f64);
                let lon = o.get("longitude").and_then(Json::as_f64);
                match (lat, lon) {
                    (Some(latitude), Some(longitude)) => Ok(Value::Location(LocationValue {
                        latitude,
                        longitude,
                        display: o
                            .get("display")
                            .and_then(Json::as_str)
                            .map(str::to_string),
                    })),
                    _ => Err(format!("malformed location: {js}")),
                }
            }
            (Type::Entity(kind), Json::String(s)) => Ok(Value::Entity {
                value: s.clone(),
                display: None,
                ty: kind.clone(),
            }),
            (Type::Entity(kind), Json::Object(o)) => {
                let value = o
                    .get("value")
                    .and_then(Json::as_str)
                    .ok_or_else(|| format!("malformed entity: {js}"))?;
                Ok(Value::Entity {
                    value: value.to_string(),
                    display: o
                        .get("display")
                        .and_then(Json::as_str)
                        .map(str::to_string),
                    ty: kind.clone(),
                })
            }
            (Type::Enum(_), Json::String(s)) => Ok(Value::Enum(s.clone())),
            (Type::Array(elem), Json::Array(items)) => items
                .iter()
                .map(|item| Value::from_json(elem, item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            (Type::Any, _) => Err("cannot reconstruct a value of type Any".to_string()),
            _ => Err(format!("JSON value {js} does not fit type {ty}")),
        }
    }
}

//! Self-describing JSON encoding for state slots. Monitor snapshots and
//! memoized results survive process restarts, so the encoding is tagged
//! rather than relying on schema context.

use serde_json::{Value as Json, json};

use tt_lang::ast::{DateValue, LocationValue, TimeValue, Value};

use crate::env::Tuple;

pub(crate) fn value_to_state(value: &Value) -> Json {
    match value {
        Value::Boolean(b) => json!({"t": "bool", "v": b}),
        Value::String(s) => json!({"t": "str", "v": s}),
        Value::Number(n) => json!({"t": "num", "v": n}),
        Value::Measure(v, unit) => json!({"t": "measure", "v": v, "unit": unit}),
        Value::Currency(v, code) => json!({"t": "currency", "v": v, "code": code}),
        Value::Date(DateValue::Absolute(dt)) => json!({"t": "date", "v": dt.to_rfc3339()}),
        Value::Date(DateValue::Now) => json!({"t": "date_edge", "edge": "now"}),
        Value::Date(DateValue::StartOf(unit)) => {
            json!({"t": "date_edge", "edge": "start_of", "unit": unit})
        }
        Value::Date(DateValue::EndOf(unit)) => {
            json!({"t": "date_edge", "edge": "end_of", "unit": unit})
        }
        Value::Time(t) => json!({"t": "time", "h": t.hour, "m": t.minute, "s": t.second}),
        Value::Location(l) => {
            json!({"t": "loc", "lat": l.latitude, "lon": l.longitude, "display": l.display})
        }
        Value::Entity { value, display, ty } => {
            json!({"t": "entity", "v": value, "ty": ty, "display": display})
        }
        Value::Enum(label) => json!({"t": "enum", "v": label}),
        Value::Array(items) => {
            json!({"t": "array", "v": items.iter().map(value_to_state).collect::<Vec<_>>()})
        }
        // Unresolved forms never reach a state slot.
        Value::Event(_) | Value::VarRef(_) | Value::Computation { .. } | Value::Undefined(_) => {
            json!({"t": "undef"})
        }
    }
}

pub(crate) fn value_from_state(js: &Json) -> Option<Value> {
    let tag = js.get("t")?.as_str()?;
    match tag {
        "bool" => Some(Value::Boolean(js.get("v")?.as_bool()?)),
        "str" => Some(Value::String(js.get("v")?.as_str()?.to_string())),
        "num" => Some(Value::Number(js.get("v")?.as_f64()?)),
        "measure" => Some(Value::Measure(
            js.get("v")?.as_f64()?,
            js.get("unit")?.as_str()?.to_string(),
        )),
        "currency" => Some(Value::Currency(
            js.get("v")?.as_f64()?,
            js.get("code")?.as_str()?.to_string(),
        )),
        "date" => chrono::DateTime::parse_from_rfc3339(js.get("v")?.as_str()?)
            .ok()
            .map(|dt| Value::Date(DateValue::Absolute(dt.with_timezone(&chrono::Utc)))),
        "date_edge" => match js.get("edge")?.as_str()? {
            "now" => Some(Value::Date(DateValue::Now)),
            "start_of" => Some(Value::Date(DateValue::StartOf(
                js.get("unit")?.as_str()?.to_string(),
            ))),
            "end_of" => Some(Value::Date(DateValue::EndOf(
                js.get("unit")?.as_str()?.to_string(),
            ))),
            _ => None,
        },
        "time" => Some(Value::Time(TimeValue {
            hour: js.get("h")?.as_u64()? as u8,
            minute: js.get("m")?.as_u64()? as u8,
            second: js.get("s")?.as_u64()? as u8,
        })),
        "loc" => Some(Value::Location(LocationValue {
            latitude: js.get("lat")?.as_f64()?,
            longitude: js.get("lon")?.as_f64()?,
            display: js
                .get("display")
                .and_then(Json::as_str)
                .map(str::to_string),
        })),
        "entity" => Some(Value::Entity {
            value: js.get("v")?.as_str()?.to_string(),
            ty: js.get("ty")?.as_str()?.to_string(),
            display: js
                .get("display")
                .and_then(Json::as_str)
                .map(str::to_string),
        }),
        "enum" => Some(Value::Enum(js.get("v")?.as_str()?.to_string())),
        "array" => js
            .get("v")?
            .as_array()?
            .iter()
            .map(value_from_state)
            .collect::<Option<Vec<_>>>()
            .map(Value::Array),
        "undef" => Some(Value::Undefined(false)),
        _ => None,
    }
}

pub(crate) fn tuple_to_state(tuple: &Tuple) -> Json {
    let mut object = serde_json::Map::new();
    let mut names: Vec<&String> = tuple.keys().collect();
    names.sort();
    for name in names {
        object.insert(name.clone(), value_to_state(&tuple[name]));
    }
    Json::Object(object)
}

pub(crate) fn tuple_from_state(js: &Json) -> Option<Tuple> {
    let object = js.as_object()?;
    let mut tuple = Tuple::new();
    for (name, value) in object {
        tuple.insert(name.clone(), value_from_state(value)?);
    }
    Some(tuple)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tuples_roundtrip_through_state() {
        let tuple = Tuple::from([
            ("n".to_string(), Value::Number(4.5)),
            ("s".to_string(), Value::String("x".to_string())),
            ("m".to_string(), Value::Measure(21.0, "C".to_string())),
            (
                "e".to_string(),
                Value::Entity {
                    value: "bob".to_string(),
                    display: None,
                    ty: "tt:username".to_string(),
                },
            ),
            (
                "a".to_string(),
                Value::Array(vec![Value::Boolean(true), Value::Boolean(false)]),
            ),
        ]);
        let js = tuple_to_state(&tuple);
        assert_eq!(tuple_from_state(&js).unwrap(), tuple);
    }

    #[test]
    fn state_keys_are_order_independent() {
        let mut a = Tuple::new();
        a.insert("x".to_string(), Value::Number(1.0));
        a.insert("y".to_string(), Value::Number(2.0));
        let mut b = Tuple::new();
        b.insert("y".to_string(), Value::Number(2.0));
        b.insert("x".to_string(), Value::Number(1.0));
        assert_eq!(tuple_to_state(&a), tuple_to_state(&b));
    }
}

use winnow::combinator::{alt, cut_err, opt, separated};
use winnow::prelude::*;
use winnow::token::literal;

use crate::ast::{
    ArgDef, ArgDirection, ClassDef, CompoundType, Dataset, DeclarationBody, DeclarationKind,
    Example, FunctionDef, FunctionKind, Type, Value,
};
use crate::parse_utils::{
    dotted_kind, entity_type, expected, ident, kw, quoted_string, token, ws_skip,
};

use super::table_p::{parse_invocation, parse_stream, parse_table};
use super::value_p::parse_value;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

pub fn parse_type(input: &mut &str) -> ModalResult<Type> {
    ws_skip.parse_next(input)?;
    alt((
        kw("String").map(|_| Type::String),
        kw("Number").map(|_| Type::Number),
        kw("Boolean").map(|_| Type::Boolean),
        kw("Date").map(|_| Type::Date),
        kw("Time").map(|_| Type::Time),
        kw("Location").map(|_| Type::Location),
        kw("Currency").map(|_| Type::Currency),
        kw("RecurrentTimeSpecification").map(|_| Type::RecurrentTimeSpecification),
        kw("ArgMap").map(|_| Type::ArgMap),
        kw("Any").map(|_| Type::Any),
        measure_type,
        entity_type_t,
        enum_type,
        array_type,
        compound_type,
    ))
    .parse_next(input)
}

fn measure_type(input: &mut &str) -> ModalResult<Type> {
    kw("Measure").parse_next(input)?;
    cut_err(token("(")).parse_next(input)?;
    let unit = cut_err(ident).context(expected("unit name")).parse_next(input)?;
    let unit = unit.to_string();
    cut_err(token(")")).parse_next(input)?;
    Ok(Type::Measure(unit))
}

fn entity_type_t(input: &mut &str) -> ModalResult<Type> {
    kw("Entity").parse_next(input)?;
    cut_err(token("(")).parse_next(input)?;
    let kind = cut_err(entity_type)
        .context(expected("entity kind"))
        .parse_next(input)?;
    cut_err(token(")")).parse_next(input)?;
    Ok(Type::Entity(kind))
}

fn enum_type(input: &mut &str) -> ModalResult<Type> {
    kw("Enum").parse_next(input)?;
    cut_err(token("(")).parse_next(input)?;
    let labels: Vec<String> = separated(
        1..,
        ident.map(|s: &str| s.to_string()),
        token(","),
    )
    .parse_next(input)?;
    cut_err(token(")")).parse_next(input)?;
    Ok(Type::Enum(labels))
}

fn array_type(input: &mut &str) -> ModalResult<Type> {
    kw("Array").parse_next(input)?;
    cut_err(token("(")).parse_next(input)?;
    let elem = cut_err(parse_type).parse_next(input)?;
    cut_err(token(")")).parse_next(input)?;
    Ok(Type::Array(Box::new(elem)))
}

fn compound_type(input: &mut &str) -> ModalResult<Type> {
    literal("{").parse_next(input)?;
    ws_skip.parse_next(input)?;
    let fields: Vec<(String, Type)> = separated(
        1..,
        |input: &mut &str| {
            ws_skip.parse_next(input)?;
            let name = ident.parse_next(input)?.to_string();
            token(":").parse_next(input)?;
            let ty = cut_err(parse_type).parse_next(input)?;
            Ok((name, ty))
        },
        token(","),
    )
    .parse_next(input)?;
    ws_skip.parse_next(input)?;
    cut_err(literal("}")).parse_next(input)?;
    Ok(Type::Compound(CompoundType {
        fields: fields.into_iter().collect(),
    }))
}

// ---------------------------------------------------------------------------
// Annotations
// ---------------------------------------------------------------------------

struct Annotation {
    key: String,
    value: Value,
}

fn annotation(input: &mut &str) -> ModalResult<Annotation> {
    ws_skip.parse_next(input)?;
    literal("#[").parse_next(input)?;
    let key = cut_err(ident).parse_next(input)?.to_string();
    cut_err(token("=")).parse_next(input)?;
    let value = cut_err(parse_value)
        .context(expected("annotation value"))
        .parse_next(input)?;
    cut_err(token("]")).parse_next(input)?;
    Ok(Annotation { key, value })
}

fn string_list(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|v| match v {
                Value::String(s) => Some(s.clone()),
                _ => None,
            })
            .collect(),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Function members
// ---------------------------------------------------------------------------

fn arg_def(input: &mut &str) -> ModalResult<ArgDef> {
    ws_skip.parse_next(input)?;
    let direction = alt((
        (kw("in"), ws_skip, kw("req")).map(|_| ArgDirection::InReq),
        (kw("in"), ws_skip, kw("opt")).map(|_| ArgDirection::InOpt),
        kw("out").map(|_| ArgDirection::Out),
    ))
    .parse_next(input)?;
    ws_skip.parse_next(input)?;
    let name = cut_err(ident).parse_next(input)?.to_string();
    cut_err(token(":")).parse_next(input)?;
    let ty = cut_err(parse_type)
        .context(expected("argument type"))
        .parse_next(input)?;

    let mut arg = ArgDef::new(direction, name, ty);
    loop {
        let Some(ann) = opt(annotation).parse_next(input)? else {
            break;
        };
        match (ann.key.as_str(), &ann.value) {
            ("canonical", Value::String(s)) => arg.annotations.canonical = Some(s.clone()),
            ("prompt", Value::String(s)) => arg.annotations.prompt = Some(s.clone()),
            ("required_if", Value::String(s)) => arg.annotations.required_if = Some(s.clone()),
            ("unique", Value::Boolean(b)) => arg.annotations.unique = *b,
            ("filterable", Value::Boolean(b)) => arg.annotations.filterable = *b,
            _ => {}
        }
    }
    Ok(arg)
}

fn function_member(input: &mut &str, class_kind: &str) -> ModalResult<FunctionDef> {
    ws_skip.parse_next(input)?;
    let is_monitorable = opt(kw("monitorable")).parse_next(input)?.is_some();
    ws_skip.parse_next(input)?;
    let is_list = opt(kw("list")).parse_next(input)?.is_some();
    ws_skip.parse_next(input)?;
    let kind = alt((
        kw("query").map(|_| FunctionKind::Query),
        kw("action").map(|_| FunctionKind::Action),
    ))
    .parse_next(input)?;
    ws_skip.parse_next(input)?;
    let name = cut_err(ident)
        .context(expected("function name"))
        .parse_next(input)?
        .to_string();
    ws_skip.parse_next(input)?;
    cut_err(literal("(")).parse_next(input)?;
    ws_skip.parse_next(input)?;
    let args: Vec<ArgDef> = separated(0.., arg_def, token(",")).parse_next(input)?;
    ws_skip.parse_next(input)?;
    cut_err(literal(")")).parse_next(input)?;

    let mut func = FunctionDef::new(class_kind, name, kind, args);
    func.is_monitorable = is_monitorable;
    func.is_list = is_list;
    loop {
        let Some(ann) = opt(annotation).parse_next(input)? else {
            break;
        };
        match (ann.key.as_str(), &ann.value) {
            ("require_either", Value::Array(groups)) => {
                func.require_either = groups.iter().filter_map(string_list).collect();
            }
            ("minimal_projection", v) => func.minimal_projection = string_list(v),
            ("poll_interval", v) => func.poll_interval = Some(v.clone()),
            ("canonical", Value::String(s)) => func.canonical = Some(s.clone()),
            _ => {}
        }
    }
    cut_err(token(";")).parse_next(input)?;
    Ok(func)
}

// ---------------------------------------------------------------------------
// Classes
// ---------------------------------------------------------------------------

pub fn class_def(input: &mut &str) -> ModalResult<ClassDef> {
    ws_skip.parse_next(input)?;
    kw("class").parse_next(input)?;
    ws_skip.parse_next(input)?;
    cut_err(literal("@")).parse_next(input)?;
    let kind = cut_err(dotted_kind)
        .context(expected("class kind"))
        .parse_next(input)?;

    let mut class = ClassDef::new(kind);
    loop {
        ws_skip.parse_next(input)?;
        if opt(kw("extends")).parse_next(input)?.is_some() {
            ws_skip.parse_next(input)?;
            cut_err(literal("@")).parse_next(input)?;
            let parent = cut_err(dotted_kind).parse_next(input)?;
            class.extends.push(parent);
        } else {
            break;
        }
    }
    loop {
        let Some(ann) = opt(annotation).parse_next(input)? else {
            break;
        };
        class.annotations.insert(ann.key, ann.value);
    }

    ws_skip.parse_next(input)?;
    cut_err(literal("{"))
        .context(expected("'{' opening class body"))
        .parse_next(input)?;
    loop {
        ws_skip.parse_next(input)?;
        if opt(literal("}")).parse_next(input)?.is_some() {
            break;
        }
        let kind = class.kind.clone();
        let func = cut_err(|input: &mut &str| function_member(input, &kind))
            .context(expected("query or action member"))
            .parse_next(input)?;
        match func.kind {
            FunctionKind::Action => class.actions.push(func),
            _ => class.queries.push(func),
        }
    }
    Ok(class)
}

// ---------------------------------------------------------------------------
// Datasets
// ---------------------------------------------------------------------------

fn example_params(input: &mut &str) -> ModalResult<Vec<ArgDef>> {
    literal("(").parse_next(input)?;
    ws_skip.parse_next(input)?;
    let params: Vec<ArgDef> = separated(
        1..,
        |input: &mut &str| {
            ws_skip.parse_next(input)?;
            let name = ident.parse_next(input)?.to_string();
            token(":").parse_next(input)?;
            let ty = cut_err(parse_type).parse_next(input)?;
            Ok(ArgDef::new(ArgDirection::InReq, name, ty))
        },
        token(","),
    )
    .parse_next(input)?;
    ws_skip.parse_next(input)?;
    cut_err(literal(")")).parse_next(input)?;
    Ok(params)
}

fn example(input: &mut &str) -> ModalResult<Example> {
    ws_skip.parse_next(input)?;
    let kind = alt((
        kw("query").map(|_| DeclarationKind::Query),
        kw("stream").map(|_| DeclarationKind::Stream),
        kw("action").map(|_| DeclarationKind::Action),
        kw("procedure").map(|_| DeclarationKind::Procedure),
    ))
    .parse_next(input)?;
    ws_skip.parse_next(input)?;
    let params = opt(example_params).parse_next(input)?.unwrap_or_default();
    cut_err(token(":=")).parse_next(input)?;
    let body = match kind {
        DeclarationKind::Query => DeclarationBody::Table(cut_err(parse_table).parse_next(input)?),
        DeclarationKind::Stream => {
            DeclarationBody::Stream(cut_err(parse_stream).parse_next(input)?)
        }
        DeclarationKind::Action | DeclarationKind::Procedure => DeclarationBody::Action(
            crate::ast::Action::Invocation(cut_err(parse_invocation).parse_next(input)?),
        ),
    };

    ws_skip.parse_next(input)?;
    let utterances = if opt(literal("#_[")).parse_next(input)?.is_some() {
        cut_err(kw("utterances")).parse_next(input)?;
        cut_err(token("=")).parse_next(input)?;
        cut_err(token("[")).parse_next(input)?;
        let us: Vec<String> =
            separated(1.., quoted_string, token(",")).parse_next(input)?;
        cut_err(token("]")).parse_next(input)?;
        cut_err(token("]")).parse_next(input)?;
        us
    } else {
        Vec::new()
    };
    cut_err(token(";")).parse_next(input)?;
    Ok(Example {
        kind,
        params,
        body,
        utterances,
    })
}

pub fn dataset(input: &mut &str) -> ModalResult<Dataset> {
    ws_skip.parse_next(input)?;
    kw("dataset").parse_next(input)?;
    ws_skip.parse_next(input)?;
    cut_err(literal("@")).parse_next(input)?;
    let name = cut_err(dotted_kind).parse_next(input)?;
    ws_skip.parse_next(input)?;
    cut_err(literal("{")).parse_next(input)?;
    let mut examples = Vec::new();
    loop {
        ws_skip.parse_next(input)?;
        if opt(literal("}")).parse_next(input)?.is_some() {
            break;
        }
        examples.push(cut_err(example).parse_next(input)?);
    }
    Ok(Dataset { name, examples })
}

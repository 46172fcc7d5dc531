use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Units
// ---------------------------------------------------------------------------

/// Map a surface unit to its base unit. Measure types are identical iff
/// their base units are.
pub fn base_unit(unit: &str) -> &'static str {
    match unit {
        "ms" | "s" | "min" | "h" | "day" | "week" | "mon" | "year" => "ms",
        "C" | "F" | "K" => "C",
        "m" | "mm" | "cm" | "km" | "mi" | "in" | "ft" => "m",
        "kg" | "g" | "lb" | "oz" => "kg",
        "mps" | "kmph" | "mph" => "mps",
        "byte" | "KB" | "MB" | "GB" => "byte",
        "kcal" | "kJ" => "kcal",
        _ => "unknown",
    }
}

/// Conversion factor from `unit` to its base unit.
pub fn unit_factor(unit: &str) -> f64 {
    match unit {
        "ms" | "C" | "m" | "kg" | "mps" | "byte" | "kcal" => 1.0,
        "s" => 1000.0,
        "min" => 60_000.0,
        "h" => 3_600_000.0,
        "day" => 86_400_000.0,
        "week" => 604_800_000.0,
        "mon" => 2_592_000_000.0,
        "year" => 31_536_000_000.0,
        "mm" => 0.001,
        "cm" => 0.01,
        "km" => 1000.0,
        "mi" => 1609.344,
        "in" => 0.0254,
        "ft" => 0.3048,
        "g" => 0.001,
        "lb" => 0.45359237,
        "oz" => 0.028349523,
        "kmph" => 0.27777778,
        "mph" => 0.44704,
        "KB" => 1000.0,
        "MB" => 1_000_000.0,
        "GB" => 1_000_000_000.0,
        "kJ" => 0.239006,
        _ => 1.0,
    }
}

// ---------------------------------------------------------------------------
// Type
// ---------------------------------------------------------------------------

/// The closed type algebra of the language.
///
/// Identity is structural: `Measure` types compare by base unit, `Entity`
/// types by kind string, `Enum` types by label list.
#[derive(Debug, Clone)]
pub enum Type {
    Boolean,
    String,
    Number,
    Measure(String),
    Currency,
    Date,
    Time,
    RecurrentTimeSpecification,
    Location,
    Entity(String),
    Enum(Vec<String>),
    Array(Box<Type>),
    Compound(CompoundType),
    ArgMap,
    Any,
    TypeVar(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompoundType {
    pub fields: BTreeMap<String, Type>,
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        use Type::*;
        match (self, other) {
            (Boolean, Boolean)
            | (String, String)
            | (Number, Number)
            | (Currency, Currency)
            | (Date, Date)
            | (Time, Time)
            | (RecurrentTimeSpecification, RecurrentTimeSpecification)
            | (Location, Location)
            | (ArgMap, ArgMap)
            | (Any, Any) => true,
            (Measure(a), Measure(b)) => base_unit(a) == base_unit(b),
            (Entity(a), Entity(b)) => a == b,
            (Enum(a), Enum(b)) => a == b,
            (Array(a), Array(b)) => a == b,
            (Compound(a), Compound(b)) => a == b,
            (TypeVar(a), TypeVar(b)) => a == b,
            _ => false,
        }
    }
}

impl Type {
    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Number | Type::Measure(_) | Type::Currency)
    }

    /// Minimal subtyping: `Any` is top; enum subtyping is label-set
    /// inclusion; arrays are covariant; everything else is identity.
    pub fn is_assignable_to(&self, target: &Type) -> bool {
        use Type::*;
        match (self, target) {
            (_, Any) | (Any, _) => true,
            (Enum(sub), Enum(sup)) => sub.iter().all(|l| sup.contains(l)),
            (Array(a), Array(b)) => a.is_assignable_to(b),
            (a, b) => a == b,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Boolean => write!(f, "Boolean"),
            Type::String => write!(f, "String"),
            Type::Number => write!(f, "Number"),
            Type::Measure(unit) => write!(f, "Measure({unit})"),
            Type::Currency => write!(f, "Currency"),
            Type::Date => write!(f, "Date"),
            Type::Time => write!(f, "Time"),
            Type::RecurrentTimeSpecification => write!(f, "RecurrentTimeSpecification"),
            Type::Location => write!(f, "Location"),
            Type::Entity(kind) => write!(f, "Entity({kind})"),
            Type::Enum(labels) => write!(f, "Enum({})", labels.join(",")),
            Type::Array(elem) => write!(f, "Array({elem})"),
            Type::Compound(c) => {
                write!(f, "{{")?;
                let mut first = true;
                for (name, ty) in &c.fields {
                    if !first {
                        write!(f, ", ")?;
                    }
                    first = false;
                    write!(f, "{name} : {ty}")?;
                }
                write!(f, "}}")
            }
            Type::ArgMap => write!(f, "ArgMap"),
            Type::Any => write!(f, "Any"),
            Type::TypeVar(name) => write!(f, "{name}"),
        }
    }
}

//! # Value Codec
//!
//! Converts between JSON call parameters and component-model values, steered by
//! the types of the function being called.
//!
//! | component type | JSON |
//! |----------------|------|
//! | bool, integers, floats, string | the matching scalar |
//! | char | one-character string |
//! | list, tuple | array |
//! | record | object keyed by field name |
//! | enum | case name |
//! | flags | array of set flag names |
//! | option | `null` or the payload |
//! | variant | `{ "tag": case, "val": payload }` |
//! | result | `{ "tag": "ok" \| "err", "val": payload }` |
//!
//! Resources, futures, streams and error contexts cannot be represented.

use serde_json::Map;
use serde_json::Number;
use serde_json::Value;
use wasmtime::component::Type;
use wasmtime::component::Val;

/// Maximum nesting accepted in either direction.
pub const MAX_RECURSION_DEPTH: usize = 64;

#[derive(Debug, Clone)]
pub enum Error {
    TypeMismatch { expected: String, found: String },
    MissingField(String),
    UnknownVariant(String),
    UnsupportedType(String),
    ArityMismatch { expected: usize, found: usize },
    /// A float that JSON has no spelling for (NaN, infinities).
    NotRepresentable(String),
    RecursionLimit,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TypeMismatch { expected, found } => write!(f, "expected {}, found {}", expected, found),
            Self::MissingField(name) => write!(f, "missing field '{}'", name),
            Self::UnknownVariant(name) => write!(f, "unknown case '{}'", name),
            Self::UnsupportedType(desc) => write!(f, "{} values cannot cross a call boundary", desc),
            Self::ArityMismatch { expected, found } => {
                write!(f, "expected {} values, found {}", expected, found)
            }
            Self::NotRepresentable(what) => write!(f, "{} has no JSON representation", what),
            Self::RecursionLimit => write!(f, "value nested deeper than {}", MAX_RECURSION_DEPTH),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

fn json_desc(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn val_desc(val: &Val) -> &'static str {
    match val {
        Val::Bool(_) => "bool",
        Val::U8(_) => "u8",
        Val::S8(_) => "s8",
        Val::U16(_) => "u16",
        Val::S16(_) => "s16",
        Val::U32(_) => "u32",
        Val::S32(_) => "s32",
        Val::U64(_) => "u64",
        Val::S64(_) => "s64",
        Val::Float32(_) => "f32",
        Val::Float64(_) => "f64",
        Val::Char(_) => "char",
        Val::String(_) => "string",
        Val::List(_) => "list",
        Val::Record(_) => "record",
        Val::Tuple(_) => "tuple",
        Val::Variant(..) => "variant",
        Val::Enum(_) => "enum",
        Val::Option(_) => "option",
        Val::Result(_) => "result",
        Val::Flags(_) => "flags",
        Val::Resource(_) => "resource",
        Val::Future(_) => "future",
        Val::Stream(_) => "stream",
        Val::ErrorContext(_) => "error-context",
    }
}

fn mismatch(expected: &str, found: &Value) -> Error {
    Error::TypeMismatch {
        expected: expected.to_string(),
        found: json_desc(found).to_string(),
    }
}

// ============================================================================
//  JSON -> Val
// ============================================================================

/// Converts positional JSON params into call arguments.
pub fn params_to_vals(params: &[Value], types: &[Type]) -> Result<Vec<Val>> {
    if params.len() != types.len() {
        return Err(Error::ArityMismatch { expected: types.len(), found: params.len() });
    }
    params.iter().zip(types).map(|(value, ty)| json_to_val(value, ty)).collect()
}

/// Converts a JSON result back into the values a function returns.
///
/// Inverse of [`vals_to_result`]: no results expect anything (it is ignored),
/// one result expects the bare value, several expect an array.
pub fn result_to_vals(value: &Value, types: &[Type]) -> Result<Vec<Val>> {
    match types {
        [] => Ok(Vec::new()),
        [ty] => Ok(vec![json_to_val(value, ty)?]),
        many => {
            let Value::Array(items) = value else { return Err(mismatch("array", value)) };
            params_to_vals(items, many)
        }
    }
}

pub fn json_to_val(value: &Value, ty: &Type) -> Result<Val> {
    decode(value, ty, 0)
}

fn unsigned(value: &Value, expected: &str) -> Result<u64> {
    value.as_u64().ok_or_else(|| mismatch(expected, value))
}

fn signed(value: &Value, expected: &str) -> Result<i64> {
    value.as_i64().ok_or_else(|| mismatch(expected, value))
}

fn narrow<T: TryFrom<i128>>(n: i128, expected: &str) -> Result<T> {
    T::try_from(n).map_err(|_| Error::TypeMismatch {
        expected: expected.to_string(),
        found: n.to_string(),
    })
}

/// Out-of-range doubles would round to an infinity.
fn narrow_f32(f: f64) -> Result<f32> {
    let narrowed = f as f32;
    if narrowed.is_infinite() {
        return Err(Error::TypeMismatch {
            expected: "f32".to_string(),
            found: f.to_string(),
        });
    }
    Ok(narrowed)
}

fn decode(value: &Value, ty: &Type, depth: usize) -> Result<Val> {
    if depth > MAX_RECURSION_DEPTH {
        return Err(Error::RecursionLimit);
    }
    let depth = depth + 1;

    match ty {
        Type::Bool => value.as_bool().map(Val::Bool).ok_or_else(|| mismatch("bool", value)),
        Type::U8 => Ok(Val::U8(narrow(unsigned(value, "u8")? as i128, "u8")?)),
        Type::U16 => Ok(Val::U16(narrow(unsigned(value, "u16")? as i128, "u16")?)),
        Type::U32 => Ok(Val::U32(narrow(unsigned(value, "u32")? as i128, "u32")?)),
        Type::U64 => Ok(Val::U64(unsigned(value, "u64")?)),
        Type::S8 => Ok(Val::S8(narrow(signed(value, "s8")? as i128, "s8")?)),
        Type::S16 => Ok(Val::S16(narrow(signed(value, "s16")? as i128, "s16")?)),
        Type::S32 => Ok(Val::S32(narrow(signed(value, "s32")? as i128, "s32")?)),
        Type::S64 => Ok(Val::S64(signed(value, "s64")?)),
        Type::Float32 => {
            let f = value.as_f64().ok_or_else(|| mismatch("f32", value))?;
            narrow_f32(f).map(Val::Float32)
        }
        Type::Float64 => value.as_f64().map(Val::Float64).ok_or_else(|| mismatch("f64", value)),
        Type::Char => {
            let s = value.as_str().ok_or_else(|| mismatch("char", value))?;
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(Val::Char(c)),
                _ => Err(Error::TypeMismatch {
                    expected: "char".into(),
                    found: format!("string of {} chars", s.chars().count()),
                }),
            }
        }
        Type::String => value.as_str().map(|s| Val::String(s.to_string())).ok_or_else(|| mismatch("string", value)),

        Type::List(handle) => {
            let items = value.as_array().ok_or_else(|| mismatch("list", value))?;
            let inner = handle.ty();
            items.iter().map(|item| decode(item, &inner, depth)).collect::<Result<_>>().map(Val::List)
        }

        Type::Tuple(handle) => {
            let items = value.as_array().ok_or_else(|| mismatch("tuple", value))?;
            let types: Vec<Type> = handle.types().collect();
            if items.len() != types.len() {
                return Err(Error::ArityMismatch { expected: types.len(), found: items.len() });
            }
            items.iter().zip(&types).map(|(item, ty)| decode(item, ty, depth)).collect::<Result<_>>().map(Val::Tuple)
        }

        Type::Record(handle) => {
            let fields = value.as_object().ok_or_else(|| mismatch("record", value))?;
            let mut record = Vec::new();
            for field in handle.fields() {
                let item = fields.get(field.name).ok_or_else(|| Error::MissingField(field.name.to_string()))?;
                record.push((field.name.to_string(), decode(item, &field.ty, depth)?));
            }
            Ok(Val::Record(record))
        }

        Type::Variant(handle) => {
            let (tag, payload) = tagged(value)?;
            let case = handle.cases().find(|c| c.name == tag).ok_or_else(|| Error::UnknownVariant(tag.to_string()))?;
            let val = match (&case.ty, payload) {
                (Some(ty), Some(payload)) => Some(Box::new(decode(payload, ty, depth)?)),
                (Some(_), None) => return Err(Error::MissingField("val".into())),
                (None, _) => None,
            };
            Ok(Val::Variant(tag.to_string(), val))
        }

        Type::Enum(handle) => {
            let name = value.as_str().ok_or_else(|| mismatch("enum", value))?;
            if handle.names().any(|n| n == name) {
                Ok(Val::Enum(name.to_string()))
            } else {
                Err(Error::UnknownVariant(name.to_string()))
            }
        }

        Type::Option(handle) => match value {
            Value::Null => Ok(Val::Option(None)),
            other => Ok(Val::Option(Some(Box::new(decode(other, &handle.ty(), depth)?)))),
        },

        Type::Result(handle) => {
            let (tag, payload) = tagged(value)?;
            let branch = match tag {
                "ok" => handle.ok(),
                "err" => handle.err(),
                other => return Err(Error::UnknownVariant(other.to_string())),
            };
            let val = match (branch, payload) {
                (Some(ty), Some(payload)) => Some(Box::new(decode(payload, &ty, depth)?)),
                (Some(_), None) => return Err(Error::MissingField("val".into())),
                (None, _) => None,
            };
            Ok(Val::Result(if tag == "ok" { Ok(val) } else { Err(val) }))
        }

        Type::Flags(handle) => {
            let items = value.as_array().ok_or_else(|| mismatch("flags", value))?;
            let mut set = Vec::new();
            for item in items {
                let name = item.as_str().ok_or_else(|| mismatch("flag name", item))?;
                if !handle.names().any(|n| n == name) {
                    return Err(Error::UnknownVariant(name.to_string()));
                }
                set.push(name.to_string());
            }
            Ok(Val::Flags(set))
        }

        Type::Own(_) | Type::Borrow(_) => Err(Error::UnsupportedType("resource".into())),
        Type::Future(_) => Err(Error::UnsupportedType("future".into())),
        Type::Stream(_) => Err(Error::UnsupportedType("stream".into())),
        Type::ErrorContext => Err(Error::UnsupportedType("error-context".into())),
    }
}

/// Splits `{ "tag": .., "val": .. }`.
fn tagged(value: &Value) -> Result<(&str, Option<&Value>)> {
    let map = value.as_object().ok_or_else(|| mismatch("tagged object", value))?;
    let tag = map
        .get("tag")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::MissingField("tag".into()))?;
    Ok((tag, map.get("val")))
}

// ============================================================================
//  Val -> JSON
// ============================================================================

/// Collapses a function's return values into one JSON result.
pub fn vals_to_result(vals: &[Val]) -> Result<Value> {
    match vals {
        [] => Ok(Value::Null),
        [val] => val_to_json(val),
        many => vals_to_params(many).map(Value::Array),
    }
}

/// Converts call arguments into positional JSON params.
pub fn vals_to_params(vals: &[Val]) -> Result<Vec<Value>> {
    vals.iter().map(val_to_json).collect()
}

pub fn val_to_json(val: &Val) -> Result<Value> {
    encode(val, 0)
}

fn float(f: f64, what: &str) -> Result<Value> {
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| Error::NotRepresentable(format!("{} {}", what, f)))
}

fn with_tag(tag: &str, payload: Option<Value>) -> Value {
    let mut map = Map::new();
    map.insert("tag".into(), Value::String(tag.to_string()));
    if let Some(payload) = payload {
        map.insert("val".into(), payload);
    }
    Value::Object(map)
}

fn encode(val: &Val, depth: usize) -> Result<Value> {
    if depth > MAX_RECURSION_DEPTH {
        return Err(Error::RecursionLimit);
    }
    let depth = depth + 1;

    let boxed = |inner: &Option<Box<Val>>| -> Result<Option<Value>> {
        inner.as_deref().map(|v| encode(v, depth)).transpose()
    };

    Ok(match val {
        Val::Bool(b) => Value::Bool(*b),
        Val::U8(v) => Value::from(*v),
        Val::U16(v) => Value::from(*v),
        Val::U32(v) => Value::from(*v),
        Val::U64(v) => Value::from(*v),
        Val::S8(v) => Value::from(*v),
        Val::S16(v) => Value::from(*v),
        Val::S32(v) => Value::from(*v),
        Val::S64(v) => Value::from(*v),
        Val::Float32(v) => float(f64::from(*v), "f32")?,
        Val::Float64(v) => float(*v, "f64")?,
        Val::Char(c) => Value::String(c.to_string()),
        Val::String(s) => Value::String(s.clone()),
        Val::List(items) | Val::Tuple(items) => {
            Value::Array(items.iter().map(|item| encode(item, depth)).collect::<Result<_>>()?)
        }
        Val::Record(fields) => {
            let mut map = Map::new();
            for (name, value) in fields {
                map.insert(name.clone(), encode(value, depth)?);
            }
            Value::Object(map)
        }
        Val::Variant(name, payload) => with_tag(name, boxed(payload)?),
        Val::Enum(name) => Value::String(name.clone()),
        Val::Option(None) => Value::Null,
        Val::Option(Some(inner)) => encode(inner, depth)?,
        Val::Result(Ok(payload)) => with_tag("ok", boxed(payload)?),
        Val::Result(Err(payload)) => with_tag("err", boxed(payload)?),
        Val::Flags(names) => Value::Array(names.iter().cloned().map(Value::String).collect()),
        Val::Resource(_) | Val::Future(_) | Val::Stream(_) | Val::ErrorContext(_) => {
            return Err(Error::UnsupportedType(val_desc(val).into()));
        }
    })
}

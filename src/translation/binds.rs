use crate::types::{BindMap, SqlValue};

/// Coerce one bind value into the target engine's conventions.
///
/// Booleans become 0/1 integers, structured JSON is serialized to text, and
/// everything else (including timestamps) passes through unchanged.
#[must_use]
pub fn coerce_value(value: &SqlValue) -> SqlValue {
    match value {
        SqlValue::Bool(b) => SqlValue::Int(i64::from(*b)),
        SqlValue::Json(v) => SqlValue::Text(v.to_string()),
        other => other.clone(),
    }
}

/// Coerce every bind value independently. Pure and side-effect-free.
#[must_use]
pub fn coerce_binds(binds: &BindMap) -> BindMap {
    binds
        .iter()
        .map(|(name, value)| (name.clone(), coerce_value(value)))
        .collect()
}

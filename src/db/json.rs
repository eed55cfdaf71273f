use bson::{Bson, Document};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::AppError;

/// Convert a stored value into the JSON shape the API returns.
///
/// ObjectIds become hex strings and dates become RFC 3339 strings instead of
/// extended-JSON wrappers.
pub fn bson_to_json(value: Bson) -> Value {
    match value {
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        Bson::DateTime(dt) => match dt.try_to_rfc3339_string() {
            Ok(s) => Value::String(s),
            Err(_) => Value::from(dt.timestamp_millis()),
        },
        Bson::Document(doc) => document_to_json(doc),
        Bson::Array(items) => Value::Array(items.into_iter().map(bson_to_json).collect()),
        Bson::String(s) => Value::String(s),
        Bson::Boolean(b) => Value::Bool(b),
        Bson::Int32(i) => Value::from(i),
        Bson::Int64(i) => Value::from(i),
        Bson::Double(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Bson::Null | Bson::Undefined => Value::Null,
        other => other.into_relaxed_extjson(),
    }
}

pub fn document_to_json(doc: Document) -> Value {
    let map: Map<String, Value> = doc.into_iter().map(|(k, v)| (k, bson_to_json(v))).collect();
    Value::Object(map)
}

/// Serialize a model through BSON so ids and dates render like listed records.
pub fn to_api_json<T: Serialize>(value: &T) -> Result<Value, AppError> {
    Ok(bson_to_json(bson::to_bson(value)?))
}

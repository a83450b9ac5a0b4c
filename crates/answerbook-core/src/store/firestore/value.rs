//! Conversion between plain JSON and Firestore typed values.
//!
//! Firestore's REST API wraps every value in a single-key object naming its
//! type (`{"stringValue": "x"}`, `{"integerValue": "3"}`, ...). Timestamps and
//! references decode to plain strings; chrono parses timestamps back out of
//! RFC 3339 when a model deserializes them.

use serde_json::{json, Map, Value};

use crate::store::{Document, Fields, StoreError};

pub fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => match n.as_i64() {
            Some(i) => json!({ "integerValue": i.to_string() }),
            None => json!({ "doubleValue": n.as_f64().unwrap_or_default() }),
        },
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => json!({
            "arrayValue": { "values": items.iter().map(encode_value).collect::<Vec<_>>() }
        }),
        Value::Object(map) => json!({ "mapValue": { "fields": encode_fields(map) } }),
    }
}

pub fn encode_fields(fields: &Fields) -> Value {
    Value::Object(
        fields
            .iter()
            .map(|(k, v)| (k.clone(), encode_value(v)))
            .collect(),
    )
}

pub fn decode_value(value: &Value) -> Result<Value, StoreError> {
    let obj = value
        .as_object()
        .ok_or_else(|| StoreError::InvalidResponse(format!("Expected typed value, got {}", value)))?;
    let (kind, inner) = obj
        .iter()
        .next()
        .ok_or_else(|| StoreError::InvalidResponse("Empty typed value".to_string()))?;

    let decoded = match kind.as_str() {
        "nullValue" => Value::Null,
        "booleanValue" | "doubleValue" => inner.clone(),
        "integerValue" => match inner {
            Value::String(s) => s
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| StoreError::InvalidResponse(format!("Bad integerValue: {}", s)))?,
            other => other.clone(),
        },
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" => inner.clone(),
        "geoPointValue" => inner.clone(),
        "arrayValue" => {
            let values = inner
                .get("values")
                .and_then(Value::as_array)
                .map(|items| items.iter().map(decode_value).collect::<Result<Vec<_>, _>>())
                .transpose()?
                .unwrap_or_default();
            Value::Array(values)
        }
        "mapValue" => Value::Object(decode_fields(inner.get("fields"))?),
        other => {
            return Err(StoreError::InvalidResponse(format!(
                "Unsupported value type: {}",
                other
            )))
        }
    };
    Ok(decoded)
}

/// Decode a (possibly absent) Firestore `fields` object.
pub fn decode_fields(fields: Option<&Value>) -> Result<Fields, StoreError> {
    let mut out = Map::new();
    if let Some(Value::Object(map)) = fields {
        for (key, value) in map {
            out.insert(key.clone(), decode_value(value)?);
        }
    }
    Ok(out)
}

/// Decode a REST document resource; the id is the last name segment.
pub fn decode_document(resource: &Value) -> Result<Document, StoreError> {
    let name = resource
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| StoreError::InvalidResponse("Document without name".to_string()))?;
    let id = name
        .rsplit('/')
        .next()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| StoreError::InvalidResponse(format!("Bad document name: {}", name)))?;
    Ok(Document::new(id, decode_fields(resource.get("fields"))?))
}

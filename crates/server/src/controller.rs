//! Request shaping shared by every handler: presence checks, allow-listing
//! and conversion into a service options bag.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::errors::ApiError;

pub type Input = Map<String, Value>;

fn is_present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(fields)) => !fields.is_empty(),
        Some(_) => true,
    }
}

/// Reject the request when any required field is absent or blank.
pub fn require_fields(op: &'static str, input: &Input, fields: &[&str]) -> Result<(), ApiError> {
    let missing: Vec<&str> = fields.iter().copied().filter(|f| !is_present(input.get(*f))).collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ApiError::missing(op, &missing))
    }
}

/// Keep only allow-listed fields.
pub fn pick(input: &Input, allowed: &[&str]) -> Input {
    allowed
        .iter()
        .filter_map(|k| input.get(*k).map(|v| (k.to_string(), v.clone())))
        .collect()
}

/// Allow-list `input` and deserialize it into the service's options type.
pub fn options<T: DeserializeOwned>(op: &'static str, input: &Input, allowed: &[&str]) -> Result<T, ApiError> {
    serde_json::from_value(Value::Object(pick(input, allowed))).map_err(|e| ApiError::bad_request(op, e))
}

pub fn from_query(query: HashMap<String, String>) -> Input {
    query.into_iter().map(|(k, v)| (k, Value::String(v))).collect()
}

/// Path parameters override anything the body says about the same field.
pub fn with_path(mut input: Input, params: &[(&str, String)]) -> Input {
    for (k, v) in params {
        input.insert(k.to_string(), Value::String(v.clone()));
    }
    input
}

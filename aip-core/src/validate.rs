//! Envelope and schema validation.
//!
//! Shape checks always run before schema checks so that a broken envelope is
//! reported as `INVALID_INPUT` even when its `intake_data` is also wrong.

use serde_json::{Map, Value};

use crate::error::{AipError, AipResult};
use crate::message::{AgentInfo, BindEnvelope, SubmissionEnvelope};

/// Submission that passed the envelope checks.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidSubmission {
    pub session_id: String,
    pub intake_data: Map<String, Value>,
    pub agent: Option<AgentInfo>,
    pub aip_version: Option<String>,
}

/// Bind request that passed the envelope checks.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidBind {
    pub offer_id: String,
    pub session_id: Option<String>,
    pub bind_data: Map<String, Value>,
    pub agent: Option<AgentInfo>,
}

/// Read `session_id` out of a raw body, for echoing it back on failure.
pub fn session_hint(body: &Value) -> Option<String> {
    body.get("session_id")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.filter(|s| !s.trim().is_empty())
}

impl SubmissionEnvelope {
    /// Parse a raw JSON body.
    pub fn from_value(body: Value) -> AipResult<Self> {
        if !body.is_object() {
            return Err(AipError::InvalidInput("Request body must be a JSON object".to_string()));
        }
        serde_json::from_value(body)
            .map_err(|e| AipError::InvalidInput(format!("Malformed submission envelope: {}", e)))
    }

    /// Check that `intake_data` is an object and `session_id` is present.
    pub fn validate(self) -> AipResult<ValidSubmission> {
        let missing = || AipError::InvalidInput("Missing intake_data or session_id".to_string());

        let session_id = non_empty(self.session_id).ok_or_else(missing)?;
        let intake_data = match self.intake_data {
            Some(Value::Object(map)) => map,
            _ => return Err(missing()),
        };

        Ok(ValidSubmission {
            session_id,
            intake_data,
            agent: self.agent,
            aip_version: self.aip_version,
        })
    }
}

impl BindEnvelope {
    /// Parse a raw JSON body.
    pub fn from_value(body: Value) -> AipResult<Self> {
        if !body.is_object() {
            return Err(AipError::InvalidInput("Request body must be a JSON object".to_string()));
        }
        serde_json::from_value(body)
            .map_err(|e| AipError::InvalidInput(format!("Malformed bind envelope: {}", e)))
    }

    /// Check that `offer_id` and an object `bind_data` are present.
    pub fn validate(self) -> AipResult<ValidBind> {
        let missing = || AipError::InvalidInput("Missing offer_id or bind_data".to_string());

        let offer_id = non_empty(self.offer_id).ok_or_else(missing)?;
        let bind_data = match self.bind_data {
            Some(Value::Object(map)) => map,
            _ => return Err(missing()),
        };

        Ok(ValidBind {
            offer_id,
            session_id: non_empty(self.session_id),
            bind_data,
            agent: self.agent,
        })
    }
}

/// Field names listed under `required` in an input schema.
pub fn required_fields(schema: &Value) -> Vec<String> {
    schema
        .get("required")
        .and_then(Value::as_array)
        .map(|fields| {
            fields
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

/// Required fields absent from `data`, in the order they were required.
/// A key holding `null` counts as absent.
pub fn missing_fields<'a, I>(data: &Map<String, Value>, required: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a String>,
{
    required
        .into_iter()
        .filter(|field| data.get(field.as_str()).map_or(true, Value::is_null))
        .cloned()
        .collect()
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}

/// Check one present field against its property schema.
fn check_property(name: &str, value: &Value, property: &Value) -> Result<(), String> {
    if let Some(expected) = property.get("type").and_then(Value::as_str) {
        if !type_matches(expected, value) {
            return Err(format!("Field '{}' must be of type {}", name, expected));
        }
    }

    if let Some(allowed) = property.get("enum").and_then(Value::as_array) {
        if !allowed.contains(value) {
            return Err(format!("Field '{}' is not one of the allowed values", name));
        }
    }

    if let Some(n) = value.as_f64() {
        if let Some(min) = property.get("minimum").and_then(Value::as_f64) {
            if n < min {
                return Err(format!("Field '{}' must be at least {}", name, min));
            }
        }
        if let Some(min) = property.get("exclusiveMinimum").and_then(Value::as_f64) {
            if n <= min {
                return Err(format!("Field '{}' must be greater than {}", name, min));
            }
        }
    }

    Ok(())
}

/// Validate `intake_data` against an intake's input schema.
///
/// Enforces `required`, and for fields that are present, the `type`, `enum`,
/// `minimum` and `exclusiveMinimum` keywords of their property schema.
pub fn check_schema(schema: &Value, data: &Map<String, Value>) -> AipResult<()> {
    let required = required_fields(schema);
    let missing = missing_fields(data, &required);
    if !missing.is_empty() {
        return Err(AipError::SchemaMismatch(format!(
            "Missing required fields: {}",
            missing.join(", ")
        )));
    }

    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        for (name, property) in properties {
            match data.get(name) {
                Some(value) if !value.is_null() => {
                    check_property(name, value, property).map_err(AipError::SchemaMismatch)?
                }
                _ => {}
            }
        }
    }

    Ok(())
}

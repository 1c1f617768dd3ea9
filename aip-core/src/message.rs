//! Message types for the AIP wire format.
//!
//! Covers the discovery manifest, the submission and bind envelopes an agent
//! sends, and the tagged offer / error replies a provider answers with.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AipError, ErrorCode};

/// Provider identity advertised in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ProviderInfo {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Privacy flags attached to each intake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivacyPolicy {
    pub data_retention: String,
    pub pii_required: bool,
    pub redacted_acceptable: bool,
}

impl Default for PrivacyPolicy {
    fn default() -> Self {
        Self {
            data_retention: "none".to_string(),
            pii_required: false,
            redacted_acceptable: true,
        }
    }
}

fn default_method() -> String {
    "POST".to_string()
}

fn default_offer_type() -> String {
    "quote".to_string()
}

/// One negotiable intake as listed in the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntakeDescriptor {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub endpoint: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// JSON Schema for `intake_data`. See `validate::check_schema` for the subset enforced.
    #[serde(default)]
    pub input_schema: Value,
    #[serde(default = "default_offer_type")]
    pub offer_type: String,
    #[serde(default)]
    pub binding_available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_requires: Option<Vec<String>>,
    #[serde(default)]
    pub requires_auth: bool,
    #[serde(default)]
    pub privacy: PrivacyPolicy,
}

/// Discovery document served at `/.well-known/agent-intake.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub aip_version: String,
    pub provider: ProviderInfo,
    pub intakes: Vec<IntakeDescriptor>,
}

impl Manifest {
    /// Look up an intake by id.
    pub fn intake(&self, id: &str) -> Option<&IntakeDescriptor> {
        self.intakes.iter().find(|i| i.id == id)
    }
}

/// Agent identity and consent carried in envelopes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default)]
    pub consent_scope: Vec<String>,
}

/// Intake submission envelope.
///
/// Every field is optional at the type level so that a shape violation is
/// reported as `INVALID_INPUT` by validation rather than as a parse failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SubmissionEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aip_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<AgentInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intake_data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl SubmissionEnvelope {
    /// Envelope for a fresh submission.
    pub fn new(session_id: impl Into<String>, intake_data: Value) -> Self {
        Self {
            aip_version: Some(crate::AIP_VERSION.to_string()),
            agent: None,
            intake_data: Some(intake_data),
            session_id: Some(session_id.into()),
        }
    }

    pub fn with_agent(mut self, agent: AgentInfo) -> Self {
        self.agent = Some(agent);
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.aip_version = Some(version.into());
        self
    }
}

/// Bind request envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct BindEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<AgentInfo>,
}

impl BindEnvelope {
    pub fn new(offer_id: impl Into<String>, session_id: impl Into<String>, bind_data: Value) -> Self {
        Self {
            offer_id: Some(offer_id.into()),
            session_id: Some(session_id.into()),
            bind_data: Some(bind_data),
            agent: None,
        }
    }

    pub fn with_agent(mut self, agent: AgentInfo) -> Self {
        self.agent = Some(agent);
        self
    }
}

/// Offer as sent to the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub id: String,
    pub summary: String,
    pub details: Value,
    pub expires: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_requires: Option<Vec<String>>,
}

/// Successful intake reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferResponse {
    pub aip_version: String,
    pub session_id: String,
    pub offer: Offer,
}

/// `error` object of an error envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
}

/// Failed intake or bind reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub aip_version: String,
    pub session_id: Option<String>,
    pub error: ErrorBody,
}

impl ErrorResponse {
    /// Build the envelope for `error`, hiding handler internals.
    pub fn from_error(
        aip_version: impl Into<String>,
        session_id: Option<String>,
        error: &AipError,
    ) -> Self {
        Self {
            aip_version: aip_version.into(),
            session_id,
            error: ErrorBody {
                code: error.error_code(),
                message: error.public_message(),
            },
        }
    }

    pub fn http_status(&self) -> u16 {
        self.error.code.http_status()
    }
}

/// Provider reply to an intake submission, tagged by `status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AipResponse {
    Offer(OfferResponse),
    Error(ErrorResponse),
}

impl AipResponse {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Offer(_) => 200,
            Self::Error(err) => err.http_status(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_offer() -> Offer {
        Offer {
            id: "offer_1".to_string(),
            summary: "BMI: 25.8".to_string(),
            details: json!({"bmi": 25.8}),
            expires: Utc::now(),
            bind_endpoint: None,
            bind_requires: None,
        }
    }

    #[test]
    fn offer_response_is_tagged() {
        let resp = AipResponse::Offer(OfferResponse {
            aip_version: "0.1.0".to_string(),
            session_id: "s1".to_string(),
            offer: sample_offer(),
        });

        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["status"], "offer");
        assert_eq!(value["session_id"], "s1");
        assert_eq!(value["offer"]["id"], "offer_1");
        assert!(value["offer"].get("bind_endpoint").is_none());

        let parsed: AipResponse = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, resp);
    }

    #[test]
    fn error_response_keeps_null_session() {
        let err = AipError::InvalidInput("Missing intake_data or session_id".to_string());
        let resp = AipResponse::Error(ErrorResponse::from_error("0.1.0", None, &err));

        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["status"], "error");
        assert!(value["session_id"].is_null());
        assert_eq!(value["error"]["code"], "INVALID_INPUT");
        assert_eq!(resp.http_status(), 400);
    }

    #[test]
    fn descriptor_defaults_when_parsing_sparse_manifest() {
        let descriptor: IntakeDescriptor = serde_json::from_value(json!({
            "id": "quote",
            "endpoint": "https://example.com/api/aip/quote"
        }))
        .unwrap();

        assert_eq!(descriptor.method, "POST");
        assert_eq!(descriptor.offer_type, "quote");
        assert!(!descriptor.binding_available);
        assert_eq!(descriptor.privacy, PrivacyPolicy::default());
    }

    #[test]
    fn submission_envelope_tolerates_missing_fields() {
        let env: SubmissionEnvelope = serde_json::from_value(json!({"intake_data": {}})).unwrap();
        assert!(env.session_id.is_none());
        assert!(env.intake_data.is_some());
    }
}

//! AIP Client SDK - Agent Intake Protocol agent library.
//!
//! # Example
//!
//! ```no_run
//! use aip_client::AipClient;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = AipClient::new("http://localhost:3000")?;
//!     client.discover().await?;
//!
//!     let offer = client
//!         .submit("bmi", json!({"height_inches": 70, "weight_lbs": 180}), None)
//!         .await?;
//!     println!("Offer: {}", offer.offer.summary);
//!
//!     Ok(())
//! }
//! ```

mod connection;

pub use connection::{ClientConfig, Connection, Reply};

use aip_core::{
    manifest, AgentInfo, AipError, AipResult, BindEnvelope, ErrorCode, IntakeDescriptor, Manifest,
    OfferResponse, SubmissionEnvelope,
};
use serde_json::Value;

/// Everything produced by [`AipClient::full_flow`].
#[derive(Debug, Clone)]
pub struct FlowResult {
    pub manifest: Manifest,
    pub offer: OfferResponse,
    /// Bind result, when the offer was bindable and bind data was supplied.
    pub bind: Option<Value>,
}

/// High-level AIP client.
pub struct AipClient {
    config: ClientConfig,
    connection: Connection,
    manifest: Option<Manifest>,
}

impl AipClient {
    /// Client for the provider at `base_url` with a generated agent id.
    pub fn new(base_url: impl AsRef<str>) -> AipResult<Self> {
        Self::with_config(ClientConfig::new(base_url))
    }

    pub fn with_config(config: ClientConfig) -> AipResult<Self> {
        let connection = Connection::new(&config)?;
        Ok(Self {
            config,
            connection,
            manifest: None,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Last manifest fetched by [`AipClient::discover`].
    pub fn manifest(&self) -> Option<&Manifest> {
        self.manifest.as_ref()
    }

    /// Fetch and cache the provider's manifest.
    ///
    /// A failed discovery clears any previously cached manifest.
    pub async fn discover(&mut self) -> AipResult<Manifest> {
        self.manifest = None;
        let url = manifest::discovery_url(&self.config.base_url);

        let reply = self
            .connection
            .get(&url)
            .await
            .map_err(|e| AipError::DiscoveryFailed(e.to_string()))?;
        if !reply.is_success() {
            return Err(AipError::DiscoveryFailed(format!(
                "Failed to fetch manifest from {}: HTTP {}",
                url, reply.status
            )));
        }

        let body = reply
            .body
            .ok_or_else(|| AipError::InvalidManifest(format!("{} did not return JSON", url)))?;
        let fetched: Manifest = serde_json::from_value(body)
            .map_err(|e| AipError::InvalidManifest(format!("Manifest missing required fields: {}", e)))?;
        manifest::check(&fetched)?;

        tracing::debug!(provider = %fetched.provider.name, intakes = fetched.intakes.len(), "discovered manifest");
        self.manifest = Some(fetched.clone());
        Ok(fetched)
    }

    /// Intakes of the cached manifest.
    pub fn list_intakes(&self) -> AipResult<&[IntakeDescriptor]> {
        self.manifest
            .as_ref()
            .map(|m| m.intakes.as_slice())
            .ok_or(AipError::NoManifest)
    }

    pub fn get_intake(&self, intake_id: &str) -> AipResult<&IntakeDescriptor> {
        let manifest = self.manifest.as_ref().ok_or(AipError::NoManifest)?;
        manifest
            .intake(intake_id)
            .ok_or_else(|| AipError::IntakeNotFound(intake_id.to_string()))
    }

    fn agent(&self, with_bind: bool) -> AgentInfo {
        let mut consent_scope = self.config.consent_scope.clone();
        if with_bind && !consent_scope.iter().any(|s| s == "bind") {
            consent_scope.push("bind".to_string());
        }
        AgentInfo {
            id: self.config.agent_id.clone(),
            platform: (!with_bind).then(|| self.config.platform.clone()),
            consent_scope,
        }
    }

    /// Submit `intake_data` to an intake of the cached manifest.
    ///
    /// A session id is generated when `session_id` is `None`.
    pub async fn submit(
        &self,
        intake_id: &str,
        intake_data: Value,
        session_id: Option<String>,
    ) -> AipResult<OfferResponse> {
        let intake = self.get_intake(intake_id)?;
        let aip_version = self.manifest.as_ref().map_or(aip_core::AIP_VERSION, |m| m.aip_version.as_str());
        let session_id = session_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let envelope = SubmissionEnvelope::new(session_id.clone(), intake_data)
            .with_version(aip_version)
            .with_agent(self.agent(false));

        let reply = self.connection.post_json(&intake.endpoint, &envelope).await?;
        let body = reply.body.ok_or_else(|| {
            AipError::InvalidResponse(format!("HTTP {} with a non-JSON body", reply.status))
        })?;

        match body.get("status").and_then(Value::as_str) {
            Some("error") => Err(rejection(&body, ErrorCode::SubmitError, "Intake submission failed")),
            Some("offer") => {
                let response: OfferResponse = serde_json::from_value(body)
                    .map_err(|e| AipError::InvalidResponse(format!("Malformed offer: {}", e)))?;
                if response.session_id != session_id {
                    return Err(AipError::InvalidResponse(format!(
                        "session_id mismatch: sent {}, got {}",
                        session_id, response.session_id
                    )));
                }
                if response.offer.id.is_empty() {
                    return Err(AipError::InvalidResponse("offer has no id".to_string()));
                }
                tracing::debug!(intake = %intake_id, offer_id = %response.offer.id, "received offer");
                Ok(response)
            }
            other => Err(AipError::InvalidResponse(format!(
                "unexpected status {:?}",
                other
            ))),
        }
    }

    /// Redeem an offer. `bind_endpoint` must come from the offer itself.
    pub async fn bind(
        &self,
        offer_id: &str,
        session_id: &str,
        bind_data: Value,
        bind_endpoint: Option<&str>,
    ) -> AipResult<Value> {
        let endpoint = bind_endpoint
            .filter(|e| !e.is_empty())
            .ok_or(AipError::NoBindEndpoint)?;

        let envelope = BindEnvelope::new(offer_id, session_id, bind_data).with_agent(self.agent(true));
        let reply = self.connection.post_json(endpoint, &envelope).await?;

        match reply.body {
            Some(body) if body.get("status").and_then(Value::as_str) == Some("error") => {
                Err(rejection(&body, ErrorCode::BindError, "Bind failed"))
            }
            Some(body) if reply.is_success() => {
                tracing::debug!(%offer_id, "offer bound");
                Ok(body)
            }
            _ => Err(AipError::Rejected {
                code: ErrorCode::BindError.as_str().to_string(),
                message: format!("Bind failed with HTTP {}", reply.status),
            }),
        }
    }

    /// Discover, submit, then bind if the offer is bindable and `bind_data` is given.
    pub async fn full_flow(
        &mut self,
        intake_id: &str,
        intake_data: Value,
        bind_data: Option<Value>,
    ) -> AipResult<FlowResult> {
        let manifest = self.discover().await?;
        let offer = self.submit(intake_id, intake_data, None).await?;

        let bind = match (bind_data, offer.offer.bind_endpoint.as_deref()) {
            (Some(data), Some(endpoint)) => Some(
                self.bind(&offer.offer.id, &offer.session_id, data, Some(endpoint))
                    .await?,
            ),
            _ => None,
        };

        Ok(FlowResult {
            manifest,
            offer,
            bind,
        })
    }
}

/// Turn an error envelope into [`AipError::Rejected`].
fn rejection(body: &Value, default_code: ErrorCode, default_message: &str) -> AipError {
    let error = body.get("error");
    let code = error
        .and_then(|e| e.get("code"))
        .and_then(Value::as_str)
        .unwrap_or(default_code.as_str());
    let message = error
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
        .unwrap_or(default_message);
    AipError::Rejected {
        code: code.to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn manifest_json(base: &str) -> Value {
        json!({
            "aip_version": "0.1.0",
            "provider": {"name": "Mock Provider", "url": base},
            "intakes": [{
                "id": "quote",
                "name": "Quote",
                "description": "Get a quote",
                "endpoint": format!("{}/api/aip/quote", base),
                "method": "POST",
                "input_schema": {"type": "object"},
                "offer_type": "quote",
                "binding_available": true,
                "bind_requires": ["email"]
            }]
        })
    }

    async fn provider() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/agent-intake.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(manifest_json(&server.uri())))
            .mount(&server)
            .await;
        server
    }

    fn offer_json(session_id: &str, bind_endpoint: Option<String>) -> Value {
        let mut offer = json!({
            "id": "offer-1",
            "summary": "Quote ready",
            "details": {"price": 100},
            "expires": "2030-01-01T00:00:00Z"
        });
        if let Some(endpoint) = bind_endpoint {
            offer["bind_endpoint"] = json!(endpoint);
            offer["bind_requires"] = json!(["email"]);
        }
        json!({"aip_version": "0.1.0", "session_id": session_id, "status": "offer", "offer": offer})
    }

    #[tokio::test]
    async fn calls_before_discovery_need_manifest() {
        let client = AipClient::new("http://127.0.0.1:1").unwrap();
        assert_eq!(client.list_intakes().unwrap_err().code(), "NO_MANIFEST");
        assert_eq!(client.get_intake("quote").unwrap_err().code(), "NO_MANIFEST");
        let err = client.submit("quote", json!({}), None).await.unwrap_err();
        assert_eq!(err.code(), "NO_MANIFEST");
    }

    #[tokio::test]
    async fn discover_caches_manifest() {
        let server = provider().await;
        let mut client = AipClient::new(server.uri()).unwrap();

        let manifest = client.discover().await.unwrap();
        assert_eq!(manifest.provider.name, "Mock Provider");
        assert_eq!(client.list_intakes().unwrap().len(), 1);
        assert_eq!(client.get_intake("quote").unwrap().bind_requires, Some(vec!["email".to_string()]));
        assert_eq!(client.get_intake("nope").unwrap_err().code(), "INTAKE_NOT_FOUND");
    }

    #[tokio::test]
    async fn discovery_http_error_is_discovery_failed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let mut client = AipClient::new(server.uri()).unwrap();
        assert_eq!(client.discover().await.unwrap_err().code(), "DISCOVERY_FAILED");
    }

    #[tokio::test]
    async fn manifest_without_version_is_invalid() {
        let server = MockServer::start().await;
        let mut manifest = manifest_json(&server.uri());
        manifest.as_object_mut().unwrap().remove("aip_version");
        Mock::given(method("GET"))
            .and(path("/.well-known/agent-intake.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(manifest))
            .mount(&server)
            .await;

        let mut client = AipClient::new(server.uri()).unwrap();
        assert_eq!(client.discover().await.unwrap_err().code(), "INVALID_MANIFEST");
        assert!(client.manifest().is_none());
        assert_eq!(client.list_intakes().unwrap_err().code(), "NO_MANIFEST");
    }

    #[tokio::test]
    async fn submit_sends_envelope_and_returns_offer() {
        let server = provider().await;
        Mock::given(method("POST"))
            .and(path("/api/aip/quote"))
            .and(body_partial_json(json!({
                "aip_version": "0.1.0",
                "session_id": "s1",
                "intake_data": {"budget": 500},
                "agent": {"id": "agent-7", "platform": "custom", "consent_scope": ["intake", "offer"]}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(offer_json("s1", None)))
            .expect(1)
            .mount(&server)
            .await;

        let config = ClientConfig::new(server.uri()).with_agent_id("agent-7");
        let mut client = AipClient::with_config(config).unwrap();
        client.discover().await.unwrap();

        let offer = client
            .submit("quote", json!({"budget": 500}), Some("s1".to_string()))
            .await
            .unwrap();
        assert_eq!(offer.offer.id, "offer-1");
        assert_eq!(offer.offer.summary, "Quote ready");
    }

    #[tokio::test]
    async fn error_envelope_surfaces_provider_code() {
        let server = provider().await;
        Mock::given(method("POST"))
            .and(path("/api/aip/quote"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "aip_version": "0.1.0",
                "session_id": "s1",
                "status": "error",
                "error": {"code": "SCHEMA_MISMATCH", "message": "Missing required fields: budget"}
            })))
            .mount(&server)
            .await;

        let mut client = AipClient::new(server.uri()).unwrap();
        client.discover().await.unwrap();

        let err = client.submit("quote", json!({}), None).await.unwrap_err();
        assert_eq!(err.code(), "SCHEMA_MISMATCH");
        assert_eq!(err.to_string(), "SCHEMA_MISMATCH: Missing required fields: budget");
    }

    #[tokio::test]
    async fn error_without_code_is_submit_error() {
        let server = provider().await;
        Mock::given(method("POST"))
            .and(path("/api/aip/quote"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({"status": "error"})))
            .mount(&server)
            .await;

        let mut client = AipClient::new(server.uri()).unwrap();
        client.discover().await.unwrap();

        let err = client.submit("quote", json!({}), None).await.unwrap_err();
        assert_eq!(err.code(), "SUBMIT_ERROR");
        assert_eq!(err.to_string(), "SUBMIT_ERROR: Intake submission failed");
    }

    #[tokio::test]
    async fn offer_for_another_session_is_invalid_response() {
        let server = provider().await;
        Mock::given(method("POST"))
            .and(path("/api/aip/quote"))
            .respond_with(ResponseTemplate::new(200).set_body_json(offer_json("someone-else", None)))
            .mount(&server)
            .await;

        let mut client = AipClient::new(server.uri()).unwrap();
        client.discover().await.unwrap();

        let err = client
            .submit("quote", json!({}), Some("s1".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_RESPONSE");
    }

    #[tokio::test]
    async fn bind_requires_endpoint() {
        let client = AipClient::new("http://127.0.0.1:1").unwrap();
        let err = client.bind("offer-1", "s1", json!({}), None).await.unwrap_err();
        assert_eq!(err.code(), "NO_BIND_ENDPOINT");
    }

    #[tokio::test]
    async fn bind_adds_consent_scope_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/aip/bind"))
            .and(body_partial_json(json!({
                "offer_id": "offer-1",
                "session_id": "s1",
                "agent": {"consent_scope": ["intake", "bind"]}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "bound", "message": "ok"})))
            .expect(1)
            .mount(&server)
            .await;

        let config = ClientConfig::new(server.uri()).with_consent_scope(["intake", "bind"]);
        let client = AipClient::with_config(config).unwrap();
        let endpoint = format!("{}/api/aip/bind", server.uri());

        let result = client
            .bind("offer-1", "s1", json!({"email": "a@b.c"}), Some(&endpoint))
            .await
            .unwrap();
        assert_eq!(result["status"], "bound");
    }

    #[tokio::test]
    async fn bind_not_found_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/aip/bind"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "aip_version": "0.1.0",
                "session_id": "s1",
                "status": "error",
                "error": {"code": "NOT_FOUND", "message": "Offer not found or expired"}
            })))
            .mount(&server)
            .await;

        let client = AipClient::new(server.uri()).unwrap();
        let endpoint = format!("{}/api/aip/bind", server.uri());
        let err = client
            .bind("offer-1", "s1", json!({"email": "a@b.c"}), Some(&endpoint))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn full_flow_binds_only_when_offer_allows() {
        let server = provider().await;
        let bind_endpoint = format!("{}/api/aip/bind", server.uri());
        Mock::given(method("POST"))
            .and(path("/api/aip/quote"))
            .respond_with(move |req: &wiremock::Request| {
                let body: Value = serde_json::from_slice(&req.body).unwrap();
                let session = body["session_id"].as_str().unwrap().to_string();
                ResponseTemplate::new(200).set_body_json(offer_json(&session, Some(bind_endpoint.clone())))
            })
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/aip/bind"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "bound"})))
            .expect(1)
            .mount(&server)
            .await;

        let mut client = AipClient::new(server.uri()).unwrap();

        let without = client.full_flow("quote", json!({}), None).await.unwrap();
        assert!(without.bind.is_none());

        let with = client
            .full_flow("quote", json!({}), Some(json!({"email": "a@b.c"})))
            .await
            .unwrap();
        assert_eq!(with.manifest.intakes[0].id, "quote");
        assert_eq!(with.bind.unwrap()["status"], "bound");
    }
}

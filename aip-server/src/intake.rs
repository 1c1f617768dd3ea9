//! Intake registry for the AIP provider.

use std::collections::HashMap;
use std::sync::Arc;

use aip_core::{
    manifest, AgentInfo, AipError, AipResult, IntakeDescriptor, PrivacyPolicy,
};
use async_trait::async_trait;
use chrono::Duration;
use serde_json::{Map, Value};

use crate::offer_store::{check_ttl, StoredOffer};

/// Session context handed to intake handlers.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub intake_id: String,
    pub session_id: String,
    pub agent: Option<AgentInfo>,
}

/// What an intake handler computed for one submission.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerOutcome {
    pub summary: String,
    pub details: Value,
    /// Overrides the intake's bind requirements for this offer only.
    pub bind_requires: Option<Vec<String>>,
}

impl HandlerOutcome {
    pub fn new(summary: impl Into<String>, details: Value) -> Self {
        Self {
            summary: summary.into(),
            details,
            bind_requires: None,
        }
    }

    pub fn with_bind_requires<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.bind_requires = Some(fields.into_iter().map(Into::into).collect());
        self
    }
}

/// Computes an offer from validated intake data.
///
/// Handlers may perform their own I/O but must not touch protocol state;
/// everything they contribute flows through the returned outcome. Errors
/// are logged and reported to the agent as an opaque `INTERNAL_ERROR`.
#[async_trait]
pub trait IntakeHandler: Send + Sync {
    async fn handle(
        &self,
        intake_data: &Map<String, Value>,
        session: &SessionContext,
    ) -> anyhow::Result<HandlerOutcome>;
}

/// Finalizes a redeemed offer with the agent's consented personal data.
#[async_trait]
pub trait BindHandler: Send + Sync {
    async fn bind(
        &self,
        bind_data: &Map<String, Value>,
        offer: &StoredOffer,
    ) -> anyhow::Result<Value>;
}

/// Registration parameters for one intake.
pub struct IntakeConfig {
    id: String,
    name: String,
    description: Option<String>,
    category: Option<String>,
    input_schema: Value,
    offer_type: String,
    binding_available: bool,
    bind_requires: Option<Vec<String>>,
    offer_ttl: Option<Duration>,
    handler: Arc<dyn IntakeHandler>,
    bind_handler: Option<Arc<dyn BindHandler>>,
}

impl IntakeConfig {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        handler: impl IntakeHandler + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            category: None,
            input_schema: serde_json::json!({ "type": "object" }),
            offer_type: "quote".to_string(),
            binding_available: true,
            bind_requires: None,
            offer_ttl: None,
            handler: Arc::new(handler),
            bind_handler: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn input_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }

    pub fn offer_type(mut self, offer_type: impl Into<String>) -> Self {
        self.offer_type = offer_type.into();
        self
    }

    pub fn binding_available(mut self, available: bool) -> Self {
        self.binding_available = available;
        self
    }

    pub fn bind_requires<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.bind_requires = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Lifetime of offers minted by this intake, overriding the server default.
    pub fn offer_ttl(mut self, ttl: Duration) -> Self {
        self.offer_ttl = Some(ttl);
        self
    }

    pub fn on_bind(mut self, handler: impl BindHandler + 'static) -> Self {
        self.bind_handler = Some(Arc::new(handler));
        self
    }
}

/// An intake as held by the registry.
#[derive(Clone)]
pub struct RegisteredIntake {
    pub descriptor: IntakeDescriptor,
    pub handler: Arc<dyn IntakeHandler>,
    pub bind_handler: Option<Arc<dyn BindHandler>>,
    pub offer_ttl: Option<Duration>,
}

impl std::fmt::Debug for RegisteredIntake {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredIntake")
            .field("id", &self.descriptor.id)
            .field("has_bind_handler", &self.bind_handler.is_some())
            .field("offer_ttl", &self.offer_ttl)
            .finish()
    }
}

/// Registry of intakes, in registration order.
pub struct IntakeRegistry {
    base_url: String,
    default_bind_requires: Vec<String>,
    intakes: Vec<RegisteredIntake>,
    index: HashMap<String, usize>,
}

impl IntakeRegistry {
    /// Create an empty registry deriving endpoints from `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: manifest::normalize_base_url(&base_url.into()).to_string(),
            default_bind_requires: vec!["email".to_string(), "full_name".to_string()],
            intakes: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Bind fields used when an intake does not name its own.
    pub fn with_default_bind_requires(mut self, fields: Vec<String>) -> Self {
        self.default_bind_requires = fields;
        self
    }

    /// Register an intake. Fails on a duplicate or malformed id, or an out-of-range TTL.
    pub fn register(&mut self, config: IntakeConfig) -> AipResult<()> {
        manifest::validate_intake_id(&config.id)?;
        if self.index.contains_key(&config.id) {
            return Err(AipError::DuplicateIntake(config.id));
        }
        if let Some(ttl) = config.offer_ttl {
            check_ttl(ttl)?;
        }

        let bind_requires = config.binding_available.then(|| {
            config
                .bind_requires
                .unwrap_or_else(|| self.default_bind_requires.clone())
        });

        let descriptor = IntakeDescriptor {
            endpoint: manifest::intake_endpoint(&self.base_url, &config.id),
            description: config.description.unwrap_or_else(|| config.name.clone()),
            id: config.id,
            name: config.name,
            method: "POST".to_string(),
            category: config.category,
            input_schema: config.input_schema,
            offer_type: config.offer_type,
            binding_available: config.binding_available,
            bind_requires,
            requires_auth: false,
            privacy: PrivacyPolicy::default(),
        };

        tracing::debug!(intake = %descriptor.id, endpoint = %descriptor.endpoint, "registered intake");

        self.index.insert(descriptor.id.clone(), self.intakes.len());
        self.intakes.push(RegisteredIntake {
            descriptor,
            handler: config.handler,
            bind_handler: config.bind_handler,
            offer_ttl: config.offer_ttl,
        });
        Ok(())
    }

    /// Look up an intake by id.
    pub fn resolve(&self, id: &str) -> AipResult<&RegisteredIntake> {
        self.index
            .get(id)
            .map(|&idx| &self.intakes[idx])
            .ok_or_else(|| AipError::NotFound(format!("No intake with id '{}'", id)))
    }

    /// Descriptors in registration order.
    pub fn descriptors(&self) -> impl Iterator<Item = &IntakeDescriptor> {
        self.intakes.iter().map(|r| &r.descriptor)
    }

    pub fn intake_ids(&self) -> Vec<String> {
        self.intakes.iter().map(|r| r.descriptor.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.intakes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intakes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct StaticHandler;

    #[async_trait]
    impl IntakeHandler for StaticHandler {
        async fn handle(
            &self,
            _intake_data: &Map<String, Value>,
            _session: &SessionContext,
        ) -> anyhow::Result<HandlerOutcome> {
            Ok(HandlerOutcome::new("ok", json!({"status": "ok"})))
        }
    }

    #[test]
    fn register_and_resolve() {
        let mut registry = IntakeRegistry::new("https://example.com/");
        registry
            .register(
                IntakeConfig::new("quote", "Get a Quote", StaticHandler)
                    .category("b2b/vendor")
                    .input_schema(json!({"type": "object", "required": ["budget"]})),
            )
            .unwrap();

        let intake = registry.resolve("quote").unwrap();
        assert_eq!(intake.descriptor.endpoint, "https://example.com/api/aip/quote");
        assert_eq!(intake.descriptor.description, "Get a Quote");
        assert!(intake.descriptor.binding_available);
        assert_eq!(
            intake.descriptor.bind_requires,
            Some(vec!["email".to_string(), "full_name".to_string()])
        );
        assert_eq!(registry.intake_ids(), vec!["quote"]);
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let mut registry = IntakeRegistry::new("https://example.com");
        registry
            .register(IntakeConfig::new("quote", "Quote", StaticHandler))
            .unwrap();
        let err = registry
            .register(IntakeConfig::new("quote", "Quote again", StaticHandler))
            .unwrap_err();
        assert_eq!(err.code(), "DUPLICATE_INTAKE");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn out_of_range_offer_ttl_is_invalid_config() {
        let mut registry = IntakeRegistry::new("https://example.com");
        for ttl in [Duration::zero(), Duration::hours(-1), Duration::MAX] {
            let err = registry
                .register(IntakeConfig::new("quote", "Quote", StaticHandler).offer_ttl(ttl))
                .unwrap_err();
            assert_eq!(err.code(), "INVALID_CONFIG");
        }
        assert_eq!(registry.len(), 0);

        registry
            .register(IntakeConfig::new("quote", "Quote", StaticHandler).offer_ttl(Duration::days(14)))
            .unwrap();
        assert_eq!(registry.resolve("quote").unwrap().offer_ttl, Some(Duration::days(14)));
    }

    #[test]
    fn non_binding_intake_has_no_bind_requires() {
        let mut registry = IntakeRegistry::new("https://example.com");
        registry
            .register(
                IntakeConfig::new("bmi", "BMI", StaticHandler)
                    .binding_available(false)
                    .bind_requires(["email"]),
            )
            .unwrap();
        assert!(registry.resolve("bmi").unwrap().descriptor.bind_requires.is_none());
    }

    #[test]
    fn unknown_id_is_not_found() {
        let registry = IntakeRegistry::new("https://example.com");
        assert_eq!(registry.resolve("missing").unwrap_err().code(), "NOT_FOUND");
    }

    #[test]
    fn reserved_id_is_invalid_config() {
        let mut registry = IntakeRegistry::new("https://example.com");
        let err = registry
            .register(IntakeConfig::new("bind", "Bind", StaticHandler))
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_CONFIG");
    }

    #[test]
    fn descriptors_keep_registration_order() {
        let mut registry = IntakeRegistry::new("https://example.com");
        for id in ["c", "a", "b"] {
            registry.register(IntakeConfig::new(id, id, StaticHandler)).unwrap();
        }
        let ids: Vec<&str> = registry.descriptors().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["c", "a", "b"]);
    }
}

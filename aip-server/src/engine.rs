//! Provider engine: runs submissions and binds against the registry and store.

use std::sync::Arc;

use aip_core::validate::{self, ValidBind, ValidSubmission};
use aip_core::{
    manifest, AipError, AipResponse, AipResult, BindEnvelope, BindEvent, ErrorResponse,
    IntakeEvent, Manifest, OfferResponse, ProviderInfo, SubmissionEnvelope,
};
use chrono::Duration;
use parking_lot::RwLock;
use serde_json::{json, Value};

use crate::config::ServerConfig;
use crate::intake::{BindHandler, IntakeConfig, IntakeRegistry, RegisteredIntake, SessionContext};
use crate::offer_store::{check_ttl, Clock, OfferStore, PendingOffer, StoredOffer, SystemClock};
use crate::state_machine::{BindStateMachine, IntakeStateMachine};

/// Result of a bind request.
#[derive(Debug, Clone, PartialEq)]
pub enum BindOutcome {
    /// Body produced by the bind handler, or the default acknowledgement.
    Bound(Value),
    Rejected(ErrorResponse),
}

impl BindOutcome {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Bound(_) => 200,
            Self::Rejected(err) => err.http_status(),
        }
    }

    pub fn is_bound(&self) -> bool {
        matches!(self, Self::Bound(_))
    }
}

/// AIP provider engine.
///
/// Requests run concurrently. The offer store is the only state shared
/// between them; the registry is read-locked just long enough to clone an
/// intake out of it.
pub struct ProviderEngine {
    provider: ProviderInfo,
    base_url: String,
    aip_version: String,
    default_ttl: Duration,
    registry: RwLock<IntakeRegistry>,
    offers: OfferStore,
}

impl ProviderEngine {
    /// Create an engine on the wall clock.
    pub fn new(config: &ServerConfig) -> AipResult<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create an engine whose offer expiry follows `clock`.
    pub fn with_clock(config: &ServerConfig, clock: Arc<dyn Clock>) -> AipResult<Self> {
        manifest::build(&config.aip_version, &config.provider, Vec::new())?;
        let default_ttl = check_ttl(config.offer_ttl)?;

        let base_url = manifest::normalize_base_url(&config.base_url).to_string();
        let registry = IntakeRegistry::new(base_url.clone())
            .with_default_bind_requires(config.default_bind_requires.clone());

        Ok(Self {
            provider: config.provider.clone(),
            base_url,
            aip_version: config.aip_version.clone(),
            default_ttl,
            registry: RwLock::new(registry),
            offers: OfferStore::with_clock(clock),
        })
    }

    pub fn register(&self, config: IntakeConfig) -> AipResult<()> {
        self.registry.write().register(config)
    }

    /// Current discovery document. Built fresh on every call.
    pub fn manifest(&self) -> AipResult<Manifest> {
        let registry = self.registry.read();
        manifest::build(&self.aip_version, &self.provider, registry.descriptors().cloned())
    }

    pub fn intake_ids(&self) -> Vec<String> {
        self.registry.read().intake_ids()
    }

    pub fn offers(&self) -> &OfferStore {
        &self.offers
    }

    pub fn aip_version(&self) -> &str {
        &self.aip_version
    }

    /// Drop expired offers.
    pub fn purge_expired(&self) -> usize {
        let purged = self.offers.purge_expired();
        if purged > 0 {
            tracing::debug!(purged, "swept expired offers");
        }
        purged
    }

    fn resolve(&self, intake_id: &str) -> AipResult<RegisteredIntake> {
        self.registry.read().resolve(intake_id).cloned()
    }

    fn bind_handler_for(&self, intake_id: &str) -> Option<Arc<dyn BindHandler>> {
        self.registry
            .read()
            .resolve(intake_id)
            .ok()
            .and_then(|intake| intake.bind_handler.clone())
    }

    /// Handle an intake submission for `intake_id`.
    pub async fn submit(&self, intake_id: &str, body: Value) -> AipResponse {
        let session_id = validate::session_hint(&body);
        let mut sm = IntakeStateMachine::new(intake_id);

        match self.run_submission(intake_id, body, &mut sm).await {
            Ok(response) => AipResponse::Offer(response),
            Err(err) => {
                sm.reject(&err);
                AipResponse::Error(ErrorResponse::from_error(&self.aip_version, session_id, &err))
            }
        }
    }

    async fn run_submission(
        &self,
        intake_id: &str,
        body: Value,
        sm: &mut IntakeStateMachine,
    ) -> AipResult<OfferResponse> {
        let intake = self.resolve(intake_id)?;

        let ValidSubmission {
            session_id,
            intake_data,
            agent,
            ..
        } = SubmissionEnvelope::from_value(body)?.validate()?;
        sm.transition(IntakeEvent::EnvelopeAccepted)?;

        validate::check_schema(&intake.descriptor.input_schema, &intake_data)?;
        sm.transition(IntakeEvent::SchemaAccepted)?;

        let session = SessionContext {
            intake_id: intake_id.to_string(),
            session_id: session_id.clone(),
            agent,
        };

        sm.transition(IntakeEvent::HandlerInvoked)?;
        let outcome = intake
            .handler
            .handle(&intake_data, &session)
            .await
            .map_err(|e| {
                tracing::error!(intake = %intake_id, session_id = %session_id, error = ?e, "intake handler failed");
                AipError::Internal(e.to_string())
            })?;

        let (bind_endpoint, bind_requires) = if intake.descriptor.binding_available {
            let requires = outcome
                .bind_requires
                .or_else(|| intake.descriptor.bind_requires.clone());
            (Some(manifest::bind_endpoint(&self.base_url)), requires)
        } else {
            (None, None)
        };

        let ttl = intake.offer_ttl.unwrap_or(self.default_ttl);
        let offer = self.offers.put(
            PendingOffer {
                intake_id: intake_id.to_string(),
                session_id: session_id.clone(),
                intake_data: Value::Object(intake_data),
                summary: outcome.summary,
                details: outcome.details,
                bind_endpoint,
                bind_requires,
            },
            ttl,
        )?;
        sm.transition(IntakeEvent::OfferStored {
            offer_id: offer.id.clone(),
        })?;

        tracing::info!(intake = %intake_id, session_id = %session_id, offer_id = %offer.id, expires = %offer.expires, "offer issued");

        Ok(OfferResponse {
            aip_version: self.aip_version.clone(),
            session_id,
            offer,
        })
    }

    /// Redeem an offer with the agent's bind data.
    pub async fn bind(&self, body: Value) -> BindOutcome {
        let session_id = validate::session_hint(&body);
        let mut sm = BindStateMachine::new();

        match self.run_bind(body, &mut sm).await {
            Ok(result) => BindOutcome::Bound(result),
            Err(err) => {
                sm.reject(&err);
                BindOutcome::Rejected(ErrorResponse::from_error(&self.aip_version, session_id, &err))
            }
        }
    }

    async fn run_bind(&self, body: Value, sm: &mut BindStateMachine) -> AipResult<Value> {
        let ValidBind {
            offer_id,
            session_id,
            bind_data,
            ..
        } = BindEnvelope::from_value(body)?.validate()?;
        sm.transition(BindEvent::EnvelopeAccepted)?;

        // Field checks run under the store lock so a rejected bind leaves the offer in place.
        let stored = self.offers.take_if(&offer_id, |stored| {
            if !stored.is_bindable() {
                return Err(AipError::NotFound(format!(
                    "Offer {} does not accept binding",
                    stored.id()
                )));
            }
            let missing = validate::missing_fields(&bind_data, stored.bind_requires());
            if missing.is_empty() {
                Ok(())
            } else {
                Err(AipError::MissingFields(missing))
            }
        })?;
        sm.transition(BindEvent::OfferTaken {
            offer_id: offer_id.clone(),
        })?;

        if let Some(claimed) = &session_id {
            if claimed != &stored.session_id {
                tracing::warn!(offer_id = %offer_id, claimed = %claimed, issued_to = %stored.session_id, "bind session differs from submission session");
            }
        }

        let result = match self.bind_handler_for(&stored.intake_id) {
            Some(handler) => handler.bind(&bind_data, &stored).await.map_err(|e| {
                tracing::error!(offer_id = %offer_id, intake = %stored.intake_id, error = ?e, "bind handler failed");
                AipError::Internal(e.to_string())
            })?,
            None => default_acknowledgement(&stored),
        };
        sm.transition(BindEvent::BindCompleted)?;

        tracing::info!(offer_id = %offer_id, intake = %stored.intake_id, "offer bound");
        Ok(result)
    }
}

fn default_acknowledgement(stored: &StoredOffer) -> Value {
    json!({
        "status": "bound",
        "message": format!("Binding confirmed for offer {}.", stored.id()),
    })
}

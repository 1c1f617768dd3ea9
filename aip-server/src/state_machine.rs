//! Per-request lifecycle machines for submissions and binds.

use aip_core::{AipError, AipResult, BindEvent, BindState, IntakeEvent, IntakeState};

/// Tracks one intake submission from receipt to offer or error.
#[derive(Debug)]
pub struct IntakeStateMachine {
    state: IntakeState,
    intake_id: String,
}

impl IntakeStateMachine {
    pub fn new(intake_id: impl Into<String>) -> Self {
        Self {
            state: IntakeState::Received,
            intake_id: intake_id.into(),
        }
    }

    pub fn state(&self) -> IntakeState {
        self.state
    }

    /// Advance on `event`.
    pub fn transition(&mut self, event: IntakeEvent) -> AipResult<()> {
        let new_state = match (&self.state, &event) {
            (IntakeState::Received, IntakeEvent::EnvelopeAccepted) => IntakeState::EnvelopeValid,
            (IntakeState::EnvelopeValid, IntakeEvent::SchemaAccepted) => IntakeState::SchemaValid,
            (IntakeState::SchemaValid, IntakeEvent::HandlerInvoked) => IntakeState::Handling,
            (IntakeState::Handling, IntakeEvent::OfferStored { .. }) => IntakeState::OfferIssued,
            (state, IntakeEvent::Rejected(code)) if !state.is_terminal() => {
                tracing::warn!(intake = %self.intake_id, from = ?state, %code, "submission rejected");
                IntakeState::Failed
            }
            _ => {
                return Err(AipError::Internal(format!(
                    "invalid intake transition from {:?} on {:?}",
                    self.state, event
                )));
            }
        };

        if self.state.can_transition_to(new_state) {
            tracing::debug!(intake = %self.intake_id, "intake state: {:?} -> {:?}", self.state, new_state);
            self.state = new_state;
            Ok(())
        } else {
            Err(AipError::Internal(format!(
                "invalid intake state transition: {:?} -> {:?}",
                self.state, new_state
            )))
        }
    }

    /// Record a rejection. A machine already in a terminal state is left alone.
    pub fn reject(&mut self, error: &AipError) {
        if !self.state.is_terminal() {
            let _ = self.transition(IntakeEvent::Rejected(error.error_code()));
        }
    }
}

/// Tracks one bind request from receipt to bound or error.
#[derive(Debug)]
pub struct BindStateMachine {
    state: BindState,
    offer_id: Option<String>,
}

impl BindStateMachine {
    pub fn new() -> Self {
        Self {
            state: BindState::Received,
            offer_id: None,
        }
    }

    pub fn state(&self) -> BindState {
        self.state
    }

    /// Advance on `event`.
    pub fn transition(&mut self, event: BindEvent) -> AipResult<()> {
        let new_state = match (&self.state, &event) {
            (BindState::Received, BindEvent::EnvelopeAccepted) => BindState::EnvelopeValid,
            (BindState::EnvelopeValid, BindEvent::OfferTaken { offer_id }) => {
                self.offer_id = Some(offer_id.clone());
                BindState::OfferConsumed
            }
            (BindState::OfferConsumed, BindEvent::BindCompleted) => BindState::Bound,
            (state, BindEvent::Rejected(code)) if !state.is_terminal() => {
                tracing::warn!(offer_id = ?self.offer_id, from = ?state, %code, "bind rejected");
                BindState::Failed
            }
            _ => {
                return Err(AipError::Internal(format!(
                    "invalid bind transition from {:?} on {:?}",
                    self.state, event
                )));
            }
        };

        if self.state.can_transition_to(new_state) {
            tracing::debug!("bind state: {:?} -> {:?}", self.state, new_state);
            self.state = new_state;
            Ok(())
        } else {
            Err(AipError::Internal(format!(
                "invalid bind state transition: {:?} -> {:?}",
                self.state, new_state
            )))
        }
    }

    /// Record a rejection. A machine already in a terminal state is left alone.
    pub fn reject(&mut self, error: &AipError) {
        if !self.state.is_terminal() {
            let _ = self.transition(BindEvent::Rejected(error.error_code()));
        }
    }
}

impl Default for BindStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

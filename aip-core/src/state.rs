//! Lifecycle states for intake submissions and bind requests.

use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;

/// States of a single intake submission on the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntakeState {
    /// Request body arrived.
    Received,
    /// Envelope has `intake_data` and `session_id`.
    EnvelopeValid,
    /// `intake_data` satisfies the intake's required fields.
    SchemaValid,
    /// Handler is computing the offer.
    Handling,
    /// Terminal - offer minted and stored.
    OfferIssued,
    /// Terminal - rejected with an error envelope.
    Failed,
}

impl IntakeState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::OfferIssued | Self::Failed)
    }

    pub fn valid_transitions(&self) -> &'static [IntakeState] {
        match self {
            Self::Received => &[Self::EnvelopeValid, Self::Failed],
            Self::EnvelopeValid => &[Self::SchemaValid, Self::Failed],
            Self::SchemaValid => &[Self::Handling, Self::Failed],
            Self::Handling => &[Self::OfferIssued, Self::Failed],
            Self::OfferIssued => &[],
            Self::Failed => &[],
        }
    }

    pub fn can_transition_to(&self, target: IntakeState) -> bool {
        self.valid_transitions().contains(&target)
    }
}

/// States of a single bind request on the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BindState {
    /// Request body arrived.
    Received,
    /// Envelope has `offer_id` and `bind_data`.
    EnvelopeValid,
    /// Offer removed from the store; it can no longer be redeemed.
    OfferConsumed,
    /// Terminal - bind handler finished.
    Bound,
    /// Terminal - rejected with an error envelope.
    Failed,
}

impl BindState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Bound | Self::Failed)
    }

    pub fn valid_transitions(&self) -> &'static [BindState] {
        match self {
            Self::Received => &[Self::EnvelopeValid, Self::Failed],
            Self::EnvelopeValid => &[Self::OfferConsumed, Self::Failed],
            Self::OfferConsumed => &[Self::Bound, Self::Failed],
            Self::Bound => &[],
            Self::Failed => &[],
        }
    }

    pub fn can_transition_to(&self, target: BindState) -> bool {
        self.valid_transitions().contains(&target)
    }
}

/// Events that drive [`IntakeState`].
#[derive(Debug, Clone)]
pub enum IntakeEvent {
    EnvelopeAccepted,
    SchemaAccepted,
    HandlerInvoked,
    OfferStored { offer_id: String },
    Rejected(ErrorCode),
}

/// Events that drive [`BindState`].
#[derive(Debug, Clone)]
pub enum BindEvent {
    EnvelopeAccepted,
    OfferTaken { offer_id: String },
    BindCompleted,
    Rejected(ErrorCode),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intake_happy_path_is_linear() {
        let path = [
            IntakeState::Received,
            IntakeState::EnvelopeValid,
            IntakeState::SchemaValid,
            IntakeState::Handling,
            IntakeState::OfferIssued,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{:?} -> {:?}", pair[0], pair[1]);
        }
        assert!(!IntakeState::Received.can_transition_to(IntakeState::Handling));
    }

    #[test]
    fn every_non_terminal_intake_state_can_fail() {
        for state in [
            IntakeState::Received,
            IntakeState::EnvelopeValid,
            IntakeState::SchemaValid,
            IntakeState::Handling,
        ] {
            assert!(state.can_transition_to(IntakeState::Failed));
            assert!(!state.is_terminal());
        }
    }

    #[test]
    fn bind_cannot_skip_consumption() {
        assert!(!BindState::EnvelopeValid.can_transition_to(BindState::Bound));
        assert!(BindState::OfferConsumed.can_transition_to(BindState::Bound));
        assert!(BindState::OfferConsumed.can_transition_to(BindState::Failed));
    }

    #[test]
    fn terminal_states() {
        assert!(IntakeState::OfferIssued.is_terminal());
        assert!(BindState::Bound.is_terminal());
        assert!(BindState::Failed.valid_transitions().is_empty());
    }
}

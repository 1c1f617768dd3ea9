//! AIP Server - Agent Intake Protocol provider implementation.
//!
//! Hosts intakes behind a discovery manifest, turns validated submissions
//! into time-bounded offers and redeems them at most once through the bind
//! endpoint.

pub mod config;
pub mod demo;
pub mod engine;
pub mod intake;
pub mod offer_store;
pub mod server;
pub mod state_machine;

pub use config::ServerConfig;
pub use engine::{BindOutcome, ProviderEngine};
pub use intake::{
    BindHandler, HandlerOutcome, IntakeConfig, IntakeHandler, IntakeRegistry, RegisteredIntake,
    SessionContext,
};
pub use offer_store::{Clock, ManualClock, OfferStore, PendingOffer, StoredOffer, SystemClock};
pub use server::{router, Server};
pub use state_machine::{BindStateMachine, IntakeStateMachine};

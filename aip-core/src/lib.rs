//! # aip-core
//!
//! Core library for the Agent Intake Protocol (AIP).
//!
//! This crate provides the wire types, error taxonomy, lifecycle states,
//! manifest builder and envelope validation shared by AIP providers and
//! agents.

pub mod error;
pub mod manifest;
pub mod message;
pub mod state;
pub mod validate;

pub use error::{AipError, AipResult, ErrorCode};
pub use message::{
    AgentInfo, AipResponse, BindEnvelope, ErrorBody, ErrorResponse, IntakeDescriptor, Manifest,
    Offer, OfferResponse, PrivacyPolicy, ProviderInfo, SubmissionEnvelope,
};
pub use state::{BindEvent, BindState, IntakeEvent, IntakeState};
pub use validate::{ValidBind, ValidSubmission};

/// Protocol version
pub const AIP_VERSION: &str = "0.1.0";

//! Error types and wire error codes for AIP.

use thiserror::Error;

/// Error codes carried in `error.code` of an error envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Malformed envelope or missing top-level fields.
    InvalidInput,
    /// `intake_data` lacks fields the intake's schema requires.
    SchemaMismatch,
    /// Unknown intake, or unknown / expired offer.
    NotFound,
    /// `bind_data` lacks fields the offer requires.
    MissingFields,
    /// Collaborator handler failed.
    InternalError,
    InvalidConfig,
    DuplicateIntake,
    IdCollision,
    DiscoveryFailed,
    InvalidManifest,
    NoManifest,
    IntakeNotFound,
    NoBindEndpoint,
    SubmitError,
    BindError,
    InvalidResponse,
    TransportError,
}

impl ErrorCode {
    pub const ALL: [ErrorCode; 17] = [
        Self::InvalidInput,
        Self::SchemaMismatch,
        Self::NotFound,
        Self::MissingFields,
        Self::InternalError,
        Self::InvalidConfig,
        Self::DuplicateIntake,
        Self::IdCollision,
        Self::DiscoveryFailed,
        Self::InvalidManifest,
        Self::NoManifest,
        Self::IntakeNotFound,
        Self::NoBindEndpoint,
        Self::SubmitError,
        Self::BindError,
        Self::InvalidResponse,
        Self::TransportError,
    ];

    /// Parse a wire code. `None` for codes outside this enum.
    pub fn from_wire(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == code)
    }

    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidInput => "INVALID_INPUT",
            Self::SchemaMismatch => "SCHEMA_MISMATCH",
            Self::NotFound => "NOT_FOUND",
            Self::MissingFields => "MISSING_FIELDS",
            Self::InternalError => "INTERNAL_ERROR",
            Self::InvalidConfig => "INVALID_CONFIG",
            Self::DuplicateIntake => "DUPLICATE_INTAKE",
            Self::IdCollision => "ID_COLLISION",
            Self::DiscoveryFailed => "DISCOVERY_FAILED",
            Self::InvalidManifest => "INVALID_MANIFEST",
            Self::NoManifest => "NO_MANIFEST",
            Self::IntakeNotFound => "INTAKE_NOT_FOUND",
            Self::NoBindEndpoint => "NO_BIND_ENDPOINT",
            Self::SubmitError => "SUBMIT_ERROR",
            Self::BindError => "BIND_ERROR",
            Self::InvalidResponse => "INVALID_RESPONSE",
            Self::TransportError => "TRANSPORT_ERROR",
        }
    }

    /// HTTP status a provider answers with for this code.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidInput | Self::SchemaMismatch | Self::MissingFields => 400,
            Self::NotFound => 404,
            _ => 500,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// AIP protocol errors.
///
/// Provider-side variants render the exact message placed in an error
/// envelope; agent-side variants describe what went wrong on the consuming end.
#[derive(Debug, Error)]
pub enum AipError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    SchemaMismatch(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Bind requires: {}", .0.join(", "))]
    MissingFields(Vec<String>),

    /// Handler fault. The payload is for logs only and never sent to agents.
    #[error("internal error: {0}")]
    Internal(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("intake '{0}' is already registered")]
    DuplicateIntake(String),

    #[error("offer id collision on {0}")]
    IdCollision(String),

    #[error("discovery failed: {0}")]
    DiscoveryFailed(String),

    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("no manifest loaded, call discover() first")]
    NoManifest,

    #[error("no intake with id '{0}'")]
    IntakeNotFound(String),

    #[error("bind endpoint URL is required, pass it from the offer response")]
    NoBindEndpoint,

    /// Error envelope reported by a provider.
    #[error("{code}: {message}")]
    Rejected { code: String, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AipError {
    /// Wire code of this error. Provider-reported codes pass through verbatim.
    pub fn code(&self) -> &str {
        match self {
            Self::Rejected { code, .. } => code.as_str(),
            other => other.error_code().as_str(),
        }
    }

    /// Typed code. A `Rejected` code outside this enum maps to
    /// [`ErrorCode::InvalidResponse`]; [`AipError::code`] keeps the verbatim string.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::InvalidInput(_) | Self::Serialization(_) => ErrorCode::InvalidInput,
            Self::SchemaMismatch(_) => ErrorCode::SchemaMismatch,
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::MissingFields(_) => ErrorCode::MissingFields,
            Self::Internal(_) => ErrorCode::InternalError,
            Self::InvalidConfig(_) => ErrorCode::InvalidConfig,
            Self::DuplicateIntake(_) => ErrorCode::DuplicateIntake,
            Self::IdCollision(_) => ErrorCode::IdCollision,
            Self::DiscoveryFailed(_) => ErrorCode::DiscoveryFailed,
            Self::InvalidManifest(_) => ErrorCode::InvalidManifest,
            Self::NoManifest => ErrorCode::NoManifest,
            Self::IntakeNotFound(_) => ErrorCode::IntakeNotFound,
            Self::NoBindEndpoint => ErrorCode::NoBindEndpoint,
            Self::Rejected { code, .. } => {
                ErrorCode::from_wire(code).unwrap_or(ErrorCode::InvalidResponse)
            }
            Self::InvalidResponse(_) => ErrorCode::InvalidResponse,
            Self::Transport(_) => ErrorCode::TransportError,
        }
    }

    /// Message safe to put in a response body. Handler internals and id
    /// collisions collapse to a fixed string.
    pub fn public_message(&self) -> String {
        match self {
            Self::Internal(_) | Self::IdCollision(_) => "Failed to process request".to_string(),
            other => other.to_string(),
        }
    }
}

/// Result type alias for AIP operations.
pub type AipResult<T> = Result<T, AipError>;

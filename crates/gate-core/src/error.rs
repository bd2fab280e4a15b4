use thiserror::Error;

/// Malformed command, rejected before it enters the state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("action_id must not be empty")]
    EmptyActionId,

    #[error("invalid command type '{0}': must be uppercase letters, digits and underscores")]
    InvalidCommandType(String),

    #[error("unknown command type '{0}' has no policy and no severity was given")]
    MissingSeverity(String),

    #[error("invalid severity '{0}': must be LOW, MEDIUM or HIGH")]
    InvalidSeverity(String),

    #[error("malformed command line: {0}")]
    MalformedLine(String),
}

#[derive(Debug, Error)]
pub enum GateError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("duplicate action: '{0}' has already been submitted")]
    DuplicateAction(String),

    #[error("audit ledger storage error: {0}")]
    Storage(String),

    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("judge panel must contain at least one judge")]
    EmptyPanel,

    #[error("policy not found: {0}")]
    PolicyNotFound(String),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, GateError>;

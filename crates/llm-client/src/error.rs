use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("response had no choices")]
    EmptyResponse,

    #[error("Failed to parse model reply: {source}\n  reply: {reply}")]
    Parse {
        reply: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("missing API key")]
    MissingApiKey,
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Transport(e.to_string())
        }
    }
}

use consilience_core::ConsilienceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("chat API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to parse model reply: {source}\n  reply: {reply}")]
    Parse {
        reply: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("model reply was empty")]
    EmptyReply,

    #[error("unexpected value in model reply: {0}")]
    Unexpected(String),

    #[error("API key not set: ${0} is empty or missing")]
    MissingApiKey(String),
}

impl AgentError {
    /// Map onto the core's collaborator taxonomy: transport problems are
    /// "unavailable", anything wrong with the reply itself is "malformed".
    pub fn into_core(self, capability: &'static str) -> ConsilienceError {
        match self {
            AgentError::Http(_) | AgentError::Status { .. } | AgentError::MissingApiKey(_) => {
                ConsilienceError::unavailable(capability, self.to_string())
            }
            AgentError::Parse { .. } | AgentError::EmptyReply | AgentError::Unexpected(_) => {
                ConsilienceError::malformed(capability, self.to_string())
            }
        }
    }
}

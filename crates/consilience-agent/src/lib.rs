//! `consilience-agent`: the Decision Service and domain specialists over an
//! OpenAI-compatible chat completions API.
//!
//! # Architecture
//!
//! ```text
//! LlmConfig
//!     │
//!     ▼
//! ChatClient          ← POST {base_url}/chat/completions, bearer auth
//!     │
//!     ├──▶ LlmDecisionService  ← impl consilience_core::bridge::DecisionService
//!     │        prompts.rs renders, types.rs decodes JSON verdicts
//!     │
//!     └──▶ LlmSpecialist       ← impl consilience_core::specialist::Specialist
//!              plain-text perspective per domain
//! ```
//!
//! Every failure leaves this crate as a core collaborator error: transport
//! and HTTP status problems are "unavailable", bad replies are "malformed".
//! Deadlines and fallbacks belong to the core's bridge, not to this crate.

pub mod client;
pub mod error;
pub mod prompts;
pub mod service;
pub mod types;


pub use client::ChatClient;
pub use error::AgentError;
pub use service::{LlmDecisionService, LlmSpecialist};

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, AgentError>;

/// Both collaborators from one config, sharing a connection pool.
pub fn from_config(
    config: &consilience_core::config::LlmConfig,
) -> Result<(LlmDecisionService, LlmSpecialist)> {
    let client = ChatClient::from_config(config)?;
    Ok((
        LlmDecisionService::new(client.clone(), config),
        LlmSpecialist::new(client, config),
    ))
}

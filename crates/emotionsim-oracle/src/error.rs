//! Error types for the `emotionsim-oracle` crate.

/// Errors that can occur while invoking or interpreting the oracle.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    /// The HTTP backend failed (transport, status, or body extraction).
    #[error("oracle backend error: {0}")]
    Backend(String),

    /// The response text could not be parsed into the response schema.
    #[error("oracle parse error: {0}")]
    Parse(String),

    /// A prompt template failed to load or render.
    #[error("prompt template error: {0}")]
    Template(String),

    /// The oracle produced an empty response.
    #[error("oracle returned an empty response")]
    EmptyResponse,

    /// The scripted oracle ran out of canned responses for an agent.
    #[error("no scripted response left for agent {0}")]
    ScriptExhausted(String),
}

//! Provider trait for abstracting generation-service interactions.

use crate::error::Result;

/// A chat-completion backend used for profiling, code generation, and
/// report summarization.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` so one provider can be shared by
/// the orchestrator and CLI.
///
/// # Error Handling
///
/// Implementations return [`crate::error::CleaningError::Service`] (or the
/// transport error) on failure; recovery policy is the caller's concern:
/// the analysis path degrades to an empty result, the transform path retries
/// once, and the report path surfaces the failure.
pub trait ChatProvider: Send + Sync {
    /// Send one system instruction plus one user payload; return the raw
    /// response text.
    ///
    /// When `json_mode` is true the provider requests a well-formed JSON
    /// document from the backend. Callers must still treat the response as
    /// untrusted: parse failures are expected and handled one level up.
    fn complete(&self, system: &str, user: &str, json_mode: bool) -> Result<String>;

    /// Provider name for logging and diagnostics.
    fn name(&self) -> &str;

    /// The model in use, if the provider exposes one.
    fn model(&self) -> Option<&str> {
        None
    }
}

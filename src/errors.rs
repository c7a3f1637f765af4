use thiserror::Error;

/// The gateway's error taxonomy.
///
/// Most of these never escape [`crate::pipeline::Pipeline::analyze`] — stage
/// failures degrade to a documented fallback instead. They matter at the
/// edges: constructing a `Policy`/`Shield`, and the explicit
/// `PolicyStore`/`TraceStore` CRUD calls a caller makes outside the hot path.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("policy not found")]
    PolicyNotFound,

    #[error("policy belongs to a different owner")]
    PolicyForbidden,

    #[error("a policy with key '{0}' already exists for this owner")]
    PolicyConflict(String),

    #[error("classifier failure: {0}")]
    Classifier(String),

    #[error("completer timed out")]
    CompleterTimeout,

    #[error("completer transport error: {0}")]
    CompleterTransport(String),

    #[error("completer rejected the requested response format")]
    CompleterSchema,

    #[error("trace write failed: {0}")]
    TraceWrite(String),

    #[error("bad request: {0}")]
    BadRequest(String),
}

impl GatewayError {
    /// True for the three completer variants — the set a stage must catch
    /// and convert into a structured `ERROR` sentinel rather than propagate.
    pub fn is_completer_error(&self) -> bool {
        matches!(
            self,
            GatewayError::CompleterTimeout
                | GatewayError::CompleterTransport(_)
                | GatewayError::CompleterSchema
        )
    }
}

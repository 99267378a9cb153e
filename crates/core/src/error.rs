/// Failures raised at the boundary to the generative text service and the
/// speech service.
///
/// None of these are fatal: the session turns fetch failures into the
/// `Failed` state, verification failures into a degraded `Resolved`
/// outcome, and a missing speech environment into a disabled speak button.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RiddleError {
    #[error("service unreachable: {0}")]
    Transport(String),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("unsupported environment: {0}")]
    UnsupportedEnvironment(String),
}

impl From<reqwest::Error> for RiddleError {
    fn from(err: reqwest::Error) -> Self {
        // A body that arrived but could not be decoded is the provider's fault,
        // everything else (connect, timeout, status) is transport.
        if err.is_decode() {
            RiddleError::MalformedResponse(err.to_string())
        } else {
            RiddleError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for RiddleError {
    fn from(err: serde_json::Error) -> Self {
        RiddleError::MalformedResponse(err.to_string())
    }
}

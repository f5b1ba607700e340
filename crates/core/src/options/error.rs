use thiserror::Error;

/// Why a request's options were refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OptionsError {
    #[error("No options provided")]
    Missing,

    #[error("Error while parsing options")]
    Malformed,

    /// A field failed validation. `path` points at it, e.g. `/0/quality`.
    #[error("[{path}] {message}")]
    Invalid { path: String, message: String },
}

impl OptionsError {
    pub fn invalid(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            path: path.into(),
            message: message.into(),
        }
    }
}

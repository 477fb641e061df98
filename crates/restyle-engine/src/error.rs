use thiserror::Error;

/// Why a generate action was refused before any network call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StartError {
    #[error("Please upload a photo first.")]
    NoImage,

    #[error("Please select a room and a style.")]
    NoSelection,

    #[error("You have used all free generations.")]
    LimitReached,

    #[error("Unknown {kind} '{key}'.")]
    UnknownKey { kind: &'static str, key: String },

    #[error("Variant {0} does not exist in the current batch.")]
    NoSuchItem(usize),

    #[error("Missing data to regenerate; generate again from scratch.")]
    MissingKeys,
}

/// Failure of a single generation call after the model chain is exhausted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("generation cancelled")]
    Cancelled,

    #[error("No image generated in the response.")]
    NoImage,

    #[error("malformed model response: {0}")]
    Malformed(String),

    #[error("{message}")]
    Exhausted { message: String },
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("download failed: {0}")]
    Download(#[source] anyhow::Error),

    #[error("unsupported image reference '{0}'")]
    UnsupportedUri(String),
}

/// Errors produced while decoding depot metadata files.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("bake target `{target}` is not valid build metadata: {source}")]
    Target {
        target: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("bake metadata must be a JSON object, got {0}")]
    NotAnObject(&'static str),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, MetadataError>;

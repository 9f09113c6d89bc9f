// src/error.rs
use thiserror::Error;

/// Reasons a run refuses to start. Raised synchronously by `Funnel::start`;
/// nothing is dispatched when one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("no sources configured")]
    NoSources,

    #[error("max_items must be greater than zero")]
    ZeroMaxItems,

    #[error("duplicate source id `{0}`")]
    DuplicateSourceId(String),

    #[error("unknown provider `{provider}` for source `{source_id}`")]
    UnknownProvider { source_id: String, provider: String },

    #[error("template `{template}` used by source `{source_id}` is not registered")]
    UnknownTemplate { source_id: String, template: String },
}

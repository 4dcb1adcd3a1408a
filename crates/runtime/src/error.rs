use thiserror::Error;

/// Failures raised while assembling a [`crate::Runtime`] (mirrors the teacher's
/// assembly-error shape: a missing-dependency case for build-order mistakes, a
/// missing-component case for an unfinished builder, and a pass-through for
/// configuration failures).
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("invalid configuration: {0}")]
    Configuration(#[from] anyhow::Error),

    #[error("missing dependency: {0} must be configured before {1}")]
    MissingDependency(&'static str, &'static str),

    #[error("missing component: {0}")]
    MissingComponent(&'static str),

    #[error("no saga definition registered for saga_type {0}")]
    MissingSagaDefinition(String),
}

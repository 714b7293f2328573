use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors surfaced by the engine to the caller. Kernel and dispatch
/// failures abandon the current plan; no learning happens for that task.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("task validation failed: {0}")]
    TaskValidationFailed(String),

    #[error("no candidate plans for task kind '{0}'")]
    UnroutableTask(String),

    #[error("kernel '{op}' failed: {cause}")]
    KernelFailed { op: String, cause: String },

    #[error("kernel not found in library: '{op}'")]
    UnknownKernel { op: String },

    #[error("EXECUTE_JIT step ran without a preceding JIT_COMPILE step")]
    MissingJitArtifact,
}

pub fn kernel_failed(op: &str, cause: impl Into<String>) -> EngineError {
    EngineError::KernelFailed {
        op: op.to_string(),
        cause: cause.into(),
    }
}

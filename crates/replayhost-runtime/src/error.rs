//! Runtime error types.
//!
//! These are fatal for a run: without a compiled, started module there is
//! nothing to drive. Per-file failures use [`replayhost_types::InvocationError`].

/// Errors from compiling, instantiating or starting the parser module.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// The module bytes are not a valid Wasm (or WAT) module.
    #[error("compile: {0:#}")]
    Compile(anyhow::Error),

    /// Imports could not be satisfied or the export contract is not met.
    #[error("instantiate: {0:#}")]
    Instantiate(anyhow::Error),

    /// The entry routine already ran for this instance.
    #[error("module instance already started")]
    AlreadyStarted,

    /// I/O error (module reads, AOT cache writes).
    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, RuntimeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = RuntimeError::from(io_err);
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn compile_error_keeps_context_chain() {
        let err = RuntimeError::Compile(
            anyhow::anyhow!("magic header not detected").context("failed to compile parser.wasm"),
        );
        let msg = err.to_string();
        assert!(msg.starts_with("compile:"), "got: {msg}");
        assert!(msg.contains("magic header"), "got: {msg}");
    }

    #[test]
    fn already_started_displays() {
        assert_eq!(
            RuntimeError::AlreadyStarted.to_string(),
            "module instance already started"
        );
    }
}

// src/error.rs
// =============================================================================
// Run-level errors for the verification engine.
//
// Only a handful of things are allowed to fail a whole run:
// - a bad or disabled configuration (caught at construction)
// - a second run starting while one is still active
// - cancellation of the run's deadline
//
// Everything else (a 404, a missing file, a cache write that didn't land)
// is an expected outcome of checking links and is recorded, logged, and
// carried on from. Those never show up here.
// =============================================================================

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VerifyError {
    /// Configuration was rejected at construction time
    #[error("invalid link verification config: {0}")]
    Config(String),

    /// A previous call to `verify_pages` has not returned yet
    #[error("link verification already running")]
    AlreadyRunning,

    /// The run's cancellation token fired; in-flight work was drained first
    #[error("link verification cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, VerifyError>;

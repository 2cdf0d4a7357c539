use std::io;
use std::process::ExitStatus;
use std::time::Duration;

use thiserror::Error;

use crate::board::BoardError;

/// Result alias for harness operations.
pub type HarnessResult<T> = Result<T, HarnessError>;

/// Errors that can occur while loading a suite or driving the engine process.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("failed to spawn engine: {0}")]
    EngineStart(String),
    #[error("engine terminated early with status {0}")]
    EngineExited(ExitStatus),
    #[error("engine output closed")]
    ConnectionClosed,
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("engine gave no answer within {0:?}")]
    Timeout(Duration),
    #[error("engine rejected command: {0}")]
    EngineRejected(String),
    #[error("board model error: {0}")]
    Board(#[from] BoardError),
    #[error("`{command}` is not valid while the session is {state}")]
    InvalidState {
        command: &'static str,
        state: &'static str,
    },
    #[error("run aborted")]
    Aborted,
    #[error("suite worker panicked: {0}")]
    WorkerPanicked(String),
}

impl HarnessError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        HarnessError::Config(message.into())
    }

    pub(crate) fn engine_start(err: impl Into<String>) -> Self {
        HarnessError::EngineStart(err.into())
    }

    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        HarnessError::Protocol(message.into())
    }

    /// Whether this error only spoils the current trial.
    ///
    /// Trial failures are folded into the aggregate as a zero score; anything
    /// else ends the run.
    pub fn is_trial_failure(&self) -> bool {
        matches!(
            self,
            HarnessError::Protocol(_)
                | HarnessError::Timeout(_)
                | HarnessError::Board(_)
                | HarnessError::EngineRejected(_)
        )
    }

    /// Whether the engine session must be replaced after this error.
    pub fn poisons_session(&self) -> bool {
        matches!(self, HarnessError::Protocol(_) | HarnessError::Timeout(_))
    }
}

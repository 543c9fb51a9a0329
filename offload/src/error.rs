use crate::lifecycle::RunState;
use crate::types::Rank;

pub type Result<T> = std::result::Result<T, OffloadError>;

#[derive(Debug, thiserror::Error)]
pub enum OffloadError {
    #[error("device setup failed: {message}")]
    Setup {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("failed to build program `{program}`:\n{log}")]
    Compile { program: String, log: String },

    #[error("dispatch failed while {stage}: {message}")]
    Dispatch {
        stage: &'static str,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("buffer size mismatch: expected {expected} bytes, got {actual}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    #[error("invalid rank {rank}: world size is {world_size}")]
    InvalidRank { rank: Rank, world_size: u32 },

    #[error("peer {rank} disconnected unexpectedly")]
    PeerDisconnected { rank: Rank },

    #[error("{operation} failed at rank {rank}: {reason}")]
    CollectiveFailed {
        operation: &'static str,
        rank: Rank,
        reason: String,
    },

    #[error("invalid run transition {from:?} -> {to:?}")]
    InvalidTransition { from: RunState, to: RunState },

    #[error("invalid value {value:?} for {key}")]
    Config { key: &'static str, value: String },
}

impl OffloadError {
    /// Create a `Setup` error with just a message.
    pub fn setup(msg: impl Into<String>) -> Self {
        Self::Setup {
            message: msg.into(),
            source: None,
        }
    }

    /// Create a `Setup` error with a message and a source error.
    pub fn setup_with_source(
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Setup {
            message: msg.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a `Dispatch` error for the given stage.
    pub fn dispatch(stage: &'static str, msg: impl Into<String>) -> Self {
        Self::Dispatch {
            stage,
            message: msg.into(),
            source: None,
        }
    }

    /// Create a `Dispatch` error for the given stage with a source error.
    pub fn dispatch_with_source(
        stage: &'static str,
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Dispatch {
            stage,
            message: msg.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an `InvalidGeometry` error.
    pub fn geometry(msg: impl Into<String>) -> Self {
        Self::InvalidGeometry(msg.into())
    }
}

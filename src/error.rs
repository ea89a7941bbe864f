//! Renderer error types

use crate::backend::BackendError;
use thiserror::Error;

/// Fatal setup errors. Anything returned here stops the renderer before the
/// first frame.
#[derive(Error, Debug)]
pub enum RendererError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("Render target '{label}' is incomplete: {status}")]
    IncompleteTarget { label: String, status: String },
    #[error("Failed to load environment map {path}: {reason}")]
    EnvironmentLoad { path: String, reason: String },
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error("Pass '{pass}' needs scratch depth {expected:?} but it is {actual:?}")]
    ScratchSizeMismatch {
        pass: String,
        expected: (u32, u32),
        actual: (u32, u32),
    },
    #[error("Pass '{pass}' is missing its input '{input}'")]
    MissingInput { pass: String, input: String },
    #[error("Event loop error: {0}")]
    EventLoop(String),
}

/// Render graph construction and compilation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Render graph contains a cycle through: {0:?}")]
    Cycle(Vec<String>),
    #[error("Pass '{pass}' reads '{resource}' which no pass writes")]
    MissingProducer { pass: String, resource: String },
    #[error("Pass '{0}' was added twice")]
    DuplicatePass(String),
}

pub type RendererResult<T> = Result<T, RendererError>;

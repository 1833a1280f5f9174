use thiserror::Error;

/// Errors raised by scene graph mutations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SgError {
    #[error("Scene graph has been closed by the renderer")]
    Closed,

    #[error("Node does not exist: {0}")]
    MissingNode(String),

    #[error("Adding '{child}' under '{parent}' would create a cycle")]
    Cycle { parent: String, child: String },

    #[error("Transform sample {index} out of range for '{node}' ({count} samples)")]
    SampleOutOfRange {
        node: String,
        index: usize,
        count: usize,
    },
}

pub type SgResult<T> = Result<T, SgError>;

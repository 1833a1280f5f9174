use tether_sg::SgError;
use thiserror::Error;

use crate::schema::SchemaError;
use crate::texture::TextureError;

/// Errors that stop an export or sync pass.
///
/// Entity-level problems never show up here; they are collected in the
/// [`SyncReport`](crate::report::SyncReport) and the pass continues.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Renderer scene is gone")]
    RendererGone,

    #[error("Scene graph error: {0}")]
    Graph(SgError),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Texture error: {0}")]
    Texture(#[from] TextureError),
}

impl From<SgError> for SyncError {
    fn from(err: SgError) -> Self {
        match err {
            SgError::Closed => SyncError::RendererGone,
            other => SyncError::Graph(other),
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_graph_maps_to_renderer_gone() {
        let err: SyncError = SgError::Closed.into();
        assert!(matches!(err, SyncError::RendererGone));

        let err: SyncError = SgError::MissingNode("a".into()).into();
        assert!(matches!(err, SyncError::Graph(SgError::MissingNode(_))));
    }
}

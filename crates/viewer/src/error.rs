use pageflow_cache::{CacheError, ConfigError};
use pageflow_render::RenderError;

/// Errors surfaced by a viewer session.
///
/// Load and render failures also land in the session's error slot as their
/// display string. Cancellations never become errors.
#[derive(Debug, thiserror::Error)]
pub enum ViewerError {
    #[error("failed to load document: {0}")]
    Load(#[source] RenderError),
    #[error("failed to render page: {0}")]
    Render(#[source] RenderError),
    #[error("no document is open")]
    NotOpen,
    #[error("page {0} has no bitmap to capture")]
    NothingToCapture(u32),
    #[error("failed to encode capture: {0}")]
    Encode(#[from] CacheError),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, ViewerError>;

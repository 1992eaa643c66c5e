//! Pageflow Cache Library
//!
//! Page bitmap caching for the progressive viewer: a two-tier in-memory
//! cache with signature-based invalidation, and a persistent, versioned
//! disk cache that survives viewer close and process restarts.

pub mod bitmap;
pub mod bridge;
pub mod codec;
pub mod config;
pub mod disk;
pub mod writer;

pub use bitmap::{BitmapCache, CachedBitmap, RenderSignature, Tier, TierStats};
pub use bridge::{DiskCacheBridge, WarmMarker};
pub use codec::{decode_png, encode_png};
pub use config::{CacheConfig, ConfigError};
pub use disk::{BlobStore, DirBlobStore, DiskCacheStats, MemoryBlobStore};
pub use writer::PersistWriter;

/// Errors raised by cache stores and codecs.
///
/// The viewer never lets these escape: the disk bridge logs them and treats
/// the operation as a miss.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("image codec error: {0}")]
    Image(#[from] image::ImageError),
    #[error("malformed marker: {0}")]
    Marker(#[from] serde_json::Error),
    #[error("blob of {size} bytes exceeds the {limit} byte budget")]
    TooLarge { size: usize, limit: usize },
    #[error("persist writer has shut down")]
    WriterClosed,
}

use std::path::PathBuf;

use fabric::Codec;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("failed to read {}: {message}", path.display())]
    Io { path: PathBuf, message: String },

    #[error("request for {url} failed: {message}")]
    Http { url: String, message: String },

    #[error("request for {url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("unsupported image location '{0}'")]
    Unsupported(String),
}

#[derive(Debug, Clone, Error)]
pub enum DecodeError {
    #[error("failed to decode image: {0}")]
    Image(String),

    #[error("cube-map faces must be square and equally sized: {0}")]
    CubeFaces(String),

    #[error("invalid KTX container: {0}")]
    Ktx(String),

    #[error("expected a {expected} texture but the container holds {found}")]
    CodecMismatch { expected: Codec, found: Codec },

    #[error("unsupported texture data: {0}")]
    Unsupported(String),
}

/// Failure recorded on a texture slot. Never fatal to the owning material.
#[derive(Debug, Clone, Error)]
pub enum TextureError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("texture upload failed: {0}")]
    Upload(String),

    #[error("texture worker stopped before delivering a result")]
    WorkerLost,
}

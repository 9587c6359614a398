//! Texture resources behind material uniforms.
//!
//! Types:
//!
//! - `TextureLoader` owns the worker pool that fetches and decodes images.
//! - `TextureSlot` is the per-uniform `Unset → Loading → Ready | Failed` state
//!   machine, applied on the owning thread through `TextureUploader`.
//! - `ResourceFetcher` / `DefaultFetcher` resolve image locations to bytes.
//! - `CodecSupport` / `CodecSet` report which compressed families the GPU can
//!   sample, steering compressed-set selection.
//! - `DecodedTexture` is the upload payload: RGBA pixels, six cube faces, or a
//!   KTX mip chain.
mod codec;
mod decode;
mod error;
mod fetch;
pub mod ktx;
mod loader;
mod slot;

pub use codec::{CodecSet, CodecSupport};
pub use decode::{decode_compressed, decode_cube, decode_image, DecodedTexture, TextureKind};
pub use error::{DecodeError, FetchError, TextureError};
pub use fetch::{DefaultFetcher, FetchedResource, ResourceFetcher};
pub use ktx::{CompressedFormat, KtxTexture};
pub use loader::{LoaderConfig, TextureLoader};
pub use slot::{GpuTexture, TextureRequest, TextureSlot, TextureState, TextureUploader};

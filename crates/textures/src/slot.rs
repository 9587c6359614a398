//! Per-uniform texture state.
//!
//! A `TextureSlot` walks `Unset → Loading → Ready | Failed`. Loads are queued
//! on a [`TextureLoader`]; results are only applied in [`TextureSlot::poll`],
//! on the thread that owns the slot, where a [`TextureUploader`] turns decoded
//! pixels into a [`GpuTexture`]. Reassigning or releasing bumps the slot's
//! generation and drops the pending reply channel, so a late result from an
//! earlier request can never land.
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{Receiver, TryRecvError};
use fabric::{CubeMapSource, ImageSource, TypedValue};
use tracing::{debug, warn};

use crate::decode::{DecodedTexture, TextureKind};
use crate::error::TextureError;
use crate::loader::{Job, LoadOutcome, TextureLoader};

static NEXT_TEXTURE_ID: AtomicU64 = AtomicU64::new(1);

/// A texture living on the GPU. Dropping it releases the GPU resource.
pub struct GpuTexture {
    id: u64,
    kind: TextureKind,
    width: u32,
    height: u32,
    resource: Box<dyn Any + Send + Sync>,
}

impl GpuTexture {
    pub fn new<R>(kind: TextureKind, width: u32, height: u32, resource: R) -> Self
    where
        R: Any + Send + Sync,
    {
        Self {
            id: NEXT_TEXTURE_ID.fetch_add(1, Ordering::Relaxed),
            kind,
            width,
            height,
            resource: Box::new(resource),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> TextureKind {
        self.kind
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// The uploader-specific resource, if it is an `R`.
    pub fn resource<R: Any>(&self) -> Option<&R> {
        self.resource.downcast_ref::<R>()
    }
}

impl fmt::Debug for GpuTexture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuTexture")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

/// Turns decoded texture data into GPU textures. Called from
/// [`TextureSlot::poll`] only.
pub trait TextureUploader {
    fn upload(&mut self, label: &str, texture: &DecodedTexture) -> Result<GpuTexture, TextureError>;
}

/// What a texture uniform should show.
#[derive(Debug, Clone, PartialEq)]
pub enum TextureRequest {
    Image(ImageSource),
    CubeMap(CubeMapSource),
}

impl TextureRequest {
    /// `None` for values that are not textures.
    pub fn from_value(value: &TypedValue) -> Option<Self> {
        match value {
            TypedValue::Texture(source) => Some(TextureRequest::Image(source.clone())),
            TypedValue::CubeMap(source) => Some(TextureRequest::CubeMap(source.clone())),
            _ => None,
        }
    }

    pub fn kind(&self) -> TextureKind {
        match self {
            TextureRequest::Image(_) => TextureKind::D2,
            TextureRequest::CubeMap(_) => TextureKind::Cube,
        }
    }
}

#[derive(Debug)]
pub enum TextureState {
    /// Nothing loaded; the renderer binds its default texture.
    Unset,
    Loading,
    Ready(GpuTexture),
    Failed(TextureError),
}

impl TextureState {
    pub fn name(&self) -> &'static str {
        match self {
            TextureState::Unset => "unset",
            TextureState::Loading => "loading",
            TextureState::Ready(_) => "ready",
            TextureState::Failed(_) => "failed",
        }
    }

    pub fn texture(&self) -> Option<&GpuTexture> {
        match self {
            TextureState::Ready(texture) => Some(texture),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct TextureSlot {
    label: String,
    kind: TextureKind,
    generation: u64,
    state: TextureState,
    pending: Option<Receiver<LoadOutcome>>,
}

impl TextureSlot {
    pub fn new(label: impl Into<String>, kind: TextureKind) -> Self {
        Self {
            label: label.into(),
            kind,
            generation: 0,
            state: TextureState::Unset,
            pending: None,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn kind(&self) -> TextureKind {
        self.kind
    }

    pub fn state(&self) -> &TextureState {
        &self.state
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.state, TextureState::Loading)
    }

    /// Starts showing `request`, abandoning whatever the slot held or was
    /// waiting for.
    pub fn assign(&mut self, loader: &TextureLoader, request: &TextureRequest) {
        self.reset();
        self.kind = request.kind();
        let generation = self.generation;

        let receiver = match request {
            TextureRequest::Image(ImageSource::Default)
            | TextureRequest::CubeMap(CubeMapSource::Default) => {
                debug!(texture = %self.label, "using the default texture");
                return;
            }
            TextureRequest::Image(ImageSource::Location(location)) => {
                loader.submit(&self.label, generation, Job::Image(location.clone()))
            }
            TextureRequest::Image(ImageSource::Decoded(image)) => {
                Some(loader.completed(generation, DecodedTexture::from_in_memory(image)))
            }
            TextureRequest::Image(ImageSource::Compressed(set)) => match loader.select_codec(set) {
                Some((codec, location)) => {
                    debug!(texture = %self.label, %codec, url = %location, "selected compressed texture");
                    loader.submit(
                        &self.label,
                        generation,
                        Job::Compressed(location.clone(), codec),
                    )
                }
                None => {
                    let offered: Vec<_> = set.codecs().map(|codec| codec.key()).collect();
                    warn!(
                        texture = %self.label,
                        offered = ?offered,
                        "no supported compressed format; keeping the default texture"
                    );
                    return;
                }
            },
            TextureRequest::CubeMap(CubeMapSource::Faces(faces)) => {
                loader.submit(&self.label, generation, Job::Cube(faces.clone()))
            }
        };

        match receiver {
            Some(receiver) => {
                self.pending = Some(receiver);
                self.state = TextureState::Loading;
                debug!(texture = %self.label, generation, "texture loading");
            }
            None => debug!(texture = %self.label, "texture loading is disabled"),
        }
    }

    /// Applies a finished load, if one arrived. Returns whether the state
    /// changed.
    pub fn poll(&mut self, uploader: &mut dyn TextureUploader) -> bool {
        let Some(receiver) = &self.pending else {
            return false;
        };
        let outcome = match receiver.try_recv() {
            Ok(outcome) => outcome,
            Err(TryRecvError::Empty) => return false,
            Err(TryRecvError::Disconnected) => {
                self.pending = None;
                self.fail(TextureError::WorkerLost);
                return true;
            }
        };
        self.pending = None;

        if outcome.generation != self.generation {
            debug!(
                texture = %self.label,
                stale = outcome.generation,
                current = self.generation,
                "discarding stale texture result"
            );
            return false;
        }

        match outcome
            .result
            .and_then(|decoded| uploader.upload(&self.label, &decoded))
        {
            Ok(texture) => {
                debug!(texture = %self.label, id = texture.id(), "texture ready");
                self.state = TextureState::Ready(texture);
            }
            Err(err) => self.fail(err),
        }
        true
    }

    /// Drops the texture and any pending load; the slot returns to `Unset`.
    pub fn release(&mut self) {
        if !matches!(self.state, TextureState::Unset) {
            debug!(texture = %self.label, state = self.state.name(), "releasing texture");
        }
        self.reset();
    }

    fn reset(&mut self) {
        self.generation += 1;
        self.pending = None;
        self.state = TextureState::Unset;
    }

    fn fail(&mut self, err: TextureError) {
        warn!(texture = %self.label, error = %err, "texture load failed; keeping the default texture");
        self.state = TextureState::Failed(err);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use crossbeam_channel::bounded;
    use fabric::{ImageLocation, InMemoryImage};

    use super::*;
    use crate::codec::CodecSet;
    use crate::error::FetchError;
    use crate::fetch::FetchedResource;
    use crate::loader::LoaderConfig;
    use crate::test_support::png_bytes;

    /// Resource that counts how many uploads are alive.
    struct Token(Arc<AtomicUsize>);

    impl Drop for Token {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct CountingUploader {
        live: Arc<AtomicUsize>,
        uploads: Vec<(String, (u32, u32))>,
    }

    impl TextureUploader for CountingUploader {
        fn upload(&mut self, label: &str, texture: &DecodedTexture) -> Result<GpuTexture, TextureError> {
            self.live.fetch_add(1, Ordering::SeqCst);
            let (width, height) = texture.dimensions();
            self.uploads.push((label.to_string(), (width, height)));
            Ok(GpuTexture::new(
                texture.kind(),
                width,
                height,
                Token(Arc::clone(&self.live)),
            ))
        }
    }

    fn png_loader() -> TextureLoader {
        let fetcher = |location: &ImageLocation| -> Result<FetchedResource, FetchError> {
            match location.url.as_str() {
                "missing.png" => Err(FetchError::Unsupported(location.url.clone())),
                _ => Ok(FetchedResource::Bytes(png_bytes(2, 2, [255; 4], [255; 4]))),
            }
        };
        TextureLoader::new(Arc::new(fetcher), Arc::new(CodecSet::none()), LoaderConfig::default())
    }

    fn poll_until_settled(slot: &mut TextureSlot, uploader: &mut dyn TextureUploader) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while slot.is_loading() && Instant::now() < deadline {
            slot.poll(uploader);
            thread::sleep(Duration::from_millis(2));
        }
    }

    fn location(url: &str) -> TextureRequest {
        TextureRequest::Image(ImageSource::Location(ImageLocation::new(url)))
    }

    #[test]
    fn loads_url_to_ready() {
        let loader = png_loader();
        let mut uploader = CountingUploader::default();
        let mut slot = TextureSlot::new("image", TextureKind::D2);
        assert!(matches!(slot.state(), TextureState::Unset));

        slot.assign(&loader, &location("brick.png"));
        assert!(slot.is_loading());
        poll_until_settled(&mut slot, &mut uploader);

        let texture = slot.state().texture().expect("texture should be ready");
        assert_eq!(texture.dimensions(), (2, 2));
        assert_eq!(uploader.live.load(Ordering::SeqCst), 1);

        slot.release();
        assert!(matches!(slot.state(), TextureState::Unset));
        assert_eq!(uploader.live.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn failed_fetch_is_recorded() {
        let loader = png_loader();
        let mut uploader = CountingUploader::default();
        let mut slot = TextureSlot::new("image", TextureKind::D2);
        slot.assign(&loader, &location("missing.png"));
        poll_until_settled(&mut slot, &mut uploader);
        assert!(matches!(
            slot.state(),
            TextureState::Failed(TextureError::Fetch(_))
        ));
        assert!(uploader.uploads.is_empty());
    }

    #[test]
    fn default_identifiers_never_load() {
        let loader = png_loader();
        let mut slot = TextureSlot::new("image", TextureKind::D2);
        slot.assign(&loader, &TextureRequest::Image(ImageSource::Default));
        assert!(matches!(slot.state(), TextureState::Unset));
        slot.assign(&loader, &TextureRequest::CubeMap(CubeMapSource::Default));
        assert!(matches!(slot.state(), TextureState::Unset));
        assert_eq!(slot.kind(), TextureKind::Cube);
    }

    #[test]
    fn in_memory_images_are_ready_after_one_poll() {
        let loader = TextureLoader::disabled();
        let mut uploader = CountingUploader::default();
        let mut slot = TextureSlot::new("image", TextureKind::D2);
        let image = InMemoryImage::solid(3, 1, [0, 255, 0, 255]).unwrap();
        slot.assign(&loader, &TextureRequest::Image(ImageSource::Decoded(image)));
        assert!(slot.is_loading());
        assert!(slot.poll(&mut uploader));
        assert_eq!(slot.state().texture().unwrap().dimensions(), (3, 1));
    }

    #[test]
    fn reassignment_discards_the_earlier_load() {
        let (release, gate) = bounded::<()>(1);
        let fetcher = move |location: &ImageLocation| -> Result<FetchedResource, FetchError> {
            if location.url == "slow.png" {
                let _ = gate.recv_timeout(Duration::from_secs(5));
                Ok(FetchedResource::Bytes(png_bytes(8, 8, [0; 4], [0; 4])))
            } else {
                Ok(FetchedResource::Bytes(png_bytes(2, 2, [0; 4], [0; 4])))
            }
        };
        let loader = TextureLoader::new(
            Arc::new(fetcher),
            Arc::new(CodecSet::none()),
            LoaderConfig {
                workers: 2,
                ..LoaderConfig::default()
            },
        );
        let mut uploader = CountingUploader::default();
        let mut slot = TextureSlot::new("image", TextureKind::D2);

        slot.assign(&loader, &location("slow.png"));
        slot.assign(&loader, &location("fast.png"));
        poll_until_settled(&mut slot, &mut uploader);
        release.send(()).unwrap();

        assert_eq!(slot.state().texture().unwrap().dimensions(), (2, 2));
        thread::sleep(Duration::from_millis(50));
        assert!(!slot.poll(&mut uploader));
        assert_eq!(uploader.uploads.len(), 1);
    }

    #[test]
    fn compressed_without_supported_codec_keeps_default() {
        let loader = png_loader();
        let mut set = fabric::CompressedSet::default();
        set.insert(fabric::Codec::Pvrtc, ImageLocation::new("a.ktx"));
        let mut slot = TextureSlot::new("image", TextureKind::D2);
        slot.assign(&loader, &TextureRequest::Image(ImageSource::Compressed(set)));
        assert!(matches!(slot.state(), TextureState::Unset));
    }
}

//! Worker pool that fetches and decodes textures off the owning thread.
//!
//! Jobs go through one shared `crossbeam-channel` queue. Every job carries its
//! own bounded reply channel, so a slot that loses interest simply drops the
//! receiver and the worker's late result goes nowhere.
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use fabric::{Codec, CompressedSet, ImageLocation};
use tracing::{debug, warn};

use crate::codec::{CodecSet, CodecSupport};
use crate::decode::{self, DecodedTexture};
use crate::error::{DecodeError, TextureError};
use crate::fetch::{FetchedResource, ResourceFetcher};

#[derive(Debug, Clone)]
pub struct LoaderConfig {
    pub workers: usize,
    /// Order in which compressed-set entries are tried.
    pub codec_preference: Vec<Codec>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            codec_preference: Codec::PREFERENCE.to_vec(),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Job {
    Image(ImageLocation),
    Compressed(ImageLocation, Codec),
    Cube(Box<[ImageLocation; 6]>),
}

struct Work {
    label: String,
    generation: u64,
    job: Job,
    reply: Sender<LoadOutcome>,
}

#[derive(Debug)]
pub(crate) struct LoadOutcome {
    pub generation: u64,
    pub result: Result<DecodedTexture, TextureError>,
}

struct Inner {
    queue: Option<Sender<Work>>,
    codecs: Arc<dyn CodecSupport>,
    preference: Vec<Codec>,
}

/// Cheap to clone; all clones share one worker pool. Workers exit once the
/// last clone is dropped.
#[derive(Clone)]
pub struct TextureLoader {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for TextureLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextureLoader")
            .field("enabled", &self.is_enabled())
            .field("preference", &self.inner.preference)
            .finish()
    }
}

impl TextureLoader {
    pub fn new(
        fetcher: Arc<dyn ResourceFetcher>,
        codecs: Arc<dyn CodecSupport>,
        config: LoaderConfig,
    ) -> Self {
        let (queue, jobs) = unbounded::<Work>();
        let workers = config.workers.max(1);
        for index in 0..workers {
            let jobs = jobs.clone();
            let fetcher = Arc::clone(&fetcher);
            let spawned = thread::Builder::new()
                .name(format!("texture-loader-{index}"))
                .spawn(move || worker_loop(jobs, fetcher));
            if let Err(err) = spawned {
                warn!(worker = index, error = %err, "failed to spawn texture worker");
            }
        }
        debug!(workers, "texture loader started");

        let preference = if config.codec_preference.is_empty() {
            Codec::PREFERENCE.to_vec()
        } else {
            config.codec_preference
        };
        Self {
            inner: Arc::new(Inner {
                queue: Some(queue),
                codecs,
                preference,
            }),
        }
    }

    /// A loader that never starts a load; every texture uniform keeps the
    /// renderer's default texture.
    pub fn disabled() -> Self {
        Self {
            inner: Arc::new(Inner {
                queue: None,
                codecs: Arc::new(CodecSet::none()),
                preference: Codec::PREFERENCE.to_vec(),
            }),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.queue.is_some()
    }

    pub fn codec_preference(&self) -> &[Codec] {
        &self.inner.preference
    }

    /// Picks the entry of `set` to load: the first codec in preference order
    /// that the GPU supports.
    pub fn select_codec<'a>(&self, set: &'a CompressedSet) -> Option<(Codec, &'a ImageLocation)> {
        let codecs = &self.inner.codecs;
        set.select(&self.inner.preference, |codec| codecs.supports(codec))
    }

    /// Queues `job`; `None` when loading is disabled.
    pub(crate) fn submit(
        &self,
        label: &str,
        generation: u64,
        job: Job,
    ) -> Option<Receiver<LoadOutcome>> {
        let queue = self.inner.queue.as_ref()?;
        let (reply, receiver) = bounded(1);
        let work = Work {
            label: label.to_string(),
            generation,
            job,
            reply,
        };
        if queue.send(work).is_err() {
            // the reply sender went down with the job, so the slot sees a
            // disconnected channel on its next poll
            warn!(texture = label, "texture loader has no running workers");
        }
        Some(receiver)
    }

    /// A reply channel that already holds `decoded`.
    pub(crate) fn completed(&self, generation: u64, decoded: DecodedTexture) -> Receiver<LoadOutcome> {
        let (reply, receiver) = bounded(1);
        let _ = reply.send(LoadOutcome {
            generation,
            result: Ok(decoded),
        });
        receiver
    }
}

fn worker_loop(jobs: Receiver<Work>, fetcher: Arc<dyn ResourceFetcher>) {
    for work in jobs.iter() {
        let result = run_job(fetcher.as_ref(), &work.job);
        match &result {
            Ok(decoded) => debug!(
                texture = %work.label,
                generation = work.generation,
                dimensions = ?decoded.dimensions(),
                "decoded texture"
            ),
            Err(err) => debug!(texture = %work.label, error = %err, "texture job failed"),
        }
        let outcome = LoadOutcome {
            generation: work.generation,
            result,
        };
        if work.reply.send(outcome).is_err() {
            debug!(texture = %work.label, "discarding texture result nobody is waiting for");
        }
    }
}

fn run_job(fetcher: &dyn ResourceFetcher, job: &Job) -> Result<DecodedTexture, TextureError> {
    match job {
        Job::Image(location) => match fetcher.fetch(location)? {
            FetchedResource::Bytes(bytes) => Ok(decode::decode_image(&bytes)?),
            FetchedResource::Image(image) => Ok(DecodedTexture::from_in_memory(&image)),
        },
        Job::Compressed(location, codec) => match fetcher.fetch(location)? {
            FetchedResource::Bytes(bytes) => Ok(decode::decode_compressed(&bytes, *codec)?),
            FetchedResource::Image(_) => Err(DecodeError::Unsupported(format!(
                "{location} resolved to raw pixels, expected a {codec} container"
            ))
            .into()),
        },
        Job::Cube(faces) => {
            let mut fetched = Vec::with_capacity(faces.len());
            for face in faces.iter() {
                fetched.push(fetcher.fetch(face)?);
            }
            Ok(decode::decode_cube(fetched)?)
        }
    }
}

//! Resource fetching for texture loads.
//!
//! `ResourceFetcher` is the seam between the loader's worker threads and
//! wherever image bytes live. `DefaultFetcher` covers local files (relative to
//! a base directory, with an optional `file://` prefix) and `http(s)` URLs
//! through a blocking `reqwest` client.
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use fabric::{ImageLocation, InMemoryImage};
use reqwest::blocking::Client;
use tracing::debug;

use crate::error::FetchError;

/// What a fetch produced: encoded bytes still to be decoded, or pixels that
/// are ready to upload.
#[derive(Debug, Clone)]
pub enum FetchedResource {
    Bytes(Vec<u8>),
    Image(InMemoryImage),
}

/// Called on loader worker threads.
pub trait ResourceFetcher: Send + Sync {
    fn fetch(&self, location: &ImageLocation) -> Result<FetchedResource, FetchError>;
}

impl<F> ResourceFetcher for F
where
    F: Fn(&ImageLocation) -> Result<FetchedResource, FetchError> + Send + Sync,
{
    fn fetch(&self, location: &ImageLocation) -> Result<FetchedResource, FetchError> {
        self(location)
    }
}

pub struct DefaultFetcher {
    base_dir: PathBuf,
    http: Client,
}

impl DefaultFetcher {
    pub fn new(base_dir: impl Into<PathBuf>, timeout: Duration) -> Result<Self, FetchError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("loom/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| FetchError::Http {
                url: String::new(),
                message: err.to_string(),
            })?;
        Ok(Self {
            base_dir: base_dir.into(),
            http,
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn resolve_path(&self, url: &str) -> PathBuf {
        let raw = url.strip_prefix("file://").unwrap_or(url);
        let path = Path::new(raw);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    fn fetch_remote(&self, location: &ImageLocation) -> Result<FetchedResource, FetchError> {
        let mut request = self.http.get(&location.url);
        for (name, value) in &location.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        let http_error = |err: reqwest::Error| FetchError::Http {
            url: location.url.clone(),
            message: err.to_string(),
        };
        let response = request.send().map_err(http_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: location.url.clone(),
                status: status.as_u16(),
            });
        }
        let bytes = response.bytes().map_err(http_error)?;
        debug!(url = %location.url, bytes = bytes.len(), "fetched remote texture");
        Ok(FetchedResource::Bytes(bytes.to_vec()))
    }
}

impl ResourceFetcher for DefaultFetcher {
    fn fetch(&self, location: &ImageLocation) -> Result<FetchedResource, FetchError> {
        if location.is_remote() {
            return self.fetch_remote(location);
        }
        if location.url.is_empty()
            || (location.url.contains("://") && !location.url.starts_with("file://"))
        {
            return Err(FetchError::Unsupported(location.url.clone()));
        }

        let path = self.resolve_path(&location.url);
        let bytes = fs::read(&path).map_err(|err| FetchError::Io {
            path: path.clone(),
            message: err.to_string(),
        })?;
        debug!(path = %path.display(), bytes = bytes.len(), "read texture from disk");
        Ok(FetchedResource::Bytes(bytes))
    }
}

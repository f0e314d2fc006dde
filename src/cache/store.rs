//! Persistent storage tiers for [`RequestCache`](super::RequestCache).
//!
//! Values are stored as opaque byte blobs, one object per cache key, named `<key>.dat`.
use anyhow::{Context, Result, bail, ensure};
use log::debug;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// The file extension given to stored objects
pub const FILE_EXTENSION: &str = "dat";

/// Environment variable holding a bearer token for cloud storage
pub const GCS_TOKEN_VAR: &str = "EIEIO_GCS_TOKEN";

/// Host for the cloud storage XML API
const GCS_HOST: &str = "https://storage.googleapis.com";

/// Timeout for remote requests
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// A key-value store for serialised cache entries
pub trait ObjectStore: Send + Sync {
    /// Retrieve the object stored under `key`, or `None` if there isn't one
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store `bytes` under `key`, replacing any existing object
    fn put(&self, key: &str, bytes: &[u8]) -> Result<()>;
}

/// Stores objects as files in a local directory
#[derive(Debug)]
pub struct DiskStore {
    dir: PathBuf,
}

impl DiskStore {
    /// Create a store in `dir`, creating the directory if needed
    pub fn new(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Could not create cache directory {}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.{FILE_EXTENSION}"))
    }
}

impl ObjectStore for DiskStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path(key);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("Could not read {}", path.display())),
        }
    }

    fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        // Write to a temporary file first so readers never see a partial object
        let path = self.path(key);
        let tmp = self.dir.join(format!("{key}.{FILE_EXTENSION}.tmp"));
        fs::write(&tmp, bytes).with_context(|| format!("Could not write {}", tmp.display()))?;
        fs::rename(&tmp, &path).with_context(|| format!("Could not write {}", path.display()))?;
        Ok(())
    }
}

fn new_client() -> Result<Client> {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .context("Could not create HTTP client")
}

/// Reads objects from a web server. Writes are ignored.
#[derive(Debug)]
pub struct HttpStore {
    base_url: String,
    client: Client,
}

impl HttpStore {
    /// Create a store reading from under `base_url`
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: new_client()?,
        })
    }

    /// The URL of the object for `key`
    pub fn object_url(&self, key: &str) -> String {
        format!("{}/{key}.{FILE_EXTENSION}", self.base_url)
    }
}

impl ObjectStore for HttpStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let url = self.object_url(key);
        let response = self
            .client
            .get(&url)
            .send()
            .with_context(|| format!("Request to {url} failed"))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        ensure!(
            response.status().is_success(),
            "Request to {url} failed with status {}",
            response.status()
        );
        Ok(Some(response.bytes()?.to_vec()))
    }

    fn put(&self, key: &str, _bytes: &[u8]) -> Result<()> {
        debug!("HTTP cache is read-only; not storing {key}");
        Ok(())
    }
}

/// Stores objects in a cloud storage bucket
#[derive(Debug)]
pub struct CloudStore {
    bucket: String,
    prefix: String,
    token: Option<String>,
    client: Client,
}

impl CloudStore {
    /// Create a store from a location of the form `gs://bucket/prefix`.
    ///
    /// If the `EIEIO_GCS_TOKEN` environment variable is set, it is sent as a bearer token.
    pub fn new(location: &str) -> Result<Self> {
        let url = reqwest::Url::parse(location)
            .with_context(|| format!("Invalid cloud storage location: {location}"))?;
        ensure!(
            url.scheme() == "gs",
            "Cloud storage location must start with gs://: {location}"
        );
        let Some(bucket) = url.host_str().filter(|b| !b.is_empty()) else {
            bail!("Cloud storage location has no bucket: {location}");
        };

        Ok(Self {
            bucket: bucket.to_string(),
            prefix: url.path().trim_matches('/').to_string(),
            token: std::env::var(GCS_TOKEN_VAR).ok(),
            client: new_client()?,
        })
    }

    /// The URL of the object for `key`
    pub fn object_url(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            format!("{GCS_HOST}/{}/{key}.{FILE_EXTENSION}", self.bucket)
        } else {
            format!(
                "{GCS_HOST}/{}/{}/{key}.{FILE_EXTENSION}",
                self.bucket, self.prefix
            )
        }
    }

    fn authorise(
        &self,
        request: reqwest::blocking::RequestBuilder,
    ) -> reqwest::blocking::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

impl ObjectStore for CloudStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let url = self.object_url(key);
        let response = self
            .authorise(self.client.get(&url))
            .send()
            .with_context(|| format!("Request to {url} failed"))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        ensure!(
            response.status().is_success(),
            "Request to {url} failed with status {}",
            response.status()
        );
        Ok(Some(response.bytes()?.to_vec()))
    }

    fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let url = self.object_url(key);
        let response = self
            .authorise(self.client.put(&url))
            .body(bytes.to_vec())
            .send()
            .with_context(|| format!("Upload to {url} failed"))?;
        ensure!(
            response.status().is_success(),
            "Upload to {url} failed with status {}",
            response.status()
        );
        Ok(())
    }
}

/// Choose a store based on the form of `location`.
///
/// * an empty string means no persistent storage
/// * `http://` or `https://` URLs are read-only web stores
/// * `gs://bucket/prefix` is a cloud storage bucket
/// * anything else is a local directory
pub fn store_from_location(location: &str) -> Result<Option<Arc<dyn ObjectStore>>> {
    if location.is_empty() {
        return Ok(None);
    }

    let store: Arc<dyn ObjectStore> =
        if location.starts_with("http://") || location.starts_with("https://") {
            Arc::new(HttpStore::new(location)?)
        } else if location.starts_with("gs://") {
            Arc::new(CloudStore::new(location)?)
        } else {
            Arc::new(DiskStore::new(Path::new(location))?)
        };

    Ok(Some(store))
}

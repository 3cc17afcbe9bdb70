//! Object storage backends + HTTP fetch utilities for the collector.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info_span, Instrument};
use uuid::Uuid;

#[cfg(feature = "s3")]
pub mod s3;

pub const CRATE_NAME: &str = "momo-storage";

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_CSV: &str = "text/csv";

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Receipt for a completed put.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    pub byte_size: usize,
    pub content_hash: String,
}

impl StoredObject {
    fn for_bytes(key: &str, bytes: &[u8]) -> Self {
        Self {
            key: key.to_string(),
            byte_size: bytes.len(),
            content_hash: sha256_hex(bytes),
        }
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid object key {0:?}")]
    InvalidKey(String),
    #[error("io error on {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("storage backend error on {key}: {message}")]
    Backend { key: String, message: String },
}

/// Key/value object store. `get` distinguishes a missing key (`Ok(None)`)
/// from a failed read. `put` replaces any existing object unconditionally.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    fn describe(&self) -> String;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredObject, StorageError>;
}

fn validate_key(key: &str) -> Result<(), StorageError> {
    let bad = key.is_empty()
        || key.starts_with('/')
        || key.ends_with('/')
        || key.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..");
    if bad {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Objects as files under a root directory; keys map to relative paths.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(key.split('/').fold(self.root.clone(), |path, seg| path.join(seg)))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    fn describe(&self) -> String {
        format!("fs:{}", self.root.display())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.path_for(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    /// Writes through a temp file in the target directory and renames it
    /// over the destination, so readers never observe a partial object.
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<StoredObject, StorageError> {
        let path = self.path_for(key)?;
        let io_err = |source| StorageError::Io {
            key: key.to_string(),
            source,
        };
        let parent = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        fs::create_dir_all(&parent).await.map_err(io_err)?;

        let temp_path = parent.join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));
        let written = async {
            let mut file = fs::OpenOptions::new()
                .create_new(true)
                .write(true)
                .open(&temp_path)
                .await?;
            file.write_all(&bytes).await?;
            file.flush().await?;
            drop(file);
            fs::rename(&temp_path, &path).await
        }
        .await;

        if let Err(err) = written {
            let _ = fs::remove_file(&temp_path).await;
            return Err(io_err(err));
        }

        let stored = StoredObject::for_bytes(key, &bytes);
        debug!(key, bytes = stored.byte_size, sha256 = %stored.content_hash, "stored object");
        Ok(stored)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// In-process store; also records how many puts it has served.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<String, MemoryObject>>,
    puts: Mutex<usize>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, key: &str, bytes: impl Into<Vec<u8>>, content_type: &str) {
        self.objects.lock().await.insert(
            key.to_string(),
            MemoryObject {
                bytes: bytes.into(),
                content_type: content_type.to_string(),
            },
        );
    }

    pub async fn object(&self, key: &str) -> Option<MemoryObject> {
        self.objects.lock().await.get(key).cloned()
    }

    pub async fn text(&self, key: &str) -> Option<String> {
        self.object(key)
            .await
            .map(|o| String::from_utf8_lossy(&o.bytes).into_owned())
    }

    pub async fn keys(&self) -> Vec<String> {
        self.objects.lock().await.keys().cloned().collect()
    }

    pub async fn put_count(&self) -> usize {
        *self.puts.lock().await
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    fn describe(&self) -> String {
        "memory".to_string()
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        validate_key(key)?;
        Ok(self.objects.lock().await.get(key).map(|o| o.bytes.clone()))
    }

    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredObject, StorageError> {
        validate_key(key)?;
        let stored = StoredObject::for_bytes(key, &bytes);
        self.insert(key, bytes, content_type).await;
        *self.puts.lock().await += 1;
        Ok(stored)
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("http status {status} for {url}: {body}")]
    HttpStatus { status: u16, url: String, body: String },
    #[error("decoding response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

const ERROR_BODY_LIMIT: usize = 512;

/// Thin JSON GET client. One attempt per call; callers decide what a
/// failure means.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        Ok(Self { client })
    }

    /// GETs `url` with `query` and decodes the body as JSON. Query values
    /// may hold credentials, so only `url` appears in errors and spans.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, FetchError> {
        let span = info_span!("http_fetch", url);
        async {
            let resp = self
                .client
                .get(url)
                .query(query)
                .send()
                .await
                .map_err(request_error)?;
            let status = resp.status();
            let body = resp.bytes().await.map_err(request_error)?;

            if !status.is_success() {
                return Err(status_error(status, url, &body));
            }

            serde_json::from_slice(&body).map_err(|source| FetchError::Decode {
                url: url.to_string(),
                source,
            })
        }
        .instrument(span)
        .await
    }
}

/// reqwest renders the full request URL, query string included.
fn request_error(err: reqwest::Error) -> FetchError {
    FetchError::Request(err.without_url())
}

fn status_error(status: StatusCode, url: &str, body: &[u8]) -> FetchError {
    let text = String::from_utf8_lossy(body);
    let body = text.chars().take(ERROR_BODY_LIMIT).collect::<String>();
    FetchError::HttpStatus {
        status: status.as_u16(),
        url: url.to_string(),
        body,
    }
}

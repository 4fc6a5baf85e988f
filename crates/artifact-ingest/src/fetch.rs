//! # Fetching Source Files
//!
//! A [`Fetcher`] downloads a file from its source URL into a scoped temp
//! file while hashing it, and can probe a URL for its declared media type
//! without fetching the body.
//!
//! The temp file is owned by the returned [`FetchedFile`] and removed when
//! it is dropped, on every exit path including errors and cancellation.

use std::path::{Path, PathBuf};

use artifact_core::{Digest, DigestBuilder, MediaType};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::error::IngestError;
use crate::retry::RetryPolicy;

/// A downloaded file, hashed while it was written.
#[derive(Debug)]
pub struct FetchedFile {
    file: NamedTempFile,
    pub digest: Digest,
    /// Media type declared by the origin server, if any.
    pub media_type: Option<MediaType>,
    pub len: u64,
}

impl FetchedFile {
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// Retrieves files from their source locations.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Download `url`, hashing the body with `hasher`.
    async fn fetch(&self, url: &Url, hasher: DigestBuilder) -> Result<FetchedFile, IngestError>;

    /// The media type `url` declares, without downloading the body.
    async fn head(&self, url: &Url) -> Result<Option<MediaType>, IngestError>;
}

/// A [`Fetcher`] over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    retry: RetryPolicy,
    temp_dir: Option<PathBuf>,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            retry: RetryPolicy::default(),
            temp_dir: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Put downloads in `dir` instead of the system temp directory.
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    fn temp_file(&self) -> std::io::Result<NamedTempFile> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("artifact-submit-");
        match &self.temp_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
    }
}

/// The media type from a `Content-Type` header, ignoring values that are
/// not a registered top-level type.
fn declared_media_type(response: &reqwest::Response) -> Option<MediaType> {
    let header = response.headers().get(CONTENT_TYPE)?.to_str().ok()?;
    match MediaType::from_content_type(header) {
        Ok(media_type) => Some(media_type),
        Err(e) => {
            tracing::debug!(url = %response.url(), "Ignoring Content-Type: {e}");
            None
        }
    }
}

fn check_status(
    method: &'static str,
    url: &Url,
    response: &reqwest::Response,
) -> Result<(), IngestError> {
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(IngestError::HttpStatus {
            method,
            url: url.to_string(),
            status: status.as_u16(),
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(
        &self,
        url: &Url,
        mut hasher: DigestBuilder,
    ) -> Result<FetchedFile, IngestError> {
        let network = |e: reqwest::Error| IngestError::Network {
            url: url.to_string(),
            source: e,
        };

        tracing::info!("GET {url}");
        let mut response = self
            .retry
            .send(&format!("GET {url}"), || self.client.get(url.clone()).send())
            .await
            .map_err(network)?;
        check_status("GET", url, &response)?;
        let media_type = declared_media_type(&response);

        let file = self
            .temp_file()
            .map_err(|e| IngestError::io("creating a temp file for a download", e))?;
        let handle = file
            .as_file()
            .try_clone()
            .map_err(|e| IngestError::io("opening a temp file for a download", e))?;
        let mut out = tokio::fs::File::from_std(handle);

        let mut len = 0u64;
        while let Some(chunk) = response.chunk().await.map_err(network)? {
            hasher.update(&chunk);
            out.write_all(&chunk)
                .await
                .map_err(|e| IngestError::io(format!("writing download of {url}"), e))?;
            len += chunk.len() as u64;
        }
        out.flush()
            .await
            .map_err(|e| IngestError::io(format!("writing download of {url}"), e))?;

        tracing::debug!(%url, bytes = len, "Downloaded file");
        Ok(FetchedFile {
            file,
            digest: hasher.finish(),
            media_type,
            len,
        })
    }

    async fn head(&self, url: &Url) -> Result<Option<MediaType>, IngestError> {
        tracing::info!("HEAD {url}");
        let response = self
            .retry
            .send(&format!("HEAD {url}"), || self.client.head(url.clone()).send())
            .await
            .map_err(|e| IngestError::Network {
                url: url.to_string(),
                source: e,
            })?;
        check_status("HEAD", url, &response)?;
        Ok(declared_media_type(&response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use artifact_core::AlgorithmRegistry;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn fetch_hashes_body_and_captures_media_type() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flyer.pdf"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Type", "application/pdf")
                    .set_body_bytes(b"abc".to_vec()),
            )
            .expect(1)
            .mount(&server)
            .await;

        let registry = AlgorithmRegistry::builtin();
        let fetcher = HttpFetcher::new(reqwest::Client::new());
        let url = Url::parse(&format!("{}/flyer.pdf", server.uri())).unwrap();
        let fetched = fetcher.fetch(&url, registry.default_builder()).await.unwrap();

        assert_eq!(
            fetched.digest.hash_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(fetched.media_type.as_ref().map(MediaType::as_str), Some("application/pdf"));
        assert_eq!(fetched.len, 3);
        assert_eq!(std::fs::read(fetched.path()).unwrap(), b"abc");
    }

    #[tokio::test]
    async fn temp_file_is_removed_on_drop() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"x".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let fetcher = HttpFetcher::new(reqwest::Client::new()).with_temp_dir(dir.path());
        let url = Url::parse(&server.uri()).unwrap();
        let fetched = fetcher
            .fetch(&url, AlgorithmRegistry::builtin().default_builder())
            .await
            .unwrap();
        let path = fetched.path().to_path_buf();
        assert!(path.exists());
        drop(fetched);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(reqwest::Client::new());
        let url = Url::parse(&server.uri()).unwrap();
        let err = fetcher
            .fetch(&url, AlgorithmRegistry::builtin().default_builder())
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::HttpStatus { status: 404, .. }));
    }

    #[tokio::test]
    async fn head_reads_content_type_only() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/scan.png"))
            .respond_with(ResponseTemplate::new(200).insert_header("Content-Type", "image/png"))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(reqwest::Client::new());
        let url = Url::parse(&format!("{}/scan.png", server.uri())).unwrap();
        let media_type = fetcher.head(&url).await.unwrap();
        assert_eq!(media_type.map(String::from).as_deref(), Some("image/png"));
    }
}

//! Remote blacklist sources. The updater only ever talks to the
//! [`RemoteSource`] trait, so transports (and test doubles) are swappable.

use std::path::PathBuf;

use reqwest::Client;
use thiserror::Error;
use tracing::debug;
use url::Url;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid source URL {url}: {source}")]
    BadUrl {
        url: String,
        source: url::ParseError,
    },
    #[error("fetching {name}: {source}")]
    Http {
        name: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("fetching {name}: unexpected status {status}")]
    Status {
        name: String,
        status: reqwest::StatusCode,
    },
    #[error("reading {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Fetches a named file from a remote blacklist mirror. The same interface
/// serves the index, the version marker and individual rule files.
#[async_trait::async_trait]
pub trait RemoteSource: Send + Sync {
    async fn fetch(&self, name: &str) -> Result<Vec<u8>, FetchError>;
}

/// HTTP(S) mirror. Files are addressed as `<base>/<name>`.
pub struct HttpSource {
    client: Client,
    base: String,
}

impl HttpSource {
    pub fn new(base: &str, user_agent: &str) -> Result<Self, FetchError> {
        // Validate once up front so every later fetch failure is a real
        // transport problem, not a typo in the config.
        Url::parse(base).map_err(|e| FetchError::BadUrl {
            url: base.to_string(),
            source: e,
        })?;

        let client = Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| FetchError::Http {
                name: base.to_string(),
                source: e,
            })?;

        Ok(Self {
            client,
            base: base.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait::async_trait]
impl RemoteSource for HttpSource {
    async fn fetch(&self, name: &str) -> Result<Vec<u8>, FetchError> {
        let url = format!("{}/{}", self.base, name);
        debug!(%url, "fetching");

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::Http {
                name: name.to_string(),
                source: e,
            })?;

        if !resp.status().is_success() {
            return Err(FetchError::Status {
                name: name.to_string(),
                status: resp.status(),
            });
        }

        let bytes = resp.bytes().await.map_err(|e| FetchError::Http {
            name: name.to_string(),
            source: e,
        })?;
        Ok(bytes.to_vec())
    }
}

/// Local directory mirror, mainly for file-based distribution and tests.
pub struct DirSource {
    base: PathBuf,
}

impl DirSource {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }
}

#[async_trait::async_trait]
impl RemoteSource for DirSource {
    async fn fetch(&self, name: &str) -> Result<Vec<u8>, FetchError> {
        let path = self.base.join(name);
        debug!(path = %path.display(), "reading");
        tokio::fs::read(&path).await.map_err(|e| FetchError::Io {
            name: name.to_string(),
            source: e,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_source_rejects_bad_base_url() {
        assert!(matches!(
            HttpSource::new("not a url", "test/0"),
            Err(FetchError::BadUrl { .. })
        ));
    }

    #[tokio::test]
    async fn dir_source_reads_and_reports_missing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("version"), b"v1\n").unwrap();

        let source = DirSource::new(dir.path());
        assert_eq!(source.fetch("version").await.unwrap(), b"v1\n");
        assert!(matches!(
            source.fetch("missing").await,
            Err(FetchError::Io { .. })
        ));
    }
}

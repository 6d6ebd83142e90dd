use async_trait::async_trait;
use bt_types::{BtResult, DataError};
use std::path::{Path, PathBuf};

/// Source of a raw dataset file (local copy, HTTP download, ...)
#[async_trait]
pub trait DatasetProvider: Send + Sync + std::fmt::Debug {
    /// Make the dataset available on local disk and return its path.
    ///
    /// `target` is where the manager expects the file; providers that
    /// already hold a local copy elsewhere may return that path instead.
    async fn ensure_local(&self, target: &Path) -> BtResult<PathBuf>;

    /// Get provider name
    fn name(&self) -> &str;
}

/// Serves a file that already exists on disk
#[derive(Debug, Clone)]
pub struct LocalFileProvider {
    pub path: PathBuf,
}

impl LocalFileProvider {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl DatasetProvider for LocalFileProvider {
    async fn ensure_local(&self, _target: &Path) -> BtResult<PathBuf> {
        if self.path.exists() {
            Ok(self.path.clone())
        } else {
            Err(DataError::SourceNotFound(self.path.display().to_string()).into())
        }
    }

    fn name(&self) -> &str {
        "local"
    }
}

/// Downloads the dataset once and reuses the local copy afterwards
#[derive(Debug, Clone)]
pub struct HttpDatasetProvider {
    pub url: String,
    client: reqwest::Client,
}

impl HttpDatasetProvider {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            client: reqwest::Client::new(),
        }
    }

    async fn download(&self) -> BtResult<Vec<u8>> {
        let fetch_failed = |message: String| DataError::FetchFailed {
            url: self.url.clone(),
            message,
        };

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| fetch_failed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(fetch_failed(format!("HTTP status {}", response.status())).into());
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| fetch_failed(e.to_string()))?;

        if body.is_empty() {
            return Err(fetch_failed("empty response body".to_string()).into());
        }
        Ok(body.to_vec())
    }
}

#[async_trait]
impl DatasetProvider for HttpDatasetProvider {
    async fn ensure_local(&self, target: &Path) -> BtResult<PathBuf> {
        if target.exists() {
            tracing::debug!("Using local copy {}", target.display());
            return Ok(target.to_path_buf());
        }

        tracing::info!("Fetching {} -> {}", self.url, target.display());
        let body = self.download().await?;

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        // Write next to the target and rename so a partial download never
        // looks like a cached file.
        let partial = target.with_extension("partial");
        tokio::fs::write(&partial, &body).await?;
        tokio::fs::rename(&partial, target).await?;

        tracing::info!("Stored {} bytes at {}", body.len(), target.display());
        Ok(target.to_path_buf())
    }

    fn name(&self) -> &str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bt_types::BtError;

    #[tokio::test]
    async fn http_provider_skips_fetch_when_file_present() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("german.data");
        std::fs::write(&target, "cached").unwrap();

        // Unroutable URL: any fetch attempt would fail.
        let provider = HttpDatasetProvider::new("http://127.0.0.1:1/german.data");
        let path = provider.ensure_local(&target).await.unwrap();

        assert_eq!(path, target);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "cached");
    }

    #[tokio::test]
    async fn http_provider_reports_fetch_failure() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("german.data");

        let provider = HttpDatasetProvider::new("http://127.0.0.1:1/german.data");
        let err = provider.ensure_local(&target).await.unwrap_err();

        assert!(matches!(err, BtError::Data(DataError::FetchFailed { .. })));
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn local_provider_requires_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let provider = LocalFileProvider::new(dir.path().join("missing.data"));
        assert!(provider.ensure_local(dir.path()).await.is_err());
    }
}

//! Module map fetchers.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::{RegistryError, RegistryResult};
use crate::manifest::ModuleMap;

/// Source of module map snapshots, invoked once per poll attempt.
#[async_trait]
pub trait ManifestFetcher: Send + Sync {
    /// Fetch and parse the current module map.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Fetch`] if the map cannot be retrieved and
    /// [`RegistryError::ManifestParse`] if it does not match the schema.
    async fn fetch(&self) -> RegistryResult<ModuleMap>;
}

/// Reads the module map from a local JSON file.
#[derive(Debug, Clone)]
pub struct FileManifestFetcher {
    path: PathBuf,
}

impl FileManifestFetcher {
    /// Create a fetcher for the module map at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the module map file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ManifestFetcher for FileManifestFetcher {
    async fn fetch(&self) -> RegistryResult<ModuleMap> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| RegistryError::Fetch(format!("{}: {e}", self.path.display())))?;
        ModuleMap::from_slice(&bytes)
    }
}

#[cfg(feature = "http")]
pub use http::HttpManifestFetcher;

#[cfg(feature = "http")]
mod http {
    use std::fmt::Display;
    use std::time::Duration;

    use async_trait::async_trait;
    use futures::{Stream, StreamExt};

    use super::ManifestFetcher;
    use crate::error::{RegistryError, RegistryResult};
    use crate::manifest::ModuleMap;

    /// Largest module map accepted by default, in bytes.
    const MAX_MANIFEST_SIZE: u64 = 16_777_216;

    /// Fetches the module map over HTTP.
    #[derive(Debug, Clone)]
    pub struct HttpManifestFetcher {
        client: reqwest::Client,
        url: String,
        max_size: u64,
    }

    impl HttpManifestFetcher {
        /// Create a fetcher for `url` with a 30 second request timeout.
        ///
        /// # Errors
        ///
        /// Returns [`RegistryError::Fetch`] if the HTTP client cannot be built.
        pub fn new(url: impl Into<String>) -> RegistryResult<Self> {
            let client = reqwest::Client::builder()
                .user_agent(concat!("modsync/", env!("CARGO_PKG_VERSION")))
                .timeout(Duration::from_secs(30))
                .build()
                .map_err(|e| RegistryError::Fetch(format!("failed to create HTTP client: {e}")))?;
            Ok(Self::with_client(client, url))
        }

        /// Create a fetcher that uses an existing client.
        pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
            Self {
                client,
                url: url.into(),
                max_size: MAX_MANIFEST_SIZE,
            }
        }

        /// Reject module maps larger than `max_size` bytes. Defaults to 16 MiB.
        #[must_use]
        pub fn with_max_size(mut self, max_size: u64) -> Self {
            self.max_size = max_size;
            self
        }

        /// The module map URL.
        #[must_use]
        pub fn url(&self) -> &str {
            &self.url
        }
    }

    #[async_trait]
    impl ManifestFetcher for HttpManifestFetcher {
        async fn fetch(&self) -> RegistryResult<ModuleMap> {
            tracing::debug!(url = %self.url, "Fetching module map");

            let response = self
                .client
                .get(&self.url)
                .send()
                .await
                .map_err(|e| RegistryError::Fetch(format!("{}: {e}", self.url)))?;

            if !response.status().is_success() {
                return Err(RegistryError::Fetch(format!(
                    "{} returned {}",
                    self.url,
                    response.status()
                )));
            }

            let declared = response.content_length();
            if let Some(len) = declared
                && len > self.max_size
            {
                return Err(too_large(len, self.max_size));
            }

            let bytes = read_with_limit(response.bytes_stream(), declared, self.max_size).await?;
            ModuleMap::from_slice(&bytes)
        }
    }

    /// Collect a response body, failing as soon as it grows past `max_size`.
    ///
    /// Chunked responses carry no length up front, so the limit is enforced
    /// on the bytes actually received.
    async fn read_with_limit<S, B, E>(
        body: S,
        declared: Option<u64>,
        max_size: u64,
    ) -> RegistryResult<Vec<u8>>
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        E: Display,
    {
        let capacity = usize::try_from(declared.unwrap_or(0).min(max_size)).unwrap_or(0);
        let mut bytes = Vec::with_capacity(capacity);
        let mut body = std::pin::pin!(body);

        while let Some(chunk) = body.next().await {
            let chunk =
                chunk.map_err(|e| RegistryError::Fetch(format!("module map download failed: {e}")))?;
            bytes.extend_from_slice(chunk.as_ref());
            let received = u64::try_from(bytes.len()).unwrap_or(u64::MAX);
            if received > max_size {
                return Err(too_large(received, max_size));
            }
        }

        Ok(bytes)
    }

    fn too_large(size: u64, limit: u64) -> RegistryError {
        RegistryError::Fetch(format!("module map is {size} bytes, limit is {limit}"))
    }

}

use std::time::Duration;

use async_trait::async_trait;
use shared_types::{NetworkTreeEntry, NETWORK_TREE_PATH};
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("invalid snapshot URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("snapshot request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Where the projector gets its full topology snapshot from
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<NetworkTreeEntry>, SnapshotError>;
}

/// Polls the daemon's `networkTree` endpoint over HTTP
pub struct HttpSnapshotSource {
    client: reqwest::Client,
    url: Url,
}

impl HttpSnapshotSource {
    /// Resolve the endpoint against the dashboard page URL.
    pub fn new(page_url: &str) -> Result<Self, SnapshotError> {
        let url = Url::parse(page_url)?.join(NETWORK_TREE_PATH)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client, url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl SnapshotSource for HttpSnapshotSource {
    async fn fetch(&self) -> Result<Vec<NetworkTreeEntry>, SnapshotError> {
        let nodes = self
            .client
            .get(self.url.clone())
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<NetworkTreeEntry>>()
            .await?;
        tracing::trace!(nodes = nodes.len(), "Fetched network tree snapshot");
        Ok(nodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_is_resolved_from_page_root() {
        let source = HttpSnapshotSource::new("http://10.0.0.1:9123/some/page#anchor").unwrap();
        assert_eq!(source.url().as_str(), "http://10.0.0.1:9123/local-api/networkTree");
    }

    #[test]
    fn test_bad_page_url() {
        assert!(matches!(
            HttpSnapshotSource::new("::nope"),
            Err(SnapshotError::InvalidUrl(_))
        ));
    }
}

use crate::{BeaconClient, BeaconClientError};
use blob_archiver_beacon_types::{BlobSidecar, BlockHeader, BlockId};
use reqwest::{header::ACCEPT, Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use std::time::Duration;
use tracing::trace;
use url::Url;

/// Envelope of every beacon node REST response.
#[derive(Debug, Deserialize)]
struct DataResponse<T> {
    data: T,
}

/// [`BeaconClient`] talking to the standard beacon node REST API.
#[derive(Debug, Clone)]
pub struct HttpBeaconClient {
    client: Client,
    base_url: Url,
}

impl HttpBeaconClient {
    /// Creates a client for the beacon node at `base_url`, failing requests after `timeout`.
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, BeaconClientError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    /// Creates a client reusing an existing [`Client`].
    pub const fn with_client(client: Client, base_url: Url) -> Self {
        Self { client, base_url }
    }

    /// Builds the URL of `path` below the base URL, keeping any path prefix of the base.
    fn endpoint(&self, path: &str) -> Result<Url, BeaconClientError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}/{path}"))?)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: String,
        id: BlockId,
    ) -> Result<T, BeaconClientError> {
        let url = self.endpoint(&path)?;
        trace!(target: "beacon::http", %url, "GET");

        let response = self.client.get(url).header(ACCEPT, "application/json").send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(BeaconClientError::NotFound(id))
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BeaconClientError::Status { status: status.as_u16(), body })
        }

        let body = response.bytes().await?;
        let envelope: DataResponse<T> = serde_json::from_slice(&body)?;
        Ok(envelope.data)
    }
}

impl BeaconClient for HttpBeaconClient {
    async fn beacon_block_header(&self, id: BlockId) -> Result<BlockHeader, BeaconClientError> {
        self.get(format!("eth/v1/beacon/headers/{id}"), id).await
    }

    async fn blob_sidecars(&self, id: BlockId) -> Result<Vec<BlobSidecar>, BeaconClientError> {
        self.get(format!("eth/v1/beacon/blob_sidecars/{id}"), id).await
    }
}

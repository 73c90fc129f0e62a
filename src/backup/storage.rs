use std::path::Path;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE};
use serde::Deserialize;

use super::credentials::ServiceAccountKey;
use crate::error::UploadError;

pub const GCS_ENDPOINT: &str = "https://storage.googleapis.com";

const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Remote object storage that accepts one write-once object per call.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stream the file at `path` into a new object called `name`.
    /// Returns the number of bytes stored.
    async fn upload(&self, name: &str, path: &Path) -> Result<u64, UploadError>;
}

/// Where the bearer token for Cloud Storage comes from.
#[derive(Debug, Clone)]
pub enum TokenSource {
    Static(String),
    /// A service-account JSON key, exchanged for a token per upload.
    ServiceAccount(ServiceAccountKey),
    /// The GCE metadata server of the instance the bot runs on.
    Metadata,
}

impl TokenSource {
    /// A configured access token wins, then a key file, then the metadata
    /// server. The key file is loaded here so a bad key fails at startup.
    pub fn resolve(
        access_token: Option<&str>,
        credentials: Option<&Path>,
    ) -> Result<Self, UploadError> {
        if let Some(token) = access_token {
            return Ok(TokenSource::Static(token.to_string()));
        }
        match credentials {
            Some(path) => Ok(TokenSource::ServiceAccount(ServiceAccountKey::from_file(
                path,
            )?)),
            None => Ok(TokenSource::Metadata),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            TokenSource::Static(_) => "static access token".to_string(),
            TokenSource::ServiceAccount(key) => format!("service account {}", key.client_email()),
            TokenSource::Metadata => "metadata server".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct MetadataToken {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct ObjectResource {
    #[serde(default)]
    size: Option<String>,
}

/// Google Cloud Storage client using the JSON API media upload.
#[derive(Debug, Clone)]
pub struct GcsStore {
    bucket: String,
    endpoint: String,
    token: TokenSource,
    client: reqwest::Client,
}

impl GcsStore {
    pub fn new(bucket: impl Into<String>, token: TokenSource) -> Self {
        Self {
            bucket: bucket.into(),
            endpoint: GCS_ENDPOINT.to_string(),
            token,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    fn upload_url(&self, name: &str) -> Result<reqwest::Url, UploadError> {
        let mut url = reqwest::Url::parse(&format!(
            "{}/upload/storage/v1/b/{}/o",
            self.endpoint, self.bucket
        ))
        .map_err(|e| UploadError::Token(format!("invalid storage endpoint: {e}")))?;
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", name);
        Ok(url)
    }

    async fn access_token(&self) -> Result<String, UploadError> {
        match &self.token {
            TokenSource::Static(token) => Ok(token.clone()),
            TokenSource::ServiceAccount(key) => key.fetch_token(&self.client).await,
            TokenSource::Metadata => {
                let resp = self
                    .client
                    .get(METADATA_TOKEN_URL)
                    .header("Metadata-Flavor", "Google")
                    .send()
                    .await
                    .map_err(|e| UploadError::Token(e.to_string()))?;
                if !resp.status().is_success() {
                    return Err(UploadError::Token(format!(
                        "metadata server returned HTTP {}",
                        resp.status()
                    )));
                }
                let body = resp
                    .bytes()
                    .await
                    .map_err(|e| UploadError::Token(e.to_string()))?;
                let token: MetadataToken = serde_json::from_slice(&body)
                    .map_err(|e| UploadError::Token(e.to_string()))?;
                Ok(token.access_token)
            }
        }
    }
}

#[async_trait]
impl ObjectStore for GcsStore {
    async fn upload(&self, name: &str, path: &Path) -> Result<u64, UploadError> {
        let file = tokio::fs::File::open(path).await?;
        let len = file.metadata().await?.len();
        let url = self.upload_url(name)?;
        let token = self.access_token().await?;

        tracing::info!(bucket = %self.bucket, object = name, bytes = len, "uploading archive");
        let resp = self
            .client
            .post(url)
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(CONTENT_LENGTH, len)
            .body(reqwest::Body::from(file))
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(UploadError::Status { status, body });
        }

        let stored = serde_json::from_str::<ObjectResource>(&body)
            .ok()
            .and_then(|o| o.size)
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(len);
        Ok(stored)
    }
}

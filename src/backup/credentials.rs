//! Service-account key files, exchanged for Cloud Storage access tokens
//! through the OAuth 2.0 JWT bearer grant.

use std::fmt;
use std::fs;
use std::path::Path;

use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};

use crate::error::UploadError;

const STORAGE_SCOPE: &str = "https://www.googleapis.com/auth/devstorage.read_write";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
/// Google rejects assertions that live longer than one hour.
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// The fields of a downloaded JSON key that the grant needs.
#[derive(Deserialize)]
struct KeyFile {
    #[serde(rename = "type")]
    kind: String,
    client_email: String,
    private_key: String,
    #[serde(default)]
    token_uri: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    iss: String,
    scope: String,
    aud: String,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Clone)]
pub struct ServiceAccountKey {
    client_email: String,
    token_uri: String,
    key: EncodingKey,
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

impl ServiceAccountKey {
    /// Load and check a key file, e.g. the one named by
    /// `GOOGLE_APPLICATION_CREDENTIALS`.
    pub fn from_file(path: &Path) -> Result<Self, UploadError> {
        let content = fs::read_to_string(path)
            .map_err(|e| UploadError::Token(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self, UploadError> {
        let file: KeyFile = serde_json::from_str(json)
            .map_err(|e| UploadError::Token(format!("invalid service account key: {e}")))?;
        if file.kind != "service_account" {
            return Err(UploadError::Token(format!(
                "unsupported credential type {:?}",
                file.kind
            )));
        }
        let key = EncodingKey::from_rsa_pem(file.private_key.as_bytes())
            .map_err(|e| UploadError::Token(format!("invalid private key: {e}")))?;
        Ok(Self {
            client_email: file.client_email,
            token_uri: file
                .token_uri
                .filter(|u| !u.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string()),
            key,
        })
    }

    pub fn client_email(&self) -> &str {
        &self.client_email
    }

    /// Signed RS256 assertion asking for the storage scope, issued at `now`.
    fn assertion(&self, now: i64) -> Result<String, UploadError> {
        let claims = Claims {
            iss: self.client_email.clone(),
            scope: STORAGE_SCOPE.to_string(),
            aud: self.token_uri.clone(),
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.key)
            .map_err(|e| UploadError::Token(format!("cannot sign assertion: {e}")))
    }

    /// Trade a fresh assertion for an access token at the key's token URI.
    pub async fn fetch_token(&self, client: &reqwest::Client) -> Result<String, UploadError> {
        let assertion = self.assertion(Utc::now().timestamp())?;
        let resp = client
            .post(&self.token_uri)
            .form(&[
                ("grant_type", JWT_BEARER_GRANT),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .map_err(|e| UploadError::Token(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| UploadError::Token(e.to_string()))?;
        if !status.is_success() {
            return Err(UploadError::Token(format!(
                "token endpoint returned HTTP {status}: {body}"
            )));
        }
        let token: TokenResponse =
            serde_json::from_str(&body).map_err(|e| UploadError::Token(e.to_string()))?;
        tracing::debug!(account = %self.client_email, "service account token issued");
        Ok(token.access_token)
    }
}

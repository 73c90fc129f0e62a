use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::StatusError;

/// Layout of the Unix `date` command, always rendered in UTC.
const UNIX_DATE_FORMAT: &str = "%a %b %e %H:%M:%S UTC %Y";

/// Subset of the monitored service's `/debug/vars` payload.
#[derive(Debug, Deserialize)]
struct DebugVars {
    #[serde(rename = "crawler/lastfetchtime")]
    last_fetch_time: i64,
}

/// Reads the liveness signal exposed by the monitored service.
#[derive(Debug, Clone)]
pub struct StatusClient {
    address: String,
    client: reqwest::Client,
}

impl StatusClient {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}/debug/vars", self.address)
    }

    /// Fetch `/debug/vars` once and describe the last successful fetch.
    pub async fn get_status(&self) -> Result<String, StatusError> {
        let resp = self.client.get(self.url()).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(StatusError::Http(status));
        }
        let body = resp.bytes().await?;
        let vars: DebugVars = serde_json::from_slice(&body)?;
        tracing::debug!(last_fetch_time = vars.last_fetch_time, "status fetched");
        Ok(format!(
            "Last update time: {}",
            format_timestamp(vars.last_fetch_time)?
        ))
    }
}

pub fn format_timestamp(secs: i64) -> Result<String, StatusError> {
    let time = DateTime::<Utc>::from_timestamp(secs, 0).ok_or(StatusError::Timestamp(secs))?;
    Ok(time.format(UNIX_DATE_FORMAT).to_string())
}

use crate::core::config::ArrServiceConfig;
use crate::core::error::ClientError;
use regex::Regex;
use serde::Deserialize;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

static API_KEY_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<ApiKey>([^<]+)</ApiKey>").expect("API key pattern is valid"));

/// Which upstream job-queue service a client talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrKind {
    /// Movies
    Radarr,
    /// Series
    Sonarr,
}

impl ArrKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ArrKind::Radarr => "radarr",
            ArrKind::Sonarr => "sonarr",
        }
    }

    fn search_command(self, job_id: u64) -> serde_json::Value {
        match self {
            ArrKind::Radarr => serde_json::json!({ "name": "MoviesSearch", "movieIds": [job_id] }),
            ArrKind::Sonarr => serde_json::json!({ "name": "SeriesSearch", "seriesId": job_id }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct QueuePage {
    #[serde(default)]
    records: Vec<QueueRecord>,
}

/// One queued download as listed by the job-queue service
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueRecord {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub movie_id: Option<u64>,
    #[serde(default)]
    pub series_id: Option<u64>,
}

impl QueueRecord {
    pub fn job_id(&self, kind: ArrKind) -> Option<u64> {
        match kind {
            ArrKind::Radarr => self.movie_id,
            ArrKind::Sonarr => self.series_id,
        }
    }

    /// Case-sensitive containment in either direction
    pub fn matches(&self, transfer_name: &str) -> bool {
        !self.title.is_empty()
            && (transfer_name.contains(&self.title) || self.title.contains(transfer_name))
    }
}

/// First queue record whose title matches the transfer name
pub fn find_match<'a>(records: &'a [QueueRecord], transfer_name: &str) -> Option<&'a QueueRecord> {
    records.iter().find(|record| record.matches(transfer_name))
}

/// Pull the API key out of a service's XML config file
pub fn read_api_key(path: &Path) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    API_KEY_PATTERN
        .captures(&content)
        .map(|caps| caps[1].trim().to_string())
        .filter(|key| !key.is_empty())
}

/// Minimal client for a Radarr/Sonarr v3 API
pub struct ArrClient {
    client: reqwest::Client,
    kind: ArrKind,
    base_url: String,
    api_key: String,
    page_size: u32,
}

impl ArrClient {
    pub fn new(
        kind: ArrKind,
        config: &ArrServiceConfig,
        api_key: String,
        page_size: u32,
        timeout_secs: u64,
    ) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            client,
            kind,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key,
            page_size,
        })
    }

    pub fn kind(&self) -> ArrKind {
        self.kind
    }

    pub async fn queue(&self) -> Result<Vec<QueueRecord>, ClientError> {
        let endpoint = "queue";
        let response = self
            .client
            .get(format!("{}/api/v3/{}", self.base_url, endpoint))
            .header("X-Api-Key", &self.api_key)
            .query(&[("pageSize", self.page_size)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ClientError::Status {
                endpoint: format!("{} {}", self.kind.as_str(), endpoint),
                status: response.status(),
            });
        }

        let page: QueuePage = response
            .json()
            .await
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))?;

        Ok(page.records)
    }

    /// Ask the service to search again for the given movie/series id
    pub async fn search(&self, job_id: u64) -> Result<(), ClientError> {
        let endpoint = "command";
        let response = self
            .client
            .post(format!("{}/api/v3/{}", self.base_url, endpoint))
            .header("X-Api-Key", &self.api_key)
            .json(&self.kind.search_command(job_id))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ClientError::Status {
                endpoint: format!("{} {}", self.kind.as_str(), endpoint),
                status: response.status(),
            });
        }

        Ok(())
    }
}

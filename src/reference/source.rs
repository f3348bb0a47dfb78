//! Where raw classroom finder pages come from.

use anyhow::Context;
use async_trait::async_trait;
use std::time::Duration;
use tracing::trace;

/// Default page listing every classroom.
pub const DEFAULT_SOURCE_URL: &str =
    "https://semmelweis.hu/registrar/information/classroom-finder/";

/// A transport-level failure fetching the reference page.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request to {url} failed")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} responded with status {status}")]
    Status { url: String, status: u16 },
}

/// Produces the raw reference page body.
#[async_trait]
pub trait ReferenceSource: Send + Sync {
    /// Fetch the page once, without retrying.
    async fn fetch(&self) -> Result<String, FetchError>;

    /// Human-readable origin used in logs.
    fn describe(&self) -> &str;
}

/// Fetches the reference page over HTTP.
pub struct HttpSource {
    http: reqwest::Client,
    url: String,
}

impl HttpSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("classcal/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build reqwest client")?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }
}

#[async_trait]
impl ReferenceSource for HttpSource {
    async fn fetch(&self) -> Result<String, FetchError> {
        let transport = |source| FetchError::Transport {
            url: self.url.clone(),
            source,
        };

        let resp = self.http.get(&self.url).send().await.map_err(transport)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: self.url.clone(),
                status: status.as_u16(),
            });
        }

        let body = resp.text().await.map_err(transport)?;
        trace!(url = self.url.as_str(), bytes = body.len(), "Fetched reference page");
        Ok(body)
    }

    fn describe(&self) -> &str {
        &self.url
    }
}

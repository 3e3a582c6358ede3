//! Network fetch capability.
//!
//! `ResourceFetcher` is the single suspension point for remote work. The
//! default backend is a `reqwest` client; tests substitute counting or
//! failing fetchers.

use crate::Result;
use async_trait::async_trait;

#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    /// Fetch the body of `url`. Non-success HTTP statuses are errors.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;

    /// Fetch `url` and decode it as UTF-8 text.
    async fn fetch_text(&self, url: &str) -> Result<String> {
        let body = self.fetch(url).await?;
        String::from_utf8(body)
            .map_err(|e| crate::Error::Fetch(format!("{} is not valid UTF-8: {}", url, e)))
    }
}

#[cfg(feature = "http")]
pub use http::HttpFetcher;

#[cfg(feature = "http")]
mod http {
    use super::ResourceFetcher;
    use crate::{Error, Result};
    use async_trait::async_trait;
    use reqwest::Client;
    use std::time::Duration;

    /// HTTP backend. No timeout is imposed unless one is configured, so a
    /// hung request stalls its caller until the server gives up.
    pub struct HttpFetcher {
        client: Client,
        user_agent: String,
    }

    impl HttpFetcher {
        pub fn new(user_agent: &str, timeout_ms: Option<u64>) -> Result<Self> {
            let mut builder = Client::builder();
            if let Some(ms) = timeout_ms {
                builder = builder.timeout(Duration::from_millis(ms));
            }
            let client = builder.build().map_err(|e| {
                Error::Config(format!("Failed to build HTTP client: {}", e))
            })?;
            Ok(Self {
                client,
                user_agent: user_agent.to_string(),
            })
        }
    }

    #[async_trait]
    impl ResourceFetcher for HttpFetcher {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
            log::debug!("GET {}", url);
            let resp = self
                .client
                .get(url)
                .header("User-Agent", self.user_agent.clone())
                .send()
                .await
                .map_err(|e| Error::Fetch(format!("GET {} failed: {}", url, e)))?;

            let status = resp.status();
            if !status.is_success() {
                return Err(Error::Fetch(format!("GET {} returned {}", url, status)));
            }

            let body = resp
                .bytes()
                .await
                .map_err(|e| Error::Fetch(format!("Failed to read body of {}: {}", url, e)))?;
            Ok(body.to_vec())
        }
    }
}

//! Page retrieval strategies.
//!
//! Extraction only needs an HTML body, so every way of getting one sits
//! behind [`PageFetcher`]: a plain GET, or the scraping backend with or
//! without JavaScript rendering.

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::{Config, FetchStrategy};
use crate::error::{AppError, Result};

const SCRAPINGBEE_ENDPOINT: &str = "https://app.scrapingbee.com/api/v1/";
const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Navigation budget handed to the rendering backend, in milliseconds.
const RENDER_NAVIGATION_TIMEOUT_MS: u64 = 30_000;
/// Extra time allowed for the minimal DOM signal after navigation.
const RENDER_WAIT_FOR_DOM: Duration = Duration::from_secs(5);

#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Return the HTML body for `url`.
    async fn fetch(&self, url: &str) -> Result<String>;
}

pub struct DirectFetcher {
    client: Client,
}

impl DirectFetcher {
    pub fn new() -> Result<Self> {
        let client = ClientBuilder::new()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(10))
            .connect_timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for DirectFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        debug!(url, "fetching page directly");
        let response = self.client.get(url).send().await?;
        read_body(response).await
    }
}

/// Fetches pages through the ScrapingBee proxy.
pub struct ScrapingBeeFetcher {
    client: Client,
    api_key: String,
    render_js: bool,
}

impl ScrapingBeeFetcher {
    pub fn new(api_key: impl Into<String>, render_js: bool) -> Result<Self> {
        let timeout = if render_js {
            Duration::from_millis(RENDER_NAVIGATION_TIMEOUT_MS) + RENDER_WAIT_FOR_DOM
        } else {
            Duration::from_secs(30)
        };
        let client = ClientBuilder::new()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            render_js,
        })
    }

    fn query(&self, url: &str) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("api_key", self.api_key.clone()),
            ("url", url.to_string()),
            ("render_js", self.render_js.to_string()),
        ];
        if self.render_js {
            params.push(("timeout", RENDER_NAVIGATION_TIMEOUT_MS.to_string()));
            params.push(("wait_for", "body".to_string()));
        }
        params
    }
}

#[async_trait]
impl PageFetcher for ScrapingBeeFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        debug!(url, render_js = self.render_js, "fetching page via scraping backend");
        let response = self
            .client
            .get(SCRAPINGBEE_ENDPOINT)
            .query(&self.query(url))
            .send()
            .await?;
        read_body(response).await
    }
}

async fn read_body(response: reqwest::Response) -> Result<String> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        warn!(status = status.as_u16(), "upstream fetch failed");
        return Err(AppError::Upstream {
            status: status.as_u16(),
            body,
        });
    }
    Ok(body)
}

/// Build the fetcher used for listing pages.
pub fn listing_fetcher(config: &Config) -> Result<Box<dyn PageFetcher>> {
    let key = || {
        config
            .scrapingbee_api_key
            .clone()
            .ok_or_else(|| AppError::ConfigError("SCRAPINGBEE_API_KEY is not set".to_string()))
    };
    let fetcher: Box<dyn PageFetcher> = match config.fetch_strategy {
        FetchStrategy::Direct => Box::new(DirectFetcher::new()?),
        FetchStrategy::ScrapingBee => Box::new(ScrapingBeeFetcher::new(key()?, false)?),
        FetchStrategy::Rendered => Box::new(ScrapingBeeFetcher::new(key()?, true)?),
    };
    Ok(fetcher)
}

/// Social pages only carry their caption after rendering, so prefer the
/// rendered backend whenever a key is configured.
pub fn social_fetcher(config: &Config) -> Result<Box<dyn PageFetcher>> {
    let fetcher: Box<dyn PageFetcher> = match &config.scrapingbee_api_key {
        Some(key) => Box::new(ScrapingBeeFetcher::new(key.clone(), true)?),
        None => Box::new(DirectFetcher::new()?),
    };
    Ok(fetcher)
}

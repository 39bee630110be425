pub mod api;
pub mod config;
pub mod coordinates;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod llm;
pub mod social;
pub mod synth;

use std::sync::Arc;
use reqwest::Client;
use tracing::debug;

use config::Config;
use error::{AppError, Result};
use extract::{extract_content, ExtractReport};
use fetch::PageFetcher;
use llm::{LanguageModel, OpenAiClient};
use synth::ListingSynthesizer;

/// Where `/synthesize` gets its categorized page content from.
#[derive(Clone)]
pub enum SummarySource {
    /// Run the extractor inside this process.
    InProcess,
    /// Call the `/extract` endpoint of a running instance.
    Remote { client: Client, base_url: String },
}

/// Application state that will be shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub fetcher: Arc<dyn PageFetcher>,
    pub social_fetcher: Arc<dyn PageFetcher>,
    pub summaries: SummarySource,
    pub synthesizer: ListingSynthesizer,
    pub social_synthesizer: ListingSynthesizer,
}

impl AppState {
    pub fn from_config(config: &Config) -> Result<Self> {
        let model: Arc<dyn LanguageModel> = Arc::new(
            OpenAiClient::new(&config.openai_api_key, &config.openai_model)
                .with_base_url(&config.openai_base_url),
        );
        let summaries = match &config.api_base_url {
            Some(base_url) => SummarySource::Remote {
                client: Client::new(),
                base_url: base_url.clone(),
            },
            None => SummarySource::InProcess,
        };

        Ok(AppState {
            fetcher: Arc::from(fetch::listing_fetcher(config)?),
            social_fetcher: Arc::from(fetch::social_fetcher(config)?),
            summaries,
            synthesizer: ListingSynthesizer::new(model.clone(), config.synth_contract),
            social_synthesizer: ListingSynthesizer::new(model, config.social_synth_contract),
        })
    }

    /// Fetch `url` with the listing fetcher and categorize its content.
    pub async fn extract(&self, url: &str) -> Result<ExtractReport> {
        let html = self.fetcher.fetch(url).await?;
        debug!(url, bytes = html.len(), "page fetched");
        Ok(ExtractReport::new(url, extract_content(&html)))
    }

    /// Obtain the extractor output for `url`, rejecting pages with no content.
    pub async fn load_summary(&self, url: &str) -> Result<ExtractReport> {
        let report = match &self.summaries {
            SummarySource::InProcess => self.extract(url).await?,
            SummarySource::Remote { client, base_url } => {
                fetch_remote_summary(client, base_url, url).await?
            }
        };
        if report.summary.is_empty() {
            return Err(AppError::NoData(format!("nothing extracted from {}", url)));
        }
        Ok(report)
    }
}

async fn fetch_remote_summary(client: &Client, base_url: &str, url: &str) -> Result<ExtractReport> {
    let response = client
        .get(format!("{}/extract", base_url))
        .query(&[("url", url)])
        .send()
        .await?;
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(AppError::NoData(body));
    }

    let value: serde_json::Value = serde_json::from_str(&body)?;
    if value.is_null() || value.get("error").is_some() {
        return Err(AppError::NoData(body));
    }
    Ok(serde_json::from_value(value)?)
}

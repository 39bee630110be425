use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use crate::error::{AppError, Result};
use crate::synth::OutputContract;

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4.1";

/// How listing pages are retrieved before extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStrategy {
    /// Plain HTTP GET against the listing site.
    Direct,
    /// Through the scraping backend without JavaScript rendering.
    ScrapingBee,
    /// Through the scraping backend with a rendered browser session.
    Rendered,
}

impl FromStr for FetchStrategy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" | "static" => Ok(FetchStrategy::Direct),
            "scrapingbee" => Ok(FetchStrategy::ScrapingBee),
            "rendered" | "render" => Ok(FetchStrategy::Rendered),
            other => Err(AppError::ConfigError(format!("Unknown fetch strategy: {}", other))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_addr: SocketAddr,
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub openai_model: String,
    pub scrapingbee_api_key: Option<String>,
    /// Base URL for calls between endpoints; `None` runs the extractor in-process.
    pub api_base_url: Option<String>,
    pub fetch_strategy: FetchStrategy,
    pub synth_contract: OutputContract,
    pub social_synth_contract: OutputContract,
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load environment variables from .env file if it exists
        dotenv::dotenv().ok();

        let openai_api_key = env::var("OPENAI_API_KEY")?;
        let openai_base_url = var_or("OPENAI_BASE_URL", DEFAULT_OPENAI_BASE_URL);
        let openai_model = var_or("OPENAI_MODEL", DEFAULT_OPENAI_MODEL);
        let scrapingbee_api_key = optional_var("SCRAPINGBEE_API_KEY");
        let api_base_url = optional_var("API_BASE_URL")
            .map(|url| url.trim_end_matches('/').to_string());

        let fetch_strategy = match optional_var("FETCH_STRATEGY") {
            Some(value) => value.parse()?,
            None if scrapingbee_api_key.is_some() => FetchStrategy::ScrapingBee,
            None => FetchStrategy::Direct,
        };
        if fetch_strategy != FetchStrategy::Direct && scrapingbee_api_key.is_none() {
            return Err(AppError::ConfigError(
                "SCRAPINGBEE_API_KEY is not set".to_string(),
            ));
        }

        let synth_contract = optional_var("SYNTH_CONTRACT")
            .map(|v| v.parse())
            .transpose()?
            .unwrap_or(OutputContract::Strict);
        let social_synth_contract = optional_var("SOCIAL_SYNTH_CONTRACT")
            .map(|v| v.parse())
            .transpose()?
            .unwrap_or(OutputContract::Loose);

        // Load server configuration with defaults
        let host = var_or("HOST", "127.0.0.1");
        let port = var_or("PORT", "3000");
        let port = port.parse::<u16>().map_err(|e| AppError::ConfigError(format!("Invalid port: {}", e)))?;
        let ip = IpAddr::from_str(&host).map_err(|e| AppError::ConfigError(format!("Invalid host address: {}", e)))?;

        let server_addr = SocketAddr::new(ip, port);

        Ok(Config {
            server_addr,
            openai_api_key,
            openai_base_url,
            openai_model,
            scrapingbee_api_key,
            api_base_url,
            fetch_strategy,
            synth_contract,
            social_synth_contract,
        })
    }
}

fn optional_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn var_or(key: &str, default: &str) -> String {
    optional_var(key).unwrap_or_else(|| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fetch_strategies() {
        assert_eq!("direct".parse::<FetchStrategy>().unwrap(), FetchStrategy::Direct);
        assert_eq!(" Rendered ".parse::<FetchStrategy>().unwrap(), FetchStrategy::Rendered);
        assert_eq!("scrapingbee".parse::<FetchStrategy>().unwrap(), FetchStrategy::ScrapingBee);
        assert!("puppeteer".parse::<FetchStrategy>().is_err());
    }
}

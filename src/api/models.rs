use serde::{Deserialize, Serialize};

use crate::synth::ListingRecord;

#[derive(Debug, Default, Deserialize)]
pub struct UrlQuery {
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SynthesizeRequest {
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SocialSynthesizeRequest {
    pub url: Option<String>,
    /// Caption text to use as-is instead of scraping `url`.
    pub caption: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SocialCaption {
    pub description: String,
}

#[derive(Debug, Serialize)]
pub struct SynthesizeResponse {
    pub result: ListingRecord,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

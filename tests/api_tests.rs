use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use rust_listing_scrapper::api::routes::create_router;
use rust_listing_scrapper::error::{AppError, Result};
use rust_listing_scrapper::extract::{extract_content, ExtractReport};
use rust_listing_scrapper::fetch::PageFetcher;
use rust_listing_scrapper::llm::{LanguageModel, ModelRequest};
use rust_listing_scrapper::synth::{ListingSynthesizer, OutputContract};
use rust_listing_scrapper::{AppState, SummarySource};

const LISTING_PAGE: &str = r#"<!doctype html>
<html>
  <head><title>Inmuebles | Portal</title></head>
  <body>
    <h1>Depto en Polanco</h1>
    <p>Departamento de 2 baños con 120 m² y balcón</p>
    <div class="price">Precio: $8,500,000 MXN</div>
    <img src="https://cdn.example.com/fotos/sala.jpg" alt="Sala">
    <a href="tel:5512345678">Llamar</a>
    <iframe src="https://www.google.com/maps?q=19.4,-99.2"></iframe>
  </body>
</html>"#;

const SOCIAL_PAGE: &str = r#"<html><head>
  <meta property="og:description" content="inmo on May 2: Casa en venta en Coyoacán, 3 recámaras">
</head><body></body></html>"#;

const MODEL_REPLY: &str = r#"{
  "listingTitle": "Depto en Polanco",
  "price": 8500000,
  "priceUsd": 470000,
  "location": "Polanco",
  "areaInSquareMeters": 120,
  "numberOfBedrooms": 2,
  "numberOfBathrooms": 2,
  "numberOfHalfBathrooms": 0,
  "parkingSpaces": 1,
  "propertyDescription": "Departamento con balcón",
  "developmentAmenities": { "hasElevator": true },
  "advertiserName": "Inmobiliaria",
  "contactPhone": "5512345678",
  "contactEmail": "",
  "mainPhotos": ["https://cdn.example.com/fotos/sala.jpg"]
}"#;

enum Page {
    Html(&'static str),
    Upstream(u16, &'static str),
    Unreachable(&'static str),
}

struct FakeFetcher {
    page: Page,
    calls: AtomicUsize,
}

impl FakeFetcher {
    fn new(page: Page) -> Arc<Self> {
        Arc::new(Self { page, calls: AtomicUsize::new(0) })
    }
}

#[async_trait]
impl PageFetcher for FakeFetcher {
    async fn fetch(&self, _url: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.page {
            Page::Html(html) => Ok(html.to_string()),
            Page::Upstream(status, body) => Err(AppError::Upstream {
                status,
                body: body.to_string(),
            }),
            Page::Unreachable(reason) => Err(AppError::FetchError(reason.to_string())),
        }
    }
}

struct FakeModel {
    reply: Option<&'static str>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl FakeModel {
    fn new(reply: Option<&'static str>) -> Arc<Self> {
        Arc::new(Self { reply, requests: Mutex::new(Vec::new()) })
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl LanguageModel for FakeModel {
    async fn respond(&self, request: ModelRequest) -> Result<Option<String>> {
        self.requests.lock().unwrap().push(request);
        Ok(self.reply.map(str::to_string))
    }
}

fn app(listing: Arc<FakeFetcher>, social: Arc<FakeFetcher>, model: Arc<FakeModel>) -> Router {
    app_with_summaries(SummarySource::InProcess, listing, social, model)
}

fn app_with_summaries(
    summaries: SummarySource,
    listing: Arc<FakeFetcher>,
    social: Arc<FakeFetcher>,
    model: Arc<FakeModel>,
) -> Router {
    create_router(AppState {
        fetcher: listing,
        social_fetcher: social,
        summaries,
        synthesizer: ListingSynthesizer::new(model.clone(), OutputContract::Strict),
        social_synthesizer: ListingSynthesizer::new(model, OutputContract::Loose),
    })
}

fn listing_app(page: Page, model: Arc<FakeModel>) -> Router {
    app(FakeFetcher::new(page), FakeFetcher::new(Page::Html(SOCIAL_PAGE)), model)
}

async fn get(router: Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(router, request).await
}

async fn post(router: Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(router, request).await
}

async fn post_raw(
    router: Router,
    uri: &str,
    content_type: Option<&str>,
    body: &'static str,
) -> (StatusCode, Value) {
    let mut request = Request::builder().method("POST").uri(uri);
    if let Some(content_type) = content_type {
        request = request.header(header::CONTENT_TYPE, content_type);
    }
    send(router, request.body(Body::from(body)).unwrap()).await
}

/// Serve a fixed reply on `/extract` from a local listener and return its base URL.
async fn canned_extractor(status: StatusCode, body: String) -> String {
    let router = Router::new().route(
        "/extract",
        axum::routing::get(move || {
            let body = body.clone();
            async move { (status, [(header::CONTENT_TYPE, "application/json")], body) }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn remote_app(
    status: StatusCode,
    body: String,
    model: Arc<FakeModel>,
) -> (Router, Arc<FakeFetcher>) {
    let base_url = canned_extractor(status, body).await;
    let listing = FakeFetcher::new(Page::Html(LISTING_PAGE));
    let router = app_with_summaries(
        SummarySource::Remote { client: reqwest::Client::new(), base_url },
        listing.clone(),
        FakeFetcher::new(Page::Html(SOCIAL_PAGE)),
        model,
    );
    (router, listing)
}

async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn health_reports_ok() {
    let (status, body) = get(listing_app(Page::Html(""), FakeModel::new(None)), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok" }));
}

#[tokio::test]
async fn extract_requires_url() {
    let (status, body) = get(listing_app(Page::Html(LISTING_PAGE), FakeModel::new(None)), "/extract").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "URL parameter is required");
}

#[tokio::test]
async fn extract_returns_summary_and_stats() {
    let router = listing_app(Page::Html(LISTING_PAGE), FakeModel::new(None));
    let (status, body) = get(router, "/extract?url=https%3A%2F%2Fexample.com%2Fdepto").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["url"], "https://example.com/depto");
    assert_eq!(body["title"], "Depto en Polanco");
    assert_eq!(body["details"], json!(["Departamento de 2 baños con 120 m² y balcón"]));
    assert_eq!(body["price"], "Precio: $8,500,000 MXN");
    assert_eq!(body["coordinates"], json!({ "lat": "19.4", "lon": "-99.2" }));
    assert_eq!(body["contactLinks"][0], json!({ "type": "phone", "value": "5512345678", "text": "Llamar" }));
    assert_eq!(body["stats"]["imagesCount"], 1);
    assert_eq!(body["stats"]["coordinatesFound"], true);
    assert!(body["scrapedAt"].is_string());
}

#[tokio::test]
async fn extract_without_map_has_empty_coordinates() {
    let page = "<html><body><h1>Casa en Coyoacán</h1><p>Casa con jardín y 3 recámaras</p></body></html>";
    let (status, body) = get(listing_app(Page::Html(page), FakeModel::new(None)), "/extract?url=https://example.com").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["coordinates"], json!({}));
    assert_eq!(body["stats"]["coordinatesFound"], false);
}

#[tokio::test]
async fn extract_forwards_upstream_status_and_body() {
    let router = listing_app(Page::Upstream(403, "quota exceeded"), FakeModel::new(None));
    let (status, body) = get(router, "/extract?url=https://example.com").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["details"], "quota exceeded");
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn extract_transport_failure_is_internal_error() {
    let router = listing_app(Page::Unreachable("connection refused"), FakeModel::new(None));
    let (status, body) = get(router, "/extract?url=https://example.com").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Failed to fetch page");
    assert_eq!(body["details"], "connection refused");
}

#[tokio::test]
async fn synthesize_requires_url() {
    let model = FakeModel::new(Some(MODEL_REPLY));
    let (status, body) = post(listing_app(Page::Html(LISTING_PAGE), model.clone()), "/synthesize", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn synthesize_without_extracted_data_skips_model() {
    let model = FakeModel::new(Some(MODEL_REPLY));
    let router = listing_app(Page::Html("<html><body></body></html>"), model.clone());
    let (status, body) = post(router, "/synthesize", json!({ "url": "https://example.com" })).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No data from scraping");
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn synthesize_merges_extractor_coordinates() {
    let model = FakeModel::new(Some(MODEL_REPLY));
    let router = listing_app(Page::Html(LISTING_PAGE), model.clone());
    let (status, body) = post(router, "/synthesize", json!({ "url": "https://example.com/depto" })).await;

    assert_eq!(status, StatusCode::OK);
    let result = &body["result"];
    assert_eq!(result["listingTitle"], "Depto en Polanco");
    assert_eq!(result["price"], 8500000.0);
    assert_eq!(result["numberOfBedrooms"], 2);
    assert_eq!(result["developmentAmenities"]["hasElevator"], true);
    assert_eq!(result["latitude"], "19.4");
    assert_eq!(result["longitude"], "-99.2");

    let requests = model.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    let sent: Value = serde_json::from_str(&requests[0].user).unwrap();
    assert_eq!(sent["title"], "Depto en Polanco");
    assert_eq!(sent["url"], "https://example.com/depto");
}

#[tokio::test]
async fn synthesize_fails_when_model_is_silent() {
    let router = listing_app(Page::Html(LISTING_PAGE), FakeModel::new(None));
    let (status, body) = post(router, "/synthesize", json!({ "url": "https://example.com" })).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn synthesize_hides_upstream_fetch_status() {
    let model = FakeModel::new(Some(MODEL_REPLY));
    let router = listing_app(Page::Upstream(404, "not found"), model.clone());
    let (status, _) = post(router, "/synthesize", json!({ "url": "https://example.com" })).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn extract_social_returns_caption() {
    let router = listing_app(Page::Html(""), FakeModel::new(None));
    let (status, body) = get(router, "/extract-social?url=https://www.instagram.com/p/abc").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "description": "Casa en venta en Coyoacán, 3 recámaras" }));
}

#[tokio::test]
async fn extract_social_without_description_is_bad_request() {
    let router = app(
        FakeFetcher::new(Page::Html("")),
        FakeFetcher::new(Page::Html("<html><head></head></html>")),
        FakeModel::new(None),
    );
    let (status, body) = get(router, "/extract-social?url=https://www.instagram.com/p/abc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No description found");
}

#[tokio::test]
async fn extract_social_upstream_failure_is_internal_error() {
    let router = app(
        FakeFetcher::new(Page::Html("")),
        FakeFetcher::new(Page::Upstream(401, "bad key")),
        FakeModel::new(None),
    );
    let (status, _) = get(router, "/extract-social?url=https://www.instagram.com/p/abc").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn synthesize_social_uses_loose_contract_with_caption() {
    let reply = r#"{"listingTitle": "Casa en Coyoacán", "price": "4,500,000", "numberOfBedrooms": 3,
        "developmentAmenities": ["jardín"], "mainPhotos": []}"#;
    let model = FakeModel::new(Some(reply));
    let social = FakeFetcher::new(Page::Html(SOCIAL_PAGE));
    let router = app(FakeFetcher::new(Page::Html("")), social.clone(), model.clone());

    let (status, body) = post(
        router,
        "/synthesize-social",
        json!({ "url": "https://www.instagram.com/p/abc" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["price"], 4500000.0);
    assert_eq!(body["result"]["developmentAmenities"], json!(["jardín"]));
    assert!(body["result"].get("numberOfHalfBathrooms").is_none());
    assert!(body["result"].get("latitude").is_none());
    assert_eq!(social.calls.load(Ordering::SeqCst), 1);

    let requests = model.requests.lock().unwrap();
    assert_eq!(requests[0].user, "Casa en venta en Coyoacán, 3 recámaras");
}

#[tokio::test]
async fn synthesize_social_prefers_given_caption() {
    let model = FakeModel::new(Some(r#"{"listingTitle": "Loft"}"#));
    let social = FakeFetcher::new(Page::Html(SOCIAL_PAGE));
    let router = app(FakeFetcher::new(Page::Html("")), social.clone(), model.clone());

    let (status, body) = post(router, "/synthesize-social", json!({ "caption": "Loft en renta en la Roma" })).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["listingTitle"], "Loft");
    assert_eq!(social.calls.load(Ordering::SeqCst), 0);
    assert_eq!(model.requests.lock().unwrap()[0].user, "Loft en renta en la Roma");
}

#[tokio::test]
async fn synthesize_rejects_malformed_json_body() {
    let model = FakeModel::new(Some(MODEL_REPLY));
    let router = listing_app(Page::Html(LISTING_PAGE), model.clone());
    let (status, body) = post_raw(router, "/synthesize", Some("application/json"), "{\"url\": ").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn synthesize_social_rejects_missing_content_type() {
    let model = FakeModel::new(Some(MODEL_REPLY));
    let router = listing_app(Page::Html(LISTING_PAGE), model.clone());
    let (status, body) = post_raw(router, "/synthesize-social", None, r#"{"caption": "Loft"}"#).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn synthesize_reads_summary_from_remote_extractor() {
    let report = ExtractReport::new("https://example.com/depto", extract_content(LISTING_PAGE));
    let model = FakeModel::new(Some(MODEL_REPLY));
    let (router, listing) =
        remote_app(StatusCode::OK, serde_json::to_string(&report).unwrap(), model.clone()).await;

    let (status, body) = post(router, "/synthesize", json!({ "url": "https://example.com/depto" })).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["latitude"], "19.4");
    assert_eq!(body["result"]["longitude"], "-99.2");
    assert_eq!(listing.calls.load(Ordering::SeqCst), 0);
    let requests = model.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    let sent: Value = serde_json::from_str(&requests[0].user).unwrap();
    assert_eq!(sent["title"], "Depto en Polanco");
}

#[tokio::test]
async fn remote_extractor_failures_skip_model() {
    let replies = [
        (StatusCode::BAD_GATEWAY, r#"{"error": "Failed to fetch content from upstream"}"#),
        (StatusCode::OK, "null"),
        (StatusCode::OK, r#"{"error": "No data from scraping"}"#),
    ];
    for (reply_status, reply) in replies {
        let model = FakeModel::new(Some(MODEL_REPLY));
        let (router, _) = remote_app(reply_status, reply.to_string(), model.clone()).await;

        let (status, body) = post(router, "/synthesize", json!({ "url": "https://example.com" })).await;

        assert_eq!(status, StatusCode::BAD_REQUEST, "reply {} {}", reply_status, reply);
        assert_eq!(body["error"], "No data from scraping");
        assert_eq!(model.calls(), 0);
    }
}

//! Heuristic listing-page classifier.
//!
//! Walks the block-level text containers of a page and files each one into
//! at most one bucket (description, details, features, amenities, contact,
//! location, price) using class/id markers and Spanish real-estate keywords.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::coordinates::{self, Coordinates};

const MIN_BLOCK_CHARS: usize = 15;
const MIN_LIST_ITEM_CHARS: usize = 5;
const MAX_BLOCK_LINKS: usize = 2;
const MIN_IMAGE_SRC_CHARS: usize = 10;

const UNIT_MARKERS: [&str; 3] = ["m²", "baños", "recámaras"];
const IMAGE_SRC_EXCLUDES: [&str; 2] = ["logo", "icon"];

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector must parse")
}

static NOISE_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    selector(r#"script, style, noscript, [class*="cookie"], [class*="ad-"], [class*="advertisement"]"#)
});
static H1_SELECTOR: Lazy<Selector> = Lazy::new(|| selector("h1"));
static TITLE_SELECTOR: Lazy<Selector> = Lazy::new(|| selector("title"));
static BLOCK_SELECTOR: Lazy<Selector> = Lazy::new(|| selector("div, p, section"));
static ANCHOR_SELECTOR: Lazy<Selector> = Lazy::new(|| selector("a"));
static LIST_ITEM_SELECTOR: Lazy<Selector> = Lazy::new(|| selector("li"));
static IMAGE_SELECTOR: Lazy<Selector> = Lazy::new(|| selector("img[src]"));
static IFRAME_SELECTOR: Lazy<Selector> = Lazy::new(|| selector("iframe[src]"));
static LAZY_MAP_SELECTOR: Lazy<Selector> = Lazy::new(|| selector("[data-lazy-iframe-url]"));
static CONTACT_LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| selector(r#"a[href^="tel:"], a[href^="mailto:"]"#));

static PRICE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\d,]+\.?\d*").expect("static regex must compile"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub src: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactKind {
    Phone,
    Email,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactLink {
    #[serde(rename = "type")]
    pub kind: ContactKind,
    pub value: String,
    pub text: String,
}

/// Categorized text pulled from a listing page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContentSummary {
    pub title: String,
    pub description: String,
    pub details: Vec<String>,
    pub features: Vec<String>,
    pub amenities: Vec<String>,
    pub contact: Vec<String>,
    pub location: String,
    pub price: String,
    pub images: Vec<Image>,
    pub contact_links: Vec<ContactLink>,
    pub coordinates: Coordinates,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractStats {
    pub details_count: usize,
    pub features_count: usize,
    pub amenities_count: usize,
    pub images_count: usize,
    pub coordinates_found: bool,
}

impl ContentSummary {
    pub fn stats(&self) -> ExtractStats {
        ExtractStats {
            details_count: self.details.len(),
            features_count: self.features.len(),
            amenities_count: self.amenities.len(),
            images_count: self.images.len(),
            coordinates_found: self.coordinates.is_found(),
        }
    }

    /// True when the page yielded nothing worth sending to the model.
    pub fn is_empty(&self) -> bool {
        self.title.is_empty()
            && self.description.is_empty()
            && self.location.is_empty()
            && self.price.is_empty()
            && self.details.is_empty()
            && self.features.is_empty()
            && self.amenities.is_empty()
            && self.contact.is_empty()
            && self.images.is_empty()
    }

    fn file(&mut self, bucket: Bucket, text: String) {
        match bucket {
            Bucket::Description => self.description = text,
            Bucket::Details => self.details.push(text),
            Bucket::Features => self.features.push(text),
            Bucket::Amenities => self.amenities.push(text),
            Bucket::Contact => self.contact.push(text),
            Bucket::Location => self.location = text,
            Bucket::Price => self.price = text,
        }
    }
}

/// Extractor output as served by `/extract` and fed to the synthesizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractReport {
    pub url: String,
    #[serde(flatten)]
    pub summary: ContentSummary,
    #[serde(default)]
    pub stats: ExtractStats,
    #[serde(default = "Utc::now")]
    pub scraped_at: DateTime<Utc>,
}

impl ExtractReport {
    pub fn new(url: impl Into<String>, summary: ContentSummary) -> Self {
        Self {
            url: url.into(),
            stats: summary.stats(),
            summary,
            scraped_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Description,
    Details,
    Features,
    Amenities,
    Contact,
    Location,
    Price,
}

/// Collapse all whitespace runs to single spaces and trim.
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn element_text(element: ElementRef<'_>) -> String {
    clean_text(&element.text().collect::<String>())
}

fn has_unit_marker(text: &str) -> bool {
    UNIT_MARKERS.iter().any(|marker| text.contains(marker))
}

pub fn extract_content(html: &str) -> ContentSummary {
    let mut document = Html::parse_document(html);
    strip_noise(&mut document);

    let mut summary = ContentSummary {
        title: extract_title(&document),
        ..Default::default()
    };

    for element in document.select(&BLOCK_SELECTOR) {
        let text = element_text(element);
        if let Some(bucket) = classify_block(element, &text) {
            summary.file(bucket, text);
        }
    }

    for item in document.select(&LIST_ITEM_SELECTOR) {
        let text = element_text(item);
        if text.chars().count() < MIN_LIST_ITEM_CHARS {
            continue;
        }
        if has_unit_marker(&text) {
            summary.details.push(text);
        } else {
            summary.features.push(text);
        }
    }

    summary.images = extract_images(&document);
    summary.coordinates = find_map_url(&document)
        .map(|url| coordinates::parse_map_url(&url))
        .unwrap_or_default();
    summary.contact_links = extract_contact_links(&document);

    dedup_in_place(&mut summary.details);
    dedup_in_place(&mut summary.features);
    dedup_in_place(&mut summary.amenities);
    dedup_in_place(&mut summary.contact);

    summary
}

fn strip_noise(document: &mut Html) {
    let noise: Vec<_> = document.select(&NOISE_SELECTOR).map(|el| el.id()).collect();
    for id in noise {
        if let Some(mut node) = document.tree.get_mut(id) {
            node.detach();
        }
    }
}

fn extract_title(document: &Html) -> String {
    let heading = document
        .select(&H1_SELECTOR)
        .next()
        .map(element_text)
        .unwrap_or_default();
    if !heading.is_empty() {
        return heading;
    }
    // every <title> contributes, matching a text() over the whole selection
    clean_text(
        &document
            .select(&TITLE_SELECTOR)
            .flat_map(|el| el.text())
            .collect::<String>(),
    )
}

/// Pick the single bucket a block belongs to, or `None` if it is too short,
/// looks like a link list, or matches no marker.
pub fn classify_block(element: ElementRef<'_>, text: &str) -> Option<Bucket> {
    if text.chars().count() < MIN_BLOCK_CHARS {
        return None;
    }
    if element.select(&ANCHOR_SELECTOR).count() > MAX_BLOCK_LINKS {
        return None;
    }

    let class = element.value().attr("class").unwrap_or_default().to_lowercase();
    let id = element.value().attr("id").unwrap_or_default().to_lowercase();
    let marked = |needle: &str| class.contains(needle) || id.contains(needle);

    if marked("description") || follows_description_heading(element) {
        Some(Bucket::Description)
    } else if marked("detail") || has_unit_marker(text) {
        Some(Bucket::Details)
    } else if marked("feature") || marked("caracteristica") {
        Some(Bucket::Features)
    } else if marked("ameni") {
        Some(Bucket::Amenities)
    } else if marked("contact") || text.contains("tel:") || text.contains("mailto:") {
        Some(Bucket::Contact)
    } else if marked("location") || marked("direccion") {
        Some(Bucket::Location)
    } else if marked("price") || text.contains('$') || PRICE_PATTERN.is_match(text) {
        Some(Bucket::Price)
    } else {
        None
    }
}

fn follows_description_heading(element: ElementRef<'_>) -> bool {
    element
        .prev_siblings()
        .find_map(ElementRef::wrap)
        .is_some_and(|prev| {
            matches!(prev.value().name(), "h2" | "h3" | "h4")
                && element_text(prev).to_lowercase().contains("descripción")
        })
}

fn extract_images(document: &Html) -> Vec<Image> {
    document
        .select(&IMAGE_SELECTOR)
        .filter_map(|el| {
            let src = el.value().attr("src")?;
            let keep = src.chars().count() > MIN_IMAGE_SRC_CHARS
                && !IMAGE_SRC_EXCLUDES.iter().any(|needle| src.contains(needle));
            keep.then(|| Image {
                src: src.to_string(),
                alt: el.value().attr("alt").map(str::to_string),
            })
        })
        .collect()
}

fn find_map_url(document: &Html) -> Option<String> {
    document
        .select(&IFRAME_SELECTOR)
        .filter_map(|el| el.value().attr("src"))
        .find(|src| coordinates::is_map_url(src))
        .or_else(|| {
            document
                .select(&LAZY_MAP_SELECTOR)
                .filter_map(|el| el.value().attr("data-lazy-iframe-url"))
                .find(|src| coordinates::is_map_url(src))
        })
        .map(str::to_string)
}

fn extract_contact_links(document: &Html) -> Vec<ContactLink> {
    document
        .select(&CONTACT_LINK_SELECTOR)
        .filter_map(|el| {
            let href = el.value().attr("href")?;
            let (kind, value) = match href.strip_prefix("tel:") {
                Some(number) => (ContactKind::Phone, number),
                None => (ContactKind::Email, href.strip_prefix("mailto:")?),
            };
            Some(ContactLink {
                kind,
                value: value.to_string(),
                text: element_text(el),
            })
        })
        .collect()
}

/// Drop repeated entries, keeping the first occurrence of each.
pub fn dedup_in_place(items: &mut Vec<String>) {
    let mut seen = HashSet::new();
    items.retain(|item| seen.insert(item.clone()));
}

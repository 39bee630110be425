use once_cell::sync::Lazy;
use regex::Regex;

static OG_DESCRIPTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<meta\s+property="og:description"\s+content="([^"]*)""#)
        .expect("static regex must compile")
});

// Post captions are published as `<author> on <date>: <caption>`.
static CAPTION_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^:]*:\s*").expect("static regex must compile"));

/// Pull the post caption out of a rendered social-media page.
pub fn extract_caption(html: &str) -> Option<String> {
    let raw = OG_DESCRIPTION.captures(html)?.get(1)?.as_str();
    let caption = CAPTION_PREFIX.replace(raw, "");
    (!caption.is_empty()).then(|| caption.into_owned())
}

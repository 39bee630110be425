use serde::{Deserialize, Serialize};
use tracing::warn;
use url::Url;

const MAP_URL_PREFIXES: [&str; 2] = ["https://www.google.com/maps", "https://maps.google.com"];

/// Latitude/longitude pair taken from an embedded map. Both are set or neither.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coordinates {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lon: Option<String>,
}

impl Coordinates {
    pub fn is_found(&self) -> bool {
        self.lat.is_some() && self.lon.is_some()
    }
}

pub fn is_map_url(src: &str) -> bool {
    MAP_URL_PREFIXES.iter().any(|prefix| src.contains(prefix))
}

/// Read the `q=<lat>,<lon>` parameter of a map link.
///
/// Anything malformed yields empty coordinates; the failure is logged and
/// never propagated.
pub fn parse_map_url(map_url: &str) -> Coordinates {
    let url = match Url::parse(map_url) {
        Ok(url) => url,
        Err(e) => {
            warn!(map_url, error = %e, "could not parse map URL for coordinates");
            return Coordinates::default();
        }
    };

    let Some(q) = url
        .query_pairs()
        .find(|(key, _)| key == "q")
        .map(|(_, value)| value.into_owned())
    else {
        return Coordinates::default();
    };

    let parts: Vec<&str> = q.split(',').collect();
    let [lat, lon] = parts.as_slice() else {
        warn!(map_url, q = %q, "map query is not a lat,lon pair");
        return Coordinates::default();
    };

    match (parse_component(lat), parse_component(lon)) {
        (Some(lat), Some(lon)) => Coordinates {
            lat: Some(lat.to_string()),
            lon: Some(lon.to_string()),
        },
        _ => {
            warn!(map_url, q = %q, "map query components are not numeric");
            Coordinates::default()
        }
    }
}

fn parse_component(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

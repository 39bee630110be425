//! Listing synthesis: hand extracted page content (or a post caption) to the
//! language model and read back a typed [`ListingRecord`].

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{AppError, Result};
use crate::extract::ExtractReport;
use crate::llm::{LanguageModel, ModelRequest, ResponseFormat};

pub const MAX_MAIN_PHOTOS: usize = 3;
const SCHEMA_NAME: &str = "extract_property_listing";

const STRICT_PROMPT: &str = r#"Analiza el contenido de esta publicación de una propiedad en venta o renta. Es el contenido extraído de la página web.

Devuélvelo en JSON con los siguientes campos:

{
  "listingTitle": "",          // Título de la publicación
  "price": 0,                  // Precio en MXN (número)
  "priceUsd": 0,               // Precio en USD (número)
  "location": "",              // Ubicación o dirección
  "areaInSquareMeters": 0,     // Superficie en m2
  "numberOfBedrooms": 0,       // Número de recámaras
  "numberOfBathrooms": 0,      // Número de baños
  "numberOfHalfBathrooms": 0,  // Número de medios baños
  "parkingSpaces": 0,          // Estacionamientos
  "propertyDescription": "",   // Breve descripción de la propiedad (50 palabras)
  "developmentAmenities": {},  // { hasElevator, hasGarden, hasGym, hasJacuzzi, hasPool, hasSurveillance, hasStudio, hasBusinessCenter, hasEventsHall, hasKidsPlayground, hasMultipurposeHall, hasSpecialFacilities, hasCafeteria, hasGrill, isCondominium, hasGolfClub?, hasSharedRooftop, hasWaterFront? } todos booleanos
  "advertiserName": "",        // Nombre del anunciante (persona y/o empresa)
  "contactPhone": "",          // Teléfono de contacto
  "contactEmail": "",          // Correo de contacto
  "mainPhotos": []             // URLs de las 3 imágenes principales de la propiedad
}"#;

const LOOSE_PROMPT: &str = r#"Analiza el contenido de esta publicación de una propiedad en venta o renta. Puede ser el texto de una publicación en redes sociales.

Responde únicamente con un objeto JSON con los siguientes campos:

{
  "listingTitle": "",          // Título de la publicación
  "price": 0,                  // Precio en MXN (número)
  "priceUsd": 0,               // Precio en USD (número)
  "location": "",              // Ubicación o dirección
  "areaInSquareMeters": 0,     // Superficie en m2
  "numberOfBedrooms": 0,       // Número de recámaras
  "numberOfBathrooms": 0,      // Número de baños
  "parkingSpaces": 0,          // Estacionamientos
  "propertyDescription": "",   // Breve descripción de la propiedad (50 palabras)
  "developmentAmenities": [],  // Lista de amenidades con nombres cortos, por ejemplo ["alberca", "gimnasio", "roof garden"]
  "advertiserName": "",        // Nombre del anunciante (persona y/o empresa)
  "contactPhone": "",          // Teléfono de contacto
  "contactEmail": "",          // Correo de contacto
  "mainPhotos": []             // URLs de hasta 3 imágenes principales
}

Si un dato no aparece usa 0 para números y "" para textos."#;

const AMENITY_FLAGS: [&str; 18] = [
    "hasElevator",
    "hasGarden",
    "hasGym",
    "hasJacuzzi",
    "hasPool",
    "hasSurveillance",
    "hasStudio",
    "hasBusinessCenter",
    "hasEventsHall",
    "hasKidsPlayground",
    "hasMultipurposeHall",
    "hasSpecialFacilities",
    "hasCafeteria",
    "hasGrill",
    "isCondominium",
    "hasGolfClub",
    "hasSharedRooftop",
    "hasWaterFront",
];
const OPTIONAL_AMENITY_FLAGS: [&str; 2] = ["hasGolfClub", "hasWaterFront"];

/// Shape the model is asked to answer in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputContract {
    /// JSON Schema enforced by the model, amenities as named flags.
    Strict,
    /// Free-form JSON object, amenities as a list of names.
    Loose,
}

impl FromStr for OutputContract {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" | "schema" => Ok(OutputContract::Strict),
            "loose" | "json" => Ok(OutputContract::Loose),
            other => Err(AppError::ConfigError(format!("Unknown output contract: {}", other))),
        }
    }
}

impl OutputContract {
    pub fn system_prompt(self) -> &'static str {
        match self {
            OutputContract::Strict => STRICT_PROMPT,
            OutputContract::Loose => LOOSE_PROMPT,
        }
    }

    pub fn response_format(self) -> ResponseFormat {
        match self {
            OutputContract::Strict => ResponseFormat::JsonSchema {
                name: SCHEMA_NAME.to_string(),
                schema: listing_schema(),
                strict: true,
            },
            OutputContract::Loose => ResponseFormat::JsonObject,
        }
    }
}

pub fn listing_schema() -> Value {
    // strict mode needs every property in `required`; optional flags are nullable instead
    let amenity_properties: serde_json::Map<String, Value> = AMENITY_FLAGS
        .iter()
        .map(|flag| {
            let kind = if OPTIONAL_AMENITY_FLAGS.contains(flag) {
                json!({ "type": ["boolean", "null"] })
            } else {
                json!({ "type": "boolean" })
            };
            (flag.to_string(), kind)
        })
        .collect();

    json!({
        "type": "object",
        "properties": {
            "listingTitle": { "type": "string" },
            "price": { "type": "number" },
            "priceUsd": { "type": "number" },
            "location": { "type": "string" },
            "areaInSquareMeters": { "type": "number" },
            "numberOfBedrooms": { "type": "integer" },
            "numberOfBathrooms": { "type": "integer" },
            "numberOfHalfBathrooms": { "type": "integer" },
            "parkingSpaces": { "type": "integer" },
            "propertyDescription": { "type": "string" },
            "developmentAmenities": {
                "type": "object",
                "properties": amenity_properties,
                "required": AMENITY_FLAGS,
                "additionalProperties": false,
            },
            "advertiserName": { "type": "string" },
            "contactPhone": { "type": "string" },
            "contactEmail": { "type": "string" },
            "mainPhotos": {
                "type": "array",
                "items": { "type": "string" },
            },
        },
        "required": [
            "listingTitle",
            "price",
            "priceUsd",
            "location",
            "areaInSquareMeters",
            "numberOfBedrooms",
            "numberOfBathrooms",
            "numberOfHalfBathrooms",
            "parkingSpaces",
            "propertyDescription",
            "developmentAmenities",
            "advertiserName",
            "contactPhone",
            "contactEmail",
            "mainPhotos",
        ],
        "additionalProperties": false,
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AmenityFlags {
    pub has_elevator: bool,
    pub has_garden: bool,
    pub has_gym: bool,
    pub has_jacuzzi: bool,
    pub has_pool: bool,
    pub has_surveillance: bool,
    pub has_studio: bool,
    pub has_business_center: bool,
    pub has_events_hall: bool,
    pub has_kids_playground: bool,
    pub has_multipurpose_hall: bool,
    pub has_special_facilities: bool,
    pub has_cafeteria: bool,
    pub has_grill: bool,
    pub is_condominium: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_golf_club: Option<bool>,
    pub has_shared_rooftop: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_water_front: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Amenities {
    Flags(AmenityFlags),
    Names(Vec<String>),
}

impl Default for Amenities {
    fn default() -> Self {
        Amenities::Names(Vec::new())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListingRecord {
    #[serde(alias = "title", deserialize_with = "lenient::string")]
    pub listing_title: String,
    #[serde(deserialize_with = "lenient::number")]
    pub price: f64,
    #[serde(deserialize_with = "lenient::number")]
    pub price_usd: f64,
    #[serde(deserialize_with = "lenient::string")]
    pub location: String,
    #[serde(alias = "area", deserialize_with = "lenient::number")]
    pub area_in_square_meters: f64,
    #[serde(deserialize_with = "lenient::count")]
    pub number_of_bedrooms: u32,
    #[serde(deserialize_with = "lenient::count")]
    pub number_of_bathrooms: u32,
    #[serde(
        deserialize_with = "lenient::optional_count",
        skip_serializing_if = "Option::is_none"
    )]
    pub number_of_half_bathrooms: Option<u32>,
    #[serde(deserialize_with = "lenient::count")]
    pub parking_spaces: u32,
    #[serde(deserialize_with = "lenient::string")]
    pub property_description: String,
    #[serde(alias = "amenities", deserialize_with = "lenient::amenities")]
    pub development_amenities: Amenities,
    #[serde(deserialize_with = "lenient::string")]
    pub advertiser_name: String,
    #[serde(deserialize_with = "lenient::string")]
    pub contact_phone: String,
    #[serde(deserialize_with = "lenient::string")]
    pub contact_email: String,
    #[serde(deserialize_with = "lenient::photos")]
    pub main_photos: Vec<String>,
    // only ever copied from the extractor, never taken from the model
    #[serde(skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<String>,
    #[serde(skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<String>,
}

/// Deserializers that accept the looser shapes a model sometimes emits
/// (numeric strings, nulls, single values for lists).
mod lenient {
    use once_cell::sync::Lazy;
    use regex::Regex;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    use super::{Amenities, AmenityFlags, MAX_MAIN_PHOTOS};

    static NUMBER_IN_TEXT: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"-?\d[\d,]*(?:\.\d+)?").expect("static regex must compile"));

    fn to_number<E: Error>(value: Value) -> Result<f64, E> {
        match value {
            Value::Null => Ok(0.0),
            Value::Number(n) => n
                .as_f64()
                .ok_or_else(|| E::custom(format!("number out of range: {}", n))),
            Value::String(s) => match NUMBER_IN_TEXT.find(&s) {
                Some(m) => m
                    .as_str()
                    .replace(',', "")
                    .parse::<f64>()
                    .map_err(|e| E::custom(format!("invalid number {:?}: {}", s, e))),
                None => Ok(0.0),
            },
            other => Err(E::custom(format!("expected a number, got {}", other))),
        }
    }

    fn to_count<E: Error>(value: Value) -> Result<u32, E> {
        // `as` saturates, so negatives land on 0
        Ok(to_number::<E>(value)?.round() as u32)
    }

    pub fn string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Null => String::new(),
            Value::String(s) => s,
            other => other.to_string(),
        })
    }

    pub fn number<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        to_number(Value::deserialize(d)?)
    }

    pub fn count<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
        to_count(Value::deserialize(d)?)
    }

    pub fn optional_count<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u32>, D::Error> {
        match Value::deserialize(d)? {
            Value::Null => Ok(None),
            other => to_count(other).map(Some),
        }
    }

    pub fn photos<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
        match Value::deserialize(d)? {
            Value::Null => Ok(Vec::new()),
            Value::String(s) if s.is_empty() => Ok(Vec::new()),
            Value::String(s) => Ok(vec![s]),
            Value::Array(items) => Ok(items
                .into_iter()
                .filter_map(|item| match item {
                    Value::String(s) if !s.is_empty() => Some(s),
                    _ => None,
                })
                .take(MAX_MAIN_PHOTOS)
                .collect()),
            other => Err(D::Error::custom(format!("expected a list of URLs, got {}", other))),
        }
    }

    pub fn amenities<'de, D: Deserializer<'de>>(d: D) -> Result<Amenities, D::Error> {
        match Value::deserialize(d)? {
            Value::Null => Ok(Amenities::default()),
            Value::Object(map) => AmenityFlags::deserialize(Value::Object(map))
                .map(Amenities::Flags)
                .map_err(D::Error::custom),
            Value::Array(items) => Ok(Amenities::Names(
                items
                    .into_iter()
                    .filter_map(|item| match item {
                        Value::String(s) => Some(s.trim().to_string()),
                        _ => None,
                    })
                    .filter(|s| !s.is_empty())
                    .collect(),
            )),
            other => Err(D::Error::custom(format!("expected amenities, got {}", other))),
        }
    }
}

/// What the synthesizer is asked to read.
#[derive(Debug, Clone, Copy)]
pub enum SynthesisInput<'a> {
    /// Categorized page content; its coordinates are carried onto the record.
    Summary(&'a ExtractReport),
    /// Raw caption text from a social-media post.
    Caption(&'a str),
}

#[derive(Clone)]
pub struct ListingSynthesizer {
    model: Arc<dyn LanguageModel>,
    contract: OutputContract,
}

impl ListingSynthesizer {
    pub fn new(model: Arc<dyn LanguageModel>, contract: OutputContract) -> Self {
        Self { model, contract }
    }

    pub fn contract(&self) -> OutputContract {
        self.contract
    }

    pub async fn synthesize(&self, input: SynthesisInput<'_>) -> Result<ListingRecord> {
        let (user, coordinates) = match input {
            SynthesisInput::Summary(report) => {
                (serde_json::to_string(report)?, Some(&report.summary.coordinates))
            }
            SynthesisInput::Caption(text) => (text.to_string(), None),
        };

        let request = ModelRequest {
            system: self.contract.system_prompt().to_string(),
            user,
            format: self.contract.response_format(),
        };
        debug!(contract = ?self.contract, "requesting listing synthesis");

        let output = self
            .model
            .respond(request)
            .await?
            .ok_or_else(|| AppError::LlmError("No response from model".to_string()))?;

        let mut record: ListingRecord = serde_json::from_str(&output).map_err(|e| {
            warn!(error = %e, "model output is not a valid listing");
            AppError::ParseError(format!("Invalid listing JSON from model: {}", e))
        })?;

        if let Some(coordinates) = coordinates {
            record.latitude = coordinates.lat.clone();
            record.longitude = coordinates.lon.clone();
        }
        Ok(record)
    }
}

//! Fetching and filtering of the county boundary feature collection.

use std::collections::BTreeMap;
use std::io::Write;
use std::str::FromStr;

use anyhow::{Context, Result};
use geojson::{Feature, FeatureCollection, GeoJson};
use log::{debug, info};
use serde_json::Value;

use crate::column_names::properties;
use crate::config::{Config, TextEncoding};
use crate::error::{CovidMapError, CovidMapResult};

/// Download the boundary document at `url` and decode it as text.
pub async fn fetch_boundaries(url: &str, encoding: TextEncoding) -> Result<String> {
    info!("Attempting to download boundaries from {url}");
    let bytes = reqwest::Client::new()
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .bytes()
        .await?;
    debug!("Downloaded {} bytes", bytes.len());
    decode(&bytes, encoding)
}

/// Every ISO-8859-1 byte maps to the code point of the same value.
fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

pub fn decode(bytes: &[u8], encoding: TextEncoding) -> Result<String> {
    match encoding {
        TextEncoding::Latin1 => Ok(decode_latin1(bytes)),
        TextEncoding::Utf8 => {
            String::from_utf8(bytes.to_vec()).context("Boundary document is not valid UTF-8")
        }
    }
}

pub fn parse_feature_collection(text: &str) -> CovidMapResult<FeatureCollection> {
    match GeoJson::from_str(text)? {
        GeoJson::FeatureCollection(collection) => Ok(collection),
        _ => Err(CovidMapError::NotAFeatureCollection),
    }
}

fn state_matches(feature: &Feature, state_code: &str) -> bool {
    feature
        .property(properties::STATE)
        .and_then(Value::as_str)
        .is_some_and(|state| state == state_code)
}

/// Keep the features of one state, renaming counties per `corrections`.
///
/// Only the geometry and properties of each feature survive; ids, bounding boxes and foreign
/// members are dropped. Feature order is preserved.
pub fn filter_features(
    collection: FeatureCollection,
    state_code: &str,
    corrections: &BTreeMap<String, String>,
) -> FeatureCollection {
    let features = collection
        .features
        .into_iter()
        .filter(|feature| state_matches(feature, state_code))
        .map(|mut feature| {
            if let Some(props) = feature.properties.as_mut() {
                let corrected = props
                    .get(properties::NAME)
                    .and_then(Value::as_str)
                    .and_then(|name| corrections.get(name));
                if let Some(corrected) = corrected {
                    debug!("Renaming county to '{corrected}'");
                    props.insert(properties::NAME.into(), Value::String(corrected.clone()));
                }
            }
            Feature {
                bbox: None,
                geometry: feature.geometry,
                id: None,
                properties: feature.properties,
                foreign_members: None,
            }
        })
        .collect();

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

pub fn write_feature_collection(
    collection: &FeatureCollection,
    writer: &mut impl Write,
) -> CovidMapResult<()> {
    serde_json::to_writer(&mut *writer, collection)?;
    writer.flush()?;
    Ok(())
}

/// Fetch the configured boundary file and filter it to the configured state.
pub async fn extract_boundaries(config: &Config) -> Result<FeatureCollection> {
    let text = fetch_boundaries(&config.boundaries_url(), config.encoding).await?;
    let collection = parse_feature_collection(&text)?;
    let total = collection.features.len();
    let filtered = filter_features(collection, &config.state_code, &config.name_corrections);
    info!(
        "Kept {} of {total} features for state {}",
        filtered.features.len(),
        config.state_code
    );
    Ok(filtered)
}

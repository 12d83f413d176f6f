use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::bins::ColorBins;
use crate::error::CovidMapResult;

/// Base of the published 2010 US county boundary files; the resolution suffix and extension are
/// appended by `Resolution::url`.
const BOUNDARIES_BASE_URL: &str = "https://eric.clst.org/assets/wiki/uploads/Stuff/gz_2010_us_050_00";

pub const DEFAULT_PLOTLY_CDN: &str = "https://cdn.plot.ly/plotly-2.35.2.min.js";

/// Number of trailing rows summed for the rolling metric
pub const DEFAULT_WINDOW: usize = 14;

/// Denominator the rolling sum is scaled to
pub const PER_100K: f64 = 1e5;

/// Indiana's FIPS state code
pub const INDIANA_STATE_CODE: &str = "18";

/// Resolution of the county boundary file to download.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Serialize, EnumString, Display, PartialEq, Eq,
)]
#[strum(ascii_case_insensitive, serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    /// 1:20,000,000
    Low,
    /// 1:5,000,000
    #[default]
    Medium,
    /// 1:500,000
    High,
}

impl Resolution {
    pub fn url(&self) -> String {
        let suffix = match self {
            Resolution::Low => "20m",
            Resolution::Medium => "5m",
            Resolution::High => "500k",
        };
        format!("{BOUNDARIES_BASE_URL}_{suffix}.json")
    }
}

/// Character encoding of the downloaded boundary document.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Serialize, EnumString, Display, PartialEq, Eq,
)]
#[strum(ascii_case_insensitive, serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TextEncoding {
    /// ISO-8859-1, which the census boundary files are published in
    #[default]
    Latin1,
    Utf8,
}

/// Where the rendered page loads plotly.js from.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum PlotlyJs {
    /// The copy of plotly.js bundled with the `plotly` crate, inlined so the page works offline
    #[default]
    Embedded,
    /// Loaded by the browser from this URL
    Cdn(String),
    /// Path to a local copy of plotly.js that is inlined into the page
    Inline(PathBuf),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub resolution: Resolution,
    /// Overrides the resolution-derived URL when set
    pub boundaries_url: Option<String>,
    pub state_code: String,
    pub encoding: TextEncoding,
    /// Boundary county name -> name used by the case dataset
    pub name_corrections: BTreeMap<String, String>,
    pub window: usize,
    pub per: f64,
    pub bins: Vec<f64>,
    pub palette: Vec<String>,
    pub title: String,
    pub projection: String,
    pub plotly_js: PlotlyJs,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            resolution: Resolution::default(),
            boundaries_url: None,
            state_code: INDIANA_STATE_CODE.into(),
            encoding: TextEncoding::default(),
            name_corrections: default_name_corrections(),
            window: DEFAULT_WINDOW,
            per: PER_100K,
            bins: crate::bins::DEFAULT_THRESHOLDS.to_vec(),
            palette: crate::bins::CIVIDIS_7
                .iter()
                .map(|c| c.to_string())
                .collect(),
            title: "14-Day Cumulative COVID-19 Cases per 100,000 Residents".into(),
            projection: "mercator".into(),
            plotly_js: PlotlyJs::default(),
        }
    }
}

impl Config {
    /// The URL the boundary file is fetched from
    pub fn boundaries_url(&self) -> String {
        self.boundaries_url
            .clone()
            .unwrap_or_else(|| self.resolution.url())
    }

    pub fn color_bins(&self) -> CovidMapResult<ColorBins> {
        ColorBins::new(self.bins.clone(), self.palette.clone())
    }
}

/// Boundary names that are spelled differently in the case dataset.
// "LaGrange" -> "Lagrange" matches the case dataset as published; override it in the config file
// if a later release changes the spelling.
pub fn default_name_corrections() -> BTreeMap<String, String> {
    [
        ("DeKalb", "De Kalb"),
        ("LaGrange", "Lagrange"),
        ("LaPorte", "La Porte"),
    ]
    .into_iter()
    .map(|(from, to)| (from.to_string(), to.to_string()))
    .collect()
}

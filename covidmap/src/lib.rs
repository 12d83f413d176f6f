use std::path::Path;

use anyhow::{Context, Result};
use geojson::FeatureCollection;
use log::debug;
use polars::frame::DataFrame;

use crate::config::Config;
use crate::render::{ChoroplethMap, MapOptions};

// Re-exports
pub use column_names as COL;

// Modules
pub mod bins;
pub mod boundaries;
pub mod column_names;
pub mod config;
pub mod error;
pub mod formatters;
pub mod metric;
pub mod render;
pub mod tables;

/// Type for the covidmap pipelines
pub struct CovidMap {
    pub config: Config,
}

impl CovidMap {
    /// Setup the CovidMap object with default configuration
    pub fn new() -> Self {
        Self::new_with_config(Config::default())
    }

    /// Setup the CovidMap object with custom configuration
    pub fn new_with_config(config: Config) -> Self {
        debug!("config: {config:?}");
        Self { config }
    }

    /// Downloads the boundary file and keeps the configured state's counties
    pub async fn boundaries(&self) -> Result<FeatureCollection> {
        boundaries::extract_boundaries(&self.config).await
    }

    /// Loads the case and population tables and computes the rolling rate
    pub fn rates<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        cases: P,
        population: Q,
    ) -> Result<DataFrame> {
        let cases = tables::load_cases(cases)?;
        let population = tables::load_population(population)?;
        Ok(metric::case_rates(
            &cases,
            &population,
            self.config.window,
            self.config.per,
        )?)
    }

    /// Builds the choropleth from the case and population tables and a previously extracted
    /// boundary file
    pub fn choropleth<P: AsRef<Path>, Q: AsRef<Path>, R: AsRef<Path>>(
        &self,
        cases: P,
        population: Q,
        boundaries_path: R,
    ) -> Result<ChoroplethMap> {
        let path = boundaries_path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read boundaries from {}", path.display()))?;
        let collection = boundaries::parse_feature_collection(&text)?;
        let rates = self.rates(cases, population)?;
        Ok(ChoroplethMap::new(
            rates,
            collection,
            self.config.color_bins()?,
            MapOptions::from(&self.config),
        ))
    }
}

impl Default for CovidMap {
    fn default() -> Self {
        Self::new()
    }
}

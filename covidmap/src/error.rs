//! Error types.

#[derive(thiserror::Error, Debug)]
pub enum CovidMapError {
    #[error("Wrapped anyhow error: {0}")]
    AnyhowError(#[from] anyhow::Error),
    #[error("Counties missing from the population table: {}", .0.join(", "))]
    MissingPopulation(Vec<String>),
    #[error("Counties listed more than once in the population table: {}", .0.join(", "))]
    DuplicatePopulation(Vec<String>),
    #[error("Population must be positive for county: {0}")]
    NonPositivePopulation(String),
    #[error("Required column not found: {0}")]
    MissingColumn(String),
    #[error("Null value in column '{column}' at row {row}")]
    NullValue { column: String, row: usize },
    #[error("Invalid date '{0}'")]
    InvalidDate(String),
    #[error("No case rows to render")]
    EmptyTable,
    #[error("Rolling window must cover at least one row")]
    InvalidWindow,
    #[error("Invalid colour bins: {0}")]
    InvalidBins(String),
    #[error("Boundary document is not a GeoJSON FeatureCollection")]
    NotAFeatureCollection,
    #[error("Wrapped geojson error: {0}")]
    GeoJsonError(#[from] geojson::Error),
    #[error("Wrapped polars error: {0}")]
    PolarsError(#[from] polars::error::PolarsError),
    #[error("Wrapped spreadsheet error: {0}")]
    SpreadsheetError(#[from] calamine::Error),
    #[error("Wrapped serde JSON error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),
    #[error("std IO error: {0}")]
    IOError(#[from] std::io::Error),
}

pub type CovidMapResult<T> = Result<T, CovidMapError>;

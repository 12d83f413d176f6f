//! Loading of the case and population tables.

use std::ffi::OsStr;
use std::path::Path;

use calamine::{open_workbook_auto, Data, DataType as _, Reader};
use chrono::{NaiveDate, NaiveDateTime};
use itertools::Itertools;
use log::{debug, info};
use polars::prelude::*;

use crate::error::{CovidMapError, CovidMapResult};
use crate::COL;

/// Formats accepted in the DATE column
const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%m/%d/%Y"];
/// Spreadsheet exports write dates as midnight timestamps
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
/// Extensions read with the workbook reader rather than as CSV
const SPREADSHEET_EXTENSIONS: [&str; 5] = ["xlsx", "xlsm", "xlsb", "xls", "ods"];

fn read_csv<P: AsRef<Path>>(path: P) -> CovidMapResult<DataFrame> {
    let path = path.as_ref();
    info!("Reading table from {}", path.display());
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;
    debug!("Read table with shape: {:?}", df.shape());
    Ok(df)
}

fn is_spreadsheet(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .is_some_and(|ext| {
            SPREADSHEET_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
}

/// Text of a workbook cell. Date cells are written as `YYYY-MM-DD`; empty and error cells are
/// null.
fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty | Data::Error(_) => None,
        Data::DateTime(_) | Data::DateTimeIso(_) => cell
            .as_date()
            .map(|date| date.format("%Y-%m-%d").to_string()),
        other => Some(other.to_string()),
    }
}

/// Read the first worksheet of a workbook. The first row holds the headers and every column is
/// read as text.
fn read_spreadsheet(path: &Path) -> CovidMapResult<DataFrame> {
    info!("Reading workbook from {}", path.display());
    let mut workbook = open_workbook_auto(path)?;
    let range = match workbook.worksheet_range_at(0) {
        Some(range) => range?,
        None => return Ok(DataFrame::empty()),
    };
    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        return Ok(DataFrame::empty());
    };
    let body = rows.collect_vec();
    let columns = header
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            let name = match cell_text(name) {
                Some(name) if !name.trim().is_empty() => name.trim().to_string(),
                _ => format!("column_{}", idx + 1),
            };
            let values: Vec<Option<String>> = body
                .iter()
                .map(|row| row.get(idx).and_then(cell_text))
                .collect();
            Series::new(&name, values)
        })
        .collect_vec();
    let df = DataFrame::new(columns)?;
    debug!("Read workbook table with shape: {:?}", df.shape());
    Ok(df)
}

/// Read a table from a CSV file, or from a workbook when the extension says so.
fn read_table<P: AsRef<Path>>(path: P) -> CovidMapResult<DataFrame> {
    let path = path.as_ref();
    if is_spreadsheet(path) {
        read_spreadsheet(path)
    } else {
        read_csv(path)
    }
}

fn require_column<'a>(df: &'a DataFrame, name: &str) -> CovidMapResult<&'a Series> {
    df.column(name)
        .map_err(|_| CovidMapError::MissingColumn(name.to_string()))
}

/// Values of a column as strings, failing on the first null.
pub(crate) fn string_values(series: &Series) -> CovidMapResult<Vec<String>> {
    let series = series.cast(&DataType::String)?;
    series
        .str()?
        .into_iter()
        .enumerate()
        .map(|(row, value)| {
            value
                .map(|v| v.trim().to_string())
                .ok_or_else(|| CovidMapError::NullValue {
                    column: series.name().to_string(),
                    row,
                })
        })
        .collect()
}

/// Values of a column as floats, failing on the first null.
pub(crate) fn float_values(series: &Series) -> CovidMapResult<Vec<f64>> {
    let series = series.cast(&DataType::Float64)?;
    series
        .f64()?
        .into_iter()
        .enumerate()
        .map(|(row, value)| {
            value.ok_or_else(|| CovidMapError::NullValue {
                column: series.name().to_string(),
                row,
            })
        })
        .collect()
}

pub(crate) fn int_values(series: &Series) -> CovidMapResult<Vec<i64>> {
    let series = series.cast(&DataType::Int64)?;
    series
        .i64()?
        .into_iter()
        .enumerate()
        .map(|(row, value)| {
            value.ok_or_else(|| CovidMapError::NullValue {
                column: series.name().to_string(),
                row,
            })
        })
        .collect()
}

/// Normalise a date cell to `YYYY-MM-DD`.
pub fn normalize_date(value: &str) -> CovidMapResult<String> {
    let value = value.trim();
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
        .or_else(|| {
            NaiveDateTime::parse_from_str(value, DATETIME_FORMAT)
                .ok()
                .map(|dt| dt.date())
        })
        .map(|date| date.format("%Y-%m-%d").to_string())
        .ok_or_else(|| CovidMapError::InvalidDate(value.to_string()))
}

/// Build the case table from raw `DATE`, `COUNTY_NAME` and `COVID_COUNT` columns.
pub fn cases_from_frame(df: &DataFrame) -> CovidMapResult<DataFrame> {
    let dates = string_values(require_column(df, COL::DATE)?)?
        .iter()
        .map(|date| normalize_date(date))
        .collect::<CovidMapResult<Vec<String>>>()?;
    let counties = string_values(require_column(df, COL::COUNTY_NAME)?)?;
    let counts = int_values(require_column(df, COL::COVID_COUNT)?)?;

    Ok(DataFrame::new(vec![
        Series::new(COL::DATE, dates),
        Series::new(COL::COUNTY_NAME, counties),
        Series::new(COL::COVID_COUNT, counts),
    ])?)
}

/// Load the case table: one row per county and date with the count of new confirmed cases.
pub fn load_cases<P: AsRef<Path>>(path: P) -> CovidMapResult<DataFrame> {
    let cases = cases_from_frame(&read_table(path)?)?;
    info!("Loaded {} case rows", cases.height());
    Ok(cases)
}

/// Build the population table from the first two columns of `df` (county name, population),
/// whatever their headers.
pub fn population_from_frame(df: &DataFrame) -> CovidMapResult<DataFrame> {
    let columns = df.get_columns();
    if columns.len() < 2 {
        return Err(CovidMapError::MissingColumn(COL::POPULATION.to_string()));
    }
    let counties = string_values(&columns[0])?;
    let populations = int_values(&columns[1])?;

    let duplicates = counties.iter().duplicates().cloned().collect_vec();
    if !duplicates.is_empty() {
        return Err(CovidMapError::DuplicatePopulation(duplicates));
    }
    if let Some((county, _)) = counties
        .iter()
        .zip(&populations)
        .find(|(_, population)| **population <= 0)
    {
        return Err(CovidMapError::NonPositivePopulation(county.clone()));
    }

    Ok(DataFrame::new(vec![
        Series::new(COL::COUNTY_NAME, counties),
        Series::new(COL::POPULATION, populations),
    ])?)
}

/// Load the two-column county -> population table.
pub fn load_population<P: AsRef<Path>>(path: P) -> CovidMapResult<DataFrame> {
    let population = population_from_frame(&read_table(path)?)?;
    info!("Loaded population for {} counties", population.height());
    Ok(population)
}

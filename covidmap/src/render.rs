//! Builds the animated choropleth as a plotly figure.
//!
//! One frame is produced per date, in the order dates first appear in the table. The base trace
//! carries the boundary geometry; frames only update the locations, values and hover data.

use std::collections::HashMap;

use geojson::FeatureCollection;
use itertools::izip;
use log::{debug, info};
use polars::frame::DataFrame;
use serde_json::{json, Value};

use crate::bins::ColorBins;
use crate::column_names::properties;
use crate::config::Config;
use crate::error::{CovidMapError, CovidMapResult};
use crate::tables::{float_values, int_values, string_values};
use crate::COL;

const FRAME_DURATION_MS: u64 = 500;

/// Presentation options for the rendered map
#[derive(Debug, Clone, PartialEq)]
pub struct MapOptions {
    pub title: String,
    pub projection: String,
    /// Path of the feature property matched against county names
    pub feature_id_key: String,
}

impl Default for MapOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for MapOptions {
    fn from(config: &Config) -> Self {
        Self {
            title: config.title.clone(),
            projection: config.projection.clone(),
            feature_id_key: format!("properties.{}", properties::NAME),
        }
    }
}

/// One row of the map: a county's value on a given date.
#[derive(Debug, Clone, PartialEq)]
pub struct MapRow {
    pub county: String,
    pub rate: f64,
    pub count: i64,
    pub population: i64,
}

/// All rows sharing a date.
#[derive(Debug, Clone, PartialEq)]
pub struct DateFrame {
    pub date: String,
    pub rows: Vec<MapRow>,
}

impl DateFrame {
    fn trace(&self) -> Value {
        let locations: Vec<&str> = self.rows.iter().map(|r| r.county.as_str()).collect();
        let z: Vec<f64> = self.rows.iter().map(|r| r.rate).collect();
        let customdata: Vec<Value> = self
            .rows
            .iter()
            .map(|r| json!([self.date, r.county, r.rate, r.count, r.population]))
            .collect();
        json!({
            "type": "choropleth",
            "name": "",
            "locations": locations,
            "z": z,
            "customdata": customdata,
            "coloraxis": "coloraxis",
            "hovertemplate": hover_template(),
        })
    }
}

fn hover_template() -> String {
    [
        COL::DATE,
        COL::COUNTY_NAME,
        COL::ROLLING_PER_100K,
        COL::COVID_COUNT,
        COL::POPULATION,
    ]
    .iter()
    .enumerate()
    .map(|(idx, name)| format!("{name}=%{{customdata[{idx}]}}"))
    .collect::<Vec<_>>()
    .join("<br>")
        + "<extra></extra>"
}

fn animate_args(frames: Value, duration: u64) -> Value {
    json!([
        frames,
        {
            "frame": { "duration": duration, "redraw": true },
            "mode": "immediate",
            "fromcurrent": true,
            "transition": { "duration": duration, "easing": "linear" }
        }
    ])
}

/// Group the rate table into per-date frames, dates in order of first appearance.
pub fn date_frames(rates: &DataFrame) -> CovidMapResult<Vec<DateFrame>> {
    let dates = string_values(rates.column(COL::DATE)?)?;
    let counties = string_values(rates.column(COL::COUNTY_NAME)?)?;
    let values = float_values(rates.column(COL::ROLLING_PER_100K)?)?;
    let counts = int_values(rates.column(COL::COVID_COUNT)?)?;
    let populations = int_values(rates.column(COL::POPULATION)?)?;

    let mut frames: Vec<DateFrame> = vec![];
    let mut frame_index: HashMap<String, usize> = HashMap::new();
    for (date, county, rate, count, population) in
        izip!(dates, counties, values, counts, populations)
    {
        let row = MapRow {
            county,
            rate,
            count,
            population,
        };
        match frame_index.get(&date) {
            Some(&idx) => frames[idx].rows.push(row),
            None => {
                frame_index.insert(date.clone(), frames.len());
                frames.push(DateFrame {
                    date,
                    rows: vec![row],
                });
            }
        }
    }
    debug!("Grouped rows into {} date frames", frames.len());
    Ok(frames)
}

/// The processed table plus everything needed to draw it
#[derive(Debug, Clone)]
pub struct ChoroplethMap {
    rates: DataFrame,
    boundaries: FeatureCollection,
    bins: ColorBins,
    options: MapOptions,
}

impl ChoroplethMap {
    pub fn new(
        rates: DataFrame,
        boundaries: FeatureCollection,
        bins: ColorBins,
        options: MapOptions,
    ) -> Self {
        Self {
            rates,
            boundaries,
            bins,
            options,
        }
    }

    pub fn rates(&self) -> &DataFrame {
        &self.rates
    }

    pub fn bins(&self) -> &ColorBins {
        &self.bins
    }

    pub fn options(&self) -> &MapOptions {
        &self.options
    }

    fn layout(&self, frames: &[DateFrame]) -> Value {
        let steps: Vec<Value> = frames
            .iter()
            .map(|frame| {
                json!({
                    "label": frame.date,
                    "method": "animate",
                    "args": animate_args(json!([frame.date]), 0),
                })
            })
            .collect();

        json!({
            "title": { "text": self.options.title },
            "geo": {
                "fitbounds": "locations",
                "visible": true,
                "projection": { "type": self.options.projection },
            },
            "coloraxis": {
                "cmin": self.bins.cmin(),
                "cmax": self.bins.cmax(),
                "colorscale": self.bins.colorscale(),
                "colorbar": {
                    "title": { "text": "" },
                    "tickvals": self.bins.tick_values(),
                    "ticktext": self.bins.tick_labels(),
                },
            },
            "sliders": [{
                "active": 0,
                "currentvalue": { "prefix": format!("{}=", COL::DATE) },
                "len": 0.9,
                "x": 0.1,
                "pad": { "b": 10, "t": 60 },
                "steps": steps,
            }],
            "updatemenus": [{
                "type": "buttons",
                "direction": "left",
                "showactive": false,
                "x": 0.1,
                "y": 0,
                "xanchor": "right",
                "yanchor": "top",
                "pad": { "r": 10, "t": 70 },
                "buttons": [
                    {
                        "label": "&#9654;",
                        "method": "animate",
                        "args": animate_args(Value::Null, FRAME_DURATION_MS),
                    },
                    {
                        "label": "&#9724;",
                        "method": "animate",
                        "args": animate_args(json!([null]), 0),
                    },
                ],
            }],
        })
    }

    /// The full plotly figure: base trace, layout and one frame per date.
    pub fn figure(&self) -> CovidMapResult<Value> {
        let frames = date_frames(&self.rates)?;
        let first = frames.first().ok_or(CovidMapError::EmptyTable)?;

        let mut base_trace = first.trace();
        base_trace["geojson"] = serde_json::to_value(&self.boundaries)?;
        base_trace["featureidkey"] = json!(self.options.feature_id_key);

        let animation_frames: Vec<Value> = frames
            .iter()
            .map(|frame| json!({ "name": frame.date, "data": [frame.trace()] }))
            .collect();
        info!(
            "Built figure with {} frames over {} boundaries",
            animation_frames.len(),
            self.boundaries.features.len()
        );

        Ok(json!({
            "data": [base_trace],
            "layout": self.layout(&frames),
            "frames": animation_frames,
        }))
    }
}

//! Discrete colour bins for the choropleth colour axis.
//!
//! Each interval between two consecutive thresholds is shaded with a single flat colour. The
//! plotly colour scale is made piecewise-constant by emitting two stops per bin, one at each end
//! of the interval, carrying the same colour.

use serde::{Deserialize, Serialize};

use crate::error::{CovidMapError, CovidMapResult};

/// Thresholds of the rolling rate per 100,000 residents
pub const DEFAULT_THRESHOLDS: [f64; 8] = [0.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 550.0];

/// The cividis colour map sampled at seven evenly spaced stops
pub const CIVIDIS_7: [&str; 7] = [
    "#00224e", "#233e6c", "#4f576c", "#7c7b78", "#a59c74", "#d3c064", "#fee838",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorBins {
    thresholds: Vec<f64>,
    palette: Vec<String>,
}

impl ColorBins {
    /// `thresholds` must be finite and strictly ascending with one more entry than `palette`.
    pub fn new(thresholds: Vec<f64>, palette: Vec<String>) -> CovidMapResult<Self> {
        if thresholds.len() < 2 {
            return Err(CovidMapError::InvalidBins(
                "at least two thresholds are required".into(),
            ));
        }
        if thresholds.iter().any(|t| !t.is_finite()) {
            return Err(CovidMapError::InvalidBins(
                "thresholds must be finite".into(),
            ));
        }
        if thresholds.windows(2).any(|w| w[0] >= w[1]) {
            return Err(CovidMapError::InvalidBins(
                "thresholds must be strictly ascending".into(),
            ));
        }
        if palette.len() != thresholds.len() - 1 {
            return Err(CovidMapError::InvalidBins(format!(
                "{} thresholds need {} colours, got {}",
                thresholds.len(),
                thresholds.len() - 1,
                palette.len()
            )));
        }
        Ok(Self {
            thresholds,
            palette,
        })
    }

    /// Number of bins
    pub fn len(&self) -> usize {
        self.palette.len()
    }

    pub fn is_empty(&self) -> bool {
        self.palette.is_empty()
    }

    pub fn thresholds(&self) -> &[f64] {
        &self.thresholds
    }

    pub fn cmin(&self) -> f64 {
        self.thresholds[0]
    }

    pub fn cmax(&self) -> f64 {
        self.thresholds[self.thresholds.len() - 1]
    }

    /// Index of the bin holding `value`. Values at or above the top bound land in the final bin,
    /// values below the first bound (and NaN) in the first.
    pub fn bin_index(&self, value: f64) -> usize {
        self.thresholds[1..self.thresholds.len() - 1]
            .iter()
            .take_while(|&&bound| value >= bound)
            .count()
    }

    pub fn color_for(&self, value: f64) -> &str {
        &self.palette[self.bin_index(value)]
    }

    /// Piecewise-constant plotly colour scale over `[cmin, cmax]` normalised to `[0, 1]`.
    pub fn colorscale(&self) -> Vec<(f64, String)> {
        let span = self.cmax() - self.cmin();
        self.thresholds
            .windows(2)
            .zip(&self.palette)
            .flat_map(|(bounds, color)| {
                [
                    ((bounds[0] - self.cmin()) / span, color.clone()),
                    ((bounds[1] - self.cmin()) / span, color.clone()),
                ]
            })
            .collect()
    }

    /// Legend tick positions at the middle of each bin
    pub fn tick_values(&self) -> Vec<f64> {
        self.thresholds
            .windows(2)
            .map(|w| w[0] + (w[1] - w[0]) / 2.0)
            .collect()
    }

    pub fn tick_labels(&self) -> Vec<String> {
        (0..self.len())
            .map(|idx| format!("  {}", self.bin_label(idx)))
            .collect()
    }

    /// Label of the bin at `index`, e.g. `10-24`. The final bin is open ended (`500+`).
    pub fn bin_label(&self, index: usize) -> String {
        let lo = self.thresholds[index];
        if index + 1 >= self.len() {
            format!("{lo}+")
        } else {
            format!("{lo}-{}", self.thresholds[index + 1] - 1.0)
        }
    }
}

impl Default for ColorBins {
    fn default() -> Self {
        Self {
            thresholds: DEFAULT_THRESHOLDS.to_vec(),
            palette: CIVIDIS_7.iter().map(|c| c.to_string()).collect(),
        }
    }
}

//! This module stores the column names of the case and population tables, along with the derived
//! columns added while computing the rolling metric. Note that the input names must match the
//! headers of the exported case spreadsheet.

pub const DATE: &str = "DATE";
pub const COUNTY_NAME: &str = "COUNTY_NAME";
pub const COVID_COUNT: &str = "COVID_COUNT";

pub const POPULATION: &str = "POPULATION";

pub const ROLLING_SUM: &str = "ROLLING_SUM";
pub const ROLLING_PER_100K: &str = "ROLLING_PER_100K";

/// Temporary column used to restore the original row order after a join
pub const ROW_INDEX: &str = "__row_index";

/// Property keys of a boundary feature
pub mod properties {
    pub const STATE: &str = "STATE";
    pub const NAME: &str = "NAME";
}

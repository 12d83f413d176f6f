//! The rolling per-capita case rate.
//!
//! For every row the trailing `window` counts of the same county are summed (fewer at the start
//! of a county's series) and scaled to a rate per `per` residents.

use std::collections::{HashMap, VecDeque};

use itertools::Itertools;
use log::{debug, info};
use polars::prelude::*;

use crate::error::{CovidMapError, CovidMapResult};
use crate::tables::{float_values, string_values};
use crate::COL;

/// Trailing sum over `min(window, i + 1)` values for every index `i`.
pub fn rolling_sum(values: &[f64], window: usize) -> Vec<f64> {
    (0..values.len())
        .map(|idx| {
            let start = (idx + 1).saturating_sub(window);
            values[start..=idx].iter().sum()
        })
        .collect()
}

/// `rolling_sum` computed independently for each group, where a group's series is the
/// subsequence of rows sharing its key. The output is aligned with the input rows.
pub fn grouped_rolling_sum<S: AsRef<str>>(groups: &[S], values: &[f64], window: usize) -> Vec<f64> {
    let mut trailing: HashMap<&str, VecDeque<f64>> = HashMap::new();
    groups
        .iter()
        .zip(values)
        .map(|(group, &value)| {
            let series = trailing.entry(group.as_ref()).or_default();
            series.push_back(value);
            if series.len() > window {
                series.pop_front();
            }
            series.iter().sum()
        })
        .collect()
}

pub fn per_capita(sum: f64, population: f64, per: f64) -> f64 {
    sum * per / population
}

/// Join each case row with its county's population, keeping the case row order.
///
/// Every county in `cases` must be present in `population`.
pub fn attach_population(cases: &DataFrame, population: &DataFrame) -> CovidMapResult<DataFrame> {
    let joined = cases
        .clone()
        .lazy()
        .with_row_index(COL::ROW_INDEX, None)
        .join(
            population.clone().lazy(),
            [col(COL::COUNTY_NAME)],
            [col(COL::COUNTY_NAME)],
            JoinArgs::new(JoinType::Left),
        )
        .sort([COL::ROW_INDEX], SortMultipleOptions::default())
        .select([col("*").exclude([COL::ROW_INDEX])])
        .collect()?;

    let missing = joined
        .column(COL::COUNTY_NAME)?
        .str()?
        .into_iter()
        .zip(joined.column(COL::POPULATION)?.i64()?)
        .filter_map(|(county, population)| match population {
            None => county.map(|c| c.to_string()),
            Some(_) => None,
        })
        .unique()
        .sorted()
        .collect_vec();
    if !missing.is_empty() {
        return Err(CovidMapError::MissingPopulation(missing));
    }
    debug!("Joined population onto {} rows", joined.height());
    Ok(joined)
}

/// Add the `ROLLING_SUM` and `ROLLING_PER_100K` columns to a table already carrying
/// `POPULATION`.
pub fn with_rolling_rate(mut df: DataFrame, window: usize, per: f64) -> CovidMapResult<DataFrame> {
    if window == 0 {
        return Err(CovidMapError::InvalidWindow);
    }
    let counties = string_values(df.column(COL::COUNTY_NAME)?)?;
    let counts = float_values(df.column(COL::COVID_COUNT)?)?;
    let populations = float_values(df.column(COL::POPULATION)?)?;

    let sums = grouped_rolling_sum(&counties, &counts, window);
    let rates = sums
        .iter()
        .zip(&populations)
        .map(|(&sum, &population)| per_capita(sum, population, per))
        .collect_vec();

    df.with_column(Series::new(COL::ROLLING_SUM, sums))?;
    df.with_column(Series::new(COL::ROLLING_PER_100K, rates))?;
    Ok(df)
}

/// Join the population table onto the cases and compute the rolling rate.
pub fn case_rates(
    cases: &DataFrame,
    population: &DataFrame,
    window: usize,
    per: f64,
) -> CovidMapResult<DataFrame> {
    let joined = attach_population(cases, population)?;
    let rates = with_rolling_rate(joined, window, per)?;
    info!(
        "Computed {window}-row rolling rate for {} rows",
        rates.height()
    );
    Ok(rates)
}

/// Rows of the most recent date, highest rate first.
pub fn latest_rates(rates: &DataFrame) -> CovidMapResult<DataFrame> {
    // Dates are normalised to YYYY-MM-DD so the lexicographic maximum is the latest one
    let latest = rates
        .column(COL::DATE)?
        .str()?
        .into_iter()
        .flatten()
        .max()
        .map(|date| date.to_string());
    let Some(latest) = latest else {
        return Ok(rates.clear());
    };
    Ok(rates
        .clone()
        .lazy()
        .filter(col(COL::DATE).eq(lit(latest)))
        .sort(
            [COL::ROLLING_PER_100K],
            SortMultipleOptions::default().with_order_descending(true),
        )
        .collect()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-9, "{a} != {e}");
        }
    }

    #[test]
    fn three_rows_single_county() {
        let cases = df!(
            COL::DATE => &["2020-03-06", "2020-03-07", "2020-03-08"],
            COL::COUNTY_NAME => &["Adams", "Adams", "Adams"],
            COL::COVID_COUNT => &[10i64, 20, 30]
        )
        .unwrap();
        let population = df!(
            COL::COUNTY_NAME => &["Adams"],
            COL::POPULATION => &[1_000_000i64]
        )
        .unwrap();

        let rates = case_rates(&cases, &population, 14, 1e5).unwrap();
        let sums = float_values(rates.column(COL::ROLLING_SUM).unwrap()).unwrap();
        let per_100k = float_values(rates.column(COL::ROLLING_PER_100K).unwrap()).unwrap();
        assert_close(&sums, &[10.0, 30.0, 60.0]);
        assert_close(&per_100k, &[1.0, 3.0, 6.0]);
    }

    #[test]
    fn partial_windows_at_series_start() {
        let values: Vec<f64> = (1..=20).map(f64::from).collect();
        let sums = rolling_sum(&values, 14);
        for (idx, sum) in sums.iter().enumerate() {
            let start = (idx + 1).saturating_sub(14);
            let expected: f64 = values[start..=idx].iter().sum();
            assert_eq!(*sum, expected, "Row {idx} should sum min(14, {}) values", idx + 1);
        }
        // First 13 rows use a shorter window rather than zero padding
        assert_eq!(sums[0], 1.0);
        assert_eq!(sums[12], (1..=13).sum::<i32>() as f64);
        assert_eq!(sums[13], (1..=14).sum::<i32>() as f64);
        assert_eq!(sums[19], (7..=20).sum::<i32>() as f64);
    }

    #[test]
    fn groups_roll_independently() {
        let groups = ["a", "b", "a", "b", "a", "a"];
        let values = [1.0, 100.0, 2.0, 200.0, 3.0, 4.0];
        let sums = grouped_rolling_sum(&groups, &values, 3);
        assert_eq!(sums, vec![1.0, 100.0, 3.0, 300.0, 6.0, 9.0]);
    }

    #[test]
    fn grouped_matches_per_group_rolling_sum() {
        let counties = ["x", "y", "z"];
        let groups = (0..60).map(|i| counties[(i * 7) % 3]).collect_vec();
        let values = (0..60).map(|i| f64::from((i * 13) % 17)).collect_vec();
        let grouped = grouped_rolling_sum(&groups, &values, 14);

        for county in counties {
            let rows = (0..60).filter(|&i| groups[i] == county).collect_vec();
            let series = rows.iter().map(|&i| values[i]).collect_vec();
            let expected = rolling_sum(&series, 14);
            for (row, expected) in rows.iter().zip(expected) {
                assert_eq!(grouped[*row], expected);
            }
        }
    }

    #[test]
    fn join_preserves_case_order() {
        let cases = df!(
            COL::DATE => &["2020-03-06", "2020-03-06", "2020-03-07", "2020-03-07"],
            COL::COUNTY_NAME => &["Allen", "Adams", "Allen", "Adams"],
            COL::COVID_COUNT => &[4i64, 1, 6, 3]
        )
        .unwrap();
        let population = df!(
            COL::COUNTY_NAME => &["Adams", "Allen"],
            COL::POPULATION => &[100_000i64, 200_000]
        )
        .unwrap();

        let rates = case_rates(&cases, &population, 14, 1e5).unwrap();
        assert_eq!(
            string_values(rates.column(COL::COUNTY_NAME).unwrap()).unwrap(),
            vec!["Allen", "Adams", "Allen", "Adams"]
        );
        let per_100k = float_values(rates.column(COL::ROLLING_PER_100K).unwrap()).unwrap();
        assert_close(&per_100k, &[2.0, 1.0, 5.0, 4.0]);
    }

    #[test]
    fn missing_population_is_an_error() {
        let cases = df!(
            COL::DATE => &["2020-03-06", "2020-03-06", "2020-03-07"],
            COL::COUNTY_NAME => &["Adams", "Brown", "Brown"],
            COL::COVID_COUNT => &[1i64, 2, 3]
        )
        .unwrap();
        let population = df!(
            COL::COUNTY_NAME => &["Adams"],
            COL::POPULATION => &[35_777i64]
        )
        .unwrap();

        let result = attach_population(&cases, &population);
        assert!(matches!(
            result,
            Err(CovidMapError::MissingPopulation(counties)) if counties == vec!["Brown"]
        ));
    }

    #[test]
    fn zero_window_is_rejected() {
        let df = df!(
            COL::COUNTY_NAME => &["Adams"],
            COL::COVID_COUNT => &[1i64],
            COL::POPULATION => &[35_777i64]
        )
        .unwrap();
        assert!(matches!(
            with_rolling_rate(df, 0, 1e5),
            Err(CovidMapError::InvalidWindow)
        ));
    }

    #[test]
    fn latest_rates_are_sorted_descending() {
        let cases = df!(
            COL::DATE => &["2020-03-06", "2020-03-06", "2020-03-07", "2020-03-07"],
            COL::COUNTY_NAME => &["Adams", "Allen", "Adams", "Allen"],
            COL::COVID_COUNT => &[1i64, 4, 3, 6]
        )
        .unwrap();
        let population = df!(
            COL::COUNTY_NAME => &["Adams", "Allen"],
            COL::POPULATION => &[100_000i64, 200_000]
        )
        .unwrap();
        let rates = case_rates(&cases, &population, 14, 1e5).unwrap();

        let latest = latest_rates(&rates).unwrap();
        assert_eq!(latest.height(), 2, "Only the latest date should remain");
        assert_eq!(
            string_values(latest.column(COL::COUNTY_NAME).unwrap()).unwrap(),
            vec!["Allen", "Adams"]
        );
    }
}

use comfy_table::{presets::NOTHING, *};
use covidmap::{bins::ColorBins, COL};
use itertools::izip;
use polars::frame::DataFrame;

/// Print the most recent rolling rate per county, one row per county.
pub fn display_latest(
    latest: DataFrame,
    bins: &ColorBins,
    max_results: Option<usize>,
) -> anyhow::Result<()> {
    let df_to_show = match max_results {
        Some(max) => latest.head(Some(max)),
        None => latest,
    };
    let mut table = Table::new();
    table
        .load_preset(NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Date").add_attribute(Attribute::Bold),
            Cell::new("County").add_attribute(Attribute::Bold),
            Cell::new("Rolling cases").add_attribute(Attribute::Bold),
            Cell::new("Population").add_attribute(Attribute::Bold),
            Cell::new("Per 100,000").add_attribute(Attribute::Bold),
            Cell::new("Bin").add_attribute(Attribute::Bold),
        ])
        .set_style(comfy_table::TableComponent::BottomBorder, '─')
        .set_style(comfy_table::TableComponent::MiddleHeaderIntersections, '─')
        .set_style(comfy_table::TableComponent::HeaderLines, '─')
        .set_style(comfy_table::TableComponent::BottomBorderIntersections, '─')
        .set_style(comfy_table::TableComponent::TopBorder, '─')
        .set_style(comfy_table::TableComponent::TopBorderIntersections, '─');
    for (date, county, rolling_sum, population, rate) in izip!(
        df_to_show.column(COL::DATE)?.str()?,
        df_to_show.column(COL::COUNTY_NAME)?.str()?,
        df_to_show.column(COL::ROLLING_SUM)?.f64()?,
        df_to_show.column(COL::POPULATION)?.i64()?,
        df_to_show.column(COL::ROLLING_PER_100K)?.f64()?,
    ) {
        let rate = rate.unwrap_or_default();
        table.add_row(vec![
            Cell::new(date.unwrap_or_default()),
            Cell::new(county.unwrap_or_default()),
            Cell::new(format!("{}", rolling_sum.unwrap_or_default())),
            Cell::new(format!("{}", population.unwrap_or_default())),
            Cell::new(format!("{rate:.1}")).set_alignment(CellAlignment::Right),
            Cell::new(bins.bin_label(bins.bin_index(rate))),
        ]);
    }
    println!("\n{}", table);
    Ok(())
}

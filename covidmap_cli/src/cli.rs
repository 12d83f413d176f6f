use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use covidmap::{
    boundaries::write_feature_collection,
    config::{Config, PlotlyJs, Resolution, DEFAULT_PLOTLY_CDN},
    formatters::{CSVFormatter, HtmlFormatter, JsonFormatter, OutputFormatter, OutputGenerator},
    metric::latest_rates,
    render::ChoroplethMap,
    CovidMap,
};
use enum_dispatch::enum_dispatch;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use spinners::{Spinner, Spinners};
use strum_macros::EnumString;

use crate::display::display_latest;
use crate::error::CovidMapCliResult;

const DEFAULT_PROGRESS_SPINNER: Spinners = Spinners::Dots;
const COMPLETE_PROGRESS_STRING: &str = "✔";
const RUNNING_TAIL_STRING: &str = "...";

const DEFAULT_CASES_FILE: &str = "covid_report_county_date.xlsx";
const DEFAULT_POPULATION_FILE: &str = "IN_county_population.csv";
const DEFAULT_BOUNDARIES_FILE: &str = "json_indiana.json";
const DEFAULT_MAP_FILE: &str = "IndianaCOVID.html";

/// Defines the output formats we are able to produce the map in.
#[derive(Clone, Debug, Deserialize, Serialize, EnumString, PartialEq, Eq)]
#[strum(ascii_case_insensitive)]
pub enum OutputFormat {
    Html,
    Json,
    Csv,
}

impl OutputFormat {
    fn formatter(&self, plotly_js: PlotlyJs) -> OutputFormatter {
        match self {
            OutputFormat::Html => OutputFormatter::Html(HtmlFormatter { plotly_js }),
            OutputFormat::Json => OutputFormatter::Json(JsonFormatter),
            OutputFormat::Csv => OutputFormatter::Csv(CSVFormatter),
        }
    }
}

fn write_output<T, U>(
    output_generator: T,
    map: &ChoroplethMap,
    output_file: Option<U>,
) -> CovidMapCliResult<()>
where
    T: OutputGenerator,
    U: AsRef<Path>,
{
    if let Some(output_file) = output_file {
        let mut f = File::create(output_file).context("Failed to write output")?;
        output_generator.save(&mut f, map)?;
    } else {
        let mut stdout_lock = std::io::stdout().lock();
        output_generator.save(&mut stdout_lock, map)?;
    };
    Ok(())
}

fn start_spinner(quiet: bool, message: &str) -> Option<Spinner> {
    (!quiet).then(|| {
        Spinner::with_timer(
            DEFAULT_PROGRESS_SPINNER,
            message.to_string() + RUNNING_TAIL_STRING,
        )
    })
}

fn stop_spinner(spinner: Option<Spinner>) {
    if let Some(mut s) = spinner {
        s.stop_with_symbol(COMPLETE_PROGRESS_STRING);
    }
}

/// Trait that defines what to run when a given subcommand is invoked.
#[enum_dispatch]
pub trait RunCommand {
    async fn run(&self, config: Config) -> CovidMapCliResult<()>;
}

/// The `boundaries` command downloads the county boundaries and keeps a single state.
#[derive(Args, Debug)]
pub struct BoundariesCommand {
    #[arg(short = 's', long, help = "FIPS code of the state to keep, e.g. 18 for Indiana")]
    state: Option<String>,
    #[arg(
        short = 'r',
        long,
        value_name = "low|medium|high",
        help = "Resolution of the boundary file to download"
    )]
    resolution: Option<Resolution>,
    #[arg(long, help = "Download boundaries from this URL instead")]
    url: Option<String>,
    #[arg(
        short = 'o',
        long,
        default_value = DEFAULT_BOUNDARIES_FILE,
        help = "Output file for the filtered feature collection"
    )]
    output_file: PathBuf,
    #[arg(from_global)]
    quiet: bool,
}

impl BoundariesCommand {
    fn apply(&self, mut config: Config) -> Config {
        if let Some(state) = self.state.as_ref() {
            config.state_code = state.clone();
        }
        if let Some(resolution) = self.resolution {
            config.resolution = resolution;
        }
        if let Some(url) = self.url.as_ref() {
            config.boundaries_url = Some(url.clone());
        }
        config
    }
}

impl RunCommand for BoundariesCommand {
    async fn run(&self, config: Config) -> CovidMapCliResult<()> {
        info!("Running `boundaries` subcommand");
        let covidmap = CovidMap::new_with_config(self.apply(config));
        let sp = start_spinner(self.quiet, "Downloading boundaries");
        let boundaries = covidmap.boundaries().await?;
        stop_spinner(sp);

        let file = File::create(&self.output_file).with_context(|| {
            format!("Failed to create {}", self.output_file.display())
        })?;
        write_feature_collection(&boundaries, &mut BufWriter::new(file))?;
        println!(
            "Wrote {} counties to {}",
            boundaries.features.len(),
            self.output_file.display()
        );
        Ok(())
    }
}

/// Input tables shared by the commands that compute the rolling rate.
#[derive(Args, Debug, Clone)]
pub struct TableArgs {
    #[arg(
        short = 'c',
        long,
        default_value = DEFAULT_CASES_FILE,
        help = "Workbook (.xlsx) or CSV of DATE, COUNTY_NAME and COVID_COUNT rows"
    )]
    cases: PathBuf,
    #[arg(
        short = 'p',
        long,
        default_value = DEFAULT_POPULATION_FILE,
        help = "Two-column CSV (or workbook) of county name and population"
    )]
    population: PathBuf,
}

/// The `render` command computes the rolling rate and draws the animated map.
#[derive(Args, Debug)]
pub struct RenderCommand {
    #[command(flatten)]
    tables: TableArgs,
    #[arg(
        short = 'b',
        long,
        default_value = DEFAULT_BOUNDARIES_FILE,
        help = "Feature collection written by the `boundaries` command"
    )]
    boundaries: PathBuf,
    #[arg(
        short = 'f',
        long,
        value_name = "html|json|csv",
        default_value = "html",
        help = "Output format for the results"
    )]
    output_format: OutputFormat,
    #[arg(
        short = 'o',
        long,
        help = "Output file. Defaults to IndianaCOVID.html for html and stdout otherwise"
    )]
    output_file: Option<PathBuf>,
    #[arg(long, value_name = "PATH", help = "Inline a local copy of plotly.js into the page")]
    inline_plotly: Option<PathBuf>,
    #[arg(
        long,
        value_name = "URL",
        num_args = 0..=1,
        default_missing_value = DEFAULT_PLOTLY_CDN,
        conflicts_with = "inline_plotly",
        help = "Load plotly.js from a CDN instead of embedding it in the page"
    )]
    plotly_cdn: Option<String>,
    #[arg(from_global)]
    quiet: bool,
}

impl RenderCommand {
    fn plotly_js(&self, config: &Config) -> PlotlyJs {
        match (&self.inline_plotly, &self.plotly_cdn) {
            (Some(path), _) => PlotlyJs::Inline(path.clone()),
            (None, Some(url)) => PlotlyJs::Cdn(url.clone()),
            (None, None) => config.plotly_js.clone(),
        }
    }

    fn output_path(&self) -> Option<PathBuf> {
        match (&self.output_file, &self.output_format) {
            (Some(path), _) => Some(path.clone()),
            (None, OutputFormat::Html) => Some(PathBuf::from(DEFAULT_MAP_FILE)),
            (None, _) => None,
        }
    }
}

impl RunCommand for RenderCommand {
    async fn run(&self, config: Config) -> CovidMapCliResult<()> {
        info!("Running `render` subcommand");
        let plotly_js = self.plotly_js(&config);
        let covidmap = CovidMap::new_with_config(config);

        let sp = start_spinner(self.quiet, "Computing rolling rates");
        let map = covidmap.choropleth(
            &self.tables.cases,
            &self.tables.population,
            &self.boundaries,
        )?;
        stop_spinner(sp);
        debug!("{:#?}", map.rates());

        let formatter = self.output_format.formatter(plotly_js);
        let output_path = self.output_path();
        write_output(formatter, &map, output_path.as_deref())?;
        if let Some(path) = output_path {
            println!("Wrote map to {}", path.display());
        }
        Ok(())
    }
}

/// The `latest` command prints the most recent rolling rate for each county.
#[derive(Args, Debug)]
pub struct LatestCommand {
    #[command(flatten)]
    tables: TableArgs,
    #[arg(short = 'n', long, help = "Only show the N highest counties")]
    max_results: Option<usize>,
}

impl RunCommand for LatestCommand {
    async fn run(&self, config: Config) -> CovidMapCliResult<()> {
        info!("Running `latest` subcommand");
        let bins = config.color_bins()?;
        let covidmap = CovidMap::new_with_config(config);
        let rates = covidmap.rates(&self.tables.cases, &self.tables.population)?;
        display_latest(latest_rates(&rates)?, &bins, self.max_results)?;
        Ok(())
    }
}

/// The entrypoint for the CLI.
#[derive(Parser, Debug)]
#[command(version, about="Rolling per-capita case rates as an animated county map", long_about = None, name="covidmap")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "Config file to use instead of <config dir>/covidmap/config.toml"
    )]
    pub config: Option<PathBuf>,
    #[arg(
        short = 'q',
        long = "quiet",
        help = "\
            Do not print progress spinners to stdout. Results and logs (when `RUST_LOG`\n\
            is set) will still be printed.",
        global = true
    )]
    quiet: bool,
}

/// Commands contains the list of subcommands available for use in the CLI.
/// Each command should implement the RunCommand trait and specify the list
/// of required args for that command.
#[derive(Subcommand, Debug)]
#[enum_dispatch(RunCommand)]
pub enum Commands {
    /// Download county boundaries and keep a single state
    Boundaries(BoundariesCommand),
    /// Compute the rolling rate and write the animated map
    Render(RenderCommand),
    /// Show the most recent rolling rate per county
    Latest(LatestCommand),
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::str::FromStr;

    use tempfile::{NamedTempFile, TempDir};

    use super::*;

    const BOUNDARIES: &str = r#"{"type":"FeatureCollection","features":[
        {"type":"Feature","properties":{"STATE":"18","NAME":"Adams"},
         "geometry":{"type":"Polygon","coordinates":[[[-85.07,40.57],[-84.80,40.57],[-84.80,40.92],[-85.07,40.92],[-85.07,40.57]]]}}
    ]}"#;

    fn file_with(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    fn table_args(cases: &NamedTempFile, population: &NamedTempFile) -> TableArgs {
        TableArgs {
            cases: cases.path().to_path_buf(),
            population: population.path().to_path_buf(),
        }
    }

    #[tokio::test]
    async fn test_render_command() {
        let cases = file_with("DATE,COUNTY_NAME,COVID_COUNT\n2020-03-06,Adams,1\n2020-03-07,Adams,2\n");
        let population = file_with("COUNTY_NAME,POPULATION\nAdams,35777\n");
        let boundaries = file_with(BOUNDARIES);
        let out_dir = TempDir::new().unwrap();
        let output_file = out_dir.path().join("map.html");

        let render_command = RenderCommand {
            tables: table_args(&cases, &population),
            boundaries: boundaries.path().to_path_buf(),
            output_format: OutputFormat::Html,
            output_file: Some(output_file.clone()),
            inline_plotly: None,
            plotly_cdn: None,
            quiet: true,
        };
        let result = render_command.run(Config::default()).await;
        assert!(result.is_ok(), "{result:?}");
        let html = std::fs::read_to_string(output_file).unwrap();
        assert!(html.contains("Plotly.newPlot"));
        assert!(!html.contains("<script src="), "plotly.js should be embedded by default");
    }

    #[tokio::test]
    async fn test_render_command_with_missing_population() {
        let cases = file_with("DATE,COUNTY_NAME,COVID_COUNT\n2020-03-06,Brown,1\n");
        let population = file_with("COUNTY_NAME,POPULATION\nAdams,35777\n");
        let boundaries = file_with(BOUNDARIES);
        let out_dir = TempDir::new().unwrap();

        let render_command = RenderCommand {
            tables: table_args(&cases, &population),
            boundaries: boundaries.path().to_path_buf(),
            output_format: OutputFormat::Csv,
            output_file: Some(out_dir.path().join("rates.csv")),
            inline_plotly: None,
            plotly_cdn: None,
            quiet: true,
        };
        assert!(render_command.run(Config::default()).await.is_err());
    }

    #[tokio::test]
    async fn test_latest_command() {
        let cases = file_with(
            "DATE,COUNTY_NAME,COVID_COUNT\n2020-03-06,Adams,1\n2020-03-07,Adams,2\n",
        );
        let population = file_with("COUNTY_NAME,POPULATION\nAdams,35777\n");
        let latest_command = LatestCommand {
            tables: table_args(&cases, &population),
            max_results: Some(10),
        };
        assert!(latest_command.run(Config::default()).await.is_ok());
    }

    #[tokio::test]
    async fn test_latest_command_reads_a_workbook() {
        let population = file_with("COUNTY_NAME,POPULATION\nAdams,35777\nAllen,379299\n");
        let latest_command = LatestCommand {
            tables: TableArgs {
                cases: PathBuf::from(env!("CARGO_MANIFEST_DIR"))
                    .join("../covidmap/test_data/covid_report_county_date.xlsx"),
                population: population.path().to_path_buf(),
            },
            max_results: None,
        };
        let result = latest_command.run(Config::default()).await;
        assert!(result.is_ok(), "{result:?}");
    }

    #[test]
    fn cases_default_to_the_workbook_report() {
        let cli = Cli::try_parse_from(["covidmap", "latest"]).unwrap();
        match cli.command {
            Some(Commands::Latest(command)) => {
                assert_eq!(
                    command.tables.cases,
                    PathBuf::from("covid_report_county_date.xlsx")
                );
            }
            other => panic!("Expected the latest command, got {other:?}"),
        }
    }

    #[test]
    fn boundary_overrides_apply_to_config() {
        let command = BoundariesCommand {
            state: Some("17".into()),
            resolution: Some(Resolution::Low),
            url: None,
            output_file: PathBuf::from(DEFAULT_BOUNDARIES_FILE),
            quiet: true,
        };
        let config = command.apply(Config::default());
        assert_eq!(config.state_code, "17");
        assert_eq!(config.boundaries_url(), Resolution::Low.url());
    }

    #[test]
    fn render_output_path_defaults() {
        let command = RenderCommand {
            tables: TableArgs {
                cases: DEFAULT_CASES_FILE.into(),
                population: DEFAULT_POPULATION_FILE.into(),
            },
            boundaries: DEFAULT_BOUNDARIES_FILE.into(),
            output_format: OutputFormat::Json,
            output_file: None,
            inline_plotly: None,
            plotly_cdn: None,
            quiet: true,
        };
        assert_eq!(command.output_path(), None, "json goes to stdout by default");
        let command = RenderCommand {
            output_format: OutputFormat::Html,
            ..command
        };
        assert_eq!(command.output_path(), Some(PathBuf::from(DEFAULT_MAP_FILE)));
    }

    #[test]
    fn plotly_source_follows_the_flags() {
        let cli = Cli::try_parse_from(["covidmap", "render"]).unwrap();
        let Some(Commands::Render(command)) = cli.command else {
            panic!("Expected the render command");
        };
        assert_eq!(command.plotly_js(&Config::default()), PlotlyJs::Embedded);

        let cli = Cli::try_parse_from(["covidmap", "render", "--plotly-cdn"]).unwrap();
        let Some(Commands::Render(command)) = cli.command else {
            panic!("Expected the render command");
        };
        assert_eq!(
            command.plotly_js(&Config::default()),
            PlotlyJs::Cdn(DEFAULT_PLOTLY_CDN.into())
        );

        let cli = Cli::try_parse_from(["covidmap", "render", "--inline-plotly", "plotly.min.js"])
            .unwrap();
        let Some(Commands::Render(command)) = cli.command else {
            panic!("Expected the render command");
        };
        assert_eq!(
            command.plotly_js(&Config::default()),
            PlotlyJs::Inline(PathBuf::from("plotly.min.js"))
        );
        assert!(
            Cli::try_parse_from(["covidmap", "render", "--plotly-cdn", "--inline-plotly", "a.js"])
                .is_err(),
            "The two plotly sources conflict"
        );
    }

    #[test]
    fn output_type_should_deserialize_properly() {
        let output_format = OutputFormat::from_str("html");
        assert_eq!(
            output_format.unwrap(),
            OutputFormat::Html,
            "html format should be parsed correctly"
        );
        let output_format = OutputFormat::from_str("CSV");
        assert_eq!(
            output_format.unwrap(),
            OutputFormat::Csv,
            "parsing should be case insensitive"
        );
        let output_format = OutputFormat::from_str("geoparquet");
        assert!(output_format.is_err(), "non listed formats should fail");
    }

    #[test]
    fn cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}

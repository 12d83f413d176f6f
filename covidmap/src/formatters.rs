use std::io::{Cursor, Write};

use anyhow::{bail, Context, Result};
use enum_dispatch::enum_dispatch;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::PlotlyJs;
use crate::render::ChoroplethMap;

const PLOT_DIV_ID: &str = "covidmap";
const SCRIPT_CLOSE: &str = "</script>";

/// Trait to define different output generators. Defines two
/// functions, format which generates a serialized string of the
/// map and save which writes it to a writer
#[enum_dispatch]
pub trait OutputGenerator {
    fn save(&self, writer: &mut impl Write, map: &ChoroplethMap) -> Result<()>;
    fn format(&self, map: &ChoroplethMap) -> Result<String> {
        let mut data: Vec<u8> = vec![];
        let mut buff = Cursor::new(&mut data);
        self.save(&mut buff, map)?;

        Ok(String::from_utf8(data)?)
    }
}

/// Enum of OutputFormatters one for each potential
/// output type
#[enum_dispatch(OutputGenerator)]
#[derive(Serialize, Deserialize, Debug)]
pub enum OutputFormatter {
    Html(HtmlFormatter),
    Json(JsonFormatter),
    Csv(CSVFormatter),
}

/// A standalone HTML page drawing the animated map with plotly.js
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct HtmlFormatter {
    pub plotly_js: PlotlyJs,
}

impl HtmlFormatter {
    fn script_tag(&self) -> Result<String> {
        match &self.plotly_js {
            PlotlyJs::Embedded => embedded_plotly_js(),
            PlotlyJs::Cdn(url) => Ok(format!(
                r#"<script src="{url}" charset="utf-8"></script>"#
            )),
            PlotlyJs::Inline(path) => {
                let source = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read plotly.js from {}", path.display()))?;
                Ok(format!(
                    "<script type=\"text/javascript\">{}</script>",
                    escape_script(&source)
                ))
            }
        }
    }
}

/// The `<script>` elements in `page` that carry their source inline.
fn inline_scripts(page: &str) -> Vec<&str> {
    let mut scripts = vec![];
    let mut rest = page;
    while let Some(start) = rest.find("<script") {
        let Some(len) = rest[start..].find(SCRIPT_CLOSE) else {
            break;
        };
        let end = start + len + SCRIPT_CLOSE.len();
        let element = &rest[start..end];
        let open_tag = element.split('>').next().unwrap_or_default();
        if !open_tag.contains("src=") {
            scripts.push(element);
        }
        rest = &rest[end..];
    }
    scripts
}

/// plotly.js as bundled in the `plotly` crate, taken from the standalone page it writes.
fn embedded_plotly_js() -> Result<String> {
    let page = plotly::Plot::new().to_html();
    let mut scripts = inline_scripts(&page);
    // The page ends with the script drawing its own empty plot
    scripts.pop();
    if scripts.is_empty() {
        bail!("The plotly crate did not embed plotly.js");
    }
    Ok(scripts.join("\n"))
}

/// Stop embedded text from closing the surrounding script element
fn escape_script(text: &str) -> String {
    text.replace("</", "<\\/")
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

impl OutputGenerator for HtmlFormatter {
    fn save(&self, writer: &mut impl Write, map: &ChoroplethMap) -> Result<()> {
        let figure = serde_json::to_string(&map.figure()?)?;
        let page = format!(
            r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8" />
<title>{title}</title>
{script}
</head>
<body>
<div id="{id}" class="plotly-graph-div" style="height:100vh; width:100%;"></div>
<script type="text/javascript">
var figure = {figure};
Plotly.newPlot("{id}", figure.data, figure.layout, {{"responsive": true}}).then(function () {{
    Plotly.addFrames("{id}", figure.frames);
}});
</script>
</body>
</html>
"#,
            title = escape_html(&map.options().title),
            script = self.script_tag()?,
            id = PLOT_DIV_ID,
            figure = escape_script(&figure),
        );
        writer.write_all(page.as_bytes())?;
        Ok(())
    }
}

/// The plotly figure as JSON, for use with another plotly front end
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct JsonFormatter;

impl OutputGenerator for JsonFormatter {
    fn save(&self, writer: &mut impl Write, map: &ChoroplethMap) -> Result<()> {
        serde_json::to_writer(&mut *writer, &map.figure()?)?;
        Ok(())
    }
}

/// The processed table (cases, population and rolling rate) as CSV
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct CSVFormatter;

impl OutputGenerator for CSVFormatter {
    fn save(&self, writer: &mut impl Write, map: &ChoroplethMap) -> Result<()> {
        CsvWriter::new(writer).finish(&mut map.rates().clone())?;
        Ok(())
    }
}

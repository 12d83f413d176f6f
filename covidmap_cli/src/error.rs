use covidmap::error::CovidMapError;

#[derive(thiserror::Error, Debug)]
pub enum CovidMapCliError {
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
    #[error("covidmap error: {0}")]
    CovidMapError(#[from] CovidMapError),
}

pub type CovidMapCliResult<T> = Result<T, CovidMapCliError>;

use thiserror::Error;

pub type RollupResult<T> = Result<T, RollupError>;

/// Failures at the I/O and configuration boundary.
///
/// The normalization and aggregation core never produces these: malformed
/// cells, bad dates and missing columns are absorbed there. Only loading
/// workbooks, reading layout files, parsing CLI arguments and writing reports
/// can fail.
#[derive(Error, Debug)]
pub enum RollupError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Excel error: {0}")]
    Excel(String),

    #[error("Export error: {0}")]
    Export(String),

    #[error("Layout error: {0}")]
    Layout(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<rust_xlsxwriter::XlsxError> for RollupError {
    fn from(e: rust_xlsxwriter::XlsxError) -> Self {
        RollupError::Export(e.to_string())
    }
}

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReconError {
    #[error("{context}: missing required column(s): {}", columns.join(", "))]
    MissingColumns {
        context: String,
        columns: Vec<String>,
    },

    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("No {0} loaded. Upload it first.")]
    NoData(&'static str),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("XLSX error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReconError {
    pub fn missing(context: impl Into<String>, columns: Vec<String>) -> Self {
        ReconError::MissingColumns {
            context: context.into(),
            columns,
        }
    }
}

pub type Result<T> = std::result::Result<T, ReconError>;

/// Custom error type for CSV ingestion, template rendering & document publishing.
#[derive(Debug)]
pub enum Error {
    /// The CSV content could not be parsed at all.
    InvalidCsv(csv::Error),

    /// A produced CSV export was not valid UTF-8.
    InvalidCsvOutput(std::string::FromUtf8Error),

    /// A template file is missing or unreadable.
    TemplateLoad { path: std::path::PathBuf, source: std::io::Error },

    /// No template is registered for the requested document kind.
    UnknownTemplate(String),

    /// Writing a document to the local documents directory failed.
    DocumentWrite(std::io::Error),

    /// HTTP error while talking to the publishing backend.
    PublishHttp(reqwest::Error),

    /// The publishing backend kept reporting conflicts after exhausting renames.
    PublishConflict(String),

    /// The publisher configuration (env vars) is incomplete or invalid.
    PublishConfig(String),

    /// A configured base URL is not a valid URL.
    InvalidBaseUrl(url::ParseError),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidCsv(err) => write!(f, "Not a valid CSV: {}", err),
            Error::InvalidCsvOutput(err) => write!(f, "Generated CSV is not valid UTF-8: {}", err),
            Error::TemplateLoad { path, source } => {
                write!(f, "Cannot load template {}: {}", path.display(), source)
            }
            Error::UnknownTemplate(kind) => write!(f, "No template registered for kind: {}", kind),
            Error::DocumentWrite(err) => write!(f, "Cannot write document: {}", err),
            Error::PublishHttp(err) => write!(f, "Publishing request failed: {}", err),
            Error::PublishConflict(path) => {
                write!(f, "Naming conflicts persisted after renames for: {}", path)
            }
            Error::PublishConfig(msg) => write!(f, "Publisher misconfigured: {}", msg),
            Error::InvalidBaseUrl(err) => write!(f, "Not a valid base URL: {}", err),
        }
    }
}

impl std::error::Error for Error {}

/// CSV errors occur while reading uploaded client rows.
impl From<csv::Error> for Error {
    fn from(err: csv::Error) -> Self {
        Error::InvalidCsv(err)
    }
}

impl From<std::string::FromUtf8Error> for Error {
    fn from(err: std::string::FromUtf8Error) -> Self {
        Error::InvalidCsvOutput(err)
    }
}

/// Request errors occur while publishing to a remote backend.
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::PublishHttp(err)
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::InvalidBaseUrl(err)
    }
}

#[derive(Debug)]
pub enum Error {
    /// The request never produced a response.
    HttpError(reqwest::Error),
    /// The API answered with a non-success status.
    ApiError { status: u16, body: String },
    /// The configured API base URL does not parse.
    InvalidBaseUrl(url::ParseError),
    /// Reading or writing a local file failed.
    IoError(std::io::Error),
    /// Local CSV parsing or validation failed.
    CsvError(core_pdoc::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HttpError(e) => write!(f, "HTTP error: {}", e),
            Self::ApiError { status, body } => write!(f, "API error (status {}): {}", status, body),
            Self::InvalidBaseUrl(e) => write!(f, "Invalid API base URL: {}", e),
            Self::IoError(e) => write!(f, "I/O error: {}", e),
            Self::CsvError(e) => write!(f, "CSV error: {}", e),
        }
    }
}

impl std::error::Error for Error {}

impl From<reqwest::Error> for Error {
    fn from(error: reqwest::Error) -> Self {
        Self::HttpError(error)
    }
}

impl From<url::ParseError> for Error {
    fn from(error: url::ParseError) -> Self {
        Self::InvalidBaseUrl(error)
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::IoError(error)
    }
}

impl From<core_pdoc::Error> for Error {
    fn from(error: core_pdoc::Error) -> Self {
        Self::CsvError(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = Error::ApiError {
            status: 500,
            body: "boom".to_string(),
        };
        assert_eq!(error.to_string(), "API error (status 500): boom");
    }

    #[test]
    fn test_error_from_url_parse_error() {
        let url_error = url::Url::parse("not a valid url").unwrap_err();
        let error: Error = url_error.into();
        assert!(matches!(error, Error::InvalidBaseUrl(_)));
    }
}

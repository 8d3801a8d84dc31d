use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// A request completed with a non-success status code.
    #[error("a request failed: status code {status_code}")]
    Status { status_code: reqwest::StatusCode },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Page fetch kept failing. The scan may be restarted from `resume_offset`.
    #[error("leaderboard fetch failed at offset {resume_offset}: {source}")]
    Fetch {
        resume_offset: u32,
        #[source]
        source: Box<Error>,
    },

    #[error("invalid ranking cursor: {0}")]
    InvalidCursor(String),

    #[error("no credential for audience {0}")]
    MissingCredential(&'static str),

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Http(e) => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
            Error::Status { status_code } => {
                status_code.is_server_error() || *status_code == reqwest::StatusCode::TOO_MANY_REQUESTS
            }
            Error::Fetch { .. } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        let busy = Error::Status { status_code: reqwest::StatusCode::TOO_MANY_REQUESTS };
        let down = Error::Status { status_code: reqwest::StatusCode::BAD_GATEWAY };
        let denied = Error::Status { status_code: reqwest::StatusCode::UNAUTHORIZED };
        assert!(busy.is_transient());
        assert!(down.is_transient());
        assert!(!denied.is_transient());
        assert!(!Error::NotFound("x".to_string()).is_transient());
    }

    #[test]
    fn json_errors_are_permanent() {
        let err: Error = serde_json::from_str::<i64>("not json").unwrap_err().into();
        assert!(matches!(err, Error::Json(_)));
        assert!(!err.is_transient());
    }
}

use reqwest::StatusCode;
use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Request to {url} failed: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Request to {url} returned {status}")]
    HttpStatus { url: String, status: StatusCode },

    #[error("Couldn't find the {0} in the fetched content.")]
    MissingPayload(&'static str),
    #[error("Json Error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("The selector you are trying to scrape for is invalid. Selector: {0}")]
    Selector(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Io Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Tokio Join Error, couldn't await a task! {0}")]
    RuntimeJoin(#[from] tokio::task::JoinError),

    #[error("Reqwest Error: {0}")]
    Reqwest(#[from] reqwest::Error),
}

impl Error {
    /// Request-level failures: the ones worth another attempt.
    pub fn is_fetch(&self) -> bool {
        matches!(
            self,
            Error::Fetch { .. } | Error::HttpStatus { .. } | Error::Reqwest(_)
        )
    }
}

use std::time::Duration;

use reqwest::Client;

use crate::{Error, Result, USER_AGENT};

/// Builds the client shared by every request of a run.
/// `Client` uses an `Arc` internally so clones handed to workers are cheap.
pub fn build_client(timeout: Duration) -> Result<Client> {
    let client = Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()?;
    Ok(client)
}

/// Requests a page and returns a `Result<String>` containing the body.
/// Non-success statuses are turned into `Error::HttpStatus`.
pub async fn fetch_text(client: &Client, url: &str) -> Result<String> {
    let res = client.get(url).send().await.map_err(|source| Error::Fetch {
        url: url.to_string(),
        source,
    })?;

    let status = res.status();
    if !status.is_success() {
        return Err(Error::HttpStatus {
            url: url.to_string(),
            status,
        });
    }

    res.text().await.map_err(|source| Error::Fetch {
        url: url.to_string(),
        source,
    })
}

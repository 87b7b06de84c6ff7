/// Upstream data clients: SPC outlooks, county boundaries, NWS alerts.
///
/// All three use the blocking `reqwest` client and the same retry rule:
/// one more attempt after a timeout, connection failure, or 5xx. A 404 or
/// other 4xx is final.

pub mod counties;
pub mod nws;
pub mod spc;

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, DATE, LAST_MODIFIED};
use tracing::debug;

use crate::config::HttpSettings;
use crate::model::CatError;

/// Builds a blocking client with the configured User-Agent and `timeout_secs`.
pub fn build_client(http: &HttpSettings, timeout_secs: u64) -> Result<Client, CatError> {
    Ok(Client::builder()
        .user_agent(http.user_agent.clone())
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// A successful GET: body text plus its freshness header, if any.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub body: String,
    /// `Last-Modified`, falling back to `Date`.
    pub last_modified: Option<String>,
}

/// One GET. Non-2xx statuses become `CatError::HttpStatus`.
pub fn get_text(client: &Client, url: &str, accept: Option<&str>) -> Result<Fetched, CatError> {
    let mut request = client.get(url);
    if let Some(accept) = accept {
        request = request.header(ACCEPT, accept);
    }
    let response = request.send()?;

    let status = response.status();
    if !status.is_success() {
        return Err(CatError::HttpStatus {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }

    let last_modified = response
        .headers()
        .get(LAST_MODIFIED)
        .or_else(|| response.headers().get(DATE))
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = response.text()?;
    Ok(Fetched { body, last_modified })
}

/// Whether a failed request is worth one more attempt.
pub fn is_retryable(err: &CatError) -> bool {
    match err {
        CatError::HttpStatus { status, .. } => *status >= 500,
        CatError::Http(e) => e.is_timeout() || e.is_connect(),
        _ => false,
    }
}

/// `get_text` with a single retry after `retry_delay` on retryable errors.
pub fn get_with_retry(
    client: &Client,
    url: &str,
    accept: Option<&str>,
    retry_delay: Duration,
) -> Result<Fetched, CatError> {
    match get_text(client, url, accept) {
        Err(e) if is_retryable(&e) => {
            debug!(url, "retrying after: {}", e);
            std::thread::sleep(retry_delay);
            get_text(client, url, accept)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> CatError {
        CatError::HttpStatus {
            status: code,
            url: "https://www.spc.noaa.gov/x".to_string(),
        }
    }

    #[test]
    fn test_only_server_errors_are_retried() {
        assert!(is_retryable(&status(500)));
        assert!(is_retryable(&status(503)));
        assert!(!is_retryable(&status(404)), "missing product is final");
        assert!(!is_retryable(&status(403)));
        assert!(!is_retryable(&CatError::Parse("bad json".to_string())));
    }

    #[test]
    fn test_client_builds_from_default_settings() {
        let http = HttpSettings::default();
        assert!(build_client(&http, http.timeout_secs).is_ok());
    }
}

//! Liveness probing of the search endpoint.
//!
//! A probe never fails. Transport errors, unexpected statuses and bodies that
//! do not carry at least one search result all fold into
//! [`Liveness::Inactive`] with a reason that ends up in the log.

use std::time::Duration;

use url::Url;

/// What is polled and what counts as a healthy answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointTarget {
    pub url: Url,
    pub timeout: Duration,
    pub expected_status: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Liveness {
    Active,
    Inactive { reason: String },
}

impl Liveness {
    fn inactive(reason: impl Into<String>) -> Self {
        Liveness::Inactive {
            reason: reason.into(),
        }
    }
}

/// Shape of a search response: `{"result": {"results": [...]}}`.
#[derive(Debug, serde::Deserialize)]
struct SearchResponse {
    result: SearchResult,
}

#[derive(Debug, serde::Deserialize)]
struct SearchResult {
    results: Vec<serde_json::Value>,
}

/// Decides liveness from an already received response.
pub fn evaluate_response(status: u16, body: &[u8], expected_status: u16) -> Liveness {
    if status != expected_status {
        return Liveness::inactive(format!(
            "unexpected HTTP status {status} (expected {expected_status})"
        ));
    }

    match serde_json::from_slice::<SearchResponse>(body) {
        Ok(response) if response.result.results.is_empty() => {
            Liveness::inactive("search returned no results")
        }
        Ok(_) => Liveness::Active,
        Err(e) => Liveness::inactive(format!("unexpected response body: {e}")),
    }
}

/// Issues a single bounded GET against `target`.
pub async fn check_liveness(client: &reqwest::Client, target: &EndpointTarget) -> Liveness {
    let response = match client
        .get(target.url.clone())
        .timeout(target.timeout)
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => {
            let kind = if e.is_timeout() {
                "timed out"
            } else if e.is_connect() {
                "connection failed"
            } else {
                "request failed"
            };
            log::warn!("Error checking endpoint {}: {e}", target.url);
            return Liveness::inactive(format!("{kind}: {e}"));
        }
    };

    let status = response.status().as_u16();
    log::info!("Checked {} -> HTTP {}", target.url, status);

    let body = match response.bytes().await {
        Ok(body) => body,
        Err(e) => {
            log::warn!("Error reading body from {}: {e}", target.url);
            return Liveness::inactive(format!("failed to read body: {e}"));
        }
    };

    evaluate_response(status, &body, target.expected_status)
}

//! HTTP client for the remote reference service (EDSM-compatible REST API).

use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{LookupError, Result};
use crate::types::{BodiesResponse, BodyRecord, SearchHit, SystemRecord, Valuation};

/// Default public EDSM endpoint.
pub const DEFAULT_BASE_URL: &str = "https://www.edsm.net";

/// What a remote reference service can answer. Implemented by [`EdsmClient`]
/// for production and by in-memory stubs in tests.
pub trait RemoteLookup {
    /// Look up one system by exact name.
    fn system(&self, name: &str) -> impl Future<Output = Result<Option<SystemRecord>>> + Send;

    /// All known bodies of a system.
    fn bodies(&self, system: &str) -> impl Future<Output = Result<Vec<BodyRecord>>> + Send;

    /// Exploration valuation of a system.
    fn valuation(&self, system: &str) -> impl Future<Output = Result<Option<Valuation>>> + Send;

    /// Total body count of a system, when the service knows it.
    fn body_count(&self, system: &str) -> impl Future<Output = Result<Option<u32>>> + Send;

    /// Prefix search over system names.
    fn search(&self, prefix: &str) -> impl Future<Output = Result<Vec<SearchHit>>> + Send;
}

/// Reference client over the EDSM REST API.
#[derive(Debug, Clone)]
pub struct EdsmClient {
    http: Client,
    base_url: String,
    timeout: Duration,
}

impl EdsmClient {
    /// Create a client against `base_url` with a per-request `timeout`.
    #[must_use]
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = format!("{}{path}", self.base_url);
        debug!(%url, "lookup request");
        let response = self
            .http
            .get(&url)
            .query(query)
            .timeout(self.timeout)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(LookupError::RequestFailed(format!(
                "HTTP {} from {path}",
                response.status()
            )));
        }
        // Unknown names come back as `[]`, `{}`, or an empty body, never an
        // error status; callers ask for Option<_> so all of those decode.
        let text = response.text().await?;
        let trimmed = text.trim();
        let payload = if trimmed.is_empty() { "null" } else { trimmed };
        serde_json::from_str(payload).map_err(|e| LookupError::Parse(e.to_string()))
    }
}

impl Default for EdsmClient {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL, Duration::from_secs(10))
    }
}

impl RemoteLookup for EdsmClient {
    async fn system(&self, name: &str) -> Result<Option<SystemRecord>> {
        let mut hits: Vec<SystemRecord> = self
            .get_json(
                "/api-v1/systems",
                &[
                    ("systemName", name),
                    ("showCoordinates", "1"),
                    ("showPrimaryStar", "1"),
                ],
            )
            .await
            .unwrap_or_default_on_empty()?;
        Ok(hits
            .iter()
            .position(|s| s.name.eq_ignore_ascii_case(name))
            .map(|i| hits.swap_remove(i)))
    }

    async fn bodies(&self, system: &str) -> Result<Vec<BodyRecord>> {
        let response: Option<BodiesResponse> = self
            .get_json("/api-system-v1/bodies", &[("systemName", system)])
            .await?;
        Ok(response.map(|r| r.bodies).unwrap_or_default())
    }

    async fn valuation(&self, system: &str) -> Result<Option<Valuation>> {
        self.get_json("/api-system-v1/estimated-value", &[("systemName", system)])
            .await
    }

    async fn body_count(&self, system: &str) -> Result<Option<u32>> {
        let response: Option<BodiesResponse> = self
            .get_json("/api-system-v1/bodies", &[("systemName", system)])
            .await?;
        Ok(response.and_then(|r| {
            r.body_count
                .or_else(|| u32::try_from(r.bodies.len()).ok().filter(|&n| n > 0))
        }))
    }

    async fn search(&self, prefix: &str) -> Result<Vec<SearchHit>> {
        let hits: Vec<SearchHit> = self
            .get_json(
                "/api-v1/systems",
                &[("systemName", prefix), ("showCoordinates", "1")],
            )
            .await
            .unwrap_or_default_on_empty()?;
        Ok(hits)
    }
}

/// An unknown name decodes as `null`; treat that as the empty collection.
trait OrEmpty<T> {
    fn unwrap_or_default_on_empty(self) -> Result<T>;
}

impl<T: Default> OrEmpty<T> for Result<Option<T>> {
    fn unwrap_or_default_on_empty(self) -> Result<T> {
        self.map(Option::unwrap_or_default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_normalized() {
        let client = EdsmClient::new("https://example.test/", Duration::from_secs(1));
        assert_eq!(client.base_url, "https://example.test");
    }

    #[test]
    fn system_record_decodes_service_shape() {
        let json = r#"[{
            "name": "Maia",
            "coords": {"x": -81.78, "y": -149.44, "z": -343.38},
            "coordsLocked": true,
            "primaryStar": {"type": "B (Blue-White) Star", "name": "Maia", "isScoopable": true}
        }]"#;
        let hits: Vec<SystemRecord> = serde_json::from_str(json).expect("decode");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "Maia");
        assert!(hits[0].coords_locked);
        assert!(hits[0].primary_star.as_ref().expect("star").is_scoopable);
    }

    #[test]
    fn bodies_response_defaults_when_sparse() {
        let response: BodiesResponse =
            serde_json::from_str(r#"{"bodies": [{"name": "Maia A 1"}]}"#).expect("decode");
        assert_eq!(response.body_count, None);
        assert_eq!(response.bodies.len(), 1);
        assert!(!response.bodies[0].is_landable);
    }
}

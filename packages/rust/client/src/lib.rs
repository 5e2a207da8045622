//! HTTP transport for the Euclid pipeline service.
//!
//! Every remote operation goes through [`ApiClient`]: JSON endpoints via
//! [`ApiClient::call`], the binary export via [`ApiClient::fetch_bytes`].
//! Requests are attempted once; there are no retries and no timeout.

use euclid_shared::{EuclidError, Result, validate_base_url};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, Method};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};

/// User-Agent string for pipeline requests.
const USER_AGENT: &str = concat!("Euclid/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Request options
// ---------------------------------------------------------------------------

/// Per-call overrides for [`ApiClient::call`].
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// HTTP method (defaults to `GET`).
    pub method: Method,
    /// Extra headers; these win over the default `Content-Type`.
    pub headers: HeaderMap,
    /// JSON body, serialized as-is.
    pub body: Option<serde_json::Value>,
}

impl RequestOptions {
    /// A `POST` with an optional JSON body.
    pub fn post(body: Option<serde_json::Value>) -> Self {
        Self {
            method: Method::POST,
            body,
            ..Self::default()
        }
    }
}

/// Shape of an error body returned on non-2xx responses.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
}

// ---------------------------------------------------------------------------
// ApiClient
// ---------------------------------------------------------------------------

/// Request executor bound to one pipeline service base address.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a client for `base_url` (e.g. `http://localhost:8000`).
    pub fn new(base_url: &str) -> Result<Self> {
        validate_base_url(base_url)?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| EuclidError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// The base address endpoints are resolved against.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Issue a JSON request and decode the response body.
    ///
    /// Non-2xx responses fail with the service's `{"error": ...}` message when
    /// present, otherwise with `HTTP <status>`.
    #[instrument(skip_all, fields(method = %opts.method, endpoint = %endpoint))]
    pub async fn call<T: DeserializeOwned>(&self, endpoint: &str, opts: RequestOptions) -> Result<T> {
        let url = self.url(endpoint);

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.extend(opts.headers);

        let mut request = self.client.request(opts.method, &url).headers(headers);
        if let Some(body) = &opts.body {
            let bytes = serde_json::to_vec(body)
                .map_err(|e| EuclidError::Decode(format!("failed to encode request body: {e}")))?;
            request = request.body(bytes);
        }

        debug!(%url, "sending request");

        let response = request
            .send()
            .await
            .map_err(|e| EuclidError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = remote_error(status.as_u16(), &body);
            warn!(%url, status = status.as_u16(), error = %err, "request failed");
            return Err(err);
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| EuclidError::Network(format!("{url}: failed to read body: {e}")))?;

        serde_json::from_slice(&body).map_err(|e| EuclidError::Decode(format!("{url}: {e}")))
    }

    /// `GET` a JSON endpoint.
    pub async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        self.call(endpoint, RequestOptions::default()).await
    }

    /// `POST` to a JSON endpoint, with or without a body.
    pub async fn post_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T> {
        self.call(endpoint, RequestOptions::post(body)).await
    }

    /// `GET` a raw binary payload.
    ///
    /// Sends no JSON headers and does not inspect error bodies: a non-2xx
    /// response fails with `HTTP <status>`.
    #[instrument(skip_all, fields(endpoint = %endpoint))]
    pub async fn fetch_bytes(&self, endpoint: &str) -> Result<Vec<u8>> {
        let url = self.url(endpoint);
        debug!(%url, "fetching binary payload");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| EuclidError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let code = status.as_u16();
            warn!(%url, status = code, "binary fetch failed");
            return Err(EuclidError::remote(code, format!("HTTP {code}")));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| EuclidError::Network(format!("{url}: failed to read body: {e}")))?;

        Ok(body.to_vec())
    }

    fn url(&self, endpoint: &str) -> String {
        if endpoint.starts_with('/') {
            format!("{}{endpoint}", self.base_url)
        } else {
            format!("{}/{endpoint}", self.base_url)
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a non-2xx response body to an error.
fn remote_error(status: u16, body: &str) -> EuclidError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| format!("HTTP {status}"));

    EuclidError::remote(status, message)
}

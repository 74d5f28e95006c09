//! # HTTP Retrieval Utilities
//!
//! Asynchronous API client wrapper around `reqwest`, with exponential-backoff
//! retries for transient failures and standardized JSON response handling.

use anyhow::Context;
use reqwest::{
    header::{HeaderMap, AUTHORIZATION, CONTENT_TYPE},
    Method, Url,
};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::{de::DeserializeOwned, Serialize};

/// Retries applied to transient failures (connect errors, 5xx, 429).
const MAX_RETRIES: u32 = 3;

/// Deserialized body plus the HTTP metadata it came with.
#[derive(Debug)]
pub struct ApiResponse<T> {
    /// The deserialized response body, present on 2xx.
    pub data: Option<T>,
    /// The raw body returned by the server when the request failed.
    pub error_body: Option<String>,
    pub status: u16,
    pub success: bool,
    pub headers: HeaderMap,
}

/// Retrying HTTP client bound to a base URL.
pub struct ApiClient {
    inner: ClientWithMiddleware,
    base_url: Url,
    auth_token: Option<String>,
}

impl ApiClient {
    /// Creates a client rooted at `base_url`, which must be absolute.
    ///
    /// Paths join per RFC 3986: without a trailing slash on the base, a
    /// relative path replaces its last segment.
    pub fn new(base_url: &str, auth_token: Option<String>) -> anyhow::Result<Self> {
        Self::with_retries(base_url, auth_token, MAX_RETRIES)
    }

    /// Like [`ApiClient::new`] with an explicit retry budget. Zero leaves the
    /// retry middleware out, which suits non-idempotent POSTs.
    pub fn with_retries(
        base_url: &str,
        auth_token: Option<String>,
        max_retries: u32,
    ) -> anyhow::Result<Self> {
        let url = Url::parse(base_url)
            .with_context(|| format!("invalid base URL (must be absolute): {}", base_url))?;

        let builder = ClientBuilder::new(reqwest::Client::new());
        let client = if max_retries == 0 {
            builder.build()
        } else {
            let retry_policy = ExponentialBackoff::builder().build_with_max_retries(max_retries);
            builder
                .with(RetryTransientMiddleware::new_with_policy(retry_policy))
                .build()
        };

        Ok(Self {
            inner: client,
            base_url: url,
            auth_token,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Performs a request and decodes a 2xx body as `T`.
    ///
    /// Non-2xx responses are returned with `success == false` and the raw body
    /// in `error_body`; only transport and decode failures become `Err`.
    pub async fn request<T, B>(
        &self,
        method: Method,
        path: &str,
        headers: Option<HeaderMap>,
        body: Option<B>,
    ) -> anyhow::Result<ApiResponse<T>>
    where
        T: DeserializeOwned,
        B: Serialize,
    {
        let full_url = self.base_url.join(path)?;
        let mut req = self.inner.request(method, full_url);

        if let Some(h) = headers {
            req = req.headers(h);
        }

        if let Some(token) = &self.auth_token {
            req = req.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        if let Some(b) = body {
            let json_body = serde_json::to_string(&b)?;
            req = req.header(CONTENT_TYPE, "application/json").body(json_body);
        }

        let response: reqwest::Response = req.send().await?;
        let status = response.status();
        let resp_headers = response.headers().clone();

        if status.is_success() {
            let data = response.json::<T>().await?;
            Ok(ApiResponse {
                data: Some(data),
                error_body: None,
                status: status.as_u16(),
                success: true,
                headers: resp_headers,
            })
        } else {
            let error_text = response.text().await.ok();
            Ok(ApiResponse {
                data: None,
                error_body: error_text,
                status: status.as_u16(),
                success: false,
                headers: resp_headers,
            })
        }
    }

    /// POSTs `body` as JSON and ignores the response body. Non-2xx is an error.
    pub async fn post_json<B: Serialize>(&self, path: &str, body: &B) -> anyhow::Result<()> {
        let full_url = self.base_url.join(path)?;
        let mut req = self
            .inner
            .post(full_url)
            .header(CONTENT_TYPE, "application/json")
            .body(serde_json::to_string(body)?);
        if let Some(token) = &self.auth_token {
            req = req.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("HTTP {}: {}", status.as_u16(), text);
        }
        Ok(())
    }
}

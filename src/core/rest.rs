//! Remote Store Client
//!
//! Information Hiding:
//! - URL layout (`/rest/v1/{resource}`) and PostgREST filter syntax hidden behind `Endpoint`
//! - Auth headers and the return-representation preference attached on every call
//! - Raw status/body classification into `StoreError`
//!
//! No retry and no backoff: a transient failure surfaces to the caller immediately.

use super::error::{StoreError, StoreResult};
use crate::config::RemoteCredentials;
use bytes::Bytes;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

const REST_PREFIX: &str = "rest/v1";

/// Relative resource path plus ordered query filters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    resource: String,
    query: Vec<(String, String)>,
}

impl Endpoint {
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            query: Vec::new(),
        }
    }

    /// Equality filter, rendered as `column=eq.value`
    pub fn eq(mut self, column: &str, value: impl fmt::Display) -> Self {
        self.query.push((column.to_string(), format!("eq.{}", value)));
        self
    }

    pub fn select(mut self, columns: &str) -> Self {
        self.query.push(("select".to_string(), columns.to_string()));
        self
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.resource)?;
        for (i, (key, value)) in self.query.iter().enumerate() {
            let sep = if i == 0 { '?' } else { '&' };
            write!(f, "{}{}={}", sep, key, value)?;
        }
        Ok(())
    }
}

/// Authenticated executor against a PostgREST-style API
#[derive(Clone)]
pub struct RestClient {
    http: Client,
    base_url: String,
    key: String,
}

impl RestClient {
    pub fn new(credentials: &RemoteCredentials, timeout: Duration) -> StoreResult<Self> {
        let base_url = credentials.url.trim_end_matches('/').to_string();
        Url::parse(&base_url)
            .map_err(|e| StoreError::Config(format!("invalid store URL '{}': {}", base_url, e)))?;

        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(StoreError::Transport)?;

        Ok(Self {
            http,
            base_url,
            key: credentials.key.clone(),
        })
    }

    fn url_for(&self, endpoint: &Endpoint) -> StoreResult<Url> {
        let raw = format!("{}/{}/{}", self.base_url, REST_PREFIX, endpoint.resource);
        let mut url = Url::parse(&raw)
            .map_err(|e| StoreError::Config(format!("invalid endpoint '{}': {}", raw, e)))?;
        if !endpoint.query.is_empty() {
            url.query_pairs_mut().extend_pairs(endpoint.query.iter());
        }
        Ok(url)
    }

    /// Execute one request and return the raw response bytes
    pub async fn execute<B>(
        &self,
        method: Method,
        endpoint: &Endpoint,
        body: Option<&B>,
    ) -> StoreResult<Bytes>
    where
        B: Serialize + ?Sized,
    {
        let url = self.url_for(endpoint)?;

        let mut request = self
            .http
            .request(method.clone(), url)
            .header("apikey", &self.key)
            .header(AUTHORIZATION, format!("Bearer {}", self.key))
            .header(CONTENT_TYPE, "application/json")
            .header("Prefer", "return=representation");

        if let Some(body) = body {
            let payload = serde_json::to_vec(body).map_err(StoreError::Serialization)?;
            request = request.body(payload);
        }

        tracing::debug!("[RestClient] {} {}", method, endpoint);

        let response = request.send().await.map_err(StoreError::Transport)?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(StoreError::Transport)?;

        if status.as_u16() >= 400 {
            let body = String::from_utf8_lossy(&bytes).into_owned();
            tracing::debug!(
                "[RestClient] {} {} failed with status {}",
                method,
                endpoint,
                status
            );
            return Err(StoreError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(bytes)
    }

    /// GET and decode the returned JSON array
    pub async fn select<T: DeserializeOwned>(&self, endpoint: &Endpoint) -> StoreResult<Vec<T>> {
        let bytes = self.execute::<()>(Method::GET, endpoint, None).await?;
        decode_rows(&bytes)
    }

    /// POST a row and decode the representation sent back
    pub async fn insert<B, T>(&self, resource: &str, row: &B) -> StoreResult<Vec<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let bytes = self
            .execute(Method::POST, &Endpoint::new(resource), Some(row))
            .await?;
        decode_rows(&bytes)
    }

    /// PATCH the rows selected by the endpoint filters
    pub async fn update<B>(&self, endpoint: &Endpoint, patch: &B) -> StoreResult<()>
    where
        B: Serialize + ?Sized,
    {
        self.execute(Method::PATCH, endpoint, Some(patch)).await?;
        Ok(())
    }
}

/// An empty body is read as "no rows"
fn decode_rows<T: DeserializeOwned>(bytes: &[u8]) -> StoreResult<Vec<T>> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    serde_json::from_slice(bytes).map_err(StoreError::Parse)
}

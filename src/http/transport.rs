//! C1 — process-wide pooled HTTP transport.
//!
//! One `reqwest::Client` per process, built once at startup and cloned
//! (cheap, it's an `Arc` internally) into every adapter. No retry or rate
//! limiting here — that's the reliability layer wrapping this.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;

const MAX_CONNECTIONS_PER_HOST: usize = 30;
const DNS_CACHE_SECS: u64 = 300;
const TOTAL_TIMEOUT_SECS: u64 = 30;
const CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Clone)]
pub struct Transport {
    client: reqwest::Client,
}

/// A response body, parsed as JSON when the content-type advertises it,
/// otherwise returned as raw bytes.
pub enum Body {
    Json(serde_json::Value),
    Bytes(Vec<u8>),
}

pub struct RawResponse {
    pub status: u16,
    pub body: Body,
}

impl Transport {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(MAX_CONNECTIONS_PER_HOST)
            .pool_idle_timeout(Duration::from_secs(DNS_CACHE_SECS))
            .timeout(Duration::from_secs(TOTAL_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .context("building shared HTTP client")?;
        Ok(Transport { client })
    }

    pub async fn get(&self, url: &str) -> Result<RawResponse> {
        let resp = self.client.get(url).send().await?;
        self.into_raw(resp).await
    }

    pub async fn get_with_headers(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<RawResponse> {
        let mut req = self.client.get(url);
        for (k, v) in headers {
            req = req.header(*k, *v);
        }
        let resp = req.send().await?;
        self.into_raw(resp).await
    }

    async fn into_raw(&self, resp: reqwest::Response) -> Result<RawResponse> {
        let status = resp.status().as_u16();
        let is_json = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.contains("json"))
            .unwrap_or(false);

        let bytes = resp.bytes().await?;
        let body = if is_json {
            match serde_json::from_slice::<serde_json::Value>(&bytes) {
                Ok(v) => Body::Json(v),
                Err(_) => Body::Bytes(bytes.to_vec()),
            }
        } else {
            Body::Bytes(bytes.to_vec())
        };
        Ok(RawResponse { status, body })
    }

    /// Convenience for adapters that just want a typed JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<(u16, Option<T>)> {
        let raw = self.get(url).await?;
        let parsed = match raw.body {
            Body::Json(v) => serde_json::from_value(v).ok(),
            Body::Bytes(_) => None,
        };
        Ok((raw.status, parsed))
    }
}

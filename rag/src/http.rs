use std::thread;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::from_str;
use tracing::{debug, warn};

use crate::error::{RagError, Result};

const BACKOFF_BASE: Duration = Duration::from_millis(500);

#[derive(Clone, Debug)]
pub struct HttpClient {
    client: Client,
    max_retries: u32,
    headers: Vec<(&'static str, String)>,
}

impl HttpClient {
    pub fn new(timeout_secs: u64, max_retries: u32) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| RagError::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            client,
            max_retries,
            headers: Vec::new(),
        })
    }

    /// Adds a header sent with every request.
    pub fn with_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    pub fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        self.send_json("GET", url, || self.client.get(url))
    }

    pub fn post_json<T: DeserializeOwned, B: Serialize>(&self, url: &str, body: &B) -> Result<T> {
        self.send_json("POST", url, || {
            self.client
                .post(url)
                .header(CONTENT_TYPE, "application/json")
                .json(body)
        })
    }

    pub fn put_json<T: DeserializeOwned, B: Serialize>(&self, url: &str, body: &B) -> Result<T> {
        self.send_json("PUT", url, || {
            self.client
                .put(url)
                .header(CONTENT_TYPE, "application/json")
                .json(body)
        })
    }

    pub fn delete_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        self.send_json("DELETE", url, || self.client.delete(url))
    }

    fn send_json<T, F>(&self, method: &'static str, url: &str, build: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 0u32;
        loop {
            match self.send_once(method, url, &build) {
                Ok(text) => {
                    return from_str::<T>(&text).map_err(|e| RagError::Decode {
                        url: url.to_string(),
                        reason: format!("{e} | {}", preview(&text)),
                    })
                }
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    let delay = BACKOFF_BASE * 2u32.saturating_pow(attempt);
                    attempt += 1;
                    warn!(%method, %url, attempt, ?delay, error = %err, "retrying request");
                    thread::sleep(delay);
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn send_once<F>(&self, method: &'static str, url: &str, build: &F) -> Result<String>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut req = build();
        for (name, value) in &self.headers {
            req = req.header(*name, value);
        }
        let resp = req.send().map_err(|source| RagError::Transport {
            method,
            url: url.to_string(),
            source,
        })?;
        let status = resp.status();
        let text = resp.text().unwrap_or_default();
        debug!(%method, %url, %status, bytes = text.len(), "http response");
        if !status.is_success() {
            return Err(RagError::Http {
                method,
                url: url.to_string(),
                status,
                body: preview(&text),
            });
        }
        Ok(text)
    }
}

fn preview(text: &str) -> String {
    const MAX: usize = 500;
    if text.chars().count() <= MAX {
        text.to_string()
    } else {
        let head: String = text.chars().take(MAX).collect();
        format!("{head}...")
    }
}

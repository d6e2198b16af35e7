use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, warn};
use url::Url;

use crate::core::config::{RemoteSettings, SyncConfig};

pub use reqwest::Method;

/// Response payload as received: JSON when it parses, the raw text otherwise.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    Text(String),
}

impl ResponseBody {
    fn parse(raw: String) -> Self {
        if raw.trim().is_empty() {
            return ResponseBody::Json(json!({}));
        }
        match serde_json::from_str(&raw) {
            Ok(value) => ResponseBody::Json(value),
            Err(_) => ResponseBody::Text(raw),
        }
    }

    /// Row list of a table read, if the body is one.
    pub fn rows(&self) -> Option<&Vec<Value>> {
        match self {
            ResponseBody::Json(Value::Array(rows)) => Some(rows),
            _ => None,
        }
    }
}

impl std::fmt::Display for ResponseBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseBody::Json(v) => write!(f, "{}", v),
            ResponseBody::Text(t) => write!(f, "{}", t),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RemoteResponse {
    pub status: u16,
    pub body: ResponseBody,
}

impl RemoteResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_conflict(&self) -> bool {
        self.status == 409
    }
}

/// Thin client for a PostgREST endpoint. Every HTTP status comes back as
/// `Ok`; only transport failures (connect, DNS, TLS, timeout) are `Err`.
/// No retries are attempted here.
pub struct RestClient {
    settings: RemoteSettings,
    client: Client,
}

impl RestClient {
    pub fn new(settings: RemoteSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { settings, client })
    }

    /// Client for the run, or `None` when remote sync is disabled.
    pub fn from_config(config: &SyncConfig) -> Option<Self> {
        let settings = config.remote.clone()?;
        match Self::new(settings) {
            Ok(client) => Some(client),
            Err(e) => {
                warn!("Remote sync disabled: {:#}", e);
                None
            }
        }
    }

    pub fn settings(&self) -> &RemoteSettings {
        &self.settings
    }

    pub fn root_url(&self) -> String {
        format!("{}/rest/v1/", self.settings.base_url)
    }

    pub fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.settings.base_url, table)
    }

    /// `{base}/rest/v1/{table}?{column}=eq.{value}` with `value` encoded.
    pub fn filtered_url(&self, table: &str, column: &str, value: &str) -> Result<String> {
        let mut url = Url::parse(&self.table_url(table))
            .with_context(|| format!("invalid REST url for table {}", table))?;
        url.query_pairs_mut()
            .append_pair(column, &format!("eq.{}", value));
        Ok(url.into())
    }

    pub async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<RemoteResponse> {
        let key = &self.settings.api_key;
        let mut request = self
            .client
            .request(method.clone(), url)
            .header("Content-Type", "application/json")
            .header("apikey", key)
            .header("Authorization", format!("Bearer {}", key));
        if method == Method::POST {
            request = request.header("Prefer", "return=minimal");
        }
        if let Some(body) = body {
            request = request.body(serde_json::to_vec(body)?);
        }

        let res = request
            .send()
            .await
            .with_context(|| format!("{} {} failed", method, url))?;
        let status = res.status().as_u16();
        let raw = res
            .text()
            .await
            .with_context(|| format!("{} {}: failed to read response", method, url))?;

        debug!(%method, url, status, "Remote request finished");
        Ok(RemoteResponse {
            status,
            body: ResponseBody::parse(raw),
        })
    }

    /// Lightweight reachability check against the REST root.
    pub async fn ping(&self) -> Result<bool> {
        let res = self.send(Method::GET, &self.root_url(), None).await?;
        Ok(res.status == 200)
    }
}

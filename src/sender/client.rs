use super::transport::{PushPayload, Transport, TransportError, TransportResponse};
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE, HeaderValue};
use reqwest::{Client, ClientBuilder};
use serde::Deserialize;
use std::time::Duration;
use url::Url;

/// Tenant header for multi-tenant Loki deployments.
const TENANT_HEADER: &str = "X-Scope-OrgID";

/// How much of an error response body to keep for reporting.
const MAX_ERROR_BODY: usize = 256;

#[derive(Debug, Clone, Deserialize)]
pub enum Auth {
    Bearer(String),
    Basic {
        username: String,
        password: Option<String>,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpTransportConfig {
    /// Full push URL, e.g. `http://localhost:3100/loki/api/v1/push`.
    pub endpoint: String,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub max_connections: usize,
    pub user_agent: String,
    pub tenant_id: Option<String>,
    pub auth: Option<Auth>,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:3100/loki/api/v1/push".to_string(),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            max_connections: 4,
            user_agent: concat!("loki-forwarder/", env!("CARGO_PKG_VERSION")).to_string(),
            tenant_id: None,
            auth: None,
        }
    }
}

/// Default [`Transport`]: a pooled reqwest client POSTing to the push URL.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    push_url: Url,
    config: HttpTransportConfig,
}

impl HttpTransport {
    pub fn new(config: HttpTransportConfig) -> Result<Self, TransportError> {
        let push_url: Url = config
            .endpoint
            .parse()
            .map_err(|e| TransportError::InvalidConfig(format!("invalid endpoint URL: {e}")))?;

        let client = ClientBuilder::new()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(config.max_connections)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| TransportError::InvalidConfig(format!("failed to build client: {e}")))?;

        Ok(Self {
            client,
            push_url,
            config,
        })
    }

    pub fn endpoint(&self) -> &str {
        self.push_url.as_str()
    }
}

impl Transport for HttpTransport {
    async fn push(&self, payload: PushPayload) -> Result<TransportResponse, TransportError> {
        let mut request = self
            .client
            .post(self.push_url.clone())
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if payload.compressed {
            request = request.header(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        }
        if let Some(tenant) = &self.config.tenant_id {
            request = request.header(TENANT_HEADER, tenant);
        }
        match &self.config.auth {
            Some(Auth::Bearer(token)) => request = request.bearer_auth(token),
            Some(Auth::Basic { username, password }) => {
                request = request.basic_auth(username, password.as_deref());
            }
            None => {}
        }

        let response = request.body(payload.body).send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::Network(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let body = if response.status().is_success() {
            String::new()
        } else {
            let text = response.text().await.unwrap_or_default();
            text.chars().take(MAX_ERROR_BODY).collect()
        };

        Ok(TransportResponse { status, body })
    }
}

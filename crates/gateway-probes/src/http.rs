//! Configuration-driven HTTP prober.
//!
//! Works against any HTTP-fronted inference API:
//! - Tier 1 (`key_validation`): authenticated `GET` of a cheap listing endpoint
//! - Tier 2 (`handshake`): unauthenticated `GET`, only proves reachability
//! - Tier 3 (`real_request`): authenticated `POST` of a minimal completion

use async_trait::async_trait;
use gateway_core::{GatewayError, GatewayResult};
use gateway_health::{HealthStatus, ProbeResult, Prober, Tier};
use reqwest::header::HeaderMap;
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use url::Url;

/// Response headers carrying the remaining request budget, in lookup order
const RATE_LIMIT_HEADERS: [&str; 2] = ["x-ratelimit-remaining-requests", "x-ratelimit-remaining"];

/// HTTP prober configuration
#[derive(Debug, Clone)]
pub struct HttpProberConfig {
    /// Provider name
    pub name: String,
    /// API base URL, e.g. `https://api.openai.com`
    pub base_url: Url,
    /// API key; authenticated tiers go out without credentials when unset
    pub api_key: Option<SecretString>,
    /// Header carrying the raw key; `Authorization: Bearer` when unset
    pub auth_header: Option<String>,
    /// Path probed by key validation
    pub key_path: String,
    /// Path probed by the handshake
    pub handshake_path: String,
    /// Path of the micro-request
    pub request_path: String,
    /// JSON body of the micro-request
    pub request_body: serde_json::Value,
    /// Extra headers sent on every probe
    pub headers: Vec<(String, String)>,
    /// Per-probe timeout
    pub timeout: Duration,
    /// Successful micro-requests slower than this are `degraded`
    pub slow_threshold: Duration,
    /// TTL hint for key validation results
    pub key_validation_ttl: Duration,
    /// TTL hint for handshake results
    pub handshake_ttl: Duration,
    /// TTL hint for micro-request results
    pub real_request_ttl: Duration,
}

impl HttpProberConfig {
    /// Create a configuration with default paths and TTLs
    #[must_use]
    pub fn new(name: impl Into<String>, base_url: Url) -> Self {
        Self {
            name: name.into(),
            base_url,
            api_key: None,
            auth_header: None,
            key_path: "/v1/models".to_string(),
            handshake_path: "/".to_string(),
            request_path: "/v1/chat/completions".to_string(),
            request_body: serde_json::json!({
                "messages": [{"role": "user", "content": "ping"}],
                "max_tokens": 1
            }),
            headers: Vec::new(),
            timeout: Duration::from_secs(10),
            slow_threshold: Duration::from_secs(5),
            key_validation_ttl: Duration::from_secs(60),
            handshake_ttl: Duration::from_secs(120),
            real_request_ttl: Duration::from_secs(300),
        }
    }

    /// Set the API key
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::new(api_key.into()));
        self
    }

    /// Read the API key from an environment variable
    ///
    /// # Errors
    /// Returns `GatewayError::Configuration` if the variable is unset or empty
    pub fn with_api_key_env(self, var: &str) -> GatewayResult<Self> {
        match std::env::var(var) {
            Ok(key) if !key.trim().is_empty() => Ok(self.with_api_key(key)),
            _ => Err(GatewayError::configuration(format!(
                "API key environment variable '{var}' for provider '{}' is not set",
                self.name
            ))),
        }
    }

    /// Send the key in a named header instead of `Authorization: Bearer`
    #[must_use]
    pub fn with_auth_header(mut self, header: impl Into<String>) -> Self {
        self.auth_header = Some(header.into());
        self
    }

    /// Set the key validation path
    #[must_use]
    pub fn with_key_path(mut self, path: impl Into<String>) -> Self {
        self.key_path = path.into();
        self
    }

    /// Set the handshake path
    #[must_use]
    pub fn with_handshake_path(mut self, path: impl Into<String>) -> Self {
        self.handshake_path = path.into();
        self
    }

    /// Set the micro-request path
    #[must_use]
    pub fn with_request_path(mut self, path: impl Into<String>) -> Self {
        self.request_path = path.into();
        self
    }

    /// Set the micro-request body
    #[must_use]
    pub fn with_request_body(mut self, body: serde_json::Value) -> Self {
        self.request_body = body;
        self
    }

    /// Add a header sent on every probe
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the per-probe timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the slow threshold for micro-requests
    #[must_use]
    pub fn with_slow_threshold(mut self, threshold: Duration) -> Self {
        self.slow_threshold = threshold;
        self
    }

    /// Set the TTL hint for one tier
    #[must_use]
    pub fn with_ttl(mut self, tier: Tier, ttl: Duration) -> Self {
        match tier {
            Tier::KeyValidation => self.key_validation_ttl = ttl,
            Tier::Handshake => self.handshake_ttl = ttl,
            Tier::RealRequest => self.real_request_ttl = ttl,
        }
        self
    }

    /// TTL hint for one tier
    #[must_use]
    pub fn ttl(&self, tier: Tier) -> Duration {
        match tier {
            Tier::KeyValidation => self.key_validation_ttl,
            Tier::Handshake => self.handshake_ttl,
            Tier::RealRequest => self.real_request_ttl,
        }
    }

    /// Full URL for a configured path
    #[must_use]
    pub fn url_for(&self, path: &str) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }
}

/// Prober speaking plain HTTP to one provider
#[derive(Debug)]
pub struct HttpProber {
    config: HttpProberConfig,
    client: Client,
}

impl HttpProber {
    /// Create a new HTTP prober
    ///
    /// # Errors
    /// Returns error if HTTP client cannot be created
    pub fn new(config: HttpProberConfig) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// Get the configuration
    #[must_use]
    pub fn config(&self) -> &HttpProberConfig {
        &self.config
    }

    fn with_headers(&self, mut request: RequestBuilder) -> RequestBuilder {
        for (name, value) in &self.config.headers {
            request = request.header(name, value);
        }
        request
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match (&self.config.api_key, &self.config.auth_header) {
            (Some(key), Some(header)) => request.header(header, key.expose_secret()),
            (Some(key), None) => request.bearer_auth(key.expose_secret()),
            (None, _) => request,
        }
    }

    fn request_for(&self, tier: Tier) -> RequestBuilder {
        let request = match tier {
            Tier::KeyValidation => self
                .authorized(self.client.get(self.config.url_for(&self.config.key_path))),
            Tier::Handshake => self
                .client
                .get(self.config.url_for(&self.config.handshake_path)),
            Tier::RealRequest => self
                .authorized(self.client.post(self.config.url_for(&self.config.request_path)))
                .json(&self.config.request_body),
        };
        self.with_headers(request)
    }
}

#[async_trait]
impl Prober for HttpProber {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn check(&self, tier: Tier) -> GatewayResult<ProbeResult> {
        let start = Instant::now();
        let response = self.request_for(tier).send().await.map_err(|e| {
            warn!(provider = %self.config.name, tier = %tier, error = %e, "Probe request failed");
            GatewayError::probe_transport(&self.config.name, e.to_string())
        })?;
        let latency = start.elapsed();

        let code = response.status().as_u16();
        let remaining = rate_limit_remaining(response.headers());
        let (status, detail) = classify(tier, code, latency, self.config.slow_threshold);

        debug!(
            provider = %self.config.name,
            tier = %tier,
            status = %status,
            status_code = code,
            latency_ms = latency.as_millis(),
            "Probe completed"
        );

        Ok(ProbeResult::new(&self.config.name, tier, status, detail)
            .with_status_code(code)
            .with_rate_limit_remaining(remaining)
            .with_latency(latency))
    }

    fn healthy_hint(&self, tier: Tier) -> Duration {
        self.config.ttl(tier)
    }
}

/// Map a probe response to a status and detail text
fn classify(tier: Tier, code: u16, latency: Duration, slow: Duration) -> (HealthStatus, String) {
    let success = (200..300).contains(&code);
    let auth_rejected = code == 401 || code == 403;

    match tier {
        Tier::KeyValidation => match code {
            _ if success => (HealthStatus::Ok, "credentials accepted".to_string()),
            _ if auth_rejected => (HealthStatus::Down, "credentials rejected".to_string()),
            429 => (HealthStatus::Degraded, "rate limited".to_string()),
            _ => (HealthStatus::Suspect, format!("unexpected status {code}")),
        },
        Tier::Handshake => {
            if code < 500 {
                (HealthStatus::Ok, format!("endpoint reachable ({code})"))
            } else {
                (HealthStatus::Suspect, format!("server error {code}"))
            }
        }
        Tier::RealRequest => match code {
            _ if success && latency > slow => (
                HealthStatus::Degraded,
                format!("slow response ({}ms)", latency.as_millis()),
            ),
            _ if success => (HealthStatus::Ok, "request served".to_string()),
            _ if auth_rejected => (HealthStatus::Down, "credentials rejected".to_string()),
            429 => (HealthStatus::Degraded, "rate limited".to_string()),
            500..=599 => (HealthStatus::Down, format!("server error {code}")),
            _ => (HealthStatus::Suspect, format!("unexpected status {code}")),
        },
    }
}

fn rate_limit_remaining(headers: &HeaderMap) -> Option<u32> {
    RATE_LIMIT_HEADERS.iter().find_map(|name| {
        headers
            .get(*name)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse().ok())
    })
}

//! Synthetic latency probes against the target service
//!
//! A probe is a single `POST <base>/get-location` carrying a representative
//! address. Probes never fail as far as the caller is concerned: transport
//! errors and timeouts become failed samples whose latency is the time spent
//! waiting, capped at the timeout. Latency covers the whole response body.

use crate::models::ProbeSample;
use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;
use url::Url;

/// Status recorded when no HTTP response was received
pub const FAILURE_STATUS: u16 = 599;

/// Probe timeout used by the online controller
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Probe timeout used during training campaigns
pub const TRAINING_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Representative addresses sent as probe payloads
pub const SAMPLE_ADDRESSES: &[&str] = &[
    "AK-484-9321",
    "GA-184-9823",
    "AS-102-1234",
    "GS-123-4567",
    "EO-000-1111",
];

const PROBE_PATH: &str = "get-location";

/// Trait for probe implementations
#[async_trait]
pub trait Probe: Send + Sync {
    /// Issue one synthetic request and report what happened
    async fn probe(&self) -> ProbeSample;
}

/// HTTP prober posting form-encoded addresses
pub struct HttpProber {
    client: Client,
    url: Url,
    timeout: Duration,
}

impl HttpProber {
    /// Create a prober for `base_url` with a per-request timeout
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            url: probe_url(base_url)?,
            timeout,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn elapsed_ms(&self, start: Instant) -> f64 {
        start.elapsed().min(self.timeout).as_secs_f64() * 1000.0
    }
}

#[async_trait]
impl Probe for HttpProber {
    async fn probe(&self) -> ProbeSample {
        let address = random_address();
        let timestamp = Instant::now();

        let result = self.exchange(address).await;
        let latency_ms = self.elapsed_ms(timestamp);

        match result {
            Ok(status) => ProbeSample {
                latency_ms,
                success: status == StatusCode::OK,
                status_code: status.as_u16(),
                timestamp,
            },
            Err(e) => {
                debug!(
                    url = %self.url,
                    error = %e,
                    timeout = e.is_timeout(),
                    "Probe failed"
                );
                ProbeSample {
                    latency_ms,
                    success: false,
                    status_code: FAILURE_STATUS,
                    timestamp,
                }
            }
        }
    }
}

impl HttpProber {
    /// Send one request and drain the body so the latency covers the full response
    async fn exchange(&self, address: &str) -> reqwest::Result<StatusCode> {
        let response = self
            .client
            .post(self.url.clone())
            .form(&[("address", address)])
            .send()
            .await?;
        let status = response.status();
        response.bytes().await?;
        Ok(status)
    }
}

/// Build the probe endpoint from a service base URL
pub fn probe_url(base_url: &str) -> Result<Url> {
    let trimmed = base_url.trim_end_matches('/');
    let base = Url::parse(&format!("{}/", trimmed)).context("Invalid service URL")?;
    base.join(PROBE_PATH).context("Invalid probe path")
}

fn random_address() -> &'static str {
    SAMPLE_ADDRESSES
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(SAMPLE_ADDRESSES[0])
}

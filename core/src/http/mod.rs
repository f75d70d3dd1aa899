pub mod client;

pub use client::HttpClient;

use std::time::Duration;

use async_trait::async_trait;
use log::debug;

use crate::error::TransportError;

/// An HTTP GET capability. Implementations report the response status or a
/// transport-level failure.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str) -> Result<u16, TransportError>;
}

/// Performs a single GET probe against `url`.
///
/// Returns `true` only for a 2xx status. Timeouts, connection errors and any
/// other status are all reported as `false`. The call is bounded by `timeout`
/// regardless of what the transport enforces itself.
pub async fn attempt(transport: &dyn Transport, url: &str, timeout: Duration) -> bool {
    let result = match tokio::time::timeout(timeout, transport.get(url)).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout),
    };

    match result {
        Ok(status) if (200..300).contains(&status) => true,
        Ok(status) => {
            debug!("GET {} returned status {}", url, status);
            false
        }
        Err(e) => {
            debug!("GET {} failed: {}", url, e);
            false
        }
    }
}

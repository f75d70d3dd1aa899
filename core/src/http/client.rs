use async_trait::async_trait;
use log::warn;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, ClientBuilder, Proxy};
use std::time::Duration;

use super::Transport;
use crate::error::{Result, TransportError};

const USER_AGENT: &str = concat!("retune/", env!("CARGO_PKG_VERSION"));

/// reqwest-backed transport with a per-request timeout and a pool sized to
/// the connection ceiling.
pub struct HttpClient {
    inner: Client,
    timeout: Duration,
}

impl HttpClient {
    pub fn new(
        timeout: Duration,
        max_connections: usize,
        proxy_url: Option<&str>,
        custom_headers: &[(String, String)],
    ) -> Result<Self> {
        let mut default_headers = HeaderMap::new();
        for (key, val) in custom_headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(key.as_bytes()),
                HeaderValue::from_str(val),
            ) {
                default_headers.insert(name, value);
            } else {
                warn!("Skipping invalid header '{}: {}'", key, val);
            }
        }

        let mut builder = ClientBuilder::new()
            .timeout(timeout)
            .connect_timeout(timeout)
            .pool_max_idle_per_host(max_connections)
            .user_agent(USER_AGENT)
            .default_headers(default_headers);

        if let Some(proxy) = proxy_url {
            builder = builder.proxy(Proxy::all(proxy)?);
        }

        Ok(Self {
            inner: builder.build()?,
            timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl Transport for HttpClient {
    async fn get(&self, url: &str) -> std::result::Result<u16, TransportError> {
        let response = self.inner.get(url).timeout(self.timeout).send().await?;
        Ok(response.status().as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = HttpClient::new(Duration::from_secs(10), 100, None, &[]).unwrap();
        assert_eq!(client.timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_client_skips_invalid_headers() {
        let headers = vec![
            ("X-Run".to_string(), "1".to_string()),
            ("bad header".to_string(), "x".to_string()),
        ];
        assert!(HttpClient::new(Duration::from_secs(1), 1, None, &headers).is_ok());
    }

    #[test]
    fn test_client_rejects_bad_proxy() {
        assert!(HttpClient::new(Duration::from_secs(1), 1, Some("http://[::1"), &[]).is_err());
    }
}

// shuttle/src/fetch.rs
use crate::core::{Result, ShuttleError};
use reqwest::blocking::Client;
use reqwest::redirect::Policy;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

/// Downloads a remote resource into a sink. Required for remote imports.
pub trait RemoteFetcher: Send + Sync {
    /// Streams the body of `url` into `sink` and returns the byte count.
    fn fetch(&self, url: &str, sink: &mut dyn Write) -> Result<u64>;
}

impl<T: RemoteFetcher + ?Sized> RemoteFetcher for Arc<T> {
    fn fetch(&self, url: &str, sink: &mut dyn Write) -> Result<u64> {
        (**self).fetch(url, sink)
    }
}

/// `reqwest` blocking client. Follows redirects, fails on HTTP error status.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(60))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .redirect(Policy::limited(10))
            .timeout(timeout)
            .user_agent(concat!("shuttle/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ShuttleError::RuntimeUnavailable(format!("HTTP client unavailable: {}", e)))?;
        Ok(Self { client })
    }
}

impl RemoteFetcher for HttpFetcher {
    fn fetch(&self, url: &str, sink: &mut dyn Write) -> Result<u64> {
        log::debug!("Fetching {}", url);
        let mut response = self.client.get(url).send()?.error_for_status()?;
        let bytes = response.copy_to(sink)?;
        log::debug!("Fetched {} bytes from {}", bytes, url);
        Ok(bytes)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Serves canned bodies by URL; unknown URLs fail like a 404.
    #[derive(Default)]
    pub struct StaticFetcher {
        pub bodies: HashMap<String, Vec<u8>>,
    }

    impl StaticFetcher {
        pub fn with(mut self, url: &str, body: Vec<u8>) -> Self {
            self.bodies.insert(url.to_string(), body);
            self
        }
    }

    impl RemoteFetcher for StaticFetcher {
        fn fetch(&self, url: &str, sink: &mut dyn Write) -> Result<u64> {
            let body = self
                .bodies
                .get(url)
                .ok_or_else(|| ShuttleError::Transportation(format!("404 Not Found for {}", url)))?;
            sink.write_all(body)?;
            Ok(body.len() as u64)
        }
    }

    #[test]
    fn static_fetcher_writes_body() {
        let fetcher = StaticFetcher::default().with("http://host/a.txt", b"hello".to_vec());
        let mut sink = Vec::new();
        assert_eq!(fetcher.fetch("http://host/a.txt", &mut sink).unwrap(), 5);
        assert_eq!(sink, b"hello");
        assert!(fetcher.fetch("http://host/missing", &mut sink).is_err());
    }

    #[test]
    fn http_fetcher_builds() {
        assert!(HttpFetcher::new().is_ok());
    }

    #[test]
    fn unreachable_host_is_an_error() {
        let fetcher = HttpFetcher::with_timeout(Duration::from_millis(500)).unwrap();
        let mut sink = Vec::new();
        assert!(fetcher.fetch("http://127.0.0.1:9/nothing", &mut sink).is_err());
    }
}

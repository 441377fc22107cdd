//! HTTP client for external assets.

use std::time::Duration;

use futures_util::StreamExt;
use reqwest::StatusCode;
use reqwest::redirect::Policy;
use tracing::{debug, warn};
use url::Url;

use crate::error::FetchError;
use crate::security::validate_url;

/// Default timeout for a single HTTP request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default number of retries after a transient failure.
pub const DEFAULT_RETRIES: u32 = 2;

/// Default delay unit between retries; attempt `n` waits `n` units.
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(200);

/// Default maximum number of redirects.
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

/// Default maximum body size (10 MB).
pub const DEFAULT_MAX_SIZE: u64 = 10 * 1024 * 1024;

/// HTTP client with a bounded timeout, bounded retries and SSRF checks on
/// every redirect hop.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    retries: u32,
    backoff: Duration,
    allow_local: bool,
    max_size: u64,
}

/// Builder for [`HttpClient`].
#[derive(Debug)]
pub struct HttpClientBuilder {
    timeout: Duration,
    retries: u32,
    backoff: Duration,
    allow_local: bool,
    max_redirects: usize,
    max_size: u64,
}

impl HttpClient {
    /// Create a new builder for HttpClient.
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder {
            timeout: DEFAULT_TIMEOUT,
            retries: DEFAULT_RETRIES,
            backoff: DEFAULT_BACKOFF,
            allow_local: false,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            max_size: DEFAULT_MAX_SIZE,
        }
    }

    /// Fetches `url`, retrying transient failures up to the configured count.
    pub async fn fetch(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        validate_url(url, self.allow_local)?;

        let mut attempt = 0;
        loop {
            match self.fetch_once(url).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) if e.is_transient() && attempt < self.retries => {
                    attempt += 1;
                    warn!(
                        "Fetching {} failed ({}), retry {}/{}",
                        url, e, attempt, self.retries
                    );
                    tokio::time::sleep(self.backoff * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_once(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        debug!("GET {}", url);
        let response = self.client.get(url.clone()).send().await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status,
                url: url.to_string(),
            });
        }

        if let Some(len) = response.content_length()
            && len > self.max_size
        {
            return Err(FetchError::TooLarge {
                size: len,
                max: self.max_size,
            });
        }

        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            let size = (body.len() + chunk.len()) as u64;
            if size > self.max_size {
                return Err(FetchError::TooLarge {
                    size,
                    max: self.max_size,
                });
            }
            body.extend_from_slice(&chunk);
        }

        Ok(body)
    }
}

impl HttpClientBuilder {
    /// Set timeout for HTTP requests.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the number of retries after a transient failure.
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Set the delay unit between retries.
    pub fn backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Allow fetching from local network addresses.
    pub fn allow_local(mut self, allow: bool) -> Self {
        self.allow_local = allow;
        self
    }

    /// Set maximum number of redirects.
    pub fn max_redirects(mut self, max: usize) -> Self {
        self.max_redirects = max;
        self
    }

    /// Set the maximum accepted body size.
    pub fn max_size(mut self, max: u64) -> Self {
        self.max_size = max;
        self
    }

    /// Build the HttpClient.
    pub fn build(self) -> Result<HttpClient, FetchError> {
        let allow_local = self.allow_local;
        let max_redirects = self.max_redirects;
        let redirect = Policy::custom(move |attempt| {
            if attempt.previous().len() >= max_redirects {
                attempt.error("too many redirects")
            } else if let Err(e) = validate_url(attempt.url(), allow_local) {
                attempt.error(e)
            } else {
                attempt.follow()
            }
        });

        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .redirect(redirect)
            .user_agent(concat!("basset/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::ClientBuild(e.to_string()))?;

        Ok(HttpClient {
            client,
            retries: self.retries,
            backoff: self.backoff,
            allow_local: self.allow_local,
            max_size: self.max_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::SecurityError;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn local_client() -> HttpClient {
        HttpClient::builder()
            .allow_local(true)
            .backoff(Duration::from_millis(1))
            .build()
            .unwrap()
    }

    #[test]
    fn builder_default_values() {
        let builder = HttpClient::builder();
        assert_eq!(builder.timeout, Duration::from_secs(10));
        assert_eq!(builder.max_redirects, DEFAULT_MAX_REDIRECTS);

        let client = builder.build().unwrap();
        assert_eq!(client.retries, 2);
        assert!(!client.allow_local);
        assert_eq!(client.max_size, DEFAULT_MAX_SIZE);
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/lib.js"))
            .respond_with(ResponseTemplate::new(200).set_body_string("var a = 1;"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let url = Url::parse(&format!("{}/lib.js", mock_server.uri())).unwrap();
        let bytes = local_client().fetch(&url).await.unwrap();
        assert_eq!(bytes, b"var a = 1;");
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing.js"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&mock_server)
            .await;

        let url = Url::parse(&format!("{}/missing.js", mock_server.uri())).unwrap();
        let result = local_client().fetch(&url).await;
        assert!(matches!(result, Err(FetchError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_server_error_is_retried_then_succeeds() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky.css"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky.css"))
            .respond_with(ResponseTemplate::new(200).set_body_string("a{}"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let url = Url::parse(&format!("{}/flaky.css", mock_server.uri())).unwrap();
        let bytes = local_client().fetch(&url).await.unwrap();
        assert_eq!(bytes, b"a{}");
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/down.js"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&mock_server)
            .await;

        let url = Url::parse(&format!("{}/down.js", mock_server.uri())).unwrap();
        let result = local_client().fetch(&url).await;
        match result {
            Err(FetchError::HttpStatus { status, .. }) => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR)
            }
            res => panic!("Expected HttpStatus error, got {:?}", res),
        }
    }

    #[tokio::test]
    async fn test_timeout_is_reported() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow.js"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("slow")
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&mock_server)
            .await;

        let client = HttpClient::builder()
            .allow_local(true)
            .timeout(Duration::from_millis(100))
            .retries(0)
            .build()
            .unwrap();

        let url = Url::parse(&format!("{}/slow.js", mock_server.uri())).unwrap();
        match client.fetch(&url).await {
            Err(e @ FetchError::Network(_)) => assert!(e.is_transient()),
            res => panic!("Expected timeout, got {:?}", res),
        }
    }

    #[tokio::test]
    async fn test_body_limit() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/big.js"))
            .respond_with(ResponseTemplate::new(200).set_body_string("A".repeat(64)))
            .mount(&mock_server)
            .await;

        let client = HttpClient::builder()
            .allow_local(true)
            .max_size(16)
            .build()
            .unwrap();

        let url = Url::parse(&format!("{}/big.js", mock_server.uri())).unwrap();
        match client.fetch(&url).await {
            Err(FetchError::TooLarge { max, .. }) => assert_eq!(max, 16),
            res => panic!("Expected TooLarge, got {:?}", res),
        }
    }

    #[tokio::test]
    async fn test_local_denied_by_default() {
        let mock_server = MockServer::start().await;

        let client = HttpClient::builder().build().unwrap();
        let url = Url::parse(&format!("{}/lib.js", mock_server.uri())).unwrap();

        match client.fetch(&url).await {
            Err(FetchError::Security(SecurityError::LoopbackDenied(_))) => {}
            res => panic!("Expected LoopbackDenied, got {:?}", res),
        }
    }

    #[tokio::test]
    async fn test_redirect_followed() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/latest.js"))
            .respond_with(ResponseTemplate::new(302).insert_header(
                "Location",
                format!("{}/v2.js", mock_server.uri()).as_str(),
            ))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2.js"))
            .respond_with(ResponseTemplate::new(200).set_body_string("v2"))
            .mount(&mock_server)
            .await;

        let url = Url::parse(&format!("{}/latest.js", mock_server.uri())).unwrap();
        assert_eq!(local_client().fetch(&url).await.unwrap(), b"v2");
    }

    #[tokio::test]
    async fn test_redirect_limit() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/latest.js"))
            .respond_with(ResponseTemplate::new(302).insert_header(
                "Location",
                format!("{}/v2.js", mock_server.uri()).as_str(),
            ))
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2.js"))
            .respond_with(ResponseTemplate::new(200).set_body_string("v2"))
            .expect(0)
            .mount(&mock_server)
            .await;

        let client = HttpClient::builder()
            .allow_local(true)
            .max_redirects(0)
            .build()
            .unwrap();
        let url = Url::parse(&format!("{}/latest.js", mock_server.uri())).unwrap();

        match client.fetch(&url).await {
            Err(FetchError::Network(e)) => assert!(e.is_redirect()),
            res => panic!("Expected a redirect error, got {:?}", res),
        }
    }
}

//! Overpass API access.
//!
//! [`build_query`] renders the Overpass QL for a region, [`OverpassClient`]
//! sends it, and [`GeometryFetcher`] wraps any [`GeometrySource`] in the
//! profile's retry policy. A district whose fetch never succeeds yields an
//! empty element list rather than an error.

use async_trait::async_trait;
use canvass_map_street_models::RegionDescriptor;
use canvass_map_street_models::profile::ImportMode;
use canvass_map_street_models::raw::{OverpassResponse, RawElement};

use crate::StreetError;
use crate::config::ImportConfig;
use crate::retry::RetryPolicy;

/// Maximum length of the response body preview included in error logs.
const BODY_PREVIEW_LEN: usize = 500;

/// Renders the Overpass QL query for all `highway` ways in `region`.
///
/// In [`ImportMode::NamedOnly`] the query also requires a `name` tag.
#[must_use]
pub fn build_query(region: &RegionDescriptor, mode: ImportMode, timeout_secs: u32) -> String {
    let filter = match mode {
        ImportMode::NamedOnly => "way[\"highway\"][\"name\"]",
        ImportMode::AllWays => "way[\"highway\"]",
    };

    match region {
        RegionDescriptor::BoundingBox(b) => format!(
            "[out:json][timeout:{timeout_secs}];\n\
             (\n  {filter}({},{},{},{});\n);\n\
             out geom;",
            b.south, b.west, b.north, b.east
        ),
        RegionDescriptor::NamedArea(name) => format!(
            "[out:json][timeout:{timeout_secs}];\n\
             area[\"name\"=\"{}\"]->.a;\n\
             (\n  {filter}(area.a);\n);\n\
             out geom;",
            escape_ql(name)
        ),
    }
}

fn escape_ql(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Something that can run an Overpass query and return raw ways.
#[async_trait]
pub trait GeometrySource: Send + Sync {
    /// Runs `query` once.
    ///
    /// # Errors
    ///
    /// Returns [`StreetError`] on network failure, non-success status, or
    /// an undecodable body.
    async fn fetch(&self, query: &str) -> Result<Vec<RawElement>, StreetError>;
}

/// HTTP client for an Overpass interpreter endpoint.
pub struct OverpassClient {
    client: reqwest::Client,
    url: String,
}

impl OverpassClient {
    /// Builds a client from the process configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StreetError::Http`] if the HTTP client cannot be built.
    pub fn new(config: &ImportConfig) -> Result<Self, StreetError> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            url: config.overpass_url.clone(),
        })
    }
}

#[async_trait]
impl GeometrySource for OverpassClient {
    async fn fetch(&self, query: &str) -> Result<Vec<RawElement>, StreetError> {
        let response = self
            .client
            .post(&self.url)
            .form(&[("data", query)])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            log::warn!(
                "Overpass returned HTTP {status}. Response body: {}",
                truncate_for_log(&body, BODY_PREVIEW_LEN)
            );
            return Err(StreetError::UpstreamStatus {
                status: status.as_u16(),
            });
        }

        let parsed: OverpassResponse =
            serde_json::from_str(&body).map_err(|e| StreetError::MalformedResponse {
                message: format!("{e}; body: {}", truncate_for_log(&body, BODY_PREVIEW_LEN)),
            })?;

        if let Some(remark) = parsed.runtime_error() {
            log::warn!("Overpass reported a failed query: {remark}");
            return Err(StreetError::MalformedResponse {
                message: format!("Overpass remark: {remark}"),
            });
        }

        Ok(parsed.elements)
    }
}

/// Truncates a string for logging, appending "..." if it exceeds `max_len`.
fn truncate_for_log(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

/// Result of fetching one region.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    /// Raw ways returned; empty if every attempt failed.
    pub elements: Vec<RawElement>,
    /// Attempts made.
    pub attempts: u32,
    /// Last error, if the fetch was given up.
    pub error: Option<String>,
}

/// Runs queries against a [`GeometrySource`] under a [`RetryPolicy`].
pub struct GeometryFetcher<S> {
    source: S,
    policy: RetryPolicy,
    retry_malformed: bool,
    timeout_secs: u32,
}

impl<S: GeometrySource> GeometryFetcher<S> {
    /// Wraps `source`. `timeout_secs` is the server-side query timeout
    /// written into each query.
    #[must_use]
    pub const fn new(
        source: S,
        policy: RetryPolicy,
        retry_malformed: bool,
        timeout_secs: u32,
    ) -> Self {
        Self {
            source,
            policy,
            retry_malformed,
            timeout_secs,
        }
    }

    /// The wrapped source.
    #[must_use]
    pub const fn source(&self) -> &S {
        &self.source
    }

    /// Replaces the retry policy.
    #[must_use]
    pub const fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Returns `true` if `error` is worth another attempt.
    #[must_use]
    pub const fn is_retryable(&self, error: &StreetError) -> bool {
        error.is_transient()
            || (self.retry_malformed
                && matches!(error, StreetError::MalformedResponse { .. }))
    }

    /// Fetches the ways in `region`, retrying per the policy.
    ///
    /// `on_retry` is called with the attempt number before each retry.
    /// Never fails: when retries are exhausted the outcome carries no
    /// elements and the last error message.
    pub async fn fetch(
        &self,
        label: &str,
        region: &RegionDescriptor,
        mode: ImportMode,
        on_retry: impl Fn(u32) + Send + Sync,
    ) -> FetchOutcome {
        let query = build_query(region, mode, self.timeout_secs);
        log::debug!("{label}: querying {region}");

        let mut last_attempt = 0;
        let result = self
            .policy
            .run(
                label,
                |attempt| {
                    last_attempt = attempt;
                    if attempt > 1 {
                        on_retry(attempt);
                    }
                    self.source.fetch(&query)
                },
                |e| self.is_retryable(e),
            )
            .await;

        match result {
            Ok(elements) => FetchOutcome {
                elements,
                attempts: last_attempt,
                error: None,
            },
            Err(e) => {
                log::error!("{label}: fetch failed, continuing with no streets: {e}");
                FetchOutcome {
                    elements: Vec::new(),
                    attempts: e.attempts,
                    error: Some(e.source.to_string()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use canvass_map_street_models::BoundingBox;
    use canvass_map_street_models::profile::Backoff;
    use canvass_map_street_models::raw::RawPoint;

    use super::*;

    /// Replays a fixed script of responses, one per call.
    struct ScriptedSource {
        script: Mutex<Vec<Result<Vec<RawElement>, StreetError>>>,
        calls: AtomicU32,
        queries: Mutex<Vec<String>>,
    }

    impl ScriptedSource {
        fn new(mut script: Vec<Result<Vec<RawElement>, StreetError>>) -> Self {
            script.reverse();
            Self {
                script: Mutex::new(script),
                calls: AtomicU32::new(0),
                queries: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl GeometrySource for ScriptedSource {
        async fn fetch(&self, query: &str) -> Result<Vec<RawElement>, StreetError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.queries.lock().unwrap().push(query.to_string());
            self.script
                .lock()
                .unwrap()
                .pop()
                .unwrap_or(Err(StreetError::UpstreamStatus { status: 504 }))
        }
    }

    fn way(id: i64) -> RawElement {
        RawElement {
            id,
            tags: BTreeMap::from([("name".to_string(), format!("Rue {id}"))]),
            geometry: Some(vec![
                RawPoint { lat: 48.85, lon: 2.35 },
                RawPoint { lat: 48.86, lon: 2.36 },
            ]),
        }
    }

    fn fetcher(source: ScriptedSource, retry_malformed: bool) -> GeometryFetcher<ScriptedSource> {
        GeometryFetcher::new(
            source,
            RetryPolicy::new(3, Duration::ZERO, Backoff::Fixed),
            retry_malformed,
            300,
        )
    }

    fn region() -> RegionDescriptor {
        RegionDescriptor::NamedArea("Paris 4e Arrondissement".to_string())
    }

    #[test]
    fn bbox_query_uses_south_west_north_east() {
        let query = build_query(
            &RegionDescriptor::BoundingBox(BoundingBox::new(48.854, 2.32, 48.87, 2.351)),
            ImportMode::NamedOnly,
            300,
        );
        assert!(query.starts_with("[out:json][timeout:300];"));
        assert!(query.contains("way[\"highway\"][\"name\"](48.854,2.32,48.87,2.351);"));
        assert!(query.ends_with("out geom;"));
    }

    #[test]
    fn named_area_query_binds_area() {
        let query = build_query(&region(), ImportMode::NamedOnly, 180);
        assert!(query.contains("[timeout:180]"));
        assert!(query.contains("area[\"name\"=\"Paris 4e Arrondissement\"]->.a;"));
        assert!(query.contains("way[\"highway\"][\"name\"](area.a);"));
    }

    #[test]
    fn all_ways_query_drops_name_filter() {
        let query = build_query(&region(), ImportMode::AllWays, 300);
        assert!(query.contains("way[\"highway\"](area.a);"));
        assert!(!query.contains("[\"name\"](area.a)"));
    }

    #[test]
    fn area_names_are_escaped() {
        let query = build_query(
            &RegionDescriptor::NamedArea("a\"b".to_string()),
            ImportMode::NamedOnly,
            300,
        );
        assert!(query.contains("area[\"name\"=\"a\\\"b\"]"));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_for_log("short", 10), "short");
        assert_eq!(truncate_for_log("éééé", 3), "é...");
    }

    #[tokio::test]
    async fn succeeds_after_transient_failure() {
        let source = ScriptedSource::new(vec![
            Err(StreetError::UpstreamStatus { status: 429 }),
            Ok(vec![way(1), way(2)]),
        ]);
        let retries = AtomicU32::new(0);
        let fetcher = fetcher(source, true);

        let outcome = fetcher
            .fetch("district 4", &region(), ImportMode::NamedOnly, |_| {
                retries.fetch_add(1, Ordering::SeqCst);
            })
            .await;

        assert_eq!(outcome.elements.len(), 2);
        assert_eq!(outcome.attempts, 2);
        assert!(outcome.error.is_none());
        assert_eq!(retries.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhaustion_yields_empty_result() {
        let source = ScriptedSource::new(Vec::new());
        let fetcher = fetcher(source, true);

        let outcome = fetcher
            .fetch("district 4", &region(), ImportMode::NamedOnly, |_| {})
            .await;

        assert!(outcome.elements.is_empty());
        assert_eq!(outcome.attempts, 3);
        assert_eq!(fetcher.source().calls.load(Ordering::SeqCst), 3);
        assert!(outcome.error.unwrap().contains("504"));
    }

    #[tokio::test]
    async fn malformed_body_not_retried_when_disabled() {
        let source = ScriptedSource::new(vec![Err(StreetError::MalformedResponse {
            message: "expected value".to_string(),
        })]);
        let fetcher = fetcher(source, false);

        let outcome = fetcher
            .fetch("district 4", &region(), ImportMode::NamedOnly, |_| {})
            .await;

        assert!(outcome.elements.is_empty());
        assert_eq!(fetcher.source().calls.load(Ordering::SeqCst), 1);
    }

    /// Serves `body` with HTTP 200 to every connection and counts requests.
    async fn serve_ok(body: &'static str) -> (String, Arc<AtomicU32>) {
        use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/api/interpreter", listener.local_addr().unwrap());
        let hits = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&hits);

        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let mut request = Vec::new();
                let mut buf = [0_u8; 4096];
                loop {
                    let n = stream.read(&mut buf).await.unwrap_or(0);
                    if n == 0 {
                        break;
                    }
                    request.extend_from_slice(&buf[..n]);
                    let text = String::from_utf8_lossy(&request);
                    if let Some(end) = text.find("\r\n\r\n") {
                        let length = text[..end]
                            .lines()
                            .find_map(|line| {
                                let (name, value) = line.split_once(':')?;
                                name.eq_ignore_ascii_case("content-length")
                                    .then(|| value.trim().parse::<usize>().ok())?
                            })
                            .unwrap_or(0);
                        if request.len() >= end + 4 + length {
                            break;
                        }
                    }
                }
                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        (url, hits)
    }

    fn local_client(url: String) -> OverpassClient {
        OverpassClient::new(&ImportConfig {
            overpass_url: url,
            request_timeout: Duration::from_secs(5),
            ..ImportConfig::default()
        })
        .unwrap()
    }

    const TIMED_OUT_BODY: &str = r#"{"version":0.6,"elements":[],"remark":"runtime error: Query timed out in \"query\" at line 3 after 181 seconds."}"#;

    #[tokio::test]
    async fn runtime_error_remark_is_retried_when_enabled() {
        let (url, hits) = serve_ok(TIMED_OUT_BODY).await;
        let fetcher = GeometryFetcher::new(
            local_client(url),
            RetryPolicy::new(3, Duration::ZERO, Backoff::Fixed),
            true,
            180,
        );

        let outcome = fetcher
            .fetch("district 16", &region(), ImportMode::NamedOnly, |_| {})
            .await;

        assert!(outcome.elements.is_empty());
        assert_eq!(outcome.attempts, 3);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert!(outcome.error.unwrap().contains("runtime error"));
    }

    #[tokio::test]
    async fn runtime_error_remark_fails_district_without_retry() {
        let (url, hits) = serve_ok(TIMED_OUT_BODY).await;
        let fetcher = GeometryFetcher::new(
            local_client(url),
            RetryPolicy::new(3, Duration::ZERO, Backoff::Fixed),
            false,
            180,
        );

        let outcome = fetcher
            .fetch("district 16", &region(), ImportMode::NamedOnly, |_| {})
            .await;

        assert_eq!(outcome.attempts, 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(outcome.error.is_some());
    }

    #[tokio::test]
    async fn plain_ok_body_is_returned() {
        let (url, _hits) = serve_ok(
            r#"{"elements":[{"type":"way","id":9,"tags":{"name":"Rue Lepic"},"geometry":[{"lat":48.88,"lon":2.33},{"lat":48.89,"lon":2.34}]}]}"#,
        )
        .await;

        let elements = local_client(url).fetch("[out:json];").await.unwrap();
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].name(), Some("Rue Lepic"));
    }

    #[tokio::test]
    async fn malformed_body_retried_when_enabled() {
        let source = ScriptedSource::new(vec![
            Err(StreetError::MalformedResponse {
                message: "expected value".to_string(),
            }),
            Ok(vec![way(7)]),
        ]);
        let fetcher = fetcher(source, true);

        let outcome = fetcher
            .fetch("district 4", &region(), ImportMode::AllWays, |_| {})
            .await;

        assert_eq!(outcome.elements.len(), 1);
        let queries = fetcher.source().queries.lock().unwrap();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[0], queries[1]);
    }
}

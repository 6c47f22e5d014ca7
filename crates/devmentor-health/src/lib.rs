//! Reachability and liveness checks for the DevMentor listeners.
//!
//! Diagnosis is layered: a raw TCP probe decides whether anything listens on
//! the port, then HTTP probes against a fixed list of paths decide whether
//! the listener speaks HTTP. Every check is a single blocking attempt bounded
//! by its timeout; failures are reported in the returned records, never raised.

use anyhow::Result;
use chrono::{DateTime, Utc};
use devmentor_core::DiagnosticsConfig;
use indexmap::IndexMap;
use reqwest::blocking::Client;
use reqwest::{Url, redirect};
use serde::Serialize;
use std::error::Error as StdError;
use std::io::ErrorKind;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, info, warn};

mod report;

pub use report::format_report;

/// Paths probed on every agent listener, with the name each result is filed under.
pub const ENDPOINT_CANDIDATES: [(&str, &str); 4] = [
    ("/", "root"),
    ("/health", "health"),
    ("/api/health", "api_health"),
    ("/v1/health", "v1_health"),
];

pub const TOOL_SERVER_NOTE: &str =
    "Tool server requires Accept: text/event-stream on its root endpoint";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProbeResult {
    pub reachable: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct EndpointResult {
    pub url: String,
    pub ok: bool,
    pub error: Option<String>,
    pub status_code: Option<u16>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    #[default]
    Unknown,
    Healthy,
    PortClosed,
    PortOpenButNoEndpoint,
    PortOpenButUnexpectedResponse,
    PortOpenButNoResponse,
}

impl OverallStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Healthy => "healthy",
            Self::PortClosed => "port_closed",
            Self::PortOpenButNoEndpoint => "port_open_but_no_endpoint",
            Self::PortOpenButUnexpectedResponse => "port_open_but_unexpected_response",
            Self::PortOpenButNoResponse => "port_open_but_no_response",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Unknown => "❓ Unknown status",
            Self::Healthy => "✅ Healthy",
            Self::PortClosed => "❌ Port closed",
            Self::PortOpenButNoEndpoint => "⚠️  Port open but no HTTP endpoint",
            Self::PortOpenButUnexpectedResponse => "⚠️  Port open but unexpected response",
            Self::PortOpenButNoResponse => "⚠️  Port open but no response",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthRecord {
    pub url: String,
    pub port: u16,
    pub host: String,
    pub port_open: bool,
    pub port_error: Option<String>,
    pub endpoints: IndexMap<String, EndpointResult>,
    pub overall_status: OverallStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl HealthRecord {
    fn new(url: String, port: u16, host: String) -> Self {
        Self {
            url,
            port,
            host,
            port_open: false,
            port_error: None,
            endpoints: IndexMap::new(),
            overall_status: OverallStatus::Unknown,
            note: None,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.overall_status == OverallStatus::Healthy
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct StatusTally {
    pub total: usize,
    pub healthy: usize,
    pub port_closed: usize,
    pub port_open_but_no_endpoint: usize,
    pub unknown: usize,
}

impl StatusTally {
    fn count(&mut self, status: OverallStatus) {
        match status {
            OverallStatus::Healthy => self.healthy += 1,
            OverallStatus::PortClosed => self.port_closed += 1,
            OverallStatus::PortOpenButNoEndpoint => self.port_open_but_no_endpoint += 1,
            _ => self.unknown += 1,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticSummary {
    pub generated_at: DateTime<Utc>,
    pub servers: IndexMap<String, HealthRecord>,
    pub summary: StatusTally,
}

impl DiagnosticSummary {
    /// Wraps a single record so it can go through [`format_report`].
    pub fn single(name: impl Into<String>, record: HealthRecord) -> Self {
        let mut summary = StatusTally {
            total: 1,
            ..StatusTally::default()
        };
        summary.count(record.overall_status);
        let mut servers = IndexMap::new();
        servers.insert(name.into(), record);
        Self {
            generated_at: Utc::now(),
            servers,
            summary,
        }
    }

    pub fn all_healthy(&self) -> bool {
        self.summary.healthy == self.summary.total
    }
}

/// Attempts one TCP connection to `(host, port)`.
pub fn probe_port(host: &str, port: u16, timeout: Duration) -> ProbeResult {
    let addrs = match (host, port).to_socket_addrs() {
        Ok(addrs) => addrs.collect::<Vec<_>>(),
        Err(err) => {
            return ProbeResult {
                reachable: false,
                error: Some(format!("DNS resolution failed for {host}: {err}")),
            };
        }
    };
    if addrs.is_empty() {
        return ProbeResult {
            reachable: false,
            error: Some(format!("DNS resolution failed for {host}: no addresses")),
        };
    }

    let mut last_error = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(_) => {
                return ProbeResult {
                    reachable: true,
                    error: None,
                };
            }
            Err(err) if err.kind() == ErrorKind::TimedOut || err.kind() == ErrorKind::WouldBlock => {
                last_error = Some(format!("Timed out connecting to {host}:{port}"));
            }
            Err(err) => {
                last_error = Some(format!("Port {port} is not accepting connections: {err}"));
            }
        }
    }
    ProbeResult {
        reachable: false,
        error: last_error,
    }
}

/// Runs the port and endpoint checks with one shared HTTP client.
pub struct HealthChecker {
    client: Client,
    host: String,
    port_timeout: Duration,
    endpoint_timeout: Duration,
}

impl HealthChecker {
    pub fn new(cfg: &DiagnosticsConfig) -> Result<Self> {
        Self::with_timeouts(
            Duration::from_millis(cfg.port_timeout_ms),
            Duration::from_millis(cfg.endpoint_timeout_ms),
        )
    }

    pub fn with_timeouts(port_timeout: Duration, endpoint_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .no_proxy()
            .build()?;
        Ok(Self {
            client,
            host: "localhost".to_string(),
            port_timeout,
            endpoint_timeout,
        })
    }

    /// Host used when a target is given by port alone.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn probe_endpoint(
        &self,
        url: &str,
        timeout: Duration,
        expected_status: u16,
        headers: Option<&[(&str, &str)]>,
    ) -> EndpointResult {
        let mut request = self.client.get(url).timeout(timeout);
        for (name, value) in headers.unwrap_or_default() {
            request = request.header(*name, *value);
        }

        match request.send() {
            Ok(response) => {
                let status = response.status().as_u16();
                let error = if status == expected_status {
                    None
                } else if status == 406 {
                    Some(
                        "HTTP 406 - server requires specific headers (e.g. Accept: text/event-stream)"
                            .to_string(),
                    )
                } else {
                    Some(format!("HTTP {status} (expected {expected_status})"))
                };
                EndpointResult {
                    url: url.to_string(),
                    ok: error.is_none(),
                    error,
                    status_code: Some(status),
                }
            }
            Err(err) => EndpointResult {
                url: url.to_string(),
                ok: false,
                error: Some(classify_request_error(url, &err)),
                status_code: None,
            },
        }
    }

    pub fn diagnose_target(&self, port: u16, base_url: Option<&str>) -> HealthRecord {
        let (base_url, host) = self.resolve_target(port, base_url);
        info!("diagnosing server at {base_url} (port {port})");

        let mut record = HealthRecord::new(base_url.clone(), port, host.clone());
        let probe = probe_port(&host, port, self.port_timeout);
        record.port_open = probe.reachable;
        record.port_error = probe.error;
        if !record.port_open {
            record.overall_status = OverallStatus::PortClosed;
            warn!(
                "port {port} is not open: {}",
                record.port_error.as_deref().unwrap_or("unknown cause")
            );
            return record;
        }

        let root = base_url.trim_end_matches('/');
        for (path, name) in ENDPOINT_CANDIDATES {
            let url = format!("{root}{path}");
            let result = self.probe_endpoint(&url, self.endpoint_timeout, 200, None);
            if result.ok {
                info!(
                    "endpoint {path} answered (status {})",
                    result.status_code.unwrap_or_default()
                );
                record.overall_status = OverallStatus::Healthy;
            } else {
                debug!(
                    "endpoint {path} did not answer: {}",
                    result.error.as_deref().unwrap_or_default()
                );
            }
            record.endpoints.insert(name.to_string(), result);
        }

        if record.overall_status == OverallStatus::Unknown {
            record.overall_status = OverallStatus::PortOpenButNoEndpoint;
            warn!("port {port} is open but no HTTP endpoint answered");
        }
        record
    }

    /// The tool server only answers its root path, and rejects plain GETs
    /// with 406, so any of 200/404/406 counts as alive.
    pub fn diagnose_tool_server(&self, port: u16, base_url: Option<&str>) -> HealthRecord {
        let (base_url, host) = self.resolve_target(port, base_url);
        info!("diagnosing tool server at {base_url} (port {port})");

        let mut record = HealthRecord::new(base_url.clone(), port, host.clone());
        record.note = Some(TOOL_SERVER_NOTE.to_string());
        let probe = probe_port(&host, port, self.port_timeout);
        record.port_open = probe.reachable;
        record.port_error = probe.error;
        if !record.port_open {
            record.overall_status = OverallStatus::PortClosed;
            warn!(
                "tool server port {port} is not open: {}",
                record.port_error.as_deref().unwrap_or("unknown cause")
            );
            return record;
        }

        match self
            .client
            .get(&base_url)
            .timeout(self.endpoint_timeout)
            .send()
        {
            Ok(response) => {
                let status = response.status().as_u16();
                if matches!(status, 200 | 404 | 406) {
                    info!("tool server is answering (status {status})");
                    record.overall_status = OverallStatus::Healthy;
                } else {
                    warn!("tool server answered with unexpected status {status}");
                    record.overall_status = OverallStatus::PortOpenButUnexpectedResponse;
                }
            }
            Err(err) => {
                warn!("tool server port {port} is open but did not answer: {err}");
                record.overall_status = OverallStatus::PortOpenButNoResponse;
            }
        }
        record
    }

    pub fn diagnose_many(&self, targets: &[(String, u16)]) -> DiagnosticSummary {
        info!("starting diagnostic sweep over {} servers", targets.len());
        let mut servers = IndexMap::new();
        let mut summary = StatusTally {
            total: targets.len(),
            ..StatusTally::default()
        };
        for (name, port) in targets {
            let record = self.diagnose_target(*port, None);
            summary.count(record.overall_status);
            servers.insert(name.clone(), record);
        }

        info!(
            healthy = summary.healthy,
            port_closed = summary.port_closed,
            port_open_but_no_endpoint = summary.port_open_but_no_endpoint,
            unknown = summary.unknown,
            "diagnostic sweep finished"
        );
        DiagnosticSummary {
            generated_at: Utc::now(),
            servers,
            summary,
        }
    }

    fn resolve_target(&self, port: u16, base_url: Option<&str>) -> (String, String) {
        let base_url = base_url
            .map(ToString::to_string)
            .unwrap_or_else(|| format!("http://{}:{port}", self.host));
        let host = Url::parse(&base_url)
            .ok()
            .and_then(|url| url.host_str().map(|h| h.trim_matches(['[', ']']).to_string()))
            .unwrap_or_else(|| "localhost".to_string());
        (base_url, host)
    }
}

fn classify_request_error(url: &str, err: &reqwest::Error) -> String {
    let detail = match err.source() {
        Some(source) => format!("{err}: {source}"),
        None => err.to_string(),
    };
    if err.is_timeout() {
        format!("Timed out connecting to {url}")
    } else if err.is_connect() {
        format!("Connection error: {detail}")
    } else {
        format!("Request error: {detail}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devmentor_testkit::{MockHttpServer, MockResponse, closed_port};

    fn checker() -> HealthChecker {
        HealthChecker::with_timeouts(Duration::from_millis(500), Duration::from_millis(500))
            .expect("checker")
            .with_host("127.0.0.1")
    }

    #[test]
    fn probe_port_reports_open_and_closed_ports() {
        let server = MockHttpServer::with_routes(&[]);
        let open = probe_port("127.0.0.1", server.port(), Duration::from_millis(500));
        assert!(open.reachable);
        assert_eq!(open.error, None);

        let closed = probe_port("127.0.0.1", closed_port(), Duration::from_millis(500));
        assert!(!closed.reachable);
        assert!(
            closed
                .error
                .as_deref()
                .is_some_and(|e| e.contains("not accepting connections")),
            "{closed:?}"
        );
    }

    #[test]
    fn probe_port_distinguishes_dns_failure() {
        let result = probe_port("devmentor-host.invalid", 80, Duration::from_millis(500));
        assert!(!result.reachable);
        assert!(
            result
                .error
                .as_deref()
                .is_some_and(|e| e.starts_with("DNS resolution failed")),
            "{result:?}"
        );
    }

    #[test]
    fn closed_port_skips_endpoint_probes() {
        let port = closed_port();
        let record = checker().diagnose_target(port, None);
        assert_eq!(record.overall_status, OverallStatus::PortClosed);
        assert!(!record.port_open);
        assert!(record.port_error.is_some());
        assert!(record.endpoints.is_empty());
        assert_eq!(record.url, format!("http://127.0.0.1:{port}"));
    }

    #[test]
    fn default_base_url_uses_localhost() {
        let checker = HealthChecker::with_timeouts(
            Duration::from_millis(300),
            Duration::from_millis(300),
        )
        .expect("checker");
        let port = closed_port();
        let record = checker.diagnose_target(port, None);
        assert_eq!(record.host, "localhost");
        assert_eq!(record.url, format!("http://localhost:{port}"));
    }

    #[test]
    fn single_healthy_path_marks_target_healthy_and_all_paths_are_probed() {
        let server = MockHttpServer::start(|request| {
            if request.path == "/health" {
                MockResponse::status(200)
            } else {
                MockResponse::status(500)
            }
        });
        let record = checker().diagnose_target(server.port(), Some(&server.url()));
        assert_eq!(record.overall_status, OverallStatus::Healthy);
        assert_eq!(
            record.endpoints.keys().collect::<Vec<_>>(),
            vec!["root", "health", "api_health", "v1_health"]
        );
        assert!(record.endpoints["health"].ok);
        assert!(!record.endpoints["v1_health"].ok);
        let paths = server
            .requests()
            .into_iter()
            .map(|r| r.path)
            .collect::<Vec<_>>();
        assert_eq!(paths, vec!["/", "/health", "/api/health", "/v1/health"]);
    }

    #[test]
    fn open_port_without_any_ok_path_is_no_endpoint() {
        let server = MockHttpServer::start(|_| MockResponse::status(503));
        let record = checker().diagnose_target(server.port(), Some(&server.url()));
        assert!(record.port_open);
        assert_eq!(record.overall_status, OverallStatus::PortOpenButNoEndpoint);
        assert_eq!(record.endpoints.len(), 4);
        assert!(record.endpoints.values().all(|e| e.status_code == Some(503)));
    }

    #[test]
    fn http_406_has_a_distinct_error() {
        let server = MockHttpServer::with_routes(&[("/", 406), ("/other", 500)]);
        let checker = checker();
        let timeout = Duration::from_millis(500);
        let not_acceptable = checker.probe_endpoint(&server.url(), timeout, 200, None);
        let failing = checker.probe_endpoint(&format!("{}/other", server.url()), timeout, 200, None);

        assert!(!not_acceptable.ok);
        assert_eq!(not_acceptable.status_code, Some(406));
        let message = not_acceptable.error.expect("406 error");
        assert!(message.contains("requires specific headers"), "{message}");

        assert_eq!(failing.error.as_deref(), Some("HTTP 500 (expected 200)"));
        assert_ne!(Some(message), failing.error);
    }

    #[test]
    fn expected_status_can_be_overridden() {
        let server = MockHttpServer::with_routes(&[]);
        let result =
            checker().probe_endpoint(&server.url(), Duration::from_millis(500), 404, None);
        assert!(result.ok);
        assert_eq!(result.status_code, Some(404));
    }

    #[test]
    fn redirects_are_not_followed() {
        let server = MockHttpServer::with_routes(&[("/", 301)]);
        let result =
            checker().probe_endpoint(&server.url(), Duration::from_millis(500), 200, None);
        assert_eq!(result.status_code, Some(301));
        assert_eq!(server.requests().len(), 1);
    }

    #[test]
    fn extra_headers_are_sent() {
        let server = MockHttpServer::with_routes(&[("/", 200)]);
        let result = checker().probe_endpoint(
            &server.url(),
            Duration::from_millis(500),
            200,
            Some(&[("Accept", "text/event-stream")]),
        );
        assert!(result.ok);
        assert_eq!(
            server.requests()[0].header("accept"),
            Some("text/event-stream")
        );
    }

    #[test]
    fn transport_failures_have_no_status_code() {
        let checker = checker();
        let refused = checker.probe_endpoint(
            &format!("http://127.0.0.1:{}/", closed_port()),
            Duration::from_millis(500),
            200,
            None,
        );
        assert_eq!(refused.status_code, None);
        assert!(
            refused
                .error
                .as_deref()
                .is_some_and(|e| e.starts_with("Connection error")),
            "{refused:?}"
        );

        let server = MockHttpServer::start(|_| {
            MockResponse::status(200).delayed(Duration::from_millis(800))
        });
        let slow = checker.probe_endpoint(&server.url(), Duration::from_millis(150), 200, None);
        assert_eq!(slow.status_code, None);
        assert!(
            slow.error
                .as_deref()
                .is_some_and(|e| e.starts_with("Timed out")),
            "{slow:?}"
        );
    }

    #[test]
    fn tool_server_accepts_406_and_404() {
        let checker = checker();
        for status in [200, 404, 406] {
            let server = MockHttpServer::with_routes(&[("/", status)]);
            let record = checker.diagnose_tool_server(server.port(), Some(&server.url()));
            assert_eq!(record.overall_status, OverallStatus::Healthy, "status {status}");
            assert!(record.endpoints.is_empty());
            assert_eq!(record.note.as_deref(), Some(TOOL_SERVER_NOTE));
            assert_eq!(server.requests().len(), 1);
        }
    }

    #[test]
    fn tool_server_unexpected_and_silent_responses() {
        let checker = checker();
        let broken = MockHttpServer::with_routes(&[("/", 500)]);
        let record = checker.diagnose_tool_server(broken.port(), Some(&broken.url()));
        assert_eq!(
            record.overall_status,
            OverallStatus::PortOpenButUnexpectedResponse
        );

        let silent = MockHttpServer::start(|_| {
            MockResponse::status(200).delayed(Duration::from_millis(1_200))
        });
        let record = checker.diagnose_tool_server(silent.port(), Some(&silent.url()));
        assert_eq!(record.overall_status, OverallStatus::PortOpenButNoResponse);

        let record = checker.diagnose_tool_server(closed_port(), None);
        assert_eq!(record.overall_status, OverallStatus::PortClosed);
    }

    #[test]
    fn diagnose_many_tallies_each_bucket() {
        let healthy = MockHttpServer::with_routes(&[("/", 200)]);
        let degraded = MockHttpServer::start(|_| MockResponse::status(500));
        let targets = vec![
            ("Algo Interviewer".to_string(), healthy.port()),
            ("Concept Tutor".to_string(), degraded.port()),
            ("Coordinator".to_string(), closed_port()),
        ];
        let summary = checker().diagnose_many(&targets);
        assert_eq!(
            summary.summary,
            StatusTally {
                total: 3,
                healthy: 1,
                port_closed: 1,
                port_open_but_no_endpoint: 1,
                unknown: 0,
            }
        );
        assert_eq!(
            summary.servers.keys().collect::<Vec<_>>(),
            vec!["Algo Interviewer", "Concept Tutor", "Coordinator"]
        );
        assert!(!summary.all_healthy());
    }

    #[test]
    fn tool_server_outcomes_count_as_unknown() {
        let mut tally = StatusTally::default();
        tally.count(OverallStatus::PortOpenButNoResponse);
        tally.count(OverallStatus::PortOpenButUnexpectedResponse);
        assert_eq!(tally.unknown, 2);
    }

    #[test]
    fn records_serialize_with_snake_case_status() {
        let record = checker().diagnose_target(closed_port(), None);
        let value = serde_json::to_value(&record).expect("json");
        assert_eq!(value["overall_status"], "port_closed");
        assert!(value.get("note").is_none());
    }
}

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Error, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use log::debug;
use reqwest::blocking::Client as HttpClient;
use serde::Deserialize;
use serde_json::Value;

use crate::heartbeat::Heartbeat;

pub const DEFAULT_API_URL: &str = "https://api.kadence.dev/api/v1";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

const HEARTBEATS_ENDPOINT: &str = "/users/current/heartbeats.bulk";

/// One heartbeat the collector refused, by position in the sent batch.
#[derive(Debug, Clone)]
pub struct Rejection {
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct SendResult {
    pub rejected: Vec<Rejection>,
}

/// Transport failures (unreachable collector, timeout, 5xx) are retried
/// via the offline queue on later invocations; API failures (other 4xx)
/// need operator action and are surfaced as errors.
#[derive(Debug)]
pub enum SendError {
    Transport(Error),
    Api(Error),
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::Transport(err) => write!(f, "transport failure: {err}"),
            SendError::Api(err) => write!(f, "api failure: {err}"),
        }
    }
}

impl std::error::Error for SendError {}

/// The capability the pipeline's terminal stage needs from a transport.
pub trait Sender {
    fn send(&self, batch: &[Heartbeat]) -> Result<SendResult, SendError>;
}

#[derive(Debug, Clone)]
pub struct Options {
    pub api_key: String,
    pub hostname: Option<String>,
    pub plugin: Option<String>,
    pub timeout: Duration,
    pub ssl_cert_path: Option<PathBuf>,
}

/// Collector client. Fully configured at construction; the pipeline only
/// ever sees it through the `Sender` trait.
pub struct Client {
    http: HttpClient,
    url: String,
    auth_header: String,
    hostname: Option<String>,
    user_agent: String,
}

impl Client {
    pub fn new(base_url: &str, options: Options) -> Result<Self> {
        let mut builder = HttpClient::builder().timeout(options.timeout);

        if let Some(cert_path) = &options.ssl_cert_path {
            let pem = std::fs::read(cert_path).with_context(|| {
                format!("failed to read CA certificate {}", cert_path.display())
            })?;
            let cert = reqwest::Certificate::from_pem(&pem).with_context(|| {
                format!("invalid CA certificate {}", cert_path.display())
            })?;
            builder = builder.add_root_certificate(cert);
        }

        let http = builder.build().context("failed to build http client")?;

        Ok(Self {
            http,
            url: format!(
                "{}{}",
                base_url.trim_end_matches('/'),
                HEARTBEATS_ENDPOINT
            ),
            auth_header: format!("Basic {}", BASE64.encode(&options.api_key)),
            hostname: options.hostname,
            user_agent: user_agent(options.plugin.as_deref()),
        })
    }
}

/// `kadence/<version> (<os>-<arch>)`, with the editor plugin identifier
/// appended when one announced itself.
pub fn user_agent(plugin: Option<&str>) -> String {
    let base = format!(
        "kadence/{} ({}-{})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    );
    match plugin {
        Some(plugin) => format!("{base} {plugin}"),
        None => base,
    }
}

/// Bulk endpoint body: one `[record, status]` pair per sent heartbeat.
#[derive(Debug, Deserialize)]
struct BulkResponse {
    responses: Vec<(Value, u16)>,
}

fn item_accepted(status: u16) -> bool {
    // 409 means the collector already has this heartbeat; counting it as
    // accepted is what bounds the duplicate-delivery window.
    status < 300 || status == 409
}

fn rejection_reason(value: &Value, status: u16) -> String {
    value
        .get("error")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("status {status}"))
}

impl Sender for Client {
    fn send(&self, batch: &[Heartbeat]) -> Result<SendResult, SendError> {
        let mut request = self
            .http
            .post(&self.url)
            .header(reqwest::header::AUTHORIZATION, self.auth_header.as_str())
            .header(reqwest::header::USER_AGENT, self.user_agent.as_str())
            .json(batch);

        if let Some(hostname) = &self.hostname {
            request = request.header("X-Machine-Name", hostname.as_str());
        }

        let response = request.send().map_err(|err| {
            SendError::Transport(Error::new(err).context("heartbeat request failed"))
        })?;

        let status = response.status();
        if status.is_server_error() {
            return Err(SendError::Transport(anyhow!(
                "collector returned {status}"
            )));
        }
        if !status.is_success() {
            return Err(SendError::Api(anyhow!("collector returned {status}")));
        }

        // A success status with an unparseable body still means the batch
        // was accepted wholesale.
        let body: BulkResponse = match response.json() {
            Ok(body) => body,
            Err(err) => {
                debug!("could not parse bulk response body: {err}");
                return Ok(SendResult::default());
            }
        };

        let rejected = body
            .responses
            .iter()
            .enumerate()
            .filter(|(_, (_, item_status))| !item_accepted(*item_status))
            .map(|(index, (value, item_status))| Rejection {
                index,
                reason: rejection_reason(value, *item_status),
            })
            .collect();

        Ok(SendResult { rejected })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heartbeat::test_heartbeat;

    fn options() -> Options {
        Options {
            api_key: "secret-key".to_string(),
            hostname: Some("build-box".to_string()),
            plugin: Some("vim/9.1 vim-kadence/1.0".to_string()),
            timeout: Duration::from_secs(5),
            ssl_cert_path: None,
        }
    }

    #[test]
    fn full_acceptance_yields_no_rejections() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/users/current/heartbeats.bulk")
            .match_header("authorization", mockito::Matcher::Regex("^Basic ".into()))
            .match_header("x-machine-name", "build-box")
            .with_status(201)
            .with_body(r#"{"responses":[[{"data":{}},201],[{"data":{}},201]]}"#)
            .create();

        let client = Client::new(&server.url(), options()).unwrap();
        let result = client
            .send(&[test_heartbeat("/a.swift"), test_heartbeat("/b.swift")])
            .unwrap();

        assert!(result.rejected.is_empty());
        mock.assert();
    }

    #[test]
    fn per_record_rejections_carry_index_and_reason() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/users/current/heartbeats.bulk")
            .with_status(201)
            .with_body(
                r#"{"responses":[[{"data":{}},201],[{"error":"invalid entity"},400],[{"data":{}},201]]}"#,
            )
            .create();

        let client = Client::new(&server.url(), options()).unwrap();
        let result = client
            .send(&[
                test_heartbeat("/a.swift"),
                test_heartbeat("/bad.swift"),
                test_heartbeat("/c.swift"),
            ])
            .unwrap();

        assert_eq!(result.rejected.len(), 1);
        assert_eq!(result.rejected[0].index, 1);
        assert_eq!(result.rejected[0].reason, "invalid entity");
    }

    #[test]
    fn duplicate_conflict_counts_as_accepted() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/users/current/heartbeats.bulk")
            .with_status(201)
            .with_body(r#"{"responses":[[{"data":{}},409]]}"#)
            .create();

        let client = Client::new(&server.url(), options()).unwrap();
        let result = client.send(&[test_heartbeat("/a.swift")]).unwrap();
        assert!(result.rejected.is_empty());
    }

    #[test]
    fn server_error_is_a_transport_failure() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/users/current/heartbeats.bulk")
            .with_status(502)
            .create();

        let client = Client::new(&server.url(), options()).unwrap();
        match client.send(&[test_heartbeat("/a.swift")]) {
            Err(SendError::Transport(_)) => {}
            other => panic!("expected transport failure, got {other:?}"),
        }
    }

    #[test]
    fn auth_error_is_an_api_failure() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/users/current/heartbeats.bulk")
            .with_status(401)
            .create();

        let client = Client::new(&server.url(), options()).unwrap();
        match client.send(&[test_heartbeat("/a.swift")]) {
            Err(SendError::Api(_)) => {}
            other => panic!("expected api failure, got {other:?}"),
        }
    }

    #[test]
    fn user_agent_includes_plugin_when_present() {
        let ua = user_agent(Some("emacs/30 kadence-mode/2.1"));
        assert!(ua.starts_with("kadence/"));
        assert!(ua.ends_with("emacs/30 kadence-mode/2.1"));

        let bare = user_agent(None);
        assert!(!bare.contains("emacs"));
    }
}

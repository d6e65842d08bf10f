use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

use crate::config::{InvalidCertPolicy, ScanConfig};
use crate::detect::{self, PatternRule};
use crate::tls;
use crate::types::{HostTarget, ProbeStatus};

// Browser-like UA: some placeholder pages vary their response for obvious bots.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

/// Everything the HTTP probe stage learns about one host.
#[derive(Debug, Clone)]
pub struct HttpReport {
    pub http_status: ProbeStatus,
    pub https_status: ProbeStatus,
    pub tls_valid: Option<bool>,
    pub tls_reason: Option<String>,
    pub http_default_page: bool,
    pub https_default_page: bool,
}

/// Black-box HTTP probing capability consumed by the job controller.
/// Failures are data (`Unreachable` sentinel), never errors: a probe always
/// produces a report.
#[async_trait]
pub trait HttpProber: Send + Sync {
    async fn probe(&self, target: &HostTarget) -> HttpReport;
}

/// Default prober: one plain-HTTP and one HTTPS GET per host, issued
/// concurrently, plus a TLS certificate inspection on port 443. Redirects are
/// not followed so 3xx codes are recorded as-is.
pub struct WebProber {
    client: reqwest::Client,
    patterns: Vec<PatternRule>,
    probe_timeout: Duration,
    invalid_cert_policy: InvalidCertPolicy,
}

impl WebProber {
    pub fn new(cfg: &ScanConfig) -> Result<Self> {
        // Certificate validity is judged by the dedicated TLS inspection, so
        // the status fetch accepts invalid chains; otherwise a bad certificate
        // would hide a perfectly observable status code.
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::none())
            .timeout(cfg.probe_timeout)
            .danger_accept_invalid_certs(true)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            patterns: cfg.patterns.clone(),
            probe_timeout: cfg.probe_timeout,
            invalid_cert_policy: cfg.invalid_cert_policy,
        })
    }

    /// Fetch one URL; returns the recorded status and whether a 200 body
    /// matched a default-page rule. Detection only runs on 200 responses,
    /// matching how placeholder pages are actually served.
    async fn fetch(&self, url: &str) -> (ProbeStatus, bool) {
        match self.client.get(url).send().await {
            Ok(resp) => {
                let code = resp.status().as_u16();
                let default_page = if code == 200 {
                    match resp.bytes().await {
                        Ok(body) => detect::is_default_page(&body, &self.patterns),
                        Err(_) => false,
                    }
                } else {
                    false
                };
                (ProbeStatus::Status(code), default_page)
            }
            Err(e) => {
                debug!(url, error = %e, "probe unreachable");
                (ProbeStatus::Unreachable, false)
            }
        }
    }
}

#[async_trait]
impl HttpProber for WebProber {
    async fn probe(&self, target: &HostTarget) -> HttpReport {
        let http_url = format!("http://{}", target.domain);
        let https_url = format!("https://{}", target.domain);

        let ((http_status, http_default_page), (https_status, https_default), tls_report) = tokio::join!(
            self.fetch(&http_url),
            self.fetch(&https_url),
            tls::inspect(target, self.probe_timeout),
        );

        let tls_valid = tls_report.as_ref().map(|r| r.valid);
        let tls_reason = tls_report.and_then(|r| r.reason);

        let (https_status, https_default_page) =
            apply_cert_policy(https_status, https_default, tls_valid, self.invalid_cert_policy);

        debug!(
            domain = %target.domain,
            http = %http_status.render(),
            https = %https_status.render(),
            ?tls_valid,
            "http probe finished"
        );

        HttpReport {
            http_status,
            https_status,
            tls_valid,
            tls_reason,
            http_default_page,
            https_default_page,
        }
    }
}

/// Apply the invalid-certificate policy to the HTTPS outcome. Under the
/// default `RecordStatus` policy the status passes through untouched; under
/// `TreatUnreachable`, an invalid certificate makes the whole HTTPS probe
/// count as unreachable.
fn apply_cert_policy(
    status: ProbeStatus,
    default_page: bool,
    tls_valid: Option<bool>,
    policy: InvalidCertPolicy,
) -> (ProbeStatus, bool) {
    if tls_valid == Some(false) && policy == InvalidCertPolicy::TreatUnreachable {
        (ProbeStatus::Unreachable, false)
    } else {
        (status, default_page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn invalid_cert_keeps_status_under_default_policy() {
        let (status, default_page) = apply_cert_policy(
            ProbeStatus::Status(200),
            true,
            Some(false),
            InvalidCertPolicy::RecordStatus,
        );
        assert_eq!(status, ProbeStatus::Status(200));
        assert!(default_page);
    }

    #[test]
    fn invalid_cert_is_unreachable_under_strict_policy() {
        let (status, default_page) = apply_cert_policy(
            ProbeStatus::Status(200),
            true,
            Some(false),
            InvalidCertPolicy::TreatUnreachable,
        );
        assert_eq!(status, ProbeStatus::Unreachable);
        assert!(!default_page);
    }

    #[test]
    fn valid_or_unknown_cert_passes_through_under_strict_policy() {
        let (status, _) = apply_cert_policy(
            ProbeStatus::Status(301),
            false,
            Some(true),
            InvalidCertPolicy::TreatUnreachable,
        );
        assert_eq!(status, ProbeStatus::Status(301));

        // No TLS handshake at all: validity is unknown, nothing to enforce.
        let (status, _) = apply_cert_policy(
            ProbeStatus::Unreachable,
            false,
            None,
            InvalidCertPolicy::TreatUnreachable,
        );
        assert_eq!(status, ProbeStatus::Unreachable);
    }

    async fn serve_once(body: &'static str, status_line: &'static str) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            if let Ok((mut sock, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = sock.read(&mut buf).await;
                let resp = format!(
                    "{status_line}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = sock.write_all(resp.as_bytes()).await;
            }
        });
        port
    }

    #[tokio::test]
    async fn fetch_records_status_and_default_page() {
        let port = serve_once(
            "<html><head><title>Welcome to nginx!</title></head></html>",
            "HTTP/1.1 200 OK",
        )
        .await;
        let prober = WebProber::new(&ScanConfig::default()).unwrap();
        let (status, default_page) = prober.fetch(&format!("http://127.0.0.1:{port}")).await;
        assert_eq!(status, ProbeStatus::Status(200));
        assert!(default_page);
    }

    #[tokio::test]
    async fn fetch_does_not_follow_redirects() {
        let port = serve_once("", "HTTP/1.1 301 Moved Permanently\r\nLocation: http://example.invalid/").await;
        let prober = WebProber::new(&ScanConfig::default()).unwrap();
        let (status, default_page) = prober.fetch(&format!("http://127.0.0.1:{port}")).await;
        assert_eq!(status, ProbeStatus::Status(301));
        assert!(!default_page);
    }

    #[tokio::test]
    async fn fetch_marks_refused_connection_unreachable() {
        let mut cfg = ScanConfig::default();
        cfg.probe_timeout = Duration::from_millis(300);
        let prober = WebProber::new(&cfg).unwrap();
        // Bind then drop to get a port nothing listens on.
        let port = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let (status, default_page) = prober.fetch(&format!("http://127.0.0.1:{port}")).await;
        assert_eq!(status, ProbeStatus::Unreachable);
        assert!(!default_page);
    }
}

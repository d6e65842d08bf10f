use std::time::Duration;

use ::time::format_description::well_known::Rfc3339;
use ::time::OffsetDateTime;
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::time;
use tracing::{debug, warn};
use x509_parser::prelude::*;

use crate::types::HostTarget;

/// Result of inspecting the certificate presented on port 443.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TlsReport {
    /// Whether the chain validated against the host's name.
    pub valid: bool,
    /// Normalized failure reason when `valid` is false.
    pub reason: Option<String>,
    pub issuer: Option<String>,
    pub not_after: Option<String>,
    pub days_until_expiry: Option<i64>,
}

/// Inspect the TLS endpoint of a host. `None` means HTTPS is not reachable at
/// the TLS layer (no TCP connect, or the endpoint does not speak TLS at all),
/// in which case certificate validity is unknowable and stays unset.
///
/// A certificate that fails validation is surfaced rather than hidden: a
/// second, non-validating handshake recovers the certificate details so the
/// report still carries issuer and expiry.
pub async fn inspect(target: &HostTarget, timeout: Duration) -> Option<TlsReport> {
    let stream = connect_443(target, timeout).await?;

    let connector = match native_tls::TlsConnector::new() {
        Ok(c) => tokio_native_tls::TlsConnector::from(c),
        Err(e) => {
            warn!(error = %e, "failed to build validating TLS connector");
            return None;
        }
    };

    match time::timeout(timeout, connector.connect(&target.domain, stream)).await {
        Ok(Ok(tls)) => {
            let (issuer, not_after, days) = peer_cert_details(tls.get_ref().peer_certificate());
            Some(TlsReport {
                valid: true,
                reason: None,
                issuer,
                not_after,
                days_until_expiry: days,
            })
        }
        Ok(Err(e)) => {
            let reason = classify_tls_error(&e.to_string());
            debug!(domain = %target.domain, %reason, "TLS validation failed, retrying permissively");
            inspect_permissive(target, timeout, reason).await
        }
        // Handshake hung: the port is open but not usably TLS.
        Err(_) => None,
    }
}

/// Re-handshake without validation to recover certificate details for an
/// invalid chain. If even the permissive handshake fails, the endpoint does
/// not present a usable certificate and the probe counts as unreachable.
async fn inspect_permissive(
    target: &HostTarget,
    timeout: Duration,
    reason: String,
) -> Option<TlsReport> {
    let stream = connect_443(target, timeout).await?;

    let connector = native_tls::TlsConnector::builder()
        .danger_accept_invalid_certs(true)
        .danger_accept_invalid_hostnames(true)
        .build()
        .ok()
        .map(tokio_native_tls::TlsConnector::from)?;

    match time::timeout(timeout, connector.connect(&target.domain, stream)).await {
        Ok(Ok(tls)) => {
            let (issuer, not_after, days) = peer_cert_details(tls.get_ref().peer_certificate());
            Some(TlsReport {
                valid: false,
                reason: Some(reason),
                issuer,
                not_after,
                days_until_expiry: days,
            })
        }
        _ => None,
    }
}

async fn connect_443(target: &HostTarget, timeout: Duration) -> Option<TcpStream> {
    let addr = format!("{}:443", target.ip);
    match time::timeout(timeout, TcpStream::connect(&addr)).await {
        Ok(Ok(s)) => Some(s),
        _ => None,
    }
}

fn peer_cert_details(
    cert: Result<Option<native_tls::Certificate>, native_tls::Error>,
) -> (Option<String>, Option<String>, Option<i64>) {
    let Ok(Some(cert)) = cert else {
        return (None, None, None);
    };
    let Ok(der) = cert.to_der() else {
        return (None, None, None);
    };
    let Ok((_, x509)) = parse_x509_certificate(&der) else {
        return (None, None, None);
    };

    let issuer = Some(x509.issuer().to_string());
    let not_after_ts = x509.validity().not_after.timestamp();
    let not_after = OffsetDateTime::from_unix_timestamp(not_after_ts)
        .ok()
        .and_then(|t| t.format(&Rfc3339).ok());
    let days = (not_after_ts - OffsetDateTime::now_utc().unix_timestamp()) / 86_400;
    (issuer, not_after, Some(days))
}

/// Map platform-specific TLS error text onto a small stable vocabulary.
/// Unrecognized messages pass through unchanged.
pub fn classify_tls_error(msg: &str) -> String {
    let lower = msg.to_lowercase();
    if lower.contains("expired") {
        return "expired certificate".to_string();
    }
    if lower.contains("self signed") || lower.contains("self-signed") {
        return "self-signed certificate".to_string();
    }
    if lower.contains("hostname") || lower.contains("name mismatch") || lower.contains("doesn't match") {
        return "hostname mismatch".to_string();
    }
    if lower.contains("key too weak") {
        return "invalid certificate".to_string();
    }
    if lower.contains("unable to get local issuer") || lower.contains("unknown issuer") {
        return "untrusted issuer".to_string();
    }
    msg.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_common_failures() {
        assert_eq!(
            classify_tls_error("certificate has expired"),
            "expired certificate"
        );
        assert_eq!(
            classify_tls_error("self signed certificate in chain"),
            "self-signed certificate"
        );
        assert_eq!(
            classify_tls_error("Hostname mismatch for peer"),
            "hostname mismatch"
        );
        assert_eq!(classify_tls_error("DH key too weak"), "invalid certificate");
    }

    #[test]
    fn unknown_messages_pass_through() {
        assert_eq!(classify_tls_error("weird failure"), "weird failure");
    }

    #[tokio::test]
    async fn unreachable_endpoint_yields_none() {
        // TEST-NET-1 address, nothing listens there; short timeout keeps this fast.
        let target = HostTarget {
            domain: "unreachable.example".into(),
            ip: "192.0.2.1".into(),
        };
        let report = inspect(&target, Duration::from_millis(200)).await;
        assert!(report.is_none());
    }
}

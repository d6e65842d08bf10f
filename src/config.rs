use std::time::Duration;

use crate::detect::{self, PatternRule};

/// What to do with the HTTPS status when the certificate fails validation.
///
/// The default surfaces a present-but-invalid certificate: the status code is
/// still recorded and `tls_valid` is set to false. `TreatUnreachable` instead
/// marks the whole HTTPS probe as unreachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InvalidCertPolicy {
    #[default]
    RecordStatus,
    TreatUnreachable,
}

/// Tunables for a scan batch. Pool sizes are process-wide: they bound
/// concurrency across all jobs sharing a registry, not per job.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Max concurrent port scans across the whole stage.
    pub scan_workers: usize,
    /// Max concurrent HTTP/HTTPS probes across the whole stage.
    pub http_workers: usize,
    /// Per-port TCP connect timeout for the built-in connect scanner.
    pub connect_timeout: Duration,
    /// Per-request timeout for HTTP/HTTPS probes and TLS inspection.
    pub probe_timeout: Duration,
    /// TCP ports enumerated by the port scan stage.
    pub scan_ports: Vec<u16>,
    /// Ordered default-page rules, matched case-insensitively.
    pub patterns: Vec<PatternRule>,
    pub invalid_cert_policy: InvalidCertPolicy,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            scan_workers: 10,
            http_workers: 20,
            connect_timeout: Duration::from_millis(1_000),
            probe_timeout: Duration::from_secs(10),
            scan_ports: default_scan_ports(),
            patterns: detect::default_patterns(),
            invalid_cert_policy: InvalidCertPolicy::default(),
        }
    }
}

/// Default TCP port set probed per host: the usual service ports plus a few
/// common alternate HTTP ports.
pub fn default_scan_ports() -> Vec<u16> {
    const DEFAULT: &[u16] = &[
        21, 22, 23, 25, 53, 80, 81, 82, 110, 111, 135, 139, 143, 443, 445, 993, 995, 1723, 3306,
        3389, 5900, 8080, 8081,
    ];
    DEFAULT.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_pool_sizes() {
        let cfg = ScanConfig::default();
        assert_eq!(cfg.scan_workers, 10);
        assert_eq!(cfg.http_workers, 20);
        assert_eq!(cfg.invalid_cert_policy, InvalidCertPolicy::RecordStatus);
        assert!(!cfg.patterns.is_empty());
    }

    #[test]
    fn default_ports_cover_web() {
        let ports = default_scan_ports();
        assert!(ports.contains(&80) && ports.contains(&443) && ports.contains(&8080));
    }
}

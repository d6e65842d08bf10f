use serde::{Deserialize, Serialize};

/// One (domain, IP) pair to audit.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostTarget {
    pub domain: String,
    pub ip: String,
}

impl HostTarget {
    /// Stable key used for the per-job record map.
    pub fn key(&self) -> String {
        format!("{}|{}", self.domain, self.ip)
    }
}

/// One open port discovered on a host.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PortEntry {
    pub port: u16,
    pub protocol: String,
    pub banner: Option<String>,
}

impl PortEntry {
    /// Human-readable label, e.g. "80 - http Apache/2.4.52".
    pub fn label(&self) -> String {
        match self.banner.as_deref() {
            Some(b) if !b.is_empty() => format!("{} - {} {}", self.port, self.protocol, b),
            _ => format!("{} - {}", self.port, self.protocol),
        }
    }
}

/// Outcome of a single HTTP or HTTPS request. `Unreachable` covers refusal,
/// timeout and connection errors; it is never conflated with a real status code.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "kind", content = "code", rename_all = "snake_case")]
pub enum ProbeStatus {
    Status(u16),
    Unreachable,
}

impl ProbeStatus {
    pub fn render(&self) -> String {
        match self {
            ProbeStatus::Status(code) => code.to_string(),
            ProbeStatus::Unreachable => "unreachable".to_string(),
        }
    }

    pub fn is_reachable(&self) -> bool {
        matches!(self, ProbeStatus::Status(_))
    }
}

/// Final per-host audit record. Assembled exactly once, after both the port
/// scan and the HTTP probes have returned, and never mutated afterwards.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HostRecord {
    pub domain: String,
    pub ip: String,
    /// Open ports, ascending. Empty if the scan found nothing or failed.
    pub ports: Vec<PortEntry>,
    pub http_status: ProbeStatus,
    pub https_status: ProbeStatus,
    /// Absent when HTTPS was not reachable at the TLS layer.
    pub tls_valid: Option<bool>,
    /// Normalized reason when the certificate failed validation.
    pub tls_reason: Option<String>,
    pub http_default_page: bool,
    pub https_default_page: bool,
    /// True if either the HTTP or the HTTPS body matched a placeholder rule.
    pub is_default_page: bool,
    /// Terminal failure reason for this host, if a stage failed unrecoverably.
    pub error: Option<String>,
    pub checked_at: String,
}

impl HostRecord {
    /// Joined rendering consumed by the export side, e.g. "80 - http, 443 - https".
    /// "null" when no open ports were found.
    pub fn ports_joined(&self) -> String {
        if self.ports.is_empty() {
            "null".to_string()
        } else {
            self.ports
                .iter()
                .map(|p| p.label())
                .collect::<Vec<_>>()
                .join(", ")
        }
    }
}

/// Lifecycle state of a batch. `Failed` only on batch-level setup failure
/// (empty input); per-host failures never fail the batch.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Running,
    Completed,
    Failed,
}

/// Immutable snapshot returned to pollers. Partial results are visible while
/// the batch is still running; a record only appears once fully assembled.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct JobSnapshot {
    pub job_id: String,
    pub total: usize,
    pub completed: usize,
    pub state: JobState,
    pub error: Option<String>,
    pub created_at: String,
    pub records: Vec<HostRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_label_with_and_without_banner() {
        let with = PortEntry {
            port: 80,
            protocol: "http".into(),
            banner: Some("Apache/2.4.52".into()),
        };
        let without = PortEntry {
            port: 443,
            protocol: "https".into(),
            banner: None,
        };
        assert_eq!(with.label(), "80 - http Apache/2.4.52");
        assert_eq!(without.label(), "443 - https");
    }

    #[test]
    fn ports_joined_renders_null_when_empty() {
        let rec = HostRecord {
            domain: "example.com".into(),
            ip: "192.0.2.1".into(),
            ports: Vec::new(),
            http_status: ProbeStatus::Unreachable,
            https_status: ProbeStatus::Unreachable,
            tls_valid: None,
            tls_reason: None,
            http_default_page: false,
            https_default_page: false,
            is_default_page: false,
            error: None,
            checked_at: String::new(),
        };
        assert_eq!(rec.ports_joined(), "null");
    }

    #[test]
    fn probe_status_render() {
        assert_eq!(ProbeStatus::Status(301).render(), "301");
        assert_eq!(ProbeStatus::Unreachable.render(), "unreachable");
        assert!(!ProbeStatus::Unreachable.is_reachable());
    }
}

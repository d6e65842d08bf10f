use std::fs;
use std::net::IpAddr;
use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::types::HostTarget;

/// Parse a host list into deduplicated (domain, IP) pairs.
///
/// Supported formats per line:
/// - comma separated: `example.com,192.0.2.1`
/// - whitespace separated: `example.com 192.0.2.1`
/// - comments: everything after `#` is ignored
/// - blank lines are ignored
pub fn parse_hosts_str(s: &str) -> Result<Vec<HostTarget>> {
    let mut out: Vec<HostTarget> = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for (idx, raw_line) in s.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.split('#').next().map(str::trim).unwrap_or("");
        if line.is_empty() {
            continue;
        }

        let (domain, ip) = split_host_line(line)
            .with_context(|| format!("line {line_no}: expected `domain,ip`, got: {line}"))?;

        if domain.is_empty() {
            bail!("line {line_no}: empty domain");
        }
        ip.parse::<IpAddr>()
            .with_context(|| format!("line {line_no}: invalid IP address: {ip}"))?;

        let target = HostTarget {
            domain: domain.to_string(),
            ip: ip.to_string(),
        };
        if seen.insert(target.clone()) {
            out.push(target);
        }
    }

    Ok(out)
}

fn split_host_line(line: &str) -> Result<(&str, &str)> {
    if let Some((d, i)) = line.split_once(',') {
        return Ok((d.trim(), i.trim()));
    }
    if let Some((d, i)) = line.split_once(char::is_whitespace) {
        return Ok((d.trim(), i.trim()));
    }
    bail!("missing separator")
}

/// Load a host list from a file path. Errors if the file cannot be read or parsed.
pub fn load_hosts_from_path(path: impl AsRef<Path>) -> Result<Vec<HostTarget>> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("failed to read hosts file: {}", path.as_ref().display()))?;
    parse_hosts_str(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_comma_and_whitespace_separated() {
        let input = "example.com,192.0.2.1\nwww.example.org   2001:db8::1\n";
        let hosts = parse_hosts_str(input).unwrap();
        assert_eq!(hosts.len(), 2);
        assert_eq!(hosts[0].domain, "example.com");
        assert_eq!(hosts[0].ip, "192.0.2.1");
        assert_eq!(hosts[1].ip, "2001:db8::1");
    }

    #[test]
    fn parse_with_comments_and_dedup() {
        let input = r#"
            # staging fleet
            a.example.com,192.0.2.10
            a.example.com,192.0.2.10   # duplicate
            b.example.com,192.0.2.11
        "#;
        let hosts = parse_hosts_str(input).unwrap();
        assert_eq!(hosts.len(), 2);
    }

    #[test]
    fn invalid_ip_rejected() {
        let input = "example.com,not-an-ip\n";
        assert!(parse_hosts_str(input).is_err());
    }

    #[test]
    fn missing_separator_rejected() {
        let input = "example.com\n";
        assert!(parse_hosts_str(input).is_err());
    }
}

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use domain_audit_rs::config::{InvalidCertPolicy, ScanConfig};
use domain_audit_rs::types::JobSnapshot;
use domain_audit_rs::{detect, hosts, jobs::JobRegistry, server};

/// domain-audit-rs — batch audit of (domain, IP) pairs: open ports, HTTP/HTTPS
/// status, TLS validity and default-page detection.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "domain-audit-rs",
    version,
    about = "Audit a batch of (domain, IP) pairs: ports, HTTP/HTTPS status, TLS validity, default pages.",
    long_about = None
)]
struct Cli {
    /// Path to hosts file (one `domain,ip` per line).
    #[arg(long)]
    input: Option<PathBuf>,

    /// Path to a default-page patterns file (one rule per line). Built-in list if omitted.
    #[arg(long)]
    patterns: Option<PathBuf>,

    /// Max concurrent port scans.
    #[arg(long = "scan-workers", default_value_t = 10)]
    scan_workers: usize,

    /// Max concurrent HTTP/HTTPS probe rounds.
    #[arg(long = "http-workers", default_value_t = 20)]
    http_workers: usize,

    /// Per-port TCP connect timeout in milliseconds.
    #[arg(long = "connect-timeout-ms", default_value_t = 1_000)]
    connect_timeout_ms: u64,

    /// Per-request HTTP/TLS timeout in milliseconds.
    #[arg(long = "timeout-ms", default_value_t = 10_000)]
    timeout_ms: u64,

    /// Treat an invalid certificate as HTTPS unreachable instead of recording the status.
    #[arg(long = "strict-tls", default_value_t = false)]
    strict_tls: bool,

    /// Write the final job snapshot as pretty JSON to this path.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Serve the scan API instead of running a one-shot batch.
    #[arg(long, default_value_t = false)]
    serve: bool,

    /// Bind address for the API server.
    #[arg(long, default_value = "127.0.0.1:8080")]
    bind: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let cfg = ScanConfig {
        scan_workers: cli.scan_workers,
        http_workers: cli.http_workers,
        connect_timeout: Duration::from_millis(cli.connect_timeout_ms),
        probe_timeout: Duration::from_millis(cli.timeout_ms),
        patterns: match &cli.patterns {
            Some(path) => detect::load_patterns_or_default(path),
            None => detect::default_patterns(),
        },
        invalid_cert_policy: if cli.strict_tls {
            InvalidCertPolicy::TreatUnreachable
        } else {
            InvalidCertPolicy::RecordStatus
        },
        ..ScanConfig::default()
    };

    let registry = Arc::new(JobRegistry::new(&cfg)?);

    if cli.serve {
        return server::spawn_server(&cli.bind, registry).await;
    }

    let Some(input) = cli.input.as_deref() else {
        bail!("either --input or --serve is required");
    };

    let targets = hosts::load_hosts_from_path(input)?;
    println!("Auditing {} hosts from {}", targets.len(), input.display());

    let job_id = registry.submit(targets).await;
    let snapshot = wait_for_completion(&registry, &job_id).await?;

    print_results_table(&snapshot);

    if let Some(path) = cli.output.as_deref() {
        write_snapshot_json(path, &snapshot)?;
        println!("Wrote JSON results to {}", path.display());
    }

    Ok(())
}

/// Poll the registry until the batch leaves `Running`, echoing progress as it
/// moves.
async fn wait_for_completion(registry: &JobRegistry, job_id: &str) -> Result<JobSnapshot> {
    use domain_audit_rs::types::JobState;

    let mut last_reported = 0usize;
    loop {
        let Some(snap) = registry.poll(job_id).await else {
            bail!("job {job_id} vanished from the registry");
        };
        if snap.completed != last_reported {
            println!("  progress: {}/{}", snap.completed, snap.total);
            last_reported = snap.completed;
        }
        match snap.state {
            JobState::Running => tokio::time::sleep(Duration::from_millis(300)).await,
            JobState::Completed => return Ok(snap),
            JobState::Failed => {
                bail!(
                    "batch failed: {}",
                    snap.error.unwrap_or_else(|| "unknown error".into())
                )
            }
        }
    }
}

fn print_results_table(snapshot: &JobSnapshot) {
    let mut domain_w = "domain".len();
    let mut ip_w = "ip".len();
    let mut ports_w = "ports".len();
    for r in &snapshot.records {
        domain_w = domain_w.max(r.domain.len());
        ip_w = ip_w.max(r.ip.len());
        ports_w = ports_w.max(r.ports_joined().len().min(60));
    }
    let http_w = "unreachable".len();

    println!(
        "\nCompleted {}/{} hosts",
        snapshot.completed, snapshot.total
    );
    println!(
        "{:<domain_w$}  {:<ip_w$}  {:>http_w$}  {:>http_w$}  {:<5}  {:<7}  {:<ports_w$}",
        "domain",
        "ip",
        "http",
        "https",
        "tls",
        "default",
        "ports",
        domain_w = domain_w,
        ip_w = ip_w,
        http_w = http_w,
        ports_w = ports_w
    );
    println!(
        "{:-<domain_w$}  {:-<ip_w$}  {:-<http_w$}  {:-<http_w$}  {:-<5}  {:-<7}  {:-<ports_w$}",
        "",
        "",
        "",
        "",
        "",
        "",
        "",
        domain_w = domain_w,
        ip_w = ip_w,
        http_w = http_w,
        ports_w = ports_w
    );
    for r in &snapshot.records {
        let tls = match r.tls_valid {
            Some(true) => "ok",
            Some(false) => "bad",
            None => "-",
        };
        let ports_full = r.ports_joined();
        let ports = clip(&ports_full, 60);
        println!(
            "{:<domain_w$}  {:<ip_w$}  {:>http_w$}  {:>http_w$}  {:<5}  {:<7}  {:<ports_w$}",
            r.domain,
            r.ip,
            r.http_status.render(),
            r.https_status.render(),
            tls,
            if r.is_default_page { "yes" } else { "no" },
            ports,
            domain_w = domain_w,
            ip_w = ip_w,
            http_w = http_w,
            ports_w = ports_w
        );
    }
}

/// Cut a display string to at most `max` bytes without splitting a character.
/// Banners pass through `from_utf8_lossy`, so labels can carry multi-byte
/// replacement characters and a blind byte truncate would panic.
fn clip(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn write_snapshot_json(path: &std::path::Path, snapshot: &JobSnapshot) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, snapshot)?;
    Ok(())
}

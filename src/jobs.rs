use std::collections::HashMap;
use std::sync::Arc;

use ::time::format_description::well_known::Rfc3339;
use ::time::OffsetDateTime;
use anyhow::Result;
use tokio::sync::{Mutex, RwLock, Semaphore};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::ScanConfig;
use crate::httpprobe::{HttpProber, HttpReport, WebProber};
use crate::portscan::{ConnectScanner, PortScanner};
use crate::types::{HostRecord, HostTarget, JobSnapshot, JobState, PortEntry};

/// Mutable state of one batch. Owned by the registry behind a mutex; only the
/// per-host completion path mutates it, pollers get cloned snapshots.
struct Job {
    job_id: String,
    total: usize,
    completed: usize,
    state: JobState,
    error: Option<String>,
    created_at: String,
    records: HashMap<String, HostRecord>,
}

impl Job {
    fn running(job_id: String, total: usize) -> Self {
        Self {
            job_id,
            total,
            completed: 0,
            state: JobState::Running,
            error: None,
            created_at: now_rfc3339(),
            records: HashMap::new(),
        }
    }

    fn failed(job_id: String, error: &str) -> Self {
        Self {
            job_id,
            total: 0,
            completed: 0,
            state: JobState::Failed,
            error: Some(error.to_string()),
            created_at: now_rfc3339(),
            records: HashMap::new(),
        }
    }

    fn snapshot(&self) -> JobSnapshot {
        let mut records: Vec<HostRecord> = self.records.values().cloned().collect();
        records.sort_by(|a, b| (&a.domain, &a.ip).cmp(&(&b.domain, &b.ip)));
        JobSnapshot {
            job_id: self.job_id.clone(),
            total: self.total,
            completed: self.completed,
            state: self.state,
            error: self.error.clone(),
            created_at: self.created_at.clone(),
            records,
        }
    }
}

/// Process-wide store of batches plus the two stage pools.
///
/// The pools bound concurrency across every job sharing this registry: at most
/// `scan_workers` port scans and `http_workers` probe rounds run at any time.
/// Permits are granted in submission order (tokio semaphores are fair), but
/// completion order is arbitrary.
pub struct JobRegistry {
    jobs: RwLock<HashMap<String, Arc<Mutex<Job>>>>,
    scan_pool: Arc<Semaphore>,
    /// One permit covers a host's whole probe round: the HTTP GET, HTTPS GET
    /// and TLS inspection run concurrently under it, so request-level fan-out
    /// is up to three connections per permit.
    http_pool: Arc<Semaphore>,
    scanner: Arc<dyn PortScanner>,
    prober: Arc<dyn HttpProber>,
}

impl JobRegistry {
    /// Registry with the built-in connect scanner and web prober.
    pub fn new(cfg: &ScanConfig) -> Result<Self> {
        let scanner = Arc::new(ConnectScanner::new(
            cfg.scan_ports.clone(),
            cfg.connect_timeout,
        ));
        let prober = Arc::new(WebProber::new(cfg)?);
        Ok(Self::with_stages(scanner, prober, cfg))
    }

    /// Registry over externally supplied stage capabilities. This is the seam
    /// tests use to substitute instrumented doubles.
    pub fn with_stages(
        scanner: Arc<dyn PortScanner>,
        prober: Arc<dyn HttpProber>,
        cfg: &ScanConfig,
    ) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            scan_pool: Arc::new(Semaphore::new(cfg.scan_workers.max(1))),
            http_pool: Arc::new(Semaphore::new(cfg.http_workers.max(1))),
            scanner,
            prober,
        }
    }

    /// Submit a batch. An empty host list creates a `Failed` job immediately
    /// and schedules no work; otherwise both stages are scheduled per host and
    /// the returned id can be polled until the job reports `Completed`.
    pub async fn submit(&self, hosts: Vec<HostTarget>) -> String {
        let job_id = short_id();

        let hosts = dedup_hosts(hosts);
        if hosts.is_empty() {
            let job = Job::failed(job_id.clone(), "empty host list");
            self.jobs
                .write()
                .await
                .insert(job_id.clone(), Arc::new(Mutex::new(job)));
            warn!(%job_id, "submit rejected: empty host list");
            return job_id;
        }

        let total = hosts.len();
        let job = Arc::new(Mutex::new(Job::running(job_id.clone(), total)));
        self.jobs.write().await.insert(job_id.clone(), job.clone());
        info!(%job_id, total, "batch submitted");

        for target in hosts {
            let job = job.clone();
            let scanner = self.scanner.clone();
            let prober = self.prober.clone();
            let scan_pool = self.scan_pool.clone();
            let http_pool = self.http_pool.clone();

            tokio::spawn(async move {
                // The two stages are independent probes of the same host; each
                // waits on its own pool and neither feeds the other.
                let scan_fut = async {
                    let _permit = scan_pool.acquire_owned().await.expect("semaphore in scope");
                    scanner.scan(&target).await
                };
                let probe_fut = async {
                    let _permit = http_pool.acquire_owned().await.expect("semaphore in scope");
                    prober.probe(&target).await
                };
                let (scan_res, report) = tokio::join!(scan_fut, probe_fut);

                let record = assemble_record(&target, scan_res, report);
                finalize(&job, target.key(), record).await;
            });
        }

        job_id
    }

    /// Immutable snapshot of a job, or `None` for an unknown id. Safe to call
    /// concurrently while the batch is running; records appear only once fully
    /// assembled.
    pub async fn poll(&self, job_id: &str) -> Option<JobSnapshot> {
        let job = self.jobs.read().await.get(job_id).cloned()?;
        let job = job.lock().await;
        Some(job.snapshot())
    }

    /// Manually evict a job from the registry. There is no automatic expiry;
    /// callers own retention.
    pub async fn evict(&self, job_id: &str) -> bool {
        self.jobs.write().await.remove(job_id).is_some()
    }

    pub async fn job_ids(&self) -> Vec<String> {
        self.jobs.read().await.keys().cloned().collect()
    }
}

/// Merge both stage outcomes into the final record. A scan failure empties the
/// port list and lands in `error`; probe outcomes are always data.
fn assemble_record(
    target: &HostTarget,
    scan_res: Result<Vec<PortEntry>>,
    report: HttpReport,
) -> HostRecord {
    let (ports, error) = match scan_res {
        Ok(ports) => (ports, None),
        Err(e) => {
            warn!(domain = %target.domain, ip = %target.ip, error = %e, "port scan failed");
            (Vec::new(), Some(format!("port scan failed: {e:#}")))
        }
    };

    HostRecord {
        domain: target.domain.clone(),
        ip: target.ip.clone(),
        ports,
        http_status: report.http_status,
        https_status: report.https_status,
        tls_valid: report.tls_valid,
        tls_reason: report.tls_reason,
        http_default_page: report.http_default_page,
        https_default_page: report.https_default_page,
        is_default_page: report.http_default_page || report.https_default_page,
        error,
        checked_at: now_rfc3339(),
    }
}

/// Publish one finished record and advance the completion counter. All of it
/// happens under the job lock, so increments are serialized and exactly one
/// completion event performs the `Running -> Completed` transition.
async fn finalize(job: &Arc<Mutex<Job>>, key: String, record: HostRecord) {
    let mut job = job.lock().await;
    if job.records.contains_key(&key) {
        // Records are written exactly once per host per job.
        return;
    }
    job.records.insert(key, record);
    job.completed += 1;
    if job.completed == job.total && job.state == JobState::Running {
        job.state = JobState::Completed;
        info!(job_id = %job.job_id, total = job.total, "batch completed");
    }
}

fn dedup_hosts(hosts: Vec<HostTarget>) -> Vec<HostTarget> {
    let mut seen = std::collections::HashSet::new();
    hosts.into_iter().filter(|h| seen.insert(h.key())).collect()
}

fn short_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_ids_are_eight_chars_and_unique() {
        let a = short_id();
        let b = short_id();
        assert_eq!(a.len(), 8);
        assert_ne!(a, b);
    }

    #[test]
    fn dedup_preserves_first_occurrence_order() {
        let h = |d: &str| HostTarget {
            domain: d.to_string(),
            ip: "192.0.2.1".to_string(),
        };
        let out = dedup_hosts(vec![h("a"), h("b"), h("a"), h("c")]);
        let domains: Vec<_> = out.iter().map(|t| t.domain.as_str()).collect();
        assert_eq!(domains, vec!["a", "b", "c"]);
    }
}

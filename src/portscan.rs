use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time;
use tracing::debug;

use crate::types::{HostTarget, PortEntry};

/// Black-box port-scanning capability consumed by the job controller.
///
/// A failure is terminal for the host's port data: the controller records the
/// reason on the host record and continues the batch. Implementations must not
/// retry on their own.
#[async_trait]
pub trait PortScanner: Send + Sync {
    async fn scan(&self, target: &HostTarget) -> Result<Vec<PortEntry>>;
}

/// Default scanner: asynchronous TCP connect sweep over a fixed port set with
/// a passive banner grab on each open port. Sockets for one host are bounded
/// by a small internal limit; cross-host concurrency is bounded by the stage
/// pool in the job controller.
pub struct ConnectScanner {
    ports: Vec<u16>,
    connect_timeout: Duration,
}

// Per-host socket fan-out cap, independent of the stage-wide pool.
const SOCKETS_PER_HOST: usize = 32;

impl ConnectScanner {
    pub fn new(ports: Vec<u16>, connect_timeout: Duration) -> Self {
        Self {
            ports,
            connect_timeout,
        }
    }
}

#[async_trait]
impl PortScanner for ConnectScanner {
    async fn scan(&self, target: &HostTarget) -> Result<Vec<PortEntry>> {
        let ip: IpAddr = target
            .ip
            .parse()
            .with_context(|| format!("invalid IP address for {}: {}", target.domain, target.ip))?;

        let sem = Arc::new(Semaphore::new(SOCKETS_PER_HOST));
        let mut set = JoinSet::new();
        for &port in &self.ports {
            let sem = sem.clone();
            let timeout = self.connect_timeout;
            set.spawn(async move {
                let _permit = sem.acquire_owned().await.expect("semaphore in scope");
                probe_port(ip, port, timeout).await
            });
        }

        let mut open: Vec<PortEntry> = Vec::new();
        while let Some(res) = set.join_next().await {
            let joined = res.context("port probe task panicked")?;
            if let Some(entry) = joined {
                open.push(entry);
            }
        }

        open.sort_by_key(|e| e.port);
        debug!(domain = %target.domain, ip = %target.ip, open = open.len(), "port scan finished");
        Ok(open)
    }
}

/// Connect to one port; `None` means closed, filtered or timed out.
async fn probe_port(ip: IpAddr, port: u16, timeout: Duration) -> Option<PortEntry> {
    let addr = SocketAddr::new(ip, port);
    match time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(mut stream)) => {
            let banner = read_banner(&mut stream).await;
            Some(PortEntry {
                port,
                protocol: service_label(port).to_string(),
                banner,
            })
        }
        _ => None,
    }
}

/// Try to read up to 256 bytes from the stream with a short timeout and convert
/// to a lossy UTF-8 string. Many services stay silent until spoken to, so `None`
/// is the common case.
async fn read_banner(stream: &mut TcpStream) -> Option<String> {
    let mut buf = vec![0u8; 256];
    match time::timeout(Duration::from_millis(200), stream.read(&mut buf)).await {
        Ok(Ok(n)) if n > 0 => {
            buf.truncate(n);
            let s = String::from_utf8_lossy(&buf).to_string();
            let s = s.replace('\n', "\\n").replace('\r', "\\r");
            Some(s.trim().to_string())
        }
        _ => None,
    }
}

/// IANA-ish service name for the ports in the default scan set.
pub fn service_label(port: u16) -> &'static str {
    match port {
        21 => "ftp",
        22 => "ssh",
        23 => "telnet",
        25 => "smtp",
        53 => "domain",
        80 | 81 | 82 | 8080 | 8081 => "http",
        110 => "pop3",
        111 => "rpcbind",
        135 => "msrpc",
        139 => "netbios-ssn",
        143 => "imap",
        443 | 8443 => "https",
        445 => "microsoft-ds",
        993 => "imaps",
        995 => "pop3s",
        1723 => "pptp",
        3306 => "mysql",
        3389 => "ms-wbt-server",
        5900 => "vnc",
        _ => "tcp",
    }
}

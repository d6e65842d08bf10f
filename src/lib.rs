//! Library crate for domain-audit-rs exposing reusable modules.
pub mod config;
pub mod detect;
pub mod hosts;
pub mod httpprobe;
pub mod jobs;
pub mod portscan;
pub mod server;
pub mod tls;
pub mod types;

//! CLI commands for the netbase tool
//!
//! Implements all command handlers for the CLI interface.

use crate::network::resolver::split_host_port;
use crate::network::{resolve_host, AddrFlags, NetAddr, NetConfig, ResolveError, ServiceAddr};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Load the network config, falling back to defaults when no file is given
pub fn load_config(path: Option<&Path>) -> CliResult<NetConfig> {
    match path {
        Some(path) => Ok(NetConfig::load(path)?),
        None => Ok(NetConfig::default()),
    }
}

/// Everything the classifier knows about one address
#[derive(Debug, Serialize)]
pub struct AddrReport {
    pub address: NetAddr,
    pub text: String,
    pub ipv4: bool,
    pub valid: bool,
    pub routable: bool,
    pub flags: AddrFlags,
    pub group: String,
    pub random_hash: u64,
}

impl AddrReport {
    pub fn new(address: NetAddr) -> Self {
        Self {
            address,
            text: address.to_text(),
            ipv4: address.is_ipv4(),
            valid: address.is_valid(),
            routable: address.is_routable(),
            flags: address.flags(),
            group: address.group().to_string(),
            random_hash: address.random_hash(),
        }
    }
}

/// Classify a host
pub fn cmd_inspect(config: &NetConfig, host: &str, json: bool) -> CliResult<()> {
    let addrs = resolve_host(host, config.max_results, config.allow_lookup)?;
    let reports: Vec<AddrReport> = addrs.into_iter().map(AddrReport::new).collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }

    for report in &reports {
        println!("🔎 {}", report.text);
        println!("   ├─ Family: {}", if report.ipv4 { "IPv4" } else { "IPv6" });
        println!("   ├─ Valid: {}", report.valid);
        println!("   ├─ Routable: {}", report.routable);
        println!("   ├─ Flags: {:?}", report.flags);
        println!("   ├─ Group: {}", report.group);
        println!("   └─ Random hash: {:#018x}", report.random_hash);
    }

    Ok(())
}

/// Resolve a host and list its addresses
pub fn cmd_resolve(config: &NetConfig, host: &str) -> CliResult<()> {
    let addrs = resolve_host(host, config.max_results, config.allow_lookup)?;

    println!("📋 {} resolves to {} address(es):", host, addrs.len());
    for addr in &addrs {
        println!("   {}", addr);
    }

    Ok(())
}

/// Count distinct diversity groups among several hosts
pub fn cmd_group(config: &NetConfig, hosts: &[String]) -> CliResult<()> {
    let mut groups: BTreeMap<String, Vec<NetAddr>> = BTreeMap::new();

    for host in hosts {
        match resolve_host(host, config.max_results, config.allow_lookup) {
            Ok(addrs) => {
                for addr in addrs {
                    groups.entry(addr.group().to_string()).or_default().push(addr);
                }
            }
            Err(e) => println!("⚠️  {}", e),
        }
    }

    println!("🧩 {} distinct group(s):", groups.len());
    for (group, members) in &groups {
        let members: Vec<String> = members.iter().map(NetAddr::to_text).collect();
        println!("   {} ← {}", group, members.join(", "));
    }

    Ok(())
}

/// Open a bounded TCP connection and report the outcome
#[cfg(unix)]
pub fn cmd_connect(config: &NetConfig, target: &str, port: Option<u16>) -> CliResult<()> {
    use crate::network::connect_with;
    use std::time::Instant;

    let service = connect_target(config, target, port)?;

    let options = config.connect_options();
    println!(
        "🔌 Connecting to {} (timeout {:?})...",
        service, options.timeout
    );

    let start = Instant::now();
    let stream = connect_with(&service, &options)?;
    let elapsed = start.elapsed();

    println!("✅ Connected in {}ms", elapsed.as_millis());
    println!("   ├─ Local: {}", stream.local_addr()?);
    println!("   └─ Remote: {}", stream.peer_addr()?);

    Ok(())
}

/// Resolve a connect target, preferring an IPv4 address
///
/// The connector only dials IPv4, so a name like `localhost` that resolves
/// to both `::1` and `127.0.0.1` must not pick the IPv6 one.
pub fn connect_target(config: &NetConfig, target: &str, port: Option<u16>) -> CliResult<ServiceAddr> {
    if target.is_empty() {
        return Err(ResolveError::failed(target).into());
    }

    let (host, target_port) = split_host_port(target, config.default_port);
    let addrs = resolve_host(host, 0, config.allow_lookup)?;
    let addr = addrs
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| ResolveError::failed(host))?;

    Ok(ServiceAddr::new(addr, port.unwrap_or(target_port)))
}

/// Override the configured connect timeout
pub fn with_timeout(mut config: NetConfig, timeout: Option<Duration>) -> NetConfig {
    if let Some(timeout) = timeout {
        config.connect_timeout_ms = timeout.as_millis() as u64;
    }
    config
}

//! Host and service name resolution
//!
//! Accepts the host grammar used on the command line and in config files:
//! - `host`
//! - `host:port`
//! - `[host]`
//! - `[host]:port`
//!
//! where `host` is a DNS name or an IPv4/IPv6 literal. With lookups disabled
//! only numeric literals are accepted and no DNS traffic is generated.

use crate::network::address::NetAddr;
use crate::network::service::ServiceAddr;
use std::net::{IpAddr, ToSocketAddrs};
use thiserror::Error;

/// Host strings longer than this are silently truncated (legacy limit)
pub const MAX_HOST_LEN: usize = 255;

/// Resolution errors
///
/// OS-level resolver errors are logged, never returned: every failure looks
/// the same to callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("Failed to resolve host: {host}")]
    ResolutionFailed { host: String },
}

impl ResolveError {
    pub(crate) fn failed(host: &str) -> Self {
        ResolveError::ResolutionFailed {
            host: host.to_string(),
        }
    }
}

// =============================================================================
// Resolution
// =============================================================================

/// Resolve a host to at most `max_results` addresses (0 = unlimited)
pub fn resolve_host(
    name: &str,
    max_results: usize,
    allow_lookup: bool,
) -> Result<Vec<NetAddr>, ResolveError> {
    if name.is_empty() {
        return Err(ResolveError::failed(name));
    }

    let host = strip_brackets(truncate_host(name));
    let addrs = lookup(host, max_results, allow_lookup);
    if addrs.is_empty() {
        return Err(ResolveError::failed(host));
    }

    Ok(addrs)
}

/// Resolve a numeric literal only
pub fn resolve_numeric_host(name: &str, max_results: usize) -> Result<Vec<NetAddr>, ResolveError> {
    resolve_host(name, max_results, false)
}

/// Resolve `host[:port]` or `[host][:port]`
///
/// A trailing decimal port overrides `default_port`. An unbracketed spec
/// with more than one colon is taken as a bare IPv6 literal.
pub fn resolve_host_port(
    spec: &str,
    default_port: u16,
    allow_lookup: bool,
) -> Result<ServiceAddr, ResolveError> {
    if spec.is_empty() {
        return Err(ResolveError::failed(spec));
    }

    let (host, port) = split_host_port(truncate_host(spec), default_port);
    let addr = lookup(host, 1, allow_lookup)
        .first()
        .copied()
        .ok_or_else(|| ResolveError::failed(host))?;

    Ok(ServiceAddr::new(addr, port))
}

/// Resolve a numeric `host[:port]` only
pub fn resolve_numeric_host_port(spec: &str, default_port: u16) -> Result<ServiceAddr, ResolveError> {
    resolve_host_port(spec, default_port, false)
}

/// Async wrapper around [`resolve_host`], run on the blocking pool
pub async fn resolve_host_async(
    name: &str,
    max_results: usize,
    allow_lookup: bool,
) -> Result<Vec<NetAddr>, ResolveError> {
    let owned = name.to_string();
    tokio::task::spawn_blocking(move || resolve_host(&owned, max_results, allow_lookup))
        .await
        .map_err(|e| {
            log::warn!("Resolver task for {} failed: {}", name, e);
            ResolveError::failed(name)
        })?
}

/// Async wrapper around [`resolve_host_port`], run on the blocking pool
pub async fn resolve_host_port_async(
    spec: &str,
    default_port: u16,
    allow_lookup: bool,
) -> Result<ServiceAddr, ResolveError> {
    let owned = spec.to_string();
    tokio::task::spawn_blocking(move || resolve_host_port(&owned, default_port, allow_lookup))
        .await
        .map_err(|e| {
            log::warn!("Resolver task for {} failed: {}", spec, e);
            ResolveError::failed(spec)
        })?
}

// =============================================================================
// Infallible constructors
// =============================================================================

impl NetAddr {
    /// Resolve a host, yielding the all-zero address on failure
    pub fn from_host(name: &str, allow_lookup: bool) -> Self {
        resolve_host(name, 1, allow_lookup)
            .ok()
            .and_then(|addrs| addrs.first().copied())
            .unwrap_or_default()
    }
}

impl ServiceAddr {
    /// Resolve `host[:port]`, yielding the all-zero service on failure
    pub fn from_host_port(spec: &str, allow_lookup: bool) -> Self {
        resolve_host_port(spec, 0, allow_lookup).unwrap_or_default()
    }

    /// Resolve a bare host and attach `port`
    pub fn from_host(name: &str, port: u16, allow_lookup: bool) -> Self {
        resolve_host(name, 1, allow_lookup)
            .ok()
            .and_then(|addrs| addrs.first().copied())
            .map(|addr| ServiceAddr::new(addr, port))
            .unwrap_or_default()
    }
}

// =============================================================================
// Private helpers
// =============================================================================

fn truncate_host(name: &str) -> &str {
    if name.len() <= MAX_HOST_LEN {
        return name;
    }

    let mut end = MAX_HOST_LEN;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    log::debug!("Truncating host name to {} bytes", end);
    &name[..end]
}

fn strip_brackets(host: &str) -> &str {
    host.strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host)
}

/// Split off a trailing port; the colon search skips position 0
pub(crate) fn split_host_port(spec: &str, default_port: u16) -> (&str, u16) {
    let Some(colon) = spec.rfind(':').filter(|&i| i > 0) else {
        return (strip_brackets(spec), default_port);
    };

    let port_str = &spec[colon + 1..];
    let port = if !port_str.is_empty() && port_str.bytes().all(|b| b.is_ascii_digit()) {
        port_str.parse::<u16>().ok()
    } else {
        None
    };

    let Some(port) = port else {
        return (strip_brackets(spec), default_port);
    };

    let head = &spec[..colon];
    if let Some(inner) = head.strip_prefix('[').and_then(|h| h.strip_suffix(']')) {
        return (inner, port);
    }

    if head.contains(':') {
        // Unbracketed IPv6 literal such as "::1" or "fe80::1"
        return (spec, default_port);
    }

    (head, port)
}

fn lookup(host: &str, max_results: usize, allow_lookup: bool) -> Vec<NetAddr> {
    let limit = if max_results == 0 {
        usize::MAX
    } else {
        max_results
    };

    if !allow_lookup {
        return match host.parse::<IpAddr>() {
            Ok(ip) => vec![NetAddr::from(ip)],
            Err(_) => {
                log::debug!("{} is not a numeric address and lookups are disabled", host);
                Vec::new()
            }
        };
    }

    match (host, 0u16).to_socket_addrs() {
        Ok(addrs) => addrs
            .map(|sa| NetAddr::from(sa.ip()))
            .take(limit)
            .collect(),
        Err(e) => {
            log::debug!("Failed to resolve {}: {}", host, e);
            Vec::new()
        }
    }
}

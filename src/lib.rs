//! Peer Netbase: the address layer of a P2P node
//!
//! This crate provides:
//! - A unified IPv4/IPv6 address value (`NetAddr`) with RFC classification
//! - Address + port pairs (`ServiceAddr`) with a stable 18-byte key
//! - Peer diversity groups for Sybil/eclipse resistance
//! - A deterministic address randomization hash
//! - Host and `host:port` resolution, optionally without DNS
//! - A timeout-bounded non-blocking TCP connect
//!
//! # Example
//!
//! ```rust
//! use peer_netbase::network::{resolve_host_port, NetAddr};
//!
//! let a: NetAddr = "8.8.8.8".parse().unwrap();
//! let b: NetAddr = "8.8.4.4".parse().unwrap();
//! assert!(a.is_routable());
//! assert_eq!(a.group(), b.group());
//!
//! let service = resolve_host_port("[::1]:8333", 0, false).unwrap();
//! assert_eq!(service.port(), 8333);
//! assert!(!service.is_routable());
//! ```

pub mod cli;
pub mod network;

// Re-export commonly used types
#[cfg(unix)]
pub use network::{connect, connect_with, ConnectError, ConnectOptions};
pub use network::{
    resolve_host, resolve_host_port, resolve_numeric_host, AddrFlags, GroupKey, NetAddr,
    NetConfig, ResolveError, ServiceAddr,
};

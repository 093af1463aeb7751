//! Network address layer
//!
//! Provides the address primitives a P2P node builds its peer handling on.
//!
//! # Features
//! - Unified IPv4/IPv6 address value with RFC classification
//! - Peer diversity groups (Sybil/eclipse resistance)
//! - Deterministic address randomization hash
//! - Host and `host:port` resolution with optional DNS
//! - Timeout-bounded TCP connect

pub mod address;
pub mod config;
#[cfg(unix)]
pub mod connector;
pub mod group;
pub mod resolver;
pub mod service;

pub use address::{AddrFlags, AddrParseError, NetAddr, IPV4_MAPPED_PREFIX};
pub use config::{ConfigError, NetConfig, DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_PORT};
#[cfg(unix)]
pub use connector::{
    connect, connect_async, connect_with, ConnectError, ConnectOptions, ConnectState,
    DEFAULT_CONNECT_TIMEOUT,
};
pub use group::{GroupClass, GroupKey};
pub use resolver::{
    resolve_host, resolve_host_async, resolve_host_port, resolve_host_port_async,
    resolve_numeric_host, resolve_numeric_host_port, ResolveError, MAX_HOST_LEN,
};
pub use service::{ServiceAddr, SERVICE_KEY_LEN};

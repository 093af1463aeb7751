//! Address + port pairs
//!
//! A `ServiceAddr` is what peers advertise and what the connector dials.

use crate::network::address::NetAddr;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{SocketAddr, SocketAddrV4, SocketAddrV6};
use std::ops::Deref;

/// Length of the serialized lookup key
pub const SERVICE_KEY_LEN: usize = 18;

/// A network address with a TCP port (0 = unspecified)
///
/// Ordering compares the address first, then the port.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct ServiceAddr {
    addr: NetAddr,
    port: u16,
}

impl ServiceAddr {
    pub fn new(addr: NetAddr, port: u16) -> Self {
        Self { addr, port }
    }

    pub fn addr(&self) -> NetAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn set_port(&mut self, port: u16) {
        self.port = port;
    }

    /// 16 address bytes followed by the big-endian port
    ///
    /// Stable across restarts; used as an opaque peer-table key.
    pub fn key(&self) -> [u8; SERVICE_KEY_LEN] {
        let mut key = [0u8; SERVICE_KEY_LEN];
        key[..16].copy_from_slice(&self.addr.octets());
        key[16..].copy_from_slice(&self.port.to_be_bytes());
        key
    }

    pub fn to_text(&self) -> String {
        format!("{}:{}", self.addr.to_text(), self.port)
    }

    /// Socket address in the address's own family
    pub fn to_socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.addr.to_ip_addr(), self.port)
    }
}

impl Deref for ServiceAddr {
    type Target = NetAddr;

    fn deref(&self) -> &NetAddr {
        &self.addr
    }
}

impl From<SocketAddr> for ServiceAddr {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip().into(), addr.port())
    }
}

impl From<SocketAddrV4> for ServiceAddr {
    fn from(addr: SocketAddrV4) -> Self {
        Self::new((*addr.ip()).into(), addr.port())
    }
}

impl From<SocketAddrV6> for ServiceAddr {
    fn from(addr: SocketAddrV6) -> Self {
        Self::new((*addr.ip()).into(), addr.port())
    }
}

impl fmt::Display for ServiceAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

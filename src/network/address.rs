//! Network address value type
//!
//! A single 16-byte representation for both address families:
//! - IPv6 addresses are stored as-is (network byte order)
//! - IPv4 addresses are stored IPv4-mapped (`::ffff:a.b.c.d`)
//!
//! Classification predicates follow the RFC ranges that matter for
//! deciding whether a peer address is worth relaying or connecting to.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Prefix of an IPv4-mapped IPv6 address
pub const IPV4_MAPPED_PREFIX: [u8; 12] = [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0xFF, 0xFF];

/// NAT64 well-known prefix (64:ff9b::/96)
const RFC6052_PREFIX: [u8; 12] = [0, 0x64, 0xFF, 0x9B, 0, 0, 0, 0, 0, 0, 0, 0];

/// IPv6 link-local prefix (fe80::/64)
const RFC4862_PREFIX: [u8; 8] = [0xFE, 0x80, 0, 0, 0, 0, 0, 0];

/// IPv4-translated prefix (::ffff:0:0/96)
const RFC6145_PREFIX: [u8; 12] = [0, 0, 0, 0, 0, 0, 0, 0, 0xFF, 0xFF, 0, 0];

/// IPv6 loopback (::1)
const IPV6_LOOPBACK: [u8; 16] = [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1];

// =============================================================================
// Errors
// =============================================================================

/// Error returned when parsing a numeric address literal
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddrParseError {
    #[error("Invalid address literal: {0}")]
    InvalidLiteral(String),
}

// =============================================================================
// Classification flags
// =============================================================================

bitflags! {
    /// Every classification that holds for an address
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct AddrFlags: u32 {
        const IPV4 = 1 << 0;
        const RFC1918 = 1 << 1;
        const RFC3927 = 1 << 2;
        const RFC3849 = 1 << 3;
        const RFC3964 = 1 << 4;
        const RFC6052 = 1 << 5;
        const RFC4380 = 1 << 6;
        const RFC4862 = 1 << 7;
        const RFC4193 = 1 << 8;
        const RFC6145 = 1 << 9;
        const RFC4843 = 1 << 10;
        const LOCAL = 1 << 11;
        const MULTICAST = 1 << 12;
        const VALID = 1 << 13;
        const ROUTABLE = 1 << 14;
    }
}

// =============================================================================
// NetAddr
// =============================================================================

/// An IPv4 or IPv6 address held as 16 big-endian bytes
///
/// The all-zero value (`Default`) is the "unresolved" address; it is never
/// valid, so callers constructing from text should check `is_valid()`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NetAddr {
    ip: [u8; 16],
}

impl NetAddr {
    /// Create from raw IPv4 octets (stored IPv4-mapped)
    pub fn from_ipv4_octets(octets: [u8; 4]) -> Self {
        let mut ip = [0u8; 16];
        ip[..12].copy_from_slice(&IPV4_MAPPED_PREFIX);
        ip[12..].copy_from_slice(&octets);
        Self { ip }
    }

    /// Create from raw IPv6 octets
    pub fn from_ipv6_octets(octets: [u8; 16]) -> Self {
        Self { ip: octets }
    }

    /// The raw 16-byte buffer, most significant byte first
    pub fn octets(&self) -> [u8; 16] {
        self.ip
    }

    /// Byte at reversed position: `byte(0)` is the least significant byte,
    /// `byte(15)` the most significant.
    ///
    /// Classification and grouping are expressed in this indexing.
    pub fn byte(&self, n: usize) -> u8 {
        self.ip[15 - n]
    }

    pub fn is_ipv4(&self) -> bool {
        self.ip[..12] == IPV4_MAPPED_PREFIX
    }

    /// IPv4 private networks (10/8, 172.16/12, 192.168/16)
    pub fn is_rfc1918(&self) -> bool {
        self.is_ipv4()
            && (self.byte(3) == 10
                || (self.byte(3) == 192 && self.byte(2) == 168)
                || (self.byte(3) == 172 && (16..=31).contains(&self.byte(2))))
    }

    /// IPv4 autoconfig (169.254/16)
    pub fn is_rfc3927(&self) -> bool {
        self.is_ipv4() && self.byte(3) == 169 && self.byte(2) == 254
    }

    /// IPv6 documentation prefix (2001:db8::/32)
    pub fn is_rfc3849(&self) -> bool {
        self.byte(15) == 0x20 && self.byte(14) == 0x01 && self.byte(13) == 0x0D && self.byte(12) == 0xB8
    }

    /// 6to4 tunnelling (2002::/16)
    pub fn is_rfc3964(&self) -> bool {
        self.byte(15) == 0x20 && self.byte(14) == 0x02
    }

    /// NAT64 well-known prefix (64:ff9b::/96)
    pub fn is_rfc6052(&self) -> bool {
        self.ip[..12] == RFC6052_PREFIX
    }

    /// Teredo tunnelling (2001::/32)
    pub fn is_rfc4380(&self) -> bool {
        self.byte(15) == 0x20 && self.byte(14) == 0x01 && self.byte(13) == 0 && self.byte(12) == 0
    }

    /// IPv6 link-local (fe80::/64)
    pub fn is_rfc4862(&self) -> bool {
        self.ip[..8] == RFC4862_PREFIX
    }

    /// IPv6 unique local (fc00::/7)
    pub fn is_rfc4193(&self) -> bool {
        (self.byte(15) & 0xFE) == 0xFC
    }

    /// IPv4-translated addresses (::ffff:0:0:0/96)
    pub fn is_rfc6145(&self) -> bool {
        self.ip[..12] == RFC6145_PREFIX
    }

    /// ORCHID (2001:10::/28)
    pub fn is_rfc4843(&self) -> bool {
        self.byte(15) == 0x20
            && self.byte(14) == 0x01
            && self.byte(13) == 0x00
            && (self.byte(12) & 0xF0) == 0x10
    }

    /// Loopback, plus the legacy 0.0.0.0/8 IPv4 range
    pub fn is_local(&self) -> bool {
        // 0.x.x.x has always been treated as local by older nodes
        if self.is_ipv4() && (self.byte(3) == 127 || self.byte(3) == 0) {
            return true;
        }

        self.ip == IPV6_LOOPBACK
    }

    pub fn is_multicast(&self) -> bool {
        (self.is_ipv4() && (self.byte(3) & 0xF0) == 0xE0) || self.byte(15) == 0xFF
    }

    /// Check that the address is usable at all
    pub fn is_valid(&self) -> bool {
        // Addresses read 3 bytes out of alignment from a garbled addr message
        // length field start with the tail of the IPv4 prefix.
        if self.ip[..9] == IPV4_MAPPED_PREFIX[3..] {
            return false;
        }

        // Unspecified (::)
        if self.ip == [0u8; 16] {
            return false;
        }

        if self.is_rfc3849() {
            return false;
        }

        if self.is_ipv4() {
            let v4 = &self.ip[12..];
            // INADDR_NONE and INADDR_ANY
            if v4 == [0xFF; 4] || v4 == [0; 4] {
                return false;
            }
        }

        true
    }

    /// Check if the address is reachable on the public internet
    pub fn is_routable(&self) -> bool {
        self.is_valid()
            && !(self.is_rfc1918()
                || self.is_rfc3927()
                || self.is_rfc4862()
                || self.is_rfc4193()
                || self.is_rfc4843()
                || self.is_local())
    }

    /// Collect every classification that holds for this address
    pub fn flags(&self) -> AddrFlags {
        let checks = [
            (AddrFlags::IPV4, self.is_ipv4()),
            (AddrFlags::RFC1918, self.is_rfc1918()),
            (AddrFlags::RFC3927, self.is_rfc3927()),
            (AddrFlags::RFC3849, self.is_rfc3849()),
            (AddrFlags::RFC3964, self.is_rfc3964()),
            (AddrFlags::RFC6052, self.is_rfc6052()),
            (AddrFlags::RFC4380, self.is_rfc4380()),
            (AddrFlags::RFC4862, self.is_rfc4862()),
            (AddrFlags::RFC4193, self.is_rfc4193()),
            (AddrFlags::RFC6145, self.is_rfc6145()),
            (AddrFlags::RFC4843, self.is_rfc4843()),
            (AddrFlags::LOCAL, self.is_local()),
            (AddrFlags::MULTICAST, self.is_multicast()),
            (AddrFlags::VALID, self.is_valid()),
            (AddrFlags::ROUTABLE, self.is_routable()),
        ];

        checks
            .iter()
            .filter(|(_, holds)| *holds)
            .fold(AddrFlags::empty(), |acc, (flag, _)| acc | *flag)
    }

    /// Dotted quad for IPv4, eight uncompressed hex groups for IPv6
    pub fn to_text(&self) -> String {
        if self.is_ipv4() {
            return format!(
                "{}.{}.{}.{}",
                self.byte(3),
                self.byte(2),
                self.byte(1),
                self.byte(0)
            );
        }

        (0..8)
            .map(|group| {
                let hi = self.byte(15 - 2 * group) as u16;
                let lo = self.byte(14 - 2 * group) as u16;
                format!("{:x}", hi << 8 | lo)
            })
            .collect::<Vec<_>>()
            .join(":")
    }

    /// The embedded IPv4 address, if this is one
    pub fn to_ipv4(&self) -> Option<Ipv4Addr> {
        if !self.is_ipv4() {
            return None;
        }
        Some(Ipv4Addr::new(self.ip[12], self.ip[13], self.ip[14], self.ip[15]))
    }

    /// The raw buffer as an IPv6 address (IPv4 stays mapped)
    pub fn to_ipv6(&self) -> Ipv6Addr {
        Ipv6Addr::from(self.ip)
    }

    /// Convert to the matching `std::net` family
    pub fn to_ip_addr(&self) -> IpAddr {
        match self.to_ipv4() {
            Some(v4) => IpAddr::V4(v4),
            None => IpAddr::V6(self.to_ipv6()),
        }
    }
}

impl From<Ipv4Addr> for NetAddr {
    fn from(addr: Ipv4Addr) -> Self {
        Self::from_ipv4_octets(addr.octets())
    }
}

impl From<Ipv6Addr> for NetAddr {
    fn from(addr: Ipv6Addr) -> Self {
        Self::from_ipv6_octets(addr.octets())
    }
}

impl From<IpAddr> for NetAddr {
    fn from(addr: IpAddr) -> Self {
        match addr {
            IpAddr::V4(v4) => v4.into(),
            IpAddr::V6(v6) => v6.into(),
        }
    }
}

impl FromStr for NetAddr {
    type Err = AddrParseError;

    /// Parse a numeric IPv4 or IPv6 literal; never touches DNS
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<IpAddr>()
            .map(Self::from)
            .map_err(|_| AddrParseError::InvalidLiteral(s.to_string()))
    }
}

impl TryFrom<String> for NetAddr {
    type Error = AddrParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<NetAddr> for String {
    fn from(addr: NetAddr) -> Self {
        addr.to_text()
    }
}

impl fmt::Display for NetAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl fmt::Debug for NetAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NetAddr({})", self.to_text())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn addr(s: &str) -> NetAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_ipv4_is_mapped() {
        let a = NetAddr::from_ipv4_octets([1, 2, 3, 4]);
        assert!(a.is_ipv4());
        assert_eq!(
            a.octets(),
            [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0xFF, 0xFF, 1, 2, 3, 4]
        );
        assert_eq!(a.byte(0), 4);
        assert_eq!(a.byte(3), 1);
        assert_eq!(a.byte(15), 0);
    }

    #[test]
    fn test_ipv6_not_ipv4() {
        let a = addr("2001:4860:4860::8888");
        assert!(!a.is_ipv4());
        assert_eq!(a.byte(15), 0x20);
        assert_eq!(a.byte(14), 0x01);
        assert_eq!(a.to_ipv4(), None);
    }

    #[test]
    fn test_unroutable() {
        for s in [
            "127.0.0.1",
            "10.1.2.3",
            "192.168.0.1",
            "172.20.0.5",
            "169.254.1.1",
            "::1",
            "FE80::1",
            "FC00::1",
            "::",
        ] {
            assert!(!addr(s).is_routable(), "{} should not be routable", s);
        }
        assert!(!NetAddr::default().is_routable());
    }

    #[test]
    fn test_routable() {
        assert!(addr("8.8.8.8").is_routable());
        assert!(addr("2001:4860:4860::8888").is_routable());
        assert!(addr("172.32.0.1").is_routable());
        assert!(addr("172.15.255.255").is_routable());
    }

    #[test]
    fn test_rfc_predicates() {
        assert!(addr("10.0.0.1").is_rfc1918());
        assert!(addr("172.31.255.1").is_rfc1918());
        assert!(addr("192.168.100.1").is_rfc1918());
        assert!(!addr("192.169.0.1").is_rfc1918());

        assert!(addr("169.254.10.10").is_rfc3927());
        assert!(addr("2001:db8::1").is_rfc3849());
        assert!(addr("2002:0808:0808::1").is_rfc3964());
        assert!(addr("64:ff9b::808:808").is_rfc6052());
        assert!(addr("2001:0:4136:e378::1").is_rfc4380());
        assert!(addr("fe80::1234").is_rfc4862());
        assert!(!addr("fe80:1::1").is_rfc4862());
        assert!(addr("fd12:3456::1").is_rfc4193());
        assert!(addr("::ffff:0:808:808").is_rfc6145());
        assert!(addr("2001:10::1").is_rfc4843());
        assert!(addr("2001:1f::1").is_rfc4843());
        assert!(!addr("2001:20::1").is_rfc4843());
        assert!(!addr("2001:10::1").is_routable());
    }

    #[test]
    fn test_local() {
        assert!(addr("127.0.0.1").is_local());
        assert!(addr("127.255.0.1").is_local());
        assert!(addr("0.1.2.3").is_local());
        assert!(addr("::1").is_local());
        assert!(!addr("::2").is_local());
        assert!(!addr("8.8.8.8").is_local());
    }

    #[test]
    fn test_multicast() {
        assert!(addr("224.0.0.1").is_multicast());
        assert!(addr("239.255.255.250").is_multicast());
        assert!(!addr("240.0.0.1").is_multicast());
        assert!(addr("ff02::1").is_multicast());
        assert!(!addr("fe80::1").is_multicast());
    }

    #[test]
    fn test_invalid() {
        assert!(!NetAddr::default().is_valid());
        assert!(!addr("0.0.0.0").is_valid());
        assert!(!addr("255.255.255.255").is_valid());
        assert!(!addr("2001:db8::8").is_valid());

        // 3-byte shifted garbage
        let mut shifted = [0u8; 16];
        shifted[7] = 0xFF;
        shifted[8] = 0xFF;
        shifted[9] = 1;
        assert!(!NetAddr::from_ipv6_octets(shifted).is_valid());

        assert!(addr("8.8.8.8").is_valid());
        assert!(addr("10.0.0.1").is_valid());
    }

    #[test]
    fn test_predicates_are_pure() {
        let samples = ["8.8.8.8", "10.0.0.1", "::1", "2001::1", "2002:102:304::1"];
        for s in samples {
            let a = addr(s);
            let before = a;
            assert_eq!(a.flags(), a.flags());
            assert_eq!(a.is_routable(), a.is_routable());
            assert_eq!(a.is_valid(), a.is_valid());
            assert_eq!(a.is_local(), a.is_local());
            assert_eq!(a.is_multicast(), a.is_multicast());
            assert_eq!(a, before);
        }
    }

    #[test]
    fn test_flags() {
        let flags = addr("192.168.1.1").flags();
        assert!(flags.contains(AddrFlags::IPV4 | AddrFlags::RFC1918 | AddrFlags::VALID));
        assert!(!flags.contains(AddrFlags::ROUTABLE));

        let flags = addr("2001:4860:4860::8888").flags();
        assert_eq!(flags, AddrFlags::VALID | AddrFlags::ROUTABLE);
    }

    #[test]
    fn test_to_text() {
        assert_eq!(addr("8.8.4.4").to_text(), "8.8.4.4");
        assert_eq!(addr("::1").to_text(), "0:0:0:0:0:0:0:1");
        assert_eq!(
            addr("2001:DB8::FF00:42:8329").to_text(),
            "2001:db8:0:0:0:ff00:42:8329"
        );
        assert_eq!(format!("{}", addr("1.2.3.4")), "1.2.3.4");
    }

    #[test]
    fn test_text_round_trip() {
        let mut rng = rand::thread_rng();
        for _ in 0..256 {
            let v6 = NetAddr::from_ipv6_octets(rng.gen());
            assert_eq!(v6.to_text().parse::<NetAddr>().unwrap(), v6);

            let v4 = NetAddr::from_ipv4_octets(rng.gen());
            assert_eq!(v4.to_text().parse::<NetAddr>().unwrap(), v4);
        }
    }

    #[test]
    fn test_ordering() {
        assert!(addr("1.2.3.4") < addr("1.2.3.5"));
        assert!(addr("::1") < addr("1.2.3.4"));
        assert!(addr("2001::1") > addr("1.2.3.4"));
    }

    #[test]
    fn test_std_conversions() {
        let v4: Ipv4Addr = "9.9.9.9".parse().unwrap();
        assert_eq!(NetAddr::from(v4).to_ip_addr(), IpAddr::V4(v4));

        let v6: Ipv6Addr = "2606:4700::1111".parse().unwrap();
        assert_eq!(NetAddr::from(v6).to_ip_addr(), IpAddr::V6(v6));
        assert_eq!(NetAddr::from(v6).to_ipv6(), v6);
    }

    #[test]
    fn test_parse_rejects_names() {
        assert!("example.com".parse::<NetAddr>().is_err());
        assert!("".parse::<NetAddr>().is_err());
    }

    #[test]
    fn test_serde() {
        let a = addr("8.8.8.8");
        let json = serde_json::to_string(&a).unwrap();
        assert_eq!(json, "\"8.8.8.8\"");
        let back: NetAddr = serde_json::from_str(&json).unwrap();
        assert_eq!(back, a);
        assert!(serde_json::from_str::<NetAddr>("\"nope\"").is_err());
    }
}

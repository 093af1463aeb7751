//! Peer diversity grouping and address randomization
//!
//! Two addresses in the same group are assumed to be controlled by the same
//! network operator, so outbound connections should spread across groups.
//! Tunnelled IPv6 (6to4, Teredo, NAT64, SIIT) is grouped by the IPv4 address
//! it carries.

use crate::network::address::NetAddr;
use std::fmt;

// =============================================================================
// Constants
// =============================================================================

/// Multiplier applied to the IPv4 address for the randomization hash
const IPV4_HASH_MULT: u64 = 7789;

/// Per-byte multipliers for IPv6 addresses, taken from the hex expansion of 3/pi
const IPV6_HASH_MULT: [u64; 16] = [
    0xF4764525, 0x75661FBE, 0xFA3B03BA, 0xEFCF4CA1, 0x4913E065, 0xDA655862, 0xFD7A1581, 0xCE19A812,
    0x92B6A557, 0x6374BC50, 0x096DC65F, 0x0EBA5B2B, 0x7D2CE0AB, 0x09BE7ADE, 0x5CC350EF, 0xC618E6C7,
];

/// Hurricane Electric tunnel broker (2001:470::/32), grouped at /36
const HE_NET_PREFIX: [u8; 4] = [0x20, 0x01, 0x04, 0x70];

// =============================================================================
// Group Key
// =============================================================================

/// Class tag in the first byte of a group key
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GroupClass {
    Ipv6,
    Ipv4,
    Unroutable,
}

impl GroupClass {
    fn tag(self) -> u8 {
        match self {
            GroupClass::Ipv6 => 0,
            GroupClass::Ipv4 => 1,
            GroupClass::Unroutable => 255,
        }
    }
}

/// Opaque network-segment fingerprint; only ever compared for equality
///
/// The first byte of `bytes` is always `class`'s tag.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupKey {
    class: GroupClass,
    bytes: Vec<u8>,
}

impl GroupKey {
    fn new(class: GroupClass, bytes: Vec<u8>) -> Self {
        Self { class, bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn class(&self) -> GroupClass {
        self.class
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.bytes))
    }
}

impl fmt::Debug for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GroupKey({})", self)
    }
}

impl NetAddr {
    /// Compute the diversity group this address belongs to
    pub fn group(&self) -> GroupKey {
        let bytes = self.octets();
        let mut class = GroupClass::Ipv6;
        let mut start = 0usize;
        let mut bits = 16usize;

        if !self.is_routable() {
            // Each unroutable address is its own group
            class = GroupClass::Unroutable;
            bits = 128;
        } else if self.is_ipv4() || self.is_rfc6145() || self.is_rfc6052() {
            class = GroupClass::Ipv4;
            start = 12;
        } else if self.is_rfc3964() {
            class = GroupClass::Ipv4;
            start = 2;
        } else if self.is_rfc4380() {
            // Teredo stores the client IPv4 address bit-inverted
            return GroupKey::new(
                GroupClass::Ipv4,
                vec![GroupClass::Ipv4.tag(), self.byte(3) ^ 0xFF, self.byte(2) ^ 0xFF],
            );
        } else if bytes[..4] == HE_NET_PREFIX {
            bits = 36;
        } else {
            bits = 32;
        }

        let mut key = Vec::with_capacity(1 + bits.div_ceil(8));
        key.push(class.tag());
        while bits >= 8 {
            key.push(bytes[start]);
            start += 1;
            bits -= 8;
        }
        if bits > 0 {
            key.push(bytes[start] | ((1u8 << bits) - 1));
        }

        GroupKey::new(class, key)
    }

    /// Deterministic 64-bit hash used to decorrelate selection order
    ///
    /// Not a security primitive: it has no key and is identical across
    /// processes for the same address bytes.
    pub fn random_hash(&self) -> u64 {
        if self.is_ipv4() {
            let ip = (self.byte(3) as u64) << 24
                | (self.byte(2) as u64) << 16
                | (self.byte(1) as u64) << 8
                | self.byte(0) as u64;
            return ip.wrapping_mul(IPV4_HASH_MULT);
        }

        IPV6_HASH_MULT
            .iter()
            .enumerate()
            .fold(0u64, |acc, (n, mult)| {
                acc.wrapping_add(mult.wrapping_mul(self.byte(n) as u64))
            })
    }
}

//! Device addressing: P2P device MAC addresses and the IPv6 link-local addresses derived from them.

use std::fmt;
use std::net::Ipv6Addr;
use std::str::FromStr;

use macaddr::MacAddr6;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// P2P device address (EUI-48). Peer identity in the roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MacAddress(MacAddr6);

impl MacAddress {
    pub fn new(bytes: [u8; 6]) -> Self {
        MacAddress(MacAddr6::from(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Modified EUI-64 interface identifier (RFC 4291 appendix A): ff:fe inserted in the middle,
    /// universal/local bit flipped.
    fn interface_id(&self) -> [u8; 8] {
        let a = self.0.as_bytes();
        [a[0] ^ 0x02, a[1], a[2], 0xff, 0xfe, a[3], a[4], a[5]]
    }

    /// IPv6 link-local address a device autoconfigures from this MAC (RFC 4862 §5.3).
    /// Used to reach the group owner when the platform doesn't report its IP.
    pub fn link_local_ipv6(&self) -> Ipv6Addr {
        let mut addr = [0u8; 16];
        addr[0] = 0xfe;
        addr[1] = 0x80;
        addr[8..].copy_from_slice(&self.interface_id());
        Ipv6Addr::from(addr)
    }
}

impl From<[u8; 6]> for MacAddress {
    fn from(bytes: [u8; 6]) -> Self {
        MacAddress::new(bytes)
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0.as_bytes();
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl FromStr for MacAddress {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        MacAddr6::from_str(trimmed)
            .map(MacAddress)
            .map_err(|_| AddressParseError(trimmed.to_string()))
    }
}

impl Serialize for MacAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MacAddress {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid device address: {0:?}")]
pub struct AddressParseError(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display_lowercase() {
        let mac: MacAddress = "02:1A:2b:3C:4d:5E".parse().unwrap();
        assert_eq!(mac, MacAddress::new([0x02, 0x1a, 0x2b, 0x3c, 0x4d, 0x5e]));
        assert_eq!(mac.to_string(), "02:1a:2b:3c:4d:5e");
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("AA:AA".parse::<MacAddress>().is_err());
        assert!("not a mac".parse::<MacAddress>().is_err());
        assert!("".parse::<MacAddress>().is_err());
    }

    #[test]
    fn link_local_flips_universal_bit() {
        let mac = MacAddress::new([0x02, 0x11, 0x22, 0x33, 0x44, 0x55]);
        let expected: Ipv6Addr = "fe80::11:22ff:fe33:4455".parse().unwrap();
        assert_eq!(mac.link_local_ipv6(), expected);

        let mac = MacAddress::new([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
        let expected: Ipv6Addr = "fe80::a8bb:ccff:fedd:eeff".parse().unwrap();
        assert_eq!(mac.link_local_ipv6(), expected);
    }

    #[test]
    fn serde_as_string() {
        let mac = MacAddress::new([0xde, 0xad, 0xbe, 0xef, 0x00, 0x01]);
        let json = serde_json::to_string(&mac).unwrap();
        assert_eq!(json, "\"de:ad:be:ef:00:01\"");
        let back: MacAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, mac);
        assert!(serde_json::from_str::<MacAddress>("\"zz\"").is_err());
    }
}

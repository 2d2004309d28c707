use std::fmt;
use std::str::FromStr;

use proc_bitfield::bitfield;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::LinkError;

bitfield! {
    /// General purpose 16-bit field
    #[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Field16(pub u16): Debug, FromStorage, IntoStorage, DerefStorage {
        pub msb: u8 @ 8..16,
        pub lsb: u8 @ 0..8,
    }
}

/// A layer 2 Ethernet frame (destination address first, no CRC)
pub type Packet = Vec<u8>;

/// 48-bit Ethernet hardware address
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    pub const BROADCAST: Self = Self([0xFF; 6]);

    /// Organisationally unique identifier of Dayna Communications
    pub const DAYNA_OUI: [u8; 3] = [0x00, 0x80, 0x19];

    /// Generates a random address within the Dayna OUI
    pub fn random_dayna() -> Self {
        let mut rand = rand::rng();
        let [a, b, c] = Self::DAYNA_OUI;
        Self([a, b, c, rand.random(), rand.random(), rand.random()])
    }

    pub fn octets(&self) -> &[u8; 6] {
        &self.0
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }
}

impl From<[u8; 6]> for MacAddress {
    fn from(value: [u8; 6]) -> Self {
        Self(value)
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl fmt::Debug for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MacAddress({self})")
    }
}

impl FromStr for MacAddress {
    type Err = LinkError;

    /// Accepts `00:80:19:aa:bb:cc`, `00-80-19-aa-bb-cc` or `008019aabbcc`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits: String = s.chars().filter(|&c| c != ':' && c != '-').collect();
        let mut octets = [0; 6];
        hex::decode_to_slice(&digits, &mut octets)
            .map_err(|_| LinkError::InvalidMac(s.to_string()))?;
        Ok(Self(octets))
    }
}

impl TryFrom<String> for MacAddress {
    type Error = LinkError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MacAddress> for String {
    fn from(value: MacAddress) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mac_parse_formats() {
        let expect = MacAddress([0x00, 0x80, 0x19, 0xAB, 0xCD, 0xEF]);
        assert_eq!("00:80:19:ab:cd:ef".parse::<MacAddress>(), Ok(expect));
        assert_eq!("00-80-19-AB-CD-EF".parse::<MacAddress>(), Ok(expect));
        assert_eq!("008019abcdef".parse::<MacAddress>(), Ok(expect));
        assert_eq!(expect.to_string(), "00:80:19:ab:cd:ef");
    }

    #[test]
    fn mac_parse_invalid() {
        assert!("00:80:19".parse::<MacAddress>().is_err());
        assert!("zz:80:19:ab:cd:ef".parse::<MacAddress>().is_err());
    }

    #[test]
    fn random_in_oui() {
        let mac = MacAddress::random_dayna();
        assert_eq!(mac.0[0..3], MacAddress::DAYNA_OUI);
        assert!(!mac.is_broadcast());
    }

    #[test]
    fn field16_bytes() {
        let f = Field16(0x05F4);
        assert_eq!(f.msb(), 0x05);
        assert_eq!(f.lsb(), 0xF4);
    }
}

//! Adapter configuration

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::types::MacAddress;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LinkConfig {
    /// SCSI ID the adapter answers on, [`LinkConfig::DISABLED_ID`] to disable
    pub scsi_id: u8,

    /// Adapter hardware address
    pub mac: MacAddress,

    /// Pause between the per-frame header and the destination address,
    /// in microseconds.
    ///
    /// The host driver parses the length while the rest of the frame is in
    /// flight. 100us is the lowest value observed to work on a Macintosh SE.
    pub header_settle_us: u64,

    /// Pause between the destination address and the frame payload, in
    /// microseconds. Below 150us an SE/30 intermittently stalls on AppleTalk.
    pub payload_settle_us: u64,

    /// Number of polls before a NIC readiness wait is considered hung
    pub ready_spin_limit: u32,
}

impl LinkConfig {
    pub const DISABLED_ID: u8 = 255;

    pub fn is_enabled(&self) -> bool {
        self.scsi_id != Self::DISABLED_ID
    }

    pub fn header_settle(&self) -> Duration {
        Duration::from_micros(self.header_settle_us)
    }

    pub fn payload_settle(&self) -> Duration {
        Duration::from_micros(self.payload_settle_us)
    }

    pub fn from_json(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Cannot open {}", path.display()))?;
        let config = serde_json::from_reader(std::io::BufReader::new(file))
            .with_context(|| format!("Cannot parse {}", path.display()))?;
        Ok(config)
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            scsi_id: 4,
            mac: MacAddress::random_dayna(),
            header_settle_us: 100,
            payload_settle_us: 175,
            ready_spin_limit: 100_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_uses_defaults() {
        let c = LinkConfig::from_json(r#"{ "scsi_id": 6, "mac": "00:80:19:01:02:03" }"#).unwrap();
        assert_eq!(c.scsi_id, 6);
        assert_eq!(c.mac, MacAddress([0x00, 0x80, 0x19, 0x01, 0x02, 0x03]));
        assert_eq!(c.header_settle(), Duration::from_micros(100));
        assert_eq!(c.payload_settle(), Duration::from_micros(175));
        assert!(c.is_enabled());
    }

    #[test]
    fn disabled_id() {
        let c = LinkConfig::from_json(r#"{ "scsi_id": 255 }"#).unwrap();
        assert!(!c.is_enabled());
    }

    #[test]
    fn bad_mac_rejected() {
        assert!(LinkConfig::from_json(r#"{ "mac": "nope" }"#).is_err());
    }

    #[test]
    fn json_roundtrip() {
        let c = LinkConfig::default();
        let s = serde_json::to_string(&c).unwrap();
        assert_eq!(LinkConfig::from_json(&s).unwrap(), c);
    }
}

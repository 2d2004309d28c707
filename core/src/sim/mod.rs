//! In-memory stand-ins for the SCSI PHY and the Ethernet controller
//!
//! Both record every call made on them so a session can be checked step by
//! step.

pub mod nic;
pub mod phy;

pub use nic::{NicEvent, SimNic};
pub use phy::{PhyEvent, SimPhy, SimTransaction};

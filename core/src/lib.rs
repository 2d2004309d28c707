//! DaynaPort-compatible SCSI/Link Ethernet adapter engine
//!
//! The engine sits between a SCSI target PHY and a discrete Ethernet
//! controller and speaks the DaynaPort host driver protocol. Both hardware
//! sides are reached through the [`link::phy::PhyBus`] and
//! [`link::nic::NicController`] traits; [`sim`] provides in-memory doubles.

pub mod config;
pub mod error;
pub mod link;
pub mod sim;
pub mod types;

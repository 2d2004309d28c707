//! DaynaPort SCSI/Link protocol engine

pub mod command;
pub mod engine;
pub mod filter;
pub mod nic;
pub mod phy;
pub mod queue;
mod transmit;
mod writer;

#[cfg(test)]
mod tests;

pub use engine::{Link, LinkStatus};

/// Logs every transaction and bus phase at debug level
const LINK_TRACE: bool = false;

pub const STATUS_GOOD: u8 = 0;
pub const STATUS_CHECK_CONDITION: u8 = 2;

pub const MSG_COMMAND_COMPLETE: u8 = 0x00;

/// Largest frame accepted from the host: 1500 bytes payload, two addresses
/// and the type field.
pub const MAX_SEND_LENGTH: u16 = 1514;

/// Largest frame delivered to the host, CRC included
pub const MAX_FRAME_LENGTH: u16 = 1518;

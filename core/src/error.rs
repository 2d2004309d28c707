use thiserror::Error;

/// Faults that abandon a transaction
#[derive(Error, Debug, PartialEq, Eq)]
pub enum LinkError {
    /// A bounded wait on controller readiness expired
    #[error("NIC not ready after {polls} polls ({what})")]
    HardwareTimeout { what: &'static str, polls: u32 },

    /// Command block shorter than its group length
    #[error("Command block for {opcode:02X} too short: {len} < {expected}")]
    ShortCommand {
        opcode: u8,
        len: usize,
        expected: usize,
    },

    /// Unparseable MAC address
    #[error("Invalid MAC address: {0}")]
    InvalidMac(String),
}

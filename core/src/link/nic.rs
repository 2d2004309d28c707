//! Ethernet controller as seen by the link engine
//!
//! Register names and the receive status vector follow the ENC28J60 family,
//! which has an on-chip packet buffer, a receive ring with a packet counter
//! and a pattern match filter.

use anyhow::Result;
use proc_bitfield::bitfield;

use crate::error::LinkError;

/// Controller registers the engine programs directly
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, strum::IntoStaticStr)]
#[repr(u8)]
pub enum NicReg {
    /// Pattern match mask, bytes 0-7 of the 64-byte window
    EPMM0 = 0x08,
    EPMM1 = 0x09,
    EPMM2 = 0x0A,
    EPMM3 = 0x0B,
    EPMM4 = 0x0C,
    EPMM5 = 0x0D,
    EPMM6 = 0x0E,
    EPMM7 = 0x0F,
    /// Pattern match checksum
    EPMCSL = 0x10,
    EPMCSH = 0x11,
    /// Pattern match window offset
    EPMOL = 0x14,
    EPMOH = 0x15,
    /// Receive filter control
    ERXFCON = 0x18,
}

impl NicReg {
    pub const EPMM: [Self; 8] = [
        Self::EPMM0,
        Self::EPMM1,
        Self::EPMM2,
        Self::EPMM3,
        Self::EPMM4,
        Self::EPMM5,
        Self::EPMM6,
        Self::EPMM7,
    ];
}

bitfield! {
    /// ERXFCON receive filter control
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct RxFilterControl(pub u8): Debug, FromStorage, IntoStorage, DerefStorage {
        pub broadcast: bool @ 0,
        pub multicast: bool @ 1,
        pub hash_table: bool @ 2,
        pub magic_packet: bool @ 3,
        pub pattern_match: bool @ 4,
        pub crc_check: bool @ 5,
        /// AND instead of OR of the enabled filters
        pub and_or: bool @ 6,
        pub unicast: bool @ 7,
    }
}

bitfield! {
    /// Upper word of the receive status vector
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    pub struct RxStatus(pub u16): Debug, FromStorage, IntoStorage, DerefStorage {
        pub long_event: bool @ 0,
        pub carrier_seen: bool @ 2,
        pub crc_error: bool @ 4,
        pub length_check_error: bool @ 5,
        pub length_out_of_range: bool @ 6,
        pub received_ok: bool @ 7,
        pub multicast: bool @ 8,
        pub broadcast: bool @ 9,
        pub dribble_nibble: bool @ 10,
        pub control_frame: bool @ 11,
        pub pause_frame: bool @ 12,
        pub unknown_opcode: bool @ 13,
        pub vlan: bool @ 14,
    }
}

/// Per-frame header the controller stores in front of every received frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxHeader {
    /// Ring address of the following frame
    pub next: u16,
    /// Received byte count, including the CRC
    pub byte_count: u16,
    pub status: RxStatus,
}

impl RxHeader {
    pub const LEN: usize = 6;

    pub fn parse(raw: &[u8; Self::LEN]) -> Self {
        Self {
            next: u16::from_le_bytes([raw[0], raw[1]]),
            byte_count: u16::from_le_bytes([raw[2], raw[3]]),
            status: RxStatus(u16::from_le_bytes([raw[4], raw[5]])),
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let [n0, n1] = self.next.to_le_bytes();
        let [c0, c1] = self.byte_count.to_le_bytes();
        let [s0, s1] = self.status.0.to_le_bytes();
        [n0, n1, c0, c1, s0, s1]
    }
}

/// One of the two transmit buffer regions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::IntoStaticStr)]
pub enum TxSlot {
    #[default]
    Primary,
    Secondary,
}

impl TxSlot {
    pub fn flipped(self) -> Self {
        match self {
            Self::Primary => Self::Secondary,
            Self::Secondary => Self::Primary,
        }
    }
}

/// Register-level Ethernet controller.
///
/// The buffer memory has a single read cursor and a single write cursor
/// and only one read or write sequence may be open at a time; a sequence
/// is opened with [`read_start`](Self::read_start) or
/// [`write_start`](Self::write_start) and closed with
/// [`data_end`](Self::data_end).
pub trait NicController {
    /// Toggles frame reception (ECON1.RXEN)
    fn set_rx_enabled(&mut self, enabled: bool) -> Result<()>;

    fn write_reg(&mut self, reg: NicReg, val: u8) -> Result<()>;

    /// Number of frames waiting in the receive ring (EPKTCNT)
    fn packet_count(&mut self) -> Result<u8>;

    /// Level of the interrupt line. Must not block.
    fn int_asserted(&mut self) -> bool;

    fn read_cursor(&mut self) -> Result<u16>;
    fn set_read_cursor(&mut self, ptr: u16) -> Result<()>;

    /// Opens a read sequence at the read cursor
    fn read_start(&mut self) -> Result<()>;

    /// Reads from buffer memory, advancing the read cursor and wrapping
    /// within the receive ring
    fn read(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Closes the open read or write sequence
    fn data_end(&mut self) -> Result<()>;

    /// Hands the ring up to `next` back to the controller; the read cursor
    /// follows
    fn advance_rx(&mut self, next: u16) -> Result<()>;

    /// Decrements the packet counter (ECON2.PKTDEC)
    fn decrement_packets(&mut self) -> Result<()>;

    /// Opens a write sequence at the start of a transmit slot
    fn write_start(&mut self, slot: TxSlot) -> Result<()>;

    /// Whether the data register can take the next byte
    fn write_ready(&mut self) -> bool;

    fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Whether the last written byte has been shifted out
    fn write_complete(&mut self) -> bool;

    /// Transmits `len` bytes (control byte included) from a slot
    fn transmit(&mut self, slot: TxSlot, len: u16) -> Result<()>;
}

/// Polls `ready` until it holds, at most `limit` times but at least once
pub fn await_ready(
    limit: u32,
    what: &'static str,
    mut ready: impl FnMut() -> bool,
) -> Result<(), LinkError> {
    let limit = limit.max(1);
    for _ in 0..limit {
        if ready() {
            return Ok(());
        }
        std::hint::spin_loop();
    }
    log::error!("NIC wait for {} gave up after {} polls", what, limit);
    Err(LinkError::HardwareTimeout { what, polls: limit })
}

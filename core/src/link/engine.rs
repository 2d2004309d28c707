//! Link engine state and command dispatch

use std::fmt;

use anyhow::Result;
use log::*;

use crate::config::LinkConfig;
use crate::link::command::{CommandBlock, Opcode};
use crate::link::filter::FilterState;
use crate::link::nic::{NicController, TxSlot};
use crate::link::phy::{BusPhase, PhyBus};
use crate::link::queue::QueuedFrame;
use crate::link::{LINK_TRACE, MSG_COMMAND_COMPLETE, STATUS_GOOD};
use crate::types::MacAddress;

const fn put<const N: usize>(mut data: [u8; N], at: usize, s: &[u8]) -> [u8; N] {
    let mut i = 0;
    while i < s.len() {
        data[at + i] = s[i];
        i += 1;
    }
    data
}

const fn inquiry_data() -> [u8; 255] {
    let mut d = [0; 255];
    // Processor device, SCSI-1, additional length
    d[0] = 0x03;
    d[2] = 0x01;
    d[4] = 0x1E;
    d = put(d, 8, b"Dayna   ");
    d = put(d, 16, b"SCSI/Link       ");
    d = put(d, 32, b"1.4a");
    // Vendor area as returned by the original hardware
    d = put(d, 153, &[0x80, 0x80, 0xBA, 0x00, 0x00, 0xC0]);
    d[215] = 0x81;
    d
}

/// INQUIRY response; the host gets as much of it as it allocates
pub const INQUIRY_DATA: [u8; 255] = inquiry_data();

/// REQUEST SENSE response: current error, no sense
pub const REQUEST_SENSE_DATA: [u8; 9] = [0x70, 0, 0, 0, 0, 0, 0, 0, 0];

/// Length of the RETRIEVE STATISTICS response: MAC address and three
/// 16-bit counters
pub const STATISTICS_LEN: usize = 18;

/// Traffic counters. These are for the emulator side only; the host
/// always reads zero counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStatus {
    /// Frames delivered to the host
    pub rx_frames: u64,
    pub rx_bytes: u64,
    /// Frames the software filter dropped
    pub rx_discarded: u64,
    /// Frames handed to the controller for transmission
    pub tx_frames: u64,
    pub tx_bytes: u64,
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SCSI/Link (rx:{} tx:{} filtered:{})",
            self.rx_frames, self.tx_frames, self.rx_discarded
        )
    }
}

/// DaynaPort-compatible SCSI/Link adapter.
///
/// Owns both bus sides; all state that survives a transaction lives here.
pub struct Link<P: PhyBus, N: NicController> {
    pub(super) phy: P,
    pub(super) nic: N,
    pub(super) config: LinkConfig,

    pub(super) filter: FilterState,

    /// Frame found by the lookahead but not yet delivered
    pub(super) queued: Option<QueuedFrame>,

    /// Transmit slot for the next outbound frame
    pub(super) txslot: TxSlot,

    /// Last non-zero identify message
    last_identify: u8,

    pub(super) stats: LinkStatus,
}

impl<P: PhyBus, N: NicController> Link<P, N> {
    pub fn new(config: LinkConfig, phy: P, nic: N) -> Self {
        Self {
            phy,
            nic,
            config,
            filter: FilterState::default(),
            queued: None,
            txslot: TxSlot::default(),
            last_identify: 0,
            stats: LinkStatus::default(),
        }
    }

    /// Programs the controller's receive filter for the power-up state
    pub fn init(&mut self) -> Result<()> {
        debug!(
            "SCSI/Link at ID {}, MAC {}",
            self.config.scsi_id, self.config.mac
        );
        self.apply_filter()
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn mac(&self) -> MacAddress {
        self.config.mac
    }

    pub fn filter(&self) -> FilterState {
        self.filter
    }

    pub fn queued(&self) -> Option<&QueuedFrame> {
        self.queued.as_ref()
    }

    pub fn tx_slot(&self) -> TxSlot {
        self.txslot
    }

    pub fn last_identify(&self) -> u8 {
        self.last_identify
    }

    pub fn status(&self) -> LinkStatus {
        self.stats
    }

    pub fn phy(&self) -> &P {
        &self.phy
    }

    pub fn phy_mut(&mut self) -> &mut P {
        &mut self.phy
    }

    pub fn nic(&self) -> &N {
        &self.nic
    }

    pub fn nic_mut(&mut self) -> &mut N {
        &mut self.nic
    }

    /// Services one transaction if an initiator is selecting the adapter.
    ///
    /// Never blocks waiting for a selection. Returns whether a transaction
    /// was serviced. The bus is released even when the transaction faults.
    pub fn run_cycle(&mut self) -> Result<bool> {
        if !self.config.is_enabled() || !self.phy.ready() {
            return Ok(false);
        }

        self.phy.start()?;
        let result = self.transaction();
        let released = self.phy.done();
        let serviced = result?;
        released?;
        Ok(serviced)
    }

    fn transaction(&mut self) -> Result<bool> {
        let Some(cdb) = self.phy.command()? else {
            return Ok(false);
        };

        let identify = self.phy.identify();
        if identify != 0 {
            self.last_identify = identify;
        }

        match cdb.opcode() {
            Some(op) => {
                if LINK_TRACE || op != Opcode::ReadPacket {
                    debug!("{} {:02X?}", op.name(), cdb.as_bytes());
                }
                self.dispatch(op, &cdb)?;
            }
            None => {
                warn!("Illegal opcode {:02X?}", cdb.as_bytes());
                self.phy.illegal_op(cdb.opcode_byte())?;
            }
        }
        Ok(true)
    }

    fn dispatch(&mut self, op: Opcode, cdb: &CommandBlock) -> Result<()> {
        match op {
            Opcode::TestUnitReady
            | Opcode::Nuvolink02
            | Opcode::Nuvolink06
            | Opcode::ReceiveDiagnostic
            | Opcode::SendDiagnostic
            | Opcode::Nuvolink80 => self.complete(),
            Opcode::EnableInterface => {
                debug!("Interface enable: {}", cdb.byte(5) & 0x80 != 0);
                self.complete()
            }
            Opcode::SetMacAddress => {
                // The driver has no way to make this stick, so neither do we
                debug!("Ignoring MAC address change");
                self.complete()
            }
            Opcode::RequestSense => self.data_in(&REQUEST_SENSE_DATA),
            Opcode::RetrieveStatistics => {
                let mut result = [0; STATISTICS_LEN];
                result[0..6].copy_from_slice(self.config.mac.octets());
                self.data_in(&result)
            }
            Opcode::Inquiry => self.data_in(&INQUIRY_DATA[..cdb.inquiry_alloc()]),
            Opcode::SendPacket => self.send_packet(cdb),
            Opcode::SetPacketFilter => self.set_packet_filter(cdb),
            Opcode::ReadPacket => self.read_packet(cdb),
        }
    }

    /// Sends a fixed response and closes the transaction
    fn data_in(&mut self, data: &[u8]) -> Result<()> {
        self.phy.phase(BusPhase::DataIn)?;
        self.phy.offer_all(data)?;
        self.finish_data_in()
    }

    /// Services a pending ATN, then closes the transaction
    pub(super) fn finish_data_in(&mut self) -> Result<()> {
        if self.phy.atn_asserted() {
            self.phy.message_out()?;
        }
        self.complete()
    }

    /// GOOD status followed by COMMAND COMPLETE
    pub(super) fn complete(&mut self) -> Result<()> {
        self.phy.status(STATUS_GOOD)?;
        self.phy.message_in(MSG_COMMAND_COMPLETE)
    }

    /// Closes the open buffer sequence after `fault`, which is passed on
    pub(super) fn abort_sequence(&mut self, fault: anyhow::Error) -> anyhow::Error {
        if let Err(e) = self.nic.data_end() {
            error!("Cannot end buffer sequence after fault: {:#}", e);
        }
        fault
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inquiry_layout() {
        assert_eq!(&INQUIRY_DATA[0..5], &[0x03, 0x00, 0x01, 0x00, 0x1E]);
        assert_eq!(&INQUIRY_DATA[8..16], b"Dayna   ");
        assert_eq!(&INQUIRY_DATA[16..32], b"SCSI/Link       ");
        assert_eq!(&INQUIRY_DATA[32..36], b"1.4a");
        assert_eq!(INQUIRY_DATA[153..156], [0x80, 0x80, 0xBA]);
        assert_eq!(INQUIRY_DATA[158], 0xC0);
        assert_eq!(INQUIRY_DATA[215], 0x81);
        assert_eq!(INQUIRY_DATA.iter().filter(|&&b| b != 0).count(), 3 + 8 + 16 + 4 + 5);
    }

    #[test]
    fn status_display() {
        let s = LinkStatus {
            rx_frames: 3,
            tx_frames: 2,
            rx_discarded: 1,
            ..Default::default()
        };
        assert_eq!(s.to_string(), "SCSI/Link (rx:3 tx:2 filtered:1)");
    }
}

//! SEND PACKET: frames from the host to the network
//!
//! Two wire formats are defined by the driver:
//! - `0x00`: LLLL bytes of raw frame image
//! - `0x80`: LLLL + 8 bytes, `PP PP 00 00 <frame> 00 00 00 00` where PPPP is
//!   the frame length again, big-endian

use anyhow::Result;
use log::*;

use crate::link::command::CommandBlock;
use crate::link::nic::{NicController, await_ready};
use crate::link::phy::{BusPhase, PhyBus};
use crate::link::{LINK_TRACE, Link, MAX_SEND_LENGTH};

pub const SEND_FORMAT_RAW: u8 = 0x00;
pub const SEND_FORMAT_FRAMED: u8 = 0x80;

/// Bytes around the frame in the framed format, on each side
const FRAMING_LEN: usize = 4;

/// Per-packet control byte the controller expects in front of the frame;
/// zero selects the MACON3 defaults
const PER_PACKET_CONTROL: u8 = 0x00;

const STREAM_CHUNK: usize = 64;

impl<P: PhyBus, N: NicController> Link<P, N> {
    /// SEND PACKET (0x0A)
    pub(super) fn send_packet(&mut self, cdb: &CommandBlock) -> Result<()> {
        let length = cdb.length().min(MAX_SEND_LENGTH);
        let format = cdb.send_format();
        if format != SEND_FORMAT_RAW && format != SEND_FORMAT_FRAMED {
            warn!("SEND PACKET with unknown format {:02X}, ignored", format);
            return self.complete();
        }

        let slot = self.txslot;

        self.nic.write_start(slot)?;
        self.fill_slot(format, length)
            .map_err(|e| self.abort_sequence(e))?;
        self.nic.data_end()?;
        self.nic.transmit(slot, length + 1)?;

        // The controller may still be sending from this slot
        self.txslot = slot.flipped();

        trace!("Sent {} byte frame from {:?} slot", length, slot);
        self.stats.tx_frames += 1;
        self.stats.tx_bytes += u64::from(length);
        self.complete()
    }

    /// Moves the frame from the host into the open transmit slot
    fn fill_slot(&mut self, format: u8, length: u16) -> Result<()> {
        let limit = self.config.ready_spin_limit;
        self.phy.phase(BusPhase::DataOut)?;

        let nic = &mut self.nic;
        await_ready(limit, "write ready", || nic.write_ready())?;
        self.nic.write(&[PER_PACKET_CONTROL])?;

        if format == SEND_FORMAT_FRAMED {
            let mut prefix = [0; FRAMING_LEN];
            self.phy.ask_into(&mut prefix)?;
            if LINK_TRACE {
                debug!(
                    "Framed send, inner length {}",
                    u16::from_be_bytes([prefix[0], prefix[1]])
                );
            }
        }
        self.stream_to_nic(usize::from(length))?;
        if format == SEND_FORMAT_FRAMED {
            let mut trailer = [0; FRAMING_LEN];
            self.phy.ask_into(&mut trailer)?;
        }

        let nic = &mut self.nic;
        await_ready(limit, "write complete", || nic.write_complete())?;
        Ok(())
    }

    fn stream_to_nic(&mut self, mut remaining: usize) -> Result<()> {
        let mut chunk = [0; STREAM_CHUNK];
        while remaining > 0 {
            let n = remaining.min(STREAM_CHUNK);
            self.phy.ask_into(&mut chunk[..n])?;
            self.nic.write(&chunk[..n])?;
            remaining -= n;
        }
        Ok(())
    }
}

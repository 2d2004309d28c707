//! READ PACKET: frames from the network to the host
//!
//! The driver announces how many bytes it is prepared to take (normally
//! 1524). As many queued frames as fit are packed back to back into one
//! DATA IN phase, each behind its own [`FrameHeader`].

use anyhow::Result;
use log::*;

use crate::link::command::CommandBlock;
use crate::link::nic::NicController;
use crate::link::phy::{BusPhase, PhyBus};
use crate::link::queue::{FrameHeader, QueuedFrame};
use crate::link::{LINK_TRACE, Link};

/// Buffer memory is moved to the bus in chunks of this size
const STREAM_CHUNK: usize = 64;

/// Transfer length the driver uses to poll without taking data
const POLL_ONLY: u16 = 1;

impl<P: PhyBus, N: NicController> Link<P, N> {
    /// READ PACKET (0x08)
    pub(super) fn read_packet(&mut self, cdb: &CommandBlock) -> Result<()> {
        let budget = usize::from(cdb.length());
        if cdb.length() == POLL_ONLY {
            return self.complete();
        }

        self.phy.phase(BusPhase::DataIn)?;

        if self.queued.is_none() && !self.nic.int_asserted() {
            self.phy.offer_all(&FrameHeader::NO_PACKET.0)?;
            return self.finish_data_in();
        }

        let mut sent = 0;
        loop {
            self.queue_packet()?;
            // Driver compatibility depends on this exact bound
            let Some(frame) = self
                .queued
                .filter(|f| sent + usize::from(f.length) + FrameHeader::LEN <= budget)
            else {
                if sent == 0 {
                    let mut header = FrameHeader::NO_PACKET;
                    if self.nic.int_asserted() {
                        header.set_more_pending();
                    }
                    self.phy.offer_all(&header.0)?;
                }
                break;
            };

            self.deliver(&frame)?;
            sent += usize::from(frame.length) + FrameHeader::LEN;
        }

        if LINK_TRACE {
            debug!("READ PACKET: {} of {} bytes", sent, budget);
        }
        self.finish_data_in()
    }

    /// Streams one queued frame to the host and releases it from the ring
    fn deliver(&mut self, frame: &QueuedFrame) -> Result<()> {
        let mut header = frame.header();
        if self.nic.int_asserted() {
            header.set_more_pending();
        }

        self.phy.offer_all(&header.0)?;
        self.phy.settle(self.config.header_settle());

        // The destination was already read out of the ring by the filter
        self.phy.offer_all(frame.destination.octets())?;
        self.phy.settle(self.config.payload_settle());

        self.nic.set_read_cursor(frame.resume)?;
        self.nic.read_start()?;
        let payload = usize::from(frame.length).saturating_sub(frame.destination.octets().len());
        self.stream_to_host(payload)
            .map_err(|e| self.abort_sequence(e))?;
        self.nic.data_end()?;

        self.release_frame(frame.next)?;
        self.queued = None;

        self.stats.rx_frames += 1;
        self.stats.rx_bytes += u64::from(frame.length);
        Ok(())
    }

    fn stream_to_host(&mut self, mut remaining: usize) -> Result<()> {
        let mut chunk = [0; STREAM_CHUNK];
        while remaining > 0 {
            let n = remaining.min(STREAM_CHUNK);
            self.nic.read(&mut chunk[..n])?;
            self.phy.offer_all(&chunk[..n])?;
            remaining -= n;
        }
        Ok(())
    }
}

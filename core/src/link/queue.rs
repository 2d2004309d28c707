//! One-frame lookahead over the controller's receive ring

use anyhow::Result;
use log::*;

use crate::link::nic::{NicController, RxHeader};
use crate::link::phy::PhyBus;
use crate::link::{Link, MAX_FRAME_LENGTH};
use crate::types::{Field16, MacAddress};

/// Per-frame record sent to the host ahead of every frame in a READ PACKET
/// data phase.
///
/// Bytes 0-1 hold the frame length big-endian, bytes 2-5 are zero except
/// for the more-pending flag in byte 5.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameHeader(pub [u8; Self::LEN]);

impl FrameHeader {
    pub const LEN: usize = 6;

    /// Sent when there is nothing to deliver
    pub const NO_PACKET: Self = Self([0; Self::LEN]);

    /// Byte 5 flag telling the driver another frame is waiting
    pub const MORE_PENDING: u8 = 0x10;

    pub fn with_length(length: u16) -> Self {
        let f = Field16(length);
        Self([f.msb(), f.lsb(), 0, 0, 0, 0])
    }

    pub fn length(&self) -> u16 {
        u16::from_be_bytes([self.0[0], self.0[1]])
    }

    pub fn more_pending(&self) -> bool {
        self.0[5] & Self::MORE_PENDING != 0
    }

    pub fn set_more_pending(&mut self) {
        self.0[5] |= Self::MORE_PENDING;
    }
}

/// A frame that passed the filter and is waiting in the ring for delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuedFrame {
    /// Frame length including CRC, capped to [`MAX_FRAME_LENGTH`]
    pub length: u16,
    pub destination: MacAddress,
    /// Read cursor just past the destination address
    pub resume: u16,
    /// Ring address of the following frame
    pub next: u16,
}

impl QueuedFrame {
    pub fn header(&self) -> FrameHeader {
        FrameHeader::with_length(self.length)
    }
}

impl<P: PhyBus, N: NicController> Link<P, N> {
    /// Scans the receive ring for the next frame the filter accepts and
    /// queues it. Rejected frames are released back to the controller.
    ///
    /// Returns whether a frame is queued. Nothing is scanned while a frame
    /// is already queued.
    pub fn queue_packet(&mut self) -> Result<bool> {
        if self.queued.is_some() {
            return Ok(true);
        }

        // Reading a frame header puts the controller in buffer read mode,
        // after which the packet counter can no longer be read reliably.
        let pending = self.nic.packet_count()?;

        for _ in 0..pending {
            self.nic.read_start()?;
            let (raw, dest) = self.read_frame_head().map_err(|e| self.abort_sequence(e))?;
            self.nic.data_end()?;
            let resume = self.nic.read_cursor()?;

            let header = RxHeader::parse(&raw);
            let dest = MacAddress(dest);

            if self.filter.accepts(&self.config.mac, &dest) {
                let frame = QueuedFrame {
                    length: header.byte_count.min(MAX_FRAME_LENGTH),
                    destination: dest,
                    resume,
                    next: header.next,
                };
                trace!("Queued {} byte frame to {}", frame.length, dest);
                self.queued = Some(frame);
                return Ok(true);
            }

            trace!("Discarding frame to {}", dest);
            self.stats.rx_discarded += 1;
            self.release_frame(header.next)?;
        }
        Ok(false)
    }

    /// Receive status vector and destination address of the frame at the
    /// read cursor
    fn read_frame_head(&mut self) -> Result<([u8; RxHeader::LEN], [u8; 6])> {
        let mut raw = [0; RxHeader::LEN];
        let mut dest = [0; 6];
        self.nic.read(&mut raw)?;
        self.nic.read(&mut dest)?;
        Ok((raw, dest))
    }

    /// Frees a frame in the ring and moves the read cursor to `next`
    pub(super) fn release_frame(&mut self, next: u16) -> Result<()> {
        self.nic.advance_rx(next)?;
        self.nic.decrement_packets()
    }
}

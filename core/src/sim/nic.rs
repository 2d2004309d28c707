use std::collections::HashMap;

use anyhow::{Result, bail};
use crc::{CRC_32_ISO_HDLC, Crc};
use crossbeam_channel::{Receiver, Sender};
use log::*;

use crate::link::nic::{NicController, NicReg, RxHeader, RxStatus, TxSlot};
use crate::types::{MacAddress, Packet};

/// Ethernet frame check sequence
const FCS: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);
const FCS_LEN: usize = 4;

pub const BUFFER_SIZE: usize = 0x2000;
pub const RX_START: u16 = 0x0000;
pub const RX_END: u16 = 0x0FFF;
const RX_SIZE: usize = (RX_END - RX_START) as usize + 1;
pub const TX_PRIMARY: u16 = 0x1000;
pub const TX_SECONDARY: u16 = 0x1800;
const TX_SLOT_SIZE: u16 = 0x0800;

/// Something the engine did to the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NicEvent {
    RxEnable(bool),
    WriteReg(NicReg, u8),
    AdvanceRx(u16),
    DecrementPackets,
    Transmit(TxSlot, u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sequence {
    Idle,
    Read,
    Write,
}

/// Ethernet controller with an 8 KiB packet buffer.
///
/// Received frames are stored the way the hardware stores them: receive
/// status vector, frame, CRC, padded to an even address. The hardware
/// address filter is not modelled; everything received while reception is
/// enabled lands in the ring. The interrupt line follows the packet
/// counter.
pub struct SimNic {
    mem: Vec<u8>,
    regs: HashMap<NicReg, u8>,
    rx_enabled: bool,

    /// Ring read pointer (ERXRDPT), start of the oldest unreleased frame
    rx_read: u16,
    /// Where the next received frame is stored
    rx_write: u16,
    /// Buffer read cursor (ERDPT)
    read_ptr: u16,
    /// Buffer write cursor (EWRPT)
    write_ptr: u16,
    write_limit: u16,
    packets: u8,
    sequence: Sequence,

    trace: Vec<NicEvent>,
    transmitted: Vec<(TxSlot, Packet)>,
    dropped: usize,

    source: Option<Receiver<Packet>>,
    sink: Option<Sender<Packet>>,

    /// Makes the data register never become ready
    pub stall: bool,
}

impl SimNic {
    pub fn new() -> Self {
        Self {
            mem: vec![0; BUFFER_SIZE],
            regs: HashMap::new(),
            rx_enabled: true,
            rx_read: RX_START,
            rx_write: RX_START,
            read_ptr: RX_START,
            write_ptr: TX_PRIMARY,
            write_limit: TX_PRIMARY,
            packets: 0,
            sequence: Sequence::Idle,
            trace: vec![],
            transmitted: vec![],
            dropped: 0,
            source: None,
            sink: None,
            stall: false,
        }
    }

    /// Frames arriving on `source` are received, transmitted frames go to
    /// `sink`
    pub fn connect(&mut self, source: Receiver<Packet>, sink: Sender<Packet>) {
        self.source = Some(source);
        self.sink = Some(sink);
    }

    pub fn trace(&self) -> &[NicEvent] {
        &self.trace
    }

    pub fn take_trace(&mut self) -> Vec<NicEvent> {
        std::mem::take(&mut self.trace)
    }

    /// Frames sent, control byte stripped
    pub fn transmitted(&self) -> &[(TxSlot, Packet)] {
        &self.transmitted
    }

    pub fn take_transmitted(&mut self) -> Vec<(TxSlot, Packet)> {
        std::mem::take(&mut self.transmitted)
    }

    pub fn reg(&self, reg: NicReg) -> Option<u8> {
        self.regs.get(&reg).copied()
    }

    pub fn rx_enabled(&self) -> bool {
        self.rx_enabled
    }

    pub fn packets(&self) -> u8 {
        self.packets
    }

    /// Start of the oldest frame still owned by the host side
    pub fn rx_read_pointer(&self) -> u16 {
        self.rx_read
    }

    /// Frames lost to a full ring or disabled reception
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    fn slot_base(slot: TxSlot) -> u16 {
        match slot {
            TxSlot::Primary => TX_PRIMARY,
            TxSlot::Secondary => TX_SECONDARY,
        }
    }

    fn rx_wrap(addr: usize) -> u16 {
        (RX_START as usize + (addr - RX_START as usize) % RX_SIZE) as u16
    }

    fn rx_free(&self) -> usize {
        if self.packets == 0 {
            RX_SIZE
        } else {
            (usize::from(self.rx_read) + RX_SIZE - usize::from(self.rx_write)) % RX_SIZE
        }
    }

    fn poke_rx(&mut self, at: u16, data: &[u8]) -> u16 {
        let mut addr = at;
        for &b in data {
            self.mem[usize::from(addr)] = b;
            addr = Self::rx_wrap(usize::from(addr) + 1);
        }
        addr
    }

    /// Receives a frame from the wire (destination address first, no CRC).
    ///
    /// Returns the ring address of the frame that will follow it, or None
    /// if the frame was dropped.
    pub fn inject(&mut self, frame: &[u8]) -> Option<u16> {
        let Some(&dest) = frame.first_chunk::<6>() else {
            warn!("Runt frame of {} bytes ignored", frame.len());
            self.dropped += 1;
            return None;
        };
        if !self.rx_enabled {
            trace!("Reception disabled, dropping frame");
            self.dropped += 1;
            return None;
        }

        let byte_count = frame.len() + FCS_LEN;
        let stored = (RxHeader::LEN + byte_count + 1) & !1;
        if self.packets == u8::MAX || stored >= self.rx_free() {
            warn!("Receive ring overrun, dropping {} byte frame", frame.len());
            self.dropped += 1;
            return None;
        }

        let start = self.rx_write;
        let next = Self::rx_wrap(usize::from(start) + stored);
        let dest = MacAddress(dest);
        let header = RxHeader {
            next,
            byte_count: byte_count as u16,
            status: RxStatus::default()
                .with_received_ok(true)
                .with_broadcast(dest.is_broadcast())
                .with_multicast(dest.0[0] & 1 != 0 && !dest.is_broadcast()),
        };

        let at = self.poke_rx(start, &header.to_bytes());
        let at = self.poke_rx(at, frame);
        self.poke_rx(at, &FCS.checksum(frame).to_le_bytes());

        self.rx_write = next;
        self.packets += 1;
        Some(next)
    }

    /// Receives everything waiting on the source channel
    fn pump(&mut self) {
        let Some(source) = self.source.take() else {
            return;
        };
        while let Ok(frame) = source.try_recv() {
            self.inject(&frame);
        }
        self.source = Some(source);
    }

    fn require(&self, sequence: Sequence) -> Result<()> {
        if self.sequence != sequence {
            bail!(
                "Buffer access in {:?} sequence, expected {:?}",
                self.sequence,
                sequence
            );
        }
        Ok(())
    }
}

impl Default for SimNic {
    fn default() -> Self {
        Self::new()
    }
}

impl NicController for SimNic {
    fn set_rx_enabled(&mut self, enabled: bool) -> Result<()> {
        self.trace.push(NicEvent::RxEnable(enabled));
        self.rx_enabled = enabled;
        Ok(())
    }

    fn write_reg(&mut self, reg: NicReg, val: u8) -> Result<()> {
        trace!("{} <- {:02X}", <&str>::from(reg), val);
        self.trace.push(NicEvent::WriteReg(reg, val));
        self.regs.insert(reg, val);
        Ok(())
    }

    fn packet_count(&mut self) -> Result<u8> {
        self.require(Sequence::Idle)?;
        self.pump();
        Ok(self.packets)
    }

    fn int_asserted(&mut self) -> bool {
        self.pump();
        self.packets > 0
    }

    fn read_cursor(&mut self) -> Result<u16> {
        Ok(self.read_ptr)
    }

    fn set_read_cursor(&mut self, ptr: u16) -> Result<()> {
        self.require(Sequence::Idle)?;
        self.read_ptr = ptr;
        Ok(())
    }

    fn read_start(&mut self) -> Result<()> {
        self.require(Sequence::Idle)?;
        self.sequence = Sequence::Read;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<()> {
        self.require(Sequence::Read)?;
        for b in buf {
            *b = self.mem[usize::from(self.read_ptr)];
            self.read_ptr = if self.read_ptr <= RX_END {
                Self::rx_wrap(usize::from(self.read_ptr) + 1)
            } else {
                self.read_ptr.wrapping_add(1) % BUFFER_SIZE as u16
            };
        }
        Ok(())
    }

    fn data_end(&mut self) -> Result<()> {
        self.sequence = Sequence::Idle;
        Ok(())
    }

    fn advance_rx(&mut self, next: u16) -> Result<()> {
        self.require(Sequence::Idle)?;
        self.trace.push(NicEvent::AdvanceRx(next));
        self.rx_read = next;
        self.read_ptr = next;
        Ok(())
    }

    fn decrement_packets(&mut self) -> Result<()> {
        self.trace.push(NicEvent::DecrementPackets);
        if self.packets == 0 {
            bail!("Packet counter decremented below zero");
        }
        self.packets -= 1;
        Ok(())
    }

    fn write_start(&mut self, slot: TxSlot) -> Result<()> {
        self.require(Sequence::Idle)?;
        self.sequence = Sequence::Write;
        self.write_ptr = Self::slot_base(slot);
        self.write_limit = self.write_ptr + TX_SLOT_SIZE;
        Ok(())
    }

    fn write_ready(&mut self) -> bool {
        !self.stall
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.require(Sequence::Write)?;
        if usize::from(self.write_ptr) + data.len() > usize::from(self.write_limit) {
            bail!("Transmit slot overflow at {:04X}", self.write_ptr);
        }
        let at = usize::from(self.write_ptr);
        self.mem[at..at + data.len()].copy_from_slice(data);
        self.write_ptr += data.len() as u16;
        Ok(())
    }

    fn write_complete(&mut self) -> bool {
        !self.stall
    }

    fn transmit(&mut self, slot: TxSlot, len: u16) -> Result<()> {
        self.require(Sequence::Idle)?;
        if len == 0 || len > TX_SLOT_SIZE {
            bail!("Invalid transmit length {}", len);
        }
        self.trace.push(NicEvent::Transmit(slot, len));

        let base = usize::from(Self::slot_base(slot));
        // First byte is the per-packet control byte
        let frame = self.mem[base + 1..base + usize::from(len)].to_vec();
        if let Some(sink) = &self.sink {
            if sink.send(frame.clone()).is_err() {
                warn!("Transmit sink closed, frame dropped");
            }
        }
        self.transmitted.push((slot, frame));
        Ok(())
    }
}

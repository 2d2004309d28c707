//! SCSI target PHY as seen by the link engine

use std::time::Duration;

use anyhow::Result;

use crate::link::command::CommandBlock;

/// Information transfer phases driven by the target
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::IntoStaticStr)]
pub enum BusPhase {
    Command,
    /// Target -> Initiator
    DataIn,
    /// Initiator -> Target
    DataOut,
    Status,
    MessageIn,
    MessageOut,
}

/// Target side of the SCSI bus.
///
/// All byte transfers complete the REQ/ACK handshake before returning.
pub trait PhyBus {
    /// Whether an initiator is selecting the adapter. Must not block.
    fn ready(&mut self) -> bool;

    /// Takes the bus for a new transaction
    fn start(&mut self) -> Result<()>;

    /// Runs the COMMAND phase. None if the initiator dropped the selection.
    fn command(&mut self) -> Result<Option<CommandBlock>>;

    /// Identify message that came with the selection, 0 if none
    fn identify(&mut self) -> u8;

    fn phase(&mut self, phase: BusPhase) -> Result<()>;

    /// Sends one byte to the initiator
    fn offer(&mut self, byte: u8) -> Result<()>;

    /// Receives one byte from the initiator
    fn ask(&mut self) -> Result<u8>;

    fn offer_all(&mut self, data: &[u8]) -> Result<()> {
        for &b in data {
            self.offer(b)?;
        }
        Ok(())
    }

    fn ask_into(&mut self, buf: &mut [u8]) -> Result<()> {
        for b in buf {
            *b = self.ask()?;
        }
        Ok(())
    }

    /// Level of the ATN signal. Must not block.
    fn atn_asserted(&mut self) -> bool;

    /// Services a MESSAGE OUT phase requested through ATN
    fn message_out(&mut self) -> Result<()>;

    fn status(&mut self, status: u8) -> Result<()>;

    fn message_in(&mut self, message: u8) -> Result<()>;

    /// Reports an unsupported opcode (CHECK CONDITION, ILLEGAL REQUEST)
    fn illegal_op(&mut self, opcode: u8) -> Result<()>;

    /// Releases the bus
    fn done(&mut self) -> Result<()>;

    /// Holds the bus idle for a fixed time
    fn settle(&mut self, delay: Duration);
}

use std::collections::VecDeque;
use std::time::Duration;

use anyhow::{Result, bail};

use crate::link::command::CommandBlock;
use crate::link::phy::{BusPhase, PhyBus};
use crate::link::{MSG_COMMAND_COMPLETE, STATUS_CHECK_CONDITION};

/// Something the target did on the bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhyEvent {
    Start,
    Command(Vec<u8>),
    Phase(BusPhase),
    /// Run of bytes sent to the initiator
    DataIn(Vec<u8>),
    /// Run of bytes taken from the initiator
    DataOut(Vec<u8>),
    Settle(Duration),
    MessageOut,
    Status(u8),
    MessageIn(u8),
    IllegalOp(u8),
    Done,
}

/// One scripted initiator transaction
#[derive(Debug, Clone, Default)]
pub struct SimTransaction {
    pub cdb: Vec<u8>,
    pub data_out: VecDeque<u8>,
    /// ATN raised during the transaction
    pub atn: bool,
    pub identify: u8,
    /// Initiator stops taking DATA IN after this many bytes
    pub data_in_limit: Option<usize>,
}

impl SimTransaction {
    pub fn new(cdb: &[u8]) -> Self {
        Self {
            cdb: cdb.to_vec(),
            identify: 0xC0,
            ..Default::default()
        }
    }

    pub fn with_data_out(mut self, data: &[u8]) -> Self {
        self.data_out.extend(data);
        self
    }

    pub fn with_data_in_limit(mut self, limit: usize) -> Self {
        self.data_in_limit = Some(limit);
        self
    }

    pub fn with_atn(mut self) -> Self {
        self.atn = true;
        self
    }
}

/// Scripted initiator
#[derive(Debug, Default)]
pub struct SimPhy {
    pending: VecDeque<SimTransaction>,
    current: Option<SimTransaction>,
    phase: Option<BusPhase>,
    /// DATA IN bytes taken in the current transaction
    data_in_taken: usize,
    trace: Vec<PhyEvent>,
}

impl SimPhy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a transaction; the adapter is selected once per transaction
    pub fn submit(&mut self, transaction: SimTransaction) {
        self.pending.push_back(transaction);
    }

    pub fn trace(&self) -> &[PhyEvent] {
        &self.trace
    }

    pub fn take_trace(&mut self) -> Vec<PhyEvent> {
        std::mem::take(&mut self.trace)
    }

    /// Everything sent to the initiator, concatenated
    pub fn data_in(&self) -> Vec<u8> {
        self.trace
            .iter()
            .filter_map(|e| match e {
                PhyEvent::DataIn(d) => Some(d.as_slice()),
                _ => None,
            })
            .flatten()
            .copied()
            .collect()
    }

    /// Last status byte reported
    pub fn last_status(&self) -> Option<u8> {
        self.trace.iter().rev().find_map(|e| match e {
            PhyEvent::Status(s) => Some(*s),
            _ => None,
        })
    }

    /// Whether a COMMAND COMPLETE message was sent
    pub fn completed(&self) -> bool {
        self.trace
            .contains(&PhyEvent::MessageIn(MSG_COMMAND_COMPLETE))
    }

    /// Bytes the current or last transaction still had to send
    pub fn data_out_left(&self) -> usize {
        self.current.as_ref().map_or(0, |t| t.data_out.len())
    }

    fn current(&mut self) -> Result<&mut SimTransaction> {
        let Some(t) = self.current.as_mut() else {
            bail!("Bus access outside of a transaction");
        };
        Ok(t)
    }

    fn enter(&mut self, phase: BusPhase) {
        self.phase = Some(phase);
    }
}

impl PhyBus for SimPhy {
    fn ready(&mut self) -> bool {
        !self.pending.is_empty()
    }

    fn start(&mut self) -> Result<()> {
        if self.current.is_some() {
            bail!("Transaction already in progress");
        }
        let Some(t) = self.pending.pop_front() else {
            bail!("Start without selection");
        };
        self.current = Some(t);
        self.data_in_taken = 0;
        self.trace.push(PhyEvent::Start);
        Ok(())
    }

    fn command(&mut self) -> Result<Option<CommandBlock>> {
        self.enter(BusPhase::Command);
        let cdb = self.current()?.cdb.clone();
        self.trace.push(PhyEvent::Command(cdb.clone()));
        Ok(Some(CommandBlock::new(&cdb)?))
    }

    fn identify(&mut self) -> u8 {
        self.current.as_ref().map_or(0, |t| t.identify)
    }

    fn phase(&mut self, phase: BusPhase) -> Result<()> {
        self.current()?;
        if self.phase != Some(phase) {
            self.trace.push(PhyEvent::Phase(phase));
            self.enter(phase);
        }
        Ok(())
    }

    fn offer(&mut self, byte: u8) -> Result<()> {
        if self.phase != Some(BusPhase::DataIn) {
            bail!("Offer outside DATA IN ({:?})", self.phase);
        }
        let limit = self.current()?.data_in_limit;
        if limit.is_some_and(|l| self.data_in_taken >= l) {
            bail!("Initiator stopped after {} DATA IN bytes", self.data_in_taken);
        }
        self.data_in_taken += 1;
        match self.trace.last_mut() {
            Some(PhyEvent::DataIn(run)) => run.push(byte),
            _ => self.trace.push(PhyEvent::DataIn(vec![byte])),
        }
        Ok(())
    }

    fn ask(&mut self) -> Result<u8> {
        if self.phase != Some(BusPhase::DataOut) {
            bail!("Ask outside DATA OUT ({:?})", self.phase);
        }
        let Some(byte) = self.current()?.data_out.pop_front() else {
            bail!("Initiator ran out of DATA OUT bytes");
        };
        match self.trace.last_mut() {
            Some(PhyEvent::DataOut(run)) => run.push(byte),
            _ => self.trace.push(PhyEvent::DataOut(vec![byte])),
        }
        Ok(byte)
    }

    fn atn_asserted(&mut self) -> bool {
        self.current.as_ref().is_some_and(|t| t.atn)
    }

    fn message_out(&mut self) -> Result<()> {
        self.current()?.atn = false;
        self.enter(BusPhase::MessageOut);
        self.trace.push(PhyEvent::MessageOut);
        Ok(())
    }

    fn status(&mut self, status: u8) -> Result<()> {
        self.current()?;
        self.enter(BusPhase::Status);
        self.trace.push(PhyEvent::Status(status));
        Ok(())
    }

    fn message_in(&mut self, message: u8) -> Result<()> {
        self.current()?;
        self.enter(BusPhase::MessageIn);
        self.trace.push(PhyEvent::MessageIn(message));
        Ok(())
    }

    fn illegal_op(&mut self, opcode: u8) -> Result<()> {
        self.trace.push(PhyEvent::IllegalOp(opcode));
        self.status(STATUS_CHECK_CONDITION)?;
        self.message_in(MSG_COMMAND_COMPLETE)
    }

    fn done(&mut self) -> Result<()> {
        self.current()?;
        self.current = None;
        self.phase = None;
        self.trace.push(PhyEvent::Done);
        Ok(())
    }

    fn settle(&mut self, delay: Duration) {
        self.trace.push(PhyEvent::Settle(delay));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_runs_merge() {
        let mut phy = SimPhy::new();
        phy.submit(SimTransaction::new(&[0x12, 0, 0, 0, 4, 0]));
        assert!(phy.ready());
        phy.start().unwrap();
        phy.phase(BusPhase::DataIn).unwrap();
        phy.offer_all(&[1, 2]).unwrap();
        phy.settle(Duration::from_micros(5));
        phy.offer_all(&[3]).unwrap();
        assert_eq!(
            &phy.trace()[1..],
            &[
                PhyEvent::Phase(BusPhase::DataIn),
                PhyEvent::DataIn(vec![1, 2]),
                PhyEvent::Settle(Duration::from_micros(5)),
                PhyEvent::DataIn(vec![3]),
            ]
        );
        assert_eq!(phy.data_in(), vec![1, 2, 3]);
    }

    #[test]
    fn wrong_phase_rejected() {
        let mut phy = SimPhy::new();
        phy.submit(SimTransaction::new(&[0x0D, 0, 0, 0, 1, 0]).with_data_out(&[9]));
        phy.start().unwrap();
        assert!(phy.offer(0).is_err());
        assert!(phy.ask().is_err());
        phy.phase(BusPhase::DataOut).unwrap();
        assert_eq!(phy.ask().unwrap(), 9);
        assert!(phy.ask().is_err());
    }

    #[test]
    fn data_in_limit() {
        let mut phy = SimPhy::new();
        phy.submit(SimTransaction::new(&[0x08, 0, 0, 5, 0xF4, 0]).with_data_in_limit(2));
        phy.start().unwrap();
        phy.phase(BusPhase::DataIn).unwrap();
        phy.offer_all(&[1, 2]).unwrap();
        assert!(phy.offer(3).is_err());
        phy.done().unwrap();
        assert!(!phy.ready());
    }

    #[test]
    fn not_ready_without_transaction() {
        let mut phy = SimPhy::new();
        assert!(!phy.ready());
        assert!(phy.start().is_err());
    }
}

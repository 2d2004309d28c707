//! Command blocks and the opcodes the adapter recognises

use arrayvec::ArrayVec;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

use crate::error::LinkError;
use crate::types::Field16;

/// Opcodes of the DaynaPort protocol, plus the Nuvolink opcodes that share
/// the same space and are acknowledged without action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, strum::IntoStaticStr)]
#[repr(u8)]
pub enum Opcode {
    TestUnitReady = 0x00,
    Nuvolink02 = 0x02,
    RequestSense = 0x03,
    Nuvolink06 = 0x06,
    ReadPacket = 0x08,
    RetrieveStatistics = 0x09,
    SendPacket = 0x0A,
    SetMacAddress = 0x0C,
    SetPacketFilter = 0x0D,
    EnableInterface = 0x0E,
    Inquiry = 0x12,
    ReceiveDiagnostic = 0x1C,
    SendDiagnostic = 0x1D,
    Nuvolink80 = 0x80,
}

impl Opcode {
    pub fn name(self) -> &'static str {
        self.into()
    }
}

/// Length of a command block by SCSI group code
pub const fn cdb_len(opcode: u8) -> usize {
    match opcode {
        // Group 1 and 2
        0x20..=0x5F
        // Group 5, truncated to what the PHY reads
        | 0xA0..=0xBF
        => CommandBlock::MAX_LEN,
        _ => 6,
    }
}

/// One command block as read from the initiator, valid for one dispatch
/// cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandBlock(ArrayVec<u8, { CommandBlock::MAX_LEN }>);

impl CommandBlock {
    pub const MAX_LEN: usize = 10;

    pub fn new(bytes: &[u8]) -> Result<Self, LinkError> {
        let opcode = bytes.first().copied().unwrap_or(0);
        let expected = cdb_len(opcode);
        if bytes.len() < expected {
            return Err(LinkError::ShortCommand {
                opcode,
                len: bytes.len(),
                expected,
            });
        }
        Ok(Self(bytes.iter().copied().take(expected).collect()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn opcode_byte(&self) -> u8 {
        self.0[0]
    }

    /// Decoded opcode, None if the adapter does not implement it
    pub fn opcode(&self) -> Option<Opcode> {
        Opcode::from_u8(self.opcode_byte())
    }

    /// Byte at `idx`, zero past the end of the block
    pub fn byte(&self, idx: usize) -> u8 {
        self.0.get(idx).copied().unwrap_or(0)
    }

    /// Transfer/allocation length carried big-endian in bytes 3 and 4
    pub fn length(&self) -> u16 {
        Field16(0).with_msb(self.byte(3)).with_lsb(self.byte(4)).0
    }

    /// INQUIRY allocation length. Only the low bit of byte 3 is honoured and
    /// the result is capped to 255.
    pub fn inquiry_alloc(&self) -> usize {
        let alloc = (usize::from(self.byte(3) & 1) << 8) | usize::from(self.byte(4));
        alloc.min(255)
    }

    /// Format selector of SEND PACKET (byte 5)
    pub fn send_format(&self) -> u8 {
        self.byte(5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_opcodes() {
        let cdb = CommandBlock::new(&[0x08, 0, 0, 0x05, 0xF4, 0xC0]).unwrap();
        assert_eq!(cdb.opcode(), Some(Opcode::ReadPacket));
        assert_eq!(cdb.length(), 1524);
        assert_eq!(Opcode::ReadPacket.name(), "ReadPacket");

        let cdb = CommandBlock::new(&[0x1B, 0, 0, 0, 0, 0]).unwrap();
        assert_eq!(cdb.opcode(), None);
    }

    #[test]
    fn short_block_rejected() {
        assert_eq!(
            CommandBlock::new(&[0x12, 0, 0]),
            Err(LinkError::ShortCommand {
                opcode: 0x12,
                len: 3,
                expected: 6
            })
        );
        assert!(CommandBlock::new(&[]).is_err());
        assert!(CommandBlock::new(&[0x28, 0, 0, 0, 0, 0]).is_err());
    }

    #[test]
    fn group1_is_ten_bytes() {
        let cdb = CommandBlock::new(&[0x28, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11]).unwrap();
        assert_eq!(cdb.as_bytes().len(), 10);
    }

    #[test]
    fn inquiry_alloc_capped() {
        let cdb = CommandBlock::new(&[0x12, 0, 0, 0x01, 0x20, 0]).unwrap();
        assert_eq!(cdb.inquiry_alloc(), 255);
        let cdb = CommandBlock::new(&[0x12, 0, 0, 0xFE, 0x05, 0]).unwrap();
        assert_eq!(cdb.inquiry_alloc(), 5);
    }
}

//! Receive filtering
//!
//! The host driver sends a list of 6-byte filter descriptors with SET PACKET
//! FILTER. The adapter only distinguishes two configurations: its own
//! address plus broadcast, and the same with AppleTalk multicast added. The
//! controller's hardware filter lets some extra traffic through, so every
//! frame is checked again in software before it is queued for the host.

use anyhow::Result;
use log::*;

use crate::link::Link;
use crate::link::command::CommandBlock;
use crate::link::nic::{NicController, NicReg, RxFilterControl};
use crate::link::phy::{BusPhase, PhyBus};
use crate::types::MacAddress;

/// First byte of a filter descriptor that enables AppleTalk
pub const APPLETALK_MARKER: u8 = 0x09;

/// Size of one filter descriptor
const DESCRIPTOR_LEN: usize = 6;

/// Descriptors inspected for the AppleTalk marker
const DESCRIPTOR_SLOTS: usize = 3;

/// AppleTalk zone multicast, 09:00:07:00:00:xx
const APPLETALK_ZONE_PREFIX: [u8; 5] = [0x09, 0x00, 0x07, 0x00, 0x00];

/// AppleTalk broadcast
const APPLETALK_BROADCAST: [u8; 6] = [0x09, 0x00, 0x07, 0xFF, 0xFF, 0xFF];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, strum::IntoStaticStr)]
pub enum FilterState {
    /// Own address and broadcast
    #[default]
    Standard,
    /// Standard plus AppleTalk multicast
    StandardPlusAppleTalk,
}

impl FilterState {
    pub fn appletalk(self) -> bool {
        self == Self::StandardPlusAppleTalk
    }

    /// Whether a frame with destination `dest` is delivered to the host
    pub fn accepts(self, own: &MacAddress, dest: &MacAddress) -> bool {
        if dest == own || dest.is_broadcast() {
            return true;
        }
        self.appletalk()
            && (dest.0.starts_with(&APPLETALK_ZONE_PREFIX) || dest.0 == APPLETALK_BROADCAST)
    }

    pub fn profile(self) -> &'static FilterProfile {
        match self {
            Self::Standard => &STANDARD_PROFILE,
            Self::StandardPlusAppleTalk => &APPLETALK_PROFILE,
        }
    }
}

/// Whether byte `idx` of a descriptor stream turns AppleTalk on
fn is_appletalk_marker(idx: usize, byte: u8) -> bool {
    byte == APPLETALK_MARKER
        && idx % DESCRIPTOR_LEN == 0
        && idx < DESCRIPTOR_LEN * DESCRIPTOR_SLOTS
}

/// Classifies a complete descriptor stream
pub fn classify(descriptors: &[u8]) -> FilterState {
    if descriptors
        .iter()
        .enumerate()
        .any(|(i, &b)| is_appletalk_marker(i, b))
    {
        FilterState::StandardPlusAppleTalk
    } else {
        FilterState::Standard
    }
}

/// Pattern match filter settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternMatch {
    /// Bytes of the 64-byte window that take part in the checksum
    pub mask: [u8; 8],
    /// Window offset into the frame
    pub offset: u16,
    /// Checksum the masked bytes have to produce
    pub checksum: u16,
}

/// Hardware filter configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterProfile {
    pub control: RxFilterControl,
    pub pattern: Option<PatternMatch>,
}

/// CRC check, unicast to us, broadcast
pub const STANDARD_PROFILE: FilterProfile = FilterProfile {
    control: RxFilterControl(0xA1),
    pattern: None,
};

/// Standard plus a pattern match on the 09:00:07 prefix at offset 0
pub const APPLETALK_PROFILE: FilterProfile = FilterProfile {
    control: RxFilterControl(0xB1),
    pattern: Some(PatternMatch {
        mask: [0x07, 0, 0, 0, 0, 0, 0, 0],
        offset: 0,
        checksum: 0x0FFE,
    }),
};

impl FilterProfile {
    /// Writes the filter registers. Reception must be disabled.
    pub fn program(&self, nic: &mut impl NicController) -> Result<()> {
        nic.write_reg(NicReg::ERXFCON, self.control.0)?;
        let Some(pattern) = self.pattern else {
            return Ok(());
        };
        for (reg, val) in NicReg::EPMM.into_iter().zip(pattern.mask) {
            nic.write_reg(reg, val)?;
        }
        let [offset_h, offset_l] = pattern.offset.to_be_bytes();
        nic.write_reg(NicReg::EPMOH, offset_h)?;
        nic.write_reg(NicReg::EPMOL, offset_l)?;
        let [cs_h, cs_l] = pattern.checksum.to_be_bytes();
        nic.write_reg(NicReg::EPMCSH, cs_h)?;
        nic.write_reg(NicReg::EPMCSL, cs_l)?;
        Ok(())
    }
}

impl<P: PhyBus, N: NicController> Link<P, N> {
    /// SET PACKET FILTER (0x0D)
    pub(super) fn set_packet_filter(&mut self, cdb: &CommandBlock) -> Result<()> {
        let alloc = usize::from(cdb.length());

        // The driver will not enable AppleTalk unless every byte it announced
        // has been taken, whether it is looked at or not.
        let mut descriptors = vec![0; alloc];
        self.phy.phase(BusPhase::DataOut)?;
        self.phy.ask_into(&mut descriptors)?;
        let state = classify(&descriptors);
        self.complete()?;

        debug!("Packet filter: {:?} ({} descriptor bytes)", state, alloc);
        self.filter = state;
        self.apply_filter()
    }

    /// Reprograms the controller for the current filter state.
    ///
    /// Reception stays off from the first register write until the last.
    pub(super) fn apply_filter(&mut self) -> Result<()> {
        self.nic.set_rx_enabled(false)?;
        if let Err(e) = self.filter.profile().program(&mut self.nic) {
            error!("Filter programming failed, reception left disabled: {:#}", e);
            return Err(e);
        }
        self.nic.set_rx_enabled(true)
    }
}

mod dispatcher;

use crate::config::LinkConfig;
use crate::link::Link;
use crate::sim::{PhyEvent, SimNic, SimPhy, SimTransaction};
use crate::types::MacAddress;

const OWN_MAC: MacAddress = MacAddress([0x00, 0x80, 0x19, 0x12, 0x34, 0x56]);
const OTHER_MAC: [u8; 6] = [0x00, 0x80, 0x19, 0x65, 0x43, 0x21];
const BROADCAST: [u8; 6] = [0xFF; 6];

type TestLink = Link<SimPhy, SimNic>;

fn test_config() -> LinkConfig {
    LinkConfig {
        scsi_id: 4,
        mac: OWN_MAC,
        ..LinkConfig::default()
    }
}

fn test_link() -> TestLink {
    Link::new(test_config(), SimPhy::new(), SimNic::new())
}

/// Runs one transaction and returns what happened on the bus
fn run(link: &mut TestLink, transaction: SimTransaction) -> Vec<PhyEvent> {
    link.phy_mut().submit(transaction);
    assert!(link.run_cycle().unwrap());
    link.phy_mut().take_trace()
}

fn data_in(trace: &[PhyEvent]) -> Vec<u8> {
    trace
        .iter()
        .filter_map(|e| match e {
            PhyEvent::DataIn(d) => Some(d.clone()),
            _ => None,
        })
        .flatten()
        .collect()
}

fn data_out(trace: &[PhyEvent]) -> Vec<u8> {
    trace
        .iter()
        .filter_map(|e| match e {
            PhyEvent::DataOut(d) => Some(d.clone()),
            _ => None,
        })
        .flatten()
        .collect()
}

/// Frame of `len` wire bytes (CRC excluded) to `dest`
fn frame_to(dest: [u8; 6], len: usize) -> Vec<u8> {
    let mut f: Vec<u8> = (0..len).map(|i| i as u8).collect();
    f[0..6].copy_from_slice(&dest);
    f[6..12].copy_from_slice(&OTHER_MAC);
    f
}

/// READ PACKET command block
fn read_cdb(budget: u16) -> [u8; 6] {
    let [h, l] = budget.to_be_bytes();
    [0x08, 0x00, 0x00, h, l, 0xC0]
}

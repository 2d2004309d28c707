use super::*;
use crate::error::LinkError;
use crate::link::engine::INQUIRY_DATA;
use crate::link::phy::{BusPhase, PhyBus};
use crate::link::{MSG_COMMAND_COMPLETE, STATUS_CHECK_CONDITION, STATUS_GOOD};

#[test]
fn ignored_opcodes_acknowledged() {
    let mut link = test_link();
    for op in [0x00, 0x02, 0x06, 0x0C, 0x0E, 0x1C, 0x1D, 0x80] {
        let cdb = [op, 0, 0, 0, 0, 0x80];
        let trace = run(&mut link, SimTransaction::new(&cdb));
        assert_eq!(
            trace,
            vec![
                PhyEvent::Start,
                PhyEvent::Command(cdb.to_vec()),
                PhyEvent::Status(STATUS_GOOD),
                PhyEvent::MessageIn(MSG_COMMAND_COMPLETE),
                PhyEvent::Done,
            ],
            "opcode {:02X}",
            op
        );
    }
    assert!(link.nic().trace().is_empty());
}

#[test]
fn request_sense() {
    let mut link = test_link();
    let trace = run(&mut link, SimTransaction::new(&[0x03, 0, 0, 0, 9, 0]));
    assert_eq!(
        &trace[2..],
        &[
            PhyEvent::Phase(BusPhase::DataIn),
            PhyEvent::DataIn(vec![0x70, 0, 0, 0, 0, 0, 0, 0, 0]),
            PhyEvent::Status(STATUS_GOOD),
            PhyEvent::MessageIn(MSG_COMMAND_COMPLETE),
            PhyEvent::Done,
        ]
    );
}

#[test]
fn retrieve_statistics() {
    let mut link = test_link();
    let trace = run(&mut link, SimTransaction::new(&[0x09, 0, 0, 0, 0x12, 0]));
    let data = data_in(&trace);
    assert_eq!(data.len(), 18);
    assert_eq!(&data[0..6], OWN_MAC.octets());
    assert!(data[6..].iter().all(|&b| b == 0));
}

#[test]
fn statistics_stay_zero_after_traffic() {
    let mut link = test_link();
    link.nic_mut().inject(&frame_to(BROADCAST, 60));
    run(&mut link, SimTransaction::new(&read_cdb(1524)));
    assert_eq!(link.status().rx_frames, 1);

    let trace = run(&mut link, SimTransaction::new(&[0x09, 0, 0, 0, 0x12, 0]));
    assert!(data_in(&trace)[6..].iter().all(|&b| b == 0));
}

#[test]
fn inquiry_truncated() {
    let mut link = test_link();
    let trace = run(&mut link, SimTransaction::new(&[0x12, 0, 0, 0, 5, 0]));
    assert_eq!(data_in(&trace), &INQUIRY_DATA[..5]);

    let trace = run(&mut link, SimTransaction::new(&[0x12, 0, 0, 0, 36, 0]));
    let data = data_in(&trace);
    assert_eq!(&data[8..16], b"Dayna   ");
    assert_eq!(&data[16..32], b"SCSI/Link       ");
    assert_eq!(&data[32..36], b"1.4a");
}

#[test]
fn inquiry_never_exceeds_table() {
    let mut link = test_link();
    let trace = run(&mut link, SimTransaction::new(&[0x12, 0, 0, 0xFF, 0xFF, 0]));
    assert_eq!(data_in(&trace), INQUIRY_DATA.to_vec());
}

#[test]
fn inquiry_zero_alloc() {
    let mut link = test_link();
    let trace = run(&mut link, SimTransaction::new(&[0x12, 0, 0, 0, 0, 0]));
    assert!(data_in(&trace).is_empty());
    assert!(trace.contains(&PhyEvent::Status(STATUS_GOOD)));
}

#[test]
fn attention_serviced_before_status() {
    let mut link = test_link();
    let trace = run(
        &mut link,
        SimTransaction::new(&[0x12, 0, 0, 0, 8, 0]).with_atn(),
    );
    assert_eq!(
        &trace[trace.len() - 4..],
        &[
            PhyEvent::MessageOut,
            PhyEvent::Status(STATUS_GOOD),
            PhyEvent::MessageIn(MSG_COMMAND_COMPLETE),
            PhyEvent::Done,
        ]
    );
}

#[test]
fn illegal_opcode() {
    let mut link = test_link();
    let trace = run(&mut link, SimTransaction::new(&[0x1B, 0, 0, 0, 0, 0]));
    assert!(trace.contains(&PhyEvent::IllegalOp(0x1B)));
    assert!(trace.contains(&PhyEvent::Status(STATUS_CHECK_CONDITION)));
    assert!(!trace.contains(&PhyEvent::Status(STATUS_GOOD)));
    assert_eq!(trace.last(), Some(&PhyEvent::Done));
}

#[test]
fn idle_when_not_selected() {
    let mut link = test_link();
    assert!(!link.run_cycle().unwrap());
    assert!(link.phy().trace().is_empty());
}

#[test]
fn disabled_adapter_ignores_selection() {
    let config = LinkConfig {
        scsi_id: LinkConfig::DISABLED_ID,
        ..test_config()
    };
    let mut link = Link::new(config, SimPhy::new(), SimNic::new());
    link.phy_mut().submit(SimTransaction::new(&[0x12, 0, 0, 0, 5, 0]));
    assert!(!link.run_cycle().unwrap());
    assert!(link.phy().trace().is_empty());
    assert!(link.phy_mut().ready());
}

#[test]
fn identify_remembered() {
    let mut link = test_link();
    assert_eq!(link.last_identify(), 0);

    let mut t = SimTransaction::new(&[0x00; 6]);
    t.identify = 0xC1;
    run(&mut link, t);
    assert_eq!(link.last_identify(), 0xC1);

    let mut t = SimTransaction::new(&[0x00; 6]);
    t.identify = 0;
    run(&mut link, t);
    assert_eq!(link.last_identify(), 0xC1);
}

#[test]
fn short_command_is_fault() {
    let mut link = test_link();
    link.phy_mut().submit(SimTransaction::new(&[0x12, 0, 0]));
    let err = link.run_cycle().unwrap_err();
    assert!(matches!(
        err.downcast_ref::<LinkError>(),
        Some(LinkError::ShortCommand { opcode: 0x12, .. })
    ));
    assert_eq!(link.phy_mut().take_trace().last(), Some(&PhyEvent::Done));

    // Next selection is serviced normally
    let trace = run(&mut link, SimTransaction::new(&[0x00; 6]));
    assert!(trace.contains(&PhyEvent::Status(STATUS_GOOD)));
}

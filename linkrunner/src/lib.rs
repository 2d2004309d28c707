//! Scripted host sessions against a simulated SCSI/Link

use anyhow::{Context, Result};
use log::*;
use serde::{Deserialize, Serialize};

use scsilink_core::config::LinkConfig;
use num_traits::FromPrimitive;
use scsilink_core::link::Link;
use scsilink_core::link::command::Opcode;
use scsilink_core::sim::{NicEvent, SimNic, SimPhy, SimTransaction};

/// One line of a session script
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum ScriptStep {
    /// Frame arriving from the network, hex
    Inject { inject: String },
    /// Transaction from the host
    Command {
        command: String,
        #[serde(default)]
        data_out: String,
        #[serde(default)]
        atn: bool,
    },
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
pub enum StepResult {
    Injected { accepted: bool },
    Completed {
        opcode: String,
        status: Option<u8>,
        data_in: String,
        transmitted: Vec<String>,
    },
    /// The target did not take the selection
    Idle,
    Failed(String),
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct SessionReport {
    pub mac: String,
    pub steps: Vec<StepResult>,
    pub status: String,
}

fn decode(what: &str, s: &str) -> Result<Vec<u8>> {
    let digits: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    hex::decode(&digits).with_context(|| format!("Bad hex in {}: '{}'", what, s))
}

fn opcode_name(op: u8) -> &'static str {
    Opcode::from_u8(op).map_or("Illegal", Opcode::name)
}

pub fn parse_script(json: &str) -> Result<Vec<ScriptStep>> {
    Ok(serde_json::from_str(json)?)
}

/// Runs a script step by step. Engine faults are reported per step and do
/// not end the session.
pub fn run_session(config: LinkConfig, script: &[ScriptStep]) -> Result<SessionReport> {
    let mut link = Link::new(config, SimPhy::new(), SimNic::new());
    link.init()?;
    link.nic_mut().take_trace();

    let mut report = SessionReport {
        mac: link.mac().to_string(),
        ..Default::default()
    };
    for step in script {
        let result = match step {
            ScriptStep::Inject { inject } => {
                let frame = decode("inject", inject)?;
                let accepted = link.nic_mut().inject(&frame).is_some();
                debug!("Injected {} byte frame, accepted: {}", frame.len(), accepted);
                StepResult::Injected { accepted }
            }
            ScriptStep::Command {
                command,
                data_out,
                atn,
            } => {
                let cdb = decode("command", command)?;
                let opcode = cdb.first().map_or("<empty>", |&op| opcode_name(op));
                let mut t = SimTransaction::new(&cdb).with_data_out(&decode("data_out", data_out)?);
                t.atn = *atn;
                link.phy_mut().submit(t);

                match link.run_cycle() {
                    Ok(true) => {
                        let result = StepResult::Completed {
                            opcode: opcode.to_string(),
                            status: link.phy().last_status(),
                            data_in: hex::encode(link.phy().data_in()),
                            transmitted: link
                                .nic_mut()
                                .take_transmitted()
                                .into_iter()
                                .map(|(_, f)| hex::encode(f))
                                .collect(),
                        };
                        link.phy_mut().take_trace();
                        result
                    }
                    Ok(false) => StepResult::Idle,
                    Err(e) => {
                        error!("Step failed: {:#}", e);
                        link.phy_mut().take_trace();
                        link.nic_mut().take_transmitted();
                        StepResult::Failed(format!("{:#}", e))
                    }
                }
            }
        };
        for e in link.nic_mut().take_trace() {
            if let NicEvent::Transmit(slot, len) = e {
                trace!("Transmit {:?} {}", slot, len);
            }
        }
        report.steps.push(result);
    }

    if link.queued().is_some() {
        warn!("Session ended with a frame still queued");
    }
    report.status = link.status().to_string();
    Ok(report)
}

//! Remote MEP state machine (802.1Q 20.20)

use cfm_core::{
    InterfaceStatus, MacAddr, MepId, OrganizationSpecificTlv, PortStatus, RmepState, SenderId,
};
use serde::Serialize;

/// Everything known about one expected peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteMep {
    pub mep_id: MepId,
    pub state: RmepState,
    /// Time (ms) of the last transition between OK and FAILED
    pub failed_ok_time_ms: u64,
    /// Sequence number of the last valid CCM, 0 before the first one
    pub last_sequence_number: u32,
    /// rMEPCCMdefect
    pub ccm_defect: bool,
    pub smac: MacAddr,
    pub rdi: bool,
    pub port_status: PortStatus,
    pub interface_status: InterfaceStatus,
    pub port_status_defect: bool,
    pub interface_status_defect: bool,
    pub sender_id: Option<SenderId>,
    pub organization_specific: Option<OrganizationSpecificTlv>,
}

impl RemoteMep {
    pub fn new(mep_id: MepId) -> Self {
        Self {
            mep_id,
            state: RmepState::Start,
            failed_ok_time_ms: 0,
            last_sequence_number: 0,
            ccm_defect: false,
            smac: MacAddr::zero(),
            rdi: false,
            port_status: PortStatus::NotReceived,
            interface_status: InterfaceStatus::NotReceived,
            port_status_defect: false,
            interface_status_defect: false,
            sender_id: None,
            organization_specific: None,
        }
    }

    /// Continuity lost. Returns true on a state transition.
    pub fn loss_of_continuity(&mut self, now_ms: u64) -> bool {
        self.ccm_defect = true;
        self.enter(RmepState::Failed, now_ms)
    }

    /// Continuity (re)established. Returns true on a state transition.
    pub fn continuity(&mut self, now_ms: u64) -> bool {
        self.ccm_defect = false;
        self.enter(RmepState::Ok, now_ms)
    }

    /// Record a sequence number; true if it is a sequence error
    ///
    /// A zero on either side means there is nothing to compare against.
    pub fn sequence_check(&mut self, sequence_number: u32) -> bool {
        let previous = self.last_sequence_number;
        self.last_sequence_number = sequence_number;
        previous != 0 && sequence_number != 0 && sequence_number != previous.wrapping_add(1)
    }

    pub fn set_port_status(&mut self, status: PortStatus) {
        self.port_status = status;
        self.port_status_defect = !matches!(status, PortStatus::NotReceived | PortStatus::Up);
    }

    pub fn set_interface_status(&mut self, status: InterfaceStatus) {
        self.interface_status = status;
        self.interface_status_defect =
            !matches!(status, InterfaceStatus::NotReceived | InterfaceStatus::Up);
    }

    /// START counts as a defect until the first CCM arrives
    pub fn remote_ccm_defect(&self) -> bool {
        self.ccm_defect || self.state == RmepState::Start
    }

    fn enter(&mut self, state: RmepState, now_ms: u64) -> bool {
        if self.state == state {
            return false;
        }
        self.state = state;
        self.failed_ok_time_ms = now_ms;
        true
    }
}

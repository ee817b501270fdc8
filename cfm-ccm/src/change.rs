//! What changed for a MEP, and which side of the engine must react

use cfm_core::MepDefinition;
use std::fmt;

use crate::tx::PortContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateChange {
    /// Configuration changed in a way that restarts the MEP
    Conf,
    /// Configuration changed without affecting protocol state
    ConfNoReset,
    /// Remote MEP set changed
    ConfRmep,
    EnableRmepDefect,
    Tpid,
    IpAddr,
    PortType,
    PvidOrAcceptableFrameType,
    OffloadPeriod,
    OffloadLoc,
    OffloadMepId,
    OffloadMaid,
    OffloadLevel,
    OffloadRdi,
    OffloadPortStatus,
    OffloadIfStatus,
}

impl StateChange {
    /// Classify a configuration update; `None` when nothing changed
    pub fn classify(old: &MepDefinition, new: &MepDefinition) -> Option<Self> {
        if old == new {
            return None;
        }

        if old.mep.rmep_ids != new.mep.rmep_ids {
            return Some(StateChange::ConfRmep);
        }

        let restart = old.md.level != new.md.level
            || old.md.format != new.md.format
            || old.ma.format != new.ma.format
            || old.ma.vlan != new.ma.vlan
            || old.ma.ccm_interval != new.ma.ccm_interval
            || old.mep.admin_active != new.mep.admin_active;

        Some(if restart {
            StateChange::Conf
        } else {
            StateChange::ConfNoReset
        })
    }

    /// Classify a residence port update, in the order the changes apply
    pub fn classify_port(old: &PortContext, new: &PortContext) -> Vec<Self> {
        let mut changes = Vec::new();
        if old.enable_rmep_defect != new.enable_rmep_defect {
            changes.push(StateChange::EnableRmepDefect);
        }
        if old.tpid != new.tpid {
            changes.push(StateChange::Tpid);
        }
        if old.mgmt_address != new.mgmt_address {
            changes.push(StateChange::IpAddr);
        }
        // Frame contents only
        if old.smac != new.smac || old.system_mac != new.system_mac || old.link_up != new.link_up
        {
            changes.push(StateChange::ConfNoReset);
        }
        changes
    }

    pub fn is_offload_event(self) -> bool {
        matches!(
            self,
            StateChange::OffloadPeriod
                | StateChange::OffloadLoc
                | StateChange::OffloadMepId
                | StateChange::OffloadMaid
                | StateChange::OffloadLevel
                | StateChange::OffloadRdi
                | StateChange::OffloadPortStatus
                | StateChange::OffloadIfStatus
        )
    }

    /// Whether the transmitted frame may change
    pub fn affects_tx(self) -> bool {
        matches!(
            self,
            StateChange::Conf
                | StateChange::ConfNoReset
                | StateChange::ConfRmep
                | StateChange::EnableRmepDefect
                | StateChange::Tpid
                | StateChange::IpAddr
                | StateChange::PvidOrAcceptableFrameType
        )
    }
}

impl fmt::Display for StateChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StateChange::Conf => "conf",
            StateChange::ConfNoReset => "conf-no-reset",
            StateChange::ConfRmep => "conf-rmep",
            StateChange::EnableRmepDefect => "enable-rmep-defect",
            StateChange::Tpid => "tpid",
            StateChange::IpAddr => "ip-addr",
            StateChange::PortType => "port-type",
            StateChange::PvidOrAcceptableFrameType => "pvid-or-acceptable-frame-type",
            StateChange::OffloadPeriod => "offload-period",
            StateChange::OffloadLoc => "offload-loc",
            StateChange::OffloadMepId => "offload-mep-id",
            StateChange::OffloadMaid => "offload-maid",
            StateChange::OffloadLevel => "offload-level",
            StateChange::OffloadRdi => "offload-rdi",
            StateChange::OffloadPortStatus => "offload-port-status",
            StateChange::OffloadIfStatus => "offload-if-status",
        };
        f.write_str(s)
    }
}

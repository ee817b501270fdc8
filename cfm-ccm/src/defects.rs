//! Defect aggregation (802.1Q 20.9, 20.35)
//!
//! Recomputed from scratch after every event that can change an input.

use cfm_core::MepDefect;
use serde::Serialize;

use crate::rmep::RemoteMep;

/// MEP-level defect flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Defects {
    pub some_rdi: bool,
    pub some_mac_status: bool,
    pub some_remote_ccm: bool,
    pub error_ccm: bool,
    pub xcon_ccm: bool,
    pub all_remotes_dead: bool,
}

impl Defects {
    pub fn compute<'a, I>(rmeps: I, error_ccm: bool, xcon_ccm: bool) -> Self
    where
        I: IntoIterator<Item = &'a RemoteMep>,
    {
        let mut some_remote_ccm = false;
        let mut some_rdi = false;
        let mut all_port_status = true;
        let mut any_interface_status = false;
        let mut all_remotes_dead = true;
        let mut count = 0;

        for rmep in rmeps {
            count += 1;
            some_remote_ccm |= rmep.remote_ccm_defect();
            all_port_status &= rmep.port_status_defect;
            any_interface_status |= rmep.interface_status_defect;
            some_rdi |= rmep.rdi;
            all_remotes_dead &= rmep.ccm_defect;
        }

        // Port Status defects only count once every peer reports one
        let some_mac_status = (count > 0 && all_port_status) || any_interface_status;

        Self {
            some_rdi,
            some_mac_status,
            some_remote_ccm,
            error_ccm,
            xcon_ccm,
            all_remotes_dead,
        }
    }

    /// Highest-priority defect present, independent of the alarm level
    pub fn highest(&self) -> MepDefect {
        if self.xcon_ccm {
            MepDefect::XconCcm
        } else if self.error_ccm {
            MepDefect::ErrorCcm
        } else if self.some_remote_ccm {
            MepDefect::RemoteCcm
        } else if self.some_mac_status {
            MepDefect::MacStatus
        } else if self.some_rdi {
            MepDefect::Rdi
        } else {
            MepDefect::None
        }
    }

    /// Defects bitmask, independent of the alarm level
    pub fn mask(&self) -> u8 {
        self.ranked()
            .iter()
            .filter(|(_, present)| *present)
            .fold(0, |mask, (defect, _)| mask | defect.mask())
    }

    /// MAdefectIndication: defects at or above `alarm_level`
    pub fn ma_defect_indication(&self, alarm_level: u8) -> bool {
        self.ranked()
            .iter()
            .any(|(defect, present)| *present && alarm_level <= *defect as u8)
    }

    /// presentRDI: as MAdefectIndication, but received RDI never counts
    pub fn present_rdi(&self, alarm_level: u8) -> bool {
        self.ranked().iter().any(|(defect, present)| {
            *present && *defect != MepDefect::Rdi && alarm_level <= *defect as u8
        })
    }

    fn ranked(&self) -> [(MepDefect, bool); 5] {
        [
            (MepDefect::Rdi, self.some_rdi),
            (MepDefect::MacStatus, self.some_mac_status),
            (MepDefect::RemoteCcm, self.some_remote_ccm),
            (MepDefect::ErrorCcm, self.error_ccm),
            (MepDefect::XconCcm, self.xcon_ccm),
        ]
    }
}

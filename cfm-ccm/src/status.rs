//! Read-only MEP status

use cfm_core::{FngState, MepDefect, MepId, MepKey};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::defects::Defects;
use crate::offload::{DetectorKind, HwCounters};
use crate::rmep::RemoteMep;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MepStatus {
    pub key: MepKey,
    pub mep_active: bool,
    pub fng_state: FngState,
    /// Defect tracked by the fault notification generator
    pub highest_defect: MepDefect,
    /// Defects bitmask
    pub defects: u8,
    pub defect_flags: Defects,
    pub ma_defect_indication: bool,
    pub present_rdi: bool,
    pub enable_rmep_defect: bool,
    pub detector: DetectorKind,
    pub counters: HwCounters,
    pub rmeps: BTreeMap<MepId, RemoteMep>,
}

impl MepStatus {
    pub fn rmep(&self, mep_id: MepId) -> Option<&RemoteMep> {
        self.rmeps.get(&mep_id)
    }
}

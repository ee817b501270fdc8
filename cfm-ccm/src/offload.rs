//! Hardware continuity-check offload
//!
//! Some switch chips run the CCM receive machinery themselves for a MEP with
//! a single peer: they classify level, MAID, MEP id and interval mismatches,
//! supervise loss of continuity, latch the received RDI bit and keep frame
//! counters. The engine talks to such a chip through [`CcOffload`] and picks
//! one [`ContinuityDetector`] per MEP when it is activated; every other call
//! site asks the detector instead of branching on hardware presence.

use cfm_core::{CcmInterval, Error, InterfaceStatus, MepId, MepKey, PortStatus, Result};
use serde::Serialize;
use std::fmt;
use tracing::{debug, error};

use crate::maid::Maid;

/// Latched CC status reported by the offload engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HwCcStatus {
    pub rdi: bool,
    pub loc: bool,
    pub port_status: PortStatus,
    pub interface_status: InterfaceStatus,
    pub mep_id_unexpected: bool,
    pub meg_id_unexpected: bool,
    pub period_unexpected: bool,
    pub mel_unexpected: bool,
    /// A CCM with interval code 0 was seen; counted by the hardware
    pub zero_period: bool,
}

/// CCM frame counters, kept by software or by the offload engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HwCounters {
    pub rx_valid: u64,
    pub rx_invalid: u64,
    pub rx_sequence_error: u64,
    pub tx: u64,
}

/// What the offload engine must expect from the peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedCcm {
    pub level: u8,
    pub maid: Maid,
    pub mep_id: MepId,
    pub rmep_id: MepId,
    pub interval: CcmInterval,
}

/// Continuity-check offload engine
pub trait CcOffload: Send {
    /// Take over CC supervision of a MEP. Returns false when the hardware
    /// cannot (no resources, unsupported interval, ...).
    fn attach(&mut self, key: &MepKey, expected: &ExpectedCcm) -> bool;

    fn detach(&mut self, key: &MepKey);

    fn cc_status(&self, key: &MepKey) -> Result<HwCcStatus>;

    fn counters(&self, key: &MepKey) -> Result<HwCounters>;

    fn clear_counters(&mut self, key: &MepKey) -> Result<()>;

    /// RDI bit the hardware inserts into transmitted CCMs
    fn set_rdi(&mut self, key: &MepKey, rdi: bool) -> Result<()>;
}

/// No offload engine: every MEP runs in software
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOffload;

impl CcOffload for NoOffload {
    fn attach(&mut self, _key: &MepKey, _expected: &ExpectedCcm) -> bool {
        false
    }

    fn detach(&mut self, _key: &MepKey) {}

    fn cc_status(&self, key: &MepKey) -> Result<HwCcStatus> {
        Err(Error::offload(format!("MEP {} is not offloaded", key)))
    }

    fn counters(&self, key: &MepKey) -> Result<HwCounters> {
        Err(Error::offload(format!("MEP {} is not offloaded", key)))
    }

    fn clear_counters(&mut self, _key: &MepKey) -> Result<()> {
        Ok(())
    }

    fn set_rdi(&mut self, key: &MepKey, _rdi: bool) -> Result<()> {
        Err(Error::offload(format!("MEP {} is not offloaded", key)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    Software,
    Hardware,
}

impl fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectorKind::Software => f.write_str("software"),
            DetectorKind::Hardware => f.write_str("hardware"),
        }
    }
}

/// Who detects what for one MEP
pub trait ContinuityDetector: Send + fmt::Debug {
    fn kind(&self) -> DetectorKind;

    /// Level, MAID, MEP id and interval mismatches are classified in software
    fn classifies_mismatches(&self) -> bool;

    /// rMEPwhile timers run in software and the RDI bit is taken from frames
    fn supervises_continuity(&self) -> bool;

    /// Software frame counters are authoritative
    fn counts_frames(&self) -> bool;

    /// RDI bit to write into the transmitted frame
    fn frame_rdi(&self, present_rdi: bool) -> bool;

    /// Hand presentRDI to whatever inserts it on transmit
    fn publish_rdi(&self, key: &MepKey, present_rdi: bool, offload: &mut dyn CcOffload)
        -> Result<()>;

    /// Counters to report, given the software ones
    fn counters(&self, key: &MepKey, offload: &dyn CcOffload, software: HwCounters) -> HwCounters;

    fn clear_counters(&self, key: &MepKey, offload: &mut dyn CcOffload) -> Result<()>;

    /// Give back whatever was claimed at selection time
    fn release(&self, key: &MepKey, offload: &mut dyn CcOffload);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SoftwareDetector;

impl ContinuityDetector for SoftwareDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Software
    }

    fn classifies_mismatches(&self) -> bool {
        true
    }

    fn supervises_continuity(&self) -> bool {
        true
    }

    fn counts_frames(&self) -> bool {
        true
    }

    fn frame_rdi(&self, present_rdi: bool) -> bool {
        present_rdi
    }

    fn publish_rdi(
        &self,
        _key: &MepKey,
        _present_rdi: bool,
        _offload: &mut dyn CcOffload,
    ) -> Result<()> {
        Ok(())
    }

    fn counters(&self, _key: &MepKey, _offload: &dyn CcOffload, software: HwCounters) -> HwCounters {
        software
    }

    fn clear_counters(&self, _key: &MepKey, _offload: &mut dyn CcOffload) -> Result<()> {
        Ok(())
    }

    fn release(&self, _key: &MepKey, _offload: &mut dyn CcOffload) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct HardwareDetector;

impl ContinuityDetector for HardwareDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Hardware
    }

    fn classifies_mismatches(&self) -> bool {
        false
    }

    fn supervises_continuity(&self) -> bool {
        false
    }

    fn counts_frames(&self) -> bool {
        false
    }

    // The hardware inserts RDI itself
    fn frame_rdi(&self, _present_rdi: bool) -> bool {
        false
    }

    fn publish_rdi(
        &self,
        key: &MepKey,
        present_rdi: bool,
        offload: &mut dyn CcOffload,
    ) -> Result<()> {
        offload.set_rdi(key, present_rdi)
    }

    fn counters(&self, key: &MepKey, offload: &dyn CcOffload, software: HwCounters) -> HwCounters {
        match offload.counters(key) {
            Ok(counters) => counters,
            Err(e) => {
                error!(mep = %key, error = %e, "Failed to read offload counters");
                software
            }
        }
    }

    fn clear_counters(&self, key: &MepKey, offload: &mut dyn CcOffload) -> Result<()> {
        offload.clear_counters(key)
    }

    fn release(&self, key: &MepKey, offload: &mut dyn CcOffload) {
        offload.detach(key);
    }
}

/// Pick the detector of a MEP
///
/// The offload engine only supports a single peer, so it is only offered the
/// MEP when exactly one remote MEP is configured.
pub fn select_detector(
    key: &MepKey,
    expected: Option<&ExpectedCcm>,
    offload: &mut dyn CcOffload,
) -> Box<dyn ContinuityDetector> {
    if let Some(expected) = expected {
        if offload.attach(key, expected) {
            debug!(mep = %key, rmep = expected.rmep_id, "Continuity check offloaded");
            return Box::new(HardwareDetector);
        }
    }

    Box::new(SoftwareDetector)
}

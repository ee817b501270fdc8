//! Continuity Check Message engine for CFM-RS
//!
//! This crate implements the CCM part of a Maintenance association End Point
//! (IEEE 802.1Q clause 20, ITU-T Y.1731):
//! - CCM generation and periodic injection
//! - CCM reception and validation
//! - Remote MEP, error and cross-connect state machines
//! - Defect aggregation and the fault notification generator
//! - Optional hand-over of continuity supervision to a hardware offload engine
//!
//! ## Layout
//!
//! [`CcmEngine`] owns every MEP and is driven from the outside: configuration
//! calls, received frames, timer expiries ([`CcmEngine::process_timeouts`])
//! and transmit ticks ([`CcmEngine::tx_tick`]). It never blocks and never
//! spawns anything; the `cfm-agent` crate hosts it on a Tokio runtime.
//!
//! The pure machines ([`RemoteMep`], [`MismatchMachine`], [`Fng`],
//! [`Defects`]) and the wire codec ([`CcmPdu`], [`Maid`]) are usable on their
//! own.

pub mod change;
pub mod defects;
pub mod engine;
pub mod fng;
pub mod maid;
pub mod mismatch;
pub mod notification;
pub mod offload;
pub mod packet;
pub mod rmep;
pub mod status;
pub mod timer;
pub mod tx;

#[cfg(test)]
mod tests;

pub use change::StateChange;
pub use defects::Defects;
pub use engine::{CcmEngine, RxVerdict, Services};
pub use fng::{FaultAlarm, Fng, FngStep, FngTimer, FngTimes};
pub use maid::{Maid, MAID_LEN};
pub use mismatch::{DecayTimer, MismatchMachine};
pub use notification::{MemoryNotificationTable, NotificationStatus, NotificationTable};
pub use offload::{
    CcOffload, ContinuityDetector, DetectorKind, ExpectedCcm, HwCcStatus, HwCounters, NoOffload,
};
pub use packet::{CcmPdu, CfmHeader, Rejection, CFM_OPCODE_CCM};
pub use rmep::RemoteMep;
pub use status::MepStatus;
pub use timer::{Clock, ManualClock, MonotonicClock, TimerKey, TimerKind, TimerQueue};
pub use tx::{CcmFrame, InjectionHandle, InjectionScheduler, PortContext, TxUpdate};

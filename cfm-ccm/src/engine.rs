//! The CCM engine
//!
//! `CcmEngine` owns every MEP in an arena keyed by [`MepKey`]. All work runs
//! synchronously inside one of four entry points: a configuration call, a
//! received frame, a timer expiry or a transmit tick. Timers only carry keys,
//! so an expiry for a MEP that has been deleted in the meantime is dropped.
//!
//! Receive processing follows 802.1Q 20.17 (CCM reception), 20.20 (remote
//! MEP), 20.22 and 20.24 (error and cross-connect) and 20.35 (defect
//! aggregation). The fault notification generator (20.37) is the only writer
//! of the alarm part of the notification table.

use bytes::Bytes;
use cfm_core::{
    timeout_ms_from_fph, Error, FngState, MepDefect, MepDefinition, MepId, MepKey, Result,
};
use cfm_packet::{EtherType, EthernetHeader};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

use crate::change::StateChange;
use crate::defects::Defects;
use crate::fng::{FaultAlarm, Fng, FngStep, FngTimer, FngTimes};
use crate::maid::Maid;
use crate::mismatch::{DecayTimer, MismatchMachine};
use crate::notification::{NotificationStatus, NotificationTable};
use crate::offload::{
    select_detector, CcOffload, ContinuityDetector, DetectorKind, ExpectedCcm, HwCounters,
    NoOffload, SoftwareDetector,
};
use crate::packet::{CcmPdu, CfmHeader, Rejection, CFM_OPCODE_CCM};
use crate::rmep::RemoteMep;
use crate::status::MepStatus;
use crate::timer::{Clock, TimerKey, TimerKind, TimerQueue};
use crate::tx::{
    cancel_frame, replace_frame, CcmFrame, InjectionHandle, InjectionScheduler, PortContext,
    ScheduledFrame,
};

/// External collaborators of the engine
pub struct Services {
    pub clock: Arc<dyn Clock>,
    pub injector: Box<dyn InjectionScheduler>,
    pub notifications: Arc<dyn NotificationTable>,
    pub offload: Box<dyn CcOffload>,
}

impl Services {
    /// Software-only services
    pub fn new(
        clock: Arc<dyn Clock>,
        injector: Box<dyn InjectionScheduler>,
        notifications: Arc<dyn NotificationTable>,
    ) -> Self {
        Self {
            clock,
            injector,
            notifications,
            offload: Box::new(NoOffload),
        }
    }

    pub fn with_offload(mut self, offload: Box<dyn CcOffload>) -> Self {
        self.offload = offload;
        self
    }
}

/// What happened to a received frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxVerdict {
    /// Not handled by this MEP: other OpCode or EtherType, higher level,
    /// inactive MEP or remote MEP defects disabled
    Ignored,
    /// Failed PDU validation
    Rejected(Rejection),
    /// Lower level or foreign MAID
    CrossConnect,
    /// Unexpected MEP id or interval
    Error,
    /// Mismatch that the offload engine reports on its own
    Offloaded,
    Valid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mismatch {
    CrossConnect,
    Error,
}

struct Runtime {
    services: Services,
    timers: TimerQueue,
}

impl Runtime {
    fn now(&self) -> u64 {
        self.services.clock.now_ms()
    }

    fn start_timer(&mut self, mep: &MepKey, kind: TimerKind, timeout_ms: u64) {
        let now = self.now();
        self.timers.start(TimerKey::new(mep, kind), now, timeout_ms);
    }

    fn stop_timer(&mut self, mep: &MepKey, kind: TimerKind) {
        self.timers.stop(&TimerKey::new(mep, kind));
    }
}

struct Mep {
    def: MepDefinition,
    port: PortContext,
    maid: Maid,
    /// Configured frames per hour
    fph: u64,
    detector: Box<dyn ContinuityDetector>,
    rmeps: BTreeMap<MepId, RemoteMep>,
    error_ccm: MismatchMachine,
    xcon_ccm: MismatchMachine,
    fng: Fng,
    defects: Defects,
    ma_defect_indication: bool,
    present_rdi: bool,
    mep_ok: bool,
    counters: HwCounters,
    tx: Option<ScheduledFrame>,
    next_sequence_number: u32,
}

/// A MEP runs only when administratively up and it has peers to supervise
fn mep_active(def: &MepDefinition) -> bool {
    def.mep.admin_active && !def.mep.rmep_ids.is_empty()
}

/// Start the injection for a configuration before it is committed
///
/// Leaves the running schedule untouched on error.
fn reserve_frame(
    def: &MepDefinition,
    port: &PortContext,
    maid: &Maid,
    rdi: bool,
    tx: &mut Option<ScheduledFrame>,
    injector: &mut dyn InjectionScheduler,
) -> Result<()> {
    if !mep_active(def) || !def.mep.ccm_enable {
        return Ok(());
    }

    let frame = CcmFrame::generate(def, port, maid, rdi)?;
    replace_frame(&def.key, tx, frame, injector)?;
    Ok(())
}

fn frames_per_hour(def: &MepDefinition) -> Result<u64> {
    def.ma
        .ccm_interval
        .frames_per_hour()
        .ok_or_else(|| Error::invalid_config("ccm_interval", "invalid interval"))
}

impl Mep {
    fn new(def: MepDefinition, port: PortContext) -> Result<Self> {
        let maid = Maid::build(&def.md, &def.ma)?;
        let fph = frames_per_hour(&def)?;
        Ok(Self {
            def,
            port,
            maid,
            fph,
            detector: Box::new(SoftwareDetector),
            rmeps: BTreeMap::new(),
            error_ccm: MismatchMachine::new(),
            xcon_ccm: MismatchMachine::new(),
            fng: Fng::default(),
            defects: Defects::default(),
            ma_defect_indication: false,
            present_rdi: false,
            mep_ok: false,
            counters: HwCounters::default(),
            tx: None,
            next_sequence_number: 0,
        })
    }

    fn active(&self) -> bool {
        mep_active(&self.def)
    }

    fn fng_times(&self) -> FngTimes {
        FngTimes {
            present_ms: u64::from(self.def.mep.alarm_time_present_ms),
            absent_ms: u64::from(self.def.mep.alarm_time_absent_ms),
        }
    }

    fn expected_ccm(&self) -> Option<ExpectedCcm> {
        if self.def.mep.rmep_ids.len() != 1 {
            return None;
        }

        Some(ExpectedCcm {
            level: self.def.md.level,
            maid: self.maid,
            mep_id: self.def.mep.mep_id,
            rmep_id: *self.def.mep.rmep_ids.first()?,
            interval: self.def.ma.ccm_interval,
        })
    }

    /// Returns true if the detector kind changed
    fn reselect_detector(&mut self, rt: &mut Runtime) -> bool {
        let old = self.detector.kind();
        self.detector
            .release(&self.def.key, rt.services.offload.as_mut());
        let expected = self.expected_ccm();
        self.detector = select_detector(&self.def.key, expected.as_ref(), rt.services.offload.as_mut());

        let new = self.detector.kind();
        if old != new {
            info!(mep = %self.def.key, from = %old, to = %new, "Continuity detector changed");
        }
        old != new
    }

    /// Update our entry in the notification table
    fn notify<F>(&self, rt: &Runtime, update: F)
    where
        F: FnOnce(&mut NotificationStatus),
    {
        let table = &rt.services.notifications;
        let mut status = match table.get(&self.def.key) {
            Some(status) => status,
            None => {
                warn!(mep = %self.def.key, "Notification entry missing, recreating it");
                NotificationStatus::default()
            }
        };

        update(&mut status);
        if let Err(e) = table.set(&self.def.key, status) {
            error!(mep = %self.def.key, error = %e, "Failed to update notification entry");
        }
    }

    fn clear_statistics(&mut self, rt: &mut Runtime) -> Result<()> {
        self.counters = HwCounters::default();
        self.detector
            .clear_counters(&self.def.key, rt.services.offload.as_mut())
    }

    /// Back to the initial protocol state
    fn reinit(&mut self, rt: &mut Runtime) {
        self.fng.reset();
        self.defects = Defects::default();
        self.ma_defect_indication = false;
        self.present_rdi = false;
        self.error_ccm.reset();
        self.xcon_ccm.reset();

        if let Err(e) = self.clear_statistics(rt) {
            error!(mep = %self.def.key, error = %e, "Failed to clear counters");
        }

        self.mep_ok = false;
        self.notify(rt, |status| {
            status.highest_defect = MepDefect::None;
            status.mep_ok = false;
        });

        for kind in [
            TimerKind::ErrorCcmWhile,
            TimerKind::XconCcmWhile,
            TimerKind::FngWhile,
        ] {
            rt.stop_timer(&self.def.key, kind);
        }

        self.rmep_init(rt);
    }

    /// Recreate the remote MEPs from configuration, all in RMEP_START
    fn rmep_init(&mut self, rt: &mut Runtime) {
        for id in self.rmeps.keys() {
            rt.stop_timer(&self.def.key, TimerKind::RmepWhile(*id));
        }

        self.rmeps = self
            .def
            .mep
            .rmep_ids
            .iter()
            .map(|id| (*id, RemoteMep::new(*id)))
            .collect();

        // Nothing else drives the remote MEP machines in software
        if self.active() && self.port.enable_rmep_defect && self.detector.supervises_continuity() {
            let timeout_ms = timeout_ms_from_fph(self.fph);
            for id in self.rmeps.keys() {
                rt.start_timer(&self.def.key, TimerKind::RmepWhile(*id), timeout_ms);
            }
        }

        self.defects_update(rt);
    }

    fn defects_update(&mut self, rt: &mut Runtime) {
        if !self.active() {
            return;
        }

        let defects = Defects::compute(
            self.rmeps.values(),
            self.error_ccm.defect(),
            self.xcon_ccm.defect(),
        );
        if defects != self.defects {
            debug!(
                mep = %self.def.key,
                defects = defects.mask(),
                highest = %defects.highest(),
                "Defects changed"
            );
        }

        let alarm_level = self.def.mep.alarm_level;
        self.defects = defects;
        self.ma_defect_indication = defects.ma_defect_indication(alarm_level);

        let present_rdi = defects.present_rdi(alarm_level);
        if present_rdi != self.present_rdi {
            info!(mep = %self.def.key, present_rdi, "presentRDI changed");
            self.present_rdi = present_rdi;
            if self.def.mep.ccm_enable {
                if let Err(e) = self.tx_update(rt) {
                    error!(mep = %self.def.key, error = %e, "Failed to update CCM with new RDI");
                }
            }
        }

        let mep_ok = self.port.enable_rmep_defect && defects.mask() == 0;
        if mep_ok != self.mep_ok {
            self.mep_ok = mep_ok;
            self.notify(rt, |status| status.mep_ok = mep_ok);
        }

        let old_state = self.fng.state();
        let step = self.fng.update(
            self.ma_defect_indication,
            defects.highest(),
            self.fng_times(),
        );
        self.apply_fng(old_state, step, rt);
    }

    fn apply_fng(&mut self, old_state: FngState, step: FngStep, rt: &mut Runtime) {
        match step.timer {
            FngTimer::Start(timeout_ms) => {
                rt.start_timer(&self.def.key, TimerKind::FngWhile, timeout_ms)
            }
            FngTimer::Stop => rt.stop_timer(&self.def.key, TimerKind::FngWhile),
            FngTimer::Keep => {}
        }

        if self.fng.state() != old_state {
            debug!(
                mep = %self.def.key,
                from = %old_state,
                to = %self.fng.state(),
                "FNG state changed"
            );
        }

        match step.alarm {
            Some(FaultAlarm::Raise(defect)) => {
                if let Some(current) = rt.services.notifications.get(&self.def.key) {
                    if current.highest_defect >= defect {
                        error!(
                            mep = %self.def.key,
                            defect = %defect,
                            reported = %current.highest_defect,
                            "Raising a fault alarm that is not higher than the reported one"
                        );
                    }
                }

                info!(mep = %self.def.key, defect = %defect, "Fault alarm raised");
                self.notify(rt, |status| status.highest_defect = defect);
            }
            Some(FaultAlarm::Clear) => {
                info!(mep = %self.def.key, "Fault alarm cleared");
                self.notify(rt, |status| status.highest_defect = MepDefect::None);
            }
            None => {}
        }
    }

    /// Feed one classification into the cross-connect or error machine
    fn mismatch_update(&mut self, which: Mismatch, received: bool, rt: &mut Runtime) {
        let (machine, kind, name) = match which {
            Mismatch::CrossConnect => (&mut self.xcon_ccm, TimerKind::XconCcmWhile, "xconCCMdefect"),
            Mismatch::Error => (&mut self.error_ccm, TimerKind::ErrorCcmWhile, "errorCCMdefect"),
        };

        let (raised, timer) = machine.update(received);
        if raised {
            info!(mep = %self.def.key, defect = name, "Mismatch defect raised");
        }

        // Decay uses the configured interval; an erroneous CCM's own interval
        // is not trustworthy
        match timer {
            DecayTimer::Arm => rt.start_timer(&self.def.key, kind, timeout_ms_from_fph(self.fph)),
            DecayTimer::Cancel => rt.stop_timer(&self.def.key, kind),
            DecayTimer::Keep => {}
        }
    }

    /// Common tail of frame and offload processing
    fn mismatch_exit(&mut self, mismatch: Option<Mismatch>, rt: &mut Runtime) {
        self.mismatch_update(
            Mismatch::CrossConnect,
            mismatch == Some(Mismatch::CrossConnect),
            rt,
        );
        self.mismatch_update(Mismatch::Error, mismatch == Some(Mismatch::Error), rt);
        self.defects_update(rt);
    }

    fn tx_update(&mut self, rt: &mut Runtime) -> Result<()> {
        let rdi = self.detector.frame_rdi(self.present_rdi);
        let frame = CcmFrame::generate(&self.def, &self.port, &self.maid, rdi)?;
        replace_frame(
            &self.def.key,
            &mut self.tx,
            frame,
            rt.services.injector.as_mut(),
        )?;
        self.detector
            .publish_rdi(&self.def.key, self.present_rdi, rt.services.offload.as_mut())
    }

    fn tx_deactivate(&mut self, rt: &mut Runtime) -> Result<()> {
        cancel_frame(&self.def.key, &mut self.tx, rt.services.injector.as_mut())
    }

    fn rx_activate(&mut self, change: StateChange, rt: &mut Runtime) {
        let (conf_update, rmep_update, reset) = match change {
            StateChange::ConfNoReset | StateChange::PvidOrAcceptableFrameType => {
                (true, false, false)
            }
            StateChange::EnableRmepDefect => (false, true, false),
            StateChange::Conf | StateChange::ConfRmep => (true, false, true),
            StateChange::Tpid | StateChange::IpAddr | StateChange::PortType => {
                (false, false, false)
            }
            StateChange::OffloadPeriod
            | StateChange::OffloadLoc
            | StateChange::OffloadMepId
            | StateChange::OffloadMaid
            | StateChange::OffloadLevel
            | StateChange::OffloadRdi
            | StateChange::OffloadPortStatus
            | StateChange::OffloadIfStatus => (false, false, false),
        };

        debug!(
            mep = %self.def.key,
            change = %change,
            conf_update,
            rmep_update,
            reset,
            "Rx activate"
        );

        let mut run_state_update = change.is_offload_event();
        if conf_update || rmep_update {
            run_state_update = true;
            if conf_update {
                // The detector decides whether rMEPwhile timers run, so it is
                // chosen before the remote MEPs are recreated
                let switched = self.reselect_detector(rt);
                if reset {
                    self.reinit(rt);
                } else if switched {
                    self.rmep_init(rt);
                } else {
                    // Alarm level may have moved
                    self.defects_update(rt);
                }
            } else {
                self.rmep_init(rt);
            }
        }

        if run_state_update && self.detector.kind() == DetectorKind::Hardware {
            self.offload_status_run(change, rt);
        }
    }

    fn rx_deactivate(&mut self, rt: &mut Runtime) {
        self.detector
            .release(&self.def.key, rt.services.offload.as_mut());
        self.detector = Box::new(SoftwareDetector);
        self.reinit(rt);
    }

    /// Run the receive machines from the offload engine's latched status
    fn offload_status_run(&mut self, change: StateChange, rt: &mut Runtime) {
        let status = match rt.services.offload.cc_status(&self.def.key) {
            Ok(status) => status,
            Err(e) => {
                error!(mep = %self.def.key, error = %e, "Failed to read offload CC status");
                return;
            }
        };

        debug!(mep = %self.def.key, change = %change, status = ?status, "Offload CC status");

        if self.rmeps.len() != 1 {
            error!(
                mep = %self.def.key,
                rmeps = self.rmeps.len(),
                "Offload event on a MEP without exactly one remote MEP"
            );
            return;
        }

        // Invalid frame, counted by the hardware
        if status.zero_period {
            return;
        }

        let mismatch = if status.mel_unexpected || status.meg_id_unexpected {
            Some(Mismatch::CrossConnect)
        } else if status.mep_id_unexpected || status.period_unexpected {
            Some(Mismatch::Error)
        } else {
            None
        };

        if mismatch.is_none() {
            if !self.port.enable_rmep_defect {
                debug!(mep = %self.def.key, "Remote MEP defects disabled, skipping");
                return;
            }

            let now = rt.now();
            if let Some(rmep) = self.rmeps.values_mut().next() {
                let transitioned = if status.loc {
                    rmep.loss_of_continuity(now)
                } else {
                    rmep.continuity(now)
                };
                if transitioned {
                    info!(
                        mep = %self.def.key,
                        rmep = rmep.mep_id,
                        state = %rmep.state,
                        "Remote MEP state changed"
                    );
                }
                rmep.rdi = status.rdi;
                match change {
                    StateChange::OffloadPortStatus => rmep.set_port_status(status.port_status),
                    StateChange::OffloadIfStatus => {
                        rmep.set_interface_status(status.interface_status)
                    }
                    _ => {}
                }
            }
        }

        self.mismatch_exit(mismatch, rt);
    }

    /// Classify a validated CCM against our configuration (20.17.1, 20.17.2)
    fn classify(&self, ccm: &CcmPdu) -> Option<Mismatch> {
        if ccm.level < self.def.md.level || ccm.maid != self.maid {
            Some(Mismatch::CrossConnect)
        } else if !self.rmeps.contains_key(&ccm.mep_id)
            || ccm.interval != self.def.ma.ccm_interval
        {
            Some(Mismatch::Error)
        } else {
            None
        }
    }

    fn reject(&mut self, rejection: Rejection) -> RxVerdict {
        debug!(mep = %self.def.key, reason = %rejection, "CCM failed validation");
        self.count_invalid();
        RxVerdict::Rejected(rejection)
    }

    fn count_invalid(&mut self) {
        if self.detector.counts_frames() {
            self.counters.rx_invalid += 1;
        }
    }

    fn rx_frame(&mut self, frame: &[u8], rt: &mut Runtime) -> RxVerdict {
        if !self.active() {
            return RxVerdict::Ignored;
        }

        let Some((header, offset)) = EthernetHeader::parse(frame) else {
            return RxVerdict::Ignored;
        };
        if header.ethertype != EtherType::Cfm {
            return RxVerdict::Ignored;
        }

        let pdu = &frame[offset..];
        let Some(cfm) = CfmHeader::peek(pdu) else {
            return self.reject(Rejection::TooShort);
        };

        // Higher levels belong to someone else
        if cfm.opcode != CFM_OPCODE_CCM || cfm.level > self.def.md.level {
            return RxVerdict::Ignored;
        }

        let ccm = match CcmPdu::decode(pdu) {
            Ok(ccm) => ccm,
            Err(rejection) => return self.reject(rejection),
        };

        if let Some(mismatch) = self.classify(&ccm) {
            self.count_invalid();
            if !self.detector.classifies_mismatches() {
                return RxVerdict::Offloaded;
            }

            debug!(
                mep = %self.def.key,
                mismatch = ?mismatch,
                level = ccm.level,
                rmep = ccm.mep_id,
                interval = %ccm.interval,
                "Mismatched CCM"
            );
            self.mismatch_exit(Some(mismatch), rt);
            return match mismatch {
                Mismatch::CrossConnect => RxVerdict::CrossConnect,
                Mismatch::Error => RxVerdict::Error,
            };
        }

        // The remote MEP machines must not run
        if !self.port.enable_rmep_defect {
            return RxVerdict::Ignored;
        }

        let counts = self.detector.counts_frames();
        let supervises = self.detector.supervises_continuity();
        if counts {
            self.counters.rx_valid += 1;
        }

        trace!(mep = %self.def.key, rmep = ccm.mep_id, seq = ccm.sequence_number, "Valid CCM");

        let now = rt.now();
        let rmep_timeout_ms = ccm
            .interval
            .timeout_ms()
            .unwrap_or_else(|| timeout_ms_from_fph(self.fph));
        let Some(rmep) = self.rmeps.get_mut(&ccm.mep_id) else {
            error!(mep = %self.def.key, rmep = ccm.mep_id, "Remote MEP vanished");
            return RxVerdict::Ignored;
        };

        if rmep.sequence_check(ccm.sequence_number) && counts {
            self.counters.rx_sequence_error += 1;
        }

        if supervises {
            if rmep.continuity(now) {
                info!(mep = %self.def.key, rmep = rmep.mep_id, state = %rmep.state, "Remote MEP state changed");
            }
            rt.start_timer(&self.def.key, TimerKind::RmepWhile(rmep.mep_id), rmep_timeout_ms);
            rmep.rdi = ccm.rdi;
        }

        rmep.smac = header.source;
        rmep.sender_id = ccm.sender_id;
        rmep.organization_specific = ccm.organization_specific;
        rmep.set_port_status(ccm.port_status);
        rmep.set_interface_status(ccm.interface_status);

        if self.detector.classifies_mismatches() {
            self.mismatch_exit(None, rt);
        } else {
            self.defects_update(rt);
        }

        RxVerdict::Valid
    }

    fn timeout(&mut self, kind: TimerKind, rt: &mut Runtime) {
        match kind {
            TimerKind::RmepWhile(id) => {
                let now = rt.now();
                let Some(rmep) = self.rmeps.get_mut(&id) else {
                    error!(mep = %self.def.key, rmep = id, "rMEPwhile expired for an unknown remote MEP");
                    return;
                };

                if rmep.loss_of_continuity(now) {
                    warn!(mep = %self.def.key, rmep = id, "Loss of continuity");
                }
                self.defects_update(rt);
            }
            TimerKind::ErrorCcmWhile => {
                if self.error_ccm.expire() {
                    info!(mep = %self.def.key, defect = "errorCCMdefect", "Mismatch defect cleared");
                }
                self.defects_update(rt);
            }
            TimerKind::XconCcmWhile => {
                if self.xcon_ccm.expire() {
                    info!(mep = %self.def.key, defect = "xconCCMdefect", "Mismatch defect cleared");
                }
                self.defects_update(rt);
            }
            TimerKind::FngWhile => {
                let old_state = self.fng.state();
                let step = self.fng.timeout();
                self.apply_fng(old_state, step, rt);
            }
        }
    }

    /// Stamp the next frame of a software injection
    fn tx_tick(&mut self, handle: InjectionHandle) -> Option<Bytes> {
        let scheduled = self.tx.as_ref()?;
        if scheduled.handle != handle {
            trace!(mep = %self.def.key, handle = %handle, "Stale injection tick");
            return None;
        }

        let bytes = scheduled.frame.stamp(self.next_sequence_number);
        self.next_sequence_number = self.next_sequence_number.wrapping_add(1);
        if self.detector.counts_frames() {
            self.counters.tx += 1;
        }
        Some(bytes)
    }

    fn status(&self, rt: &Runtime) -> MepStatus {
        MepStatus {
            key: self.def.key.clone(),
            mep_active: self.active(),
            fng_state: self.fng.state(),
            highest_defect: self.fng.highest_defect(),
            defects: self.defects.mask(),
            defect_flags: self.defects,
            ma_defect_indication: self.ma_defect_indication,
            present_rdi: self.present_rdi,
            enable_rmep_defect: self.port.enable_rmep_defect,
            detector: self.detector.kind(),
            counters: self
                .detector
                .counters(&self.def.key, rt.services.offload.as_ref(), self.counters),
            rmeps: self.rmeps.clone(),
        }
    }
}

/// Continuity check engine for any number of MEPs
pub struct CcmEngine {
    meps: BTreeMap<MepKey, Mep>,
    rt: Runtime,
}

impl CcmEngine {
    pub fn new(services: Services) -> Self {
        Self {
            meps: BTreeMap::new(),
            rt: Runtime {
                services,
                timers: TimerQueue::new(),
            },
        }
    }

    /// Create and start a MEP
    ///
    /// Nothing is left behind if activation fails.
    pub fn create_mep(&mut self, def: MepDefinition, port: PortContext) -> Result<()> {
        def.validate()?;
        if self.meps.contains_key(&def.key) {
            return Err(Error::AlreadyExists(format!("MEP {}", def.key)));
        }

        let key = def.key.clone();
        let mep = Mep::new(def, port)?;
        self.rt
            .services
            .notifications
            .set(&key, NotificationStatus::default())?;
        self.meps.insert(key.clone(), mep);
        info!(mep = %key, "MEP created");

        if let Err(e) = self.update(&key, StateChange::Conf) {
            error!(mep = %key, error = %e, "MEP activation failed, removing it");
            if let Err(teardown) = self.teardown(&key) {
                error!(mep = %key, error = %teardown, "Cleanup after failed activation failed");
            }
            return Err(e);
        }

        Ok(())
    }

    /// Apply a new configuration to an existing MEP
    ///
    /// Everything that can be rejected is checked, and the new CCM is
    /// scheduled, before the MEP is touched.
    pub fn update_mep(&mut self, def: MepDefinition) -> Result<()> {
        def.validate()?;
        let mep = self
            .meps
            .get_mut(&def.key)
            .ok_or_else(|| Error::not_found(format!("MEP {}", def.key)))?;

        let Some(change) = StateChange::classify(&mep.def, &def) else {
            debug!(mep = %def.key, "Configuration unchanged");
            return Ok(());
        };

        let maid = Maid::build(&def.md, &def.ma)?;
        let fph = frames_per_hour(&def)?;
        let rdi = mep.detector.frame_rdi(mep.present_rdi);
        reserve_frame(
            &def,
            &mep.port,
            &maid,
            rdi,
            &mut mep.tx,
            self.rt.services.injector.as_mut(),
        )?;

        info!(mep = %def.key, change = %change, "MEP configuration changed");
        let key = def.key.clone();
        mep.def = def;
        mep.maid = maid;
        mep.fph = fph;
        self.update(&key, change)
    }

    /// Stop and remove a MEP, including its notification entry
    pub fn delete_mep(&mut self, key: &MepKey) -> Result<()> {
        if !self.meps.contains_key(key) {
            return Err(Error::not_found(format!("MEP {}", key)));
        }

        info!(mep = %key, "Deleting MEP");
        self.teardown(key)
    }

    /// Residence port facts changed
    ///
    /// The CCM for the new port is scheduled before the port is committed,
    /// so a rejected injection leaves the MEP as it was. Once committed,
    /// every derived change is applied and the first error is returned.
    pub fn set_port_context(&mut self, key: &MepKey, port: PortContext) -> Result<()> {
        let mep = self
            .meps
            .get_mut(key)
            .ok_or_else(|| Error::not_found(format!("MEP {}", key)))?;
        let changes = StateChange::classify_port(&mep.port, &port);
        if changes.iter().any(|change| change.affects_tx()) {
            let rdi = mep.detector.frame_rdi(mep.present_rdi);
            reserve_frame(
                &mep.def,
                &port,
                &mep.maid,
                rdi,
                &mut mep.tx,
                self.rt.services.injector.as_mut(),
            )?;
        }
        mep.port = port;

        let mut result = Ok(());
        for change in changes {
            if let Err(e) = self.update(key, change) {
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        result
    }

    /// React to an externally detected change (port type, PVID, offload
    /// events)
    pub fn state_change(&mut self, key: &MepKey, change: StateChange) -> Result<()> {
        self.update(key, change)
    }

    /// Process a frame received on the MEP's residence port
    pub fn rx_frame(&mut self, key: &MepKey, frame: &[u8]) -> Result<RxVerdict> {
        let mep = self
            .meps
            .get_mut(key)
            .ok_or_else(|| Error::not_found(format!("MEP {}", key)))?;
        Ok(mep.rx_frame(frame, &mut self.rt))
    }

    /// Fire every timer that is due. Returns the number of expiries.
    pub fn process_timeouts(&mut self) -> usize {
        let now = self.rt.now();
        let mut fired = 0;
        while let Some(timer) = self.rt.timers.pop_expired(now) {
            fired += 1;
            match self.meps.get_mut(&timer.mep) {
                Some(mep) => mep.timeout(timer.kind, &mut self.rt),
                None => debug!(mep = %timer.mep, kind = ?timer.kind, "Timer of a deleted MEP"),
            }
        }
        fired
    }

    /// Clock value at which [`process_timeouts`](Self::process_timeouts)
    /// should run next
    pub fn next_deadline(&mut self) -> Option<u64> {
        self.rt.timers.next_deadline()
    }

    /// Stamp and count the next frame of a software injection
    ///
    /// Returns `None` for a handle that is no longer scheduled.
    pub fn tx_tick(&mut self, key: &MepKey, handle: InjectionHandle) -> Option<Bytes> {
        self.meps.get_mut(key)?.tx_tick(handle)
    }

    pub fn status(&self, key: &MepKey) -> Result<MepStatus> {
        Ok(self.mep(key)?.status(&self.rt))
    }

    pub fn rmep_status(&self, key: &MepKey, rmep_id: MepId) -> Result<RemoteMep> {
        self.mep(key)?
            .rmeps
            .get(&rmep_id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("RMEP {} of MEP {}", rmep_id, key)))
    }

    pub fn statistics_clear(&mut self, key: &MepKey) -> Result<()> {
        let mep = self
            .meps
            .get_mut(key)
            .ok_or_else(|| Error::not_found(format!("MEP {}", key)))?;
        debug!(mep = %key, "Clearing CCM counters");
        mep.clear_statistics(&mut self.rt)
    }

    pub fn mep_keys(&self) -> impl Iterator<Item = &MepKey> {
        self.meps.keys()
    }

    pub fn len(&self) -> usize {
        self.meps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meps.is_empty()
    }

    pub fn now_ms(&self) -> u64 {
        self.rt.now()
    }

    fn mep(&self, key: &MepKey) -> Result<&Mep> {
        self.meps
            .get(key)
            .ok_or_else(|| Error::not_found(format!("MEP {}", key)))
    }

    /// Activate or deactivate both directions after a change
    fn update(&mut self, key: &MepKey, change: StateChange) -> Result<()> {
        let mep = self
            .meps
            .get_mut(key)
            .ok_or_else(|| Error::not_found(format!("MEP {}", key)))?;
        let rt = &mut self.rt;

        if mep.active() {
            mep.rx_activate(change, rt);
            if !mep.def.mep.ccm_enable {
                return mep.tx_deactivate(rt);
            }

            if change.affects_tx() {
                debug!(mep = %key, change = %change, "Regenerating CCM");
                mep.tx_update(rt)?;
            }
            Ok(())
        } else {
            let tx = mep.tx_deactivate(rt);
            mep.rx_deactivate(rt);
            tx
        }
    }

    fn teardown(&mut self, key: &MepKey) -> Result<()> {
        let Some(mut mep) = self.meps.remove(key) else {
            return Ok(());
        };

        let tx = mep.tx_deactivate(&mut self.rt);
        mep.detector
            .release(key, self.rt.services.offload.as_mut());
        self.rt.timers.stop_mep(key);
        let notification = self.rt.services.notifications.delete(key);
        tx.and(notification)
    }
}

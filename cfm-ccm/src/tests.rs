//! Engine scenarios driven by a manual clock

use super::*;
use bytes::Bytes;
use cfm_core::{
    CcmInterval, Error, FngState, GlobalConf, InterfaceStatus, MacAddr, MaConf, MdConf, MepConf,
    MepDefect, MepDefinition, MepKey, PortStatus, Result, RmepState, TlvOption,
};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Default)]
struct InjectorLog {
    next: u128,
    running: BTreeMap<u128, CcmFrame>,
    starts: usize,
    fail_start: bool,
    /// Reject the next stop only
    fail_stop: bool,
}

struct RecordingInjector {
    log: Arc<Mutex<InjectorLog>>,
}

impl InjectionScheduler for RecordingInjector {
    fn start(&mut self, _key: &MepKey, frame: &CcmFrame) -> Result<InjectionHandle> {
        let mut log = self.log.lock();
        if log.fail_start {
            return Err(Error::OutOfResources("no injection slots".into()));
        }
        log.next += 1;
        log.starts += 1;
        let handle = log.next;
        log.running.insert(handle, frame.clone());
        Ok(InjectionHandle(handle))
    }

    fn stop(&mut self, handle: InjectionHandle) -> Result<()> {
        let mut log = self.log.lock();
        if log.fail_stop {
            log.fail_stop = false;
            return Err(Error::scheduler("stop rejected"));
        }
        log.running.remove(&handle.0);
        Ok(())
    }
}

#[derive(Default)]
struct OffloadState {
    status: HwCcStatus,
    attached: Vec<MepKey>,
    rdi: Option<bool>,
    counters: HwCounters,
}

struct FakeOffload {
    state: Arc<Mutex<OffloadState>>,
}

impl CcOffload for FakeOffload {
    fn attach(&mut self, key: &MepKey, _expected: &ExpectedCcm) -> bool {
        self.state.lock().attached.push(key.clone());
        true
    }

    fn detach(&mut self, key: &MepKey) {
        self.state.lock().attached.retain(|k| k != key);
    }

    fn cc_status(&self, _key: &MepKey) -> Result<HwCcStatus> {
        Ok(self.state.lock().status)
    }

    fn counters(&self, _key: &MepKey) -> Result<HwCounters> {
        Ok(self.state.lock().counters)
    }

    fn clear_counters(&mut self, _key: &MepKey) -> Result<()> {
        self.state.lock().counters = HwCounters::default();
        Ok(())
    }

    fn set_rdi(&mut self, _key: &MepKey, rdi: bool) -> Result<()> {
        self.state.lock().rdi = Some(rdi);
        Ok(())
    }
}

fn local() -> MepDefinition {
    let mut mep = MepConf::new(1);
    mep.rmep_ids.insert(2);
    mep.admin_active = true;
    mep.ccm_enable = true;
    MepDefinition::new(
        GlobalConf::default(),
        MdConf::new("dom", 4),
        MaConf::new("ma", CcmInterval::Sec1),
        mep,
    )
}

fn peer_definition(md: MdConf, ma: MaConf, mep_id: u16) -> MepDefinition {
    let mut mep = MepConf::new(mep_id);
    mep.rmep_ids.insert(1);
    MepDefinition::new(GlobalConf::default(), md, ma, mep)
}

/// Remote end of the association, building real CCMs
struct Peer {
    def: MepDefinition,
    port: PortContext,
    seq: u32,
}

impl Peer {
    fn new(def: MepDefinition) -> Self {
        Self {
            def,
            port: PortContext {
                smac: MacAddr([0x02, 0, 0, 0, 0, 0x02]),
                ..PortContext::default()
            },
            seq: 0,
        }
    }

    fn good() -> Self {
        Self::new(peer_definition(
            MdConf::new("dom", 4),
            MaConf::new("ma", CcmInterval::Sec1),
            2,
        ))
    }

    fn ccm(&mut self) -> Bytes {
        self.frame(false)
    }

    fn frame(&mut self, rdi: bool) -> Bytes {
        let maid = Maid::build(&self.def.md, &self.def.ma).unwrap();
        let frame = CcmFrame::generate(&self.def, &self.port, &maid, rdi).unwrap();
        self.seq += 1;
        frame.stamp(self.seq)
    }
}

struct Harness {
    engine: CcmEngine,
    clock: ManualClock,
    injector: Arc<Mutex<InjectorLog>>,
    notifications: Arc<MemoryNotificationTable>,
    key: MepKey,
}

type Parts = (
    Services,
    ManualClock,
    Arc<Mutex<InjectorLog>>,
    Arc<MemoryNotificationTable>,
);

impl Harness {
    fn services() -> Parts {
        let clock = ManualClock::new();
        let injector = Arc::new(Mutex::new(InjectorLog::default()));
        let notifications = Arc::new(MemoryNotificationTable::new());
        let services = Services::new(
            Arc::new(clock.clone()),
            Box::new(RecordingInjector {
                log: injector.clone(),
            }),
            notifications.clone(),
        );
        (services, clock, injector, notifications)
    }

    fn build(
        services: Services,
        clock: ManualClock,
        injector: Arc<Mutex<InjectorLog>>,
        notifications: Arc<MemoryNotificationTable>,
        def: MepDefinition,
    ) -> Self {
        let key = def.key.clone();
        let mut engine = CcmEngine::new(services);
        engine.create_mep(def, PortContext::default()).unwrap();
        Self {
            engine,
            clock,
            injector,
            notifications,
            key,
        }
    }

    fn new(def: MepDefinition) -> Self {
        let (services, clock, injector, notifications) = Self::services();
        Self::build(services, clock, injector, notifications, def)
    }

    fn with_offload(def: MepDefinition, state: Arc<Mutex<OffloadState>>) -> Self {
        let (services, clock, injector, notifications) = Self::services();
        let services = services.with_offload(Box::new(FakeOffload { state }));
        Self::build(services, clock, injector, notifications, def)
    }

    /// Fire every timer due up to `t`, at its own deadline
    fn run_until(&mut self, t: u64) {
        while let Some(deadline) = self.engine.next_deadline() {
            if deadline > t {
                break;
            }
            self.clock.set(deadline);
            self.engine.process_timeouts();
        }
        self.clock.set(t);
    }

    fn step(&mut self, ms: u64) {
        let target = self.clock.now_ms() + ms;
        self.run_until(target);
    }

    fn send(&mut self, frame: &[u8]) -> RxVerdict {
        self.engine.rx_frame(&self.key, frame).unwrap()
    }

    /// One CCM per second from `peer` until `t`
    fn stream(&mut self, peer: &mut Peer, t: u64) {
        while self.clock.now_ms() + 1000 <= t {
            self.step(1000);
            assert_eq!(self.send(&peer.ccm()), RxVerdict::Valid);
        }
    }

    fn status(&self) -> MepStatus {
        self.engine.status(&self.key).unwrap()
    }

    fn rmep(&self) -> RemoteMep {
        self.engine.rmep_status(&self.key, 2).unwrap()
    }

    fn notification(&self) -> NotificationStatus {
        self.notifications.get(&self.key).unwrap()
    }

    fn running(&self) -> Vec<(InjectionHandle, CcmFrame)> {
        self.injector
            .lock()
            .running
            .iter()
            .map(|(handle, frame)| (InjectionHandle(*handle), frame.clone()))
            .collect()
    }

    fn running_rdi(&self) -> bool {
        let running = self.running();
        assert_eq!(running.len(), 1);
        running[0].1.bytes[16] & 0x80 != 0
    }

    fn starts(&self) -> usize {
        self.injector.lock().starts
    }
}

#[test]
fn test_loss_of_continuity_reported() {
    let mut h = Harness::new(local());
    h.run_until(10_500);

    let rmep = h.rmep();
    assert_eq!(rmep.state, RmepState::Failed);
    assert_eq!(rmep.failed_ok_time_ms, 3500);

    let status = h.status();
    assert!(status.defect_flags.some_remote_ccm);
    assert!(status.defect_flags.all_remotes_dead);
    assert_eq!(status.fng_state, FngState::DefectReported);
    assert_eq!(status.highest_defect, MepDefect::RemoteCcm);
    assert!(status.present_rdi);
    assert_eq!(h.notification().highest_defect, MepDefect::RemoteCcm);
    assert!(!h.notification().mep_ok);
}

#[test]
fn test_valid_stream_keeps_mep_ok() {
    let mut h = Harness::new(local());
    let mut peer = Peer::good();

    assert_eq!(h.send(&peer.ccm()), RxVerdict::Valid);
    h.stream(&mut peer, 20_000);

    let status = h.status();
    assert_eq!(status.defects, 0);
    assert_eq!(status.fng_state, FngState::Reset);
    assert!(!status.present_rdi);
    assert_eq!(status.counters.rx_valid, 21);
    assert_eq!(status.counters.rx_sequence_error, 0);

    let rmep = h.rmep();
    assert_eq!(rmep.state, RmepState::Ok);
    assert_eq!(rmep.smac, peer.port.smac);
    assert_eq!(rmep.last_sequence_number, 21);

    let notification = h.notification();
    assert!(notification.mep_ok);
    assert_eq!(notification.highest_defect, MepDefect::None);
}

#[test]
fn test_cross_connect_decays_after_good_frames() {
    let mut h = Harness::new(local());
    let mut peer = Peer::good();
    let mut foreign = Peer::new(peer_definition(
        MdConf::new("dom", 4),
        MaConf::new("other", CcmInterval::Sec1),
        2,
    ));

    h.send(&peer.ccm());
    h.stream(&mut peer, 3000);

    assert_eq!(h.send(&foreign.ccm()), RxVerdict::CrossConnect);
    let status = h.status();
    assert!(status.defect_flags.xcon_ccm);
    assert_eq!(status.defect_flags.highest(), MepDefect::XconCcm);
    assert!(status.present_rdi);

    // Decay is armed by the first good frame, at 4000
    h.stream(&mut peer, 7000);
    assert!(h.status().defect_flags.xcon_ccm);
    assert_eq!(h.notification().highest_defect, MepDefect::XconCcm);

    h.stream(&mut peer, 8000);
    let status = h.status();
    assert!(!status.defect_flags.xcon_ccm);
    assert!(!status.present_rdi);
    assert_eq!(status.fng_state, FngState::DefectClearing);
}

#[test]
fn test_level_demultiplexing() {
    let mut h = Harness::new(local());
    let mut lower = Peer::new(peer_definition(
        MdConf::new("dom", 3),
        MaConf::new("ma", CcmInterval::Sec1),
        2,
    ));
    let mut higher = Peer::new(peer_definition(
        MdConf::new("dom", 5),
        MaConf::new("ma", CcmInterval::Sec1),
        2,
    ));

    assert_eq!(h.send(&higher.ccm()), RxVerdict::Ignored);
    assert!(!h.status().defect_flags.xcon_ccm);

    assert_eq!(h.send(&lower.ccm()), RxVerdict::CrossConnect);
    assert!(h.status().defect_flags.xcon_ccm);
    assert_eq!(h.status().counters.rx_invalid, 1);
}

#[test]
fn test_unexpected_mep_and_interval_are_errors() {
    let mut h = Harness::new(local());
    let mut stranger = Peer::new(peer_definition(
        MdConf::new("dom", 4),
        MaConf::new("ma", CcmInterval::Sec1),
        3,
    ));
    let mut fast = Peer::new(peer_definition(
        MdConf::new("dom", 4),
        MaConf::new("ma", CcmInterval::Ms100),
        2,
    ));

    assert_eq!(h.send(&stranger.ccm()), RxVerdict::Error);
    assert!(h.status().defect_flags.error_ccm);
    assert!(!h.status().defect_flags.xcon_ccm);

    assert_eq!(h.send(&fast.ccm()), RxVerdict::Error);
    assert_eq!(h.rmep().state, RmepState::Start);
    assert_eq!(h.status().counters.rx_invalid, 2);
}

#[test]
fn test_received_rdi_is_not_echoed() {
    let mut h = Harness::new(local());
    let mut peer = Peer::good();
    h.send(&peer.ccm());
    let starts = h.starts();
    assert!(!h.running_rdi());

    h.step(1000);
    assert_eq!(h.send(&peer.frame(true)), RxVerdict::Valid);

    let status = h.status();
    assert!(status.defect_flags.some_rdi);
    assert_eq!(status.defects, cfm_core::defect_mask::RDI);
    assert!(!status.ma_defect_indication);
    assert!(!status.present_rdi);
    assert!(!h.notification().mep_ok);
    assert_eq!(h.starts(), starts);
    assert!(!h.running_rdi());
}

#[test]
fn test_local_defect_sets_rdi_in_next_frame() {
    let mut h = Harness::new(local());
    let mut peer = Peer::good();
    h.send(&peer.ccm());
    assert!(!h.running_rdi());

    // The peer reports its port as blocked
    peer.def.ma.tlv.port_status = TlvOption::Enable;
    peer.port.enable_rmep_defect = false;
    h.step(1000);
    h.send(&peer.ccm());

    assert_eq!(h.rmep().port_status, PortStatus::Blocked);
    assert!(h.status().defect_flags.some_mac_status);
    assert!(h.status().present_rdi);
    assert!(h.running_rdi());

    let (handle, _) = h.running()[0].clone();
    let next = h.engine.tx_tick(&h.key, handle).unwrap();
    assert_ne!(next[16] & 0x80, 0);
}

#[test]
fn test_higher_defect_re_raises_alarm() {
    let mut h = Harness::new(local());
    h.run_until(10_500);
    assert_eq!(h.notification().highest_defect, MepDefect::RemoteCcm);

    let mut foreign = Peer::new(peer_definition(
        MdConf::new("dom", 4),
        MaConf::new("other", CcmInterval::Sec1),
        2,
    ));
    h.send(&foreign.ccm());

    assert_eq!(h.status().fng_state, FngState::DefectReported);
    assert_eq!(h.notification().highest_defect, MepDefect::XconCcm);
}

#[test]
fn test_fault_alarm_clears_after_absent_time() {
    let mut h = Harness::new(local());
    let mut peer = Peer::good();
    h.send(&peer.ccm());
    h.stream(&mut peer, 2000);

    // Silence: LOC at 5500, reported at 8000
    h.run_until(9000);
    assert_eq!(h.status().fng_state, FngState::DefectReported);
    assert_eq!(h.notification().highest_defect, MepDefect::RemoteCcm);

    h.send(&peer.ccm());
    assert_eq!(h.rmep().state, RmepState::Ok);
    assert_eq!(h.status().fng_state, FngState::DefectClearing);

    h.stream(&mut peer, 18_000);
    assert_eq!(h.notification().highest_defect, MepDefect::RemoteCcm);

    h.stream(&mut peer, 20_000);
    assert_eq!(h.status().fng_state, FngState::Reset);
    assert_eq!(h.notification().highest_defect, MepDefect::None);
    assert!(h.notification().mep_ok);
}

#[test]
fn test_sequence_errors_counted() {
    let mut h = Harness::new(local());
    let mut peer = Peer::good();

    h.send(&peer.ccm());
    h.send(&peer.ccm());
    peer.seq += 1;
    h.send(&peer.ccm());
    h.send(&peer.ccm());

    let counters = h.status().counters;
    assert_eq!(counters.rx_valid, 4);
    assert_eq!(counters.rx_sequence_error, 1);
}

#[test]
fn test_invalid_frames_counted() {
    let mut h = Harness::new(local());
    let mut peer = Peer::good();
    let frame = peer.ccm();

    assert!(matches!(h.send(&frame[..30]), RxVerdict::Rejected(_)));

    let mut bad_interval = frame.to_vec();
    bad_interval[16] &= !0x07;
    assert_eq!(
        h.send(&bad_interval),
        RxVerdict::Rejected(Rejection::InvalidInterval)
    );

    let mut not_cfm = frame.to_vec();
    not_cfm[12..14].copy_from_slice(&[0x08, 0x00]);
    assert_eq!(h.send(&not_cfm), RxVerdict::Ignored);

    let counters = h.status().counters;
    assert_eq!(counters.rx_invalid, 2);
    assert_eq!(counters.rx_valid, 0);
}

#[test]
fn test_tx_tick_stamps_and_ignores_stale_handle() {
    let mut h = Harness::new(local());
    let (handle, frame) = h.running()[0].clone();

    let first = h.engine.tx_tick(&h.key, handle).unwrap();
    let second = h.engine.tx_tick(&h.key, handle).unwrap();
    let seq = frame.seq_offset;
    assert_eq!(&first[seq..seq + 4], &[0, 0, 0, 0]);
    assert_eq!(&second[seq..seq + 4], &[0, 0, 0, 1]);

    assert!(h.engine.tx_tick(&h.key, InjectionHandle(999)).is_none());
    assert_eq!(h.status().counters.tx, 2);

    // Regeneration with identical content keeps the schedule
    let starts = h.starts();
    h.engine
        .state_change(&h.key.clone(), StateChange::Tpid)
        .unwrap();
    assert_eq!(h.starts(), starts);
    assert_eq!(h.running()[0].0, handle);
}

#[test]
fn test_enable_rmep_defect_off() {
    let mut h = Harness::new(local());
    let mut peer = Peer::good();
    h.send(&peer.ccm());
    assert!(h.notification().mep_ok);

    let port = PortContext {
        enable_rmep_defect: false,
        ..PortContext::default()
    };
    let key = h.key.clone();
    h.engine.set_port_context(&key, port).unwrap();

    assert!(!h.notification().mep_ok);
    assert_eq!(h.rmep().state, RmepState::Start);
    assert_eq!(h.send(&peer.ccm()), RxVerdict::Ignored);

    h.run_until(20_000);
    assert_eq!(h.rmep().state, RmepState::Start);
}

#[test]
fn test_update_without_reset_keeps_state() {
    let mut h = Harness::new(local());
    let mut peer = Peer::good();
    h.send(&peer.ccm());
    let rmep = h.rmep();

    let mut def = local();
    def.mep.alarm_level = 3;
    h.engine.update_mep(def).unwrap();

    assert_eq!(h.rmep(), rmep);
    assert_eq!(h.status().counters.rx_valid, 1);
}

#[test]
fn test_update_rmep_set_resets() {
    let mut h = Harness::new(local());
    let mut peer = Peer::good();
    h.send(&peer.ccm());

    let mut def = local();
    def.mep.rmep_ids.insert(3);
    h.engine.update_mep(def).unwrap();

    let status = h.status();
    assert_eq!(status.rmeps.len(), 2);
    assert!(status
        .rmeps
        .values()
        .all(|rmep| rmep.state == RmepState::Start));
    assert_eq!(status.counters.rx_valid, 0);
    assert!(!h.notification().mep_ok);
}

#[test]
fn test_invalid_update_rejected_without_side_effects() {
    let mut h = Harness::new(local());
    let mut peer = Peer::good();
    h.send(&peer.ccm());

    let mut def = local();
    def.mep.alarm_level = 9;
    assert!(matches!(
        h.engine.update_mep(def),
        Err(Error::InvalidConfig { .. })
    ));
    assert_eq!(h.rmep().state, RmepState::Ok);

    let mut def = local();
    def.mep.mep_id = 7;
    let def = MepDefinition::new(def.global, def.md, def.ma, def.mep);
    assert!(matches!(h.engine.update_mep(def), Err(Error::NotFound(_))));
}

#[test]
fn test_update_rejected_by_injector_keeps_state() {
    let mut h = Harness::new(local());
    let mut peer = Peer::good();
    h.send(&peer.ccm());
    let (handle, frame) = h.running()[0].clone();

    let mut def = local();
    def.ma.ccm_interval = CcmInterval::Sec10;
    h.injector.lock().fail_start = true;
    assert!(matches!(
        h.engine.update_mep(def.clone()),
        Err(Error::OutOfResources(_))
    ));

    assert_eq!(h.rmep().state, RmepState::Ok);
    assert_eq!(h.status().counters.rx_valid, 1);
    assert_eq!(h.running(), vec![(handle, frame)]);
    // Still the old interval
    assert_eq!(h.send(&peer.ccm()), RxVerdict::Valid);

    h.injector.lock().fail_start = false;
    h.engine.update_mep(def).unwrap();
    let running = h.running();
    assert_eq!(running.len(), 1);
    assert_eq!(running[0].1.frames_per_hour, 360);
    assert_eq!(h.rmep().state, RmepState::Start);
}

#[test]
fn test_failed_stop_keeps_injection_cancellable() {
    let mut h = Harness::new(local());
    let (handle, _) = h.running()[0].clone();

    let mut def = local();
    def.ma.ccm_interval = CcmInterval::Sec10;
    h.injector.lock().fail_stop = true;
    assert!(matches!(
        h.engine.update_mep(def),
        Err(Error::Scheduler(_))
    ));
    assert_eq!(h.running().len(), 1);
    assert_eq!(h.running()[0].0, handle);

    let key = h.key.clone();
    h.engine.delete_mep(&key).unwrap();
    assert!(h.running().is_empty());
}

#[test]
fn test_port_change_rejected_by_injector_keeps_state() {
    let mut h = Harness::new(local());
    let mut peer = Peer::good();
    h.send(&peer.ccm());
    let running = h.running();

    let port = PortContext {
        smac: MacAddr([0x02, 0, 0, 0, 0, 0x09]),
        enable_rmep_defect: false,
        ..PortContext::default()
    };
    let key = h.key.clone();
    h.injector.lock().fail_start = true;
    assert!(h.engine.set_port_context(&key, port).is_err());

    assert!(h.status().enable_rmep_defect);
    assert_eq!(h.rmep().state, RmepState::Ok);
    assert!(h.notification().mep_ok);
    assert_eq!(h.running(), running);
}

#[test]
fn test_mep_without_peers_stays_inactive() {
    let mut def = local();
    def.mep.rmep_ids.clear();
    let mut h = Harness::new(def);

    let status = h.status();
    assert!(!status.mep_active);
    assert!(status.rmeps.is_empty());
    assert!(h.running().is_empty());
    assert!(!h.notification().mep_ok);
    assert_eq!(h.engine.next_deadline(), None);

    let mut peer = Peer::good();
    assert_eq!(h.send(&peer.ccm()), RxVerdict::Ignored);

    h.engine.update_mep(local()).unwrap();
    assert!(h.status().mep_active);
    assert_eq!(h.running().len(), 1);
    assert_eq!(h.send(&peer.ccm()), RxVerdict::Valid);
}

#[test]
fn test_duplicate_create_rejected() {
    let mut h = Harness::new(local());
    assert!(matches!(
        h.engine.create_mep(local(), PortContext::default()),
        Err(Error::AlreadyExists(_))
    ));
    assert_eq!(h.engine.len(), 1);
}

#[test]
fn test_failed_activation_leaves_nothing() {
    let (services, _clock, injector, notifications) = Harness::services();
    injector.lock().fail_start = true;
    let mut engine = CcmEngine::new(services);

    assert!(matches!(
        engine.create_mep(local(), PortContext::default()),
        Err(Error::OutOfResources(_))
    ));
    assert!(engine.is_empty());
    assert!(notifications.is_empty());
    assert_eq!(engine.next_deadline(), None);
}

#[test]
fn test_deactivate_clears_state() {
    let mut h = Harness::new(local());
    h.run_until(10_500);
    assert_eq!(h.notification().highest_defect, MepDefect::RemoteCcm);

    let mut def = local();
    def.mep.admin_active = false;
    h.engine.update_mep(def).unwrap();

    let status = h.status();
    assert!(!status.mep_active);
    assert_eq!(status.defects, 0);
    assert_eq!(status.fng_state, FngState::Reset);
    assert_eq!(h.rmep().state, RmepState::Start);
    assert!(h.running().is_empty());
    assert_eq!(h.notification(), NotificationStatus::default());
    assert_eq!(h.engine.next_deadline(), None);

    let mut peer = Peer::good();
    assert_eq!(h.send(&peer.ccm()), RxVerdict::Ignored);
}

#[test]
fn test_ccm_disabled_keeps_receiving() {
    let mut def = local();
    def.mep.ccm_enable = false;
    let mut h = Harness::new(def);
    assert!(h.running().is_empty());

    let mut peer = Peer::good();
    assert_eq!(h.send(&peer.ccm()), RxVerdict::Valid);
    assert_eq!(h.rmep().state, RmepState::Ok);

    let mut def = local();
    def.mep.ccm_enable = true;
    h.engine.update_mep(def).unwrap();
    assert_eq!(h.running().len(), 1);
}

#[test]
fn test_delete_removes_notification_and_timers() {
    let mut h = Harness::new(local());
    h.run_until(3000);
    assert!(h.notifications.get(&h.key).is_some());

    let key = h.key.clone();
    h.engine.delete_mep(&key).unwrap();

    assert!(h.notifications.get(&key).is_none());
    assert!(h.running().is_empty());
    assert_eq!(h.engine.next_deadline(), None);
    assert_eq!(h.engine.process_timeouts(), 0);
    assert!(matches!(h.engine.delete_mep(&key), Err(Error::NotFound(_))));
    assert!(h.engine.status(&key).is_err());
}

#[test]
fn test_statistics_clear() {
    let mut h = Harness::new(local());
    let mut peer = Peer::good();
    h.send(&peer.ccm());
    h.send(&peer.ccm());

    let key = h.key.clone();
    h.engine.statistics_clear(&key).unwrap();
    assert_eq!(h.status().counters, HwCounters::default());
    assert_eq!(h.rmep().state, RmepState::Ok);
}

#[test]
fn test_hardware_offload_path() {
    let state = Arc::new(Mutex::new(OffloadState::default()));
    state.lock().status.loc = true;
    let mut h = Harness::with_offload(local(), state.clone());

    let status = h.status();
    assert_eq!(status.detector, DetectorKind::Hardware);
    assert_eq!(state.lock().attached, vec![h.key.clone()]);
    assert_eq!(h.rmep().state, RmepState::Failed);
    assert!(status.present_rdi);
    assert_eq!(state.lock().rdi, Some(true));
    // The hardware inserts RDI itself
    assert!(!h.running_rdi());

    {
        let mut state = state.lock();
        state.status.loc = false;
        state.status.rdi = true;
    }
    let key = h.key.clone();
    h.engine.state_change(&key, StateChange::OffloadLoc).unwrap();
    assert_eq!(h.rmep().state, RmepState::Ok);
    assert!(h.rmep().rdi);
    assert!(!h.status().present_rdi);
    assert_eq!(state.lock().rdi, Some(false));

    state.lock().status.port_status = PortStatus::Blocked;
    h.engine
        .state_change(&key, StateChange::OffloadPortStatus)
        .unwrap();
    assert!(h.rmep().port_status_defect);
    assert!(h.status().defect_flags.some_mac_status);

    {
        let mut state = state.lock();
        state.status.port_status = PortStatus::Up;
        state.status.interface_status = InterfaceStatus::Down;
    }
    h.engine.state_change(&key, StateChange::OffloadIfStatus).unwrap();
    assert!(h.rmep().interface_status_defect);
    // Only the signalled TLV is taken over
    assert!(h.rmep().port_status_defect);

    state.lock().status.interface_status = InterfaceStatus::Up;
    h.engine.state_change(&key, StateChange::OffloadIfStatus).unwrap();
    h.engine
        .state_change(&key, StateChange::OffloadPortStatus)
        .unwrap();
    assert!(!h.status().defect_flags.some_mac_status);

    state.lock().status.mel_unexpected = true;
    h.engine.state_change(&key, StateChange::OffloadLevel).unwrap();
    assert!(h.status().defect_flags.xcon_ccm);

    // Mismatches are classified by the hardware
    let mut foreign = Peer::new(peer_definition(
        MdConf::new("dom", 4),
        MaConf::new("other", CcmInterval::Sec1),
        2,
    ));
    assert_eq!(h.send(&foreign.ccm()), RxVerdict::Offloaded);

    state.lock().counters.rx_valid = 42;
    assert_eq!(h.status().counters.rx_valid, 42);

    h.engine.delete_mep(&key).unwrap();
    assert!(state.lock().attached.is_empty());
}

#[test]
fn test_two_peers_offered_to_software() {
    let state = Arc::new(Mutex::new(OffloadState::default()));
    let mut def = local();
    def.mep.rmep_ids.insert(3);
    let h = Harness::with_offload(def, state.clone());

    assert_eq!(h.status().detector, DetectorKind::Software);
    assert!(state.lock().attached.is_empty());
}

//! Software CCM injection on the Tokio runtime
//!
//! Each started frame gets an interval task that does not touch the engine.
//! On every tick it posts a [`TxTick`] back to the engine task, which stamps
//! the sequence number and hands the frame to the sink. Ticks of a replaced or
//! stopped injection carry a stale handle and are dropped by the engine.

use cfm_ccm::{CcmFrame, Clock, InjectionHandle, InjectionScheduler};
use cfm_core::{Error, MepKey, Result};
use std::collections::HashMap;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, trace};
use uuid::Uuid;

/// Milliseconds since agent start, from Tokio's clock
///
/// Follows `tokio::time::pause`, so tests can run in virtual time.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    origin: Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Instant at which the clock reads `ms`
    pub fn instant_at(&self, ms: u64) -> Instant {
        self.origin + Duration::from_millis(ms)
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// A transmit slot is due
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxTick {
    pub key: MepKey,
    pub handle: InjectionHandle,
}

pub struct TokioInjectionScheduler {
    ticks: mpsc::UnboundedSender<TxTick>,
    tasks: HashMap<InjectionHandle, JoinHandle<()>>,
}

impl TokioInjectionScheduler {
    pub fn new(ticks: mpsc::UnboundedSender<TxTick>) -> Self {
        Self {
            ticks,
            tasks: HashMap::new(),
        }
    }

    /// Number of running injections
    pub fn active(&self) -> usize {
        self.tasks.len()
    }
}

impl InjectionScheduler for TokioInjectionScheduler {
    fn start(&mut self, key: &MepKey, frame: &CcmFrame) -> Result<InjectionHandle> {
        let runtime = Handle::try_current()
            .map_err(|e| Error::scheduler(format!("no Tokio runtime: {}", e)))?;

        let handle = InjectionHandle(Uuid::now_v7().as_u128());
        let period = Duration::from_millis(frame.period_ms().max(1));
        let ticks = self.ticks.clone();
        let tick = TxTick {
            key: key.clone(),
            handle,
        };

        let task = runtime.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                // The first tick completes immediately
                interval.tick().await;
                if ticks.send(tick.clone()).is_err() {
                    trace!(handle = %tick.handle, "Engine gone, injection task exiting");
                    break;
                }
            }
        });

        debug!(mep = %key, handle = %handle, period_ms = period.as_millis() as u64, "Injection started");
        self.tasks.insert(handle, task);
        Ok(handle)
    }

    fn stop(&mut self, handle: InjectionHandle) -> Result<()> {
        if let Some(task) = self.tasks.remove(&handle) {
            task.abort();
            debug!(handle = %handle, "Injection stopped");
        }
        Ok(())
    }
}

impl Drop for TokioInjectionScheduler {
    fn drop(&mut self) {
        for (_, task) in self.tasks.drain() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn frame(frames_per_hour: u64) -> CcmFrame {
        CcmFrame {
            bytes: Bytes::from_static(&[0; 64]),
            seq_offset: 18,
            frames_per_hour,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_at_frame_rate() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = TokioInjectionScheduler::new(tx);
        let key = MepKey::new("md", "ma", 1);

        let handle = scheduler.start(&key, &frame(3600)).unwrap();
        assert_eq!(scheduler.active(), 1);

        let start = Instant::now();
        let first = rx.recv().await.unwrap();
        assert_eq!(first, TxTick { key: key.clone(), handle });
        assert_eq!(start.elapsed(), Duration::ZERO);

        rx.recv().await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_millis(1000));

        scheduler.stop(handle).unwrap();
        scheduler.stop(handle).unwrap();
        assert_eq!(scheduler.active(), 0);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_handles_are_unique() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut scheduler = TokioInjectionScheduler::new(tx);
        let key = MepKey::new("md", "ma", 1);

        let a = scheduler.start(&key, &frame(360)).unwrap();
        let b = scheduler.start(&key, &frame(360)).unwrap();
        assert_ne!(a, b);
        assert_eq!(scheduler.active(), 2);
    }

    #[test]
    fn test_start_outside_runtime_fails() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut scheduler = TokioInjectionScheduler::new(tx);
        let key = MepKey::new("md", "ma", 1);
        assert!(matches!(
            scheduler.start(&key, &frame(3600)),
            Err(Error::Scheduler(_))
        ));
    }
}

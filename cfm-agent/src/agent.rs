//! CFM agent hosting the CCM engine
//!
//! The `CfmAgent` owns one [`CcmEngine`] inside a Tokio task. It provides:
//!
//! - An async request API (create, update, delete, status, ...) over `mpsc`,
//!   answered through `oneshot`
//! - Timer handling: the task sleeps until the engine's next deadline
//! - Software CCM injection through [`TokioInjectionScheduler`]
//! - Graceful shutdown, deleting every MEP
//!
//! The engine is only ever touched from its task, so no locking is involved.

use bytes::Bytes;
use cfm_ccm::{
    CcOffload, CcmEngine, MepStatus, PortContext, RemoteMep, RxVerdict, Services, StateChange,
};
use cfm_core::{CfmConfig, Error, MepDefinition, MepId, MepKey, Result};
use std::future;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, trace, warn};

use crate::notification::SharedNotificationTable;
use crate::scheduler::{TokioClock, TokioInjectionScheduler, TxTick};
use crate::sink::FrameSink;

const COMMAND_QUEUE_DEPTH: usize = 256;

type Reply<T> = oneshot::Sender<Result<T>>;

enum Command {
    CreateMep {
        def: MepDefinition,
        port: PortContext,
        reply: Reply<()>,
    },
    UpdateMep {
        def: MepDefinition,
        reply: Reply<()>,
    },
    DeleteMep {
        key: MepKey,
        reply: Reply<()>,
    },
    SetPortContext {
        key: MepKey,
        port: PortContext,
        reply: Reply<()>,
    },
    StateChange {
        key: MepKey,
        change: StateChange,
        reply: Reply<()>,
    },
    RxFrame {
        key: MepKey,
        frame: Bytes,
        reply: Reply<RxVerdict>,
    },
    Status {
        key: MepKey,
        reply: Reply<MepStatus>,
    },
    RmepStatus {
        key: MepKey,
        rmep_id: MepId,
        reply: Reply<RemoteMep>,
    },
    StatisticsClear {
        key: MepKey,
        reply: Reply<()>,
    },
    ListMeps {
        reply: Reply<Vec<MepKey>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to a running engine task
pub struct CfmAgent {
    commands: mpsc::Sender<Command>,
    notifications: Arc<SharedNotificationTable>,
    task: JoinHandle<()>,
}

impl CfmAgent {
    /// Start an agent that runs every MEP in software
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(sink: Arc<dyn FrameSink>) -> Self {
        Self::spawn_inner(sink, None)
    }

    /// Start an agent that offers MEPs to a hardware offload engine
    pub fn spawn_with_offload(sink: Arc<dyn FrameSink>, offload: Box<dyn CcOffload>) -> Self {
        Self::spawn_inner(sink, Some(offload))
    }

    fn spawn_inner(sink: Arc<dyn FrameSink>, offload: Option<Box<dyn CcOffload>>) -> Self {
        let clock = TokioClock::new();
        let notifications = Arc::new(SharedNotificationTable::new());
        let (tick_tx, tick_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);

        let mut services = Services::new(
            Arc::new(clock),
            Box::new(TokioInjectionScheduler::new(tick_tx)),
            notifications.clone(),
        );
        if let Some(offload) = offload {
            services = services.with_offload(offload);
        }

        let engine = CcmEngine::new(services);
        let task = tokio::spawn(run(engine, clock, command_rx, tick_rx, sink));
        info!("CFM agent started");

        Self {
            commands: command_tx,
            notifications,
            task,
        }
    }

    pub async fn create_mep(&self, def: MepDefinition, port: PortContext) -> Result<()> {
        self.request(|reply| Command::CreateMep { def, port, reply })
            .await
    }

    pub async fn update_mep(&self, def: MepDefinition) -> Result<()> {
        self.request(|reply| Command::UpdateMep { def, reply }).await
    }

    pub async fn delete_mep(&self, key: &MepKey) -> Result<()> {
        let key = key.clone();
        self.request(|reply| Command::DeleteMep { key, reply }).await
    }

    pub async fn set_port_context(&self, key: &MepKey, port: PortContext) -> Result<()> {
        let key = key.clone();
        self.request(|reply| Command::SetPortContext { key, port, reply })
            .await
    }

    pub async fn state_change(&self, key: &MepKey, change: StateChange) -> Result<()> {
        let key = key.clone();
        self.request(|reply| Command::StateChange { key, change, reply })
            .await
    }

    /// Deliver a frame received on a MEP's residence port
    pub async fn rx_frame(&self, key: &MepKey, frame: Bytes) -> Result<RxVerdict> {
        let key = key.clone();
        self.request(|reply| Command::RxFrame { key, frame, reply })
            .await
    }

    pub async fn status(&self, key: &MepKey) -> Result<MepStatus> {
        let key = key.clone();
        self.request(|reply| Command::Status { key, reply }).await
    }

    pub async fn rmep_status(&self, key: &MepKey, rmep_id: MepId) -> Result<RemoteMep> {
        let key = key.clone();
        self.request(|reply| Command::RmepStatus {
            key,
            rmep_id,
            reply,
        })
        .await
    }

    pub async fn statistics_clear(&self, key: &MepKey) -> Result<()> {
        let key = key.clone();
        self.request(|reply| Command::StatisticsClear { key, reply })
            .await
    }

    pub async fn list_meps(&self) -> Result<Vec<MepKey>> {
        self.request(|reply| Command::ListMeps { reply }).await
    }

    /// Create every MEP of a configuration, all on the same residence port
    ///
    /// The whole configuration is validated before any MEP is created. If a
    /// MEP cannot be created, the ones created by this call are deleted again.
    pub async fn apply_config(&self, config: &CfmConfig, port: PortContext) -> Result<usize> {
        config.validate()?;

        let definitions = config.mep_definitions();
        let mut created = Vec::with_capacity(definitions.len());
        for def in definitions {
            let key = def.key.clone();
            if let Err(e) = self.create_mep(def, port.clone()).await {
                warn!(mep = %key, error = %e, rollback = created.len(), "Configuration rejected");
                for key in created.iter().rev() {
                    if let Err(undo) = self.delete_mep(key).await {
                        error!(mep = %key, error = %undo, "Failed to roll back MEP");
                    }
                }
                return Err(e);
            }
            created.push(key);
        }

        info!(meps = created.len(), "Configuration applied");
        Ok(created.len())
    }

    /// Alarm state of every MEP, readable without going through the engine
    pub fn notifications(&self) -> Arc<SharedNotificationTable> {
        self.notifications.clone()
    }

    /// Stop the engine task, deleting every MEP
    pub async fn shutdown(self) -> Result<()> {
        info!("Shutting down CFM agent");

        let (reply, done) = oneshot::channel();
        if self.commands.send(Command::Shutdown { reply }).await.is_ok() {
            let _ = done.await;
        }

        self.task
            .await
            .map_err(|e| Error::internal(format!("engine task failed: {}", e)))
    }

    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| Error::Shutdown("engine task is not running".to_string()))?;
        response
            .await
            .map_err(|_| Error::Shutdown("engine task dropped the request".to_string()))?
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => future::pending().await,
    }
}

async fn run(
    mut engine: CcmEngine,
    clock: TokioClock,
    mut commands: mpsc::Receiver<Command>,
    mut ticks: mpsc::UnboundedReceiver<TxTick>,
    sink: Arc<dyn FrameSink>,
) {
    let mut shutdown_reply = None;

    loop {
        let deadline = engine.next_deadline().map(|ms| clock.instant_at(ms));

        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Shutdown { reply }) => {
                    shutdown_reply = Some(reply);
                    break;
                }
                Some(command) => handle(&mut engine, command),
                None => {
                    debug!("All agent handles dropped");
                    break;
                }
            },
            Some(tick) = ticks.recv() => {
                if let Some(frame) = engine.tx_tick(&tick.key, tick.handle) {
                    if let Err(e) = sink.send(&tick.key, frame).await {
                        warn!(mep = %tick.key, error = %e, "Failed to send CCM");
                    }
                }
            },
            _ = sleep_until_deadline(deadline) => {
                let fired = engine.process_timeouts();
                trace!(fired, "Timers processed");
            },
        }
    }

    let keys: Vec<MepKey> = engine.mep_keys().cloned().collect();
    for key in keys {
        if let Err(e) = engine.delete_mep(&key) {
            error!(mep = %key, error = %e, "Failed to delete MEP on shutdown");
        }
    }

    info!("CFM agent stopped");
    if let Some(reply) = shutdown_reply {
        let _ = reply.send(());
    }
}

fn handle(engine: &mut CcmEngine, command: Command) {
    // A dropped reply only means the caller stopped waiting
    match command {
        Command::CreateMep { def, port, reply } => {
            let _ = reply.send(engine.create_mep(def, port));
        }
        Command::UpdateMep { def, reply } => {
            let _ = reply.send(engine.update_mep(def));
        }
        Command::DeleteMep { key, reply } => {
            let _ = reply.send(engine.delete_mep(&key));
        }
        Command::SetPortContext { key, port, reply } => {
            let _ = reply.send(engine.set_port_context(&key, port));
        }
        Command::StateChange { key, change, reply } => {
            let _ = reply.send(engine.state_change(&key, change));
        }
        Command::RxFrame { key, frame, reply } => {
            let _ = reply.send(engine.rx_frame(&key, &frame));
        }
        Command::Status { key, reply } => {
            let _ = reply.send(engine.status(&key));
        }
        Command::RmepStatus {
            key,
            rmep_id,
            reply,
        } => {
            let _ = reply.send(engine.rmep_status(&key, rmep_id));
        }
        Command::StatisticsClear { key, reply } => {
            let _ = reply.send(engine.statistics_clear(&key));
        }
        Command::ListMeps { reply } => {
            let _ = reply.send(Ok(engine.mep_keys().cloned().collect()));
        }
        Command::Shutdown { reply } => {
            let _ = reply.send(());
        }
    }
}

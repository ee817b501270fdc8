//! Tokio host for the CFM-RS continuity check engine
//!
//! This crate runs a [`cfm_ccm::CcmEngine`] on a Tokio runtime. It includes:
//!
//! - `CfmAgent`: owns the engine in a single task and exposes an async API
//! - `TokioInjectionScheduler`: periodic software CCM injection
//! - `FrameSink`: egress for transmitted frames
//! - `SharedNotificationTable`: fault alarm state readable from any thread
//!
//! # Example
//!
//! ```no_run
//! use cfm_agent::{init_tracing, CfmAgent, ChannelSink};
//! use cfm_ccm::PortContext;
//! use cfm_core::CfmConfig;
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     init_tracing("info");
//!
//!     let (sink, mut frames) = ChannelSink::new();
//!     let agent = CfmAgent::spawn(Arc::new(sink));
//!
//!     let config = CfmConfig::load(Path::new("cfm.toml"))?;
//!     agent.apply_config(&config, PortContext::default()).await?;
//!
//!     while let Some((mep, frame)) = frames.recv().await {
//!         println!("{}: {} bytes", mep, frame.len());
//!     }
//!
//!     agent.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod notification;
pub mod scheduler;
pub mod sink;
pub mod telemetry;

pub use agent::CfmAgent;
pub use notification::SharedNotificationTable;
pub use scheduler::{TokioClock, TokioInjectionScheduler, TxTick};
pub use sink::{ChannelSink, FrameSink};
pub use telemetry::init_tracing;

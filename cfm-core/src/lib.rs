//! CFM-RS Core Library
//!
//! This crate provides the shared types, error handling and configuration
//! model for the CFM-RS continuity check engine (IEEE 802.1ag / ITU-T Y.1731).

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{
    resolve, CfmConfig, Deferrable, GlobalConf, MaConf, MaFormat, MdConf, MdFormat,
    MepConf, MepDefinition, SenderIdTlvOption, TlvOption, TlvPolicy,
};
pub use error::{Error, Result};
pub use types::*;

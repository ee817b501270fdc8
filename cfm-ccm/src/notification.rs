//! Fault alarm notification table
//!
//! One entry per MEP, written only by that MEP's engine state and read by
//! whoever exports alarms (SNMP traps, JSON-RPC events, logs).

use cfm_core::{MepDefect, MepKey, Result};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;

/// Externally visible alarm state of a MEP
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NotificationStatus {
    /// Last defect reported by the fault notification generator
    pub highest_defect: MepDefect,
    /// Active, with enableRmepDefect set and no defects at all
    pub mep_ok: bool,
}

/// Keyed store of [`NotificationStatus`]
pub trait NotificationTable: Send + Sync {
    fn get(&self, key: &MepKey) -> Option<NotificationStatus>;

    fn set(&self, key: &MepKey, status: NotificationStatus) -> Result<()>;

    /// Deleting a missing entry is not an error
    fn delete(&self, key: &MepKey) -> Result<()>;
}

/// In-process table behind a read/write lock
#[derive(Debug, Default)]
pub struct MemoryNotificationTable {
    entries: RwLock<HashMap<MepKey, NotificationStatus>>,
}

impl MemoryNotificationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl NotificationTable for MemoryNotificationTable {
    fn get(&self, key: &MepKey) -> Option<NotificationStatus> {
        self.entries.read().get(key).copied()
    }

    fn set(&self, key: &MepKey, status: NotificationStatus) -> Result<()> {
        self.entries.write().insert(key.clone(), status);
        Ok(())
    }

    fn delete(&self, key: &MepKey) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }
}

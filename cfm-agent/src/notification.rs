//! Notification table shared with alarm exporters
//!
//! The engine task writes, any thread reads.

use cfm_ccm::{NotificationStatus, NotificationTable};
use cfm_core::{MepDefect, MepKey, Result};
use dashmap::DashMap;

#[derive(Debug, Default)]
pub struct SharedNotificationTable {
    entries: DashMap<MepKey, NotificationStatus>,
}

impl SharedNotificationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every entry, ordered by key
    pub fn snapshot(&self) -> Vec<(MepKey, NotificationStatus)> {
        let mut entries: Vec<_> = self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// MEPs with a raised fault alarm
    pub fn alarms(&self) -> Vec<(MepKey, MepDefect)> {
        self.snapshot()
            .into_iter()
            .filter(|(_, status)| status.highest_defect != MepDefect::None)
            .map(|(key, status)| (key, status.highest_defect))
            .collect()
    }
}

impl NotificationTable for SharedNotificationTable {
    fn get(&self, key: &MepKey) -> Option<NotificationStatus> {
        self.entries.get(key).map(|entry| *entry.value())
    }

    fn set(&self, key: &MepKey, status: NotificationStatus) -> Result<()> {
        self.entries.insert(key.clone(), status);
        Ok(())
    }

    fn delete(&self, key: &MepKey) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

//! Per-tab hidden video counters.
//!
//! Counts reset on navigation. Every change is pushed to observers (the
//! popup) as a `hidden-video-count` message.

use crate::protocol::{Outbound, TabId};
use std::collections::HashMap;
use tokio::sync::mpsc::UnboundedSender;

pub struct TabSessions {
    counts: HashMap<TabId, u32>,
    observers: UnboundedSender<Outbound>,
}

impl TabSessions {
    pub fn new(observers: UnboundedSender<Outbound>) -> Self {
        Self {
            counts: HashMap::new(),
            observers,
        }
    }

    pub fn increment(&mut self, tab_id: TabId) -> u32 {
        let count = self.counts.entry(tab_id).or_insert(0);
        *count = count.saturating_add(1);
        let count = *count;
        self.notify(tab_id, count);
        count
    }

    pub fn reset(&mut self, tab_id: TabId) {
        self.counts.insert(tab_id, 0);
        self.notify(tab_id, 0);
    }

    pub fn get(&self, tab_id: TabId) -> u32 {
        self.counts.get(&tab_id).copied().unwrap_or(0)
    }

    /// Drop a closed tab's counter.
    pub fn forget(&mut self, tab_id: TabId) {
        self.counts.remove(&tab_id);
    }

    fn notify(&self, tab_id: TabId, count: u32) {
        log::debug!("[SESSION] Tab {} hidden count = {}", tab_id, count);
        // Popup is usually closed; nobody listening is fine.
        let _ = self
            .observers
            .send(Outbound::HiddenVideoCount { count, tab_id });
    }
}

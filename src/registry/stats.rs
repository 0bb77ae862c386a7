//! Registry statistics

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Running counters kept by the registry
#[derive(Debug, Default)]
pub(crate) struct RegistryCounters {
    pub total_added: AtomicU64,
    pub total_removed: AtomicU64,
    pub broadcasts: AtomicU64,
    pub delivered: AtomicU64,
    pub failed: AtomicU64,
}

impl RegistryCounters {
    pub fn snapshot(&self, members: usize) -> RegistryStats {
        RegistryStats {
            members,
            total_added: self.total_added.load(Ordering::Relaxed),
            total_removed: self.total_removed.load(Ordering::Relaxed),
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time registry statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub members: usize,
    pub total_added: u64,
    pub total_removed: u64,
    pub broadcasts: u64,
    pub delivered: u64,
    pub failed: u64,
}

/// Outcome of one broadcast
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BroadcastReport {
    /// Size of the recipient snapshot
    pub recipients: usize,
    pub delivered: usize,
    pub failed: usize,
}

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Kinds of engine resource a capture session acquires.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Input,
    Decoder,
    Frame,
    Packet,
    Graph,
    Scaler,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 6] = [
        ResourceKind::Input,
        ResourceKind::Decoder,
        ResourceKind::Frame,
        ResourceKind::Packet,
        ResourceKind::Graph,
        ResourceKind::Scaler,
    ];
}

#[derive(Clone, Copy, Debug, Default)]
struct Counts {
    allocated: usize,
    released: usize,
}

/// Counts acquisitions and releases of synthetic engine resources so tests
/// can check that a session leaves nothing behind.
#[derive(Debug, Default)]
pub struct ResourceLedger {
    counts: Mutex<HashMap<ResourceKind, Counts>>,
}

impl ResourceLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn acquire(self: &Arc<Self>, kind: ResourceKind) -> ResourceGuard {
        self.update(kind, |c| c.allocated += 1);
        ResourceGuard {
            ledger: Arc::clone(self),
            kind,
        }
    }

    pub fn allocated(&self, kind: ResourceKind) -> usize {
        self.get(kind).allocated
    }

    pub fn released(&self, kind: ResourceKind) -> usize {
        self.get(kind).released
    }

    pub fn live(&self, kind: ResourceKind) -> usize {
        let c = self.get(kind);
        c.allocated.saturating_sub(c.released)
    }

    /// True when every acquired resource was released exactly once.
    pub fn all_released(&self) -> bool {
        ResourceKind::ALL.iter().all(|&kind| {
            let c = self.get(kind);
            c.allocated == c.released
        })
    }

    fn release(&self, kind: ResourceKind) {
        self.update(kind, |c| c.released += 1);
    }

    fn get(&self, kind: ResourceKind) -> Counts {
        self.counts
            .lock()
            .map(|counts| counts.get(&kind).copied().unwrap_or_default())
            .unwrap_or_default()
    }

    fn update(&self, kind: ResourceKind, f: impl FnOnce(&mut Counts)) {
        if let Ok(mut counts) = self.counts.lock() {
            f(counts.entry(kind).or_default());
        }
    }
}

/// Marks one live resource. Dropping it records the release.
#[derive(Debug)]
pub struct ResourceGuard {
    ledger: Arc<ResourceLedger>,
    kind: ResourceKind,
}

impl ResourceGuard {
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }
}

impl Drop for ResourceGuard {
    fn drop(&mut self) {
        self.ledger.release(self.kind);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_drop_releases() {
        let ledger = ResourceLedger::new();
        let guard = ledger.acquire(ResourceKind::Frame);
        assert_eq!(guard.kind(), ResourceKind::Frame);
        assert_eq!(ledger.live(ResourceKind::Frame), 1);
        assert!(!ledger.all_released());

        drop(guard);
        assert_eq!(ledger.live(ResourceKind::Frame), 0);
        assert_eq!(ledger.allocated(ResourceKind::Frame), 1);
        assert_eq!(ledger.released(ResourceKind::Frame), 1);
        assert!(ledger.all_released());
    }

    #[test]
    fn test_kinds_are_counted_separately() {
        let ledger = ResourceLedger::new();
        let _a = ledger.acquire(ResourceKind::Input);
        let _b = ledger.acquire(ResourceKind::Packet);
        let _c = ledger.acquire(ResourceKind::Packet);
        assert_eq!(ledger.live(ResourceKind::Input), 1);
        assert_eq!(ledger.live(ResourceKind::Packet), 2);
        assert_eq!(ledger.allocated(ResourceKind::Scaler), 0);
    }

    #[test]
    fn test_empty_ledger_is_released() {
        assert!(ResourceLedger::new().all_released());
    }
}

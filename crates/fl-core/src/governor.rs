//! Per-method throw counters.
//!
//! Every injected prologue calls into the governor before anything is
//! synthesized. A method's counter is created on first use, incremented on
//! every call, and compared against the ceiling; once past it the method
//! runs normally for the rest of the process lifetime.

use fl_common::MethodId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

#[derive(Debug)]
pub struct ThrowGovernor {
    counters: RwLock<HashMap<MethodId, Arc<AtomicU64>>>,
    ceiling: AtomicU64,
}

impl ThrowGovernor {
    pub fn new(ceiling: u64) -> Self {
        Self {
            counters: RwLock::new(HashMap::new()),
            ceiling: AtomicU64::new(ceiling),
        }
    }

    /// Count one call and report whether it may throw.
    ///
    /// With ceiling `C`, exactly the first `C` calls per method get `true`,
    /// however many threads race on the counter.
    pub fn should_throw(&self, method: &MethodId) -> bool {
        let counter = self.counter(method);
        let count = counter.fetch_add(1, Ordering::AcqRel).saturating_add(1);
        count <= self.ceiling.load(Ordering::Acquire)
    }

    /// Calls seen so far for `method`.
    pub fn count(&self, method: &MethodId) -> u64 {
        self.read()
            .get(method)
            .map_or(0, |c| c.load(Ordering::Acquire))
    }

    pub fn ceiling(&self) -> u64 {
        self.ceiling.load(Ordering::Acquire)
    }

    /// Change the ceiling. Counters are not reset.
    pub fn set_ceiling(&self, ceiling: u64) {
        self.ceiling.store(ceiling, Ordering::Release);
    }

    /// Number of methods that have been dispatched at least once.
    pub fn tracked_methods(&self) -> usize {
        self.read().len()
    }

    fn counter(&self, method: &MethodId) -> Arc<AtomicU64> {
        if let Some(counter) = self.read().get(method) {
            return Arc::clone(counter);
        }
        let mut counters = self
            .counters
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // Another thread may have inserted between the two locks.
        Arc::clone(counters.entry(method.clone()).or_default())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<MethodId, Arc<AtomicU64>>> {
        self.counters
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn id(s: &str) -> MethodId {
        MethodId::from_raw(s)
    }

    #[test]
    fn default_ceiling_throws_once() {
        let g = ThrowGovernor::new(1);
        let m = id("com.acme.Repo.load");
        assert!(g.should_throw(&m));
        assert!(!g.should_throw(&m));
        assert!(!g.should_throw(&m));
        assert_eq!(g.count(&m), 3);
    }

    #[test]
    fn counters_are_independent() {
        let g = ThrowGovernor::new(1);
        assert!(g.should_throw(&id("a.A.f")));
        assert!(g.should_throw(&id("a.A.g")));
        assert_eq!(g.tracked_methods(), 2);
    }

    #[test]
    fn zero_ceiling_never_throws() {
        let g = ThrowGovernor::new(0);
        assert!(!g.should_throw(&id("a.A.f")));
    }

    #[test]
    fn raising_the_ceiling_allows_more_throws() {
        let g = ThrowGovernor::new(1);
        let m = id("a.A.f");
        assert!(g.should_throw(&m));
        assert!(!g.should_throw(&m));
        g.set_ceiling(3);
        assert!(g.should_throw(&m));
        assert!(!g.should_throw(&m));
    }

    #[test]
    fn concurrent_first_calls_throw_exactly_ceiling_times() {
        for ceiling in [1u64, 5] {
            let g = Arc::new(ThrowGovernor::new(ceiling));
            let handles: Vec<_> = (0..16)
                .map(|_| {
                    let g = Arc::clone(&g);
                    thread::spawn(move || {
                        (0..50)
                            .filter(|_| g.should_throw(&id("com.acme.Hot.path")))
                            .count()
                    })
                })
                .collect();
            let throws: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
            assert_eq!(throws as u64, ceiling);
            assert_eq!(g.count(&id("com.acme.Hot.path")), 800);
        }
    }
}

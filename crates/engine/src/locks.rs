//! Per-container mutual exclusion.
//!
//! Operations that touch several containers lock all of them up front, in
//! ascending id order, so two operations can never wait on each other in a
//! cycle. Guards release on drop, on every exit path.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use stowage_core::{ContainerId, DomainError, DomainResult};

#[derive(Debug, Default)]
pub struct ContainerLocks {
    registry: Mutex<BTreeMap<ContainerId, Arc<Mutex<()>>>>,
}

impl ContainerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the mutexes for `ids` (deduplicated and sorted). Locks for ids
    /// seen for the first time are created lazily.
    pub fn handles<'a, I>(&self, ids: I) -> DomainResult<LockSet>
    where
        I: IntoIterator<Item = &'a ContainerId>,
    {
        let ids: BTreeSet<&ContainerId> = ids.into_iter().collect();
        let mut registry = self
            .registry
            .lock()
            .map_err(|_| DomainError::conflict("container lock registry poisoned"))?;
        let handles = ids
            .into_iter()
            .map(|id| (id.clone(), Arc::clone(registry.entry(id.clone()).or_default())))
            .collect();
        Ok(LockSet { handles })
    }
}

/// Mutexes for a sorted set of containers.
#[derive(Debug)]
pub struct LockSet {
    handles: Vec<(ContainerId, Arc<Mutex<()>>)>,
}

impl LockSet {
    pub fn ids(&self) -> impl Iterator<Item = &ContainerId> {
        self.handles.iter().map(|(id, _)| id)
    }

    /// Lock every container in ascending id order.
    pub fn lock(&self) -> DomainResult<Vec<MutexGuard<'_, ()>>> {
        self.handles
            .iter()
            .map(|(id, mutex)| {
                mutex
                    .lock()
                    .map_err(|_| DomainError::conflict(format!("lock of container {id} poisoned")))
            })
            .collect()
    }
}

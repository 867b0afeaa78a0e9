// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Opaque handles binding resource events to their scopes.
//!
//! The caller issues a [`ResourceKey`] when a resource starts and releases it
//! once it no longer cares about the resource. A released key is never live
//! again: its slot is recycled with a bumped generation, so a stale handle can
//! never alias a newer resource. Scopes still tracking a released key treat it
//! as orphaned and drop it silently.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::trace;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceKey {
    slot: u32,
    generation: u32,
}

impl ResourceKey {
    #[must_use]
    pub const fn slot(&self) -> u32 {
        self.slot
    }

    #[must_use]
    pub const fn generation(&self) -> u32 {
        self.generation
    }
}

impl std::fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.slot, self.generation)
    }
}

#[derive(Debug, Default)]
struct Slots {
    generations: Vec<u32>,
    live: Vec<bool>,
    free: Vec<u32>,
}

/// Shared registry of issued keys. Clones refer to the same registry.
#[derive(Debug, Clone, Default)]
pub struct ResourceKeyRegistry {
    slots: Arc<Mutex<Slots>>,
}

impl ResourceKeyRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues a new live key, recycling a released slot when one is available.
    pub fn issue(&self) -> ResourceKey {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = slots.free.pop() {
            let index = slot as usize;
            slots.live[index] = true;
            let generation = slots.generations[index];
            return ResourceKey { slot, generation };
        }
        let slot = u32::try_from(slots.generations.len()).unwrap_or(u32::MAX);
        slots.generations.push(0);
        slots.live.push(true);
        ResourceKey {
            slot,
            generation: 0,
        }
    }

    /// Invalidates a key. Releasing an already released key is a no-op.
    pub fn release(&self, key: &ResourceKey) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let index = key.slot as usize;
        let is_current = slots.generations.get(index) == Some(&key.generation)
            && slots.live.get(index).copied().unwrap_or(false);
        if !is_current {
            trace!("Ignoring release of stale resource key {key}");
            return;
        }
        slots.live[index] = false;
        slots.generations[index] = key.generation.wrapping_add(1);
        slots.free.push(key.slot);
    }

    #[must_use]
    pub fn is_live(&self, key: &ResourceKey) -> bool {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let index = key.slot as usize;
        slots.generations.get(index) == Some(&key.generation)
            && slots.live.get(index).copied().unwrap_or(false)
    }

    /// Number of keys currently live.
    #[must_use]
    pub fn live_count(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.live.iter().filter(|live| **live).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issued_keys_are_distinct_and_live() {
        let registry = ResourceKeyRegistry::new();
        let first = registry.issue();
        let second = registry.issue();
        assert_ne!(first, second);
        assert!(registry.is_live(&first));
        assert!(registry.is_live(&second));
        assert_eq!(registry.live_count(), 2);
    }

    #[test]
    fn test_released_key_is_never_live_again() {
        let registry = ResourceKeyRegistry::new();
        let key = registry.issue();
        registry.release(&key);
        assert!(!registry.is_live(&key));

        let recycled = registry.issue();
        assert_eq!(recycled.slot(), key.slot());
        assert_ne!(recycled.generation(), key.generation());
        assert!(registry.is_live(&recycled));
        assert!(!registry.is_live(&key));
    }

    #[test]
    fn test_double_release_does_not_free_recycled_slot() {
        let registry = ResourceKeyRegistry::new();
        let key = registry.issue();
        registry.release(&key);
        let recycled = registry.issue();
        registry.release(&key);
        assert!(registry.is_live(&recycled));
    }

    #[test]
    fn test_clones_share_state() {
        let registry = ResourceKeyRegistry::new();
        let clone = registry.clone();
        let key = registry.issue();
        clone.release(&key);
        assert!(!registry.is_live(&key));
    }
}

//! Signal storage for a single chunk
//!
//! Signals live in an arena owned by their chunk and are addressed two
//! ways: by [`SignalKey`] (the stable model-wide key the partitioner
//! assigned, used on the wire) and by [`SlotIndex`] (the position in the
//! arena, resolved once when an operator is built). Operators hold slot
//! indices, never references, so reconfiguring a chunk can never leave a
//! dangling pointer behind.
//!
//! Slots wrap their tensor in a `RefCell`: within a chunk, operators run
//! strictly sequentially, but a single operator reads some signals while
//! writing another. A borrow conflict at run time means the configuration
//! aliased a destination with one of its own sources, which is a
//! configuration precondition violation and aborts the process.

use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashMap;

use super::tensor::Tensor;

/// Stable model-wide key of a signal, assigned by the partitioner.
pub type SignalKey = u64;

/// Position of a signal in its owning chunk's arena.
pub type SlotIndex = usize;

#[derive(Debug)]
struct Slot {
    key: SignalKey,
    label: String,
    value: RefCell<Tensor>,
}

/// Arena of signals owned by one chunk.
#[derive(Debug, Default)]
pub struct SignalStore {
    slots: Vec<Slot>,
    by_key: HashMap<SignalKey, SlotIndex>,
}

impl SignalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a signal. The extent of `value` is fixed for the lifetime of the
    /// store. Re-adding an existing key overwrites the previous slot's
    /// mapping; the partitioner never emits duplicate keys.
    pub fn add(&mut self, key: SignalKey, label: impl Into<String>, value: Tensor) -> SlotIndex {
        let index = self.slots.len();
        self.slots.push(Slot {
            key,
            label: label.into(),
            value: RefCell::new(value),
        });
        self.by_key.insert(key, index);
        index
    }

    /// Resolve a model key to its arena slot.
    pub fn resolve(&self, key: SignalKey) -> Option<SlotIndex> {
        self.by_key.get(&key).copied()
    }

    /// Model key of a slot.
    pub fn key_of(&self, index: SlotIndex) -> SignalKey {
        self.slots[index].key
    }

    /// Human-readable label of a slot.
    pub fn label_of(&self, index: SlotIndex) -> &str {
        &self.slots[index].label
    }

    /// Borrow a signal for reading.
    pub fn read(&self, index: SlotIndex) -> Ref<'_, Tensor> {
        self.slots[index].value.borrow()
    }

    /// Borrow a signal for writing.
    pub fn write(&self, index: SlotIndex) -> RefMut<'_, Tensor> {
        self.slots[index].value.borrow_mut()
    }

    /// Deep copy of a signal's current value.
    pub fn snapshot(&self, index: SlotIndex) -> Tensor {
        self.slots[index].value.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_resolve() {
        let mut store = SignalStore::new();
        let idx = store.add(42, "voltage", Tensor::vector(vec![0.0, 0.0]));
        assert_eq!(store.resolve(42), Some(idx));
        assert_eq!(store.resolve(7), None);
        assert_eq!(store.key_of(idx), 42);
        assert_eq!(store.label_of(idx), "voltage");
    }

    #[test]
    fn test_read_write() {
        let mut store = SignalStore::new();
        let idx = store.add(1, "x", Tensor::vector(vec![1.0, 2.0]));
        store.write(idx).fill(9.0);
        assert_eq!(store.read(idx).data, vec![9.0, 9.0]);
    }

    #[test]
    fn test_snapshot_is_deep_copy() {
        let mut store = SignalStore::new();
        let idx = store.add(1, "x", Tensor::vector(vec![1.0]));
        let snap = store.snapshot(idx);
        store.write(idx).fill(5.0);
        assert_eq!(snap.data, vec![1.0]);
    }
}

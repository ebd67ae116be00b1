//! # Owned Slot
//!
//! Single-owner holder for a heap value that is swapped out and dropped on
//! every replacement.

use alloc::boxed::Box;

/// Exclusively-owned, replaceable value
#[derive(Debug)]
pub struct OwnedSlot<T> {
    value: Option<Box<T>>,
}

impl<T> OwnedSlot<T> {
    /// Empty slot
    pub const fn empty() -> Self {
        Self { value: None }
    }

    /// Store `value`, dropping the previous one
    pub fn replace(&mut self, value: Box<T>) {
        // Previous value drops here
        self.value = Some(value);
    }

    /// Current value
    pub fn get(&self) -> Option<&T> {
        self.value.as_deref()
    }

    /// Remove the value without dropping it
    pub fn take(&mut self) -> Option<Box<T>> {
        self.value.take()
    }

    /// Check if a value is held
    pub fn is_occupied(&self) -> bool {
        self.value.is_some()
    }
}

impl<T> Default for OwnedSlot<T> {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::sync::Arc;
    use core::sync::atomic::{AtomicUsize, Ordering};

    struct Counted {
        live: Arc<AtomicUsize>,
    }

    impl Counted {
        fn new(live: &Arc<AtomicUsize>) -> Box<Self> {
            live.fetch_add(1, Ordering::SeqCst);
            Box::new(Self { live: live.clone() })
        }
    }

    impl Drop for Counted {
        fn drop(&mut self) {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_replace_keeps_one_live() {
        let live = Arc::new(AtomicUsize::new(0));
        let mut slot = OwnedSlot::empty();

        for _ in 0..5 {
            slot.replace(Counted::new(&live));
            assert_eq!(live.load(Ordering::SeqCst), 1);
        }

        drop(slot);
        assert_eq!(live.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_take() {
        let live = Arc::new(AtomicUsize::new(0));
        let mut slot = OwnedSlot::empty();
        assert!(!slot.is_occupied());

        slot.replace(Counted::new(&live));
        let taken = slot.take();
        assert!(taken.is_some());
        assert!(slot.get().is_none());
        assert_eq!(live.load(Ordering::SeqCst), 1);

        drop(taken);
        assert_eq!(live.load(Ordering::SeqCst), 0);
    }
}

//! Progress reporting with a hard "no callbacks after clear" guarantee.

use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

use parking_lot::ReentrantMutex;

/// Receives progress values in `[0.0, 1.0]`.
pub type ProgressBlock = Arc<dyn Fn(f64) + Send + Sync>;

struct Slot {
    block: Option<ProgressBlock>,
    last: f64,
}

/// Holds the optional progress block of an operation.
///
/// Published values are clamped to `[0.0, 1.0]` and only forwarded when they
/// exceed the last forwarded value, so observers see a non-decreasing
/// sequence. The block runs while the slot lock is held: once
/// [`clear`](Self::clear) returns, no invocation is in flight on another
/// thread and none will start. Clearing from inside the block itself is
/// allowed (the lock is reentrant).
pub struct ProgressSlot {
    inner: ReentrantMutex<RefCell<Slot>>,
}

impl ProgressSlot {
    pub fn new() -> Self {
        Self {
            inner: ReentrantMutex::new(RefCell::new(Slot {
                block: None,
                last: 0.0,
            })),
        }
    }

    /// Install (or replace) the progress block.
    pub fn set(&self, block: impl Fn(f64) + Send + Sync + 'static) {
        let guard = self.inner.lock();
        guard.borrow_mut().block = Some(Arc::new(block));
    }

    /// Remove the progress block, waiting for any in-flight invocation on
    /// another thread to return.
    pub fn clear(&self) {
        let guard = self.inner.lock();
        guard.borrow_mut().block = None;
    }

    pub fn is_set(&self) -> bool {
        self.inner.lock().borrow().block.is_some()
    }

    /// Last value forwarded to a block.
    pub fn last(&self) -> f64 {
        self.inner.lock().borrow().last
    }

    /// Forward `value` to the block if one is installed and the value is an
    /// increase. Returns whether the block was invoked.
    pub fn publish(&self, value: f64) -> bool {
        if value.is_nan() {
            return false;
        }
        let value = value.clamp(0.0, 1.0);

        let guard = self.inner.lock();
        let block = {
            let mut slot = guard.borrow_mut();
            let block = match slot.block.clone() {
                Some(block) if value > slot.last => block,
                _ => return false,
            };
            slot.last = value;
            block
        };
        // The RefCell borrow is released; the block may call `clear`.
        block(value);
        drop(guard);
        true
    }
}

impl Default for ProgressSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ProgressSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressSlot")
            .field("is_set", &self.is_set())
            .field("last", &self.last())
            .finish()
    }
}

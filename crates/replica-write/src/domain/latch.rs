//! Latch guards.

use std::fmt;

/// Holds the latches of one request. Releasing happens at most once, either
/// explicitly or on drop.
#[derive(Default)]
pub struct LatchGuard {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl LatchGuard {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// A guard holding nothing.
    pub fn noop() -> Self {
        Self::default()
    }

    pub fn is_held(&self) -> bool {
        self.release.is_some()
    }

    pub fn release(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }

    /// Move ownership of the latches into a new guard, leaving this one
    /// empty.
    pub fn take(&mut self) -> LatchGuard {
        LatchGuard {
            release: self.release.take(),
        }
    }
}

impl Drop for LatchGuard {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for LatchGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LatchGuard")
            .field("held", &self.is_held())
            .finish()
    }
}

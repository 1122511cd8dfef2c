//! Stale-result discard for callers that recompute repeatedly.
//!
//! The engine has no notion of "latest". A caller takes a token before each
//! computation and wraps the result with it; when results come back out of
//! order, only the one carrying the newest token is accepted.

use log::debug;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GenerationToken(u64);

impl GenerationToken {
    pub fn value(self) -> u64 {
        self.0
    }
}

/// Issues monotonically increasing tokens. Shareable across threads.
#[derive(Debug, Default)]
pub struct GenerationTracker {
    latest: AtomicU64,
}

impl GenerationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new generation, superseding every token issued before it.
    pub fn next(&self) -> GenerationToken {
        GenerationToken(self.latest.fetch_add(1, Ordering::AcqRel) + 1)
    }

    pub fn current(&self) -> GenerationToken {
        GenerationToken(self.latest.load(Ordering::Acquire))
    }

    pub fn is_current(&self, token: GenerationToken) -> bool {
        token == self.current()
    }

    pub fn tag<T>(&self, token: GenerationToken, value: T) -> Generational<T> {
        Generational { token, value }
    }
}

/// A result paired with the generation that requested it.
#[derive(Debug, Clone, PartialEq)]
pub struct Generational<T> {
    pub token: GenerationToken,
    pub value: T,
}

impl<T> Generational<T> {
    /// Returns the value only if no newer generation has started.
    pub fn accept(self, tracker: &GenerationTracker) -> Option<T> {
        if tracker.is_current(self.token) {
            Some(self.value)
        } else {
            debug!(
                "Discarding stale result for generation {} (current {})",
                self.token.value(),
                tracker.current().value()
            );
            None
        }
    }
}

//! Array name tokens
//!
//! Every chunked array gets a name that is unique within the graph
//! namespace it shares with other arrays. Names come from a [`TokenSource`]
//! handed to the graph builder, so tests can inject a deterministic one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

/// Source of array names
///
/// Implementations must never hand out the same token twice for the
/// lifetime of the source.
pub trait TokenSource: Send + Sync + std::fmt::Debug {
    /// Mint a fresh token, prefixed with `prefix`
    fn next_token(&self, prefix: &str) -> String;
}

/// Monotonic counter-backed token source
#[derive(Debug, Default)]
pub struct SequentialTokens {
    counter: AtomicU64,
}

impl SequentialTokens {
    /// A fresh source whose first token ends in `-1`
    #[must_use]
    pub const fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }

    /// The process-wide source used by the convenience constructors
    #[must_use]
    pub fn global() -> Arc<dyn TokenSource> {
        static GLOBAL: OnceLock<Arc<SequentialTokens>> = OnceLock::new();
        let tokens = GLOBAL.get_or_init(|| Arc::new(Self::new()));
        Arc::clone(tokens) as Arc<dyn TokenSource>
    }

    /// A new source wrapped for sharing between arrays
    #[must_use]
    pub fn shared() -> Arc<dyn TokenSource> {
        Arc::new(Self::new())
    }
}

impl TokenSource for SequentialTokens {
    fn next_token(&self, prefix: &str) -> String {
        let id = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{prefix}-{id}")
    }
}

// Cooperative stop signalling between the controller and the worker
//
// Every stop request bumps a generation counter. Work started under an older
// generation sees the mismatch at its next checkpoint and unwinds.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared stop counter owned by the controller
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    generation: Arc<AtomicU64>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Invalidate all outstanding tokens, returning the new generation
    pub fn raise(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Token bound to the current generation
    pub fn token(&self) -> CancelToken {
        self.token_for(self.generation())
    }

    pub fn token_for(&self, generation: u64) -> CancelToken {
        CancelToken {
            signal: self.clone(),
            issued: generation,
        }
    }
}

/// Cheap handle polled by motion loops
#[derive(Debug, Clone)]
pub struct CancelToken {
    signal: StopSignal,
    issued: u64,
}

impl CancelToken {
    /// A token nobody else holds the signal for, so it never fires
    pub fn never() -> Self {
        StopSignal::new().token()
    }

    pub fn is_cancelled(&self) -> bool {
        self.signal.generation() != self.issued
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raise_cancels_outstanding_tokens() {
        let signal = StopSignal::new();
        let before = signal.token();
        assert!(!before.is_cancelled());

        assert_eq!(signal.raise(), 1);
        assert!(before.is_cancelled());
        assert!(!signal.token().is_cancelled());
    }

    #[test]
    fn test_token_for_older_generation_is_cancelled() {
        let signal = StopSignal::new();
        signal.raise();
        signal.raise();
        assert!(signal.token_for(1).is_cancelled());
        assert!(!signal.token_for(2).is_cancelled());
    }

    #[test]
    fn test_never_token() {
        assert!(!CancelToken::never().is_cancelled());
    }
}

//! # Completion tracking
//! Counts settled sources against the number a run dispatched and fires the
//! run's completion callback exactly once, on the final settlement.

use crate::config::OnSettled;

/// What a single `record_settlement` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// More sources outstanding.
    Pending { settled: usize, expected: usize },
    /// This call was the last expected settlement; the callback ran.
    Completed,
    /// Tracker already completed; call ignored.
    Ignored,
}

pub struct CompletionTracker {
    expected: usize,
    settled: usize,
    callback: Option<OnSettled>,
    done: bool,
}

impl CompletionTracker {
    pub fn new(expected: usize, callback: Option<OnSettled>) -> Self {
        Self {
            expected,
            settled: 0,
            callback,
            done: false,
        }
    }

    /// The only mutator. Fires the callback when `settled` reaches `expected`.
    pub fn record_settlement(&mut self) -> Settlement {
        if self.done {
            tracing::warn!(
                expected = self.expected,
                "settlement recorded after completion; ignoring"
            );
            return Settlement::Ignored;
        }

        self.settled += 1;
        if self.settled < self.expected {
            return Settlement::Pending {
                settled: self.settled,
                expected: self.expected,
            };
        }

        self.done = true;
        if let Some(cb) = self.callback.take() {
            cb();
        }
        Settlement::Completed
    }

    pub fn settled(&self) -> usize {
        self.settled
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    pub fn is_complete(&self) -> bool {
        self.done
    }
}

impl std::fmt::Debug for CompletionTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionTracker")
            .field("expected", &self.expected)
            .field("settled", &self.settled)
            .field("done", &self.done)
            .finish()
    }
}

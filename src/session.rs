use crate::clip::{ClipDescriptor, TrialOutcome};
use crate::selection::{ClipSelector, SelectionStrategy};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// Pass/fail tally for the running session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    pub pass: u32,
    pub fail: u32,
}

impl SessionStats {
    pub fn total(&self) -> u32 {
        self.pass + self.fail
    }

    fn pct(&self, count: u32) -> f64 {
        match self.total() {
            0 => 0.0,
            total => count as f64 / total as f64 * 100.0,
        }
    }

    pub fn pass_pct(&self) -> f64 {
        self.pct(self.pass)
    }

    pub fn fail_pct(&self) -> f64 {
        self.pct(self.fail)
    }
}

/// Accumulates outcomes and decides which clip plays next.
#[derive(Debug)]
pub struct Session {
    stats: SessionStats,
    strategy: SelectionStrategy,
    selector: Box<dyn ClipSelector>,
    rng: StdRng,
}

impl Session {
    pub fn new(strategy: SelectionStrategy, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            stats: SessionStats::default(),
            strategy,
            selector: strategy.selector(),
            rng,
        }
    }

    pub fn strategy(&self) -> SelectionStrategy {
        self.strategy
    }

    pub fn record_outcome(&mut self, outcome: &TrialOutcome) {
        if outcome.success {
            self.stats.pass += 1;
        } else {
            self.stats.fail += 1;
        }
    }

    pub fn select_next<'a>(
        &mut self,
        clips: &'a [ClipDescriptor],
        previous_id: Option<&str>,
    ) -> Option<&'a ClipDescriptor> {
        self.selector.select_next(clips, previous_id, &mut self.rng)
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Explicit session restart: counters go back to zero and selection starts over.
    pub fn restart(&mut self) {
        self.stats = SessionStats::default();
        self.selector = self.strategy.selector();
    }
}

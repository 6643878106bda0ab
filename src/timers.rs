use std::fmt;

/// Identity of one clip showing. Also serves as its cancellation token:
/// anything tagged with a superseded id is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrialId(pub u64);

impl fmt::Display for TrialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Deadline {
    pub trial: TrialId,
    pub at_ms: f64,
}

/// Pending deadline timers, drained by whoever owns the event loop.
#[derive(Debug, Default)]
pub struct Timers {
    pending: Vec<Deadline>,
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, trial: TrialId, at_ms: f64) {
        self.pending.push(Deadline { trial, at_ms });
    }

    /// Clear every timer belonging to `trial`.
    pub fn cancel_trial(&mut self, trial: TrialId) -> usize {
        let before = self.pending.len();
        self.pending.retain(|d| d.trial != trial);
        before - self.pending.len()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Remove and return all deadlines due at `now_ms`, earliest first.
    pub fn due(&mut self, now_ms: f64) -> Vec<Deadline> {
        let (mut due, rest): (Vec<_>, Vec<_>) =
            self.pending.drain(..).partition(|d| d.at_ms <= now_ms);
        self.pending = rest;
        due.sort_by(|a, b| a.at_ms.total_cmp(&b.at_ms));
        due
    }

    pub fn pending_for(&self, trial: TrialId) -> usize {
        self.pending.iter().filter(|d| d.trial == trial).count()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

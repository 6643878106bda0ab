use crate::clip::{ClipDescriptor, TrialOutcome};
use crate::evaluator::{evaluate, TrialEvent};
use crate::playback::PlaybackEvent;
use crate::timers::{Deadline, TrialId, Timers};
use tracing::{debug, info};

/// 25 frames at 60 Hz.
pub const DEFAULT_WINDOW_MS: f64 = 25.0 * 1000.0 / 60.0;

/// Bounded interval after the impact instant in which a reaction counts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReactionWindow {
    pub opened_at_ms: f64,
    pub duration_ms: f64,
    pub is_open: bool,
}

impl ReactionWindow {
    pub fn open(opened_at_ms: f64, duration_ms: f64) -> Self {
        Self {
            opened_at_ms,
            duration_ms,
            is_open: true,
        }
    }

    pub fn deadline_ms(&self) -> f64 {
        self.opened_at_ms + self.duration_ms
    }

    /// A reaction at `now_ms` lands inside the window.
    pub fn accepts(&self, now_ms: f64) -> bool {
        now_ms < self.deadline_ms()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialPhase {
    /// Waiting for the impact instant.
    Armed,
    /// Clip has no impact; nothing to wait for.
    NoWindow,
    WindowOpen,
    Resolved,
}

/// Per-clip state, valid only until the next clip begins.
#[derive(Debug, Clone)]
pub struct TrialContext {
    pub id: TrialId,
    pub clip: ClipDescriptor,
    pub window: Option<ReactionWindow>,
    pub input_locked: bool,
    pub result_emitted: bool,
}

impl TrialContext {
    pub fn new(id: TrialId, clip: ClipDescriptor) -> Self {
        Self {
            id,
            clip,
            window: None,
            input_locked: false,
            result_emitted: false,
        }
    }

    pub fn phase(&self) -> TrialPhase {
        if self.result_emitted {
            TrialPhase::Resolved
        } else if self.window.is_some() {
            TrialPhase::WindowOpen
        } else if self.clip.has_impact() {
            TrialPhase::Armed
        } else {
            TrialPhase::NoWindow
        }
    }
}

/// Owns the trial state machine for the clip currently showing.
#[derive(Debug)]
pub struct ReactionController {
    window_ms: f64,
    next_id: u64,
    context: Option<TrialContext>,
}

impl ReactionController {
    pub fn new(window_ms: f64) -> Self {
        Self {
            window_ms,
            next_id: 0,
            context: None,
        }
    }

    pub fn window_ms(&self) -> f64 {
        self.window_ms
    }

    /// Start a trial for `clip`, cancelling everything the previous trial still had pending.
    pub fn begin(&mut self, clip: ClipDescriptor, timers: &mut Timers) -> TrialId {
        if let Some(previous) = self.context.take() {
            let cancelled = timers.cancel_trial(previous.id);
            if !previous.result_emitted {
                debug!(trial = %previous.id, clip = %previous.clip.id, "superseded before resolving");
            }
            debug!(trial = %previous.id, cancelled, "previous trial torn down");
        }
        self.next_id += 1;
        let id = TrialId(self.next_id);
        info!(trial = %id, clip = %clip.id, impact = ?clip.impact_instant, "trial begins");
        self.context = Some(TrialContext::new(id, clip));
        id
    }

    pub fn current(&self) -> Option<&TrialContext> {
        self.context.as_ref()
    }

    pub fn current_id(&self) -> Option<TrialId> {
        self.context.as_ref().map(|c| c.id)
    }

    pub fn phase(&self) -> Option<TrialPhase> {
        self.context.as_ref().map(TrialContext::phase)
    }

    pub fn is_window_open(&self) -> bool {
        self.context
            .as_ref()
            .and_then(|c| c.window)
            .map_or(false, |w| w.is_open)
    }

    pub fn on_playback(
        &mut self,
        trial: TrialId,
        event: PlaybackEvent,
        now_ms: f64,
        timers: &mut Timers,
    ) -> Option<TrialOutcome> {
        match event {
            PlaybackEvent::Loaded => {
                debug!(trial = %trial, "media loaded");
                None
            }
            PlaybackEvent::Position(position) => {
                self.observe_position(trial, position, now_ms, timers);
                None
            }
            PlaybackEvent::Ended => self.resolve(trial, TrialEvent::Ended, timers),
        }
    }

    /// Handle the single logical "react" input. The input's own position
    /// reading counts as a sample, so it cannot outrun the frame callback.
    pub fn on_react(
        &mut self,
        trial: TrialId,
        position_secs: f64,
        now_ms: f64,
        timers: &mut Timers,
    ) -> Option<TrialOutcome> {
        self.observe_position(trial, position_secs, now_ms, timers);
        self.resolve(
            trial,
            TrialEvent::React {
                position_secs,
                now_ms,
            },
            timers,
        )
    }

    pub fn on_deadline(
        &mut self,
        deadline: Deadline,
        now_ms: f64,
        timers: &mut Timers,
    ) -> Option<TrialOutcome> {
        self.resolve(deadline.trial, TrialEvent::Deadline { now_ms }, timers)
    }

    fn live_context(&mut self, trial: TrialId) -> Option<&mut TrialContext> {
        match self.context.as_mut() {
            Some(ctx) if ctx.id == trial && !ctx.result_emitted => Some(ctx),
            Some(ctx) if ctx.id == trial => {
                debug!(trial = %trial, "event after resolution ignored");
                None
            }
            _ => {
                debug!(trial = %trial, "event for stale trial dropped");
                None
            }
        }
    }

    fn observe_position(&mut self, trial: TrialId, position: f64, now_ms: f64, timers: &mut Timers) {
        let window_ms = self.window_ms;
        let Some(ctx) = self.live_context(trial) else {
            return;
        };
        if ctx.window.is_some() {
            return;
        }
        // A negative impact lies before the clip starts and is never crossed.
        let Some(impact) = ctx.clip.impact_instant.filter(|t| *t >= 0.0) else {
            return;
        };
        if position >= impact {
            // Back-date to the crossing so a late sample does not inflate reaction time.
            let opened_at = now_ms - (position - impact) * 1000.0;
            let window = ReactionWindow::open(opened_at, window_ms);
            timers.schedule(ctx.id, window.deadline_ms());
            ctx.window = Some(window);
            debug!(trial = %trial, position, opened_at, "reaction window opened");
        }
    }

    fn resolve(&mut self, trial: TrialId, event: TrialEvent, timers: &mut Timers) -> Option<TrialOutcome> {
        let ctx = self.live_context(trial)?;
        let outcome = evaluate(ctx, &event)?;
        ctx.result_emitted = true;
        ctx.input_locked = true;
        if let Some(window) = ctx.window.as_mut() {
            window.is_open = false;
        }
        timers.cancel_trial(trial);
        info!(
            trial = %trial,
            clip = %outcome.clip_id,
            reason = outcome.reason.code(),
            reaction_ms = ?outcome.reaction_time_ms,
            "trial resolved"
        );
        Some(outcome)
    }
}

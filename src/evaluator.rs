//! Pure judgement of a trial given its context and the event that triggered evaluation.

use crate::clip::{ReasonCode, TrialOutcome};
use crate::controller::TrialContext;

/// Something that may resolve a trial.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrialEvent {
    /// The user reacted while the media was at `position_secs`.
    React { position_secs: f64, now_ms: f64 },
    /// The window deadline timer fired.
    Deadline { now_ms: f64 },
    /// The media reached its natural end.
    Ended,
}

/// Decide the outcome of `event` for `ctx`, or `None` if the event does not
/// resolve the trial.
///
/// Deterministic in its inputs; `now_ms` only feeds the reaction time and the
/// window deadline comparison.
pub fn evaluate(ctx: &TrialContext, event: &TrialEvent) -> Option<TrialOutcome> {
    if ctx.result_emitted {
        return None;
    }
    let impact = ctx.clip.impact_instant;

    let (reason, reaction_time_ms) = match *event {
        TrialEvent::React { .. } if ctx.input_locked => return None,
        TrialEvent::React { .. } if impact.is_none() => (ReasonCode::FalsePositive, None),
        // An impact before the clip start is never reached, so any input precedes it.
        TrialEvent::React { position_secs, .. }
            if impact.map_or(false, |t| t < 0.0 || position_secs < t) =>
        {
            (ReasonCode::TooSoon, None)
        }
        TrialEvent::React { now_ms, .. } => match ctx.window {
            Some(window) if window.accepts(now_ms) => (
                ReasonCode::GoodReaction,
                Some((now_ms - window.opened_at_ms).max(0.0)),
            ),
            _ => (ReasonCode::TooLate, None),
        },
        TrialEvent::Deadline { now_ms } => match ctx.window {
            Some(window) if !window.accepts(now_ms) => (ReasonCode::Missed, None),
            _ => return None,
        },
        TrialEvent::Ended if impact.is_none() => (ReasonCode::Dodged, None),
        // Window still open or impact never reached: the user did not react in time.
        TrialEvent::Ended => (ReasonCode::Missed, None),
    };

    Some(TrialOutcome::new(ctx.clip.id.clone(), reason, reaction_time_ms))
}

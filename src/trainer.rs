use crate::clip::{ClipDescriptor, TrialOutcome};
use crate::config::Config;
use crate::controller::{ReactionController, TrialPhase};
use crate::manifest::unreachable_impacts;
use crate::playback::PlaybackSource;
use crate::session::{Session, SessionStats};
use crate::timers::{TrialId, Timers};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Automatic restart attempts before waiting for the user to interact.
const MAX_AUTO_RETRIES: u32 = 3;
const RETRY_INTERVAL_MS: f64 = 500.0;

#[derive(Debug, Error, PartialEq)]
pub enum TrainerError {
    #[error("manifest has no clips")]
    EmptyManifest,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrainerState {
    Idle,
    Playing,
    /// Playback refused to start; retried on later ticks or on user input.
    Stalled { attempts: u32, retry_at_ms: f64 },
    /// Outcome on screen until `until_ms`, then the next clip starts.
    Showing { outcome: TrialOutcome, until_ms: f64 },
}

/// Where a react input came from. Both have identical semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputSource {
    Pointer,
    Key,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainerSettings {
    pub window_ms: f64,
    pub result_hold_ms: f64,
    pub default_clip_secs: f64,
}

impl From<&Config> for TrainerSettings {
    fn from(cfg: &Config) -> Self {
        Self {
            window_ms: cfg.window_ms(),
            result_hold_ms: cfg.result_hold_ms,
            default_clip_secs: cfg.default_clip_secs,
        }
    }
}

/// Read-only snapshot for the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainerView {
    pub clip_id: Option<String>,
    pub media_ref: Option<String>,
    pub impact_secs: Option<f64>,
    pub position_secs: f64,
    pub duration_secs: f64,
    pub window_open: bool,
    pub phase: Option<TrialPhase>,
    pub outcome: Option<TrialOutcome>,
    pub stats: SessionStats,
    pub stalled: bool,
}

/// Drives one clip at a time through selection, playback and judgement.
#[derive(Debug)]
pub struct Trainer<P: PlaybackSource> {
    clips: Vec<ClipDescriptor>,
    playback: P,
    controller: ReactionController,
    timers: Timers,
    session: Session,
    settings: TrainerSettings,
    state: TrainerState,
    trial: Option<TrialId>,
}

impl<P: PlaybackSource> Trainer<P> {
    pub fn new(
        clips: Vec<ClipDescriptor>,
        playback: P,
        session: Session,
        settings: TrainerSettings,
    ) -> Result<Self, TrainerError> {
        if clips.is_empty() {
            return Err(TrainerError::EmptyManifest);
        }
        for clip in unreachable_impacts(&clips, settings.default_clip_secs) {
            warn!(
                clip = %clip.id,
                impact = ?clip.impact_instant,
                "impact instant lies outside the clip; it will always resolve as missed"
            );
        }
        Ok(Self {
            clips,
            playback,
            controller: ReactionController::new(settings.window_ms),
            timers: Timers::new(),
            session,
            settings,
            state: TrainerState::Idle,
            trial: None,
        })
    }

    pub fn start(&mut self, now_ms: f64) {
        self.advance(now_ms);
    }

    /// Zero the session counters and move on to a fresh clip.
    pub fn restart_session(&mut self, now_ms: f64) {
        info!("session restarted");
        self.session.restart();
        self.advance(now_ms);
    }

    /// Abandon the current clip without recording anything and begin the next one.
    pub fn skip(&mut self, now_ms: f64) {
        debug!(trial = ?self.trial, "trial skipped");
        self.advance(now_ms);
    }

    pub fn tick(&mut self, now_ms: f64) -> Option<TrialOutcome> {
        match self.state {
            TrainerState::Idle => None,
            TrainerState::Playing => self.pump(now_ms),
            TrainerState::Stalled {
                attempts,
                retry_at_ms,
            } => {
                if attempts < MAX_AUTO_RETRIES && now_ms >= retry_at_ms {
                    self.try_play(now_ms, attempts);
                }
                None
            }
            TrainerState::Showing { until_ms, .. } => {
                if now_ms >= until_ms {
                    self.advance(now_ms);
                }
                None
            }
        }
    }

    /// The single logical "react" input.
    pub fn react(&mut self, now_ms: f64, source: InputSource) -> Option<TrialOutcome> {
        match self.state {
            TrainerState::Playing => {
                let trial = self.trial?;
                // Media that already ended resolves before the input is judged.
                if let Some(outcome) = self.drain_playback(trial, now_ms) {
                    return Some(outcome);
                }
                let position = self.playback.position(now_ms);
                debug!(?source, position, now_ms, "react");
                let outcome = self
                    .controller
                    .on_react(trial, position, now_ms, &mut self.timers)?;
                Some(self.finish(outcome, now_ms))
            }
            TrainerState::Stalled { attempts, .. } => {
                // The interaction is what a blocked player was waiting for.
                self.try_play(now_ms, attempts);
                None
            }
            _ => {
                debug!(?source, "input ignored while no trial is live");
                None
            }
        }
    }

    pub fn state(&self) -> &TrainerState {
        &self.state
    }

    pub fn stats(&self) -> SessionStats {
        self.session.stats()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn settings(&self) -> TrainerSettings {
        self.settings
    }

    pub fn clips(&self) -> &[ClipDescriptor] {
        &self.clips
    }

    pub fn current_clip(&self) -> Option<&ClipDescriptor> {
        self.controller.current().map(|c| &c.clip)
    }

    pub fn view(&self, now_ms: f64) -> TrainerView {
        let clip = self.current_clip();
        TrainerView {
            clip_id: clip.map(|c| c.id.clone()),
            media_ref: clip.map(|c| c.media_ref.clone()),
            impact_secs: clip.and_then(|c| c.impact_instant),
            position_secs: self.playback.position(now_ms),
            duration_secs: self
                .playback
                .duration()
                .unwrap_or(self.settings.default_clip_secs),
            window_open: self.controller.is_window_open(),
            phase: self.controller.phase(),
            outcome: match &self.state {
                TrainerState::Showing { outcome, .. } => Some(outcome.clone()),
                _ => None,
            },
            stats: self.session.stats(),
            stalled: matches!(self.state, TrainerState::Stalled { .. }),
        }
    }

    fn advance(&mut self, now_ms: f64) {
        let previous = self.current_clip().map(|c| c.id.clone());
        let Some(clip) = self
            .session
            .select_next(&self.clips, previous.as_deref())
            .cloned()
        else {
            self.state = TrainerState::Idle;
            return;
        };
        self.playback.pause(now_ms);
        let trial = self.controller.begin(clip.clone(), &mut self.timers);
        self.trial = Some(trial);
        self.playback.load(&clip);
        self.try_play(now_ms, 0);
    }

    fn try_play(&mut self, now_ms: f64, attempts: u32) {
        match self.playback.restart(now_ms) {
            Ok(()) => self.state = TrainerState::Playing,
            Err(e) => {
                let attempts = attempts + 1;
                warn!(error = %e, attempts, "playback did not start");
                self.state = TrainerState::Stalled {
                    attempts,
                    retry_at_ms: now_ms + RETRY_INTERVAL_MS,
                };
            }
        }
    }

    fn drain_playback(&mut self, trial: TrialId, now_ms: f64) -> Option<TrialOutcome> {
        for event in self.playback.poll(now_ms) {
            if let Some(outcome) =
                self.controller
                    .on_playback(trial, event, now_ms, &mut self.timers)
            {
                return Some(self.finish(outcome, now_ms));
            }
        }
        None
    }

    fn pump(&mut self, now_ms: f64) -> Option<TrialOutcome> {
        let trial = self.trial?;
        if let Some(outcome) = self.drain_playback(trial, now_ms) {
            return Some(outcome);
        }
        for deadline in self.timers.due(now_ms) {
            if let Some(outcome) = self
                .controller
                .on_deadline(deadline, now_ms, &mut self.timers)
            {
                return Some(self.finish(outcome, now_ms));
            }
        }
        None
    }

    fn finish(&mut self, outcome: TrialOutcome, now_ms: f64) -> TrialOutcome {
        self.playback.pause(now_ms);
        self.session.record_outcome(&outcome);
        self.state = TrainerState::Showing {
            outcome: outcome.clone(),
            until_ms: now_ms + self.settings.result_hold_ms,
        };
        outcome
    }
}

use crate::clip::ClipDescriptor;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Lifecycle and position notifications from a playing clip.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlaybackEvent {
    Loaded,
    /// Current media position in seconds.
    Position(f64),
    Ended,
}

#[derive(Debug, Error, PartialEq)]
pub enum PlaybackError {
    #[error("playback of clip '{0}' was blocked before it started")]
    Blocked(String),
    #[error("no clip loaded")]
    NotLoaded,
}

/// How often position samples are delivered while a clip plays.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum Sampling {
    /// One sample per rendered frame.
    PerFrame { frame_ms: f64 },
    /// Coarse polling fallback; understates precision.
    Polled { interval_ms: f64 },
}

impl Sampling {
    pub fn per_frame(frame_rate_hz: f64) -> Self {
        Sampling::PerFrame {
            frame_ms: 1000.0 / frame_rate_hz,
        }
    }

    pub fn interval_ms(&self) -> f64 {
        match *self {
            Sampling::PerFrame { frame_ms } => frame_ms,
            Sampling::Polled { interval_ms } => interval_ms,
        }
    }
}

/// Control and subscription surface of a media element.
///
/// Positions returned by `poll` are monotonically non-decreasing for one
/// load; `Loaded` and `Ended` are delivered at most once per load.
pub trait PlaybackSource {
    fn load(&mut self, clip: &ClipDescriptor);
    fn restart(&mut self, now_ms: f64) -> Result<(), PlaybackError>;
    fn pause(&mut self, now_ms: f64);
    fn is_playing(&self) -> bool;
    /// Position in seconds at `now_ms`.
    fn position(&self, now_ms: f64) -> f64;
    /// Clip length in seconds, if known.
    fn duration(&self) -> Option<f64>;
    /// Drain everything that happened up to `now_ms`.
    fn poll(&mut self, now_ms: f64) -> Vec<PlaybackEvent>;
}

/// Playback driven purely by elapsed time and the clip's declared duration.
#[derive(Debug, Clone)]
pub struct SimulatedPlayback {
    sampling: Sampling,
    default_duration: f64,
    clip_id: Option<String>,
    duration: f64,
    started_at_ms: Option<f64>,
    paused_at: Option<f64>,
    last_frame: Option<i64>,
    last_position: f64,
    loaded_pending: bool,
    ended: bool,
    blocked_starts: u32,
}

impl SimulatedPlayback {
    pub fn new(sampling: Sampling, default_duration: f64) -> Self {
        Self {
            sampling,
            default_duration,
            clip_id: None,
            duration: default_duration,
            started_at_ms: None,
            paused_at: None,
            last_frame: None,
            last_position: 0.0,
            loaded_pending: false,
            ended: false,
            blocked_starts: 0,
        }
    }

    /// Refuse the next `n` restarts, the way a browser autoplay policy would.
    pub fn with_blocked_starts(mut self, n: u32) -> Self {
        self.blocked_starts = n;
        self
    }

    pub fn sampling(&self) -> Sampling {
        self.sampling
    }

    fn raw_position(&self, now_ms: f64) -> f64 {
        match (self.paused_at, self.started_at_ms) {
            (Some(pos), _) => pos,
            (None, Some(start)) => ((now_ms - start) / 1000.0).clamp(0.0, self.duration),
            (None, None) => 0.0,
        }
    }
}

impl PlaybackSource for SimulatedPlayback {
    fn load(&mut self, clip: &ClipDescriptor) {
        self.clip_id = Some(clip.id.clone());
        self.duration = clip.duration_or(self.default_duration).max(0.0);
        self.started_at_ms = None;
        self.paused_at = None;
        self.last_frame = None;
        self.last_position = 0.0;
        self.loaded_pending = true;
        self.ended = false;
    }

    fn restart(&mut self, now_ms: f64) -> Result<(), PlaybackError> {
        let clip_id = self.clip_id.clone().ok_or(PlaybackError::NotLoaded)?;
        if self.blocked_starts > 0 {
            self.blocked_starts -= 1;
            return Err(PlaybackError::Blocked(clip_id));
        }
        self.started_at_ms = Some(now_ms);
        self.paused_at = None;
        self.last_frame = None;
        self.last_position = 0.0;
        self.ended = false;
        debug!(clip = %clip_id, now_ms, "playback restarted");
        Ok(())
    }

    fn pause(&mut self, now_ms: f64) {
        if self.is_playing() {
            self.paused_at = Some(self.raw_position(now_ms));
        }
    }

    fn is_playing(&self) -> bool {
        self.started_at_ms.is_some() && self.paused_at.is_none()
    }

    fn position(&self, now_ms: f64) -> f64 {
        self.raw_position(now_ms).max(self.last_position)
    }

    fn duration(&self) -> Option<f64> {
        self.clip_id.as_ref().map(|_| self.duration)
    }

    fn poll(&mut self, now_ms: f64) -> Vec<PlaybackEvent> {
        let mut events = Vec::new();
        if self.clip_id.is_none() {
            return events;
        }
        if self.loaded_pending {
            self.loaded_pending = false;
            events.push(PlaybackEvent::Loaded);
        }
        let Some(start) = self.started_at_ms else {
            return events;
        };
        if !self.is_playing() {
            return events;
        }

        let position = self.position(now_ms);
        let frame = ((now_ms - start) / self.sampling.interval_ms()).floor() as i64;
        let at_end = position >= self.duration;
        if self.last_frame.map_or(true, |last| frame > last) || at_end {
            self.last_frame = Some(frame);
            self.last_position = position;
            events.push(PlaybackEvent::Position(position));
        }

        if at_end && !self.ended {
            self.ended = true;
            self.paused_at = Some(self.duration);
            events.push(PlaybackEvent::Ended);
        }
        events
    }
}

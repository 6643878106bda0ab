use serde::{Deserialize, Serialize};

/// One entry of the clip manifest.
///
/// `impact_instant` is the drive impact time in seconds; `None` marks a clip
/// where the correct behaviour is to not react at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipDescriptor {
    pub id: String,
    #[serde(alias = "src")]
    pub media_ref: String,
    #[serde(alias = "driveImpactTime", default)]
    pub impact_instant: Option<f64>,
    /// Clip length in seconds, used to drive simulated playback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

impl ClipDescriptor {
    pub fn new(id: impl Into<String>, media_ref: impl Into<String>, impact: Option<f64>) -> Self {
        Self {
            id: id.into(),
            media_ref: media_ref.into(),
            impact_instant: impact,
            duration: None,
        }
    }

    pub fn with_duration(mut self, secs: f64) -> Self {
        self.duration = Some(secs);
        self
    }

    pub fn has_impact(&self) -> bool {
        self.impact_instant.is_some()
    }

    /// Length of the clip, falling back to `default_secs` when the manifest does not say.
    pub fn duration_or(&self, default_secs: f64) -> f64 {
        self.duration.unwrap_or(default_secs)
    }

    /// An impact at or past the end of the clip can never be reached during playback.
    pub fn impact_reachable(&self, default_secs: f64) -> bool {
        match self.impact_instant {
            Some(t) => t >= 0.0 && t < self.duration_or(default_secs),
            None => true,
        }
    }
}

/// Why a trial resolved the way it did.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    #[strum(serialize = "Good DI!")]
    GoodReaction,
    #[strum(serialize = "Missed!")]
    Missed,
    #[strum(serialize = "Good Block!")]
    Dodged,
    #[strum(serialize = "DI wasn't active!")]
    TooSoon,
    #[strum(serialize = "False positive")]
    FalsePositive,
    #[strum(serialize = "Too late!")]
    TooLate,
}

impl ReasonCode {
    pub const ALL: [ReasonCode; 6] = [
        ReasonCode::GoodReaction,
        ReasonCode::Missed,
        ReasonCode::Dodged,
        ReasonCode::TooSoon,
        ReasonCode::FalsePositive,
        ReasonCode::TooLate,
    ];

    /// Stable identifier used in the history database and CSV exports.
    pub fn code(&self) -> &'static str {
        match self {
            ReasonCode::GoodReaction => "good_reaction",
            ReasonCode::Missed => "missed",
            ReasonCode::Dodged => "dodged",
            ReasonCode::TooSoon => "too_soon",
            ReasonCode::FalsePositive => "false_positive",
            ReasonCode::TooLate => "too_late",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.code() == code)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ReasonCode::GoodReaction | ReasonCode::Dodged)
    }
}

/// Result of one clip showing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialOutcome {
    pub clip_id: String,
    pub success: bool,
    pub reason: ReasonCode,
    /// Advisory only; never influences `success`.
    pub reaction_time_ms: Option<f64>,
}

impl TrialOutcome {
    pub fn new(clip_id: impl Into<String>, reason: ReasonCode, reaction_time_ms: Option<f64>) -> Self {
        Self {
            clip_id: clip_id.into(),
            success: reason.is_success(),
            reason,
            reaction_time_ms,
        }
    }

    pub fn message(&self) -> String {
        self.reason.to_string()
    }
}

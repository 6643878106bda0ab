use crate::clip::ClipDescriptor;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("manifest payload must be a JSON array of clips")]
    NotAList,
    #[error("malformed clip record: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("duplicate clip id '{0}'")]
    DuplicateId(String),
    #[error("clip '{id}' has invalid impact instant {value}")]
    InvalidImpact { id: String, value: f64 },
    #[error("clip '{id}' has invalid duration {value}")]
    InvalidDuration { id: String, value: f64 },
    #[error("no clip with id '{0}'")]
    UnknownClip(String),
    #[error("manifest I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("manifest could not be serialized: {0}")]
    Serialize(#[source] serde_json::Error),
}

impl ManifestError {
    /// HTTP-style status class: 400 for bad payloads, 500 for storage failures.
    pub fn status(&self) -> u16 {
        match self {
            ManifestError::NotAList
            | ManifestError::Malformed(_)
            | ManifestError::DuplicateId(_)
            | ManifestError::InvalidImpact { .. }
            | ManifestError::InvalidDuration { .. }
            | ManifestError::UnknownClip(_) => 400,
            ManifestError::Io { .. } | ManifestError::Serialize(_) => 500,
        }
    }
}

/// Parse and validate a full manifest payload.
pub fn parse_manifest(payload: &str) -> Result<Vec<ClipDescriptor>, ManifestError> {
    let value: serde_json::Value = serde_json::from_str(payload).map_err(ManifestError::Malformed)?;
    if !value.is_array() {
        return Err(ManifestError::NotAList);
    }
    let clips: Vec<ClipDescriptor> = serde_json::from_value(value).map_err(ManifestError::Malformed)?;
    validate(&clips)?;
    Ok(clips)
}

/// Ids must be unique, durations finite and positive, impacts finite.
///
/// An impact outside the clip is not rejected here: it plays and resolves as
/// missed at the end of media. `unreachable_impacts` reports those clips.
pub fn validate(clips: &[ClipDescriptor]) -> Result<(), ManifestError> {
    let mut seen = HashSet::new();
    for clip in clips {
        if !seen.insert(clip.id.as_str()) {
            return Err(ManifestError::DuplicateId(clip.id.clone()));
        }
        if let Some(value) = clip.duration {
            if !value.is_finite() || value <= 0.0 {
                return Err(ManifestError::InvalidDuration {
                    id: clip.id.clone(),
                    value,
                });
            }
        }
        if let Some(value) = clip.impact_instant {
            if !value.is_finite() {
                return Err(ManifestError::InvalidImpact {
                    id: clip.id.clone(),
                    value,
                });
            }
        }
    }
    Ok(())
}

/// Clips whose impact can never be reached during playback; they resolve as missed.
pub fn unreachable_impacts(clips: &[ClipDescriptor], default_duration: f64) -> Vec<&ClipDescriptor> {
    clips
        .iter()
        .filter(|c| !c.impact_reachable(default_duration))
        .collect()
}

/// Round `secs` to the nearest frame boundary at `frame_rate_hz`.
pub fn snap_to_frame(secs: f64, frame_rate_hz: f64) -> f64 {
    (secs * frame_rate_hz).round() / frame_rate_hz
}

pub trait ManifestStore {
    fn load(&self) -> Result<Vec<ClipDescriptor>, ManifestError>;
    fn save(&self, clips: &[ClipDescriptor]) -> Result<(), ManifestError>;

    /// Full replacement from a raw payload; anything but a valid clip list is rejected.
    fn submit_raw(&self, payload: &str) -> Result<(), ManifestError> {
        let clips = parse_manifest(payload)?;
        self.save(&clips)
    }

    /// Read-modify-write of one clip's impact instant.
    fn set_impact(&self, id: &str, impact: Option<f64>) -> Result<ClipDescriptor, ManifestError> {
        if let Some(value) = impact.filter(|v| !v.is_finite() || *v < 0.0) {
            return Err(ManifestError::InvalidImpact {
                id: id.to_string(),
                value,
            });
        }
        let mut clips = self.load()?;
        let clip = clips
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| ManifestError::UnknownClip(id.to_string()))?;
        clip.impact_instant = impact;
        let updated = clip.clone();
        self.save(&clips)?;
        Ok(updated)
    }
}

#[derive(Debug, Clone)]
pub struct FileManifestStore {
    path: PathBuf,
}

impl FileManifestStore {
    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> ManifestError {
        ManifestError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl ManifestStore for FileManifestStore {
    fn load(&self) -> Result<Vec<ClipDescriptor>, ManifestError> {
        let payload = fs::read_to_string(&self.path).map_err(|e| self.io_error(e))?;
        let clips = parse_manifest(&payload)?;
        info!(path = %self.path.display(), clips = clips.len(), "manifest loaded");
        Ok(clips)
    }

    fn save(&self, clips: &[ClipDescriptor]) -> Result<(), ManifestError> {
        validate(clips)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
            }
        }
        let data = serde_json::to_string_pretty(clips).map_err(ManifestError::Serialize)?;
        fs::write(&self.path, data).map_err(|e| {
            warn!(path = %self.path.display(), "manifest write failed");
            self.io_error(e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tempfile::tempdir;

    const SAMPLE: &str = r#"[
        {"id": "a", "src": "a.mp4", "driveImpactTime": 2.0},
        {"id": "b", "mediaRef": "b.mp4", "impactInstant": null}
    ]"#;

    #[test]
    fn parses_sample_manifest() {
        let clips = parse_manifest(SAMPLE).unwrap();
        assert_eq!(clips.len(), 2);
        assert_eq!(clips[0].impact_instant, Some(2.0));
        assert!(!clips[1].has_impact());
    }

    #[test]
    fn rejects_non_list_payload_with_400() {
        let err = parse_manifest(r#"{"id": "a"}"#).unwrap_err();
        assert_matches!(err, ManifestError::NotAList);
        assert_eq!(err.status(), 400);
    }

    #[test]
    fn rejects_garbage_and_bad_records() {
        assert_matches!(parse_manifest("not json"), Err(ManifestError::Malformed(_)));
        assert_matches!(parse_manifest(r#"[{"id": "a"}]"#), Err(ManifestError::Malformed(_)));
    }

    #[test]
    fn rejects_duplicate_ids() {
        let dup = r#"[{"id":"a","src":"a"},{"id":"a","src":"b"}]"#;
        assert_matches!(parse_manifest(dup), Err(ManifestError::DuplicateId(id)) if id == "a");
    }

    #[test]
    fn rejects_non_positive_durations_with_400() {
        for duration in ["-1.0", "0.0"] {
            let payload = format!(
                r#"[{{"id":"a","src":"a.mp4","driveImpactTime":1.0,"duration":{duration}}}]"#
            );
            let err = parse_manifest(&payload).unwrap_err();
            assert_matches!(err, ManifestError::InvalidDuration { ref id, .. } if id == "a");
            assert_eq!(err.status(), 400);
        }
        let clips = vec![ClipDescriptor::new("a", "a", None).with_duration(f64::NAN)];
        assert_matches!(validate(&clips), Err(ManifestError::InvalidDuration { .. }));
    }

    #[test]
    fn negative_impact_loads_and_is_flagged_unreachable() {
        let clips = parse_manifest(r#"[{"id":"a","src":"a","impactInstant":-0.5}]"#).unwrap();
        assert_eq!(clips[0].impact_instant, Some(-0.5));
        assert_eq!(unreachable_impacts(&clips, 4.0).len(), 1);

        let clips = vec![ClipDescriptor::new("a", "a", Some(f64::INFINITY))];
        assert_matches!(validate(&clips), Err(ManifestError::InvalidImpact { .. }));
    }

    #[test]
    fn missing_file_is_a_storage_error() {
        let dir = tempdir().unwrap();
        let store = FileManifestStore::with_path(dir.path().join("missing.json"));
        let err = store.load().unwrap_err();
        assert_matches!(err, ManifestError::Io { .. });
        assert_eq!(err.status(), 500);
    }

    #[test]
    fn submit_raw_replaces_whole_list() {
        let dir = tempdir().unwrap();
        let store = FileManifestStore::with_path(dir.path().join("sequences.json"));
        store.submit_raw(SAMPLE).unwrap();
        store
            .submit_raw(r#"[{"id":"c","src":"c.mp4","impactInstant":0.5}]"#)
            .unwrap();
        let clips = store.load().unwrap();
        assert_eq!(clips.len(), 1);
        assert_eq!(clips[0].id, "c");
    }

    #[test]
    fn failed_submit_leaves_store_untouched() {
        let dir = tempdir().unwrap();
        let store = FileManifestStore::with_path(dir.path().join("sequences.json"));
        store.submit_raw(SAMPLE).unwrap();
        assert!(store.submit_raw(r#""nope""#).is_err());
        assert_eq!(store.load().unwrap().len(), 2);
    }

    #[test]
    fn set_impact_read_modify_write() {
        let dir = tempdir().unwrap();
        let store = FileManifestStore::with_path(dir.path().join("nested/sequences.json"));
        store.submit_raw(SAMPLE).unwrap();

        let updated = store.set_impact("b", Some(1.5)).unwrap();
        assert_eq!(updated.impact_instant, Some(1.5));
        store.set_impact("a", None).unwrap();

        let clips = store.load().unwrap();
        assert_eq!(clips[0].impact_instant, None);
        assert_eq!(clips[1].impact_instant, Some(1.5));
        assert_matches!(store.set_impact("zzz", Some(1.0)), Err(ManifestError::UnknownClip(_)));
    }

    #[test]
    fn set_impact_refuses_negative_instants() {
        let dir = tempdir().unwrap();
        let store = FileManifestStore::with_path(dir.path().join("sequences.json"));
        store.submit_raw(SAMPLE).unwrap();
        assert_matches!(store.set_impact("a", Some(-0.1)), Err(ManifestError::InvalidImpact { .. }));
        assert_eq!(store.load().unwrap()[0].impact_instant, Some(2.0));
    }

    #[test]
    fn snap_to_frame_rounds_to_sixtieths() {
        assert!((snap_to_frame(1.005, 60.0) - 1.0).abs() < 1e-9);
        assert!((snap_to_frame(1.01, 60.0) - 61.0 / 60.0).abs() < 1e-9);
    }

    #[test]
    fn flags_unreachable_impacts() {
        let clips = vec![
            ClipDescriptor::new("ok", "ok", Some(1.0)).with_duration(2.0),
            ClipDescriptor::new("late", "late", Some(2.5)).with_duration(2.0),
        ];
        let flagged = unreachable_impacts(&clips, 4.0);
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].id, "late");
    }
}

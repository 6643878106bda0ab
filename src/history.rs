use crate::app_dirs::AppDirs;
use crate::clip::{ReasonCode, TrialOutcome};
use chrono::{DateTime, Local};
use rusqlite::{params, Connection, Result};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// One persisted trial outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRecord {
    pub clip_id: String,
    pub success: bool,
    pub reason: ReasonCode,
    pub reaction_time_ms: Option<f64>,
    pub timestamp: DateTime<Local>,
}

/// Per-clip aggregate over the whole history.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipSummary {
    pub clip_id: String,
    pub attempts: i64,
    pub passes: i64,
    pub pass_rate: f64,
    pub mean_reaction_ms: Option<f64>,
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Db(#[from] rusqlite::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
}

#[derive(Serialize)]
struct CsvRow<'a> {
    timestamp: String,
    clip_id: &'a str,
    success: bool,
    reason: &'static str,
    message: String,
    reaction_time_ms: Option<f64>,
}

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS trial_outcomes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        clip_id TEXT NOT NULL,
        success BOOLEAN NOT NULL,
        reason TEXT NOT NULL,
        reaction_time_ms REAL,
        timestamp TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_trial_outcomes_clip ON trial_outcomes(clip_id);
    CREATE INDEX IF NOT EXISTS idx_trial_outcomes_timestamp ON trial_outcomes(timestamp);
"#;

/// Outcome history across sessions
#[derive(Debug)]
pub struct HistoryDb {
    conn: Connection,
}

impl HistoryDb {
    /// Open the default database under $HOME/.local/state/impact-trainer
    pub fn new() -> Result<Self> {
        let path = Self::default_path();
        Self::open(&path)
    }

    pub fn default_path() -> PathBuf {
        AppDirs::history_db_path().unwrap_or_else(|| PathBuf::from("impact_trainer_history.db"))
    }

    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CANTOPEN),
                    Some(format!("Failed to create directory: {}", e)),
                )
            })?;
        }
        Self::with_connection(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(HistoryDb { conn })
    }

    pub fn record_outcome(&self, outcome: &TrialOutcome) -> Result<()> {
        self.record_outcome_at(outcome, Local::now())
    }

    pub fn record_outcome_at(&self, outcome: &TrialOutcome, at: DateTime<Local>) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO trial_outcomes (clip_id, success, reason, reaction_time_ms, timestamp)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                outcome.clip_id,
                outcome.success,
                outcome.reason.code(),
                outcome.reaction_time_ms,
                at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// All records, newest first
    pub fn records(&self) -> Result<Vec<HistoryRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT clip_id, success, reason, reaction_time_ms, timestamp
            FROM trial_outcomes
            ORDER BY timestamp DESC, id DESC
            "#,
        )?;

        let rows = stmt.query_map([], |row| {
            let reason_str: String = row.get(2)?;
            let reason = ReasonCode::from_code(&reason_str).ok_or_else(|| {
                rusqlite::Error::InvalidColumnType(2, "reason".to_string(), rusqlite::types::Type::Text)
            })?;
            let timestamp_str: String = row.get(4)?;
            let timestamp = DateTime::parse_from_rfc3339(&timestamp_str)
                .map_err(|_| {
                    rusqlite::Error::InvalidColumnType(4, "timestamp".to_string(), rusqlite::types::Type::Text)
                })?
                .with_timezone(&Local);

            Ok(HistoryRecord {
                clip_id: row.get(0)?,
                success: row.get(1)?,
                reason,
                reaction_time_ms: row.get(3)?,
                timestamp,
            })
        })?;

        rows.collect()
    }

    pub fn clip_summary(&self) -> Result<Vec<ClipSummary>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT
                clip_id,
                COUNT(*) AS attempts,
                SUM(CASE WHEN success = 1 THEN 1 ELSE 0 END) AS passes,
                AVG(reaction_time_ms) AS mean_rt
            FROM trial_outcomes
            GROUP BY clip_id
            ORDER BY clip_id
            "#,
        )?;

        let rows = stmt.query_map([], |row| {
            let attempts: i64 = row.get(1)?;
            let passes: i64 = row.get(2)?;
            Ok(ClipSummary {
                clip_id: row.get(0)?,
                attempts,
                passes,
                pass_rate: if attempts == 0 {
                    0.0
                } else {
                    passes as f64 / attempts as f64 * 100.0
                },
                mean_reaction_ms: row.get(3)?,
            })
        })?;

        rows.collect()
    }

    /// Count per reason code, most frequent first
    pub fn reason_breakdown(&self) -> Result<Vec<(ReasonCode, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT reason, COUNT(*) AS n FROM trial_outcomes GROUP BY reason ORDER BY n DESC, reason",
        )?;
        let rows = stmt.query_map([], |row| {
            let code: String = row.get(0)?;
            let reason = ReasonCode::from_code(&code).ok_or_else(|| {
                rusqlite::Error::InvalidColumnType(0, "reason".to_string(), rusqlite::types::Type::Text)
            })?;
            Ok((reason, row.get(1)?))
        })?;
        rows.collect()
    }

    /// Every recorded reaction time, oldest first
    pub fn reaction_times(&self) -> Result<Vec<f64>> {
        let mut stmt = self.conn.prepare(
            "SELECT reaction_time_ms FROM trial_outcomes WHERE reaction_time_ms IS NOT NULL ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect()
    }

    pub fn clear_all(&self) -> Result<()> {
        self.conn.execute("DELETE FROM trial_outcomes", [])?;
        Ok(())
    }

    /// Write every record as CSV, newest first. Returns the number of rows written.
    pub fn export_csv<W: Write>(&self, writer: W) -> std::result::Result<usize, ExportError> {
        let records = self.records()?;
        let mut wtr = csv::Writer::from_writer(writer);
        for record in &records {
            wtr.serialize(CsvRow {
                timestamp: record.timestamp.to_rfc3339(),
                clip_id: &record.clip_id,
                success: record.success,
                reason: record.reason.code(),
                message: record.reason.to_string(),
                reaction_time_ms: record.reaction_time_ms,
            })?;
        }
        wtr.flush().map_err(csv::Error::from)?;
        Ok(records.len())
    }
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    Some(var.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::tempdir;

    fn outcome(clip: &str, reason: ReasonCode, rt: Option<f64>) -> TrialOutcome {
        TrialOutcome::new(clip, reason, rt)
    }

    #[test]
    fn record_and_read_back_newest_first() {
        let db = HistoryDb::in_memory().unwrap();
        let t0 = Local::now();
        db.record_outcome_at(&outcome("a", ReasonCode::GoodReaction, Some(120.0)), t0)
            .unwrap();
        db.record_outcome_at(&outcome("b", ReasonCode::FalsePositive, None), t0 + Duration::seconds(2))
            .unwrap();

        let records = db.records().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].clip_id, "b");
        assert_eq!(records[0].reason, ReasonCode::FalsePositive);
        assert!(!records[0].success);
        assert_eq!(records[1].reaction_time_ms, Some(120.0));
        assert!(records[1].success);
    }

    #[test]
    fn clip_summary_aggregates_per_clip() {
        let db = HistoryDb::in_memory().unwrap();
        db.record_outcome(&outcome("a", ReasonCode::GoodReaction, Some(100.0))).unwrap();
        db.record_outcome(&outcome("a", ReasonCode::GoodReaction, Some(200.0))).unwrap();
        db.record_outcome(&outcome("a", ReasonCode::Missed, None)).unwrap();
        db.record_outcome(&outcome("a", ReasonCode::TooSoon, None)).unwrap();
        db.record_outcome(&outcome("b", ReasonCode::Dodged, None)).unwrap();

        let summary = db.clip_summary().unwrap();
        assert_eq!(summary.len(), 2);
        let a = &summary[0];
        assert_eq!(a.clip_id, "a");
        assert_eq!(a.attempts, 4);
        assert_eq!(a.passes, 2);
        assert_eq!(a.pass_rate, 50.0);
        assert_eq!(a.mean_reaction_ms, Some(150.0));
        assert_eq!(summary[1].mean_reaction_ms, None);
        assert_eq!(summary[1].pass_rate, 100.0);
    }

    #[test]
    fn reason_breakdown_counts() {
        let db = HistoryDb::in_memory().unwrap();
        for _ in 0..3 {
            db.record_outcome(&outcome("a", ReasonCode::Missed, None)).unwrap();
        }
        db.record_outcome(&outcome("a", ReasonCode::TooLate, None)).unwrap();
        assert_eq!(
            db.reason_breakdown().unwrap(),
            vec![(ReasonCode::Missed, 3), (ReasonCode::TooLate, 1)]
        );
    }

    #[test]
    fn clear_all_empties_history() {
        let db = HistoryDb::in_memory().unwrap();
        db.record_outcome(&outcome("a", ReasonCode::Missed, None)).unwrap();
        db.clear_all().unwrap();
        assert!(db.records().unwrap().is_empty());
        assert!(db.clip_summary().unwrap().is_empty());
    }

    #[test]
    fn export_csv_writes_header_and_rows() {
        let db = HistoryDb::in_memory().unwrap();
        db.record_outcome(&outcome("a", ReasonCode::GoodReaction, Some(87.5))).unwrap();
        let mut buf = Vec::new();
        assert_eq!(db.export_csv(&mut buf).unwrap(), 1);
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("timestamp,clip_id,success,reason,message,reaction_time_ms")
        );
        let row = lines.next().unwrap();
        assert!(row.contains(",a,true,good_reaction,Good DI!,87.5"));
    }

    #[test]
    fn file_database_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state").join("history.db");
        {
            let db = HistoryDb::open(&path).unwrap();
            db.record_outcome(&outcome("a", ReasonCode::Dodged, None)).unwrap();
        }
        let db = HistoryDb::open(&path).unwrap();
        assert_eq!(db.records().unwrap().len(), 1);
    }

    #[test]
    fn reaction_time_helpers() {
        let db = HistoryDb::in_memory().unwrap();
        db.record_outcome(&outcome("a", ReasonCode::GoodReaction, Some(100.0))).unwrap();
        db.record_outcome(&outcome("a", ReasonCode::Missed, None)).unwrap();
        db.record_outcome(&outcome("a", ReasonCode::GoodReaction, Some(300.0))).unwrap();
        let times = db.reaction_times().unwrap();
        assert_eq!(times, vec![100.0, 300.0]);
        assert_eq!(mean(&times), Some(200.0));
        assert_eq!(std_dev(&times), Some(100.0));
        assert_eq!(mean(&[]), None);
    }
}

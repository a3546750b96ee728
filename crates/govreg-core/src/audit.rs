//! Append-only audit trail of governance actions.
//!
//! Entries are kept in memory in append order. In durable mode each entry is
//! also appended as one JSON line to `audit_<YYYY-MM-DD>.jsonl`, partitioned
//! by the local calendar date at write time, and existing partitions are
//! replayed when the trail is opened.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{Duration, Local, NaiveDate, Utc};
use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::config::expand_tilde;
use crate::errors::{GovResult, GovernanceError};
use crate::guards;
use crate::models::{AuditEntry, AuditStatus};

pub const AUDIT_FILE_PREFIX: &str = "audit_";
pub const AUDIT_FILE_SUFFIX: &str = ".jsonl";

/// Partition file for `date` under `dir`.
pub fn partition_path(dir: &Path, date: NaiveDate) -> PathBuf {
    dir.join(format!(
        "{AUDIT_FILE_PREFIX}{}{AUDIT_FILE_SUFFIX}",
        date.format("%Y-%m-%d")
    ))
}

fn is_partition_file(name: &str) -> bool {
    name.strip_prefix(AUDIT_FILE_PREFIX)
        .and_then(|rest| rest.strip_suffix(AUDIT_FILE_SUFFIX))
        .is_some_and(|date| NaiveDate::parse_from_str(date, "%Y-%m-%d").is_ok())
}

fn append_line(path: &Path, entry: &AuditEntry) -> GovResult<()> {
    let mut line =
        serde_json::to_string(entry).map_err(|e| GovernanceError::Serialization(e.to_string()))?;
    line.push('\n');
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| GovernanceError::Storage(format!("opening {}: {e}", path.display())))?;
    file.write_all(line.as_bytes())
        .map_err(|e| GovernanceError::Storage(format!("appending {}: {e}", path.display())))?;
    Ok(())
}

/// Read every partition under `dir` in date order. Unparseable lines are
/// skipped with a warning.
fn replay(dir: &Path) -> GovResult<Vec<AuditEntry>> {
    let mut partitions: Vec<PathBuf> = fs::read_dir(dir)?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(is_partition_file)
        })
        .collect();
    partitions.sort();

    let mut entries = Vec::new();
    for path in partitions {
        let content = fs::read_to_string(&path)?;
        for (line_no, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AuditEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => tracing::warn!(
                    path = %path.display(),
                    line = line_no + 1,
                    error = %e,
                    "skipping malformed audit line"
                ),
            }
        }
    }
    Ok(entries)
}

// ---------------------------------------------------------------------------
// AuditTrail
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct AuditTrail {
    dir: Option<PathBuf>,
    logs: Mutex<Vec<AuditEntry>>,
}

impl AuditTrail {
    /// Trail that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            dir: None,
            logs: Mutex::new(Vec::new()),
        }
    }

    /// Trail backed by daily JSONL partitions in `dir`, created if missing.
    pub fn durable(dir: impl AsRef<Path>) -> GovResult<Self> {
        let dir = expand_tilde(&dir.as_ref().to_string_lossy());
        fs::create_dir_all(&dir)?;
        let history = replay(&dir)?;
        tracing::debug!(path = %dir.display(), entries = history.len(), "opened audit trail");
        Ok(Self {
            dir: Some(dir),
            logs: Mutex::new(history),
        })
    }

    pub fn is_durable(&self) -> bool {
        self.dir.is_some()
    }

    /// Record one governance action. Never panics or propagates: a failed
    /// durable write is logged and reported as `false`. The entry stays in
    /// the in-memory trail either way.
    pub fn log_action(
        &self,
        action: &str,
        model_id: &str,
        actor: &str,
        details: Map<String, Value>,
        status: AuditStatus,
    ) -> bool {
        let now = Utc::now();
        let entry = AuditEntry {
            timestamp: now,
            action: action.to_string(),
            model_id: model_id.to_string(),
            actor: actor.to_string(),
            details,
            status,
        };

        // Held across the file append so file order matches memory order.
        let mut logs = self.logs.lock();
        let persisted = match &self.dir {
            Some(dir) => {
                let path = partition_path(dir, now.with_timezone(&Local).date_naive());
                append_line(&path, &entry)
            }
            None => Ok(()),
        };
        logs.push(entry);
        drop(logs);

        match persisted {
            Ok(()) => {
                tracing::info!(action, model_id, actor, status = status.as_str(), "audit log");
                true
            }
            Err(e) => {
                tracing::error!(action, model_id, actor, error = %e, "failed to write audit log");
                false
            }
        }
    }

    /// Entries matching the given exact filters whose timestamp falls within
    /// the trailing `days_back` days, oldest first.
    pub fn get_logs(
        &self,
        model_id: Option<&str>,
        action: Option<&str>,
        days_back: u32,
    ) -> Vec<AuditEntry> {
        let days = guards::clamp_days_back(days_back as i64);
        let cutoff = Utc::now() - Duration::days(days as i64);
        self.logs
            .lock()
            .iter()
            .filter(|e| model_id.map_or(true, |id| e.model_id == id))
            .filter(|e| action.map_or(true, |a| e.action == a))
            .filter(|e| e.timestamp >= cutoff)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.logs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.logs.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::guards::DEFAULT_DAYS_BACK;

    fn details(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn entries_are_returned_as_logged() {
        let trail = AuditTrail::in_memory();
        assert!(trail.log_action(
            "REGISTER",
            "credit_scoring:v1.0",
            "alice",
            details(json!({"model_type": "classifier"})),
            AuditStatus::Success,
        ));
        assert!(trail.log_action(
            "PROMOTE",
            "credit_scoring:v1.0",
            "bob",
            details(json!({"notes": "initial release"})),
            AuditStatus::Failure,
        ));

        let logs = trail.get_logs(None, None, DEFAULT_DAYS_BACK);
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].action, "REGISTER");
        assert_eq!(logs[0].actor, "alice");
        assert_eq!(logs[0].details["model_type"], "classifier");
        assert_eq!(logs[1].status, AuditStatus::Failure);
        assert!(logs[0].timestamp <= logs[1].timestamp);
    }

    #[test]
    fn filters_by_model_and_action() {
        let trail = AuditTrail::in_memory();
        for (action, model) in [
            ("REGISTER", "credit:v1.0"),
            ("REGISTER", "fraud:v1.0"),
            ("PROMOTE", "credit:v1.0"),
        ] {
            trail.log_action(action, model, "ops", Map::new(), AuditStatus::Success);
        }
        assert_eq!(trail.get_logs(Some("credit:v1.0"), None, 30).len(), 2);
        assert_eq!(trail.get_logs(None, Some("REGISTER"), 30).len(), 2);
        assert_eq!(
            trail.get_logs(Some("credit:v1.0"), Some("PROMOTE"), 30).len(),
            1
        );
        assert!(trail.get_logs(Some("nosuch"), None, 30).is_empty());
    }

    #[test]
    fn durable_trail_writes_daily_partition() {
        let dir = tempfile::tempdir().unwrap();
        let trail = AuditTrail::durable(dir.path()).unwrap();
        trail.log_action(
            "REGISTER",
            "credit:v1.0",
            "alice",
            details(json!({"sha": "abc"})),
            AuditStatus::Success,
        );
        trail.log_action("PROMOTE", "credit:v1.0", "bob", Map::new(), AuditStatus::Success);

        let path = partition_path(dir.path(), Local::now().date_naive());
        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["action"], "REGISTER");
        assert_eq!(first["status"], "SUCCESS");
        assert_eq!(first["details"]["sha"], "abc");
    }

    #[test]
    fn reopening_replays_history() {
        let dir = tempfile::tempdir().unwrap();
        let logged = {
            let trail = AuditTrail::durable(dir.path()).unwrap();
            trail.log_action("REGISTER", "credit:v1.0", "alice", Map::new(), AuditStatus::Success);
            trail.get_logs(None, None, 30)
        };
        fs::write(dir.path().join("notes.txt"), "not a partition").unwrap();

        let reopened = AuditTrail::durable(dir.path()).unwrap();
        assert_eq!(reopened.get_logs(None, None, 30), logged);
    }

    #[test]
    fn days_back_bounds_the_query() {
        let dir = tempfile::tempdir().unwrap();
        let old = AuditEntry {
            timestamp: Utc::now() - Duration::days(60),
            action: "REGISTER".into(),
            model_id: "credit:v1.0".into(),
            actor: "alice".into(),
            details: Map::new(),
            status: AuditStatus::Success,
        };
        let old_date = old.timestamp.with_timezone(&Local).date_naive();
        append_line(&partition_path(dir.path(), old_date), &old).unwrap();
        // Malformed lines do not block replay.
        let mut file = OpenOptions::new()
            .append(true)
            .open(partition_path(dir.path(), old_date))
            .unwrap();
        file.write_all(b"{broken\n").unwrap();

        let trail = AuditTrail::durable(dir.path()).unwrap();
        trail.log_action("PROMOTE", "credit:v1.0", "bob", Map::new(), AuditStatus::Success);

        assert_eq!(trail.len(), 2);
        let recent = trail.get_logs(None, None, 30);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].action, "PROMOTE");
        assert_eq!(trail.get_logs(None, None, 90).len(), 2);
        assert_eq!(trail.get_logs(None, None, 90)[0], old);
    }

    #[test]
    fn write_failure_returns_false() {
        let dir = tempfile::tempdir().unwrap();
        let audit_dir = dir.path().join("audit");
        let trail = AuditTrail::durable(&audit_dir).unwrap();
        fs::remove_dir_all(&audit_dir).unwrap();

        assert!(!trail.log_action("REGISTER", "credit:v1.0", "alice", Map::new(), AuditStatus::Success));
        assert_eq!(trail.len(), 1);
    }

    #[test]
    fn partition_names() {
        assert!(is_partition_file("audit_2024-03-01.jsonl"));
        assert!(!is_partition_file("audit_latest.jsonl"));
        assert!(!is_partition_file("audit_2024-03-01.json"));
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert!(partition_path(Path::new("/logs"), date).ends_with("audit_2024-03-01.jsonl"));
    }
}

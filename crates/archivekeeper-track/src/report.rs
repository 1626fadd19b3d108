//! Human-readable and serialisable run reports.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use archivekeeper_core::{
    ArchivePath, AuditEntry, ChangeEvent, EventKind, HashAlgorithm, ReadFailure, RunId,
};

/// Summary of one committed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Identifier of the committed run.
    pub run_id: RunId,
    /// Canonical archive root.
    pub root: PathBuf,
    /// Snapshot database.
    pub database: PathBuf,
    /// Digest algorithm.
    pub algorithm: HashAlgorithm,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run committed.
    pub finished_at: DateTime<Utc>,
    /// Time spent walking and hashing.
    pub hash_duration: Duration,
    /// Files hashed successfully.
    pub files_seen: u64,
    /// Bytes hashed.
    pub bytes_hashed: u64,
    /// Active records after the run.
    pub tracked: usize,
    /// Missing records after the run.
    pub missing_records: usize,
    /// Event counts per kind.
    pub counts: BTreeMap<EventKind, usize>,
    /// Every event, in path order.
    pub events: Vec<ChangeEvent>,
    /// Paths that could not be read, with their error kind.
    pub read_failures: Vec<ReadFailure>,
    /// Tracked paths left unverified beneath unreadable directories.
    pub unverified: Vec<ArchivePath>,
}

impl RunReport {
    /// Whether any event needs an operator's attention.
    pub fn has_alarms(&self) -> bool {
        self.events.iter().any(|e| e.kind.is_alarm())
    }

    /// Number of events of a kind.
    pub fn count(&self, kind: EventKind) -> usize {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    /// Render the plain-text summary printed by the CLI.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let rule = "─".repeat(60);

        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out, " {} ({})", self.root.display(), self.algorithm);
        let _ = writeln!(
            out,
            " Run #{}: {} files, {} hashed in {:.2}s",
            self.run_id.0,
            self.files_seen,
            format_size(self.bytes_hashed),
            self.hash_duration.as_secs_f64()
        );
        let _ = writeln!(
            out,
            " {} tracked, {} missing",
            self.tracked, self.missing_records
        );
        let _ = writeln!(out, "{rule}");

        for kind in [
            EventKind::Added,
            EventKind::Modified,
            EventKind::Moved,
            EventKind::Missing,
            EventKind::Corrupted,
            EventKind::Recovered,
            EventKind::ReadError,
        ] {
            let _ = writeln!(out, "   {:<12} {:>6}", kind_label(kind), self.count(kind));
        }

        if !self.events.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, " Events:");
            for event in &self.events {
                let _ = writeln!(out, "   {}", describe_event(event));
            }
        }

        if !self.read_failures.is_empty() || !self.unverified.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, " Skipped paths:");
            for failure in &self.read_failures {
                let suffix = if failure.is_dir { "/" } else { "" };
                let _ = writeln!(
                    out,
                    "   {}{} [{}] {}",
                    failure.path, suffix, failure.kind, failure.message
                );
            }
            for path in &self.unverified {
                let _ = writeln!(out, "   {path} [unverified]");
            }
        }

        if self.events.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, " No changes.");
        }
        out
    }
}

/// Render audit log entries, one per line.
pub fn render_history(entries: &[AuditEntry]) -> String {
    let mut out = String::new();
    if entries.is_empty() {
        out.push_str(" No events.\n");
        return out;
    }
    for entry in entries {
        let run = entry
            .run_id
            .map(|r| format!("run {}", r.0))
            .unwrap_or_else(|| "manual".to_string());
        let _ = writeln!(
            out,
            "{:>6}  {}  {:<8}  {}",
            entry.id.0,
            entry.event.timestamp.format("%Y-%m-%d %H:%M:%S"),
            run,
            describe_event(&entry.event)
        );
    }
    out
}

/// One-line description of an event.
pub fn describe_event(event: &ChangeEvent) -> String {
    let label = kind_label(event.kind);
    match event.kind {
        EventKind::Moved => format!(
            "{label:<10} {} -> {}",
            event.path,
            event.to_path.as_deref().unwrap_or("?")
        ),
        EventKind::Modified | EventKind::Corrupted => match (event.old_hash, event.new_hash) {
            (Some(old), Some(new)) => {
                format!("{label:<10} {} ({} -> {})", event.path, old.short(), new.short())
            }
            _ => format!("{label:<10} {}", event.path),
        },
        EventKind::ReadError => format!(
            "{label:<10} {}: {}",
            event.path,
            event.detail.as_deref().unwrap_or("unreadable")
        ),
        _ => format!("{label:<10} {}", event.path),
    }
}

/// Format size in human-readable form.
pub fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}

/// Upper-case label used in text output.
fn kind_label(kind: EventKind) -> String {
    kind.to_string().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use archivekeeper_core::{ContentHash, EventId, FailureKind};

    fn report(events: Vec<ChangeEvent>, read_failures: Vec<ReadFailure>) -> RunReport {
        let mut counts = BTreeMap::new();
        for e in &events {
            *counts.entry(e.kind).or_insert(0) += 1;
        }
        RunReport {
            run_id: RunId(3),
            root: PathBuf::from("/archive"),
            database: PathBuf::from("/archive/.archivekeeper/state.db"),
            algorithm: HashAlgorithm::Sha256,
            started_at: Utc::now(),
            finished_at: Utc::now(),
            hash_duration: Duration::from_millis(1500),
            files_seen: 3,
            bytes_hashed: 2048,
            tracked: 3,
            missing_records: 0,
            counts,
            events,
            read_failures,
            unverified: Vec::new(),
        }
    }

    #[test]
    fn test_text_lists_counts_events_and_skipped_paths() {
        let now = Utc::now();
        let events = vec![
            ChangeEvent::moved("a.tiff", "sub/a.tiff", ContentHash::new([1; 32]), now),
            ChangeEvent::corrupted(
                "c.tiff",
                ContentHash::new([2; 32]),
                ContentHash::new([3; 32]),
                now,
            ),
        ];
        let failures = vec![ReadFailure::file(
            "locked.tiff",
            FailureKind::PermissionDenied,
            "denied",
        )];
        let text = report(events, failures).render_text();

        assert!(text.contains("Run #3: 3 files,"));
        assert!(text.contains("/archive (sha256)"));
        assert!(text.contains("MOVED"));
        assert!(text.contains("a.tiff -> sub/a.tiff"));
        assert!(text.contains("CORRUPTED"));
        assert!(text.contains("locked.tiff [permission_denied] denied"));
    }

    #[test]
    fn test_alarms() {
        let now = Utc::now();
        let calm = report(vec![ChangeEvent::added("a", ContentHash::new([1; 32]), now)], vec![]);
        assert!(!calm.has_alarms());
        assert!(calm.render_text().contains("ADDED"));

        let loud = report(vec![ChangeEvent::missing("a", ContentHash::new([1; 32]), now)], vec![]);
        assert!(loud.has_alarms());
        assert_eq!(loud.count(EventKind::Missing), 1);
    }

    #[test]
    fn test_empty_run_says_so() {
        assert!(report(vec![], vec![]).render_text().contains("No changes."));
    }

    #[test]
    fn test_report_serialises_kind_keys() {
        let now = Utc::now();
        let json = serde_json::to_value(report(
            vec![ChangeEvent::added("a", ContentHash::new([1; 32]), now)],
            vec![],
        ))
        .unwrap();
        assert_eq!(json["counts"]["added"], 1);
        assert_eq!(json["events"][0]["kind"], "added");
    }

    #[test]
    fn test_history_rendering() {
        let entry = AuditEntry {
            id: EventId(7),
            run_id: None,
            event: ChangeEvent::forgotten("gone.tiff", ContentHash::new([1; 32]), Utc::now()),
        };
        let text = render_history(&[entry]);
        assert!(text.contains("manual"));
        assert!(text.contains("FORGOTTEN"));
        assert!(render_history(&[]).contains("No events."));
    }
}

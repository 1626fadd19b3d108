//! Diff a previous snapshot against a run's observations.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use archivekeeper_core::{
    ArchivePath, ChangeEvent, ContentHash, EventKind, FileRecord, FileStatus, ObservationSet,
    ObservedFile, Snapshot,
};

use crate::pairing::pair_moves;

/// What a run concluded about one file path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Content verified, nothing to report.
    Unchanged,
    /// Not examined because its directory could not be listed.
    Skipped,
    /// An event of this kind was emitted for the path.
    Changed(EventKind),
}

/// Result of classifying one run.
#[derive(Debug, Clone, Default)]
pub struct Classification {
    /// Events in path order.
    pub events: Vec<ChangeEvent>,
    /// Snapshot to commit.
    pub next: Snapshot,
    /// One outcome per path in the active previous records, the observed
    /// files and the unreadable files. Moves contribute both paths.
    pub outcomes: BTreeMap<ArchivePath, Outcome>,
}

impl Classification {
    /// Number of events of a kind.
    pub fn count(&self, kind: EventKind) -> usize {
        self.events.iter().filter(|e| e.kind == kind).count()
    }

    /// Event counts per kind.
    pub fn counts(&self) -> BTreeMap<EventKind, usize> {
        let mut counts = BTreeMap::new();
        for event in &self.events {
            *counts.entry(event.kind).or_insert(0) += 1;
        }
        counts
    }

    /// Paths left unverified beneath unreadable directories.
    pub fn skipped(&self) -> impl Iterator<Item = &ArchivePath> {
        self.outcomes
            .iter()
            .filter(|(_, o)| **o == Outcome::Skipped)
            .map(|(path, _)| path)
    }

    fn emit(&mut self, event: ChangeEvent) {
        self.outcomes.insert(event.path.clone(), Outcome::Changed(event.kind));
        if let Some(ref to) = event.to_path {
            self.outcomes.insert(to.clone(), Outcome::Changed(event.kind));
        }
        self.events.push(event);
    }
}

/// Refresh a record from a fresh observation of the same content.
fn verified(record: &FileRecord, seen: &ObservedFile, now: DateTime<Utc>) -> FileRecord {
    FileRecord {
        path: seen.path.clone(),
        size: seen.size,
        mtime: seen.mtime,
        content_hash: seen.content_hash,
        status: FileStatus::Active,
        first_seen: record.first_seen,
        last_verified: now,
    }
}

/// Classify every path of `previous` and `observed` into events and build
/// the next snapshot.
///
/// Only active records take part in the diff. Missing records are carried
/// forward until their path reappears. The observation set must be complete:
/// move detection needs every added and missing candidate at once.
pub fn classify(
    previous: &Snapshot,
    observed: &ObservationSet,
    now: DateTime<Utc>,
) -> Classification {
    let mut out = Classification::default();
    let mut missing: Vec<&FileRecord> = Vec::new();
    let mut added: Vec<&ObservedFile> = Vec::new();

    for record in previous.records() {
        let path = record.path.as_str();

        if record.is_missing() {
            if observed.files.contains_key(path) {
                // Reappearance is handled with the observations below.
                continue;
            }
            if let Some(failure) = observed.file_failure(path) {
                out.emit(ChangeEvent::read_error(
                    path,
                    Some(record.content_hash),
                    &failure.message,
                    now,
                ));
            }
            out.next.insert(record.clone());
            continue;
        }

        match observed.files.get(path) {
            Some(seen) if seen.content_hash == record.content_hash => {
                out.outcomes.insert(record.path.clone(), Outcome::Unchanged);
                out.next.insert(verified(record, seen, now));
            }
            Some(seen) => {
                let event = if seen.size != record.size || seen.mtime != record.mtime {
                    debug!(path, "modified");
                    ChangeEvent::modified(path, record.content_hash, seen.content_hash, now)
                } else {
                    warn!(
                        path,
                        expected = %record.content_hash.short(),
                        found = %seen.content_hash.short(),
                        "content changed without a size or mtime change"
                    );
                    ChangeEvent::corrupted(path, record.content_hash, seen.content_hash, now)
                };
                out.emit(event);
                out.next.insert(verified(record, seen, now));
            }
            None => {
                if let Some(failure) = observed.file_failure(path) {
                    warn!(path, kind = %failure.kind, "tracked file could not be read");
                    out.emit(ChangeEvent::read_error(
                        path,
                        Some(record.content_hash),
                        &failure.message,
                        now,
                    ));
                    out.next.insert(FileRecord {
                        status: FileStatus::Missing,
                        ..record.clone()
                    });
                } else if observed.hidden_by(path).is_some() {
                    out.outcomes.insert(record.path.clone(), Outcome::Skipped);
                    out.next.insert(record.clone());
                } else {
                    missing.push(record);
                }
            }
        }
    }

    for seen in observed.files.values() {
        match previous.get(&seen.path) {
            Some(record) if record.is_active() => {}
            Some(record) if record.content_hash == seen.content_hash => {
                debug!(path = %seen.path, "missing file recovered");
                out.emit(ChangeEvent::recovered(
                    seen.path.clone(),
                    seen.content_hash,
                    now,
                ));
                out.next.insert(verified(record, seen, now));
            }
            _ => added.push(seen),
        }
    }

    for failure in &observed.failures {
        if failure.is_dir {
            warn!(path = %failure.path, kind = %failure.kind, "directory could not be listed");
            let event = ChangeEvent::read_error(failure.path.clone(), None, &failure.message, now);
            // Directory failures are reported but do not claim a file outcome.
            out.events.push(event);
        } else if previous.get(&failure.path).is_none() {
            warn!(path = %failure.path, kind = %failure.kind, "untracked file could not be read");
            out.emit(ChangeEvent::read_error(
                failure.path.clone(),
                None,
                &failure.message,
                now,
            ));
        }
    }

    let missing_candidates: Vec<(ArchivePath, ContentHash)> = missing
        .iter()
        .map(|r| (r.path.clone(), r.content_hash))
        .collect();
    // A path still held by a missing record is never a move target.
    let added_candidates: Vec<(ArchivePath, ContentHash)> = added
        .iter()
        .filter(|o| previous.get(&o.path).is_none())
        .map(|o| (o.path.clone(), o.content_hash))
        .collect();
    let pairs = pair_moves(&missing_candidates, &added_candidates);

    let mut moved_from = std::collections::HashSet::new();
    let mut moved_to = std::collections::HashSet::new();
    for pair in &pairs {
        // Both sides come from the candidate lists, so the lookups succeed.
        let (Some(record), Some(seen)) =
            (previous.get(&pair.from), observed.files.get(&pair.to))
        else {
            continue;
        };
        debug!(from = %pair.from, to = %pair.to, "moved");
        out.emit(ChangeEvent::moved(pair.from.clone(), pair.to.clone(), pair.hash, now));
        out.next.insert(verified(record, seen, now));
        moved_from.insert(pair.from.as_str());
        moved_to.insert(pair.to.as_str());
    }

    for record in missing {
        if moved_from.contains(record.path.as_str()) {
            continue;
        }
        warn!(path = %record.path, "tracked file is missing");
        out.emit(ChangeEvent::missing(
            record.path.clone(),
            record.content_hash,
            now,
        ));
        out.next.insert(FileRecord {
            status: FileStatus::Missing,
            ..record.clone()
        });
    }

    for seen in added {
        if moved_to.contains(seen.path.as_str()) {
            continue;
        }
        let mut event = ChangeEvent::added(seen.path.clone(), seen.content_hash, now);
        if let Some(previous_record) = previous.get(&seen.path) {
            event = event.with_old_hash(previous_record.content_hash);
        }
        out.emit(event);
        out.next.insert(FileRecord::new_active(
            seen.path.clone(),
            seen.size,
            seen.mtime,
            seen.content_hash,
            now,
        ));
    }

    out.events.sort_by(|a, b| a.path.cmp(&b.path));
    out
}

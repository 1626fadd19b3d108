//! Move resolution between missing and added candidates.
//!
//! Candidates are grouped by content hash; only candidates inside the same
//! group can pair. When a group holds more than one candidate on either
//! side (duplicate content), pairs are chosen greedily by ascending path
//! edit distance, ties broken by `(from, to)` in lexicographic order. This
//! is a heuristic: with duplicate content there is no way to know which copy
//! really moved.

use std::collections::HashSet;

use itertools::Itertools;

use archivekeeper_core::{ArchivePath, ContentHash};

/// A missing path and an added path holding the same content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovePair {
    /// Path that disappeared.
    pub from: ArchivePath,
    /// Path the content appeared at.
    pub to: ArchivePath,
    /// Shared digest.
    pub hash: ContentHash,
}

/// Pair missing candidates with added candidates of identical content.
///
/// Each candidate is used at most once. The result is sorted by `from`.
pub fn pair_moves(
    missing: &[(ArchivePath, ContentHash)],
    added: &[(ArchivePath, ContentHash)],
) -> Vec<MovePair> {
    let added_by_hash = added
        .iter()
        .map(|(path, hash)| (*hash, path))
        .into_group_map();

    let mut pairs = Vec::new();
    for (hash, sources) in missing.iter().map(|(path, hash)| (*hash, path)).into_group_map() {
        let Some(targets) = added_by_hash.get(&hash) else {
            continue;
        };

        let candidates = sources
            .iter()
            .cartesian_product(targets.iter())
            .map(|(from, to)| (edit_distance(from, to), *from, *to))
            .sorted();

        let mut used_from = HashSet::new();
        let mut used_to = HashSet::new();
        for (_, from, to) in candidates {
            if used_from.contains(from) || used_to.contains(to) {
                continue;
            }
            used_from.insert(from);
            used_to.insert(to);
            pairs.push(MovePair {
                from: from.clone(),
                to: to.clone(),
                hash,
            });
        }
    }

    pairs.sort_by(|a, b| a.from.cmp(&b.from));
    pairs
}

/// Levenshtein distance between two paths, by character.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != *cb);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

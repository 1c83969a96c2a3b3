//! Nearest-neighbour classification over the registry snapshot.

use crate::registry::Snapshot;
use crate::types::{Classification, Embedding};

/// Strategy for classifying an observed embedding against a roster.
///
/// Implementations may index the roster differently, but must return the
/// exact nearest neighbour whenever it lies within `tolerance`.
pub trait Matcher {
    fn classify(&self, observed: &Embedding, snapshot: &Snapshot, tolerance: f32) -> Classification;
}

/// Linear scan with Euclidean distance. O(N·D) per query.
///
/// A candidate passes when its distance is `<= tolerance`; among all
/// candidates the globally closest one wins, and the earliest entry
/// wins an exact tie.
#[derive(Debug, Default, Clone, Copy)]
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn classify(&self, observed: &Embedding, snapshot: &Snapshot, tolerance: f32) -> Classification {
        let mut best_dist = f32::INFINITY;
        let mut best_idx: Option<usize> = None;

        for (i, entry) in snapshot.entries().iter().enumerate() {
            let dist = observed.euclidean_distance(&entry.embedding);
            if dist < best_dist {
                best_dist = dist;
                best_idx = Some(i);
            }
        }

        match best_idx {
            Some(idx) if best_dist <= tolerance => {
                let entry = &snapshot.entries()[idx];
                tracing::trace!(key = %entry.key, distance = best_dist, "matched");
                Classification::Matched {
                    key: entry.key.clone(),
                    name: entry.name.clone(),
                    distance: best_dist,
                }
            }
            _ => Classification::Unmatched,
        }
    }
}

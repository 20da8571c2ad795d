//! Identity matching by embedding distance.
//!
//! Embeddings are produced outside the core once a frame is judged REAL.
//! The matcher only compares them.

use serde::{Deserialize, Serialize};

/// Face embedding vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Euclidean distance, `None` when dimensions differ.
    pub fn distance(&self, other: &Embedding) -> Option<f32> {
        if self.values.len() != other.values.len() {
            return None;
        }
        let sum: f32 = self
            .values
            .iter()
            .zip(&other.values)
            .map(|(a, b)| (a - b) * (a - b))
            .sum();
        Some(sum.sqrt())
    }
}

/// Result of comparing a probe against a gallery.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    /// Closest identity within tolerance, `None` for unknown.
    pub user_id: Option<String>,
    /// Distance to the closest gallery entry, if any was comparable.
    pub distance: Option<f32>,
}

impl MatchResult {
    pub fn label(&self) -> &str {
        self.user_id.as_deref().unwrap_or("Unknown")
    }
}

/// Nearest-neighbour matcher with a maximum accepted distance.
#[derive(Debug, Clone, Copy)]
pub struct DistanceMatcher {
    pub tolerance: f32,
}

/// Distance at or below which two embeddings are the same person.
pub const DEFAULT_MATCH_TOLERANCE: f32 = 0.6;

impl Default for DistanceMatcher {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_MATCH_TOLERANCE,
        }
    }
}

impl DistanceMatcher {
    pub fn new(tolerance: f32) -> Self {
        Self { tolerance }
    }

    /// Closest gallery entry, accepted only if its distance is within
    /// tolerance. Entries of a different dimension are skipped.
    pub fn best_match<'a, I>(&self, probe: &Embedding, gallery: I) -> MatchResult
    where
        I: IntoIterator<Item = (&'a str, &'a Embedding)>,
    {
        let mut best: Option<(&str, f32)> = None;
        for (user_id, candidate) in gallery {
            let Some(distance) = probe.distance(candidate) else {
                tracing::debug!(
                    user_id,
                    probe_dim = probe.dim(),
                    gallery_dim = candidate.dim(),
                    "skipping gallery entry with mismatched dimension"
                );
                continue;
            };
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((user_id, distance));
            }
        }

        match best {
            Some((user_id, distance)) if distance <= self.tolerance => MatchResult {
                user_id: Some(user_id.to_string()),
                distance: Some(distance),
            },
            Some((_, distance)) => MatchResult {
                user_id: None,
                distance: Some(distance),
            },
            None => MatchResult {
                user_id: None,
                distance: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emb(values: &[f32]) -> Embedding {
        Embedding::new(values.to_vec())
    }

    #[test]
    fn test_distance() {
        assert_eq!(emb(&[0.0, 0.0]).distance(&emb(&[3.0, 4.0])), Some(5.0));
        assert_eq!(emb(&[0.0]).distance(&emb(&[1.0, 2.0])), None);
    }

    #[test]
    fn test_empty_gallery_is_unknown() {
        let gallery = Vec::<(&str, &Embedding)>::new();
        let result = DistanceMatcher::default().best_match(&emb(&[1.0]), gallery);
        assert_eq!(result.user_id, None);
        assert_eq!(result.distance, None);
        assert_eq!(result.label(), "Unknown");
    }

    #[test]
    fn test_closest_within_tolerance() {
        let alice = emb(&[0.0, 0.0]);
        let bob = emb(&[0.3, 0.0]);
        let gallery = vec![("alice", &alice), ("bob", &bob)];
        let result = DistanceMatcher::new(0.6).best_match(&emb(&[0.25, 0.0]), gallery);
        assert_eq!(result.label(), "bob");
        assert!((result.distance.unwrap() - 0.05).abs() < 1e-6);
    }

    #[test]
    fn test_closest_outside_tolerance_is_unknown() {
        let alice = emb(&[0.0, 0.0]);
        let result = DistanceMatcher::new(0.6).best_match(&emb(&[1.0, 0.0]), [("alice", &alice)]);
        assert_eq!(result.user_id, None);
        assert_eq!(result.distance, Some(1.0));
    }

    #[test]
    fn test_mismatched_dimensions_skipped() {
        let short = emb(&[0.0]);
        let alice = emb(&[0.1, 0.0]);
        let gallery = [("short", &short), ("alice", &alice)];
        let result = DistanceMatcher::default().best_match(&emb(&[0.0, 0.0]), gallery);
        assert_eq!(result.label(), "alice");
    }
}

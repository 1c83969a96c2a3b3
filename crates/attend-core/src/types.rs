use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Face embedding vector. Serializes as a bare JSON array of numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    /// Euclidean distance, accumulated in index order so identical inputs
    /// always give bit-identical results.
    ///
    /// # Panics
    ///
    /// Panics if the two embeddings differ in dimension. Callers validate
    /// dimensions before anything reaches the matcher, so a mismatch here
    /// means a corrupted registry.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        assert_eq!(
            self.values.len(),
            other.values.len(),
            "embedding dimension mismatch inside distance computation"
        );

        let mut sum = 0.0f32;
        for (a, b) in self.values.iter().zip(other.values.iter()) {
            let d = a - b;
            sum += d * d;
        }
        sum.sqrt()
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(values: Vec<f32>) -> Self {
        Self { values }
    }
}

/// An enrolled person.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub key: String,
    pub name: String,
    pub embedding: Embedding,
    pub created_at: DateTime<Local>,
}

/// Outcome of one match attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Matched {
        key: String,
        name: String,
        /// Euclidean distance to the closest enrolled embedding.
        distance: f32,
    },
    Unmatched,
}

impl Classification {
    pub fn is_match(&self) -> bool {
        matches!(self, Classification::Matched { .. })
    }

    pub fn key(&self) -> Option<&str> {
        match self {
            Classification::Matched { key, .. } => Some(key.as_str()),
            Classification::Unmatched => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttendanceKind {
    CheckIn,
}

impl AttendanceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceKind::CheckIn => "check-in",
        }
    }
}

impl fmt::Display for AttendanceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttendanceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "check-in" => Ok(AttendanceKind::CheckIn),
            other => Err(format!("unknown attendance kind: {other}")),
        }
    }
}

/// One row of the attendance log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub timestamp: DateTime<Local>,
    pub identity_key: String,
    pub name: String,
    pub kind: AttendanceKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_euclidean_distance_basic() {
        let a = Embedding::new(vec![0.0, 0.0]);
        let b = Embedding::new(vec![3.0, 4.0]);
        assert!((a.euclidean_distance(&b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_euclidean_distance_identical_is_zero() {
        let a = Embedding::new(vec![0.25, -0.5, 0.75]);
        assert_eq!(a.euclidean_distance(&a.clone()), 0.0);
    }

    #[test]
    fn test_euclidean_distance_deterministic() {
        let a = Embedding::new((0..128).map(|i| (i as f32 * 0.37).sin()).collect());
        let b = Embedding::new((0..128).map(|i| (i as f32 * 0.11).cos()).collect());
        let first = a.euclidean_distance(&b);
        for _ in 0..10 {
            assert_eq!(a.euclidean_distance(&b).to_bits(), first.to_bits());
        }
    }

    #[test]
    #[should_panic(expected = "dimension mismatch")]
    fn test_euclidean_distance_dimension_mismatch_panics() {
        let a = Embedding::new(vec![0.0, 0.0]);
        let b = Embedding::new(vec![0.0, 0.0, 0.0]);
        a.euclidean_distance(&b);
    }

    #[test]
    fn test_embedding_serializes_as_array() {
        let e = Embedding::new(vec![1.0, 2.5]);
        assert_eq!(serde_json::to_string(&e).unwrap(), "[1.0,2.5]");
        let back: Embedding = serde_json::from_str("[1.0,2.5]").unwrap();
        assert_eq!(back, e);
    }

    #[test]
    fn test_attendance_kind_strings() {
        assert_eq!(AttendanceKind::CheckIn.to_string(), "check-in");
        assert_eq!("check-in".parse::<AttendanceKind>(), Ok(AttendanceKind::CheckIn));
        assert!("check-out".parse::<AttendanceKind>().is_err());
    }
}

//! attend-core — Identity matching and attendance dedup engine.
//!
//! Matches observed face embeddings against a registry of enrolled
//! identities and turns confident matches into at most one attendance
//! event per cooldown window, plus at most one greeting per day.

pub mod announce;
pub mod attendance;
pub mod cycle;
pub mod enroll;
pub mod greeting;
pub mod matcher;
pub mod oracle;
pub mod registry;
pub mod sink;
pub mod store;
pub mod types;

pub use announce::{AnnounceError, Announcer};
pub use attendance::{AttendanceGate, FireTicket};
pub use cycle::{Effect, FrameCycle, Greeting};
pub use enroll::{EnrollError, Enrollment};
pub use greeting::{GreetTicket, GreetingGate};
pub use matcher::{EuclideanMatcher, Matcher};
pub use oracle::{EmbeddingOracle, OracleError};
pub use registry::{RebuildReport, Registry, RegistryError, RosterEntry, Snapshot};
pub use sink::{AttendanceSink, SinkError};
pub use store::{IdentityStore, StoreError};
pub use types::{AttendanceKind, AttendanceRecord, Classification, Embedding, Identity};

/// Default match tolerance (maximum Euclidean distance for a match).
pub const DEFAULT_TOLERANCE: f32 = 0.5;

/// Default minimum interval between two logged events for one identity.
pub const DEFAULT_COOLDOWN_SECS: u64 = 30;

/// Default embedding dimension (dlib-style face descriptors).
pub const DEFAULT_EMBEDDING_DIM: usize = 128;

//! One recognition pass per frame.
//!
//! The cycle owns no cross-frame state: everything that must survive
//! between frames lives in the two gates, which are keyed by wall-clock
//! time. Skipping or dropping frames therefore never breaks dedup.

use crate::attendance::{AttendanceGate, FireTicket};
use crate::greeting::{greeting_for, GreetTicket, GreetingGate};
use crate::matcher::{EuclideanMatcher, Matcher};
use crate::registry::Registry;
use crate::types::{AttendanceKind, AttendanceRecord, Classification, Embedding};
use chrono::{DateTime, Local};
use std::sync::Arc;

/// First-of-the-day greeting that rides along with a log request.
///
/// Speak `text` only once the record is appended; otherwise revoke
/// `ticket` so the next logged sighting that day is greeted.
#[derive(Debug, Clone, PartialEq)]
pub struct Greeting {
    pub text: String,
    pub ticket: GreetTicket,
}

/// Side effect requested by a frame, to be carried out by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Append to the attendance log. If the append fails, revoke `ticket`
    /// and the greeting's ticket, and say nothing.
    LogAttendance {
        record: AttendanceRecord,
        ticket: FireTicket,
        greeting: Option<Greeting>,
    },
    /// An unmatched face. The caller decides whether and how often to speak.
    Unknown,
}

pub struct FrameCycle<M = EuclideanMatcher> {
    registry: Arc<Registry>,
    attendance: Arc<AttendanceGate>,
    greetings: Arc<GreetingGate>,
    matcher: M,
    tolerance: f32,
}

impl FrameCycle<EuclideanMatcher> {
    pub fn new(
        registry: Arc<Registry>,
        attendance: Arc<AttendanceGate>,
        greetings: Arc<GreetingGate>,
        tolerance: f32,
    ) -> Self {
        Self::with_matcher(registry, attendance, greetings, EuclideanMatcher, tolerance)
    }
}

impl<M: Matcher> FrameCycle<M> {
    pub fn with_matcher(
        registry: Arc<Registry>,
        attendance: Arc<AttendanceGate>,
        greetings: Arc<GreetingGate>,
        matcher: M,
        tolerance: f32,
    ) -> Self {
        Self {
            registry,
            attendance,
            greetings,
            matcher,
            tolerance,
        }
    }

    pub fn tolerance(&self) -> f32 {
        self.tolerance
    }

    /// Classify every face in one frame and run the results through the gates.
    ///
    /// Faces are handled strictly in order and each face's gate transitions
    /// complete before the next face is classified, so two detections of the
    /// same person in one frame log at most once. The whole frame is matched
    /// against a single registry snapshot.
    pub fn process(&self, faces: &[Embedding], now: DateTime<Local>) -> Vec<Effect> {
        let snapshot = self.registry.snapshot();
        let mut effects = Vec::new();

        for (i, observed) in faces.iter().enumerate() {
            if let Err(e) = self.registry.validate(observed) {
                tracing::warn!(face = i, error = %e, "dropping observed embedding");
                continue;
            }

            match self.matcher.classify(observed, &snapshot, self.tolerance) {
                Classification::Matched { key, name, distance } => {
                    let Some(ticket) = self.attendance.try_fire_ticket(&key, now) else {
                        tracing::trace!(key = %key, "within cooldown");
                        continue;
                    };
                    tracing::info!(key = %key, name = %name, distance, "attendance fired");

                    let greeting = self.greetings.try_greet_ticket(&key, now).map(|ticket| Greeting {
                        text: greeting_for(&name, now),
                        ticket,
                    });
                    effects.push(Effect::LogAttendance {
                        record: AttendanceRecord {
                            timestamp: now,
                            identity_key: key,
                            name,
                            kind: AttendanceKind::CheckIn,
                        },
                        ticket,
                        greeting,
                    });
                }
                Classification::Unmatched => {
                    if self.greetings.unknown_greeting_allowed() {
                        effects.push(Effect::Unknown);
                    }
                }
            }
        }

        effects
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Identity;
    use chrono::TimeZone;
    use std::time::Duration;

    fn t0() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 5, 9, 0, 0).single().unwrap()
    }

    fn cycle(greet_unknown: bool) -> FrameCycle {
        let registry = Arc::new(Registry::new(2));
        registry.rebuild(vec![
            Identity {
                key: "a".into(),
                name: "Alice".into(),
                embedding: Embedding::new(vec![0.0, 0.0]),
                created_at: t0(),
            },
            Identity {
                key: "b".into(),
                name: "Bob".into(),
                embedding: Embedding::new(vec![1.0, 0.0]),
                created_at: t0(),
            },
        ]);
        FrameCycle::new(
            registry,
            Arc::new(AttendanceGate::new(Duration::from_secs(30))),
            Arc::new(GreetingGate::new(greet_unknown)),
            0.5,
        )
    }

    fn logged_keys(effects: &[Effect]) -> Vec<String> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::LogAttendance { record, .. } => Some(record.identity_key.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_match_logs_and_greets() {
        let cycle = cycle(false);
        let effects = cycle.process(&[Embedding::new(vec![0.1, 0.0])], t0());

        assert_eq!(effects.len(), 1);
        match &effects[0] {
            Effect::LogAttendance { record, ticket, greeting } => {
                assert_eq!(record.identity_key, "a");
                assert_eq!(record.name, "Alice");
                assert_eq!(record.timestamp, t0());
                assert_eq!(record.kind, AttendanceKind::CheckIn);
                assert_eq!(ticket.key(), "a");
                let greeting = greeting.as_ref().expect("first sighting is greeted");
                assert_eq!(greeting.ticket.key(), "a");
                assert!(greeting.text.contains("Alice"));
            }
            other => panic!("expected log effect, got {other:?}"),
        }
    }

    #[test]
    fn test_same_person_twice_in_one_frame_logs_once() {
        let cycle = cycle(false);
        let faces = [Embedding::new(vec![0.05, 0.0]), Embedding::new(vec![0.0, 0.05])];
        let effects = cycle.process(&faces, t0());
        assert_eq!(logged_keys(&effects), vec!["a".to_string()]);
    }

    #[test]
    fn test_two_people_in_one_frame() {
        let cycle = cycle(false);
        let faces = [Embedding::new(vec![0.0, 0.0]), Embedding::new(vec![1.0, 0.1])];
        let effects = cycle.process(&faces, t0());
        assert_eq!(logged_keys(&effects), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_cooldown_across_frames() {
        let cycle = cycle(false);
        let face = [Embedding::new(vec![0.0, 0.0])];
        let mut logged = Vec::new();
        for s in [0, 10, 40] {
            let effects = cycle.process(&face, t0() + chrono::Duration::seconds(s));
            if !logged_keys(&effects).is_empty() {
                logged.push(s);
            }
        }
        assert_eq!(logged, vec![0, 40]);
    }

    #[test]
    fn test_second_log_same_day_not_greeted() {
        let cycle = cycle(false);
        let face = [Embedding::new(vec![0.0, 0.0])];
        cycle.process(&face, t0());
        let effects = cycle.process(&face, t0() + chrono::Duration::seconds(60));
        assert_eq!(logged_keys(&effects).len(), 1);
        assert!(matches!(
            &effects[0],
            Effect::LogAttendance { greeting: None, .. }
        ));
    }

    #[test]
    fn test_unknown_only_when_allowed() {
        let far = [Embedding::new(vec![5.0, 5.0])];
        assert!(cycle(false).process(&far, t0()).is_empty());
        assert_eq!(cycle(true).process(&far, t0()), vec![Effect::Unknown]);
    }

    #[test]
    fn test_wrong_dimension_face_is_dropped() {
        let cycle = cycle(true);
        let faces = [Embedding::new(vec![0.0, 0.0, 0.0]), Embedding::new(vec![0.0, 0.0])];
        let effects = cycle.process(&faces, t0());
        assert_eq!(logged_keys(&effects), vec!["a".to_string()]);
        assert!(!effects.contains(&Effect::Unknown));
    }

    #[test]
    fn test_empty_frame_yields_nothing() {
        assert!(cycle(true).process(&[], t0()).is_empty());
    }
}

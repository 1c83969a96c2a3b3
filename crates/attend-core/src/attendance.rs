//! Attendance gate: at most one logged event per identity per cooldown.

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

/// Proof that a fire was granted, carrying what is needed to undo it.
///
/// Returned by [`AttendanceGate::try_fire_ticket`]. If the event it stands
/// for never makes it into the log, hand it back to
/// [`AttendanceGate::revoke`] so the identity is not silenced for a
/// cooldown that was never recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct FireTicket {
    key: String,
    fired_at: DateTime<Local>,
    previous: Option<DateTime<Local>>,
}

impl FireTicket {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn fired_at(&self) -> DateTime<Local> {
        self.fired_at
    }
}

pub struct AttendanceGate {
    cooldown: Duration,
    last_fired: Mutex<HashMap<String, DateTime<Local>>>,
}

impl AttendanceGate {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_fired: Mutex::new(HashMap::new()),
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Atomic check-and-set. `true` means the event should be logged.
    pub fn try_fire(&self, key: &str, now: DateTime<Local>) -> bool {
        self.try_fire_ticket(key, now).is_some()
    }

    /// Like [`try_fire`](Self::try_fire) but returns a ticket for the fire.
    ///
    /// Fires when the identity has never fired, or when at least the
    /// cooldown has elapsed since its last fire. A clock reading earlier
    /// than the stored one never fires, so the stored timestamp only
    /// moves forward.
    pub fn try_fire_ticket(&self, key: &str, now: DateTime<Local>) -> Option<FireTicket> {
        let mut last_fired = self.last_fired.lock();
        let previous = last_fired.get(key).copied();

        if let Some(last) = previous {
            // Negative elapsed time fails to_std() and is treated as "too soon".
            let elapsed = now.signed_duration_since(last).to_std().ok();
            match elapsed {
                Some(e) if e >= self.cooldown => {}
                _ => return None,
            }
        }

        last_fired.insert(key.to_string(), now);
        Some(FireTicket {
            key: key.to_string(),
            fired_at: now,
            previous,
        })
    }

    /// Undo a granted fire, restoring the state it replaced.
    ///
    /// Only takes effect while the identity still holds the ticket's
    /// timestamp; a later fire is never rolled back. Returns whether the
    /// state changed.
    pub fn revoke(&self, ticket: &FireTicket) -> bool {
        let mut last_fired = self.last_fired.lock();
        match last_fired.get(&ticket.key) {
            Some(at) if *at == ticket.fired_at => {
                match ticket.previous {
                    Some(previous) => {
                        last_fired.insert(ticket.key.clone(), previous);
                    }
                    None => {
                        last_fired.remove(&ticket.key);
                    }
                }
                tracing::debug!(key = %ticket.key, "attendance fire revoked");
                true
            }
            _ => false,
        }
    }

    /// Drop all state for an identity that is no longer enrolled.
    pub fn forget(&self, key: &str) {
        self.last_fired.lock().remove(key);
    }

    pub fn last_fired(&self, key: &str) -> Option<DateTime<Local>> {
        self.last_fired.lock().get(key).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::{Arc, Barrier};

    fn t0() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 5, 9, 0, 0).single().unwrap()
    }

    fn secs(s: f64) -> chrono::Duration {
        chrono::Duration::milliseconds((s * 1000.0) as i64)
    }

    fn gate() -> AttendanceGate {
        AttendanceGate::new(Duration::from_secs(30))
    }

    #[test]
    fn test_first_fire_allowed() {
        assert!(gate().try_fire("a", t0()));
    }

    #[test]
    fn test_cooldown_boundary_inclusive() {
        let gate = gate();
        assert!(gate.try_fire("a", t0()));
        assert!(!gate.try_fire("a", t0() + secs(29.999)));
        assert!(gate.try_fire("a", t0() + secs(30.0)));
    }

    #[test]
    fn test_just_after_cooldown_fires() {
        let gate = gate();
        assert!(gate.try_fire("a", t0()));
        assert!(!gate.try_fire("a", t0() + secs(29.9)));
        assert!(gate.try_fire("a", t0() + secs(30.1)));
    }

    #[test]
    fn test_fires_at_0_and_40_only() {
        let gate = gate();
        let fired: Vec<i64> = [0, 10, 40]
            .into_iter()
            .filter(|s| gate.try_fire("a", t0() + chrono::Duration::seconds(*s)))
            .collect();
        assert_eq!(fired, vec![0, 40]);
    }

    #[test]
    fn test_rejected_fire_does_not_extend_cooldown() {
        let gate = gate();
        assert!(gate.try_fire("a", t0()));
        assert!(!gate.try_fire("a", t0() + secs(20.0)));
        // Measured from t0, not from the rejected attempt at t0+20.
        assert!(gate.try_fire("a", t0() + secs(30.0)));
    }

    #[test]
    fn test_identities_are_independent() {
        let gate = gate();
        assert!(gate.try_fire("a", t0()));
        assert!(gate.try_fire("b", t0()));
        assert!(!gate.try_fire("a", t0() + secs(1.0)));
    }

    #[test]
    fn test_clock_going_backwards_never_fires() {
        let gate = gate();
        assert!(gate.try_fire("a", t0()));
        assert!(!gate.try_fire("a", t0() - secs(3600.0)));
        assert_eq!(gate.last_fired("a"), Some(t0()));
    }

    #[test]
    fn test_revoke_restores_idle() {
        let gate = gate();
        let ticket = gate.try_fire_ticket("a", t0()).unwrap();
        assert!(gate.revoke(&ticket));
        assert_eq!(gate.last_fired("a"), None);
        assert!(gate.try_fire("a", t0() + secs(1.0)));
    }

    #[test]
    fn test_revoke_restores_previous_fire() {
        let gate = gate();
        assert!(gate.try_fire("a", t0()));
        let ticket = gate.try_fire_ticket("a", t0() + secs(45.0)).unwrap();
        assert!(gate.revoke(&ticket));
        assert_eq!(gate.last_fired("a"), Some(t0()));
    }

    #[test]
    fn test_stale_revoke_is_ignored() {
        let gate = gate();
        let first = gate.try_fire_ticket("a", t0()).unwrap();
        let second = gate.try_fire_ticket("a", t0() + secs(31.0)).unwrap();
        assert!(!gate.revoke(&first));
        assert_eq!(gate.last_fired("a"), Some(second.fired_at()));
    }

    #[test]
    fn test_forget_clears_state() {
        let gate = gate();
        assert!(gate.try_fire("a", t0()));
        gate.forget("a");
        assert_eq!(gate.last_fired("a"), None);
        assert!(gate.try_fire("a", t0() + secs(1.0)));
    }

    #[test]
    fn test_concurrent_fire_single_winner() {
        for _ in 0..50 {
            let gate = Arc::new(gate());
            let barrier = Arc::new(Barrier::new(2));
            let now = t0();

            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let gate = Arc::clone(&gate);
                    let barrier = Arc::clone(&barrier);
                    std::thread::spawn(move || {
                        barrier.wait();
                        gate.try_fire("a", now)
                    })
                })
                .collect();

            let wins = handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|won| *won)
                .count();
            assert_eq!(wins, 1);
        }
    }
}

//! Notification gate: at most one greeting per identity per calendar day.

use chrono::{DateTime, Local, NaiveDate, Timelike};
use parking_lot::Mutex;
use std::collections::HashMap;

/// Prompt spoken to faces that match nobody.
pub const UNKNOWN_GREETING: &str = "Hello! Please register your details.";

/// A granted greeting, returned by [`GreetingGate::try_greet_ticket`].
#[derive(Debug, Clone, PartialEq)]
pub struct GreetTicket {
    key: String,
    date: NaiveDate,
    previous: Option<NaiveDate>,
}

impl GreetTicket {
    pub fn key(&self) -> &str {
        &self.key
    }
}

pub struct GreetingGate {
    greet_unknown: bool,
    greeted: Mutex<HashMap<String, NaiveDate>>,
}

impl GreetingGate {
    pub fn new(greet_unknown: bool) -> Self {
        Self {
            greet_unknown,
            greeted: Mutex::new(HashMap::new()),
        }
    }

    /// `true` exactly once per identity per local calendar date.
    pub fn try_greet(&self, key: &str, now: DateTime<Local>) -> bool {
        self.try_greet_ticket(key, now).is_some()
    }

    /// Like [`try_greet`](Self::try_greet) but returns a ticket that can
    /// hand the day's greeting back if it is never delivered.
    ///
    /// The stored date is compared rather than cleared, so no daily reset
    /// is needed. A date earlier than the stored one (clock set back) is
    /// treated as already greeted.
    pub fn try_greet_ticket(&self, key: &str, now: DateTime<Local>) -> Option<GreetTicket> {
        let today = now.date_naive();
        let mut greeted = self.greeted.lock();
        let previous = greeted.get(key).copied();
        if matches!(previous, Some(date) if date >= today) {
            return None;
        }
        greeted.insert(key.to_string(), today);
        Some(GreetTicket {
            key: key.to_string(),
            date: today,
            previous,
        })
    }

    /// Undo a granted greeting while the identity still holds its date.
    /// Returns whether the state changed.
    pub fn revoke(&self, ticket: &GreetTicket) -> bool {
        let mut greeted = self.greeted.lock();
        match greeted.get(&ticket.key) {
            Some(date) if *date == ticket.date => {
                match ticket.previous {
                    Some(previous) => {
                        greeted.insert(ticket.key.clone(), previous);
                    }
                    None => {
                        greeted.remove(&ticket.key);
                    }
                }
                tracing::debug!(key = %ticket.key, "greeting revoked");
                true
            }
            _ => false,
        }
    }

    /// Drop all state for an identity that is no longer enrolled.
    pub fn forget(&self, key: &str) {
        self.greeted.lock().remove(key);
    }

    /// Whether unmatched faces get a greeting at all. Carries no state;
    /// callers decide how often to actually speak it.
    pub fn unknown_greeting_allowed(&self) -> bool {
        self.greet_unknown
    }
}

/// Time-of-day greeting for a recognised person.
pub fn greeting_for(name: &str, now: DateTime<Local>) -> String {
    let salutation = match now.hour() {
        0..=11 => "Good morning",
        12..=17 => "Good afternoon",
        _ => "Good evening",
    };
    format!("{salutation} {name}, have a great day at work!")
}

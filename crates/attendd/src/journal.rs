//! Attendance log writer on a dedicated OS thread.
//!
//! The frame loop hands over records without waiting for the database.
//! A record that cannot be appended has its gate fire revoked, so a
//! missing log entry never silences that person for a cooldown. The
//! day's greeting travels with the record and is only spoken once the
//! append has succeeded.

use crate::speech::SpeechQueue;
use attend_core::{
    AttendanceGate, AttendanceRecord, AttendanceSink, FireTicket, GreetingGate, Greeting,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};

/// Pending appends beyond this are refused (and their fires revoked).
pub const JOURNAL_QUEUE_CAPACITY: usize = 64;

struct AppendRequest {
    record: AttendanceRecord,
    ticket: FireTicket,
    greeting: Option<Greeting>,
}

/// Gates whose grants are handed back when a record is not logged.
#[derive(Clone)]
struct Revoker {
    attendance: Arc<AttendanceGate>,
    greetings: Arc<GreetingGate>,
}

impl Revoker {
    fn revoke(&self, req: &AppendRequest) {
        self.attendance.revoke(&req.ticket);
        if let Some(greeting) = &req.greeting {
            self.greetings.revoke(&greeting.ticket);
        }
    }
}

/// Clone-safe handle to the journal thread.
#[derive(Clone)]
pub struct JournalHandle {
    tx: mpsc::Sender<AppendRequest>,
    revoker: Revoker,
    appended: Arc<AtomicU64>,
}

impl JournalHandle {
    /// Queue a record for appending. Never blocks.
    ///
    /// If the queue is full or the thread is gone the fire and greeting
    /// are revoked immediately and `false` is returned.
    pub fn submit(
        &self,
        record: AttendanceRecord,
        ticket: FireTicket,
        greeting: Option<Greeting>,
    ) -> bool {
        let req = AppendRequest {
            record,
            ticket,
            greeting,
        };
        match self.tx.try_send(req) {
            Ok(()) => true,
            Err(TrySendError::Full(req)) | Err(TrySendError::Closed(req)) => {
                tracing::error!(
                    key = %req.record.identity_key,
                    "attendance journal unavailable; record dropped"
                );
                self.revoker.revoke(&req);
                false
            }
        }
    }

    /// Records durably appended so far.
    pub fn appended(&self) -> u64 {
        self.appended.load(Ordering::Relaxed)
    }
}

/// Spawn the journal thread draining into `sink` and greeting via `speech`.
pub fn spawn_journal(
    sink: Arc<dyn AttendanceSink>,
    attendance: Arc<AttendanceGate>,
    greetings: Arc<GreetingGate>,
    speech: SpeechQueue,
) -> std::io::Result<JournalHandle> {
    let (tx, mut rx) = mpsc::channel::<AppendRequest>(JOURNAL_QUEUE_CAPACITY);
    let revoker = Revoker {
        attendance,
        greetings,
    };
    let appended = Arc::new(AtomicU64::new(0));

    let worker_revoker = revoker.clone();
    let worker_appended = Arc::clone(&appended);
    std::thread::Builder::new()
        .name("attend-journal".into())
        .spawn(move || {
            tracing::info!("journal thread started");
            while let Some(req) = rx.blocking_recv() {
                let record = &req.record;
                match sink.append(record) {
                    Ok(()) => {
                        worker_appended.fetch_add(1, Ordering::Relaxed);
                        tracing::info!(
                            key = %record.identity_key,
                            name = %record.name,
                            timestamp = %record.timestamp.format("%Y-%m-%d %H:%M:%S"),
                            "attendance logged"
                        );
                        if let Some(greeting) = req.greeting {
                            speech.say(greeting.text);
                        }
                    }
                    Err(e) => {
                        tracing::error!(
                            key = %record.identity_key,
                            error = %e,
                            "attendance append failed; revoking fire and greeting"
                        );
                        worker_revoker.revoke(&req);
                    }
                }
            }
            tracing::info!("journal thread exiting");
        })?;

    Ok(JournalHandle {
        tx,
        revoker,
        appended,
    })
}

//! The producer loop: feed → frame cycle → journal / speech.
//!
//! Greetings are not spoken here; they ride with the log request and the
//! journal speaks them after a successful append.

use crate::feed::{FeedError, JsonLinesFeed};
use crate::journal::JournalHandle;
use crate::speech::SpeechQueue;
use attend_core::greeting::UNKNOWN_GREETING;
use attend_core::{Effect, FrameCycle};
use chrono::Local;
use std::time::{Duration, Instant};
use tokio::io::AsyncBufRead;

/// Counters reported when the feed ends.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PipelineStats {
    pub frames: u64,
    pub processed: u64,
    /// Records handed to the journal. Durable appends are counted by
    /// [`JournalHandle::appended`].
    pub queued: u64,
}

pub struct Pipeline<R> {
    feed: JsonLinesFeed<R>,
    cycle: FrameCycle,
    frame_stride: usize,
    journal: JournalHandle,
    speech: SpeechQueue,
    unknown_interval: Duration,
    last_unknown: Option<Instant>,
    stats: PipelineStats,
}

impl<R: AsyncBufRead + Unpin> Pipeline<R> {
    pub fn new(
        feed: JsonLinesFeed<R>,
        cycle: FrameCycle,
        frame_stride: usize,
        journal: JournalHandle,
        speech: SpeechQueue,
        unknown_interval: Duration,
    ) -> Self {
        Self {
            feed,
            cycle,
            frame_stride: frame_stride.max(1),
            journal,
            speech,
            unknown_interval,
            last_unknown: None,
            stats: PipelineStats::default(),
        }
    }

    /// Run until the feed ends.
    pub async fn run(mut self) -> Result<PipelineStats, FeedError> {
        tracing::info!(
            stride = self.frame_stride,
            tolerance = self.cycle.tolerance(),
            "recognition loop started"
        );

        while let Some(faces) = self.feed.next_frame().await? {
            self.stats.frames += 1;
            if (self.stats.frames - 1) % self.frame_stride as u64 != 0 {
                continue;
            }
            self.stats.processed += 1;

            let effects = self.cycle.process(&faces, Local::now());
            self.dispatch(effects);
        }

        tracing::info!(
            frames = self.stats.frames,
            processed = self.stats.processed,
            queued = self.stats.queued,
            appended = self.journal.appended(),
            "frame feed ended"
        );
        Ok(self.stats)
    }

    fn dispatch(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::LogAttendance {
                    record,
                    ticket,
                    greeting,
                } => {
                    // The journal speaks the greeting once the append lands.
                    if self.journal.submit(record, ticket, greeting) {
                        self.stats.queued += 1;
                    }
                }
                Effect::Unknown => {
                    let due = self
                        .last_unknown
                        .map_or(true, |at| at.elapsed() >= self.unknown_interval);
                    if due {
                        self.last_unknown = Some(Instant::now());
                        self.speech.say(UNKNOWN_GREETING);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::spawn_journal;
    use async_trait::async_trait;
    use attend_core::{
        AnnounceError, Announcer, AttendanceGate, AttendanceRecord, AttendanceSink, Embedding,
        GreetingGate, Identity, Registry, SinkError,
    };
    use chrono::NaiveDate;
    use parking_lot::Mutex;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    #[derive(Default)]
    struct MemorySink {
        records: Mutex<Vec<AttendanceRecord>>,
        attempts: Mutex<usize>,
        fail: bool,
    }

    impl AttendanceSink for MemorySink {
        fn append(&self, record: &AttendanceRecord) -> Result<(), SinkError> {
            *self.attempts.lock() += 1;
            if self.fail {
                return Err(SinkError::Unavailable("read-only filesystem".into()));
            }
            self.records.lock().push(record.clone());
            Ok(())
        }

        fn query_by_date(&self, _date: NaiveDate) -> Result<Vec<AttendanceRecord>, SinkError> {
            Ok(self.records.lock().clone())
        }

        fn export(&self, _destination: Option<&Path>) -> Result<PathBuf, SinkError> {
            Ok(PathBuf::from("unused.csv"))
        }
    }

    #[derive(Default)]
    struct Recorder {
        spoken: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Announcer for Recorder {
        async fn speak(&self, text: &str) -> Result<(), AnnounceError> {
            self.spoken.lock().push(text.to_string());
            Ok(())
        }
    }

    struct Harness {
        sink: Arc<MemorySink>,
        recorder: Arc<Recorder>,
        greetings: Arc<GreetingGate>,
        journal: JournalHandle,
        speech: SpeechQueue,
        cycle: FrameCycle,
    }

    fn harness(greet_unknown: bool) -> Harness {
        harness_with(greet_unknown, MemorySink::default())
    }

    fn harness_with(greet_unknown: bool, sink: MemorySink) -> Harness {
        let registry = Arc::new(Registry::new(2));
        registry.rebuild(vec![Identity {
            key: "e1".into(),
            name: "Alice".into(),
            embedding: Embedding::new(vec![0.0, 0.0]),
            created_at: Local::now(),
        }]);
        let gate = Arc::new(AttendanceGate::new(Duration::from_secs(30)));
        let greetings = Arc::new(GreetingGate::new(greet_unknown));
        let sink = Arc::new(sink);
        let recorder = Arc::new(Recorder::default());
        let speech = SpeechQueue::spawn(recorder.clone(), 8);

        Harness {
            journal: spawn_journal(sink.clone(), gate.clone(), greetings.clone(), speech.clone())
                .unwrap(),
            speech,
            cycle: FrameCycle::new(registry, gate, greetings.clone(), 0.5),
            greetings,
            sink,
            recorder,
        }
    }

    async fn wait_for(cond: impl Fn() -> bool) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_repeated_sightings_log_once() {
        let h = harness(false);
        let input: &[u8] = b"[[0.1, 0.0]]\n[[0.0, 0.1]]\n[[0.05, 0.05]]\n";
        let pipeline = Pipeline::new(
            JsonLinesFeed::new(input),
            h.cycle,
            1,
            h.journal,
            h.speech,
            Duration::from_secs(10),
        );

        let stats = pipeline.run().await.unwrap();
        assert_eq!(stats.frames, 3);
        assert_eq!(stats.processed, 3);
        assert_eq!(stats.queued, 1);

        wait_for(|| h.sink.records.lock().len() == 1).await;
        wait_for(|| h.recorder.spoken.lock().len() == 1).await;
        assert!(h.recorder.spoken.lock()[0].contains("Alice"));
        assert_eq!(h.sink.records.lock()[0].identity_key, "e1");
    }

    #[tokio::test]
    async fn test_stride_skips_frames() {
        let h = harness(false);
        let input: &[u8] = b"[]\n[]\n[]\n[]\n[]\n";
        let pipeline = Pipeline::new(
            JsonLinesFeed::new(input),
            h.cycle,
            2,
            h.journal,
            h.speech,
            Duration::from_secs(10),
        );

        let stats = pipeline.run().await.unwrap();
        assert_eq!(stats.frames, 5);
        assert_eq!(stats.processed, 3);
    }

    #[tokio::test]
    async fn test_unknown_prompt_is_throttled() {
        let h = harness(true);
        let input: &[u8] = b"[[5.0, 5.0]]\n[[6.0, 6.0]]\n[[7.0, 7.0]]\n";
        let pipeline = Pipeline::new(
            JsonLinesFeed::new(input),
            h.cycle,
            1,
            h.journal,
            h.speech,
            Duration::from_secs(3600),
        );

        let stats = pipeline.run().await.unwrap();
        assert_eq!(stats.queued, 0);

        wait_for(|| h.recorder.spoken.lock().len() == 1).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(*h.recorder.spoken.lock(), vec![UNKNOWN_GREETING.to_string()]);
    }

    #[tokio::test]
    async fn test_failed_append_is_not_greeted() {
        let h = harness_with(
            false,
            MemorySink {
                fail: true,
                ..Default::default()
            },
        );
        let greetings = h.greetings.clone();
        let input: &[u8] = b"[[0.1, 0.0]]\n";
        let pipeline = Pipeline::new(
            JsonLinesFeed::new(input),
            h.cycle,
            1,
            h.journal.clone(),
            h.speech,
            Duration::from_secs(10),
        );

        let stats = pipeline.run().await.unwrap();
        assert_eq!(stats.queued, 1);

        wait_for(|| *h.sink.attempts.lock() == 1).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(h.recorder.spoken.lock().is_empty());
        assert_eq!(h.journal.appended(), 0);
        // The day's greeting was handed back for the next logged sighting.
        assert!(greetings.try_greet("e1", Local::now()));
    }
}

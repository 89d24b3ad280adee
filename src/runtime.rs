//! Dual-thread audio runtime (C11): a main thread and an audio thread
//! rendezvous each frame on a pair of `std::sync::Barrier`s. Grounded on
//! `deoalAudioThread`'s state machine and frame-time history, adapted from
//! its raw OS-thread plumbing to `std::thread`/`std::sync::Barrier`.

use crate::error::ThreadFailure;
use crate::log::Log;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::{Arc, Barrier};
use std::time::{Duration, Instant};

const FRAME_HISTORY_LEN: usize = 8;
const MAX_DELETIONS_PER_PASS: usize = 1000;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ThreadState {
    Stopped,
    Initialize,
    Synchronize,
    Audio,
    FinishedAudio,
    CleaningUp,
}

/// Fixed-size ring of recent frame durations, used to decide whether the
/// audio thread is keeping up with the requested frame budget.
pub struct FrameTimeHistory {
    samples: [Duration; FRAME_HISTORY_LEN],
    cursor: usize,
    filled: usize,
}

impl FrameTimeHistory {
    pub fn new() -> Self {
        Self {
            samples: [Duration::ZERO; FRAME_HISTORY_LEN],
            cursor: 0,
            filled: 0,
        }
    }

    pub fn push(&mut self, sample: Duration) {
        self.samples[self.cursor] = sample;
        self.cursor = (self.cursor + 1) % FRAME_HISTORY_LEN;
        self.filled = (self.filled + 1).min(FRAME_HISTORY_LEN);
    }

    pub fn average(&self) -> Duration {
        if self.filled == 0 {
            return Duration::ZERO;
        }
        let total: Duration = self.samples.iter().take(self.filled).sum();
        total / self.filled as u32
    }
}

impl Default for FrameTimeHistory {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of one call to [`AudioThread::process_audio_fast`]. `elapsed` is
/// the wall time this call itself spent; when the call skips the barrier
/// rendezvous, `elapsed_full` folds in every skipped frame's time since the
/// last real synchronization, and `wait_skipped_elapsed` reports exactly
/// how much of `elapsed_full` was never actually waited on (per the fast
/// pass's skip/catch-up accounting, §9).
#[derive(Copy, Clone, Debug)]
pub struct SyncOutcome {
    pub elapsed: Duration,
    pub elapsed_full: Duration,
    pub wait_skipped_elapsed: Duration,
    pub synced: bool,
}

/// Bounded FIFO of objects awaiting destruction once the audio thread is
/// provably done referencing them. Draining is capped per pass so a large
/// backlog (e.g. after a scene unload) doesn't stall a frame.
pub struct DeletionFifo<T> {
    queue: VecDeque<T>,
    max_drain_per_pass: usize,
}

impl<T> DeletionFifo<T> {
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            max_drain_per_pass: MAX_DELETIONS_PER_PASS,
        }
    }

    pub fn push(&mut self, item: T) {
        self.queue.push_back(item);
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Pops up to `max_drain_per_pass` items, applying `handler` to each.
    /// Returns how many were drained.
    pub fn drain_pass(&mut self, mut handler: impl FnMut(T)) -> usize {
        let mut drained = 0;
        while drained < self.max_drain_per_pass {
            match self.queue.pop_front() {
                Some(item) => {
                    handler(item);
                    drained += 1;
                }
                None => break,
            }
        }
        drained
    }
}

impl<T> Default for DeletionFifo<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// The audio-thread side of the barrier pair: `spawn`ed code loops calling
/// `wait_for_work`/`finish_work` to hand control back to the main thread.
#[derive(Clone)]
pub struct AudioThreadHandle {
    sync_in: Arc<Barrier>,
    sync_out: Arc<Barrier>,
    state: Arc<Mutex<ThreadState>>,
    failure: Arc<Mutex<Option<ThreadFailure>>>,
}

impl AudioThreadHandle {
    pub fn wait_for_work(&self) {
        self.sync_in.wait();
        *self.state.lock() = ThreadState::Audio;
    }

    pub fn finish_work(&self) {
        *self.state.lock() = ThreadState::FinishedAudio;
        self.sync_out.wait();
    }

    pub fn report_failure(&self, reason: impl Into<String>) {
        *self.failure.lock() = Some(ThreadFailure { reason: reason.into() });
    }

    pub fn set_state(&self, state: ThreadState) {
        *self.state.lock() = state;
    }
}

/// Main-thread side: owns the timing/skip logic and the deletion FIFO, and
/// drives the handshake with the spawned audio thread.
pub struct AudioThread {
    sync_in: Arc<Barrier>,
    sync_out: Arc<Barrier>,
    state: Arc<Mutex<ThreadState>>,
    failure: Arc<Mutex<Option<ThreadFailure>>>,
    history: FrameTimeHistory,
    skip_sync_time_ratio: f32,
    skipped_elapsed: Duration,
}

impl AudioThread {
    pub fn new(skip_sync_time_ratio: f32) -> Self {
        Self {
            sync_in: Arc::new(Barrier::new(2)),
            sync_out: Arc::new(Barrier::new(2)),
            state: Arc::new(Mutex::new(ThreadState::Stopped)),
            failure: Arc::new(Mutex::new(None)),
            history: FrameTimeHistory::new(),
            skip_sync_time_ratio: skip_sync_time_ratio.clamp(0.0, 1.0),
            skipped_elapsed: Duration::ZERO,
        }
    }

    pub fn handle(&self) -> AudioThreadHandle {
        AudioThreadHandle {
            sync_in: self.sync_in.clone(),
            sync_out: self.sync_out.clone(),
            state: self.state.clone(),
            failure: self.failure.clone(),
        }
    }

    pub fn state(&self) -> ThreadState {
        *self.state.lock()
    }

    pub fn take_failure(&self) -> Option<ThreadFailure> {
        self.failure.lock().take()
    }

    pub fn frame_time_average(&self) -> Duration {
        self.history.average()
    }

    /// Blocking full synchronization: releases the audio thread's
    /// `wait_for_work`, waits for `finish_work`, and records the measured
    /// frame time into the rolling history.
    pub fn synchronize(&mut self) -> SyncOutcome {
        *self.state.lock() = ThreadState::Synchronize;
        let started = Instant::now();
        self.sync_in.wait();
        self.sync_out.wait();
        let elapsed = started.elapsed();

        let elapsed_full = elapsed + self.skipped_elapsed;
        let wait_skipped_elapsed = self.skipped_elapsed;
        self.skipped_elapsed = Duration::ZERO;
        self.history.push(elapsed_full);

        SyncOutcome {
            elapsed,
            elapsed_full,
            wait_skipped_elapsed,
            synced: true,
        }
    }

    /// Non-blocking fast pass: skips the barrier rendezvous (and therefore
    /// does not advance the audio thread) whenever the rolling average frame
    /// time is still within `skip_sync_time_ratio` of `frame_budget`,
    /// folding the skipped duration into the next real [`synchronize`] call
    /// instead of discarding it.
    pub fn process_audio_fast(&mut self, elapsed: Duration, frame_budget: Duration) -> SyncOutcome {
        let threshold = frame_budget.mul_f32(self.skip_sync_time_ratio);
        let should_skip = frame_budget > Duration::ZERO && self.history.average() <= threshold;

        if should_skip {
            self.skipped_elapsed += elapsed;
            SyncOutcome {
                elapsed,
                elapsed_full: self.skipped_elapsed,
                wait_skipped_elapsed: self.skipped_elapsed,
                synced: false,
            }
        } else {
            self.synchronize()
        }
    }
}

/// Caps how often the main loop re-enters [`AudioThread::process_audio_fast`]
/// when `frame_rate_limit` (Hz, 0 = unbounded) is configured.
pub struct FrameRateLimiter {
    target_frame_time: Option<Duration>,
}

impl FrameRateLimiter {
    pub fn new(frame_rate_limit: u32) -> Self {
        Self {
            target_frame_time: (frame_rate_limit > 0).then(|| Duration::from_secs_f64(1.0 / frame_rate_limit as f64)),
        }
    }

    /// Sleeps out the remainder of the frame budget given `elapsed` already
    /// spent this frame. A no-op when unbounded or already over budget.
    pub fn throttle(&self, elapsed: Duration) {
        if let Some(target) = self.target_frame_time {
            if elapsed < target {
                std::thread::sleep(target - elapsed);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::thread;

    #[test]
    fn frame_time_history_averages_over_ring_window() {
        let mut history = FrameTimeHistory::new();
        for _ in 0..FRAME_HISTORY_LEN {
            history.push(Duration::from_millis(10));
        }
        assert_eq!(history.average(), Duration::from_millis(10));
        history.push(Duration::from_millis(20));
        // One of the eight 10ms samples was displaced by a 20ms sample.
        assert!(history.average() > Duration::from_millis(10));
    }

    #[test]
    fn deletion_fifo_drains_at_most_cap_per_pass() {
        let mut fifo = DeletionFifo::new();
        fifo.max_drain_per_pass = 2;
        fifo.push(1);
        fifo.push(2);
        fifo.push(3);
        let mut drained = Vec::new();
        let count = fifo.drain_pass(|item| drained.push(item));
        assert_eq!(count, 2);
        assert_eq!(fifo.len(), 1);
        assert_eq!(drained, vec![1, 2]);
    }

    #[test]
    fn synchronize_rendezvous_with_a_real_audio_thread() {
        let mut audio_thread = AudioThread::new(0.5);
        let worker_handle = audio_thread.handle();

        let worker = thread::spawn(move || {
            worker_handle.wait_for_work();
            worker_handle.finish_work();
        });

        let outcome = audio_thread.synchronize();
        assert!(outcome.synced);
        worker.join().unwrap();
    }

    #[test]
    fn process_audio_fast_skips_when_average_is_well_within_budget() {
        let mut audio_thread = AudioThread::new(0.5);
        // Seed the history with comfortably-fast frames.
        for _ in 0..FRAME_HISTORY_LEN {
            audio_thread.history.push(Duration::from_millis(1));
        }
        let outcome = audio_thread.process_audio_fast(Duration::from_micros(50), Duration::from_millis(16));
        assert!(!outcome.synced);
        assert_eq!(outcome.wait_skipped_elapsed, Duration::from_micros(50));
    }

    #[test]
    fn thread_failure_round_trips_through_the_shared_slot() {
        let audio_thread = AudioThread::new(0.5);
        let handle = audio_thread.handle();
        handle.report_failure("panic in trace_ray_recursive");
        let failure = audio_thread.take_failure().expect("failure should be recorded");
        assert!(failure.reason.contains("panic"));
        assert!(audio_thread.take_failure().is_none());
    }
}

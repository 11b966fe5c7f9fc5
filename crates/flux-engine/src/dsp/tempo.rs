use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Exclusive bounds for an accepted tempo.
pub const MIN_BPM: f64 = 0.0;
pub const MAX_BPM: f64 = 1000.0;

/// Taps further apart than this start a new tap sequence.
const TAP_RESET: Duration = Duration::from_secs(2);
/// Intervals averaged by tap tempo (the last four taps).
const TAP_WINDOW: usize = 3;

/// Shared beats-per-minute value read by tempo-linked parameters.
///
/// One context is created per engine and handed to every effect through
/// `EffectContext`. The audio thread only ever touches the atomics; the tap
/// history is control-side state.
#[derive(Debug)]
pub struct TempoContext {
    bpm: AtomicU64,
    version: AtomicU64,
    taps: Mutex<TapHistory>,
}

#[derive(Debug, Default)]
struct TapHistory {
    last: Option<Instant>,
    intervals: VecDeque<Duration>,
}

impl TempoContext {
    pub fn new(bpm: f64) -> Self {
        let bpm = if valid_bpm(bpm) { bpm } else { 120.0 };
        Self {
            bpm: AtomicU64::new(bpm.to_bits()),
            version: AtomicU64::new(0),
            taps: Mutex::new(TapHistory::default()),
        }
    }

    #[inline]
    pub fn bpm(&self) -> f64 {
        f64::from_bits(self.bpm.load(Ordering::Acquire))
    }

    /// Set the tempo. Values outside `(0, 1000)` are rejected.
    pub fn set_bpm(&self, bpm: f64) -> bool {
        if !valid_bpm(bpm) {
            return false;
        }
        self.bpm.store(bpm.to_bits(), Ordering::Release);
        self.version.fetch_add(1, Ordering::AcqRel);
        true
    }

    /// Bumped every time the tempo changes.
    #[inline]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Register a tap at `now` and return the new tempo once two taps in a
    /// row have been seen.
    pub fn tap(&self, now: Instant) -> Option<f64> {
        let bpm = {
            let mut taps = self.taps.lock();
            let previous = taps.last.replace(now);
            let interval = previous.map(|p| now.saturating_duration_since(p))?;
            if interval > TAP_RESET || interval.is_zero() {
                taps.intervals.clear();
                return None;
            }
            if taps.intervals.len() == TAP_WINDOW {
                taps.intervals.pop_front();
            }
            taps.intervals.push_back(interval);

            let total: Duration = taps.intervals.iter().sum();
            let mean = total.as_secs_f64() / taps.intervals.len() as f64;
            60.0 / mean
        };
        self.set_bpm(bpm).then_some(bpm)
    }
}

impl Default for TempoContext {
    fn default() -> Self {
        Self::new(120.0)
    }
}

fn valid_bpm(bpm: f64) -> bool {
    bpm.is_finite() && bpm > MIN_BPM && bpm < MAX_BPM
}

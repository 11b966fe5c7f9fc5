//! Loop recorder. Lives on the audio thread inside the audio path.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crate::dsp::effect::Sample;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LoopState {
    Idle = 0,
    Recording = 1,
    Playing = 2,
    /// A loop is stored but not playing.
    Stored = 3,
}

impl LoopState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Recording,
            2 => Self::Playing,
            3 => Self::Stored,
            _ => Self::Idle,
        }
    }
}

/// Read-only view of the looper state for the control thread.
#[derive(Debug, Clone)]
pub struct LoopStatus(Arc<AtomicU8>);

impl LoopStatus {
    pub fn get(&self) -> LoopState {
        LoopState::from_u8(self.0.load(Ordering::Acquire))
    }
}

/// Records the clipped output and overlays the stored loop on later blocks.
///
/// Both buffers are allocated once at construction. Stopping a recording
/// swaps them, so a take never copies.
#[derive(Debug)]
pub struct Looper {
    recording: Vec<Sample>,
    track: Vec<Sample>,
    capacity: usize,
    is_recording: bool,
    is_playing: bool,
    cursor: usize,
    status: Arc<AtomicU8>,
}

impl Looper {
    pub fn new(capacity: usize) -> Self {
        Self {
            recording: Vec::with_capacity(capacity),
            track: Vec::with_capacity(capacity),
            capacity,
            is_recording: false,
            is_playing: false,
            cursor: 0,
            status: Arc::new(AtomicU8::new(LoopState::Idle as u8)),
        }
    }

    pub fn status(&self) -> LoopStatus {
        LoopStatus(Arc::clone(&self.status))
    }

    pub fn state(&self) -> LoopState {
        if self.is_recording {
            LoopState::Recording
        } else if self.is_playing {
            LoopState::Playing
        } else if !self.track.is_empty() {
            LoopState::Stored
        } else {
            LoopState::Idle
        }
    }

    pub fn track_len(&self) -> usize {
        self.track.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn publish(&self) {
        self.status.store(self.state() as u8, Ordering::Release);
    }

    /// Start a fresh take. Playback stops.
    pub fn start_recording(&mut self) {
        self.recording.clear();
        self.is_playing = false;
        self.is_recording = true;
        self.publish();
    }

    /// Keep the take as the loop. A take of zero samples leaves the previous
    /// loop in place.
    pub fn stop_recording(&mut self) {
        if !self.is_recording {
            return;
        }
        self.is_recording = false;
        if !self.recording.is_empty() {
            std::mem::swap(&mut self.recording, &mut self.track);
            self.recording.clear();
            self.cursor = 0;
        }
        self.publish();
    }

    /// Only starts when a loop exists and nothing is being recorded.
    pub fn start_playback(&mut self) -> bool {
        if self.is_recording || self.track.is_empty() {
            return false;
        }
        self.is_playing = true;
        self.cursor = 0;
        self.publish();
        true
    }

    pub fn stop_playback(&mut self) {
        self.is_playing = false;
        self.publish();
    }

    pub fn erase(&mut self) {
        self.is_playing = false;
        self.track.clear();
        self.cursor = 0;
        self.publish();
    }

    /// Add the loop to `block`, wrapping at the end of the track.
    pub fn mix_into(&mut self, block: &mut [Sample]) {
        if !self.is_playing || self.track.is_empty() {
            return;
        }
        for s in block.iter_mut() {
            *s += self.track[self.cursor];
            self.cursor += 1;
            if self.cursor == self.track.len() {
                self.cursor = 0;
            }
        }
    }

    /// Append to the current take. Samples past capacity are dropped.
    pub fn record(&mut self, block: &[Sample]) {
        if !self.is_recording {
            return;
        }
        let room = self.capacity - self.recording.len();
        self.recording
            .extend_from_slice(&block[..block.len().min(room)]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn looper_with(track: &[Sample]) -> Looper {
        let mut looper = Looper::new(64);
        looper.start_recording();
        looper.record(track);
        looper.stop_recording();
        looper
    }

    #[test]
    fn take_becomes_track() {
        let mut looper = looper_with(&[1.0, 2.0, 3.0]);
        assert_eq!(looper.state(), LoopState::Stored);
        assert_eq!(looper.track_len(), 3);
        assert!(looper.start_playback());
        assert_eq!(looper.status().get(), LoopState::Playing);
    }

    #[test]
    fn overlay_wraps_across_uneven_blocks() {
        let mut looper = looper_with(&[1.0, 2.0, 3.0]);
        looper.start_playback();
        let mut a = [0.0; 2];
        let mut b = [10.0; 5];
        looper.mix_into(&mut a);
        looper.mix_into(&mut b);
        assert_eq!(a, [1.0, 2.0]);
        assert_eq!(b, [13.0, 11.0, 12.0, 13.0, 11.0]);
    }

    #[test]
    fn playback_needs_a_track_and_no_recording() {
        let mut looper = Looper::new(8);
        assert!(!looper.start_playback());

        let mut looper = looper_with(&[1.0]);
        looper.start_recording();
        assert!(!looper.start_playback());
        assert_eq!(looper.state(), LoopState::Recording);
    }

    #[test]
    fn recording_stops_playback_and_keeps_old_loop_until_done() {
        let mut looper = looper_with(&[1.0, 1.0]);
        looper.start_playback();
        looper.start_recording();
        assert_eq!(looper.track_len(), 2);

        let mut block = [5.0];
        looper.mix_into(&mut block);
        assert_eq!(block, [5.0]);

        looper.record(&[7.0, 8.0, 9.0]);
        looper.stop_recording();
        assert_eq!(looper.track_len(), 3);
    }

    #[test]
    fn record_drops_samples_past_capacity() {
        let mut looper = Looper::new(4);
        looper.start_recording();
        looper.record(&[1.0, 2.0, 3.0]);
        looper.record(&[4.0, 5.0, 6.0]);
        looper.stop_recording();
        assert_eq!(looper.track_len(), 4);
    }

    #[test]
    fn erase_discards_loop() {
        let mut looper = looper_with(&[1.0]);
        looper.start_playback();
        looper.erase();
        assert_eq!(looper.state(), LoopState::Idle);
        assert_eq!(looper.status().get(), LoopState::Idle);
        let mut block = [0.0];
        looper.mix_into(&mut block);
        assert_eq!(block, [0.0]);
    }
}

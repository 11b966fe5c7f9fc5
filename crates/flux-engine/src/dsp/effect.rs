use super::param::Parameters;

/// Working sample type. Blocks are widened from 16-bit PCM so intermediate
/// stages can exceed the wire range; the audio path clips once at the end.
pub type Sample = f64;

/// Real-time safe effect interface.
/// - `process()` runs on the audio thread: no locks, no I/O, and no allocation
///   unless a parameter change forces derived state to be rebuilt.
/// - `block` is mono, nominally in `[-32768, 32767]`, and may be empty.
/// - Output is written in place, so the block length never changes.
/// - State carried between calls must make block boundaries inaudible:
///   processing `a` then `b` equals processing `a ++ b`.
pub trait Effect: Send {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn parameters(&self) -> &Parameters;
    fn process(&mut self, block: &mut [Sample]);
    /// Forget filter memory, delay history and modulation phase.
    fn reset(&mut self) {}
}

impl std::fmt::Debug for dyn Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect").field("name", &self.name()).finish()
    }
}

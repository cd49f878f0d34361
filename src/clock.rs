//! Monotonic clock, NTP timestamp conversion, and per-session RNG
//! (spec.md §4.7).

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};

/// Seconds between the NTP epoch (1900-01-01) and the Unix epoch.
const NTP_UNIX_OFFSET: u64 = 2_208_988_800;

/// Monotonic, microsecond-resolution clock that also produces NTP
/// 64-bit timestamps for sender reports.
pub struct Clock {
    epoch: Instant,
}

impl Default for Clock {
    fn default() -> Self {
        Clock { epoch: Instant::now() }
    }
}

impl Clock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Monotonic elapsed time since this clock was created, at
    /// microsecond resolution.
    pub fn now(&self) -> Duration {
        let elapsed = self.epoch.elapsed();
        Duration::from_micros(elapsed.as_micros() as u64)
    }

    /// Current wall-clock time as an RFC 3550 §4 NTP 64-bit timestamp:
    /// seconds since 1900-01-01 in the upper 32 bits, fractional seconds
    /// in the lower 32 bits.
    pub fn ntp_now(&self) -> u64 {
        let wall = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO);
        let seconds = wall.as_secs() + NTP_UNIX_OFFSET;
        let fraction = ((wall.subsec_nanos() as u64) << 32) / 1_000_000_000;
        (seconds << 32) | fraction
    }
}

/// Per-session random source (spec.md §4.7): initial SSRC, initial
/// sequence number, initial timestamp, and the scheduler's `U` jitter
/// multiplier. Seeded from OS entropy; not required to be
/// cryptographically strong, but held behind a lock for multi-threaded
/// use (see `parking_lot::Mutex<Rng>` in `session.rs`).
pub struct Rng_ {
    inner: StdRng,
}

impl Default for Rng_ {
    fn default() -> Self {
        Rng_ { inner: StdRng::from_os_rng() }
    }
}

impl Rng_ {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_u16(&mut self) -> u16 {
        self.inner.random()
    }

    pub fn next_u8(&mut self) -> u8 {
        self.inner.random()
    }

    /// Uniform draw in `[0, 1)`, used for the scheduler's `U` multiplier.
    pub fn next_unit(&mut self) -> f64 {
        self.inner.random()
    }
}

/// Implementing `RngCore` (rather than the `Rng` extension trait
/// directly) picks up `rand::Rng`'s blanket impl, so a `&mut Rng_` can
/// be passed anywhere `rtp-sources`'s scheduler and packet builder
/// expect `&mut impl Rng`.
impl RngCore for Rng_ {
    fn next_u32(&mut self) -> u32 {
        self.inner.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.inner.next_u64()
    }

    fn fill_bytes(&mut self, dst: &mut [u8]) {
        self.inner.fill_bytes(dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ntp_upper_bits_track_unix_epoch_offset() {
        let clock = Clock::new();
        let ntp = clock.ntp_now();
        let seconds = ntp >> 32;
        assert!(seconds > NTP_UNIX_OFFSET);
    }

    #[test]
    fn monotonic_clock_advances() {
        let clock = Clock::new();
        let first = clock.now();
        std::thread::sleep(Duration::from_millis(5));
        assert!(clock.now() > first);
    }
}

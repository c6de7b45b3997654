//! Clock and time types for pipeline synchronization.
//!
//! This module provides:
//! - [`ClockTime`]: a nanosecond timestamp (8 bytes, Copy)
//! - [`Clock`]: trait for time sources
//! - [`SystemClock`]: monotonic system clock
//! - [`PipelineClock`]: base-time bookkeeping that turns clock time into
//!   running time across pause/resume cycles

use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant};

// ============================================================================
// ClockTime
// ============================================================================

/// Time in nanoseconds.
///
/// Unset timestamps are expressed as `Option<ClockTime>`.
///
/// ```rust
/// use padflow::clock::ClockTime;
///
/// let t = ClockTime::from_secs(1) + ClockTime::from_mseconds(500);
/// assert_eq!(t.mseconds(), 1500);
/// assert_eq!(t.to_string(), "0:00:01.500000000");
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ClockTime(u64);

impl ClockTime {
    /// Zero time.
    pub const ZERO: Self = Self(0);
    /// Largest representable time.
    pub const MAX: Self = Self(u64::MAX);
    /// One second.
    pub const SECOND: Self = Self(1_000_000_000);
    /// One millisecond.
    pub const MSECOND: Self = Self(1_000_000);
    /// One microsecond.
    pub const USECOND: Self = Self(1_000);
    /// One nanosecond.
    pub const NSECOND: Self = Self(1);

    /// Create from nanoseconds.
    #[inline]
    pub const fn from_nseconds(ns: u64) -> Self {
        Self(ns)
    }

    /// Create from microseconds.
    #[inline]
    pub const fn from_useconds(us: u64) -> Self {
        Self(us.saturating_mul(1_000))
    }

    /// Create from milliseconds.
    #[inline]
    pub const fn from_mseconds(ms: u64) -> Self {
        Self(ms.saturating_mul(1_000_000))
    }

    /// Create from seconds.
    #[inline]
    pub const fn from_secs(s: u64) -> Self {
        Self(s.saturating_mul(1_000_000_000))
    }

    /// Timestamp of sample `offset` in a stream running at `rate` Hz.
    ///
    /// Computes `offset * SECOND / rate` without intermediate overflow.
    /// A zero rate yields `None`.
    ///
    /// ```rust
    /// use padflow::clock::ClockTime;
    ///
    /// assert_eq!(ClockTime::from_samples(44_100, 44_100), Some(ClockTime::SECOND));
    /// assert_eq!(ClockTime::from_samples(1, 0), None);
    /// ```
    pub fn from_samples(offset: u64, rate: u64) -> Option<Self> {
        uint64_scale(offset, Self::SECOND.0, rate).map(Self)
    }

    /// Nanoseconds.
    #[inline]
    pub const fn nseconds(self) -> u64 {
        self.0
    }

    /// Microseconds (truncated).
    #[inline]
    pub const fn useconds(self) -> u64 {
        self.0 / 1_000
    }

    /// Milliseconds (truncated).
    #[inline]
    pub const fn mseconds(self) -> u64 {
        self.0 / 1_000_000
    }

    /// Seconds (truncated).
    #[inline]
    pub const fn seconds(self) -> u64 {
        self.0 / 1_000_000_000
    }

    /// Checked subtraction.
    #[inline]
    pub const fn checked_sub(self, rhs: Self) -> Option<Self> {
        match self.0.checked_sub(rhs.0) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Checked addition.
    #[inline]
    pub const fn checked_add(self, rhs: Self) -> Option<Self> {
        match self.0.checked_add(rhs.0) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Saturating addition.
    #[inline]
    pub const fn saturating_add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }

    /// Saturating subtraction.
    #[inline]
    pub const fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }

    /// Multiply by a scalar, saturating at [`ClockTime::MAX`].
    #[inline]
    pub const fn saturating_mul(self, rhs: u64) -> Self {
        Self(self.0.saturating_mul(rhs))
    }
}

/// Scale `val` by `num / denom` using 128-bit intermediates.
///
/// Returns `None` when `denom` is zero or the result does not fit in 64 bits.
pub fn uint64_scale(val: u64, num: u64, denom: u64) -> Option<u64> {
    if denom == 0 {
        return None;
    }
    let scaled = (val as u128) * (num as u128) / (denom as u128);
    u64::try_from(scaled).ok()
}

impl std::ops::Add for ClockTime {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        self.saturating_add(rhs)
    }
}

impl std::ops::AddAssign for ClockTime {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        *self = self.saturating_add(rhs);
    }
}

impl std::ops::Sub for ClockTime {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        self.saturating_sub(rhs)
    }
}

impl std::ops::Mul<u64> for ClockTime {
    type Output = Self;

    #[inline]
    fn mul(self, rhs: u64) -> Self {
        self.saturating_mul(rhs)
    }
}

impl From<Duration> for ClockTime {
    #[inline]
    fn from(d: Duration) -> Self {
        Self(u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
    }
}

impl From<ClockTime> for Duration {
    #[inline]
    fn from(t: ClockTime) -> Self {
        Duration::from_nanos(t.0)
    }
}

/// Formats as `h:mm:ss.nnnnnnnnn`.
impl std::fmt::Display for ClockTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let secs = self.seconds();
        write!(
            f,
            "{}:{:02}:{:02}.{:09}",
            secs / 3600,
            (secs / 60) % 60,
            secs % 60,
            self.0 % 1_000_000_000
        )
    }
}

/// Display helper for optional timestamps, printing `--:--:--.---------` for `None`.
pub struct DisplayOpt(pub Option<ClockTime>);

impl std::fmt::Display for DisplayOpt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Some(t) => t.fmt(f),
            None => f.write_str("--:--:--.---------"),
        }
    }
}

// ============================================================================
// Clock Trait
// ============================================================================

/// A monotonic time source.
pub trait Clock: Send + Sync {
    /// Current clock time.
    fn time(&self) -> ClockTime;

    /// Human-readable clock name.
    fn name(&self) -> &str {
        "clock"
    }
}

// ============================================================================
// SystemClock
// ============================================================================

/// System monotonic clock, relative to its creation instant.
pub struct SystemClock {
    epoch: Instant,
    name: String,
}

impl SystemClock {
    /// Create a new system clock.
    pub fn new() -> Self {
        Self::with_name("system-clock")
    }

    /// Create a system clock with a custom name.
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            epoch: Instant::now(),
            name: name.into(),
        }
    }

    /// Shared handle, as handed out by pipelines.
    pub fn obtain() -> Arc<dyn Clock> {
        Arc::new(Self::new())
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    #[inline]
    fn time(&self) -> ClockTime {
        ClockTime::from(self.epoch.elapsed())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// ============================================================================
// PipelineClock
// ============================================================================

/// Running-time bookkeeping for a pipeline.
///
/// - **Clock time**: absolute time from the clock
/// - **Base time**: clock time at which running time was zero
/// - **Running time**: clock time minus base time, frozen while paused
///
/// On every PAUSED to PLAYING transition a new base time is chosen so that
/// running time continues from where it stopped.
pub struct PipelineClock {
    clock: Arc<dyn Clock>,
    timing: Mutex<Timing>,
}

#[derive(Default)]
struct Timing {
    base_time: Option<ClockTime>,
    paused_at: ClockTime,
}

impl PipelineClock {
    /// Create a pipeline clock over the given clock source.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            timing: Mutex::new(Timing::default()),
        }
    }

    /// Create a pipeline clock over the system monotonic clock.
    pub fn system() -> Self {
        Self::new(SystemClock::obtain())
    }

    /// The underlying clock.
    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    /// Start or resume running time; returns the new base time.
    pub fn start(&self) -> ClockTime {
        let mut timing = self.timing.lock().unwrap();
        let base = self.clock.time().saturating_sub(timing.paused_at);
        timing.base_time = Some(base);
        base
    }

    /// Freeze running time at its current value.
    pub fn pause(&self) {
        let mut timing = self.timing.lock().unwrap();
        if let Some(base) = timing.base_time.take() {
            timing.paused_at = self.clock.time().saturating_sub(base);
        }
    }

    /// Forget base time and accumulated running time.
    pub fn reset(&self) {
        *self.timing.lock().unwrap() = Timing::default();
    }

    /// Base time, if running.
    pub fn base_time(&self) -> Option<ClockTime> {
        self.timing.lock().unwrap().base_time
    }

    /// Current running time. While paused this is the frozen value.
    pub fn running_time(&self) -> ClockTime {
        let timing = self.timing.lock().unwrap();
        match timing.base_time {
            Some(base) => self.clock.time().saturating_sub(base),
            None => timing.paused_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ManualClock(Mutex<ClockTime>);

    impl ManualClock {
        fn advance(&self, by: ClockTime) {
            let mut now = self.0.lock().unwrap();
            *now += by;
        }
    }

    impl Clock for ManualClock {
        fn time(&self) -> ClockTime {
            *self.0.lock().unwrap()
        }
    }

    #[test]
    fn test_clock_time_units() {
        assert_eq!(ClockTime::from_useconds(1_000).nseconds(), 1_000_000);
        assert_eq!(ClockTime::from_mseconds(1_000), ClockTime::SECOND);
        assert_eq!(ClockTime::from_secs(2).mseconds(), 2_000);
        assert_eq!((ClockTime::SECOND * 3).seconds(), 3);
    }

    #[test]
    fn test_clock_time_saturating() {
        assert_eq!(
            ClockTime::from_mseconds(100) - ClockTime::SECOND,
            ClockTime::ZERO
        );
        assert_eq!(ClockTime::MAX + ClockTime::SECOND, ClockTime::MAX);
        assert_eq!(ClockTime::ZERO.checked_sub(ClockTime::NSECOND), None);
    }

    #[test]
    fn test_from_samples() {
        assert_eq!(ClockTime::from_samples(0, 44_100), Some(ClockTime::ZERO));
        assert_eq!(
            ClockTime::from_samples(22_050, 44_100),
            Some(ClockTime::from_mseconds(500))
        );
        // offset * SECOND overflows u64 but the scaled result does not.
        let huge = u64::MAX / 1_000;
        assert_eq!(
            ClockTime::from_samples(huge, 1_000_000_000),
            Some(ClockTime::from_nseconds(huge))
        );
    }

    #[test]
    fn test_uint64_scale_overflow() {
        assert_eq!(uint64_scale(u64::MAX, 2, 1), None);
        assert_eq!(uint64_scale(10, 1, 0), None);
        assert_eq!(uint64_scale(10, 3, 2), Some(15));
    }

    #[test]
    fn test_display() {
        assert_eq!(ClockTime::ZERO.to_string(), "0:00:00.000000000");
        assert_eq!(
            (ClockTime::from_secs(3661) + ClockTime::from_nseconds(5)).to_string(),
            "1:01:01.000000005"
        );
        assert_eq!(DisplayOpt(None).to_string(), "--:--:--.---------");
    }

    #[test]
    fn test_system_clock_monotonic() {
        let clock = SystemClock::new();
        let t1 = clock.time();
        std::thread::sleep(Duration::from_millis(5));
        assert!(clock.time() > t1);
    }

    #[test]
    fn test_pipeline_clock_pause_resume() {
        let manual = Arc::new(ManualClock(Mutex::new(ClockTime::from_secs(100))));
        let clock = PipelineClock::new(manual.clone());

        assert_eq!(clock.running_time(), ClockTime::ZERO);
        assert_eq!(clock.base_time(), None);

        clock.start();
        manual.advance(ClockTime::from_secs(2));
        assert_eq!(clock.running_time(), ClockTime::from_secs(2));

        clock.pause();
        manual.advance(ClockTime::from_secs(10));
        assert_eq!(clock.running_time(), ClockTime::from_secs(2));

        let base = clock.start();
        assert_eq!(base, ClockTime::from_secs(110));
        manual.advance(ClockTime::SECOND);
        assert_eq!(clock.running_time(), ClockTime::from_secs(3));

        clock.reset();
        assert_eq!(clock.running_time(), ClockTime::ZERO);
    }
}

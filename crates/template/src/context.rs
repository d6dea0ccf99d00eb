//! Shared evaluation state: clock, sequence counter, variables, and RNG.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, TimeDelta, Utc};
use rand::rngs::{OsRng, StdRng};
use rand::{Rng, RngCore, SeedableRng};

/// Source of "now" for expression functions.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }

    pub fn advance(&self, by: TimeDelta) {
        let mut guard = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *guard += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug)]
struct SeededRng {
    seed: u64,
    rng: StdRng,
}

/// State shared by every evaluation in a process.
///
/// All mutation goes through interior locks or atomics, so one context can be
/// shared across tasks behind an `Arc`.
pub struct EvaluationContext {
    sequence: AtomicI64,
    variables: RwLock<HashMap<String, String>>,
    rng: Mutex<Option<SeededRng>>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for EvaluationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvaluationContext")
            .field("sequence", &self.current_sequence())
            .field("seed", &self.seed())
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl Default for EvaluationContext {
    fn default() -> Self {
        Self::new()
    }
}

impl EvaluationContext {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            sequence: AtomicI64::new(0),
            variables: RwLock::new(HashMap::new()),
            rng: Mutex::new(None),
            clock,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Increment and return the counter. The first call returns 1.
    pub fn next_sequence(&self) -> i64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn current_sequence(&self) -> i64 {
        self.sequence.load(Ordering::SeqCst)
    }

    pub fn set_variable(&self, name: impl Into<String>, value: impl Into<String>) {
        self.variables
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), value.into());
    }

    /// Value of a variable, or `""` when unset.
    pub fn variable(&self, name: &str) -> String {
        self.variables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    pub fn variables(&self) -> HashMap<String, String> {
        self.variables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Make every random function deterministic from this point on.
    /// Calling it again restarts the stream.
    pub fn set_seed(&self, seed: u64) {
        *self.rng.lock().unwrap_or_else(PoisonError::into_inner) = Some(SeededRng {
            seed,
            rng: StdRng::seed_from_u64(seed),
        });
    }

    pub fn clear_seed(&self) {
        *self.rng.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn seed(&self) -> Option<u64> {
        self.rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|s| s.seed)
    }

    /// Run `f` with the seeded generator when present, else the thread RNG.
    fn with_rng<R>(&self, f: impl FnOnce(&mut dyn RngCore) -> R) -> R {
        let mut guard = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(seeded) = guard.as_mut() {
            return f(&mut seeded.rng);
        }
        drop(guard);
        f(&mut rand::thread_rng())
    }

    /// Uniform integer in `[min, max]`; `min` when `min >= max`.
    pub fn random_int(&self, min: i64, max: i64) -> i64 {
        if min >= max {
            return min;
        }
        self.with_rng(|rng| rng.gen_range(min..=max))
    }

    /// Uniform float in `[0, 1)`.
    pub fn random_float(&self) -> f64 {
        self.with_rng(|rng| rng.gen::<f64>())
    }

    /// Uniform offset in `[0, max]` at nanosecond resolution.
    pub fn random_offset(&self, max: TimeDelta) -> TimeDelta {
        if max <= TimeDelta::zero() {
            return TimeDelta::zero();
        }
        let Some(nanos) = max.num_nanoseconds() else {
            // Beyond ~292 years; fall back to millisecond resolution.
            let millis = self.with_rng(|rng| rng.gen_range(0..=max.num_milliseconds()));
            return TimeDelta::milliseconds(millis);
        };
        TimeDelta::nanoseconds(self.with_rng(|rng| rng.gen_range(0..=nanos)))
    }

    /// 16 random bytes for identifiers. Never fails: when OS entropy is
    /// unavailable the bytes are derived from the clock and the sequence.
    pub fn random_bytes(&self) -> [u8; 16] {
        let mut bytes = [0u8; 16];
        let mut guard = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(seeded) = guard.as_mut() {
            seeded.rng.fill_bytes(&mut bytes);
            return bytes;
        }
        drop(guard);

        if let Err(e) = OsRng.try_fill_bytes(&mut bytes) {
            tracing::warn!(error = %e, "OS entropy unavailable; deriving id bytes from clock");
            let nanos = self.now().timestamp_nanos_opt().unwrap_or_default();
            bytes[..8].copy_from_slice(&nanos.to_be_bytes());
            bytes[8..].copy_from_slice(&self.current_sequence().to_be_bytes());
        }
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn sequence_starts_at_one() {
        let ctx = EvaluationContext::new();
        assert_eq!(ctx.current_sequence(), 0);
        assert_eq!(ctx.next_sequence(), 1);
        assert_eq!(ctx.next_sequence(), 2);
        assert_eq!(ctx.current_sequence(), 2);
    }

    #[test]
    fn sequence_is_unique_across_threads() {
        let ctx = Arc::new(EvaluationContext::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ctx = Arc::clone(&ctx);
                std::thread::spawn(move || (0..100).map(|_| ctx.next_sequence()).collect::<Vec<_>>())
            })
            .collect();
        let mut all: Vec<i64> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 800);
        assert_eq!(all.first(), Some(&1));
        assert_eq!(all.last(), Some(&800));
    }

    #[test]
    fn missing_variable_is_empty() {
        let ctx = EvaluationContext::new();
        ctx.set_variable("region", "eu-west-1");
        assert_eq!(ctx.variable("region"), "eu-west-1");
        assert_eq!(ctx.variable("missing"), "");
    }

    #[test]
    fn same_seed_same_stream() {
        let a = EvaluationContext::new();
        let b = EvaluationContext::new();
        a.set_seed(7);
        b.set_seed(7);
        let xs: Vec<i64> = (0..10).map(|_| a.random_int(0, 1000)).collect();
        let ys: Vec<i64> = (0..10).map(|_| b.random_int(0, 1000)).collect();
        assert_eq!(xs, ys);
        assert_eq!(a.random_float(), b.random_float());
        assert_eq!(a.random_bytes(), b.random_bytes());
    }

    #[test]
    fn reseeding_restarts_stream() {
        let ctx = EvaluationContext::new();
        ctx.set_seed(99);
        let first: Vec<i64> = (0..5).map(|_| ctx.random_int(0, 1_000_000)).collect();
        ctx.set_seed(99);
        let second: Vec<i64> = (0..5).map(|_| ctx.random_int(0, 1_000_000)).collect();
        assert_eq!(first, second);
        assert_eq!(ctx.seed(), Some(99));
        ctx.clear_seed();
        assert_eq!(ctx.seed(), None);
    }

    #[test]
    fn random_int_degenerate_range() {
        let ctx = EvaluationContext::new();
        assert_eq!(ctx.random_int(20, 10), 20);
        assert_eq!(ctx.random_int(5, 5), 5);
        for _ in 0..100 {
            let v = ctx.random_int(1, 3);
            assert!((1..=3).contains(&v));
        }
    }

    #[test]
    fn random_offset_bounds() {
        let ctx = EvaluationContext::new();
        let max = TimeDelta::seconds(30);
        for _ in 0..200 {
            let off = ctx.random_offset(max);
            assert!(off >= TimeDelta::zero() && off <= max);
        }
        assert_eq!(ctx.random_offset(TimeDelta::seconds(-5)), TimeDelta::zero());
    }

    #[test]
    fn fixed_clock_moves_on_demand() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let clock = Arc::new(FixedClock::new(start));
        let ctx = EvaluationContext::with_clock(clock.clone());
        assert_eq!(ctx.now(), start);
        clock.advance(TimeDelta::minutes(5));
        assert_eq!(ctx.now(), start + TimeDelta::minutes(5));
    }
}

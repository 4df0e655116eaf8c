// SPDX-License-Identifier: AGPL-3.0-only

//! Counter-based uniform streams feeding the `prns` device buffer.
//!
//! Batch `n` of a stream is a pure function of `(kind, series, n)`:
//!
//! | kind | generator for batch `n` |
//! |------|-------------------------|
//! | `Lcg` | MMIX LCG seeded with `splitmix64(series ^ splitmix64(n))` |
//! | `ChaCha8` | `ChaCha8Rng::seed_from_u64(series)` on stream `n` |
//!
//! so a resumed run only needs the series and the produce counter. The
//! skip count is the counter's starting value.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::config::{Precision, PrngKind};
use crate::constants::{lcg_uniform_f64, splitmix64};

/// Largest f32 below one; single-precision uniforms stay in [0, 1).
const BELOW_ONE_F32: f64 = 1.0 - 1.0 / 16_777_216.0;

/// One SubLattice's random stream.
#[derive(Debug, Clone)]
pub struct PrngStream {
    kind: PrngKind,
    series: u32,
    skip: u64,
    counter: u64,
    len: usize,
    precision: Precision,
}

impl PrngStream {
    #[must_use]
    pub const fn new(kind: PrngKind, series: u32, skip: u64, len: usize, precision: Precision) -> Self {
        Self {
            kind,
            series,
            skip,
            counter: skip,
            len,
            precision,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> PrngKind {
        self.kind
    }

    #[must_use]
    pub const fn series(&self) -> u32 {
        self.series
    }

    #[must_use]
    pub const fn skip(&self) -> u64 {
        self.skip
    }

    /// Batches produced so far, including the skip.
    #[must_use]
    pub const fn counter(&self) -> u64 {
        self.counter
    }

    /// Uniforms per batch.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Restore the counter from a checkpoint.
    pub fn set_counter(&mut self, counter: u64) {
        self.counter = counter;
    }

    /// Next batch; advances the counter.
    pub fn produce(&mut self) -> Vec<f64> {
        let out = self.batch(self.counter);
        self.counter += 1;
        out
    }

    /// Batch `n` without touching the counter.
    #[must_use]
    pub fn batch(&self, n: u64) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.len);
        match self.kind {
            PrngKind::Lcg => {
                let mut state = splitmix64(u64::from(self.series) ^ splitmix64(n));
                out.extend((0..self.len).map(|_| lcg_uniform_f64(&mut state)));
            }
            PrngKind::ChaCha8 => {
                let mut rng = ChaCha8Rng::seed_from_u64(u64::from(self.series));
                rng.set_stream(n);
                out.extend((0..self.len).map(|_| rng.gen::<f64>()));
            }
        }
        if self.precision == Precision::Single {
            for v in &mut out {
                *v = f64::from(*v as f32).min(BELOW_ONE_F32);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batches_are_keyed_by_counter() {
        for kind in [PrngKind::Lcg, PrngKind::ChaCha8] {
            let mut a = PrngStream::new(kind, 7, 0, 64, Precision::Double);
            let first = a.produce();
            let second = a.produce();
            assert_ne!(first, second);
            assert_eq!(a.counter(), 2);

            let mut resumed = PrngStream::new(kind, 7, 0, 64, Precision::Double);
            resumed.set_counter(1);
            assert_eq!(resumed.produce(), second);
        }
    }

    #[test]
    fn skip_starts_the_counter() {
        let mut skipped = PrngStream::new(PrngKind::ChaCha8, 3, 5, 16, Precision::Double);
        let plain = PrngStream::new(PrngKind::ChaCha8, 3, 0, 16, Precision::Double);
        assert_eq!(skipped.produce(), plain.batch(5));
        assert_eq!(skipped.skip(), 5);
    }

    #[test]
    fn series_separate_streams() {
        let a = PrngStream::new(PrngKind::Lcg, 1, 0, 32, Precision::Double);
        let b = PrngStream::new(PrngKind::Lcg, 2, 0, 32, Precision::Double);
        assert_ne!(a.batch(0), b.batch(0));
    }

    #[test]
    fn single_precision_stays_below_one() {
        let s = PrngStream::new(PrngKind::ChaCha8, 11, 0, 4096, Precision::Single);
        for v in s.batch(0) {
            assert!((0.0..1.0).contains(&v));
            assert_eq!(v, f64::from(v as f32));
        }
        assert_eq!(BELOW_ONE_F32, f64::from(BELOW_ONE_F32 as f32));
    }
}

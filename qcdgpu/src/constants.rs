// SPDX-License-Identifier: AGPL-3.0-only

//! Centralized constants for the lattice controller.
//!
//! Collects dimension limits, PRNG parameters, numerical guards and the
//! checkpoint identity used across `geometry`, `prng`, `kernels` and
//! `checkpoint`.

/// Largest `ND` accepted by configuration.
pub const MAX_ND: usize = 32;

/// Dimension range the kernel layer supports (checked when programs are built).
pub const KERNEL_ND_MIN: usize = 2;
pub const KERNEL_ND_MAX: usize = 4;

/// Default workgroup size when a device reports no preference.
pub const DEFAULT_WORKGROUP: usize = 64;

/// Reduction scratch rows with and without the field-strength tensor.
pub const MEASUREMENT_ROWS_TENSOR: usize = 8;
pub const MEASUREMENT_ROWS_BASE: usize = 3;

/// LCG multiplier (Knuth MMIX).
pub const LCG_MULTIPLIER: u64 = 6_364_136_223_846_793_005;

/// LCG increment (Knuth MMIX).
pub const LCG_INCREMENT: u64 = 1_442_695_040_888_963_407;

/// `(state >> 11) as f64 / LCG_53_DIVISOR` gives a uniform in [0, 1) with 53 bits.
pub const LCG_53_DIVISOR: f64 = (1u64 << 53) as f64;

/// SplitMix64 increment (golden ratio), used to key per-batch generators.
pub const SPLITMIX_GAMMA: u64 = 0x9E37_79B9_7F4A_7C15;

/// Division guard for norms, logarithms and heat-bath couplings.
pub const LATTICE_DIVISION_GUARD: f64 = 1e-30;

/// Checkpoint identity.
pub const CHECKPOINT_PREFIX: &str = "QCDGPU";
pub const CHECKPOINT_VERSION: &str = "2.0";
pub const CHECKPOINT_HEADER_WORDS: usize = 64;

/// Default checkpoint and report file names inside `OUTPUTPATH`.
pub const CHECKPOINT_FILE: &str = "qcdgpu.state";
pub const REPORT_PREFIX: &str = "qcdgpu";

/// One SplitMix64 finalization step.
#[inline]
#[must_use]
pub const fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(SPLITMIX_GAMMA);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Advance the LCG state by one step.
#[inline]
pub fn lcg_step(state: &mut u64) {
    *state = state.wrapping_mul(LCG_MULTIPLIER).wrapping_add(LCG_INCREMENT);
}

/// Uniform f64 in [0, 1) from 53 bits of LCG state.
#[inline]
pub fn lcg_uniform_f64(state: &mut u64) -> f64 {
    lcg_step(state);
    (*state >> 11) as f64 / LCG_53_DIVISOR
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lcg_uniform_in_range() {
        let mut state = 12345u64;
        for _ in 0..1000 {
            let v = lcg_uniform_f64(&mut state);
            assert!((0.0..1.0).contains(&v), "out of range: {v}");
        }
    }

    #[test]
    fn splitmix_spreads_neighbours() {
        let a = splitmix64(1);
        let b = splitmix64(2);
        assert_ne!(a, b);
        assert!((a ^ b).count_ones() > 16);
    }

    #[test]
    #[allow(clippy::assertions_on_constants)]
    fn header_fits_prefix_and_version() {
        assert!(CHECKPOINT_PREFIX.len() <= 8);
        assert!(CHECKPOINT_VERSION.len() <= 8);
        assert!(KERNEL_ND_MAX <= MAX_ND);
    }
}

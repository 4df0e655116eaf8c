// SPDX-License-Identifier: AGPL-3.0-only

//! Validation tolerances with their basis.
//!
//! | Category | Basis | Example |
//! |----------|-------|---------|
//! | Machine precision | IEEE 754 f64 | cold plaquette, host recomputation |
//! | Decomposition | summation order across parts | split vs whole lattice |
//! | Physical window | Monte Carlo fluctuation on small lattices | SU(2) plaquette at β = 2.3 |
//! | Regression | recorded run with a fixed stream | golden SU(2) plaquette |

/// Cold plaquette: all links are the identity, so every trace is exactly 1.
pub const COLD_PLAQUETTE_ABS: f64 = 1e-12;

/// Cold action density: β(1 − P) vanishes up to rounding.
pub const COLD_ACTION_ABS: f64 = 1e-10;

/// Slab-weighted aggregation of equal parts against the plain average.
pub const AGGREGATE_ABS: f64 = 1e-14;

/// Observables of a decomposed run against the undecomposed run with the
/// same seed. The update sequence is identical; only reduction grouping
/// changes the last bits.
pub const DECOMPOSITION_PARITY_F64: f64 = 1e-10;

/// Wilson loop split across parts against the whole-lattice loop (group-id
/// start, no update).
pub const WILSON_SPLIT_PARITY: f64 = 1e-10;

/// Device plaquette of the last row against the host recomputation, f64 links.
pub const HOST_CHECK_F64: f64 = 1e-10;

/// Same comparison with f32 link storage.
pub const HOST_CHECK_F32: f64 = 1e-5;

/// SU(2), β = 2.3 on 4⁴: the average plaquette settles near 0.6. The window
/// admits short runs from a cold start.
pub const SU2_BETA23_PLAQUETTE_MIN: f64 = 0.45;

/// Upper edge of the SU(2), β = 2.3 window.
pub const SU2_BETA23_PLAQUETTE_MAX: f64 = 0.80;

/// Recorded mean plaquette of the host run `GROUP=2 INTS=1 BETA=2.3 NAV=10
/// ITER=5 NITER=2 PRNG=LCG RANDSERIES=7` on 4⁴, one part.
pub const SU2_BETA23_GOLDEN_PLAQUETTE: f64 = 0.609_141_932_689_790_1;

/// Relative tolerance on [`SU2_BETA23_GOLDEN_PLAQUETTE`]: libm rounding only.
pub const GOLDEN_PLAQUETTE_REL: f64 = 1e-10;

/// |L|² on a disordered small lattice stays well below the ordered value 1.
pub const CONFINED_POLYAKOV_SQ_MAX: f64 = 0.5;

// SPDX-License-Identifier: AGPL-3.0-only

//! Gauge groups SU(2) and SU(3) behind one trait.
//!
//! The host kernels are generic over [`GaugeGroup`]; the controller picks
//! the instantiation from `GROUP`. Storage sizes follow the packed 4-vector
//! layout of the device buffers:
//!
//! | Group | Words per link | Packing | Heat-bath subgroups |
//! |-------|----------------|---------|---------------------|
//! | SU(2) | 4  | one quaternion | 1 |
//! | SU(3) | 12 | first two rows | 3 (Cabibbo–Marinari) |

pub mod complex_f64;
pub mod su2;
pub mod su3;

use std::f64::consts::TAU;
use std::ops::{Add, Mul};

use complex_f64::Complex64;
use su2::Su2;
use su3::{Su3Matrix, SU2_SUBGROUPS};

use crate::constants::LATTICE_DIVISION_GUARD;

/// Operations the host kernels need from a gauge group.
pub trait GaugeGroup: Copy + Send + Sync + Mul<Output = Self> + Add<Output = Self> {
    /// Number of colours.
    const N: usize;
    /// Storage words per link.
    const WORDS: usize;
    /// SU(2) subgroups visited per heat-bath update.
    const SUBGROUPS: usize;

    fn identity() -> Self;
    fn zero() -> Self;
    fn adjoint(self) -> Self;
    fn trace(self) -> Complex64;
    fn reunitarize(self) -> Self;

    /// Read a link from its packed words.
    fn load(words: &[f64]) -> Self;
    /// Write a link into its packed words.
    fn store(self, words: &mut [f64]);

    /// Haar-distributed element from `WORDS` uniforms in [0, 1).
    fn random(uniforms: &[f64]) -> Self;

    /// `exp(i θ H)` with `H` the first Cartan generator.
    fn twist(theta: f64) -> Self;

    /// `Im Tr(λ_a M) / 2` for generator index `a`.
    fn tensor_component(self, a: usize) -> f64;

    /// One heat-bath update of `self` against the staple sum `staple`.
    ///
    /// `uniforms` holds `SUBGROUPS · (4·nhit + 2)` numbers.
    fn heat_bath(self, staple: Self, beta: f64, uniforms: &[f64], nhit: usize) -> Self;

    /// `Re Tr(M) / N`.
    fn re_trace_normalized(self) -> f64 {
        self.trace().re / Self::N as f64
    }
}

/// Uniforms consumed per site by one heat-bath update.
#[must_use]
pub const fn heat_bath_uniforms(subgroups: usize, nhit: usize) -> usize {
    subgroups * (4 * nhit + 2)
}

/// Kennedy–Pendleton draw of an SU(2) element with density
/// `sqrt(1 - x0²) exp(a x0)`.
///
/// Tries at most `nhit` times; `None` if no try was accepted. Consumes
/// `4·nhit + 2` uniforms regardless of where it stops, so the random index
/// map does not depend on acceptance.
#[must_use]
pub fn kennedy_pendleton(a: f64, uniforms: &[f64], nhit: usize) -> Option<Su2> {
    if a <= LATTICE_DIVISION_GUARD {
        return None;
    }
    let mut x0 = None;
    for hit in uniforms[..4 * nhit].chunks_exact(4) {
        let r1 = hit[0].max(LATTICE_DIVISION_GUARD);
        let c = (TAU * hit[1]).cos();
        let r3 = hit[2].max(LATTICE_DIVISION_GUARD);
        let lambda2 = -(r1.ln() + c * c * r3.ln()) / (2.0 * a);
        if hit[3] * hit[3] <= 1.0 - lambda2 {
            x0 = Some(1.0 - 2.0 * lambda2);
            break;
        }
    }
    let x0 = x0?;
    let tail = &uniforms[4 * nhit..4 * nhit + 2];
    let cos_theta = 2.0 * tail[0] - 1.0;
    let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
    let phi = TAU * tail[1];
    let rad = (1.0 - x0 * x0).max(0.0).sqrt();
    Some(Su2::new(
        x0,
        rad * sin_theta * phi.cos(),
        rad * sin_theta * phi.sin(),
        rad * cos_theta,
    ))
}

/// New SU(2) subgroup rotation `R` for the projected block `w` of `U·S`.
///
/// Returns `None` (keep the link) when the block is degenerate or no
/// heat-bath try was accepted.
fn subgroup_rotation(w: Su2, beta: f64, n: usize, uniforms: &[f64], nhit: usize) -> Option<Su2> {
    let k = w.norm();
    if k <= LATTICE_DIVISION_GUARD {
        return None;
    }
    let a = 2.0 * beta * k / n as f64;
    let x = kennedy_pendleton(a, uniforms, nhit)?;
    Some(x * w.scale(1.0 / k).adjoint())
}

/// Box–Muller pairs from uniforms; `out.len()` must be even.
fn gaussians(uniforms: &[f64], out: &mut [f64]) {
    for (pair, g) in uniforms.chunks_exact(2).zip(out.chunks_exact_mut(2)) {
        let r = (-2.0 * pair[0].max(LATTICE_DIVISION_GUARD).ln()).sqrt();
        let phi = TAU * pair[1];
        g[0] = r * phi.cos();
        g[1] = r * phi.sin();
    }
}

impl GaugeGroup for Su2 {
    const N: usize = 2;
    const WORDS: usize = 4;
    const SUBGROUPS: usize = 1;

    fn identity() -> Self {
        Self::IDENTITY
    }

    fn zero() -> Self {
        Self::ZERO
    }

    fn adjoint(self) -> Self {
        Self::adjoint(self)
    }

    fn trace(self) -> Complex64 {
        Self::trace(self)
    }

    fn reunitarize(self) -> Self {
        Self::reunitarize(self)
    }

    fn load(words: &[f64]) -> Self {
        Self::new(words[0], words[1], words[2], words[3])
    }

    fn store(self, words: &mut [f64]) {
        words[..4].copy_from_slice(&self.a);
    }

    fn random(uniforms: &[f64]) -> Self {
        let mut g = [0.0; 4];
        gaussians(&uniforms[..4], &mut g);
        Self { a: g }.reunitarize()
    }

    fn twist(theta: f64) -> Self {
        Self::twist(theta)
    }

    fn tensor_component(self, a: usize) -> f64 {
        // Tr(σ_a Q) = 2i a_a
        match a {
            1..=3 => self.a[a],
            _ => 0.0,
        }
    }

    fn heat_bath(self, staple: Self, beta: f64, uniforms: &[f64], nhit: usize) -> Self {
        let w = self * staple;
        match subgroup_rotation(w, beta, Self::N, uniforms, nhit) {
            Some(r) => r * self,
            None => self,
        }
    }
}

impl GaugeGroup for Su3Matrix {
    const N: usize = 3;
    const WORDS: usize = 12;
    const SUBGROUPS: usize = 3;

    fn identity() -> Self {
        Self::IDENTITY
    }

    fn zero() -> Self {
        Self::ZERO
    }

    fn adjoint(self) -> Self {
        Self::adjoint(self)
    }

    fn trace(self) -> Complex64 {
        Self::trace(self)
    }

    fn reunitarize(self) -> Self {
        Self::reunitarize(self)
    }

    fn load(words: &[f64]) -> Self {
        let c = |k: usize| Complex64::new(words[2 * k], words[2 * k + 1]);
        Self::from_rows([c(0), c(1), c(2)], [c(3), c(4), c(5)])
    }

    fn store(self, words: &mut [f64]) {
        for (k, z) in self.m[0].iter().chain(self.m[1].iter()).enumerate() {
            words[2 * k] = z.re;
            words[2 * k + 1] = z.im;
        }
    }

    fn random(uniforms: &[f64]) -> Self {
        let mut g = [0.0; 12];
        gaussians(&uniforms[..12], &mut g);
        let c = |k: usize| Complex64::new(g[2 * k], g[2 * k + 1]);
        Self::from_rows([c(0), c(1), c(2)], [c(3), c(4), c(5)]).reunitarize()
    }

    fn twist(theta: f64) -> Self {
        Self::twist(theta)
    }

    fn tensor_component(self, a: usize) -> f64 {
        0.5 * self.gell_mann_trace(a).im
    }

    fn heat_bath(self, staple: Self, beta: f64, uniforms: &[f64], nhit: usize) -> Self {
        let per = heat_bath_uniforms(1, nhit);
        let mut u = self;
        let mut w = u * staple;
        for (s, &(i, j)) in SU2_SUBGROUPS.iter().enumerate() {
            let block = Su2::project(w.block(i, j));
            let slice = &uniforms[s * per..(s + 1) * per];
            if let Some(r) = subgroup_rotation(block, beta, Self::N, slice, nhit) {
                let r3 = Self::embed(r, i, j);
                u = r3 * u;
                w = r3 * w;
            }
        }
        u
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    fn uniforms(n: usize, seed: u64) -> Vec<f64> {
        let mut state = seed;
        (0..n)
            .map(|_| crate::constants::lcg_uniform_f64(&mut state))
            .collect()
    }

    #[test]
    fn kp_sample_is_unit_quaternion() {
        let r = uniforms(4 * 10 + 2, 7);
        let x = kennedy_pendleton(2.0, &r, 10).expect("accepted within 10 hits");
        assert!((x.norm() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn kp_strong_coupling_concentrates_near_identity() {
        let mut mean = 0.0;
        let mut count = 0;
        for seed in 0..200 {
            let r = uniforms(42, seed);
            if let Some(x) = kennedy_pendleton(50.0, &r, 10) {
                mean += x.a[0];
                count += 1;
            }
        }
        assert!(count > 150);
        assert!(mean / f64::from(count) > 0.9);
    }

    #[test]
    fn kp_zero_coupling_keeps_link() {
        let r = uniforms(6, 1);
        assert!(kennedy_pendleton(0.0, &r, 1).is_none());
    }

    #[test]
    fn su2_heat_bath_stays_in_group() {
        let u = Su2::random(&uniforms(4, 3));
        let staple = Su2::random(&uniforms(4, 4)) + Su2::random(&uniforms(4, 5));
        let r = uniforms(heat_bath_uniforms(1, 10), 9);
        let v = u.heat_bath(staple, 2.3, &r, 10);
        assert!((v.norm() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn su3_heat_bath_stays_in_group() {
        let u = Su3Matrix::random(&uniforms(12, 3));
        let staple = Su3Matrix::random(&uniforms(12, 4)) + Su3Matrix::random(&uniforms(12, 5));
        let r = uniforms(heat_bath_uniforms(3, 10), 11);
        let v = u.heat_bath(staple, 5.7, &r, 10);
        let p = v * v.adjoint();
        for i in 0..3 {
            assert!((p.m[i][i].re - 1.0).abs() < 1e-10);
        }
        let d = v.det();
        assert!((d.re - 1.0).abs() < 1e-10);
    }

    #[test]
    fn su3_store_load_preserves_matrix() {
        let u = Su3Matrix::random(&uniforms(12, 21));
        let mut words = [0.0; 12];
        u.store(&mut words);
        let v = Su3Matrix::load(&words);
        for i in 0..3 {
            for j in 0..3 {
                assert!((u.m[i][j] - v.m[i][j]).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn su2_tensor_component_reads_vector_part() {
        let q = Su2::new(0.0, 0.1, 0.2, 0.3);
        assert!((q.tensor_component(2) - 0.2).abs() < 1e-15);
        assert!(q.tensor_component(8).abs() < 1e-15);
    }
}

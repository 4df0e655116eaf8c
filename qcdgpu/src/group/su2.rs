// SPDX-License-Identifier: AGPL-3.0-only

//! SU(2) link variables stored as real quaternions.
//!
//! A quaternion `a = (a0, a1, a2, a3)` represents the 2×2 matrix
//!
//! ```text
//! Q(a) = | a0 + i a3    a2 + i a1 |
//!        | -a2 + i a1   a0 - i a3 |
//! ```
//!
//! which is `a0·1 + a1·iσ1 + a2·iσ2 + a3·iσ3`. The real span is closed under
//! addition and multiplication, so staple sums stay in this form (with
//! `det = |a|²` instead of 1). One link occupies one packed 4-vector.

use std::ops::{Add, Mul};

use super::complex_f64::Complex64;
use crate::constants::LATTICE_DIVISION_GUARD;

/// Quaternion-form SU(2) element (or a real multiple of one).
#[derive(Clone, Copy, Debug, PartialEq)]
#[must_use]
pub struct Su2 {
    pub a: [f64; 4],
}

impl Su2 {
    pub const IDENTITY: Self = Self {
        a: [1.0, 0.0, 0.0, 0.0],
    };

    pub const ZERO: Self = Self { a: [0.0; 4] };

    pub const fn new(a0: f64, a1: f64, a2: f64, a3: f64) -> Self {
        Self {
            a: [a0, a1, a2, a3],
        }
    }

    /// Hermitian conjugate: `Q(a)† = Q(a0, -a1, -a2, -a3)`.
    pub fn adjoint(self) -> Self {
        Self::new(self.a[0], -self.a[1], -self.a[2], -self.a[3])
    }

    /// `sqrt(det Q)` for a real multiple of SU(2).
    #[must_use]
    pub fn norm(self) -> f64 {
        self.a.iter().map(|x| x * x).sum::<f64>().sqrt()
    }

    pub fn scale(self, s: f64) -> Self {
        Self::new(self.a[0] * s, self.a[1] * s, self.a[2] * s, self.a[3] * s)
    }

    /// Tr Q = 2 a0.
    #[must_use]
    pub fn trace(self) -> Complex64 {
        Complex64::new(2.0 * self.a[0], 0.0)
    }

    /// Project back onto SU(2) by normalizing; a null quaternion becomes 1.
    pub fn reunitarize(self) -> Self {
        let n = self.norm();
        if n > LATTICE_DIVISION_GUARD {
            self.scale(1.0 / n)
        } else {
            Self::IDENTITY
        }
    }

    /// Projection of a general 2×2 complex block onto the quaternion span.
    ///
    /// `w` is `[[w00, w01], [w10, w11]]`. The orthogonal complement of the
    /// quaternion span does not contribute to `Re Tr(R w)` for any SU(2) `R`.
    pub fn project(w: [[Complex64; 2]; 2]) -> Self {
        Self::new(
            0.5 * (w[0][0].re + w[1][1].re),
            0.5 * (w[0][1].im + w[1][0].im),
            0.5 * (w[0][1].re - w[1][0].re),
            0.5 * (w[0][0].im - w[1][1].im),
        )
    }

    /// The 2×2 complex matrix `Q(a)`.
    #[must_use]
    pub fn to_matrix(self) -> [[Complex64; 2]; 2] {
        let [a0, a1, a2, a3] = self.a;
        [
            [Complex64::new(a0, a3), Complex64::new(a2, a1)],
            [Complex64::new(-a2, a1), Complex64::new(a0, -a3)],
        ]
    }

    /// `exp(i θ σ3)`, the twist for the SU(2) Cartan direction.
    pub fn twist(theta: f64) -> Self {
        Self::new(theta.cos(), 0.0, 0.0, theta.sin())
    }
}

impl Mul for Su2 {
    type Output = Self;
    #[inline]
    fn mul(self, rhs: Self) -> Self {
        let [a0, a1, a2, a3] = self.a;
        let [b0, b1, b2, b3] = rhs.a;
        // (iσj)(iσk) = -δjk - εjkl (iσl)
        Self::new(
            a0 * b0 - a1 * b1 - a2 * b2 - a3 * b3,
            a0 * b1 + b0 * a1 - (a2 * b3 - a3 * b2),
            a0 * b2 + b0 * a2 - (a3 * b1 - a1 * b3),
            a0 * b3 + b0 * a3 - (a1 * b2 - a2 * b1),
        )
    }
}

impl Add for Su2 {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self::new(
            self.a[0] + rhs.a[0],
            self.a[1] + rhs.a[1],
            self.a[2] + rhs.a[2],
            self.a[3] + rhs.a[3],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mat_mul(x: [[Complex64; 2]; 2], y: [[Complex64; 2]; 2]) -> [[Complex64; 2]; 2] {
        let mut r = [[Complex64::ZERO; 2]; 2];
        for i in 0..2 {
            for j in 0..2 {
                for k in 0..2 {
                    r[i][j] += x[i][k] * y[k][j];
                }
            }
        }
        r
    }

    fn assert_mat_close(x: [[Complex64; 2]; 2], y: [[Complex64; 2]; 2]) {
        for i in 0..2 {
            for j in 0..2 {
                assert!((x[i][j].re - y[i][j].re).abs() < 1e-14, "re ({i},{j})");
                assert!((x[i][j].im - y[i][j].im).abs() < 1e-14, "im ({i},{j})");
            }
        }
    }

    #[test]
    fn quaternion_product_matches_matrix_product() {
        let p = Su2::new(0.3, -0.5, 0.7, 0.1);
        let q = Su2::new(-0.2, 0.4, 0.25, -0.9);
        assert_mat_close((p * q).to_matrix(), mat_mul(p.to_matrix(), q.to_matrix()));
    }

    #[test]
    fn adjoint_is_inverse_for_unit_quaternion() {
        let u = Su2::new(0.5, 0.5, 0.5, 0.5);
        let r = u * u.adjoint();
        assert!((r.a[0] - 1.0).abs() < 1e-15);
        assert!(r.a[1..].iter().all(|x| x.abs() < 1e-15));
    }

    #[test]
    fn projection_recovers_quaternion() {
        let u = Su2::new(0.1, 0.2, -0.3, 0.4);
        let p = Su2::project(u.to_matrix());
        for k in 0..4 {
            assert!((p.a[k] - u.a[k]).abs() < 1e-15);
        }
    }

    #[test]
    fn reunitarize_normalizes() {
        let u = Su2::new(2.0, 0.0, 0.0, 0.0).reunitarize();
        assert!((u.norm() - 1.0).abs() < 1e-15);
        assert_eq!(Su2::ZERO.reunitarize(), Su2::IDENTITY);
    }

    #[test]
    fn twist_is_diagonal_phase() {
        let m = Su2::twist(0.4).to_matrix();
        assert!((m[0][0].im - 0.4_f64.sin()).abs() < 1e-15);
        assert!((m[1][1].im + 0.4_f64.sin()).abs() < 1e-15);
        assert!(m[0][1].abs() < 1e-15);
    }
}

// SPDX-License-Identifier: AGPL-3.0-only

//! SU(3) matrix operations for the host kernels.
//!
//! Links are stored compressed as their first two rows (three packed
//! 4-vectors, 12 words); the third row is rebuilt on load as
//! `conj(row0 × row1)`, which enforces `det = 1`. Staple sums are general
//! 3×3 matrices and never stored.
//!
//! # References
//!
//! - Gattringer & Lang, "QCD on the Lattice" (2010), Ch. 2, 4
//! - Cabibbo & Marinari, Phys. Lett. B 119 (1982) 387

use std::ops::{Add, Mul};

use super::complex_f64::Complex64;
use super::su2::Su2;
use crate::constants::LATTICE_DIVISION_GUARD;

/// 3×3 complex matrix, row-major `m[row][col]`.
#[derive(Clone, Copy, Debug)]
#[must_use]
pub struct Su3Matrix {
    pub m: [[Complex64; 3]; 3],
}

/// The three SU(2) subgroups updated by Cabibbo–Marinari, as (row, col) pairs.
pub const SU2_SUBGROUPS: [(usize, usize); 3] = [(0, 1), (0, 2), (1, 2)];

impl Mul for Su3Matrix {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        let mut r = Self::ZERO;
        for i in 0..3 {
            for j in 0..3 {
                let mut s = Complex64::ZERO;
                for k in 0..3 {
                    s += self.m[i][k] * rhs.m[k][j];
                }
                r.m[i][j] = s;
            }
        }
        r
    }
}

impl Add for Su3Matrix {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        let mut r = Self::ZERO;
        for i in 0..3 {
            for j in 0..3 {
                r.m[i][j] = self.m[i][j] + rhs.m[i][j];
            }
        }
        r
    }
}

impl Su3Matrix {
    pub const IDENTITY: Self = Self {
        m: [
            [Complex64::ONE, Complex64::ZERO, Complex64::ZERO],
            [Complex64::ZERO, Complex64::ONE, Complex64::ZERO],
            [Complex64::ZERO, Complex64::ZERO, Complex64::ONE],
        ],
    };

    pub const ZERO: Self = Self {
        m: [[Complex64::ZERO; 3]; 3],
    };

    /// Conjugate transpose.
    pub fn adjoint(self) -> Self {
        let mut r = Self::ZERO;
        for i in 0..3 {
            for j in 0..3 {
                r.m[i][j] = self.m[j][i].conj();
            }
        }
        r
    }

    pub fn trace(self) -> Complex64 {
        self.m[0][0] + self.m[1][1] + self.m[2][2]
    }

    pub fn det(self) -> Complex64 {
        let m = &self.m;
        let a = m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1]);
        let b = m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0]);
        let c = m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0]);
        a - b + c
    }

    /// Rebuild a matrix from its first two rows, completing the third.
    pub fn from_rows(row0: [Complex64; 3], row1: [Complex64; 3]) -> Self {
        let mut u = Self::ZERO;
        u.m[0] = row0;
        u.m[1] = row1;
        u.complete_third_row();
        u
    }

    /// Row 2 = conj(row 0 × row 1).
    fn complete_third_row(&mut self) {
        let m = &self.m;
        let r2 = [
            (m[0][1] * m[1][2] - m[0][2] * m[1][1]).conj(),
            (m[0][2] * m[1][0] - m[0][0] * m[1][2]).conj(),
            (m[0][0] * m[1][1] - m[0][1] * m[1][0]).conj(),
        ];
        self.m[2] = r2;
    }

    /// Modified Gram-Schmidt on the first two rows, then the cross product.
    pub fn reunitarize(self) -> Self {
        let mut u = self;

        let n0 = row_norm(&u, 0);
        if n0 > LATTICE_DIVISION_GUARD {
            let inv = 1.0 / n0;
            for j in 0..3 {
                u.m[0][j] = u.m[0][j].scale(inv);
            }
        }

        let dot01 = row_dot(&u, 0, 1);
        for j in 0..3 {
            let d = u.m[0][j] * dot01;
            u.m[1][j] -= d;
        }
        let n1 = row_norm(&u, 1);
        if n1 > LATTICE_DIVISION_GUARD {
            let inv = 1.0 / n1;
            for j in 0..3 {
                u.m[1][j] = u.m[1][j].scale(inv);
            }
        }

        u.complete_third_row();
        u
    }

    /// The 2×2 block at rows/cols `(i, j)`.
    #[must_use]
    pub fn block(&self, i: usize, j: usize) -> [[Complex64; 2]; 2] {
        [
            [self.m[i][i], self.m[i][j]],
            [self.m[j][i], self.m[j][j]],
        ]
    }

    /// Embed an SU(2) element into the `(i, j)` subgroup, identity elsewhere.
    pub fn embed(q: Su2, i: usize, j: usize) -> Self {
        let b = q.to_matrix();
        let mut r = Self::IDENTITY;
        r.m[i][i] = b[0][0];
        r.m[i][j] = b[0][1];
        r.m[j][i] = b[1][0];
        r.m[j][j] = b[1][1];
        r
    }

    /// `exp(i θ diag(1, -1, 0))`.
    pub fn twist(theta: f64) -> Self {
        let mut r = Self::IDENTITY;
        r.m[0][0] = Complex64::from_polar(theta);
        r.m[1][1] = Complex64::from_polar(-theta);
        r
    }

    /// `Tr(λ_a M)` for Gell-Mann matrix `a ∈ 1..=8`; zero for other indices.
    #[must_use]
    pub fn gell_mann_trace(&self, a: usize) -> Complex64 {
        let m = &self.m;
        let i = Complex64::I;
        match a {
            1 => m[1][0] + m[0][1],
            2 => i * m[0][1] - i * m[1][0],
            3 => m[0][0] - m[1][1],
            4 => m[2][0] + m[0][2],
            5 => i * m[0][2] - i * m[2][0],
            6 => m[2][1] + m[1][2],
            7 => i * m[1][2] - i * m[2][1],
            8 => (m[0][0] + m[1][1] - m[2][2].scale(2.0)).scale(1.0 / 3.0_f64.sqrt()),
            _ => Complex64::ZERO,
        }
    }
}

fn row_norm(u: &Su3Matrix, row: usize) -> f64 {
    u.m[row].iter().map(|c| c.abs_sq()).sum::<f64>().sqrt()
}

fn row_dot(u: &Su3Matrix, r1: usize, r2: usize) -> Complex64 {
    let mut s = Complex64::ZERO;
    for j in 0..3 {
        s += u.m[r1][j].conj() * u.m[r2][j];
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Su3Matrix {
        Su3Matrix::from_rows(
            [
                Complex64::new(0.6, 0.1),
                Complex64::new(-0.3, 0.5),
                Complex64::new(0.2, -0.4),
            ],
            [
                Complex64::new(0.1, 0.7),
                Complex64::new(0.4, -0.2),
                Complex64::new(-0.5, 0.1),
            ],
        )
        .reunitarize()
    }

    fn assert_identity(p: Su3Matrix, tol: f64) {
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((p.m[i][j].re - expected).abs() < tol, "re ({i},{j})");
                assert!(p.m[i][j].im.abs() < tol, "im ({i},{j})");
            }
        }
    }

    #[test]
    fn reunitarized_rows_are_unitary_with_unit_det() {
        let u = sample();
        assert_identity(u * u.adjoint(), 1e-12);
        let d = u.det();
        assert!((d.re - 1.0).abs() < 1e-12 && d.im.abs() < 1e-12);
    }

    #[test]
    fn embedded_su2_stays_unitary() {
        let q = Su2::new(0.5, -0.5, 0.5, 0.5);
        for &(i, j) in &SU2_SUBGROUPS {
            let r = Su3Matrix::embed(q, i, j);
            assert_identity(r * r.adjoint(), 1e-14);
        }
    }

    #[test]
    fn block_projection_of_embedding() {
        let q = Su2::new(0.1, 0.7, -0.1, 0.7).reunitarize();
        let r = Su3Matrix::embed(q, 0, 2);
        let p = Su2::project(r.block(0, 2));
        for k in 0..4 {
            assert!((p.a[k] - q.a[k]).abs() < 1e-14);
        }
    }

    #[test]
    fn gell_mann_traces_of_twist() {
        let t = Su3Matrix::twist(0.25);
        // Tr(λ3 Z) = e^{iθ} - e^{-iθ} = 2i sin θ
        let tr3 = t.gell_mann_trace(3);
        assert!(tr3.re.abs() < 1e-15);
        assert!((tr3.im - 2.0 * 0.25_f64.sin()).abs() < 1e-15);
        assert!(t.gell_mann_trace(1).abs() < 1e-15);
        assert!(t.gell_mann_trace(9).abs() < 1e-15);
    }

    #[test]
    fn identity_trace_is_three() {
        assert!((Su3Matrix::IDENTITY.trace().re - 3.0).abs() < 1e-15);
    }
}

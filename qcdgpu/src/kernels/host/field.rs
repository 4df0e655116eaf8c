// SPDX-License-Identifier: AGPL-3.0-only

//! Read-only view of a link table plus the plaquette, staple and Polyakov
//! products shared by the host kernels.
//!
//! Plaquette convention (μ < ν):
//!
//! ```text
//! P_μν(b) = Z · U_μ(b) U_ν(b+μ) U_μ†(b+ν) U_ν†(b)
//! ```
//!
//! `Z` is the twist `exp(i θ H)` on the single plaquette per plane based
//! at the global corner `b_0 = L_0 - 1`, `b_ν = L_ν - 1`, for the planes
//! (0, 1) with `θ = PHI` and (0, nd-1) with `θ = OMEGA`; identity elsewhere.

use std::marker::PhantomData;

use crate::geometry::LocalGeometry;
use crate::group::complex_f64::Complex64;
use crate::group::GaugeGroup;

use super::super::KernelConfig;

/// Twisted boundary parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct Twist {
    pub enabled: bool,
    pub phi: f64,
    pub omega: f64,
}

impl Twist {
    #[must_use]
    pub const fn from_config(cfg: &KernelConfig) -> Self {
        Self {
            enabled: cfg.tbc,
            phi: cfg.phi,
            omega: cfg.omega,
        }
    }
}

pub struct Field<'a, G> {
    words: &'a [f64],
    geom: &'a LocalGeometry,
    twist: Twist,
    stored: usize,
    _group: PhantomData<G>,
}

impl<'a, G: GaugeGroup> Field<'a, G> {
    pub fn new(geom: &'a LocalGeometry, twist: Twist, words: &'a [f64]) -> Self {
        Self {
            words,
            geom,
            twist,
            stored: geom.stored_sites(),
            _group: PhantomData,
        }
    }

    #[must_use]
    pub const fn geometry(&self) -> &LocalGeometry {
        self.geom
    }

    #[inline]
    pub fn link(&self, site: usize, dir: usize) -> G {
        let at = (dir * self.stored + site) * G::WORDS;
        G::load(&self.words[at..at + G::WORDS])
    }

    #[inline]
    fn fwd(&self, s: usize, d: usize) -> usize {
        self.geom.step(s, d, true)
    }

    #[inline]
    fn back(&self, s: usize, d: usize) -> usize {
        self.geom.step(s, d, false)
    }

    /// Twist carried by the plaquette based at `b` in plane (μ, ν), μ < ν.
    fn twist_at(&self, b: usize, mu: usize, nu: usize) -> Option<G> {
        if !self.twist.enabled || mu != 0 {
            return None;
        }
        let nd = self.geom.nd();
        let theta = if nu == 1 {
            self.twist.phi
        } else if nu == nd - 1 {
            self.twist.omega
        } else {
            return None;
        };
        let full = &self.geom.full;
        let corner = self.geom.global_x(self.geom.coord(b, 0)) == full[0] - 1
            && self.geom.coord(b, nu) == full[nu] - 1;
        corner.then(|| G::twist(theta))
    }

    /// `P_μν(b)` for μ < ν.
    pub fn plaquette(&self, b: usize, mu: usize, nu: usize) -> G {
        let p = self.link(b, mu)
            * self.link(self.fwd(b, mu), nu)
            * self.link(self.fwd(b, nu), mu).adjoint()
            * self.link(b, nu).adjoint();
        match self.twist_at(b, mu, nu) {
            Some(z) => z * p,
            None => p,
        }
    }

    /// `Re Tr P_μν(b) / N`.
    pub fn plaquette_trace(&self, b: usize, mu: usize, nu: usize) -> f64 {
        self.plaquette(b, mu, nu).re_trace_normalized()
    }

    /// Sum of staples `S` for link `U_a(x)` with `Re Tr(U_a(x) S)` equal to
    /// the sum of `Re Tr P` over the plaquettes that contain it.
    pub fn staple(&self, x: usize, a: usize) -> G {
        let mut sum = G::zero();
        for o in (0..self.geom.nd()).filter(|&o| o != a) {
            if a < o {
                let (mu, nu) = (a, o);
                let up = self.link(self.fwd(x, mu), nu)
                    * self.link(self.fwd(x, nu), mu).adjoint()
                    * self.link(x, nu).adjoint();
                sum = sum
                    + match self.twist_at(x, mu, nu) {
                        Some(z) => up * z,
                        None => up,
                    };

                let b = self.back(x, nu);
                let down_right = self.link(self.fwd(b, mu), nu).adjoint() * self.link(b, mu).adjoint();
                let down_left = self.link(b, nu);
                sum = sum
                    + match self.twist_at(b, mu, nu) {
                        Some(z) => down_right * z.adjoint() * down_left,
                        None => down_right * down_left,
                    };
            } else {
                let (mu, nu) = (o, a);
                let b = self.back(x, mu);
                let left = self.link(self.fwd(b, nu), mu).adjoint() * self.link(b, nu).adjoint();
                let tail = self.link(b, mu);
                sum = sum
                    + match self.twist_at(b, mu, nu) {
                        Some(z) => left * z * tail,
                        None => left * tail,
                    };

                let right = self.link(self.fwd(x, nu), mu)
                    * self.link(self.fwd(x, mu), nu).adjoint()
                    * self.link(x, mu).adjoint();
                sum = sum
                    + match self.twist_at(x, mu, nu) {
                        Some(z) => right * z.adjoint(),
                        None => right,
                    };
            }
        }
        sum
    }

    /// `Tr Π_t U_t(x + t t̂) / N` along the whole time extent.
    pub fn polyakov(&self, x: usize) -> Complex64 {
        let t_axis = self.geom.time_axis();
        let lt = self.geom.full[t_axis];
        let mut s = x;
        let mut prod = G::identity();
        for _ in 0..lt {
            prod = prod * self.link(s, t_axis);
            s = self.fwd(s, t_axis);
        }
        prod.trace().scale(1.0 / G::N as f64)
    }
}

/// Write link `u` for `(site, dir)` into a link table.
#[inline]
pub fn store<G: GaugeGroup>(words: &mut [f64], stored: usize, site: usize, dir: usize, u: G) {
    let at = (dir * stored + site) * G::WORDS;
    u.store(&mut words[at..at + G::WORDS]);
}

/// Spatial (μ < ν < t) and temporal (μ, t) planes.
#[must_use]
pub fn planes(nd: usize) -> (Vec<(usize, usize)>, Vec<(usize, usize)>) {
    let t = nd - 1;
    let spatial = (0..t)
        .flat_map(|mu| (mu + 1..t).map(move |nu| (mu, nu)))
        .collect();
    let temporal = (0..t).map(|mu| (mu, t)).collect();
    (spatial, temporal)
}

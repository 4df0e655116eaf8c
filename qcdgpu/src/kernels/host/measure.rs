// SPDX-License-Identifier: AGPL-3.0-only

//! Primary measurement kernels.
//!
//! Each writes per-site values, already averaged over the planes or axes
//! they cover, into scratch rows `measurement[row · padded + i]` for owned
//! site `i`; entries past the owned sites are zeroed. The reduction kernels
//! in [`super::reduce`] turn the rows into per-iteration series values.
//!
//! Field-tensor rows (2..8) hold `[F^{i1}_x, F^{i1}_y, F^{i1}_z,
//! F^{i2}_x, F^{i2}_y, F^{i2}_z]` with `F^a_μν = Im Tr(λ_a P_μν) / 2`.
//! The magnetic variant maps `(x, y, z)` to `(F_12, F_20, F_01)`, the
//! electric one to `(F_xt, F_yt, F_zt)`. Planes that do not exist in the
//! lattice read as zero.

use rayon::prelude::*;

use crate::config::TensorVariant;
use crate::group::GaugeGroup;

use super::super::{KernelConfig, DIFF_AXES};
use super::field::{planes, Field, Twist};

/// Fill scratch rows `0..R` from per-site values.
fn fill_rows<const R: usize>(
    cfg: &KernelConfig,
    measurement: &mut [f64],
    site_value: impl Fn(usize) -> [f64; R] + Sync + Send,
) {
    let owned = cfg.local.owned_sites();
    let padded = cfg.local.padded_sites();
    let values: Vec<[f64; R]> = (0..owned).into_par_iter().map(site_value).collect();
    for r in 0..R {
        let row = &mut measurement[r * padded..(r + 1) * padded];
        for (dst, v) in row.iter_mut().zip(&values) {
            *dst = v[r];
        }
        row[owned..].fill(0.0);
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

/// Signed `F^a_μν` for any ordered pair, zero for missing planes.
fn tensor<G: GaugeGroup>(f: &Field<'_, G>, s: usize, mu: usize, nu: usize, a: usize) -> f64 {
    let nd = f.geometry().nd();
    if mu >= nd || nu >= nd || mu == nu {
        return 0.0;
    }
    if mu < nu {
        f.plaquette(s, mu, nu).tensor_component(a)
    } else {
        -f.plaquette(s, nu, mu).tensor_component(a)
    }
}

/// The three components of the selected tensor variant at site `s`.
fn tensor_components<G: GaugeGroup>(
    cfg: &KernelConfig,
    f: &Field<'_, G>,
    s: usize,
    a: usize,
) -> [f64; DIFF_AXES] {
    let t = cfg.local.time_axis();
    let spatial = |k: usize| k < t;
    match cfg.tensor {
        Some(TensorVariant::Magnetic) => {
            let comp = |i: usize, j: usize| {
                if spatial(i) && spatial(j) {
                    tensor(f, s, i, j, a)
                } else {
                    0.0
                }
            };
            [comp(1, 2), comp(2, 0), comp(0, 1)]
        }
        Some(TensorVariant::Electric) => {
            let comp = |k: usize| if spatial(k) { tensor(f, s, k, t, a) } else { 0.0 };
            [comp(0), comp(1), comp(2)]
        }
        None => [0.0; DIFF_AXES],
    }
}

pub fn plaquette<G: GaugeGroup>(cfg: &KernelConfig, links: &[f64], measurement: &mut [f64]) {
    let local = &cfg.local;
    let f = Field::<G>::new(local, Twist::from_config(cfg), links);
    let (spatial, temporal) = planes(local.nd());
    fill_rows::<2>(cfg, measurement, |i| {
        let s = local.stored_of_owned(i);
        [
            mean(spatial.iter().map(|&(mu, nu)| f.plaquette_trace(s, mu, nu))),
            mean(temporal.iter().map(|&(mu, nu)| f.plaquette_trace(s, mu, nu))),
        ]
    });
}

/// Spatial and temporal action densities, plus the field tensor when enabled.
pub fn action<G: GaugeGroup>(cfg: &KernelConfig, links: &[f64], measurement: &mut [f64]) {
    let local = &cfg.local;
    let f = Field::<G>::new(local, Twist::from_config(cfg), links);
    let (spatial, temporal) = planes(local.nd());
    let beta = cfg.beta;
    let density = |s: usize, list: &[(usize, usize)]| {
        mean(
            list.iter()
                .map(|&(mu, nu)| beta * (1.0 - f.plaquette_trace(s, mu, nu))),
        )
    };
    if cfg.tensor.is_some() {
        let [i1, i2] = cfg.tensor_indices;
        fill_rows::<8>(cfg, measurement, |i| {
            let s = local.stored_of_owned(i);
            let a = tensor_components(cfg, &f, s, i1);
            let b = tensor_components(cfg, &f, s, i2);
            [
                density(s, &spatial),
                density(s, &temporal),
                a[0],
                a[1],
                a[2],
                b[0],
                b[1],
                b[2],
            ]
        });
    } else {
        fill_rows::<2>(cfg, measurement, |i| {
            let s = local.stored_of_owned(i);
            [density(s, &spatial), density(s, &temporal)]
        });
    }
}

/// Action densities restricted to planes containing spatial axis `k`.
pub fn action_diff<G: GaugeGroup>(
    cfg: &KernelConfig,
    links: &[f64],
    measurement: &mut [f64],
    k: usize,
) {
    let local = &cfg.local;
    let f = Field::<G>::new(local, Twist::from_config(cfg), links);
    let (spatial, temporal) = planes(local.nd());
    let spatial_k: Vec<_> = spatial
        .into_iter()
        .filter(|&(mu, nu)| mu == k || nu == k)
        .collect();
    let temporal_k: Vec<_> = temporal.into_iter().filter(|&(mu, _)| mu == k).collect();
    let beta = cfg.beta;
    fill_rows::<2>(cfg, measurement, |i| {
        let s = local.stored_of_owned(i);
        let density = |list: &[(usize, usize)]| {
            mean(
                list.iter()
                    .map(|&(mu, nu)| beta * (1.0 - f.plaquette_trace(s, mu, nu))),
            )
        };
        [density(&spatial_k), density(&temporal_k)]
    });
}

/// `[Re L, Im L, |L|²]` at time slice 0, zero elsewhere.
pub fn polyakov<G: GaugeGroup>(cfg: &KernelConfig, links: &[f64], measurement: &mut [f64]) {
    let local = &cfg.local;
    let t = local.time_axis();
    let f = Field::<G>::new(local, Twist::from_config(cfg), links);
    fill_rows::<3>(cfg, measurement, |i| {
        let s = local.stored_of_owned(i);
        if local.coord(s, t) != 0 {
            return [0.0; 3];
        }
        let l = f.polyakov(s);
        [l.re, l.im, l.abs_sq()]
    });
}

/// `L(x) L*(x + k̂)` at time slice 0, zero elsewhere.
pub fn polyakov_diff<G: GaugeGroup>(
    cfg: &KernelConfig,
    links: &[f64],
    measurement: &mut [f64],
    k: usize,
) {
    let local = &cfg.local;
    let t = local.time_axis();
    let f = Field::<G>::new(local, Twist::from_config(cfg), links);
    fill_rows::<2>(cfg, measurement, |i| {
        let s = local.stored_of_owned(i);
        if k >= t || local.coord(s, t) != 0 {
            return [0.0; 2];
        }
        let c = f.polyakov(s) * f.polyakov(local.step(s, k, true)).conj();
        [c.re, c.im]
    });
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::{ParameterSet, RunParameters};
    use crate::geometry::LocalGeometry;
    use crate::group::su3::Su3Matrix;
    use crate::kernels::host::init;

    fn cfg(text: &str) -> KernelConfig {
        let p = RunParameters::from_set(&ParameterSet::parse(text).expect("parse")).expect("params");
        KernelConfig::new(&p, LocalGeometry::new(
            &p.extents,
            crate::geometry::Partition { index: 0, x0: 0, nx: p.extents[0] },
            false,
            64,
        ))
    }

    #[test]
    fn cold_lattice_measures_unit_plaquette_zero_action() {
        let c = cfg("LS=4\nLT=4\nBETA=6.0\n");
        let mut links = vec![0.0; c.links_len()];
        init::cold::<Su3Matrix>(&c, &mut links);
        let mut m = vec![1.0; c.measurement_len()];
        plaquette::<Su3Matrix>(&c, &links, &mut m);
        let padded = c.local.padded_sites();
        assert!((m[0] - 1.0).abs() < 1e-14);
        assert!((m[padded] - 1.0).abs() < 1e-14);

        action::<Su3Matrix>(&c, &links, &mut m);
        for r in 0..8 {
            assert!(m[r * padded].abs() < 1e-13, "row {r}");
        }
    }

    #[test]
    fn polyakov_rows_only_on_first_time_slice() {
        let c = cfg("LS=2\nLT=4\n");
        let mut links = vec![0.0; c.links_len()];
        init::cold::<Su3Matrix>(&c, &mut links);
        let mut m = vec![0.0; c.measurement_len()];
        polyakov::<Su3Matrix>(&c, &links, &mut m);
        assert!((m[0] - 1.0).abs() < 1e-14);
        assert!(m[1].abs() < 1e-14);
        let padded = c.local.padded_sites();
        assert!((m[2 * padded] - 1.0).abs() < 1e-14);
    }

    #[test]
    fn mean_of_nothing_is_zero() {
        assert_eq!(mean(std::iter::empty()), 0.0);
        assert!((mean([1.0, 2.0, 3.0].into_iter()) - 2.0).abs() < 1e-15);
    }
}

// SPDX-License-Identifier: AGPL-3.0-only

//! Wilson loop `W(R, T)` in stages.
//!
//! ```text
//! W_k(x) = Re Tr[ L_k(x) · L_t(x + R k̂) · L_k(x + T t̂)† · L_t(x)† ] / N
//! ```
//!
//! `L_t` is the product of `T` temporal links (`wilson_lt`), `L_k` the
//! product of `R` links along spatial axis `k` (`wilson_lr1` at `x`,
//! `wilson_lr2` at `x + T t̂`). Only axis 0 can leave the partition: with a
//! halo, the `R` axis-0 slices past the right edge come from the staged
//! buffers `aux_links` (direction-0 links) and `aux_lt` (temporal
//! transporters), slice `s` holding global slice `x0 + Nx + s`. Without a
//! halo the partition is the whole lattice and axis 0 wraps.

use rayon::prelude::*;

use crate::geometry::LocalGeometry;
use crate::group::GaugeGroup;

use super::super::KernelConfig;
use super::field::{Field, Twist};

fn load<G: GaugeGroup>(words: &[f64], index: usize) -> G {
    let at = index * G::WORDS;
    G::load(&words[at..at + G::WORDS])
}

/// Owned slice `xs` (no ghost offset) and in-slice offset of owned site `i`.
fn split(local: &LocalGeometry, i: usize) -> (usize, usize) {
    let slice = local.slice_sites();
    (i / slice, i % slice)
}

/// Temporal transporter of extent `T` for every owned site.
pub fn lt<G: GaugeGroup>(cfg: &KernelConfig, links: &[f64], lt: &mut [f64]) {
    let local = &cfg.local;
    let t = local.time_axis();
    let f = Field::<G>::new(local, Twist::from_config(cfg), links);
    lt.par_chunks_exact_mut(G::WORDS)
        .take(local.owned_sites())
        .enumerate()
        .for_each(|(i, w)| {
            let mut s = local.stored_of_owned(i);
            let mut prod = G::identity();
            for _ in 0..cfg.wilson_t {
                prod = prod * f.link(s, t);
                s = local.step(s, t, true);
            }
            prod.store(w);
        });
}

/// Spatial transporters of extent `R` along every spatial axis, starting
/// `shift_t` time steps above each owned site.
pub fn chain<G: GaugeGroup>(
    cfg: &KernelConfig,
    links: &[f64],
    aux_links: &[f64],
    lr: &mut [f64],
    shift_t: usize,
) {
    let local = &cfg.local;
    let t = local.time_axis();
    let owned = local.owned_sites();
    let slice = local.slice_sites();
    let f = Field::<G>::new(local, Twist::from_config(cfg), links);
    lr.par_chunks_exact_mut(G::WORDS)
        .take(cfg.spatial_axes() * owned)
        .enumerate()
        .for_each(|(j, w)| {
            let (k, i) = (j / owned, j % owned);
            let start = local.walk(local.stored_of_owned(i), t, shift_t);
            let mut prod = G::identity();
            if k == 0 {
                let (xs, _) = split(local, i);
                let rest = start % slice;
                for r in 0..cfg.wilson_r {
                    let x = xs + r;
                    let u = if !local.halo {
                        f.link((x % local.nx) * slice + rest, 0)
                    } else if x < local.nx {
                        f.link((x + 1) * slice + rest, 0)
                    } else {
                        load::<G>(aux_links, (x - local.nx) * slice + rest)
                    };
                    prod = prod * u;
                }
            } else {
                let mut s = start;
                for _ in 0..cfg.wilson_r {
                    prod = prod * f.link(s, k);
                    s = local.step(s, k, true);
                }
            }
            prod.store(w);
        });
}

/// Per-site loop averaged over spatial axes into scratch row 0.
pub fn accumulate<G: GaugeGroup>(
    cfg: &KernelConfig,
    lr1: &[f64],
    lr2: &[f64],
    lt: &[f64],
    aux_lt: &[f64],
    measurement: &mut [f64],
) {
    let local = &cfg.local;
    let owned = local.owned_sites();
    let slice = local.slice_sites();
    let axes = cfg.spatial_axes();
    let r = cfg.wilson_r;
    let values: Vec<f64> = (0..owned)
        .into_par_iter()
        .map(|i| {
            let mut sum = 0.0;
            for k in 0..axes {
                let far = if k == 0 {
                    let (xs, rest) = split(local, i);
                    let x = xs + r;
                    if !local.halo {
                        load::<G>(lt, (x % local.nx) * slice + rest)
                    } else if x < local.nx {
                        load::<G>(lt, x * slice + rest)
                    } else {
                        load::<G>(aux_lt, (x - local.nx) * slice + rest)
                    }
                } else {
                    let s = local.walk(local.stored_of_owned(i), k, r);
                    load::<G>(lt, s - local.left_sites())
                };
                let bottom: G = load(lr1, k * owned + i);
                let top: G = load(lr2, k * owned + i);
                let near: G = load(lt, i);
                sum += (bottom * far * top.adjoint() * near.adjoint()).re_trace_normalized();
            }
            sum / axes as f64
        })
        .collect();
    let padded = local.padded_sites();
    measurement[..owned].copy_from_slice(&values);
    measurement[owned..padded].fill(0.0);
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::{ParameterSet, RunParameters};
    use crate::group::su2::Su2;
    use crate::kernels::host::init;

    #[test]
    fn cold_wilson_loop_is_one() {
        let p = RunParameters::from_set(
            &ParameterSet::parse("GROUP=2\nLS=4\nLT=4\nGETWILSON\nWILSONR=2\nWILSONT=2\n")
                .expect("parse"),
        )
        .expect("params");
        let c = KernelConfig::new(&p, LocalGeometry::whole(&p.extents));
        let mut links = vec![0.0; c.links_len()];
        init::cold::<Su2>(&c, &mut links);
        let owned = c.local.owned_sites();
        let mut lt_buf = vec![0.0; owned * 4];
        let mut lr1 = vec![0.0; c.chain_len()];
        let mut lr2 = vec![0.0; c.chain_len()];
        lt::<Su2>(&c, &links, &mut lt_buf);
        chain::<Su2>(&c, &links, &[], &mut lr1, 0);
        chain::<Su2>(&c, &links, &[], &mut lr2, c.wilson_t);
        let mut m = vec![0.0; c.measurement_len()];
        accumulate::<Su2>(&c, &lr1, &lr2, &lt_buf, &[], &mut m);
        assert!(m[..owned].iter().all(|v| (v - 1.0).abs() < 1e-14));
    }
}

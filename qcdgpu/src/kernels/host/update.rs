// SPDX-License-Identifier: AGPL-3.0-only

//! Checkerboard heat-bath update of one direction.
//!
//! Sites of the requested parity (of the global coordinate sum) are updated
//! independently: every staple of such a link only reads links of the
//! other parity or other directions. New links are computed in parallel and
//! written after all reads have finished.

use rayon::prelude::*;

use crate::group::{heat_bath_uniforms, GaugeGroup};

use super::super::KernelConfig;
use super::field::{store, Field, Twist};

pub fn update<G: GaugeGroup>(
    cfg: &KernelConfig,
    links: &mut [f64],
    prns: &[f64],
    dir: usize,
    parity: usize,
) {
    let local = &cfg.local;
    let per_site = heat_bath_uniforms(G::SUBGROUPS, cfg.nhit);
    let updates: Vec<(usize, G)> = {
        let field = Field::<G>::new(local, Twist::from_config(cfg), links);
        (0..local.owned_sites())
            .into_par_iter()
            .filter_map(|i| {
                let s = local.stored_of_owned(i);
                if local.parity(s) != parity {
                    return None;
                }
                let at = (i / 2) * per_site;
                let uniforms = &prns[at..at + per_site];
                let u = field.link(s, dir);
                let staple = field.staple(s, dir);
                Some((s, u.heat_bath(staple, cfg.beta, uniforms, cfg.nhit)))
            })
            .collect()
    };
    let stored = local.stored_sites();
    for (s, u) in updates {
        store(links, stored, s, dir, u);
    }
}

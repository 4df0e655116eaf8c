// SPDX-License-Identifier: AGPL-3.0-only

//! Host recomputation of the last configuration's plaquette and action
//! from a global link table (no halo), used to cross-check device results.

use serde::Serialize;

use crate::geometry::LocalGeometry;
use crate::group::su2::Su2;
use crate::group::su3::Su3Matrix;
use crate::group::GaugeGroup;

use super::field::{planes, Field, Twist};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CpuCheck {
    pub plaquette_spatial: f64,
    pub plaquette_temporal: f64,
    pub action_spatial: f64,
    pub action_temporal: f64,
}

fn check<G: GaugeGroup>(full: &[usize], twist: Twist, beta: f64, links: &[f64]) -> CpuCheck {
    let geom = LocalGeometry::whole(full);
    let f = Field::<G>::new(&geom, twist, links);
    let (spatial, temporal) = planes(geom.nd());
    let average = |list: &[(usize, usize)]| {
        if list.is_empty() {
            return None;
        }
        let mut sum = 0.0;
        for s in 0..geom.stored_sites() {
            for &(mu, nu) in list {
                sum += f.plaquette_trace(s, mu, nu);
            }
        }
        Some(sum / (geom.stored_sites() * list.len()) as f64)
    };
    let ps = average(&spatial);
    let pt = average(&temporal);
    CpuCheck {
        plaquette_spatial: ps.unwrap_or(0.0),
        plaquette_temporal: pt.unwrap_or(0.0),
        action_spatial: ps.map_or(0.0, |p| beta * (1.0 - p)),
        action_temporal: pt.map_or(0.0, |p| beta * (1.0 - p)),
    }
}

/// Plaquette and action of a global link table of SU(`group`).
#[must_use]
pub fn cpu_check(group: usize, full: &[usize], twist: Twist, beta: f64, links: &[f64]) -> CpuCheck {
    if group == 2 {
        check::<Su2>(full, twist, beta, links)
    } else {
        check::<Su3Matrix>(full, twist, beta, links)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_links_have_unit_plaquette() {
        let full = [2, 2, 2, 2];
        let sites: usize = full.iter().product();
        let mut links = vec![0.0; 4 * sites * 4];
        for w in links.chunks_exact_mut(4) {
            Su2::IDENTITY.store(w);
        }
        let c = cpu_check(2, &full, Twist::default(), 2.3, &links);
        assert!((c.plaquette_spatial - 1.0).abs() < 1e-15);
        assert!((c.plaquette_temporal - 1.0).abs() < 1e-15);
        assert!(c.action_spatial.abs() < 1e-14);
    }
}

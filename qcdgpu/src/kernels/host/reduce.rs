// SPDX-License-Identifier: AGPL-3.0-only

//! Reduction kernels: scratch rows → one series row per iteration.
//!
//! Sums run sequentially in f64 so results do not depend on thread count.

use crate::error::{QcdError, Result};

use super::super::{KernelConfig, KernelName};

/// Where a reduction reads and writes.
struct Target {
    rows: std::ops::Range<usize>,
    width: usize,
    offset: usize,
    den: f64,
}

fn target(cfg: &KernelConfig, kernel: KernelName) -> Option<Vec<Target>> {
    let owned = cfg.local.owned_sites() as f64;
    let lt = cfg.local.full[cfg.local.time_axis()] as f64;
    let layout = &cfg.layout;
    let energies = |rows, offset| Target {
        rows,
        width: layout.energies_width,
        offset,
        den: owned,
    };
    let polyakov = |rows, offset| Target {
        rows,
        width: layout.polyakov_width,
        offset,
        den: owned / lt,
    };
    Some(match kernel {
        KernelName::ReducePlaquette => vec![Target {
            rows: 0..2,
            width: 2,
            offset: 0,
            den: owned,
        }],
        KernelName::ReduceAction => {
            let mut t = vec![energies(0..2, 0)];
            if let Some(off) = layout.tensor_offset {
                t.push(energies(2..8, off));
            }
            t
        }
        KernelName::ReduceActionDiff(k) => vec![energies(0..2, layout.diff_offset? + 2 * k)],
        KernelName::ReducePolyakov => vec![polyakov(0..3, 0)],
        KernelName::ReducePolyakovDiff(k) => vec![polyakov(0..2, 3 + 2 * k)],
        KernelName::ReduceWilson => vec![Target {
            rows: 0..1,
            width: 1,
            offset: 0,
            den: owned,
        }],
        _ => return None,
    })
}

pub fn reduce(
    cfg: &KernelConfig,
    kernel: KernelName,
    measurement: &[f64],
    series: &mut [f64],
    iteration: usize,
) -> Result<()> {
    let fail = |reason: String| QcdError::KernelRun {
        kernel: kernel.to_string(),
        reason,
    };
    let targets = target(cfg, kernel).ok_or_else(|| fail("not enabled in this program".into()))?;
    let padded = cfg.local.padded_sites();
    let owned = cfg.local.owned_sites();
    for t in targets {
        let base = iteration * t.width + t.offset;
        if base + t.rows.len() > series.len() {
            return Err(fail(format!(
                "iteration {iteration} outside series of {} words",
                series.len()
            )));
        }
        for (j, row) in t.rows.enumerate() {
            let sum: f64 = measurement[row * padded..row * padded + owned].iter().sum();
            series[base + j] = sum / t.den;
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::{ParameterSet, RunParameters};
    use crate::geometry::LocalGeometry;

    #[test]
    fn reduce_writes_iteration_row() {
        let p = RunParameters::from_set(
            &ParameterSet::parse("GROUP=2\nLS=2\nLT=2\nTURNOFFFMUNU\n").expect("parse"),
        )
        .expect("params");
        let c = KernelConfig::new(&p, LocalGeometry::whole(&p.extents));
        let owned = c.local.owned_sites();
        let padded = c.local.padded_sites();
        let mut m = vec![0.0; c.measurement_len()];
        m[..owned].fill(0.5);
        m[padded..padded + owned].fill(0.25);
        let mut series = vec![0.0; 2 * p.iter];
        reduce(&c, KernelName::ReducePlaquette, &m, &mut series, 3).expect("reduce");
        assert!((series[6] - 0.5).abs() < 1e-15);
        assert!((series[7] - 0.25).abs() < 1e-15);
        assert!(reduce(&c, KernelName::ReducePlaquette, &m, &mut series, p.iter).is_err());
    }

    #[test]
    fn disabled_reduction_is_an_error() {
        let p = RunParameters::from_set(&ParameterSet::parse("GROUP=2\n").expect("parse"))
            .expect("params");
        let c = KernelConfig::new(&p, LocalGeometry::whole(&p.extents));
        let m = vec![0.0; c.measurement_len()];
        let mut s = vec![0.0; 64];
        assert!(reduce(&c, KernelName::ReduceActionDiff(0), &m, &mut s, 0).is_err());
    }
}

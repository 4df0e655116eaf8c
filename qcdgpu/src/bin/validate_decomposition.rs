// SPDX-License-Identifier: AGPL-3.0-only

//! Decomposition, checkpoint and physics validation on the host device.
//!
//! | Check | Configuration | Expectation |
//! |-------|---------------|-------------|
//! | cold start | SU(3) 4⁴, no sweeps | P = 1, S = 0 |
//! | N = 1 partition | SU(2) 4⁴ hot, PARTS=1 vs undecomposed | identical series |
//! | Wilson across parts | SU(3) 8×4³ group-id, PARTSIZE=4,4 vs whole | W(2,2) equal |
//! | checkpoint | SU(2) 4⁴ double | save → load bit-exact |
//! | host recomputation | SU(2) 4⁴ | last plaquette matches |
//! | physics window | SU(2) β = 2.3, NAV=10, ITER=5, NITER=2 | deterministic, P in window |
//! | recorded run | same, PRNG=LCG, RANDSERIES=7 | P matches the recorded value |
//!
//! Exit code 0 only if every check passes.

use std::path::{Path, PathBuf};

use qcdgpu::analysis::{aggregate, DataAnalysis};
use qcdgpu::checkpoint::Checkpoint;
use qcdgpu::config::ParameterSet;
use qcdgpu::sublattice::Series;
use qcdgpu::tolerances::{
    AGGREGATE_ABS, COLD_ACTION_ABS, COLD_PLAQUETTE_ABS, DECOMPOSITION_PARITY_F64,
    GOLDEN_PLAQUETTE_REL, HOST_CHECK_F64, SU2_BETA23_GOLDEN_PLAQUETTE, SU2_BETA23_PLAQUETTE_MAX,
    SU2_BETA23_PLAQUETTE_MIN, WILSON_SPLIT_PARITY,
};
use qcdgpu::validation::ValidationHarness;
use qcdgpu::{LatticeController, Result};

fn simulate(text: &str, dir: &Path) -> Result<LatticeController> {
    let full = format!(
        "PLATFORM=0\nTURNOFFWAITING\nFINALSAVE=0\nOUTPUTPATH={}\n{text}",
        dir.display()
    );
    let mut c = LatticeController::configure(&ParameterSet::parse(&full)?)?;
    c.run()?;
    Ok(c)
}

fn record<'a>(c: &'a LatticeController, label: &str) -> Option<&'a DataAnalysis> {
    c.records().iter().find(|r| r.label == label)
}

fn last(c: &LatticeController, label: &str) -> f64 {
    record(c, label).map_or(f64::NAN, |r| r.last)
}

fn series(c: &LatticeController, s: Series) -> Vec<f64> {
    c.aggregator().map(|a| a.series(s).to_vec()).unwrap_or_default()
}

fn max_diff(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() {
        return f64::INFINITY;
    }
    a.iter().zip(b).map(|(x, y)| (x - y).abs()).fold(0.0, f64::max)
}

fn scratch_dir(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("qcdgpu-validate-{}-{name}", std::process::id()))
}

fn main() {
    let mut h = ValidationHarness::new("decomposition");
    println!("qcdgpu decomposition validation (host device)");

    let agg = aggregate(&[vec![0.25, 1.0], vec![0.75, 3.0]], &[4, 4], 8).unwrap_or_default();
    h.check_abs("equal parts average", agg.first().copied().unwrap_or(f64::NAN), 0.5, AGGREGATE_ABS);

    match simulate("GROUP=3\nNAV=0\nITER=1\n", &scratch_dir("cold")) {
        Ok(c) => {
            h.check_abs("cold plaquette", last(&c, "plaquette"), 1.0, COLD_PLAQUETTE_ABS);
            h.check_abs("cold action", last(&c, "action"), 0.0, COLD_ACTION_ABS);
        }
        Err(e) => {
            println!("cold run failed: {e}");
            h.check_bool("cold run", false);
        }
    }

    let hot = "GROUP=2\nINTS=0\nNAV=2\nITER=3\nBETA=2.3\nRANDSERIES=5\n";
    let whole = simulate(hot, &scratch_dir("whole"));
    let one_part = simulate(&format!("{hot}PARTS=1\n"), &scratch_dir("parts1"));
    match (&whole, &one_part) {
        (Ok(a), Ok(b)) => {
            let d = max_diff(&series(a, Series::Energies), &series(b, Series::Energies));
            h.check_upper("PARTS=1 equals undecomposed", d, DECOMPOSITION_PARITY_F64);
            let d = max_diff(&series(a, Series::Plaquettes), &series(b, Series::Plaquettes));
            h.check_upper("PARTS=1 plaquette series", d, DECOMPOSITION_PARITY_F64);
        }
        _ => h.check_bool("N = 1 runs", false),
    }
    if let Ok(a) = &whole {
        let host = record(a, "plaquette").and_then(|r| r.cpu_last).unwrap_or(f64::NAN);
        h.check_abs("host recomputation", last(a, "plaquette"), host, HOST_CHECK_F64);
    }

    let gid = "GROUP=3\nINTS=2\nL1=8\nNAV=0\nITER=1\nGETWILSON\nWILSONR=2\nWILSONT=2\n";
    let w_whole = simulate(gid, &scratch_dir("gid-whole"));
    let w_split = simulate(&format!("{gid}PARTSIZE=4,4\n"), &scratch_dir("gid-split"));
    match (&w_whole, &w_split) {
        (Ok(a), Ok(b)) => {
            h.check_abs("Wilson loop across parts", last(b, "W(2,2)"), last(a, "W(2,2)"), WILSON_SPLIT_PARITY);
            h.check_abs("plaquette across parts", last(b, "plaquette"), last(a, "plaquette"), WILSON_SPLIT_PARITY);
        }
        _ => h.check_bool("group-id runs", false),
    }

    let dir = scratch_dir("checkpoint");
    match simulate("GROUP=2\nINTS=0\nNAV=1\nITER=2\nFINALSAVE=1\n", &dir) {
        Ok(mut c) => match Checkpoint::load(&c.params().checkpoint_path()) {
            Ok(cp) => {
                let live = c.snapshot();
                h.check_bool("checkpoint round trip", live.is_ok_and(|s| s == cp));
                h.check_bool("checkpoint counters", cp.header.iter_counter == 2 && cp.header.nav_counter == 1);
            }
            Err(e) => {
                println!("checkpoint load failed: {e}");
                h.check_bool("checkpoint load", false);
            }
        },
        Err(e) => {
            println!("checkpoint run failed: {e}");
            h.check_bool("checkpoint run", false);
        }
    }

    let physics = "GROUP=2\nINTS=1\nBETA=2.3\nNAV=10\nITER=5\nNITER=2\n";
    let first = simulate(physics, &scratch_dir("physics-a"));
    let second = simulate(physics, &scratch_dir("physics-b"));
    match (&first, &second) {
        (Ok(a), Ok(b)) => {
            let d = max_diff(&series(a, Series::Plaquettes), &series(b, Series::Plaquettes));
            h.check_bool("deterministic rerun", d == 0.0);
            let mean = record(a, "plaquette").map_or(f64::NAN, |r| r.mean);
            h.check_lower("SU(2) β=2.3 plaquette lower", mean, SU2_BETA23_PLAQUETTE_MIN);
            h.check_upper("SU(2) β=2.3 plaquette upper", mean, SU2_BETA23_PLAQUETTE_MAX);
        }
        _ => h.check_bool("physics runs", false),
    }

    match simulate(&format!("{physics}PRNG=LCG\nRANDSERIES=7\n"), &scratch_dir("golden")) {
        Ok(c) => {
            let mean = record(&c, "plaquette").map_or(f64::NAN, |r| r.mean);
            h.check_rel(
                "SU(2) β=2.3 recorded plaquette",
                mean,
                SU2_BETA23_GOLDEN_PLAQUETTE,
                GOLDEN_PLAQUETTE_REL,
            );
        }
        Err(e) => {
            println!("recorded run failed: {e}");
            h.check_bool("recorded run", false);
        }
    }

    for name in ["cold", "whole", "parts1", "gid-whole", "gid-split", "checkpoint", "physics-a", "physics-b", "golden"] {
        let _ = std::fs::remove_dir_all(scratch_dir(name));
    }
    h.finish();
}

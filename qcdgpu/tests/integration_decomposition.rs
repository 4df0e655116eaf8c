// SPDX-License-Identifier: AGPL-3.0-only

//! Integration tests: axis-0 decomposition end-to-end on the host device.
//!
//! Runs small lattices through the full controller pipeline and checks that
//! splitting the lattice changes nothing a measurement can see.

use qcdgpu::analysis::{aggregate, DataAnalysis};
use qcdgpu::config::ParameterSet;
use qcdgpu::geometry::{even_split, Geometry};
use qcdgpu::sublattice::Series;
use qcdgpu::tolerances;
use qcdgpu::{LatticeController, QcdError, RunState};

fn run(text: &str) -> (LatticeController, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let full = format!(
        "PLATFORM=0\nTURNOFFWAITING\nFINALSAVE=0\nOUTPUTPATH={}\n{text}",
        dir.path().display()
    );
    let mut c = LatticeController::configure(&ParameterSet::parse(&full).expect("parse"))
        .expect("configure");
    assert_eq!(c.run().expect("run"), RunState::Done);
    (c, dir)
}

fn record<'a>(c: &'a LatticeController, label: &str) -> &'a DataAnalysis {
    c.records()
        .iter()
        .find(|r| r.label == label)
        .unwrap_or_else(|| panic!("no record {label}"))
}

fn series(c: &LatticeController, s: Series) -> Vec<f64> {
    c.aggregator().expect("aggregator").series(s).to_vec()
}

#[test]
fn part_extents_cover_axis_zero() {
    for (l0, n) in [(8, 2), (12, 5), (16, 3), (4, 2), (10, 1)] {
        let g = Geometry::split_even(vec![l0, 4, 4, 4], n).expect("split");
        assert_eq!(g.extents().iter().sum::<usize>(), l0, "L0={l0}, N={n}");
        assert!(g.extents().iter().all(|nx| nx % 2 == 0 && *nx > 0));
        let mut x0 = 0;
        for p in &g.parts {
            assert_eq!(p.x0, x0, "parts are contiguous");
            x0 += p.nx;
        }
    }
}

#[test]
fn too_many_parts_is_rejected() {
    assert!(matches!(even_split(4, 3), Err(QcdError::Geometry(_))));
    assert!(matches!(
        Geometry::new(vec![8, 4, 4, 4], &[4, 2]),
        Err(QcdError::Geometry(_))
    ));
    assert!(matches!(
        Geometry::new(vec![8, 4, 4, 4], &[5, 3]),
        Err(QcdError::Geometry(_))
    ));
}

#[test]
fn equal_parts_aggregate_to_plain_average() {
    let parts = vec![vec![0.5, 2.0, -1.0], vec![0.25, 4.0, 1.0], vec![0.75, 0.0, 3.0]];
    let agg = aggregate(&parts, &[4, 4, 4], 12).expect("aggregate");
    for (col, want) in [0.5, 2.0, 1.0].iter().enumerate() {
        assert!(
            (agg[col] - want).abs() < tolerances::AGGREGATE_ABS,
            "column {col}: {} vs {want}",
            agg[col]
        );
    }
}

#[test]
fn unequal_parts_weight_by_slab() {
    let agg = aggregate(&[vec![1.0], vec![0.0]], &[6, 2], 8).expect("aggregate");
    assert!((agg[0] - 0.75).abs() < tolerances::AGGREGATE_ABS);
}

#[test]
fn single_part_matches_undecomposed_run() {
    let hot = "GROUP=2\nINTS=0\nNAV=2\nITER=3\nBETA=2.3\nRANDSERIES=7\n";
    let (whole, _d1) = run(hot);
    let (one, _d2) = run(&format!("{hot}PARTS=1\n"));
    assert_eq!(whole.backend().expect("backend").strategy(), "single-device");
    assert_eq!(one.backend().expect("backend").strategy(), "multi-partition");
    for s in [Series::Energies, Series::Plaquettes] {
        let a = series(&whole, s);
        let b = series(&one, s);
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(&b) {
            assert!(
                (x - y).abs() < tolerances::DECOMPOSITION_PARITY_F64,
                "{s:?}: {x} vs {y}"
            );
        }
    }
}

#[test]
fn cold_start_split_over_parts_is_exact() {
    let (c, _d) = run("GROUP=3\nL1=8\nNAV=0\nITER=1\nPARTS=2\n");
    assert_eq!(c.geometry().expect("geometry").extents(), vec![4, 4]);
    let p = record(&c, "plaquette").last;
    let s = record(&c, "action").last;
    assert!((p - 1.0).abs() < tolerances::COLD_PLAQUETTE_ABS, "plaquette {p}");
    assert!(s.abs() < tolerances::COLD_ACTION_ABS, "action {s}");
}

#[test]
fn wilson_loop_crosses_part_boundary() {
    let gid = "GROUP=3\nINTS=2\nL1=8\nNAV=0\nITER=1\nGETWILSON\nWILSONR=2\nWILSONT=2\n";
    let (whole, _d1) = run(gid);
    let (split, _d2) = run(&format!("{gid}PARTSIZE=4,4\n"));
    for label in ["W(2,2)", "plaquette"] {
        let a = record(&whole, label).last;
        let b = record(&split, label).last;
        assert!(
            (a - b).abs() < tolerances::WILSON_SPLIT_PARITY,
            "{label}: whole {a}, split {b}"
        );
    }
}

#[test]
fn edge_synchronization_is_idempotent() {
    let (mut c, _d) = run("GROUP=2\nINTS=0\nNAV=1\nITER=2\nPARTS=2\n");
    let before = c.snapshot().expect("snapshot");
    for _ in 0..2 {
        for dir in 0..4 {
            c.synchronize_edges(dir).expect("sync");
        }
    }
    let after = c.snapshot().expect("snapshot");
    assert_eq!(before.links, after.links);
    assert_eq!(before.scratch, after.scratch);
}

#[test]
fn host_check_matches_last_row() {
    let (c, _d) = run("GROUP=2\nINTS=0\nNAV=2\nITER=2\nBETA=2.3\nPARTS=2\n");
    let r = record(&c, "plaquette");
    let host = r.cpu_last.expect("host value");
    assert!(
        (r.last - host).abs() < tolerances::HOST_CHECK_F64,
        "device {} vs host {host}",
        r.last
    );
}

#[test]
fn host_check_with_f32_links() {
    let (c, _d) = run("GROUP=3\nINTS=0\nNAV=1\nITER=2\nBETA=5.7\nPRECISION=mixed\nPARTS=2\n");
    let r = record(&c, "plaquette");
    let host = r.cpu_last.expect("host value");
    assert!(
        (r.last - host).abs() < tolerances::HOST_CHECK_F32,
        "device {} vs host {host}",
        r.last
    );
}

#[test]
fn report_is_written() {
    let (c, dir) = run("GROUP=2\nNAV=0\nITER=1\n");
    let path = c.report_path().expect("report path");
    assert!(path.starts_with(dir.path()));
    let text = std::fs::read_to_string(path).expect("report");
    assert!(text.contains("plaquette"));
}

// SPDX-License-Identifier: AGPL-3.0-only

//! Integration tests: checkpoint save, load and resume.
//!
//! An interrupted run resumed from its checkpoint must reproduce the run
//! that was never interrupted, and a checkpoint of another lattice must be
//! refused before any state is touched.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use qcdgpu::checkpoint::Checkpoint;
use qcdgpu::config::ParameterSet;
use qcdgpu::sublattice::Series;
use qcdgpu::{LatticeController, QcdError, RunState};
use tracing::field::{Field, Visit};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

const RUN: &str = "GROUP=2\nINTS=0\nNAV=2\nITER=4\nNITER=2\nBETA=2.2\nRANDSERIES=11\n";

fn controller(dir: &Path, text: &str) -> LatticeController {
    let full = format!(
        "PLATFORM=0\nTURNOFFWAITING\nOUTPUTPATH={}\n{text}",
        dir.display()
    );
    LatticeController::configure(&ParameterSet::parse(&full).expect("parse")).expect("configure")
}

fn plaquettes(c: &LatticeController) -> Vec<f64> {
    c.aggregator().expect("aggregator").series(Series::Plaquettes).to_vec()
}

#[test]
fn final_checkpoint_matches_live_state() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut c = controller(dir.path(), RUN);
    assert_eq!(c.run().expect("run"), RunState::Done);

    let saved = Checkpoint::load(&c.params().checkpoint_path()).expect("load");
    let live = c.snapshot().expect("snapshot");
    assert_eq!(saved, live);
    assert_eq!(saved.header.nav_counter, 2);
    assert_eq!(saved.header.iter_counter, 4);
    assert!(saved.header.initialized);

    let bytes = saved.to_bytes().expect("encode");
    let back = Checkpoint::from_bytes(&bytes, Path::new("memory")).expect("decode");
    assert_eq!(back, saved);
}

#[test]
fn interrupted_run_resumes_identically() {
    let straight_dir = tempfile::tempdir().expect("tempdir");
    let mut straight = controller(straight_dir.path(), RUN);
    straight.run().expect("straight run");

    let dir = tempfile::tempdir().expect("tempdir");
    let mut first = controller(dir.path(), RUN);
    first.shutdown_handle().store(true, Ordering::Relaxed);
    assert_eq!(first.run().expect("interrupted run"), RunState::Interrupted);
    assert!(first.params().checkpoint_path().exists());
    assert_eq!(first.iter_counter(), 1);

    let mut resumed = controller(dir.path(), &format!("{RUN}RESUME=1\n"));
    assert_eq!(resumed.run().expect("resumed run"), RunState::Done);
    assert_eq!(resumed.nav_counter(), 2);
    assert_eq!(resumed.iter_counter(), 4);
    assert_eq!(plaquettes(&straight), plaquettes(&resumed));

    let a = straight.snapshot().expect("snapshot");
    let b = resumed.snapshot().expect("snapshot");
    assert_eq!(a.links, b.links);
    assert_eq!(a.header.prng_counter, b.header.prng_counter);
}

/// Raises the shutdown flag once production row `row` is aggregated.
struct StopAfterRow {
    row: u64,
    flag: Arc<AtomicBool>,
}

struct Iteration(Option<u64>);

impl Visit for Iteration {
    fn record_u64(&mut self, field: &Field, value: u64) {
        if field.name() == "iteration" {
            self.0 = Some(value);
        }
    }

    fn record_debug(&mut self, _field: &Field, _value: &dyn std::fmt::Debug) {}
}

impl<S: tracing::Subscriber> Layer<S> for StopAfterRow {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut it = Iteration(None);
        event.record(&mut it);
        if it.0 == Some(self.row) {
            self.flag.store(true, Ordering::Relaxed);
        }
    }
}

#[test]
fn two_part_run_stopped_in_production_resumes_identically() {
    let run = format!("{RUN}PARTS=2\n");
    let straight_dir = tempfile::tempdir().expect("tempdir");
    let mut straight = controller(straight_dir.path(), &run);
    assert_eq!(straight.run().expect("straight run"), RunState::Done);

    let dir = tempfile::tempdir().expect("tempdir");
    let mut first = controller(dir.path(), &run);
    let stop = StopAfterRow {
        row: 2,
        flag: first.shutdown_handle(),
    };
    let state = tracing::subscriber::with_default(tracing_subscriber::registry().with(stop), || {
        first.run().expect("interrupted run")
    });
    assert_eq!(state, RunState::Interrupted);
    assert_eq!(first.nav_counter(), 2);
    assert_eq!(first.iter_counter(), 3);
    let saved = Checkpoint::load(&first.params().checkpoint_path()).expect("load");
    assert_eq!(saved.header.parts, vec![2, 2]);
    assert_eq!(saved.header.iter_counter, 3);

    let mut resumed = controller(dir.path(), &format!("{run}RESUME=1\n"));
    assert_eq!(resumed.run().expect("resumed run"), RunState::Done);
    assert_eq!(resumed.iter_counter(), 4);
    assert_eq!(plaquettes(&straight), plaquettes(&resumed));

    let a = straight.snapshot().expect("snapshot");
    let b = resumed.snapshot().expect("snapshot");
    assert_eq!(a.links, b.links);
    assert_eq!(a.header.prng_counter, b.header.prng_counter);
}

#[test]
fn resume_without_checkpoint_starts_fresh() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut c = controller(dir.path(), &format!("{RUN}RESUME=1\nFINALSAVE=0\n"));
    assert_eq!(c.run().expect("run"), RunState::Done);
    assert_eq!(c.iter_counter(), 4);
    assert!(!c.params().checkpoint_path().exists());
}

#[test]
fn checkpoint_of_other_lattice_is_refused() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut c = controller(dir.path(), RUN);
    c.run().expect("run");

    let mut other = controller(dir.path(), &format!("{RUN}L1=8\nRESUME=1\n"));
    other.init_devices().expect("devices");
    other.compute_geometry().expect("geometry");
    assert!(matches!(other.create_buffers(), Err(QcdError::Geometry(_))));

    let mut su3 = controller(dir.path(), "GROUP=3\nRESUME=1\n");
    assert!(matches!(su3.run(), Err(QcdError::Geometry(_))));
}

#[test]
fn corrupt_prefix_is_fatal() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut c = controller(dir.path(), RUN);
    c.run().expect("run");

    let path = c.params().checkpoint_path();
    let mut bytes = std::fs::read(&path).expect("read");
    bytes[0] ^= 0xff;
    std::fs::write(&path, &bytes).expect("write");

    let err = Checkpoint::load(&path).expect_err("prefix");
    assert!(matches!(err, QcdError::CheckpointMismatch { .. }));
    assert!(err.is_fatal());
}

#[test]
fn truncated_checkpoint_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut c = controller(dir.path(), RUN);
    c.run().expect("run");

    let path = c.params().checkpoint_path();
    let bytes = std::fs::read(&path).expect("read");
    std::fs::write(&path, &bytes[..bytes.len() / 2]).expect("write");
    assert!(matches!(Checkpoint::load(&path), Err(QcdError::Checkpoint(_))));
}

// SPDX-License-Identifier: AGPL-3.0-only

//! Run controller: devices, geometry, programs and the simulation state
//! machine.
//!
//! ```text
//! Uninit ─create_buffers─▶ BuffersReady ─build_programs─▶ ProgramsReady
//!   ─run_simulation─▶ InitializedConfig ─▶ Thermalizing ─▶ Producing ─▶ Done
//!                                              └────── shutdown ──────▶ Interrupted
//! ```
//!
//! A sweep updates every direction: for each `dir`, odd then even sites,
//! each followed by an edge synchronization of `dir`. Every sweep ends
//! with a Gram-Schmidt projection. Production row 0 is the initial
//! configuration; rows `1..ITER` follow `NITER` sweeps each.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use qcdgpu_forge::dispatch::{self, profiles};
use qcdgpu_forge::inventory;
use qcdgpu_forge::substrate::SubstrateKind;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::analysis::{apply_cpu_check, register, DataAnalysis, ObservableAggregator};
use crate::backend::{LatticeBackend, MultiPartition, SingleDevice};
use crate::checkpoint::{Checkpoint, CheckpointHeader};
use crate::config::{Decomposition, ParameterSet, Platform, RunParameters, StartMode};
use crate::constants::DEFAULT_WORKGROUP;
use crate::device::{DeviceBackend, HostDevice, WgpuDevice};
use crate::error::{QcdError, Result};
use crate::geometry::Geometry;
use crate::kernels::host::cpu_check::{cpu_check, CpuCheck};
use crate::kernels::host::field::Twist;
use crate::kernels::{KernelConfig, MeasurementLayout};
use crate::prng::PrngStream;
use crate::report;
use crate::sublattice::{Series, SubLattice};

/// Controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    Uninit,
    BuffersReady,
    ProgramsReady,
    InitializedConfig,
    Thermalizing,
    Producing,
    Done,
    /// Stopped at a boundary by the shutdown flag; a checkpoint was written.
    Interrupted,
}

/// Drives one simulation from configuration to report.
pub struct LatticeController {
    params: RunParameters,
    state: RunState,
    devices: Vec<Box<dyn DeviceBackend>>,
    placement: Vec<usize>,
    geometry: Option<Geometry>,
    workgroup: usize,
    halo: bool,
    backend: Option<Box<dyn LatticeBackend>>,
    layout: Option<MeasurementLayout>,
    aggregator: Option<ObservableAggregator>,
    records: Vec<DataAnalysis>,
    resume: Option<Checkpoint>,
    initialized: bool,
    nav_counter: usize,
    iter_counter: usize,
    shutdown: Arc<AtomicBool>,
    last_save: Instant,
    cpu: Option<CpuCheck>,
    started: DateTime<Local>,
    report_path: Option<PathBuf>,
}

impl LatticeController {
    /// Parse and validate a parameter set.
    ///
    /// # Errors
    ///
    /// [`QcdError::Config`] for unknown keys or invalid values.
    pub fn configure(set: &ParameterSet) -> Result<Self> {
        Ok(Self::new(RunParameters::from_set(set)?))
    }

    #[must_use]
    pub fn new(params: RunParameters) -> Self {
        let halo = !matches!(params.decomposition, Decomposition::Auto)
            || (params.platform.is_some() && params.devices.len() > 1);
        Self {
            params,
            state: RunState::Uninit,
            devices: Vec::new(),
            placement: Vec::new(),
            geometry: None,
            workgroup: DEFAULT_WORKGROUP,
            halo,
            backend: None,
            layout: None,
            aggregator: None,
            records: Vec::new(),
            resume: None,
            initialized: false,
            nav_counter: 0,
            iter_counter: 0,
            shutdown: Arc::new(AtomicBool::new(false)),
            last_save: Instant::now(),
            cpu: None,
            started: Local::now(),
            report_path: None,
        }
    }

    #[must_use]
    pub const fn params(&self) -> &RunParameters {
        &self.params
    }

    #[must_use]
    pub const fn state(&self) -> RunState {
        self.state
    }

    #[must_use]
    pub const fn geometry(&self) -> Option<&Geometry> {
        self.geometry.as_ref()
    }

    #[must_use]
    pub const fn nav_counter(&self) -> usize {
        self.nav_counter
    }

    /// Completed sample rows, row 0 included.
    #[must_use]
    pub const fn iter_counter(&self) -> usize {
        self.iter_counter
    }

    #[must_use]
    pub fn records(&self) -> &[DataAnalysis] {
        &self.records
    }

    #[must_use]
    pub const fn aggregator(&self) -> Option<&ObservableAggregator> {
        self.aggregator.as_ref()
    }

    #[must_use]
    pub const fn cpu_check(&self) -> Option<CpuCheck> {
        self.cpu
    }

    #[must_use]
    pub const fn started(&self) -> DateTime<Local> {
        self.started
    }

    /// Text report written at finalize.
    #[must_use]
    pub const fn report_path(&self) -> Option<&PathBuf> {
        self.report_path.as_ref()
    }

    #[must_use]
    pub fn backend(&self) -> Option<&dyn LatticeBackend> {
        self.backend.as_deref()
    }

    /// Flag checked at sweep and iteration boundaries. Raising it makes the
    /// run save a checkpoint and stop in [`RunState::Interrupted`].
    #[must_use]
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    fn require(&self, state: RunState, op: &str) -> Result<()> {
        if self.state == state {
            Ok(())
        } else {
            Err(QcdError::State(format!("{op} needs {state:?}, controller is {:?}", self.state)))
        }
    }

    fn backend_mut(&mut self) -> Result<&mut Box<dyn LatticeBackend>> {
        self.backend
            .as_mut()
            .ok_or_else(|| QcdError::State("buffers are not created".into()))
    }

    fn part_count(&self) -> usize {
        match &self.params.decomposition {
            Decomposition::Auto if self.params.platform.is_some() => self.params.devices.len().max(1),
            Decomposition::Auto => 1,
            Decomposition::Parts(n) => *n,
            Decomposition::Extents(v) => v.len(),
        }
    }

    fn open(&self, platform: Platform, index: usize) -> Result<Box<dyn DeviceBackend>> {
        match platform {
            Platform::Host => Ok(Box::new(HostDevice::new(index))),
            Platform::Wgpu => {
                let path = self.params.kernel_path.as_deref().ok_or_else(|| {
                    QcdError::config("PLATFORM=1 needs KERNELPATH with the lattice programs")
                })?;
                Ok(Box::new(WgpuDevice::open(Some(index), path, self.params.rebuild_binary)?))
            }
        }
    }

    /// Open the devices and place every part on one of them.
    ///
    /// With `PLATFORM` set, the `DEVICE` list is assigned round-robin to
    /// parts. Otherwise the inventory routes every part; GPUs qualify only
    /// when `KERNELPATH` is set.
    ///
    /// # Errors
    ///
    /// [`QcdError::NoDevice`] if nothing can run the kernels, device errors
    /// from opening adapters.
    pub fn init_devices(&mut self) -> Result<()> {
        self.require(RunState::Uninit, "init_devices")?;
        let parts = self.part_count();
        let mut opened: Vec<(String, Box<dyn DeviceBackend>)> = Vec::new();
        let mut placement = Vec::with_capacity(parts);

        if let Some(platform) = self.params.platform {
            let list = if self.params.devices.is_empty() {
                vec![0]
            } else {
                self.params.devices.clone()
            };
            let mut ids: Vec<usize> = Vec::new();
            for k in 0..parts {
                let id = list[k % list.len()];
                let slot = ids.iter().position(|&d| d == id).unwrap_or_else(|| {
                    ids.push(id);
                    ids.len() - 1
                });
                placement.push(slot);
            }
            for id in ids {
                let dev = self.open(platform, id)?;
                opened.push((dev.name(), dev));
            }
        } else {
            let substrates = inventory::discover_with_kernels(self.params.kernel_path.is_some());
            let workload = if self.params.precision.links_f64() {
                profiles::lattice_double()
            } else {
                profiles::lattice_single()
            };
            let decisions = dispatch::route_all(&workload, &substrates, parts).ok_or_else(|| {
                QcdError::NoDevice(format!("no substrate can run `{}`", workload.name))
            })?;
            let mut chosen: Vec<usize> = Vec::new();
            for (k, d) in decisions.iter().enumerate() {
                debug!(part = k, substrate = %d.substrate.identity.name, reason = ?d.reason, "routed");
                let slot = chosen.iter().position(|&i| i == d.index).unwrap_or_else(|| {
                    chosen.push(d.index);
                    chosen.len() - 1
                });
                placement.push(slot);
            }
            for &i in &chosen {
                let s = &substrates[i];
                let dev = match s.kind {
                    SubstrateKind::Gpu => self.open(Platform::Wgpu, s.identity.adapter_index.unwrap_or(0))?,
                    SubstrateKind::Cpu => self.open(Platform::Host, 0)?,
                };
                opened.push((s.identity.name.clone(), dev));
            }
            if let Some(d) = dispatch::route(&profiles::cpu_check(), &substrates) {
                debug!(substrate = %d.substrate.identity.name, "host check routed");
            }
        }

        for (label, dev) in &opened {
            info!(device = %dev.name(), substrate = %label, "device opened");
        }
        self.devices = opened.into_iter().map(|(_, d)| d).collect();
        self.placement = placement;
        self.halo |= parts > 1;
        Ok(())
    }

    /// Split the lattice and fix the workgroup every size is rounded to.
    ///
    /// # Errors
    ///
    /// [`QcdError::Geometry`] for an invalid decomposition,
    /// [`QcdError::State`] before [`Self::init_devices`].
    pub fn compute_geometry(&mut self) -> Result<()> {
        self.require(RunState::Uninit, "compute_geometry")?;
        if self.devices.is_empty() {
            return Err(QcdError::State("compute_geometry before init_devices".into()));
        }
        let full = self.params.extents.clone();
        let geometry = match &self.params.decomposition {
            Decomposition::Extents(v) => Geometry::new(full, v)?,
            _ => Geometry::split_even(full, self.part_count())?,
        };
        self.workgroup = self
            .devices
            .iter()
            .map(|d| d.preferred_workgroup())
            .min()
            .unwrap_or(DEFAULT_WORKGROUP)
            .max(1);
        info!(
            extents = ?geometry.full,
            parts = ?geometry.extents(),
            halo = self.halo,
            workgroup = self.workgroup,
            "geometry"
        );
        self.geometry = Some(geometry);
        Ok(())
    }

    /// Allocate every part's buffers. With `RESUME` set, an existing
    /// checkpoint is loaded and checked against the run.
    ///
    /// # Errors
    ///
    /// Device allocation errors and checkpoint errors.
    pub fn create_buffers(&mut self) -> Result<()> {
        self.require(RunState::Uninit, "create_buffers")?;
        if self.geometry.is_none() {
            if self.devices.is_empty() {
                self.init_devices()?;
            }
            self.compute_geometry()?;
        }
        let geometry = self
            .geometry
            .clone()
            .ok_or_else(|| QcdError::State("geometry missing".into()))?;
        let p = &self.params;
        let parts: Vec<SubLattice> = geometry
            .parts
            .iter()
            .map(|part| {
                let cfg = KernelConfig::new(p, geometry.local(part.index, self.halo, self.workgroup));
                let prng = PrngStream::new(
                    p.prng,
                    p.rand_series.wrapping_add(part.index as u32),
                    p.prng_skip,
                    cfg.prns_len,
                    SubLattice::prng_precision(p.precision),
                );
                SubLattice::new(*part, cfg, p.iter, prng)
            })
            .collect();
        let cfg0 = parts
            .first()
            .map(|s| s.config().clone())
            .ok_or_else(|| QcdError::Geometry("no parts".into()))?;

        let devices = std::mem::take(&mut self.devices);
        let mut backend: Box<dyn LatticeBackend> = if self.halo {
            Box::new(MultiPartition::new(geometry.clone(), devices, parts, &self.placement)?)
        } else {
            let device = devices
                .into_iter()
                .next()
                .ok_or_else(|| QcdError::NoDevice("no device opened".into()))?;
            let part = parts
                .into_iter()
                .next()
                .ok_or_else(|| QcdError::Geometry("no parts".into()))?;
            Box::new(SingleDevice::new(geometry.clone(), device, part))
        };
        backend.fan_out(&|dev, part| part.create_buffers(dev))?;
        info!(strategy = backend.strategy(), devices = ?backend.device_names(), "buffers created");

        self.aggregator = Some(ObservableAggregator::new(&geometry, &cfg0, p.iter));
        self.records = register(&cfg0);
        self.layout = Some(cfg0.layout);
        self.backend = Some(backend);
        self.state = RunState::BuffersReady;

        if self.params.resume {
            let path = self.params.checkpoint_path();
            if path.exists() {
                self.checkpoint_load()?;
            } else {
                info!(path = %path.display(), "no checkpoint to resume, fresh start");
            }
        }
        Ok(())
    }

    /// Build the lattice program and kernels on every part.
    ///
    /// # Errors
    ///
    /// [`QcdError::KernelBuild`] (fatal).
    pub fn build_programs(&mut self) -> Result<()> {
        self.require(RunState::BuffersReady, "build_programs")?;
        self.backend_mut()?.fan_out(&|dev, part| part.build(dev))?;
        info!(group = self.params.group, nd = self.params.nd, "programs built");
        self.state = RunState::ProgramsReady;
        Ok(())
    }

    /// Refresh ghost slices of direction `dir` on every part.
    ///
    /// # Errors
    ///
    /// Propagates device failures.
    pub fn synchronize_edges(&mut self, dir: usize) -> Result<()> {
        self.backend_mut()?.synchronize_edges(dir)
    }

    fn synchronize_all(&mut self) -> Result<()> {
        for dir in 0..self.params.nd {
            self.synchronize_edges(dir)?;
        }
        Ok(())
    }

    fn sweep(&mut self) -> Result<()> {
        for dir in 0..self.params.nd {
            for parity in [1, 0] {
                self.backend_mut()?
                    .fan_out(&|dev, part| part.update(dev, dir, parity))?;
                self.synchronize_edges(dir)?;
            }
        }
        self.backend_mut()?.fan_out(&|dev, part| part.orthogonalize(dev))
    }

    fn measure(&mut self, iteration: usize) -> Result<()> {
        let layout = self
            .layout
            .clone()
            .ok_or_else(|| QcdError::State("no measurement layout".into()))?;
        let backend = self.backend_mut()?;
        backend.fan_out(&|dev, part| {
            if layout.plaquettes {
                part.measure_plaquette(dev, iteration)?;
            }
            part.measure_action(dev, iteration)?;
            if layout.diff_offset.is_some() {
                part.measure_action_diff(dev, iteration)?;
            }
            if layout.polyakov_width > 0 {
                part.measure_polyakov(dev, iteration)?;
                if layout.polyakov_diff() {
                    part.measure_polyakov_diff(dev, iteration)?;
                }
            }
            if layout.wilson {
                part.wilson_transporters(dev)?;
            }
            Ok(())
        })?;
        if layout.wilson {
            backend.stage_wilson()?;
            backend.fan_out(&|dev, part| part.measure_wilson_loop(dev, iteration))?;
        }
        self.aggregate_row(iteration)
    }

    fn aggregate_row(&mut self, iteration: usize) -> Result<()> {
        let backend = self
            .backend
            .as_mut()
            .ok_or_else(|| QcdError::State("buffers are not created".into()))?;
        let agg = self
            .aggregator
            .as_mut()
            .ok_or_else(|| QcdError::State("no aggregator".into()))?;
        let enabled: Vec<Series> = agg.enabled().collect();
        for s in enabled {
            let mut rows = Vec::with_capacity(backend.num_parts());
            backend.each_part(&mut |dev, part| {
                rows.push(part.series_row(dev, s, iteration)?);
                Ok(())
            })?;
            agg.aggregate_row(s, iteration, &rows)?;
        }
        if let Some(plaq) = agg.column(Series::Plaquettes, 0).get(iteration) {
            debug!(iteration, plaquette_spatial = plaq, "row aggregated");
        }
        Ok(())
    }

    fn initialize(&mut self) -> Result<()> {
        match self.resume.take() {
            Some(cp) if cp.header.initialized => self.restore(cp)?,
            _ => {
                let start = self.params.start;
                self.backend_mut()?
                    .fan_out(&|dev, part| part.initialize(dev, start))?;
                if start == StartMode::Hot {
                    self.synchronize_all()?;
                }
                self.backend_mut()?.fan_out(&|dev, part| part.orthogonalize(dev))?;
                self.measure(0)?;
                self.nav_counter = 0;
                self.iter_counter = 1;
                info!(start = ?start, "lattice initialized");
            }
        }
        self.initialized = true;
        self.state = RunState::InitializedConfig;
        Ok(())
    }

    fn restore(&mut self, cp: Checkpoint) -> Result<()> {
        let counter = cp.header.prng_counter;
        let backend = self.backend_mut()?;
        backend.scatter_links(&cp.links)?;

        let mut lens = Vec::with_capacity(backend.num_parts());
        backend.each_part(&mut |_, part| {
            lens.push(part.config().measurement_len());
            Ok(())
        })?;
        if lens.iter().sum::<usize>() == cp.scratch.len() {
            let mut at = 0;
            let scratch = &cp.scratch;
            backend.each_part(&mut |dev, part| {
                let n = part.config().measurement_len();
                part.write_scratch(dev, &scratch[at..at + n])?;
                at += n;
                Ok(())
            })?;
        } else {
            warn!(
                saved = cp.scratch.len(),
                current = lens.iter().sum::<usize>(),
                "scratch layout changed, reduction scratch not restored"
            );
        }
        backend.each_part(&mut |_, part| {
            part.set_prng_counter(counter);
            Ok(())
        })?;

        let agg = self
            .aggregator
            .as_mut()
            .ok_or_else(|| QcdError::State("no aggregator".into()))?;
        for (s, data) in cp.series {
            agg.set_series(s, data)?;
        }
        self.synchronize_all()?;
        self.nav_counter = cp.header.nav_counter.min(self.params.nav);
        self.iter_counter = cp.header.iter_counter.clamp(1, self.params.iter);
        info!(
            nav = self.nav_counter,
            iter = self.iter_counter,
            prng_counter = counter,
            "resumed from checkpoint"
        );
        Ok(())
    }

    fn stop_requested(&mut self) -> Result<bool> {
        if !self.shutdown.load(Ordering::Relaxed) {
            return Ok(false);
        }
        warn!(
            nav = self.nav_counter,
            iter = self.iter_counter,
            "shutdown requested, saving state"
        );
        self.checkpoint_save()?;
        self.state = RunState::Interrupted;
        Ok(true)
    }

    fn periodic_save(&mut self) -> Result<()> {
        if let Some(secs) = self.params.save_interval {
            if self.last_save.elapsed() >= Duration::from_secs(secs) {
                self.checkpoint_save()?;
            }
        }
        Ok(())
    }

    /// Initialize (or resume), thermalize, produce and finalize.
    ///
    /// # Errors
    ///
    /// Device, kernel and checkpoint failures end the run.
    pub fn run_simulation(&mut self) -> Result<RunState> {
        self.require(RunState::ProgramsReady, "run_simulation")?;
        let t0 = Instant::now();
        self.last_save = Instant::now();
        self.initialize()?;

        self.state = RunState::Thermalizing;
        info!(from = self.nav_counter, to = self.params.nav, "thermalization");
        while self.nav_counter < self.params.nav {
            if self.stop_requested()? {
                return Ok(self.state);
            }
            self.sweep()?;
            self.nav_counter += 1;
            self.periodic_save()?;
        }

        self.state = RunState::Producing;
        info!(from = self.iter_counter, to = self.params.iter, niter = self.params.niter, "production");
        while self.iter_counter < self.params.iter {
            if self.stop_requested()? {
                return Ok(self.state);
            }
            for _ in 0..self.params.niter {
                self.sweep()?;
            }
            self.measure(self.iter_counter)?;
            self.iter_counter += 1;
            self.periodic_save()?;
        }

        self.finalize()?;
        info!(elapsed_secs = t0.elapsed().as_secs_f64(), "run complete");
        Ok(self.state)
    }

    fn finalize(&mut self) -> Result<()> {
        let count = self.iter_counter;
        let nd = self.params.nd;
        let links = self.backend_mut()?.gather_links()?;
        let geometry = self
            .geometry
            .as_ref()
            .ok_or_else(|| QcdError::State("geometry missing".into()))?;
        let twist = Twist {
            enabled: self.params.tbc,
            phi: self.params.phi,
            omega: self.params.omega,
        };
        let check = cpu_check(self.params.group, &geometry.full, twist, self.params.beta, &links);
        if let Some(agg) = &self.aggregator {
            agg.statistics(&mut self.records, count);
        }
        apply_cpu_check(&mut self.records, &check, nd);
        self.cpu = Some(check);
        self.state = RunState::Done;

        let summary = report::RunSummary::collect(self);
        let path = report::write_text(&summary, &self.params.output_path)?;
        info!(path = %path.display(), "report written");
        self.report_path = Some(path.clone());

        let saved = if self.params.final_save {
            Some(self.checkpoint_save()?)
        } else {
            None
        };
        if let Some(finish) = self.params.finish_path.clone() {
            std::fs::create_dir_all(&finish)?;
            for file in std::iter::once(path).chain(saved) {
                if let Some(name) = file.file_name() {
                    std::fs::copy(&file, finish.join(name))?;
                }
            }
            info!(path = %finish.display(), "results copied");
        }
        Ok(())
    }

    /// Current state as a checkpoint value.
    ///
    /// # Errors
    ///
    /// Readback failures.
    pub fn snapshot(&mut self) -> Result<Checkpoint> {
        let geometry = self
            .geometry
            .clone()
            .ok_or_else(|| QcdError::State("geometry missing".into()))?;
        let backend = self.backend_mut()?;
        let mut scratch = Vec::new();
        let mut counter = 0;
        backend.each_part(&mut |dev, part| {
            scratch.extend(part.read_scratch(dev)?);
            counter = part.prng().counter();
            Ok(())
        })?;
        let links = backend.gather_links()?;

        let mut header = CheckpointHeader::new(&self.params, &geometry, scratch.len());
        header.initialized = self.initialized;
        header.nav_counter = self.nav_counter;
        header.iter_counter = self.iter_counter;
        header.prng_counter = counter;
        let series: BTreeMap<Series, Vec<f64>> = self
            .aggregator
            .as_ref()
            .map(|agg| agg.enabled().map(|s| (s, agg.series(s).to_vec())).collect())
            .unwrap_or_default();
        Ok(Checkpoint {
            header,
            scratch,
            series,
            links,
        })
    }

    /// Write the checkpoint file in the output directory.
    ///
    /// # Errors
    ///
    /// Readback, encoding and I/O failures.
    pub fn checkpoint_save(&mut self) -> Result<PathBuf> {
        let cp = self.snapshot()?;
        let path = self.params.checkpoint_path();
        cp.save(&path)?;
        self.last_save = Instant::now();
        Ok(path)
    }

    /// Load and check the checkpoint in the output directory; it is applied
    /// when the simulation starts.
    ///
    /// # Errors
    ///
    /// [`QcdError::CheckpointMismatch`] (fatal), [`QcdError::Checkpoint`]
    /// and [`QcdError::Geometry`] for a checkpoint of another run.
    pub fn checkpoint_load(&mut self) -> Result<()> {
        let geometry = self
            .geometry
            .as_ref()
            .ok_or_else(|| QcdError::State("checkpoint_load before compute_geometry".into()))?;
        let cp = Checkpoint::load(&self.params.checkpoint_path())?;
        cp.header.verify(&self.params, geometry)?;
        self.resume = Some(cp);
        Ok(())
    }

    /// Every step from devices to report.
    ///
    /// # Errors
    ///
    /// The first failing step.
    pub fn run(&mut self) -> Result<RunState> {
        self.init_devices()?;
        self.compute_geometry()?;
        self.create_buffers()?;
        self.build_programs()?;
        self.run_simulation()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    fn controller(text: &str) -> LatticeController {
        LatticeController::configure(&ParameterSet::parse(text).expect("parse")).expect("configure")
    }

    #[test]
    fn steps_require_order() {
        let mut c = controller("PLATFORM=0\nGROUP=2\n");
        assert!(matches!(c.build_programs(), Err(QcdError::State(_))));
        assert!(matches!(c.compute_geometry(), Err(QcdError::State(_))));
        c.init_devices().expect("devices");
        c.compute_geometry().expect("geometry");
        c.create_buffers().expect("buffers");
        assert_eq!(c.state(), RunState::BuffersReady);
        assert!(matches!(c.run_simulation(), Err(QcdError::State(_))));
    }

    #[test]
    fn device_list_is_round_robin() {
        let mut c = controller("PLATFORM=0\nDEVICE=0,1\nPARTS=3\nGROUP=2\nL1=8\n");
        c.init_devices().expect("devices");
        assert_eq!(c.placement, vec![0, 1, 0]);
        assert_eq!(c.devices.len(), 2);
        assert!(c.halo);
    }

    #[test]
    fn single_host_device_has_no_halo() {
        let mut c = controller("PLATFORM=0\nGROUP=2\n");
        c.init_devices().expect("devices");
        assert!(!c.halo);
        c.compute_geometry().expect("geometry");
        assert_eq!(c.geometry().map(Geometry::num_parts), Some(1));
    }

    #[test]
    fn too_many_parts_is_a_geometry_error() {
        let mut c = controller("PLATFORM=0\nPARTS=3\nGROUP=2\n");
        c.init_devices().expect("devices");
        assert!(matches!(c.compute_geometry(), Err(QcdError::Geometry(_))));
    }

    #[test]
    fn wgpu_without_kernel_path_is_config_error() {
        let mut c = controller("PLATFORM=1\nGROUP=2\n");
        assert!(matches!(c.init_devices(), Err(QcdError::Config(_))));
    }

    #[test]
    fn shutdown_interrupts_with_checkpoint() {
        let dir = tempfile::tempdir().expect("tempdir");
        let text = format!(
            "PLATFORM=0\nGROUP=2\nNAV=3\nITER=3\nOUTPUTPATH={}\n",
            dir.path().display()
        );
        let mut c = controller(&text);
        c.shutdown_handle().store(true, Ordering::Relaxed);
        assert_eq!(c.run().expect("run"), RunState::Interrupted);
        assert!(c.params().checkpoint_path().exists());
        assert_eq!(c.iter_counter(), 1);
    }
}

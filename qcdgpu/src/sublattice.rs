// SPDX-License-Identifier: AGPL-3.0-only

//! One partition of the lattice on one device.
//!
//! A `SubLattice` owns its device buffers, kernel handles and PRNG stream.
//! Every measurement is a primary kernel filling the scratch rows followed
//! by a reduction kernel writing one row of a series buffer, with the
//! iteration passed as constant slot 0.
//!
//! Device access goes through the `&mut dyn DeviceBackend` the caller
//! passes in; the backend keeps devices and parts grouped so several
//! parts can share one device.

use std::collections::BTreeMap;

use tracing::debug;

use crate::config::{Precision, StartMode};
use crate::device::{BufferId, DeviceBackend, ElementKind, KernelId, KernelTiming};
use crate::error::{QcdError, Result};
use crate::geometry::{align_up, Partition};
use crate::kernels::{KernelConfig, KernelName};
use crate::prng::PrngStream;

/// Per-iteration series buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
pub enum Series {
    Energies,
    Plaquettes,
    Polyakov,
    Wilson,
}

impl Series {
    pub const ALL: [Self; 4] = [Self::Energies, Self::Plaquettes, Self::Polyakov, Self::Wilson];

    /// Words per iteration, 0 when the series is disabled.
    #[must_use]
    pub const fn width(self, cfg: &KernelConfig) -> usize {
        match self {
            Self::Energies => cfg.layout.energies_width,
            Self::Plaquettes => {
                if cfg.layout.plaquettes {
                    2
                } else {
                    0
                }
            }
            Self::Polyakov => cfg.layout.polyakov_width,
            Self::Wilson => {
                if cfg.layout.wilson {
                    1
                } else {
                    0
                }
            }
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Energies => "energies",
            Self::Plaquettes => "plaquettes",
            Self::Polyakov => "polyakov",
            Self::Wilson => "wilson",
        }
    }
}

/// Owned dir-0 links and temporal transporters of one part, read back for
/// staging into a neighbour's Wilson buffers.
#[derive(Debug, Clone, Default)]
pub struct RemoteTransporter {
    pub links0: Vec<f64>,
    pub lt: Vec<f64>,
}

#[derive(Debug, Clone, Copy)]
struct WilsonBuffers {
    lt: BufferId,
    lr1: BufferId,
    lr2: BufferId,
    aux_links: BufferId,
    aux_lt: BufferId,
}

#[derive(Debug, Clone)]
struct Buffers {
    links: BufferId,
    prns: BufferId,
    measurement: BufferId,
    series: BTreeMap<Series, BufferId>,
    wilson: Option<WilsonBuffers>,
}

/// One partition: buffers, kernels, PRNG stream and local geometry.
pub struct SubLattice {
    part: Partition,
    config: KernelConfig,
    rows: usize,
    prng: PrngStream,
    buffers: Option<Buffers>,
    kernels: BTreeMap<KernelName, KernelId>,
}

impl SubLattice {
    /// A partition with its program configuration, `rows` iterations of
    /// series storage, and the stream it draws randoms from.
    #[must_use]
    pub const fn new(part: Partition, config: KernelConfig, rows: usize, prng: PrngStream) -> Self {
        Self {
            part,
            config,
            rows,
            prng,
            buffers: None,
            kernels: BTreeMap::new(),
        }
    }

    #[must_use]
    pub const fn partition(&self) -> Partition {
        self.part
    }

    #[must_use]
    pub const fn config(&self) -> &KernelConfig {
        &self.config
    }

    #[must_use]
    pub const fn prng(&self) -> &PrngStream {
        &self.prng
    }

    pub fn set_prng_counter(&mut self, counter: u64) {
        self.prng.set_counter(counter);
    }

    /// Element kind of link storage.
    #[must_use]
    pub const fn link_kind(&self) -> ElementKind {
        if self.config.precision.links_f64() {
            ElementKind::F64
        } else {
            ElementKind::F32
        }
    }

    fn buffers(&self) -> Result<&Buffers> {
        self.buffers
            .as_ref()
            .ok_or_else(|| QcdError::State(format!("part {} has no buffers", self.part.index)))
    }

    fn kernel(&self, name: KernelName) -> Result<KernelId> {
        self.kernels.get(&name).copied().ok_or_else(|| QcdError::KernelRun {
            kernel: name.to_string(),
            reason: format!("not built for part {}", self.part.index),
        })
    }

    fn series_buffer(&self, series: Series) -> Result<BufferId> {
        self.buffers()?
            .series
            .get(&series)
            .copied()
            .ok_or_else(|| QcdError::State(format!("{} series is disabled", series.label())))
    }

    /// Allocate every buffer of this part on `dev`.
    ///
    /// # Errors
    ///
    /// [`QcdError::Device`] if an allocation fails.
    pub fn create_buffers(&mut self, dev: &mut dyn DeviceBackend) -> Result<()> {
        let cfg = &self.config;
        let link_kind = self.link_kind();
        let reduce_kind = if cfg.precision.reductions_f64() {
            ElementKind::F64
        } else {
            ElementKind::F32
        };
        let k = self.part.index;
        let links = dev.buffer_init(&format!("links[{k}]"), link_kind, cfg.links_len())?;
        let prns = dev.buffer_init(&format!("prns[{k}]"), link_kind, cfg.prns_len)?;
        let measurement =
            dev.buffer_init(&format!("measurement[{k}]"), reduce_kind, cfg.measurement_len())?;

        let mut series = BTreeMap::new();
        for s in Series::ALL {
            let width = s.width(cfg);
            if width > 0 {
                let id = dev.buffer_init(
                    &format!("{}[{k}]", s.label()),
                    reduce_kind,
                    self.rows * width,
                )?;
                series.insert(s, id);
            }
        }

        let wilson = if cfg.layout.wilson {
            let owned = cfg.local.owned_sites() * cfg.words();
            let aux = if cfg.local.halo { cfg.aux_len() } else { 1 };
            Some(WilsonBuffers {
                lt: dev.buffer_init(&format!("lt[{k}]"), link_kind, owned)?,
                lr1: dev.buffer_init(&format!("lr1[{k}]"), link_kind, cfg.chain_len())?,
                lr2: dev.buffer_init(&format!("lr2[{k}]"), link_kind, cfg.chain_len())?,
                aux_links: dev.buffer_init(&format!("aux_links[{k}]"), link_kind, aux)?,
                aux_lt: dev.buffer_init(&format!("aux_lt[{k}]"), link_kind, aux)?,
            })
        } else {
            None
        };

        self.buffers = Some(Buffers {
            links,
            prns,
            measurement,
            series,
            wilson,
        });
        debug!(part = k, device = %dev.name(), "buffers allocated");
        Ok(())
    }

    /// Kernels this part's configuration needs.
    fn kernel_set(&self) -> Vec<KernelName> {
        let cfg = &self.config;
        let mut names = vec![
            KernelName::init(cfg.start),
            KernelName::UpdateOdd,
            KernelName::UpdateEven,
            KernelName::Orthogonalize,
            KernelName::Action,
            KernelName::ReduceAction,
        ];
        if cfg.layout.plaquettes {
            names.extend([KernelName::Plaquette, KernelName::ReducePlaquette]);
        }
        if cfg.layout.diff_offset.is_some() {
            for k in 0..cfg.diff_axes() {
                names.extend([KernelName::ActionDiff(k), KernelName::ReduceActionDiff(k)]);
            }
        }
        if cfg.layout.polyakov_width > 0 {
            names.extend([KernelName::Polyakov, KernelName::ReducePolyakov]);
        }
        if cfg.layout.polyakov_diff() {
            for k in 0..cfg.diff_axes() {
                names.extend([KernelName::PolyakovDiff(k), KernelName::ReducePolyakovDiff(k)]);
            }
        }
        if cfg.layout.wilson {
            names.extend([
                KernelName::WilsonLt,
                KernelName::WilsonLr1,
                KernelName::WilsonLr2,
                KernelName::WilsonAccumulate,
                KernelName::ReduceWilson,
            ]);
        }
        names
    }

    fn arguments(&self, name: KernelName) -> Result<Vec<BufferId>> {
        let b = self.buffers()?;
        let wilson = || {
            b.wilson
                .ok_or_else(|| QcdError::State("Wilson buffers not allocated".into()))
        };
        Ok(match name {
            KernelName::InitCold | KernelName::InitGid | KernelName::Orthogonalize => vec![b.links],
            KernelName::InitHot | KernelName::UpdateOdd | KernelName::UpdateEven => {
                vec![b.links, b.prns]
            }
            KernelName::Plaquette
            | KernelName::Action
            | KernelName::ActionDiff(_)
            | KernelName::Polyakov
            | KernelName::PolyakovDiff(_) => vec![b.links, b.measurement],
            KernelName::ReducePlaquette => vec![b.measurement, self.series_buffer(Series::Plaquettes)?],
            KernelName::ReduceAction | KernelName::ReduceActionDiff(_) => {
                vec![b.measurement, self.series_buffer(Series::Energies)?]
            }
            KernelName::ReducePolyakov | KernelName::ReducePolyakovDiff(_) => {
                vec![b.measurement, self.series_buffer(Series::Polyakov)?]
            }
            KernelName::ReduceWilson => vec![b.measurement, self.series_buffer(Series::Wilson)?],
            KernelName::WilsonLt => vec![b.links, wilson()?.lt],
            KernelName::WilsonLr1 => {
                let w = wilson()?;
                vec![b.links, w.aux_links, w.lr1]
            }
            KernelName::WilsonLr2 => {
                let w = wilson()?;
                vec![b.links, w.aux_links, w.lr2]
            }
            KernelName::WilsonAccumulate => {
                let w = wilson()?;
                vec![w.lr1, w.lr2, w.lt, w.aux_lt, b.measurement]
            }
        })
    }

    /// Build this part's program and create and bind every kernel it uses.
    ///
    /// # Errors
    ///
    /// [`QcdError::KernelBuild`] if the program or an entry point fails.
    pub fn build(&mut self, dev: &mut dyn DeviceBackend) -> Result<()> {
        let program = dev.program_build(&self.config)?;
        for name in self.kernel_set() {
            let id = dev.kernel_init(program, name.as_str())?;
            dev.kernel_bind(id, &self.arguments(name)?)?;
            self.kernels.insert(name, id);
        }
        debug!(part = self.part.index, kernels = self.kernels.len(), "program built");
        Ok(())
    }

    fn sites(&self, name: KernelName) -> usize {
        let local = &self.config.local;
        let wg = local.workgroup;
        match name {
            KernelName::InitCold | KernelName::InitGid | KernelName::Orthogonalize => {
                align_up(local.stored_sites(), wg)
            }
            KernelName::UpdateOdd | KernelName::UpdateEven => align_up(local.owned_sites() / 2, wg),
            _ => local.padded_sites(),
        }
    }

    fn run(&self, dev: &mut dyn DeviceBackend, name: KernelName, constant: Option<u32>) -> Result<()> {
        let id = self.kernel(name)?;
        if let Some(c) = constant {
            dev.kernel_set_constant(id, 0, c)?;
        }
        dev.kernel_run(id, self.sites(name))
    }

    fn upload_prns(&mut self, dev: &mut dyn DeviceBackend) -> Result<()> {
        let prns = self.buffers()?.prns;
        let batch = self.prng.produce();
        dev.buffer_write(prns, 0, &batch)
    }

    /// Fill the link table for `start`. Hot starts draw one PRNG batch and
    /// cover owned sites only; ghosts need a synchronization afterwards.
    ///
    /// # Errors
    ///
    /// Propagates device and kernel failures.
    pub fn initialize(&mut self, dev: &mut dyn DeviceBackend, start: StartMode) -> Result<()> {
        if start == StartMode::Hot {
            self.upload_prns(dev)?;
        }
        self.run(dev, KernelName::init(start), None)
    }

    /// Produce randoms and heat-bath update links of `dir` at sites of `parity`.
    ///
    /// # Errors
    ///
    /// Propagates device and kernel failures.
    pub fn update(&mut self, dev: &mut dyn DeviceBackend, dir: usize, parity: usize) -> Result<()> {
        self.upload_prns(dev)?;
        self.run(dev, KernelName::update(parity), Some(dir as u32))
    }

    /// Project every stored link back onto the group.
    ///
    /// # Errors
    ///
    /// Propagates device and kernel failures.
    pub fn orthogonalize(&self, dev: &mut dyn DeviceBackend) -> Result<()> {
        self.run(dev, KernelName::Orthogonalize, None)
    }

    fn measure(
        &self,
        dev: &mut dyn DeviceBackend,
        primary: KernelName,
        reduce: KernelName,
        iteration: usize,
    ) -> Result<()> {
        let it = iteration as u32;
        self.run(dev, primary, Some(it))?;
        self.run(dev, reduce, Some(it))
    }

    /// # Errors
    ///
    /// Propagates device and kernel failures.
    pub fn measure_plaquette(&self, dev: &mut dyn DeviceBackend, iteration: usize) -> Result<()> {
        self.measure(dev, KernelName::Plaquette, KernelName::ReducePlaquette, iteration)
    }

    /// Action, plus the field-strength tensor rows when enabled.
    ///
    /// # Errors
    ///
    /// Propagates device and kernel failures.
    pub fn measure_action(&self, dev: &mut dyn DeviceBackend, iteration: usize) -> Result<()> {
        self.measure(dev, KernelName::Action, KernelName::ReduceAction, iteration)
    }

    /// Per-axis action for every spatial axis that has a column.
    ///
    /// # Errors
    ///
    /// Propagates device and kernel failures.
    pub fn measure_action_diff(&self, dev: &mut dyn DeviceBackend, iteration: usize) -> Result<()> {
        for k in 0..self.config.diff_axes() {
            self.measure(dev, KernelName::ActionDiff(k), KernelName::ReduceActionDiff(k), iteration)?;
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Propagates device and kernel failures.
    pub fn measure_polyakov(&self, dev: &mut dyn DeviceBackend, iteration: usize) -> Result<()> {
        self.measure(dev, KernelName::Polyakov, KernelName::ReducePolyakov, iteration)
    }

    /// Polyakov correlators along each spatial axis.
    ///
    /// # Errors
    ///
    /// Propagates device and kernel failures.
    pub fn measure_polyakov_diff(&self, dev: &mut dyn DeviceBackend, iteration: usize) -> Result<()> {
        for k in 0..self.config.diff_axes() {
            self.measure(
                dev,
                KernelName::PolyakovDiff(k),
                KernelName::ReducePolyakovDiff(k),
                iteration,
            )?;
        }
        Ok(())
    }

    /// First Wilson stage: temporal transporters.
    ///
    /// # Errors
    ///
    /// Propagates device and kernel failures.
    pub fn wilson_transporters(&self, dev: &mut dyn DeviceBackend) -> Result<()> {
        self.run(dev, KernelName::WilsonLt, None)
    }

    /// Owned direction-0 links and temporal transporters, for staging into
    /// the part on the left. Call after [`Self::wilson_transporters`].
    ///
    /// # Errors
    ///
    /// [`QcdError::Device`] if a readback fails.
    pub fn fetch_remote_transporter(&self, dev: &mut dyn DeviceBackend) -> Result<RemoteTransporter> {
        let b = self.buffers()?;
        let w = b
            .wilson
            .ok_or_else(|| QcdError::State("Wilson buffers not allocated".into()))?;
        let local = &self.config.local;
        let words = self.config.words();
        let owned = local.owned_sites() * words;
        Ok(RemoteTransporter {
            links0: dev.buffer_map(b.links, local.left_sites() * words, owned)?,
            lt: dev.buffer_map(w.lt, 0, owned)?,
        })
    }

    /// Write the staged slabs right of this part.
    ///
    /// # Errors
    ///
    /// [`QcdError::Device`] on size mismatch or a failed write.
    pub fn stage_aux(&self, dev: &mut dyn DeviceBackend, aux_links: &[f64], aux_lt: &[f64]) -> Result<()> {
        let w = self
            .buffers()?
            .wilson
            .ok_or_else(|| QcdError::State("Wilson buffers not allocated".into()))?;
        dev.buffer_write(w.aux_links, 0, aux_links)?;
        dev.buffer_write(w.aux_lt, 0, aux_lt)
    }

    /// Remaining Wilson stages: spatial chains, per-site loop, reduction.
    ///
    /// # Errors
    ///
    /// Propagates device and kernel failures.
    pub fn measure_wilson_loop(&self, dev: &mut dyn DeviceBackend, iteration: usize) -> Result<()> {
        self.run(dev, KernelName::WilsonLr1, None)?;
        self.run(dev, KernelName::WilsonLr2, None)?;
        self.measure(dev, KernelName::WilsonAccumulate, KernelName::ReduceWilson, iteration)
    }

    fn slice_offset(&self, dir: usize, stored_slice: usize) -> usize {
        let local = &self.config.local;
        (dir * local.stored_sites() + stored_slice * local.slice_sites()) * self.config.words()
    }

    fn slice_words(&self) -> usize {
        self.config.local.slice_sites() * self.config.words()
    }

    /// First and last owned slice of the `dir` link block.
    ///
    /// # Errors
    ///
    /// [`QcdError::Device`] if a readback fails.
    pub fn export_edge(&self, dev: &mut dyn DeviceBackend, dir: usize) -> Result<(Vec<f64>, Vec<f64>)> {
        let links = self.buffers()?.links;
        let g = self.config.local.ghost_slices();
        let n = self.slice_words();
        let first = dev.buffer_map(links, self.slice_offset(dir, g), n)?;
        let last = dev.buffer_map(links, self.slice_offset(dir, g + self.part.nx - 1), n)?;
        Ok((first, last))
    }

    /// Overwrite both ghost slices of the `dir` block.
    ///
    /// # Errors
    ///
    /// [`QcdError::State`] without a halo, [`QcdError::Device`] on a failed write.
    pub fn import_ghost(&self, dev: &mut dyn DeviceBackend, dir: usize, left: &[f64], right: &[f64]) -> Result<()> {
        if !self.config.local.halo {
            return Err(QcdError::State(format!("part {} has no ghost slices", self.part.index)));
        }
        let links = self.buffers()?.links;
        dev.buffer_write(links, self.slice_offset(dir, 0), left)?;
        dev.buffer_write(links, self.slice_offset(dir, self.part.nx + 1), right)
    }

    /// Owned links, direction-major, without ghosts.
    ///
    /// # Errors
    ///
    /// [`QcdError::Device`] if a readback fails.
    pub fn read_links_owned(&self, dev: &mut dyn DeviceBackend) -> Result<Vec<f64>> {
        let links = self.buffers()?.links;
        let local = &self.config.local;
        let block = local.owned_sites() * self.config.words();
        let mut out = Vec::with_capacity(local.nd() * block);
        for dir in 0..local.nd() {
            out.extend(dev.buffer_map(links, self.slice_offset(dir, local.ghost_slices()), block)?);
        }
        Ok(out)
    }

    /// The whole link table, ghost slices included.
    ///
    /// # Errors
    ///
    /// [`QcdError::Device`] if a readback fails.
    pub fn read_links_stored(&self, dev: &mut dyn DeviceBackend) -> Result<Vec<f64>> {
        let links = self.buffers()?.links;
        dev.buffer_map(links, 0, self.config.links_len())
    }

    /// Inverse of [`Self::read_links_owned`]; ghosts are left untouched.
    ///
    /// # Errors
    ///
    /// [`QcdError::Device`] on size mismatch or a failed write.
    pub fn write_links_owned(&self, dev: &mut dyn DeviceBackend, data: &[f64]) -> Result<()> {
        let links = self.buffers()?.links;
        let local = &self.config.local;
        let block = local.owned_sites() * self.config.words();
        if data.len() != local.nd() * block {
            return Err(QcdError::device(format!(
                "part {}: {} link words, expected {}",
                self.part.index,
                data.len(),
                local.nd() * block
            )));
        }
        for (dir, chunk) in data.chunks_exact(block).enumerate() {
            dev.buffer_write(links, self.slice_offset(dir, local.ghost_slices()), chunk)?;
        }
        Ok(())
    }

    /// Whole reduction scratch buffer.
    ///
    /// # Errors
    ///
    /// [`QcdError::Device`] if a readback fails.
    pub fn read_scratch(&self, dev: &mut dyn DeviceBackend) -> Result<Vec<f64>> {
        let m = self.buffers()?.measurement;
        dev.buffer_map(m, 0, self.config.measurement_len())
    }

    /// # Errors
    ///
    /// [`QcdError::Device`] on a failed write.
    pub fn write_scratch(&self, dev: &mut dyn DeviceBackend, data: &[f64]) -> Result<()> {
        let m = self.buffers()?.measurement;
        dev.buffer_write(m, 0, data)
    }

    /// Row `iteration` of a series.
    ///
    /// # Errors
    ///
    /// [`QcdError::State`] if the series is disabled, [`QcdError::Device`]
    /// if the readback fails.
    pub fn series_row(&self, dev: &mut dyn DeviceBackend, series: Series, iteration: usize) -> Result<Vec<f64>> {
        let id = self.series_buffer(series)?;
        let w = series.width(&self.config);
        dev.buffer_map(id, iteration * w, w)
    }

    /// Whole series buffer.
    ///
    /// # Errors
    ///
    /// As [`Self::series_row`].
    pub fn read_series(&self, dev: &mut dyn DeviceBackend, series: Series) -> Result<Vec<f64>> {
        let id = self.series_buffer(series)?;
        dev.buffer_map(id, 0, self.rows * series.width(&self.config))
    }

    /// # Errors
    ///
    /// As [`Self::series_row`].
    pub fn write_series(&self, dev: &mut dyn DeviceBackend, series: Series, data: &[f64]) -> Result<()> {
        let id = self.series_buffer(series)?;
        dev.buffer_write(id, 0, data)
    }

    /// Timings of this part's device.
    #[must_use]
    pub fn timings(&self, dev: &dyn DeviceBackend) -> Vec<KernelTiming> {
        dev.timers()
    }

    /// Storage precision requested for the PRNG stream of a part.
    #[must_use]
    pub const fn prng_precision(precision: Precision) -> Precision {
        if precision.links_f64() {
            Precision::Double
        } else {
            Precision::Single
        }
    }
}

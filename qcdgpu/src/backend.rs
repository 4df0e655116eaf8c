// SPDX-License-Identifier: AGPL-3.0-only

//! Execution strategies over one or more devices.
//!
//! | strategy | parts | halo | edge sync | Wilson staging |
//! |----------|-------|------|-----------|----------------|
//! | [`SingleDevice`] | 1 | no (axis 0 wraps) | no-op | no-op |
//! | [`MultiPartition`] | N ≥ 1 | 1 ghost slice per side | ring copy | from owning parts |
//!
//! Parts are grouped by device. A fan-out runs the groups in parallel on
//! the rayon pool, the parts of one group in order, and returns after
//! every group finished. Halo and staging buffers are only written
//! between fan-outs.

use rayon::prelude::*;
use tracing::debug;

use crate::device::{DeviceBackend, KernelTiming};
use crate::error::{QcdError, Result};
use crate::geometry::Geometry;
use crate::sublattice::{RemoteTransporter, SubLattice};

/// Per-part operation run by a fan-out.
pub type PartOp<'a> = dyn Fn(&mut dyn DeviceBackend, &mut SubLattice) -> Result<()> + Sync + 'a;

/// One device and the parts placed on it.
pub struct DeviceGroup {
    pub device: Box<dyn DeviceBackend>,
    pub parts: Vec<SubLattice>,
}

impl DeviceGroup {
    fn run_each(&mut self, op: &PartOp<'_>) -> Result<()> {
        for part in &mut self.parts {
            op(self.device.as_mut(), part)?;
        }
        Ok(())
    }
}

/// How the controller reaches its parts.
pub trait LatticeBackend: Send {
    /// Strategy name for logs and reports.
    fn strategy(&self) -> &'static str;

    fn geometry(&self) -> &Geometry;

    fn groups(&self) -> &[DeviceGroup];

    fn groups_mut(&mut self) -> &mut [DeviceGroup];

    /// Refresh ghost slices of the `dir` link block on every part.
    ///
    /// # Errors
    ///
    /// Propagates device failures.
    fn synchronize_edges(&mut self, dir: usize) -> Result<()>;

    /// Fill every part's Wilson staging buffers. Temporal transporters must
    /// already be computed on all parts.
    ///
    /// # Errors
    ///
    /// Propagates device failures.
    fn stage_wilson(&mut self) -> Result<()>;

    fn num_parts(&self) -> usize {
        self.geometry().num_parts()
    }

    /// Run `op` on every part; device groups run in parallel.
    ///
    /// # Errors
    ///
    /// The first failure of any part.
    fn fan_out(&mut self, op: &PartOp<'_>) -> Result<()> {
        self.groups_mut()
            .par_iter_mut()
            .try_for_each(|group| group.run_each(op))
    }

    /// Part `k` with its device.
    ///
    /// # Errors
    ///
    /// [`QcdError::State`] if no group holds part `k`.
    fn part_mut(&mut self, k: usize) -> Result<(&mut dyn DeviceBackend, &mut SubLattice)> {
        for group in self.groups_mut() {
            let DeviceGroup { device, parts } = group;
            if let Some(part) = parts.iter_mut().find(|p| p.partition().index == k) {
                return Ok((device.as_mut(), part));
            }
        }
        Err(QcdError::State(format!("no part {k}")))
    }

    /// Run `op` on the parts one at a time in part order.
    ///
    /// # Errors
    ///
    /// The first failure.
    fn each_part(
        &mut self,
        op: &mut dyn FnMut(&mut dyn DeviceBackend, &mut SubLattice) -> Result<()>,
    ) -> Result<()> {
        for k in 0..self.num_parts() {
            let (dev, part) = self.part_mut(k)?;
            op(dev, part)?;
        }
        Ok(())
    }

    /// Owned links of all parts in global site order, direction-major.
    ///
    /// # Errors
    ///
    /// Propagates readback failures.
    fn gather_links(&mut self) -> Result<Vec<f64>> {
        let nd = self.geometry().nd();
        let mut per_part = Vec::with_capacity(self.num_parts());
        self.each_part(&mut |dev, part| {
            per_part.push(part.read_links_owned(dev)?);
            Ok(())
        })?;
        let total = per_part.iter().map(Vec::len).sum();
        let mut out = Vec::with_capacity(total);
        for dir in 0..nd {
            for data in &per_part {
                let block = data.len() / nd;
                out.extend_from_slice(&data[dir * block..(dir + 1) * block]);
            }
        }
        Ok(out)
    }

    /// Inverse of [`Self::gather_links`]. Ghosts need a synchronization
    /// afterwards.
    ///
    /// # Errors
    ///
    /// [`QcdError::Checkpoint`] if `links` has the wrong size, otherwise
    /// propagates write failures.
    fn scatter_links(&mut self, links: &[f64]) -> Result<()> {
        let geom = self.geometry().clone();
        let nd = geom.nd();
        let full_block = links.len() / nd.max(1);
        if full_block * nd != links.len() || full_block % geom.full_sites().max(1) != 0 {
            return Err(QcdError::Checkpoint(format!(
                "{} link words do not fit a {:?} lattice",
                links.len(),
                geom.full
            )));
        }
        let words = full_block / geom.full_sites();
        let slice_words = geom.slice_sites() * words;
        self.each_part(&mut |dev, part| {
            let p = part.partition();
            let block = p.nx * slice_words;
            let mut data = Vec::with_capacity(nd * block);
            for dir in 0..nd {
                let start = dir * full_block + p.x0 * slice_words;
                data.extend_from_slice(&links[start..start + block]);
            }
            part.write_links_owned(dev, &data)
        })
    }

    /// Device names in group order.
    fn device_names(&self) -> Vec<String> {
        self.groups().iter().map(|g| g.device.name()).collect()
    }

    /// Kernel timings per device.
    fn timings(&self) -> Vec<(String, Vec<KernelTiming>)> {
        self.groups()
            .iter()
            .map(|g| (g.device.name(), g.device.timers()))
            .collect()
    }
}

/// Whole lattice on one device without halo.
pub struct SingleDevice {
    geometry: Geometry,
    group: [DeviceGroup; 1],
}

impl SingleDevice {
    #[must_use]
    pub fn new(geometry: Geometry, device: Box<dyn DeviceBackend>, part: SubLattice) -> Self {
        Self {
            geometry,
            group: [DeviceGroup {
                device,
                parts: vec![part],
            }],
        }
    }
}

impl LatticeBackend for SingleDevice {
    fn strategy(&self) -> &'static str {
        "single-device"
    }

    fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    fn groups(&self) -> &[DeviceGroup] {
        &self.group
    }

    fn groups_mut(&mut self) -> &mut [DeviceGroup] {
        &mut self.group
    }

    fn synchronize_edges(&mut self, _dir: usize) -> Result<()> {
        Ok(())
    }

    fn stage_wilson(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Parts with ghost slices, spread over one or more devices.
pub struct MultiPartition {
    geometry: Geometry,
    groups: Vec<DeviceGroup>,
}

impl MultiPartition {
    /// Place part `k` on `devices[placement[k]]`. Devices without parts are dropped.
    ///
    /// # Errors
    ///
    /// [`QcdError::State`] if the placement does not cover the parts or
    /// names a missing device.
    pub fn new(
        geometry: Geometry,
        devices: Vec<Box<dyn DeviceBackend>>,
        parts: Vec<SubLattice>,
        placement: &[usize],
    ) -> Result<Self> {
        if placement.len() != parts.len() || parts.len() != geometry.num_parts() {
            return Err(QcdError::State(format!(
                "{} parts, {} placements, {} partitions",
                parts.len(),
                placement.len(),
                geometry.num_parts()
            )));
        }
        if let Some(&bad) = placement.iter().find(|&&d| d >= devices.len()) {
            return Err(QcdError::State(format!("placement names device {bad} of {}", devices.len())));
        }
        let mut slots: Vec<Vec<SubLattice>> = devices.iter().map(|_| Vec::new()).collect();
        for (part, &d) in parts.into_iter().zip(placement) {
            slots[d].push(part);
        }
        let groups = devices
            .into_iter()
            .zip(slots)
            .filter(|(_, parts)| !parts.is_empty())
            .map(|(device, parts)| DeviceGroup { device, parts })
            .collect();
        Ok(Self { geometry, groups })
    }

    fn transporters(&mut self) -> Result<Vec<RemoteTransporter>> {
        let mut out = Vec::with_capacity(self.num_parts());
        self.each_part(&mut |dev, part| {
            out.push(part.fetch_remote_transporter(dev)?);
            Ok(())
        })?;
        Ok(out)
    }
}

impl LatticeBackend for MultiPartition {
    fn strategy(&self) -> &'static str {
        "multi-partition"
    }

    fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    fn groups(&self) -> &[DeviceGroup] {
        &self.groups
    }

    fn groups_mut(&mut self) -> &mut [DeviceGroup] {
        &mut self.groups
    }

    /// Ring copy: part k's last owned slice becomes the left ghost of
    /// k + 1, its first owned slice the right ghost of k − 1. All edges are
    /// read before any ghost is written.
    fn synchronize_edges(&mut self, dir: usize) -> Result<()> {
        let n = self.num_parts();
        let mut edges = Vec::with_capacity(n);
        self.each_part(&mut |dev, part| {
            edges.push(part.export_edge(dev, dir)?);
            Ok(())
        })?;
        self.each_part(&mut |dev, part| {
            let k = part.partition().index;
            let (_, left) = &edges[(k + n - 1) % n];
            let (right, _) = &edges[(k + 1) % n];
            part.import_ghost(dev, dir, left, right)
        })?;
        debug!(dir, parts = n, "edges synchronized");
        Ok(())
    }

    fn stage_wilson(&mut self) -> Result<()> {
        let remote = self.transporters()?;
        let geom = self.geometry.clone();
        let slice = geom.slice_sites();
        self.each_part(&mut |dev, part| {
            let p = part.partition();
            let sw = slice * part.config().words();
            let r = part.config().wilson_r;
            let mut aux_links = Vec::with_capacity(r * sw);
            let mut aux_lt = Vec::with_capacity(r * sw);
            for s in 0..r {
                let (owner, local) = geom.owner_of_slice(p.x0 + p.nx + s);
                let src = &remote[owner];
                aux_links.extend_from_slice(&src.links0[local * sw..(local + 1) * sw]);
                aux_lt.extend_from_slice(&src.lt[local * sw..(local + 1) * sw]);
            }
            part.stage_aux(dev, &aux_links, &aux_lt)
        })
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::{ParameterSet, RunParameters, StartMode};
    use crate::device::HostDevice;
    use crate::kernels::KernelConfig;
    use crate::prng::PrngStream;

    fn multi(text: &str, extents: &[usize], devices: usize) -> MultiPartition {
        let p = RunParameters::from_set(&ParameterSet::parse(text).expect("parse")).expect("params");
        let geom = Geometry::new(p.extents.clone(), extents).expect("geometry");
        let parts: Vec<SubLattice> = geom
            .parts
            .iter()
            .map(|part| {
                let cfg = KernelConfig::new(&p, geom.local(part.index, true, 64));
                let prng = PrngStream::new(
                    p.prng,
                    p.rand_series + part.index as u32,
                    0,
                    cfg.prns_len,
                    SubLattice::prng_precision(p.precision),
                );
                SubLattice::new(*part, cfg, p.iter, prng)
            })
            .collect();
        let devs: Vec<Box<dyn DeviceBackend>> = (0..devices)
            .map(|i| Box::new(HostDevice::new(i)) as Box<dyn DeviceBackend>)
            .collect();
        let placement: Vec<usize> = (0..parts.len()).map(|k| k % devices).collect();
        let mut b = MultiPartition::new(geom, devs, parts, &placement).expect("backend");
        b.fan_out(&|dev, part| {
            part.create_buffers(dev)?;
            part.build(dev)
        })
        .expect("setup");
        b
    }

    #[test]
    fn parts_group_by_device() {
        let b = multi("GROUP=2\nL1=8\nLS=2\nLT=2\n", &[2, 2, 4], 2);
        assert_eq!(b.groups().len(), 2);
        assert_eq!(b.groups()[0].parts.len(), 2);
        assert_eq!(b.device_names(), vec!["host:0".to_string(), "host:1".to_string()]);
    }

    #[test]
    fn second_sync_changes_nothing() {
        let mut b = multi("GROUP=2\nL1=8\nLS=2\nLT=2\nINTS=2\n", &[4, 4], 1);
        b.fan_out(&|dev, part| part.initialize(dev, StartMode::GroupId))
            .expect("init");
        for dir in 0..4 {
            b.synchronize_edges(dir).expect("sync");
        }
        let once = b.gather_links().expect("gather");
        for dir in 0..4 {
            b.synchronize_edges(dir).expect("sync");
        }
        assert_eq!(b.gather_links().expect("gather"), once);
    }

    fn stored_tables(b: &mut MultiPartition) -> Vec<Vec<f64>> {
        let mut out = Vec::new();
        b.each_part(&mut |dev, part| {
            out.push(part.read_links_stored(dev)?);
            Ok(())
        })
        .expect("read");
        out
    }

    #[test]
    fn ghost_slices_mirror_neighbours_and_resync_is_a_no_op() {
        let mut b = multi("GROUP=2\nL1=8\nLS=2\nLT=2\nINTS=0\n", &[4, 4], 1);
        b.fan_out(&|dev, part| part.initialize(dev, StartMode::Hot))
            .expect("init");
        for dir in 0..4 {
            b.synchronize_edges(dir).expect("sync");
        }
        let once = stored_tables(&mut b);
        for dir in 0..4 {
            b.synchronize_edges(dir).expect("sync");
        }
        assert_eq!(stored_tables(&mut b), once);

        // stored slices: 0 left ghost, 1..=4 owned, 5 right ghost
        let sw = 8 * 4;
        let block = 6 * sw;
        let slice = |k: usize, dir: usize, xs: usize| {
            let at = dir * block + xs * sw;
            &once[k][at..at + sw]
        };
        for dir in 0..4 {
            assert!(slice(1, dir, 0).iter().any(|&v| v != 0.0), "dir {dir} ghost never filled");
            assert_eq!(slice(1, dir, 0), slice(0, dir, 4), "dir {dir}: part 1 left ghost");
            assert_eq!(slice(0, dir, 5), slice(1, dir, 1), "dir {dir}: part 0 right ghost");
            assert_eq!(slice(0, dir, 0), slice(1, dir, 4), "dir {dir}: part 0 left ghost wraps");
            assert_eq!(slice(1, dir, 5), slice(0, dir, 1), "dir {dir}: part 1 right ghost wraps");
        }
    }

    #[test]
    fn gather_scatter_restores_links() {
        let mut b = multi("GROUP=2\nL1=6\nLS=2\nLT=2\nINTS=2\n", &[2, 4], 1);
        b.fan_out(&|dev, part| part.initialize(dev, StartMode::GroupId))
            .expect("init");
        let links = b.gather_links().expect("gather");
        b.scatter_links(&vec![0.0; links.len()]).expect("zero");
        b.scatter_links(&links).expect("restore");
        assert_eq!(b.gather_links().expect("gather"), links);
        assert!(b.scatter_links(&links[1..]).is_err());
    }

    #[test]
    fn missing_device_is_rejected() {
        let p = RunParameters::default();
        let geom = Geometry::split_even(p.extents.clone(), 1).expect("geometry");
        let err = MultiPartition::new(geom, Vec::new(), Vec::new(), &[]);
        assert!(err.is_err());
    }
}

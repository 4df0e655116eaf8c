// SPDX-License-Identifier: AGPL-3.0-only

//! Cross-partition aggregation and run statistics.
//!
//! Per-part series values are averages over the part's owned sites, so the
//! whole-lattice value is the slab-weighted sum `Σ_k v_k · Nx_k / L0`.
//! Statistics skip sample 0 (the initial configuration).

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::{QcdError, Result};
use crate::geometry::Geometry;
use crate::kernels::host::cpu_check::CpuCheck;
use crate::kernels::{KernelConfig, DIFF_AXES};
use crate::sublattice::Series;

const AXES: [&str; DIFF_AXES] = ["x", "y", "z"];

/// Slab-weighted combination of one row from every part.
///
/// # Errors
///
/// [`QcdError::State`] if the number of rows and weights differ or rows
/// have different widths.
pub fn aggregate(parts: &[Vec<f64>], nx: &[usize], full_x: usize) -> Result<Vec<f64>> {
    if parts.len() != nx.len() || parts.is_empty() {
        return Err(QcdError::State(format!(
            "{} part rows for {} parts",
            parts.len(),
            nx.len()
        )));
    }
    let width = parts[0].len();
    let mut out = vec![0.0; width];
    for (row, &n) in parts.iter().zip(nx) {
        if row.len() != width {
            return Err(QcdError::State(format!("row width {} != {width}", row.len())));
        }
        let w = n as f64 / full_x as f64;
        for (o, v) in out.iter_mut().zip(row) {
            *o += v * w;
        }
    }
    Ok(out)
}

/// Mean and population variance over samples `1..`; zeros without any.
#[must_use]
pub fn mean_variance(series: &[f64]) -> (f64, f64) {
    let samples = series.get(1..).unwrap_or(&[]);
    if samples.is_empty() {
        return (0.0, 0.0);
    }
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    let var = samples.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var)
}

/// Denominator-weighted combination of two series.
#[must_use]
pub fn joint(a: &[f64], den_a: f64, b: &[f64], den_b: f64) -> Vec<f64> {
    let den = den_a + den_b;
    if den == 0.0 {
        return vec![0.0; a.len().min(b.len())];
    }
    a.iter()
        .zip(b)
        .map(|(x, y)| (x * den_a + y * den_b) / den)
        .collect()
}

/// Euclidean norm of three component series.
#[must_use]
pub fn joint3(a: &[f64], b: &[f64], c: &[f64]) -> Vec<f64> {
    a.iter()
        .zip(b)
        .zip(c)
        .map(|((x, y), z)| (x * x + y * y + z * z).sqrt())
        .collect()
}

/// Where a record's per-iteration values come from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Source {
    Column { series: Series, offset: usize },
    Joint {
        a: (Series, usize, f64),
        b: (Series, usize, f64),
    },
    Joint3([(Series, usize); 3]),
}

/// Host-recomputed quantity attached to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CpuValue {
    PlaquetteSpatial,
    PlaquetteTemporal,
    Plaquette,
    ActionSpatial,
    ActionTemporal,
    Action,
}

/// One registered observable and its statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataAnalysis {
    pub label: String,
    pub source: Source,
    pub mean: f64,
    pub variance: f64,
    /// Value of the last sample.
    pub last: f64,
    pub cpu: Option<CpuValue>,
    /// Last configuration recomputed on the host.
    pub cpu_last: Option<f64>,
}

impl DataAnalysis {
    fn new(label: impl Into<String>, source: Source) -> Self {
        Self {
            label: label.into(),
            source,
            mean: 0.0,
            variance: 0.0,
            last: 0.0,
            cpu: None,
            cpu_last: None,
        }
    }

    const fn checked(mut self, cpu: CpuValue) -> Self {
        self.cpu = Some(cpu);
        self
    }
}

/// Number of spatial and temporal planes of an `nd`-dimensional lattice.
#[must_use]
pub const fn plane_counts(nd: usize) -> (usize, usize) {
    let s = nd.saturating_sub(1);
    (s * s.saturating_sub(1) / 2, s)
}

/// Whole-lattice series buffers and the records built on them.
#[derive(Debug, Clone)]
pub struct ObservableAggregator {
    full_x: usize,
    nx: Vec<usize>,
    rows: usize,
    widths: BTreeMap<Series, usize>,
    series: BTreeMap<Series, Vec<f64>>,
}

impl ObservableAggregator {
    /// Buffers of `rows` iterations for every series enabled in `cfg`.
    #[must_use]
    pub fn new(geometry: &Geometry, cfg: &KernelConfig, rows: usize) -> Self {
        let mut widths = BTreeMap::new();
        let mut series = BTreeMap::new();
        for s in Series::ALL {
            let w = s.width(cfg);
            if w > 0 {
                widths.insert(s, w);
                series.insert(s, vec![0.0; rows * w]);
            }
        }
        Self {
            full_x: geometry.full[0],
            nx: geometry.extents(),
            rows,
            widths,
            series,
        }
    }

    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    #[must_use]
    pub fn width(&self, s: Series) -> usize {
        self.widths.get(&s).copied().unwrap_or(0)
    }

    /// Enabled series in a fixed order.
    pub fn enabled(&self) -> impl Iterator<Item = Series> + '_ {
        self.widths.keys().copied()
    }

    /// Whole-lattice buffer of `s`; empty when disabled.
    #[must_use]
    pub fn series(&self, s: Series) -> &[f64] {
        self.series.get(&s).map_or(&[], Vec::as_slice)
    }

    /// Replace a whole buffer (checkpoint restore).
    ///
    /// # Errors
    ///
    /// [`QcdError::Checkpoint`] on a size mismatch or disabled series.
    pub fn set_series(&mut self, s: Series, data: Vec<f64>) -> Result<()> {
        let slot = self
            .series
            .get_mut(&s)
            .ok_or_else(|| QcdError::Checkpoint(format!("{} series is disabled", s.label())))?;
        if slot.len() != data.len() {
            return Err(QcdError::Checkpoint(format!(
                "{} series holds {} words, checkpoint has {}",
                s.label(),
                slot.len(),
                data.len()
            )));
        }
        *slot = data;
        Ok(())
    }

    /// Aggregate one iteration row from the parts' rows.
    ///
    /// # Errors
    ///
    /// [`QcdError::State`] for a disabled series, bad iteration or row shape.
    pub fn aggregate_row(&mut self, s: Series, iteration: usize, parts: &[Vec<f64>]) -> Result<()> {
        let w = self.width(s);
        if iteration >= self.rows {
            return Err(QcdError::State(format!("iteration {iteration} outside {} rows", self.rows)));
        }
        let row = aggregate(parts, &self.nx, self.full_x)?;
        if row.len() != w {
            return Err(QcdError::State(format!("{} row of width {}", s.label(), row.len())));
        }
        let buf = self
            .series
            .get_mut(&s)
            .ok_or_else(|| QcdError::State(format!("{} series is disabled", s.label())))?;
        buf[iteration * w..(iteration + 1) * w].copy_from_slice(&row);
        Ok(())
    }

    /// One column over all rows.
    #[must_use]
    pub fn column(&self, s: Series, offset: usize) -> Vec<f64> {
        let w = self.width(s);
        if offset >= w {
            return Vec::new();
        }
        self.series(s).iter().skip(offset).step_by(w).copied().collect()
    }

    /// Per-iteration values of a record.
    #[must_use]
    pub fn values(&self, source: &Source) -> Vec<f64> {
        match source {
            Source::Column { series, offset } => self.column(*series, *offset),
            Source::Joint { a, b } => joint(&self.column(a.0, a.1), a.2, &self.column(b.0, b.1), b.2),
            Source::Joint3([a, b, c]) => joint3(
                &self.column(a.0, a.1),
                &self.column(b.0, b.1),
                &self.column(c.0, c.1),
            ),
        }
    }

    /// Mean, variance and last value over the first `count` rows.
    pub fn statistics(&self, records: &mut [DataAnalysis], count: usize) {
        for r in records {
            let values = self.values(&r.source);
            let used = &values[..count.min(values.len())];
            (r.mean, r.variance) = mean_variance(used);
            r.last = used.last().copied().unwrap_or(0.0);
        }
    }
}

/// Attach host-recomputed values to the records that have one.
pub fn apply_cpu_check(records: &mut [DataAnalysis], check: &CpuCheck, nd: usize) {
    let (ns, nt) = plane_counts(nd);
    let (ns, nt) = (ns as f64, nt as f64);
    let weigh = |s: f64, t: f64| {
        if ns + nt == 0.0 {
            0.0
        } else {
            (s * ns + t * nt) / (ns + nt)
        }
    };
    for r in records {
        r.cpu_last = r.cpu.map(|c| match c {
            CpuValue::PlaquetteSpatial => check.plaquette_spatial,
            CpuValue::PlaquetteTemporal => check.plaquette_temporal,
            CpuValue::Plaquette => weigh(check.plaquette_spatial, check.plaquette_temporal),
            CpuValue::ActionSpatial => check.action_spatial,
            CpuValue::ActionTemporal => check.action_temporal,
            CpuValue::Action => weigh(check.action_spatial, check.action_temporal),
        });
    }
}

/// Register every observable enabled in `cfg`, in report order.
#[must_use]
pub fn register(cfg: &KernelConfig) -> Vec<DataAnalysis> {
    let (ns, nt) = plane_counts(cfg.local.nd());
    let (ns, nt) = (ns as f64, nt as f64);
    let layout = &cfg.layout;
    let col = |series, offset| Source::Column { series, offset };
    let mut out = Vec::new();

    if layout.plaquettes {
        let p = Series::Plaquettes;
        out.push(DataAnalysis::new("plaquette spatial", col(p, 0)).checked(CpuValue::PlaquetteSpatial));
        out.push(DataAnalysis::new("plaquette temporal", col(p, 1)).checked(CpuValue::PlaquetteTemporal));
        out.push(
            DataAnalysis::new("plaquette", Source::Joint { a: (p, 0, ns), b: (p, 1, nt) })
                .checked(CpuValue::Plaquette),
        );
    }

    let e = Series::Energies;
    out.push(DataAnalysis::new("action spatial", col(e, 0)).checked(CpuValue::ActionSpatial));
    out.push(DataAnalysis::new("action temporal", col(e, 1)).checked(CpuValue::ActionTemporal));
    out.push(
        DataAnalysis::new("action", Source::Joint { a: (e, 0, ns), b: (e, 1, nt) })
            .checked(CpuValue::Action),
    );

    if let Some(off) = layout.tensor_offset {
        for (block, index) in cfg.tensor_indices.iter().enumerate() {
            let base = off + block * DIFF_AXES;
            for (j, axis) in AXES.iter().enumerate() {
                out.push(DataAnalysis::new(format!("F{index} {axis}"), col(e, base + j)));
            }
            out.push(DataAnalysis::new(
                format!("|F{index}|"),
                Source::Joint3([(e, base), (e, base + 1), (e, base + 2)]),
            ));
        }
    }

    if let Some(off) = layout.diff_offset {
        for (k, axis) in AXES.iter().enumerate().take(cfg.diff_axes()) {
            out.push(DataAnalysis::new(format!("action {axis} spatial"), col(e, off + 2 * k)));
            out.push(DataAnalysis::new(format!("action {axis} temporal"), col(e, off + 2 * k + 1)));
        }
    }

    if layout.polyakov_width > 0 {
        let p = Series::Polyakov;
        out.push(DataAnalysis::new("Re L", col(p, 0)));
        out.push(DataAnalysis::new("Im L", col(p, 1)));
        out.push(DataAnalysis::new("|L|^2", col(p, 2)));
        if layout.polyakov_diff() {
            for (k, axis) in AXES.iter().enumerate().take(cfg.diff_axes()) {
                out.push(DataAnalysis::new(format!("Re C_{axis}"), col(p, 3 + 2 * k)));
                out.push(DataAnalysis::new(format!("Im C_{axis}"), col(p, 4 + 2 * k)));
            }
        }
    }

    if layout.wilson {
        out.push(DataAnalysis::new(
            format!("W({},{})", cfg.wilson_r, cfg.wilson_t),
            col(Series::Wilson, 0),
        ));
    }
    out
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::{ParameterSet, RunParameters};
    use crate::geometry::LocalGeometry;

    #[test]
    fn equal_parts_average() {
        let rows = vec![vec![1.0, 4.0], vec![3.0, 8.0]];
        let out = aggregate(&rows, &[4, 4], 8).expect("aggregate");
        assert_eq!(out, vec![2.0, 6.0]);
    }

    #[test]
    fn unequal_parts_weigh_by_slab() {
        let rows = vec![vec![1.0], vec![4.0]];
        let out = aggregate(&rows, &[2, 6], 8).expect("aggregate");
        assert!((out[0] - 3.25).abs() < 1e-15);
        assert!(aggregate(&rows, &[8], 8).is_err());
    }

    #[test]
    fn sample_zero_is_skipped() {
        let (m, v) = mean_variance(&[100.0, 1.0, 2.0, 3.0, 4.0]);
        assert!((m - 2.5).abs() < 1e-15);
        assert!((v - 1.25).abs() < 1e-15);
        assert_eq!(mean_variance(&[5.0]), (0.0, 0.0));
        assert_eq!(mean_variance(&[]), (0.0, 0.0));
    }

    #[test]
    fn single_production_sample_is_its_own_mean() {
        assert_eq!(mean_variance(&[0.9, 0.6]), (0.6, 0.0));
    }

    #[test]
    fn joint_weighs_denominators() {
        let c = joint(&[1.0], 3.0, &[2.0], 1.0);
        assert!((c[0] - 1.25).abs() < 1e-15);
        let n = joint3(&[3.0], &[4.0], &[12.0]);
        assert!((n[0] - 13.0).abs() < 1e-15);
    }

    #[test]
    fn records_follow_enabled_features() {
        let p = RunParameters::from_set(
            &ParameterSet::parse("GROUP=2\nGETACTIONS\nPL_LEVEL=2\nGETWILSON\nWILSONR=2\n")
                .expect("parse"),
        )
        .expect("params");
        let cfg = KernelConfig::new(&p, LocalGeometry::whole(&p.extents));
        let labels: Vec<String> = register(&cfg).into_iter().map(|r| r.label).collect();
        assert_eq!(labels[0], "plaquette spatial");
        assert!(labels.contains(&"|F3|".to_string()));
        assert!(labels.contains(&"action z temporal".to_string()));
        assert!(labels.contains(&"Im C_y".to_string()));
        assert_eq!(labels.last().map(String::as_str), Some("W(2,1)"));
    }

    #[test]
    fn statistics_use_completed_rows() {
        let p = RunParameters::from_set(&ParameterSet::parse("GROUP=2\nITER=5\n").expect("parse"))
            .expect("params");
        let cfg = KernelConfig::new(&p, LocalGeometry::whole(&p.extents));
        let geom = Geometry::split_even(p.extents.clone(), 1).expect("geometry");
        let mut agg = ObservableAggregator::new(&geom, &cfg, p.iter);
        for (i, v) in [0.9, 0.5, 0.6, 0.7, 0.8].into_iter().enumerate() {
            agg.aggregate_row(Series::Plaquettes, i, &[vec![v, v]]).expect("row");
        }
        let mut records = register(&cfg);
        agg.statistics(&mut records, p.iter);
        let plaq = &records[2];
        assert!((plaq.mean - 0.65).abs() < 1e-12);
        assert!((plaq.last - 0.8).abs() < 1e-12);
    }
}

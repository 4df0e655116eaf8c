// SPDX-License-Identifier: AGPL-3.0-only

//! End-of-run report: a fixed-width text file and an optional JSON summary.
//!
//! The text file lists the configuration, devices, one line per observable
//! (mean, variance, last value, host recomputation), per-axis tables when
//! enabled, kernel timings, and finally one row per sample. The sample
//! header line names the columns in order.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::Serialize;

use crate::analysis::DataAnalysis;
use crate::config::RunParameters;
use crate::constants::REPORT_PREFIX;
use crate::controller::{LatticeController, RunState};
use crate::device::KernelTiming;
use crate::error::Result;
use crate::kernels::host::cpu_check::CpuCheck;

/// Timing table of one device.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceTimings {
    pub device: String,
    pub kernels: Vec<KernelTiming>,
}

/// Mean of per-axis observables.
#[derive(Debug, Clone, Serialize)]
pub struct AxisRow {
    pub axis: String,
    pub values: Vec<(String, f64)>,
}

/// Everything a report shows.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started: String,
    pub finished: String,
    pub state: RunState,
    pub parameters: RunParameters,
    pub strategy: String,
    pub devices: Vec<String>,
    pub partitions: Vec<usize>,
    pub nav_counter: usize,
    pub iter_counter: usize,
    pub records: Vec<DataAnalysis>,
    pub axes: Vec<AxisRow>,
    pub cpu_check: Option<CpuCheck>,
    pub timings: Vec<DeviceTimings>,
    /// Sample table; one column per record.
    #[serde(skip)]
    pub samples: Vec<Vec<f64>>,
}

const AXES: [&str; 3] = ["x", "y", "z"];

impl RunSummary {
    /// Snapshot of a controller's results.
    #[must_use]
    pub fn collect(c: &LatticeController) -> Self {
        let records = c.records().to_vec();
        let count = c.iter_counter();
        let columns: Vec<Vec<f64>> = c
            .aggregator()
            .map(|agg| records.iter().map(|r| agg.values(&r.source)).collect())
            .unwrap_or_default();
        let samples = (0..count)
            .map(|i| columns.iter().map(|col| col.get(i).copied().unwrap_or(0.0)).collect())
            .collect();

        let axes = AXES
            .iter()
            .filter_map(|&axis| {
                let values: Vec<(String, f64)> = records
                    .iter()
                    .filter(|r| axis_of(&r.label) == Some(axis))
                    .map(|r| (r.label.clone(), r.mean))
                    .collect();
                (!values.is_empty()).then(|| AxisRow {
                    axis: axis.to_string(),
                    values,
                })
            })
            .collect();

        let (strategy, devices, timings) = c.backend().map_or_else(
            || (String::from("none"), Vec::new(), Vec::new()),
            |b| {
                let timings = b
                    .timings()
                    .into_iter()
                    .map(|(device, kernels)| DeviceTimings { device, kernels })
                    .collect();
                (b.strategy().to_string(), b.device_names(), timings)
            },
        );

        Self {
            started: c.started().format("%Y-%m-%d %H:%M:%S").to_string(),
            finished: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            state: c.state(),
            parameters: c.params().clone(),
            strategy,
            devices,
            partitions: c.geometry().map(crate::geometry::Geometry::extents).unwrap_or_default(),
            nav_counter: c.nav_counter(),
            iter_counter: count,
            records,
            axes,
            cpu_check: c.cpu_check(),
            timings,
            samples,
        }
    }

    /// Render the text report.
    #[must_use]
    pub fn to_text(&self) -> String {
        let mut s = String::new();
        let _ = writeln!(s, "# {REPORT_PREFIX} report");
        let _ = writeln!(s, "# started {}  finished {}  state {:?}", self.started, self.finished, self.state);
        for line in self.parameters.to_string().lines() {
            let _ = writeln!(s, "# {line}");
        }
        let _ = writeln!(s, "# strategy {}  partitions {:?}", self.strategy, self.partitions);
        for (i, d) in self.devices.iter().enumerate() {
            let _ = writeln!(s, "# device [{i}] {d}");
        }
        let _ = writeln!(s, "# thermalization sweeps {}  samples {}", self.nav_counter, self.iter_counter);

        let _ = writeln!(s);
        let _ = writeln!(
            s,
            "{:<22} {:>16} {:>16} {:>16} {:>16}",
            "observable", "mean", "variance", "last", "last (host)"
        );
        for r in &self.records {
            let host = r.cpu_last.map_or_else(|| "-".to_string(), |v| format!("{v:.10}"));
            let _ = writeln!(
                s,
                "{:<22} {:>16.10} {:>16.6e} {:>16.10} {:>16}",
                r.label, r.mean, r.variance, r.last, host
            );
        }

        if !self.axes.is_empty() {
            let _ = writeln!(s);
            let _ = writeln!(s, "per-axis means");
            for row in &self.axes {
                let cells: Vec<String> = row
                    .values
                    .iter()
                    .map(|(label, v)| format!("{label} = {v:.10}"))
                    .collect();
                let _ = writeln!(s, "  {}: {}", row.axis, cells.join("  "));
            }
        }

        if !self.timings.is_empty() {
            let _ = writeln!(s);
            let _ = writeln!(s, "{:<28} {:>10} {:>14} {:>14}", "kernel", "calls", "total [s]", "mean [s]");
            for dev in &self.timings {
                let _ = writeln!(s, "  {}", dev.device);
                for t in &dev.kernels {
                    let _ = writeln!(
                        s,
                        "{:<28} {:>10} {:>14.6} {:>14.3e}",
                        t.name,
                        t.calls,
                        t.total_secs,
                        t.mean_secs()
                    );
                }
            }
        }

        let _ = writeln!(s);
        let header: Vec<String> = self.records.iter().map(|r| r.label.replace(' ', "_")).collect();
        let _ = writeln!(s, "# columns: iteration {}", header.join(" "));
        for (i, row) in self.samples.iter().enumerate() {
            let cells: Vec<String> = row.iter().map(|v| format!("{v:>18.12}")).collect();
            let _ = writeln!(s, "{i:>6} {}", cells.join(" "));
        }
        s
    }
}

/// Axis named by a per-axis record label.
fn axis_of(label: &str) -> Option<&'static str> {
    let candidate = match label.strip_prefix("action ") {
        Some(rest) => rest.split(' ').next()?,
        None => label.split_once("C_")?.1,
    };
    AXES.iter().copied().find(|&a| a == candidate)
}

fn stamped(dir: &Path, ext: &str) -> PathBuf {
    let ts = Local::now().format("%Y%m%d-%H%M%S");
    dir.join(format!("{REPORT_PREFIX}-{ts}.{ext}"))
}

/// Write the text report into `dir`.
///
/// # Errors
///
/// [`crate::error::QcdError::Io`].
pub fn write_text(summary: &RunSummary, dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = stamped(dir, "txt");
    std::fs::write(&path, summary.to_text())?;
    Ok(path)
}

/// Write the JSON summary into `dir`.
///
/// # Errors
///
/// [`crate::error::QcdError::Io`] and [`crate::error::QcdError::Json`].
pub fn write_json(summary: &RunSummary, dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = stamped(dir, "json");
    std::fs::write(&path, serde_json::to_string_pretty(summary)?)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axis_labels() {
        assert_eq!(axis_of("action y temporal"), Some("y"));
        assert_eq!(axis_of("Re C_z"), Some("z"));
        assert_eq!(axis_of("action spatial"), None);
        assert_eq!(axis_of("plaquette"), None);
    }
}

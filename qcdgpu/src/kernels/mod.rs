// SPDX-License-Identifier: AGPL-3.0-only

//! Kernel contract: names, argument arity and the per-partition
//! compile-time configuration.
//!
//! A [`KernelConfig`] is the structured replacement for compiler option
//! strings. Device backends turn it into whatever their compiler needs:
//! [`KernelConfig::defines`] renders it as a WGSL constant preamble, the
//! host device reads the fields directly.
//!
//! | Kernel | Buffers | Constant 0 |
//! |--------|---------|------------|
//! | `lattice_init_cold`, `lattice_init_gid` | links | – |
//! | `lattice_init_hot` | links, prns | – |
//! | `update_odd`, `update_even` | links, prns | direction |
//! | `orthogonalize` | links | – |
//! | primary measurement | links, measurement | – |
//! | `reduce_*` | measurement, series | iteration |
//! | `wilson_lt` | links, lt | – |
//! | `wilson_lr1`, `wilson_lr2` | links, aux_links, lr | – |
//! | `wilson_accumulate` | lr1, lr2, lt, aux_lt, measurement | – |

pub mod host;

use std::fmt;
use std::fmt::Write as _;
use std::str::FromStr;

use serde::Serialize;

use crate::config::{Precision, RunParameters, StartMode, TensorVariant};
use crate::constants::{MEASUREMENT_ROWS_BASE, MEASUREMENT_ROWS_TENSOR};
use crate::error::{QcdError, Result};
use crate::geometry::LocalGeometry;
use crate::group::heat_bath_uniforms;

/// Spatial axes that carry per-axis (x, y, z) measurements.
pub const DIFF_AXES: usize = 3;

/// Every kernel entry point of a lattice program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum KernelName {
    InitCold,
    InitHot,
    InitGid,
    UpdateOdd,
    UpdateEven,
    Orthogonalize,
    Plaquette,
    ReducePlaquette,
    Action,
    ReduceAction,
    ActionDiff(usize),
    ReduceActionDiff(usize),
    Polyakov,
    ReducePolyakov,
    PolyakovDiff(usize),
    ReducePolyakovDiff(usize),
    WilsonLt,
    WilsonLr1,
    WilsonLr2,
    WilsonAccumulate,
    ReduceWilson,
}

const AXIS_SUFFIX: [&str; DIFF_AXES] = ["x", "y", "z"];

impl KernelName {
    /// Entry-point name in the program.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        const ACTION_DIFF: [&str; DIFF_AXES] = ["action_diff_x", "action_diff_y", "action_diff_z"];
        const REDUCE_ACTION_DIFF: [&str; DIFF_AXES] = [
            "reduce_action_diff_x",
            "reduce_action_diff_y",
            "reduce_action_diff_z",
        ];
        const POLYAKOV_DIFF: [&str; DIFF_AXES] =
            ["polyakov_diff_x", "polyakov_diff_y", "polyakov_diff_z"];
        const REDUCE_POLYAKOV_DIFF: [&str; DIFF_AXES] = [
            "reduce_polyakov_diff_x",
            "reduce_polyakov_diff_y",
            "reduce_polyakov_diff_z",
        ];
        match self {
            Self::InitCold => "lattice_init_cold",
            Self::InitHot => "lattice_init_hot",
            Self::InitGid => "lattice_init_gid",
            Self::UpdateOdd => "update_odd",
            Self::UpdateEven => "update_even",
            Self::Orthogonalize => "orthogonalize",
            Self::Plaquette => "plaquette",
            Self::ReducePlaquette => "reduce_plaquette",
            Self::Action => "action",
            Self::ReduceAction => "reduce_action",
            Self::ActionDiff(k) => ACTION_DIFF[k % DIFF_AXES],
            Self::ReduceActionDiff(k) => REDUCE_ACTION_DIFF[k % DIFF_AXES],
            Self::Polyakov => "polyakov",
            Self::ReducePolyakov => "reduce_polyakov",
            Self::PolyakovDiff(k) => POLYAKOV_DIFF[k % DIFF_AXES],
            Self::ReducePolyakovDiff(k) => REDUCE_POLYAKOV_DIFF[k % DIFF_AXES],
            Self::WilsonLt => "wilson_lt",
            Self::WilsonLr1 => "wilson_lr1",
            Self::WilsonLr2 => "wilson_lr2",
            Self::WilsonAccumulate => "wilson_accumulate",
            Self::ReduceWilson => "reduce_wilson",
        }
    }

    /// Number of buffer arguments.
    #[must_use]
    pub const fn arity(self) -> usize {
        match self {
            Self::InitCold | Self::InitGid | Self::Orthogonalize => 1,
            Self::WilsonLr1 | Self::WilsonLr2 => 3,
            Self::WilsonAccumulate => 5,
            _ => 2,
        }
    }

    /// Reduction kernels take the iteration as constant 0.
    #[must_use]
    pub const fn is_reduction(self) -> bool {
        matches!(
            self,
            Self::ReducePlaquette
                | Self::ReduceAction
                | Self::ReduceActionDiff(_)
                | Self::ReducePolyakov
                | Self::ReducePolyakovDiff(_)
                | Self::ReduceWilson
        )
    }

    /// Init kernel for a start mode.
    #[must_use]
    pub const fn init(start: StartMode) -> Self {
        match start {
            StartMode::Hot => Self::InitHot,
            StartMode::Cold => Self::InitCold,
            StartMode::GroupId => Self::InitGid,
        }
    }

    /// Update kernel for a parity (1 = odd).
    #[must_use]
    pub const fn update(parity: usize) -> Self {
        if parity == 1 {
            Self::UpdateOdd
        } else {
            Self::UpdateEven
        }
    }
}

impl fmt::Display for KernelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KernelName {
    type Err = QcdError;

    fn from_str(s: &str) -> Result<Self> {
        let fixed = [
            Self::InitCold,
            Self::InitHot,
            Self::InitGid,
            Self::UpdateOdd,
            Self::UpdateEven,
            Self::Orthogonalize,
            Self::Plaquette,
            Self::ReducePlaquette,
            Self::Action,
            Self::ReduceAction,
            Self::Polyakov,
            Self::ReducePolyakov,
            Self::WilsonLt,
            Self::WilsonLr1,
            Self::WilsonLr2,
            Self::WilsonAccumulate,
            Self::ReduceWilson,
        ];
        if let Some(k) = fixed.into_iter().find(|k| k.as_str() == s) {
            return Ok(k);
        }
        for (axis, suffix) in AXIS_SUFFIX.iter().enumerate() {
            let Some(stem) = s.strip_suffix(suffix).and_then(|p| p.strip_suffix('_')) else {
                continue;
            };
            let found = match stem {
                "action_diff" => Some(Self::ActionDiff(axis)),
                "reduce_action_diff" => Some(Self::ReduceActionDiff(axis)),
                "polyakov_diff" => Some(Self::PolyakovDiff(axis)),
                "reduce_polyakov_diff" => Some(Self::ReducePolyakovDiff(axis)),
                _ => None,
            };
            if let Some(k) = found {
                return Ok(k);
            }
        }
        Err(QcdError::KernelBuild {
            kernel: s.to_string(),
            reason: "no such kernel in the lattice program".into(),
        })
    }
}

/// Where each observable lands in the scratch rows and series buffers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MeasurementLayout {
    /// Scratch rows per site.
    pub rows: usize,
    /// Words per iteration in `energies`.
    pub energies_width: usize,
    /// Column of the first tensor component in `energies`.
    pub tensor_offset: Option<usize>,
    /// Column of `S^x_s` in `energies`.
    pub diff_offset: Option<usize>,
    /// Words per iteration in `polyakov`; 0 when disabled.
    pub polyakov_width: usize,
    pub plaquettes: bool,
    pub wilson: bool,
}

impl MeasurementLayout {
    #[must_use]
    pub fn from_params(p: &RunParameters) -> Self {
        let mut width = 2;
        let tensor_offset = p.tensor.map(|_| {
            width += 2 * DIFF_AXES;
            2
        });
        let diff_offset = p.get_actions_avr.then(|| {
            let off = width;
            width += 2 * DIFF_AXES;
            off
        });
        let polyakov_width = match p.pl_level {
            0 => 0,
            1 => 3,
            _ => 3 + 2 * DIFF_AXES,
        };
        Self {
            rows: if p.tensor.is_some() {
                MEASUREMENT_ROWS_TENSOR
            } else {
                MEASUREMENT_ROWS_BASE
            },
            energies_width: width,
            tensor_offset,
            diff_offset,
            polyakov_width,
            plaquettes: p.get_plaquettes_avr,
            wilson: p.get_wilson,
        }
    }

    /// Field-tensor columns per iteration in `energies`.
    #[must_use]
    pub const fn tensor_width(&self) -> usize {
        if self.tensor_offset.is_some() {
            2 * DIFF_AXES
        } else {
            0
        }
    }

    /// Polyakov correlator columns are present.
    #[must_use]
    pub const fn polyakov_diff(&self) -> bool {
        self.polyakov_width > 3
    }
}

/// Compile-time configuration of one partition's lattice program.
#[derive(Debug, Clone, Serialize)]
pub struct KernelConfig {
    pub group: usize,
    pub local: LocalGeometry,
    pub precision: Precision,
    pub tbc: bool,
    pub phi: f64,
    pub omega: f64,
    pub tensor: Option<TensorVariant>,
    pub tensor_indices: [usize; 2],
    pub start: StartMode,
    pub nhit: usize,
    pub beta: f64,
    pub wilson_r: usize,
    pub wilson_t: usize,
    pub seed: u32,
    pub layout: MeasurementLayout,
    pub prns_len: usize,
}

impl KernelConfig {
    #[must_use]
    pub fn new(p: &RunParameters, local: LocalGeometry) -> Self {
        let layout = MeasurementLayout::from_params(p);
        let words = words_per_link(p.group);
        let subgroups = if p.group == 2 { 1 } else { 3 };
        let owned = local.owned_sites();
        let prns_len = (owned / 2 * heat_bath_uniforms(subgroups, p.nhit))
            .max(owned * local.nd() * words);
        Self {
            group: p.group,
            local,
            precision: p.precision,
            tbc: p.tbc,
            phi: p.phi,
            omega: p.omega,
            tensor: p.tensor,
            tensor_indices: p.tensor_indices(),
            start: p.start,
            nhit: p.nhit,
            beta: p.beta,
            wilson_r: p.wilson_r,
            wilson_t: p.wilson_t,
            seed: p.rand_series,
            layout,
            prns_len,
        }
    }

    /// Storage words per link.
    #[must_use]
    pub const fn words(&self) -> usize {
        words_per_link(self.group)
    }

    /// Number of spatial axes.
    #[must_use]
    pub fn spatial_axes(&self) -> usize {
        self.local.nd() - 1
    }

    /// Spatial axes that get per-axis measurements.
    #[must_use]
    pub fn diff_axes(&self) -> usize {
        self.spatial_axes().min(DIFF_AXES)
    }

    /// Words in the link table.
    #[must_use]
    pub fn links_len(&self) -> usize {
        self.local.nd() * self.local.stored_sites() * self.words()
    }

    #[must_use]
    pub fn measurement_len(&self) -> usize {
        self.local.padded_sites() * self.layout.rows
    }

    /// Words of one staged transporter slab (R slices).
    #[must_use]
    pub fn aux_len(&self) -> usize {
        self.wilson_r * self.local.slice_sites() * self.words()
    }

    /// Words of one chain buffer (`lr1`, `lr2`).
    #[must_use]
    pub fn chain_len(&self) -> usize {
        self.spatial_axes() * self.local.owned_sites() * self.words()
    }

    /// Validate that a program can be built for this configuration.
    ///
    /// # Errors
    ///
    /// [`QcdError::KernelBuild`] if `nd` is outside the kernel range.
    pub fn check(&self) -> Result<()> {
        use crate::constants::{KERNEL_ND_MAX, KERNEL_ND_MIN};
        let nd = self.local.nd();
        if !(KERNEL_ND_MIN..=KERNEL_ND_MAX).contains(&nd) {
            return Err(QcdError::KernelBuild {
                kernel: format!("su{}_lattice", self.group),
                reason: format!("kernels support {KERNEL_ND_MIN}..={KERNEL_ND_MAX} dimensions, got {nd}"),
            });
        }
        Ok(())
    }

    /// Render as WGSL constant declarations.
    #[must_use]
    pub fn defines(&self) -> String {
        let l = &self.local;
        let mut s = String::new();
        let mut u = |name: &str, v: usize| {
            let _ = writeln!(s, "const {name}: u32 = {v}u;");
        };
        u("SUN", self.group);
        u("ND", l.nd());
        for d in 0..4 {
            let local_extent = if d == 0 { l.nx } else { l.full.get(d).copied().unwrap_or(1) };
            u(&format!("N{}", d + 1), local_extent);
            u(&format!("FULL_N{}", d + 1), l.full.get(d).copied().unwrap_or(1));
        }
        u("X_OFFSET", l.x0);
        u("LEFT_SITES", l.left_sites());
        u("OWNED_SITES", l.owned_sites());
        u("STORED_SITES", l.stored_sites());
        u("PADDED_SITES", l.padded_sites());
        u("WORKGROUP", l.workgroup);
        u("HALO", usize::from(l.halo));
        u("WORDS", self.words());
        u("PRECISION", self.precision.code() as usize);
        u("TBC", usize::from(self.tbc));
        u("TENSOR", TensorVariant::code(self.tensor) as usize);
        u("TENSOR_I1", self.tensor_indices[0]);
        u("TENSOR_I2", self.tensor_indices[1]);
        u("START", self.start.code() as usize);
        u("NHIT", self.nhit);
        u("WILSON_R", self.wilson_r);
        u("WILSON_T", self.wilson_t);
        u("SEED", self.seed as usize);
        u("ROWS", self.layout.rows);
        u("ENERGIES_WIDTH", self.layout.energies_width);
        u("TENSOR_OFFSET", self.layout.tensor_offset.unwrap_or(0));
        u("DIFF_OFFSET", self.layout.diff_offset.unwrap_or(0));
        u("POLYAKOV_WIDTH", self.layout.polyakov_width);
        let _ = writeln!(s, "const BETA: f32 = {:?};", self.beta as f32);
        let _ = writeln!(s, "const PHI: f32 = {:?};", self.phi as f32);
        let _ = writeln!(s, "const OMEGA: f32 = {:?};", self.omega as f32);
        s
    }
}

/// Storage words per link of SU(`group`).
#[must_use]
pub const fn words_per_link(group: usize) -> usize {
    if group == 2 {
        4
    } else {
        12
    }
}

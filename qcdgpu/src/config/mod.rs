// SPDX-License-Identifier: AGPL-3.0-only

//! Typed run parameters built from a [`ParameterSet`].
//!
//! | Key | Field | Default |
//! |-----|-------|---------|
//! | `GROUP` | gauge group order (2, 3) | 3 |
//! | `ND` | number of dimensions | 4 |
//! | `L1`..`L4`, `LS`, `LT` | extents (LS: spatial axes, LT: time) | 4 |
//! | `ITER`, `NITER`, `NAV`, `NHIT` | sample rows, sweeps per row, thermalization sweeps, heat-bath tries | 10, 1, 10, 10 |
//! | `BETA`, `PHI`, `OMEGA` | coupling and twist angles | 5.7, 0, 0 |
//! | `TBC` | twisted boundary conditions | off |
//! | `INTS` | start: 0 hot, 1 cold, 2 group-id | 1 |
//! | `PLATFORM`, `DEVICE` | 0 host CPU, 1 wgpu; comma list of device numbers | auto |
//! | `PARTS`, `PARTSIZE` | part count or explicit axis-0 extents | one part |
//! | `PRECISION` | single, double, mixed (1, 2, 3) | double |
//! | `GETWILSON`, `WILSONR`, `WILSONT` | Wilson loop and its extents | off, 1, 1 |
//! | `GETRETRACE` | plaquette series | on |
//! | `GETACTIONS` | per-axis action series | off |
//! | `FMUNU`, `F0MU`, `TURNOFFFMUNU` | magnetic / electric tensor, or none | magnetic |
//! | `FMUNU1`..`FMUNU7` | first tensor generator index | 3 |
//! | `PL_LEVEL` | Polyakov detail: 0 off, 1 loop, 2 with correlators | 1 |
//! | `RANDSERIES`, `PRNG`, `PRNGSKIP` | PRNG series, kind (LCG, CHACHA8), start counter | 0, CHACHA8, 0 |
//! | `OUTPUTPATH`, `FINISHPATH`, `KERNELPATH` | directories | `.`, none, none |
//! | `SAVEINTERVAL`, `FINALSAVE`, `RESUME` | checkpoint policy | none, on, off |
//! | `TURNOFFWAITING`, `REBUILDBINARY` | no end prompt; force kernel re-assembly | off |

pub mod parser;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Serialize;

pub use parser::ParameterSet;

use crate::constants::MAX_ND;
use crate::error::{QcdError, Result};

/// Lattice initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StartMode {
    Hot,
    Cold,
    /// Deterministic per-link element keyed by the global link id.
    GroupId,
}

impl StartMode {
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::Hot => 0,
            Self::Cold => 1,
            Self::GroupId => 2,
        }
    }

    /// # Errors
    ///
    /// [`QcdError::Config`] for codes other than 0, 1, 2.
    pub fn from_code(code: u32) -> Result<Self> {
        match code {
            0 => Ok(Self::Hot),
            1 => Ok(Self::Cold),
            2 => Ok(Self::GroupId),
            _ => Err(QcdError::config(format!("unknown start mode {code}"))),
        }
    }
}

/// Link storage precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Precision {
    Single,
    Double,
    /// f32 links, f64 reductions.
    Mixed,
}

impl Precision {
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::Single => 1,
            Self::Double => 2,
            Self::Mixed => 3,
        }
    }

    /// # Errors
    ///
    /// [`QcdError::Config`] for codes other than 1, 2, 3.
    pub fn from_code(code: u32) -> Result<Self> {
        match code {
            1 => Ok(Self::Single),
            2 => Ok(Self::Double),
            3 => Ok(Self::Mixed),
            _ => Err(QcdError::config(format!("unknown precision {code}"))),
        }
    }

    /// Whether link words are stored as f64.
    #[must_use]
    pub const fn links_f64(self) -> bool {
        matches!(self, Self::Double)
    }

    /// Whether measurement reductions are kept in f64.
    #[must_use]
    pub const fn reductions_f64(self) -> bool {
        !matches!(self, Self::Single)
    }
}

impl FromStr for Precision {
    type Err = QcdError;
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" | "1" => Ok(Self::Single),
            "double" | "2" => Ok(Self::Double),
            "mixed" | "3" => Ok(Self::Mixed),
            other => Err(QcdError::config(format!("unknown precision `{other}`"))),
        }
    }
}

/// PRNG generator kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PrngKind {
    Lcg,
    ChaCha8,
}

impl PrngKind {
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::Lcg => 1,
            Self::ChaCha8 => 2,
        }
    }

    /// # Errors
    ///
    /// [`QcdError::Config`] for codes other than 1, 2.
    pub fn from_code(code: u32) -> Result<Self> {
        match code {
            1 => Ok(Self::Lcg),
            2 => Ok(Self::ChaCha8),
            _ => Err(QcdError::config(format!("unknown PRNG kind {code}"))),
        }
    }
}

impl FromStr for PrngKind {
    type Err = QcdError;
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LCG" | "1" => Ok(Self::Lcg),
            "CHACHA8" | "CHACHA" | "2" => Ok(Self::ChaCha8),
            other => Err(QcdError::config(format!("unknown PRNG `{other}`"))),
        }
    }
}

/// Which field-strength components are measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TensorVariant {
    /// `F_ij` (spatial planes) arranged by `ε_ijk`.
    Magnetic,
    /// `F_kt` (space-time planes).
    Electric,
}

impl TensorVariant {
    #[must_use]
    pub const fn code(this: Option<Self>) -> u32 {
        match this {
            None => 0,
            Some(Self::Magnetic) => 1,
            Some(Self::Electric) => 2,
        }
    }

    #[must_use]
    pub const fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(Self::Magnetic),
            2 => Some(Self::Electric),
            _ => None,
        }
    }
}

/// Device platform selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Platform {
    /// In-process host kernels.
    Host,
    /// wgpu adapters.
    Wgpu,
}

/// How axis 0 is split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Decomposition {
    /// One part per selected device; a single device runs undecomposed.
    Auto,
    /// `PARTS=n`: `n` near-equal parts with halos (even `n = 1`).
    Parts(usize),
    /// `PARTSIZE=a,b,...`: explicit extents.
    Extents(Vec<usize>),
}

/// Every parameter of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunParameters {
    pub group: usize,
    pub nd: usize,
    pub extents: Vec<usize>,
    pub iter: usize,
    pub niter: usize,
    pub nav: usize,
    pub nhit: usize,
    pub beta: f64,
    pub phi: f64,
    pub omega: f64,
    pub tbc: bool,
    pub start: StartMode,
    pub platform: Option<Platform>,
    pub devices: Vec<usize>,
    pub decomposition: Decomposition,
    pub precision: Precision,
    pub get_wilson: bool,
    pub wilson_r: usize,
    pub wilson_t: usize,
    pub get_plaquettes_avr: bool,
    pub get_actions_avr: bool,
    pub tensor: Option<TensorVariant>,
    pub tensor_index1: Option<usize>,
    pub pl_level: u32,
    pub rand_series: u32,
    pub prng: PrngKind,
    pub prng_skip: u64,
    pub output_path: PathBuf,
    pub finish_path: Option<PathBuf>,
    pub kernel_path: Option<PathBuf>,
    pub save_interval: Option<u64>,
    pub final_save: bool,
    pub resume: bool,
    pub turnoff_waiting: bool,
    pub rebuild_binary: bool,
}

impl Default for RunParameters {
    fn default() -> Self {
        Self {
            group: 3,
            nd: 4,
            extents: vec![4; 4],
            iter: 10,
            niter: 1,
            nav: 10,
            nhit: 10,
            beta: 5.7,
            phi: 0.0,
            omega: 0.0,
            tbc: false,
            start: StartMode::Cold,
            platform: None,
            devices: Vec::new(),
            decomposition: Decomposition::Auto,
            precision: Precision::Double,
            get_wilson: false,
            wilson_r: 1,
            wilson_t: 1,
            get_plaquettes_avr: true,
            get_actions_avr: false,
            tensor: Some(TensorVariant::Magnetic),
            tensor_index1: None,
            pl_level: 1,
            rand_series: 0,
            prng: PrngKind::ChaCha8,
            prng_skip: 0,
            output_path: PathBuf::from("."),
            finish_path: None,
            kernel_path: None,
            save_interval: None,
            final_save: true,
            resume: false,
            turnoff_waiting: false,
            rebuild_binary: false,
        }
    }
}

/// Extent keys are resolved after all entries, since `LS`/`LT` depend on `ND`.
#[derive(Default)]
struct ExtentKeys {
    l: [Option<usize>; 4],
    ls: Option<usize>,
    lt: Option<usize>,
}

impl RunParameters {
    /// Apply a parameter set on top of the defaults and validate.
    ///
    /// # Errors
    ///
    /// [`QcdError::Config`] for unknown keys, unparsable values, or values
    /// out of range.
    pub fn from_set(set: &ParameterSet) -> Result<Self> {
        let mut p = Self::default();
        let mut ext = ExtentKeys::default();
        for (key, value) in set.iter() {
            p.apply(key, value, &mut ext)?;
        }
        p.resolve_extents(&ext);
        p.validate()?;
        Ok(p)
    }

    fn apply(&mut self, key: &str, value: &str, ext: &mut ExtentKeys) -> Result<()> {
        match key {
            "GROUP" => self.group = num(key, value)?,
            "ND" => self.nd = num(key, value)?,
            "L1" | "L2" | "L3" | "L4" => {
                let axis = usize::from(key.as_bytes()[1] - b'1');
                ext.l[axis] = Some(num(key, value)?);
            }
            "LS" => ext.ls = Some(num(key, value)?),
            "LT" => ext.lt = Some(num(key, value)?),
            "ITER" => self.iter = num(key, value)?,
            "NITER" => self.niter = num(key, value)?,
            "NAV" => self.nav = num(key, value)?,
            "NHIT" => self.nhit = num(key, value)?,
            "BETA" => self.beta = num(key, value)?,
            "PHI" => self.phi = num(key, value)?,
            "OMEGA" => self.omega = num(key, value)?,
            "TBC" => self.tbc = flag(key, value)?,
            "INTS" => self.start = StartMode::from_code(num(key, value)?)?,
            "PLATFORM" => {
                self.platform = match num::<u32>(key, value)? {
                    0 => Some(Platform::Host),
                    1 => Some(Platform::Wgpu),
                    other => {
                        return Err(QcdError::config(format!("unknown PLATFORM {other}")));
                    }
                }
            }
            "DEVICE" => self.devices = list(key, value)?,
            "PARTS" => self.decomposition = Decomposition::Parts(num(key, value)?),
            "PARTSIZE" => self.decomposition = Decomposition::Extents(list(key, value)?),
            "PRECISION" => self.precision = value.parse()?,
            "GETWILSON" => self.get_wilson = flag(key, value)?,
            "WILSONR" => self.wilson_r = num(key, value)?,
            "WILSONT" => self.wilson_t = num(key, value)?,
            "GETRETRACE" => self.get_plaquettes_avr = flag(key, value)?,
            "GETACTIONS" => self.get_actions_avr = flag(key, value)?,
            "TURNOFFFMUNU" => {
                if flag(key, value)? {
                    self.tensor = None;
                }
            }
            "FMUNU" => {
                if flag(key, value)? {
                    self.tensor = Some(TensorVariant::Magnetic);
                }
            }
            "F0MU" => {
                if flag(key, value)? {
                    self.tensor = Some(TensorVariant::Electric);
                }
            }
            "FMUNU1" | "FMUNU2" | "FMUNU4" | "FMUNU5" | "FMUNU6" | "FMUNU7" => {
                if flag(key, value)? {
                    self.tensor_index1 = Some(usize::from(key.as_bytes()[5] - b'0'));
                }
            }
            "PL_LEVEL" => self.pl_level = num(key, value)?,
            "RANDSERIES" => self.rand_series = num(key, value)?,
            "PRNG" => self.prng = value.parse()?,
            "PRNGSKIP" => self.prng_skip = num(key, value)?,
            "OUTPUTPATH" => self.output_path = PathBuf::from(value),
            "FINISHPATH" => self.finish_path = Some(PathBuf::from(value)),
            "KERNELPATH" => self.kernel_path = Some(PathBuf::from(value)),
            "SAVEINTERVAL" => {
                let secs: u64 = num(key, value)?;
                self.save_interval = (secs > 0).then_some(secs);
            }
            "FINALSAVE" => self.final_save = flag(key, value)?,
            "RESUME" => self.resume = flag(key, value)?,
            "TURNOFFWAITING" => self.turnoff_waiting = flag(key, value)?,
            "REBUILDBINARY" => self.rebuild_binary = flag(key, value)?,
            _ => return Err(QcdError::config(format!("unknown variable `{key}`"))),
        }
        Ok(())
    }

    fn resolve_extents(&mut self, ext: &ExtentKeys) {
        let nd = self.nd.clamp(1, MAX_ND);
        self.extents = (0..nd)
            .map(|d| {
                let explicit = ext.l.get(d).copied().flatten();
                let by_role = if d + 1 == nd { ext.lt } else { ext.ls };
                explicit.or(by_role).unwrap_or(4)
            })
            .collect();
    }

    /// Range checks that do not depend on devices.
    ///
    /// # Errors
    ///
    /// [`QcdError::Config`] naming the offending parameter.
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.group, 2 | 3) {
            return Err(QcdError::config(format!(
                "GROUP must be 2 or 3, got {}",
                self.group
            )));
        }
        if self.nd == 0 || self.nd > MAX_ND {
            return Err(QcdError::config(format!(
                "ND must be between 1 and {MAX_ND}, got {}",
                self.nd
            )));
        }
        if let Some((d, l)) = self
            .extents
            .iter()
            .enumerate()
            .find(|(_, &l)| l == 0 || l % 2 != 0)
        {
            return Err(QcdError::config(format!(
                "extent L{} = {l} must be positive and even",
                d + 1
            )));
        }
        if self.iter == 0 || self.niter == 0 || self.nhit == 0 {
            return Err(QcdError::config("ITER, NITER and NHIT must be positive"));
        }
        if !self.beta.is_finite() || self.beta < 0.0 {
            return Err(QcdError::config(format!("BETA must be >= 0, got {}", self.beta)));
        }
        if self.pl_level > 2 {
            return Err(QcdError::config(format!(
                "PL_LEVEL must be 0, 1 or 2, got {}",
                self.pl_level
            )));
        }
        if self.get_wilson {
            if self.wilson_r == 0 || self.wilson_t == 0 {
                return Err(QcdError::config("WILSONR and WILSONT must be positive"));
            }
            let lt = self.extents[self.nd - 1];
            if self.wilson_t > lt {
                return Err(QcdError::config(format!(
                    "WILSONT = {} exceeds the time extent {lt}",
                    self.wilson_t
                )));
            }
            if let Some(ls) = self.extents[..self.nd - 1].iter().min() {
                if self.wilson_r > *ls {
                    return Err(QcdError::config(format!(
                        "WILSONR = {} exceeds the smallest spatial extent {ls}",
                        self.wilson_r
                    )));
                }
            }
        }
        let [i1, i2] = self.tensor_indices();
        let generators = self.group * self.group - 1;
        if i1 == 0 || i1 > generators || i2 > generators {
            return Err(QcdError::config(format!(
                "tensor generator index {i1} is out of range for SU({})",
                self.group
            )));
        }
        if let Decomposition::Parts(0) = self.decomposition {
            return Err(QcdError::config("PARTS must be positive"));
        }
        Ok(())
    }

    /// Generator indices of the two measured tensor components.
    #[must_use]
    pub fn tensor_indices(&self) -> [usize; 2] {
        let (default1, second) = if self.group == 2 { (3, 1) } else { (3, 8) };
        [self.tensor_index1.unwrap_or(default1), second]
    }

    /// Whether the field-strength tensor rows are measured.
    #[must_use]
    pub const fn get_fmunu(&self) -> bool {
        self.tensor.is_some()
    }

    /// Number of spatial axes (all but time).
    #[must_use]
    pub const fn spatial_axes(&self) -> usize {
        self.nd - 1
    }

    /// Checkpoint file inside the output directory.
    #[must_use]
    pub fn checkpoint_path(&self) -> PathBuf {
        self.output_path.join(crate::constants::CHECKPOINT_FILE)
    }
}

impl fmt::Display for RunParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let extents: Vec<String> = self.extents.iter().map(ToString::to_string).collect();
        writeln!(f, "SU({}) in {} dimensions, lattice {}", self.group, self.nd, extents.join("x"))?;
        writeln!(
            f,
            "BETA={} PHI={} OMEGA={} TBC={} start={:?} precision={:?}",
            self.beta, self.phi, self.omega, self.tbc, self.start, self.precision
        )?;
        writeln!(
            f,
            "NAV={} ITER={} NITER={} NHIT={}",
            self.nav, self.iter, self.niter, self.nhit
        )?;
        write!(
            f,
            "PRNG={:?} RANDSERIES={} PRNGSKIP={}",
            self.prng, self.rand_series, self.prng_skip
        )
    }
}

fn num<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| QcdError::config(format!("{key}: cannot parse `{value}`")))
}

fn flag(key: &str, value: &str) -> Result<bool> {
    match value.trim() {
        "" | "1" => Ok(true),
        "0" => Ok(false),
        other => Err(QcdError::config(format!("{key}: flag expects 0 or 1, got `{other}`"))),
    }
}

fn list(key: &str, value: &str) -> Result<Vec<usize>> {
    value
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|s| num(key, s))
        .collect()
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    fn params(text: &str) -> Result<RunParameters> {
        RunParameters::from_set(&ParameterSet::parse(text)?)
    }

    #[test]
    fn defaults_are_valid() {
        let p = params("").expect("defaults");
        assert_eq!(p.extents, vec![4, 4, 4, 4]);
        assert_eq!(p.tensor_indices(), [3, 8]);
    }

    #[test]
    fn ls_lt_resolved_against_nd() {
        let p = params("LT=8\nLS=6\nND=3\n").expect("params");
        assert_eq!(p.extents, vec![6, 6, 8]);
        let p = params("ND=4\nLS=4\nL1=8\n").expect("params");
        assert_eq!(p.extents, vec![8, 4, 4, 4]);
    }

    #[test]
    fn unknown_key_rejected() {
        let err = params("NOPE=1\n").expect_err("unknown");
        assert!(err.to_string().contains("NOPE"));
    }

    #[test]
    fn group_and_nd_limits() {
        assert!(params("GROUP=4\n").is_err());
        assert!(params("ND=33\n").is_err());
        assert!(params("ND=32\nLS=2\nLT=2\n").is_ok());
    }

    #[test]
    fn odd_extent_rejected() {
        assert!(params("L2=5\n").is_err());
    }

    #[test]
    fn tensor_switches() {
        let p = params("TURNOFFFMUNU\n").expect("params");
        assert!(!p.get_fmunu());
        let p = params("F0MU\nGROUP=2\nFMUNU2\n").expect("params");
        assert_eq!(p.tensor, Some(TensorVariant::Electric));
        assert_eq!(p.tensor_indices(), [2, 1]);
        assert!(params("GROUP=2\nFMUNU5\n").is_err());
    }

    #[test]
    fn platform_devices_and_parts() {
        let p = params("PLATFORM=0\nDEVICE=0,0\nPARTSIZE=2,2\n").expect("params");
        assert_eq!(p.platform, Some(Platform::Host));
        assert_eq!(p.devices, vec![0, 0]);
        assert_eq!(p.decomposition, Decomposition::Extents(vec![2, 2]));
    }

    #[test]
    fn prng_and_precision_names() {
        let p = params("PRNG=lcg\nPRECISION=mixed\n").expect("params");
        assert_eq!(p.prng, PrngKind::Lcg);
        assert_eq!(p.precision, Precision::Mixed);
        assert!(params("PRNG=mt19937\n").is_err());
    }

    #[test]
    fn wilson_extent_checked() {
        assert!(params("GETWILSON\nWILSONR=5\n").is_err());
        assert!(params("GETWILSON\nWILSONR=2\nWILSONT=4\n").is_ok());
    }

    #[test]
    fn codes_round_trip() {
        for m in [StartMode::Hot, StartMode::Cold, StartMode::GroupId] {
            assert_eq!(StartMode::from_code(m.code()).expect("code"), m);
        }
        for p in [Precision::Single, Precision::Double, Precision::Mixed] {
            assert_eq!(Precision::from_code(p.code()).expect("code"), p);
        }
        assert_eq!(
            TensorVariant::from_code(TensorVariant::code(Some(TensorVariant::Electric))),
            Some(TensorVariant::Electric)
        );
    }
}

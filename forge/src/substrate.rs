// SPDX-License-Identifier: AGPL-3.0-only

//! Substrate abstraction: compute devices discovered at runtime.
//!
//! A substrate is anything that can execute the lattice kernel contract.
//! The host CPU always qualifies (it runs the reference kernels in-process);
//! GPUs come from wgpu adapter enumeration and only qualify when a kernel
//! program directory is available.
//!
//! Routing asks "can you run lattice kernels in f64?", never "are you
//! adapter #0?".

use serde::Serialize;
use std::fmt;

/// A compute substrate discovered at runtime.
#[derive(Debug, Clone, Serialize)]
pub struct Substrate {
    pub kind: SubstrateKind,
    pub identity: Identity,
    pub properties: Properties,
    pub capabilities: Vec<Capability>,
}

/// How we found this device and what to call it.
#[derive(Debug, Clone, Serialize)]
pub struct Identity {
    pub name: String,
    /// Driver string from wgpu, e.g. "NVIDIA (580.82.09)".
    pub driver: Option<String>,
    /// wgpu backend, e.g. "Vulkan".
    pub backend: Option<String>,
    /// wgpu adapter index, used as the `DEVICE` number on platform 1.
    pub adapter_index: Option<usize>,
}

/// Measured properties of a substrate.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Properties {
    /// Total memory in bytes (RAM for CPU, max buffer size for GPU).
    pub memory_bytes: Option<u64>,
    pub core_count: Option<u32>,
    pub thread_count: Option<u32>,
    /// Supports IEEE 754 f64 in shaders (GPU) or natively (CPU).
    pub has_f64: bool,
    pub has_timestamps: bool,
    /// Largest workgroup the device accepts along x.
    pub max_workgroup: Option<u32>,
}

/// The kind of compute device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SubstrateKind {
    Gpu,
    Cpu,
}

/// A capability discovered at runtime on a substrate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Capability {
    /// IEEE 754 f64 compute (GPU `SHADER_F64` or CPU native).
    F64Compute,
    F32Compute,
    /// WGSL shader dispatch via wgpu.
    ShaderDispatch,
    /// Can execute the lattice kernel contract (init, update, measure, reduce).
    LatticeKernels,
    /// AVX2 SIMD on CPU.
    SimdVector,
    TimestampQuery,
}

impl fmt::Display for SubstrateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gpu => write!(f, "GPU"),
            Self::Cpu => write!(f, "CPU"),
        }
    }
}

impl fmt::Display for Substrate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.identity.name, self.kind)?;
        if let Some(ref driver) = self.identity.driver {
            write!(f, " {driver}")?;
        }
        if let Some(mem) = self.properties.memory_bytes {
            let mb = mem / (1024 * 1024);
            write!(f, " {mb}MB")?;
        }
        Ok(())
    }
}

impl Substrate {
    /// Check if this substrate has a specific capability.
    #[must_use]
    pub fn has(&self, cap: &Capability) -> bool {
        self.capabilities.contains(cap)
    }

    /// Grant a capability after discovery (e.g. kernels became available).
    pub fn grant(&mut self, cap: Capability) {
        if !self.has(&cap) {
            self.capabilities.push(cap);
        }
    }

    /// Return capabilities as a summary string.
    #[must_use]
    pub fn capability_summary(&self) -> String {
        let labels: Vec<&str> = self.capabilities.iter().map(Capability::label).collect();
        labels.join(", ")
    }
}

impl Capability {
    /// Human-readable label for display.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::F64Compute => "f64",
            Self::F32Compute => "f32",
            Self::ShaderDispatch => "shader",
            Self::LatticeKernels => "lattice",
            Self::SimdVector => "simd",
            Self::TimestampQuery => "timestamps",
        }
    }
}

impl Identity {
    /// Minimal identity with just a name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            driver: None,
            backend: None,
            adapter_index: None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    fn test_gpu() -> Substrate {
        Substrate {
            kind: SubstrateKind::Gpu,
            identity: Identity {
                adapter_index: Some(0),
                ..Identity::named("Test GPU")
            },
            properties: Properties {
                has_f64: true,
                ..Properties::default()
            },
            capabilities: vec![Capability::F64Compute, Capability::ShaderDispatch],
        }
    }

    #[test]
    fn has_capability() {
        let gpu = test_gpu();
        assert!(gpu.has(&Capability::F64Compute));
        assert!(!gpu.has(&Capability::LatticeKernels));
    }

    #[test]
    fn grant_is_idempotent() {
        let mut gpu = test_gpu();
        gpu.grant(Capability::LatticeKernels);
        gpu.grant(Capability::LatticeKernels);
        assert!(gpu.has(&Capability::LatticeKernels));
        assert_eq!(gpu.capabilities.len(), 3);
    }

    #[test]
    fn display_shows_kind_and_name() {
        let s = format!("{}", test_gpu());
        assert!(s.contains("Test GPU"));
        assert!(s.contains("GPU"));
    }

    #[test]
    fn capability_summary_joins_labels() {
        assert_eq!(test_gpu().capability_summary(), "f64, shader");
    }
}

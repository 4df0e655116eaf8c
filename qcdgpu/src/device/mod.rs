// SPDX-License-Identifier: AGPL-3.0-only

//! Device abstraction: buffers, programs, kernels, timers.
//!
//! The controller and sub-lattices only talk to devices through
//! [`DeviceBackend`]. Buffer contents cross the boundary as f64; a device
//! stores `F32` buffers rounded to single precision.
//!
//! ```text
//! buffer_init ─► buffer_write ─► program_build ─► kernel_init ─► kernel_bind
//!                                                     │
//!                     buffer_map ◄── kernel_run ◄── kernel_set_constant
//! ```
//!
//! - `host` — in-process execution of the kernel contract
//! - `wgpu_device` — external WGSL programs on a wgpu adapter

pub mod host;
pub mod wgpu_device;

use std::time::Duration;

use serde::Serialize;

use crate::error::Result;
use crate::kernels::KernelConfig;

pub use host::HostDevice;
pub use wgpu_device::WgpuDevice;

/// Handle of a device buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub usize);

/// Handle of a built program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramId(pub usize);

/// Handle of a kernel entry point with its bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KernelId(pub usize);

/// Element type of a device buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ElementKind {
    F32,
    F64,
}

impl ElementKind {
    #[must_use]
    pub const fn bytes(self) -> usize {
        match self {
            Self::F32 => 4,
            Self::F64 => 8,
        }
    }

    /// Value as the buffer stores it.
    #[must_use]
    pub fn quantize(self, v: f64) -> f64 {
        match self {
            Self::F32 => f64::from(v as f32),
            Self::F64 => v,
        }
    }
}

/// Accumulated wall time of one kernel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KernelTiming {
    pub name: String,
    pub calls: u64,
    pub total_secs: f64,
}

impl KernelTiming {
    #[must_use]
    pub fn mean_secs(&self) -> f64 {
        if self.calls == 0 {
            0.0
        } else {
            self.total_secs / self.calls as f64
        }
    }
}

/// Accumulate `elapsed` for `name` into a timing table.
pub(crate) fn record_timing(table: &mut Vec<KernelTiming>, name: &str, elapsed: Duration) {
    if let Some(t) = table.iter_mut().find(|t| t.name == name) {
        t.calls += 1;
        t.total_secs += elapsed.as_secs_f64();
    } else {
        table.push(KernelTiming {
            name: name.to_string(),
            calls: 1,
            total_secs: elapsed.as_secs_f64(),
        });
    }
}

/// A compute device that can hold lattice buffers and run lattice kernels.
pub trait DeviceBackend: Send {
    /// Human-readable device name.
    fn name(&self) -> String;

    /// Workgroup multiple every site-indexed size is rounded up to.
    fn preferred_workgroup(&self) -> usize;

    /// Allocate a zeroed buffer of `len` elements.
    ///
    /// # Errors
    ///
    /// [`crate::error::QcdError::Device`] if the allocation fails or the
    /// element kind is unsupported.
    fn buffer_init(&mut self, label: &str, kind: ElementKind, len: usize) -> Result<BufferId>;

    /// Write `data` starting at element `offset`.
    ///
    /// # Errors
    ///
    /// [`crate::error::QcdError::Device`] on an unknown buffer or a write
    /// past its end.
    fn buffer_write(&mut self, buffer: BufferId, offset: usize, data: &[f64]) -> Result<()>;

    /// Read `len` elements starting at `offset`. Blocks until the device is idle.
    ///
    /// # Errors
    ///
    /// [`crate::error::QcdError::Device`] on an unknown buffer, an
    /// out-of-range read, or a failed mapping.
    fn buffer_map(&mut self, buffer: BufferId, offset: usize, len: usize) -> Result<Vec<f64>>;

    /// Build a lattice program for one partition.
    ///
    /// # Errors
    ///
    /// [`crate::error::QcdError::KernelBuild`] if the program cannot be built.
    fn program_build(&mut self, config: &KernelConfig) -> Result<ProgramId>;

    /// Create a kernel for entry point `name` of `program`.
    ///
    /// # Errors
    ///
    /// [`crate::error::QcdError::KernelBuild`] for an unknown entry point.
    fn kernel_init(&mut self, program: ProgramId, name: &str) -> Result<KernelId>;

    /// Bind argument buffers in contract order.
    ///
    /// # Errors
    ///
    /// [`crate::error::QcdError::KernelBuild`] if the count does not match.
    fn kernel_bind(&mut self, kernel: KernelId, buffers: &[BufferId]) -> Result<()>;

    /// Set constant `slot` (0..4) for the next runs.
    ///
    /// # Errors
    ///
    /// [`crate::error::QcdError::KernelRun`] for an unknown kernel or slot.
    fn kernel_set_constant(&mut self, kernel: KernelId, slot: usize, value: u32) -> Result<()>;

    /// Run a kernel over `global_size` work items and wait for completion.
    ///
    /// # Errors
    ///
    /// [`crate::error::QcdError::KernelRun`] if the dispatch fails.
    fn kernel_run(&mut self, kernel: KernelId, global_size: usize) -> Result<()>;

    /// Accumulated kernel timings.
    fn timers(&self) -> Vec<KernelTiming>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn f32_quantization_rounds() {
        let v = 0.1_f64;
        assert_ne!(ElementKind::F32.quantize(v), v);
        assert_eq!(ElementKind::F64.quantize(v), v);
    }

    #[test]
    fn timing_table_accumulates() {
        let mut t = Vec::new();
        record_timing(&mut t, "update_odd", Duration::from_millis(2));
        record_timing(&mut t, "update_odd", Duration::from_millis(4));
        record_timing(&mut t, "plaquette", Duration::from_millis(1));
        assert_eq!(t.len(), 2);
        assert_eq!(t[0].calls, 2);
        assert!((t[0].mean_secs() - 0.003).abs() < 1e-9);
    }
}

// SPDX-License-Identifier: AGPL-3.0-only

//! wgpu device running external WGSL lattice programs.
//!
//! A program is `su{N}_lattice.wgsl` from `KERNELPATH`, prefixed with the
//! constant preamble of its [`KernelConfig`]. The assembled text is kept
//! under the system temp directory keyed by its hash; `REBUILDBINARY`
//! discards the cache before building.
//!
//! ## Adapter selection
//!
//! | `QCDGPU_GPU_ADAPTER` | Behavior |
//! |----------------------|----------|
//! | *(unset)*, `auto` | discrete with `SHADER_F64` first, then any f64, then any GPU |
//! | `0`, `1`, … | adapter by enumeration index |
//! | substring | case-insensitive name match |
//!
//! An explicit `DEVICE=` index overrides the variable.
//!
//! ## Module structure
//!
//! - `adapter` — adapter discovery and selection
//! - `buffers` — storage buffers, upload, staged readback
//! - `dispatch` — layouts, pipelines, bindings, dispatch

mod adapter;
mod buffers;
mod dispatch;

pub use adapter::{enumerate_adapters, AdapterInfo};
pub use buffers::{mapped_bytes_to_f32, mapped_bytes_to_f64};
pub use dispatch::split_workgroups;

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{QcdError, Result};
use crate::kernels::KernelConfig;

use super::{BufferId, DeviceBackend, ElementKind, KernelId, KernelTiming, ProgramId};

struct WgpuProgram {
    module: wgpu::ShaderModule,
    workgroup: usize,
}

/// GPU device over one wgpu adapter.
pub struct WgpuDevice {
    info: AdapterInfo,
    runtime: tokio::runtime::Runtime,
    device: wgpu::Device,
    queue: wgpu::Queue,
    kernel_path: PathBuf,
    rebuild: bool,
    buffers: Vec<buffers::WgpuBuffer>,
    programs: Vec<WgpuProgram>,
    kernels: Vec<dispatch::WgpuKernel>,
    timings: Vec<KernelTiming>,
}

impl WgpuDevice {
    /// Open adapter `index` (or the selected one) and request a device,
    /// enabling `SHADER_F64` when the adapter has it.
    ///
    /// # Errors
    ///
    /// [`QcdError::NoDevice`] if no adapter matches, [`QcdError::Device`]
    /// if the runtime or device cannot be created.
    pub fn open(index: Option<usize>, kernel_path: &Path, rebuild: bool) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .map_err(|e| QcdError::device(format!("tokio runtime: {e}")))?;
        let instance = adapter::create_instance();
        let (selected, info) = adapter::select_adapter(&instance, index)?;

        let mut required_features = wgpu::Features::empty();
        if info.has_f64 {
            required_features |= wgpu::Features::SHADER_F64;
        }
        let limits = selected.limits();
        let required_limits = wgpu::Limits {
            max_storage_buffer_binding_size: limits.max_storage_buffer_binding_size,
            max_buffer_size: limits.max_buffer_size,
            max_storage_buffers_per_shader_stage: limits.max_storage_buffers_per_shader_stage.min(8),
            ..wgpu::Limits::default()
        };

        let (device, queue) = runtime
            .block_on(selected.request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("qcdgpu lattice device"),
                    required_features,
                    required_limits,
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None,
            ))
            .map_err(|e| QcdError::device(e.to_string()))?;
        info!(adapter = %info, "wgpu device ready");

        Ok(Self {
            info,
            runtime,
            device,
            queue,
            kernel_path: kernel_path.to_path_buf(),
            rebuild,
            buffers: Vec::new(),
            programs: Vec::new(),
            kernels: Vec::new(),
            timings: Vec::new(),
        })
    }

    #[must_use]
    pub const fn adapter(&self) -> &AdapterInfo {
        &self.info
    }

    fn assemble(&self, config: &KernelConfig) -> Result<String> {
        let file = self.kernel_path.join(format!("su{}_lattice.wgsl", config.group));
        let body = std::fs::read_to_string(&file).map_err(|e| QcdError::KernelBuild {
            kernel: file.display().to_string(),
            reason: e.to_string(),
        })?;
        let source = format!("{}\n{body}", config.defines());

        let cache = std::env::temp_dir().join("qcdgpu-kernels");
        if self.rebuild && cache.exists() {
            std::fs::remove_dir_all(&cache)?;
        }
        let mut hasher = DefaultHasher::new();
        source.hash(&mut hasher);
        let cached = cache.join(format!("{:016x}.wgsl", hasher.finish()));
        if cached.exists() {
            debug!(path = %cached.display(), "program text cached");
        } else {
            std::fs::create_dir_all(&cache)?;
            std::fs::write(&cached, &source)?;
        }
        Ok(source)
    }
}

impl DeviceBackend for WgpuDevice {
    fn name(&self) -> String {
        self.info.to_string()
    }

    fn preferred_workgroup(&self) -> usize {
        let limits = self.device.limits();
        (limits.max_compute_workgroup_size_x as usize).min(crate::constants::DEFAULT_WORKGROUP)
    }

    fn buffer_init(&mut self, label: &str, kind: ElementKind, len: usize) -> Result<BufferId> {
        self.create_storage(label, kind, len)
    }

    fn buffer_write(&mut self, buffer: BufferId, offset: usize, data: &[f64]) -> Result<()> {
        self.upload(buffer, offset, data)
    }

    fn buffer_map(&mut self, buffer: BufferId, offset: usize, len: usize) -> Result<Vec<f64>> {
        self.read_back(buffer, offset, len)
    }

    fn program_build(&mut self, config: &KernelConfig) -> Result<ProgramId> {
        config.check()?;
        let source = self.assemble(config)?;
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("lattice program"),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });
        if let Some(err) = self.runtime.block_on(self.device.pop_error_scope()) {
            return Err(QcdError::KernelBuild {
                kernel: format!("su{}_lattice", config.group),
                reason: err.to_string(),
            });
        }
        self.programs.push(WgpuProgram {
            module,
            workgroup: config.local.workgroup,
        });
        Ok(ProgramId(self.programs.len() - 1))
    }

    fn kernel_init(&mut self, program: ProgramId, name: &str) -> Result<KernelId> {
        self.create_kernel(program, name)
    }

    fn kernel_bind(&mut self, kernel: KernelId, buffers: &[BufferId]) -> Result<()> {
        self.bind(kernel, buffers)
    }

    fn kernel_set_constant(&mut self, kernel: KernelId, slot: usize, value: u32) -> Result<()> {
        self.set_constant(kernel, slot, value)
    }

    fn kernel_run(&mut self, kernel: KernelId, global_size: usize) -> Result<()> {
        self.dispatch(kernel, global_size)
    }

    fn timers(&self) -> Vec<KernelTiming> {
        self.timings.clone()
    }
}

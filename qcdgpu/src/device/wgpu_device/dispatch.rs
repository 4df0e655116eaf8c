// SPDX-License-Identifier: AGPL-3.0-only

//! Kernel pipelines, bindings and dispatch.
//!
//! Every lattice kernel sees the same layout: `arity` read-write storage
//! buffers at bindings `0..arity` and a uniform `vec4<u32>` of constants
//! at binding `arity`. Layouts are explicit so unused bindings survive
//! shader compilation.
//!
//! ```text
//! kernel_init()  → layout + pipeline (error scope → KernelBuild)
//! kernel_bind()  → bind group
//! kernel_run()   → write constants, ONE submission, wait
//! ```

use std::time::Instant;

use crate::device::{record_timing, BufferId, KernelId, ProgramId};
use crate::error::{QcdError, Result};
use crate::kernels::KernelName;

use super::WgpuDevice;

/// Split workgroup count into (x, y, 1) for 2D dispatch when x > 65535.
/// Shaders linearize via `gid.x + gid.y * num_workgroups.x * WORKGROUP`.
pub fn split_workgroups(total: u32) -> (u32, u32, u32) {
    if total <= 65535 {
        (total, 1, 1)
    } else {
        let y = total.div_ceil(65535);
        let x = total.div_ceil(y);
        (x, y, 1)
    }
}

pub(super) struct WgpuKernel {
    pub name: KernelName,
    pub workgroup: usize,
    pub layout: wgpu::BindGroupLayout,
    pub pipeline: wgpu::ComputePipeline,
    pub constants_buffer: wgpu::Buffer,
    pub constants: [u32; 4],
    pub bind_group: Option<wgpu::BindGroup>,
}

fn layout_entries(arity: usize) -> Vec<wgpu::BindGroupLayoutEntry> {
    let storage = (0..arity).map(|i| wgpu::BindGroupLayoutEntry {
        binding: i as u32,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: false },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    });
    storage
        .chain(std::iter::once(wgpu::BindGroupLayoutEntry {
            binding: arity as u32,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }))
        .collect()
}

impl WgpuDevice {
    pub(super) fn create_kernel(&mut self, program: ProgramId, name: &str) -> Result<KernelId> {
        let kernel: KernelName = name.parse()?;
        let prog = self.programs.get(program.0).ok_or_else(|| QcdError::KernelBuild {
            kernel: name.to_string(),
            reason: format!("unknown program {}", program.0),
        })?;

        let layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(name),
                entries: &layout_entries(kernel.arity()),
            });
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(name),
                bind_group_layouts: &[&layout],
                push_constant_ranges: &[],
            });

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = self
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(name),
                layout: Some(&pipeline_layout),
                module: &prog.module,
                entry_point: name,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                cache: None,
            });
        if let Some(err) = self.runtime.block_on(self.device.pop_error_scope()) {
            return Err(QcdError::KernelBuild {
                kernel: name.to_string(),
                reason: err.to_string(),
            });
        }

        let constants_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("kernel constants"),
            size: 16,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        self.kernels.push(WgpuKernel {
            name: kernel,
            workgroup: prog.workgroup,
            layout,
            pipeline,
            constants_buffer,
            constants: [0; 4],
            bind_group: None,
        });
        Ok(KernelId(self.kernels.len() - 1))
    }

    pub(super) fn bind(&mut self, id: KernelId, buffers: &[BufferId]) -> Result<()> {
        let k = self.kernels.get_mut(id.0).ok_or_else(|| unknown_kernel(id))?;
        if buffers.len() != k.name.arity() {
            return Err(QcdError::KernelBuild {
                kernel: k.name.to_string(),
                reason: format!("expects {} buffers, got {}", k.name.arity(), buffers.len()),
            });
        }
        let mut entries = Vec::with_capacity(buffers.len() + 1);
        for (i, b) in buffers.iter().enumerate() {
            let storage = self
                .buffers
                .get(b.0)
                .ok_or_else(|| QcdError::device(format!("unknown buffer {}", b.0)))?;
            entries.push(wgpu::BindGroupEntry {
                binding: i as u32,
                resource: storage.buffer.as_entire_binding(),
            });
        }
        entries.push(wgpu::BindGroupEntry {
            binding: buffers.len() as u32,
            resource: k.constants_buffer.as_entire_binding(),
        });
        k.bind_group = Some(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(k.name.as_str()),
            layout: &k.layout,
            entries: &entries,
        }));
        Ok(())
    }

    pub(super) fn set_constant(&mut self, id: KernelId, slot: usize, value: u32) -> Result<()> {
        let k = self.kernels.get_mut(id.0).ok_or_else(|| unknown_kernel(id))?;
        let name = k.name;
        let c = k.constants.get_mut(slot).ok_or_else(|| QcdError::KernelRun {
            kernel: name.to_string(),
            reason: format!("constant slot {slot} out of range"),
        })?;
        *c = value;
        Ok(())
    }

    pub(super) fn dispatch(&mut self, id: KernelId, global_size: usize) -> Result<()> {
        let k = self.kernels.get(id.0).ok_or_else(|| unknown_kernel(id))?;
        let name = k.name;
        let bind_group = k.bind_group.as_ref().ok_or_else(|| QcdError::KernelRun {
            kernel: name.to_string(),
            reason: "arguments not bound".into(),
        })?;
        let groups = u32::try_from(global_size.div_ceil(k.workgroup.max(1))).map_err(|_| {
            QcdError::KernelRun {
                kernel: name.to_string(),
                reason: format!("global size {global_size} too large"),
            }
        })?;

        let start = Instant::now();
        self.queue
            .write_buffer(&k.constants_buffer, 0, bytemuck::cast_slice(&k.constants));
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(name.as_str()),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(name.as_str()),
                timestamp_writes: None,
            });
            pass.set_pipeline(&k.pipeline);
            pass.set_bind_group(0, bind_group, &[]);
            let (wx, wy, wz) = split_workgroups(groups);
            pass.dispatch_workgroups(wx, wy, wz);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        self.device.poll(wgpu::Maintain::Wait);
        record_timing(&mut self.timings, name.as_str(), start.elapsed());
        Ok(())
    }
}

fn unknown_kernel(id: KernelId) -> QcdError {
    QcdError::KernelRun {
        kernel: format!("#{}", id.0),
        reason: "unknown kernel".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_dispatch_is_one_dimensional() {
        assert_eq!(split_workgroups(1024), (1024, 1, 1));
    }

    #[test]
    fn large_dispatch_splits_and_covers() {
        let (x, y, z) = split_workgroups(200_000);
        assert!(x <= 65535);
        assert!(x * y >= 200_000);
        assert_eq!(z, 1);
    }

    #[test]
    fn layout_ends_with_constants_uniform() {
        let e = layout_entries(3);
        assert_eq!(e.len(), 4);
        assert!(matches!(
            e[3].ty,
            wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                ..
            }
        ));
    }
}

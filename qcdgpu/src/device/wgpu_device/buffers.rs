// SPDX-License-Identifier: AGPL-3.0-only

//! Storage buffer creation, upload and staged readback.

use crate::device::{BufferId, ElementKind};
use crate::error::{QcdError, Result};

use super::WgpuDevice;

pub(super) struct WgpuBuffer {
    pub label: String,
    pub kind: ElementKind,
    pub len: usize,
    pub buffer: wgpu::Buffer,
}

impl WgpuDevice {
    pub(super) fn create_storage(&mut self, label: &str, kind: ElementKind, len: usize) -> Result<BufferId> {
        if kind == ElementKind::F64 && !self.info.has_f64 {
            return Err(QcdError::device(format!(
                "`{label}` needs f64 storage but {} lacks SHADER_F64",
                self.info.name
            )));
        }
        // wgpu rejects zero-sized bindings
        let size = (len.max(1) * kind.bytes()).next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT as usize);
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: size as u64,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        self.buffers.push(WgpuBuffer {
            label: label.to_string(),
            kind,
            len,
            buffer,
        });
        Ok(BufferId(self.buffers.len() - 1))
    }

    pub(super) fn storage(&self, id: BufferId) -> Result<&WgpuBuffer> {
        self.buffers
            .get(id.0)
            .ok_or_else(|| QcdError::device(format!("unknown buffer {}", id.0)))
    }

    pub(super) fn upload(&self, id: BufferId, offset: usize, data: &[f64]) -> Result<()> {
        let b = self.storage(id)?;
        if offset + data.len() > b.len {
            return Err(QcdError::device(format!(
                "write of {} words at {offset} past the end of `{}` ({} words)",
                data.len(),
                b.label,
                b.len
            )));
        }
        let at = (offset * b.kind.bytes()) as u64;
        match b.kind {
            ElementKind::F64 => self
                .queue
                .write_buffer(&b.buffer, at, bytemuck::cast_slice(data)),
            ElementKind::F32 => {
                let narrow: Vec<f32> = data.iter().map(|&v| v as f32).collect();
                self.queue
                    .write_buffer(&b.buffer, at, bytemuck::cast_slice(&narrow));
            }
        }
        Ok(())
    }

    pub(super) fn read_back(&self, id: BufferId, offset: usize, len: usize) -> Result<Vec<f64>> {
        let b = self.storage(id)?;
        if offset + len > b.len {
            return Err(QcdError::device(format!(
                "map of {len} words at {offset} past the end of `{}` ({} words)",
                b.label, b.len
            )));
        }
        if len == 0 {
            return Ok(Vec::new());
        }
        let bytes = b.kind.bytes();
        // copies must be 4-byte aligned; odd f32 windows read one extra word
        let padded = (len * bytes).next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT as usize);
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback"),
            size: padded as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("readback"),
            });
        encoder.copy_buffer_to_buffer(
            &b.buffer,
            (offset * bytes) as u64,
            &staging,
            0,
            padded as u64,
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);
        receiver
            .recv()
            .map_err(|_| QcdError::device("map callback: channel recv failed"))?
            .map_err(|e| QcdError::device(format!("buffer mapping: {e}")))?;

        let data = slice.get_mapped_range();
        let mut out = match b.kind {
            ElementKind::F64 => mapped_bytes_to_f64(&data),
            ElementKind::F32 => mapped_bytes_to_f32(&data),
        };
        drop(data);
        staging.unmap();
        out.truncate(len);
        Ok(out)
    }
}

/// Convert mapped bytes to f64 values.
///
/// Mapped ranges are normally aligned, so `bytemuck::try_cast_slice`
/// succeeds; otherwise fall back to per-word conversion.
pub fn mapped_bytes_to_f64(data: &[u8]) -> Vec<f64> {
    bytemuck::try_cast_slice(data).map_or_else(
        |_| {
            data.chunks_exact(8)
                .map(|chunk| {
                    let mut b = [0u8; 8];
                    b.copy_from_slice(chunk);
                    f64::from_le_bytes(b)
                })
                .collect()
        },
        <[f64]>::to_vec,
    )
}

/// Convert mapped bytes of f32 storage to widened f64 values.
pub fn mapped_bytes_to_f32(data: &[u8]) -> Vec<f64> {
    bytemuck::try_cast_slice::<u8, f32>(data).map_or_else(
        |_| {
            data.chunks_exact(4)
                .map(|chunk| {
                    let mut b = [0u8; 4];
                    b.copy_from_slice(chunk);
                    f64::from(f32::from_le_bytes(b))
                })
                .collect()
        },
        |words| words.iter().map(|&v| f64::from(v)).collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unaligned_bytes_still_decode() {
        let mut raw = vec![0u8];
        raw.extend_from_slice(&1.5f64.to_le_bytes());
        raw.extend_from_slice(&(-2.0f64).to_le_bytes());
        assert_eq!(mapped_bytes_to_f64(&raw[1..]), vec![1.5, -2.0]);
    }

    #[test]
    fn f32_bytes_widen() {
        let words = [0.25f32, 3.0];
        let bytes: &[u8] = bytemuck::cast_slice(&words);
        assert_eq!(mapped_bytes_to_f32(bytes), vec![0.25, 3.0]);
    }
}

// SPDX-License-Identifier: AGPL-3.0-only

//! In-process device running the host kernels.
//!
//! Buffers are `Vec<f64>`; `F32` buffers are rounded to single precision on
//! every write and after every kernel that binds them, so a host run sees
//! the same storage precision as a device run. Site loops inside kernels
//! use the rayon pool.

use std::mem;
use std::time::Instant;

use crate::constants::DEFAULT_WORKGROUP;
use crate::error::{QcdError, Result};
use crate::kernels::{host, KernelConfig, KernelName};

use super::{
    record_timing, BufferId, DeviceBackend, ElementKind, KernelId, KernelTiming, ProgramId,
};

struct HostBuffer {
    label: String,
    kind: ElementKind,
    data: Vec<f64>,
}

struct HostKernel {
    program: ProgramId,
    name: KernelName,
    args: Vec<BufferId>,
    constants: [u32; 4],
}

/// Reference device executing the kernel contract on the CPU.
pub struct HostDevice {
    index: usize,
    buffers: Vec<HostBuffer>,
    programs: Vec<KernelConfig>,
    kernels: Vec<HostKernel>,
    timings: Vec<KernelTiming>,
}

impl HostDevice {
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self {
            index,
            buffers: Vec::new(),
            programs: Vec::new(),
            kernels: Vec::new(),
            timings: Vec::new(),
        }
    }

    fn buffer(&self, id: BufferId) -> Result<&HostBuffer> {
        self.buffers
            .get(id.0)
            .ok_or_else(|| QcdError::device(format!("unknown buffer {}", id.0)))
    }

    fn kernel_mut(&mut self, id: KernelId) -> Result<&mut HostKernel> {
        self.kernels.get_mut(id.0).ok_or_else(|| QcdError::KernelRun {
            kernel: format!("#{}", id.0),
            reason: "unknown kernel".into(),
        })
    }

    /// Words in use across all buffers.
    #[must_use]
    pub fn allocated_words(&self) -> usize {
        self.buffers.iter().map(|b| b.data.len()).sum()
    }
}

impl DeviceBackend for HostDevice {
    fn name(&self) -> String {
        format!("host:{}", self.index)
    }

    fn preferred_workgroup(&self) -> usize {
        DEFAULT_WORKGROUP
    }

    fn buffer_init(&mut self, label: &str, kind: ElementKind, len: usize) -> Result<BufferId> {
        self.buffers.push(HostBuffer {
            label: label.to_string(),
            kind,
            data: vec![0.0; len],
        });
        Ok(BufferId(self.buffers.len() - 1))
    }

    fn buffer_write(&mut self, buffer: BufferId, offset: usize, data: &[f64]) -> Result<()> {
        let b = self
            .buffers
            .get_mut(buffer.0)
            .ok_or_else(|| QcdError::device(format!("unknown buffer {}", buffer.0)))?;
        let end = offset + data.len();
        if end > b.data.len() {
            return Err(QcdError::device(format!(
                "write of {} words at {offset} past the end of `{}` ({} words)",
                data.len(),
                b.label,
                b.data.len()
            )));
        }
        let kind = b.kind;
        for (dst, &v) in b.data[offset..end].iter_mut().zip(data) {
            *dst = kind.quantize(v);
        }
        Ok(())
    }

    fn buffer_map(&mut self, buffer: BufferId, offset: usize, len: usize) -> Result<Vec<f64>> {
        let b = self.buffer(buffer)?;
        b.data
            .get(offset..offset + len)
            .map(<[f64]>::to_vec)
            .ok_or_else(|| {
                QcdError::device(format!(
                    "map of {len} words at {offset} past the end of `{}` ({} words)",
                    b.label,
                    b.data.len()
                ))
            })
    }

    fn program_build(&mut self, config: &KernelConfig) -> Result<ProgramId> {
        config.check()?;
        self.programs.push(config.clone());
        Ok(ProgramId(self.programs.len() - 1))
    }

    fn kernel_init(&mut self, program: ProgramId, name: &str) -> Result<KernelId> {
        if program.0 >= self.programs.len() {
            return Err(QcdError::KernelBuild {
                kernel: name.to_string(),
                reason: format!("unknown program {}", program.0),
            });
        }
        let name: KernelName = name.parse()?;
        self.kernels.push(HostKernel {
            program,
            name,
            args: Vec::new(),
            constants: [0; 4],
        });
        Ok(KernelId(self.kernels.len() - 1))
    }

    fn kernel_bind(&mut self, kernel: KernelId, buffers: &[BufferId]) -> Result<()> {
        for &b in buffers {
            self.buffer(b)?;
        }
        let k = self.kernel_mut(kernel)?;
        if buffers.len() != k.name.arity() {
            return Err(QcdError::KernelBuild {
                kernel: k.name.to_string(),
                reason: format!("expects {} buffers, got {}", k.name.arity(), buffers.len()),
            });
        }
        k.args = buffers.to_vec();
        Ok(())
    }

    fn kernel_set_constant(&mut self, kernel: KernelId, slot: usize, value: u32) -> Result<()> {
        let k = self.kernel_mut(kernel)?;
        let name = k.name;
        let c = k.constants.get_mut(slot).ok_or_else(|| QcdError::KernelRun {
            kernel: name.to_string(),
            reason: format!("constant slot {slot} out of range"),
        })?;
        *c = value;
        Ok(())
    }

    fn kernel_run(&mut self, kernel: KernelId, _global_size: usize) -> Result<()> {
        let (program, name, args, constants) = {
            let k = self.kernel_mut(kernel)?;
            (k.program, k.name, k.args.clone(), k.constants)
        };
        if args.len() != name.arity() {
            return Err(QcdError::KernelRun {
                kernel: name.to_string(),
                reason: "arguments not bound".into(),
            });
        }
        let mut taken: Vec<Vec<f64>> = Vec::with_capacity(args.len());
        for id in &args {
            taken.push(mem::take(&mut self.buffers[id.0].data));
        }

        let start = Instant::now();
        let result = host::run(&self.programs[program.0], name, constants, &mut taken);
        let elapsed = start.elapsed();

        for (id, mut data) in args.iter().zip(taken) {
            let buf = &mut self.buffers[id.0];
            if buf.kind == ElementKind::F32 {
                for v in &mut data {
                    *v = ElementKind::F32.quantize(*v);
                }
            }
            buf.data = data;
        }
        record_timing(&mut self.timings, name.as_str(), elapsed);
        result
    }

    fn timers(&self) -> Vec<KernelTiming> {
        self.timings.clone()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::{ParameterSet, RunParameters};
    use crate::geometry::LocalGeometry;

    #[test]
    fn f32_buffers_round_on_write() {
        let mut d = HostDevice::new(0);
        let b = d.buffer_init("x", ElementKind::F32, 4).expect("init");
        d.buffer_write(b, 1, &[0.1, 0.2]).expect("write");
        let v = d.buffer_map(b, 0, 4).expect("map");
        assert_eq!(v[0], 0.0);
        assert_eq!(v[1], f64::from(0.1_f32));
        assert!(d.buffer_write(b, 3, &[1.0, 2.0]).is_err());
        assert!(d.buffer_map(b, 2, 3).is_err());
    }

    #[test]
    fn unknown_kernel_name_fails_to_build() {
        let p = RunParameters::from_set(&ParameterSet::parse("GROUP=2\n").expect("parse"))
            .expect("params");
        let mut d = HostDevice::new(0);
        let prog = d
            .program_build(&KernelConfig::new(&p, LocalGeometry::whole(&p.extents)))
            .expect("program");
        let err = d.kernel_init(prog, "warp_drive").expect_err("unknown");
        assert!(err.is_fatal());
    }

    #[test]
    fn cold_init_runs_through_the_device() {
        let p = RunParameters::from_set(&ParameterSet::parse("GROUP=2\nLS=2\nLT=2\n").expect("parse"))
            .expect("params");
        let cfg = KernelConfig::new(&p, LocalGeometry::whole(&p.extents));
        let mut d = HostDevice::new(0);
        let links = d.buffer_init("links", ElementKind::F64, cfg.links_len()).expect("buffer");
        let prog = d.program_build(&cfg).expect("program");
        let k = d.kernel_init(prog, "lattice_init_cold").expect("kernel");
        assert!(d.kernel_run(k, 16).is_err());
        d.kernel_bind(k, &[links]).expect("bind");
        d.kernel_run(k, 16).expect("run");
        let v = d.buffer_map(links, 0, 4).expect("map");
        assert_eq!(v, vec![1.0, 0.0, 0.0, 0.0]);
        assert_eq!(d.timers()[0].name, "lattice_init_cold");
    }
}

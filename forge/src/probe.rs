// SPDX-License-Identifier: AGPL-3.0-only

//! Hardware probing: GPUs via wgpu, CPU via procfs.
//!
//! GPU discovery reads adapter name, device type, driver, backend and
//! feature flags (`SHADER_F64`, `TIMESTAMP_QUERY`) straight from wgpu.
//! CPU discovery reads `/proc/cpuinfo` for model, core count and SIMD flags.
//! Neither probe grants [`Capability::LatticeKernels`] to GPUs; that is
//! decided by the caller once it knows whether kernel programs exist.

use crate::substrate::{Capability, Identity, Properties, Substrate, SubstrateKind};
use std::fs;

/// Probe all GPU adapters via wgpu.
///
/// The returned `adapter_index` is the enumeration index, which is the
/// number a user passes as `DEVICE` on platform 1.
#[must_use]
pub fn probe_gpus() -> Vec<Substrate> {
    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    });

    let adapters = instance.enumerate_adapters(wgpu::Backends::all());
    let mut gpus = Vec::new();

    for (idx, adapter) in adapters.into_iter().enumerate() {
        let info = adapter.get_info();
        let features = adapter.features();

        if info.device_type == wgpu::DeviceType::Cpu {
            continue;
        }

        let has_f64 = features.contains(wgpu::Features::SHADER_F64);
        let has_timestamps = features.contains(wgpu::Features::TIMESTAMP_QUERY);

        let mut capabilities = vec![Capability::F32Compute, Capability::ShaderDispatch];
        if has_f64 {
            capabilities.push(Capability::F64Compute);
        }
        if has_timestamps {
            capabilities.push(Capability::TimestampQuery);
        }

        let limits = adapter.limits();

        gpus.push(Substrate {
            kind: SubstrateKind::Gpu,
            identity: Identity {
                name: info.name.clone(),
                driver: Some(format!("{} ({})", info.driver, info.driver_info)),
                backend: Some(format!("{:?}", info.backend)),
                adapter_index: Some(idx),
            },
            properties: Properties {
                memory_bytes: Some(limits.max_buffer_size),
                has_f64,
                has_timestamps,
                max_workgroup: Some(limits.max_compute_workgroup_size_x),
                ..Properties::default()
            },
            capabilities,
        });
    }

    tracing::debug!(count = gpus.len(), "probed GPU adapters");
    gpus
}

/// Probe CPU via `/proc/cpuinfo` and `/proc/meminfo`.
///
/// The host CPU always runs the in-process kernels, so it always carries
/// [`Capability::LatticeKernels`].
#[must_use]
pub fn probe_cpu() -> Substrate {
    let info = parse_cpuinfo();
    let mem_bytes = parse_meminfo();

    let name = info.model.unwrap_or_else(|| String::from("Host CPU"));

    let mut capabilities = vec![
        Capability::F64Compute,
        Capability::F32Compute,
        Capability::LatticeKernels,
    ];
    if info.has_avx2 {
        capabilities.push(Capability::SimdVector);
    }

    Substrate {
        kind: SubstrateKind::Cpu,
        identity: Identity::named(name),
        properties: Properties {
            memory_bytes: mem_bytes,
            core_count: info.cores,
            thread_count: info.siblings,
            has_f64: true,
            ..Properties::default()
        },
        capabilities,
    }
}

#[derive(Default)]
struct CpuInfo {
    model: Option<String>,
    cores: Option<u32>,
    siblings: Option<u32>,
    has_avx2: bool,
}

fn parse_cpuinfo() -> CpuInfo {
    let Ok(content) = fs::read_to_string("/proc/cpuinfo") else {
        return CpuInfo::default();
    };
    parse_cpuinfo_text(&content)
}

fn parse_cpuinfo_text(content: &str) -> CpuInfo {
    let mut info = CpuInfo::default();
    for line in content.lines() {
        if let Some((key, val)) = line.split_once(':') {
            let val = val.trim();
            match key.trim() {
                "model name" if info.model.is_none() => info.model = Some(val.to_string()),
                "cpu cores" if info.cores.is_none() => info.cores = val.parse().ok(),
                "siblings" if info.siblings.is_none() => info.siblings = val.parse().ok(),
                "flags" if !info.has_avx2 => {
                    info.has_avx2 = val.split_whitespace().any(|f| f == "avx2");
                }
                _ => {}
            }
        }
    }
    info
}

fn parse_meminfo() -> Option<u64> {
    let content = fs::read_to_string("/proc/meminfo").ok()?;
    for line in content.lines() {
        if let Some(rest) = line.strip_prefix("MemTotal:") {
            let kb: u64 = rest.trim().trim_end_matches(" kB").trim().parse().ok()?;
            return Some(kb * 1024);
        }
    }
    None
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn cpu_always_discovered() {
        let cpu = probe_cpu();
        assert_eq!(cpu.kind, SubstrateKind::Cpu);
        assert!(cpu.has(&Capability::LatticeKernels));
        assert!(!cpu.identity.name.is_empty());
    }

    #[test]
    fn cpuinfo_text_parsing() {
        let text = "model name\t: Test Core 9\ncpu cores\t: 8\nsiblings\t: 16\n\
                    flags\t\t: fpu sse2 avx2\nmodel name\t: ignored\n";
        let info = parse_cpuinfo_text(text);
        assert_eq!(info.model.as_deref(), Some("Test Core 9"));
        assert_eq!(info.cores, Some(8));
        assert_eq!(info.siblings, Some(16));
        assert!(info.has_avx2);
    }

    #[test]
    fn gpu_probe_never_grants_lattice_kernels() {
        for gpu in probe_gpus() {
            assert_eq!(gpu.kind, SubstrateKind::Gpu);
            assert!(gpu.has(&Capability::ShaderDispatch));
            assert!(!gpu.has(&Capability::LatticeKernels));
        }
    }
}

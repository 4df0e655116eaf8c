// SPDX-License-Identifier: AGPL-3.0-only

//! Adapter discovery and selection.
//!
//! Runtime capability probing, no hardcoded GPU assumptions. An adapter is
//! chosen by explicit index (`DEVICE=`), by `QCDGPU_GPU_ADAPTER`, or
//! automatically (discrete with `SHADER_F64` first).

use crate::error::{QcdError, Result};

/// Summary of a discovered adapter.
#[derive(Debug, Clone)]
pub struct AdapterInfo {
    /// Enumeration index (stable within a single run).
    pub index: usize,
    pub name: String,
    pub driver: String,
    pub has_f64: bool,
    pub device_type: wgpu::DeviceType,
}

impl std::fmt::Display for AdapterInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let precision = if self.has_f64 { "f64" } else { "f32" };
        let kind = match self.device_type {
            wgpu::DeviceType::DiscreteGpu => "discrete",
            wgpu::DeviceType::IntegratedGpu => "integrated",
            wgpu::DeviceType::VirtualGpu => "virtual",
            wgpu::DeviceType::Cpu => "cpu",
            wgpu::DeviceType::Other => "other",
        };
        write!(
            f,
            "[{}] {} ({}, {kind}, {precision})",
            self.index, self.name, self.driver
        )
    }
}

/// Create a wgpu instance with the backend set by `QCDGPU_WGPU_BACKEND`.
pub fn create_instance() -> wgpu::Instance {
    let backends = match std::env::var("QCDGPU_WGPU_BACKEND").as_deref() {
        Ok("vulkan") => wgpu::Backends::VULKAN,
        Ok("metal") => wgpu::Backends::METAL,
        Ok("dx12") => wgpu::Backends::DX12,
        Ok("gl") => wgpu::Backends::GL,
        _ => wgpu::Backends::all(),
    };
    wgpu::Instance::new(wgpu::InstanceDescriptor {
        backends,
        ..Default::default()
    })
}

fn describe(index: usize, adapter: &wgpu::Adapter) -> AdapterInfo {
    let info = adapter.get_info();
    AdapterInfo {
        index,
        name: info.name,
        driver: info.driver,
        has_f64: adapter.features().contains(wgpu::Features::SHADER_F64),
        device_type: info.device_type,
    }
}

/// Enumerate all adapters visible to the configured backends.
#[must_use]
pub fn enumerate_adapters() -> Vec<AdapterInfo> {
    create_instance()
        .enumerate_adapters(wgpu::Backends::all())
        .iter()
        .enumerate()
        .map(|(i, a)| describe(i, a))
        .collect()
}

/// Pick an adapter: `index` when given, otherwise `QCDGPU_GPU_ADAPTER`
/// (`auto`, an index, or a case-insensitive name substring), otherwise auto.
///
/// # Errors
///
/// [`QcdError::NoDevice`] if nothing matches.
pub fn select_adapter(
    instance: &wgpu::Instance,
    index: Option<usize>,
) -> Result<(wgpu::Adapter, AdapterInfo)> {
    let adapters = instance.enumerate_adapters(wgpu::Backends::all());
    if adapters.is_empty() {
        return Err(QcdError::NoDevice("no wgpu adapters".into()));
    }
    if let Some(idx) = index {
        return take(adapters, idx)
            .ok_or_else(|| QcdError::NoDevice(format!("no adapter with index {idx}")));
    }

    let selector = std::env::var("QCDGPU_GPU_ADAPTER")
        .unwrap_or_default()
        .trim()
        .to_lowercase();
    if selector.is_empty() || selector == "auto" {
        auto_select(adapters)
    } else if let Some(found) = selector
        .parse::<usize>()
        .ok()
        .and_then(|idx| (idx < adapters.len()).then_some(idx))
    {
        take(adapters, found).ok_or_else(|| QcdError::NoDevice(selector.clone()))
    } else {
        let idx = adapters
            .iter()
            .position(|a| a.get_info().name.to_ascii_lowercase().contains(&selector))
            .ok_or_else(|| QcdError::NoDevice(format!("no adapter matching '{selector}'")))?;
        take(adapters, idx).ok_or_else(|| QcdError::NoDevice(selector.clone()))
    }
}

fn take(adapters: Vec<wgpu::Adapter>, idx: usize) -> Option<(wgpu::Adapter, AdapterInfo)> {
    adapters.into_iter().nth(idx).map(|a| {
        let info = describe(idx, &a);
        (a, info)
    })
}

fn auto_select(adapters: Vec<wgpu::Adapter>) -> Result<(wgpu::Adapter, AdapterInfo)> {
    let infos: Vec<AdapterInfo> = adapters
        .iter()
        .enumerate()
        .map(|(i, a)| describe(i, a))
        .collect();
    let pick = infos
        .iter()
        .find(|i| i.has_f64 && i.device_type == wgpu::DeviceType::DiscreteGpu)
        .or_else(|| infos.iter().find(|i| i.has_f64))
        .or_else(|| infos.iter().find(|i| i.device_type != wgpu::DeviceType::Cpu))
        .map(|i| i.index)
        .ok_or_else(|| QcdError::NoDevice("no usable adapter".into()))?;
    take(adapters, pick).ok_or_else(|| QcdError::NoDevice("adapter vanished".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_marks_precision() {
        let info = AdapterInfo {
            index: 1,
            name: "Test GPU".into(),
            driver: "mock".into(),
            has_f64: false,
            device_type: wgpu::DeviceType::IntegratedGpu,
        };
        assert_eq!(info.to_string(), "[1] Test GPU (mock, integrated, f32)");
    }
}

// SPDX-License-Identifier: AGPL-3.0-only

//! Unified view of every substrate on this machine.

use crate::probe;
use crate::substrate::{Capability, Substrate, SubstrateKind};

/// Discover all substrates: GPUs first (in adapter order), then the host CPU.
#[must_use]
pub fn discover() -> Vec<Substrate> {
    let mut all = probe::probe_gpus();
    all.push(probe::probe_cpu());
    all
}

/// Discover substrates and mark GPUs as kernel-capable when kernel
/// programs are available to them.
#[must_use]
pub fn discover_with_kernels(gpu_kernels_available: bool) -> Vec<Substrate> {
    let mut all = discover();
    if gpu_kernels_available {
        for s in all.iter_mut().filter(|s| s.kind == SubstrateKind::Gpu) {
            s.grant(Capability::LatticeKernels);
        }
    }
    all
}

/// Print the inventory as a table to stdout.
pub fn print_inventory(substrates: &[Substrate]) {
    println!("═══ Compute Substrates ════════════════════════════════════");
    for (i, s) in substrates.iter().enumerate() {
        println!("  [{i}] {s}");
        println!("       caps: {}", s.capability_summary());
    }
    if substrates.is_empty() {
        println!("  (none found)");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inventory_ends_with_cpu() {
        let all = discover();
        assert_eq!(all.last().map(|s| s.kind), Some(SubstrateKind::Cpu));
    }

    #[test]
    fn kernels_flag_grants_gpus() {
        let all = discover_with_kernels(true);
        for s in all.iter().filter(|s| s.kind == SubstrateKind::Gpu) {
            assert!(s.has(&Capability::LatticeKernels));
        }
    }
}

// SPDX-License-Identifier: AGPL-3.0-only

//! Dispatch routing: route workloads to capable substrates.
//!
//! The router filters the inventory by required capabilities and then
//! picks by preference, falling back to GPU before CPU. Partitions of a
//! decomposed lattice are routed one at a time via [`route_all`].

use crate::substrate::{Capability, Substrate, SubstrateKind};

/// A workload that needs to be dispatched to a substrate.
#[derive(Debug, Clone)]
pub struct Workload {
    pub name: String,
    pub required: Vec<Capability>,
    pub preferred_substrate: Option<SubstrateKind>,
}

/// Dispatch decision: which substrate was chosen and why.
#[derive(Debug)]
pub struct Decision<'a> {
    pub substrate: &'a Substrate,
    /// Position of the chosen substrate in the inventory slice.
    pub index: usize,
    pub reason: Reason,
}

/// Why a particular substrate was chosen.
#[derive(Debug, PartialEq, Eq)]
pub enum Reason {
    /// The workload's preferred substrate had all capabilities.
    Preferred,
    /// Best capable substrate by priority (GPU > CPU).
    BestAvailable,
}

impl Workload {
    /// Create a workload with name and required capabilities.
    #[must_use]
    pub fn new(name: impl Into<String>, required: Vec<Capability>) -> Self {
        Self {
            name: name.into(),
            required,
            preferred_substrate: None,
        }
    }

    /// Set the preferred substrate kind.
    #[must_use]
    pub const fn prefer(mut self, kind: SubstrateKind) -> Self {
        self.preferred_substrate = Some(kind);
        self
    }
}

/// Route a workload to the best matching substrate.
#[must_use]
pub fn route<'a>(workload: &Workload, substrates: &'a [Substrate]) -> Option<Decision<'a>> {
    let capable: Vec<(usize, &Substrate)> = substrates
        .iter()
        .enumerate()
        .filter(|(_, s)| workload.required.iter().all(|req| s.has(req)))
        .collect();

    if let Some(pref) = workload.preferred_substrate {
        if let Some(&(index, s)) = capable.iter().find(|(_, s)| s.kind == pref) {
            return Some(Decision {
                substrate: s,
                index,
                reason: Reason::Preferred,
            });
        }
    }

    let &(index, best) = capable
        .iter()
        .find(|(_, s)| s.kind == SubstrateKind::Gpu)
        .or_else(|| capable.iter().find(|(_, s)| s.kind == SubstrateKind::Cpu))?;

    Some(Decision {
        substrate: best,
        index,
        reason: Reason::BestAvailable,
    })
}

/// Route `parts` partitions of one workload.
///
/// Capable GPUs are assigned round-robin; with no capable GPU every part
/// lands on the best remaining substrate. Returns `None` if nothing can
/// run the workload.
#[must_use]
pub fn route_all<'a>(
    workload: &Workload,
    substrates: &'a [Substrate],
    parts: usize,
) -> Option<Vec<Decision<'a>>> {
    let gpus: Vec<(usize, &Substrate)> = substrates
        .iter()
        .enumerate()
        .filter(|(_, s)| {
            s.kind == SubstrateKind::Gpu && workload.required.iter().all(|req| s.has(req))
        })
        .collect();

    if gpus.is_empty() || workload.preferred_substrate == Some(SubstrateKind::Cpu) {
        let fallback = route(workload, substrates)?;
        return Some(
            (0..parts)
                .map(|_| Decision {
                    substrate: fallback.substrate,
                    index: fallback.index,
                    reason: Reason::BestAvailable,
                })
                .collect(),
        );
    }

    Some(
        (0..parts)
            .map(|k| {
                let (index, s) = gpus[k % gpus.len()];
                Decision {
                    substrate: s,
                    index,
                    reason: Reason::BestAvailable,
                }
            })
            .collect(),
    )
}

/// Workload profiles for the lattice controller.
pub mod profiles {
    use super::Workload;
    use crate::substrate::{Capability, SubstrateKind};

    /// Heat-bath update and measurement kernels in f64.
    #[must_use]
    pub fn lattice_double() -> Workload {
        Workload::new(
            "Lattice kernels (f64)",
            vec![Capability::LatticeKernels, Capability::F64Compute],
        )
    }

    /// Heat-bath update and measurement kernels in f32 storage.
    #[must_use]
    pub fn lattice_single() -> Workload {
        Workload::new(
            "Lattice kernels (f32)",
            vec![Capability::LatticeKernels, Capability::F32Compute],
        )
    }

    /// Host-side recomputation of plaquette and action from read-back links.
    #[must_use]
    pub fn cpu_check() -> Workload {
        Workload::new("CPU check", vec![Capability::F64Compute]).prefer(SubstrateKind::Cpu)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::profiles;
    use super::*;
    use crate::substrate::{Identity, Properties};

    fn make_gpu(name: &str, caps: Vec<Capability>) -> Substrate {
        Substrate {
            kind: SubstrateKind::Gpu,
            identity: Identity::named(name),
            properties: Properties::default(),
            capabilities: caps,
        }
    }

    fn make_cpu() -> Substrate {
        Substrate {
            kind: SubstrateKind::Cpu,
            identity: Identity::named("CPU"),
            properties: Properties::default(),
            capabilities: vec![
                Capability::F64Compute,
                Capability::F32Compute,
                Capability::LatticeKernels,
            ],
        }
    }

    #[test]
    fn gpu_without_kernels_falls_back_to_cpu() {
        let subs = [
            make_gpu("RTX", vec![Capability::F64Compute, Capability::ShaderDispatch]),
            make_cpu(),
        ];
        let d = route(&profiles::lattice_double(), &subs).expect("cpu route");
        assert_eq!(d.substrate.kind, SubstrateKind::Cpu);
        assert_eq!(d.index, 1);
        assert_eq!(d.reason, Reason::BestAvailable);
    }

    #[test]
    fn kernel_capable_gpu_wins() {
        let subs = [
            make_gpu(
                "RTX",
                vec![Capability::F64Compute, Capability::LatticeKernels],
            ),
            make_cpu(),
        ];
        let d = route(&profiles::lattice_double(), &subs).expect("gpu route");
        assert_eq!(d.substrate.kind, SubstrateKind::Gpu);
        assert_eq!(d.index, 0);
    }

    #[test]
    fn no_route_if_incapable() {
        let subs = [make_gpu("GPU", vec![Capability::F32Compute])];
        assert!(route(&profiles::lattice_double(), &subs).is_none());
    }

    #[test]
    fn respects_preference() {
        let subs = [
            make_gpu("GPU", vec![Capability::F64Compute]),
            make_cpu(),
        ];
        let d = route(&profiles::cpu_check(), &subs).expect("should route");
        assert_eq!(d.substrate.kind, SubstrateKind::Cpu);
        assert_eq!(d.reason, Reason::Preferred);
    }

    #[test]
    fn route_all_round_robins_gpus() {
        let caps = vec![Capability::F64Compute, Capability::LatticeKernels];
        let subs = [
            make_gpu("A", caps.clone()),
            make_gpu("B", caps),
            make_cpu(),
        ];
        let ds = route_all(&profiles::lattice_double(), &subs, 3).expect("routes");
        let idx: Vec<usize> = ds.iter().map(|d| d.index).collect();
        assert_eq!(idx, vec![0, 1, 0]);
    }

    #[test]
    fn route_all_puts_everything_on_cpu_without_gpus() {
        let subs = [make_cpu()];
        let ds = route_all(&profiles::lattice_single(), &subs, 4).expect("routes");
        assert_eq!(ds.len(), 4);
        assert!(ds.iter().all(|d| d.substrate.kind == SubstrateKind::Cpu));
    }
}

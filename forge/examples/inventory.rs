// SPDX-License-Identifier: AGPL-3.0-only

//! Discover and print all compute substrates and where lattice partitions
//! would be routed on this machine.
//!
//! Pass any argument to pretend GPU kernel programs are available.

use qcdgpu_forge::dispatch::{self, profiles};

fn main() {
    let with_kernels = std::env::args().nth(1).is_some();
    let substrates = qcdgpu_forge::inventory::discover_with_kernels(with_kernels);
    qcdgpu_forge::inventory::print_inventory(&substrates);

    println!();
    println!("═══ Dispatch Routing ═══════════════════════════════════════");
    for work in [
        profiles::lattice_double(),
        profiles::lattice_single(),
        profiles::cpu_check(),
    ] {
        match dispatch::route(&work, &substrates) {
            Some(d) => println!("  {:28} → {} ({:?})", work.name, d.substrate, d.reason),
            None => println!("  {:28} → NO CAPABLE SUBSTRATE", work.name),
        }
    }

    println!();
    println!("═══ Four-part decomposition ════════════════════════════════");
    match dispatch::route_all(&profiles::lattice_double(), &substrates, 4) {
        Some(ds) => {
            for (k, d) in ds.iter().enumerate() {
                println!("  part {k} → [{}] {}", d.index, d.substrate.identity.name);
            }
        }
        None => println!("  no capable substrate"),
    }
}

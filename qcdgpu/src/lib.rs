// SPDX-License-Identifier: AGPL-3.0-only

#![deny(clippy::expect_used, clippy::unwrap_used)]

//! qcdgpu — domain-decomposed SU(N) lattice gauge simulation
//!
//! Heat-bath Monte Carlo for SU(2) and SU(3) pure gauge theory on 2–4
//! dimensional lattices, split along axis 0 into parts that run on one or
//! more compute devices. Each part keeps a ghost slice on either side; the
//! controller refreshes ghosts after every half-sweep of a direction.
//!
//! ## Modules
//!   - `config` — `Variable=Value` input and typed run parameters
//!   - `geometry` — axis-0 partitions, local site layout and padding
//!   - `group` — SU(2) quaternions, SU(3) matrices, heat-bath kernels
//!   - `kernels` — kernel contract, measurement layout, host kernels
//!   - `device` — host and wgpu devices behind [`device::DeviceBackend`]
//!   - `prng` — counter-keyed uniform streams
//!   - `sublattice` — buffers, kernels and operations of one part
//!   - `backend` — single-device and multi-partition strategies
//!   - `analysis` — cross-part aggregation and run statistics
//!   - `checkpoint` — 64-word header binary state
//!   - `controller` — run state machine
//!   - `report` — text report and JSON summary
//!
//! ## Binaries
//!   - `qcdgpu` — run a configuration file
//!   - `validate_decomposition` — decomposition, checkpoint and physics checks

pub mod analysis;
pub mod backend;
pub mod checkpoint;
pub mod config;
pub mod constants;
pub mod controller;
pub mod device;
pub mod error;
pub mod geometry;
pub mod group;
pub mod kernels;
pub mod prng;
pub mod report;
pub mod sublattice;
pub mod tolerances;
pub mod validation;

pub use controller::{LatticeController, RunState};
pub use error::{QcdError, Result};

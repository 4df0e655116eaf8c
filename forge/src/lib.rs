// SPDX-License-Identifier: AGPL-3.0-only

#![deny(clippy::expect_used, clippy::unwrap_used)]

//! qcdgpu forge: local hardware discovery and capability routing.
//!
//! Forge discovers which compute substrates exist on this machine at run
//! time and decides where each lattice partition runs. The controller asks
//! for a workload profile and gets back inventory positions; it never
//! hardcodes adapter numbers unless the user does.
//!
//! # Architecture
//!
//! ```text
//!    ┌─────────────────────────────┐
//!    │  probe                      │  wgpu adapters + /proc
//!    └──────────┬──────────────────┘
//!               │ Vec<Substrate>
//!    ┌──────────▼──────────────────┐
//!    │       inventory             │  unified view, kernel capability
//!    └──────────┬──────────────────┘
//!               │ &[Substrate]
//!    ┌──────────▼──────────────────┐
//!    │       dispatch              │  capability-based routing per part
//!    └─────────────────────────────┘
//! ```

pub mod dispatch;
pub mod inventory;
pub mod probe;
pub mod substrate;

// SPDX-License-Identifier: AGPL-3.0-only

//! Lattice geometry and domain decomposition along axis 0.
//!
//! The full lattice has `nd` axes; axis `nd - 1` is time. Part `k` owns the
//! contiguous axis-0 slices `x0_k .. x0_k + Nx_k`. Inside a part, axis 0 is
//! the slowest index and axis `nd - 1` the fastest, so every axis-0 slice is
//! one contiguous block of `slice_sites` sites.
//!
//! With a halo, each part stores one ghost slice on each side of axis 0:
//!
//! ```text
//!  stored x:   0        1 ..= Nx        Nx + 1
//!            [ghost L][ owned slices ][ghost R]
//!            ^ LEFT_SITES = slice_sites is the first owned site
//! ```
//!
//! Without a halo (single device), axis 0 wraps periodically inside the
//! part, which then owns the whole lattice.

use serde::Serialize;

use crate::error::{QcdError, Result};

/// Round `n` up to a multiple of `multiple` (never down).
#[must_use]
pub const fn align_up(n: usize, multiple: usize) -> usize {
    if multiple == 0 {
        n
    } else {
        n.div_ceil(multiple) * multiple
    }
}

/// One contiguous slab of axis-0 slices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Partition {
    pub index: usize,
    /// Global axis-0 coordinate of the first owned slice.
    pub x0: usize,
    /// Owned slices along axis 0.
    pub nx: usize,
}

/// Whole-lattice extents plus the decomposition into parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Geometry {
    pub full: Vec<usize>,
    pub parts: Vec<Partition>,
}

impl Geometry {
    /// Build from explicit per-part axis-0 extents.
    ///
    /// # Errors
    ///
    /// [`QcdError::Geometry`] if an extent is zero or odd, or the part
    /// extents do not sum to `full[0]`.
    pub fn new(full: Vec<usize>, part_extents: &[usize]) -> Result<Self> {
        if full.is_empty() {
            return Err(QcdError::Geometry("lattice needs at least one axis".into()));
        }
        if let Some((d, l)) = full.iter().enumerate().find(|(_, &l)| l == 0 || l % 2 != 0) {
            return Err(QcdError::Geometry(format!(
                "extent {l} along axis {d} must be positive and even"
            )));
        }
        if part_extents.is_empty() {
            return Err(QcdError::Geometry("decomposition needs at least one part".into()));
        }
        if let Some(&nx) = part_extents.iter().find(|&&nx| nx == 0 || nx % 2 != 0) {
            return Err(QcdError::Geometry(format!(
                "partition extent {nx} must be positive and even"
            )));
        }
        let total: usize = part_extents.iter().sum();
        if total != full[0] {
            return Err(QcdError::Geometry(format!(
                "partition extents sum to {total}, lattice has {} slices along axis 0",
                full[0]
            )));
        }
        let mut x0 = 0;
        let parts = part_extents
            .iter()
            .enumerate()
            .map(|(index, &nx)| {
                let p = Partition { index, x0, nx };
                x0 += nx;
                p
            })
            .collect();
        Ok(Self { full, parts })
    }

    /// Split axis 0 into `n` even extents as evenly as possible; earlier
    /// parts take the surplus.
    ///
    /// # Errors
    ///
    /// [`QcdError::Geometry`] if `full[0] / 2 < n`.
    pub fn split_even(full: Vec<usize>, n: usize) -> Result<Self> {
        let extents = even_split(full.first().copied().unwrap_or(0), n)?;
        Self::new(full, &extents)
    }

    #[must_use]
    pub fn nd(&self) -> usize {
        self.full.len()
    }

    #[must_use]
    pub fn num_parts(&self) -> usize {
        self.parts.len()
    }

    /// Sites in one axis-0 slice.
    #[must_use]
    pub fn slice_sites(&self) -> usize {
        self.full[1..].iter().product()
    }

    #[must_use]
    pub fn full_sites(&self) -> usize {
        self.full.iter().product()
    }

    /// Per-part axis-0 extents.
    #[must_use]
    pub fn extents(&self) -> Vec<usize> {
        self.parts.iter().map(|p| p.nx).collect()
    }

    /// Local layout of part `k`.
    #[must_use]
    pub fn local(&self, k: usize, halo: bool, workgroup: usize) -> LocalGeometry {
        LocalGeometry::new(&self.full, self.parts[k], halo, workgroup)
    }

    /// Owning part and local slice of global axis-0 coordinate `x`.
    #[must_use]
    pub fn owner_of_slice(&self, x: usize) -> (usize, usize) {
        let x = x % self.full[0];
        for p in &self.parts {
            if x >= p.x0 && x < p.x0 + p.nx {
                return (p.index, x - p.x0);
            }
        }
        (0, x)
    }
}

/// Even axis-0 split of `l0` into `n` parts.
///
/// # Errors
///
/// [`QcdError::Geometry`] if there are fewer even slices than parts.
pub fn even_split(l0: usize, n: usize) -> Result<Vec<usize>> {
    if n == 0 || l0 / 2 < n {
        return Err(QcdError::Geometry(format!(
            "cannot split {l0} slices into {n} even parts"
        )));
    }
    let pairs = l0 / 2;
    let base = pairs / n;
    let surplus = pairs % n;
    Ok((0..n)
        .map(|k| 2 * (base + usize::from(k < surplus)))
        .collect())
}

/// Index arithmetic for one part's stored sites.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalGeometry {
    pub full: Vec<usize>,
    pub x0: usize,
    pub nx: usize,
    pub halo: bool,
    pub workgroup: usize,
    /// `strides[d]` = sites between neighbours along axis `d` (axis 0 = slice).
    strides: Vec<usize>,
}

impl LocalGeometry {
    #[must_use]
    pub fn new(full: &[usize], part: Partition, halo: bool, workgroup: usize) -> Self {
        let nd = full.len();
        let mut strides = vec![1; nd];
        for d in (0..nd.saturating_sub(1)).rev() {
            strides[d] = strides[d + 1] * full[d + 1];
        }
        Self {
            full: full.to_vec(),
            x0: part.x0,
            nx: part.nx,
            halo,
            workgroup: workgroup.max(1),
            strides,
        }
    }

    /// A whole lattice owned by one part without halo.
    #[must_use]
    pub fn whole(full: &[usize]) -> Self {
        Self::new(
            full,
            Partition {
                index: 0,
                x0: 0,
                nx: full[0],
            },
            false,
            1,
        )
    }

    #[must_use]
    pub fn nd(&self) -> usize {
        self.full.len()
    }

    #[must_use]
    pub fn time_axis(&self) -> usize {
        self.full.len() - 1
    }

    #[must_use]
    pub fn slice_sites(&self) -> usize {
        self.strides[0]
    }

    #[must_use]
    pub const fn ghost_slices(&self) -> usize {
        if self.halo {
            1
        } else {
            0
        }
    }

    /// Offset of the first owned site (`LEFT_SITES`).
    #[must_use]
    pub fn left_sites(&self) -> usize {
        self.ghost_slices() * self.slice_sites()
    }

    #[must_use]
    pub fn owned_sites(&self) -> usize {
        self.nx * self.slice_sites()
    }

    #[must_use]
    pub fn stored_sites(&self) -> usize {
        (self.nx + 2 * self.ghost_slices()) * self.slice_sites()
    }

    /// Owned sites rounded up to the workgroup multiple.
    #[must_use]
    pub fn padded_sites(&self) -> usize {
        align_up(self.owned_sites(), self.workgroup)
    }

    /// Stored index of owned site `i`.
    #[must_use]
    pub fn stored_of_owned(&self, i: usize) -> usize {
        i + self.left_sites()
    }

    /// Coordinate of stored site `s` along axis `d` (axis 0 is the stored slice).
    #[must_use]
    pub fn coord(&self, s: usize, d: usize) -> usize {
        if d == 0 {
            s / self.strides[0]
        } else {
            (s / self.strides[d]) % self.full[d]
        }
    }

    /// Global axis-0 coordinate of stored slice `xs`.
    #[must_use]
    pub fn global_x(&self, xs: usize) -> usize {
        let l0 = self.full[0];
        (self.x0 + l0 + xs - self.ghost_slices()) % l0
    }

    /// Global coordinates of stored site `s`.
    #[must_use]
    pub fn global_coords(&self, s: usize) -> Vec<usize> {
        (0..self.nd())
            .map(|d| {
                if d == 0 {
                    self.global_x(self.coord(s, 0))
                } else {
                    self.coord(s, d)
                }
            })
            .collect()
    }

    /// Global linear site index (axis 0 slowest) of stored site `s`.
    #[must_use]
    pub fn global_index(&self, s: usize) -> usize {
        self.global_x(self.coord(s, 0)) * self.strides[0] + s % self.strides[0]
    }

    /// Parity of the sum of global coordinates: 1 = odd.
    #[must_use]
    pub fn parity(&self, s: usize) -> usize {
        self.global_coords(s).iter().sum::<usize>() % 2
    }

    /// Neighbour of stored site `s` one step along axis `d` (`forward` or back).
    ///
    /// Axis 0 steps into the ghost slices when a halo is present and wraps
    /// periodically otherwise; other axes always wrap.
    #[must_use]
    pub fn step(&self, s: usize, d: usize, forward: bool) -> usize {
        if d == 0 {
            let xs = self.coord(s, 0);
            let rest = s % self.strides[0];
            let xn = if self.halo {
                if forward {
                    xs + 1
                } else {
                    xs.saturating_sub(1)
                }
            } else if forward {
                (xs + 1) % self.nx
            } else {
                (xs + self.nx - 1) % self.nx
            };
            xn * self.strides[0] + rest
        } else {
            let l = self.full[d];
            let c = self.coord(s, d);
            let cn = if forward { (c + 1) % l } else { (c + l - 1) % l };
            s + cn * self.strides[d] - c * self.strides[d]
        }
    }

    /// `step` repeated `n` times along a non-decomposed axis.
    #[must_use]
    pub fn walk(&self, s: usize, d: usize, n: usize) -> usize {
        let l = self.full[d];
        let c = self.coord(s, d);
        let cn = (c + n) % l;
        s + cn * self.strides[d] - c * self.strides[d]
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn align_rounds_up_never_down() {
        assert_eq!(align_up(0, 64), 0);
        assert_eq!(align_up(1, 64), 64);
        assert_eq!(align_up(64, 64), 64);
        assert_eq!(align_up(65, 64), 128);
        assert_eq!(align_up(7, 0), 7);
    }

    #[test]
    fn partition_extents_sum_to_axis_zero() {
        for n in 1..=4 {
            let g = Geometry::split_even(vec![8, 4, 4, 4], n).expect("split");
            assert_eq!(g.extents().iter().sum::<usize>(), 8);
            assert_eq!(g.num_parts(), n);
        }
    }

    #[test]
    fn uneven_split_puts_surplus_first() {
        assert_eq!(even_split(10, 3).expect("split"), vec![4, 4, 2]);
        assert!(even_split(4, 3).is_err());
    }

    #[test]
    fn mismatched_extents_rejected() {
        let err = Geometry::new(vec![8, 4], &[4, 2]).expect_err("sum mismatch");
        assert!(matches!(err, QcdError::Geometry(_)));
        assert!(Geometry::new(vec![8, 4], &[5, 3]).is_err());
        assert!(Geometry::new(vec![6, 3], &[6]).is_err());
    }

    #[test]
    fn halo_layout_sizes() {
        let g = Geometry::new(vec![8, 4, 4, 4], &[4, 4]).expect("geometry");
        let l = g.local(1, true, 64);
        assert_eq!(l.slice_sites(), 64);
        assert_eq!(l.left_sites(), 64);
        assert_eq!(l.owned_sites(), 256);
        assert_eq!(l.stored_sites(), 384);
        assert_eq!(l.global_x(0), 3);
        assert_eq!(l.global_x(5), 0);
    }

    #[test]
    fn step_enters_ghost_with_halo_and_wraps_without() {
        let full = [4, 2, 2, 2];
        let part = Partition { index: 0, x0: 0, nx: 4 };
        let with = LocalGeometry::new(&full, part, true, 1);
        let first = with.stored_of_owned(0);
        assert_eq!(with.coord(with.step(first, 0, false), 0), 0);

        let without = LocalGeometry::new(&full, part, false, 1);
        let s = without.step(0, 0, false);
        assert_eq!(without.coord(s, 0), 3);
    }

    #[test]
    fn step_wraps_inner_axes() {
        let l = LocalGeometry::whole(&[2, 4, 4, 6]);
        let s = 5;
        let t = l.coord(s, 3);
        let back = l.step(l.step(s, 3, true), 3, false);
        assert_eq!(back, s);
        assert_eq!(l.coord(l.walk(s, 3, 6), 3), t);
    }

    #[test]
    fn parity_alternates_along_time() {
        let l = LocalGeometry::whole(&[4, 4, 4, 4]);
        assert_ne!(l.parity(0), l.parity(1));
        assert_eq!(l.parity(0), l.parity(2));
    }

    #[test]
    fn global_index_independent_of_decomposition() {
        let g = Geometry::new(vec![4, 2, 2], &[2, 2]).expect("geometry");
        let l = g.local(1, true, 1);
        let s = l.stored_of_owned(0);
        assert_eq!(l.global_index(s), 2 * 4);
        assert_eq!(g.owner_of_slice(5), (0, 1));
    }
}

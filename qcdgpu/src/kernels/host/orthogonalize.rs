// SPDX-License-Identifier: AGPL-3.0-only

use rayon::prelude::*;

use crate::group::GaugeGroup;

/// Gram-Schmidt every stored link, ghosts included, so a ghost stays
/// bit-identical to the slice it mirrors.
pub fn orthogonalize<G: GaugeGroup>(links: &mut [f64]) {
    links
        .par_chunks_exact_mut(G::WORDS)
        .for_each(|w| G::load(w).reunitarize().store(w));
}

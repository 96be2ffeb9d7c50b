//! Basis component selection from a (point x dimension) activity mask.

use std::collections::BTreeSet;

use ndarray::ArrayView2;

use crate::index::{ai_to_idx, idx_to_ai};

/// Flat indices of all active mask entries, ascending.
///
/// Rows of `mask` are basis points, columns are dimensions.
pub fn basis_inds_from_mask(mask: ArrayView2<'_, bool>) -> Vec<usize> {
    let d = mask.ncols();
    let mut basis_inds: Vec<usize> = mask
        .indexed_iter()
        .filter(|(_, &active)| active)
        .map(|((a, i), _)| ai_to_idx(a, i, d))
        .collect();

    // builders rely on ascending order for linear memory traversals
    basis_inds.sort_unstable();
    basis_inds
}

/// Distinct basis points owning at least one component, ascending.
pub fn basis_point_inds(basis_inds: &[usize], d: usize) -> Vec<usize> {
    basis_inds
        .iter()
        .map(|&idx| idx_to_ai(idx, d).0)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Points in `0..num_points` that own no component.
pub fn unused_basis_points(basis_point_inds: &[usize], num_points: usize) -> Vec<usize> {
    let used: BTreeSet<usize> = basis_point_inds.iter().copied().collect();
    (0..num_points).filter(|a| !used.contains(a)).collect()
}

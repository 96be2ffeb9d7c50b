//! Flat basis component indices.
//!
//! A component is a (point, dimension) pair, encoded as `point * d + dim`.

#[inline]
pub fn idx_to_ai(idx: usize, d: usize) -> (usize, usize) {
    (idx / d, idx % d)
}

#[inline]
pub fn ai_to_idx(a: usize, i: usize, d: usize) -> usize {
    a * d + i
}

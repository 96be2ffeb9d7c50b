use std::ops::Range;

use ndarray::{Array1, Array2, ArrayView2, Axis, Zip};
use rayon::prelude::*;

use super::{check_shape, Base, BasisStorage, Estimator};
use crate::basis::{basis_inds_from_mask, basis_point_inds, unused_basis_points};
use crate::error::{KefError, Result};
use crate::index::{ai_to_idx, idx_to_ai};
use crate::kernel::Kernel;

/// Nystrom estimator whose basis is a subset of (point, dimension) components.
///
/// The mask has one row per basis point and one column per dimension. Only
/// active entries become basis components, so the system size is the number
/// of active entries rather than `num_basis * D`.
pub struct NystromD<'k, K: Kernel + ?Sized> {
    base: Base<'k, K>,
    basis_inds: Vec<usize>,
}

impl<'k, K: Kernel + ?Sized> NystromD<'k, K> {
    /// Uses the training data as basis points, dropping the points whose mask
    /// row is all false.
    pub fn new(
        data: Array2<f64>,
        basis_mask: Array2<bool>,
        kernel: &'k K,
        lambda: f64,
    ) -> Result<NystromD<'k, K>> {
        Self::assemble(data, None, basis_mask, kernel, lambda)
    }

    pub fn with_basis(
        data: Array2<f64>,
        basis: Array2<f64>,
        basis_mask: Array2<bool>,
        kernel: &'k K,
        lambda: f64,
    ) -> Result<NystromD<'k, K>> {
        Self::assemble(data, Some(basis), basis_mask, kernel, lambda)
    }

    fn assemble(
        data: Array2<f64>,
        basis: Option<Array2<f64>>,
        basis_mask: Array2<bool>,
        kernel: &'k K,
        lambda: f64,
    ) -> Result<NystromD<'k, K>> {
        let d = data.ncols();
        let num_basis = basis.as_ref().map_or(data.nrows(), |b| b.nrows());
        if let Some(b) = &basis {
            check_shape("basis", (num_basis, d), b.dim())?;
        }
        check_shape("basis_mask", (num_basis, d), basis_mask.dim())?;

        let (basis_inds, unused) = select_components(basis_mask.view())?;
        let (storage, basis_inds) = if unused.is_empty() {
            (basis.map_or(BasisStorage::Data, BasisStorage::Owned), basis_inds)
        } else {
            log::info!("Subsampling basis as some points are unused");
            let point_inds = basis_point_inds(&basis_inds, d);
            let source = basis.as_ref().map_or(data.view(), |b| b.view());
            (
                BasisStorage::Owned(source.select(Axis(0), &point_inds)),
                compact_basis_inds(&basis_inds, &point_inds, d),
            )
        };
        log::info!(
            "Using {} of N={} provided points as basis points",
            num_basis - unused.len(),
            num_basis
        );

        let mut estimator = NystromD {
            base: Base::new(data, storage, kernel, lambda)?,
            basis_inds: Vec::new(),
        };
        estimator.install_basis_inds(basis_inds);
        Ok(estimator)
    }

    pub fn set_lambda_l2(mut self, lambda_l2: f64) -> Result<NystromD<'k, K>> {
        self.base.set_lambda_l2(lambda_l2)?;
        Ok(self)
    }

    /// Relative eigenvalue cutoff of the pseudo-inverse used by `fit`.
    pub fn set_pinv_rcond(mut self, rcond: f64) -> Result<NystromD<'k, K>> {
        self.base.set_pinv_rcond(rcond)?;
        Ok(self)
    }

    /// Selects the active components of the current basis. Points left without
    /// any component are reported and returned; they stay in the basis matrix
    /// but contribute nothing. Invalidates a fitted `beta`.
    pub fn set_basis_inds_from_mask(
        &mut self,
        basis_mask: ArrayView2<'_, bool>,
    ) -> Result<Vec<usize>> {
        let num_basis = self.base.num_basis();
        let d = self.base.num_dimensions();
        check_shape("basis_mask", (num_basis, d), basis_mask.dim())?;

        let (basis_inds, unused) = select_components(basis_mask)?;
        self.install_basis_inds(basis_inds);
        Ok(unused)
    }

    fn install_basis_inds(&mut self, basis_inds: Vec<usize>) {
        let num_basis = self.base.num_basis();
        let d = self.base.num_dimensions();
        log::info!(
            "Using {} of {}x{}={} possible basis components",
            basis_inds.len(),
            num_basis,
            d,
            num_basis * d
        );
        self.basis_inds = basis_inds;
        self.base.clear_beta();
    }

    /// Sorted flat indices `point * D + dim` of the active components.
    pub fn basis_inds(&self) -> &[usize] {
        &self.basis_inds
    }

    pub fn basis(&self) -> ArrayView2<'_, f64> {
        self.base.basis()
    }

    /// `beta` entries of basis point `a`, zero for its inactive dimensions.
    pub fn get_beta_for_basis_point(&self, a: usize) -> Result<Array1<f64>> {
        let beta = self.base.beta()?;
        let d = self.base.num_dimensions();
        let mut beta_a = Array1::zeros(d);
        for (k, &idx) in self.basis_inds.iter().enumerate() {
            let (b, j) = idx_to_ai(idx, d);
            if b == a {
                beta_a[j] = beta[k];
            }
        }
        Ok(beta_a)
    }

    /// Contiguous runs of components sharing a basis point.
    fn components_by_point(&self) -> Vec<(usize, Range<usize>)> {
        let d = self.base.num_dimensions();
        let point = |k: usize| idx_to_ai(self.basis_inds[k], d).0;

        let mut groups = Vec::new();
        let mut start = 0;
        for k in 1..=self.basis_inds.len() {
            if k == self.basis_inds.len() || point(k) != point(start) {
                groups.push((point(start), start..k));
                start = k;
            }
        }
        groups
    }

    fn beta_slice(&self, beta: &Array1<f64>, components: &Range<usize>) -> Array1<f64> {
        let d = self.base.num_dimensions();
        let mut beta_a = Array1::zeros(d);
        for k in components.clone() {
            beta_a[idx_to_ai(self.basis_inds[k], d).1] = beta[k];
        }
        beta_a
    }
}

/// Active components of `basis_mask` and the points owning none of them.
/// Each unused point is warned about here and nowhere else.
fn select_components(basis_mask: ArrayView2<'_, bool>) -> Result<(Vec<usize>, Vec<usize>)> {
    let (num_basis, d) = basis_mask.dim();
    let basis_inds = basis_inds_from_mask(basis_mask);
    if basis_inds.is_empty() {
        return Err(KefError::EmptyBasis);
    }
    let unused = unused_basis_points(&basis_point_inds(&basis_inds, d), num_basis);
    for &a in &unused {
        log::warn!("Using zero components of basis point {a}");
    }
    Ok((basis_inds, unused))
}

/// Renumbers components onto the rows `point_inds` keeps. Every component's
/// point must be in `point_inds`.
fn compact_basis_inds(basis_inds: &[usize], point_inds: &[usize], d: usize) -> Vec<usize> {
    let mut compacted = Vec::with_capacity(basis_inds.len());
    let mut row = 0;
    for &idx in basis_inds {
        let (a, i) = idx_to_ai(idx, d);
        while point_inds[row] != a {
            row += 1;
        }
        compacted.push(ai_to_idx(row, i, d));
    }
    compacted
}

#[allow(non_snake_case)]
impl<K: Kernel + ?Sized> Estimator for NystromD<'_, K> {
    fn get_num_dimensions(&self) -> usize {
        self.base.num_dimensions()
    }

    fn get_num_data(&self) -> usize {
        self.base.num_data()
    }

    fn get_num_basis(&self) -> usize {
        self.base.num_basis()
    }

    fn get_lambda(&self) -> f64 {
        self.base.lambda()
    }

    fn get_lambda_l2(&self) -> f64 {
        self.base.lambda_l2()
    }

    fn pinv_rcond(&self) -> Option<f64> {
        self.base.pinv_rcond()
    }

    fn get_system_size(&self) -> usize {
        self.basis_inds.len()
    }

    fn compute_h(&self) -> Array1<f64> {
        let d = self.base.num_dimensions();
        let n = self.base.num_data();
        let kernel = self.base.kernel();
        let basis = self.base.basis();
        let data = self.base.data();

        let h: Vec<f64> = self
            .basis_inds
            .par_iter()
            .map(|&idx| {
                let (a, i) = idx_to_ai(idx, d);
                let x = basis.row(a);
                let mut sum = 0.0;
                for y in data.outer_iter() {
                    for j in 0..d {
                        sum += kernel.dx_dy_dy_component(x, y, i, j);
                    }
                }
                sum / n as f64
            })
            .collect();
        Array1::from(h)
    }

    fn compute_G_mn(&self) -> Array2<f64> {
        let d = self.base.num_dimensions();
        let nd = self.base.num_data() * d;
        let kernel = self.base.kernel();
        let basis = self.base.basis();
        let data = self.base.data();
        let basis_inds = &self.basis_inds;

        let mut G_mn = Array2::zeros((basis_inds.len(), nd));
        Zip::indexed(&mut G_mn).par_for_each(|(k, l), entry| {
            let (b, j) = idx_to_ai(basis_inds[k], d);
            let (a, i) = idx_to_ai(l, d);
            *entry = kernel.dx_dy_component(basis.row(b), data.row(a), j, i);
        });
        G_mn
    }

    fn compute_G_mm(&self) -> Array2<f64> {
        let d = self.base.num_dimensions();
        let kernel = self.base.kernel();
        let basis = self.base.basis();
        let basis_inds = &self.basis_inds;
        let m = basis_inds.len();

        let mut G_mm = Array2::zeros((m, m));
        Zip::indexed(&mut G_mm).par_for_each(|(k, l), entry| {
            let (b, j) = idx_to_ai(basis_inds[k], d);
            let (a, i) = idx_to_ai(basis_inds[l], d);
            *entry = kernel.dx_dy_component(basis.row(b), basis.row(a), j, i);
        });
        G_mm
    }

    fn subsample_G_mm_from_G_mn(&self, G_mn: &Array2<f64>) -> Array2<f64> {
        G_mn.select(Axis(1), &self.basis_inds)
    }

    fn basis_is_subsampled_data(&self) -> bool {
        self.base.basis_is_data()
    }

    fn set_data(&mut self, data: Array2<f64>) -> Result<()> {
        self.base.set_data(data)
    }

    fn get_beta(&self) -> Option<&Array1<f64>> {
        self.base.get_beta()
    }

    fn set_beta(&mut self, beta: Array1<f64>) -> Result<()> {
        let system_size = self.get_system_size();
        self.base.set_beta(beta, system_size)
    }

    fn log_pdf(&self, idx: usize) -> Result<f64> {
        let beta = self.base.beta()?;
        let d = self.base.num_dimensions();
        let kernel = self.base.kernel();
        let basis = self.base.basis();
        let y = self.base.query_point(idx);

        Ok(self
            .basis_inds
            .iter()
            .zip(beta.iter())
            .map(|(&idx_k, &beta_k)| {
                let (a, i) = idx_to_ai(idx_k, d);
                beta_k * kernel.dx_component(basis.row(a), y, i)
            })
            .sum())
    }

    fn grad(&self, idx: usize) -> Result<Array1<f64>> {
        let beta = self.base.beta()?;
        let d = self.base.num_dimensions();
        let kernel = self.base.kernel();
        let basis = self.base.basis();
        let y = self.base.query_point(idx);

        let mut result = Array1::zeros(d);
        for (a, components) in self.components_by_point() {
            let x = basis.row(a);
            for l in components.clone() {
                let i = idx_to_ai(self.basis_inds[l], d).1;
                let left_arg_hessian = kernel.dx_i_dx_j_component(x, y, i);
                // only the dimensions present for this basis point
                for k in components.clone() {
                    let j = idx_to_ai(self.basis_inds[k], d).1;
                    result[i] -= left_arg_hessian[j] * beta[k];
                }
            }
        }
        Ok(result)
    }

    fn hessian(&self, idx: usize) -> Result<Array2<f64>> {
        let beta = self.base.beta()?;
        let d = self.base.num_dimensions();
        let kernel = self.base.kernel();
        let basis = self.base.basis();
        let y = self.base.query_point(idx);

        let mut result = Array2::zeros((d, d));
        for (a, components) in self.components_by_point() {
            let x = basis.row(a);
            let beta_a = self.beta_slice(beta, &components);
            for l in components.clone() {
                let i = idx_to_ai(self.basis_inds[l], d).1;
                for k in components.clone() {
                    let j = idx_to_ai(self.basis_inds[k], d).1;
                    result[[i, j]] +=
                        kernel.dx_i_dx_j_dx_k_dot_vec_component(x, y, beta_a.view(), i, j);
                }
            }
        }
        Ok(result)
    }

    fn hessian_diag(&self, idx: usize) -> Result<Array1<f64>> {
        let beta = self.base.beta()?;
        let d = self.base.num_dimensions();
        let kernel = self.base.kernel();
        let basis = self.base.basis();
        let y = self.base.query_point(idx);

        let mut result = Array1::zeros(d);
        for (a, components) in self.components_by_point() {
            let x = basis.row(a);
            let beta_a = self.beta_slice(beta, &components);
            for l in components {
                let i = idx_to_ai(self.basis_inds[l], d).1;
                result[i] += kernel.dx_i_dx_j_dx_k_dot_vec_component(x, y, beta_a.view(), i, i);
            }
        }
        Ok(result)
    }
}

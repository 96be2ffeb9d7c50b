use ndarray::{s, Array1, Array2, ArrayView2, Axis};
use rayon::prelude::*;

use super::{Base, BasisStorage, Estimator};
use crate::error::{KefError, Result};
use crate::index::ai_to_idx;
use crate::kernel::Kernel;

/// Nystrom estimator using every dimension of each basis point.
pub struct Nystrom<'k, K: Kernel + ?Sized> {
    base: Base<'k, K>,
    // rows of the training data the basis was taken from
    basis_point_inds: Option<Vec<usize>>,
}

impl<'k, K: Kernel + ?Sized> Nystrom<'k, K> {
    pub fn new(
        data: Array2<f64>,
        basis: Array2<f64>,
        kernel: &'k K,
        lambda: f64,
    ) -> Result<Nystrom<'k, K>> {
        log::info!(
            "Using {} user provided basis points for N={} data points",
            basis.nrows(),
            data.nrows()
        );
        Ok(Nystrom {
            base: Base::new(data, BasisStorage::Owned(basis), kernel, lambda)?,
            basis_point_inds: None,
        })
    }

    /// Basis points are the rows of `data` at `basis_point_inds`.
    pub fn subsampled(
        data: Array2<f64>,
        mut basis_point_inds: Vec<usize>,
        kernel: &'k K,
        lambda: f64,
    ) -> Result<Nystrom<'k, K>> {
        basis_point_inds.sort_unstable();
        basis_point_inds.dedup();
        let num_points = data.nrows();
        if let Some(&index) = basis_point_inds.iter().find(|&&a| a >= num_points) {
            return Err(KefError::BasisIndexOutOfRange { index, num_points });
        }

        log::info!(
            "Using {} of N={} data points as basis points",
            basis_point_inds.len(),
            num_points
        );
        let basis = data.select(Axis(0), &basis_point_inds);
        Ok(Nystrom {
            base: Base::new(data, BasisStorage::Owned(basis), kernel, lambda)?,
            basis_point_inds: Some(basis_point_inds),
        })
    }

    pub fn set_lambda_l2(mut self, lambda_l2: f64) -> Result<Nystrom<'k, K>> {
        self.base.set_lambda_l2(lambda_l2)?;
        Ok(self)
    }

    pub fn set_pinv_rcond(mut self, rcond: f64) -> Result<Nystrom<'k, K>> {
        self.base.set_pinv_rcond(rcond)?;
        Ok(self)
    }

    pub fn basis(&self) -> ArrayView2<'_, f64> {
        self.base.basis()
    }

    // Rows `a * D .. (a + 1) * D` of a matrix against all points of `rhs`.
    fn block_rows(&self, rhs: ArrayView2<'_, f64>) -> Array2<f64> {
        let d = self.base.num_dimensions();
        let kernel = self.base.kernel();
        let basis = self.base.basis();

        let blocks: Vec<Array2<f64>> = (0..basis.nrows())
            .into_par_iter()
            .map(|a| {
                let x = basis.row(a);
                let mut rows = Array2::zeros((d, rhs.nrows() * d));
                for (b, y) in rhs.outer_iter().enumerate() {
                    rows.slice_mut(s![.., b * d..(b + 1) * d])
                        .assign(&kernel.dx_dy(x, y));
                }
                rows
            })
            .collect();

        let mut result = Array2::zeros((self.get_system_size(), rhs.nrows() * d));
        for (a, block) in blocks.iter().enumerate() {
            result.slice_mut(s![a * d..(a + 1) * d, ..]).assign(block);
        }
        result
    }
}

#[allow(non_snake_case)]
impl<K: Kernel + ?Sized> Estimator for Nystrom<'_, K> {
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
        self.base.num_basis() * self.base.num_dimensions()
    }

    fn compute_h(&self) -> Array1<f64> {
        let d = self.base.num_dimensions();
        let n = self.base.num_data() as f64;
        let kernel = self.base.kernel();
        let basis = self.base.basis();
        let data = self.base.data();

        let segments: Vec<Array1<f64>> = (0..basis.nrows())
            .into_par_iter()
            .map(|a| {
                let x = basis.row(a);
                let mut segment = Array1::zeros(d);
                for y in data.outer_iter() {
                    segment += &kernel.dx_dy_dy(x, y).sum_axis(Axis(1));
                }
                segment / n
            })
            .collect();

        let mut h = Array1::zeros(self.get_system_size());
        for (a, segment) in segments.iter().enumerate() {
            h.slice_mut(s![a * d..(a + 1) * d]).assign(segment);
        }
        h
    }

    fn compute_G_mn(&self) -> Array2<f64> {
        self.block_rows(self.base.data())
    }

    fn compute_G_mm(&self) -> Array2<f64> {
        self.block_rows(self.base.basis())
    }

    fn subsample_G_mm_from_G_mn(&self, G_mn: &Array2<f64>) -> Array2<f64> {
        let d = self.base.num_dimensions();
        let columns: Vec<usize> = self
            .basis_point_inds
            .iter()
            .flatten()
            .flat_map(|&a| (0..d).map(move |i| ai_to_idx(a, i, d)))
            .collect();
        G_mn.select(Axis(1), &columns)
    }

    fn basis_is_subsampled_data(&self) -> bool {
        self.basis_point_inds.is_some()
    }

    fn set_data(&mut self, data: Array2<f64>) -> Result<()> {
        self.base.set_data(data)?;
        self.basis_point_inds = None;
        Ok(())
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
        let y = self.base.query_point(idx);

        Ok(self
            .base
            .basis()
            .outer_iter()
            .enumerate()
            .map(|(a, x)| kernel.dx(x, y).dot(&beta.slice(s![a * d..(a + 1) * d])))
            .sum())
    }

    fn grad(&self, idx: usize) -> Result<Array1<f64>> {
        let beta = self.base.beta()?;
        let d = self.base.num_dimensions();
        let kernel = self.base.kernel();
        let y = self.base.query_point(idx);

        let mut result = Array1::zeros(d);
        for (a, x) in self.base.basis().outer_iter().enumerate() {
            let beta_a = beta.slice(s![a * d..(a + 1) * d]);
            result -= &kernel.dx_i_dx_j(x, y).dot(&beta_a);
        }
        Ok(result)
    }

    fn hessian(&self, idx: usize) -> Result<Array2<f64>> {
        let beta = self.base.beta()?;
        let d = self.base.num_dimensions();
        let kernel = self.base.kernel();
        let y = self.base.query_point(idx);

        let mut result = Array2::zeros((d, d));
        for (a, x) in self.base.basis().outer_iter().enumerate() {
            let beta_a = beta.slice(s![a * d..(a + 1) * d]);
            result += &kernel.dx_i_dx_j_dx_k_dot_vec(x, y, beta_a);
        }
        Ok(result)
    }

    fn hessian_diag(&self, idx: usize) -> Result<Array1<f64>> {
        let beta = self.base.beta()?;
        let d = self.base.num_dimensions();
        let kernel = self.base.kernel();
        let y = self.base.query_point(idx);

        let mut result = Array1::zeros(d);
        for (a, x) in self.base.basis().outer_iter().enumerate() {
            let beta_a = beta.slice(s![a * d..(a + 1) * d]);
            for i in 0..d {
                result[i] += kernel.dx_i_dx_j_dx_k_dot_vec_component(x, y, beta_a, i, i);
            }
        }
        Ok(result)
    }
}

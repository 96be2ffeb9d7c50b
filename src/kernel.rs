pub mod gaussian;
pub use gaussian::GaussianKernel;

use ndarray::{Array1, Array2, ArrayView1};

/// Derivative contractions of a translation-invariant kernel `k(x, y)`.
///
/// `x` is always the basis point (left argument), `y` the data or query
/// point. Block methods return all `D` or `D x D` entries; the `_component`
/// methods return a single entry or row and default to slicing a block.
/// Implementations are shared between estimators and threads, so they must
/// not mutate any state.
pub trait Kernel: Sync {
    fn kernel(&self, x: ArrayView1<f64>, y: ArrayView1<f64>) -> f64;

    /// Gradient with respect to `x`.
    fn dx(&self, x: ArrayView1<f64>, y: ArrayView1<f64>) -> Array1<f64>;
    /// Entry `(i, j)` is `d^2 k / dx_i dy_j`.
    fn dx_dy(&self, x: ArrayView1<f64>, y: ArrayView1<f64>) -> Array2<f64>;
    /// Entry `(i, j)` is `d^3 k / dx_i dy_j^2`.
    fn dx_dy_dy(&self, x: ArrayView1<f64>, y: ArrayView1<f64>) -> Array2<f64>;
    /// Entry `(i, j)` is `d^2 k / dx_i dx_j`.
    fn dx_i_dx_j(&self, x: ArrayView1<f64>, y: ArrayView1<f64>) -> Array2<f64>;
    /// Entry `(i, j)` is `sum_k v_k d^3 k / dx_i dx_j dx_k`.
    fn dx_i_dx_j_dx_k_dot_vec(
        &self,
        x: ArrayView1<f64>,
        y: ArrayView1<f64>,
        v: ArrayView1<f64>,
    ) -> Array2<f64>;

    fn dx_component(&self, x: ArrayView1<f64>, y: ArrayView1<f64>, i: usize) -> f64 {
        self.dx(x, y)[i]
    }
    fn dx_dy_component(&self, x: ArrayView1<f64>, y: ArrayView1<f64>, i: usize, j: usize) -> f64 {
        self.dx_dy(x, y)[[i, j]]
    }
    fn dx_dy_dy_component(
        &self,
        x: ArrayView1<f64>,
        y: ArrayView1<f64>,
        i: usize,
        j: usize,
    ) -> f64 {
        self.dx_dy_dy(x, y)[[i, j]]
    }
    fn dx_i_dx_j_component(&self, x: ArrayView1<f64>, y: ArrayView1<f64>, i: usize) -> Array1<f64> {
        self.dx_i_dx_j(x, y).row(i).to_owned()
    }
    fn dx_i_dx_j_dx_k_dot_vec_component(
        &self,
        x: ArrayView1<f64>,
        y: ArrayView1<f64>,
        v: ArrayView1<f64>,
        i: usize,
        j: usize,
    ) -> f64 {
        self.dx_i_dx_j_dx_k_dot_vec(x, y, v)[[i, j]]
    }
}

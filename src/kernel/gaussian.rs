use ndarray::{Array1, Array2, ArrayView1};

use crate::error::{KefError, Result};

/// `k(x, y) = exp(-||x - y||^2 / sigma)`.
#[derive(Debug, Clone, Copy)]
pub struct GaussianKernel {
    sigma: f64,
}

impl GaussianKernel {
    pub fn new(sigma: f64) -> Result<GaussianKernel> {
        if !(sigma.is_finite() && sigma > 0.0) {
            return Err(KefError::InvalidParameter {
                name: "sigma",
                value: sigma,
                reason: "must be finite and positive",
            });
        }
        Ok(GaussianKernel { sigma })
    }

    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    fn difference(x: ArrayView1<f64>, y: ArrayView1<f64>) -> Array1<f64> {
        &x - &y
    }

    fn eval_diff(&self, diff: &Array1<f64>) -> f64 {
        (-diff.dot(diff) / self.sigma).exp()
    }
}

impl super::Kernel for GaussianKernel {
    fn kernel(&self, x: ArrayView1<f64>, y: ArrayView1<f64>) -> f64 {
        self.eval_diff(&Self::difference(x, y))
    }

    fn dx(&self, x: ArrayView1<f64>, y: ArrayView1<f64>) -> Array1<f64> {
        let diff = Self::difference(x, y);
        let k = self.eval_diff(&diff);
        diff * (-2.0 / self.sigma * k)
    }

    fn dx_dy(&self, x: ArrayView1<f64>, y: ArrayView1<f64>) -> Array2<f64> {
        let diff = Self::difference(x, y);
        let k = self.eval_diff(&diff);
        let d = diff.len();
        Array2::from_shape_fn((d, d), |(i, j)| {
            let delta = if i == j { 2.0 / self.sigma } else { 0.0 };
            (delta - 4.0 / (self.sigma * self.sigma) * diff[i] * diff[j]) * k
        })
    }

    fn dx_dy_dy(&self, x: ArrayView1<f64>, y: ArrayView1<f64>) -> Array2<f64> {
        let diff = Self::difference(x, y);
        let k = self.eval_diff(&diff);
        let d = diff.len();
        Array2::from_shape_fn((d, d), |(i, j)| self.third_mixed(&diff, k, i, j))
    }

    fn dx_i_dx_j(&self, x: ArrayView1<f64>, y: ArrayView1<f64>) -> Array2<f64> {
        let diff = Self::difference(x, y);
        let k = self.eval_diff(&diff);
        let d = diff.len();
        Array2::from_shape_fn((d, d), |(i, j)| self.second_left(&diff, k, i, j))
    }

    fn dx_i_dx_j_dx_k_dot_vec(
        &self,
        x: ArrayView1<f64>,
        y: ArrayView1<f64>,
        v: ArrayView1<f64>,
    ) -> Array2<f64> {
        let diff = Self::difference(x, y);
        let k = self.eval_diff(&diff);
        let diff_dot_v = diff.dot(&v);
        let d = diff.len();
        Array2::from_shape_fn((d, d), |(i, j)| {
            self.third_left_dot(&diff, v, diff_dot_v, k, i, j)
        })
    }

    fn dx_component(&self, x: ArrayView1<f64>, y: ArrayView1<f64>, i: usize) -> f64 {
        let diff = Self::difference(x, y);
        -2.0 / self.sigma * diff[i] * self.eval_diff(&diff)
    }

    fn dx_dy_component(&self, x: ArrayView1<f64>, y: ArrayView1<f64>, i: usize, j: usize) -> f64 {
        let diff = Self::difference(x, y);
        let k = self.eval_diff(&diff);
        let delta = if i == j { 2.0 / self.sigma } else { 0.0 };
        (delta - 4.0 / (self.sigma * self.sigma) * diff[i] * diff[j]) * k
    }

    fn dx_dy_dy_component(
        &self,
        x: ArrayView1<f64>,
        y: ArrayView1<f64>,
        i: usize,
        j: usize,
    ) -> f64 {
        let diff = Self::difference(x, y);
        let k = self.eval_diff(&diff);
        self.third_mixed(&diff, k, i, j)
    }

    fn dx_i_dx_j_component(&self, x: ArrayView1<f64>, y: ArrayView1<f64>, i: usize) -> Array1<f64> {
        let diff = Self::difference(x, y);
        let k = self.eval_diff(&diff);
        Array1::from_shape_fn(diff.len(), |j| self.second_left(&diff, k, i, j))
    }

    fn dx_i_dx_j_dx_k_dot_vec_component(
        &self,
        x: ArrayView1<f64>,
        y: ArrayView1<f64>,
        v: ArrayView1<f64>,
        i: usize,
        j: usize,
    ) -> f64 {
        let diff = Self::difference(x, y);
        let k = self.eval_diff(&diff);
        self.third_left_dot(&diff, v, diff.dot(&v), k, i, j)
    }
}

impl GaussianKernel {
    // d^3 k / dx_i dy_j^2
    fn third_mixed(&self, diff: &Array1<f64>, k: f64, i: usize, j: usize) -> f64 {
        let s = self.sigma;
        let delta = if i == j { 8.0 / (s * s) * diff[j] } else { 0.0 };
        (delta + 2.0 / s * diff[i] * (2.0 / s - 4.0 / (s * s) * diff[j] * diff[j])) * k
    }

    // d^2 k / dx_i dx_j
    fn second_left(&self, diff: &Array1<f64>, k: f64, i: usize, j: usize) -> f64 {
        let s = self.sigma;
        let delta = if i == j { -2.0 / s } else { 0.0 };
        (delta + 4.0 / (s * s) * diff[i] * diff[j]) * k
    }

    // sum_k v_k d^3 k / dx_i dx_j dx_k
    fn third_left_dot(
        &self,
        diff: &Array1<f64>,
        v: ArrayView1<f64>,
        diff_dot_v: f64,
        k: f64,
        i: usize,
        j: usize,
    ) -> f64 {
        let s = self.sigma;
        let delta = if i == j { diff_dot_v } else { 0.0 };
        let first = 4.0 / (s * s) * (delta + v[i] * diff[j] + diff[i] * v[j]);
        let second = 8.0 / (s * s * s) * diff[i] * diff[j] * diff_dot_v;
        (first - second) * k
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::Kernel;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    const H: f64 = 1e-5;

    fn shifted(p: &Array1<f64>, i: usize, h: f64) -> Array1<f64> {
        let mut q = p.clone();
        q[i] += h;
        q
    }

    fn setup() -> (GaussianKernel, Array1<f64>, Array1<f64>) {
        let kernel = GaussianKernel::new(2.0).unwrap();
        (kernel, array![0.3, -0.7, 1.1], array![-0.2, 0.4, 0.5])
    }

    #[test]
    fn rejects_bad_sigma() {
        assert!(GaussianKernel::new(0.0).is_err());
        assert!(GaussianKernel::new(-1.0).is_err());
        assert!(GaussianKernel::new(f64::NAN).is_err());
    }

    #[test]
    fn dx_matches_finite_difference() {
        let (kernel, x, y) = setup();
        let grad = kernel.dx(x.view(), y.view());
        for i in 0..x.len() {
            let fd = (kernel.kernel(shifted(&x, i, H).view(), y.view())
                - kernel.kernel(shifted(&x, i, -H).view(), y.view()))
                / (2.0 * H);
            assert_abs_diff_eq!(grad[i], fd, epsilon = 1e-8);
            assert_abs_diff_eq!(
                kernel.dx_component(x.view(), y.view(), i),
                grad[i],
                epsilon = 1e-14
            );
        }
    }

    #[test]
    fn dx_dy_matches_finite_difference() {
        let (kernel, x, y) = setup();
        let block = kernel.dx_dy(x.view(), y.view());
        for j in 0..y.len() {
            let plus = kernel.dx(x.view(), shifted(&y, j, H).view());
            let minus = kernel.dx(x.view(), shifted(&y, j, -H).view());
            for i in 0..x.len() {
                let fd = (plus[i] - minus[i]) / (2.0 * H);
                assert_abs_diff_eq!(block[[i, j]], fd, epsilon = 1e-8);
                assert_abs_diff_eq!(
                    kernel.dx_dy_component(x.view(), y.view(), i, j),
                    block[[i, j]],
                    epsilon = 1e-14
                );
            }
        }
    }

    #[test]
    fn dx_dy_dy_matches_finite_difference() {
        let (kernel, x, y) = setup();
        let block = kernel.dx_dy_dy(x.view(), y.view());
        for j in 0..y.len() {
            let plus = kernel.dx_dy(x.view(), shifted(&y, j, H).view());
            let minus = kernel.dx_dy(x.view(), shifted(&y, j, -H).view());
            for i in 0..x.len() {
                let fd = (plus[[i, j]] - minus[[i, j]]) / (2.0 * H);
                assert_abs_diff_eq!(block[[i, j]], fd, epsilon = 1e-7);
                assert_abs_diff_eq!(
                    kernel.dx_dy_dy_component(x.view(), y.view(), i, j),
                    block[[i, j]],
                    epsilon = 1e-14
                );
            }
        }
    }

    #[test]
    fn dx_i_dx_j_matches_finite_difference() {
        let (kernel, x, y) = setup();
        let block = kernel.dx_i_dx_j(x.view(), y.view());
        for j in 0..x.len() {
            let plus = kernel.dx(shifted(&x, j, H).view(), y.view());
            let minus = kernel.dx(shifted(&x, j, -H).view(), y.view());
            for i in 0..x.len() {
                let fd = (plus[i] - minus[i]) / (2.0 * H);
                assert_abs_diff_eq!(block[[i, j]], fd, epsilon = 1e-8);
            }
            let row = kernel.dx_i_dx_j_component(x.view(), y.view(), j);
            assert_abs_diff_eq!(row[0], block[[j, 0]], epsilon = 1e-14);
            assert_abs_diff_eq!(row[2], block[[j, 2]], epsilon = 1e-14);
        }
    }

    #[test]
    fn third_derivative_dot_vec_matches_finite_difference() {
        let (kernel, x, y) = setup();
        let v = array![0.5, -1.5, 2.0];
        let block = kernel.dx_i_dx_j_dx_k_dot_vec(x.view(), y.view(), v.view());
        for i in 0..x.len() {
            for j in 0..x.len() {
                let mut fd = 0.0;
                for k in 0..x.len() {
                    let plus = kernel.dx_i_dx_j(shifted(&x, k, H).view(), y.view());
                    let minus = kernel.dx_i_dx_j(shifted(&x, k, -H).view(), y.view());
                    fd += v[k] * (plus[[i, j]] - minus[[i, j]]) / (2.0 * H);
                }
                assert_abs_diff_eq!(block[[i, j]], fd, epsilon = 1e-7);
                assert_abs_diff_eq!(
                    kernel.dx_i_dx_j_dx_k_dot_vec_component(x.view(), y.view(), v.view(), i, j),
                    block[[i, j]],
                    epsilon = 1e-14
                );
            }
        }
    }
}

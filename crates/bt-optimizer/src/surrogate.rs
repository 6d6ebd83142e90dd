//! Gaussian-process surrogate of the objective over the unit cube.

use bt_types::{internal_error, validation_error, BtResult};
use ndarray::{Array1, Array2, ArrayView1};

/// Regression model predicting objective mean and standard deviation.
pub trait Surrogate: Send {
    fn fit(&mut self, x: &Array2<f64>, y: &[f64]) -> BtResult<()>;

    /// Posterior `(mean, std)` at every row of `x`, in objective units.
    fn predict(&self, x: &Array2<f64>) -> BtResult<(Vec<f64>, Vec<f64>)>;
}

#[derive(Debug, Clone)]
struct Posterior {
    x: Array2<f64>,
    chol: Array2<f64>,
    alpha: Array1<f64>,
    y_mean: f64,
    y_std: f64,
}

/// Zero-mean GP with a Matern 5/2 kernel on standardized targets.
#[derive(Debug, Clone)]
pub struct GaussianProcess {
    length_scale: f64,
    noise: f64,
    posterior: Option<Posterior>,
}

impl Default for GaussianProcess {
    fn default() -> Self {
        Self::new(0.3, 1e-6)
    }
}

impl GaussianProcess {
    pub fn new(length_scale: f64, noise: f64) -> Self {
        Self {
            length_scale,
            noise: noise.max(1e-10),
            posterior: None,
        }
    }

    fn kernel(&self, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        let dist = a
            .iter()
            .zip(b.iter())
            .map(|(p, q)| (p - q).powi(2))
            .sum::<f64>()
            .sqrt();
        let r = 5.0_f64.sqrt() * dist / self.length_scale;
        (1.0 + r + r * r / 3.0) * (-r).exp()
    }

    fn cholesky(a: &Array2<f64>) -> BtResult<Array2<f64>> {
        let n = a.nrows();
        let mut l = Array2::zeros((n, n));
        for i in 0..n {
            for j in 0..=i {
                let sum: f64 = (0..j).map(|k| l[[i, k]] * l[[j, k]]).sum();
                if i == j {
                    let d = a[[i, i]] - sum;
                    if !(d > 0.0) {
                        return Err(internal_error!("kernel matrix is not positive definite"));
                    }
                    l[[i, j]] = d.sqrt();
                } else {
                    l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
                }
            }
        }
        Ok(l)
    }

    /// Solve `L v = b` for lower-triangular `L`.
    fn forward(l: &Array2<f64>, b: &Array1<f64>) -> Array1<f64> {
        let n = b.len();
        let mut v = Array1::zeros(n);
        for i in 0..n {
            let sum: f64 = (0..i).map(|j| l[[i, j]] * v[j]).sum();
            v[i] = (b[i] - sum) / l[[i, i]];
        }
        v
    }

    /// Solve `L^T v = b`.
    fn backward(l: &Array2<f64>, b: &Array1<f64>) -> Array1<f64> {
        let n = b.len();
        let mut v = Array1::zeros(n);
        for i in (0..n).rev() {
            let sum: f64 = (i + 1..n).map(|j| l[[j, i]] * v[j]).sum();
            v[i] = (b[i] - sum) / l[[i, i]];
        }
        v
    }
}

impl Surrogate for GaussianProcess {
    fn fit(&mut self, x: &Array2<f64>, y: &[f64]) -> BtResult<()> {
        if x.nrows() != y.len() || y.is_empty() {
            return Err(validation_error!(
                "surrogate needs matching non-empty inputs, got {} rows and {} targets",
                x.nrows(),
                y.len()
            ));
        }

        let n = y.len() as f64;
        let y_mean = y.iter().sum::<f64>() / n;
        let mut y_std = (y.iter().map(|v| (v - y_mean).powi(2)).sum::<f64>() / n).sqrt();
        if y_std < 1e-12 {
            y_std = 1.0;
        }
        let targets: Array1<f64> = y.iter().map(|v| (v - y_mean) / y_std).collect();

        let mut k = Array2::zeros((y.len(), y.len()));
        for i in 0..y.len() {
            for j in 0..=i {
                let v = self.kernel(x.row(i), x.row(j));
                k[[i, j]] = v;
                k[[j, i]] = v;
            }
            k[[i, i]] += self.noise;
        }

        // Duplicate inputs make K singular; grow the jitter until it factors.
        let mut jitter = 0.0;
        let chol = loop {
            let mut attempt = k.clone();
            for i in 0..y.len() {
                attempt[[i, i]] += jitter;
            }
            match Self::cholesky(&attempt) {
                Ok(l) => break l,
                Err(err) if jitter > 1e-2 => return Err(err),
                Err(_) => jitter = if jitter == 0.0 { 1e-8 } else { jitter * 10.0 },
            }
        };
        let alpha = Self::backward(&chol, &Self::forward(&chol, &targets));

        self.posterior = Some(Posterior {
            x: x.clone(),
            chol,
            alpha,
            y_mean,
            y_std,
        });
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> BtResult<(Vec<f64>, Vec<f64>)> {
        let post = self
            .posterior
            .as_ref()
            .ok_or_else(|| internal_error!("surrogate queried before fit"))?;
        if x.ncols() != post.x.ncols() {
            return Err(validation_error!(
                "query has {} dimensions, surrogate was fit on {}",
                x.ncols(),
                post.x.ncols()
            ));
        }

        let mut means = Vec::with_capacity(x.nrows());
        let mut stds = Vec::with_capacity(x.nrows());
        for row in x.rows() {
            let k_star: Array1<f64> = post.x.rows().into_iter().map(|xi| self.kernel(row, xi)).collect();
            let mean = k_star.dot(&post.alpha);
            let v = Self::forward(&post.chol, &k_star);
            let var = (self.kernel(row, row) - v.dot(&v)).max(1e-12);
            means.push(mean * post.y_std + post.y_mean);
            stds.push(var.sqrt() * post.y_std);
        }
        Ok((means, stds))
    }
}

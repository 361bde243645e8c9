//! Batch normalization and dropout with explicit backward passes.

use ndarray::{Array, Array1, Array2, ArrayView2, Axis, Dimension, ShapeBuilder, Zip};
use rand::Rng;

/// Running-statistics momentum.
pub const BN_MOMENTUM: f32 = 0.1;
/// Variance epsilon.
pub const BN_EPS: f32 = 1e-5;

/// 1-d batch normalization over feature columns.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchNorm {
    /// Scale (γ).
    pub weight: Array1<f32>,
    /// Shift (β).
    pub bias: Array1<f32>,
    /// Running mean used in inference.
    pub running_mean: Array1<f32>,
    /// Running (unbiased) variance used in inference.
    pub running_var: Array1<f32>,
}

/// Values saved by [`BatchNorm::forward_train`] for the backward pass.
#[derive(Debug, Clone)]
pub struct BatchNormCache {
    xhat: Array2<f32>,
    inv_std: Array1<f32>,
    batch_stats: bool,
}

/// Gradients of one batch-norm layer.
#[derive(Debug, Clone)]
pub struct BatchNormGrad {
    /// Gradient with respect to the input.
    pub input: Array2<f32>,
    /// Gradient with respect to γ.
    pub weight: Array1<f32>,
    /// Gradient with respect to β.
    pub bias: Array1<f32>,
}

impl BatchNorm {
    /// Identity-initialized layer (γ = 1, β = 0, running stats 0/1).
    pub fn new(dim: usize) -> Self {
        Self {
            weight: Array1::ones(dim),
            bias: Array1::zeros(dim),
            running_mean: Array1::zeros(dim),
            running_var: Array1::ones(dim),
        }
    }

    /// Number of features.
    pub fn dim(&self) -> usize {
        self.weight.len()
    }

    /// Training-mode forward pass.
    ///
    /// Normalizes with batch statistics and updates the running ones. A batch
    /// of one row has no variance, so it is normalized with the running
    /// statistics instead, which are then left untouched.
    pub fn forward_train(&mut self, x: ArrayView2<'_, f32>) -> (Array2<f32>, BatchNormCache) {
        let rows = x.nrows();
        if rows < 2 {
            let inv_std = self.running_var.mapv(|v| 1.0 / (v + BN_EPS).sqrt());
            let xhat = (&x - &self.running_mean) * &inv_std;
            let y = &xhat * &self.weight + &self.bias;
            let cache = BatchNormCache {
                xhat,
                inv_std,
                batch_stats: false,
            };
            return (y, cache);
        }

        let n = rows as f32;
        let mean = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(x.ncols()));
        let centered = &x - &mean;
        let var = centered.mapv(|c| c * c).sum_axis(Axis(0)) / n;
        let inv_std = var.mapv(|v| 1.0 / (v + BN_EPS).sqrt());
        let xhat = &centered * &inv_std;
        let y = &xhat * &self.weight + &self.bias;

        let unbiased = &var * (n / (n - 1.0));
        Zip::from(&mut self.running_mean)
            .and(&mean)
            .for_each(|r, &m| *r = (1.0 - BN_MOMENTUM) * *r + BN_MOMENTUM * m);
        Zip::from(&mut self.running_var)
            .and(&unbiased)
            .for_each(|r, &v| *r = (1.0 - BN_MOMENTUM) * *r + BN_MOMENTUM * v);

        let cache = BatchNormCache {
            xhat,
            inv_std,
            batch_stats: true,
        };
        (y, cache)
    }

    /// Inference-mode forward pass using running statistics only.
    pub fn forward_eval(&self, x: ArrayView2<'_, f32>) -> Array2<f32> {
        let scale = Zip::from(&self.weight)
            .and(&self.running_var)
            .map_collect(|&w, &v| w / (v + BN_EPS).sqrt());
        let shift = &self.bias - &(&self.running_mean * &scale);
        &x * &scale + &shift
    }

    /// Backward pass given the upstream gradient `dy`.
    pub fn backward(&self, cache: &BatchNormCache, dy: ArrayView2<'_, f32>) -> BatchNormGrad {
        let weight = (&dy * &cache.xhat).sum_axis(Axis(0));
        let bias = dy.sum_axis(Axis(0));
        let dxhat = &dy * &self.weight;

        let input = if cache.batch_stats {
            // dx = inv_std/B · (B·dxhat - Σdxhat - xhat·Σ(dxhat·xhat))
            let n = dy.nrows() as f32;
            let sum_dxhat = dxhat.sum_axis(Axis(0));
            let sum_dxhat_xhat = (&dxhat * &cache.xhat).sum_axis(Axis(0));
            let inner = &dxhat * n - &sum_dxhat - &(&cache.xhat * &sum_dxhat_xhat);
            inner * &(&cache.inv_std / n)
        } else {
            dxhat * &cache.inv_std
        };

        BatchNormGrad {
            input,
            weight,
            bias,
        }
    }
}

/// Inverted dropout: kept units are scaled by `1 / (1 - p)` so inference
/// needs no rescaling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dropout {
    p: f32,
}

impl Dropout {
    /// Dropout with drop probability `p`, clamped to `[0, 1)`.
    pub fn new(p: f32) -> Self {
        Self {
            p: p.clamp(0.0, 0.999),
        }
    }

    /// Drop probability.
    pub fn p(&self) -> f32 {
        self.p
    }

    /// Sample a mask of the given shape, or `None` when `p == 0`.
    pub fn sample_mask<D, Sh, R>(&self, shape: Sh, rng: &mut R) -> Option<Array<f32, D>>
    where
        D: Dimension,
        Sh: ShapeBuilder<Dim = D>,
        R: Rng + ?Sized,
    {
        if self.p <= 0.0 {
            return None;
        }
        let keep = 1.0 / (1.0 - self.p);
        let p = self.p;
        Some(Array::from_shape_simple_fn(shape, || {
            if rng.gen::<f32>() < p {
                0.0
            } else {
                keep
            }
        }))
    }
}

/// Multiply in place by an optional mask.
pub fn apply_mask<D: Dimension>(x: &mut Array<f32, D>, mask: Option<&Array<f32, D>>) {
    if let Some(mask) = mask {
        *x *= mask;
    }
}

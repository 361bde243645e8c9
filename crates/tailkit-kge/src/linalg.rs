//! Tensor primitives for the TuckER forward and backward passes.
//!
//! Shapes used throughout (`B` = batch, `d_e` = entity dim, `d_r` = relation
//! dim, `N` = number of entities):
//!
//! | Name | Shape |
//! |------|-------|
//! | core tensor `W` | `(d_r, d_e, d_e)` |
//! | relation rows `r` | `(B, d_r)` |
//! | relation-specific cores `W_r` | `(B, d_e, d_e)` |
//! | head rows `x` | `(B, d_e)` |
//! | logits | `(B, N)` |
//!
//! The batch dimension is processed in parallel with rayon.

use crate::error::Result;
use ndarray::parallel::prelude::*;
use ndarray::{Array1, Array2, Array3, ArrayView1, ArrayView2, ArrayView3, Axis, Zip};

/// Mode-1 contraction of the core tensor with a batch of relation rows:
/// `W_r[b] = Σ_k r[b, k] · W[k]`.
pub fn contract_relation(core: ArrayView3<'_, f32>, r: ArrayView2<'_, f32>) -> Result<Array3<f32>> {
    let (d_r, d_in, d_out) = core.dim();
    let flat = core.to_shape((d_r, d_in * d_out))?;
    let batch = r.nrows();
    Ok(r.dot(&flat).into_shape_with_order((batch, d_in, d_out))?)
}

/// Backward pass of [`contract_relation`].
///
/// Given `dW_r` of shape `(B, d_e, d_e)`, returns `(dW, dr)` with shapes
/// `(d_r, d_e, d_e)` and `(B, d_r)`.
pub fn contract_relation_backward(
    core: ArrayView3<'_, f32>,
    r: ArrayView2<'_, f32>,
    d_wr: ArrayView3<'_, f32>,
) -> Result<(Array3<f32>, Array2<f32>)> {
    let (d_r, d_in, d_out) = core.dim();
    let batch = r.nrows();
    let flat = core.to_shape((d_r, d_in * d_out))?;
    let d_flat = d_wr.to_shape((batch, d_in * d_out))?;
    let d_core = r.t().dot(&d_flat).into_shape_with_order((d_r, d_in, d_out))?;
    let d_r_rows = d_flat.dot(&flat.t());
    Ok((d_core, d_r_rows))
}

/// Row-wise vector-matrix product: `y[b] = x[b] · m[b]`.
pub fn batched_vecmat(x: ArrayView2<'_, f32>, m: ArrayView3<'_, f32>) -> Array2<f32> {
    let mut out = Array2::zeros((x.nrows(), m.len_of(Axis(2))));
    out.axis_iter_mut(Axis(0))
        .into_par_iter()
        .zip(x.axis_iter(Axis(0)))
        .zip(m.axis_iter(Axis(0)))
        .for_each(|((mut y, xb), mb)| y.assign(&xb.dot(&mb)));
    out
}

/// Backward pass of [`batched_vecmat`].
///
/// Returns `(dx, dm)` where `dx[b] = m[b] · dy[b]` and
/// `dm[b] = x[b] ⊗ dy[b]`.
pub fn batched_vecmat_backward(
    x: ArrayView2<'_, f32>,
    m: ArrayView3<'_, f32>,
    dy: ArrayView2<'_, f32>,
) -> (Array2<f32>, Array3<f32>) {
    let mut dx = Array2::zeros(x.raw_dim());
    let mut dm = Array3::zeros(m.raw_dim());
    dx.axis_iter_mut(Axis(0))
        .into_par_iter()
        .zip(dm.axis_iter_mut(Axis(0)))
        .zip(x.axis_iter(Axis(0)))
        .zip(m.axis_iter(Axis(0)))
        .zip(dy.axis_iter(Axis(0)))
        .for_each(|((((mut dxb, mut dmb), xb), mb), dyb)| {
            dxb.assign(&mb.dot(&dyb));
            dmb.assign(&outer(xb, dyb));
        });
    (dx, dm)
}

/// Outer product `a ⊗ b`.
pub fn outer(a: ArrayView1<'_, f32>, b: ArrayView1<'_, f32>) -> Array2<f32> {
    let col = a.insert_axis(Axis(1));
    let row = b.insert_axis(Axis(0));
    col.dot(&row)
}

/// Numerically stable logistic function.
pub fn sigmoid(x: f32) -> f32 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// Element-wise [`sigmoid`] of a score vector.
pub fn sigmoid_vec(logits: ArrayView1<'_, f32>) -> Array1<f32> {
    logits.mapv(sigmoid)
}

/// Mean binary cross-entropy computed from logits, and its gradient.
///
/// Uses `max(z, 0) - z·t + ln(1 + e^{-|z|})` per element so large logits do
/// not overflow. The gradient `(σ(z) - t) / (B·N)` is with respect to the
/// logits of the mean loss.
pub fn bce_with_logits(logits: ArrayView2<'_, f32>, targets: ArrayView2<'_, f32>) -> (f32, Array2<f32>) {
    let count = logits.len().max(1) as f32;
    let total: f64 = Zip::from(logits)
        .and(targets)
        .par_map_collect(|&z, &t| {
            (z.max(0.0) - z * t + (-z.abs()).exp().ln_1p()) as f64
        })
        .sum();
    let mut grad = Array2::zeros(logits.raw_dim());
    Zip::from(&mut grad)
        .and(logits)
        .and(targets)
        .par_for_each(|g, &z, &t| *g = (sigmoid(z) - t) / count);
    ((total / f64::from(count)) as f32, grad)
}

/// Indices of the `k` highest scores, best first.
///
/// Ties are broken by the lower index so results are deterministic.
pub fn top_k(scores: ArrayView1<'_, f32>, k: usize) -> Vec<(usize, f32)> {
    let n = scores.len();
    let k = k.min(n);
    if k == 0 {
        return Vec::new();
    }
    let cmp = |a: &usize, b: &usize| scores[*b].total_cmp(&scores[*a]).then(a.cmp(b));
    let mut idx: Vec<usize> = (0..n).collect();
    if k < n {
        idx.select_nth_unstable_by(k - 1, cmp);
        idx.truncate(k);
    }
    idx.sort_unstable_by(cmp);
    idx.into_iter().map(|i| (i, scores[i])).collect()
}

//! Adam with optional exponential learning-rate decay.

use crate::model::Gradients;
use crate::store::ModelState;
use ndarray::{Array, Array1, Dimension, Ix1, Ix2, Ix3, Zip};

/// Adam hyperparameters and step counter.
#[derive(Debug, Clone)]
pub struct Adam {
    /// Current learning rate.
    pub lr: f32,
    /// First-moment decay.
    pub beta1: f32,
    /// Second-moment decay.
    pub beta2: f32,
    /// Denominator epsilon.
    pub eps: f32,
    /// Multiplied into `lr` by [`Adam::decay`]; `1.0` disables decay.
    pub decay_rate: f32,
    step: i32,
}

impl Adam {
    /// Adam with the usual betas (0.9, 0.999).
    pub fn new(lr: f32) -> Self {
        Self {
            lr,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            decay_rate: 1.0,
            step: 0,
        }
    }

    /// Set the per-epoch decay factor.
    pub fn with_decay(mut self, decay_rate: f32) -> Self {
        self.decay_rate = decay_rate;
        self
    }

    /// Advance the step counter; call once per optimizer step before
    /// [`Adam::update`].
    pub fn begin_step(&mut self) {
        self.step = self.step.saturating_add(1);
    }

    /// Apply exponential decay (once per epoch).
    pub fn decay(&mut self) {
        self.lr *= self.decay_rate;
    }

    /// Update one parameter array in place.
    pub fn update<D: Dimension>(&self, param: &mut Array<f32, D>, grad: &Array<f32, D>, state: &mut Moments<D>) {
        let t = self.step.max(1);
        let bc1 = 1.0 - self.beta1.powi(t);
        let bc2 = 1.0 - self.beta2.powi(t);
        let (lr, b1, b2, eps) = (self.lr, self.beta1, self.beta2, self.eps);
        Zip::from(param)
            .and(grad)
            .and(&mut state.m)
            .and(&mut state.v)
            .par_for_each(|p, &g, m, v| {
                *m = b1 * *m + (1.0 - b1) * g;
                *v = b2 * *v + (1.0 - b2) * g * g;
                let m_hat = *m / bc1;
                let v_hat = *v / bc2;
                *p -= lr * m_hat / (v_hat.sqrt() + eps);
            });
    }
}

/// First and second moment estimates of one parameter array.
#[derive(Debug, Clone)]
pub struct Moments<D: Dimension> {
    m: Array<f32, D>,
    v: Array<f32, D>,
}

impl<D: Dimension> Moments<D> {
    /// Zero moments shaped like `param`.
    pub fn zeros_like(param: &Array<f32, D>) -> Self {
        Self {
            m: Array::zeros(param.raw_dim()),
            v: Array::zeros(param.raw_dim()),
        }
    }
}

/// Adam state for every parameter of a [`ModelState`].
#[derive(Debug, Clone)]
pub struct ModelOptimizer {
    adam: Adam,
    entities: Moments<Ix2>,
    relations: Moments<Ix2>,
    core: Moments<Ix3>,
    bn: [Moments<Ix1>; 4],
}

impl ModelOptimizer {
    /// Zero moments for `state`'s parameters.
    pub fn new(adam: Adam, state: &ModelState) -> Self {
        let bn_zero = |a: &Array1<f32>| Moments::zeros_like(a);
        Self {
            entities: Moments::zeros_like(state.entities.data()),
            relations: Moments::zeros_like(state.relations.data()),
            core: Moments::zeros_like(state.core.data()),
            bn: [
                bn_zero(&state.bn0.weight),
                bn_zero(&state.bn0.bias),
                bn_zero(&state.bn1.weight),
                bn_zero(&state.bn1.bias),
            ],
            adam,
        }
    }

    /// Current learning rate.
    pub fn lr(&self) -> f32 {
        self.adam.lr
    }

    /// Apply one Adam step to every parameter.
    pub fn step(&mut self, state: &mut ModelState, grads: &Gradients) {
        self.adam.begin_step();
        let adam = &self.adam;
        adam.update(state.entities.data_mut(), &grads.entities, &mut self.entities);
        adam.update(state.relations.data_mut(), &grads.relations, &mut self.relations);
        adam.update(state.core.data_mut(), &grads.core, &mut self.core);
        let [w0, b0, w1, b1] = &mut self.bn;
        adam.update(&mut state.bn0.weight, &grads.bn0.weight, w0);
        adam.update(&mut state.bn0.bias, &grads.bn0.bias, b0);
        adam.update(&mut state.bn1.weight, &grads.bn1.weight, w1);
        adam.update(&mut state.bn1.bias, &grads.bn1.bias, b1);
    }

    /// End-of-epoch learning-rate decay.
    pub fn end_epoch(&mut self) {
        self.adam.decay();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array3};

    #[test]
    fn test_adam_minimizes_quadratic() {
        let mut adam = Adam::new(0.1);
        let mut x = array![[3.0f32, -2.0]];
        let mut moments = Moments::zeros_like(&x);
        for _ in 0..200 {
            adam.begin_step();
            let g = &x * 2.0;
            adam.update(&mut x, &g, &mut moments);
        }
        assert!(x.iter().all(|v| v.abs() < 0.5), "{x:?}");
    }

    #[test]
    fn test_first_step_moves_by_lr() {
        let mut adam = Adam::new(0.01);
        let mut x: Array3<f32> = Array3::zeros((1, 1, 2));
        let g = Array3::from_elem((1, 1, 2), 5.0f32);
        let mut moments = Moments::zeros_like(&x);
        adam.begin_step();
        adam.update(&mut x, &g, &mut moments);
        assert!(x.iter().all(|v| (v + 0.01).abs() < 1e-5));
    }

    #[test]
    fn test_decay() {
        let mut adam = Adam::new(0.1).with_decay(0.5);
        adam.decay();
        adam.decay();
        assert!((adam.lr - 0.025).abs() < 1e-7);
    }
}
